//! The `co_lnotab` line table of CPython 3.6 - 3.9.
//!
//! The table is a sequence of `(offset increment, line increment)` byte
//! pairs; see `Objects/lnotab_notes.txt` in the CPython sources.

/// Appends one offset/line advance to `table`, splitting either increment
/// into several pairs when it does not fit a byte.
pub fn push_delta(table: &mut Vec<u8>, mut offset_delta: u32, mut line_delta: u32) {
    while offset_delta >= 256 {
        table.extend([255, 0]);
        offset_delta -= 255;
    }
    table.extend([offset_delta as u8, (line_delta % 255) as u8]);
    while line_delta >= 256 {
        table.extend([0, 255]);
        line_delta -= 255;
    }
}

/// How an instruction's line number relates to the line seen before it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LineStep {
    /// The first instruction of the unit.
    First,
    Same,
    Advanced,
    /// The line number went backwards; nothing was emitted.
    Regressed { previous: u32 },
}

/// Builds a line table from the `(offset, line)` sequence of a unit's
/// instructions. Only forward progress is recorded.
#[derive(Debug, Default)]
pub struct LineTableEncoder {
    table: Vec<u8>,
    line: Option<u32>,
    prev_offset: u32,
}

impl LineTableEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, offset: u32, line: u32) -> LineStep {
        let Some(current) = self.line else {
            self.line = Some(line);
            return LineStep::First;
        };
        match line.cmp(&current) {
            core::cmp::Ordering::Equal => LineStep::Same,
            core::cmp::Ordering::Less => LineStep::Regressed { previous: current },
            core::cmp::Ordering::Greater => {
                push_delta(
                    &mut self.table,
                    offset.saturating_sub(self.prev_offset),
                    line - current,
                );
                self.prev_offset = offset;
                self.line = Some(line);
                LineStep::Advanced
            }
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.table
    }
}

/// Decodes `table` into the `(offset, line)` pairs at which a new line
/// starts, like `dis.findlinestarts`.
pub fn line_starts(table: &[u8], first_line: u32) -> Vec<(u32, u32)> {
    let mut starts = Vec::new();
    let mut last_line = None;
    let mut line = i64::from(first_line);
    let mut offset = 0u32;
    for pair in table.chunks_exact(2) {
        let (offset_incr, line_incr) = (pair[0], pair[1]);
        if offset_incr != 0 {
            if last_line != Some(line) {
                starts.push((offset, line as u32));
                last_line = Some(line);
            }
            offset += u32::from(offset_incr);
        }
        // increments of 0x80 and above are negative
        line += i64::from(line_incr as i8);
    }
    if last_line != Some(line) {
        starts.push((offset, line as u32));
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(offset: u32, line: u32) -> Vec<u8> {
        let mut table = Vec::new();
        push_delta(&mut table, offset, line);
        table
    }

    #[test]
    fn test_push_delta_small() {
        assert_eq!(delta(6, 1), [6, 1]);
        assert_eq!(delta(0, 3), [0, 3]);
    }

    #[test]
    fn test_push_delta_large_offset() {
        assert_eq!(delta(300, 2), [255, 0, 45, 2]);
        assert_eq!(delta(600, 1), [255, 0, 255, 0, 90, 1]);
    }

    #[test]
    fn test_push_delta_large_line() {
        assert_eq!(delta(10, 300), [10, 45, 0, 255]);
    }

    #[test]
    fn test_encoder_records_only_advances() {
        let mut enc = LineTableEncoder::new();
        assert_eq!(enc.step(0, 1), LineStep::First);
        assert_eq!(enc.step(2, 1), LineStep::Same);
        assert_eq!(enc.step(4, 2), LineStep::Advanced);
        assert_eq!(enc.step(6, 1), LineStep::Regressed { previous: 2 });
        assert_eq!(enc.step(8, 4), LineStep::Advanced);
        assert_eq!(enc.finish(), [4, 1, 4, 2]);
    }

    #[test]
    fn test_single_line_is_empty() {
        let mut enc = LineTableEncoder::new();
        for offset in [0, 2, 4, 6] {
            enc.step(offset, 1);
        }
        assert!(enc.finish().is_empty());
    }

    #[test]
    fn test_line_starts() {
        assert_eq!(line_starts(&[], 1), [(0, 1)]);
        assert_eq!(line_starts(&[4, 1, 4, 2], 1), [(0, 1), (4, 2), (8, 4)]);
        assert_eq!(line_starts(&[255, 0, 45, 2], 3), [(0, 3), (300, 5)]);
        // a negative increment
        assert_eq!(line_starts(&[4, 2, 2, 0xff], 1), [(0, 1), (4, 3), (6, 2)]);
    }
}
