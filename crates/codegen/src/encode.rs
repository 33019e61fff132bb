use crate::{disasm::Instruction, error::AsmErrorType};
use pyreasm_compiler_core::{
    bytecode::{CodeUnit, CodeUnits},
    opcode::{EXTENDED_ARG, OpcodeTable},
};

/// Encodes `instructions` as 2-byte wordcode.
///
/// An `EXTENDED_ARG` takes its byte from the operand of the instruction
/// after it, and that instruction keeps only its low byte. Instructions
/// without an operand get a zero argument byte.
///
/// `dis` lists each `EXTENDED_ARG` with the operand accumulated so far, so a
/// prefix's own operand must equal the next operand shifted right by 8, and
/// every operand must fit in the bytes its prefix chain provides.
pub fn encode(
    instructions: &[Instruction],
    table: &OpcodeTable,
) -> Result<CodeUnits, AsmErrorType> {
    let mut units = Vec::with_capacity(instructions.len());
    // length of the EXTENDED_ARG chain in front of the current instruction
    let mut prefixes = 0u32;
    for (index, ins) in instructions.iter().enumerate() {
        let op = table
            .opcode(&ins.opname)
            .ok_or_else(|| AsmErrorType::UnknownOpcode {
                index,
                opname: ins.opname.clone(),
                arg: ins.arg,
                version: table.version(),
            })?;
        if ins.offset as usize != index * 2 {
            warn!(
                "`{ins}` is instruction {index}, which is encoded at offset {}",
                index * 2
            );
        }
        if let Some(arg) = ins.arg {
            let width = prefixes.saturating_add(1).saturating_mul(8);
            if arg.checked_shr(width).is_some_and(|rest| rest != 0) {
                return Err(AsmErrorType::OperandOverflow {
                    index,
                    opname: ins.opname.clone(),
                    arg,
                });
            }
        }

        if op == EXTENDED_ARG {
            let next = instructions
                .get(index + 1)
                .and_then(|next| next.arg)
                .ok_or(AsmErrorType::DanglingExtendedArg { index })?;
            match ins.arg {
                Some(listed) if listed != next >> 8 => {
                    return Err(AsmErrorType::ExtendedArgMismatch {
                        index,
                        listed,
                        expected: next >> 8,
                    });
                }
                _ => {}
            }
            units.push(CodeUnit::new(op, (next >> 8) as u8));
            prefixes += 1;
            continue;
        }

        // the overflow check above leaves only the low byte to mask off
        let arg = ins.arg.map_or(0, |arg| arg as u8);
        prefixes = 0;
        units.push(CodeUnit::new(op, arg));
    }
    Ok(units.into())
}
