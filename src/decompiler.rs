use pyreasm_compiler::{CodeObject, Decompile, DecompileError, PyVersion, core::marshal};
use std::{
    io::Write,
    path::PathBuf,
    process::Command,
    time::{SystemTime, UNIX_EPOCH},
};

/// Runs a decompiler such as `uncompyle6` on a `.pyc` written for each code
/// object.
#[derive(Debug, Clone)]
pub struct ExternalDecompiler {
    program: PathBuf,
}

impl ExternalDecompiler {
    /// Looks `name` up on `PATH`.
    pub fn locate(name: &str) -> Result<Self, which::Error> {
        let program = which::which(name)?;
        debug!("using decompiler {}", program.display());
        Ok(Self { program })
    }
}

fn mtime() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as u32)
}

impl Decompile for ExternalDecompiler {
    fn decompile(&self, code: &CodeObject, version: PyVersion) -> Result<String, DecompileError> {
        let pyc = marshal::write_pyc(code, version, mtime())?;
        let mut file = tempfile::Builder::new()
            .prefix("pyreasm-")
            .suffix(".pyc")
            .tempfile()?;
        file.write_all(&pyc)?;
        file.flush()?;

        trace!("{} {}", self.program.display(), file.path().display());
        let output = Command::new(&self.program).arg(file.path()).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DecompileError::Failed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
