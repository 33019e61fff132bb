use core::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("invalid version tag {0:?}, expected MAJOR.MINOR")]
    Invalid(String),
    #[error("unsupported target version {0}, supported versions are 3.6 through 3.9")]
    Unsupported(PyVersion),
}

/// A CPython `MAJOR.MINOR` version tag selecting the opcode numbering and
/// code object layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PyVersion {
    pub major: u8,
    pub minor: u8,
}

impl PyVersion {
    pub const MIN_SUPPORTED: Self = Self::new(3, 6);
    pub const MAX_SUPPORTED: Self = Self::new(3, 9);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub fn is_supported(self) -> bool {
        (Self::MIN_SUPPORTED..=Self::MAX_SUPPORTED).contains(&self)
    }

    /// Rejects versions whose code object layout differs from the wordcode +
    /// lnotab layout assembled here.
    pub fn check_supported(self) -> Result<Self, VersionError> {
        if self.is_supported() {
            Ok(self)
        } else {
            Err(VersionError::Unsupported(self))
        }
    }

    /// `co_posonlyargcount` exists from 3.8 on.
    pub fn has_posonly_args(self) -> bool {
        self >= Self::new(3, 8)
    }

    /// The `.pyc` header grew a flags word in 3.7 (PEP 552).
    pub fn has_pyc_flags(self) -> bool {
        self >= Self::new(3, 7)
    }

    /// The `MAGIC_NUMBER` of the final release of this version.
    pub fn magic_number(self) -> Option<u16> {
        match (self.major, self.minor) {
            (3, 6) => Some(3379),
            (3, 7) => Some(3394),
            (3, 8) => Some(3413),
            (3, 9) => Some(3425),
            _ => None,
        }
    }
}

impl Default for PyVersion {
    fn default() -> Self {
        Self::new(3, 8)
    }
}

impl fmt::Display for PyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PyVersion {
    type Err = VersionError;

    /// Accepts `3.8` and `3.8.10`; the micro version is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::Invalid(s.to_owned());
        let mut parts = s.trim().split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let minor = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        if let Some(micro) = parts.next() {
            if micro.parse::<u16>().is_err() || parts.next().is_some() {
                return Err(invalid());
            }
        }
        Ok(Self::new(major, minor))
    }
}
