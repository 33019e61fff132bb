#![doc(html_root_url = "https://docs.rs/pyreasm-compiler-core/")]

pub mod bytecode;
pub mod lnotab;
pub mod marshal;
pub mod opcode;
mod version;

pub use version::{PyVersion, VersionError};
