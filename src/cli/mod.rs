//! Command line interface for the ryt-cipher debug binary

pub mod args;
pub mod output;

pub use args::{Args, Command, VerbosityLevel};
pub use output::OutputFormatter;

use crate::Result;
use std::path::Path;

/// Read a script from disk, replacing invalid UTF-8
pub fn read_script_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
