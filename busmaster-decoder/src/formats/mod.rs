//! Log file format parsers
//!
//! This module contains parsers for CAN log text formats. Each parser
//! implements an iterator pattern over [`FrameRecord`] values.

use crate::types::{DecoderError, FrameRecord, Result};
use std::path::Path;

pub mod busmaster;

// Re-export parser types
pub use busmaster::{BusmasterFrameIterator, BusmasterParser};

/// Common trait for all log file parsers
///
/// This trait provides a unified interface for parsing different log file
/// formats. Each parser returns an iterator over frame records.
pub trait LogFileParser: Iterator<Item = Result<FrameRecord>> + Sized {
    /// Parse a log file and return an iterator over frame records
    fn parse(path: &Path) -> Result<Self>;
}

/// Read a text file, accepting Latin-1 when it isn't valid UTF-8
///
/// DBC files exported by Windows tools are frequently Windows-1252; the
/// Latin-1 reading keeps every byte and only mangles the few code points
/// where the two differ.
pub(crate) fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| {
        DecoderError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to read file {:?}: {}", path, e),
        ))
    })?;

    Ok(String::from_utf8(bytes).unwrap_or_else(|e| {
        log::warn!("{:?} is not UTF-8, reading it as Latin-1", path);
        e.into_bytes().iter().map(|&b| b as char).collect()
    }))
}
