//! Main decoder API
//!
//! This module provides the primary interface for the decoder library.
//! The Decoder struct is the entry point for loading signal definitions and
//! decoding BusMaster log files into a [`Dataset`].

use crate::config::DecoderConfig;
use crate::dataset::{Dataset, DatasetBuilder};
use crate::formats::{BusmasterParser, LogFileParser};
use crate::signals::{MessageDefinition, SignalDatabase};
use crate::types::{FrameRecord, Result};
use std::path::Path;

/// The main decoder struct - entry point for all decoding operations
pub struct Decoder {
    /// Internal signal database (loaded from DBC files)
    signal_db: SignalDatabase,
}

impl Decoder {
    /// Create a new decoder instance
    pub fn new() -> Self {
        Self {
            signal_db: SignalDatabase::new(),
        }
    }

    /// Load a DBC file and add its definitions to the signal database
    ///
    /// Definitions from later files replace earlier ones with the same CAN ID.
    ///
    /// # Example
    /// ```no_run
    /// use busmaster_decoder::Decoder;
    /// use std::path::Path;
    ///
    /// let mut decoder = Decoder::new();
    /// decoder.add_dbc(Path::new("powertrain.dbc")).unwrap();
    /// ```
    pub fn add_dbc(&mut self, path: &Path) -> Result<()> {
        log::info!("Loading DBC file: {:?}", path);

        let messages = crate::signals::dbc::parse_dbc_file(path)?;
        self.add_messages(messages);

        log::info!("DBC file loaded successfully: {:?}", path);
        Ok(())
    }

    /// Add definitions from DBC text already in memory
    ///
    /// `source` names the text in log messages.
    pub fn add_dbc_str(&mut self, content: &str, source: &str) -> Result<()> {
        let messages = crate::signals::dbc::parse_dbc_str(content, source)?;
        self.add_messages(messages);
        Ok(())
    }

    fn add_messages(&mut self, messages: Vec<MessageDefinition>) {
        // Replacements are logged by the database
        for message in messages {
            self.signal_db.add_message(message);
        }
    }

    /// The loaded signal database
    pub fn database(&self) -> &SignalDatabase {
        &self.signal_db
    }

    /// Get statistics about the loaded signal database
    pub fn database_stats(&self) -> DatabaseStats {
        self.signal_db.stats()
    }

    /// Read every frame of a BusMaster log file
    ///
    /// Malformed lines are skipped with a warning.
    pub fn read_log(&self, path: &Path) -> Result<Vec<FrameRecord>> {
        let mut frames = BusmasterParser::parse(path)?;
        let records = frames.by_ref().collect::<Result<Vec<_>>>()?;

        log::info!(
            "Read {} frames from {:?} ({} lines skipped)",
            records.len(),
            path,
            frames.skipped_lines()
        );
        Ok(records)
    }

    /// Decode frame records already in memory
    pub fn decode_frames(&self, records: &[FrameRecord], config: &DecoderConfig) -> Result<Dataset> {
        DatasetBuilder::new(&self.signal_db, config.clone()).build(records)
    }

    /// Read and decode a log file
    ///
    /// # Example
    /// ```no_run
    /// use busmaster_decoder::{Decoder, DecoderConfig};
    /// use std::path::Path;
    ///
    /// let mut decoder = Decoder::new();
    /// decoder.add_dbc(Path::new("powertrain.dbc")).unwrap();
    ///
    /// let dataset = decoder
    ///     .decode_file(Path::new("trace.log"), &DecoderConfig::new())
    ///     .unwrap();
    /// println!("{} rows x {} columns", dataset.rows.len(), dataset.columns.len());
    /// ```
    pub fn decode_file(&self, path: &Path, config: &DecoderConfig) -> Result<Dataset> {
        log::info!("Decoding log file: {:?}", path);
        let records = self.read_log(path)?;
        self.decode_frames(&records, config)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

// Re-export DatabaseStats for public API
pub use crate::signals::DatabaseStats;

/// Convenience for callers that already hold a parser type
pub fn read_frames<P: LogFileParser>(path: &Path) -> Result<Vec<FrameRecord>> {
    P::parse(path)?.collect()
}
