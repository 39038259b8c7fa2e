//! Dataset builder
//!
//! Folds an ordered sequence of frame records through the message decoder
//! into a sparse table: one row per frame, one column per known signal.
//! A signal that a row's frame did not carry stays absent rather than
//! becoming zero, so "not observed" and "observed 0" remain distinct.

use crate::config::DecoderConfig;
use crate::message_decoder::{DecodeWarning, DecodedFrame, MessageDecoder};
use crate::signals::SignalDatabase;
use crate::types::{DecoderError, FrameRecord, Result, Timestamp};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// One output row: the frame's timestamp and the signals it carried
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub timestamp: Timestamp,
    pub values: BTreeMap<String, f64>,
}

impl Row {
    /// Value of a signal in this row, `None` if the frame didn't carry it
    pub fn get(&self, signal: &str) -> Option<f64> {
        self.values.get(signal).copied()
    }

    /// Cells of this row in the given column order
    pub fn cells<'a>(&'a self, columns: &'a [String]) -> impl Iterator<Item = Option<f64>> + 'a {
        columns.iter().map(move |column| self.get(column))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A non-fatal condition tied to the frame it was found in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameDiagnostic {
    /// Position of the frame in the input sequence (0-based)
    pub index: usize,
    pub timestamp: Timestamp,
    pub can_id: u32,
    pub warning: DecodeWarning,
}

/// Counters and warnings collected while building a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Frame records handed to the builder
    pub frames: usize,
    /// Frames excluded by the channel/message filters
    pub filtered: usize,
    /// Frames whose CAN ID matched a message definition
    pub decoded_frames: usize,
    /// Total signal values produced
    pub signals_decoded: usize,
    /// Rows dropped because they carried no value (see `emit_empty_rows`)
    pub empty_rows_skipped: usize,
    /// Frame count per CAN ID without a message definition
    pub unknown_ids: BTreeMap<u32, usize>,
    pub length_mismatches: usize,
    pub definition_length_mismatches: usize,
    pub signal_failures: usize,
    /// Every warning, in input order
    pub warnings: Vec<FrameDiagnostic>,
}

impl Diagnostics {
    /// Number of frames whose CAN ID had no message definition
    pub fn unknown_frames(&self) -> usize {
        self.unknown_ids.values().sum()
    }

    fn record(&mut self, index: usize, record: &FrameRecord, decoded: &DecodedFrame) {
        if decoded.is_matched() {
            self.decoded_frames += 1;
        } else {
            *self.unknown_ids.entry(record.can_id).or_insert(0) += 1;
        }
        self.signals_decoded += decoded.signal_count();

        for warning in &decoded.warnings {
            match warning {
                DecodeWarning::LengthMismatch { .. } => self.length_mismatches += 1,
                DecodeWarning::DefinitionLengthMismatch { .. } => {
                    self.definition_length_mismatches += 1
                }
                DecodeWarning::SignalFailed { .. } => self.signal_failures += 1,
            }

            log::warn!(
                "Frame {} at {} (ID 0x{:X}): {}",
                index + 1,
                record.timestamp,
                record.can_id,
                warning
            );

            self.warnings.push(FrameDiagnostic {
                index,
                timestamp: record.timestamp.clone(),
                can_id: record.can_id,
                warning: warning.clone(),
            });
        }
    }
}

/// Decoded table ready for export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    /// Sorted signal names; the export column order
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub diagnostics: Diagnostics,
}

/// Builds a [`Dataset`] from frame records and a signal database
pub struct DatasetBuilder<'a> {
    database: &'a SignalDatabase,
    config: DecoderConfig,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(database: &'a SignalDatabase, config: DecoderConfig) -> Self {
        Self { database, config }
    }

    /// Column set: the sorted union of all signal names in the database
    pub fn columns(&self) -> Vec<String> {
        self.database.signal_names()
    }

    /// Decode every record and assemble rows in input order
    ///
    /// # Errors
    /// `EmptyDatabase` if no message is defined, `NoFrames` if `records` is
    /// empty. Nothing that happens to an individual frame is an error.
    pub fn build(&self, records: &[FrameRecord]) -> Result<Dataset> {
        if self.database.is_empty() {
            return Err(DecoderError::EmptyDatabase);
        }
        if records.is_empty() {
            return Err(DecoderError::NoFrames);
        }

        let selected: Vec<(usize, &FrameRecord)> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                self.config
                    .should_process_frame(record.channel, record.can_id)
            })
            .collect();

        let database = self.database;
        // Indexed collect keeps input order whichever way the work is split
        let decoded: Vec<DecodedFrame> = if self.config.parallel {
            selected
                .par_iter()
                .map(|(_, record)| MessageDecoder::decode_frame(record, database))
                .collect()
        } else {
            selected
                .iter()
                .map(|(_, record)| MessageDecoder::decode_frame(record, database))
                .collect()
        };

        let mut diagnostics = Diagnostics {
            frames: records.len(),
            filtered: records.len() - selected.len(),
            ..Diagnostics::default()
        };
        let mut rows = Vec::with_capacity(decoded.len());

        for ((index, record), frame) in selected.into_iter().zip(decoded) {
            diagnostics.record(index, record, &frame);

            if frame.is_empty() && !self.config.emit_empty_rows {
                diagnostics.empty_rows_skipped += 1;
                continue;
            }

            rows.push(Row {
                timestamp: record.timestamp.clone(),
                values: frame.values,
            });
        }

        log::info!(
            "Built {} rows from {} frames ({} decoded, {} unknown, {} filtered, {} warnings)",
            rows.len(),
            diagnostics.frames,
            diagnostics.decoded_frames,
            diagnostics.unknown_frames(),
            diagnostics.filtered,
            diagnostics.warnings.len()
        );

        Ok(Dataset {
            columns: self.columns(),
            rows,
            diagnostics,
        })
    }
}
