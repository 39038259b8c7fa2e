//! Message Decoding Engine
//!
//! Applies a message definition to a matching frame record and collects the
//! physical value of every signal that could be decoded. Frame-level
//! anomalies (DLC disagreements, signals that fail to extract) are returned
//! as warnings next to the values; none of them stops decoding.

use crate::bitfield;
use crate::signals::database::{MessageDefinition, SignalDatabase};
use crate::types::FrameRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Non-fatal condition found while decoding one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeWarning {
    /// DLC column of the log differs from the number of data bytes
    LengthMismatch { declared: usize, actual: usize },
    /// DLC column of the log differs from the DBC message size
    DefinitionLengthMismatch { frame: usize, definition: usize },
    /// A signal could not be extracted from the payload
    SignalFailed { signal: String, reason: String },
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeWarning::LengthMismatch { declared, actual } => {
                write!(f, "DLC mismatch: expected {}, got {} data bytes", declared, actual)
            }
            DecodeWarning::DefinitionLengthMismatch { frame, definition } => {
                write!(f, "DLC {} differs from DBC message size {}", frame, definition)
            }
            DecodeWarning::SignalFailed { signal, reason } => {
                write!(f, "signal '{}' not decoded: {}", signal, reason)
            }
        }
    }
}

/// Result of decoding one frame record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFrame {
    /// Name of the matched message, `None` if the CAN ID is unknown
    pub message_name: Option<String>,
    /// Physical value of every decoded signal, keyed by signal name
    pub values: BTreeMap<String, f64>,
    /// Anomalies found along the way
    pub warnings: Vec<DecodeWarning>,
}

impl DecodedFrame {
    /// True if the frame's CAN ID matched a message definition
    pub fn is_matched(&self) -> bool {
        self.message_name.is_some()
    }

    /// True if no signal value was produced
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn signal_count(&self) -> usize {
        self.values.len()
    }
}

/// Message decoder - extracts signals from frame records
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode a frame record against the database
    ///
    /// An unknown CAN ID yields an unmatched [`DecodedFrame`] with no
    /// values; a DLC mismatch is still reported for it.
    pub fn decode_frame(record: &FrameRecord, definitions: &SignalDatabase) -> DecodedFrame {
        match definitions.get_message(record.can_id) {
            Some(message_def) => Self::decode_message(record, message_def),
            None => {
                log::trace!("Unknown CAN ID: 0x{:X}, no signals decoded", record.can_id);
                DecodedFrame {
                    warnings: Self::length_warning(record).into_iter().collect(),
                    ..DecodedFrame::default()
                }
            }
        }
    }

    fn length_warning(record: &FrameRecord) -> Option<DecodeWarning> {
        record.has_length_mismatch().then(|| DecodeWarning::LengthMismatch {
            declared: record.declared_length as usize,
            actual: record.payload.len(),
        })
    }

    /// Decode a frame record with a known message definition
    ///
    /// The CAN ID of `record` is not checked against `message_def`.
    pub fn decode_message(record: &FrameRecord, message_def: &MessageDefinition) -> DecodedFrame {
        let mut decoded = DecodedFrame {
            message_name: Some(message_def.name.clone()),
            ..DecodedFrame::default()
        };

        decoded.warnings.extend(Self::length_warning(record));

        let declared = record.declared_length as usize;
        if declared != message_def.declared_length {
            decoded.warnings.push(DecodeWarning::DefinitionLengthMismatch {
                frame: declared,
                definition: message_def.declared_length,
            });
        }

        for signal in message_def.signals() {
            match bitfield::try_decode(&record.payload, signal) {
                Ok(Some(value)) => {
                    decoded.values.insert(signal.name().to_string(), value);
                }
                Ok(None) => {}
                Err(e) => decoded.warnings.push(DecodeWarning::SignalFailed {
                    signal: signal.name().to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        log::debug!(
            "Decoded message: {} (ID 0x{:X}), {} of {} signals",
            message_def.name,
            record.can_id,
            decoded.values.len(),
            message_def.signals().len()
        );

        decoded
    }
}
