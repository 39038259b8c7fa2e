//! Core types for the BusMaster log decoder library
//!
//! This module defines the fundamental values the decoder consumes and emits:
//! frame records read from a log, raw bit-field values, and the error type.
//! Nothing here is mutated after construction.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Largest payload of a classic CAN frame, in bytes
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Errors that can occur while loading definitions or decoding
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Failed to parse log file: {0}")]
    LogParseError(String),

    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("Invalid signal definition: {0}")]
    InvalidSignalDefinition(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("No message definitions loaded")]
    EmptyDatabase,

    #[error("No CAN frames to decode")]
    NoFrames,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Timestamp token of a frame record, kept exactly as it appeared in the log
///
/// The decoder never interprets it numerically; ordering is plain string
/// ordering, which matches time order for the fixed-width BusMaster format.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Best-effort reading of a BusMaster `HH:MM:SS:ffff` timestamp
    ///
    /// The last field is a decimal fraction of a second (3 or 4 digits in
    /// practice). Returns `None` for anything that doesn't have that shape.
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        let mut parts = self.0.split(':');
        let hours: u32 = parts.next()?.parse().ok()?;
        let minutes: u32 = parts.next()?.parse().ok()?;
        let seconds: u32 = parts.next()?.parse().ok()?;
        let fraction = parts.next()?;
        if parts.next().is_some()
            || fraction.is_empty()
            || fraction.len() > 9
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let nanos: u32 = format!("{:0<9}", fraction).parse().ok()?;
        NaiveTime::from_hms_nano_opt(hours, minutes, seconds, nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Timestamp {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// Direction of a logged frame, as seen by the logging node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Tx,
    Rx,
}

impl Direction {
    /// Parse the `Tx` / `Rx` column of a log line
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "Tx" => Some(Direction::Tx),
            "Rx" => Some(Direction::Rx),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => write!(f, "Tx"),
            Direction::Rx => write!(f, "Rx"),
        }
    }
}

/// One observed CAN frame from a log file
///
/// This represents a single frame as read from the log, before any signal
/// decoding. `declared_length` is the DLC column of the log and may disagree
/// with `payload.len()`; the decoder reports that but never rejects it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    /// Timestamp token, verbatim from the log
    pub timestamp: Timestamp,
    /// Tx or Rx
    pub direction: Direction,
    /// CAN channel number as logged (BusMaster counts from 1)
    pub channel: u8,
    /// CAN message ID (11-bit or 29-bit)
    pub can_id: u32,
    /// True if the log marked the frame as extended (29-bit)
    pub is_extended: bool,
    /// DLC as written in the log
    pub declared_length: u8,
    /// Data bytes actually present in the log line (0-8)
    pub payload: Vec<u8>,
}

impl FrameRecord {
    /// Create a frame record, rejecting payloads longer than a classic CAN frame
    pub fn new(
        timestamp: impl Into<Timestamp>,
        direction: Direction,
        channel: u8,
        can_id: u32,
        declared_length: u8,
        payload: Vec<u8>,
    ) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(DecoderError::InvalidData(format!(
                "payload of {} bytes exceeds {} byte CAN frame",
                payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }

        Ok(Self {
            timestamp: timestamp.into(),
            direction,
            channel,
            can_id,
            is_extended: can_id > 0x7FF,
            declared_length,
            payload,
        })
    }

    /// Builder method: override the extended-ID flag
    pub fn with_extended(mut self, is_extended: bool) -> Self {
        self.is_extended = is_extended;
        self
    }

    /// True when the DLC column disagrees with the number of data bytes
    pub fn has_length_mismatch(&self) -> bool {
        self.declared_length as usize != self.payload.len()
    }
}

impl From<String> for Timestamp {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Integer value of a bit-field before scaling
///
/// Unsigned fields keep their full 64-bit range; signed fields are sign
/// extended from their own width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawValue {
    Unsigned(u64),
    Signed(i64),
}

impl RawValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            RawValue::Unsigned(v) => *v as f64,
            RawValue::Signed(v) => *v as f64,
        }
    }

    /// Widen to `i128`, which holds every value of both variants
    pub fn as_i128(&self) -> i128 {
        match self {
            RawValue::Unsigned(v) => *v as i128,
            RawValue::Signed(v) => *v as i128,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Unsigned(v) => write!(f, "{}", v),
            RawValue::Signed(v) => write!(f, "{}", v),
        }
    }
}
