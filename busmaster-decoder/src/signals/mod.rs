//! Signal database and DBC parser
//!
//! This module contains the parser for signal definition files (DBC)
//! and the signal database the decoder reads from.

pub mod dbc;
pub mod database;

// Re-export key types for convenience
pub use database::{
    ByteOrder, DatabaseStats, MessageDefinition, SignalDatabase, SignalDefinition, ValueType,
};
