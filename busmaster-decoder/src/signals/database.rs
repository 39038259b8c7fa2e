//! Unified signal database
//!
//! Combines message definitions from one or more DBC files into a single
//! table keyed by CAN ID.

use crate::bitfield;
use crate::types::{DecoderError, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    /// Two's-complement signed integer
    Signed,
    /// Unsigned integer
    Unsigned,
}

impl ValueType {
    pub fn is_signed(&self) -> bool {
        matches!(self, ValueType::Signed)
    }
}

/// A CAN signal definition
///
/// Built through [`SignalDefinition::new`], which checks that the bit range
/// fits the 64-bit payload window for the chosen byte order. A value of this
/// type therefore always describes an extractable bit-field.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    name: String,
    start_bit: u16,
    bit_size: u16,
    byte_order: ByteOrder,
    value_type: ValueType,
    factor: f64,
    offset: f64,
    min: f64,
    max: f64,
    unit: String,
}

impl SignalDefinition {
    /// Create a signal with identity scaling (factor 1, offset 0)
    ///
    /// # Errors
    /// `InvalidSignalDefinition` if `bit_size` is outside 1..=64 or the
    /// field would reach outside the 8-byte payload window.
    pub fn new(
        name: impl Into<String>,
        start_bit: u16,
        bit_size: u16,
        byte_order: ByteOrder,
        value_type: ValueType,
    ) -> Result<Self> {
        let name = name.into();

        bitfield::effective_start_bit(start_bit as u32, bit_size as u32, byte_order).map_err(
            |e| {
                DecoderError::InvalidSignalDefinition(format!(
                    "signal '{}' ({}|{}@{:?}): {}",
                    name, start_bit, bit_size, byte_order, e
                ))
            },
        )?;

        Ok(Self {
            name,
            start_bit,
            bit_size,
            byte_order,
            value_type,
            factor: 1.0,
            offset: 0.0,
            min: 0.0,
            max: 0.0,
            unit: String::new(),
        })
    }

    /// Builder method: physical = raw * factor + offset
    pub fn with_scaling(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    /// Builder method: informational physical range
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Builder method: engineering unit (e.g. "km/h", "V")
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start bit in the convention of `byte_order`
    pub fn start_bit(&self) -> u16 {
        self.start_bit
    }

    /// Length in bits (1..=64)
    pub fn bit_size(&self) -> u16 {
        self.bit_size
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_signed(&self) -> bool {
        self.value_type.is_signed()
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Engineering unit, empty when the DBC gives none
    pub fn unit(&self) -> &str {
        &self.unit
    }
}

/// A complete CAN message definition
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    /// CAN message ID
    pub can_id: u32,
    /// Message name
    pub name: String,
    /// Message size in bytes as declared in the DBC (informational)
    pub declared_length: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    /// Source file (DBC filename)
    pub source: String,
    signals: Vec<SignalDefinition>,
}

impl MessageDefinition {
    pub fn new(can_id: u32, name: impl Into<String>, declared_length: usize) -> Self {
        Self {
            can_id,
            name: name.into(),
            declared_length,
            sender: None,
            source: String::new(),
            signals: Vec::new(),
        }
    }

    /// Builder method: set the transmitting node
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Builder method: record which file the definition came from
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Builder method: add a signal (see [`MessageDefinition::add_signal`])
    pub fn with_signal(mut self, signal: SignalDefinition) -> Self {
        self.add_signal(signal);
        self
    }

    /// Add a signal, replacing any earlier signal with the same name
    ///
    /// Returns the replaced signal, if any.
    pub fn add_signal(&mut self, signal: SignalDefinition) -> Option<SignalDefinition> {
        if let Some(existing) = self.signals.iter_mut().find(|s| s.name == signal.name) {
            log::warn!(
                "Message '{}' (0x{:X}) defines signal '{}' twice, keeping the last definition",
                self.name,
                self.can_id,
                signal.name
            );
            return Some(std::mem::replace(existing, signal));
        }
        self.signals.push(signal);
        None
    }

    /// All signals, in definition order
    pub fn signals(&self) -> &[SignalDefinition] {
        &self.signals
    }

    /// Look up a signal by name
    pub fn signal(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// Signal database: the `can_id -> MessageDefinition` table used for decoding
#[derive(Debug, Clone, Default)]
pub struct SignalDatabase {
    messages: HashMap<u32, MessageDefinition>,
}

impl SignalDatabase {
    /// Create a new empty signal database
    pub fn new() -> Self {
        Self {
            messages: HashMap::new(),
        }
    }

    /// Add a message definition to the database
    ///
    /// A message with an already known CAN ID replaces the previous one, so a
    /// later DBC file wins over an earlier one. Returns the replaced message.
    pub fn add_message(&mut self, message: MessageDefinition) -> Option<MessageDefinition> {
        let can_id = message.can_id;
        let replaced = self.messages.insert(can_id, message);

        if let Some(ref old) = replaced {
            log::warn!(
                "CAN ID 0x{:X} redefined: '{}' from {} replaces '{}' from {}",
                can_id,
                self.messages[&can_id].name,
                self.messages[&can_id].source,
                old.name,
                old.source
            );
        }

        replaced
    }

    /// Get the message definition for a CAN ID
    pub fn get_message(&self, can_id: u32) -> Option<&MessageDefinition> {
        self.messages.get(&can_id)
    }

    /// Iterate over all message definitions (unordered)
    pub fn messages(&self) -> impl Iterator<Item = &MessageDefinition> {
        self.messages.values()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Sorted, de-duplicated names of every signal in every message
    ///
    /// This is the column set of a decoded dataset.
    pub fn signal_names(&self) -> Vec<String> {
        self.messages
            .values()
            .flat_map(|msg| msg.signals.iter())
            .map(|sig| sig.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Get database statistics
    pub fn stats(&self) -> DatabaseStats {
        let num_signals = self.messages.values().map(|msg| msg.signals.len()).sum();

        DatabaseStats {
            num_messages: self.messages.len(),
            num_signals,
        }
    }

    /// Get all CAN IDs in the database, sorted
    pub fn get_all_can_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.messages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
}
