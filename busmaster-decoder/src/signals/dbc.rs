//! DBC file parser
//!
//! Parses Vector DBC files into our internal message definitions. The
//! `can-dbc` grammar is tried first; files it rejects (partial exports,
//! vendor extensions) go through a lenient line scanner that only looks at
//! `BO_` and `SG_` lines.
//!
//! Multiplexed signals (`m<n>`) are skipped: without multiplexer handling
//! they would decode garbage for every inactive mux value. The multiplexor
//! switch itself (`M`) is an ordinary bit-field and is kept.

use crate::signals::database::{ByteOrder, MessageDefinition, SignalDefinition, ValueType};
use crate::types::{DecoderError, Result};
use std::path::Path;

/// Bit 31 of a DBC message ID flags an extended frame
const EXTENDED_ID_FLAG: u32 = 0x8000_0000;
const CAN_ID_MASK: u32 = 0x1FFF_FFFF;

/// Parse a DBC file and return message definitions
pub fn parse_dbc_file(path: &Path) -> Result<Vec<MessageDefinition>> {
    log::info!("Parsing DBC file: {:?}", path);

    let content = crate::formats::read_text(path).map_err(|e| {
        DecoderError::DbcParseError(format!("Failed to read file {:?}: {}", path, e))
    })?;

    let source_filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.dbc")
        .to_string();

    let messages = parse_dbc_str(&content, &source_filename)?;

    log::info!("Parsed {} messages from {:?}", messages.len(), path);

    Ok(messages)
}

/// Parse DBC text; `source` names the origin in logs and definitions
pub fn parse_dbc_str(content: &str, source: &str) -> Result<Vec<MessageDefinition>> {
    match can_dbc::DBC::from_slice(content.as_bytes()) {
        Ok(dbc) => Ok(dbc
            .messages()
            .iter()
            .map(|dbc_msg| convert_message(dbc_msg, source))
            .collect()),
        Err(e) => {
            log::warn!(
                "{}: strict DBC grammar failed ({}), falling back to line scanner",
                source,
                summarize_error(&format!("{:?}", e))
            );
            let messages = scan_dbc_lines(content, source);
            if messages.is_empty() && content.contains("BO_") {
                return Err(DecoderError::DbcParseError(format!(
                    "{}: no message definition could be read",
                    source
                )));
            }
            Ok(messages)
        }
    }
}

/// Keep grammar errors readable; `can-dbc` embeds the partial parse in them
fn summarize_error(debug: &str) -> String {
    const LIMIT: usize = 120;
    match debug.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &debug[..cut]),
        None => debug.to_string(),
    }
}

fn normalize_can_id(raw_id: u32) -> u32 {
    if raw_id & EXTENDED_ID_FLAG != 0 {
        raw_id & CAN_ID_MASK
    } else {
        raw_id
    }
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(dbc_msg: &can_dbc::Message, source: &str) -> MessageDefinition {
    let mut message = MessageDefinition::new(
        normalize_can_id(dbc_msg.message_id().0),
        dbc_msg.message_name().to_string(),
        *dbc_msg.message_size() as usize,
    )
    .with_source(source);

    if let can_dbc::Transmitter::NodeName(name) = dbc_msg.transmitter() {
        message = message.with_sender(name.to_string());
    }

    for dbc_sig in dbc_msg.signals() {
        if !matches!(
            dbc_sig.multiplexer_indicator(),
            can_dbc::MultiplexIndicator::Plain | can_dbc::MultiplexIndicator::Multiplexor
        ) {
            log::info!(
                "Skipping multiplexed signal '{}' in message '{}'",
                dbc_sig.name(),
                message.name
            );
            continue;
        }

        match convert_signal(dbc_sig) {
            Ok(signal) => {
                message.add_signal(signal);
            }
            Err(e) => log::warn!("{}: {} rejected: {}", source, message.name, e),
        }
    }

    message
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(dbc_sig: &can_dbc::Signal) -> Result<SignalDefinition> {
    let byte_order = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    let value_type = match *dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    let start_bit = u16::try_from(*dbc_sig.start_bit()).map_err(|_| {
        DecoderError::InvalidSignalDefinition(format!(
            "signal '{}' start bit {} out of range",
            dbc_sig.name(),
            dbc_sig.start_bit()
        ))
    })?;
    let bit_size = u16::try_from(*dbc_sig.signal_size()).map_err(|_| {
        DecoderError::InvalidSignalDefinition(format!(
            "signal '{}' size {} out of range",
            dbc_sig.name(),
            dbc_sig.signal_size()
        ))
    })?;

    Ok(
        SignalDefinition::new(dbc_sig.name().to_string(), start_bit, bit_size, byte_order, value_type)?
            .with_scaling(*dbc_sig.factor(), *dbc_sig.offset())
            .with_range(*dbc_sig.min(), *dbc_sig.max())
            .with_unit(dbc_sig.unit().to_string()),
    )
}

/// Lenient scan of `BO_` / `SG_` lines
///
/// `SG_` lines before the first `BO_` are ignored, as are lines that don't
/// have the signal layout shape.
fn scan_dbc_lines(content: &str, source: &str) -> Vec<MessageDefinition> {
    let mut messages: Vec<MessageDefinition> = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        let line = line.trim();
        let line_num = line_idx + 1;

        let keyword = line.split_whitespace().next();
        match keyword {
            Some("BO_") => match scan_message_line(line) {
                Some(message) => messages.push(message.with_source(source)),
                None => log::warn!("{}:{}: unreadable BO_ line", source, line_num),
            },
            Some("SG_") => {
                let Some(current) = messages.last_mut() else {
                    continue;
                };
                match scan_signal_line(line) {
                    Ok(Some(signal)) => {
                        current.add_signal(signal);
                    }
                    Ok(None) => log::debug!("{}:{}: skipping multiplexed signal", source, line_num),
                    Err(e) => log::warn!("{}:{}: {}", source, line_num, e),
                }
            }
            _ => {}
        }
    }

    messages
}

/// `BO_ <id> <name>: <dlc> <sender>`
fn scan_message_line(line: &str) -> Option<MessageDefinition> {
    let body = line.strip_prefix("BO_")?;
    let (head, tail) = body.split_once(':')?;

    let mut head = head.split_whitespace();
    let raw_id: u32 = head.next()?.parse().ok()?;
    let name = head.next()?;
    if head.next().is_some() {
        return None;
    }

    let mut tail = tail.split_whitespace();
    let dlc: usize = tail.next()?.parse().ok()?;

    let mut message = MessageDefinition::new(normalize_can_id(raw_id), name, dlc);
    if let Some(sender) = tail.next() {
        message = message.with_sender(sender);
    }
    Some(message)
}

/// `SG_ <name> [M|m<n>] : <start>|<size>@<0|1><+|-> (<factor>,<offset>) [<min>|<max>] "<unit>" <receivers>`
///
/// Returns `Ok(None)` for multiplexed signals.
fn scan_signal_line(line: &str) -> Result<Option<SignalDefinition>> {
    let malformed =
        |what: &str| DecoderError::DbcParseError(format!("malformed SG_ line ({}): {}", what, line));

    let body = line.strip_prefix("SG_").ok_or_else(|| malformed("keyword"))?;
    let (head, rest) = body.split_once(':').ok_or_else(|| malformed("missing ':'"))?;

    let mut head = head.split_whitespace();
    let name = head.next().ok_or_else(|| malformed("name"))?;
    if let Some(mux) = head.next() {
        if mux != "M" {
            return Ok(None);
        }
    }

    // Layout: <start>|<size>@<order><sign>
    let (layout, rest) = rest.split_once('(').ok_or_else(|| malformed("scaling"))?;
    let layout = layout.trim();
    let (start, layout) = layout.split_once('|').ok_or_else(|| malformed("layout"))?;
    let (size, flags) = layout.split_once('@').ok_or_else(|| malformed("layout"))?;
    let start_bit: u16 = start.trim().parse().map_err(|_| malformed("start bit"))?;
    let bit_size: u16 = size.trim().parse().map_err(|_| malformed("size"))?;

    let mut flags = flags.trim().chars();
    let byte_order = match flags.next() {
        Some('1') => ByteOrder::LittleEndian,
        Some('0') => ByteOrder::BigEndian,
        _ => return Err(malformed("byte order")),
    };
    let value_type = match flags.next() {
        Some('-') => ValueType::Signed,
        Some('+') => ValueType::Unsigned,
        _ => return Err(malformed("sign")),
    };

    let (scaling, rest) = rest.split_once(')').ok_or_else(|| malformed("scaling"))?;
    let (factor, offset) = scaling.split_once(',').ok_or_else(|| malformed("scaling"))?;

    let (_, rest) = rest.split_once('[').ok_or_else(|| malformed("range"))?;
    let (range, rest) = rest.split_once(']').ok_or_else(|| malformed("range"))?;
    let (min, max) = range.split_once('|').ok_or_else(|| malformed("range"))?;

    let unit = rest
        .split_once('"')
        .and_then(|(_, after)| after.split_once('"'))
        .map(|(unit, _)| unit)
        .unwrap_or("");

    let (factor, offset, min, max) = scaling_or_identity([factor, offset, min, max]);

    Ok(Some(
        SignalDefinition::new(name, start_bit, bit_size, byte_order, value_type)?
            .with_scaling(factor, offset)
            .with_range(min, max)
            .with_unit(unit),
    ))
}

/// Malformed numeric signal attribute defaults to identity scale
///
/// Empty fields take their own default (factor 1, everything else 0). If any
/// non-empty field fails to parse, all four fall back to `(1, 0, 0, 0)`.
fn scaling_or_identity(fields: [&str; 4]) -> (f64, f64, f64, f64) {
    const DEFAULTS: [f64; 4] = [1.0, 0.0, 0.0, 0.0];

    let mut values = DEFAULTS;
    for (i, field) in fields.iter().enumerate() {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        match field.parse::<f64>() {
            Ok(v) => values[i] = v,
            Err(_) => {
                log::warn!("Malformed numeric signal attribute '{}', using identity scale", field);
                values = DEFAULTS;
                break;
            }
        }
    }

    (values[0], values[1], values[2], values[3])
}
