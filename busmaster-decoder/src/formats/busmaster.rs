//! BusMaster text log parser
//!
//! Parses the `.log` files written by the BusMaster CAN analyser. A frame
//! line looks like:
//!
//! ```text
//! 09:25:06:1260 Rx 1 0x136 x 8 13 24 C2 A1 00 00 90 FF
//! <time>        <dir> <ch> <id> <type> <dlc> <data bytes...>
//! ```
//!
//! Header lines (`***BUSMASTER Ver ...***`, `***PROTOCOL CAN***`, ...) and
//! blank lines are skipped. Any other line that doesn't have this shape is
//! skipped with a warning, or returned as an error in strict mode.

use crate::formats::{read_text, LogFileParser};
use crate::types::{DecoderError, Direction, FrameRecord, Result, MAX_PAYLOAD_LEN};
use std::path::Path;

const HEADER_MARKER: &str = "***";

/// BusMaster log parser
pub struct BusmasterParser;

impl BusmasterParser {
    /// Read a BusMaster log file and return an iterator over its frames
    pub fn parse(path: &Path) -> Result<BusmasterFrameIterator> {
        log::info!("Parsing log file: {:?}", path);

        if !path.exists() {
            return Err(DecoderError::LogParseError(format!(
                "Log file not found: {:?}",
                path
            )));
        }

        let content = read_text(path)?;
        Ok(BusmasterFrameIterator::new(content))
    }

    /// Iterate over the frames of in-memory log text
    pub fn from_text(content: impl Into<String>) -> BusmasterFrameIterator {
        BusmasterFrameIterator::new(content.into())
    }

    /// Parse a single line
    ///
    /// Returns `Ok(None)` for blank and header lines.
    pub fn parse_line(line: &str) -> Result<Option<FrameRecord>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(HEADER_MARKER) {
            return Ok(None);
        }

        let malformed = |what: &str| DecoderError::LogParseError(what.to_string());
        let mut tokens = line.split_whitespace();

        let timestamp = tokens.next().ok_or_else(|| malformed("missing timestamp"))?;
        if !is_busmaster_time(timestamp) {
            return Err(malformed("bad timestamp"));
        }

        let direction = tokens
            .next()
            .and_then(Direction::from_token)
            .ok_or_else(|| malformed("expected Tx or Rx"))?;

        let channel: u8 = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| malformed("bad channel"))?;

        let can_id = tokens
            .next()
            .and_then(|t| t.strip_prefix("0x"))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .ok_or_else(|| malformed("bad CAN ID"))?;

        let frame_type = tokens.next().ok_or_else(|| malformed("missing frame type"))?;
        if frame_type.chars().count() != 1 {
            return Err(malformed("bad frame type"));
        }

        let dlc: u8 = tokens
            .next()
            .filter(|t| t.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| malformed("bad DLC"))?;

        let mut payload = Vec::with_capacity(MAX_PAYLOAD_LEN);
        for token in tokens {
            match hex_bytes(token) {
                Some(bytes) => payload.extend(bytes),
                None => break,
            }
        }

        let record = FrameRecord::new(timestamp, direction, channel, can_id, dlc, payload)?;
        let record = match frame_type {
            "x" | "X" => record.with_extended(true),
            "s" | "S" => record.with_extended(false),
            _ => record,
        };

        Ok(Some(record))
    }
}

/// `HH:MM:SS:fff` or `HH:MM:SS:ffff`
fn is_busmaster_time(token: &str) -> bool {
    let parts: Vec<&str> = token.split(':').collect();
    if parts.len() != 4 {
        return false;
    }
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    parts[..3].iter().all(|p| p.len() == 2 && digits(p))
        && (3..=4).contains(&parts[3].len())
        && digits(parts[3])
}

/// Bytes of a run of hex digit pairs, `None` if the token isn't one
fn hex_bytes(token: &str) -> Option<Vec<u8>> {
    if token.is_empty() || token.len() % 2 != 0 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..token.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&token[i..i + 2], 16).ok())
        .collect()
}

/// Iterator over the frames of a BusMaster log
pub struct BusmasterFrameIterator {
    content: String,
    position: usize,
    line_num: usize,
    strict: bool,
    frames: usize,
    skipped_lines: usize,
}

impl BusmasterFrameIterator {
    fn new(content: String) -> Self {
        Self {
            content,
            position: 0,
            line_num: 0,
            strict: false,
            frames: 0,
            skipped_lines: 0,
        }
    }

    /// Builder method: report malformed lines as errors instead of skipping them
    pub fn strict(mut self, enabled: bool) -> Self {
        self.strict = enabled;
        self
    }

    /// Frames produced so far
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Malformed lines skipped so far
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    fn next_line(&mut self) -> Option<(usize, &str)> {
        if self.position >= self.content.len() {
            return None;
        }
        let rest = &self.content[self.position..];
        let end = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
        self.position += end;
        self.line_num += 1;
        Some((self.line_num, &rest[..end]))
    }
}

impl Iterator for BusmasterFrameIterator {
    type Item = Result<FrameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let strict = self.strict;
            let (line_num, line) = self.next_line()?;

            match BusmasterParser::parse_line(line) {
                Ok(Some(record)) => {
                    if record.has_length_mismatch() {
                        log::debug!(
                            "DLC mismatch at line {}: expected {}, got {}",
                            line_num,
                            record.declared_length,
                            record.payload.len()
                        );
                    }
                    self.frames += 1;
                    return Some(Ok(record));
                }
                Ok(None) => continue,
                Err(e) => {
                    let message = format!("line {}: {}: {}", line_num, e, line.trim());
                    if strict {
                        return Some(Err(DecoderError::LogParseError(message)));
                    }
                    log::warn!("Could not parse {}", message);
                    self.skipped_lines += 1;
                }
            }
        }
    }
}

impl LogFileParser for BusmasterFrameIterator {
    fn parse(path: &Path) -> Result<Self> {
        BusmasterParser::parse(path)
    }
}
