//! Bitfield decoder
//!
//! Extracts one signal from a CAN payload. The payload is zero-padded to
//! 8 bytes and read as a single little-endian `u64`; both byte orders are
//! extracted from that word and differ only in how the signal's start bit
//! maps to the word's bit index.
//!
//! Everything here is a pure function of `(payload, signal)`.

use crate::signals::database::{ByteOrder, SignalDefinition};
use crate::types::{RawValue, MAX_PAYLOAD_LEN};
use byteorder::{ByteOrder as _, LittleEndian};

/// Width of the addressing window, in bits
pub const WINDOW_BITS: u32 = (MAX_PAYLOAD_LEN * 8) as u32;

/// Reasons a bit-field cannot be extracted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitfieldError {
    #[error("bit size {0} is outside 1..=64")]
    InvalidBitSize(u32),

    #[error("field starts at bit {0}, outside the 64-bit payload window")]
    StartOutOfRange(i64),

    #[error("field bits {start}..{end} reach past bit 63")]
    EndOutOfRange { start: u32, end: u32 },

    #[error("payload of {0} bytes exceeds the 8 byte CAN frame")]
    PayloadTooLong(usize),
}

/// Map a signal's start bit to the bit index of its least significant bit
/// in the little-endian payload word
///
/// - Intel: the start bit already is that index.
/// - Motorola: `byte * 8 + (7 - bit) - (bit_size - 1)` where
///   `byte = start_bit / 8` and `bit = start_bit % 8`.
///
/// Fails when the resulting field doesn't sit entirely inside bits 0..=63.
pub fn effective_start_bit(
    start_bit: u32,
    bit_size: u32,
    byte_order: ByteOrder,
) -> Result<u32, BitfieldError> {
    if bit_size == 0 || bit_size > WINDOW_BITS {
        return Err(BitfieldError::InvalidBitSize(bit_size));
    }

    let start = match byte_order {
        ByteOrder::LittleEndian => start_bit as i64,
        ByteOrder::BigEndian => {
            let byte_pos = (start_bit / 8) as i64;
            let bit_pos = (start_bit % 8) as i64;
            byte_pos * 8 + (7 - bit_pos) - (bit_size as i64 - 1)
        }
    };

    if !(0..WINDOW_BITS as i64).contains(&start) {
        return Err(BitfieldError::StartOutOfRange(start));
    }

    let start = start as u32;
    let end = start + bit_size;
    if end > WINDOW_BITS {
        return Err(BitfieldError::EndOutOfRange { start, end });
    }

    Ok(start)
}

/// Read up to 8 payload bytes as a little-endian word, zero-padding the rest
pub fn payload_word(payload: &[u8]) -> Result<u64, BitfieldError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(BitfieldError::PayloadTooLong(payload.len()));
    }

    let mut padded = [0u8; MAX_PAYLOAD_LEN];
    padded[..payload.len()].copy_from_slice(payload);
    Ok(LittleEndian::read_u64(&padded))
}

/// Extract the raw (unscaled) value of `signal` from `payload`
///
/// Bits beyond the end of a short payload read as zero.
pub fn extract_raw(payload: &[u8], signal: &SignalDefinition) -> Result<RawValue, BitfieldError> {
    let word = payload_word(payload)?;
    let bit_size = signal.bit_size() as u32;
    let start = effective_start_bit(signal.start_bit() as u32, bit_size, signal.byte_order())?;

    let bits = (word >> start) & mask(bit_size);

    if signal.is_signed() {
        Ok(RawValue::Signed(sign_extend(bits, bit_size)))
    } else {
        Ok(RawValue::Unsigned(bits))
    }
}

/// Decode a physical value, distinguishing "nothing to decode" from failure
///
/// - `Ok(None)` for an empty payload
/// - `Ok(Some(value))` with `value = raw * factor + offset`
/// - `Err(_)` when the bit-field cannot be extracted
pub fn try_decode(payload: &[u8], signal: &SignalDefinition) -> Result<Option<f64>, BitfieldError> {
    if payload.is_empty() {
        return Ok(None);
    }

    let raw = extract_raw(payload, signal)?;
    Ok(Some(to_physical(raw, signal)))
}

/// Decode a physical value, or `None` if it cannot be produced
///
/// Extraction failures are logged as warnings and never panic.
pub fn decode(payload: &[u8], signal: &SignalDefinition) -> Option<f64> {
    match try_decode(payload, signal) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Error decoding signal '{}': {}", signal.name(), e);
            None
        }
    }
}

/// Apply factor and offset
pub fn to_physical(raw: RawValue, signal: &SignalDefinition) -> f64 {
    raw.as_f64() * signal.factor() + signal.offset()
}

fn mask(bit_size: u32) -> u64 {
    if bit_size >= 64 {
        u64::MAX
    } else {
        (1u64 << bit_size) - 1
    }
}

/// Sign-extend a value from N bits to 64 bits
fn sign_extend(value: u64, bit_size: u32) -> i64 {
    if bit_size >= 64 {
        return value as i64;
    }

    let sign_bit = 1u64 << (bit_size - 1);
    if value & sign_bit != 0 {
        (value | (!0u64 << bit_size)) as i64
    } else {
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::database::ValueType;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    const SAMPLE: [u8; 8] = [0x13, 0x24, 0xC2, 0xA1, 0x00, 0x00, 0x90, 0xFF];

    fn intel(start: u16, size: u16, value_type: ValueType) -> SignalDefinition {
        SignalDefinition::new("Sig", start, size, ByteOrder::LittleEndian, value_type).unwrap()
    }

    fn motorola(start: u16, size: u16, value_type: ValueType) -> SignalDefinition {
        SignalDefinition::new("Sig", start, size, ByteOrder::BigEndian, value_type).unwrap()
    }

    /// Motorola start bit that lands on the same word bits as an Intel field
    fn motorola_start_for(intel_start: u32, size: u32) -> u16 {
        let top = intel_start + size - 1;
        ((top / 8) * 8 + (7 - top % 8)) as u16
    }

    /// Bit-by-bit reference extraction straight from the payload bytes
    fn reference_bits(payload: &[u8], start: u32, size: u32) -> u64 {
        let mut value = 0u64;
        for i in 0..size {
            let bit = start + i;
            let byte = payload.get((bit / 8) as usize).copied().unwrap_or(0);
            value |= (((byte >> (bit % 8)) & 1) as u64) << i;
        }
        value
    }

    /// Write a physical value into a payload the way a transmitter would
    fn encode(payload: &mut [u8; 8], signal: &SignalDefinition, value: f64) {
        let raw = ((value - signal.offset()) / signal.factor()).round() as i64;
        let size = signal.bit_size() as u32;
        let start = effective_start_bit(signal.start_bit() as u32, size, signal.byte_order()).unwrap();
        let mut word = u64::from_le_bytes(*payload);
        word &= !(mask(size) << start);
        word |= ((raw as u64) & mask(size)) << start;
        *payload = word.to_le_bytes();
    }

    #[test]
    fn test_payload_word_is_little_endian() {
        assert_eq!(payload_word(&SAMPLE).unwrap(), 0xFF90_0000_A1C2_2413);
        assert_eq!(payload_word(&[0x01]).unwrap(), 1);
        assert_eq!(payload_word(&[]).unwrap(), 0);
        assert_eq!(payload_word(&[0; 9]), Err(BitfieldError::PayloadTooLong(9)));
    }

    #[test]
    fn test_intel_bytes_of_sample_frame() {
        let byte0 = extract_raw(&SAMPLE, &intel(0, 8, ValueType::Unsigned)).unwrap();
        let byte1 = extract_raw(&SAMPLE, &intel(8, 8, ValueType::Unsigned)).unwrap();
        assert_eq!(byte0, RawValue::Unsigned(0x13));
        assert_eq!(byte1, RawValue::Unsigned(0x24));

        let word = extract_raw(&SAMPLE, &intel(0, 16, ValueType::Unsigned)).unwrap();
        assert_eq!(word, RawValue::Unsigned(0x2413));

        let nibble = extract_raw(&SAMPLE, &intel(4, 4, ValueType::Unsigned)).unwrap();
        assert_eq!(nibble, RawValue::Unsigned(0x1));
    }

    #[test]
    fn test_intel_cross_byte_field() {
        // bits 12..20: high nibble of 0x24 and low nibble of 0xC2
        let raw = extract_raw(&SAMPLE, &intel(12, 8, ValueType::Unsigned)).unwrap();
        assert_eq!(raw, RawValue::Unsigned(0x22));

        let wide = extract_raw(&SAMPLE, &intel(16, 32, ValueType::Unsigned)).unwrap();
        assert_eq!(wide, RawValue::Unsigned(0x0000_A1C2));
    }

    #[test]
    fn test_signed_fields_of_sample_frame() {
        let last = extract_raw(&SAMPLE, &intel(56, 8, ValueType::Signed)).unwrap();
        assert_eq!(last, RawValue::Signed(-1));

        // 0x90 = 0b1001_0000 -> -112
        let seventh = extract_raw(&SAMPLE, &intel(48, 8, ValueType::Signed)).unwrap();
        assert_eq!(seventh, RawValue::Signed(-112));

        // 0xFF90 as i16
        let top = extract_raw(&SAMPLE, &intel(48, 16, ValueType::Signed)).unwrap();
        assert_eq!(top, RawValue::Signed(-112));

        let positive = extract_raw(&SAMPLE, &intel(0, 8, ValueType::Signed)).unwrap();
        assert_eq!(positive, RawValue::Signed(0x13));
    }

    #[test]
    fn test_motorola_start_bit_mapping() {
        assert_eq!(effective_start_bit(0, 8, ByteOrder::BigEndian), Ok(0));
        assert_eq!(effective_start_bit(8, 8, ByteOrder::BigEndian), Ok(8));
        assert_eq!(effective_start_bit(7, 1, ByteOrder::BigEndian), Ok(0));
        assert_eq!(effective_start_bit(0, 1, ByteOrder::BigEndian), Ok(7));
        assert_eq!(effective_start_bit(8, 16, ByteOrder::BigEndian), Ok(0));
        assert_eq!(effective_start_bit(56, 64, ByteOrder::BigEndian), Ok(0));
        assert_eq!(
            effective_start_bit(0, 16, ByteOrder::BigEndian),
            Err(BitfieldError::StartOutOfRange(-8))
        );
    }

    #[test]
    fn test_motorola_fields_of_sample_frame() {
        let byte0 = extract_raw(&SAMPLE, &motorola(0, 8, ValueType::Unsigned)).unwrap();
        assert_eq!(byte0, RawValue::Unsigned(0x13));

        let word = extract_raw(&SAMPLE, &motorola(8, 16, ValueType::Unsigned)).unwrap();
        assert_eq!(word, RawValue::Unsigned(0x2413));

        // Motorola bit 0 is the top bit of byte 0 (0x13 -> 0)
        let msb = extract_raw(&SAMPLE, &motorola(0, 1, ValueType::Unsigned)).unwrap();
        assert_eq!(msb, RawValue::Unsigned(0));
        let lsb = extract_raw(&SAMPLE, &motorola(7, 1, ValueType::Unsigned)).unwrap();
        assert_eq!(lsb, RawValue::Unsigned(1));

        let signed = extract_raw(&SAMPLE, &motorola(56, 8, ValueType::Signed)).unwrap();
        assert_eq!(signed, RawValue::Signed(-1));
    }

    #[test]
    fn test_effective_start_bit_window_checks() {
        assert_eq!(
            effective_start_bit(0, 0, ByteOrder::LittleEndian),
            Err(BitfieldError::InvalidBitSize(0))
        );
        assert_eq!(
            effective_start_bit(0, 65, ByteOrder::LittleEndian),
            Err(BitfieldError::InvalidBitSize(65))
        );
        assert_eq!(
            effective_start_bit(64, 1, ByteOrder::LittleEndian),
            Err(BitfieldError::StartOutOfRange(64))
        );
        assert_eq!(
            effective_start_bit(60, 8, ByteOrder::LittleEndian),
            Err(BitfieldError::EndOutOfRange { start: 60, end: 68 })
        );
        assert_eq!(effective_start_bit(63, 1, ByteOrder::LittleEndian), Ok(63));
        assert_eq!(effective_start_bit(0, 64, ByteOrder::LittleEndian), Ok(0));
    }

    #[test]
    fn test_all_ones_unsigned_every_width() {
        let payload = [0xFF; 8];
        for size in 1..=64u32 {
            for start in [0u32, 64 - size] {
                let sig = intel(start as u16, size as u16, ValueType::Unsigned);
                let expected = if size == 64 { u64::MAX } else { (1u64 << size) - 1 };
                assert_eq!(
                    extract_raw(&payload, &sig).unwrap(),
                    RawValue::Unsigned(expected),
                    "size {} start {}",
                    size,
                    start
                );
            }
        }
    }

    #[test]
    fn test_signed_top_bit_is_negative_every_width() {
        for size in 1..=64u32 {
            let word = 1u64 << (size - 1);
            let payload = word.to_le_bytes();
            let sig = intel(0, size as u16, ValueType::Signed);

            let raw = extract_raw(&payload, &sig).unwrap();
            let expected = word as i128 - (1i128 << size);
            assert_eq!(raw.as_i128(), expected, "size {}", size);
            assert!(raw.as_f64() < 0.0);
        }
    }

    #[test]
    fn test_physical_scaling() {
        let temp = intel(0, 8, ValueType::Unsigned).with_scaling(0.5, -40.0);
        assert_abs_diff_eq!(decode(&SAMPLE, &temp).unwrap(), 19.0 * 0.5 - 40.0);

        let torque = intel(48, 16, ValueType::Signed).with_scaling(0.25, 0.0);
        assert_abs_diff_eq!(decode(&SAMPLE, &torque).unwrap(), -28.0);
    }

    #[test]
    fn test_empty_payload_is_absent() {
        let sig = intel(0, 8, ValueType::Unsigned);
        assert_eq!(try_decode(&[], &sig), Ok(None));
        assert_eq!(decode(&[], &sig), None);

        let be = motorola(56, 64, ValueType::Signed);
        assert_eq!(decode(&[], &be), None);
    }

    #[test]
    fn test_short_payload_is_zero_padded() {
        let short = [0xFF, 0xFF];
        let mut padded = [0u8; 8];
        padded[..2].copy_from_slice(&short);

        for (start, size) in [(8u16, 16u16), (16, 16), (0, 64), (15, 2)] {
            let sig = intel(start, size, ValueType::Unsigned);
            assert_eq!(
                extract_raw(&short, &sig).unwrap(),
                extract_raw(&padded, &sig).unwrap()
            );
        }

        assert_eq!(decode(&short, &intel(16, 16, ValueType::Unsigned)), Some(0.0));
        assert_eq!(decode(&short, &intel(8, 16, ValueType::Unsigned)), Some(255.0));
    }

    #[test]
    fn test_oversized_payload_is_absent() {
        let sig = intel(0, 8, ValueType::Unsigned);
        let payload = [0u8; 12];
        assert_eq!(
            try_decode(&payload, &sig),
            Err(BitfieldError::PayloadTooLong(12))
        );
        assert_eq!(decode(&payload, &sig), None);
    }

    #[test]
    fn test_round_trip_both_layouts() {
        let cases: [(u16, u16, ByteOrder, ValueType, f64, f64, f64); 6] = [
            (0, 16, ByteOrder::LittleEndian, ValueType::Unsigned, 0.1, 0.0, 1234.5),
            (12, 12, ByteOrder::LittleEndian, ValueType::Signed, 0.5, 0.0, -321.5),
            (40, 8, ByteOrder::LittleEndian, ValueType::Unsigned, 1.0, -40.0, 85.0),
            (8, 16, ByteOrder::BigEndian, ValueType::Unsigned, 0.01, 0.0, 600.25),
            (39, 10, ByteOrder::BigEndian, ValueType::Signed, 0.2, 100.0, 0.4),
            (56, 64, ByteOrder::BigEndian, ValueType::Signed, 1.0, 0.0, -1_000_000.0),
        ];

        for (start, size, order, value_type, factor, offset, value) in cases {
            let sig = SignalDefinition::new("Sig", start, size, order, value_type)
                .unwrap()
                .with_scaling(factor, offset);
            let mut payload = [0xA5u8; 8];
            encode(&mut payload, &sig, value);

            let decoded = decode(&payload, &sig).unwrap();
            assert_abs_diff_eq!(decoded, value, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_round_trip_leaves_neighbours_intact() {
        let a = intel(0, 12, ValueType::Unsigned).with_scaling(0.5, 0.0);
        let b = motorola(23, 4, ValueType::Signed);
        let mut payload = [0u8; 8];
        encode(&mut payload, &a, 1000.0);
        encode(&mut payload, &b, -3.0);

        assert_abs_diff_eq!(decode(&payload, &a).unwrap(), 1000.0);
        assert_abs_diff_eq!(decode(&payload, &b).unwrap(), -3.0);
    }

    proptest! {
        #[test]
        fn intel_matches_bitwise_reference(
            payload in proptest::collection::vec(any::<u8>(), 0..=8usize),
            size in 1u32..=64,
            start_seed in any::<u32>(),
        ) {
            let start = start_seed % (65 - size);
            let sig = intel(start as u16, size as u16, ValueType::Unsigned);
            let expected = reference_bits(&payload, start, size);
            prop_assert_eq!(extract_raw(&payload, &sig).unwrap(), RawValue::Unsigned(expected));
        }

        #[test]
        fn motorola_and_intel_agree_on_same_bits(
            payload in any::<[u8; 8]>(),
            size in 1u32..=64,
            start_seed in any::<u32>(),
            signed in any::<bool>(),
        ) {
            let start = start_seed % (65 - size);
            let value_type = if signed { ValueType::Signed } else { ValueType::Unsigned };
            let le = intel(start as u16, size as u16, value_type);
            let be = motorola(motorola_start_for(start, size), size as u16, value_type);

            prop_assert_eq!(extract_raw(&payload, &le).unwrap(), extract_raw(&payload, &be).unwrap());
        }

        #[test]
        fn signed_value_is_unsigned_minus_two_pow_size(
            payload in any::<[u8; 8]>(),
            size in 1u32..=64,
            start_seed in any::<u32>(),
        ) {
            let start = start_seed % (65 - size);
            let unsigned = extract_raw(&payload, &intel(start as u16, size as u16, ValueType::Unsigned))
                .unwrap()
                .as_i128();
            let signed = extract_raw(&payload, &intel(start as u16, size as u16, ValueType::Signed))
                .unwrap()
                .as_i128();

            if unsigned >> (size - 1) & 1 == 1 {
                prop_assert_eq!(signed, unsigned - (1i128 << size));
            } else {
                prop_assert_eq!(signed, unsigned);
            }
        }
    }
}
