//! Scalar codecs: pack/parse unsigned and signed integers, IEEE floats and UTF-8
//! text at an arbitrary [BitPosition].
//!
//! Byte-aligned accesses take a fast path using native-width loads and stores.
//! Unaligned accesses encode into a temporary aligned buffer and merge it into
//! place with [crate::bits::merge_shifted] (or extract with
//! [crate::bits::extract_shifted] and decode the aligned copy).
//!
//! 64-bit unsigned values are handled as two 32-bit words ordered by endianness,
//! and are limited to [MAX_SAFE_INTEGER] in both directions.

use crate::{
    bits::{
        self, BitPosition, Endian, MAX_SAFE_INTEGER, bytes_for, ensure_len, hex_bytes, mask,
        sign_extend,
    },
    errors::{Error, Result},
    value::Value,
};

/// Valid widths for unsigned integers.
pub const UINT_WIDTHS: [usize; 11] = [1, 2, 3, 4, 5, 6, 7, 8, 16, 32, 64];
/// Valid widths for sub-byte bit fields.
pub const BITS_WIDTHS: [usize; 7] = [1, 2, 3, 4, 5, 6, 7];
/// Valid widths for signed integers.
pub const INT_WIDTHS: [usize; 3] = [8, 16, 32];
/// Valid widths for floats.
pub const FLOAT_WIDTHS: [usize; 2] = [32, 64];

/// Splits a 64-bit pattern into two 32-bit words laid out by endianness.
fn split_words(pattern: u64, endian: Endian) -> [u8; 8] {
    let high = (pattern >> 32) as u32;
    let low = (pattern & 0xFFFF_FFFF) as u32;

    let mut out = [0u8; 8];
    match endian {
        Endian::Little => {
            out[..4].copy_from_slice(&low.to_le_bytes());
            out[4..].copy_from_slice(&high.to_le_bytes());
        }
        Endian::Big => {
            out[..4].copy_from_slice(&high.to_be_bytes());
            out[4..].copy_from_slice(&low.to_be_bytes());
        }
    }

    out
}

/// Joins two 32-bit words laid out by endianness as `high * 2^32 + low`.
fn join_words(bytes: &[u8], endian: Endian) -> u64 {
    let first = [bytes[0], bytes[1], bytes[2], bytes[3]];
    let second = [bytes[4], bytes[5], bytes[6], bytes[7]];

    let (low, high) = match endian {
        Endian::Little => (u32::from_le_bytes(first), u32::from_le_bytes(second)),
        Endian::Big => (u32::from_be_bytes(second), u32::from_be_bytes(first)),
    };

    ((high as u64) << 32) + low as u64
}

/// Writes the low `width` bits of `pattern` at a byte-aligned offset. A
/// sub-byte write keeps the bits above the field.
fn write_aligned(
    pattern: u64,
    width: usize,
    byte: usize,
    buffer: &mut [u8],
    endian: Endian,
) -> Result<()> {
    ensure_len(buffer, byte + bytes_for(width))?;

    match width {
        1..=8 => {
            let field = bits::byte_mask(0, width);
            buffer[byte] = (buffer[byte] & !field) | (pattern as u8 & field);
        }
        16 => {
            let v = pattern as u16;
            let raw = match endian {
                Endian::Little => v.to_le_bytes(),
                Endian::Big => v.to_be_bytes(),
            };
            buffer[byte..byte + 2].copy_from_slice(&raw);
        }
        32 => {
            let v = pattern as u32;
            let raw = match endian {
                Endian::Little => v.to_le_bytes(),
                Endian::Big => v.to_be_bytes(),
            };
            buffer[byte..byte + 4].copy_from_slice(&raw);
        }
        64 => buffer[byte..byte + 8].copy_from_slice(&split_words(pattern, endian)),
        _ => unreachable!("widths are validated at construction"),
    }

    Ok(())
}

/// Reads `width` bits at a byte-aligned offset.
fn read_aligned(width: usize, byte: usize, buffer: &[u8], endian: Endian) -> Result<u64> {
    ensure_len(buffer, byte + bytes_for(width))?;

    let value = match width {
        1..=8 => buffer[byte] as u64 & mask(width),
        16 => {
            let raw = [buffer[byte], buffer[byte + 1]];
            match endian {
                Endian::Little => u16::from_le_bytes(raw) as u64,
                Endian::Big => u16::from_be_bytes(raw) as u64,
            }
        }
        32 => {
            let raw = [buffer[byte], buffer[byte + 1], buffer[byte + 2], buffer[byte + 3]];
            match endian {
                Endian::Little => u32::from_le_bytes(raw) as u64,
                Endian::Big => u32::from_be_bytes(raw) as u64,
            }
        }
        64 => join_words(&buffer[byte..byte + 8], endian),
        _ => unreachable!("widths are validated at construction"),
    };

    Ok(value)
}

/// Writes a bit pattern at any position, shifting through a temporary buffer when
/// the position is not byte-aligned. Returns the number of bits written.
pub fn write_bits(
    pattern: u64,
    width: usize,
    at: BitPosition,
    buffer: &mut [u8],
    endian: Endian,
) -> Result<usize> {
    if at.is_aligned() {
        write_aligned(pattern, width, at.byte(), buffer, endian)?;
    } else {
        let mut scratch = [0u8; 8];
        write_aligned(pattern, width, 0, &mut scratch, endian)?;
        bits::merge_shifted(&scratch[..bytes_for(width)], width, at, buffer)?;
    }

    Ok(width)
}

/// Reads a bit pattern at any position.
pub fn read_bits(width: usize, at: BitPosition, buffer: &[u8], endian: Endian) -> Result<u64> {
    if at.is_aligned() {
        read_aligned(width, at.byte(), buffer, endian)
    } else {
        let scratch = bits::extract_shifted(width, at, buffer)?;
        read_aligned(width, 0, &scratch, endian)
    }
}

/// Fails with [Error::Misaligned] unless `at` is on a byte boundary.
pub fn require_aligned(kind: &'static str, at: BitPosition) -> Result<()> {
    if !at.is_aligned() {
        return Err(Error::Misaligned { kind, bit: at.bit() });
    }

    Ok(())
}

fn encoding_error(value: &Value, kind: &'static str, width: usize) -> Error {
    Error::Encoding {
        value: value.to_string(),
        kind,
        width,
    }
}

/// Packs a non-negative exact integer no larger than `2^width - 1` (and no larger
/// than [MAX_SAFE_INTEGER]).
pub fn uint_pack(
    value: &Value,
    width: usize,
    at: BitPosition,
    buffer: &mut [u8],
    endian: Endian,
) -> Result<usize> {
    let v = value
        .as_integer()
        .filter(|v| *v >= 0 && *v <= mask(width) as i128 && *v <= MAX_SAFE_INTEGER as i128)
        .ok_or_else(|| encoding_error(value, "Uint", width))?;

    write_bits(v as u64, width, at, buffer, endian)
}

/// Parses an unsigned integer; 64-bit values above [MAX_SAFE_INTEGER] are rejected.
pub fn uint_parse(width: usize, at: BitPosition, buffer: &[u8], endian: Endian) -> Result<u64> {
    let value = read_bits(width, at, buffer, endian)?;

    if value > MAX_SAFE_INTEGER {
        return Err(Error::UnsafeInteger {
            bytes: hex_bytes(&split_words(value, endian)),
        });
    }

    Ok(value)
}

/// Packs a two's-complement integer in `[-2^(width-1), 2^(width-1) - 1]`.
pub fn int_pack(
    value: &Value,
    width: usize,
    at: BitPosition,
    buffer: &mut [u8],
    endian: Endian,
) -> Result<usize> {
    let limit = 1i128 << (width - 1);
    let v = value
        .as_integer()
        .filter(|v| *v >= -limit && *v < limit)
        .ok_or_else(|| encoding_error(value, "Int", width))?;

    write_bits(v as i64 as u64 & mask(width), width, at, buffer, endian)
}

pub fn int_parse(width: usize, at: BitPosition, buffer: &[u8], endian: Endian) -> Result<i64> {
    let raw = read_bits(width, at, buffer, endian)?;
    Ok(sign_extend(raw, width))
}

/// Packs an IEEE float. NaN and infinities are valid payloads.
pub fn float_pack(
    value: &Value,
    width: usize,
    at: BitPosition,
    buffer: &mut [u8],
    endian: Endian,
) -> Result<usize> {
    let v = value.as_f64().ok_or(Error::TypeMismatch {
        expected: "number",
        actual: value.kind_name(),
    })?;

    let pattern = match width {
        32 => (v as f32).to_bits() as u64,
        _ => v.to_bits(),
    };

    write_bits(pattern, width, at, buffer, endian)
}

pub fn float_parse(width: usize, at: BitPosition, buffer: &[u8], endian: Endian) -> Result<f64> {
    let pattern = read_bits(width, at, buffer, endian)?;

    Ok(match width {
        32 => f32::from_bits(pattern as u32) as f64,
        _ => f64::from_bits(pattern),
    })
}

/// Packs UTF-8 text at a byte-aligned position.
///
/// With a non-zero `width` the text must fit in `width / 8` bytes and is
/// zero-padded to exactly that span; with width 0 the text takes its natural
/// length. Returns the number of bits occupied.
///
/// Padding is indistinguishable from text that ends in NUL, so such trailing
/// NULs do not survive a fixed-width round trip.
pub fn utf8_pack(value: &str, width: usize, at: BitPosition, buffer: &mut [u8]) -> Result<usize> {
    require_aligned("Utf8", at)?;

    let encoded = value.as_bytes();
    let span = if width > 0 {
        let capacity = width / 8;
        if encoded.len() > capacity {
            return Err(Error::StringOverflow {
                length: encoded.len(),
                capacity,
            });
        }
        capacity
    } else {
        encoded.len()
    };

    let available = buffer.len().saturating_sub(at.byte());
    if span > available {
        return Err(Error::StringOverflow {
            length: span,
            capacity: available,
        });
    }

    let region = &mut buffer[at.byte()..at.byte() + span];
    region[..encoded.len()].copy_from_slice(encoded);
    region[encoded.len()..].fill(0);

    Ok(span * 8)
}

/// Parses UTF-8 text at a byte-aligned position: `width / 8` bytes with trailing
/// NUL padding removed, or everything to the end of the buffer when `width` is 0.
/// Returns the text and the number of bits consumed.
///
/// Every trailing NUL of a fixed-width span counts as padding, including NULs
/// that were part of the packed text. Width 0 keeps them.
pub fn utf8_parse(width: usize, at: BitPosition, buffer: &[u8]) -> Result<(String, usize)> {
    require_aligned("Utf8", at)?;

    let start = at.byte();
    let end = if width > 0 {
        start + width / 8
    } else {
        buffer.len().max(start)
    };
    ensure_len(buffer, end)?;

    let mut raw = &buffer[start..end];
    if width > 0 {
        let trimmed = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        raw = &raw[..trimmed];
    }

    let text = std::str::from_utf8(raw).map_err(|e| Error::InvalidUtf8(start + e.valid_up_to()))?;

    Ok((text.to_string(), (end - start) * 8))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_123;

    fn at(byte: usize, bit: usize) -> BitPosition {
        BitPosition::new(byte, bit)
    }

    #[test]
    fn test_uint_pack_byte_with_offset() {
        let mut bytes = [0, 1, 2, 3];
        let bits =
            uint_pack(&Value::Uint(0b0010_1010), 8, at(2, 0), &mut bytes, Endian::Big).unwrap();
        assert_eq!(bits, 8);
        assert_eq!(bytes, [0, 1, 42, 3]);
    }

    #[test]
    fn test_uint_pack_u16_little_endian() {
        let mut bytes = [0u8; 2];
        uint_pack(&Value::Uint(8128), 16, at(0, 0), &mut bytes, Endian::Little).unwrap();
        assert_eq!(u16::from_le_bytes(bytes), 8128);
    }

    #[test]
    fn test_uint_pack_u32_big_endian() {
        let mut bytes = [0u8; 4];
        uint_pack(&Value::Uint(33550336), 32, at(0, 0), &mut bytes, Endian::Big).unwrap();
        assert_eq!(u32::from_be_bytes(bytes), 33550336);
    }

    #[test]
    fn test_uint_pack_u64_little_endian_words() {
        let mut bytes = [0u8; 8];
        let bits = uint_pack(&Value::Uint(NOW), 64, at(0, 0), &mut bytes, Endian::Little).unwrap();
        assert_eq!(bits, 64);
        assert_eq!(
            u32::from_le_bytes(bytes[..4].try_into().unwrap()) as u64,
            NOW % (1 << 32)
        );
        assert_eq!(
            u32::from_le_bytes(bytes[4..].try_into().unwrap()) as u64,
            NOW / (1 << 32)
        );
        assert_eq!(uint_parse(64, at(0, 0), &bytes, Endian::Little).unwrap(), NOW);
    }

    #[test]
    fn test_uint_u64_big_endian_matches_native() {
        let mut bytes = [0u8; 8];
        uint_pack(&Value::Uint(NOW), 64, at(0, 0), &mut bytes, Endian::Big).unwrap();
        assert_eq!(bytes, NOW.to_be_bytes());
        assert_eq!(uint_parse(64, at(0, 0), &bytes, Endian::Big).unwrap(), NOW);
    }

    #[test]
    fn test_uint_pack_u16_with_bit_offset() {
        let mut bytes = [0u8; 3];
        let bits =
            uint_pack(&Value::Uint(0xAF0F), 16, at(0, 6), &mut bytes, Endian::Little).unwrap();
        assert_eq!(bits, 16);
        assert_eq!(bytes, [0b1100_0000, 0b1100_0011, 0b0010_1011]);
    }

    #[test]
    fn test_uint_pack_single_bit_with_offset() {
        let mut bytes = [0u8; 1];
        uint_pack(&Value::Uint(1), 1, at(0, 7), &mut bytes, Endian::Big).unwrap();
        assert_eq!(bytes, [128]);
    }

    #[test]
    fn test_sub_byte_write_keeps_neighbouring_bits() {
        let mut bytes = [0xFF];
        uint_pack(&Value::Uint(0), 2, at(0, 1), &mut bytes, Endian::Big).unwrap();
        assert_eq!(bytes, [0b1111_1001]);

        let mut bytes = [0xFF];
        uint_pack(&Value::Uint(0), 3, at(0, 0), &mut bytes, Endian::Big).unwrap();
        assert_eq!(bytes, [0b1111_1000]);
    }

    #[test]
    fn test_uint_range_boundaries() {
        let mut bytes = [0u8; 1];
        assert!(uint_pack(&Value::Uint(0), 8, at(0, 0), &mut bytes, Endian::Big).is_ok());
        assert!(uint_pack(&Value::Uint(255), 8, at(0, 0), &mut bytes, Endian::Big).is_ok());
        assert_eq!(
            uint_pack(&Value::Uint(256), 8, at(0, 0), &mut bytes, Endian::Big).unwrap_err(),
            Error::Encoding {
                value: "256".to_string(),
                kind: "Uint",
                width: 8
            }
        );
        assert!(uint_pack(&Value::Int(-1), 8, at(0, 0), &mut bytes, Endian::Big).is_err());
        assert!(uint_pack(&Value::Float(42.5), 8, at(0, 0), &mut bytes, Endian::Big).is_err());
        assert!(uint_pack(&Value::Uint(8), 3, at(0, 0), &mut bytes, Endian::Big).is_err());
    }

    #[test]
    fn test_uint_pack_rejects_unsafe_integer() {
        let mut bytes = [0u8; 8];
        assert!(
            uint_pack(&Value::Uint(MAX_SAFE_INTEGER + 1), 64, at(0, 0), &mut bytes, Endian::Big)
                .is_err()
        );
    }

    #[test]
    fn test_uint_parse_rejects_unsafe_integer() {
        let bytes = [0xFF; 8];
        assert_eq!(
            uint_parse(64, at(0, 0), &bytes, Endian::Little).unwrap_err(),
            Error::UnsafeInteger {
                bytes: "0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF".to_string()
            }
        );
    }

    #[test]
    fn test_uint_parse_sub_byte() {
        assert_eq!(uint_parse(2, at(0, 5), &[0xAA], Endian::Big).unwrap(), 1);
        assert_eq!(uint_parse(2, at(0, 4), &[0xAA], Endian::Big).unwrap(), 2);
        assert_eq!(uint_parse(3, at(0, 0), &[0xAA], Endian::Big).unwrap(), 0b010);
    }

    #[test]
    fn test_uint_parse_u16_big_endian_with_bit_offset() {
        let bit = 3;
        let bytes = [
            (0xAFu8 << bit),
            (0xAFu8 >> (8 - bit)) | (0x0Fu8 << bit),
            0x0Fu8 >> (8 - bit),
        ];
        assert_eq!(uint_parse(16, at(0, bit), &bytes, Endian::Big).unwrap(), 0xAF0F);
    }

    #[test]
    fn test_uint_parse_out_of_bounds() {
        assert_eq!(
            uint_parse(16, at(0, 0), &[1], Endian::Big).unwrap_err(),
            Error::OutOfBounds {
                needed: 2,
                available: 1
            }
        );
    }

    #[test]
    fn test_int_pack_negative_byte() {
        let mut bytes = [0, 1, 2, 3];
        int_pack(&Value::Int(-42), 8, at(2, 0), &mut bytes, Endian::Big).unwrap();
        assert_eq!(bytes[2] as i8, -42);
        assert_eq!(int_parse(8, at(2, 0), &bytes, Endian::Big).unwrap(), -42);
    }

    #[test]
    fn test_int_pack_with_bit_offset() {
        let mut bytes = [0u8; 3];
        int_pack(&Value::Int(0x5F0F), 16, at(0, 6), &mut bytes, Endian::Little).unwrap();
        assert_eq!(bytes, [0b1100_0000, 0b1100_0011, 0b0001_0111]);
    }

    #[test]
    fn test_int_range() {
        let mut bytes = [0u8; 2];
        assert!(int_pack(&Value::Int(-128), 8, at(0, 0), &mut bytes, Endian::Big).is_ok());
        assert!(int_pack(&Value::Int(-129), 8, at(0, 0), &mut bytes, Endian::Big).is_err());
        assert!(int_pack(&Value::Int(65536), 16, at(0, 0), &mut bytes, Endian::Big).is_err());
        assert!(int_pack(&Value::Float(42.42), 16, at(0, 0), &mut bytes, Endian::Big).is_err());
    }

    #[test]
    fn test_int_negative_with_bit_offset() {
        let mut bytes = [0u8; 3];
        int_pack(&Value::Int(-2), 16, at(0, 5), &mut bytes, Endian::Big).unwrap();
        assert_eq!(int_parse(16, at(0, 5), &bytes, Endian::Big).unwrap(), -2);
    }

    #[test]
    fn test_float_roundtrip() {
        let mut bytes = [0u8; 8];
        float_pack(&Value::Float(8128.8128), 64, at(0, 0), &mut bytes, Endian::Little).unwrap();
        assert_eq!(f64::from_le_bytes(bytes), 8128.8128);

        let mut bytes = [0u8; 5];
        float_pack(&Value::Float(-41.41), 32, at(0, 3), &mut bytes, Endian::Little).unwrap();
        let parsed = float_parse(32, at(0, 3), &bytes, Endian::Little).unwrap();
        assert!((parsed - -41.41).abs() < 1e-4);

        let expected = ((-41.41f32).to_bits() as u64) << 3;
        assert_eq!(&bytes[..], &expected.to_le_bytes()[..5]);
    }

    #[test]
    fn test_float_accepts_nan() {
        let mut bytes = [0u8; 4];
        float_pack(&Value::Float(f64::NAN), 32, at(0, 0), &mut bytes, Endian::Big).unwrap();
        assert!(float_parse(32, at(0, 0), &bytes, Endian::Big).unwrap().is_nan());
    }

    #[test]
    fn test_utf8_natural_length() {
        let mut bytes = [0u8; 8];
        let bits = utf8_pack("héllo", 0, at(1, 0), &mut bytes).unwrap();
        assert_eq!(bits, 48);
        let (text, consumed) = utf8_parse(48, at(1, 0), &bytes).unwrap();
        assert_eq!(text, "héllo");
        assert_eq!(consumed, 48);
    }

    #[test]
    fn test_utf8_fixed_width_pads() {
        let mut bytes = [0xEEu8; 6];
        let bits = utf8_pack("abc", 48, at(0, 0), &mut bytes).unwrap();
        assert_eq!(bits, 48);
        assert_eq!(bytes, [b'a', b'b', b'c', 0, 0, 0]);
        assert_eq!(utf8_parse(48, at(0, 0), &bytes).unwrap(), ("abc".to_string(), 48));
    }

    #[test]
    fn test_utf8_trailing_nul_is_padding() {
        let mut bytes = [0u8; 4];
        utf8_pack("ab\0", 32, at(0, 0), &mut bytes).unwrap();
        assert_eq!(bytes, [b'a', b'b', 0, 0]);
        assert_eq!(utf8_parse(32, at(0, 0), &bytes).unwrap(), ("ab".to_string(), 32));

        let (text, _) = utf8_parse(0, at(0, 0), b"ab\0").unwrap();
        assert_eq!(text, "ab\0");
    }

    #[test]
    fn test_utf8_parse_to_end() {
        let bytes = b"xxtail";
        assert_eq!(
            utf8_parse(0, at(2, 0), bytes).unwrap(),
            ("tail".to_string(), 32)
        );
    }

    #[test]
    fn test_utf8_overflow() {
        let mut bytes = [0u8; 8];
        assert_eq!(
            utf8_pack("too long", 16, at(0, 0), &mut bytes).unwrap_err(),
            Error::StringOverflow {
                length: 8,
                capacity: 2
            }
        );
        assert_eq!(
            utf8_pack("abc", 0, at(6, 0), &mut bytes).unwrap_err(),
            Error::StringOverflow {
                length: 3,
                capacity: 2
            }
        );
    }

    #[test]
    fn test_utf8_requires_alignment() {
        let mut bytes = [0u8; 4];
        assert_eq!(
            utf8_pack("a", 8, at(0, 3), &mut bytes).unwrap_err(),
            Error::Misaligned {
                kind: "Utf8",
                bit: 3
            }
        );
        assert!(utf8_parse(8, at(0, 3), &bytes).is_err());
    }

    #[test]
    fn test_utf8_invalid() {
        assert_eq!(
            utf8_parse(16, at(0, 0), &[b'a', 0xFF]).unwrap_err(),
            Error::InvalidUtf8(1)
        );
    }

    #[test]
    fn test_fast_path_matches_shift_path() {
        for (width, value) in [(8usize, 0xA5u64), (16, 0xBEEF), (32, 0xDEAD_BEEF), (64, NOW)] {
            for endian in [Endian::Big, Endian::Little] {
                let mut aligned = vec![0u8; width / 8];
                write_bits(value, width, at(0, 0), &mut aligned, endian).unwrap();

                let mut scratch = [0u8; 8];
                write_aligned(value, width, 0, &mut scratch, endian).unwrap();
                assert_eq!(&scratch[..width / 8], &aligned[..]);

                let mut shifted = vec![0u8; width / 8 + 1];
                write_bits(value, width, at(0, 4), &mut shifted, endian).unwrap();
                assert_eq!(read_bits(width, at(0, 4), &shifted, endian).unwrap(), value);
                assert_eq!(read_bits(width, at(0, 0), &aligned, endian).unwrap(), value);
            }
        }
    }
}
