//! Bit cursor and low-level bit manipulation on byte slices.
//!
//! Bits within a byte are addressed from the least significant end: bit offset 0
//! is the low bit, bit offset 7 the high bit. A field starting at bit offset `b`
//! keeps the low `b` bits of its first byte untouched and spills its high bits
//! into the following byte.

use crate::errors::{Error, Result};

/// Largest integer exactly representable in an IEEE double (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Byte order for multi-byte accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// A `(byte, bit)` position in a buffer, with `bit` always in `0..8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitPosition {
    byte: usize,
    bit: u8,
}

impl BitPosition {
    pub const ZERO: BitPosition = BitPosition { byte: 0, bit: 0 };

    /// Builds a position, carrying whole bytes out of `bit`.
    pub fn new(byte: usize, bit: usize) -> Self {
        BitPosition {
            byte: byte + bit / 8,
            bit: (bit % 8) as u8,
        }
    }

    pub fn from_bits(bits: usize) -> Self {
        Self::new(0, bits)
    }

    pub fn byte(&self) -> usize {
        self.byte
    }

    pub fn bit(&self) -> u8 {
        self.bit
    }

    pub fn as_bits(&self) -> usize {
        self.byte * 8 + self.bit as usize
    }

    pub fn is_aligned(&self) -> bool {
        self.bit == 0
    }

    /// Returns the position `bits` further along.
    pub fn advance(self, bits: usize) -> Self {
        Self::new(self.byte, self.bit as usize + bits)
    }
}

/// Number of bytes needed to hold `bits` bits.
pub fn bytes_for(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Mask covering the low `width` bits (width 0..=64).
pub fn mask(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Sign-extends the low `bits` of `value` to a full `i64`.
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Renders bytes as `0x00, 0xAB, ...` for diagnostics.
pub fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{}", hex::encode_upper([*b])))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fails unless `buffer` has at least `needed` bytes.
pub fn ensure_len(buffer: &[u8], needed: usize) -> Result<()> {
    if needed > buffer.len() {
        return Err(Error::OutOfBounds {
            needed,
            available: buffer.len(),
        });
    }

    Ok(())
}

/// Mask of bits `from..to` within one byte (`0 <= from <= to <= 8`).
pub fn byte_mask(from: usize, to: usize) -> u8 {
    ((1u16 << to) - (1u16 << from)) as u8
}

/// Merges an aligned `source` holding `width` bits into `buffer` at a non-aligned `at`.
///
/// Each source byte is shifted left into place and its shifted-out high bits
/// carry into the next byte. Only the bits in `at..at + width` are written;
/// every other bit of the touched bytes keeps its value.
pub fn merge_shifted(
    source: &[u8],
    width: usize,
    at: BitPosition,
    buffer: &mut [u8],
) -> Result<()> {
    let bit = at.bit() as usize;
    debug_assert!(bit != 0, "aligned writes take the fast path");
    let span = bytes_for(bit + width);
    ensure_len(buffer, at.byte() + span)?;

    for index in 0..span {
        let low = source.get(index).map_or(0, |byte| byte << bit);
        let carry = match index {
            0 => 0,
            _ => source.get(index - 1).map_or(0, |byte| byte >> (8 - bit)),
        };

        let first = index * 8;
        let field = byte_mask(bit.saturating_sub(first), (bit + width - first).min(8));
        let target = &mut buffer[at.byte() + index];
        *target = (*target & !field) | ((low | carry) & field);
    }

    Ok(())
}

/// Extracts `width` bits starting at a non-aligned `at` into an aligned byte array.
///
/// The inverse of [merge_shifted]: each result byte is the current source byte
/// shifted right, OR'ed with the low bits of the next source byte, and the last
/// byte is masked to the remaining width.
pub fn extract_shifted(width: usize, at: BitPosition, buffer: &[u8]) -> Result<[u8; 8]> {
    let bit = at.bit() as usize;
    debug_assert!(bit != 0, "aligned reads take the fast path");
    ensure_len(buffer, at.byte() + bytes_for(bit + width))?;

    let mut out = [0u8; 8];
    let mut byte = buffer[at.byte()];

    for (index, slot) in out.iter_mut().enumerate().take(bytes_for(width)) {
        let remaining = width - index * 8;
        let mut value = byte >> bit;

        if bit + remaining > 8 {
            let next = buffer[at.byte() + index + 1];
            value |= next << (8 - bit);
            byte = next;
        }

        if remaining < 8 {
            value &= 0xFF >> (8 - remaining);
        }

        *slot = value;
    }

    Ok(out)
}
