use crate::{
    bits::{BitPosition, Endian, bytes_for, ensure_len, mask},
    codec,
    context::Context,
    errors::{Error, Result},
    hooks::Hooks,
    value::Value,
};

use super::{Packed, Parsed, Quantity};

/// Bits that carry no value. Parsing skips them; packing leaves them untouched
/// unless a fill byte is set.
#[derive(Debug, Clone)]
pub struct Padding {
    bits: Quantity,
    fill: Option<u8>,
}

impl Padding {
    /// Padding of `bits` bits.
    pub fn new(bits: impl Into<Quantity>) -> Self {
        Padding {
            bits: bits.into(),
            fill: None,
        }
    }

    /// Writes `fill` over every padding byte on pack (the low bits of it for a
    /// partial byte).
    pub fn with_fill(mut self, fill: u8) -> Self {
        self.fill = Some(fill);
        self
    }

    pub(crate) fn pack_at(
        &self,
        region: Option<&mut [u8]>,
        at: BitPosition,
        ctx: &Context<'_>,
    ) -> Result<Packed> {
        let size_bits = self.bits.resolve(ctx)?;

        match region {
            Some(buffer) => {
                ensure_len(buffer, bytes_for(at.as_bits() + size_bits))?;
                if let Some(fill) = self.fill {
                    write_fill(fill, size_bits, at, buffer)?;
                }
                Ok(Packed::sized(size_bits))
            }
            None => {
                let mut buffer = vec![0u8; bytes_for(size_bits)];
                if let Some(fill) = self.fill {
                    write_fill(fill, size_bits, BitPosition::ZERO, &mut buffer)?;
                }
                Ok(Packed { size_bits, buffer })
            }
        }
    }

    pub(crate) fn parse_at(
        &self,
        buffer: &[u8],
        at: BitPosition,
        ctx: &Context<'_>,
    ) -> Result<Parsed> {
        let size_bits = self.bits.resolve(ctx)?;
        ensure_len(buffer, bytes_for(at.as_bits() + size_bits))?;

        Ok(Parsed {
            data: Value::Null,
            size_bits,
        })
    }
}

fn write_fill(fill: u8, size_bits: usize, at: BitPosition, buffer: &mut [u8]) -> Result<()> {
    let mut offset = 0;
    while offset < size_bits {
        let width = (size_bits - offset).min(8);
        let pattern = fill as u64 & mask(width);
        codec::write_bits(pattern, width, at.advance(offset), buffer, Endian::Big)?;
        offset += width;
    }

    Ok(())
}

/// A run of opaque bytes copied between the wire and [Value::Bytes].
///
/// Requires byte alignment. Packing accepts [Value::Bytes] or a list of
/// byte-valued integers whose length must equal the declared length.
#[derive(Debug, Clone)]
pub struct FixedBuffer {
    length: Quantity,
    hooks: Hooks,
}

impl FixedBuffer {
    /// A buffer of `length` bytes.
    pub fn new(length: impl Into<Quantity>) -> Self {
        FixedBuffer {
            length: length.into(),
            hooks: Hooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub(crate) fn pack_at(
        &self,
        value: &Value,
        region: Option<&mut [u8]>,
        at: BitPosition,
        ctx: &Context<'_>,
    ) -> Result<Packed> {
        let encoded = self.hooks.encode(value, ctx)?;
        let bytes = encoded.to_bytes().ok_or(Error::TypeMismatch {
            expected: "bytes",
            actual: encoded.kind_name(),
        })?;

        let length = self.length.resolve(ctx)?;
        if bytes.len() != length {
            return Err(Error::LengthMismatch {
                expected: length,
                actual: bytes.len(),
            });
        }

        codec::require_aligned("FixedBuffer", at)?;

        match region {
            Some(buffer) => {
                ensure_len(buffer, at.byte() + length)?;
                buffer[at.byte()..at.byte() + length].copy_from_slice(&bytes);
                Ok(Packed::sized(length * 8))
            }
            None => Ok(Packed {
                size_bits: length * 8,
                buffer: bytes,
            }),
        }
    }

    pub(crate) fn parse_at(
        &self,
        buffer: &[u8],
        at: BitPosition,
        ctx: &Context<'_>,
    ) -> Result<Parsed> {
        codec::require_aligned("FixedBuffer", at)?;

        let length = self.length.resolve(ctx)?;
        ensure_len(buffer, at.byte() + length)?;

        let raw = Value::Bytes(buffer[at.byte()..at.byte() + length].to_vec());
        let data = self.hooks.decode(raw, ctx)?;

        Ok(Parsed {
            data,
            size_bits: length * 8,
        })
    }
}
