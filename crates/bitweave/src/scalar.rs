//! Scalar transcoders: a codec from [crate::codec] bound to a declared bit width,
//! optional hooks and an optional default endianness.

use tracing::trace;

use crate::{
    bits::{BitPosition, Endian, bytes_for},
    codec,
    context::Context,
    errors::{DefinitionError, Error, Result},
    hooks::Hooks,
    structure::{Packed, Parsed},
    value::Value,
};

/// Primitive kind of a scalar transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// Unsigned integer, widths 1-8, 16, 32, 64.
    Uint,
    /// Unsigned sub-byte field, widths 1-7.
    Bits,
    /// Signed two's-complement integer, widths 8, 16, 32.
    Int,
    /// IEEE 754 float, widths 32, 64.
    Float,
    /// UTF-8 text, any multiple of 8 bits; 0 means natural length.
    Utf8,
}

impl ScalarKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Uint => "Uint",
            ScalarKind::Bits => "Bits",
            ScalarKind::Int => "Int",
            ScalarKind::Float => "Float",
            ScalarKind::Utf8 => "Utf8",
        }
    }

    pub fn is_valid_width(&self, width: usize) -> bool {
        match self {
            ScalarKind::Uint => codec::UINT_WIDTHS.contains(&width),
            ScalarKind::Bits => codec::BITS_WIDTHS.contains(&width),
            ScalarKind::Int => codec::INT_WIDTHS.contains(&width),
            ScalarKind::Float => codec::FLOAT_WIDTHS.contains(&width),
            ScalarKind::Utf8 => width % 8 == 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scalar {
    kind: ScalarKind,
    width: usize,
    hooks: Hooks,
    endian: Option<Endian>,
}

impl Scalar {
    /// Creates a scalar, failing if `width` is not valid for `kind`.
    pub fn new(kind: ScalarKind, width: usize) -> std::result::Result<Self, DefinitionError> {
        if !kind.is_valid_width(width) {
            return Err(DefinitionError::InvalidWidth {
                kind: kind.name(),
                width,
            });
        }

        Ok(Self::raw(kind, width))
    }

    /// Creates a scalar whose width the caller has already validated.
    pub(crate) fn raw(kind: ScalarKind, width: usize) -> Self {
        Scalar {
            kind,
            width,
            hooks: Hooks::default(),
            endian: None,
        }
    }

    pub fn uint(width: usize) -> std::result::Result<Self, DefinitionError> {
        Self::new(ScalarKind::Uint, width)
    }

    pub fn bits(width: usize) -> std::result::Result<Self, DefinitionError> {
        Self::new(ScalarKind::Bits, width)
    }

    pub fn int(width: usize) -> std::result::Result<Self, DefinitionError> {
        Self::new(ScalarKind::Int, width)
    }

    pub fn float(width: usize) -> std::result::Result<Self, DefinitionError> {
        Self::new(ScalarKind::Float, width)
    }

    pub fn utf8(width: usize) -> std::result::Result<Self, DefinitionError> {
        Self::new(ScalarKind::Utf8, width)
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets the endianness used when the call site does not override it.
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Declared width in bits (0 for natural-length text).
    pub fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn pack_at(
        &self,
        value: &Value,
        region: Option<&mut [u8]>,
        at: BitPosition,
        endian: Option<Endian>,
        ctx: &Context<'_>,
    ) -> Result<Packed> {
        let encoded = self.hooks.encode(value, ctx)?;
        let endian = endian.or(self.endian).unwrap_or_default();

        match region {
            Some(buffer) => {
                let size_bits = self.write(&encoded, buffer, at, endian)?;
                Ok(Packed::sized(size_bits))
            }
            None => {
                // The fragment starts at bit 0 but lands at `at` once concatenated.
                if self.kind == ScalarKind::Utf8 {
                    codec::require_aligned("Utf8", at)?;
                }

                let mut buffer = vec![0u8; self.fresh_len(&encoded)];
                let size_bits = self.write(&encoded, &mut buffer, BitPosition::ZERO, endian)?;
                Ok(Packed { size_bits, buffer })
            }
        }
    }

    pub(crate) fn parse_at(
        &self,
        buffer: &[u8],
        at: BitPosition,
        endian: Option<Endian>,
        ctx: &Context<'_>,
    ) -> Result<Parsed> {
        let endian = endian.or(self.endian).unwrap_or_default();

        let (wire, size_bits) = match self.kind {
            ScalarKind::Uint | ScalarKind::Bits => (
                Value::Uint(codec::uint_parse(self.width, at, buffer, endian)?),
                self.width,
            ),
            ScalarKind::Int => (
                Value::Int(codec::int_parse(self.width, at, buffer, endian)?),
                self.width,
            ),
            ScalarKind::Float => (
                Value::Float(codec::float_parse(self.width, at, buffer, endian)?),
                self.width,
            ),
            ScalarKind::Utf8 => {
                let (text, size_bits) = codec::utf8_parse(self.width, at, buffer)?;
                (Value::Str(text), size_bits)
            }
        };

        trace!(kind = self.kind.name(), width = self.width, ?at, %wire, "parsed scalar");

        let data = self.hooks.decode(wire, ctx)?;
        Ok(Parsed { data, size_bits })
    }

    fn write(
        &self,
        encoded: &Value,
        buffer: &mut [u8],
        at: BitPosition,
        endian: Endian,
    ) -> Result<usize> {
        match self.kind {
            ScalarKind::Uint | ScalarKind::Bits => {
                codec::uint_pack(encoded, self.width, at, buffer, endian)
            }
            ScalarKind::Int => codec::int_pack(encoded, self.width, at, buffer, endian),
            ScalarKind::Float => codec::float_pack(encoded, self.width, at, buffer, endian),
            ScalarKind::Utf8 => {
                let text = encoded.as_str().ok_or(Error::TypeMismatch {
                    expected: "string",
                    actual: encoded.kind_name(),
                })?;
                codec::utf8_pack(text, self.width, at, buffer)
            }
        }
    }

    /// Size of a freshly allocated buffer for `encoded`.
    fn fresh_len(&self, encoded: &Value) -> usize {
        match (self.kind, self.width) {
            (ScalarKind::Utf8, 0) => encoded.as_str().map_or(0, str::len),
            (_, width) => bytes_for(width),
        }
    }
}
