//! Structure combinators and the public pack/parse entry points.
//!
//! A [Structure] is built once and then used for any number of independent pack
//! and parse calls. Composites ([Sequence], [Keyed], [Repeat]) thread a
//! [Context] through their children; [Branch] picks a child from that context;
//! [Structure::Embed] splices a nested structure's children into its parent.

mod branch;
mod buffer;
mod fill;
mod keyed;
mod quantity;
mod repeat;
mod sequence;

use std::{fmt, sync::Arc};

pub use branch::{Branch, ChoiceKey, Chooser};
pub use buffer::{FixedBuffer, Padding};
pub use keyed::Keyed;
pub use quantity::Quantity;
pub use repeat::{Repeat, RepeatPolicy};
pub use sequence::Sequence;

use crate::{
    bits::{BitPosition, Endian, bytes_for},
    context::Context,
    errors::{DefinitionError, Result},
    scalar::Scalar,
    value::Value,
};

/// Output of a pack call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packed {
    /// Number of bits occupied by the packed structure.
    pub size_bits: usize,
    /// The packed bytes. Empty when packing into a caller-supplied buffer.
    pub buffer: Vec<u8>,
}

impl Packed {
    pub(crate) fn sized(size_bits: usize) -> Self {
        Packed {
            size_bits,
            buffer: Vec::new(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        bytes_for(self.size_bits)
    }
}

/// Output of a parse call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parsed {
    pub data: Value,
    /// Number of bits consumed.
    pub size_bits: usize,
}

/// Per-call options: where in the buffer to start and an endianness that
/// overrides every declared one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub position: BitPosition,
    pub endian: Option<Endian>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, position: BitPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }
}

/// The value handed to a pack call: either ready, or produced on demand.
pub enum Source<'a> {
    Literal(Value),
    Deferred(Box<dyn FnOnce() -> Result<Value> + 'a>),
}

impl<'a> Source<'a> {
    pub fn deferred<F>(produce: F) -> Self
    where
        F: FnOnce() -> Result<Value> + 'a,
    {
        Source::Deferred(Box::new(produce))
    }

    /// Produces the value. A deferred source runs exactly once.
    pub fn resolve(self) -> Result<Value> {
        match self {
            Source::Literal(value) => Ok(value),
            Source::Deferred(produce) => produce(),
        }
    }
}

impl From<Value> for Source<'_> {
    fn from(value: Value) -> Self {
        Source::Literal(value)
    }
}

impl fmt::Debug for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Source::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Structure {
    Scalar(Scalar),
    Sequence(Sequence),
    Keyed(Keyed),
    Repeat(Repeat),
    Branch(Branch),
    /// Zero-width pseudo-field contributing the nested structure's children
    /// to its parent's result.
    Embed(Arc<Structure>),
    Padding(Padding),
    FixedBuffer(FixedBuffer),
}

impl Structure {
    pub fn uint(width: usize) -> std::result::Result<Self, DefinitionError> {
        Scalar::uint(width).map(Structure::Scalar)
    }

    pub fn int(width: usize) -> std::result::Result<Self, DefinitionError> {
        Scalar::int(width).map(Structure::Scalar)
    }

    pub fn float(width: usize) -> std::result::Result<Self, DefinitionError> {
        Scalar::float(width).map(Structure::Scalar)
    }

    pub fn utf8(width: usize) -> std::result::Result<Self, DefinitionError> {
        Scalar::utf8(width).map(Structure::Scalar)
    }

    pub fn bits(width: usize) -> std::result::Result<Self, DefinitionError> {
        Scalar::bits(width).map(Structure::Scalar)
    }

    pub fn embed(inner: impl Into<Structure>) -> Self {
        Structure::Embed(Arc::new(inner.into()))
    }

    /// Embeds a structure that is shared with other parents.
    pub fn embed_shared(inner: Arc<Structure>) -> Self {
        Structure::Embed(inner)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Structure::Scalar(_) => "Scalar",
            Structure::Sequence(_) => "Sequence",
            Structure::Keyed(_) => "Keyed",
            Structure::Repeat(_) => "Repeat",
            Structure::Branch(_) => "Branch",
            Structure::Embed(_) => "Embed",
            Structure::Padding(_) => "Padding",
            Structure::FixedBuffer(_) => "FixedBuffer",
        }
    }

    /// Packs into a freshly allocated buffer.
    pub fn pack<'a>(&self, source: impl Into<Source<'a>>) -> Result<Packed> {
        self.pack_with(source, &Options::default())
    }

    /// Packs into a fresh buffer. A non-zero `options.position` leaves that many
    /// leading bits zero; `size_bits` still counts only the structure.
    pub fn pack_with<'a>(
        &self,
        source: impl Into<Source<'a>>,
        options: &Options,
    ) -> Result<Packed> {
        let value = source.into().resolve()?;
        let root = Context::root();
        let packed = self.pack_at(&value, None, options.position, options.endian, &root)?;

        if options.position == BitPosition::ZERO {
            return Ok(packed);
        }

        let mut buffer = vec![0u8; bytes_for(options.position.as_bits() + packed.size_bits)];
        fill::write_fragment(&mut buffer, options.position, &packed)?;

        Ok(Packed {
            size_bits: packed.size_bits,
            buffer,
        })
    }

    /// Packs directly into `buffer` starting at `options.position`, returning
    /// the number of bits written. Bits outside the structure's span are left
    /// untouched.
    pub fn pack_into<'a>(
        &self,
        source: impl Into<Source<'a>>,
        buffer: &mut [u8],
        options: &Options,
    ) -> Result<usize> {
        let value = source.into().resolve()?;
        let root = Context::root();
        let packed = self.pack_at(&value, Some(buffer), options.position, options.endian, &root)?;

        Ok(packed.size_bits)
    }

    pub fn parse(&self, buffer: &[u8]) -> Result<Parsed> {
        self.parse_with(buffer, &Options::default())
    }

    pub fn parse_with(&self, buffer: &[u8], options: &Options) -> Result<Parsed> {
        self.parse_at(buffer, options.position, options.endian, &Context::root())
    }

    /// Padding produces no value and consumes no source item.
    pub(crate) fn yields_value(&self) -> bool {
        !matches!(self, Structure::Padding(_))
    }

    /// The structure an embed ultimately refers to.
    pub(crate) fn embed_target(&self) -> &Structure {
        match self {
            Structure::Embed(inner) => inner.embed_target(),
            other => other,
        }
    }

    pub(crate) fn pack_at(
        &self,
        value: &Value,
        region: Option<&mut [u8]>,
        at: BitPosition,
        endian: Option<Endian>,
        ctx: &Context<'_>,
    ) -> Result<Packed> {
        match self {
            Structure::Scalar(scalar) => scalar.pack_at(value, region, at, endian, ctx),
            Structure::Sequence(sequence) => sequence.pack_at(value, region, at, endian, ctx),
            Structure::Keyed(keyed) => keyed.pack_at(value, region, at, endian, ctx),
            Structure::Repeat(repeat) => repeat.pack_at(value, region, at, endian, ctx),
            Structure::Branch(branch) => {
                branch.select(ctx)?.pack_at(value, region, at, endian, ctx)
            }
            Structure::Embed(inner) => inner.pack_at(value, region, at, endian, ctx),
            Structure::Padding(padding) => padding.pack_at(region, at, ctx),
            Structure::FixedBuffer(fixed) => fixed.pack_at(value, region, at, ctx),
        }
    }

    pub(crate) fn parse_at(
        &self,
        buffer: &[u8],
        at: BitPosition,
        endian: Option<Endian>,
        ctx: &Context<'_>,
    ) -> Result<Parsed> {
        match self {
            Structure::Scalar(scalar) => scalar.parse_at(buffer, at, endian, ctx),
            Structure::Sequence(sequence) => sequence.parse_at(buffer, at, endian, ctx),
            Structure::Keyed(keyed) => keyed.parse_at(buffer, at, endian, ctx),
            Structure::Repeat(repeat) => repeat.parse_at(buffer, at, endian, ctx),
            Structure::Branch(branch) => branch
                .select_at(ctx, buffer, at)?
                .parse_at(buffer, at, endian, ctx),
            Structure::Embed(inner) => inner.parse_at(buffer, at, endian, ctx),
            Structure::Padding(padding) => padding.parse_at(buffer, at, ctx),
            Structure::FixedBuffer(fixed) => fixed.parse_at(buffer, at, ctx),
        }
    }
}

impl From<Scalar> for Structure {
    fn from(value: Scalar) -> Self {
        Structure::Scalar(value)
    }
}

impl From<Sequence> for Structure {
    fn from(value: Sequence) -> Self {
        Structure::Sequence(value)
    }
}

impl From<Keyed> for Structure {
    fn from(value: Keyed) -> Self {
        Structure::Keyed(value)
    }
}

impl From<Repeat> for Structure {
    fn from(value: Repeat) -> Self {
        Structure::Repeat(value)
    }
}

impl From<Branch> for Structure {
    fn from(value: Branch) -> Self {
        Structure::Branch(value)
    }
}

impl From<Padding> for Structure {
    fn from(value: Padding) -> Self {
        Structure::Padding(value)
    }
}

impl From<FixedBuffer> for Structure {
    fn from(value: FixedBuffer) -> Self {
        Structure::FixedBuffer(value)
    }
}

/// Rejects embeds whose target cannot be spliced into a parent of kind `parent`.
pub(crate) fn check_embeds<'s>(
    parent: &'static str,
    children: impl IntoIterator<Item = &'s Structure>,
) -> std::result::Result<(), DefinitionError> {
    for child in children {
        let Structure::Embed(inner) = child else {
            continue;
        };

        let target = inner.embed_target();
        let mismatch = match parent {
            "Keyed" => matches!(target, Structure::Sequence(_) | Structure::Repeat(_)),
            _ => matches!(target, Structure::Keyed(_)),
        };

        if mismatch {
            return Err(DefinitionError::EmbedMismatch {
                parent,
                embedded: target.kind_name(),
            });
        }
    }

    Ok(())
}
