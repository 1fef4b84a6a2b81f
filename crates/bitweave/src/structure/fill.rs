//! Child iteration shared by sequences, keyed structures and repeats.
//!
//! Parsing appends each child's value to the in-progress result, which is the
//! context the next child sees. Packing pulls each child's value from the source
//! (by position for lists, by name for records). Embeds are spliced here: their
//! children run against the parent's result and context as if declared inline.

use tracing::{debug, trace};

use crate::{
    bits::{BitPosition, Endian, bytes_for, ensure_len, mask},
    context::{Context, Scope},
    errors::{Error, Result},
    scalar::{Scalar, ScalarKind},
    value::{Record, Value},
};

use super::{Packed, Sequence, Structure};

pub(crate) type Feed<'v> = std::slice::Iter<'v, Value>;

pub(crate) fn parse_items(
    children: &[Structure],
    buffer: &[u8],
    at: BitPosition,
    endian: Option<Endian>,
    parent: &Context<'_>,
    items: &mut Vec<Value>,
) -> Result<usize> {
    let mut offset = 0;
    for child in children {
        offset += parse_item(child, buffer, at.advance(offset), endian, parent, items)?;
    }

    Ok(offset)
}

fn parse_item(
    child: &Structure,
    buffer: &[u8],
    at: BitPosition,
    endian: Option<Endian>,
    parent: &Context<'_>,
    items: &mut Vec<Value>,
) -> Result<usize> {
    match child {
        Structure::Embed(inner) => splice_items(inner, buffer, at, endian, parent, items),
        Structure::Branch(branch) => {
            let arm = {
                let ctx = Context::child(Scope::Items(items), parent);
                branch.select_at(&ctx, buffer, at)?
            };
            parse_item(arm, buffer, at, endian, parent, items)
        }
        _ => {
            let parsed = {
                let ctx = Context::child(Scope::Items(items), parent);
                child.parse_at(buffer, at, endian, &ctx)?
            };

            trace!(index = items.len(), ?at, size_bits = parsed.size_bits, "parsed item");

            if child.yields_value() {
                items.push(parsed.data);
            }
            Ok(parsed.size_bits)
        }
    }
}

fn splice_items(
    inner: &Structure,
    buffer: &[u8],
    at: BitPosition,
    endian: Option<Endian>,
    parent: &Context<'_>,
    items: &mut Vec<Value>,
) -> Result<usize> {
    match inner {
        Structure::Sequence(sequence) => parse_items(
            sequence.children(),
            buffer,
            at,
            endian.or(sequence.endian()),
            parent,
            items,
        ),
        Structure::Repeat(repeat) => repeat.parse_into(buffer, at, endian, parent, items),
        Structure::Branch(branch) => {
            let arm = {
                let ctx = Context::child(Scope::Items(items), parent);
                branch.select_at(&ctx, buffer, at)?
            };
            splice_items(arm, buffer, at, endian, parent, items)
        }
        Structure::Embed(nested) => splice_items(nested, buffer, at, endian, parent, items),
        Structure::Keyed(_) => Err(Error::TypeMismatch {
            expected: "list",
            actual: "record",
        }),
        other => parse_item(other, buffer, at, endian, parent, items),
    }
}

pub(crate) fn parse_fields(
    fields: &[(String, Structure)],
    buffer: &[u8],
    at: BitPosition,
    endian: Option<Endian>,
    parent: &Context<'_>,
    record: &mut Record,
) -> Result<usize> {
    let mut offset = 0;
    for (name, child) in fields {
        offset += parse_field(name, child, buffer, at.advance(offset), endian, parent, record)?;
    }

    Ok(offset)
}

fn parse_field(
    name: &str,
    child: &Structure,
    buffer: &[u8],
    at: BitPosition,
    endian: Option<Endian>,
    parent: &Context<'_>,
    record: &mut Record,
) -> Result<usize> {
    match child {
        Structure::Embed(inner) => splice_fields(name, inner, buffer, at, endian, parent, record),
        Structure::Branch(branch) => {
            let arm = {
                let ctx = Context::child(Scope::Fields(record), parent);
                branch.select_at(&ctx, buffer, at)?
            };
            parse_field(name, arm, buffer, at, endian, parent, record)
        }
        _ => {
            let parsed = {
                let ctx = Context::child(Scope::Fields(record), parent);
                child.parse_at(buffer, at, endian, &ctx)?
            };

            trace!(field = name, ?at, size_bits = parsed.size_bits, "parsed field");

            if child.yields_value() {
                record.insert(name, parsed.data);
            }
            Ok(parsed.size_bits)
        }
    }
}

fn splice_fields(
    name: &str,
    inner: &Structure,
    buffer: &[u8],
    at: BitPosition,
    endian: Option<Endian>,
    parent: &Context<'_>,
    record: &mut Record,
) -> Result<usize> {
    match inner {
        Structure::Keyed(keyed) => {
            let endian = endian.or(keyed.endian());
            parse_fields(keyed.fields(), buffer, at, endian, parent, record)
        }
        Structure::Branch(branch) => {
            let arm = {
                let ctx = Context::child(Scope::Fields(record), parent);
                branch.select_at(&ctx, buffer, at)?
            };
            splice_fields(name, arm, buffer, at, endian, parent, record)
        }
        Structure::Embed(nested) => splice_fields(name, nested, buffer, at, endian, parent, record),
        Structure::Sequence(_) | Structure::Repeat(_) => Err(Error::TypeMismatch {
            expected: "record",
            actual: "list",
        }),
        other => parse_field(name, other, buffer, at, endian, parent, record),
    }
}

pub(crate) fn pack_items(
    children: &[Structure],
    feed: &mut Feed<'_>,
    emitter: &mut Emitter<'_>,
    endian: Option<Endian>,
    ctx: &Context<'_>,
) -> Result<()> {
    for child in children {
        pack_item(child, feed, emitter, endian, ctx)?;
    }

    Ok(())
}

fn pack_item(
    child: &Structure,
    feed: &mut Feed<'_>,
    emitter: &mut Emitter<'_>,
    endian: Option<Endian>,
    ctx: &Context<'_>,
) -> Result<()> {
    match child {
        Structure::Embed(inner) => splice_pack_items(inner, feed, emitter, endian, ctx),
        Structure::Branch(branch) => pack_item(branch.select(ctx)?, feed, emitter, endian, ctx),
        _ if !child.yields_value() => emitter.emit(child, &Value::Null, endian, ctx),
        _ => {
            let value = feed.next().ok_or_else(|| {
                Error::InsufficientData(format!("source list of {} items exhausted", ctx.len()))
            })?;
            emitter.emit(child, value, endian, ctx)
        }
    }
}

fn splice_pack_items(
    inner: &Structure,
    feed: &mut Feed<'_>,
    emitter: &mut Emitter<'_>,
    endian: Option<Endian>,
    ctx: &Context<'_>,
) -> Result<()> {
    match inner {
        Structure::Sequence(sequence) => {
            pack_items(sequence.children(), feed, emitter, endian.or(sequence.endian()), ctx)
        }
        Structure::Repeat(repeat) => repeat.pack_into(feed, emitter, endian, ctx),
        Structure::Branch(branch) => {
            splice_pack_items(branch.select(ctx)?, feed, emitter, endian, ctx)
        }
        Structure::Embed(nested) => splice_pack_items(nested, feed, emitter, endian, ctx),
        Structure::Keyed(_) => Err(Error::TypeMismatch {
            expected: "list",
            actual: "record",
        }),
        other => pack_item(other, feed, emitter, endian, ctx),
    }
}

pub(crate) fn pack_fields(
    fields: &[(String, Structure)],
    record: &Record,
    emitter: &mut Emitter<'_>,
    endian: Option<Endian>,
    ctx: &Context<'_>,
) -> Result<()> {
    for (name, child) in fields {
        pack_field(name, child, record, emitter, endian, ctx)?;
    }

    Ok(())
}

fn pack_field(
    name: &str,
    child: &Structure,
    record: &Record,
    emitter: &mut Emitter<'_>,
    endian: Option<Endian>,
    ctx: &Context<'_>,
) -> Result<()> {
    match child {
        Structure::Embed(inner) => splice_pack_fields(name, inner, record, emitter, endian, ctx),
        Structure::Branch(branch) => {
            pack_field(name, branch.select(ctx)?, record, emitter, endian, ctx)
        }
        _ if !child.yields_value() => emitter.emit(child, &Value::Null, endian, ctx),
        _ => {
            let value = record.get(name).ok_or_else(|| {
                let keys: Vec<&str> = record.keys().collect();
                Error::InsufficientData(format!("{name} not in [{}]", keys.join(", ")))
            })?;
            emitter.emit(child, value, endian, ctx)
        }
    }
}

fn splice_pack_fields(
    name: &str,
    inner: &Structure,
    record: &Record,
    emitter: &mut Emitter<'_>,
    endian: Option<Endian>,
    ctx: &Context<'_>,
) -> Result<()> {
    match inner {
        Structure::Keyed(keyed) => {
            pack_fields(keyed.fields(), record, emitter, endian.or(keyed.endian()), ctx)
        }
        Structure::Branch(branch) => {
            splice_pack_fields(name, branch.select(ctx)?, record, emitter, endian, ctx)
        }
        Structure::Embed(nested) => splice_pack_fields(name, nested, record, emitter, endian, ctx),
        Structure::Sequence(_) | Structure::Repeat(_) => Err(Error::TypeMismatch {
            expected: "record",
            actual: "list",
        }),
        other => pack_field(name, other, record, emitter, endian, ctx),
    }
}

/// Places packed children one after another, either directly into a caller's
/// region or as fragments concatenated by [Emitter::finish]. Fragments are
/// packed at their final position so alignment checks see the real offset.
pub(crate) struct Emitter<'b> {
    region: Option<&'b mut [u8]>,
    start: BitPosition,
    offset: usize,
    fragments: Vec<Packed>,
}

impl<'b> Emitter<'b> {
    pub(crate) fn new(region: Option<&'b mut [u8]>, start: BitPosition) -> Self {
        Emitter {
            region,
            start,
            offset: 0,
            fragments: Vec::new(),
        }
    }

    /// Bits emitted so far.
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn emit(
        &mut self,
        child: &Structure,
        value: &Value,
        endian: Option<Endian>,
        ctx: &Context<'_>,
    ) -> Result<()> {
        let at = self.start.advance(self.offset);
        let packed = match self.region.as_deref_mut() {
            Some(buffer) => child.pack_at(value, Some(buffer), at, endian, ctx)?,
            None => child.pack_at(value, None, at, endian, ctx)?,
        };

        trace!(kind = child.kind_name(), ?at, size_bits = packed.size_bits, "packed child");

        self.offset += packed.size_bits;
        if self.region.is_none() {
            self.fragments.push(packed);
        }

        Ok(())
    }

    pub(crate) fn finish(self) -> Result<Packed> {
        match self.region {
            Some(_) => Ok(Packed::sized(self.offset)),
            None => concat(&self.fragments, self.offset),
        }
    }
}

/// Joins fragments bit-contiguously into one buffer.
fn concat(fragments: &[Packed], size_bits: usize) -> Result<Packed> {
    let mut buffer = vec![0u8; bytes_for(size_bits)];

    let mut offset = 0;
    for fragment in fragments {
        write_fragment(&mut buffer, BitPosition::from_bits(offset), fragment)?;
        offset += fragment.size_bits;
    }

    debug!(fragments = fragments.len(), size_bits, "concatenated fragments");

    Ok(Packed { size_bits, buffer })
}

/// Writes a fragment at `at` by packing its bytes through a sequence of
/// `Uint(8)` fields with a trailing `Bits(rem)` for a partial last byte, so
/// unaligned placement goes through the scalar bit-shift path.
pub(crate) fn write_fragment(buffer: &mut [u8], at: BitPosition, fragment: &Packed) -> Result<()> {
    let whole = fragment.size_bits / 8;
    let rem = fragment.size_bits % 8;
    ensure_len(&fragment.buffer, bytes_for(fragment.size_bits))?;

    let mut children = Vec::with_capacity(whole + 1);
    let mut bytes = Vec::with_capacity(whole + 1);
    for byte in &fragment.buffer[..whole] {
        children.push(Structure::Scalar(Scalar::raw(ScalarKind::Uint, 8)));
        bytes.push(Value::Uint(*byte as u64));
    }
    if rem > 0 {
        children.push(Structure::Scalar(Scalar::raw(ScalarKind::Bits, rem)));
        bytes.push(Value::Uint(fragment.buffer[whole] as u64 & mask(rem)));
    }

    let layout = Sequence::from_children(children);
    layout.pack_at(&Value::List(bytes), Some(buffer), at, None, &Context::root())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_fragment_unaligned() {
        let fragment = Packed {
            size_bits: 12,
            buffer: vec![0xAB, 0x0C],
        };
        let mut buffer = vec![0u8; 3];
        write_fragment(&mut buffer, BitPosition::new(0, 4), &fragment).unwrap();
        assert_eq!(buffer, vec![0xB0, 0xCA, 0x00]);
    }

    #[test]
    fn test_write_fragment_masks_partial_byte() {
        let fragment = Packed {
            size_bits: 3,
            buffer: vec![0xFF],
        };
        let mut buffer = vec![0u8; 1];
        write_fragment(&mut buffer, BitPosition::ZERO, &fragment).unwrap();
        assert_eq!(buffer, vec![0x07]);
    }

    #[test]
    fn test_concat_sub_byte_fragments() {
        let fragments = vec![
            Packed {
                size_bits: 3,
                buffer: vec![0b101],
            },
            Packed {
                size_bits: 5,
                buffer: vec![0b10011],
            },
            Packed {
                size_bits: 8,
                buffer: vec![0x42],
            },
        ];
        let packed = concat(&fragments, 16).unwrap();
        assert_eq!(packed.buffer, vec![0b1001_1101, 0x42]);
    }

    #[test]
    fn test_emitter_region_mode() {
        let mut buffer = [0u8; 2];
        let child = Structure::uint(8).unwrap();
        let ctx = Context::root();
        let mut emitter = Emitter::new(Some(&mut buffer[..]), BitPosition::ZERO);
        emitter.emit(&child, &Value::Uint(1), None, &ctx).unwrap();
        emitter.emit(&child, &Value::Uint(2), None, &ctx).unwrap();
        assert_eq!(emitter.offset(), 16);
        let packed = emitter.finish().unwrap();
        assert_eq!(packed, Packed::sized(16));
        assert_eq!(buffer, [1, 2]);
    }
}
