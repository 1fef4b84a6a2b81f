use tracing::debug;

use crate::{
    bits::{BitPosition, Endian},
    context::{Context, Scope},
    errors::{DefinitionError, Error, Result},
    hooks::Hooks,
    value::Value,
};

use super::{
    Packed, Parsed, Structure, check_embeds,
    fill::{Emitter, pack_items, parse_items},
};

/// Ordered children decoded as a [Value::List]. Declaration order is wire order.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    children: Vec<Structure>,
    hooks: Hooks,
    endian: Option<Endian>,
}

impl Sequence {
    pub fn new(
        children: impl IntoIterator<Item = Structure>,
    ) -> std::result::Result<Self, DefinitionError> {
        let children: Vec<Structure> = children.into_iter().collect();
        check_embeds("Sequence", &children)?;

        Ok(Self::from_children(children))
    }

    pub(crate) fn from_children(children: Vec<Structure>) -> Self {
        Sequence {
            children,
            hooks: Hooks::default(),
            endian: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Endianness passed down to every child, taking precedence over the
    /// children's declared endianness. A call-site endianness still wins.
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    pub fn children(&self) -> &[Structure] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn endian(&self) -> Option<Endian> {
        self.endian
    }

    pub(crate) fn pack_at(
        &self,
        value: &Value,
        region: Option<&mut [u8]>,
        at: BitPosition,
        endian: Option<Endian>,
        parent: &Context<'_>,
    ) -> Result<Packed> {
        let encoded = self.hooks.encode(value, parent)?;
        let items = encoded.as_list().ok_or(Error::TypeMismatch {
            expected: "list",
            actual: encoded.kind_name(),
        })?;

        let ctx = Context::child(Scope::Items(items), parent);
        let mut feed = items.iter();
        let mut emitter = Emitter::new(region, at);
        pack_items(&self.children, &mut feed, &mut emitter, endian.or(self.endian), &ctx)?;

        let packed = emitter.finish()?;
        debug!(children = self.children.len(), size_bits = packed.size_bits, "packed sequence");

        Ok(packed)
    }

    pub(crate) fn parse_at(
        &self,
        buffer: &[u8],
        at: BitPosition,
        endian: Option<Endian>,
        parent: &Context<'_>,
    ) -> Result<Parsed> {
        let mut items = Vec::with_capacity(self.children.len());
        let endian = endian.or(self.endian);
        let size_bits = parse_items(&self.children, buffer, at, endian, parent, &mut items)?;

        debug!(items = items.len(), size_bits, "parsed sequence");

        let data = self.hooks.decode(Value::List(items), parent)?;
        Ok(Parsed { data, size_bits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        scalar::Scalar,
        structure::{Padding, Repeat},
    };

    fn list(values: &[u64]) -> Value {
        Value::List(values.iter().map(|v| Value::Uint(*v)).collect())
    }

    fn u8_field() -> Structure {
        Structure::uint(8).unwrap()
    }

    #[test]
    fn test_parse_flat() {
        let sequence: Structure =
            Sequence::new([u8_field(), Structure::uint(16).unwrap()]).unwrap().into();
        let parsed = sequence.parse(&[1, 0x02, 0x03]).unwrap();
        assert_eq!(parsed.data, list(&[1, 0x0203]));
        assert_eq!(parsed.size_bits, 24);
    }

    #[test]
    fn test_pack_sub_byte_fields() {
        let sequence: Structure = Sequence::new([
            Structure::bits(3).unwrap(),
            Structure::bits(5).unwrap(),
            u8_field(),
        ])
        .unwrap()
        .into();

        let packed = sequence.pack(list(&[0b101, 0b10011, 0x42])).unwrap();
        assert_eq!(packed.size_bits, 16);
        assert_eq!(packed.buffer, vec![0b1001_1101, 0x42]);

        let parsed = sequence.parse(&packed.buffer).unwrap();
        assert_eq!(parsed.data, list(&[0b101, 0b10011, 0x42]));
    }

    #[test]
    fn test_pack_insufficient_data() {
        let sequence: Structure = Sequence::new([u8_field(), u8_field()]).unwrap().into();
        assert!(matches!(
            sequence.pack(list(&[1])),
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn test_pack_requires_list() {
        let sequence: Structure = Sequence::new([u8_field()]).unwrap().into();
        assert_eq!(
            sequence.pack(Value::Uint(1)).unwrap_err(),
            Error::TypeMismatch {
                expected: "list",
                actual: "uint"
            }
        );
    }

    #[test]
    fn test_embed_splices_items() {
        let inner = Sequence::new([u8_field(), u8_field()]).unwrap();
        let sequence: Structure = Sequence::new([u8_field(), Structure::embed(inner), u8_field()])
            .unwrap()
            .into();

        let parsed = sequence.parse(&[0, 1, 2, 3]).unwrap();
        assert_eq!(parsed.data, list(&[0, 1, 2, 3]));
        assert_eq!(parsed.size_bits, 32);

        let packed = sequence.pack(list(&[0, 1, 2, 3])).unwrap();
        assert_eq!(packed.buffer, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_embed_scalar_is_single_value() {
        let sequence: Structure =
            Sequence::new([u8_field(), Structure::embed(u8_field())]).unwrap().into();
        assert_eq!(sequence.parse(&[7, 8]).unwrap().data, list(&[7, 8]));
    }

    #[test]
    fn test_embedded_repeat_is_flat() {
        let repeat = Repeat::count(2usize, [u8_field()]).unwrap();
        let sequence: Structure =
            Sequence::new([u8_field(), Structure::embed(repeat)]).unwrap().into();
        assert_eq!(sequence.parse(&[1, 2, 3]).unwrap().data, list(&[1, 2, 3]));
        assert_eq!(sequence.pack(list(&[1, 2, 3])).unwrap().buffer, vec![1, 2, 3]);
    }

    #[test]
    fn test_padding_consumes_no_item() {
        let sequence: Structure =
            Sequence::new([u8_field(), Padding::new(8usize).into(), u8_field()])
                .unwrap()
                .into();

        let packed = sequence.pack(list(&[1, 2])).unwrap();
        assert_eq!(packed.buffer, vec![1, 0, 2]);

        let parsed = sequence.parse(&[1, 0xFF, 2]).unwrap();
        assert_eq!(parsed.data, list(&[1, 2]));
        assert_eq!(parsed.size_bits, 24);
    }

    #[test]
    fn test_sequence_endian_overrides_children() {
        let sequence: Structure = Sequence::new([Structure::uint(16).unwrap()])
            .unwrap()
            .with_endian(Endian::Little)
            .into();
        assert_eq!(sequence.parse(&[0x01, 0x02]).unwrap().data, list(&[0x0201]));

        let big = Scalar::uint(16).unwrap().with_endian(Endian::Big);
        let overridden: Structure = Sequence::new([Structure::from(big)])
            .unwrap()
            .with_endian(Endian::Little)
            .into();
        assert_eq!(overridden.parse(&[0x01, 0x02]).unwrap().data, list(&[0x0201]));
    }

    #[test]
    fn test_hooks_see_whole_list() {
        let sequence: Structure = Sequence::new([u8_field(), u8_field()])
            .unwrap()
            .with_hooks(
                Hooks::new()
                    .with_decode(|value, _| {
                        let sum: u64 = value
                            .as_list()
                            .unwrap_or_default()
                            .iter()
                            .filter_map(Value::as_u64)
                            .sum();
                        Ok(Value::Uint(sum))
                    })
                    .with_encode(|value, _| {
                        let total = value.as_u64().unwrap_or(0);
                        let half = total / 2;
                        Ok(Value::List(vec![Value::Uint(half), Value::Uint(total - half)]))
                    }),
            )
            .into();

        assert_eq!(sequence.parse(&[3, 4]).unwrap().data, Value::Uint(7));
        assert_eq!(sequence.pack(Value::Uint(7)).unwrap().buffer, vec![3, 4]);
    }

    #[test]
    fn test_misaligned_text_rejected_on_fresh_pack() {
        let sequence: Structure = Sequence::new([
            Structure::bits(4).unwrap(),
            Structure::utf8(8).unwrap(),
            Structure::bits(4).unwrap(),
        ])
        .unwrap()
        .into();
        let source = Value::List(vec![Value::Uint(1), Value::from("A"), Value::Uint(2)]);

        assert_eq!(
            sequence.pack(source).unwrap_err(),
            Error::Misaligned { kind: "Utf8", bit: 4 }
        );
    }

    #[test]
    fn test_nested_fresh_pack_sees_outer_offset() {
        let inner = Sequence::new([Structure::utf8(8).unwrap()]).unwrap();
        let outer: Structure = Sequence::new([Structure::bits(4).unwrap(), inner.into()])
            .unwrap()
            .into();
        let source = Value::List(vec![Value::Uint(1), Value::List(vec![Value::from("A")])]);

        assert_eq!(
            outer.pack(source).unwrap_err(),
            Error::Misaligned { kind: "Utf8", bit: 4 }
        );
    }
}
