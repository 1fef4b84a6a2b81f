use tracing::debug;

use crate::{
    bits::{BitPosition, Endian},
    context::{Context, Scope},
    errors::{DefinitionError, Error, Result},
    hooks::Hooks,
    value::{Record, Value},
};

use super::{
    Packed, Parsed, Structure, check_embeds,
    fill::{Emitter, pack_fields, parse_fields},
};

/// Named children decoded as a [Value::Record]. Declaration order is wire order
/// and the order of the decoded record.
#[derive(Debug, Clone, Default)]
pub struct Keyed {
    fields: Vec<(String, Structure)>,
    hooks: Hooks,
    endian: Option<Endian>,
}

impl Keyed {
    /// Builds a keyed structure. Field names must be unique; the name given to
    /// an embedded keyed structure is not used.
    pub fn new<K>(
        fields: impl IntoIterator<Item = (K, Structure)>,
    ) -> std::result::Result<Self, DefinitionError>
    where
        K: Into<String>,
    {
        let mut declared: Vec<(String, Structure)> = Vec::new();
        for (name, child) in fields {
            let name = name.into();
            if declared.iter().any(|(existing, _)| *existing == name) {
                return Err(DefinitionError::DuplicateField(name));
            }
            declared.push((name, child));
        }

        check_embeds("Keyed", declared.iter().map(|(_, child)| child))?;

        Ok(Keyed {
            fields: declared,
            hooks: Hooks::default(),
            endian: None,
        })
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// See [super::Sequence::with_endian].
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    pub fn fields(&self) -> &[(String, Structure)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Structure> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, child)| child)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
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
        let record = encoded.as_record().ok_or(Error::TypeMismatch {
            expected: "record",
            actual: encoded.kind_name(),
        })?;

        let ctx = Context::child(Scope::Fields(record), parent);
        let mut emitter = Emitter::new(region, at);
        pack_fields(&self.fields, record, &mut emitter, endian.or(self.endian), &ctx)?;

        let packed = emitter.finish()?;
        debug!(fields = self.fields.len(), size_bits = packed.size_bits, "packed keyed");

        Ok(packed)
    }

    pub(crate) fn parse_at(
        &self,
        buffer: &[u8],
        at: BitPosition,
        endian: Option<Endian>,
        parent: &Context<'_>,
    ) -> Result<Parsed> {
        let mut record = Record::with_capacity(self.fields.len());
        let endian = endian.or(self.endian);
        let size_bits = parse_fields(&self.fields, buffer, at, endian, parent, &mut record)?;

        debug!(fields = record.len(), size_bits, "parsed keyed");

        let data = self.hooks.decode(Value::Record(record), parent)?;
        Ok(Parsed { data, size_bits })
    }
}
