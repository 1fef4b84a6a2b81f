use tracing::{debug, trace};

use crate::{
    bits::{BitPosition, Endian},
    context::{Context, Scope},
    errors::{DefinitionError, Error, Result},
    hooks::Hooks,
    value::Value,
};

use super::{
    Packed, Parsed, Quantity, Structure, check_embeds,
    fill::{Emitter, Feed, pack_items, parse_items},
};

/// How a [Repeat] decides when to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatPolicy {
    /// Run the body exactly `n` times.
    Count,
    /// Run the body until exactly `n` bytes are consumed.
    Bytes,
}

/// A body of children run repeatedly; the values of every repetition are
/// collected into one flat [Value::List].
#[derive(Debug, Clone)]
pub struct Repeat {
    body: Vec<Structure>,
    policy: RepeatPolicy,
    quantity: Quantity,
    hooks: Hooks,
    endian: Option<Endian>,
}

impl Repeat {
    /// Repeats `body` exactly `count` times.
    pub fn count(
        count: impl Into<Quantity>,
        body: impl IntoIterator<Item = Structure>,
    ) -> std::result::Result<Self, DefinitionError> {
        Self::new(RepeatPolicy::Count, count.into(), body)
    }

    /// Repeats `body` until `budget` bytes are consumed.
    pub fn bytes(
        budget: impl Into<Quantity>,
        body: impl IntoIterator<Item = Structure>,
    ) -> std::result::Result<Self, DefinitionError> {
        Self::new(RepeatPolicy::Bytes, budget.into(), body)
    }

    fn new(
        policy: RepeatPolicy,
        quantity: Quantity,
        body: impl IntoIterator<Item = Structure>,
    ) -> std::result::Result<Self, DefinitionError> {
        let body: Vec<Structure> = body.into_iter().collect();
        check_embeds("Repeat", &body)?;

        Ok(Repeat {
            body,
            policy,
            quantity,
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

    pub fn policy(&self) -> RepeatPolicy {
        self.policy
    }

    pub fn body(&self) -> &[Structure] {
        &self.body
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
        self.pack_into(&mut feed, &mut emitter, endian, &ctx)?;

        let packed = emitter.finish()?;
        debug!(policy = ?self.policy, size_bits = packed.size_bits, "packed repeat");

        Ok(packed)
    }

    /// Packs repetitions from `feed` through `emitter`. Also used when the
    /// repeat is embedded, in which case `feed` and `ctx` belong to the parent.
    pub(crate) fn pack_into(
        &self,
        feed: &mut Feed<'_>,
        emitter: &mut Emitter<'_>,
        endian: Option<Endian>,
        ctx: &Context<'_>,
    ) -> Result<()> {
        let endian = endian.or(self.endian);
        let quantity = self.quantity.resolve(ctx)?;
        let start = emitter.offset();

        match self.policy {
            RepeatPolicy::Count => {
                for _ in 0..quantity {
                    pack_items(&self.body, feed, emitter, endian, ctx)?;
                }
            }
            RepeatPolicy::Bytes => {
                let budget_bits = quantity * 8;
                while emitter.offset() - start < budget_bits {
                    let before = emitter.offset();
                    pack_items(&self.body, feed, emitter, endian, ctx)?;
                    if emitter.offset() == before {
                        return Err(Error::EmptyRepetition { budget: quantity });
                    }
                }

                let consumed_bits = emitter.offset() - start;
                if consumed_bits > budget_bits {
                    return Err(Error::BudgetOverrun {
                        operation: "pack",
                        budget: quantity,
                        consumed_bits,
                    });
                }
            }
        }

        let size_bits = emitter.offset() - start;
        trace!(policy = ?self.policy, quantity, size_bits, "packed repetitions");

        Ok(())
    }

    pub(crate) fn parse_at(
        &self,
        buffer: &[u8],
        at: BitPosition,
        endian: Option<Endian>,
        parent: &Context<'_>,
    ) -> Result<Parsed> {
        let mut items = Vec::new();
        let size_bits = self.parse_into(buffer, at, endian, parent, &mut items)?;

        debug!(policy = ?self.policy, items = items.len(), size_bits, "parsed repeat");

        let data = self.hooks.decode(Value::List(items), parent)?;
        Ok(Parsed { data, size_bits })
    }

    /// Parses repetitions, appending their values to `items`. When embedded,
    /// `items` is the parent's in-progress list.
    pub(crate) fn parse_into(
        &self,
        buffer: &[u8],
        at: BitPosition,
        endian: Option<Endian>,
        parent: &Context<'_>,
        items: &mut Vec<Value>,
    ) -> Result<usize> {
        let endian = endian.or(self.endian);
        let quantity = {
            let ctx = Context::child(Scope::Items(items), parent);
            self.quantity.resolve(&ctx)?
        };

        let mut offset = 0;
        match self.policy {
            RepeatPolicy::Count => {
                for _ in 0..quantity {
                    let from = at.advance(offset);
                    offset += parse_items(&self.body, buffer, from, endian, parent, items)?;
                }
            }
            RepeatPolicy::Bytes => {
                let budget_bits = quantity * 8;
                while offset < budget_bits {
                    let from = at.advance(offset);
                    let consumed = parse_items(&self.body, buffer, from, endian, parent, items)?;
                    if consumed == 0 {
                        return Err(Error::EmptyRepetition { budget: quantity });
                    }
                    offset += consumed;
                }

                if offset > budget_bits {
                    return Err(Error::BudgetOverrun {
                        operation: "parse",
                        budget: quantity,
                        consumed_bits: offset,
                    });
                }
            }
        }

        Ok(offset)
    }
}
