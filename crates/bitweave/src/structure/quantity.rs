use std::{fmt, sync::Arc};

use crate::{
    context::Context,
    errors::{Error, Result},
};

pub type QuantityFn = Arc<dyn Fn(&Context<'_>) -> Result<usize> + Send + Sync>;

/// A size or count that is either fixed at construction or computed from the
/// context when the structure runs.
///
/// The unit depends on the consumer: padding counts bits, fixed buffers and
/// byte-budget repeats count bytes, count repeats count repetitions.
#[derive(Clone)]
pub enum Quantity {
    Fixed(usize),
    Computed(QuantityFn),
}

impl Quantity {
    pub fn from_fn<F>(compute: F) -> Self
    where
        F: Fn(&Context<'_>) -> Result<usize> + Send + Sync + 'static,
    {
        Quantity::Computed(Arc::new(compute))
    }

    /// The value of a previously processed field, found with [Context::lookup].
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        Quantity::from_fn(move |ctx| {
            let value = ctx.require(&name)?;
            value
                .as_u64()
                .and_then(|v| usize::try_from(v).ok())
                .ok_or(Error::TypeMismatch {
                    expected: "non-negative integer",
                    actual: value.kind_name(),
                })
        })
    }

    pub(crate) fn resolve(&self, ctx: &Context<'_>) -> Result<usize> {
        match self {
            Quantity::Fixed(n) => Ok(*n),
            Quantity::Computed(compute) => compute(ctx),
        }
    }
}

impl From<usize> for Quantity {
    fn from(value: usize) -> Self {
        Quantity::Fixed(value)
    }
}

impl fmt::Debug for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Fixed(n) => f.debug_tuple("Fixed").field(n).finish(),
            Quantity::Computed(_) => f.write_str("Computed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::Scope, value::Record};

    #[test]
    fn test_field_quantity() {
        let record = Record::new().with("len", 4u8).with("name", "x");
        let root = Context::root();
        let ctx = Context::child(Scope::Fields(&record), &root);

        assert_eq!(Quantity::field("len").resolve(&ctx).unwrap(), 4);
        assert_eq!(
            Quantity::field("name").resolve(&ctx).unwrap_err(),
            Error::TypeMismatch {
                expected: "non-negative integer",
                actual: "string"
            }
        );
        assert_eq!(
            Quantity::field("missing").resolve(&ctx).unwrap_err(),
            Error::MissingContext("missing".to_string())
        );
    }

    #[test]
    fn test_fixed_and_computed() {
        let ctx = Context::root();
        assert_eq!(Quantity::from(3).resolve(&ctx).unwrap(), 3);
        assert_eq!(Quantity::from_fn(|ctx| Ok(ctx.len() + 1)).resolve(&ctx).unwrap(), 1);
    }
}
