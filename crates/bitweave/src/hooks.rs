//! Application-level encode/decode hooks attached to a structure.
//!
//! An `encode` hook turns the caller's value into the wire value just before
//! packing; a `decode` hook turns the wire value into the caller's value just
//! after parsing. Both receive the context of the enclosing structure.
//!
//! Besides custom closures, a few stock hooks are provided:
//! - [Hooks::inspect]: logs every value passing through and leaves it unchanged.
//! - [Hooks::linear]: `value * scale + offset` on decode, the inverse on encode.
//! - [Hooks::labels]: maps integer codes to string labels and back.

use std::{borrow::Cow, collections::BTreeMap, fmt, sync::Arc};

use tracing::debug;

use crate::{
    context::Context,
    errors::{DefinitionError, Error, Result},
    value::Value,
};

pub type EncodeFn = Arc<dyn Fn(&Value, &Context<'_>) -> Result<Value> + Send + Sync>;
pub type DecodeFn = Arc<dyn Fn(Value, &Context<'_>) -> Result<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Hooks {
    encode: Option<EncodeFn>,
    decode: Option<DecodeFn>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("encode", &self.encode.is_some())
            .field("decode", &self.decode.is_some())
            .finish()
    }
}

impl Hooks {
    /// Hooks that pass values through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encode<F>(mut self, encode: F) -> Self
    where
        F: Fn(&Value, &Context<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.encode = Some(Arc::new(encode));
        self
    }

    pub fn with_decode<F>(mut self, decode: F) -> Self
    where
        F: Fn(Value, &Context<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.decode = Some(Arc::new(decode));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.encode.is_none() && self.decode.is_none()
    }

    pub(crate) fn encode<'v>(&self, value: &'v Value, ctx: &Context<'_>) -> Result<Cow<'v, Value>> {
        match &self.encode {
            Some(encode) => encode(value, ctx).map(Cow::Owned),
            None => Ok(Cow::Borrowed(value)),
        }
    }

    pub(crate) fn decode(&self, value: Value, ctx: &Context<'_>) -> Result<Value> {
        match &self.decode {
            Some(decode) => decode(value, ctx),
            None => Ok(value),
        }
    }

    /// Logs each value and its context at debug level, passing it through.
    pub fn inspect() -> Self {
        Hooks::new()
            .with_encode(|value, ctx| {
                debug!(%value, scope = ?ctx.scope(), "inspect encode");
                Ok(value.clone())
            })
            .with_decode(|value, ctx| {
                debug!(%value, scope = ?ctx.scope(), "inspect decode");
                Ok(value)
            })
    }

    /// Decodes `raw * scale + offset` as a float; encodes `(value - offset) / scale`
    /// rounded to the nearest integer.
    pub fn linear(scale: f64, offset: f64) -> std::result::Result<Self, DefinitionError> {
        if !scale.is_finite() || scale == 0.0 || !offset.is_finite() {
            return Err(DefinitionError::InvalidScaleOffset);
        }

        Ok(Hooks::new()
            .with_encode(move |value, _| {
                let v = value.as_f64().ok_or(Error::TypeMismatch {
                    expected: "number",
                    actual: value.kind_name(),
                })?;
                let raw = ((v - offset) / scale).round();
                if !raw.is_finite() {
                    return Err(Error::Hook(format!("linear encode of {value} is not finite")));
                }
                if raw >= 0.0 {
                    Ok(Value::Uint(raw as u64))
                } else {
                    Ok(Value::Int(raw as i64))
                }
            })
            .with_decode(move |value, _| {
                let raw = value.as_f64().ok_or(Error::TypeMismatch {
                    expected: "number",
                    actual: value.kind_name(),
                })?;
                Ok(Value::Float(raw * scale + offset))
            }))
    }

    /// Decodes integer codes to their label and encodes labels back to codes.
    /// Codes or labels absent from `labels` are hook errors.
    pub fn labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        let by_code: Arc<BTreeMap<i64, String>> = Arc::new(
            labels
                .into_iter()
                .map(|(code, label)| (code, label.into()))
                .collect(),
        );
        let by_label = Arc::clone(&by_code);

        Hooks::new()
            .with_encode(move |value, _| {
                let label = value.as_str().ok_or(Error::TypeMismatch {
                    expected: "string",
                    actual: value.kind_name(),
                })?;
                by_label
                    .iter()
                    .find(|(_, l)| l.as_str() == label)
                    .map(|(code, _)| Value::Int(*code))
                    .ok_or_else(|| Error::Hook(format!("no code for label {label:?}")))
            })
            .with_decode(move |value, _| {
                let code = value.as_i64().ok_or(Error::TypeMismatch {
                    expected: "integer",
                    actual: value.kind_name(),
                })?;
                by_code
                    .get(&code)
                    .map(|label| Value::Str(label.clone()))
                    .ok_or_else(|| Error::Hook(format!("no label for code {code}")))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hooks_pass_through() {
        let hooks = Hooks::new();
        let ctx = Context::root();
        let value = Value::Uint(5);
        assert!(hooks.is_empty());
        assert!(matches!(hooks.encode(&value, &ctx).unwrap(), Cow::Borrowed(_)));
        assert_eq!(hooks.decode(value.clone(), &ctx).unwrap(), value);
    }

    #[test]
    fn test_linear() {
        let hooks = Hooks::linear(0.5, -10.0).unwrap();
        let ctx = Context::root();
        assert_eq!(
            hooks.decode(Value::Uint(40), &ctx).unwrap(),
            Value::Float(10.0)
        );
        assert_eq!(
            hooks.encode(&Value::Float(10.0), &ctx).unwrap().into_owned(),
            Value::Uint(40)
        );
        assert_eq!(
            hooks.encode(&Value::Float(-12.0), &ctx).unwrap().into_owned(),
            Value::Int(-4)
        );
    }

    #[test]
    fn test_linear_rejects_zero_scale() {
        assert_eq!(
            Hooks::linear(0.0, 1.0).unwrap_err(),
            DefinitionError::InvalidScaleOffset
        );
        assert!(Hooks::linear(1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_linear_rejects_non_finite() {
        let hooks = Hooks::linear(1.0, 0.0).unwrap();
        let ctx = Context::root();
        assert_eq!(
            hooks.encode(&Value::Float(f64::NAN), &ctx).unwrap_err(),
            Error::Hook("linear encode of NaN is not finite".to_string())
        );
        assert!(hooks.encode(&Value::Float(f64::INFINITY), &ctx).is_err());

        let tiny = Hooks::linear(f64::MIN_POSITIVE, 0.0).unwrap();
        assert!(tiny.encode(&Value::Float(f64::MAX), &ctx).is_err());
    }

    #[test]
    fn test_labels() {
        let hooks = Hooks::labels([(1, "one"), (2, "two")]);
        let ctx = Context::root();
        assert_eq!(
            hooks.decode(Value::Uint(2), &ctx).unwrap(),
            Value::from("two")
        );
        assert_eq!(
            hooks.encode(&Value::from("one"), &ctx).unwrap().into_owned(),
            Value::Int(1)
        );
        assert!(matches!(
            hooks.decode(Value::Uint(3), &ctx),
            Err(Error::Hook(_))
        ));
    }

    #[test]
    fn test_inspect_is_identity() {
        let hooks = Hooks::inspect();
        let ctx = Context::root();
        let value = Value::from("abc");
        assert_eq!(hooks.encode(&value, &ctx).unwrap().into_owned(), value);
        assert_eq!(hooks.decode(value.clone(), &ctx).unwrap(), value);
    }
}
