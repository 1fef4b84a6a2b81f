use std::{collections::BTreeMap, fmt, sync::Arc};

use tracing::trace;

use crate::{
    bits::{BitPosition, hex_bytes},
    context::Context,
    errors::{Error, Result},
    value::Value,
};

use super::Structure;

/// Maximum number of bytes quoted in an invalid-choice error.
const QUOTED_BYTES: usize = 16;

pub type Chooser = Arc<dyn Fn(&Context<'_>) -> Result<ChoiceKey> + Send + Sync>;

/// Discriminant selecting a branch arm.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(untagged)
)]
pub enum ChoiceKey {
    Int(i64),
    Name(String),
}

impl fmt::Display for ChoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChoiceKey::Int(v) => write!(f, "{v}"),
            ChoiceKey::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<i64> for ChoiceKey {
    fn from(value: i64) -> Self {
        ChoiceKey::Int(value)
    }
}

impl From<i32> for ChoiceKey {
    fn from(value: i32) -> Self {
        ChoiceKey::Int(value as i64)
    }
}

impl From<u8> for ChoiceKey {
    fn from(value: u8) -> Self {
        ChoiceKey::Int(value as i64)
    }
}

impl From<u16> for ChoiceKey {
    fn from(value: u16) -> Self {
        ChoiceKey::Int(value as i64)
    }
}

impl From<u32> for ChoiceKey {
    fn from(value: u32) -> Self {
        ChoiceKey::Int(value as i64)
    }
}

impl From<&str> for ChoiceKey {
    fn from(value: &str) -> Self {
        ChoiceKey::Name(value.to_string())
    }
}

impl From<String> for ChoiceKey {
    fn from(value: String) -> Self {
        ChoiceKey::Name(value)
    }
}

impl TryFrom<&Value> for ChoiceKey {
    type Error = Error;

    fn try_from(value: &Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Str(name) => Ok(ChoiceKey::Name(name.clone())),
            other => other.as_i64().map(ChoiceKey::Int).ok_or(Error::TypeMismatch {
                expected: "integer or string",
                actual: other.kind_name(),
            }),
        }
    }
}

/// Chooses one of several structures from the current context and hands the
/// whole pack or parse to it.
#[derive(Clone)]
pub struct Branch {
    chooser: Chooser,
    choices: BTreeMap<ChoiceKey, Structure>,
    default: Option<Box<Structure>>,
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("choices", &self.choices)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

impl Branch {
    pub fn new<F>(chooser: F) -> Self
    where
        F: Fn(&Context<'_>) -> Result<ChoiceKey> + Send + Sync + 'static,
    {
        Branch {
            chooser: Arc::new(chooser),
            choices: BTreeMap::new(),
            default: None,
        }
    }

    /// Chooses by the value of a previously processed field, found with
    /// [Context::lookup].
    pub fn on_field(name: impl Into<String>) -> Self {
        let name = name.into();
        Branch::new(move |ctx| ChoiceKey::try_from(ctx.require(&name)?))
    }

    /// Chooses by the value of item `index` of the enclosing list.
    pub fn on_item(index: usize) -> Self {
        Branch::new(move |ctx| {
            let value = ctx
                .item(index)
                .ok_or_else(|| Error::MissingContext(format!("item {index}")))?;
            ChoiceKey::try_from(value)
        })
    }

    pub fn choice(mut self, key: impl Into<ChoiceKey>, structure: impl Into<Structure>) -> Self {
        self.choices.insert(key.into(), structure.into());
        self
    }

    /// Structure used when no choice matches.
    pub fn otherwise(mut self, structure: impl Into<Structure>) -> Self {
        self.default = Some(Box::new(structure.into()));
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &ChoiceKey> {
        self.choices.keys()
    }

    /// Selects the arm for a pack call.
    pub(crate) fn select(&self, ctx: &Context<'_>) -> Result<&Structure> {
        let key = (self.chooser)(ctx)?;
        self.arm(key)
    }

    /// Selects the arm for a parse call at `at`; an invalid choice reports the
    /// offset and the bytes found there.
    pub(crate) fn select_at(
        &self,
        ctx: &Context<'_>,
        buffer: &[u8],
        at: BitPosition,
    ) -> Result<&Structure> {
        let key = (self.chooser)(ctx)?;
        self.arm(key).map_err(|err| match err {
            Error::InvalidChoice { key, valid, .. } => {
                let start = at.byte().min(buffer.len());
                let end = (start + QUOTED_BYTES).min(buffer.len());
                Error::InvalidChoice {
                    key,
                    valid,
                    byte_offset: Some(at.byte()),
                    bytes: Some(hex_bytes(&buffer[start..end])),
                }
            }
            other => other,
        })
    }

    fn arm(&self, key: ChoiceKey) -> Result<&Structure> {
        trace!(%key, "branch choice");

        if let Some(structure) = self.choices.get(&key) {
            return Ok(structure);
        }

        match &self.default {
            Some(structure) => Ok(&**structure),
            None => Err(Error::InvalidChoice {
                key: key.to_string(),
                valid: self.choices.keys().map(ToString::to_string).collect(),
                byte_offset: None,
                bytes: None,
            }),
        }
    }
}
