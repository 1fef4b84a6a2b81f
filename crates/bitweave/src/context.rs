//! The context chain handed to hooks, branch choosers and computed sizes.
//!
//! Every composite structure opens a [Context] for its children when it starts
//! a pack or parse. While parsing, the context exposes the values decoded so far;
//! while packing, it exposes the (already encoded) source value. Each context
//! links to the one that was active when its structure was invoked, so a child
//! can reach siblings of any ancestor. Contexts only borrow; nothing of the
//! chain ends up in decoded values.

use crate::{
    errors::{Error, Result},
    value::{Record, Value},
};

/// The values visible at one level of the chain.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// Top of the chain; nothing visible.
    Empty,
    /// Values of a sequence or repeat.
    Items(&'a [Value]),
    /// Fields of a keyed structure.
    Fields(&'a Record),
}

#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    scope: Scope<'a>,
    parent: Option<&'a Context<'a>>,
}

impl Context<'static> {
    /// The empty context a top-level pack or parse starts from.
    pub fn root() -> Self {
        Context {
            scope: Scope::Empty,
            parent: None,
        }
    }
}

impl<'a> Context<'a> {
    pub(crate) fn child(scope: Scope<'a>, parent: &'a Context<'a>) -> Self {
        Context {
            scope,
            parent: Some(parent),
        }
    }

    pub fn scope(&self) -> Scope<'a> {
        self.scope
    }

    pub fn parent(&self) -> Option<&'a Context<'a>> {
        self.parent
    }

    /// This context followed by every ancestor, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Context<'a>> {
        std::iter::successors(Some(self), |ctx| ctx.parent)
    }

    /// Field `name` at this level.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        match self.scope {
            Scope::Fields(record) => record.get(name),
            _ => None,
        }
    }

    /// Item `index` at this level.
    pub fn item(&self, index: usize) -> Option<&'a Value> {
        match self.scope {
            Scope::Items(items) => items.get(index),
            _ => None,
        }
    }

    /// Most recently produced item or field at this level.
    pub fn last(&self) -> Option<&'a Value> {
        match self.scope {
            Scope::Items(items) => items.last(),
            Scope::Fields(record) => record.iter().last().map(|(_, v)| v),
            Scope::Empty => None,
        }
    }

    /// Number of values visible at this level.
    pub fn len(&self) -> usize {
        match self.scope {
            Scope::Items(items) => items.len(),
            Scope::Fields(record) => record.len(),
            Scope::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field `name` at this level or the nearest ancestor that has one.
    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        let mut ctx = Some(self);
        while let Some(current) = ctx {
            if let Some(value) = current.get(name) {
                return Some(value);
            }
            ctx = current.parent;
        }

        None
    }

    /// Like [Context::lookup], failing with [Error::MissingContext].
    pub fn require(&self, name: &str) -> Result<&'a Value> {
        self.lookup(name)
            .ok_or_else(|| Error::MissingContext(name.to_string()))
    }
}
