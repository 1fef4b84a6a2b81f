//! Error types for structure construction and for pack/parse calls.

use thiserror::Error;

/// Result type for pack and parse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building a [crate::Structure]. These are raised once,
/// at construction time, and never at pack/parse time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// Requested bit width is not in the primitive's allowed set.
    #[error("Invalid size: {width} bits is not a valid {kind} width")]
    InvalidWidth { kind: &'static str, width: usize },

    /// Two fields of a keyed structure share a name.
    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    /// An embedded structure cannot be spliced into its parent's result.
    #[error("Cannot embed a {embedded} structure into a {parent} structure")]
    EmbedMismatch {
        parent: &'static str,
        embedded: &'static str,
    },

    /// Scale or offset of a linear hook is zero or non-finite.
    #[error("Invalid scale/offset: scale must be finite and non-zero, offset finite")]
    InvalidScaleOffset,
}

/// Errors produced by a pack or parse call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Value out of range, not an exact integer, or beyond the safe integer limit.
    #[error("Unable to encode {value} to {kind}{width}")]
    Encoding {
        value: String,
        kind: &'static str,
        width: usize,
    },

    /// A parsed 64-bit unsigned value exceeds the safe integer range.
    #[error("Uint64 out of safe integer range: {bytes}")]
    UnsafeInteger { bytes: String },

    /// The source ran out of items or keys before every child was packed.
    #[error("Insufficient data for serialization: {0}")]
    InsufficientData(String),

    /// A fixed buffer received a value of the wrong length.
    #[error("Length mismatch. Expected length: {expected}, actual length: {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A byte-budget repeat consumed more than its budget.
    #[error("Cannot {operation} into exactly {budget} bytes (consumed {consumed_bits} bits)")]
    BudgetOverrun {
        operation: &'static str,
        budget: usize,
        consumed_bits: usize,
    },

    /// A repetition of a byte-budget repeat consumed nothing.
    #[error("Repeat body consumed no data; byte budget {budget} can never be reached")]
    EmptyRepetition { budget: usize },

    /// A branch discriminant matched no choice and there is no default.
    #[error("Choice {key} not in [{}]", valid.join(", "))]
    InvalidChoice {
        key: String,
        valid: Vec<String>,
        byte_offset: Option<usize>,
        bytes: Option<String>,
    },

    /// A string does not fit its declared width or the buffer.
    #[error("Input string serializes to {length} bytes, only {capacity} available")]
    StringOverflow { length: usize, capacity: usize },

    /// A byte-aligned codec ran at a non-zero bit offset.
    #[error("{kind} requires byte alignment, got bit offset {bit}")]
    Misaligned { kind: &'static str, bit: u8 },

    /// A read or write would go past the end of the buffer.
    #[error("Out of bounds: need {needed} bytes, buffer has {available}")]
    OutOfBounds { needed: usize, available: usize },

    /// Parsed bytes are not valid UTF-8.
    #[error("Invalid UTF-8 at byte {0}")]
    InvalidUtf8(usize),

    /// A value has the wrong shape for the structure handling it.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A context lookup found no value under the requested name.
    #[error("No value named {0} in context")]
    MissingContext(String),

    /// An encode or decode hook rejected a value.
    #[error("Hook failed: {0}")]
    Hook(String),
}
