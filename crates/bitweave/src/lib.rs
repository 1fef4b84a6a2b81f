//! # bitweave
//!
//! A library for declaratively describing packed binary layouts at bit
//! granularity, and for packing values into them or parsing buffers out of them.
//!
//! Layouts are composed from scalar fields (unsigned and signed integers, sub-byte
//! bit fields, IEEE floats, UTF-8 text) and combinators (sequences, keyed records,
//! repetition, branching on earlier values, embedding, padding and opaque byte
//! runs). Later fields can depend on values decoded earlier through the
//! [context::Context] chain, which makes tagged unions and length-prefixed
//! blocks straightforward.
//!
//! ## Example
//!
//! ```
//! use bitweave::{Branch, Keyed, Quantity, Repeat, Structure, Value};
//!
//! let message: Structure = Keyed::new([
//!     ("kind", Structure::uint(8).unwrap()),
//!     ("count", Structure::uint(8).unwrap()),
//!     (
//!         "values",
//!         Repeat::count(Quantity::field("count"), [Structure::uint(16).unwrap()])
//!             .unwrap()
//!             .into(),
//!     ),
//!     (
//!         "trailer",
//!         Branch::on_field("kind")
//!             .choice(1, Structure::utf8(16).unwrap())
//!             .otherwise(Structure::uint(16).unwrap())
//!             .into(),
//!     ),
//! ])
//! .unwrap()
//! .into();
//!
//! let parsed = message.parse(&[1, 2, 0x00, 0x0A, 0x00, 0x0B, b'o', b'k']).unwrap();
//! let record = parsed.data.as_record().unwrap();
//! assert_eq!(record.get("values"), Some(&Value::List(vec![Value::Uint(10), Value::Uint(11)])));
//! assert_eq!(record.get("trailer"), Some(&Value::from("ok")));
//!
//! let packed = message.pack(parsed.data.clone()).unwrap();
//! assert_eq!(packed.buffer, vec![1, 2, 0x00, 0x0A, 0x00, 0x0B, b'o', b'k']);
//! ```

pub mod bits;
pub mod codec;
pub mod context;
pub mod errors;
pub mod hooks;
pub mod scalar;
#[cfg(feature = "serde")]
mod serde;
pub mod structure;
pub mod value;

pub use bits::{BitPosition, Endian};
pub use context::{Context, Scope};
pub use errors::{DefinitionError, Error, Result};
pub use hooks::Hooks;
pub use scalar::{Scalar, ScalarKind};
pub use structure::{
    Branch, ChoiceKey, FixedBuffer, Keyed, Options, Packed, Padding, Parsed, Quantity, Repeat,
    RepeatPolicy, Sequence, Source, Structure,
};
pub use value::{Record, Value};
