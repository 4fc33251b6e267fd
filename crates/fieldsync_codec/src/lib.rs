//! # FieldSync Codec
//!
//! The structured payload type carried by every pending record, and the
//! binary encoding used both to persist it and to checksum it.
//!
//! Two encodings share one wire format (a CBOR subset):
//!
//! - [`encode`] is **faithful**: map entries keep insertion order, duplicate
//!   keys and non-finite floats are written as-is. Storage uses it so that a
//!   damaged payload is persisted exactly as it was found.
//! - [`canonicalize`] is **deterministic**: map keys are sorted (length
//!   first, then bytewise), integers use the shortest form, and anything
//!   without a single canonical form (duplicate keys, NaN, infinities) is
//!   rejected. Checksums are computed over this form.
//!
//! ```
//! use fieldsync_codec::{canonicalize, decode, Value};
//!
//! let a = Value::map([("name", Value::from("Bob")), ("age", Value::from(40))]);
//! let b = Value::map([("age", Value::from(40)), ("name", Value::from("Bob"))]);
//! assert_eq!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
//!
//! let bytes = canonicalize(&a).unwrap();
//! assert_eq!(decode(&bytes).unwrap().get("name"), Some(&Value::from("Bob")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod serde_impl;
mod value;

pub use decoder::{decode, Decoder};
pub use encoder::{canonicalize, encode, Encoder, EncodingMode};
pub use error::{CodecError, CodecResult};
pub use value::Value;
