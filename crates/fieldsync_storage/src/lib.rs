//! # FieldSync Storage
//!
//! Byte-level storage backends for the FieldSync outbox.
//!
//! A backend is an **opaque append-only byte store**. It knows nothing about
//! records, frames or checksums; the core crate owns every format decision
//! and only asks a backend to append, read back, flush and truncate.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - tests and throwaway outboxes
//! - [`FileBackend`] - one file per log on the device filesystem
//!
//! ## Example
//!
//! ```rust
//! use fieldsync_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
