//! # FieldSync Core
//!
//! Durable bookkeeping for mutations made while a field device is offline.
//!
//! This crate provides:
//! - [`PendingRecord`] and its supporting types (kind, priority, strategy)
//! - A CRC-framed append-only [`log`] shared by every persisted structure
//! - The durable store: the [`RecordStore`] trait and its [`LogStore`]
//!   implementation
//! - Payload checksums and the [`IntegrityChecker`]
//! - A [`Clock`] seam for timestamps
//!
//! ```
//! use fieldsync_codec::Value;
//! use fieldsync_core::{LogStore, PendingRecord, Priority, RecordKind, RecordStore};
//!
//! let store = LogStore::in_memory().unwrap();
//! let record = PendingRecord::new(
//!     RecordKind::Grievance,
//!     Value::map([("category", Value::from("payment-delay"))]),
//!     Priority::High,
//!     1_700_000_000_000,
//! )
//! .unwrap();
//! store.put(record.clone()).unwrap();
//! assert_eq!(store.pending().unwrap(), vec![record]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod integrity;
pub mod log;
mod record;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use integrity::{digest, CorruptionKind, IntegrityChecker, IntegrityVerdict, RepairPolicy};
pub use record::{Checksum, ConflictStrategy, PendingRecord, Priority, RecordId, RecordKind};
pub use store::{LogStore, RecordStore};
