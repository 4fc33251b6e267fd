//! # FieldSync Engine
//!
//! Offline-first synchronization of field-collected records.
//!
//! This crate provides:
//! - The local [`Outbox`]: durable store, priority [`SyncQueue`] and
//!   [`ReviewLedger`]
//! - Sync cycles (integrity check, repair, push, conflict resolution)
//! - [`ConflictResolver`] with per-kind merge allow-lists
//! - [`RemotePeer`] and [`ConnectivityObserver`] seams with in-process
//!   implementations
//! - A tokio [`SyncScheduler`] that syncs on reconnect and on a timer
//!
//! ## Key Invariants
//!
//! - A record is marked synced only after the remote accepts it
//! - Every version change is accompanied by a fresh checksum
//! - At most one sync cycle runs at a time
//! - Records in manual review are never retried automatically
//!
//! ```
//! use fieldsync_codec::Value;
//! use fieldsync_core::{ManualClock, Priority, RecordKind};
//! use fieldsync_engine::{ConnectivityState, MockPeer, Outbox, SyncConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! let outbox = Outbox::in_memory(SyncConfig::default(), Arc::new(ManualClock::new(0))).unwrap();
//! let engine = SyncEngine::new(outbox, MockPeer::new(), Arc::new(ConnectivityState::online()));
//!
//! engine
//!     .save(RecordKind::Grievance, Value::from("no water"), Priority::High)
//!     .unwrap();
//! let outcome = engine.sync().unwrap();
//! assert!(outcome.success);
//! assert_eq!(outcome.synced_count, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod connectivity;
mod engine;
mod error;
mod ledger;
mod orchestrator;
mod outbox;
mod outcome;
mod queue;
mod remote;
mod scheduler;

pub use config::{MergeAllowList, SyncConfig};
pub use conflict::{ConflictCase, ConflictResolution, ConflictResolver};
pub use connectivity::{ConnectivityObserver, ConnectivityState};
pub use engine::{SyncEngine, SyncStats};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use ledger::{ManualReviewEntry, ReviewAction, ReviewLedger, ReviewReason};
pub use outbox::Outbox;
pub use outcome::{RecordError, ReviewResolution, StorageSummary, SyncOutcome, SyncSkipped};
pub use queue::SyncQueue;
pub use remote::{MockPeer, MockReply, PushRequest, PushResponse, RemotePeer};
pub use scheduler::{SchedulerHandle, SyncScheduler, SyncTrigger};
