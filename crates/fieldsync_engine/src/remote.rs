//! The remote system of record.

use crate::error::{SyncError, SyncResult};
use fieldsync_codec::Value;
use fieldsync_core::{PendingRecord, RecordId, RecordKind};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// One record pushed to the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    /// Record id.
    pub id: RecordId,
    /// Record kind; selects the remote endpoint.
    pub kind: RecordKind,
    /// The payload to apply.
    pub payload: Value,
    /// Client version.
    pub version: u64,
    /// Client modification time (unix millis).
    pub last_modified: u64,
}

impl PushRequest {
    /// Builds a request from a record. `None` if the record has no payload.
    pub fn from_record(record: &PendingRecord) -> Option<Self> {
        Some(Self {
            id: record.id,
            kind: record.kind,
            payload: record.payload.clone()?,
            version: record.version,
            last_modified: record.last_modified,
        })
    }
}

/// The remote's verdict on a push.
#[derive(Debug, Clone, PartialEq)]
pub enum PushResponse {
    /// The remote applied the payload.
    Accepted,
    /// The remote holds a different version.
    Conflict {
        /// The remote's current payload.
        server_payload: Value,
    },
}

/// The authoritative remote peer.
///
/// Any `Err` is treated as a transient failure and retried on a later
/// cycle. Implementations bound each call with their own timeout and report
/// it as [`SyncError::Timeout`].
pub trait RemotePeer: Send + Sync {
    /// Pushes one record.
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;
}

/// A scripted reply used by [`MockPeer`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Accept the push.
    Accept,
    /// Report a conflict with this server payload.
    Conflict(Value),
    /// Fail with a transient error.
    Fail(String),
    /// Fail with a timeout.
    Timeout,
}

/// A mock peer for testing.
///
/// Replies come from a per-record script first, then from the default.
#[derive(Debug)]
pub struct MockPeer {
    default_reply: Mutex<MockReply>,
    scripted: Mutex<HashMap<RecordId, VecDeque<MockReply>>>,
    pushed: Mutex<Vec<PushRequest>>,
}

impl MockPeer {
    /// Creates a peer that accepts everything.
    pub fn new() -> Self {
        Self::with_default(MockReply::Accept)
    }

    /// Creates a peer answering `reply` unless scripted otherwise.
    pub fn with_default(reply: MockReply) -> Self {
        Self {
            default_reply: Mutex::new(reply),
            scripted: Mutex::new(HashMap::new()),
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// Sets the default reply.
    pub fn set_default(&self, reply: MockReply) {
        *self.default_reply.lock() = reply;
    }

    /// Queues a one-shot reply for `id`.
    pub fn script(&self, id: RecordId, reply: MockReply) {
        self.scripted.lock().entry(id).or_default().push_back(reply);
    }

    /// Every request received so far.
    pub fn pushed(&self) -> Vec<PushRequest> {
        self.pushed.lock().clone()
    }

    /// Number of requests received so far.
    pub fn push_count(&self) -> usize {
        self.pushed.lock().len()
    }
}

impl Default for MockPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl RemotePeer for MockPeer {
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.pushed.lock().push(request.clone());

        let scripted = self
            .scripted
            .lock()
            .get_mut(&request.id)
            .and_then(VecDeque::pop_front);
        let reply = scripted.unwrap_or_else(|| self.default_reply.lock().clone());

        match reply {
            MockReply::Accept => Ok(PushResponse::Accepted),
            MockReply::Conflict(server_payload) => Ok(PushResponse::Conflict { server_payload }),
            MockReply::Fail(message) => Err(SyncError::transient(message)),
            MockReply::Timeout => Err(SyncError::Timeout),
        }
    }
}
