//! Links: directed, typed connections between ports.
//!
//! One link associates a single producer port with one or more consumer
//! branches (fan-out). Every branch owns an independent bounded queue:
//! with a single branch the producer blocks on a full queue (bounded
//! backpressure); with several branches delivery is non-blocking and a
//! full branch drops that buffer for that branch only, so a stalled
//! consumer never throttles or corrupts its siblings.
//!
//! A link is *pending* until every endpoint port exists and has passed
//! the type-compatibility check, then *resolved*. The pending/resolved
//! state sits behind a lock scoped to this one link.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;

use super::buffers::Buffer;
use super::ports::{MediaType, PortRef};

/// How often a blocked single-branch send re-checks the shutdown flag.
const SEND_POLL: Duration = Duration::from_millis(20);

/// Default bounded capacity of one branch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Resolution state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// At least one endpoint port does not exist yet.
    Pending,
    /// All endpoints exist, types are compatible, data may flow.
    Resolved,
}

/// Bookkeeping for one fan-out branch.
#[derive(Debug, Clone)]
pub struct BranchInfo {
    pub consumer: PortRef,
    pub capacity: usize,
}

/// Producer-side handle for one link: the set of branch senders a stage
/// worker pushes into. Shared between the graph (which wires branches)
/// and the producing worker.
#[derive(Default)]
pub struct LinkOutput {
    senders: Mutex<Vec<Sender<Buffer>>>,
    dropped: AtomicU64,
}

impl LinkOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add_sender(&self, tx: Sender<Buffer>) {
        self.senders.lock().push(tx);
    }

    pub fn branch_count(&self) -> usize {
        self.senders.lock().len()
    }

    /// Buffers dropped on full fan-out branches since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Deliver one buffer to every branch.
    ///
    /// Single branch: blocking bounded send, re-checking `shutdown` so
    /// teardown can always interrupt a stalled producer. Multiple
    /// branches: non-blocking per-branch send; a full branch drops the
    /// buffer for that branch only.
    pub fn push(&self, buffer: Buffer, shutdown: &AtomicBool) {
        let senders = self.senders.lock().clone();
        match senders.as_slice() {
            [] => {
                tracing::trace!(seq = buffer.seq(), "push on unlinked output, dropping");
            }
            [tx] => {
                let mut pending = buffer;
                loop {
                    if shutdown.load(Ordering::Relaxed) {
                        return;
                    }
                    match tx.send_timeout(pending, SEND_POLL) {
                        Ok(()) => return,
                        Err(SendTimeoutError::Timeout(back)) => pending = back,
                        Err(SendTimeoutError::Disconnected(_)) => return,
                    }
                }
            }
            many => {
                for tx in many {
                    match tx.try_send(buffer.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            tracing::trace!(seq = buffer.seq(), "fan-out branch full, dropping");
                        }
                        Err(TrySendError::Disconnected(_)) => {}
                    }
                }
            }
        }
    }
}

/// One producer port feeding one or more consumer branches.
pub struct Link {
    id: String,
    producer: PortRef,
    media_type: MediaType,
    dynamic: bool,
    state: Mutex<LinkState>,
    output: Arc<LinkOutput>,
    branches: Mutex<Vec<BranchInfo>>,
}

impl Link {
    pub(crate) fn new(producer: PortRef, media_type: MediaType, dynamic: bool) -> Arc<Self> {
        Arc::new(Self {
            id: cuid2::create_id(),
            producer,
            media_type,
            dynamic,
            state: Mutex::new(if dynamic {
                LinkState::Pending
            } else {
                LinkState::Resolved
            }),
            output: LinkOutput::new(),
            branches: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn producer(&self) -> &PortRef {
        &self.producer
    }

    /// The media type data on this link must carry (taken from the first
    /// consumer port; later branches must be compatible with it).
    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Whether the producer port is discovered only at run time.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    pub fn is_resolved(&self) -> bool {
        self.state() == LinkState::Resolved
    }

    pub(crate) fn mark_resolved(&self) {
        *self.state.lock() = LinkState::Resolved;
    }

    pub(crate) fn mark_pending(&self) {
        *self.state.lock() = LinkState::Pending;
    }

    pub fn output(&self) -> &Arc<LinkOutput> {
        &self.output
    }

    pub(crate) fn add_branch(&self, consumer: PortRef, capacity: usize, tx: Sender<Buffer>) {
        self.output.add_sender(tx);
        self.branches.lock().push(BranchInfo { consumer, capacity });
    }

    pub fn branches(&self) -> Vec<BranchInfo> {
        self.branches.lock().clone()
    }

    /// Whether an appeared producer port satisfies this link's producer
    /// slot: same stage, matching (or wildcard) port name, compatible
    /// media type.
    pub(crate) fn matches_appeared(&self, stage: &str, port: &str, media_type: &MediaType) -> bool {
        self.producer.stage == stage
            && (self.producer.is_wildcard() || self.producer.port == port)
            && self.media_type.compatible(media_type)
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("producer", &self.producer)
            .field("media_type", &self.media_type)
            .field("state", &self.state())
            .field("branches", &self.branches.lock().len())
            .finish()
    }
}
