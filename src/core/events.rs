//! Stage events and the event bus.
//!
//! Every stage reports asynchronous conditions (end of stream, errors,
//! warnings, state changes) as immutable events on a single ordered
//! queue. The supervisor is the one consumer; events are delivered in
//! arrival order, exactly once. Emitting informational events never
//! blocks a stage worker: if the bus is saturated a Warning or
//! StateChanged is dropped with a log line. Terminal events (Error,
//! EndOfStream) decide the whole run and are never dropped; their
//! emitter waits for bus space instead.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};

/// Retry interval while a terminal event waits for bus space.
const SEND_POLL: Duration = Duration::from_millis(20);

/// Classification of a stage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    /// The stage has delivered all data it will ever deliver.
    EndOfStream,
    /// Fatal condition; the whole graph will be torn down.
    Error,
    /// Degraded but non-fatal condition (duplicate resolution attempt,
    /// teardown timeout, dropped fan-out buffer).
    Warning,
    /// A lifecycle transition completed.
    StateChanged,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventCategory::EndOfStream => "end-of-stream",
            EventCategory::Error => "error",
            EventCategory::Warning => "warning",
            EventCategory::StateChanged => "state-changed",
        };
        f.write_str(s)
    }
}

/// Immutable record of one asynchronous stage condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvent {
    pub origin: String,
    pub category: EventCategory,
    pub detail: String,
}

impl StageEvent {
    pub fn new(
        origin: impl Into<String>,
        category: EventCategory,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            category,
            detail: detail.into(),
        }
    }

    pub fn end_of_stream(origin: impl Into<String>) -> Self {
        Self::new(origin, EventCategory::EndOfStream, "end of stream")
    }

    pub fn error(origin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(origin, EventCategory::Error, detail)
    }

    pub fn warning(origin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(origin, EventCategory::Warning, detail)
    }

    pub fn state_changed(origin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(origin, EventCategory::StateChanged, detail)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.category,
            EventCategory::EndOfStream | EventCategory::Error
        )
    }
}

impl fmt::Display for StageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.origin, self.category, self.detail)
    }
}

/// Cloneable producer handle onto the bus, handed to every stage context
/// and to the resolver.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<StageEvent>,
}

impl EventSender {
    /// Post an event.
    ///
    /// Informational events are non-blocking: a full bus drops them
    /// with a log line rather than stalling the emitting worker.
    /// Terminal events wait for space; losing one would leave the
    /// supervisor running forever. The supervisor drains continuously
    /// and never emits terminal events itself, so the wait always ends
    /// with delivery or a disconnected bus.
    pub fn emit(&self, event: StageEvent) {
        if event.is_terminal() {
            let mut pending = event;
            loop {
                match self.tx.send_timeout(pending, SEND_POLL) {
                    Ok(()) => return,
                    Err(SendTimeoutError::Timeout(back)) => pending = back,
                    Err(SendTimeoutError::Disconnected(_)) => return,
                }
            }
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                tracing::warn!("event bus full, dropping {}", ev);
            }
            Err(TrySendError::Disconnected(_)) => {
                // Supervisor gone; nothing left to notify.
            }
        }
    }
}

/// Single-consumer ordered event queue.
pub struct EventBus {
    tx: Sender<StageEvent>,
    rx: Option<Receiver<StageEvent>>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx: Some(rx) }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Take the consumer end. There is exactly one; a second call
    /// returns `None`.
    pub fn take_receiver(&mut self) -> Option<Receiver<StageEvent>> {
        self.rx.take()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
