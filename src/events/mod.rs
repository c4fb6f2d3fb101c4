//! Reconciliation events attached to the owning resource.
//!
//! Every externally visible step of a pass (scope created, ACL updated,
//! scope deactivated, ...) produces a [`ReconcileEvent`]. The engine writes
//! events to an [`EventSink`]; the sink decides where they go.
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ ScopeReconciler │────>│    EventSink    │────>│  EventBus /     │
//! │ (lifecycle,acl) │     │    (record)     │     │  EventLog       │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! - [`EventBus`]: broadcast channel for long-running workers with live subscribers
//! - [`EventLog`]: in-memory list, drained after a one-shot pass and used in tests

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::OwnerRef;

/// Default channel capacity for the event bus.
/// Slow receivers start lagging once this many events are buffered.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSeverity {
    Normal,
    Warning,
}

/// Short machine-readable reason, in the style of Kubernetes event reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventReason {
    CreatedScope,
    UpdatedScope,
    ActivatedScope,
    DeactivatedScope,
    UpdatedAcl,
    AclUpToDate,
}

impl EventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventReason::CreatedScope => "CreatedScope",
            EventReason::UpdatedScope => "UpdatedScope",
            EventReason::ActivatedScope => "ActivatedScope",
            EventReason::DeactivatedScope => "DeactivatedScope",
            EventReason::UpdatedAcl => "UpdatedACL",
            EventReason::AclUpToDate => "ACLUpToDate",
        }
    }
}

impl fmt::Display for EventReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub reason: EventReason,
    pub message: String,
    pub owner: OwnerRef,
}

impl ReconcileEvent {
    pub fn normal(owner: &OwnerRef, reason: EventReason, message: impl Into<String>) -> Self {
        Self::new(owner, EventSeverity::Normal, reason, message)
    }

    pub fn warning(owner: &OwnerRef, reason: EventReason, message: impl Into<String>) -> Self {
        Self::new(owner, EventSeverity::Warning, reason, message)
    }

    fn new(
        owner: &OwnerRef,
        severity: EventSeverity,
        reason: EventReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            reason,
            message: message.into(),
            owner: owner.clone(),
        }
    }
}

/// Destination for reconciliation events. Recording must not fail or block.
pub trait EventSink: Send + Sync {
    fn record(&self, event: ReconcileEvent);
}

/// Broadcasts events to any number of subscribers.
///
/// Uses a tokio broadcast channel; events are cloned for each subscriber and
/// dropped when nobody is listening.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ReconcileEvent>,
    events_published: AtomicU64,
    events_dropped: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: ReconcileEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(count) => count,
            Err(_) => {
                self.events_dropped.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Subscribe to events from this bus.
    ///
    /// A receiver that falls behind gets `RecvError::Lagged` with the number
    /// of missed events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Events published while no subscriber was attached.
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn record(&self, event: ReconcileEvent) {
        self.publish(event);
    }
}

/// Collects events in memory, in the order they were recorded.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<ReconcileEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReconcileEvent> {
        self.events.lock().clone()
    }

    /// Take every recorded event, leaving the log empty.
    pub fn drain(&self) -> Vec<ReconcileEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn reasons(&self) -> Vec<EventReason> {
        self.events.lock().iter().map(|e| e.reason).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for EventLog {
    fn record(&self, event: ReconcileEvent) {
        self.events.lock().push(event);
    }
}
