//! Event types and the in-process EventBus
//!
//! Single-process pub/sub used to push reconciliation outcomes to
//! connected UI subscribers over SSE. Each subscriber registers a
//! filter and gets its own bounded queue; a slow subscriber loses its
//! newest events rather than blocking publishers.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Replay buffer size cap (most recent events kept for late joiners)
pub const REPLAY_CAPACITY: usize = 100;

/// Replay retention window in hours
pub const REPLAY_RETENTION_HOURS: i64 = 24;

/// Default per-subscriber queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Event priority for subscriber-side filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl std::str::FromStr for EventPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(EventPriority::Low),
            "normal" => Ok(EventPriority::Normal),
            "high" => Ok(EventPriority::High),
            "critical" => Ok(EventPriority::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// A single event published on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub priority: EventPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub payload: serde_json::Value,
}

impl SystemEvent {
    pub fn new(
        event_type: impl Into<String>,
        priority: EventPriority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            priority,
            tenant_id: None,
            user_id: None,
            title: title.into(),
            message: message.into(),
            action: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

/// Subscriber-side event filter
///
/// Empty fields match everything. Events without a tenant are
/// treated as global and delivered to every subscriber.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub types: Option<Vec<String>>,
    pub priorities: Option<Vec<EventPriority>>,
}

impl EventFilter {
    pub fn matches(&self, event: &SystemEvent) -> bool {
        if let (Some(want), Some(got)) = (&self.tenant_id, &event.tenant_id) {
            if want != got {
                return false;
            }
        }
        if let (Some(want), Some(got)) = (&self.user_id, &event.user_id) {
            if want != got {
                return false;
            }
        }
        if let Some(types) = &self.types {
            if !types.is_empty() && !types.iter().any(|t| t == &event.event_type) {
                return false;
            }
        }
        if let Some(priorities) = &self.priorities {
            if !priorities.is_empty() && !priorities.contains(&event.priority) {
                return false;
            }
        }
        true
    }
}

struct Subscriber {
    id: u64,
    filter: EventFilter,
    tx: mpsc::Sender<SystemEvent>,
}

struct BusInner {
    subscribers: Vec<Subscriber>,
    replay: VecDeque<SystemEvent>,
    next_id: u64,
}

/// A live subscription handle
///
/// Dropping the handle releases the subscriber's queue and
/// registration.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<SystemEvent>,
    /// Recent matching events replayed at connect time
    pub replay: Vec<SystemEvent>,
    bus: EventBus,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

/// Central event distribution bus
///
/// Guarantees best-effort in-order delivery per subscriber; queue
/// overflow drops the newest event with a WARN log. The subscriber
/// table mutex is held only for insert, remove and fan-out scans.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
    queue_capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                subscribers: Vec::new(),
                replay: VecDeque::with_capacity(REPLAY_CAPACITY),
                next_id: 1,
            })),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Publish an event to all matching subscribers.
    ///
    /// Returns the number of subscribers the event was delivered to.
    pub fn publish(&self, event: SystemEvent) -> usize {
        let mut inner = self.inner.lock().expect("event bus mutex poisoned");

        Self::prune_replay(&mut inner.replay);
        while inner.replay.len() >= REPLAY_CAPACITY {
            inner.replay.pop_front();
        }
        inner.replay.push_back(event.clone());

        let mut delivered = 0;
        inner.subscribers.retain(|sub| {
            if !sub.filter.matches(&event) {
                return true;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber_id = sub.id,
                        event_type = %event.event_type,
                        "subscriber queue full, dropping event"
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
        delivered
    }

    /// Register a subscriber with a filter.
    ///
    /// The returned subscription carries the recent matching events
    /// for replay, then receives live events on its queue.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut inner = self.inner.lock().expect("event bus mutex poisoned");

        Self::prune_replay(&mut inner.replay);
        let replay: Vec<SystemEvent> = inner
            .replay
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber { id, filter, tx });

        Subscription {
            id,
            rx,
            replay,
            bus: self.clone(),
        }
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock().expect("event bus mutex poisoned");
        inner.subscribers.retain(|sub| sub.id != id);
    }

    /// Number of currently registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .expect("event bus mutex poisoned")
            .subscribers
            .len()
    }

    fn prune_replay(replay: &mut VecDeque<SystemEvent>) {
        let cutoff = Utc::now() - ChronoDuration::hours(REPLAY_RETENTION_HOURS);
        while let Some(front) = replay.front() {
            if front.timestamp < cutoff {
                replay.pop_front();
            } else {
                break;
            }
        }
    }
}
