//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Event Bus
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-13
//! Version: 1.1.0
//! Description: Topic-based publisher/subscriber egress. Every subscriber
//! owns a bounded queue; overflow drops the oldest event and bumps a drop
//! counter surfaced on the metrics topic. One slow subscriber never
//! delays the others.
//! Layer: Core
//! Dependencies: crossbeam-channel, core, metrics
//! Affected Components: engine, system
//!
//! --------------------------
//! TOPICS
//! --------------------------
//! signal:<id>            lifecycle events
//! analysis:<id>:<mode>   per-mode analysis summaries
//! anomaly:<id>           anomaly batches
//! alert:<id>             threshold trigger outcomes
//! error:<id>             swallowed per-signal failures
//! metrics                counter snapshots
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-13 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-25 - Carlos Eduardo Favini - Prefix subscriptions (v1.1.0)
//! --------------------------

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::control::ControlState;
use crate::core::identifiers::SubscriptionId;
use crate::core::types::AnalysisMode;
use crate::detect::types::Severity;
use crate::metrics::{CoreMetrics, MetricsSnapshot};

/// Topic string helpers.
pub mod topics {
    use crate::core::types::AnalysisMode;

    pub const METRICS: &str = "metrics";

    pub fn signal(id: &str) -> String {
        format!("signal:{}", id)
    }

    pub fn analysis(id: &str, mode: AnalysisMode) -> String {
        format!("analysis:{}:{}", id, mode.as_str())
    }

    pub fn anomaly(id: &str) -> String {
        format!("anomaly:{}", id)
    }

    pub fn alert(id: &str) -> String {
        format!("alert:{}", id)
    }

    pub fn error(id: &str) -> String {
        format!("error:{}", id)
    }
}

/// Signal lifecycle transitions announced on `signal:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Registered,
    Unregistered,
    Reconfigured,
}

/// Structured event payloads; subscribers pattern-match on the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Lifecycle {
        action: LifecycleAction,
    },
    Analysis {
        mode: AnalysisMode,
        summary: String,
        degraded: bool,
    },
    Anomaly {
        count: usize,
        max_severity: Severity,
    },
    Alert {
        state: ControlState,
        value: f64,
        threshold: f64,
    },
    Error {
        message: String,
    },
    Metrics {
        per_signal: HashMap<String, MetricsSnapshot>,
        subscribers_dropped: u64,
        aggregation_timeouts: u64,
    },
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    /// Wall-clock publication time in microseconds.
    pub timestamp_us: u64,
    /// Source signal, absent for bus-wide topics.
    pub signal_id: Option<String>,
    pub payload: EventPayload,
}

/// Default per-subscriber queue bound.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct SubscriberSlot {
    pattern: String,
    sender: Sender<Event>,
    /// Held so overflow can drop the oldest queued event.
    drain: Receiver<Event>,
    dropped: AtomicU64,
}

impl SubscriberSlot {
    /// Exact topic match, or prefix match for a trailing-`*` pattern.
    fn matches(&self, topic: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => topic.starts_with(prefix),
            None => self.pattern == topic,
        }
    }

    /// Non-blocking enqueue with drop-oldest overflow.
    fn offer(&self, event: Event, core: &CoreMetrics) {
        let mut event = event;
        loop {
            match self.sender.try_send(event) {
                Ok(()) => return,
                Err(crossbeam_channel::TrySendError::Full(back)) => {
                    // Drop the oldest queued event to make room.
                    let _ = self.drain.try_recv();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    core.subscribers_dropped.fetch_add(1, Ordering::Relaxed);
                    event = back;
                }
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Receiving end of a subscription.
pub struct Subscription {
    pub id: SubscriptionId,
    receiver: Receiver<Event>,
}

impl Subscription {
    /// Next pending event, if any.
    pub fn try_recv(&self) -> Option<Event> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Blocks up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Drains everything currently queued.
    pub fn drain(&self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Topic-based pub/sub with bounded per-subscriber queues.
pub struct EventBus {
    slots: Mutex<HashMap<SubscriptionId, Arc<SubscriberSlot>>>,
    metrics: Arc<CoreMetrics>,
}

impl EventBus {
    pub fn new(metrics: Arc<CoreMetrics>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Subscribes to a topic (or a trailing-`*` prefix pattern) with the
    /// default queue bound.
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        self.subscribe_with_capacity(pattern, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, pattern: &str, capacity: usize) -> Subscription {
        let (sender, receiver) = bounded(capacity.max(1));
        let id = SubscriptionId::generate();
        let slot = Arc::new(SubscriberSlot {
            pattern: pattern.to_string(),
            sender,
            drain: receiver.clone(),
            dropped: AtomicU64::new(0),
        });
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, slot);
        Subscription { id, receiver }
    }

    /// Removes a subscription; pending deliveries are discarded. Unknown
    /// handles are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    /// Publishes to every matching subscriber. Never blocks.
    pub fn publish(&self, event: Event) {
        let slots: Vec<Arc<SubscriberSlot>> = {
            let guard = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            guard
                .values()
                .filter(|slot| slot.matches(&event.topic))
                .cloned()
                .collect()
        };
        for slot in slots {
            slot.offer(event.clone(), &self.metrics);
        }
    }

    /// Total events dropped across all subscriber queues.
    pub fn total_dropped(&self) -> u64 {
        self.metrics.subscribers_dropped.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
