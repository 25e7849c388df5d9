//! Audio → control event transport.
//!
//! The audio context pushes plain-data [`AudioEvent`]s into a bounded
//! [`EventChannel`]; the control context drains them and converts each into an
//! [`Event`] carrying a [`Value`] payload. Pushing never blocks or allocates:
//! when the queue is full the new event is dropped and a counter increments.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::Serialize;

use crate::graph::NodeId;
use crate::value::{Object, Value};

/// Bounded multi-producer queue with a drop-newest overflow policy.
///
/// The engine uses it single-producer (the audio context) and
/// single-consumer (the control context).
#[derive(Debug)]
pub struct EventChannel<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    dropped: AtomicU64,
    capacity: usize,
}

impl<T> EventChannel<T> {
    /// Creates a channel holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
            capacity,
        }
    }

    /// Queues an event. Returns false and counts a drop when the queue is full.
    #[inline]
    pub fn push(&self, event: T) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Removes and returns every queued event in arrival order.
    ///
    /// Only events queued when the drain starts are taken, so a producer
    /// pushing concurrently cannot keep the drain running.
    pub fn drain_all(&self) -> Vec<T> {
        let pending = self.rx.len();
        let mut out = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.rx.try_recv() {
                Ok(event) => out.push(event),
                Err(_) => break,
            }
        }
        out
    }

    /// Total number of events dropped since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of events currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if no events are queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of queued events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Why a node rendered silence instead of its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The node's processor state was held elsewhere for this block.
    Contended,
    /// The processor reported a failure.
    Failed(&'static str),
    /// The processor produced NaN or infinite samples.
    NonFinite,
}

impl FaultKind {
    /// Short machine-readable tag.
    pub fn tag(&self) -> &'static str {
        match self {
            FaultKind::Contended => "contended",
            FaultKind::Failed(_) => "failed",
            FaultKind::NonFinite => "non-finite",
        }
    }

    /// Human-readable description.
    pub fn message(&self) -> &'static str {
        match self {
            FaultKind::Contended => "processor state busy, rendered silence",
            FaultKind::Failed(message) => *message,
            FaultKind::NonFinite => "non-finite output, rendered silence",
        }
    }
}

/// Plain-data event produced on the audio context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioEvent {
    /// Per-block signal range of a meter node.
    Meter {
        /// Emitting node.
        node: NodeId,
        /// Smallest sample of the block.
        min: f32,
        /// Largest sample of the block.
        max: f32,
    },
    /// A node rendered silence.
    Fault {
        /// Faulting node.
        node: NodeId,
        /// What went wrong.
        kind: FaultKind,
    },
}

impl AudioEvent {
    /// The node that produced the event.
    pub fn node(&self) -> NodeId {
        match self {
            AudioEvent::Meter { node, .. } | AudioEvent::Fault { node, .. } => *node,
        }
    }

    /// Converts into a control-side [`Event`]. `source` is the node's `name`
    /// parameter, when it has one.
    pub fn into_event(self, source: Option<&str>) -> Event {
        match self {
            AudioEvent::Meter { node, min, max } => {
                let mut payload = Object::new();
                payload.insert("node".into(), Value::from(node.raw()));
                payload.insert("min".into(), Value::from(min));
                payload.insert("max".into(), Value::from(max));
                if let Some(source) = source {
                    payload.insert("source".into(), Value::from(source));
                }
                Event::new("meter", payload)
            }
            AudioEvent::Fault { node, kind } => {
                let payload: Value = [
                    ("node", Value::from(node.raw())),
                    ("kind", Value::from(kind.tag())),
                    ("message", Value::from(kind.message())),
                ]
                .into_iter()
                .collect();
                Event {
                    kind: "fault".into(),
                    event: payload,
                }
            }
        }
    }
}

/// A drained event: a type tag and a payload.
///
/// Serializes as `{"type": ..., "event": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Event type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload.
    pub event: Value,
}

impl Event {
    /// Creates an event from a tag and an Object payload.
    pub fn new(kind: impl Into<String>, payload: Object) -> Self {
        Self {
            kind: kind.into(),
            event: Value::Object(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_drain_is_empty() {
        let channel: EventChannel<u32> = EventChannel::new(4);
        assert!(channel.drain_all().is_empty());
        assert!(channel.drain_all().is_empty());
        assert_eq!(channel.dropped(), 0);
    }

    #[test]
    fn full_channel_drops_newest() {
        let channel = EventChannel::new(3);
        for i in 0..5u32 {
            channel.push(i);
        }
        assert_eq!(channel.dropped(), 2);
        assert_eq!(channel.drain_all(), vec![0, 1, 2]);
        assert!(channel.push(9));
        assert_eq!(channel.drain_all(), vec![9]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let channel = EventChannel::new(0);
        assert_eq!(channel.capacity(), 1);
        assert!(channel.push(1u8));
        assert!(!channel.push(2u8));
    }

    #[test]
    fn meter_event_payload() {
        let event = AudioEvent::Meter {
            node: NodeId::new(4),
            min: -0.5,
            max: 0.25,
        }
        .into_event(Some("out"));
        assert_eq!(event.kind, "meter");
        assert_eq!(event.event.get("source"), Some(&Value::from("out")));
        assert_eq!(event.event.get("node"), Some(&Value::from(4.0)));
        assert_eq!(event.event.get("max"), Some(&Value::from(0.25)));
    }

    #[test]
    fn fault_event_serializes_with_type_key() {
        let event = AudioEvent::Fault {
            node: NodeId::new(2),
            kind: FaultKind::NonFinite,
        }
        .into_event(None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "fault");
        assert_eq!(json["event"]["kind"], "non-finite");
        assert_eq!(json["event"]["node"], 2.0);
    }
}
