//! Subscriber session state and the registry of connected clients: one
//! `dashmap::DashMap` keyed by session id, a lock-free map rather than a
//! `Mutex<HashMap<...>>` for a registry under concurrent access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type SessionId = Uuid;

pub const TOPIC_PERFORMANCE: &str = "performance";
pub const TOPIC_METRICS: &str = "metrics";
pub const TOPIC_ALERTS: &str = "alerts";

/// Default subscription set a session is given at connect time.
pub fn default_topics() -> Vec<String> {
    vec![TOPIC_PERFORMANCE.to_string(), TOPIC_METRICS.to_string(), TOPIC_ALERTS.to_string()]
}

/// Alerts are delivered as `type: data` on `topic: alerts`, not as a
/// distinct envelope type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    Data,
    Initial,
    Pong,
}

/// The wire message envelope pushed to every subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub topic: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub id: Uuid,
}

impl Envelope {
    pub fn new(kind: EnvelopeType, topic: impl Into<String>, data: Value) -> Self {
        Self { kind, topic: topic.into(), data, timestamp: Utc::now(), id: Uuid::new_v4() }
    }
}

/// Client-originated control frames: subscribe/unsubscribe/filter/
/// ping-pong.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientControl {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Filter { topic: String, predicate: Value },
    Ping,
}

/// A handle the server side holds for pushing messages to one connected
/// client. The outbound channel is bounded; a full channel means the
/// subscriber is too slow and the message is dropped rather than
/// blocking the broadcaster. The same bounded/drop-on-overflow semantics
/// used for the alert channel, applied to every push for uniformity.
pub struct SubscriberHandle {
    sender: mpsc::Sender<Message>,
    pub dropped: AtomicU64,
}

impl SubscriberHandle {
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender, dropped: AtomicU64::new(0) }
    }

    /// Attempts to push one message without blocking; overflow increments
    /// the drop counter instead of applying backpressure to the
    /// broadcaster.
    pub fn try_send(&self, message: Message) {
        if self.sender.try_send(message).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Draining,
    Closed,
}

/// Per-connection subscriber state: which topics it wants, any per-topic
/// filter predicate narrowing delivery, and when it was last heard from
/// (for the cleanup sweep).
pub struct SubscriberSession {
    pub id: SessionId,
    pub connected_at: DateTime<Utc>,
    pub topics: parking_lot::RwLock<std::collections::HashSet<String>>,
    pub filters: parking_lot::RwLock<HashMap<String, Value>>,
    pub last_ping_at: parking_lot::RwLock<Instant>,
    pub state: parking_lot::RwLock<SessionState>,
    pub compression_flag: bool,
}

impl SubscriberSession {
    pub fn new(id: SessionId) -> Self {
        Self::with_compression(id, false)
    }

    pub fn with_compression(id: SessionId, compression_flag: bool) -> Self {
        Self {
            id,
            connected_at: Utc::now(),
            topics: parking_lot::RwLock::new(default_topics().into_iter().collect()),
            filters: parking_lot::RwLock::new(HashMap::new()),
            last_ping_at: parking_lot::RwLock::new(Instant::now()),
            state: parking_lot::RwLock::new(SessionState::Connecting),
            compression_flag,
        }
    }

    pub fn touch(&self) {
        *self.last_ping_at.write() = Instant::now();
    }

    pub fn is_stale(&self, max_idle: Duration) -> bool {
        self.last_ping_at.read().elapsed() > max_idle
    }

    pub fn subscribed(&self, topic: &str) -> bool {
        self.topics.read().contains(topic)
    }

    /// Replaces the filter predicate for `topic`. A predicate is a JSON
    /// object whose fields must all match the corresponding fields of an
    /// envelope's `data` before it is delivered to this session.
    pub fn set_filter(&self, topic: impl Into<String>, predicate: Value) {
        self.filters.write().insert(topic.into(), predicate);
    }

    pub fn clear_filter(&self, topic: &str) {
        self.filters.write().remove(topic);
    }

    /// Whether `data` satisfies this session's filter for `topic`. A
    /// session with no filter registered for the topic passes everything.
    pub fn passes_filter(&self, topic: &str, data: &Value) -> bool {
        match self.filters.read().get(topic) {
            Some(predicate) => matches_predicate(data, predicate),
            None => true,
        }
    }

    /// Idempotent: closing an already-closed session is a no-op. The
    /// state machine only ever moves forward: `connecting -> active ->
    /// draining -> closed`, never reopened.
    pub fn close(&self) {
        *self.state.write() = SessionState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        *self.state.read() == SessionState::Closed
    }
}

/// A predicate matches when it is not a JSON object (pass-through for
/// opaque predicates), or when every field it declares is present in
/// `data` with an equal value.
fn matches_predicate(data: &Value, predicate: &Value) -> bool {
    let Some(fields) = predicate.as_object() else {
        return true;
    };
    let Some(data_obj) = data.as_object() else {
        return fields.is_empty();
    };
    fields.iter().all(|(k, v)| data_obj.get(k) == Some(v))
}

/// Registry of every connected session, keyed by session id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, Arc<SubscriberHandle>>>,
    subscribers: Arc<DashMap<SessionId, Arc<SubscriberSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn insert(&self, session: Arc<SubscriberSession>, handle: Arc<SubscriberHandle>) {
        self.sessions.insert(session.id, handle);
        self.subscribers.insert(session.id, session);
    }

    pub fn remove(&self, id: &SessionId) {
        self.sessions.remove(id);
        if let Some((_, session)) = self.subscribers.remove(id) {
            session.close();
        }
    }

    /// Pushes `envelope` to every session currently subscribed to its
    /// topic whose per-topic filter, if any, the envelope's data satisfies.
    pub fn broadcast(&self, envelope: &Envelope) {
        let serialized = match serde_json::to_string(envelope) {
            Ok(s) => s,
            Err(_) => return,
        };
        for entry in self.subscribers.iter() {
            let session = entry.value();
            if !session.subscribed(&envelope.topic) || session.is_closed() {
                continue;
            }
            if !session.passes_filter(&envelope.topic, &envelope.data) {
                continue;
            }
            if let Some(handle) = self.sessions.get(entry.key()) {
                handle.try_send(Message::Text(serialized.clone().into()));
            }
        }
    }

    /// Closes and removes every session whose `last_ping_at` is older
    /// than `max_idle`. Driven by the cleanup task, run every 30s.
    pub fn sweep_stale(&self, max_idle: Duration) -> usize {
        let stale: Vec<SessionId> = self
            .subscribers
            .iter()
            .filter(|entry| entry.value().is_stale(max_idle))
            .map(|entry| *entry.key())
            .collect();
        for id in &stale {
            self.remove(id);
        }
        stale.len()
    }

    pub fn session(&self, id: &SessionId) -> Option<Arc<SubscriberSession>> {
        self.subscribers.get(id).map(|e| e.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topics_include_performance_metrics_and_alerts() {
        let topics = default_topics();
        assert!(topics.contains(&TOPIC_PERFORMANCE.to_string()));
        assert!(topics.contains(&TOPIC_METRICS.to_string()));
        assert!(topics.contains(&TOPIC_ALERTS.to_string()));
    }

    #[test]
    fn session_close_is_idempotent() {
        let session = SubscriberSession::new(Uuid::new_v4());
        session.close();
        assert!(session.is_closed());
        session.close();
        assert!(session.is_closed());
    }

    #[test]
    fn stale_sessions_are_detected_after_max_idle() {
        let session = SubscriberSession::new(Uuid::new_v4());
        assert!(!session.is_stale(Duration::from_secs(30)));
        assert!(session.is_stale(Duration::from_millis(0)));
    }

    #[tokio::test]
    async fn registry_broadcast_skips_unsubscribed_sessions() {
        let registry = SessionRegistry::new();
        let session = Arc::new(SubscriberSession::new(Uuid::new_v4()));
        session.topics.write().clear();
        let (tx, mut rx) = mpsc::channel(4);
        registry.insert(session.clone(), Arc::new(SubscriberHandle::new(tx)));

        let envelope = Envelope::new(EnvelopeType::Data, TOPIC_PERFORMANCE, serde_json::json!({}));
        registry.broadcast(&envelope);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn registry_broadcast_respects_session_filter() {
        let registry = SessionRegistry::new();
        let session = Arc::new(SubscriberSession::new(Uuid::new_v4()));
        session.set_filter(TOPIC_PERFORMANCE, serde_json::json!({"node_type": "Actor"}));
        let (tx, mut rx) = mpsc::channel(4);
        registry.insert(session.clone(), Arc::new(SubscriberHandle::new(tx)));

        let non_matching = Envelope::new(
            EnvelopeType::Data,
            TOPIC_PERFORMANCE,
            serde_json::json!({"node_type": "Studio"}),
        );
        registry.broadcast(&non_matching);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_err());

        let matching = Envelope::new(
            EnvelopeType::Data,
            TOPIC_PERFORMANCE,
            serde_json::json!({"node_type": "Actor"}),
        );
        registry.broadcast(&matching);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn sweep_stale_removes_and_counts_idle_sessions() {
        let registry = SessionRegistry::new();
        let session = Arc::new(SubscriberSession::new(Uuid::new_v4()));
        let (tx, _rx) = mpsc::channel(4);
        registry.insert(session.clone(), Arc::new(SubscriberHandle::new(tx)));

        let removed = registry.sweep_stale(Duration::from_millis(0));
        assert_eq!(removed, 1);
        assert!(registry.is_empty());
    }
}
