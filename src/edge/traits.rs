//! Edge transport traits
//!
//! Defines the interface every pub/sub transport backend implements, the
//! event type handed to bound handlers, and the handler slot that makes
//! release wait for in-flight callbacks.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::{ConnectKind, NodeRole};

// ─────────────────────────────────────────────────────────────────
// Data and Events
// ─────────────────────────────────────────────────────────────────

/// One packet: payload blocks plus string metadata
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeData {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payloads: Vec<Vec<u8>>,
    pub info: Vec<(String, String)>,
}

impl EdgeData {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payloads: Vec::new(),
            info: Vec::new(),
        }
    }

    pub fn add_payload(&mut self, payload: impl Into<Vec<u8>>) {
        self.payloads.push(payload.into());
    }

    /// Set a metadata entry, replacing an existing one
    pub fn set_info(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.info.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.info.push((key, value)),
        }
    }

    pub fn info(&self, key: &str) -> Option<&str> {
        self.info
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn first_payload(&self) -> Option<&[u8]> {
        self.payloads.first().map(Vec::as_slice)
    }
}

impl Default for EdgeData {
    fn default() -> Self {
        Self::new()
    }
}

/// Events a transport delivers to its bound handler
#[derive(Debug, Clone)]
pub enum EdgeEvent {
    /// A data packet arrived
    NewData(EdgeData),

    /// A peer finished the handshake
    ConnectionCompleted { peer: String },

    /// A peer went away
    ConnectionClosed { peer: String },

    /// The transport hit a non-fatal error
    Error { message: String },
}

impl EdgeEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            EdgeEvent::NewData(_) => "new_data",
            EdgeEvent::ConnectionCompleted { .. } => "connection_completed",
            EdgeEvent::ConnectionClosed { .. } => "connection_closed",
            EdgeEvent::Error { .. } => "error",
        }
    }
}

/// Settings written during the configure step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeInfoKey {
    Host,
    Port,
    Topic,
    DestHost,
    DestPort,
}

impl EdgeInfoKey {
    pub fn name(&self) -> &'static str {
        match self {
            EdgeInfoKey::Host => "HOST",
            EdgeInfoKey::Port => "PORT",
            EdgeInfoKey::Topic => "TOPIC",
            EdgeInfoKey::DestHost => "DEST_HOST",
            EdgeInfoKey::DestPort => "DEST_PORT",
        }
    }
}

impl std::fmt::Display for EdgeInfoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Handler and Transport Traits
// ─────────────────────────────────────────────────────────────────

/// Receives transport events. Called from the transport's delivery task,
/// one event at a time per handle.
#[async_trait]
pub trait EdgeEventHandler: Send + Sync {
    async fn on_event(&self, event: EdgeEvent) -> Result<()>;
}

/// A pub/sub transport handle
#[async_trait]
pub trait EdgeTransport: Send + Sync {
    fn kind(&self) -> ConnectKind;

    fn role(&self) -> NodeRole;

    /// Bind the event handler. Must happen before `start`.
    async fn set_event_handler(&self, handler: Arc<dyn EdgeEventHandler>) -> Result<()>;

    fn set_info(&self, key: EdgeInfoKey, value: &str) -> Result<()>;

    async fn start(&self) -> Result<()>;

    /// Dial a remote node
    async fn connect(&self, host: &str, port: u16) -> Result<()>;

    async fn send(&self, data: EdgeData) -> Result<()>;

    /// Stop delivery and tear down connections. Returns only after any
    /// in-flight callback has finished. Must not be called from inside the
    /// bound handler.
    async fn release(&self) -> Result<()>;

    /// Number of peers currently attached
    fn connected_peers(&self) -> usize {
        0
    }

    /// Locally bound address, if the transport listens
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Shared transport handle
pub type SharedTransport = Arc<dyn EdgeTransport>;

// ─────────────────────────────────────────────────────────────────
// Handler Slot
// ─────────────────────────────────────────────────────────────────

/// Outcome of handing one event to a slot
#[derive(Debug)]
pub enum Delivery {
    Handled,
    Failed(Error),
    /// No handler bound (never bound, or already released)
    Dropped,
}

/// Holds the bound handler. Deliveries run under the read side, clearing
/// takes the write side, so `clear` waits for any callback in progress and
/// nothing is delivered afterwards.
#[derive(Default)]
pub struct HandlerSlot {
    inner: RwLock<Option<Arc<dyn EdgeEventHandler>>>,
}

impl HandlerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bind(&self, handler: Arc<dyn EdgeEventHandler>) {
        *self.inner.write().await = Some(handler);
    }

    pub async fn is_bound(&self) -> bool {
        self.inner.read().await.is_some()
    }

    pub async fn deliver(&self, event: EdgeEvent) -> Delivery {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(handler) => match handler.on_event(event).await {
                Ok(()) => Delivery::Handled,
                Err(e) => Delivery::Failed(e),
            },
            None => Delivery::Dropped,
        }
    }

    pub async fn clear(&self) {
        self.inner.write().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowHandler {
        started: Arc<tokio::sync::Notify>,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EdgeEventHandler for SlowHandler {
        async fn on_event(&self, _event: EdgeEvent) -> Result<()> {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_edge_data_info() {
        let mut data = EdgeData::new();
        data.set_info("service-type", "pipeline_raw");
        data.set_info("service-type", "model_raw");
        data.add_payload(b"abc".to_vec());

        assert_eq!(data.info.len(), 1);
        assert_eq!(data.info("service-type"), Some("model_raw"));
        assert_eq!(data.first_payload(), Some(&b"abc"[..]));
        assert_eq!(data.info("missing"), None);
    }

    #[tokio::test]
    async fn test_unbound_slot_drops() {
        let slot = HandlerSlot::new();
        assert!(!slot.is_bound().await);
        let outcome = slot.deliver(EdgeEvent::Error { message: "x".into() }).await;
        assert!(matches!(outcome, Delivery::Dropped));
    }

    #[tokio::test]
    async fn test_clear_waits_for_in_flight_callback() {
        let started = Arc::new(tokio::sync::Notify::new());
        let finished = Arc::new(AtomicUsize::new(0));
        let slot = Arc::new(HandlerSlot::new());
        slot.bind(Arc::new(SlowHandler {
            started: started.clone(),
            finished: finished.clone(),
        }))
        .await;
        assert!(slot.is_bound().await);

        let delivering = {
            let slot = slot.clone();
            tokio::spawn(async move {
                slot.deliver(EdgeEvent::ConnectionCompleted { peer: "p".into() }).await
            })
        };

        started.notified().await;
        slot.clear().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(!slot.is_bound().await);

        assert!(matches!(delivering.await.unwrap(), Delivery::Handled));
        let after = slot.deliver(EdgeEvent::ConnectionClosed { peer: "p".into() }).await;
        assert!(matches!(after, Delivery::Dropped));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
