//! Mock transport for testing
//!
//! Records every call, can be told to fail any step, and lets tests inject
//! inbound events through the same handler slot a real transport uses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};

use super::{
    ConnectKind, Delivery, EdgeData, EdgeEvent, EdgeEventHandler, EdgeInfoKey, EdgeTransport,
    HandlerSlot, NodeRole, SharedTransport, TransportFactory,
};

// ─────────────────────────────────────────────────────────────────
// Mock Configuration
// ─────────────────────────────────────────────────────────────────

/// Which steps the mock should fail
#[derive(Debug, Clone, Default)]
pub struct MockEdgeConfig {
    pub fail_set_event_handler: bool,
    pub fail_set_info: bool,
    pub fail_start: bool,
    pub fail_connect: bool,
    pub fail_send: bool,
}

/// Track method call counts for verification
#[derive(Debug, Default)]
struct CallCounts {
    set_event_handler: u32,
    set_info: u32,
    start: u32,
    connect: u32,
    send: u32,
    release: u32,
}

// ─────────────────────────────────────────────────────────────────
// Mock Edge
// ─────────────────────────────────────────────────────────────────

/// In-memory transport handle
pub struct MockEdge {
    kind: ConnectKind,
    role: NodeRole,
    config: MockEdgeConfig,
    handler: HandlerSlot,
    info: RwLock<HashMap<EdgeInfoKey, String>>,
    sent: RwLock<Vec<EdgeData>>,
    connected_to: RwLock<Option<(String, u16)>>,
    peers: AtomicUsize,
    released: AtomicBool,
    call_counts: RwLock<CallCounts>,
}

impl MockEdge {
    pub fn new(kind: ConnectKind, role: NodeRole) -> Self {
        Self::with_config(kind, role, MockEdgeConfig::default())
    }

    pub fn with_config(kind: ConnectKind, role: NodeRole, config: MockEdgeConfig) -> Self {
        Self {
            kind,
            role,
            config,
            handler: HandlerSlot::new(),
            info: RwLock::new(HashMap::new()),
            sent: RwLock::new(Vec::new()),
            connected_to: RwLock::new(None),
            peers: AtomicUsize::new(0),
            released: AtomicBool::new(false),
            call_counts: RwLock::new(CallCounts::default()),
        }
    }

    /// Hand an event to the bound handler as if it came off the wire
    pub async fn inject(&self, event: EdgeEvent) -> Delivery {
        self.handler.deliver(event).await
    }

    /// Everything passed to `send`, in order
    pub fn sent(&self) -> Vec<EdgeData> {
        self.sent.read().clone()
    }

    pub fn info(&self, key: EdgeInfoKey) -> Option<String> {
        self.info.read().get(&key).cloned()
    }

    pub fn connected_to(&self) -> Option<(String, u16)> {
        self.connected_to.read().clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Get the number of times a method was called
    pub fn call_count(&self, method: &str) -> u32 {
        let counts = self.call_counts.read();
        match method {
            "set_event_handler" => counts.set_event_handler,
            "set_info" => counts.set_info,
            "start" => counts.start,
            "connect" => counts.connect,
            "send" => counts.send,
            "release" => counts.release,
            _ => 0,
        }
    }

    fn check_live(&self, operation: &str) -> Result<()> {
        if self.is_released() {
            return Err(Error::connection_lost(format!(
                "mock transport released before {}",
                operation
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EdgeTransport for MockEdge {
    fn kind(&self) -> ConnectKind {
        self.kind
    }

    fn role(&self) -> NodeRole {
        self.role
    }

    async fn set_event_handler(&self, handler: Arc<dyn EdgeEventHandler>) -> Result<()> {
        self.call_counts.write().set_event_handler += 1;
        if self.config.fail_set_event_handler {
            return Err(Error::Internal("mock event binding failure".to_string()));
        }
        self.handler.bind(handler).await;
        Ok(())
    }

    fn set_info(&self, key: EdgeInfoKey, value: &str) -> Result<()> {
        self.call_counts.write().set_info += 1;
        if self.config.fail_set_info {
            return Err(Error::invalid_parameter(key.name(), "mock set_info failure"));
        }
        self.info.write().insert(key, value.to_string());
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.call_counts.write().start += 1;
        self.check_live("start")?;
        if self.config.fail_start {
            return Err(Error::connection_failed("mock", "mock start failure"));
        }
        Ok(())
    }

    async fn connect(&self, host: &str, port: u16) -> Result<()> {
        self.call_counts.write().connect += 1;
        self.check_live("connect")?;
        if self.config.fail_connect {
            return Err(Error::connection_failed(
                format!("{}:{}", host, port),
                "mock connect failure",
            ));
        }
        *self.connected_to.write() = Some((host.to_string(), port));
        self.peers.store(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, data: EdgeData) -> Result<()> {
        self.call_counts.write().send += 1;
        self.check_live("send")?;
        if self.config.fail_send {
            return Err(Error::connection_lost("mock send failure"));
        }
        self.sent.write().push(data);
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        self.call_counts.write().release += 1;
        self.released.store(true, Ordering::SeqCst);
        self.handler.clear().await;
        self.peers.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn connected_peers(&self) -> usize {
        self.peers.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────
// Mock Factory
// ─────────────────────────────────────────────────────────────────

/// Factory that hands out [`MockEdge`]s and keeps them for inspection
#[derive(Default)]
pub struct MockTransportFactory {
    config: MockEdgeConfig,
    fail_create: AtomicBool,
    created: Mutex<Vec<Arc<MockEdge>>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MockEdgeConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// All handles created so far, oldest first
    pub fn created(&self) -> Vec<Arc<MockEdge>> {
        self.created.lock().clone()
    }

    pub fn last(&self) -> Option<Arc<MockEdge>> {
        self.created.lock().last().cloned()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, kind: ConnectKind, role: NodeRole) -> Result<SharedTransport> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::OutOfMemory {
                message: "mock create failure".to_string(),
            });
        }
        let edge = Arc::new(MockEdge::with_config(kind, role, self.config.clone()));
        self.created.lock().push(edge.clone());
        Ok(edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Arc<AtomicUsize>);

    #[async_trait]
    impl EdgeEventHandler for Recorder {
        async fn on_event(&self, _event: EdgeEvent) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let edge = MockEdge::new(ConnectKind::Tcp, NodeRole::Receiver);
        edge.set_info(EdgeInfoKey::Topic, "t").unwrap();
        edge.start().await.unwrap();
        edge.connect("10.0.0.1", 4000).await.unwrap();

        assert_eq!(edge.info(EdgeInfoKey::Topic).as_deref(), Some("t"));
        assert_eq!(edge.connected_to(), Some(("10.0.0.1".to_string(), 4000)));
        assert_eq!(edge.connected_peers(), 1);
        assert_eq!(edge.call_count("connect"), 1);
    }

    #[tokio::test]
    async fn test_inject_after_release_is_dropped() {
        let hits = Arc::new(AtomicUsize::new(0));
        let edge = MockEdge::new(ConnectKind::Tcp, NodeRole::Receiver);
        edge.set_event_handler(Arc::new(Recorder(hits.clone()))).await.unwrap();

        let before = edge.inject(EdgeEvent::ConnectionCompleted { peer: "a".into() }).await;
        assert!(matches!(before, Delivery::Handled));

        edge.release().await.unwrap();
        let after = edge.inject(EdgeEvent::ConnectionCompleted { peer: "a".into() }).await;
        assert!(matches!(after, Delivery::Dropped));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_factory_failure_flag() {
        let factory = MockTransportFactory::new();
        factory.set_fail_create(true);
        assert!(factory.create(ConnectKind::Tcp, NodeRole::Sender).is_err());
        assert!(factory.created().is_empty());

        factory.set_fail_create(false);
        assert!(factory.create(ConnectKind::Mqtt, NodeRole::Sender).is_ok());
        assert_eq!(factory.last().unwrap().kind(), ConnectKind::Mqtt);
    }
}
