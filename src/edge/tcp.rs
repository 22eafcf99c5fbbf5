//! TCP edge transport
//!
//! A sender listens and fans data out to every subscriber; a receiver dials
//! a sender and subscribes to its topic. Either side can send once linked.
//!
//! Handshake:  SUBSCRIBE{topic} -> SUBSCRIBE_ACK{topic} | SUBSCRIBE_REJECT{reason}
//! Wire format: length-prefixed JSON frames (see [`crate::framing`])

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::framing::{read_frame, write_frame, MAX_FRAME_SIZE};

use super::{
    ConnectKind, Delivery, EdgeData, EdgeEvent, EdgeEventHandler, EdgeInfoKey, EdgeTransport,
    HandlerSlot, NodeRole,
};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// TCP transport configuration
#[derive(Debug, Clone)]
pub struct TcpEdgeConfig {
    /// Timeout for dialing a sender
    pub connect_timeout: Duration,

    /// Timeout for each side of the subscribe handshake
    pub handshake_timeout: Duration,

    /// Timeout for writing one DATA frame to one subscriber
    pub send_timeout: Duration,

    /// Largest accepted frame
    pub max_frame_size: u32,

    /// Maximum number of subscribers a sender accepts
    pub max_subscribers: usize,
}

impl Default for TcpEdgeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
            max_frame_size: MAX_FRAME_SIZE,
            max_subscribers: 32,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Wire Frames
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum EdgeFrame {
    Subscribe {
        topic: Option<String>,
    },
    SubscribeAck {
        topic: Option<String>,
    },
    SubscribeReject {
        reason: String,
    },
    Data {
        id: Uuid,
        timestamp: DateTime<Utc>,
        info: Vec<(String, String)>,
        /// Base64 encoded payload blocks
        payloads: Vec<String>,
    },
}

impl EdgeFrame {
    fn type_name(&self) -> &'static str {
        match self {
            EdgeFrame::Subscribe { .. } => "SUBSCRIBE",
            EdgeFrame::SubscribeAck { .. } => "SUBSCRIBE_ACK",
            EdgeFrame::SubscribeReject { .. } => "SUBSCRIBE_REJECT",
            EdgeFrame::Data { .. } => "DATA",
        }
    }

    fn from_data(data: &EdgeData) -> Self {
        EdgeFrame::Data {
            id: data.id,
            timestamp: data.timestamp,
            info: data.info.clone(),
            payloads: data.payloads.iter().map(|p| BASE64.encode(p)).collect(),
        }
    }

    fn into_data(self) -> Result<EdgeData> {
        match self {
            EdgeFrame::Data {
                id,
                timestamp,
                info,
                payloads,
            } => {
                let payloads = payloads
                    .iter()
                    .map(|p| BASE64.decode(p))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| Error::protocol(format!("invalid payload encoding: {}", e)))?;
                Ok(EdgeData {
                    id,
                    timestamp,
                    payloads,
                    info,
                })
            }
            other => Err(Error::ProtocolUnexpected {
                expected: "DATA".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Shared State
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Settings {
    host: String,
    port: u16,
    topic: Option<String>,
    dest_host: String,
    dest_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 0,
            topic: None,
            dest_host: "localhost".to_string(),
            dest_port: 0,
        }
    }
}

/// One linked node
struct Peer {
    addr: SocketAddr,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
}

/// State shared with background tasks
struct Inner {
    role: NodeRole,
    config: TcpEdgeConfig,
    settings: RwLock<Settings>,
    handler: HandlerSlot,
    peers: RwLock<HashMap<Uuid, Arc<Peer>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    released: AtomicBool,
}

impl Inner {
    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    fn add_peer(&self, addr: SocketAddr, writer: OwnedWriteHalf) -> Uuid {
        let id = Uuid::new_v4();
        self.peers.write().insert(
            id,
            Arc::new(Peer {
                addr,
                writer: tokio::sync::Mutex::new(writer),
            }),
        );
        id
    }

    async fn dispatch(&self, event: EdgeEvent) {
        let kind = event.type_name();
        match self.handler.deliver(event).await {
            Delivery::Handled => {}
            Delivery::Failed(e) => {
                warn!(role = %self.role, event = kind, error = %e, "Event handler rejected event");
            }
            Delivery::Dropped => {
                debug!(role = %self.role, event = kind, "No handler bound, event dropped");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// TCP Edge
// ─────────────────────────────────────────────────────────────────

/// TCP implementation of [`EdgeTransport`]
pub struct TcpEdge {
    inner: Arc<Inner>,
    local_addr: RwLock<Option<SocketAddr>>,
    started: AtomicBool,
}

impl TcpEdge {
    pub fn new(role: NodeRole, config: TcpEdgeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                role,
                config,
                settings: RwLock::new(Settings::default()),
                handler: HandlerSlot::new(),
                peers: RwLock::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
                released: AtomicBool::new(false),
            }),
            local_addr: RwLock::new(None),
            started: AtomicBool::new(false),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.inner.released.load(Ordering::SeqCst) {
            return Err(Error::connection_lost("transport already released"));
        }
        Ok(())
    }

    /// Bind the listener and spawn the accept loop
    async fn listen(&self) -> Result<()> {
        let (host, port) = {
            let s = self.inner.settings.read();
            (s.host.clone(), s.port)
        };
        let target = format!("{}:{}", host, port);
        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|e| Error::connection_failed(&target, e.to_string()))?;
        let addr = listener.local_addr()?;

        *self.local_addr.write() = Some(addr);
        info!(addr = %addr, "Edge sender listening");

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            accept_loop(inner, listener).await;
        });
        self.inner.track(task);
        Ok(())
    }
}

#[async_trait]
impl EdgeTransport for TcpEdge {
    fn kind(&self) -> ConnectKind {
        ConnectKind::Tcp
    }

    fn role(&self) -> NodeRole {
        self.inner.role
    }

    async fn set_event_handler(&self, handler: Arc<dyn EdgeEventHandler>) -> Result<()> {
        self.ensure_live()?;
        self.inner.handler.bind(handler).await;
        Ok(())
    }

    fn set_info(&self, key: EdgeInfoKey, value: &str) -> Result<()> {
        self.ensure_live()?;
        let mut s = self.inner.settings.write();
        match key {
            EdgeInfoKey::Host => s.host = value.to_string(),
            EdgeInfoKey::Port => s.port = parse_port(key, value)?,
            EdgeInfoKey::Topic => s.topic = Some(value.to_string()),
            EdgeInfoKey::DestHost => s.dest_host = value.to_string(),
            EdgeInfoKey::DestPort => s.dest_port = parse_port(key, value)?,
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.ensure_live()?;
        if self.started.swap(true, Ordering::SeqCst) {
            debug!(role = %self.inner.role, "Edge transport already started");
            return Ok(());
        }

        if self.inner.role == NodeRole::Sender {
            if let Err(e) = self.listen().await {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn connect(&self, host: &str, port: u16) -> Result<()> {
        self.ensure_live()?;
        if !self.started.load(Ordering::SeqCst) {
            return Err(Error::connection_failed(
                format!("{}:{}", host, port),
                "transport not started",
            ));
        }

        let target = format!("{}:{}", host, port);
        let config = &self.inner.config;
        info!(target = %target, "Connecting to edge sender");

        let mut stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::ConnectionTimeout {
                target: target.clone(),
                timeout_ms: config.connect_timeout.as_millis() as u64,
            })?
            .map_err(|e| Error::connection_failed(&target, e.to_string()))?;
        let addr = stream.peer_addr()?;

        let topic = self.inner.settings.read().topic.clone();
        write_frame(&mut stream, &EdgeFrame::Subscribe { topic }).await?;

        let reply = tokio::time::timeout(
            config.handshake_timeout,
            read_frame::<EdgeFrame, _>(&mut stream, config.max_frame_size),
        )
        .await
        .map_err(|_| Error::ConnectionTimeout {
            target: target.clone(),
            timeout_ms: config.handshake_timeout.as_millis() as u64,
        })??;

        match reply {
            EdgeFrame::SubscribeAck { topic } => {
                info!(peer = %addr, topic = ?topic, "Subscribed to edge sender");
            }
            EdgeFrame::SubscribeReject { reason } => {
                return Err(Error::connection_failed(&target, reason));
            }
            other => {
                return Err(Error::ProtocolUnexpected {
                    expected: "SUBSCRIBE_ACK".to_string(),
                    actual: other.type_name().to_string(),
                });
            }
        }

        let (read_half, write_half) = stream.into_split();
        let peer_id = self.inner.add_peer(addr, write_half);
        self.inner
            .dispatch(EdgeEvent::ConnectionCompleted { peer: addr.to_string() })
            .await;

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            read_loop(&inner, read_half, addr).await;
            inner.peers.write().remove(&peer_id);
            inner
                .dispatch(EdgeEvent::ConnectionClosed { peer: addr.to_string() })
                .await;
        });
        self.inner.track(task);
        Ok(())
    }

    async fn send(&self, data: EdgeData) -> Result<()> {
        self.ensure_live()?;
        if !self.started.load(Ordering::SeqCst) {
            return Err(Error::connection_failed(
                self.inner.role.name(),
                "transport not started",
            ));
        }

        let peers: Vec<(Uuid, Arc<Peer>)> = self
            .inner
            .peers
            .read()
            .iter()
            .map(|(id, p)| (*id, Arc::clone(p)))
            .collect();
        if peers.is_empty() {
            debug!(data_id = %data.id, "No connected peers, data dropped");
            return Ok(());
        }

        let frame = EdgeFrame::from_data(&data);
        let mut failed = Vec::new();
        for (id, peer) in &peers {
            let mut writer = peer.writer.lock().await;
            let written = tokio::time::timeout(
                self.inner.config.send_timeout,
                write_frame(&mut *writer, &frame),
            )
            .await;
            match written {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(peer = %peer.addr, error = %e, "Failed to send to peer");
                    failed.push(*id);
                }
                Err(_) => {
                    warn!(peer = %peer.addr, "Peer stalled, dropping it");
                    failed.push(*id);
                }
            }
        }

        if !failed.is_empty() {
            let mut map = self.inner.peers.write();
            for id in &failed {
                map.remove(id);
            }
        }
        if failed.len() == peers.len() {
            return Err(Error::connection_lost(format!(
                "send failed for all {} peers",
                peers.len()
            )));
        }

        debug!(data_id = %data.id, peers = peers.len() - failed.len(), "Data sent");
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.handler.clear().await;
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        self.inner.peers.write().clear();
        *self.local_addr.write() = None;

        info!(role = %self.inner.role, "Edge transport released");
        Ok(())
    }

    fn connected_peers(&self) -> usize {
        self.inner.peers.read().len()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }
}

impl Drop for TcpEdge {
    fn drop(&mut self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

fn parse_port(key: EdgeInfoKey, value: &str) -> Result<u16> {
    value
        .parse()
        .map_err(|_| Error::invalid_parameter(key.name(), format!("'{}' is not a port", value)))
}

// ─────────────────────────────────────────────────────────────────
// Background Tasks
// ─────────────────────────────────────────────────────────────────

/// Accept incoming subscribers
async fn accept_loop(inner: Arc<Inner>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                debug!(peer_addr = %peer_addr, "Incoming subscriber");
                let task_inner = Arc::clone(&inner);
                let task = tokio::spawn(async move {
                    if let Err(e) = handle_subscriber(task_inner, stream, peer_addr).await {
                        debug!(peer_addr = %peer_addr, error = %e, "Subscriber setup failed");
                    }
                });
                inner.track(task);
            }
            Err(e) => {
                error!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Run the subscribe handshake, then read until the subscriber leaves
async fn handle_subscriber(
    inner: Arc<Inner>,
    mut stream: TcpStream,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let frame = tokio::time::timeout(
        inner.config.handshake_timeout,
        read_frame::<EdgeFrame, _>(&mut stream, inner.config.max_frame_size),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Subscribe timeout"))??;

    let requested = match frame {
        EdgeFrame::Subscribe { topic } => topic,
        other => {
            warn!(frame = other.type_name(), "Expected SUBSCRIBE, got something else");
            return Err(anyhow::anyhow!("Expected SUBSCRIBE frame"));
        }
    };

    let ours = inner.settings.read().topic.clone();
    let reject = if ours.is_some() && requested != ours {
        Some(format!(
            "topic mismatch: subscribed to {:?}, publishing {:?}",
            requested, ours
        ))
    } else if inner.peers.read().len() >= inner.config.max_subscribers {
        Some("subscriber limit reached".to_string())
    } else {
        None
    };
    if let Some(reason) = reject {
        warn!(peer = %addr, reason = %reason, "Rejecting subscriber");
        write_frame(&mut stream, &EdgeFrame::SubscribeReject { reason: reason.clone() }).await?;
        return Err(anyhow::anyhow!(reason));
    }

    // Register under the writer lock so no DATA frame can overtake the ACK
    let (read_half, write_half) = stream.into_split();
    let peer = Arc::new(Peer {
        addr,
        writer: tokio::sync::Mutex::new(write_half),
    });
    let peer_id = Uuid::new_v4();
    {
        let mut writer = peer.writer.lock().await;
        inner.peers.write().insert(peer_id, Arc::clone(&peer));
        if let Err(e) = write_frame(&mut *writer, &EdgeFrame::SubscribeAck { topic: ours }).await {
            inner.peers.write().remove(&peer_id);
            return Err(e.into());
        }
    }
    info!(peer = %addr, "Subscriber connected");

    inner
        .dispatch(EdgeEvent::ConnectionCompleted { peer: addr.to_string() })
        .await;

    read_loop(&inner, read_half, addr).await;

    inner.peers.write().remove(&peer_id);
    inner
        .dispatch(EdgeEvent::ConnectionClosed { peer: addr.to_string() })
        .await;
    Ok(())
}

/// Read DATA frames from a linked node and hand them to the handler
async fn read_loop(inner: &Inner, mut reader: OwnedReadHalf, addr: SocketAddr) {
    loop {
        match read_frame::<EdgeFrame, _>(&mut reader, inner.config.max_frame_size).await {
            Ok(frame @ EdgeFrame::Data { .. }) => match frame.into_data() {
                Ok(data) => inner.dispatch(EdgeEvent::NewData(data)).await,
                Err(e) => warn!(peer = %addr, error = %e, "Discarding undecodable data frame"),
            },
            Ok(other) => {
                debug!(peer = %addr, frame = other.type_name(), "Ignoring unexpected frame");
            }
            Err(e) => {
                debug!(peer = %addr, error = %e, "Edge read ended");
                break;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
