//! Inbound event dispatch
//!
//! Bound to every edge connection. Data events are unpacked into service
//! envelopes and routed; everything else is acknowledged and dropped. A bad
//! packet fails only itself.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::edge::{EdgeData, EdgeEvent, EdgeEventHandler};
use crate::error::Result;

use super::{RouteOutcome, ServiceEnvelope, ServiceRouter};

/// Result of handling one data packet, for observers
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub packet: Uuid,
    pub service_type: Option<String>,
    pub service_key: Option<String>,
    pub result: std::result::Result<RouteOutcome, String>,
}

pub struct EventDispatcher {
    router: ServiceRouter,
    reports: Option<mpsc::UnboundedSender<DispatchReport>>,
}

impl EventDispatcher {
    pub fn new(router: ServiceRouter) -> Self {
        Self {
            router,
            reports: None,
        }
    }

    /// Also publish a report for every data packet handled
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<DispatchReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    async fn handle_data(&self, data: &EdgeData) -> Result<RouteOutcome> {
        let envelope = ServiceEnvelope::from_edge_data(data)?;
        self.router.route(&envelope).await
    }

    fn report(&self, data: &EdgeData, result: &Result<RouteOutcome>) {
        if let Some(ref tx) = self.reports {
            let report = DispatchReport {
                packet: data.id,
                service_type: data.info(super::SERVICE_TYPE_KEY).map(str::to_string),
                service_key: data.info(super::SERVICE_KEY_KEY).map(str::to_string),
                result: match result {
                    Ok(outcome) => Ok(outcome.clone()),
                    Err(e) => Err(e.to_string()),
                },
            };
            // Observer gone; dispatch carries on
            let _ = tx.send(report);
        }
    }
}

#[async_trait]
impl EdgeEventHandler for EventDispatcher {
    async fn on_event(&self, event: EdgeEvent) -> Result<()> {
        let data = match event {
            EdgeEvent::NewData(data) => data,
            other => {
                debug!(event = other.type_name(), "Ignoring edge event");
                return Ok(());
            }
        };

        let result = self.handle_data(&data).await;
        self.report(&data, &result);

        match result {
            Ok(outcome) => {
                debug!(packet = %data.id, ?outcome, "Packet handled");
                Ok(())
            }
            Err(e) => {
                warn!(packet = %data.id, error = %e, "Discarding inbound packet");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::agent::{AgentClient, MockAgent};
    use crate::edge::{ConnectKind, Delivery, EdgeTransport, MockEdge, NodeRole};
    use crate::service::{ServiceType, SERVICE_KEY_KEY, SERVICE_TYPE_KEY};

    fn dispatcher(agent: &MockAgent) -> EventDispatcher {
        let client = AgentClient::new(vec![Arc::new(agent.clone())]);
        EventDispatcher::new(ServiceRouter::new(Arc::new(client)))
    }

    #[tokio::test]
    async fn test_non_data_events_are_dropped() {
        let agent = MockAgent::new("mock");
        let d = dispatcher(&agent);

        d.on_event(EdgeEvent::ConnectionCompleted { peer: "p".into() })
            .await
            .unwrap();
        d.on_event(EdgeEvent::Error { message: "x".into() }).await.unwrap();
        assert!(agent.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bad_packet_fails_alone() {
        let agent = MockAgent::new("mock");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let d = dispatcher(&agent).with_reports(tx);

        let mut missing_key = EdgeData::new();
        missing_key.add_payload(b"x".to_vec());
        missing_key.set_info(SERVICE_TYPE_KEY, "pipeline_raw");
        assert!(d.on_event(EdgeEvent::NewData(missing_key)).await.is_err());

        let good = ServiceEnvelope::new(ServiceType::PipelineRaw, "cam", b"fakesrc ! fakesink".to_vec());
        d.on_event(EdgeEvent::NewData(good.to_edge_data())).await.unwrap();

        assert!(rx.recv().await.unwrap().result.is_err());
        let second = rx.recv().await.unwrap();
        assert_eq!(second.service_key.as_deref(), Some("cam"));
        assert!(second.result.is_ok());
        assert_eq!(agent.pipeline_description("cam").as_deref(), Some("fakesrc ! fakesink"));
    }

    #[tokio::test]
    async fn test_delivery_through_released_transport_is_noop() {
        let agent = MockAgent::new("mock");
        let edge = MockEdge::new(ConnectKind::Tcp, NodeRole::Receiver);
        edge.set_event_handler(Arc::new(dispatcher(&agent))).await.unwrap();
        edge.release().await.unwrap();

        let mut data = EdgeData::new();
        data.add_payload(b"fakesrc ! fakesink".to_vec());
        data.set_info(SERVICE_TYPE_KEY, "pipeline_raw");
        data.set_info(SERVICE_KEY_KEY, "late");

        assert!(matches!(edge.inject(EdgeEvent::NewData(data)).await, Delivery::Dropped));
        assert!(agent.calls().is_empty());
    }
}
