//! Service-type routing for inbound envelopes

use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::AgentClient;
use crate::error::{Error, Result};

use super::{ServiceEnvelope, ServiceType};

/// What a routed envelope did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The payload was stored as the pipeline description for `name`
    PipelineRegistered { name: String },
}

/// Maps service types onto local actions
#[derive(Clone)]
pub struct ServiceRouter {
    agent: Arc<AgentClient>,
}

impl ServiceRouter {
    pub fn new(agent: Arc<AgentClient>) -> Self {
        Self { agent }
    }

    /// Act on one envelope. Unknown and unsupported types fail without
    /// touching the agent.
    pub async fn route(&self, envelope: &ServiceEnvelope) -> Result<RouteOutcome> {
        let kind = envelope.kind();
        debug!(service_type = %envelope.service_type, key = %envelope.service_key, "Routing service envelope");

        match kind {
            ServiceType::PipelineRaw => {
                let description = std::str::from_utf8(&envelope.payload).map_err(|e| {
                    Error::protocol(format!("pipeline description is not valid UTF-8: {}", e))
                })?;
                self.agent
                    .set_pipeline(&envelope.service_key, description)
                    .await?;
                info!(name = %envelope.service_key, "Registered pipeline from remote sender");
                Ok(RouteOutcome::PipelineRegistered {
                    name: envelope.service_key.clone(),
                })
            }
            ServiceType::PipelineUrl | ServiceType::ModelRaw | ServiceType::ModelUrl => {
                Err(Error::UnsupportedService {
                    service_type: kind.name().to_string(),
                })
            }
            ServiceType::Unknown => Err(Error::UnknownService {
                service_type: envelope.service_type.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentRequest, MockAgent};

    fn router(agent: &MockAgent) -> ServiceRouter {
        ServiceRouter::new(Arc::new(AgentClient::new(vec![Arc::new(agent.clone())])))
    }

    fn envelope(service_type: &str, key: &str, payload: &[u8]) -> ServiceEnvelope {
        ServiceEnvelope {
            service_type: service_type.to_string(),
            service_key: key.to_string(),
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_pipeline_raw_sets_pipeline_once() {
        let agent = MockAgent::new("mock");
        let outcome = router(&agent)
            .route(&envelope("pipeline_raw", "cam", b"v4l2src ! fakesink"))
            .await
            .unwrap();

        assert_eq!(outcome, RouteOutcome::PipelineRegistered { name: "cam".into() });
        assert_eq!(
            agent.calls(),
            vec![AgentRequest::SetPipeline {
                name: "cam".into(),
                description: "v4l2src ! fakesink".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_type_has_no_side_effect() {
        let agent = MockAgent::new("mock");
        let err = router(&agent)
            .route(&envelope("bogus", "cam", b"x"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnknownService { ref service_type } if service_type == "bogus"));
        assert!(agent.calls().is_empty());
        assert_eq!(agent.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_types_are_distinct() {
        let agent = MockAgent::new("mock");
        let router = router(&agent);

        for t in ["pipeline_url", "model_raw", "MODEL_URL"] {
            let err = router.route(&envelope(t, "k", b"x")).await.unwrap_err();
            assert!(matches!(err, Error::UnsupportedService { .. }), "{}: {}", t, err);
        }
        assert!(agent.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_protocol_error() {
        let agent = MockAgent::new("mock");
        let err = router(&agent)
            .route(&envelope("pipeline_raw", "cam", &[0xff, 0xfe]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ProtocolMalformed { .. }));
        assert!(agent.calls().is_empty());
    }
}
