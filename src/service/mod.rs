//! Service layer
//!
//! Ties the edge transport to the ML agent: outbound service envelopes,
//! inbound dispatch and routing, and the caller-facing service handle.

use std::fmt;

use crate::edge::EdgeData;
use crate::error::{Error, Result};

mod dispatcher;
mod handle;
mod router;

pub use dispatcher::{DispatchReport, EventDispatcher};
pub use handle::{MlService, ModelServer, PipelineServer, RemoteService};
pub use router::{RouteOutcome, ServiceRouter};

/// Packet metadata key naming the service type
pub const SERVICE_TYPE_KEY: &str = "service-type";

/// Packet metadata key naming the service key
pub const SERVICE_KEY_KEY: &str = "service-key";

/// What an inbound envelope asks the receiver to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    ModelRaw,
    ModelUrl,
    PipelineRaw,
    PipelineUrl,
    Unknown,
}

impl ServiceType {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceType::ModelRaw => "model_raw",
            ServiceType::ModelUrl => "model_url",
            ServiceType::PipelineRaw => "pipeline_raw",
            ServiceType::PipelineUrl => "pipeline_url",
            ServiceType::Unknown => "unknown",
        }
    }

    /// Case-insensitive; anything unrecognized is `Unknown`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "model_raw" => ServiceType::ModelRaw,
            "model_url" => ServiceType::ModelUrl,
            "pipeline_raw" => ServiceType::PipelineRaw,
            "pipeline_url" => ServiceType::PipelineUrl,
            _ => ServiceType::Unknown,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Payload plus routing metadata, carried in one edge packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEnvelope {
    /// Service type exactly as it appeared on the wire
    pub service_type: String,
    pub service_key: String,
    pub payload: Vec<u8>,
}

impl ServiceEnvelope {
    pub fn new(service_type: ServiceType, service_key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            service_type: service_type.name().to_string(),
            service_key: service_key.into(),
            payload: payload.into(),
        }
    }

    pub fn kind(&self) -> ServiceType {
        ServiceType::parse(&self.service_type)
    }

    pub fn to_edge_data(&self) -> EdgeData {
        let mut data = EdgeData::new();
        data.add_payload(self.payload.clone());
        data.set_info(SERVICE_TYPE_KEY, self.service_type.as_str());
        data.set_info(SERVICE_KEY_KEY, self.service_key.as_str());
        data
    }

    /// Extract the envelope from an inbound packet. The first payload block
    /// is the payload; both metadata keys are required.
    pub fn from_edge_data(data: &EdgeData) -> Result<Self> {
        let service_type = data
            .info(SERVICE_TYPE_KEY)
            .ok_or_else(|| Error::protocol(format!("packet has no '{}' metadata", SERVICE_TYPE_KEY)))?;
        let service_key = data
            .info(SERVICE_KEY_KEY)
            .ok_or_else(|| Error::protocol(format!("packet has no '{}' metadata", SERVICE_KEY_KEY)))?;
        let payload = data
            .first_payload()
            .ok_or_else(|| Error::protocol("packet has no payload"))?;

        Ok(Self {
            service_type: service_type.to_string(),
            service_key: service_key.to_string(),
            payload: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_service_type_parse() {
        assert_eq!(ServiceType::parse("pipeline_raw"), ServiceType::PipelineRaw);
        assert_eq!(ServiceType::parse("PIPELINE_RAW"), ServiceType::PipelineRaw);
        assert_eq!(ServiceType::parse("Model_Url"), ServiceType::ModelUrl);
        assert_eq!(ServiceType::parse("bogus"), ServiceType::Unknown);
        assert_eq!(ServiceType::parse(""), ServiceType::Unknown);
    }

    #[test]
    fn test_envelope_packet_layout() {
        let env = ServiceEnvelope::new(ServiceType::PipelineRaw, "cam", b"v4l2src ! fakesink".to_vec());
        let data = env.to_edge_data();

        assert_eq!(data.info(SERVICE_TYPE_KEY), Some("pipeline_raw"));
        assert_eq!(data.info(SERVICE_KEY_KEY), Some("cam"));
        assert_eq!(data.payloads.len(), 1);
        assert_eq!(ServiceEnvelope::from_edge_data(&data).unwrap(), env);
    }

    #[test]
    fn test_envelope_keeps_raw_type() {
        let mut data = EdgeData::new();
        data.add_payload(b"x".to_vec());
        data.set_info(SERVICE_TYPE_KEY, "Pipeline_RAW");
        data.set_info(SERVICE_KEY_KEY, "k");

        let env = ServiceEnvelope::from_edge_data(&data).unwrap();
        assert_eq!(env.service_type, "Pipeline_RAW");
        assert_eq!(env.kind(), ServiceType::PipelineRaw);
    }

    #[test]
    fn test_envelope_requires_metadata_and_payload() {
        let mut data = EdgeData::new();
        data.set_info(SERVICE_TYPE_KEY, "pipeline_raw");
        data.set_info(SERVICE_KEY_KEY, "k");
        let err = ServiceEnvelope::from_edge_data(&data).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ProtocolError);

        let mut data = EdgeData::new();
        data.add_payload(b"x".to_vec());
        data.set_info(SERVICE_TYPE_KEY, "pipeline_raw");
        assert!(ServiceEnvelope::from_edge_data(&data)
            .unwrap_err()
            .to_string()
            .contains(SERVICE_KEY_KEY));
    }
}
