//! ML agent request/reply messages
//!
//! One request per connection:
//! `{"interface": "pipeline", "method": "launch_pipeline", "name": "..."}`
//! answered by `{"status": 0, "id": 7}`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Daemon object a request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentInterface {
    Pipeline,
    Model,
}

impl AgentInterface {
    pub fn name(&self) -> &'static str {
        match self {
            AgentInterface::Pipeline => "pipeline",
            AgentInterface::Model => "model",
        }
    }
}

/// Every method the daemon exposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AgentRequest {
    // Pipeline interface
    SetPipeline { name: String, description: String },
    GetPipeline { name: String },
    DeletePipeline { name: String },
    LaunchPipeline { name: String },
    StartPipeline { id: i64 },
    StopPipeline { id: i64 },
    DestroyPipeline { id: i64 },
    GetPipelineState { id: i64 },

    // Model interface
    RegisterModel {
        name: String,
        path: String,
        activate: bool,
        description: String,
    },
    UpdateModelDescription {
        name: String,
        version: u32,
        description: String,
    },
    ActivateModel { name: String, version: u32 },
    GetModel { name: String, version: u32 },
    GetActivatedModel { name: String },
    GetAllModels { name: String },
    DeleteModel { name: String, version: u32 },
}

impl AgentRequest {
    pub fn interface(&self) -> AgentInterface {
        match self {
            AgentRequest::SetPipeline { .. }
            | AgentRequest::GetPipeline { .. }
            | AgentRequest::DeletePipeline { .. }
            | AgentRequest::LaunchPipeline { .. }
            | AgentRequest::StartPipeline { .. }
            | AgentRequest::StopPipeline { .. }
            | AgentRequest::DestroyPipeline { .. }
            | AgentRequest::GetPipelineState { .. } => AgentInterface::Pipeline,

            AgentRequest::RegisterModel { .. }
            | AgentRequest::UpdateModelDescription { .. }
            | AgentRequest::ActivateModel { .. }
            | AgentRequest::GetModel { .. }
            | AgentRequest::GetActivatedModel { .. }
            | AgentRequest::GetAllModels { .. }
            | AgentRequest::DeleteModel { .. } => AgentInterface::Model,
        }
    }

    /// Method name as it appears on the wire
    pub fn method_name(&self) -> &'static str {
        match self {
            AgentRequest::SetPipeline { .. } => "set_pipeline",
            AgentRequest::GetPipeline { .. } => "get_pipeline",
            AgentRequest::DeletePipeline { .. } => "delete_pipeline",
            AgentRequest::LaunchPipeline { .. } => "launch_pipeline",
            AgentRequest::StartPipeline { .. } => "start_pipeline",
            AgentRequest::StopPipeline { .. } => "stop_pipeline",
            AgentRequest::DestroyPipeline { .. } => "destroy_pipeline",
            AgentRequest::GetPipelineState { .. } => "get_pipeline_state",
            AgentRequest::RegisterModel { .. } => "register_model",
            AgentRequest::UpdateModelDescription { .. } => "update_model_description",
            AgentRequest::ActivateModel { .. } => "activate_model",
            AgentRequest::GetModel { .. } => "get_model",
            AgentRequest::GetActivatedModel { .. } => "get_activated_model",
            AgentRequest::GetAllModels { .. } => "get_all_models",
            AgentRequest::DeleteModel { .. } => "delete_model",
        }
    }
}

/// Request frame as sent over a connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCall {
    pub interface: AgentInterface,
    #[serde(flatten)]
    pub request: AgentRequest,
}

impl From<AgentRequest> for AgentCall {
    fn from(request: AgentRequest) -> Self {
        Self {
            interface: request.interface(),
            request,
        }
    }
}

/// Daemon answer. `status` 0 means success; outputs depend on the method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub status: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// JSON text describing one model or a list of models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl AgentReply {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(status: i32) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Pipeline State
// ─────────────────────────────────────────────────────────────────

/// Run state of a launched pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PipelineState {
    Unknown = 0,
    Null = 1,
    Ready = 2,
    Paused = 3,
    Playing = 4,
}

impl PipelineState {
    /// Map a daemon code; anything out of range is `Unknown`
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => PipelineState::Null,
            2 => PipelineState::Ready,
            3 => PipelineState::Paused,
            4 => PipelineState::Playing,
            _ => PipelineState::Unknown,
        }
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Unknown => "unknown",
            PipelineState::Null => "null",
            PipelineState::Ready => "ready",
            PipelineState::Paused => "paused",
            PipelineState::Playing => "playing",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_wire_shape() {
        let call = AgentCall::from(AgentRequest::LaunchPipeline { name: "cam".into() });
        let json = serde_json::to_value(&call).unwrap();

        assert_eq!(json["interface"], "pipeline");
        assert_eq!(json["method"], "launch_pipeline");
        assert_eq!(json["name"], "cam");
    }

    #[test]
    fn test_call_parse() {
        let raw = r#"{"interface":"model","method":"activate_model","name":"m","version":3}"#;
        let call: AgentCall = serde_json::from_str(raw).unwrap();

        assert_eq!(call.interface, AgentInterface::Model);
        assert_eq!(
            call.request,
            AgentRequest::ActivateModel { name: "m".into(), version: 3 }
        );
    }

    #[test]
    fn test_interface_matches_method_family() {
        assert_eq!(AgentRequest::StopPipeline { id: 1 }.interface(), AgentInterface::Pipeline);
        assert_eq!(
            AgentRequest::GetAllModels { name: "m".into() }.interface(),
            AgentInterface::Model
        );
        assert_eq!(AgentRequest::GetPipelineState { id: 9 }.method_name(), "get_pipeline_state");
    }

    #[test]
    fn test_reply_omits_empty_outputs() {
        let json = serde_json::to_string(&AgentReply::ok()).unwrap();
        assert_eq!(json, r#"{"status":0}"#);

        let reply: AgentReply = serde_json::from_str(r#"{"status":-2}"#).unwrap();
        assert_eq!(reply, AgentReply::failed(-2));
    }

    #[test]
    fn test_pipeline_state_codes() {
        assert_eq!(PipelineState::from_code(4), PipelineState::Playing);
        assert_eq!(PipelineState::from_code(0), PipelineState::Unknown);
        assert_eq!(PipelineState::from_code(17), PipelineState::Unknown);
        assert_eq!(PipelineState::from_code(-1), PipelineState::Unknown);
        assert_eq!(PipelineState::Paused.code(), 3);
    }
}
