//! ML agent daemon access
//!
//! Stored pipeline descriptions, launched pipeline instances and the model
//! registry all live in a separate daemon. This module speaks to it.

mod client;
mod decode;
mod endpoint;
mod messages;
mod mock;
#[cfg(unix)]
mod socket;

pub use client::{validate_model_path, AgentClient, DEFAULT_RPC_TIMEOUT};
pub use decode::{decode_list, decode_object};
pub use endpoint::{AgentConnection, AgentEndpoint, BusScope, EndpointProbe, SharedEndpoint};
pub use messages::{AgentCall, AgentInterface, AgentReply, AgentRequest, PipelineState};
pub use mock::{MockAgent, MockAgentConfig, STATUS_INVALID, STATUS_NOT_FOUND};
#[cfg(unix)]
pub use socket::SocketEndpoint;
