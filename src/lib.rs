//! ML service client library
//!
//! Register, discover and control ML pipelines and models, either across
//! peer nodes over an edge pub/sub transport or through the local ML agent
//! daemon.
//!
//! - [`options`]: ordered option store used for inputs and decoded records
//! - [`edge`]: transports, connection descriptors and the connection manager
//! - [`agent`]: the ML agent RPC client and its endpoints
//! - [`service`]: envelopes, inbound routing and service handles

pub mod agent;
pub mod cli;
pub mod config;
pub mod edge;
pub mod error;
pub mod framing;
pub mod logging;
pub mod options;
pub mod service;
pub mod version;

pub use error::{Error, ErrorCategory, ErrorCode, Result};
