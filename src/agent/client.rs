//! ML agent client
//!
//! Typed wrappers over the daemon's pipeline and model methods. Arguments
//! are checked before any connection is opened; each call opens its own
//! connection and closes it when the call returns.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::AgentSettings;
use crate::error::{Error, Result};
use crate::options::OptionStore;

use super::decode::{decode_list, decode_object};
use super::endpoint::{BusScope, EndpointProbe, SharedEndpoint};
use super::messages::{AgentReply, AgentRequest, PipelineState};

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AgentClient {
    probe: EndpointProbe,
    rpc_timeout: Duration,
}

impl AgentClient {
    pub fn new(endpoints: Vec<SharedEndpoint>) -> Self {
        Self {
            probe: EndpointProbe::new(endpoints),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    /// Build socket endpoints in the configured scope order
    #[cfg(unix)]
    pub fn from_settings(settings: &AgentSettings) -> Result<Self> {
        use super::socket::SocketEndpoint;

        let connect_timeout = Duration::from_millis(settings.connect_timeout_ms);
        let mut endpoints: Vec<SharedEndpoint> = Vec::new();

        for raw in &settings.scopes {
            let scope = BusScope::parse(raw).ok_or_else(|| {
                Error::config_field_invalid("agent.scopes", format!("unknown bus scope '{}'", raw))
            })?;
            let path = match scope {
                BusScope::System => Some(std::path::PathBuf::from(&settings.system_socket)),
                BusScope::Session => settings.session_socket.as_ref().map(std::path::PathBuf::from),
            };
            match path {
                Some(path) => endpoints.push(Arc::new(
                    SocketEndpoint::new(scope, path).with_connect_timeout(connect_timeout),
                )),
                None => debug!(scope = %scope, "No socket path for bus scope, skipping"),
            }
        }

        Ok(Self::new(endpoints).with_timeout(settings.rpc_timeout()))
    }

    #[cfg(not(unix))]
    pub fn from_settings(_settings: &AgentSettings) -> Result<Self> {
        Err(Error::NotSupported(
            "ML agent sockets are only available on unix".to_string(),
        ))
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    async fn call(&self, request: AgentRequest) -> Result<AgentReply> {
        let method = request.method_name();
        debug!(method, interface = request.interface().name(), "Calling ML agent");

        let exchange = async {
            let mut conn = self.probe.connect(request.interface()).await?;
            conn.call(&request).await
        };

        let reply = tokio::time::timeout(self.rpc_timeout, exchange)
            .await
            .map_err(|_| Error::RpcTimeout {
                method: method.to_string(),
                timeout_ms: self.rpc_timeout.as_millis() as u64,
            })??;

        if reply.status != 0 {
            warn!(method, status = reply.status, "ML agent call failed");
            return Err(Error::daemon(method, reply.status));
        }
        Ok(reply)
    }

    // ─────────────────────────────────────────────────────────────
    // Pipelines
    // ─────────────────────────────────────────────────────────────

    /// Store (or replace) a pipeline description under `name`
    pub async fn set_pipeline(&self, name: &str, description: &str) -> Result<()> {
        require("name", name)?;
        require("description", description)?;

        self.call(AgentRequest::SetPipeline {
            name: name.to_string(),
            description: description.to_string(),
        })
        .await?;
        info!(name, "Pipeline description stored");
        Ok(())
    }

    pub async fn get_pipeline(&self, name: &str) -> Result<String> {
        require("name", name)?;
        let reply = self
            .call(AgentRequest::GetPipeline { name: name.to_string() })
            .await?;
        missing(reply.description, "get_pipeline", "description")
    }

    pub async fn delete_pipeline(&self, name: &str) -> Result<()> {
        require("name", name)?;
        self.call(AgentRequest::DeletePipeline { name: name.to_string() })
            .await?;
        Ok(())
    }

    /// Instantiate a stored pipeline, returning the daemon's instance id
    pub async fn launch_pipeline(&self, name: &str) -> Result<i64> {
        require("name", name)?;
        let reply = self
            .call(AgentRequest::LaunchPipeline { name: name.to_string() })
            .await?;
        let id = missing(reply.id, "launch_pipeline", "id")?;
        info!(name, id, "Pipeline launched");
        Ok(id)
    }

    pub async fn start_pipeline(&self, id: i64) -> Result<()> {
        self.call(AgentRequest::StartPipeline { id }).await?;
        Ok(())
    }

    pub async fn stop_pipeline(&self, id: i64) -> Result<()> {
        self.call(AgentRequest::StopPipeline { id }).await?;
        Ok(())
    }

    pub async fn destroy_pipeline(&self, id: i64) -> Result<()> {
        self.call(AgentRequest::DestroyPipeline { id }).await?;
        Ok(())
    }

    pub async fn get_pipeline_state(&self, id: i64) -> Result<PipelineState> {
        let reply = self.call(AgentRequest::GetPipelineState { id }).await?;
        let code = missing(reply.state, "get_pipeline_state", "state")?;
        Ok(PipelineState::from_code(code))
    }

    // ─────────────────────────────────────────────────────────────
    // Models
    // ─────────────────────────────────────────────────────────────

    /// Register a model file, returning the version the daemon assigned
    pub async fn register_model(
        &self,
        name: &str,
        path: &Path,
        activate: bool,
        description: Option<&str>,
    ) -> Result<u32> {
        require("name", name)?;
        validate_model_path(path)?;
        let path_text = path
            .to_str()
            .ok_or_else(|| Error::invalid_parameter("path", "model path is not valid UTF-8"))?;

        let reply = self
            .call(AgentRequest::RegisterModel {
                name: name.to_string(),
                path: path_text.to_string(),
                activate,
                description: description.unwrap_or_default().to_string(),
            })
            .await?;
        let version = missing(reply.version, "register_model", "version")?;
        info!(name, version, activate, "Model registered");
        Ok(version)
    }

    pub async fn update_model_description(
        &self,
        name: &str,
        version: u32,
        description: &str,
    ) -> Result<()> {
        require("name", name)?;
        require_version(version)?;
        require("description", description)?;

        self.call(AgentRequest::UpdateModelDescription {
            name: name.to_string(),
            version,
            description: description.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn activate_model(&self, name: &str, version: u32) -> Result<()> {
        require("name", name)?;
        require_version(version)?;

        self.call(AgentRequest::ActivateModel {
            name: name.to_string(),
            version,
        })
        .await?;
        info!(name, version, "Model activated");
        Ok(())
    }

    pub async fn get_model(&self, name: &str, version: u32) -> Result<OptionStore> {
        require("name", name)?;
        let reply = self
            .call(AgentRequest::GetModel {
                name: name.to_string(),
                version,
            })
            .await?;
        decode_object(&missing(reply.info, "get_model", "info")?)
    }

    pub async fn get_activated_model(&self, name: &str) -> Result<OptionStore> {
        require("name", name)?;
        let reply = self
            .call(AgentRequest::GetActivatedModel { name: name.to_string() })
            .await?;
        decode_object(&missing(reply.info, "get_activated_model", "info")?)
    }

    /// Every registered version of `name`, one store per version
    pub async fn get_all_models(&self, name: &str) -> Result<Vec<OptionStore>> {
        require("name", name)?;
        let reply = self
            .call(AgentRequest::GetAllModels { name: name.to_string() })
            .await?;
        decode_list(&missing(reply.info, "get_all_models", "info")?)
    }

    pub async fn delete_model(&self, name: &str, version: u32) -> Result<()> {
        require("name", name)?;
        self.call(AgentRequest::DeleteModel {
            name: name.to_string(),
            version,
        })
        .await?;
        Ok(())
    }
}

/// Check a model path before it is handed to the daemon.
///
/// The parent directory must be accessible, and the path must be an
/// absolute path to an existing regular file that is not a symlink.
pub fn validate_model_path(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::metadata(parent).map_err(|e| Error::PermissionDenied {
        path: parent.to_path_buf(),
        source: e,
    })?;

    if !path.is_absolute() {
        return Err(Error::invalid_parameter(
            "path",
            format!("model path must be absolute: {}", path.display()),
        ));
    }

    let meta = std::fs::symlink_metadata(path).map_err(|_| {
        Error::invalid_parameter("path", format!("model file does not exist: {}", path.display()))
    })?;
    if meta.file_type().is_symlink() {
        return Err(Error::invalid_parameter(
            "path",
            format!("model path must not be a symbolic link: {}", path.display()),
        ));
    }
    if !meta.is_file() {
        return Err(Error::invalid_parameter(
            "path",
            format!("model path is not a regular file: {}", path.display()),
        ));
    }
    Ok(())
}

fn require(name: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_parameter(name, "must not be empty"));
    }
    Ok(())
}

fn require_version(version: u32) -> Result<()> {
    if version == 0 {
        return Err(Error::invalid_parameter("version", "model versions start at 1"));
    }
    Ok(())
}

fn missing<T>(value: Option<T>, method: &str, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::ProtocolUnexpected {
        expected: format!("'{}' in {} reply", field, method),
        actual: "no such field".to_string(),
    })
}
