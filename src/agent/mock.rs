//! In-memory ML agent for testing
//!
//! Keeps pipeline descriptions, launched instances and model versions the
//! way the daemon does, and answers with the same status conventions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{Error, Result};

use super::endpoint::{AgentConnection, AgentEndpoint};
use super::messages::{AgentInterface, AgentReply, AgentRequest, PipelineState};

/// Status for an unknown pipeline, instance or model
pub const STATUS_NOT_FOUND: i32 = -2;

/// Status for arguments the daemon refuses
pub const STATUS_INVALID: i32 = -22;

#[derive(Debug, Clone, Default)]
pub struct MockAgentConfig {
    /// Refuse every connection attempt
    pub fail_connect: bool,

    /// Sleep before answering each call
    pub reply_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
struct ModelEntry {
    name: String,
    version: u32,
    path: String,
    description: String,
    active: bool,
}

#[derive(Serialize)]
struct ModelInfoDoc<'a> {
    version: String,
    active: &'static str,
    path: &'a str,
    description: &'a str,
}

impl<'a> From<&'a ModelEntry> for ModelInfoDoc<'a> {
    fn from(m: &'a ModelEntry) -> Self {
        Self {
            version: m.version.to_string(),
            active: if m.active { "T" } else { "F" },
            path: &m.path,
            description: &m.description,
        }
    }
}

#[derive(Debug, Default)]
struct DaemonState {
    pipelines: HashMap<String, String>,
    instances: HashMap<i64, (String, PipelineState)>,
    next_id: i64,
    models: Vec<ModelEntry>,
}

struct Inner {
    name: String,
    config: MockAgentConfig,
    state: Mutex<DaemonState>,
    forced: Mutex<HashMap<String, i32>>,
    info_override: Mutex<Option<String>>,
    calls: Mutex<Vec<AgentRequest>>,
    connects: AtomicUsize,
}

/// Mock daemon; clones share state
#[derive(Clone)]
pub struct MockAgent {
    inner: Arc<Inner>,
}

impl MockAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, MockAgentConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: MockAgentConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                state: Mutex::new(DaemonState::default()),
                forced: Mutex::new(HashMap::new()),
                info_override: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
                connects: AtomicUsize::new(0),
            }),
        }
    }

    /// Answer `method` with `status` from now on
    pub fn force_status(&self, method: &str, status: i32) {
        self.inner.forced.lock().insert(method.to_string(), status);
    }

    /// Replace the `info` text of successful model lookups
    pub fn set_info_override(&self, info: Option<String>) {
        *self.inner.info_override.lock() = info;
    }

    /// Every request handled so far, oldest first
    pub fn calls(&self) -> Vec<AgentRequest> {
        self.inner.calls.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn pipeline_description(&self, name: &str) -> Option<String> {
        self.inner.state.lock().pipelines.get(name).cloned()
    }

    pub fn instance_count(&self) -> usize {
        self.inner.state.lock().instances.len()
    }

    /// Process one request against the in-memory state
    pub fn handle(&self, request: &AgentRequest) -> AgentReply {
        self.inner.calls.lock().push(request.clone());

        if let Some(&status) = self.inner.forced.lock().get(request.method_name()) {
            return AgentReply::failed(status);
        }

        let mut reply = {
            let mut state = self.inner.state.lock();
            apply(&mut state, request)
        };

        if reply.status == 0 && reply.info.is_some() {
            if let Some(ref info) = *self.inner.info_override.lock() {
                reply.info = Some(info.clone());
            }
        }
        reply
    }
}

fn apply(state: &mut DaemonState, request: &AgentRequest) -> AgentReply {
    match request {
        AgentRequest::SetPipeline { name, description } => {
            state.pipelines.insert(name.clone(), description.clone());
            AgentReply::ok()
        }
        AgentRequest::GetPipeline { name } => match state.pipelines.get(name) {
            Some(description) => AgentReply {
                description: Some(description.clone()),
                ..AgentReply::ok()
            },
            None => AgentReply::failed(STATUS_NOT_FOUND),
        },
        AgentRequest::DeletePipeline { name } => match state.pipelines.remove(name) {
            Some(_) => AgentReply::ok(),
            None => AgentReply::failed(STATUS_NOT_FOUND),
        },
        AgentRequest::LaunchPipeline { name } => {
            if !state.pipelines.contains_key(name) {
                return AgentReply::failed(STATUS_NOT_FOUND);
            }
            state.next_id += 1;
            let id = state.next_id;
            state
                .instances
                .insert(id, (name.clone(), PipelineState::Paused));
            AgentReply {
                id: Some(id),
                ..AgentReply::ok()
            }
        }
        AgentRequest::StartPipeline { id } => set_state(state, *id, PipelineState::Playing),
        AgentRequest::StopPipeline { id } => set_state(state, *id, PipelineState::Paused),
        AgentRequest::DestroyPipeline { id } => match state.instances.remove(id) {
            Some(_) => AgentReply::ok(),
            None => AgentReply::failed(STATUS_NOT_FOUND),
        },
        AgentRequest::GetPipelineState { id } => match state.instances.get(id) {
            Some((_, s)) => AgentReply {
                state: Some(s.code()),
                ..AgentReply::ok()
            },
            None => AgentReply::failed(STATUS_NOT_FOUND),
        },

        AgentRequest::RegisterModel {
            name,
            path,
            activate,
            description,
        } => {
            if name.is_empty() || path.is_empty() {
                return AgentReply::failed(STATUS_INVALID);
            }
            let version = state
                .models
                .iter()
                .filter(|m| &m.name == name)
                .map(|m| m.version)
                .max()
                .unwrap_or(0)
                + 1;
            if *activate {
                deactivate_all(state, name);
            }
            state.models.push(ModelEntry {
                name: name.clone(),
                version,
                path: path.clone(),
                description: description.clone(),
                active: *activate,
            });
            AgentReply {
                version: Some(version),
                ..AgentReply::ok()
            }
        }
        AgentRequest::UpdateModelDescription {
            name,
            version,
            description,
        } => match find_model(state, name, *version) {
            Some(m) => {
                m.description = description.clone();
                AgentReply::ok()
            }
            None => AgentReply::failed(STATUS_NOT_FOUND),
        },
        AgentRequest::ActivateModel { name, version } => {
            if find_model(state, name, *version).is_none() {
                return AgentReply::failed(STATUS_NOT_FOUND);
            }
            deactivate_all(state, name);
            if let Some(m) = find_model(state, name, *version) {
                m.active = true;
            }
            AgentReply::ok()
        }
        AgentRequest::GetModel { name, version } => {
            let found = state
                .models
                .iter()
                .find(|m| &m.name == name && m.version == *version);
            model_info_reply(found.map(|m| vec![m]), false)
        }
        AgentRequest::GetActivatedModel { name } => {
            let found = state.models.iter().find(|m| &m.name == name && m.active);
            model_info_reply(found.map(|m| vec![m]), false)
        }
        AgentRequest::GetAllModels { name } => {
            let mut all: Vec<&ModelEntry> = state.models.iter().filter(|m| &m.name == name).collect();
            all.sort_by_key(|m| m.version);
            let found = if all.is_empty() { None } else { Some(all) };
            model_info_reply(found, true)
        }
        AgentRequest::DeleteModel { name, version } => {
            let before = state.models.len();
            state
                .models
                .retain(|m| !(&m.name == name && m.version == *version));
            if state.models.len() == before {
                AgentReply::failed(STATUS_NOT_FOUND)
            } else {
                AgentReply::ok()
            }
        }
    }
}

fn set_state(state: &mut DaemonState, id: i64, to: PipelineState) -> AgentReply {
    match state.instances.get_mut(&id) {
        Some((_, s)) => {
            *s = to;
            AgentReply::ok()
        }
        None => AgentReply::failed(STATUS_NOT_FOUND),
    }
}

fn find_model<'a>(state: &'a mut DaemonState, name: &str, version: u32) -> Option<&'a mut ModelEntry> {
    state
        .models
        .iter_mut()
        .find(|m| m.name == name && m.version == version)
}

fn deactivate_all(state: &mut DaemonState, name: &str) {
    for m in state.models.iter_mut().filter(|m| m.name == name) {
        m.active = false;
    }
}

fn model_info_reply(found: Option<Vec<&ModelEntry>>, as_list: bool) -> AgentReply {
    let Some(models) = found else {
        return AgentReply::failed(STATUS_NOT_FOUND);
    };
    let docs: Vec<ModelInfoDoc> = models.into_iter().map(ModelInfoDoc::from).collect();
    let encoded = if as_list {
        serde_json::to_string(&docs)
    } else {
        serde_json::to_string(&docs[0])
    };
    match encoded {
        Ok(info) => AgentReply {
            info: Some(info),
            ..AgentReply::ok()
        },
        Err(_) => AgentReply::failed(STATUS_INVALID),
    }
}

#[async_trait]
impl AgentEndpoint for MockAgent {
    fn name(&self) -> String {
        self.inner.name.clone()
    }

    async fn connect(&self, _interface: AgentInterface) -> Result<Box<dyn AgentConnection>> {
        if self.inner.config.fail_connect {
            return Err(Error::connection_failed(
                self.inner.name.clone(),
                "mock agent unreachable",
            ));
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection { agent: self.clone() }))
    }
}

struct MockConnection {
    agent: MockAgent,
}

#[async_trait]
impl AgentConnection for MockConnection {
    async fn call(&mut self, request: &AgentRequest) -> Result<AgentReply> {
        if let Some(delay) = self.agent.inner.config.reply_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.agent.handle(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_requires_stored_pipeline() {
        let agent = MockAgent::new("mock");
        let reply = agent.handle(&AgentRequest::LaunchPipeline { name: "p".into() });
        assert_eq!(reply.status, STATUS_NOT_FOUND);

        agent.handle(&AgentRequest::SetPipeline {
            name: "p".into(),
            description: "videotestsrc ! fakesink".into(),
        });
        let reply = agent.handle(&AgentRequest::LaunchPipeline { name: "p".into() });
        assert_eq!(reply.status, 0);
        assert_eq!(reply.id, Some(1));
    }

    #[test]
    fn test_register_bumps_version_and_moves_activation() {
        let agent = MockAgent::new("mock");
        let register = |activate| AgentRequest::RegisterModel {
            name: "m".into(),
            path: "/opt/m.tflite".into(),
            activate,
            description: String::new(),
        };

        assert_eq!(agent.handle(&register(true)).version, Some(1));
        assert_eq!(agent.handle(&register(true)).version, Some(2));

        let reply = agent.handle(&AgentRequest::GetActivatedModel { name: "m".into() });
        let info = reply.info.unwrap();
        assert!(info.starts_with(r#"{"version":"2","active":"T""#), "{}", info);
    }

    #[test]
    fn test_forced_status_and_call_log() {
        let agent = MockAgent::new("mock");
        agent.force_status("get_pipeline", -5);

        let reply = agent.handle(&AgentRequest::GetPipeline { name: "p".into() });
        assert_eq!(reply.status, -5);
        assert_eq!(agent.calls().len(), 1);
    }
}
