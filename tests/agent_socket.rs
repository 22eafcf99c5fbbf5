//! ML agent client over real unix sockets
//!
//! A small in-process daemon answers framed calls with the mock agent's
//! state machine.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

use ml_service::agent::{AgentCall, AgentClient, MockAgent, PipelineState, STATUS_NOT_FOUND};
use ml_service::config::AgentSettings;
use ml_service::error::Error;
use ml_service::framing::{read_frame, write_frame, MAX_FRAME_SIZE};

/// Serve framed agent calls on `path` until the task is aborted
fn serve(path: &Path, agent: MockAgent) -> JoinHandle<()> {
    let listener = UnixListener::bind(path).unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            let agent = agent.clone();
            tokio::spawn(async move {
                while let Ok(call) = read_frame::<AgentCall, _>(&mut stream, MAX_FRAME_SIZE).await {
                    let reply = agent.handle(&call.request);
                    if write_frame(&mut stream, &reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    })
}

/// Accept connections and never answer
fn serve_silent(path: &Path) -> JoinHandle<()> {
    let listener = UnixListener::bind(path).unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    })
}

fn settings(system: &Path, session: Option<PathBuf>, scopes: &[&str]) -> AgentSettings {
    let mut settings = AgentSettings::default();
    settings.system_socket = system.to_string_lossy().into_owned();
    settings.session_socket = session.map(|p| p.to_string_lossy().into_owned());
    settings.scopes = scopes.iter().map(|s| s.to_string()).collect();
    settings.connect_timeout_ms = 500;
    settings
}

#[tokio::test]
async fn test_pipeline_lifecycle_over_socket() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("system.sock");
    let daemon = serve(&sock, MockAgent::new("daemon"));

    let client = AgentClient::from_settings(&settings(&sock, None, &["system"])).unwrap();

    client.set_pipeline("cam", "v4l2src ! fakesink").await.unwrap();
    assert_eq!(client.get_pipeline("cam").await.unwrap(), "v4l2src ! fakesink");

    let id = client.launch_pipeline("cam").await.unwrap();
    assert_eq!(client.get_pipeline_state(id).await.unwrap(), PipelineState::Paused);
    client.start_pipeline(id).await.unwrap();
    assert_eq!(client.get_pipeline_state(id).await.unwrap(), PipelineState::Playing);
    client.stop_pipeline(id).await.unwrap();
    client.destroy_pipeline(id).await.unwrap();

    client.delete_pipeline("cam").await.unwrap();
    let err = client.get_pipeline("cam").await.unwrap_err();
    assert!(matches!(err, Error::Daemon { status, .. } if status == STATUS_NOT_FOUND));

    daemon.abort();
}

#[tokio::test]
async fn test_model_registry_over_socket() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("system.sock");
    let daemon = serve(&sock, MockAgent::new("daemon"));
    let model = dir.path().join("mobilenet.tflite");
    fs::write(&model, b"tflite").unwrap();

    let client = AgentClient::from_settings(&settings(&sock, None, &["system"])).unwrap();

    assert_eq!(client.register_model("mobilenet", &model, true, Some("v1")).await.unwrap(), 1);
    assert_eq!(client.register_model("mobilenet", &model, false, None).await.unwrap(), 2);
    client.update_model_description("mobilenet", 2, "second").await.unwrap();

    let first = client.get_model("mobilenet", 1).await.unwrap();
    assert_eq!(first.get_str("version"), Some("1"));
    assert_eq!(first.get_str("active"), Some("T"));
    assert_eq!(first.get_str("path"), model.to_str());

    client.activate_model("mobilenet", 2).await.unwrap();
    let active = client.get_activated_model("mobilenet").await.unwrap();
    assert_eq!(active.get_str("version"), Some("2"));
    assert_eq!(active.get_str("description"), Some("second"));

    let all = client.get_all_models("mobilenet").await.unwrap();
    let versions: Vec<_> = all.iter().filter_map(|m| m.get_str("version")).collect();
    assert_eq!(versions, vec!["1", "2"]);
    let keys: Vec<_> = all[0].keys().collect();
    assert_eq!(keys, vec!["version", "active", "path", "description"]);

    client.delete_model("mobilenet", 1).await.unwrap();
    assert_eq!(client.get_all_models("mobilenet").await.unwrap().len(), 1);

    daemon.abort();
}

#[tokio::test]
async fn test_falls_back_to_session_scope() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("system.sock");
    let session = dir.path().join("session.sock");
    let agent = MockAgent::new("session-daemon");
    let daemon = serve(&session, agent.clone());

    let client = AgentClient::from_settings(&settings(
        &missing,
        Some(session.clone()),
        &["system", "session"],
    ))
    .unwrap();

    client.set_pipeline("mic", "pulsesrc ! fakesink").await.unwrap();
    assert_eq!(agent.pipeline_description("mic").as_deref(), Some("pulsesrc ! fakesink"));

    daemon.abort();
}

#[tokio::test]
async fn test_all_scopes_unreachable() {
    let dir = TempDir::new().unwrap();
    let client = AgentClient::from_settings(&settings(
        &dir.path().join("system.sock"),
        Some(dir.path().join("session.sock")),
        &["system", "session"],
    ))
    .unwrap();

    let err = client.get_pipeline("cam").await.unwrap_err();
    match err {
        Error::ServiceUnavailable { last: Some(last), .. } => {
            // Most recent endpoint error wins
            assert!(last.to_string().contains("session bus"));
        }
        other => panic!("expected ServiceUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_silent_daemon_times_out() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("system.sock");
    let daemon = serve_silent(&sock);

    let client = AgentClient::from_settings(&settings(&sock, None, &["system"]))
        .unwrap()
        .with_timeout(Duration::from_millis(200));

    let err = client.get_pipeline("cam").await.unwrap_err();
    assert!(matches!(err, Error::RpcTimeout { ref method, timeout_ms: 200 } if method == "get_pipeline"));

    daemon.abort();
}
