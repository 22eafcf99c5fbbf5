//! `ml-service` binary entry point

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info};

use ml_service::agent::AgentClient;
use ml_service::cli::{
    Cli, Commands, ConfigSubcommand, EdgeArgs, ModelCommand, PipelineCommand, RemoteCommand,
};
use ml_service::config::{self, ServiceConfig};
use ml_service::edge::{
    DefaultTransportFactory, NodeRole, KEY_CONNECT_TYPE, KEY_DEST_HOST, KEY_DEST_PORT, KEY_HOST,
    KEY_NODE_TYPE, KEY_PORT, KEY_TOPIC,
};
use ml_service::error::{Error, Result};
use ml_service::logging;
use ml_service::options::OptionStore;
use ml_service::service::{
    DispatchReport, EventDispatcher, MlService, RouteOutcome, ServiceRouter, ServiceType,
};
use ml_service::version::BUILD_INFO;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            print!("{}", BUILD_INFO);
            return Ok(());
        }
        Commands::Config { ref subcommand } => {
            return handle_config_command(subcommand, cli.config.as_deref());
        }
        _ => {}
    }

    let config = ServiceConfig::load(cli.config.as_deref())?;
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;
    debug!(version = %BUILD_INFO.full_version(), "Starting ml-service");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create runtime: {}", e)))?;

    runtime.block_on(async move {
        let agent = Arc::new(AgentClient::from_settings(&config.agent)?);
        match cli.command {
            Commands::Pipeline { subcommand } => run_pipeline(&agent, subcommand).await,
            Commands::Model { subcommand } => run_model(&agent, subcommand).await,
            Commands::Remote { subcommand } => run_remote(&config, agent, subcommand).await,
            Commands::Version | Commands::Config { .. } => Ok(()),
        }
    })
}

// ─────────────────────────────────────────────────────────────────
// Pipelines
// ─────────────────────────────────────────────────────────────────

async fn run_pipeline(agent: &Arc<AgentClient>, command: PipelineCommand) -> Result<()> {
    match command {
        PipelineCommand::Set { name, description } => {
            agent.set_pipeline(&name, &description).await?;
        }
        PipelineCommand::Get { name } => {
            println!("{}", agent.get_pipeline(&name).await?);
        }
        PipelineCommand::Delete { name } => {
            agent.delete_pipeline(&name).await?;
        }
        PipelineCommand::Launch { name, start } => {
            let service = MlService::launch_pipeline(agent.clone(), &name).await?;
            if start {
                service.start().await?;
            }
            if let Some(pipeline) = service.as_pipeline() {
                println!("{}", pipeline.id());
            }
        }
        PipelineCommand::Start { id } => agent.start_pipeline(id).await?,
        PipelineCommand::Stop { id } => agent.stop_pipeline(id).await?,
        PipelineCommand::Destroy { id } => agent.destroy_pipeline(id).await?,
        PipelineCommand::State { id } => {
            println!("{}", agent.get_pipeline_state(id).await?);
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Models
// ─────────────────────────────────────────────────────────────────

async fn run_model(agent: &AgentClient, command: ModelCommand) -> Result<()> {
    match command {
        ModelCommand::Register {
            name,
            path,
            activate,
            description,
        } => {
            let version = agent
                .register_model(&name, &path, activate, description.as_deref())
                .await?;
            println!("{}", version);
        }
        ModelCommand::UpdateDescription {
            name,
            version,
            description,
        } => agent.update_model_description(&name, version, &description).await?,
        ModelCommand::Activate { name, version } => agent.activate_model(&name, version).await?,
        ModelCommand::Get { name, version, json } => {
            print_records(&[agent.get_model(&name, version).await?], json)?;
        }
        ModelCommand::GetActivated { name, json } => {
            print_records(&[agent.get_activated_model(&name).await?], json)?;
        }
        ModelCommand::List { name, json } => {
            print_records(&agent.get_all_models(&name).await?, json)?;
        }
        ModelCommand::Delete { name, version } => agent.delete_model(&name, version).await?,
    }
    Ok(())
}

fn print_records(records: &[OptionStore], json: bool) -> Result<()> {
    if json {
        let text = match records {
            [one] => serde_json::to_string_pretty(one)?,
            many => serde_json::to_string_pretty(many)?,
        };
        println!("{}", text);
        return Ok(());
    }

    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            println!();
        }
        for (key, value) in record.iter() {
            println!("{}: {}", key, value);
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Remote
// ─────────────────────────────────────────────────────────────────

fn edge_options(edge: &EdgeArgs, role: NodeRole) -> OptionStore {
    let mut options = OptionStore::new()
        .with(KEY_CONNECT_TYPE, edge.connect_type.as_str())
        .with(KEY_NODE_TYPE, role.name())
        .with(KEY_HOST, edge.host.as_str())
        .with(KEY_PORT, edge.port);
    if let Some(ref topic) = edge.topic {
        options.set(KEY_TOPIC, topic.as_str());
    }
    options
}

async fn run_remote(config: &ServiceConfig, agent: Arc<AgentClient>, command: RemoteCommand) -> Result<()> {
    let factory = DefaultTransportFactory::new(config.edge.tcp_edge_config());

    match command {
        RemoteCommand::Send {
            edge,
            service_type,
            key,
            payload,
            file,
            wait_secs,
        } => {
            let kind = ServiceType::parse(&service_type);
            if kind == ServiceType::Unknown {
                return Err(Error::invalid_parameter(
                    "service-type",
                    format!("unrecognized service type '{}'", service_type),
                ));
            }
            let payload = match (payload, file) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(path)) => read_payload(&path)?,
                (None, None) => return Err(Error::invalid_parameter("payload", "no payload given")),
            };

            let options = edge_options(&edge, NodeRole::Sender);
            let mut service = MlService::create_remote(&options, &factory, agent).await?;
            let result = publish(&service, kind, &key, &payload, Duration::from_secs(wait_secs)).await;
            service.release().await?;
            result
        }
        RemoteCommand::Listen {
            edge,
            dest_host,
            dest_port,
            count,
        } => {
            let mut options = edge_options(&edge, NodeRole::Receiver);
            options.set(KEY_DEST_HOST, dest_host.as_str());
            options.set(KEY_DEST_PORT, dest_port);

            let (tx, rx) = mpsc::unbounded_channel();
            let dispatcher = EventDispatcher::new(ServiceRouter::new(agent)).with_reports(tx);
            let mut service = MlService::create_remote_with(&options, &factory, dispatcher).await?;
            info!(dest = %format!("{}:{}", dest_host, dest_port), "Listening for services");

            listen(rx, count).await;
            service.release().await
        }
    }
}

fn read_payload(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::IoRead {
        path: path.to_path_buf(),
        source: e,
    })
}

async fn publish(service: &MlService, kind: ServiceType, key: &str, payload: &[u8], wait: Duration) -> Result<()> {
    let remote = service
        .as_remote()
        .ok_or_else(|| Error::Internal("create_remote returned a non-remote handle".to_string()))?;

    if let Some(addr) = remote.local_addr() {
        println!("Publishing on {}", addr);
    }

    tokio::time::timeout(wait, async {
        while remote.connected_peers() == 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .map_err(|_| Error::ConnectionTimeout {
        target: "subscriber".to_string(),
        timeout_ms: wait.as_millis() as u64,
    })?;

    service.register(kind, key, payload).await?;
    println!("Sent {} '{}' to {} subscriber(s)", kind, key, remote.connected_peers());
    Ok(())
}

async fn listen(mut reports: mpsc::UnboundedReceiver<DispatchReport>, count: Option<usize>) {
    let mut seen = 0usize;
    loop {
        tokio::select! {
            report = reports.recv() => {
                let Some(report) = report else { break };
                print_report(&report);
                seen += 1;
                if count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }
}

fn print_report(report: &DispatchReport) {
    match report.result {
        Ok(RouteOutcome::PipelineRegistered { ref name }) => {
            println!("Registered pipeline '{}'", name);
        }
        Err(ref message) => {
            eprintln!(
                "Rejected packet {} ({}): {}",
                report.packet,
                report.service_type.as_deref().unwrap_or("no service type"),
                message
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────

fn handle_config_command(subcommand: &ConfigSubcommand, config_path: Option<&str>) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = ServiceConfig::load(config_path)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), *force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate => {
            ServiceConfig::load(config_path)?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
