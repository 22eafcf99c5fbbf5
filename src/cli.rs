//! CLI argument parsing using clap v4

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// ML service client
///
/// Manages pipelines and models held by the ML agent daemon, and publishes
/// or receives services over edge connections.
#[derive(Parser, Debug)]
#[command(name = "ml-service")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "ML_SERVICE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stored pipeline descriptions and launched pipelines
    Pipeline {
        #[command(subcommand)]
        subcommand: PipelineCommand,
    },

    /// Model registry
    Model {
        #[command(subcommand)]
        subcommand: ModelCommand,
    },

    /// Publish or receive services over an edge connection
    Remote {
        #[command(subcommand)]
        subcommand: RemoteCommand,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Display version and build information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PipelineCommand {
    /// Store a pipeline description under a name
    Set { name: String, description: String },

    /// Print the stored description
    Get { name: String },

    /// Remove a stored description
    Delete { name: String },

    /// Launch a stored pipeline and print its instance id
    Launch {
        name: String,

        /// Start the instance right after launching it
        #[arg(long)]
        start: bool,
    },

    /// Start a launched instance
    Start { id: i64 },

    /// Pause a launched instance
    Stop { id: i64 },

    /// Destroy a launched instance
    Destroy { id: i64 },

    /// Print the state of a launched instance
    State { id: i64 },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ModelCommand {
    /// Register a model file and print the assigned version
    Register {
        name: String,

        /// Absolute path of the model file
        path: PathBuf,

        /// Make this version the active one
        #[arg(long)]
        activate: bool,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Replace the description of one version
    #[command(disable_version_flag = true)]
    UpdateDescription {
        name: String,
        version: u32,
        description: String,
    },

    /// Make one version the active one
    #[command(disable_version_flag = true)]
    Activate { name: String, version: u32 },

    /// Show one version
    #[command(disable_version_flag = true)]
    Get {
        name: String,
        version: u32,

        #[arg(long)]
        json: bool,
    },

    /// Show the active version
    GetActivated {
        name: String,

        #[arg(long)]
        json: bool,
    },

    /// Show every version
    List {
        name: String,

        #[arg(long)]
        json: bool,
    },

    /// Remove one version
    #[command(disable_version_flag = true)]
    Delete { name: String, version: u32 },
}

/// Edge connection options shared by `remote` commands
#[derive(Args, Debug, Clone)]
pub struct EdgeArgs {
    /// Transport: TCP, HYBRID, MQTT or AITT
    #[arg(long, default_value = "TCP")]
    pub connect_type: String,

    /// Local address
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Local port (0 = any)
    #[arg(long, default_value_t = 0)]
    pub port: u16,

    #[arg(long)]
    pub topic: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RemoteCommand {
    /// Publish one service envelope to subscribers
    Send {
        #[command(flatten)]
        edge: EdgeArgs,

        /// Service type, e.g. pipeline_raw
        #[arg(long, default_value = "pipeline_raw")]
        service_type: String,

        /// Service key, e.g. the pipeline name
        key: String,

        /// Payload text
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        payload: Option<String>,

        /// Read the payload from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Seconds to wait for a subscriber before giving up
        #[arg(long, default_value_t = 30)]
        wait_secs: u64,
    },

    /// Subscribe to a sender and route what arrives to the ML agent
    Listen {
        #[command(flatten)]
        edge: EdgeArgs,

        /// Sender address
        #[arg(long, default_value = "localhost")]
        dest_host: String,

        /// Sender port
        #[arg(long)]
        dest_port: u16,

        /// Exit after this many packets
        #[arg(long)]
        count: Option<usize>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}
