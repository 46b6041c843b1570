use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "aqfish",
    about = "Ephemeral compute fleet manager: run a node, or talk to one",
    version
)]
pub struct Cli {
    /// Base URL of a running node's API, e.g. http://localhost:8080.
    #[arg(long, env = "AQFISH_URL", global = true, default_value = "http://localhost:8080")]
    pub remote: String,

    /// Basic-auth username for remote commands.
    #[arg(long, env = "AQFISH_USER", global = true, default_value = "admin")]
    pub user: String,

    /// Basic-auth password for remote commands.
    #[arg(long, env = "AQFISH_PASSWORD", global = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a node: load its config, open its store, and serve the API,
    /// cluster listener, and pickup-loop supervisor.
    Serve {
        /// Path to the node's YAML config file.
        config: PathBuf,

        /// Use an in-memory store instead of opening a redb file on disk.
        #[arg(long)]
        ephemeral: bool,

        /// Override the redb file path (defaults to ~/.aqfish/<node_name>.redb).
        #[arg(long)]
        store_path: Option<PathBuf>,

        /// Soft cap on auto-discovered (non-explicit) cluster peers.
        #[arg(long, default_value_t = 8)]
        auto_connect_cap: usize,

        /// Password for the bootstrap `admin` account (random if omitted).
        #[arg(long, env = "AQFISH_ADMIN_PASSWORD")]
        admin_password: Option<String>,
    },

    /// Manage Labels.
    Label {
        #[command(subcommand)]
        command: LabelCommand,
    },

    /// Manage Applications.
    Application {
        #[command(subcommand)]
        command: ApplicationCommand,
    },

    /// Inspect and administer cluster Nodes.
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Show a node's aggregate Application-count status.
    Status,
}

#[derive(Debug, Subcommand)]
pub enum LabelCommand {
    /// Create a Label from a JSON or YAML body file.
    Create {
        /// Path to the Label body; `.yaml`/`.yml` is sent as YAML, else JSON.
        file: PathBuf,
    },
    /// List visible Labels, optionally filtered (`name = 'x'`, `ownerName LIKE 'a%'`, ...).
    List {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Fetch one Label by UID.
    Get { uid: String },
}

#[derive(Debug, Subcommand)]
pub enum ApplicationCommand {
    /// Create an Application against a Label.
    Create {
        label_uid: String,
        /// Optional JSON metadata blob.
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Fetch an Application's current status.
    Get { uid: String },
    /// Request deallocation of an Application (idempotent).
    Deallocate { uid: String },
    /// Request a single-use access token+credentials for an allocated Application.
    Access { uid: String },
}

#[derive(Debug, Subcommand)]
pub enum NodeCommand {
    /// List known Nodes.
    List,
    /// Toggle this node's maintenance mode or request/cancel shutdown.
    Maintenance {
        #[arg(long)]
        enable: Option<bool>,
        #[arg(long)]
        shutdown: Option<bool>,
        #[arg(long, default_value_t = 0)]
        shutdown_delay_secs: u64,
    },
}
