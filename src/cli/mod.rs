use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stowage")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Daemon socket or address (e.g., unix:///var/run/docker.sock, tcp://host:2375)
    #[arg(short = 'H', long, global = true, env = "DOCKER_HOST")]
    pub host: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a swarm service
    Create {
        /// Image to run
        image: Option<String>,

        /// Service name
        #[arg(long)]
        name: Option<String>,

        /// Number of tasks
        #[arg(long)]
        replicas: Option<u64>,

        /// Environment variables (e.g., KEY=value)
        #[arg(short, long)]
        env: Vec<String>,

        /// Placement constraints (e.g., node.role==manager)
        #[arg(long = "constraint")]
        constraints: Vec<String>,

        /// Service labels (e.g., team=web)
        #[arg(short, long = "label")]
        labels: Vec<String>,

        /// Read the service spec from a JSON file; flags are applied on top
        #[arg(long, value_name = "FILE")]
        spec: Option<PathBuf>,

        /// Do not pin the image by digest
        #[arg(long)]
        no_resolve_image: bool,

        /// Send registry credentials to the daemon
        #[arg(long)]
        with_registry_auth: bool,

        /// Resolve the image against its registry instead of through the daemon
        #[arg(long)]
        direct_registry: bool,

        /// Arguments passed to the container
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Show the digest and platforms of an image
    Inspect {
        /// Image reference to inspect
        image: String,

        /// Send registry credentials to the daemon
        #[arg(long)]
        with_registry_auth: bool,

        /// Query the registry directly instead of through the daemon
        #[arg(long)]
        direct_registry: bool,
    },

    /// Show version information
    Version,
}
