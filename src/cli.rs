//! Command line definition

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::CONFIG_ENV_VAR;

#[derive(Parser, Debug)]
#[command(
    name = "openvox-certctl",
    version,
    about = "Manage OpenVox/Puppet node certificates through the CA and PuppetDB APIs"
)]
pub struct Cli {
    /// Configuration file (default: searched in the standard locations)
    #[arg(long, short = 'c', env = CONFIG_ENV_VAR, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create this host's key and CSR and submit it to the CA
    Init {
        #[arg(long)]
        hostname: String,
        /// Subject alternative names (comma separated or repeated)
        #[arg(long = "san", value_delimiter = ',')]
        alt_names: Vec<String>,
    },
    /// Fetch and install this host's signed certificate
    Install {
        #[arg(long)]
        hostname: String,
    },
    /// Certificate operations
    Cert(CertCommand),
    /// PuppetDB node operations
    Node(NodeCommand),
    /// Revoke and delete a node's certificate, then deactivate it in PuppetDB
    Decommission {
        hostname: String,
    },
}

#[derive(Args, Debug)]
pub struct CertCommand {
    #[command(subcommand)]
    pub command: CertSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CertSubcommand {
    /// Generate key and CSR under an SSL directory and submit the CSR
    Generate {
        #[arg(long)]
        hostname: String,
        #[arg(long)]
        ssldir: PathBuf,
        #[arg(long = "san", value_delimiter = ',')]
        alt_names: Vec<String>,
    },
    /// Download a signed certificate into an SSL directory
    Get {
        #[arg(long)]
        hostname: String,
        #[arg(long)]
        ssldir: PathBuf,
    },
    /// Show the CA's certificate status
    Status {
        #[arg(long)]
        hostname: String,
    },
    /// Sign a pending certificate request
    Sign {
        #[arg(long)]
        hostname: String,
    },
    /// Revoke a signed certificate
    Revoke {
        #[arg(long)]
        hostname: String,
    },
    /// Delete a revoked certificate from the CA
    Delete {
        #[arg(long)]
        hostname: String,
    },
    /// Compare the installed certificate with the CA's record
    Verify {
        #[arg(long)]
        hostname: String,
        /// SSL directory (default: derived from ssl.client_key)
        #[arg(long)]
        ssldir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct NodeCommand {
    #[command(subcommand)]
    pub command: NodeSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum NodeSubcommand {
    /// Show what PuppetDB knows about a node
    Status { hostname: String },
    /// Deactivate a node in PuppetDB
    Deactivate { hostname: String },
}
