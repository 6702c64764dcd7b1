//! CLI argument definitions using clap.

use std::path::PathBuf;

use bluesync_types::{Address, ProfileId};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "bluesync")]
#[command(author, version, about = "Replay Bluetooth stack events through the bluesync core", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "BLUESYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output (any non-empty `NO_COLOR` other than a falsey
    /// word such as `0` or `false` also disables it)
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply an event script and print the resulting notifications and devices
    Replay(ReplayArgs),

    /// Parse an event script without applying it
    Check {
        /// JSON Lines event script
        script: PathBuf,

        #[command(flatten)]
        format: FormatArgs,
    },

    /// List the supported profiles
    Profiles {
        #[command(flatten)]
        format: FormatArgs,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for `bluesync replay`
#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    /// JSON Lines event script
    pub script: PathBuf,

    /// Profiles to manage (comma-separated keys, overrides config)
    #[arg(short, long, value_delimiter = ',')]
    pub profile: Vec<ProfileId>,

    /// After the script, mark these devices preferred on every bound profile
    #[arg(long, value_delimiter = ',')]
    pub prefer: Vec<Address>,

    /// After the script, connect the preferred profiles of these devices
    #[arg(long, value_delimiter = ',')]
    pub connect: Vec<Address>,

    /// After the script, ask every profile whether it prefers these devices
    #[arg(long, value_delimiter = ',')]
    pub query: Vec<Address>,

    /// Per-query timeout in milliseconds (overrides config)
    #[arg(long)]
    pub query_timeout_ms: Option<u64>,

    /// Print dispatch statistics at the end
    #[arg(long)]
    pub stats: bool,

    /// Only print the final device table
    #[arg(long)]
    pub devices_only: bool,

    #[command(flatten)]
    pub format: FormatArgs,
}

/// Reusable output format argument
#[derive(Debug, Clone, Args)]
pub struct FormatArgs {
    /// Output format (defaults to the configured format)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl FormatArgs {
    /// Resolve the format: an explicit flag overrides config
    pub fn resolve(&self, config_format: Option<OutputFormat>) -> OutputFormat {
        self.format.or(config_format).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
