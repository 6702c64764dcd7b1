use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bluesync_cli::cli::{Cli, Commands, ConfigAction};
use bluesync_cli::commands::{cmd_check, cmd_config, cmd_profiles, cmd_replay};
use bluesync_cli::config::Config;
use bluesync_cli::format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bluesync_core=info,warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.command {
        // These must work before a config file exists
        Commands::Config {
            action: ConfigAction::Path | ConfigAction::Init { .. },
        } => Config::default(),
        _ => Config::load(cli.config.as_deref())?,
    };
    let opts = FormatOptions::new(cli.no_color || config.no_color);
    let output = cli.output.as_deref();

    match &cli.command {
        Commands::Replay(args) => cmd_replay(args, &config, &opts, output).await,
        Commands::Check { script, format } => {
            cmd_check(script, format.resolve(config.format), output)
        }
        Commands::Profiles { format } => cmd_profiles(format.resolve(config.format), &opts, output),
        Commands::Config { action } => cmd_config(action, cli.config.as_deref(), &config, output),
    }
}
