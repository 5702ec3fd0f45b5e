mod commands;
mod config;

use clap::{Parser, Subcommand};

use config::TreadleConfig;

#[derive(Parser)]
#[command(name = "treadle", about = "Cooperative job scheduler with durable queue state")]
struct Cli {
    /// State file path (overrides TREADLE_STATE_FILE env var)
    #[arg(long, global = true)]
    state_file: Option<String>,

    /// Pool cap for newly scheduled jobs (overrides TREADLE_POOL_SIZE env var)
    #[arg(long, global = true)]
    pool_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job manifest to completion
    Run {
        /// Path to the YAML job manifest
        manifest: String,
    },
    /// Resume unfinished jobs from the state file
    Resume,
    /// Validate a job manifest without running it
    Check {
        /// Path to the YAML job manifest
        manifest: String,
    },
    /// Write a treadle config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { manifest } => {
            let config = TreadleConfig::resolve(cli.state_file.as_deref(), cli.pool_size)?;
            commands::cmd_run(&manifest, &config)
        }
        Commands::Resume => {
            let config = TreadleConfig::resolve(cli.state_file.as_deref(), cli.pool_size)?;
            commands::cmd_resume(&config)
        }
        Commands::Check { manifest } => commands::cmd_check(&manifest),
        Commands::Init { force } => {
            commands::cmd_init(cli.state_file.as_deref(), cli.pool_size, force)
        }
    }
}
