//! netstate CLI (netstatectl)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netstate_api::{DriverKind, NetstateContext};
use netstate_config::EngineSettings;
use netstatectl::commands::{
    ApplyCommand, ApplyOptions, CheckpointCommand, FormatCommand, ShowCommand, ShowOptions,
};

#[derive(Parser)]
#[command(name = "netstatectl")]
#[command(about = "Declarative network state management CLI")]
#[command(version)]
#[command(long_about = "
Declarative network state management CLI

Reads the current network state, applies desired state documents under a
checkpoint that is rolled back on failure, and manages pending checkpoints.

Examples:
  netstatectl show                         # Current state as YAML
  netstatectl show --json -s               # JSON with status data
  netstatectl apply state.yml              # Apply and commit
  netstatectl apply --no-commit state.yml  # Apply, keep checkpoint pending
  netstatectl commit                       # Commit the pending checkpoint
  netstatectl rollback                     # Roll back the pending checkpoint
  netstatectl checkpoints                  # List checkpoints
  netstatectl format state.json            # Canonical YAML of a document
")]
struct Cli {
    /// Enable verbose output
    #[arg(short = 'V', long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Engine settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-memory driver instead of the kernel
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current network state
    Show {
        /// Output JSON instead of YAML
        #[arg(long)]
        json: bool,

        /// Kernel configuration only
        #[arg(short, long)]
        kernel: bool,

        /// Include runtime status data
        #[arg(short = 's', long)]
        status: bool,

        /// Show secrets instead of the placeholder
        #[arg(long)]
        show_secrets: bool,
    },

    /// Apply a network state document
    Apply {
        /// State document (YAML or JSON)
        file: PathBuf,

        /// Skip verification after applying
        #[arg(long)]
        no_verify: bool,

        /// Keep the checkpoint pending for a later commit or rollback
        #[arg(long)]
        no_commit: bool,

        /// Kernel configuration only
        #[arg(short, long)]
        kernel: bool,

        /// Timeout in seconds, 0 uses the configured default
        #[arg(short, long, default_value_t = 0)]
        timeout: u64,
    },

    /// Commit a pending checkpoint
    Commit {
        /// Checkpoint id, defaults to the pending one
        checkpoint: Option<String>,
    },

    /// Roll back to a pending checkpoint
    Rollback {
        /// Checkpoint id, defaults to the pending one
        checkpoint: Option<String>,
    },

    /// Print a state document as canonical YAML
    Format {
        /// State document (YAML or JSON)
        file: PathBuf,
    },

    /// List checkpoints
    Checkpoints,
}

/// Build the engine. Checkpoints are kept on disk so that `commit` and
/// `rollback` can finish what an earlier `apply --no-commit` started; `show`
/// has no use for them and runs without a checkpoint directory.
async fn bootstrap(cli: &Cli, checkpoints: bool) -> Result<Arc<NetstateContext>> {
    let mut settings = match &cli.config {
        Some(path) => EngineSettings::load_from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => EngineSettings::load_with_defaults().context("failed to load settings")?,
    };
    if !checkpoints {
        settings.checkpoint_dir = None;
    }
    let kind = if cli.memory {
        DriverKind::Memory
    } else {
        DriverKind::IpCommand
    };
    Ok(Arc::new(NetstateContext::bootstrap(settings, kind).await?))
}

async fn run(cli: &Cli) -> Result<String> {
    match &cli.command {
        Commands::Show {
            json,
            kernel,
            status,
            show_secrets,
        } => {
            let options = ShowOptions {
                json: *json,
                kernel_only: *kernel,
                include_status_data: *status,
                include_secrets: *show_secrets,
                quiet: cli.quiet,
            };
            ShowCommand::new(bootstrap(cli, false).await?).execute(&options).await
        }

        Commands::Apply {
            file,
            no_verify,
            no_commit,
            kernel,
            timeout,
        } => {
            let options = ApplyOptions {
                no_verify: *no_verify,
                no_commit: *no_commit,
                kernel_only: *kernel,
                timeout: *timeout,
                quiet: cli.quiet,
            };
            ApplyCommand::new(bootstrap(cli, true).await?).execute(file, &options).await
        }

        Commands::Commit { checkpoint } => {
            CheckpointCommand::new(bootstrap(cli, true).await?, cli.quiet)
                .commit(checkpoint.as_deref())
                .await
        }

        Commands::Rollback { checkpoint } => {
            CheckpointCommand::new(bootstrap(cli, true).await?, cli.quiet)
                .rollback(checkpoint.as_deref())
                .await
        }

        Commands::Checkpoints => {
            CheckpointCommand::new(bootstrap(cli, true).await?, cli.quiet)
                .list()
                .await
        }

        Commands::Format { file } => FormatCommand::execute(file).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(&cli).await {
        Ok(output) => {
            print!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);

            if cli.verbose || cli.debug {
                for cause in e.chain().skip(1) {
                    eprintln!("  Caused by: {}", cause);
                }
            }
            std::process::exit(1);
        }
    }
}
