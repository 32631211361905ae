use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use spindle_cli::{is_known_operation, output, run_script, OutputFormat, Script};
use spindle_memory::{EngineConfig, MemoryEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Parser)]
#[command(name = "spindle")]
#[command(
    about = "Run Spindle instruction scripts against an in-process engine",
    long_about = None
)]
struct Cli {
    /// Log every instruction (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script and print the final stack
    Run {
        /// Script file path
        script: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
        /// Oldest readable version, relative to the latest commit
        #[arg(long)]
        version_window: Option<i64>,
        /// Maximum number of outstanding watches
        #[arg(long)]
        max_watches: Option<usize>,
    },
    /// Parse a script and report unknown operations without running it
    Check {
        /// Script file path
        script: PathBuf,
    },
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Run {
            script,
            format,
            version_window,
            max_watches,
        } => {
            let parsed = Script::load(&script)?;

            let mut config = EngineConfig::new();
            if let Some(window) = version_window {
                config = config.with_version_window(window);
            }
            if let Some(max) = max_watches {
                config = config.with_max_watches(max);
            }
            let engine = MemoryEngine::with_config(config)
                .map_err(|e| anyhow!("Invalid engine configuration: {}", e))?;

            spindle_client::api_version(spindle_client::API_VERSION)?;
            spindle_client::start_network(Arc::new(engine)).context("Failed to start network")?;
            let db = spindle_client::open(None).context("Failed to open database")?;

            info!(
                script = %script.display(),
                instructions = parsed.instructions.len(),
                "Running script"
            );
            let outcome = run_script(db, &parsed);
            spindle_client::stop_network().context("Failed to stop network")?;

            let entries = outcome?;
            println!("{}", output::render(&entries, format)?);
        }
        Commands::Check { script } => {
            let parsed = Script::load(&script)?;
            let unknown: Vec<String> = parsed
                .instructions
                .iter()
                .enumerate()
                .filter(|(_, instruction)| !is_known_operation(&instruction.op))
                .map(|(index, instruction)| format!("{}: {}", index, instruction.op))
                .collect();
            if !unknown.is_empty() {
                bail!("Unknown operations:\n{}", unknown.join("\n"));
            }
            println!("{} instructions OK", parsed.instructions.len());
        }
    }

    Ok(())
}
