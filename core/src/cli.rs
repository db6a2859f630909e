use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

use crate::cancel::CancelScope;
use crate::config::Config;
use crate::interpreter::Interpreter;
use crate::types::Control;

#[derive(Parser)]
#[command(name = "tempo")]
#[command(about = "Tempo - scope, namespace and timing engine for a Tcl-shaped script language", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Run scripts in a safe interpreter
    #[arg(long, global = true)]
    pub safe: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a script given on the command line
    Eval {
        /// Script text
        script: String,

        /// Cancel the evaluation after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Evaluate a script file
    Run {
        /// Script file
        file: PathBuf,

        /// Cancel the evaluation after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the effective configuration
    Config {
        #[arg(long, value_enum, default_value = "toml")]
        format: ConfigFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Toml,
    Json,
}

/// Outcome of a top-level evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Value(String),
    /// The script failed; carries the error trace
    Failed(String),
    Exit(i32),
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

/// Load the configuration selected by the global flags
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut builder = Config::builder();
    if let Some(path) = &cli.config {
        builder = builder.config_path(path);
    }
    if cli.safe {
        builder = builder.safe(true);
    }
    builder.build()
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load eagerly so configuration errors surface before any script runs
    let config = load_config(&cli)?;

    let outcome = match cli.command {
        Commands::Eval { script, timeout_ms } => evaluate(config, script, timeout_ms).await?,
        Commands::Run { file, timeout_ms } => {
            let script = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read script {}", file.display()))?;
            evaluate(config, script, timeout_ms).await?
        }
        Commands::Config { format } => {
            let rendered = match format {
                ConfigFormat::Toml => config.to_toml()?,
                ConfigFormat::Json => {
                    serde_json::to_string_pretty(&config).context("Failed to render configuration as JSON")?
                }
            };
            println!("{}", rendered);
            return Ok(());
        }
    };

    match outcome {
        Outcome::Value(value) => {
            if !value.is_empty() {
                println!("{}", value);
            }
        }
        Outcome::Failed(trace) => {
            eprintln!("{}", trace);
            std::process::exit(1);
        }
        Outcome::Exit(code) => std::process::exit(code),
    }
    Ok(())
}

/// Evaluate `script` on a blocking thread, cancelling it from a watchdog
/// task once `timeout_ms` has passed
pub async fn evaluate(config: Config, script: String, timeout_ms: Option<u64>) -> Result<Outcome> {
    let interp = Interpreter::builder().config(config).build();

    let watchdog = timeout_ms.map(|millis| {
        let interp = Arc::clone(&interp);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            info!(millis, "evaluation timed out, requesting cancel");
            interp.request_cancel(CancelScope::Local);
        })
    });

    let worker = Arc::clone(&interp);
    let result = tokio::task::spawn_blocking(move || worker.eval_top(&script))
        .await
        .context("Evaluation thread failed")?;

    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }
    // Flags are sticky; leave nothing set behind a finished top-level eval
    interp.reset_cancel(CancelScope::Local);
    interp.reset_halt(CancelScope::Local);

    if let Some(code) = interp.signals().exit_pending() {
        debug!(code, "exit requested by script");
        return Ok(Outcome::Exit(code));
    }
    Ok(match result {
        Ok(value) => Outcome::Value(value),
        Err(Control::Exit(code)) => Outcome::Exit(code),
        Err(Control::Error(err)) => {
            let info = interp.error_info();
            Outcome::Failed(if info.is_empty() { err.to_string() } else { info })
        }
        Err(other) => Outcome::Failed(other.value()),
    })
}
