//! Tempo CLI
//!
//! Evaluates scripts against the engine and prints the effective
//! configuration. Log output goes to stderr; `RUST_LOG` overrides the
//! configured filter.
use tempo_core::{cli, Config};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let fallback = Config::load()
        .map(|config| config.logging.filter)
        .unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
