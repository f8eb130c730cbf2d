use anyhow::{Context, Result};
use grantrollup::{
    config::{Config, StoreConfig},
    handle_event,
    store::{HttpStore, LocalStore},
};
use reqwest::Client;
use std::{env, fs, io::Read};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Reads one notification event (file argument, or stdin when absent or
/// `-`), runs the aggregation step and prints the response JSON on stdout.
#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) configuration ────────────────────────────────────────────
    let config = Config::from_env()?;
    let options = config.step_options()?;
    info!(store = ?config.store, top_n = config.top_n, "startup");

    // ─── 3) read the event ───────────────────────────────────────────
    let event = match env::args().nth(1).filter(|a| a != "-") {
        Some(path) => fs::read(&path).with_context(|| format!("reading event file {}", path))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("reading event from stdin")?;
            buf
        }
    };

    // ─── 4) run ──────────────────────────────────────────────────────
    let response = match &config.store {
        StoreConfig::Local { root } => {
            handle_event(&LocalStore::new(root.clone()), &event, &options).await
        }
        StoreConfig::Http { endpoint } => {
            let store = HttpStore::new(Client::new(), endpoint)?;
            handle_event(&store, &event, &options).await
        }
    };

    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
