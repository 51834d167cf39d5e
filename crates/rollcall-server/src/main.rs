//! rollcall server binary.
//!
//! Reads `rollcall.toml` (or the path given with `--config`) overlaid with
//! `ROLLCALL_*` environment variables, opens the SQLite store, and serves the
//! JSON API. The auto-absent sweep runs in the background on a fixed period;
//! `rollcall sweep` runs it once and exits.

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rollcall_engine::Engine;
use rollcall_server::{ServerConfig, build_engine, expand_tilde};
use rollcall_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, time::MissedTickBehavior};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Rollcall attendance server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "rollcall.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the API (the default).
  Serve,
  /// Run the auto-absent sweep once and print its report.
  Sweep {
    /// Sweep as of this RFC 3339 instant instead of now.
    #[arg(long)]
    at: Option<DateTime<Utc>>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
  let offset = server_cfg.offset().with_context(|| {
    format!("utc_offset_minutes {} is out of range", server_cfg.utc_offset_minutes)
  })?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let engine = build_engine(store, &server_cfg, offset);

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(engine, &server_cfg).await,
    Command::Sweep { at } => {
      let report = engine
        .run_auto_absent_sweep(at.unwrap_or_else(Utc::now))
        .await
        .context("auto-absent sweep failed")?;
      println!(
        "slots={} created={} existing={} opted_out={} unapproved={} cancelled={}",
        report.slots,
        report.created,
        report.existing,
        report.opted_out,
        report.unapproved,
        report.cancelled,
      );
      Ok(())
    }
  }
}

async fn serve(engine: Engine<SqliteStore>, server_cfg: &ServerConfig) -> anyhow::Result<()> {
  if let Some(period) = server_cfg.sweep_interval() {
    let sweeper = engine.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      loop {
        ticker.tick().await;
        if let Err(error) = sweeper.run_auto_absent_sweep(Utc::now()).await {
          tracing::error!(%error, "auto-absent sweep failed");
        }
      }
    });
    tracing::info!(period_secs = period.as_secs(), "background sweep enabled");
  }

  let app = rollcall_api::api_router(engine);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  Ok(())
}

async fn shutdown_signal() {
  if let Err(error) = tokio::signal::ctrl_c().await {
    tracing::warn!(%error, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
