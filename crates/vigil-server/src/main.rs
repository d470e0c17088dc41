//! vigil server binary.
//!
//! Reads `vigil.toml` (or the path given with `--config`) plus `VIGIL_*`
//! environment variables, opens the SQLite store, and either serves the HTTP
//! API with an in-process sweep scheduler or runs one sweep and exits.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `auth_password_hash`:
//!
//! ```text
//! cargo run -p vigil-server -- hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::{Parser, Subcommand};
use rand_core::OsRng;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vigil_api::AppState;
use vigil_core::Engine;
use vigil_server::{Outbound, ServerConfig, scheduler};
use vigil_store_sqlite::SqliteStore;

type VigilEngine = Engine<SqliteStore, Outbound, Outbound>;

#[derive(Parser)]
#[command(author, version, about = "Vigil dead-man's-switch server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "vigil.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API and run periodic sweeps (the default).
  Serve,
  /// Run one reconciliation sweep, print its report as JSON, and exit.
  Reconcile,
  /// Print the argon2 hash for a password entered on stdin and exit.
  HashPassword,
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

  match cli.command.unwrap_or(Command::Serve) {
    Command::HashPassword => hash_password(),
    Command::Reconcile => {
      let cfg = load_config(&cli.config)?;
      let engine = build_engine(&cfg).await?;
      let report = engine.reconcile().await.context("reconciliation failed")?;
      println!("{}", serde_json::to_string_pretty(&report)?);
      Ok(())
    }
    Command::Serve => {
      let cfg = load_config(&cli.config)?;
      let engine = Arc::new(build_engine(&cfg).await?);
      serve(cfg, engine).await
    }
  }
}

fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("VIGIL"))
    .build()
    .context("failed to read config file")?;

  let mut cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  cfg.store_path = expand_tilde(&cfg.store_path);
  cfg.documents_dir = expand_tilde(&cfg.documents_dir);
  Ok(cfg)
}

async fn build_engine(cfg: &ServerConfig) -> anyhow::Result<VigilEngine> {
  if let Some(parent) = cfg.store_path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  let outbound = Outbound::from_config(cfg).context("failed to build relay client")?;
  tracing::info!(outbound = outbound.kind(), "outbound adapter selected");

  Engine::new(store, outbound.clone(), outbound, cfg.engine_config())
    .context("invalid engine configuration")
}

async fn serve(cfg: ServerConfig, engine: Arc<VigilEngine>) -> anyhow::Result<()> {
  let (shutdown_tx, _) = broadcast::channel::<()>(1);

  let scheduler = (cfg.sweep_interval_minutes > 0).then(|| {
    scheduler::spawn(
      engine.clone(),
      Duration::from_secs(cfg.sweep_interval_minutes * 60),
      shutdown_tx.subscribe(),
    )
  });
  if scheduler.is_none() {
    tracing::info!("in-process sweeps disabled; relying on external trigger");
  }

  let auth = cfg.auth_config();
  auth.validate().context("invalid admin credentials")?;
  if !auth.is_enabled() {
    tracing::warn!("auth_username is empty; admin routes will refuse every request");
  }

  let state = AppState {
    engine,
    auth: Arc::new(auth),
  };
  let app = vigil_api::router(state);
  let address = cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  let shutdown = shutdown_tx.clone();
  axum::serve(listener, app)
    .with_graceful_shutdown(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutting down...");
      }
      let _ = shutdown.send(());
    })
    .await
    .context("server error")?;

  if let Some(handle) = scheduler {
    handle.await.context("scheduler task panicked")?;
  }
  Ok(())
}

fn hash_password() -> anyhow::Result<()> {
  let password = read_password()?;
  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
    .to_string();
  println!("{hash}");
  Ok(())
}

/// Read a password line from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
