//! `server`: runs the muster attendance API.
//!
//! Settings come from a TOML file (`--config`, default `config.toml`, may be
//! absent) layered under `MUSTER__*` environment variables, so
//! `MUSTER__FRAUD__MAX_SPEED_KMH=90` overrides `[fraud] max_speed_kmh`.
//!
//! `server --hash-password` reads a password from stdin and prints the
//! argon2 PHC string to put in `auth_password_hash`.

use std::{
  io::{BufRead, Write},
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, anyhow};
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use muster_core::clock::SystemClock;
use muster_server::{AppState, ServerConfig};
use muster_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Location-verified attendance server")]
struct Args {
  /// TOML settings file; missing files are skipped.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Hash an operator password read from stdin, print it, and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();
  tracing_subscriber::fmt().with_env_filter(filter).init();

  let args = Args::parse();
  if args.hash_password {
    println!("{}", hash_password(&prompt_password()?)?);
    return Ok(());
  }

  let settings = load_settings(&args.config)?;
  serve(settings).await
}

fn load_settings(path: &Path) -> anyhow::Result<ServerConfig> {
  let env = config::Environment::with_prefix("MUSTER")
    .prefix_separator("__")
    .separator("__")
    .try_parsing(true);
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(env)
    .build()
    .with_context(|| format!("reading settings from {}", path.display()))?
    .try_deserialize()
    .context("invalid server settings")
}

async fn serve(settings: ServerConfig) -> anyhow::Result<()> {
  let db = home_relative(&settings.store_path);
  let store = SqliteStore::open(&db)
    .await
    .with_context(|| format!("opening attendance store {}", db.display()))?;

  tracing::info!(
    db = %db.display(),
    ttl_ms = settings.token.ttl_ms,
    geofence = ?settings.policy.geofence,
    low_accuracy = ?settings.policy.low_accuracy,
    "attendance policy loaded"
  );

  let bind = format!("{}:{}", settings.host, settings.port);
  let listener = TcpListener::bind(&bind)
    .await
    .with_context(|| format!("binding {bind}"))?;
  let app = muster_server::router(AppState::new(Arc::new(store), settings, Arc::new(SystemClock)));

  tracing::info!(%bind, "serving attendance API");
  // Fingerprinting reads the peer address, so connect info must be attached.
  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .await
    .context("server stopped")
}

fn prompt_password() -> anyhow::Result<String> {
  eprint!("Operator password: ");
  std::io::stderr().flush()?;
  let mut line = String::new();
  std::io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn hash_password(password: &str) -> anyhow::Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| anyhow!("hashing password: {e}"))
}

/// Resolve a `~/`-prefixed path against `$HOME`.
fn home_relative(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), std::env::var_os("HOME")) {
    (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}
