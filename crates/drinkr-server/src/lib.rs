//! Configuration and wiring for the `drinkr-server` binary.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use drinkr_engine::{Engine, EngineConfig};
use drinkr_store_sqlite::SqliteStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

/// Environment variables with this prefix override the config file, with
/// `__` separating nested keys: `DRINKR_PORT`,
/// `DRINKR_ENGINE__CHECKPOINT_INTERVAL`.
pub const ENV_PREFIX: &str = "DRINKR";

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `drinkr.toml` and the
/// environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub engine:     EngineConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_string(),
      port:       8080,
      store_path: PathBuf::from("~/.local/share/drinkr/drinkr.db"),
      engine:     EngineConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Layer `file` (if it exists) and `DRINKR_*` environment variables over
  /// the defaults.
  pub fn load(file: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(file).required(false))
      .add_source(
        config::Environment::with_prefix(ENV_PREFIX)
          .prefix_separator("_")
          .separator("__"),
      )
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// The full application: the API under `/api`, with request tracing.
pub fn app(engine: Arc<Engine<SqliteStore>>) -> Router {
  Router::new()
    .nest("/api", drinkr_api::api_router(engine))
    .layer(TraceLayer::new_for_http())
}
