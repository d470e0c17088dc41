//! Server configuration, deserialised from `vigil.toml` and `VIGIL_*`
//! environment variables.

use std::path::PathBuf;

use serde::Deserialize;
use vigil_api::AuthConfig;
use vigil_core::{
  config::EngineConfig,
  vault::{DEFAULT_CHECKIN_INTERVAL_DAYS, DEFAULT_GRACE_HOURS},
};

#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                          String,
  #[serde(default = "default_port")]
  pub port:                          u16,
  /// Base URL owners reach this server at; links in messages point here.
  #[serde(default = "default_public_base_url")]
  pub public_base_url:               String,
  #[serde(default = "default_store_path")]
  pub store_path:                    PathBuf,

  /// Fallback owner identity for vault creation.
  #[serde(default)]
  pub owner_email:                   Option<String>,
  #[serde(default = "default_interval")]
  pub default_checkin_interval_days: u32,
  #[serde(default = "default_grace")]
  pub default_grace_hours:           u32,

  pub auth_username:                 String,
  pub auth_password_hash:            String,

  /// Outbound relay. Without it, messages are logged and documents are
  /// written under `documents_dir`.
  #[serde(default)]
  pub relay_url:                     Option<String>,
  #[serde(default)]
  pub relay_token:                   Option<String>,
  #[serde(default = "default_sender_name")]
  pub sender_name:                   String,
  #[serde(default = "default_documents_dir")]
  pub documents_dir:                 PathBuf,

  /// Minutes between in-process sweeps; `0` leaves scheduling to an
  /// external trigger (`vigil reconcile` or `POST /admin/reconcile`).
  #[serde(default = "default_sweep_interval")]
  pub sweep_interval_minutes:        u64,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }
fn default_public_base_url() -> String { "http://localhost:8080".to_string() }
fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/vigil/vigil.db") }
fn default_interval() -> u32 { DEFAULT_CHECKIN_INTERVAL_DAYS }
fn default_grace() -> u32 { DEFAULT_GRACE_HOURS }
fn default_sender_name() -> String { "Vigil".to_string() }
fn default_documents_dir() -> PathBuf { PathBuf::from("~/.local/share/vigil/documents") }
fn default_sweep_interval() -> u64 { 60 }

impl ServerConfig {
  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      owner_email:                   self.owner_email.clone(),
      public_base_url:               self.public_base_url.clone(),
      default_checkin_interval_days: self.default_checkin_interval_days,
      default_grace_hours:           self.default_grace_hours,
    }
  }

  pub fn auth_config(&self) -> AuthConfig {
    AuthConfig {
      username:      self.auth_username.clone(),
      password_hash: self.auth_password_hash.clone(),
    }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}
