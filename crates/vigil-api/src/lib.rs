//! HTTP surface for Vigil.
//!
//! Exposes an axum [`Router`] over a shared [`Engine`]:
//!
//! | Method | Path | Auth | Module |
//! |--------|------|------|--------|
//! | `POST` | `/webhook` | none | [`webhook`] |
//! | `GET`  | `/checkin?vault_id=…&email=…` | link | [`checkin`] |
//! | `POST` | `/vaults` | admin | [`vaults`] |
//! | `GET`  | `/vaults?contact=…` or `?email=…` | admin | [`vaults`] |
//! | `GET`  | `/vaults/{id}` | admin | [`vaults`] |
//! | `POST` | `/vaults/{id}/deactivate` | admin | [`vaults`] |
//! | `POST` | `/admin/reconcile` | admin | [`admin`] |
//!
//! TLS and webhook signature verification are the caller's responsibility.

pub mod admin;
pub mod auth;
pub mod checkin;
pub mod error;
pub mod vaults;
pub mod webhook;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tower_http::trace::TraceLayer;
use vigil_core::{
  Engine,
  notify::{Documents, Notifier},
  store::VaultStore,
};

pub use auth::AuthConfig;
pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S, N, D> {
  pub engine: Arc<Engine<S, N, D>>,
  pub auth:   Arc<AuthConfig>,
}

impl<S, N, D> Clone for AppState<S, N, D> {
  fn clone(&self) -> Self {
    Self {
      engine: Arc::clone(&self.engine),
      auth:   Arc::clone(&self.auth),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full router for `state`.
pub fn router<S, N, D>(state: AppState<S, N, D>) -> Router
where
  S: VaultStore + 'static,
  N: Notifier + 'static,
  D: Documents + 'static,
{
  Router::new()
    // Owner-facing
    .route("/webhook", post(webhook::handle::<S, N, D>))
    .route("/checkin", get(checkin::handle::<S, N, D>))
    // Admin
    .route("/vaults", get(vaults::list::<S, N, D>).post(vaults::create::<S, N, D>))
    .route("/vaults/{id}", get(vaults::get_one::<S, N, D>))
    .route("/vaults/{id}/deactivate", post(vaults::deactivate::<S, N, D>))
    .route("/admin/reconcile", post(admin::reconcile::<S, N, D>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
