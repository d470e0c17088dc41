//! `POST /admin/reconcile`: run one reconciliation sweep now.
//!
//! Returns the sweep's report; `409` if a sweep is already running in this
//! process.

use axum::{Json, extract::State};
use vigil_core::{
  engine::SweepReport,
  notify::{Documents, Notifier},
  store::VaultStore,
};

use crate::{AppState, auth::Admin, error::ApiError};

pub async fn reconcile<S, N, D>(
  admin: Admin,
  State(state): State<AppState<S, N, D>>,
) -> Result<Json<SweepReport>, ApiError>
where
  S: VaultStore + 'static,
  N: Notifier + 'static,
  D: Documents + 'static,
{
  tracing::info!(admin = %admin.username, "reconciliation requested over HTTP");
  Ok(Json(state.engine.reconcile().await?))
}
