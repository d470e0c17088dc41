//! Link-based check-in: `GET /checkin?vault_id=<id>&email=<owner>`.
//!
//! This is the identity-proof link sent with every reminder. Each refusal has
//! its own status so the owner can tell what happened:
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 200 | deadline refreshed |
//! | 404 | unknown vault |
//! | 403 | email does not match the owner |
//! | 409 | vault was deactivated |
//! | 410 | vault was already released |

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::{
  notify::{Documents, Notifier},
  store::VaultStore,
};

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CheckinParams {
  pub vault_id: Uuid,
  pub email:    String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckinReceipt {
  pub vault_id:      Uuid,
  pub checked_in_at: DateTime<Utc>,
  pub next_deadline: DateTime<Utc>,
  pub activation_at: DateTime<Utc>,
}

pub async fn handle<S, N, D>(
  State(state): State<AppState<S, N, D>>,
  Query(params): Query<CheckinParams>,
) -> Result<Json<CheckinReceipt>, ApiError>
where
  S: VaultStore + 'static,
  N: Notifier + 'static,
  D: Documents + 'static,
{
  let vault = state
    .engine
    .checkin_verified(params.vault_id, &params.email)
    .await?;

  Ok(Json(CheckinReceipt {
    vault_id:      vault.vault_id,
    checked_in_at: vault.last_checkin_at,
    next_deadline: vault.deadline(),
    activation_at: vault.activation_time(),
  }))
}
