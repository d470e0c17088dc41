//! Admin handlers for `/vaults` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/vaults` | Body: [`CreateBody`]; 201 with the stored vault |
//! | `GET`  | `/vaults` | Exactly one of `?contact=` or `?email=` |
//! | `GET`  | `/vaults/{id}` | 404 if not found |
//! | `POST` | `/vaults/{id}/deactivate` | Body: `{"contact":…}` or `{"email":…}` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use vigil_core::{
  notify::{Documents, Notifier},
  store::VaultStore,
  vault::{NewVault, OwnerRef, Vault},
};

use crate::{AppState, auth::Admin, error::ApiError};

/// Either a messaging contact or an owner email, never both.
#[derive(Debug, Default, Deserialize)]
pub struct OwnerParams {
  pub contact: Option<String>,
  pub email:   Option<String>,
}

impl OwnerParams {
  fn into_owner(self) -> Result<OwnerRef, ApiError> {
    match (self.contact, self.email) {
      (Some(c), None) if !c.trim().is_empty() => Ok(OwnerRef::Contact(c)),
      (None, Some(e)) if !e.trim().is_empty() => Ok(OwnerRef::Email(e)),
      _ => Err(ApiError::BadRequest(
        "exactly one of `contact` or `email` is required".into(),
      )),
    }
  }
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  /// Owner identity vouched for by the authenticated caller. Falls back to
  /// the configured owner email when absent.
  #[serde(default)]
  pub owner_email: Option<String>,
  #[serde(flatten)]
  pub vault:       NewVault,
}

/// `POST /vaults`
pub async fn create<S, N, D>(
  admin: Admin,
  State(state): State<AppState<S, N, D>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: VaultStore + 'static,
  N: Notifier + 'static,
  D: Documents + 'static,
{
  let vault = state
    .engine
    .create(body.owner_email.as_deref(), body.vault)
    .await?;
  tracing::info!(
    admin = %admin.username,
    vault_id = %vault.vault_id,
    "vault created over HTTP"
  );
  Ok((StatusCode::CREATED, Json(vault)))
}

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /vaults?contact=<ref>` or `GET /vaults?email=<address>`
pub async fn list<S, N, D>(
  _: Admin,
  State(state): State<AppState<S, N, D>>,
  Query(params): Query<OwnerParams>,
) -> Result<Json<Vec<Vault>>, ApiError>
where
  S: VaultStore + 'static,
  N: Notifier + 'static,
  D: Documents + 'static,
{
  let owner = params.into_owner()?;
  Ok(Json(state.engine.list(&owner).await?))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /vaults/{id}`
pub async fn get_one<S, N, D>(
  _: Admin,
  State(state): State<AppState<S, N, D>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vault>, ApiError>
where
  S: VaultStore + 'static,
  N: Notifier + 'static,
  D: Documents + 'static,
{
  state
    .engine
    .get(id)
    .await?
    .map(Json)
    .ok_or(ApiError::Core(vigil_core::Error::NotFound(id)))
}

// ─── Deactivate ──────────────────────────────────────────────────────────────

/// `POST /vaults/{id}/deactivate`
pub async fn deactivate<S, N, D>(
  admin: Admin,
  State(state): State<AppState<S, N, D>>,
  Path(id): Path<Uuid>,
  Json(body): Json<OwnerParams>,
) -> Result<Json<Vault>, ApiError>
where
  S: VaultStore + 'static,
  N: Notifier + 'static,
  D: Documents + 'static,
{
  let owner = body.into_owner()?;
  tracing::info!(
    admin = %admin.username,
    vault_id = %id,
    %owner,
    "deactivation requested over HTTP"
  );
  Ok(Json(state.engine.deactivate(id, &owner).await?))
}
