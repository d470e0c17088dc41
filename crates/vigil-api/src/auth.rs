//! Admin gate for the `/vaults` and `/admin` routes.
//!
//! One operator account, configured as a username plus an argon2 PHC hash,
//! presented as HTTP Basic credentials. Owner-facing routes (`/webhook`,
//! `/checkin`) never come through here; the check-in link proves identity
//! with the vault id and owner email instead.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::Deserialize;
use thiserror::Error;
use vigil_core::{
  notify::{Documents, Notifier},
  store::VaultStore,
};

use crate::{AppState, error::ApiError};

/// `WWW-Authenticate` value sent with every admin refusal.
pub const ADMIN_CHALLENGE: &str = "Basic realm=\"vigil-admin\", charset=\"UTF-8\"";

/// The operator account. An empty `username` disables the admin routes.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

#[derive(Debug, Error)]
#[error("auth_password_hash is not an argon2 PHC string: {0}")]
pub struct BadPasswordHash(String);

impl AuthConfig {
  /// Check the hash once at startup. Skipped when admin is disabled.
  pub fn validate(&self) -> Result<(), BadPasswordHash> {
    if !self.is_enabled() {
      return Ok(());
    }
    PasswordHash::new(&self.password_hash)
      .map(|_| ())
      .map_err(|e| BadPasswordHash(e.to_string()))
  }

  pub fn is_enabled(&self) -> bool { !self.username.is_empty() }
}

/// The operator behind an authenticated admin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admin {
  pub username: String,
}

/// Why a request did not authenticate. Logged, never sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refusal {
  Disabled,
  NoCredentials,
  Malformed,
  UnknownUser,
  WrongPassword,
  BadHash,
}

impl Refusal {
  fn as_str(self) -> &'static str {
    match self {
      Self::Disabled => "admin disabled",
      Self::NoCredentials => "no credentials",
      Self::Malformed => "malformed credentials",
      Self::UnknownUser => "unknown user",
      Self::WrongPassword => "wrong password",
      Self::BadHash => "configured hash unreadable",
    }
  }
}

/// Check the request's Basic credentials against `config`.
pub fn verify_admin(headers: &HeaderMap, config: &AuthConfig) -> Result<Admin, ApiError> {
  check(headers, config).map_err(|refusal| {
    match refusal {
      Refusal::BadHash => tracing::error!(reason = refusal.as_str(), "admin request refused"),
      _ => tracing::warn!(reason = refusal.as_str(), "admin request refused"),
    }
    ApiError::Unauthorized
  })
}

fn check(headers: &HeaderMap, config: &AuthConfig) -> Result<Admin, Refusal> {
  if !config.is_enabled() {
    return Err(Refusal::Disabled);
  }
  let (username, password) = basic_credentials(headers)?;
  if username != config.username {
    return Err(Refusal::UnknownUser);
  }

  let hash = PasswordHash::new(&config.password_hash).map_err(|_| Refusal::BadHash)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &hash)
    .map_err(|_| Refusal::WrongPassword)?;
  Ok(Admin { username })
}

fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), Refusal> {
  let value = headers
    .get(header::AUTHORIZATION)
    .ok_or(Refusal::NoCredentials)?;
  let encoded = value
    .to_str()
    .ok()
    .and_then(|v| v.strip_prefix("Basic "))
    .ok_or(Refusal::Malformed)?;

  let decoded = B64.decode(encoded.trim()).map_err(|_| Refusal::Malformed)?;
  let creds   = String::from_utf8(decoded).map_err(|_| Refusal::Malformed)?;
  let (username, password) = creds.split_once(':').ok_or(Refusal::Malformed)?;
  Ok((username.to_owned(), password.to_owned()))
}

impl<S, N, D> FromRequestParts<AppState<S, N, D>> for Admin
where
  S: VaultStore + 'static,
  N: Notifier + 'static,
  D: Documents + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, N, D>,
  ) -> Result<Self, Self::Rejection> {
    verify_admin(&parts.headers, &state.auth)
  }
}
