//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use vigil_core::vault::VaultStatus;

use crate::auth::ADMIN_CHALLENGE;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Missing or wrong admin credentials.
  #[error("unauthorized")]
  Unauthorized,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] vigil_core::Error),
}

impl ApiError {
  fn status_and_message(&self) -> (StatusCode, String) {
    use vigil_core::Error as E;

    match self {
      Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".into()),
      Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      Self::Core(e) => match e {
        E::NotFound(id) => (StatusCode::NOT_FOUND, format!("no vault with id {id}")),
        E::Unauthorized(_) => (
          StatusCode::FORBIDDEN,
          "this vault belongs to a different owner".into(),
        ),
        E::InvalidState { status: VaultStatus::Activated, .. } => (
          StatusCode::GONE,
          "this vault has already been released to its trustees".into(),
        ),
        E::InvalidState { status, .. } => (
          StatusCode::CONFLICT,
          format!("this vault is {status} and can no longer change"),
        ),
        E::SweepInProgress => (
          StatusCode::CONFLICT,
          "a reconciliation sweep is already running".into(),
        ),
        E::Invalid(m) => (StatusCode::BAD_REQUEST, m.clone()),
        E::ConfigurationMissing => (
          StatusCode::SERVICE_UNAVAILABLE,
          "no owner identity is configured; vault not created".into(),
        ),
        E::Store(_) | E::Document(_) => {
          tracing::error!(error = %e, "request failed");
          (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = self.status_and_message();
    let mut res = (status, Json(json!({ "error": message }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(ADMIN_CHALLENGE),
      );
    }
    res
  }
}
