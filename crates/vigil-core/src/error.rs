//! Error types for `vigil-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::vault::VaultStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("vault not found: {0}")]
  NotFound(Uuid),

  #[error("vault {0} does not belong to the caller")]
  Unauthorized(Uuid),

  #[error("vault {vault_id} is {status}")]
  InvalidState {
    vault_id: Uuid,
    status:   VaultStatus,
  },

  /// No owner identity could be resolved at creation time.
  #[error("owner identity is not configured; refusing to create an ownerless vault")]
  ConfigurationMissing,

  #[error("invalid input: {0}")]
  Invalid(String),

  #[error("a reconciliation sweep is already running")]
  SweepInProgress,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("document error: {0}")]
  Document(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  /// `true` for the rejections a caller can act on (not found, wrong owner,
  /// wrong state) as opposed to infrastructure failures.
  pub fn is_rejection(&self) -> bool {
    matches!(
      self,
      Self::NotFound(_) | Self::Unauthorized(_) | Self::InvalidState { .. }
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
