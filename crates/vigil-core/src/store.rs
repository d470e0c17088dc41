//! The `VaultStore` trait.
//!
//! Implemented by storage backends (e.g. `vigil-store-sqlite`, or the
//! in-process [`crate::memory::MemoryStore`]). The engine depends on this
//! abstraction only.
//!
//! There are no multi-row transactions. Every mutation is a single-row atomic
//! update of named fields, conditional on the row's current state, and every
//! mutation bumps [`Vault::version`]. Conditional writes report whether they
//! applied instead of failing, so callers can treat "someone else got there
//! first" as an ordinary outcome.
//!
//! Multi-row reads decode each row on its own. A row that cannot be decoded
//! comes back as an [`UnreadableRow`] in place of the vault, so one damaged
//! row never hides the others.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::vault::{OwnerRef, Vault, VaultStatus};

/// A stored row that could not be decoded into a [`Vault`].
#[derive(Debug)]
pub struct UnreadableRow<E> {
  /// The row's key as stored. Not necessarily a valid id.
  pub key:   String,
  pub error: E,
}

impl<E> UnreadableRow<E> {
  /// The key parsed as a vault id, when it is one.
  pub fn vault_id(&self) -> Option<Uuid> { Uuid::parse_str(&self.key).ok() }
}

/// One entry of a multi-row read.
pub type RowRead<E> = Result<Vault, UnreadableRow<E>>;

/// All methods return `Send` futures so the trait can be used from
/// multi-threaded runtimes (tokio with `axum`).
pub trait VaultStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Rows ──────────────────────────────────────────────────────────────

  /// Append a new row. The caller supplies the id; inserting an id that
  /// already exists is an error.
  fn insert<'a>(
    &'a self,
    vault: &'a Vault,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Point read by id. Returns `None` if not found.
  fn get(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Vault>, Self::Error>> + Send + '_;

  /// Every row, in creation order. The outer error means the read itself
  /// failed; a damaged row is reported in its own slot.
  fn scan(
    &self,
  ) -> impl Future<Output = Result<Vec<RowRead<Self::Error>>, Self::Error>> + Send + '_;

  /// Every row owned by `owner`, in creation order, regardless of status.
  fn find_by_owner<'a>(
    &'a self,
    owner: &'a OwnerRef,
  ) -> impl Future<Output = Result<Vec<RowRead<Self::Error>>, Self::Error>> + Send + 'a;

  // ── Conditional single-row updates ────────────────────────────────────

  /// Set `last_checkin_at := max(last_checkin_at, at)` and clear
  /// `last_reminder_at`, only if the row is `ACTIVE`.
  ///
  /// Returns the updated row, or `None` if the row is missing or not active.
  fn record_checkin(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Vault>, Self::Error>> + Send + '_;

  /// Set `last_reminder_at := at` only if the row is `ACTIVE` and its version
  /// still equals `expected_version`.
  fn stamp_reminder(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
    expected_version: u64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Move the row from `from` to `to` if its status is currently `from`.
  fn transition(
    &self,
    id: Uuid,
    from: VaultStatus,
    to: VaultStatus,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Set `activated_notified_at := at` only if the row is `ACTIVATED` and
  /// the field is still unset. At most one caller ever sees `true`.
  fn mark_activation_notified(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
