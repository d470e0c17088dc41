//! An in-process [`VaultStore`] backed by a mutex-guarded `Vec`.
//!
//! Rows keep insertion order, mirroring the append-only sheet the service
//! grew out of. Useful for tests and for running the engine without a
//! database file.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  store::{RowRead, VaultStore},
  vault::{OwnerRef, Vault, VaultStatus, normalize_email},
};

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("vault {0} already exists")]
  Duplicate(Uuid),
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  rows: Mutex<Vec<Vault>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn rows(&self) -> MutexGuard<'_, Vec<Vault>> {
    self.rows.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Apply `f` to the row with `id` if it exists; bumps the version when `f`
  /// reports a change.
  fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut Vault) -> Option<T>) -> Option<T> {
    let mut rows = self.rows();
    let row = rows.iter_mut().find(|v| v.vault_id == id)?;
    let out = f(row)?;
    row.version += 1;
    Some(out)
  }
}

impl VaultStore for MemoryStore {
  type Error = MemoryError;

  async fn insert(&self, vault: &Vault) -> Result<(), MemoryError> {
    let mut rows = self.rows();
    if rows.iter().any(|v| v.vault_id == vault.vault_id) {
      return Err(MemoryError::Duplicate(vault.vault_id));
    }
    rows.push(Vault {
      owner_email: normalize_email(&vault.owner_email),
      ..vault.clone()
    });
    Ok(())
  }

  async fn get(&self, id: Uuid) -> Result<Option<Vault>, MemoryError> {
    Ok(self.rows().iter().find(|v| v.vault_id == id).cloned())
  }

  async fn scan(&self) -> Result<Vec<RowRead<MemoryError>>, MemoryError> {
    Ok(self.rows().iter().cloned().map(Ok).collect())
  }

  async fn find_by_owner(
    &self,
    owner: &OwnerRef,
  ) -> Result<Vec<RowRead<MemoryError>>, MemoryError> {
    Ok(
      self
        .rows()
        .iter()
        .filter(|v| v.is_owned_by(owner))
        .cloned()
        .map(Ok)
        .collect(),
    )
  }

  async fn record_checkin(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<Vault>, MemoryError> {
    Ok(self.update(id, |v| {
      if v.status != VaultStatus::Active {
        return None;
      }
      v.last_checkin_at  = v.last_checkin_at.max(at);
      v.last_reminder_at = None;
      Some(v.vault_id)
    })
    .and_then(|id| self.rows().iter().find(|v| v.vault_id == id).cloned()))
  }

  async fn stamp_reminder(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
    expected_version: u64,
  ) -> Result<bool, MemoryError> {
    Ok(
      self
        .update(id, |v| {
          if v.status != VaultStatus::Active || v.version != expected_version {
            return None;
          }
          v.last_reminder_at = Some(at);
          Some(())
        })
        .is_some(),
    )
  }

  async fn transition(
    &self,
    id: Uuid,
    from: VaultStatus,
    to: VaultStatus,
  ) -> Result<bool, MemoryError> {
    Ok(
      self
        .update(id, |v| {
          if v.status != from || !from.permits(to) {
            return None;
          }
          v.status = to;
          Some(())
        })
        .is_some(),
    )
  }

  async fn mark_activation_notified(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<bool, MemoryError> {
    Ok(
      self
        .update(id, |v| {
          if v.status != VaultStatus::Activated || v.activated_notified_at.is_some() {
            return None;
          }
          v.activated_notified_at = Some(at);
          Some(())
        })
        .is_some(),
    )
  }
}
