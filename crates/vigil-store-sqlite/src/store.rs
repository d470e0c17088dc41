//! [`SqliteStore`]: the SQLite implementation of [`VaultStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;
use vigil_core::{
  store::{RowRead, VaultStore},
  vault::{OwnerRef, Vault, VaultStatus, normalize_email},
};

use crate::{
  Error, Result,
  encode::{COLUMNS, KeyedRow, RawVault, decode_rows, encode_dt, encode_status, encode_uuid},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A vault store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests and dry runs.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a conditional single-row `UPDATE` and report whether it applied.
  async fn update_where(&self, sql: &'static str, params: Vec<String>) -> Result<bool> {
    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(sql, rusqlite::params_from_iter(params))?))
      .await?;
    Ok(changed == 1)
  }

  /// Every row matching `condition`, in insertion order, decoded one by one.
  async fn select_rows(
    &self,
    condition: &'static str,
    params: Vec<String>,
  ) -> Result<Vec<RowRead<Error>>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {COLUMNS} FROM vaults WHERE {condition} ORDER BY rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), KeyedRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(decode_rows(rows))
  }

  /// Run raw SQL, for tests that need to damage a row.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<usize> {
    Ok(self.conn.call(move |conn| Ok(conn.execute(sql, [])?)).await?)
  }
}

fn select_by_id(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawVault>> {
  conn
    .query_row(
      &format!("SELECT {COLUMNS} FROM vaults WHERE vault_id = ?1"),
      [id],
      RawVault::from_row,
    )
    .optional()
}

// ─── VaultStore impl ─────────────────────────────────────────────────────────

impl VaultStore for SqliteStore {
  type Error = crate::Error;

  // ── Rows ──────────────────────────────────────────────────────────────

  async fn insert(&self, vault: &Vault) -> Result<()> {
    let id_str       = encode_uuid(vault.vault_id);
    let owner_email  = normalize_email(&vault.owner_email);
    let contact_ref  = vault.owner_contact_ref.clone();
    let document_ref = vault.document_ref.clone();
    let document_url = vault.document_url.clone();
    let attachment   = vault.attachment_ref.clone();
    let trustees     = serde_json::to_string(&vault.trustees)?;
    let interval     = vault.checkin_interval_days;
    let grace        = vault.grace_hours;
    let checkin_str  = encode_dt(vault.last_checkin_at);
    let status_str   = encode_status(vault.status);
    let created_str  = encode_dt(vault.created_at);
    let reminder_str = vault.last_reminder_at.map(encode_dt);
    let notified_str = vault.activated_notified_at.map(encode_dt);
    let version      = i64::try_from(vault.version).unwrap_or(i64::MAX);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO vaults (
             vault_id, owner_email, owner_contact_ref, document_ref, document_url,
             attachment_ref, trustees, checkin_interval_days, grace_hours,
             last_checkin_at, status, created_at, last_reminder_at,
             activated_notified_at, version
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
          rusqlite::params![
            id_str,
            owner_email,
            contact_ref,
            document_ref,
            document_url,
            attachment,
            trustees,
            interval,
            grace,
            checkin_str,
            status_str,
            created_str,
            reminder_str,
            notified_str,
            version,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get(&self, id: Uuid) -> Result<Option<Vault>> {
    let id_str = encode_uuid(id);

    let raw = self
      .conn
      .call(move |conn| Ok(select_by_id(conn, &id_str)?))
      .await?;

    raw.map(RawVault::into_vault).transpose()
  }

  async fn scan(&self) -> Result<Vec<RowRead<Error>>> {
    self.select_rows("1 = 1", Vec::new()).await
  }

  // Stored emails are already normalised, so only case needs folding.
  async fn find_by_owner(&self, owner: &OwnerRef) -> Result<Vec<RowRead<Error>>> {
    let (condition, key) = match owner {
      OwnerRef::Contact(c) => ("owner_contact_ref = ?1", c.clone()),
      OwnerRef::Email(e) => ("lower(owner_email) = lower(?1)", normalize_email(e)),
    };
    self.select_rows(condition, vec![key]).await
  }

  // ── Conditional updates ───────────────────────────────────────────────

  async fn record_checkin(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Vault>> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(at);

    // Update and re-read on the connection thread so no other call can land
    // in between.
    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE vaults
              SET last_checkin_at  = max(last_checkin_at, ?2),
                  last_reminder_at = NULL,
                  version          = version + 1
            WHERE vault_id = ?1 AND status = 'ACTIVE'",
          rusqlite::params![id_str, at_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(select_by_id(conn, &id_str)?)
      })
      .await?;

    raw.map(RawVault::into_vault).transpose()
  }

  async fn stamp_reminder(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
    expected_version: u64,
  ) -> Result<bool> {
    self
      .update_where(
        "UPDATE vaults
            SET last_reminder_at = ?2,
                version          = version + 1
          WHERE vault_id = ?1 AND status = 'ACTIVE' AND version = CAST(?3 AS INTEGER)",
        vec![encode_uuid(id), encode_dt(at), expected_version.to_string()],
      )
      .await
  }

  async fn transition(&self, id: Uuid, from: VaultStatus, to: VaultStatus) -> Result<bool> {
    if !from.permits(to) {
      return Ok(false);
    }
    self
      .update_where(
        "UPDATE vaults
            SET status  = ?3,
                version = version + 1
          WHERE vault_id = ?1 AND status = ?2",
        vec![
          encode_uuid(id),
          encode_status(from).to_owned(),
          encode_status(to).to_owned(),
        ],
      )
      .await
  }

  async fn mark_activation_notified(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    self
      .update_where(
        "UPDATE vaults
            SET activated_notified_at = ?2,
                version               = version + 1
          WHERE vault_id = ?1
            AND status = 'ACTIVATED'
            AND activated_notified_at IS NULL",
        vec![encode_uuid(id), encode_dt(at)],
      )
      .await
  }
}
