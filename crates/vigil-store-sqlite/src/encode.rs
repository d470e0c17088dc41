//! Encoding and decoding helpers between vault types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`
//! suffix) so that SQL string comparison orders them correctly. The trustee
//! list is stored as a compact JSON array.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::ValueRef;
use uuid::Uuid;
use vigil_core::{
  store::{RowRead, UnreadableRow},
  vault::{Vault, VaultStatus},
};

use crate::{Error, Result};

/// Column list shared by every `SELECT`; order matches [`RawVault::from_row`].
pub const COLUMNS: &str = "vault_id, owner_email, owner_contact_ref, document_ref, \
                           document_url, attachment_ref, trustees, checkin_interval_days, \
                           grace_hours, last_checkin_at, status, created_at, \
                           last_reminder_at, activated_notified_at, version";

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── VaultStatus ─────────────────────────────────────────────────────────────

pub fn encode_status(s: VaultStatus) -> &'static str { s.as_str() }

pub fn decode_status(s: &str) -> Result<VaultStatus> {
  match s {
    "ACTIVE" => Ok(VaultStatus::Active),
    "DEACTIVATED" => Ok(VaultStatus::Deactivated),
    "ACTIVATED" => Ok(VaultStatus::Activated),
    other => Err(Error::UnknownStatus(other.to_owned())),
  }
}

// ─── Integers ────────────────────────────────────────────────────────────────

fn decode_u32(column: &'static str, value: i64) -> Result<u32> {
  u32::try_from(value).map_err(|_| Error::OutOfRange { column, value })
}

fn decode_u64(column: &'static str, value: i64) -> Result<u64> {
  u64::try_from(value).map_err(|_| Error::OutOfRange { column, value })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `vaults` row.
pub struct RawVault {
  pub vault_id:              String,
  pub owner_email:           String,
  pub owner_contact_ref:     Option<String>,
  pub document_ref:          String,
  pub document_url:          String,
  pub attachment_ref:        Option<String>,
  pub trustees:              String,
  pub checkin_interval_days: i64,
  pub grace_hours:           i64,
  pub last_checkin_at:       String,
  pub status:                String,
  pub created_at:            String,
  pub last_reminder_at:      Option<String>,
  pub activated_notified_at: Option<String>,
  pub version:               i64,
}

impl RawVault {
  /// Read a row selected with [`COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      vault_id:              row.get(0)?,
      owner_email:           row.get(1)?,
      owner_contact_ref:     row.get(2)?,
      document_ref:          row.get(3)?,
      document_url:          row.get(4)?,
      attachment_ref:        row.get(5)?,
      trustees:              row.get(6)?,
      checkin_interval_days: row.get(7)?,
      grace_hours:           row.get(8)?,
      last_checkin_at:       row.get(9)?,
      status:                row.get(10)?,
      created_at:            row.get(11)?,
      last_reminder_at:      row.get(12)?,
      activated_notified_at: row.get(13)?,
      version:               row.get(14)?,
    })
  }

  pub fn into_vault(self) -> Result<Vault> {
    Ok(Vault {
      vault_id:              decode_uuid(&self.vault_id)?,
      owner_email:           self.owner_email,
      owner_contact_ref:     self.owner_contact_ref,
      document_ref:          self.document_ref,
      document_url:          self.document_url,
      attachment_ref:        self.attachment_ref,
      trustees:              serde_json::from_str(&self.trustees)?,
      checkin_interval_days: decode_u32("checkin_interval_days", self.checkin_interval_days)?,
      grace_hours:           decode_u32("grace_hours", self.grace_hours)?,
      last_checkin_at:       decode_dt(&self.last_checkin_at)?,
      status:                decode_status(&self.status)?,
      created_at:            decode_dt(&self.created_at)?,
      last_reminder_at:      decode_opt_dt(self.last_reminder_at)?,
      activated_notified_at: decode_opt_dt(self.activated_notified_at)?,
      version:               decode_u64("version", self.version)?,
    })
  }
}

/// A row's key next to its column read, so a row whose columns have the
/// wrong types can still be named.
pub struct KeyedRow {
  key: String,
  raw: rusqlite::Result<RawVault>,
}

impl KeyedRow {
  /// Read a row selected with [`COLUMNS`]. Only a failure to reach the row
  /// at all is an error here.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    let key = match row.get_ref(0)? {
      ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
      other => format!("{other:?}"),
    };
    Ok(Self { key, raw: RawVault::from_row(row) })
  }

  pub fn decode(self) -> RowRead<Error> {
    let Self { key, raw } = self;
    raw
      .map_err(Error::from)
      .and_then(RawVault::into_vault)
      .map_err(|error| UnreadableRow { key, error })
  }
}

/// Decode a batch of rows one at a time; a malformed row takes its own slot
/// as an [`UnreadableRow`].
pub fn decode_rows(rows: Vec<KeyedRow>) -> Vec<RowRead<Error>> {
  rows.into_iter().map(KeyedRow::decode).collect()
}
