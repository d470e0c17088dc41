//! The vault, the single persistent entity of the escrow service.
//!
//! A vault binds one owner to one secret document, a list of trustees and a
//! check-in schedule. Everything except the check-in timestamps, the status
//! and the notification bookkeeping is fixed at creation.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const DEFAULT_CHECKIN_INTERVAL_DAYS: u32 = 30;
pub const DEFAULT_GRACE_HOURS: u32 = 12;
pub const DEFAULT_TITLE: &str = "Untitled Secret Vault";
pub const DEFAULT_CONTENT: &str = "No content provided.";

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle status. `Deactivated` and `Activated` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VaultStatus {
  Active,
  /// Withdrawn by the owner; will never be released.
  Deactivated,
  /// Released to the trustees; irreversible.
  Activated,
}

impl VaultStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "ACTIVE",
      Self::Deactivated => "DEACTIVATED",
      Self::Activated => "ACTIVATED",
    }
  }

  pub fn is_terminal(self) -> bool { !matches!(self, Self::Active) }

  /// Whether the state machine allows moving from `self` to `to`.
  pub fn permits(self, to: Self) -> bool {
    matches!(
      (self, to),
      (Self::Active, Self::Active)
        | (Self::Active, Self::Deactivated)
        | (Self::Active, Self::Activated)
    )
  }
}

impl fmt::Display for VaultStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Owner reference ─────────────────────────────────────────────────────────

/// How a caller identifies itself as the owner of a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OwnerRef {
  /// Messaging-platform user id.
  Contact(String),
  Email(String),
}

impl fmt::Display for OwnerRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Contact(c) => write!(f, "contact:{c}"),
      Self::Email(e) => write!(f, "email:{e}"),
    }
  }
}

/// Email comparison used for ownership proofs: trimmed, ASCII
/// case-insensitive.
pub fn email_matches(a: &str, b: &str) -> bool {
  a.trim().eq_ignore_ascii_case(b.trim())
}

/// The form an owner email is stored in. Stores apply this on insert, so
/// lookups only ever need to fold case.
pub fn normalize_email(email: &str) -> String { email.trim().to_owned() }

// ─── Vault ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
  pub vault_id:              Uuid,
  pub owner_email:           String,
  pub owner_contact_ref:     Option<String>,
  pub document_ref:          String,
  pub document_url:          String,
  pub attachment_ref:        Option<String>,
  pub trustees:              Vec<String>,
  pub checkin_interval_days: u32,
  pub grace_hours:           u32,
  pub last_checkin_at:       DateTime<Utc>,
  pub status:                VaultStatus,
  pub created_at:            DateTime<Utc>,
  pub last_reminder_at:      Option<DateTime<Utc>>,
  pub activated_notified_at: Option<DateTime<Utc>>,
  /// Bumped by the store on every write; used to detect rows that changed
  /// between a read and a conditional write.
  pub version:               u64,
}

impl Vault {
  pub fn is_owned_by(&self, owner: &OwnerRef) -> bool {
    match owner {
      OwnerRef::Contact(c) => self.owner_contact_ref.as_deref() == Some(c.as_str()),
      OwnerRef::Email(e) => email_matches(&self.owner_email, e),
    }
  }

  /// `last_checkin_at + checkin_interval_days`.
  pub fn deadline(&self) -> DateTime<Utc> {
    offset(
      self.last_checkin_at,
      TimeDelta::days(i64::from(self.checkin_interval_days)),
    )
  }

  /// `deadline + grace_hours`: the moment the vault is released.
  pub fn activation_time(&self) -> DateTime<Utc> {
    offset(self.deadline(), TimeDelta::hours(i64::from(self.grace_hours)))
  }

  pub fn summary(&self) -> VaultSummary {
    VaultSummary {
      vault_id:      self.vault_id,
      status:        self.status,
      document_url:  self.document_url.clone(),
      trustee_count: self.trustees.len(),
      deadline:      self.deadline(),
    }
  }
}

/// Saturating timestamp addition; schedules far beyond chrono's range clamp
/// to the maximum representable instant.
fn offset(at: DateTime<Utc>, by: TimeDelta) -> DateTime<Utc> {
  at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// The owner-facing projection of a vault used by list replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSummary {
  pub vault_id:      Uuid,
  pub status:        VaultStatus,
  pub document_url:  String,
  pub trustee_count: usize,
  pub deadline:      DateTime<Utc>,
}

// ─── NewVault ────────────────────────────────────────────────────────────────

/// Input to [`crate::Engine::create`]. The owner email is not part of the
/// input; it comes from the trusted session or the engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewVault {
  pub title:                 Option<String>,
  #[serde(default)]
  pub content:               String,
  pub owner_contact_ref:     Option<String>,
  pub attachment_ref:        Option<String>,
  /// A list of addresses, or one comma-separated string.
  #[serde(default, deserialize_with = "trustee_list")]
  pub trustees:              Vec<String>,
  /// Non-positive or absent values fall back to the configured default.
  pub checkin_interval_days: Option<i64>,
  pub grace_hours:           Option<i64>,
}

impl NewVault {
  pub fn new(content: impl Into<String>, trustees: Vec<String>) -> Self {
    Self {
      content: content.into(),
      trustees,
      ..Self::default()
    }
  }
}

fn trustee_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Trustees {
    Csv(String),
    List(Vec<String>),
  }

  Ok(match Trustees::deserialize(de)? {
    Trustees::Csv(csv) => parse_trustees(&csv),
    Trustees::List(list) => list,
  })
}

/// Split a comma-separated trustee list, trimming entries and dropping blanks.
pub fn parse_trustees(csv: &str) -> Vec<String> {
  csv
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
    .collect()
}
