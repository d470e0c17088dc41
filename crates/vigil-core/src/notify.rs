//! Outbound side of the engine: the closed set of message templates and the
//! traits through which they, resource grants and new documents leave the
//! process.
//!
//! The engine never formats text. It picks a [`Notice`] variant and hands it
//! to a [`Notifier`]; rendering for a concrete channel is the adapter's job.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vault::VaultSummary;

// ─── Templates ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum Notice {
  /// Reply to `register` / `create`. `onboarding_url` is withheld when the
  /// owner already has active vaults and asked with `register`; the reply
  /// then asks them to confirm with `create`.
  RegisterPrompt {
    onboarding_url: Option<String>,
    active_vaults:  usize,
  },
  /// Sent to the owner while a vault sits in its grace window.
  ReminderAlert {
    vault_id:              Uuid,
    checkin_interval_days: u32,
    grace_hours:           u32,
    activation_at:         DateTime<Utc>,
    /// Identity-proof check-in deep link.
    checkin_url:           String,
  },
  /// Sent once to the owner after release.
  ActivationAlert {
    vault_id:     Uuid,
    document_url: String,
    trustees:     Vec<String>,
    /// Messages from resource grants that failed during release.
    share_errors: Vec<String>,
  },
  /// Sent to each trustee on release.
  TrusteeRelease {
    vault_id:       Uuid,
    owner_email:    String,
    document_url:   String,
    attachment_ref: Option<String>,
    share_errors:   Vec<String>,
  },
  DeactivationConfirm { vault_id: Uuid },
  CheckinConfirm { refreshed: Vec<Uuid> },
  VaultList { vaults: Vec<VaultSummary> },
  /// A command was understood but refused (unknown vault, wrong owner,
  /// terminal status).
  CommandRejected { command: String, reason: String },
  Help,
}

impl Notice {
  /// The serde tag, for logging.
  pub fn template(&self) -> &'static str {
    match self {
      Self::RegisterPrompt { .. } => "register_prompt",
      Self::ReminderAlert { .. } => "reminder_alert",
      Self::ActivationAlert { .. } => "activation_alert",
      Self::TrusteeRelease { .. } => "trustee_release",
      Self::DeactivationConfirm { .. } => "deactivation_confirm",
      Self::CheckinConfirm { .. } => "checkin_confirm",
      Self::VaultList { .. } => "vault_list",
      Self::CommandRejected { .. } => "command_rejected",
      Self::Help => "help",
    }
  }
}

// ─── Ports ───────────────────────────────────────────────────────────────────

/// Message delivery and resource sharing. Every call is best-effort from the
/// engine's point of view: errors are logged and recorded, never propagated
/// out of a reconciliation row.
pub trait Notifier: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Deliver to a messaging-platform user id.
  fn push_message<'a>(
    &'a self,
    recipient_ref: &'a str,
    notice: &'a Notice,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn send_email<'a>(
    &'a self,
    address: &'a str,
    notice: &'a Notice,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Grant `recipients` access to `resource_ref`. Must tolerate being called
  /// again for a grant that already exists.
  fn share_resource<'a>(
    &'a self,
    resource_ref: &'a str,
    recipients: &'a [String],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// A freshly created secret document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
  pub document_ref: String,
  pub url:          String,
}

/// Creates the document that holds a vault's secret content.
pub trait Documents: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn create_document<'a>(
    &'a self,
    title: &'a str,
    content: &'a str,
  ) -> impl Future<Output = Result<DocumentHandle, Self::Error>> + Send + 'a;
}

// ─── Delivery bookkeeping ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
  Push,
  Email,
  Share,
}

/// A failed, non-fatal outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
  pub vault_id: Uuid,
  pub channel:  Channel,
  /// Recipient address, contact ref, or shared resource.
  pub target:   String,
  pub error:    String,
}
