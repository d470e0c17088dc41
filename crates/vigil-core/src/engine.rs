//! [`Engine`]: the vault lifecycle engine.
//!
//! Owns every state transition: creation, check-in, deactivation, and the
//! reconciliation sweep that sends reminders and releases overdue vaults.
//! The engine holds no row state of its own; each operation reads the store,
//! decides, and writes back through the store's conditional updates.

use std::{
  slice,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  clock::{Clock, SystemClock},
  command::Command,
  config::EngineConfig,
  lifecycle::{self, Assessment},
  notify::{Channel, DeliveryFailure, Documents, Notice, Notifier},
  store::VaultStore,
  vault::{
    DEFAULT_CONTENT, DEFAULT_TITLE, NewVault, OwnerRef, Vault, VaultStatus, normalize_email,
  },
};

// ─── Results ─────────────────────────────────────────────────────────────────

/// Result of a check-in for every active vault of one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckinOutcome {
  /// Vaults whose deadline was refreshed. Empty means there was nothing to
  /// refresh, which is not an error.
  pub refreshed: Vec<Uuid>,
}

/// What the sweep did with one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
  /// Terminal status.
  Skipped,
  /// Nothing due.
  Unchanged,
  Reminded,
  /// Reminder sent, but the row changed since the scan so the stamp was not
  /// written.
  ReminderConflict,
  /// The row changed between scan and release (check-in, deactivation) and
  /// is no longer due.
  Aborted,
  Activated {
    /// `false` if another writer moved the row first.
    transitioned:   bool,
    /// `true` only for the sweep that claimed the owner notification.
    owner_notified: bool,
  },
  /// Already released by an earlier sweep that stopped before telling the
  /// owner; only the owner notification was attempted.
  Announced { owner_notified: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
  /// `None` when the stored key is not a valid id.
  pub vault_id: Option<Uuid>,
  /// The row key as stored.
  pub key:      String,
  pub error:    String,
}

/// Summary of one reconciliation sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
  pub started_at:        DateTime<Utc>,
  pub scanned:           usize,
  pub skipped:           usize,
  pub reminded:          usize,
  pub activated:         usize,
  pub owner_notified:    usize,
  pub conflicts:         usize,
  pub failures:          Vec<RowFailure>,
  pub delivery_failures: Vec<DeliveryFailure>,
}

impl SweepReport {
  fn new(started_at: DateTime<Utc>) -> Self {
    Self {
      started_at,
      scanned: 0,
      skipped: 0,
      reminded: 0,
      activated: 0,
      owner_notified: 0,
      conflicts: 0,
      failures: Vec::new(),
      delivery_failures: Vec::new(),
    }
  }

  fn record(&mut self, outcome: RowOutcome) {
    match outcome {
      RowOutcome::Skipped => self.skipped += 1,
      RowOutcome::Unchanged => {}
      RowOutcome::Reminded => self.reminded += 1,
      RowOutcome::ReminderConflict | RowOutcome::Aborted => self.conflicts += 1,
      RowOutcome::Activated { owner_notified, .. } => {
        self.activated += 1;
        if owner_notified {
          self.owner_notified += 1;
        }
      }
      RowOutcome::Announced { owner_notified } => {
        if owner_notified {
          self.owner_notified += 1;
        }
      }
    }
  }
}

// ─── Sweep guard ─────────────────────────────────────────────────────────────

/// Holds the engine's "sweep running" flag for the lifetime of one sweep.
struct SweepGuard<'a>(&'a AtomicBool);

impl<'a> SweepGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| Self(flag))
  }
}

impl Drop for SweepGuard<'_> {
  fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S, N, D> {
  store:     S,
  notifier:  N,
  documents: D,
  clock:     Arc<dyn Clock>,
  config:    EngineConfig,
  sweeping:  AtomicBool,
}

impl<S, N, D> Engine<S, N, D>
where
  S: VaultStore,
  N: Notifier,
  D: Documents,
{
  /// Build an engine. `config` is validated here and never re-read.
  pub fn new(store: S, notifier: N, documents: D, config: EngineConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      store,
      notifier,
      documents,
      clock: Arc::new(SystemClock),
      config,
      sweeping: AtomicBool::new(false),
    })
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn notifier(&self) -> &N { &self.notifier }

  pub fn config(&self) -> &EngineConfig { &self.config }

  // ── Creation ──────────────────────────────────────────────────────────

  /// Create and persist a new active vault.
  ///
  /// `session_email` is the owner identity from a trusted session; the
  /// configured owner email is the fallback. With neither, nothing is
  /// created and [`Error::ConfigurationMissing`] is returned.
  pub async fn create(&self, session_email: Option<&str>, input: NewVault) -> Result<Vault> {
    let owner_email = session_email
      .map(normalize_email)
      .filter(|e| !e.is_empty())
      .or_else(|| self.config.owner_email.as_deref().map(normalize_email))
      .ok_or(Error::ConfigurationMissing)?;

    let trustees = validate_trustees(input.trustees)?;
    let checkin_interval_days =
      positive_or(input.checkin_interval_days, self.config.default_checkin_interval_days);
    let grace_hours = positive_or(input.grace_hours, self.config.default_grace_hours);

    let title = non_blank(input.title).unwrap_or_else(|| DEFAULT_TITLE.to_owned());
    let content = if input.content.trim().is_empty() {
      DEFAULT_CONTENT.to_owned()
    } else {
      input.content
    };

    let document = self
      .documents
      .create_document(&title, &content)
      .await
      .map_err(|e| Error::Document(Box::new(e)))?;

    let now = self.clock.now();
    let vault = Vault {
      vault_id: Uuid::new_v4(),
      owner_email,
      owner_contact_ref: non_blank(input.owner_contact_ref),
      document_ref: document.document_ref,
      document_url: document.url,
      attachment_ref: non_blank(input.attachment_ref),
      trustees,
      checkin_interval_days,
      grace_hours,
      last_checkin_at: now,
      status: VaultStatus::Active,
      created_at: now,
      last_reminder_at: None,
      activated_notified_at: None,
      version: 0,
    };

    self.store.insert(&vault).await.map_err(Error::store)?;
    info!(
      vault_id = %vault.vault_id,
      trustees = vault.trustees.len(),
      checkin_interval_days,
      grace_hours,
      "vault created"
    );
    Ok(vault)
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn get(&self, vault_id: Uuid) -> Result<Option<Vault>> {
    self.store.get(vault_id).await.map_err(Error::store)
  }

  /// Every readable vault of `owner`, all statuses, in creation order.
  /// Rows that fail to decode are logged and left out.
  pub async fn list(&self, owner: &OwnerRef) -> Result<Vec<Vault>> {
    let rows = self.store.find_by_owner(owner).await.map_err(Error::store)?;
    Ok(
      rows
        .into_iter()
        .filter_map(|row| match row {
          Ok(vault) => Some(vault),
          Err(bad) => {
            error!(%owner, row = %bad.key, error = %bad.error, "unreadable vault row skipped");
            None
          }
        })
        .collect(),
    )
  }

  // ── Check-in ──────────────────────────────────────────────────────────

  /// Refresh every active vault owned by `owner`. Finding none is a no-op.
  pub async fn checkin_owner(&self, owner: &OwnerRef) -> Result<CheckinOutcome> {
    let now    = self.clock.now();
    let vaults = self.list(owner).await?;

    let mut refreshed = Vec::new();
    for vault in vaults.iter().filter(|v| v.status == VaultStatus::Active) {
      match self
        .store
        .record_checkin(vault.vault_id, now)
        .await
        .map_err(Error::store)?
      {
        Some(updated) => {
          info!(
            vault_id = %updated.vault_id,
            %owner,
            next_deadline = %updated.deadline(),
            "checked in"
          );
          refreshed.push(updated.vault_id);
        }
        None => debug!(vault_id = %vault.vault_id, "vault left ACTIVE before check-in"),
      }
    }

    if refreshed.is_empty() {
      info!(%owner, "check-in found no active vault");
    }
    Ok(CheckinOutcome { refreshed })
  }

  /// Identity-proof check-in for one vault (the link sent with reminders).
  ///
  /// Unlike [`Self::checkin_owner`] every miss is an explicit error, so the
  /// owner can tell whether retrying makes sense. Check-in after activation
  /// fails with [`Error::InvalidState`]: the release cannot be undone.
  pub async fn checkin_verified(&self, vault_id: Uuid, owner_email: &str) -> Result<Vault> {
    let vault = self
      .store
      .get(vault_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NotFound(vault_id))?;

    if !vault.is_owned_by(&OwnerRef::Email(owner_email.to_owned())) {
      warn!(%vault_id, "check-in rejected: owner email mismatch");
      return Err(Error::Unauthorized(vault_id));
    }
    if vault.status != VaultStatus::Active {
      warn!(%vault_id, status = %vault.status, "check-in rejected: vault is terminal");
      return Err(Error::InvalidState { vault_id, status: vault.status });
    }

    let now = self.clock.now();
    match self.store.record_checkin(vault_id, now).await.map_err(Error::store)? {
      Some(updated) => {
        info!(%vault_id, next_deadline = %updated.deadline(), "checked in via link");
        Ok(updated)
      }
      None => Err(self.explain_miss(vault_id).await),
    }
  }

  // ── Deactivation ──────────────────────────────────────────────────────

  /// Permanently withdraw an active vault. Only its owner may do this.
  pub async fn deactivate(&self, vault_id: Uuid, owner: &OwnerRef) -> Result<Vault> {
    let vault = self
      .store
      .get(vault_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NotFound(vault_id))?;

    if !vault.is_owned_by(owner) {
      warn!(%vault_id, %owner, "deactivation rejected: not the owner");
      return Err(Error::Unauthorized(vault_id));
    }
    if vault.status != VaultStatus::Active {
      return Err(Error::InvalidState { vault_id, status: vault.status });
    }

    let moved = self
      .store
      .transition(vault_id, VaultStatus::Active, VaultStatus::Deactivated)
      .await
      .map_err(Error::store)?;
    if !moved {
      return Err(self.explain_miss(vault_id).await);
    }

    info!(%vault_id, %owner, "vault deactivated");
    self
      .store
      .get(vault_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NotFound(vault_id))
  }

  /// Turn a conditional write that did not apply into the error describing
  /// the row's current state.
  async fn explain_miss(&self, vault_id: Uuid) -> Error {
    match self.store.get(vault_id).await {
      Ok(Some(v)) => Error::InvalidState { vault_id, status: v.status },
      Ok(None) => Error::NotFound(vault_id),
      Err(e) => Error::store(e),
    }
  }

  // ── Commands ──────────────────────────────────────────────────────────

  /// Run a messaging-platform command for the user `contact_ref` and return
  /// the reply to send back. Refusals become [`Notice::CommandRejected`];
  /// only infrastructure failures are errors.
  pub async fn execute(&self, contact_ref: &str, command: Command) -> Result<Notice> {
    let owner = OwnerRef::Contact(contact_ref.to_owned());
    debug!(%owner, %command, "executing command");

    let notice = match command {
      Command::Register | Command::Create => {
        let active_vaults = self
          .list(&owner)
          .await?
          .iter()
          .filter(|v| v.status == VaultStatus::Active)
          .count();
        let onboarding_url = if command == Command::Register && active_vaults > 0 {
          None
        } else {
          Some(self.config.onboarding_link(contact_ref)?)
        };
        Notice::RegisterPrompt { onboarding_url, active_vaults }
      }
      Command::Checkin => {
        let outcome = self.checkin_owner(&owner).await?;
        Notice::CheckinConfirm { refreshed: outcome.refreshed }
      }
      Command::List => Notice::VaultList {
        vaults: self.list(&owner).await?.iter().map(Vault::summary).collect(),
      },
      Command::Deactivate(vault_id) => match self.deactivate(vault_id, &owner).await {
        Ok(_) => Notice::DeactivationConfirm { vault_id },
        Err(e) if e.is_rejection() => Notice::CommandRejected {
          command: command.to_string(),
          reason:  e.to_string(),
        },
        Err(e) => return Err(e),
      },
      Command::Help => Notice::Help,
    };
    Ok(notice)
  }

  // ── Reconciliation ────────────────────────────────────────────────────

  /// One pass over every vault: send due reminders, release fully overdue
  /// vaults. Row failures are logged and recorded in the report; they never
  /// stop the sweep.
  ///
  /// Returns [`Error::SweepInProgress`] if another sweep on this engine has
  /// not finished.
  pub async fn reconcile(&self) -> Result<SweepReport> {
    let _guard = SweepGuard::acquire(&self.sweeping).ok_or(Error::SweepInProgress)?;

    let now = self.clock.now();
    info!(%now, "reconciliation sweep started");

    let rows = self.store.scan().await.map_err(Error::store)?;
    let mut report = SweepReport::new(now);

    for row in rows {
      report.scanned += 1;
      let vault = match row {
        Ok(vault) => vault,
        Err(bad) => {
          error!(row = %bad.key, error = %bad.error, "unreadable vault row skipped");
          report.failures.push(RowFailure {
            vault_id: bad.vault_id(),
            error:    Error::store(bad.error).to_string(),
            key:      bad.key,
          });
          continue;
        }
      };

      let vault_id = vault.vault_id;
      match self.reconcile_vault(vault, now, &mut report).await {
        Ok(outcome) => {
          debug!(%vault_id, ?outcome, "row reconciled");
          report.record(outcome);
        }
        Err(e) => {
          error!(%vault_id, error = %e, "row reconciliation failed");
          report.failures.push(RowFailure {
            vault_id: Some(vault_id),
            key:      vault_id.to_string(),
            error:    e.to_string(),
          });
        }
      }
    }

    info!(
      scanned = report.scanned,
      reminded = report.reminded,
      activated = report.activated,
      owner_notified = report.owner_notified,
      conflicts = report.conflicts,
      failures = report.failures.len(),
      delivery_failures = report.delivery_failures.len(),
      "reconciliation sweep finished"
    );
    Ok(report)
  }

  async fn reconcile_vault(
    &self,
    vault: Vault,
    now: DateTime<Utc>,
    report: &mut SweepReport,
  ) -> Result<RowOutcome> {
    match lifecycle::assess(&vault, now) {
      Assessment::Dormant { .. } => Ok(RowOutcome::Skipped),
      Assessment::Current { .. } | Assessment::ReminderRecent { .. } => Ok(RowOutcome::Unchanged),
      Assessment::Remind { activation, .. } => self.remind(&vault, activation, now, report).await,
      Assessment::Activate { .. } => self.activate(&vault, now, report).await,
      Assessment::Unannounced => self.announce(&vault, now, report).await,
    }
  }

  async fn remind(
    &self,
    vault: &Vault,
    activation: DateTime<Utc>,
    now: DateTime<Utc>,
    report: &mut SweepReport,
  ) -> Result<RowOutcome> {
    let vault_id = vault.vault_id;
    let notice = Notice::ReminderAlert {
      vault_id,
      checkin_interval_days: vault.checkin_interval_days,
      grace_hours: vault.grace_hours,
      activation_at: activation,
      checkin_url: self.config.checkin_link(vault_id, &vault.owner_email)?,
    };

    if let Some(contact) = &vault.owner_contact_ref {
      self.push(vault_id, contact, &notice, report).await;
    }
    self.email(vault_id, &vault.owner_email, &notice, report).await;

    let stamped = self
      .store
      .stamp_reminder(vault_id, now, vault.version)
      .await
      .map_err(Error::store)?;
    if stamped {
      info!(%vault_id, %activation, "reminder sent");
      Ok(RowOutcome::Reminded)
    } else {
      warn!(%vault_id, "vault changed since scan; reminder not stamped");
      Ok(RowOutcome::ReminderConflict)
    }
  }

  async fn activate(
    &self,
    snapshot: &Vault,
    now: DateTime<Utc>,
    report: &mut SweepReport,
  ) -> Result<RowOutcome> {
    let vault_id = snapshot.vault_id;

    // Re-read right before the irreversible part: a check-in or deactivation
    // may have landed since the scan.
    let Some(vault) = self.store.get(vault_id).await.map_err(Error::store)? else {
      warn!(%vault_id, "vault disappeared before release");
      return Ok(RowOutcome::Aborted);
    };
    if !lifecycle::assess(&vault, now).is_activation() {
      info!(%vault_id, status = %vault.status, "vault no longer due; release aborted");
      return Ok(RowOutcome::Aborted);
    }

    info!(%vault_id, trustees = vault.trustees.len(), "releasing vault");
    let share_errors = self.release(&vault, report).await;

    let transitioned = self
      .store
      .transition(vault_id, VaultStatus::Active, VaultStatus::Activated)
      .await
      .map_err(Error::store)?;
    if transitioned {
      info!(%vault_id, "vault marked ACTIVATED");
    } else {
      warn!(%vault_id, "vault left ACTIVE during release; status not changed here");
    }

    let owner_notified = self
      .store
      .mark_activation_notified(vault_id, now)
      .await
      .map_err(Error::store)?;
    if owner_notified {
      self.notify_owner_activated(&vault, share_errors, report).await;
    } else {
      debug!(%vault_id, "owner activation notice already claimed");
    }

    Ok(RowOutcome::Activated { transitioned, owner_notified })
  }

  /// Finish a release whose sweep stopped after the status flip: claim and
  /// send the owner notice, nothing else. Share errors from the interrupted
  /// sweep are not known here.
  async fn announce(
    &self,
    vault: &Vault,
    now: DateTime<Utc>,
    report: &mut SweepReport,
  ) -> Result<RowOutcome> {
    let owner_notified = self
      .store
      .mark_activation_notified(vault.vault_id, now)
      .await
      .map_err(Error::store)?;
    if owner_notified {
      warn!(vault_id = %vault.vault_id, "owner notice was missing after release; sending it now");
      self.notify_owner_activated(vault, Vec::new(), report).await;
    }
    Ok(RowOutcome::Announced { owner_notified })
  }

  /// Grant every trustee access to the document and attachment, then tell
  /// each of them. Returns the share failures for the owner's notice.
  async fn release(&self, vault: &Vault, report: &mut SweepReport) -> Vec<String> {
    let vault_id  = vault.vault_id;
    let resources = std::iter::once(&vault.document_ref).chain(vault.attachment_ref.as_ref());

    let mut share_errors = Vec::new();
    for resource in resources {
      for trustee in &vault.trustees {
        if let Err(e) = self
          .notifier
          .share_resource(resource, slice::from_ref(trustee))
          .await
        {
          let message = format!("could not share {resource} with {trustee}: {e}");
          warn!(%vault_id, %resource, %trustee, error = %e, "share failed");
          report.delivery_failures.push(DeliveryFailure {
            vault_id,
            channel: Channel::Share,
            target: resource.clone(),
            error: e.to_string(),
          });
          share_errors.push(message);
        }
      }
    }

    let notice = Notice::TrusteeRelease {
      vault_id,
      owner_email: vault.owner_email.clone(),
      document_url: vault.document_url.clone(),
      attachment_ref: vault.attachment_ref.clone(),
      share_errors: share_errors.clone(),
    };
    for trustee in &vault.trustees {
      self.email(vault_id, trustee, &notice, report).await;
    }

    share_errors
  }

  async fn notify_owner_activated(
    &self,
    vault: &Vault,
    share_errors: Vec<String>,
    report: &mut SweepReport,
  ) {
    let notice = Notice::ActivationAlert {
      vault_id: vault.vault_id,
      document_url: vault.document_url.clone(),
      trustees: vault.trustees.clone(),
      share_errors,
    };
    if let Some(contact) = &vault.owner_contact_ref {
      self.push(vault.vault_id, contact, &notice, report).await;
    }
    self.email(vault.vault_id, &vault.owner_email, &notice, report).await;
    info!(vault_id = %vault.vault_id, "owner notified of activation");
  }

  // ── Best-effort delivery ──────────────────────────────────────────────

  async fn push(&self, vault_id: Uuid, contact: &str, notice: &Notice, report: &mut SweepReport) {
    if let Err(e) = self.notifier.push_message(contact, notice).await {
      warn!(%vault_id, template = notice.template(), error = %e, "push delivery failed");
      report.delivery_failures.push(DeliveryFailure {
        vault_id,
        channel: Channel::Push,
        target: contact.to_owned(),
        error: e.to_string(),
      });
    }
  }

  async fn email(&self, vault_id: Uuid, address: &str, notice: &Notice, report: &mut SweepReport) {
    if let Err(e) = self.notifier.send_email(address, notice).await {
      warn!(%vault_id, %address, template = notice.template(), error = %e, "email delivery failed");
      report.delivery_failures.push(DeliveryFailure {
        vault_id,
        channel: Channel::Email,
        target: address.to_owned(),
        error: e.to_string(),
      });
    }
  }
}

// ─── Input validation ────────────────────────────────────────────────────────

fn positive_or(value: Option<i64>, default: u32) -> u32 {
  match value {
    Some(v) if v > 0 => u32::try_from(v).unwrap_or(u32::MAX),
    _ => default,
  }
}

fn non_blank(value: Option<String>) -> Option<String> {
  value
    .map(|s| s.trim().to_owned())
    .filter(|s| !s.is_empty())
}

fn validate_trustees(raw: Vec<String>) -> Result<Vec<String>> {
  let trustees: Vec<String> = raw
    .iter()
    .flat_map(|entry| crate::vault::parse_trustees(entry))
    .collect();

  if trustees.is_empty() {
    return Err(Error::Invalid("at least one trustee is required".into()));
  }
  if let Some(bad) = trustees.iter().find(|t| !t.contains('@')) {
    return Err(Error::Invalid(format!("trustee {bad:?} is not an email address")));
  }
  Ok(trustees)
}
