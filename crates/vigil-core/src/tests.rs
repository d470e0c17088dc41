//! Engine tests against the in-memory store with a manual clock and a
//! recording notifier.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, atomic::{AtomicUsize, Ordering}},
};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use thiserror::Error;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::{
  Engine, Error,
  clock::ManualClock,
  command::Command,
  config::EngineConfig,
  memory::{MemoryError, MemoryStore},
  notify::{Channel, DocumentHandle, Documents, Notice, Notifier},
  store::{RowRead, UnreadableRow, VaultStore},
  vault::{NewVault, OwnerRef, Vault, VaultStatus},
};

// ─── Fakes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("refused: {0}")]
struct Refused(String);

#[derive(Debug, Clone, PartialEq)]
enum Sent {
  Push { to: String, notice: Notice },
  Email { to: String, notice: Notice },
  Share { resource: String, recipients: Vec<String> },
}

/// Records every outbound call; targets in `refuse` fail.
#[derive(Default)]
struct Recorder {
  sent:   Mutex<Vec<Sent>>,
  refuse: Mutex<HashSet<String>>,
}

impl Recorder {
  fn refuse(&self, target: &str) { self.refuse.lock().unwrap().insert(target.to_owned()); }

  fn check(&self, target: &str) -> Result<(), Refused> {
    if self.refuse.lock().unwrap().contains(target) {
      Err(Refused(target.to_owned()))
    } else {
      Ok(())
    }
  }

  fn sent(&self) -> Vec<Sent> { self.sent.lock().unwrap().clone() }

  fn emails_to(&self, address: &str) -> Vec<Notice> {
    self
      .sent()
      .into_iter()
      .filter_map(|s| match s {
        Sent::Email { to, notice } if to == address => Some(notice),
        _ => None,
      })
      .collect()
  }

  fn pushes_to(&self, contact: &str) -> Vec<Notice> {
    self
      .sent()
      .into_iter()
      .filter_map(|s| match s {
        Sent::Push { to, notice } if to == contact => Some(notice),
        _ => None,
      })
      .collect()
  }

  fn shares(&self) -> Vec<(String, Vec<String>)> {
    self
      .sent()
      .into_iter()
      .filter_map(|s| match s {
        Sent::Share { resource, recipients } => Some((resource, recipients)),
        _ => None,
      })
      .collect()
  }

  fn count(&self, template: &str) -> usize {
    self
      .sent()
      .iter()
      .filter(|s| match s {
        Sent::Push { notice, .. } | Sent::Email { notice, .. } => notice.template() == template,
        Sent::Share { .. } => false,
      })
      .count()
  }
}

impl Notifier for Recorder {
  type Error = Refused;

  async fn push_message(&self, recipient_ref: &str, notice: &Notice) -> Result<(), Refused> {
    self.check(recipient_ref)?;
    self.sent.lock().unwrap().push(Sent::Push {
      to:     recipient_ref.to_owned(),
      notice: notice.clone(),
    });
    Ok(())
  }

  async fn send_email(&self, address: &str, notice: &Notice) -> Result<(), Refused> {
    self.check(address)?;
    self.sent.lock().unwrap().push(Sent::Email {
      to:     address.to_owned(),
      notice: notice.clone(),
    });
    Ok(())
  }

  async fn share_resource(&self, resource_ref: &str, recipients: &[String]) -> Result<(), Refused> {
    for r in recipients {
      self.check(r)?;
    }
    self.sent.lock().unwrap().push(Sent::Share {
      resource:   resource_ref.to_owned(),
      recipients: recipients.to_vec(),
    });
    Ok(())
  }
}

#[derive(Default)]
struct FakeDocs {
  created: AtomicUsize,
}

impl Documents for FakeDocs {
  type Error = Refused;

  async fn create_document(&self, _title: &str, _content: &str) -> Result<DocumentHandle, Refused> {
    let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(DocumentHandle {
      document_ref: format!("doc-{n}"),
      url:          format!("https://docs.example/doc-{n}"),
    })
  }
}

/// Delegating store wrapper: serves a frozen snapshot for reads once
/// [`StaleStore::freeze`] is called, fails reads of `poisoned` ids, reports
/// `garbled` ids as undecodable in multi-row reads, and can hold `scan` until
/// a permit is released.
#[derive(Default)]
struct StaleStore {
  inner:    MemoryStore,
  frozen:   Mutex<Option<Vec<Vault>>>,
  poisoned: Mutex<HashSet<Uuid>>,
  garbled:  Mutex<HashSet<Uuid>>,
  gate:     Option<Arc<Semaphore>>,
}

impl StaleStore {
  async fn freeze(&self) {
    let rows = self.inner.scan().await.unwrap();
    let rows = rows.into_iter().map(Result::unwrap).collect();
    *self.frozen.lock().unwrap() = Some(rows);
  }

  fn poison(&self, id: Uuid) { self.poisoned.lock().unwrap().insert(id); }

  fn garble(&self, id: Uuid) { self.garbled.lock().unwrap().insert(id); }

  fn read_rows(&self, rows: Vec<Vault>) -> Vec<RowRead<StaleError>> {
    let garbled = self.garbled.lock().unwrap();
    rows
      .into_iter()
      .map(|v| {
        if garbled.contains(&v.vault_id) {
          Err(UnreadableRow {
            key:   v.vault_id.to_string(),
            error: StaleError::Garbled(v.vault_id),
          })
        } else {
          Ok(v)
        }
      })
      .collect()
  }

  async fn inner_rows(&self, owner: Option<&OwnerRef>) -> Result<Vec<Vault>, StaleError> {
    let rows = match owner {
      Some(owner) => self.inner.find_by_owner(owner).await?,
      None => self.inner.scan().await?,
    };
    Ok(rows.into_iter().map(Result::unwrap).collect())
  }

  fn frozen_get(&self, id: Uuid) -> Option<Option<Vault>> {
    self
      .frozen
      .lock()
      .unwrap()
      .as_ref()
      .map(|rows| rows.iter().find(|v| v.vault_id == id).cloned())
  }
}

#[derive(Debug, Error)]
enum StaleError {
  #[error(transparent)]
  Memory(#[from] MemoryError),
  #[error("injected read failure for {0}")]
  Poisoned(Uuid),
  #[error("row {0} does not decode")]
  Garbled(Uuid),
}

impl VaultStore for StaleStore {
  type Error = StaleError;

  async fn insert(&self, vault: &Vault) -> Result<(), StaleError> {
    Ok(self.inner.insert(vault).await?)
  }

  async fn get(&self, id: Uuid) -> Result<Option<Vault>, StaleError> {
    if self.poisoned.lock().unwrap().contains(&id) {
      return Err(StaleError::Poisoned(id));
    }
    if let Some(row) = self.frozen_get(id) {
      return Ok(row);
    }
    Ok(self.inner.get(id).await?)
  }

  async fn scan(&self) -> Result<Vec<RowRead<StaleError>>, StaleError> {
    if let Some(gate) = &self.gate {
      let _permit = gate.acquire().await.unwrap();
    }
    let frozen = self.frozen.lock().unwrap().clone();
    let rows = match frozen {
      Some(rows) => rows,
      None => self.inner_rows(None).await?,
    };
    Ok(self.read_rows(rows))
  }

  async fn find_by_owner(&self, owner: &OwnerRef) -> Result<Vec<RowRead<StaleError>>, StaleError> {
    let rows = self.inner_rows(Some(owner)).await?;
    Ok(self.read_rows(rows))
  }

  async fn record_checkin(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Vault>, StaleError> {
    Ok(self.inner.record_checkin(id, at).await?)
  }

  async fn stamp_reminder(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
    expected_version: u64,
  ) -> Result<bool, StaleError> {
    Ok(self.inner.stamp_reminder(id, at, expected_version).await?)
  }

  async fn transition(&self, id: Uuid, from: VaultStatus, to: VaultStatus) -> Result<bool, StaleError> {
    Ok(self.inner.transition(id, from, to).await?)
  }

  async fn mark_activation_notified(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StaleError> {
    Ok(self.inner.mark_activation_notified(id, at).await?)
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

const OWNER: &str = "owner@example.com";
const CONTACT: &str = "U-owner";
const TRUSTEE_A: &str = "alice@example.com";
const TRUSTEE_B: &str = "bob@example.com";

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap() }

fn config() -> EngineConfig {
  EngineConfig {
    owner_email: Some(OWNER.into()),
    public_base_url: "https://vigil.example".into(),
    ..EngineConfig::default()
  }
}

fn engine_with<S: VaultStore>(store: S) -> (Engine<S, Recorder, FakeDocs>, Arc<ManualClock>) {
  let clock  = Arc::new(ManualClock::new(t0()));
  let engine = Engine::new(store, Recorder::default(), FakeDocs::default(), config())
    .unwrap()
    .with_clock(clock.clone());
  (engine, clock)
}

fn engine() -> (Engine<MemoryStore, Recorder, FakeDocs>, Arc<ManualClock>) {
  engine_with(MemoryStore::new())
}

fn new_vault(interval_days: i64, grace_hours: i64) -> NewVault {
  NewVault {
    owner_contact_ref: Some(CONTACT.into()),
    checkin_interval_days: Some(interval_days),
    grace_hours: Some(grace_hours),
    ..NewVault::new("the combination is 12-34-56", vec![
      TRUSTEE_A.into(),
      TRUSTEE_B.into(),
    ])
  }
}

async fn stored<S: VaultStore>(engine: &Engine<S, Recorder, FakeDocs>, id: Uuid) -> Vault {
  engine.get(id).await.unwrap().unwrap()
}

fn at(days: i64, hours: i64) -> DateTime<Utc> { t0() + TimeDelta::days(days) + TimeDelta::hours(hours) }

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_reminder_then_activation() {
  let (engine, clock) = engine();
  let vault = engine.create(None, new_vault(30, 12)).await.unwrap();
  assert_eq!(vault.last_checkin_at, t0());
  assert_eq!(vault.created_at, t0());

  clock.set(at(29, 0));
  let report = engine.reconcile().await.unwrap();
  assert_eq!(report.reminded, 0);
  assert!(engine.notifier().sent().is_empty());

  clock.set(at(30, 1));
  let report = engine.reconcile().await.unwrap();
  assert_eq!(report.reminded, 1);
  let v = stored(&engine, vault.vault_id).await;
  assert_eq!(v.status, VaultStatus::Active);
  assert_eq!(v.last_reminder_at, Some(at(30, 1)));
  assert_eq!(engine.notifier().pushes_to(CONTACT).len(), 1);
  let reminder = engine.notifier().emails_to(OWNER);
  assert_eq!(reminder.len(), 1);
  match &reminder[0] {
    Notice::ReminderAlert { checkin_url, activation_at, .. } => {
      assert!(checkin_url.starts_with("https://vigil.example/checkin?vault_id="));
      assert_eq!(*activation_at, at(30, 12));
    }
    other => panic!("unexpected notice: {other:?}"),
  }

  clock.set(at(30, 13));
  let report = engine.reconcile().await.unwrap();
  assert_eq!(report.activated, 1);
  assert_eq!(report.owner_notified, 1);
  let v = stored(&engine, vault.vault_id).await;
  assert_eq!(v.status, VaultStatus::Activated);
  assert_eq!(v.activated_notified_at, Some(at(30, 13)));

  let n = engine.notifier();
  assert_eq!(n.shares().len(), 2, "document shared once per trustee");
  assert_eq!(n.emails_to(TRUSTEE_A).len(), 1);
  assert_eq!(n.emails_to(TRUSTEE_B).len(), 1);
  assert_eq!(n.count("activation_alert"), 2, "owner notified on push and email");
}

#[tokio::test]
async fn scenario_b_checkin_during_grace_moves_deadline() {
  let (engine, clock) = engine();
  let vault = engine.create(None, new_vault(30, 12)).await.unwrap();

  clock.set(at(30, 1));
  engine.reconcile().await.unwrap();
  assert!(stored(&engine, vault.vault_id).await.last_reminder_at.is_some());

  clock.set(at(30, 5));
  let outcome = engine
    .checkin_owner(&OwnerRef::Contact(CONTACT.into()))
    .await
    .unwrap();
  assert_eq!(outcome.refreshed, vec![vault.vault_id]);

  let v = stored(&engine, vault.vault_id).await;
  assert_eq!(v.last_checkin_at, at(30, 5));
  assert_eq!(v.last_reminder_at, None);
  assert_eq!(v.status, VaultStatus::Active);
  assert_eq!(v.deadline(), at(60, 5));

  clock.set(at(30, 13));
  let report = engine.reconcile().await.unwrap();
  assert_eq!(report.activated, 0);
  assert_eq!(report.reminded, 0);

  clock.set(at(60, 6));
  let report = engine.reconcile().await.unwrap();
  assert_eq!(report.reminded, 1);
}

#[tokio::test]
async fn scenario_c_deactivating_an_activated_vault_fails() {
  let (engine, clock) = engine();
  let vault = engine.create(None, new_vault(1, 1)).await.unwrap();
  clock.set(at(1, 2));
  engine.reconcile().await.unwrap();

  let err = engine
    .deactivate(vault.vault_id, &OwnerRef::Contact(CONTACT.into()))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidState { status: VaultStatus::Activated, .. }));
  assert_eq!(stored(&engine, vault.vault_id).await.status, VaultStatus::Activated);
}

#[tokio::test]
async fn scenario_d_verified_checkin_with_wrong_email_is_unauthorized() {
  let (engine, clock) = engine();
  let vault = engine.create(None, new_vault(30, 12)).await.unwrap();

  clock.set(at(10, 0));
  let err = engine
    .checkin_verified(vault.vault_id, "intruder@example.com")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Unauthorized(id) if id == vault.vault_id));
  assert_eq!(stored(&engine, vault.vault_id).await.last_checkin_at, t0());

  let ok = engine.checkin_verified(vault.vault_id, " OWNER@example.com").await.unwrap();
  assert_eq!(ok.last_checkin_at, at(10, 0));
}

#[tokio::test]
async fn scenario_e_stale_double_sweep_notifies_owner_once() {
  let (engine, clock) = engine_with(StaleStore::default());
  let vault = engine.create(None, new_vault(30, 12)).await.unwrap();

  clock.set(at(31, 0));
  engine.store().freeze().await;

  let first = engine.reconcile().await.unwrap();
  clock.advance(TimeDelta::minutes(1));
  let second = engine.reconcile().await.unwrap();

  assert_eq!(first.activated, 1);
  assert_eq!(first.owner_notified, 1);
  assert_eq!(second.owner_notified, 0);

  let n = engine.notifier();
  assert_eq!(n.shares().len(), 4, "sharing repeats on the stale sweep");
  assert_eq!(n.count("activation_alert"), 2, "one push plus one email, once");

  let row = engine.store().inner.get(vault.vault_id).await.unwrap().unwrap();
  assert_eq!(row.status, VaultStatus::Activated);
  assert_eq!(row.activated_notified_at, Some(at(31, 0)));
}

// ─── Properties ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn activation_notice_is_stamped_once_across_many_sweeps() {
  let (engine, clock) = engine();
  let vault = engine.create(None, new_vault(30, 12)).await.unwrap();

  clock.set(at(31, 0));
  engine.reconcile().await.unwrap();
  for _ in 0..5 {
    clock.advance(TimeDelta::days(1));
    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.activated, 0);
  }

  let v = stored(&engine, vault.vault_id).await;
  assert_eq!(v.activated_notified_at, Some(at(31, 0)));
  assert_eq!(engine.notifier().count("activation_alert"), 2);
  assert_eq!(engine.notifier().shares().len(), 2);
}

#[tokio::test]
async fn reminders_go_out_at_most_once_per_day() {
  let (engine, clock) = engine();
  let vault = engine.create(None, new_vault(30, 96)).await.unwrap();

  // Sweeps every 6 hours across 3 days of grace.
  let mut stamps = Vec::new();
  for step in 0..12 {
    clock.set(at(30, 1) + TimeDelta::hours(6 * step));
    engine.reconcile().await.unwrap();
    let v = stored(&engine, vault.vault_id).await;
    if stamps.last() != v.last_reminder_at.as_ref() {
      stamps.push(v.last_reminder_at.unwrap());
    }
  }

  assert_eq!(stamps.len(), 3);
  for pair in stamps.windows(2) {
    assert!(pair[1] - pair[0] > TimeDelta::hours(24));
  }
  assert_eq!(engine.notifier().emails_to(OWNER).len(), 3);
}

#[tokio::test]
async fn short_grace_sends_at_most_one_reminder() {
  let (engine, clock) = engine();
  engine.create(None, new_vault(7, 2)).await.unwrap();

  clock.set(at(7, 1));
  engine.reconcile().await.unwrap();
  clock.set(at(7, 3));
  let report = engine.reconcile().await.unwrap();

  assert_eq!(report.activated, 1);
  assert_eq!(engine.notifier().count("reminder_alert"), 2, "one push plus one email");
}

#[tokio::test]
async fn checkin_after_activation_is_rejected_loudly() {
  let (engine, clock) = engine();
  let vault = engine.create(None, new_vault(1, 1)).await.unwrap();
  clock.set(at(2, 0));
  engine.reconcile().await.unwrap();

  let err = engine.checkin_verified(vault.vault_id, OWNER).await.unwrap_err();
  assert!(matches!(err, Error::InvalidState { status: VaultStatus::Activated, .. }));

  let outcome = engine
    .checkin_owner(&OwnerRef::Contact(CONTACT.into()))
    .await
    .unwrap();
  assert!(outcome.refreshed.is_empty());
  assert_eq!(stored(&engine, vault.vault_id).await.status, VaultStatus::Activated);
}

#[tokio::test]
async fn verified_checkin_of_unknown_vault_is_not_found() {
  let (engine, _) = engine();
  let err = engine.checkin_verified(Uuid::new_v4(), OWNER).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn checkin_owner_refreshes_every_active_vault() {
  let (engine, clock) = engine();
  let a = engine.create(None, new_vault(30, 12)).await.unwrap();
  let b = engine.create(None, new_vault(10, 12)).await.unwrap();
  let c = engine.create(None, new_vault(10, 12)).await.unwrap();
  engine
    .deactivate(c.vault_id, &OwnerRef::Contact(CONTACT.into()))
    .await
    .unwrap();

  clock.set(at(5, 0));
  let outcome = engine
    .checkin_owner(&OwnerRef::Contact(CONTACT.into()))
    .await
    .unwrap();

  assert_eq!(outcome.refreshed, vec![a.vault_id, b.vault_id]);
  assert_eq!(stored(&engine, c.vault_id).await.last_checkin_at, t0());
}

#[tokio::test]
async fn checkin_for_unknown_owner_is_a_noop() {
  let (engine, _) = engine();
  engine.create(None, new_vault(30, 12)).await.unwrap();
  let outcome = engine
    .checkin_owner(&OwnerRef::Contact("U-stranger".into()))
    .await
    .unwrap();
  assert!(outcome.refreshed.is_empty());
}

#[tokio::test]
async fn deactivated_vaults_are_never_released() {
  let (engine, clock) = engine();
  let vault = engine.create(None, new_vault(1, 1)).await.unwrap();

  let err = engine
    .deactivate(vault.vault_id, &OwnerRef::Contact("U-stranger".into()))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Unauthorized(_)));

  let v = engine
    .deactivate(vault.vault_id, &OwnerRef::Email(OWNER.into()))
    .await
    .unwrap();
  assert_eq!(v.status, VaultStatus::Deactivated);

  let again = engine
    .deactivate(vault.vault_id, &OwnerRef::Email(OWNER.into()))
    .await
    .unwrap_err();
  assert!(matches!(again, Error::InvalidState { status: VaultStatus::Deactivated, .. }));

  clock.set(at(30, 0));
  let report = engine.reconcile().await.unwrap();
  assert_eq!(report.skipped, 1);
  assert!(engine.notifier().sent().is_empty());
}

// ─── Creation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn creation_without_owner_identity_fails_closed() {
  let clock  = Arc::new(ManualClock::new(t0()));
  let engine = Engine::new(
    MemoryStore::new(),
    Recorder::default(),
    FakeDocs::default(),
    EngineConfig { owner_email: None, ..config() },
  )
  .unwrap()
  .with_clock(clock);

  let err = engine.create(Some("   "), new_vault(30, 12)).await.unwrap_err();
  assert!(matches!(err, Error::ConfigurationMissing));
  assert!(engine.store().scan().await.unwrap().is_empty());

  let v = engine
    .create(Some("session@example.com"), new_vault(30, 12))
    .await
    .unwrap();
  assert_eq!(v.owner_email, "session@example.com");
}

#[tokio::test]
async fn creation_defaults_and_normalises_input() {
  let (engine, _) = engine();
  let input = NewVault {
    checkin_interval_days: Some(-3),
    grace_hours: Some(0),
    trustees: vec![" a@example.com , b@example.com".into(), "c@example.com".into()],
    attachment_ref: Some("  ".into()),
    ..NewVault::default()
  };
  let v = engine.create(None, input).await.unwrap();

  assert_eq!(v.checkin_interval_days, 30);
  assert_eq!(v.grace_hours, 12);
  assert_eq!(v.trustees, vec!["a@example.com", "b@example.com", "c@example.com"]);
  assert_eq!(v.attachment_ref, None);
  assert_eq!(v.owner_email, OWNER);
  assert_eq!(v.status, VaultStatus::Active);
  assert_eq!(v.document_url, "https://docs.example/doc-1");
}

#[tokio::test]
async fn creation_stores_a_trimmed_owner_email() {
  let (engine, _) = engine();
  let v = engine
    .create(Some("\tPadded@Example.com \n"), new_vault(30, 12))
    .await
    .unwrap();
  assert_eq!(v.owner_email, "Padded@Example.com");
  assert_eq!(stored(&engine, v.vault_id).await.owner_email, "Padded@Example.com");

  let found = engine
    .list(&OwnerRef::Email("padded@example.com".into()))
    .await
    .unwrap();
  assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn creation_rejects_bad_trustees() {
  let (engine, _) = engine();
  let err = engine
    .create(None, NewVault::new("x", vec!["not-an-address".into()]))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Invalid(_)));

  let err = engine.create(None, NewVault::new("x", vec![])).await.unwrap_err();
  assert!(matches!(err, Error::Invalid(_)));
}

// ─── Failure isolation ───────────────────────────────────────────────────────

#[tokio::test]
async fn share_failures_are_reported_and_do_not_block_release() {
  let (engine, clock) = engine();
  let vault = engine
    .create(None, NewVault {
      attachment_ref: Some("folder-9".into()),
      ..new_vault(30, 12)
    })
    .await
    .unwrap();
  engine.notifier().refuse(TRUSTEE_A);
  engine.notifier().refuse(CONTACT);

  clock.set(at(31, 0));
  let report = engine.reconcile().await.unwrap();

  assert_eq!(report.activated, 1);
  assert_eq!(stored(&engine, vault.vault_id).await.status, VaultStatus::Activated);
  // Bob still got both grants.
  assert_eq!(engine.notifier().shares().len(), 2);

  let failures: Vec<_> = report
    .delivery_failures
    .iter()
    .map(|f| (f.channel, f.target.as_str()))
    .collect();
  assert!(failures.contains(&(Channel::Share, "doc-1")));
  assert!(failures.contains(&(Channel::Share, "folder-9")));
  assert!(failures.contains(&(Channel::Email, TRUSTEE_A)));
  assert!(failures.contains(&(Channel::Push, CONTACT)));

  // Push to the owner failed; email still went out and carries the errors.
  let owner = engine.notifier().emails_to(OWNER);
  assert_eq!(owner.len(), 1);
  match &owner[0] {
    Notice::ActivationAlert { share_errors, .. } => {
      assert_eq!(share_errors.len(), 2);
      assert!(share_errors[0].contains(TRUSTEE_A));
    }
    other => panic!("unexpected notice: {other:?}"),
  }
  assert!(stored(&engine, vault.vault_id).await.activated_notified_at.is_some());
}

#[tokio::test]
async fn one_failing_row_does_not_stop_the_sweep() {
  let (engine, clock) = engine_with(StaleStore::default());
  let broken = engine.create(None, new_vault(30, 12)).await.unwrap();
  let healthy = engine.create(None, new_vault(30, 12)).await.unwrap();
  engine.store().poison(broken.vault_id);

  clock.set(at(31, 0));
  let report = engine.reconcile().await.unwrap();

  assert_eq!(report.scanned, 2);
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].vault_id, Some(broken.vault_id));
  assert_eq!(report.activated, 1);
  let row = engine.store().inner.get(healthy.vault_id).await.unwrap().unwrap();
  assert_eq!(row.status, VaultStatus::Activated);
}

#[tokio::test]
async fn undecodable_row_is_reported_and_the_rest_still_release() {
  let (engine, clock) = engine_with(StaleStore::default());
  let broken = engine.create(None, new_vault(30, 12)).await.unwrap();
  let healthy = engine.create(None, new_vault(30, 12)).await.unwrap();
  engine.store().garble(broken.vault_id);

  clock.set(at(40, 0));
  let report = engine.reconcile().await.unwrap();

  assert_eq!(report.scanned, 2);
  assert_eq!(report.activated, 1);
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].vault_id, Some(broken.vault_id));
  assert_eq!(report.failures[0].key, broken.vault_id.to_string());
  assert!(report.failures[0].error.contains("does not decode"));

  let row = engine.store().inner.get(healthy.vault_id).await.unwrap().unwrap();
  assert_eq!(row.status, VaultStatus::Activated);
  let row = engine.store().inner.get(broken.vault_id).await.unwrap().unwrap();
  assert_eq!(row.status, VaultStatus::Active);
}

#[tokio::test]
async fn owner_reads_skip_undecodable_rows() {
  let (engine, clock) = engine_with(StaleStore::default());
  let broken = engine.create(None, new_vault(30, 12)).await.unwrap();
  let healthy = engine.create(None, new_vault(30, 12)).await.unwrap();
  engine.store().garble(broken.vault_id);

  let owner = OwnerRef::Contact(CONTACT.into());
  let listed: Vec<Uuid> = engine
    .list(&owner)
    .await
    .unwrap()
    .iter()
    .map(|v| v.vault_id)
    .collect();
  assert_eq!(listed, vec![healthy.vault_id]);

  clock.set(at(5, 0));
  let outcome = engine.checkin_owner(&owner).await.unwrap();
  assert_eq!(outcome.refreshed, vec![healthy.vault_id]);
}

#[tokio::test]
async fn interrupted_release_still_notifies_owner_once() {
  let (engine, clock) = engine();
  let vault = engine.create(None, new_vault(30, 12)).await.unwrap();
  // A sweep that flipped the status and stopped before claiming the notice.
  assert!(
    engine
      .store()
      .transition(vault.vault_id, VaultStatus::Active, VaultStatus::Activated)
      .await
      .unwrap()
  );

  clock.set(at(31, 0));
  let first = engine.reconcile().await.unwrap();
  assert_eq!(first.owner_notified, 1);
  assert_eq!(first.activated, 0);
  assert_eq!(first.skipped, 0);

  for _ in 0..2 {
    clock.advance(TimeDelta::hours(1));
    let again = engine.reconcile().await.unwrap();
    assert_eq!(again.owner_notified, 0);
    assert_eq!(again.skipped, 1);
  }

  let row = stored(&engine, vault.vault_id).await;
  assert_eq!(row.status, VaultStatus::Activated);
  assert_eq!(row.activated_notified_at, Some(at(31, 0)));

  let n = engine.notifier();
  assert_eq!(n.count("activation_alert"), 2, "one push plus one email");
  assert_eq!(n.emails_to(OWNER).len(), 1);
  assert!(n.shares().is_empty(), "release is not repeated");
  assert!(n.emails_to(TRUSTEE_A).is_empty());
}

#[tokio::test]
async fn reminder_stamp_loses_to_a_concurrent_checkin() {
  let (engine, clock) = engine_with(StaleStore::default());
  let vault = engine.create(None, new_vault(30, 12)).await.unwrap();

  clock.set(at(30, 2));
  engine.store().freeze().await;
  // Lands after the sweep's scan snapshot was taken.
  engine
    .store()
    .inner
    .record_checkin(vault.vault_id, at(30, 2))
    .await
    .unwrap();

  let report = engine.reconcile().await.unwrap();
  assert_eq!(report.reminded, 0);
  assert_eq!(report.conflicts, 1);
  let row = engine.store().inner.get(vault.vault_id).await.unwrap().unwrap();
  assert_eq!(row.last_reminder_at, None);
}

#[tokio::test]
async fn overlapping_sweeps_are_refused() {
  let gate = Arc::new(Semaphore::new(0));
  let (engine, _) = engine_with(StaleStore {
    gate: Some(gate.clone()),
    ..StaleStore::default()
  });

  let first  = engine.reconcile();
  let second = async {
    let r = engine.reconcile().await;
    gate.add_permits(2);
    r
  };
  let (first, second) = tokio::join!(first, second);

  assert!(first.is_ok());
  assert!(matches!(second, Err(Error::SweepInProgress)));
  // The guard is released once the first sweep finishes.
  assert!(engine.reconcile().await.is_ok());
}

// ─── Commands ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_withholds_link_when_vaults_exist() {
  let (engine, _) = engine();
  let reply = engine.execute(CONTACT, Command::Register).await.unwrap();
  assert!(matches!(
    reply,
    Notice::RegisterPrompt { onboarding_url: Some(ref u), active_vaults: 0 }
      if u == "https://vigil.example/onboard?contact=U-owner"
  ));

  engine.create(None, new_vault(30, 12)).await.unwrap();
  let reply = engine.execute(CONTACT, Command::Register).await.unwrap();
  assert_eq!(reply, Notice::RegisterPrompt { onboarding_url: None, active_vaults: 1 });

  let reply = engine.execute(CONTACT, Command::Create).await.unwrap();
  assert!(matches!(reply, Notice::RegisterPrompt { onboarding_url: Some(_), active_vaults: 1 }));
}

#[tokio::test]
async fn list_checkin_and_deactivate_commands() {
  let (engine, clock) = engine();
  let vault = engine.create(None, new_vault(30, 12)).await.unwrap();

  let reply = engine.execute(CONTACT, Command::List).await.unwrap();
  match reply {
    Notice::VaultList { vaults } => {
      assert_eq!(vaults.len(), 1);
      assert_eq!(vaults[0].vault_id, vault.vault_id);
      assert_eq!(vaults[0].trustee_count, 2);
    }
    other => panic!("unexpected notice: {other:?}"),
  }

  clock.set(at(3, 0));
  let reply = engine.execute(CONTACT, Command::Checkin).await.unwrap();
  assert_eq!(reply, Notice::CheckinConfirm { refreshed: vec![vault.vault_id] });

  let reply = engine
    .execute("U-stranger", Command::Deactivate(vault.vault_id))
    .await
    .unwrap();
  assert!(matches!(reply, Notice::CommandRejected { .. }));

  let reply = engine
    .execute(CONTACT, Command::Deactivate(vault.vault_id))
    .await
    .unwrap();
  assert_eq!(reply, Notice::DeactivationConfirm { vault_id: vault.vault_id });

  assert_eq!(engine.execute(CONTACT, Command::Help).await.unwrap(), Notice::Help);
}
