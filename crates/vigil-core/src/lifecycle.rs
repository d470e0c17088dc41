//! The pure half of the state machine: given a vault and the current time,
//! decide what the reconciliation pass should do with it.
//!
//! Nothing here touches the store or the clock. The engine feeds in a row and
//! `now`, acts on the returned [`Assessment`], and re-assesses a fresh read
//! before anything irreversible.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::vault::{Vault, VaultStatus};

/// Minimum spacing between two reminders for the same vault.
pub const REMINDER_INTERVAL_HOURS: i64 = 24;

/// Outcome of evaluating one vault at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assessment {
  /// Terminal status with nothing left to do.
  Dormant { status: VaultStatus },
  /// Released, but no sweep has claimed the owner's activation notice yet.
  /// Left behind when a sweep stops between the status flip and the claim.
  Unannounced,
  /// Deadline not reached yet.
  Current { deadline: DateTime<Utc> },
  /// In the grace window and the last reminder is stale.
  Remind {
    deadline:   DateTime<Utc>,
    activation: DateTime<Utc>,
  },
  /// In the grace window, but a reminder went out less than
  /// [`REMINDER_INTERVAL_HOURS`] ago.
  ReminderRecent {
    activation:          DateTime<Utc>,
    next_reminder_after: DateTime<Utc>,
  },
  /// Grace period elapsed: release to the trustees.
  Activate { activation: DateTime<Utc> },
}

impl Assessment {
  pub fn is_activation(&self) -> bool { matches!(self, Self::Activate { .. }) }
}

pub fn assess(vault: &Vault, now: DateTime<Utc>) -> Assessment {
  if vault.status.is_terminal() {
    if vault.status == VaultStatus::Activated && vault.activated_notified_at.is_none() {
      return Assessment::Unannounced;
    }
    return Assessment::Dormant { status: vault.status };
  }

  let deadline   = vault.deadline();
  let activation = vault.activation_time();

  if now >= activation {
    return Assessment::Activate { activation };
  }
  if now < deadline {
    return Assessment::Current { deadline };
  }

  match vault.last_reminder_at {
    Some(last) if !reminder_due(Some(last), now) => Assessment::ReminderRecent {
      activation,
      next_reminder_after: last
        .checked_add_signed(reminder_interval())
        .unwrap_or(DateTime::<Utc>::MAX_UTC),
    },
    _ => Assessment::Remind { deadline, activation },
  }
}

/// A reminder is due when none was sent yet, or the last one is strictly
/// more than [`REMINDER_INTERVAL_HOURS`] old.
pub fn reminder_due(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
  match last {
    None => true,
    Some(at) => now.signed_duration_since(at) > reminder_interval(),
  }
}

fn reminder_interval() -> TimeDelta { TimeDelta::hours(REMINDER_INTERVAL_HOURS) }
