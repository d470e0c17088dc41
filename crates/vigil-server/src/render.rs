//! Plain-text rendering of [`Notice`] templates for push and email delivery.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use vigil_core::notify::Notice;

fn when(at: DateTime<Utc>) -> String { at.format("%Y-%m-%d %H:%M UTC").to_string() }

/// One-line subject for email delivery.
pub fn subject(notice: &Notice) -> String {
  match notice {
    Notice::RegisterPrompt { .. } => "Create your vault".into(),
    Notice::ReminderAlert { activation_at, .. } => {
      format!("Check-in required before {}", when(*activation_at))
    }
    Notice::ActivationAlert { .. } => "Your vault has been released".into(),
    Notice::TrusteeRelease { owner_email, .. } => {
      format!("{owner_email} has shared a document with you")
    }
    Notice::DeactivationConfirm { .. } => "Vault deactivated".into(),
    Notice::CheckinConfirm { .. } => "Check-in received".into(),
    Notice::VaultList { .. } => "Your vaults".into(),
    Notice::CommandRejected { .. } => "Request refused".into(),
    Notice::Help => "How to use this service".into(),
  }
}

/// Message body, signed with `sender`.
pub fn body(notice: &Notice, sender: &str) -> String {
  let mut out = String::new();
  // Writing to a String cannot fail.
  let _ = write_body(&mut out, notice);
  let _ = write!(out, "\n\n{sender}");
  out
}

fn write_body(out: &mut String, notice: &Notice) -> std::fmt::Result {
  match notice {
    Notice::RegisterPrompt { onboarding_url: Some(url), .. } => {
      write!(out, "Fill in your vault details here:\n{url}")
    }
    Notice::RegisterPrompt { onboarding_url: None, active_vaults } => write!(
      out,
      "You already have {active_vaults} active vault(s). Reply \"create\" to make another."
    ),
    Notice::ReminderAlert {
      checkin_interval_days,
      grace_hours,
      activation_at,
      checkin_url,
      ..
    } => write!(
      out,
      "You have not checked in for {checkin_interval_days} days. Your vault will be \
       released to its trustees at {} ({grace_hours}h grace period).\n\n\
       Check in now: {checkin_url}",
      when(*activation_at)
    ),
    Notice::ActivationAlert { document_url, trustees, share_errors, .. } => {
      write!(
        out,
        "Your vault was released because no check-in arrived in time.\n\
         Document: {document_url}\nShared with: {}",
        trustees.join(", ")
      )?;
      write_errors(out, share_errors)
    }
    Notice::TrusteeRelease {
      owner_email,
      document_url,
      attachment_ref,
      share_errors,
      ..
    } => {
      write!(
        out,
        "{owner_email} named you as a trustee. Their document is now available:\n{document_url}"
      )?;
      if let Some(attachment) = attachment_ref {
        write!(out, "\nAttachment: {attachment}")?;
      }
      write_errors(out, share_errors)
    }
    Notice::DeactivationConfirm { vault_id } => {
      write!(out, "Vault {vault_id} is deactivated and will never be released.")
    }
    Notice::CheckinConfirm { refreshed } if refreshed.is_empty() => {
      write!(out, "You have no active vaults to check in.")
    }
    Notice::CheckinConfirm { refreshed } => write!(
      out,
      "Check-in successful. {} vault(s) renewed.",
      refreshed.len()
    ),
    Notice::VaultList { vaults } if vaults.is_empty() => write!(out, "You have no vaults."),
    Notice::VaultList { vaults } => {
      for (i, v) in vaults.iter().enumerate() {
        if i > 0 {
          out.push('\n');
        }
        write!(
          out,
          "{} [{}] {} trustee(s), next deadline {}",
          v.vault_id,
          v.status,
          v.trustee_count,
          when(v.deadline)
        )?;
      }
      Ok(())
    }
    Notice::CommandRejected { command, reason } => {
      write!(out, "Could not run \"{command}\": {reason}")
    }
    Notice::Help => write!(
      out,
      "Commands:\n  register  create a new vault\n  checkin   renew all your vaults\n  \
       list      show your vaults\n  deactivate <id>  withdraw a vault"
    ),
  }
}

fn write_errors(out: &mut String, errors: &[String]) -> std::fmt::Result {
  if errors.is_empty() {
    return Ok(());
  }
  write!(out, "\n\nSome access grants failed:")?;
  for e in errors {
    write!(out, "\n- {e}")?;
  }
  Ok(())
}
