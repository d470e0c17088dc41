//! Inbound owner commands, as typed text or as structured postbacks.
//!
//! | Text | Postback | Command |
//! |------|----------|---------|
//! | `register` | | [`Command::Register`] |
//! | `create` | | [`Command::Create`] |
//! | `checkin` | `action=checkin` | [`Command::Checkin`] |
//! | `list` | | [`Command::List`] |
//! | `deactivate <id>` | `action=deactivate&vaultId=<id>` | [`Command::Deactivate`] |
//!
//! Anything else parses to [`Command::Help`].

use std::fmt;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
  Register,
  Create,
  Checkin,
  List,
  Deactivate(Uuid),
  Help,
}

impl Command {
  pub fn parse_text(text: &str) -> Self {
    let lowered = text.trim().to_ascii_lowercase();
    let mut words = lowered.split_whitespace();
    match (words.next(), words.next(), words.next()) {
      (Some("register"), None, _) => Self::Register,
      (Some("create"), None, _) => Self::Create,
      (Some("checkin" | "check-in"), None, _) => Self::Checkin,
      (Some("list"), None, _) => Self::List,
      (Some("deactivate"), Some(id), None) => {
        Uuid::parse_str(id).map_or(Self::Help, Self::Deactivate)
      }
      _ => Self::Help,
    }
  }

  /// Parse `key=value&key=value` postback data. Returns `None` for actions
  /// this service does not know, so the caller can ignore them silently.
  pub fn parse_postback(data: &str) -> Option<Self> {
    let mut action   = None;
    let mut vault_id = None;
    for pair in data.split('&') {
      match pair.split_once('=') {
        Some(("action", v)) => action = Some(v),
        Some(("vaultId" | "vault_id", v)) => vault_id = Some(v),
        _ => {}
      }
    }

    match action? {
      "checkin" => Some(Self::Checkin),
      "deactivate" => Uuid::parse_str(vault_id?).ok().map(Self::Deactivate),
      _ => None,
    }
  }
}

impl fmt::Display for Command {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Register => f.write_str("register"),
      Self::Create => f.write_str("create"),
      Self::Checkin => f.write_str("checkin"),
      Self::List => f.write_str("list"),
      Self::Deactivate(id) => write!(f, "deactivate {id}"),
      Self::Help => f.write_str("help"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn text_commands_are_case_insensitive() {
    assert_eq!(Command::parse_text("  Register "), Command::Register);
    assert_eq!(Command::parse_text("CHECKIN"), Command::Checkin);
    assert_eq!(Command::parse_text("list"), Command::List);
    assert_eq!(Command::parse_text("hello there"), Command::Help);
  }

  #[test]
  fn deactivate_requires_a_valid_id() {
    let id = Uuid::new_v4();
    assert_eq!(
      Command::parse_text(&format!("deactivate {id}")),
      Command::Deactivate(id)
    );
    assert_eq!(Command::parse_text("deactivate nope"), Command::Help);
    assert_eq!(Command::parse_text("deactivate"), Command::Help);
  }

  #[test]
  fn postbacks() {
    let id = Uuid::new_v4();
    assert_eq!(Command::parse_postback("action=checkin"), Some(Command::Checkin));
    assert_eq!(
      Command::parse_postback(&format!("action=deactivate&vaultId={id}")),
      Some(Command::Deactivate(id))
    );
    assert_eq!(Command::parse_postback("action=deactivate"), None);
    assert_eq!(Command::parse_postback("action=dance"), None);
    assert_eq!(Command::parse_postback(""), None);
  }
}
