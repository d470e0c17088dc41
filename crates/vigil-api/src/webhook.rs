//! `POST /webhook`: messaging-platform event intake.
//!
//! Accepts the platform's event batch:
//!
//! ```json
//! {"events": [
//!   {"type": "message",  "source": {"userId": "U1"}, "message": {"type": "text", "text": "checkin"}},
//!   {"type": "postback", "source": {"userId": "U1"}, "postback": {"data": "action=checkin"}}
//! ]}
//! ```
//!
//! Each event becomes a [`Command`], runs through [`Engine::execute`], and the
//! reply is pushed back to the sender. The platform retries on anything but
//! `200`, so this handler always answers `200`; failures are logged.
//!
//! [`Engine::execute`]: vigil_core::Engine::execute

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use vigil_core::{
  command::Command,
  notify::{Documents, Notifier},
  store::VaultStore,
};

use crate::AppState;

// ─── Payload ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
  #[serde(default)]
  pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
pub struct Event {
  #[serde(rename = "type")]
  pub kind:     String,
  pub source:   Option<Source>,
  pub message:  Option<Message>,
  pub postback: Option<Postback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
  pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
  #[serde(rename = "type")]
  pub kind: String,
  pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Postback {
  pub data: String,
}

impl Event {
  /// The sender and the command this event carries, if it is one we act on.
  fn command(&self) -> Option<(&str, Command)> {
    let user = self.source.as_ref()?.user_id.as_deref()?;
    let command = match self.kind.as_str() {
      "message" => {
        let message = self.message.as_ref()?;
        if message.kind != "text" {
          return None;
        }
        Command::parse_text(message.text.as_deref()?)
      }
      "postback" => Command::parse_postback(&self.postback.as_ref()?.data)?,
      _ => return None,
    };
    Some((user, command))
  }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WebhookAck {
  pub received: usize,
  pub handled:  usize,
}

// ─── Handler ─────────────────────────────────────────────────────────────────

pub async fn handle<S, N, D>(
  State(state): State<AppState<S, N, D>>,
  body: String,
) -> Json<WebhookAck>
where
  S: VaultStore + 'static,
  N: Notifier + 'static,
  D: Documents + 'static,
{
  let payload: WebhookPayload = match serde_json::from_str(&body) {
    Ok(p) => p,
    Err(e) => {
      warn!(error = %e, "ignoring malformed webhook payload");
      return Json(WebhookAck::default());
    }
  };

  let mut ack = WebhookAck {
    received: payload.events.len(),
    handled:  0,
  };

  for event in &payload.events {
    let Some((user, command)) = event.command() else {
      debug!(kind = %event.kind, "ignoring webhook event");
      continue;
    };

    let reply = match state.engine.execute(user, command).await {
      Ok(reply) => reply,
      Err(e) => {
        error!(%user, %command, error = %e, "command failed");
        continue;
      }
    };

    if let Err(e) = state.engine.notifier().push_message(user, &reply).await {
      warn!(%user, template = reply.template(), error = %e, "reply delivery failed");
    }
    ack.handled += 1;
  }

  Json(ack)
}
