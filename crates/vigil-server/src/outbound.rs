//! [`Outbound`]: the notifier and document store chosen at startup.

use vigil_core::notify::{DocumentHandle, Documents, Notice, Notifier};

use crate::{Result, ServerConfig, local::LocalOutbox, relay::RelayClient};

#[derive(Clone)]
pub enum Outbound {
  Relay(RelayClient),
  Local(LocalOutbox),
}

impl Outbound {
  /// The relay when `relay_url` is set, the local outbox otherwise.
  /// `documents_dir` must already be expanded.
  pub fn from_config(cfg: &ServerConfig) -> reqwest::Result<Self> {
    match &cfg.relay_url {
      Some(url) => Ok(Self::Relay(RelayClient::new(
        url.clone(),
        cfg.relay_token.clone(),
        cfg.sender_name.clone(),
      )?)),
      None => Ok(Self::Local(LocalOutbox::new(
        cfg.documents_dir.clone(),
        cfg.sender_name.clone(),
      ))),
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Self::Relay(_) => "relay",
      Self::Local(_) => "local",
    }
  }
}

impl Notifier for Outbound {
  type Error = crate::Error;

  async fn push_message(&self, recipient_ref: &str, notice: &Notice) -> Result<()> {
    match self {
      Self::Relay(r) => r.push_message(recipient_ref, notice).await,
      Self::Local(l) => l.push_message(recipient_ref, notice).await,
    }
  }

  async fn send_email(&self, address: &str, notice: &Notice) -> Result<()> {
    match self {
      Self::Relay(r) => r.send_email(address, notice).await,
      Self::Local(l) => l.send_email(address, notice).await,
    }
  }

  async fn share_resource(&self, resource_ref: &str, recipients: &[String]) -> Result<()> {
    match self {
      Self::Relay(r) => r.share_resource(resource_ref, recipients).await,
      Self::Local(l) => l.share_resource(resource_ref, recipients).await,
    }
  }
}

impl Documents for Outbound {
  type Error = crate::Error;

  async fn create_document(&self, title: &str, content: &str) -> Result<DocumentHandle> {
    match self {
      Self::Relay(r) => r.create_document(title, content).await,
      Self::Local(l) => l.create_document(title, content).await,
    }
  }
}
