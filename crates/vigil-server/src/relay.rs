//! [`RelayClient`]: delivers notices, grants and documents through an
//! external HTTP relay.
//!
//! | Call | Endpoint | Body |
//! |------|----------|------|
//! | push | `POST {relay}/push` | `{to, template, text, notice}` |
//! | email | `POST {relay}/email` | `{to, sender_name, subject, body, notice}` |
//! | share | `POST {relay}/share` | `{resource, recipients}` |
//! | document | `POST {relay}/documents` | `{title, content}` → `{document_ref, url}` |
//!
//! Any non-2xx answer is an error.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;
use vigil_core::notify::{DocumentHandle, Documents, Notice, Notifier};

use crate::{Error, Result, render};

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct RelayClient {
  client:      Client,
  base_url:    String,
  token:       Option<String>,
  sender_name: String,
}

impl RelayClient {
  pub fn new(
    base_url: impl Into<String>,
    token: Option<String>,
    sender_name: impl Into<String>,
  ) -> reqwest::Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self {
      client,
      base_url: base_url.into(),
      token,
      sender_name: sender_name.into(),
    })
  }

  async fn post(&self, endpoint: &'static str, body: Value) -> Result<reqwest::Response> {
    let url = format!("{}{endpoint}", self.base_url.trim_end_matches('/'));
    let mut req = self.client.post(url).json(&body);
    if let Some(token) = &self.token {
      req = req.bearer_auth(token);
    }

    let resp = req
      .send()
      .await
      .map_err(|source| Error::Relay { endpoint, source })?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(Error::RelayStatus { endpoint, status, body });
    }
    debug!(endpoint, %status, "relay call succeeded");
    Ok(resp)
  }
}

impl Notifier for RelayClient {
  type Error = Error;

  async fn push_message(&self, recipient_ref: &str, notice: &Notice) -> Result<()> {
    self
      .post(
        "/push",
        json!({
          "to":       recipient_ref,
          "template": notice.template(),
          "text":     render::body(notice, &self.sender_name),
          "notice":   notice,
        }),
      )
      .await?;
    Ok(())
  }

  async fn send_email(&self, address: &str, notice: &Notice) -> Result<()> {
    self
      .post(
        "/email",
        json!({
          "to":          address,
          "sender_name": self.sender_name,
          "subject":     render::subject(notice),
          "body":        render::body(notice, &self.sender_name),
          "notice":      notice,
        }),
      )
      .await?;
    Ok(())
  }

  async fn share_resource(&self, resource_ref: &str, recipients: &[String]) -> Result<()> {
    self
      .post(
        "/share",
        json!({ "resource": resource_ref, "recipients": recipients }),
      )
      .await?;
    Ok(())
  }
}

impl Documents for RelayClient {
  type Error = Error;

  async fn create_document(&self, title: &str, content: &str) -> Result<DocumentHandle> {
    let resp = self
      .post("/documents", json!({ "title": title, "content": content }))
      .await?;
    resp
      .json()
      .await
      .map_err(|source| Error::Relay { endpoint: "/documents", source })
  }
}
