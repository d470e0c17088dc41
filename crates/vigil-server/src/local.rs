//! [`LocalOutbox`]: the adapter used when no relay is configured.
//!
//! Notices and grants are written to the log instead of being delivered, and
//! documents are stored as text files under a local directory. Good enough
//! for a single-machine setup or a dry run.

use std::path::PathBuf;

use tracing::info;
use uuid::Uuid;
use vigil_core::notify::{DocumentHandle, Documents, Notice, Notifier};

use crate::{Result, render};

#[derive(Debug, Clone)]
pub struct LocalOutbox {
  documents_dir: PathBuf,
  sender_name:   String,
}

impl LocalOutbox {
  pub fn new(documents_dir: impl Into<PathBuf>, sender_name: impl Into<String>) -> Self {
    Self {
      documents_dir: documents_dir.into(),
      sender_name:   sender_name.into(),
    }
  }
}

impl Notifier for LocalOutbox {
  type Error = crate::Error;

  async fn push_message(&self, recipient_ref: &str, notice: &Notice) -> Result<()> {
    info!(
      channel = "push",
      to = recipient_ref,
      template = notice.template(),
      text = %render::body(notice, &self.sender_name),
      "outbound message"
    );
    Ok(())
  }

  async fn send_email(&self, address: &str, notice: &Notice) -> Result<()> {
    info!(
      channel = "email",
      to = address,
      subject = %render::subject(notice),
      text = %render::body(notice, &self.sender_name),
      "outbound message"
    );
    Ok(())
  }

  async fn share_resource(&self, resource_ref: &str, recipients: &[String]) -> Result<()> {
    info!(resource = resource_ref, recipients = ?recipients, "resource shared");
    Ok(())
  }
}

impl Documents for LocalOutbox {
  type Error = crate::Error;

  async fn create_document(&self, title: &str, content: &str) -> Result<DocumentHandle> {
    tokio::fs::create_dir_all(&self.documents_dir).await?;

    let id   = Uuid::new_v4();
    let path = self.documents_dir.join(format!("{id}.txt"));
    tokio::fs::write(&path, format!("{title}\n\n{content}\n")).await?;

    info!(path = %path.display(), "document stored");
    Ok(DocumentHandle {
      document_ref: id.to_string(),
      url:          format!("file://{}", path.display()),
    })
  }
}
