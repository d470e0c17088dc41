//! Engine configuration.
//!
//! Built once at startup, validated once, then passed into
//! [`crate::Engine::new`]. Nothing in the engine reads configuration from the
//! environment at call time.

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::{
  Error, Result,
  vault::{DEFAULT_CHECKIN_INTERVAL_DAYS, DEFAULT_GRACE_HOURS},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
  /// Owner identity used when a creation request carries no session email.
  /// Leaving both unset makes creation fail closed.
  #[serde(default)]
  pub owner_email:                   Option<String>,
  /// Public base URL of the HTTP surface; check-in and onboarding links are
  /// built from it.
  pub public_base_url:               String,
  #[serde(default = "default_interval")]
  pub default_checkin_interval_days: u32,
  #[serde(default = "default_grace")]
  pub default_grace_hours:           u32,
}

fn default_interval() -> u32 { DEFAULT_CHECKIN_INTERVAL_DAYS }
fn default_grace() -> u32 { DEFAULT_GRACE_HOURS }

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      owner_email:                   None,
      public_base_url:               "http://localhost:8080".to_string(),
      default_checkin_interval_days: DEFAULT_CHECKIN_INTERVAL_DAYS,
      default_grace_hours:           DEFAULT_GRACE_HOURS,
    }
  }
}

impl EngineConfig {
  pub fn validate(&self) -> Result<()> {
    let base = self.base_url()?;
    if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
      return Err(Error::Invalid(format!(
        "public_base_url must be an http(s) URL, got {:?}",
        self.public_base_url
      )));
    }
    if self.default_checkin_interval_days == 0 || self.default_grace_hours == 0 {
      return Err(Error::Invalid(
        "default check-in interval and grace period must be positive".into(),
      ));
    }
    if let Some(email) = &self.owner_email
      && !email.contains('@')
    {
      return Err(Error::Invalid(format!("owner_email {email:?} is not an address")));
    }
    Ok(())
  }

  /// `GET {base}/checkin?vault_id=…&email=…`: the identity-proof link.
  pub fn checkin_link(&self, vault_id: Uuid, owner_email: &str) -> Result<String> {
    let mut url = self.endpoint("checkin")?;
    url
      .query_pairs_mut()
      .append_pair("vault_id", &vault_id.to_string())
      .append_pair("email", owner_email);
    Ok(url.into())
  }

  /// Onboarding form link carrying the messaging contact ref.
  pub fn onboarding_link(&self, contact_ref: &str) -> Result<String> {
    let mut url = self.endpoint("onboard")?;
    url.query_pairs_mut().append_pair("contact", contact_ref);
    Ok(url.into())
  }

  fn base_url(&self) -> Result<Url> {
    Url::parse(&self.public_base_url)
      .map_err(|e| Error::Invalid(format!("public_base_url: {e}")))
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    let mut url = self.base_url()?;
    let joined = format!("{}/{path}", url.path().trim_end_matches('/'));
    url.set_path(&joined);
    Ok(url)
  }
}
