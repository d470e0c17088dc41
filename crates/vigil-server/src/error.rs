//! Error type for the outbound adapters.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("relay request to {endpoint} failed: {source}")]
  Relay {
    endpoint: &'static str,
    #[source]
    source:   reqwest::Error,
  },

  #[error("relay {endpoint} answered {status}: {body}")]
  RelayStatus {
    endpoint: &'static str,
    status:   reqwest::StatusCode,
    body:     String,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
