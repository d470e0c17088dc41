//! Runtime wiring for the Vigil server binary: configuration, outbound
//! adapters and the periodic sweep scheduler.

pub mod config;
pub mod error;
pub mod local;
pub mod outbound;
pub mod relay;
pub mod render;
pub mod scheduler;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use outbound::Outbound;
