//! SQLite backend for the vault store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every mutation is a single conditional
//! `UPDATE`, so two processes sharing one database file still cannot move a
//! row out of a terminal status or claim the activation notice twice.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
