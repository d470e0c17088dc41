//! Core types and the vault lifecycle engine for Vigil.
//!
//! This crate is deliberately free of HTTP and database dependencies. Storage,
//! message delivery and document creation are reached through the traits in
//! [`store`] and [`notify`]; every other crate depends on this one.

pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod notify;
pub mod store;
pub mod vault;

pub use engine::Engine;
pub use error::{Error, Result};

#[cfg(test)]
mod tests;
