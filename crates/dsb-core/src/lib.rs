//! Core domain + application logic for the domain search bot.
//!
//! This crate is intentionally framework-agnostic. Telegram, Dropbox and
//! PostgreSQL live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod search;
pub mod security;
pub mod store;
pub mod utils;

pub use errors::{Error, Result};

#[cfg(test)]
pub(crate) mod testing;
