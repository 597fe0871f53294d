//! Slipstream Core Library
//!
//! Reconciles a remote, mutable mailbox against a local SQLite cache using
//! a change-log cursor protocol: incremental fetch when a cursor is known,
//! full resync when it is missing or invalidated.

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
pub use models::*;

/// Application name for config paths
pub const APP_NAME: &str = "slipstream";
