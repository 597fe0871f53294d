//! Error types for Slipstream

use thiserror::Error;

/// Result type alias using Slipstream's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Slipstream
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Remote mailbox errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mailbox API error: status {status}: {body}")]
    MailboxApi { status: u16, body: String },

    #[error("Sync cursor {cursor} is no longer valid for account {account}")]
    CursorInvalid { account: String, cursor: String },

    #[error("Authentication failed for account {account}: {reason}")]
    Auth { account: String, reason: String },

    // Sync errors
    #[error("Sync already in progress for account {account}")]
    SyncInProgress { account: String },

    #[error("Sync run not found: {0}")]
    SyncRunNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true if this error means the saved cursor expired and the run
    /// should fall back to a full sync instead of failing.
    pub fn is_cursor_invalid(&self) -> bool {
        matches!(self, Error::CursorInvalid { .. })
    }

    /// Returns true if this error indicates the user needs to re-authenticate
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }
}
