//! Thread cache row

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cached mailbox thread.
///
/// Uniquely keyed by `(remote_thread_id, account_id)`. Created on first
/// sight, overwritten on every re-fetch, never deleted by the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    /// Internal UUID
    pub id: String,

    /// Remote system's thread identifier
    pub remote_thread_id: String,

    /// Owning user
    pub user_id: String,

    /// Account identifier
    pub account_id: String,

    /// Subject of the newest message in the thread
    pub subject: String,

    /// Preview snippet of the newest message
    pub snippet: String,

    /// Cursor of the run that last touched this row
    pub last_known_cursor: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(
        remote_thread_id: impl Into<String>,
        user_id: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_thread_id: remote_thread_id.into(),
            user_id: user_id.into(),
            account_id: account_id.into(),
            subject: String::new(),
            snippet: String::new(),
            last_known_cursor: None,
            updated_at: Utc::now(),
        }
    }
}
