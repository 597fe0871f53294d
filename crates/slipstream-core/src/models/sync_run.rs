//! Sync ledger data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mode a sync run executed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// List and re-fetch the most recent threads directly
    Full,
    /// Derive changed threads and deleted messages from the change log
    Incremental,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            other => Err(format!("unknown sync mode: {other}")),
        }
    }
}

/// One row of the sync ledger.
///
/// Created open (`completed_at` null) when a run starts and closed exactly
/// once at the end, with either final counts or an error. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    /// Internal UUID
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// Account identifier
    pub account_id: String,

    /// Cursor the run started from (None = no prior successful sync)
    pub cursor_before: Option<String>,

    /// Cursor recorded on success (the profile cursor captured at run start)
    pub cursor_after: Option<String>,

    /// Mode the run executed in
    pub mode: SyncMode,

    /// Messages newly created
    pub added_count: i64,

    /// Messages re-observed and overwritten
    pub modified_count: i64,

    /// Messages removed after a hard-delete event
    pub deleted_count: i64,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Failure reason, if the run failed
    pub error: Option<String>,
}

impl SyncRun {
    /// Create an open ledger row for a run that is starting now
    pub fn begin(
        user_id: impl Into<String>,
        account_id: impl Into<String>,
        mode: SyncMode,
        cursor_before: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            account_id: account_id.into(),
            cursor_before,
            cursor_after: None,
            mode,
            added_count: 0,
            modified_count: 0,
            deleted_count: 0,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Only a closed, error-free run may seed the next run's cursor
    pub fn is_successful(&self) -> bool {
        self.completed_at.is_some() && self.error.is_none()
    }
}
