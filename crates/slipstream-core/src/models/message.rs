//! Message cache row

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Email address with optional display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Display name (e.g., "John Doe")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Email address (e.g., "john@example.com")
    pub email: String,
}

impl Address {
    /// Create a new address with just an email
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new address with name and email
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

/// A cached mailbox message.
///
/// Uniquely keyed by `(remote_message_id, account_id)`. Created on first
/// sight, overwritten when a later sync re-observes the same message (e.g.
/// a label change), deleted when the change log reports a hard delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    // === Identifiers ===
    /// Internal UUID
    pub id: String,

    /// Remote system's message identifier
    pub remote_message_id: String,

    /// Remote system's owning thread identifier
    pub remote_thread_id: String,

    /// Owning user
    pub user_id: String,

    /// Account identifier
    pub account_id: String,

    // === Headers ===
    /// Sender display name (falls back to the raw header value)
    pub from: String,

    /// Sender email address (falls back to the raw header value)
    pub from_email: String,

    /// To recipients
    #[serde(default)]
    pub to: Vec<Address>,

    /// CC recipients
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Address>,

    /// BCC recipients
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<Address>,

    /// Subject line
    pub subject: String,

    // === Content ===
    /// Preview snippet
    pub snippet: String,

    /// Plain text body
    pub body: String,

    /// HTML body (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,

    // === State ===
    /// Remote label identifiers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_ids: Vec<String>,

    /// Derived solely from the presence of the UNREAD label
    pub is_unread: bool,

    // === Sync metadata ===
    /// Cursor of the run that last touched this row
    pub last_known_cursor: Option<String>,

    /// Remote internal timestamp of the message
    pub internal_date: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        remote_message_id: impl Into<String>,
        remote_thread_id: impl Into<String>,
        user_id: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_message_id: remote_message_id.into(),
            remote_thread_id: remote_thread_id.into(),
            user_id: user_id.into(),
            account_id: account_id.into(),
            from: String::new(),
            from_email: String::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            snippet: String::new(),
            body: String::new(),
            body_html: None,
            label_ids: Vec::new(),
            is_unread: false,
            last_known_cursor: None,
            internal_date: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// Lightweight message summary returned by the sync trigger endpoint for
/// immediate UI refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSummary {
    pub message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub time: DateTime<Utc>,
}

impl From<&Message> for MessageSummary {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.remote_message_id.clone(),
            thread_id: message.remote_thread_id.clone(),
            subject: message.subject.clone(),
            sender: message.from.clone(),
            time: message.internal_date,
        }
    }
}
