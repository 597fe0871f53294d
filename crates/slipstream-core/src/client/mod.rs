//! Remote mailbox client
//!
//! The sync engine only ever talks to the remote mailbox through the
//! [`MailboxClient`] trait, so tests can substitute a scripted fake and the
//! engine never depends on a concrete transport.

mod gmail;

pub use gmail::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Snapshot of the remote mailbox's change-log position
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxProfile {
    pub email_address: String,

    /// Opaque change-log cursor at the time of the call
    #[serde(rename = "historyId")]
    pub current_cursor: String,
}

/// Thread identifier returned by a listing call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStub {
    pub id: String,
}

/// Full thread detail: summary plus every message body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteThread {
    pub id: String,

    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

/// Raw remote message representation as delivered by the mailbox API.
///
/// Typed at the ingestion boundary so extraction works against fields, not
/// ad hoc JSON lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: String,

    pub thread_id: String,

    #[serde(default)]
    pub label_ids: Vec<String>,

    #[serde(default)]
    pub snippet: Option<String>,

    /// Milliseconds since epoch, as a string
    #[serde(default)]
    pub internal_date: Option<String>,

    pub payload: RawPart,
}

/// One node of a MIME part tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPart {
    #[serde(default)]
    pub mime_type: Option<String>,

    #[serde(default)]
    pub headers: Vec<RawHeader>,

    #[serde(default)]
    pub body: Option<RawBody>,

    #[serde(default)]
    pub parts: Option<Vec<RawPart>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHeader {
    pub name: String,
    pub value: String,
}

/// Base64url-encoded part payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBody {
    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub data: Option<String>,
}

/// Message reference carried by a change event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessageEvent {
    pub message: MessageRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryLabelEvent {
    pub message: MessageRef,

    #[serde(default)]
    pub label_ids: Vec<String>,
}

/// One change-log record: a group of events that happened at one cursor step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub messages_added: Option<Vec<HistoryMessageEvent>>,

    #[serde(default)]
    pub messages_deleted: Option<Vec<HistoryMessageEvent>>,

    #[serde(default)]
    pub labels_added: Option<Vec<HistoryLabelEvent>>,

    #[serde(default)]
    pub labels_removed: Option<Vec<HistoryLabelEvent>>,
}

/// Options for a thread listing call
#[derive(Debug, Clone)]
pub struct ListThreadsOptions {
    /// Upper bound on returned threads
    pub max_results: u32,

    /// Remote-side filter query (e.g. "-in:spam -in:trash")
    pub query: Option<String>,
}

/// Capability handle for the remote mailbox.
///
/// Injected into the sync engine, never a module-level singleton.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Current profile, including the change-log cursor
    async fn get_profile(&self, account_id: &str) -> Result<MailboxProfile>;

    /// List the most recent threads, filtered remote-side
    async fn list_threads(
        &self,
        account_id: &str,
        options: &ListThreadsOptions,
    ) -> Result<Vec<ThreadStub>>;

    /// Fetch one thread with full message bodies
    async fn get_thread(&self, account_id: &str, thread_id: &str) -> Result<RemoteThread>;

    /// List change events since `cursor`.
    ///
    /// Returns [`Error::CursorInvalid`](crate::Error::CursorInvalid) when the
    /// remote reports the cursor as expired; the caller falls back to a full
    /// sync rather than failing the run.
    async fn list_history_since(
        &self,
        account_id: &str,
        cursor: &str,
    ) -> Result<Vec<HistoryRecord>>;
}

/// Source of bearer tokens for the remote mailbox API.
///
/// Keeps OAuth plumbing out of the sync engine; a broker-backed provider,
/// a file-backed provider, and a static test provider all fit behind this.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self, account_id: &str) -> Result<String>;
}

/// Token provider returning a fixed token, for tests and local brokers
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self, _account_id: &str) -> Result<String> {
        Ok(self.token.clone())
    }
}
