//! Gmail-style REST implementation of the mailbox client

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

use super::{
    AccessTokenProvider, HistoryRecord, ListThreadsOptions, MailboxClient, MailboxProfile,
    RemoteThread, ThreadStub,
};

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
const HISTORY_PAGE_SIZE: u32 = 100;
const HISTORY_TYPES: &[&str] = &["messageAdded", "messageDeleted", "labelAdded", "labelRemoved"];

/// Remote mailbox client speaking the Gmail REST dialect.
///
/// The base URL is injectable so a connection broker (or a test server) can
/// stand in for the real API.
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl GmailClient {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self::with_base_url(tokens, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        tokens: Arc<dyn AccessTokenProvider>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            tokens,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        account_id: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let token = self.tokens.access_token(account_id).await?;
        let url = format!("{}/users/{}/{}", self.base_url, account_id, path);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth {
                account: account_id.to_string(),
                reason: format!("mailbox API returned {status}"),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::MailboxApi {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadListResponse {
    #[serde(default)]
    threads: Vec<ThreadStub>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryListResponse {
    #[serde(default)]
    history: Vec<HistoryRecord>,

    #[serde(default)]
    next_page_token: Option<String>,
}

#[async_trait]
impl MailboxClient for GmailClient {
    async fn get_profile(&self, account_id: &str) -> Result<MailboxProfile> {
        self.get_json(account_id, "profile", &[]).await
    }

    async fn list_threads(
        &self,
        account_id: &str,
        options: &ListThreadsOptions,
    ) -> Result<Vec<ThreadStub>> {
        let mut query = vec![("maxResults", options.max_results.to_string())];
        if let Some(q) = &options.query {
            query.push(("q", q.clone()));
        }

        let response: ThreadListResponse =
            self.get_json(account_id, "threads", &query).await?;
        debug!(
            "Listed {} threads for {}",
            response.threads.len(),
            account_id
        );
        Ok(response.threads)
    }

    async fn get_thread(&self, account_id: &str, thread_id: &str) -> Result<RemoteThread> {
        let path = format!("threads/{thread_id}");
        self.get_json(account_id, &path, &[("format", "full".to_string())])
            .await
    }

    async fn list_history_since(
        &self,
        account_id: &str,
        cursor: &str,
    ) -> Result<Vec<HistoryRecord>> {
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("startHistoryId", cursor.to_string()),
                ("maxResults", HISTORY_PAGE_SIZE.to_string()),
            ];
            for kind in HISTORY_TYPES {
                query.push(("historyTypes", (*kind).to_string()));
            }
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response: HistoryListResponse =
                match self.get_json(account_id, "history", &query).await {
                    Ok(response) => response,
                    // The history endpoint answers 404 when the start cursor
                    // has expired out of the change log.
                    Err(Error::MailboxApi { status: 404, .. }) => {
                        return Err(Error::CursorInvalid {
                            account: account_id.to_string(),
                            cursor: cursor.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                };

            records.extend(response.history);

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!(
            "Fetched {} history records since {} for {}",
            records.len(),
            cursor,
            account_id
        );
        Ok(records)
    }
}
