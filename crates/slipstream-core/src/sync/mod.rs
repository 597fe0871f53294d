//! Mailbox sync engine
//!
//! One sync run reconciles a remote mailbox against the local cache:
//! resolve the starting cursor, derive the affected threads (incremental)
//! or list the most recent ones (full), fetch them in bounded batches,
//! extract and merge, and close the ledger row.
//!
//! State machine: RESOLVING → (FULL | INCREMENTAL) → FETCHING → MERGING →
//! COMPLETED, with an error edge from every state to FAILED and an
//! INCREMENTAL → FULL edge taken only on cursor invalidation.

pub mod cursor;
pub mod fetcher;
pub mod history;

pub use cursor::SyncPlan;
pub use history::ChangeSet;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::client::{ListThreadsOptions, MailboxClient, RemoteThread};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::extract::extract_message;
use crate::models::{Message, MessageSummary, SyncMode, SyncRun, Thread};
use crate::store::Store;

/// A request to sync one account
#[derive(Debug, Clone, Deserialize)]
pub struct SyncRequest {
    pub user_id: String,
    pub account_id: String,

    /// Skip the change log and re-list the most recent threads
    #[serde(default)]
    pub force_full: bool,
}

/// Summary of a completed sync run, returned to the trigger endpoint caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub sync_id: String,
    pub sync_type: SyncMode,
    pub messages_added: i64,
    pub messages_modified: i64,
    pub messages_deleted: i64,
    pub cursor_before: Option<String>,
    pub cursor_after: String,

    /// Most recent messages across touched threads, newest first, for
    /// immediate UI refresh
    pub threads: Vec<MessageSummary>,
}

/// Sync engine for all accounts.
///
/// The mailbox client is injected so tests can substitute a fake; runs for
/// one `(user, account)` pair are serialized by an in-process registry,
/// while different accounts sync concurrently.
pub struct SyncEngine {
    store: Arc<Store>,
    client: Arc<dyn MailboxClient>,
    config: SyncConfig,
    active: Arc<Mutex<HashSet<String>>>,
}

/// Releases the account's run slot when the run ends, however it ends
struct RunGuard {
    active: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}

impl SyncEngine {
    pub fn new(store: Arc<Store>, client: Arc<dyn MailboxClient>, config: SyncConfig) -> Self {
        Self {
            store,
            client,
            config,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run one sync for the requested account and return its summary.
    ///
    /// The ledger row is closed exactly once: with final counts and the
    /// cursor on success, or with the error text on failure. A failed run
    /// never advances the cursor, so the next run re-covers the same window.
    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse> {
        let _guard = self.acquire_run_slot(request)?;

        info!(
            "Starting sync for {} (force_full={})",
            request.account_id, request.force_full
        );

        // RESOLVING
        let plan = cursor::resolve(
            &self.store,
            &request.user_id,
            &request.account_id,
            request.force_full,
        )
        .await?;

        let run = SyncRun::begin(
            &request.user_id,
            &request.account_id,
            plan.mode,
            plan.cursor_before.clone(),
        );
        // A ledger write failure aborts before any fetch work begins
        self.store.create_run(&run).await?;

        match self.execute(request, &plan, &run.id).await {
            Ok(response) => {
                info!(
                    "Sync {} completed: {} added, {} modified, {} deleted ({})",
                    run.id,
                    response.messages_added,
                    response.messages_modified,
                    response.messages_deleted,
                    response.sync_type.as_str()
                );
                Ok(response)
            }
            Err(e) => {
                error!("Sync {} failed for {}: {}", run.id, request.account_id, e);
                if let Err(close_err) = self.store.fail_run(&run.id, &e.to_string()).await {
                    error!("Failed to close ledger row {}: {}", run.id, close_err);
                }
                Err(e)
            }
        }
    }

    fn acquire_run_slot(&self, request: &SyncRequest) -> Result<RunGuard> {
        let key = format!("{}/{}", request.user_id, request.account_id);
        let mut active = self.active.lock();
        if !active.insert(key.clone()) {
            return Err(Error::SyncInProgress {
                account: request.account_id.clone(),
            });
        }
        Ok(RunGuard {
            active: self.active.clone(),
            key,
        })
    }

    async fn execute(
        &self,
        request: &SyncRequest,
        plan: &SyncPlan,
        run_id: &str,
    ) -> Result<SyncResponse> {
        let account_id = request.account_id.as_str();

        // The profile cursor is captured once, before any processing, so
        // events landing during the run fall into the next incremental
        // window: never lost, at worst re-processed.
        let profile = self.client.get_profile(account_id).await?;
        let cursor_after = profile.current_cursor;

        let mut mode = plan.mode;
        let mut delete_ids: Vec<String> = Vec::new();

        // FULL | INCREMENTAL
        let thread_ids: Vec<String> = match mode {
            SyncMode::Incremental => {
                let cursor = plan.cursor_before.clone().unwrap_or_default();
                match self.client.list_history_since(account_id, &cursor).await {
                    Ok(records) => {
                        let changes = history::reconcile(&records);
                        if changes.is_empty() {
                            debug!("No changes since cursor {} for {}", cursor, account_id);
                            self.store
                                .complete_run(run_id, mode, &cursor_after, 0, 0, 0)
                                .await?;
                            return Ok(SyncResponse {
                                sync_id: run_id.to_string(),
                                sync_type: mode,
                                messages_added: 0,
                                messages_modified: 0,
                                messages_deleted: 0,
                                cursor_before: plan.cursor_before.clone(),
                                cursor_after,
                                threads: Vec::new(),
                            });
                        }
                        delete_ids = changes.message_ids_to_delete.into_iter().collect();
                        changes.thread_ids_to_fetch.into_iter().collect()
                    }
                    Err(e) if e.is_cursor_invalid() => {
                        warn!(
                            "Cursor invalidated for {}, falling back to full sync",
                            account_id
                        );
                        mode = SyncMode::Full;
                        self.list_full_thread_ids(account_id).await?
                    }
                    // Any other history failure is a real outage, not a
                    // reason to silently re-fetch the mailbox.
                    Err(e) => return Err(e),
                }
            }
            SyncMode::Full => self.list_full_thread_ids(account_id).await?,
        };

        // MERGING, step 1: deletions run before any upsert so a message both
        // modified and deleted in one window cannot be resurrected.
        let deleted = if delete_ids.is_empty() {
            0
        } else {
            self.store.delete_messages(account_id, &delete_ids).await? as i64
        };
        let delete_set: HashSet<String> = delete_ids.into_iter().collect();

        // FETCHING + MERGING, batch by batch. A batch already committed
        // stays committed even if a later batch fails.
        let mut added = 0i64;
        let mut modified = 0i64;
        let mut merged: Vec<MessageSummary> = Vec::new();

        let batch_size = self.config.fetch_batch_size.max(1);
        for chunk in thread_ids.chunks(batch_size) {
            let fetched =
                fetcher::fetch_thread_batch(self.client.as_ref(), account_id, chunk).await;
            let (threads, messages) =
                build_rows(&fetched, request, &cursor_after, &delete_set);
            if threads.is_empty() {
                continue;
            }

            let remote_ids: Vec<String> = messages
                .iter()
                .map(|m| m.remote_message_id.clone())
                .collect();
            let existing = self
                .store
                .existing_message_ids(account_id, &remote_ids)
                .await?;
            let batch_added = messages
                .iter()
                .filter(|m| !existing.contains(&m.remote_message_id))
                .count() as i64;
            added += batch_added;
            modified += messages.len() as i64 - batch_added;

            self.store.upsert_batch(&threads, &messages).await?;
            merged.extend(messages.iter().map(MessageSummary::from));
        }

        // COMPLETED
        self.store
            .complete_run(run_id, mode, &cursor_after, added, modified, deleted)
            .await?;

        merged.sort_by(|a, b| b.time.cmp(&a.time));
        merged.truncate(self.config.recent_messages_limit as usize);

        Ok(SyncResponse {
            sync_id: run_id.to_string(),
            sync_type: mode,
            messages_added: added,
            messages_modified: modified,
            messages_deleted: deleted,
            cursor_before: plan.cursor_before.clone(),
            cursor_after,
            threads: merged,
        })
    }

    /// Full-mode thread listing: most recent threads, spam/trash excluded
    async fn list_full_thread_ids(&self, account_id: &str) -> Result<Vec<String>> {
        let options = ListThreadsOptions {
            max_results: self.config.full_sync_thread_limit,
            query: Some(self.config.full_sync_query.clone()),
        };
        let stubs = self.client.list_threads(account_id, &options).await?;
        Ok(stubs.into_iter().map(|stub| stub.id).collect())
    }
}

/// Extract cache rows from fetched threads.
///
/// Messages in the delete set are skipped (delete wins within one change
/// window); thread subject/snippet come from the newest remaining message.
fn build_rows(
    fetched: &[RemoteThread],
    request: &SyncRequest,
    cursor_after: &str,
    delete_set: &HashSet<String>,
) -> (Vec<Thread>, Vec<Message>) {
    let mut threads = Vec::new();
    let mut messages = Vec::new();

    for remote in fetched {
        let extracted: Vec<Message> = remote
            .messages
            .iter()
            .filter(|raw| !delete_set.contains(&raw.id))
            .map(|raw| {
                extract_message(raw, &request.user_id, &request.account_id, Some(cursor_after))
            })
            .collect();

        let Some(newest) = extracted.iter().max_by_key(|m| m.internal_date) else {
            continue;
        };

        let mut thread = Thread::new(&remote.id, &request.user_id, &request.account_id);
        thread.subject = newest.subject.clone();
        thread.snippet = newest.snippet.clone();
        thread.last_known_cursor = Some(cursor_after.to_string());

        threads.push(thread);
        messages.extend(extracted);
    }

    (threads, messages)
}
