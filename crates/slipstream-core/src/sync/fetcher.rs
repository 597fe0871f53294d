//! Batched thread fetching with per-thread failure isolation

use futures::future::join_all;
use tracing::{debug, warn};

use crate::client::{MailboxClient, RemoteThread};

/// Fetch one batch of threads concurrently.
///
/// All fetches in the batch are issued together and awaited together. A
/// thread that fails to fetch is logged and dropped so one bad thread does
/// not abort the run; a thread with zero messages is treated as not found
/// and skipped.
pub async fn fetch_thread_batch(
    client: &dyn MailboxClient,
    account_id: &str,
    thread_ids: &[String],
) -> Vec<RemoteThread> {
    let futures = thread_ids
        .iter()
        .map(|thread_id| client.get_thread(account_id, thread_id));

    let results = join_all(futures).await;

    let mut fetched = Vec::with_capacity(thread_ids.len());
    for (thread_id, result) in thread_ids.iter().zip(results) {
        match result {
            Ok(thread) if thread.messages.is_empty() => {
                debug!("Thread {} has no messages, skipping", thread_id);
            }
            Ok(thread) => fetched.push(thread),
            Err(e) => {
                warn!("Failed to fetch thread {}: {}", thread_id, e);
            }
        }
    }

    fetched
}
