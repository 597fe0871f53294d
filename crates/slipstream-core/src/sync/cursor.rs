//! Cursor resolution: decide full vs incremental for the next run

use tracing::debug;

use crate::error::Result;
use crate::models::SyncMode;
use crate::store::Store;

/// Resolved starting point for a sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub mode: SyncMode,

    /// Cursor the run starts from; None means no prior successful sync
    pub cursor_before: Option<String>,
}

/// Decide how the next run for this account should execute.
///
/// Incremental only when the ledger holds a closed, error-free run with a
/// usable cursor and the caller did not force a full sync. A ledger read
/// failure is fatal to the run.
pub async fn resolve(
    store: &Store,
    user_id: &str,
    account_id: &str,
    force_full: bool,
) -> Result<SyncPlan> {
    let last = store.latest_successful_run(user_id, account_id).await?;
    let cursor_before = last
        .and_then(|run| run.cursor_after)
        .filter(|cursor| !cursor.is_empty());

    if force_full {
        debug!("Full sync forced for {}", account_id);
        return Ok(SyncPlan {
            mode: SyncMode::Full,
            cursor_before,
        });
    }

    match cursor_before {
        Some(cursor) => Ok(SyncPlan {
            mode: SyncMode::Incremental,
            cursor_before: Some(cursor),
        }),
        None => {
            debug!("No prior successful sync for {}, running full", account_id);
            Ok(SyncPlan {
                mode: SyncMode::Full,
                cursor_before: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncRun;

    #[tokio::test]
    async fn test_empty_ledger_resolves_full() {
        let store = Store::in_memory().await.unwrap();
        let plan = resolve(&store, "user-1", "acct-1", false).await.unwrap();
        assert_eq!(plan.mode, SyncMode::Full);
        assert!(plan.cursor_before.is_none());
    }

    #[tokio::test]
    async fn test_successful_run_seeds_incremental() {
        let store = Store::in_memory().await.unwrap();
        let run = SyncRun::begin("user-1", "acct-1", SyncMode::Full, None);
        store.create_run(&run).await.unwrap();
        store
            .complete_run(&run.id, SyncMode::Full, "1234", 3, 0, 0)
            .await
            .unwrap();

        let plan = resolve(&store, "user-1", "acct-1", false).await.unwrap();
        assert_eq!(plan.mode, SyncMode::Incremental);
        assert_eq!(plan.cursor_before.as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn test_force_full_keeps_cursor_but_runs_full() {
        let store = Store::in_memory().await.unwrap();
        let run = SyncRun::begin("user-1", "acct-1", SyncMode::Full, None);
        store.create_run(&run).await.unwrap();
        store
            .complete_run(&run.id, SyncMode::Full, "1234", 3, 0, 0)
            .await
            .unwrap();

        let plan = resolve(&store, "user-1", "acct-1", true).await.unwrap();
        assert_eq!(plan.mode, SyncMode::Full);
    }

    #[tokio::test]
    async fn test_open_and_failed_runs_are_ignored() {
        let store = Store::in_memory().await.unwrap();

        // Cancelled run: row left open
        let open = SyncRun::begin("user-1", "acct-1", SyncMode::Full, None);
        store.create_run(&open).await.unwrap();

        // Failed run
        let failed = SyncRun::begin("user-1", "acct-1", SyncMode::Incremental, Some("9".into()));
        store.create_run(&failed).await.unwrap();
        store.fail_run(&failed.id, "boom").await.unwrap();

        let plan = resolve(&store, "user-1", "acct-1", false).await.unwrap();
        assert_eq!(plan.mode, SyncMode::Full);
        assert!(plan.cursor_before.is_none());
    }

    #[tokio::test]
    async fn test_other_accounts_do_not_leak_cursors() {
        let store = Store::in_memory().await.unwrap();
        let run = SyncRun::begin("user-1", "acct-other", SyncMode::Full, None);
        store.create_run(&run).await.unwrap();
        store
            .complete_run(&run.id, SyncMode::Full, "777", 1, 0, 0)
            .await
            .unwrap();

        let plan = resolve(&store, "user-1", "acct-1", false).await.unwrap();
        assert_eq!(plan.mode, SyncMode::Full);
    }
}
