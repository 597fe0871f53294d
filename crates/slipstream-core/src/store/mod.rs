//! SQLite store for the sync ledger and the thread/message cache
//!
//! Three tables: sync_runs (append-only ledger), threads, messages. The
//! cache tables are keyed by the natural key `(remote_id, account_id)` and
//! written with upsert-on-conflict; one merge batch is one transaction.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Address, Message, SyncRun, Thread};

/// Upper bound on bind variables per IN (...) query
const ID_CHUNK_SIZE: usize = 500;

/// SQLite database wrapper
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open or create a database at the given path
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening SQLite store at {:?}", path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database (tests)
    pub async fn in_memory() -> Result<Self> {
        // A single connection so every query sees the same :memory: database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes if they do not exist
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_runs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                cursor_before TEXT,
                cursor_after TEXT,
                mode TEXT NOT NULL,
                added_count INTEGER NOT NULL DEFAULT 0,
                modified_count INTEGER NOT NULL DEFAULT 0,
                deleted_count INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sync_runs_account
             ON sync_runs(user_id, account_id, started_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                remote_thread_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                snippet TEXT NOT NULL DEFAULT '',
                last_known_cursor TEXT,
                updated_at TEXT NOT NULL,
                UNIQUE(remote_thread_id, account_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_threads_account ON threads(user_id, account_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                remote_message_id TEXT NOT NULL,
                remote_thread_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                from_name TEXT NOT NULL DEFAULT '',
                from_email TEXT NOT NULL DEFAULT '',
                to_list TEXT NOT NULL DEFAULT '[]',
                cc_list TEXT NOT NULL DEFAULT '[]',
                bcc_list TEXT NOT NULL DEFAULT '[]',
                subject TEXT NOT NULL DEFAULT '',
                snippet TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                body_html TEXT,
                label_ids TEXT NOT NULL DEFAULT '[]',
                is_unread INTEGER NOT NULL DEFAULT 0,
                last_known_cursor TEXT,
                internal_date TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(remote_message_id, account_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_account ON messages(user_id, account_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread
             ON messages(remote_thread_id, account_id)",
        )
        .execute(&self.pool)
        .await?;

        info!("Store schema initialized");
        Ok(())
    }

    // === Sync ledger ===

    /// Insert an open ledger row for a run that is starting
    pub async fn create_run(&self, run: &SyncRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs
                (id, user_id, account_id, cursor_before, cursor_after, mode,
                 added_count, modified_count, deleted_count, started_at, completed_at, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.user_id)
        .bind(&run.account_id)
        .bind(&run.cursor_before)
        .bind(&run.cursor_after)
        .bind(run.mode.as_str())
        .bind(run.added_count)
        .bind(run.modified_count)
        .bind(run.deleted_count)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(&run.error)
        .execute(&self.pool)
        .await?;

        debug!("Created sync run {} for {}", run.id, run.account_id);
        Ok(())
    }

    /// Close a ledger row as successful
    pub async fn complete_run(
        &self,
        run_id: &str,
        mode: crate::models::SyncMode,
        cursor_after: &str,
        added: i64,
        modified: i64,
        deleted: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs
            SET mode = ?, cursor_after = ?, added_count = ?, modified_count = ?,
                deleted_count = ?, completed_at = ?, error = NULL
            WHERE id = ?
            "#,
        )
        .bind(mode.as_str())
        .bind(cursor_after)
        .bind(added)
        .bind(modified)
        .bind(deleted)
        .bind(Utc::now())
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::SyncRunNotFound(run_id.to_string()));
        }
        Ok(())
    }

    /// Close a ledger row as failed, keeping the error text for inspection
    pub async fn fail_run(&self, run_id: &str, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE sync_runs SET completed_at = ?, error = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(error)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::SyncRunNotFound(run_id.to_string()));
        }
        Ok(())
    }

    /// Most recent closed, error-free run for an account.
    ///
    /// Open rows (cancelled runs) and errored rows are ignored, so a
    /// half-applied cursor is never trusted.
    pub async fn latest_successful_run(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<Option<SyncRun>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM sync_runs
            WHERE user_id = ? AND account_id = ?
              AND completed_at IS NOT NULL AND error IS NULL
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_run(&r)).transpose()
    }

    /// Fetch one ledger row by id
    pub async fn get_run(&self, run_id: &str) -> Result<Option<SyncRun>> {
        let row = sqlx::query("SELECT * FROM sync_runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_run(&r)).transpose()
    }

    /// List the most recent ledger rows for an account, newest first
    pub async fn list_runs(
        &self,
        user_id: &str,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<SyncRun>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM sync_runs
            WHERE user_id = ? AND account_id = ?
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(account_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_run).collect()
    }

    // === Message cache ===

    /// Which of the given remote message ids already exist for this account.
    ///
    /// One batched lookup; the caller partitions the merge batch into
    /// added vs modified from the returned set.
    pub async fn existing_message_ids(
        &self,
        account_id: &str,
        remote_ids: &[String],
    ) -> Result<HashSet<String>> {
        let mut existing = HashSet::new();

        for chunk in remote_ids.chunks(ID_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT remote_message_id FROM messages
                 WHERE account_id = ? AND remote_message_id IN ({placeholders})"
            );

            let mut query = sqlx::query(&sql).bind(account_id);
            for id in chunk {
                query = query.bind(id);
            }

            let rows = query.fetch_all(&self.pool).await?;
            for row in rows {
                existing.insert(row.try_get::<String, _>("remote_message_id")?);
            }
        }

        Ok(existing)
    }

    /// Delete messages by remote id. Returns how many rows were removed.
    ///
    /// Parent threads are left in place even when they become empty.
    pub async fn delete_messages(
        &self,
        account_id: &str,
        remote_ids: &[String],
    ) -> Result<u64> {
        let mut deleted = 0u64;

        for chunk in remote_ids.chunks(ID_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "DELETE FROM messages
                 WHERE account_id = ? AND remote_message_id IN ({placeholders})"
            );

            let mut query = sqlx::query(&sql).bind(account_id);
            for id in chunk {
                query = query.bind(id);
            }

            deleted += query.execute(&self.pool).await?.rows_affected();
        }

        debug!("Deleted {} messages for {}", deleted, account_id);
        Ok(deleted)
    }

    /// Upsert a batch of threads and messages in one transaction.
    ///
    /// Conflict target is the natural key; surrogate id, remote ids,
    /// user_id and account_id are immutable once created.
    pub async fn upsert_batch(&self, threads: &[Thread], messages: &[Message]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for thread in threads {
            sqlx::query(
                r#"
                INSERT INTO threads
                    (id, remote_thread_id, user_id, account_id, subject, snippet,
                     last_known_cursor, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(remote_thread_id, account_id) DO UPDATE SET
                    subject = excluded.subject,
                    snippet = excluded.snippet,
                    last_known_cursor = excluded.last_known_cursor,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&thread.id)
            .bind(&thread.remote_thread_id)
            .bind(&thread.user_id)
            .bind(&thread.account_id)
            .bind(&thread.subject)
            .bind(&thread.snippet)
            .bind(&thread.last_known_cursor)
            .bind(thread.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        for message in messages {
            sqlx::query(
                r#"
                INSERT INTO messages
                    (id, remote_message_id, remote_thread_id, user_id, account_id,
                     from_name, from_email, to_list, cc_list, bcc_list, subject,
                     snippet, body, body_html, label_ids, is_unread,
                     last_known_cursor, internal_date, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(remote_message_id, account_id) DO UPDATE SET
                    remote_thread_id = excluded.remote_thread_id,
                    from_name = excluded.from_name,
                    from_email = excluded.from_email,
                    to_list = excluded.to_list,
                    cc_list = excluded.cc_list,
                    bcc_list = excluded.bcc_list,
                    subject = excluded.subject,
                    snippet = excluded.snippet,
                    body = excluded.body,
                    body_html = excluded.body_html,
                    label_ids = excluded.label_ids,
                    is_unread = excluded.is_unread,
                    last_known_cursor = excluded.last_known_cursor,
                    internal_date = excluded.internal_date,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&message.id)
            .bind(&message.remote_message_id)
            .bind(&message.remote_thread_id)
            .bind(&message.user_id)
            .bind(&message.account_id)
            .bind(&message.from)
            .bind(&message.from_email)
            .bind(serde_json::to_string(&message.to)?)
            .bind(serde_json::to_string(&message.cc)?)
            .bind(serde_json::to_string(&message.bcc)?)
            .bind(&message.subject)
            .bind(&message.snippet)
            .bind(&message.body)
            .bind(&message.body_html)
            .bind(serde_json::to_string(&message.label_ids)?)
            .bind(message.is_unread)
            .bind(&message.last_known_cursor)
            .bind(message.internal_date)
            .bind(message.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            "Upserted {} threads and {} messages",
            threads.len(),
            messages.len()
        );
        Ok(())
    }

    /// Get a message by natural key
    pub async fn get_message(
        &self,
        account_id: &str,
        remote_message_id: &str,
    ) -> Result<Option<Message>> {
        let row = sqlx::query(
            "SELECT * FROM messages WHERE account_id = ? AND remote_message_id = ?",
        )
        .bind(account_id)
        .bind(remote_message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_message(&r)).transpose()
    }

    /// List the most recent messages for an account, newest first
    pub async fn list_recent_messages(
        &self,
        user_id: &str,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE user_id = ? AND account_id = ?
            ORDER BY internal_date DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(account_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Count cached messages for an account
    pub async fn count_messages(&self, account_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM messages WHERE account_id = ?")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Count cached threads for an account
    pub async fn count_threads(&self, account_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM threads WHERE account_id = ?")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

fn row_to_run(row: &SqliteRow) -> Result<SyncRun> {
    let mode: String = row.try_get("mode")?;
    Ok(SyncRun {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        account_id: row.try_get("account_id")?,
        cursor_before: row.try_get("cursor_before")?,
        cursor_after: row.try_get("cursor_after")?,
        mode: mode.parse().map_err(Error::Other)?,
        added_count: row.try_get("added_count")?,
        modified_count: row.try_get("modified_count")?,
        deleted_count: row.try_get("deleted_count")?,
        started_at: row.try_get::<DateTime<Utc>, _>("started_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        error: row.try_get("error")?,
    })
}

fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let to: Vec<Address> = serde_json::from_str(row.try_get::<String, _>("to_list")?.as_str())?;
    let cc: Vec<Address> = serde_json::from_str(row.try_get::<String, _>("cc_list")?.as_str())?;
    let bcc: Vec<Address> = serde_json::from_str(row.try_get::<String, _>("bcc_list")?.as_str())?;
    let label_ids: Vec<String> =
        serde_json::from_str(row.try_get::<String, _>("label_ids")?.as_str())?;

    Ok(Message {
        id: row.try_get("id")?,
        remote_message_id: row.try_get("remote_message_id")?,
        remote_thread_id: row.try_get("remote_thread_id")?,
        user_id: row.try_get("user_id")?,
        account_id: row.try_get("account_id")?,
        from: row.try_get("from_name")?,
        from_email: row.try_get("from_email")?,
        to,
        cc,
        bcc,
        subject: row.try_get("subject")?,
        snippet: row.try_get("snippet")?,
        body: row.try_get("body")?,
        body_html: row.try_get("body_html")?,
        label_ids,
        is_unread: row.try_get("is_unread")?,
        last_known_cursor: row.try_get("last_known_cursor")?,
        internal_date: row.try_get::<DateTime<Utc>, _>("internal_date")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncMode;

    fn thread(remote_id: &str) -> Thread {
        let mut t = Thread::new(remote_id, "user-1", "acct-1");
        t.subject = format!("subject {remote_id}");
        t.snippet = "snippet".to_string();
        t
    }

    fn message(remote_id: &str, thread_id: &str) -> Message {
        let mut m = Message::new(remote_id, thread_id, "user-1", "acct-1");
        m.subject = format!("subject {remote_id}");
        m.from = "Ada".to_string();
        m.from_email = "ada@example.com".to_string();
        m.to = vec![Address::new("bob@example.com")];
        m
    }

    #[tokio::test]
    async fn test_ledger_lifecycle() {
        let store = Store::in_memory().await.unwrap();

        let run = SyncRun::begin("user-1", "acct-1", SyncMode::Full, None);
        store.create_run(&run).await.unwrap();

        // An open row is not a cursor seed
        assert!(store
            .latest_successful_run("user-1", "acct-1")
            .await
            .unwrap()
            .is_none());

        store
            .complete_run(&run.id, SyncMode::Full, "1000", 5, 2, 1)
            .await
            .unwrap();

        let latest = store
            .latest_successful_run("user-1", "acct-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, run.id);
        assert_eq!(latest.cursor_after.as_deref(), Some("1000"));
        assert_eq!(latest.added_count, 5);
        assert_eq!(latest.modified_count, 2);
        assert_eq!(latest.deleted_count, 1);
        assert!(latest.is_successful());
    }

    #[tokio::test]
    async fn test_failed_run_does_not_seed_cursor() {
        let store = Store::in_memory().await.unwrap();

        let run = SyncRun::begin("user-1", "acct-1", SyncMode::Incremental, Some("900".into()));
        store.create_run(&run).await.unwrap();
        store.fail_run(&run.id, "mailbox unreachable").await.unwrap();

        assert!(store
            .latest_successful_run("user-1", "acct-1")
            .await
            .unwrap()
            .is_none());

        let stored = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(stored.error.as_deref(), Some("mailbox unreachable"));
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_natural_key() {
        let store = Store::in_memory().await.unwrap();

        let t = thread("t1");
        let m = message("m1", "t1");
        store.upsert_batch(&[t], &[m]).await.unwrap();

        // Different surrogate ids, same natural key
        let mut t2 = thread("t1");
        t2.subject = "updated".to_string();
        let mut m2 = message("m1", "t1");
        m2.label_ids = vec!["UNREAD".to_string()];
        m2.is_unread = true;
        store.upsert_batch(&[t2], &[m2]).await.unwrap();

        assert_eq!(store.count_threads("acct-1").await.unwrap(), 1);
        assert_eq!(store.count_messages("acct-1").await.unwrap(), 1);

        let stored = store.get_message("acct-1", "m1").await.unwrap().unwrap();
        assert!(stored.is_unread);
        assert_eq!(stored.label_ids, vec!["UNREAD".to_string()]);
        assert_eq!(stored.to, vec![Address::new("bob@example.com")]);
    }

    #[tokio::test]
    async fn test_existing_ids_partition_and_delete() {
        let store = Store::in_memory().await.unwrap();

        store
            .upsert_batch(
                &[thread("t1")],
                &[message("m1", "t1"), message("m2", "t1")],
            )
            .await
            .unwrap();

        let ids = vec!["m1".to_string(), "m2".to_string(), "m3".to_string()];
        let existing = store.existing_message_ids("acct-1", &ids).await.unwrap();
        assert!(existing.contains("m1"));
        assert!(existing.contains("m2"));
        assert!(!existing.contains("m3"));

        let deleted = store
            .delete_messages("acct-1", &["m1".to_string(), "m3".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count_messages("acct-1").await.unwrap(), 1);

        // Deleting a thread's last message never deletes the thread
        let deleted = store
            .delete_messages("acct-1", &["m2".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count_threads("acct-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recent_messages_newest_first() {
        let store = Store::in_memory().await.unwrap();

        let mut old = message("m-old", "t1");
        old.internal_date = Utc::now() - chrono::Duration::hours(2);
        let mut new = message("m-new", "t1");
        new.internal_date = Utc::now();

        store
            .upsert_batch(&[thread("t1")], &[old, new])
            .await
            .unwrap();

        let recent = store
            .list_recent_messages("user-1", "acct-1", 10)
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].remote_message_id, "m-new");
        assert_eq!(recent[1].remote_message_id, "m-old");
    }
}
