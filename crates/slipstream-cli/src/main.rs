//! Slipstream CLI
//!
//! Command-line interface for triggering mailbox syncs and inspecting the
//! local cache and sync ledger.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use slipstream_core::client::{GmailClient, StaticTokenProvider};
use slipstream_core::store::Store;
use slipstream_core::sync::{SyncEngine, SyncRequest};
use slipstream_core::Config;

/// Environment variable holding the OAuth access token for API calls
const TOKEN_ENV: &str = "SLIPSTREAM_ACCESS_TOKEN";

#[derive(Parser)]
#[command(name = "slipstream")]
#[command(about = "Slipstream - incremental mailbox sync into a local cache")]
#[command(long_about = "Slipstream keeps a local SQLite cache of a remote mailbox in sync using \
the provider's change-log cursor, falling back to a full re-list when the cursor expires.

QUICK START:
  1. Export a token:   export SLIPSTREAM_ACCESS_TOKEN=...
  2. Run a sync:       slipstream sync --user me --account me@gmail.com
  3. Inspect runs:     slipstream runs --user me --account me@gmail.com
  4. Read the cache:   slipstream messages --user me --account me@gmail.com

OUTPUT FORMAT:
  All commands output JSON by default (best for programmatic use).
  Add --human for direct terminal reading.

EXAMPLES:
  slipstream sync --user me --account me@gmail.com --force-full
  slipstream runs --user me --account me@gmail.com --limit 5")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in human-readable format instead of JSON. Applies to all subcommands.
    #[arg(long, global = true)]
    human: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync for an account and print its summary.
    /// Returns JSON: syncId, syncType, messagesAdded, messagesModified,
    /// messagesDeleted, cursorBefore, cursorAfter, threads.
    Sync {
        /// User the account belongs to
        #[arg(long)]
        user: String,
        /// Account to sync (email address)
        #[arg(long)]
        account: String,
        /// Skip the change log and re-list the most recent threads
        #[arg(long)]
        force_full: bool,
    },
    /// Inspect the sync ledger for an account, newest run first.
    Runs {
        /// User the account belongs to
        #[arg(long)]
        user: String,
        /// Account whose ledger to show
        #[arg(long)]
        account: String,
        /// Maximum number of runs to show
        #[arg(long, default_value = "10")]
        limit: u32,
    },
    /// List the most recent cached messages for an account.
    Messages {
        /// User the account belongs to
        #[arg(long)]
        user: String,
        /// Account whose cache to read
        #[arg(long)]
        account: String,
        /// Maximum number of messages (defaults to the configured limit)
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();

    // Logs go to stderr so JSON output stays parseable
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Sync {
            user,
            account,
            force_full,
        } => handle_sync(&config, user, account, force_full, cli.human).await,
        Commands::Runs {
            user,
            account,
            limit,
        } => handle_runs(&config, &user, &account, limit, cli.human).await,
        Commands::Messages {
            user,
            account,
            limit,
        } => handle_messages(&config, &user, &account, limit, cli.human).await,
    }
}

async fn handle_sync(
    config: &Config,
    user: String,
    account: String,
    force_full: bool,
    human: bool,
) -> Result<()> {
    let token = std::env::var(TOKEN_ENV)
        .with_context(|| format!("{TOKEN_ENV} is not set; export an OAuth access token"))?;

    let store = Arc::new(Store::open(&config.general.database_path).await?);
    let client = Arc::new(GmailClient::new(Arc::new(StaticTokenProvider::new(token))));
    let engine = SyncEngine::new(store, client, config.sync.clone());

    let request = SyncRequest {
        user_id: user,
        account_id: account,
        force_full,
    };

    let response = engine
        .sync(&request)
        .await
        .with_context(|| format!("sync failed for {}", request.account_id))?;

    if human {
        println!(
            "Sync {} ({}) completed: {} added, {} modified, {} deleted",
            response.sync_id,
            response.sync_type.as_str(),
            response.messages_added,
            response.messages_modified,
            response.messages_deleted
        );
        println!(
            "Cursor: {} -> {}",
            response.cursor_before.as_deref().unwrap_or("(none)"),
            response.cursor_after
        );
        for summary in &response.threads {
            println!(
                "  {} | {} | {}",
                summary.time.format("%Y-%m-%d %H:%M"),
                summary.sender,
                summary.subject
            );
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}

async fn handle_runs(
    config: &Config,
    user: &str,
    account: &str,
    limit: u32,
    human: bool,
) -> Result<()> {
    let store = Store::open(&config.general.database_path).await?;
    let runs = store.list_runs(user, account, limit).await?;

    if human {
        if runs.is_empty() {
            println!("No sync runs recorded for {account}.");
            return Ok(());
        }
        for run in &runs {
            let status = match (&run.completed_at, &run.error) {
                (Some(_), None) => "ok".to_string(),
                (Some(_), Some(e)) => format!("failed: {e}"),
                (None, _) => "open".to_string(),
            };
            println!(
                "{} | {} | {} | +{} ~{} -{} | {}",
                run.started_at.format("%Y-%m-%d %H:%M:%S"),
                run.mode.as_str(),
                run.id,
                run.added_count,
                run.modified_count,
                run.deleted_count,
                status
            );
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&runs)?);
    }

    Ok(())
}

async fn handle_messages(
    config: &Config,
    user: &str,
    account: &str,
    limit: Option<u32>,
    human: bool,
) -> Result<()> {
    let store = Store::open(&config.general.database_path).await?;
    let limit = limit.unwrap_or(config.sync.recent_messages_limit);
    let messages = store.list_recent_messages(user, account, limit).await?;

    if human {
        if messages.is_empty() {
            println!("No cached messages for {account}.");
            return Ok(());
        }
        for message in &messages {
            let marker = if message.is_unread { "*" } else { " " };
            println!(
                "{}{} | {} | {}",
                marker,
                message.internal_date.format("%Y-%m-%d %H:%M"),
                message.from_email,
                message.subject
            );
        }
    } else {
        let json: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "id": m.remote_message_id,
                    "thread_id": m.remote_thread_id,
                    "from": m.from_email,
                    "subject": m.subject,
                    "snippet": m.snippet,
                    "date": m.internal_date.to_rfc3339(),
                    "unread": m.is_unread,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
    }

    Ok(())
}
