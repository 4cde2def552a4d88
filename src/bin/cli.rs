//! EventSync CLI
//!
//! Command-line access to the local replica and its sync engine.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use eventsync::error::{EventSyncError, Result};
use eventsync::realtime::ChangeFilter;
use eventsync::storage::EntityStore;
use eventsync::sync::{InMemoryRemote, SyncCoordinator, SyncWorker};
use eventsync::types::*;
use eventsync::SystemClock;

#[derive(Parser)]
#[command(name = "eventsync")]
#[command(about = "Event and volunteer replica with two-way sync")]
#[command(version)]
struct Cli {
    /// Local replica database path
    #[arg(
        long,
        env = "EVENTSYNC_DB_PATH",
        default_value = "~/.local/share/eventsync/replica.db"
    )]
    db_path: String,

    /// File backing the remote store
    #[arg(
        long,
        env = "EVENTSYNC_REMOTE_PATH",
        default_value = "~/.local/share/eventsync/remote.json"
    )]
    remote_path: String,

    /// Journal mode: wal (local disk) or rollback (synced folder)
    #[arg(long, env = "EVENTSYNC_STORAGE_MODE", default_value = "wal")]
    storage_mode: StorageMode,

    /// Seconds between scheduled cycles in watch mode
    #[arg(long, env = "EVENTSYNC_SYNC_INTERVAL", default_value = "300")]
    interval_secs: u64,

    /// Pull remote records even if they were deleted locally
    #[arg(long, env = "EVENTSYNC_IGNORE_DELETIONS")]
    ignore_deletions: bool,

    /// Days a local deletion is remembered
    #[arg(long, env = "EVENTSYNC_DELETION_RETENTION_DAYS", default_value = "30")]
    retention_days: u32,

    /// Log as JSON lines
    #[arg(long, env = "EVENTSYNC_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show sync cursors and pending work per collection
    Status,
    /// List the records of a collection
    List { collection: Collection },
    /// Get a record by local id
    Get { collection: Collection, id: i64 },
    /// Insert a record given as JSON
    Insert { collection: Collection, json: String },
    /// Delete a record by local id
    Delete { collection: Collection, id: i64 },
    /// Show or adjust the people counter
    Counter {
        /// Amount to add (negative to subtract)
        #[arg(allow_negative_numbers = true)]
        delta: Option<i64>,
        /// Set the counter back to zero
        #[arg(long, conflicts_with = "delta")]
        reset: bool,
    },
    /// Run a sync cycle for one collection, or all of them
    Sync { collection: Option<Collection> },
    /// Sync on a schedule and print every change until interrupted
    Watch,
    /// Forget local deletions past the retention window
    PruneDeletions,
    /// Derive volunteer activity from jobs and list volunteers due for cleanup
    Activity,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Err(e) = run(cli).await {
        tracing::error!(code = e.code(), "{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Expand ~ in paths
    let storage_config = StorageConfig {
        db_path: shellexpand::tilde(&cli.db_path).to_string(),
        storage_mode: cli.storage_mode,
    };
    let remote_path = shellexpand::tilde(&cli.remote_path).to_string();

    let sync_config = SyncConfig {
        interval_secs: cli.interval_secs,
        honor_local_deletions: !cli.ignore_deletions,
        deletion_retention_days: cli.retention_days,
        ..SyncConfig::default()
    };

    let store = EntityStore::open(storage_config, Arc::new(SystemClock))?;

    match cli.command {
        Commands::Status => {
            let coordinator = coordinator(&store, &remote_path, &sync_config)?;
            print_json(&coordinator.status()?)?;
        }

        Commands::List { collection } => {
            for record in store.list_json(collection)? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }

        Commands::Get { collection, id } => match store.get_json(collection, id)? {
            Some(record) => print_json(&record)?,
            None => return Err(EventSyncError::NotFound { collection, id }),
        },

        Commands::Insert { collection, json } => {
            let value: serde_json::Value = serde_json::from_str(&json)
                .map_err(|e| EventSyncError::InvalidInput(format!("invalid JSON: {}", e)))?;
            let stored = store.insert_json(collection, value)?;
            print_json(&stored)?;
        }

        Commands::Delete { collection, id } => {
            if !store.delete_in(collection, id)? {
                return Err(EventSyncError::NotFound { collection, id });
            }
            println!("Deleted {} #{}", collection, id);
        }

        Commands::Counter { delta, reset } => {
            let counter = match (delta, reset) {
                (_, true) => Some(store.reset_counter()?),
                (Some(delta), false) => Some(store.adjust_counter(delta)?),
                (None, false) => store.counter()?,
            };
            println!("{}", counter.map(|c| c.count).unwrap_or(0));
        }

        Commands::Sync { collection } => {
            let coordinator = coordinator(&store, &remote_path, &sync_config)?;
            let cancel = cancel_on_ctrl_c();

            match collection {
                Some(collection) => {
                    let report = coordinator.run_cycle_with(collection, &cancel).await?;
                    print_json(&report)?;
                }
                None => {
                    let mut first_error = None;
                    for (collection, result) in coordinator.run_all_with(&cancel).await {
                        match result {
                            Ok(report) => print_json(&report)?,
                            Err(e) => {
                                eprintln!("{}: {}", collection, e);
                                first_error.get_or_insert(e);
                            }
                        }
                    }
                    if let Some(e) = first_error {
                        return Err(e);
                    }
                }
            }
        }

        Commands::Watch => {
            let coordinator = Arc::new(coordinator(&store, &remote_path, &sync_config)?);
            let mut events = store.notifier().subscribe_filtered(ChangeFilter::default());

            let worker = SyncWorker::start(coordinator, sync_config.clone());
            worker.sync_now(None).await?;

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Some(event) => println!("{}", serde_json::to_string(&event)?),
                        None => break,
                    },
                }
            }

            worker.shutdown().await?;
        }

        Commands::PruneDeletions => {
            let coordinator = coordinator(&store, &remote_path, &sync_config)?;
            let pruned = coordinator.prune_deletions()?;
            println!("Pruned {} deletion records", pruned);
        }

        Commands::Activity => {
            let changed = store.refresh_volunteer_activity()?;
            println!("Updated {} volunteers", changed.len());
            for volunteer in store.volunteers_due_for_cleanup()? {
                println!(
                    "Due for cleanup: {} {} (id {:?})",
                    volunteer.name,
                    volunteer.last_name_abbreviation,
                    volunteer.id.get()
                );
            }
        }
    }

    Ok(())
}

fn coordinator(store: &EntityStore, remote_path: &str, config: &SyncConfig) -> Result<SyncCoordinator> {
    let remote = InMemoryRemote::open(remote_path)?;
    Ok(SyncCoordinator::new(
        store.clone(),
        Arc::new(remote),
        config.clone(),
    ))
}

/// Token cancelled on the first Ctrl-C, so a running cycle stops between records
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping after the current record");
            token.cancel();
        }
    });
    cancel
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
