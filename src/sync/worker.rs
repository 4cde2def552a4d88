//! Background sync worker: scheduled and on-demand cycles

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use super::coordinator::SyncCoordinator;
use crate::error::{EventSyncError, Result};
use crate::types::{Collection, SyncConfig};

/// Commands for the sync worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Run one collection, or all of them
    SyncNow(Option<Collection>),
    /// Stop the worker
    Stop,
}

/// Background sync worker
pub struct SyncWorker {
    sender: mpsc::Sender<SyncCommand>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Start the worker on the current runtime
    pub fn start(coordinator: Arc<SyncCoordinator>, config: SyncConfig) -> Self {
        let (sender, mut receiver) = mpsc::channel::<SyncCommand>(100);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let period = Duration::from_secs(config.interval_secs.max(1));
            let mut schedule = interval_at(Instant::now() + period, period);

            tracing::info!(
                interval_secs = period.as_secs(),
                auto_sync = config.auto_sync,
                "Sync worker started"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    command = receiver.recv() => match command {
                        Some(SyncCommand::SyncNow(Some(collection))) => {
                            Self::sync_one(&coordinator, collection, &token).await;
                        }
                        Some(SyncCommand::SyncNow(None)) => {
                            Self::sync_all(&coordinator, &token).await;
                        }
                        Some(SyncCommand::Stop) | None => break,
                    },
                    _ = schedule.tick() => {
                        if config.auto_sync {
                            Self::sync_all(&coordinator, &token).await;
                        }
                    }
                }
            }

            tracing::info!("Sync worker stopped");
        });

        Self {
            sender,
            cancel,
            handle,
        }
    }

    async fn sync_one(coordinator: &SyncCoordinator, collection: Collection, cancel: &CancellationToken) {
        if let Err(e) = coordinator.run_cycle_with(collection, cancel).await {
            tracing::error!(collection = %collection, "Scheduled sync failed: {}", e);
        }
    }

    async fn sync_all(coordinator: &SyncCoordinator, cancel: &CancellationToken) {
        for (collection, result) in coordinator.run_all_with(cancel).await {
            if let Err(e) = result {
                tracing::error!(collection = %collection, "Scheduled sync failed: {}", e);
            }
        }
    }

    /// Queue a cycle for one collection, or for all of them
    pub async fn sync_now(&self, collection: Option<Collection>) -> Result<()> {
        self.sender
            .send(SyncCommand::SyncNow(collection))
            .await
            .map_err(|_| EventSyncError::Internal("Sync worker channel closed".to_string()))
    }

    /// Cancel any running cycle between records and wait for the worker to exit
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        // The worker may already be gone; cancellation alone stops it
        let _ = self.sender.send(SyncCommand::Stop).await;
        self.handle
            .await
            .map_err(|e| EventSyncError::Internal(format!("Sync worker panicked: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{ChangeFilter, EventType};
    use crate::storage::EntityStore;
    use crate::sync::memory::InMemoryRemote;
    use crate::types::Venue;

    fn manual_config() -> SyncConfig {
        SyncConfig {
            auto_sync: false,
            interval_secs: 3600,
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn test_sync_now_runs_a_cycle() {
        let store = EntityStore::open_in_memory().unwrap();
        let remote = Arc::new(InMemoryRemote::new());
        let coordinator = Arc::new(SyncCoordinator::new(
            store.clone(),
            remote.clone(),
            manual_config(),
        ));

        let mut filter = ChangeFilter::collection(Collection::Venues);
        filter.event_types = Some(vec![EventType::SyncCompleted]);
        let mut events = store.notifier().subscribe_filtered(filter);

        store.insert(&Venue::new("Groove")).unwrap();
        let worker = SyncWorker::start(coordinator, manual_config());
        worker.sync_now(Some(Collection::Venues)).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type, EventType::SyncCompleted);
        assert_eq!(remote.len(Collection::Venues), 1);

        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_worker() {
        let store = EntityStore::open_in_memory().unwrap();
        let coordinator = Arc::new(SyncCoordinator::new(
            store,
            Arc::new(InMemoryRemote::new()),
            manual_config(),
        ));

        let worker = SyncWorker::start(coordinator, manual_config());
        tokio::time::timeout(Duration::from_secs(5), worker.shutdown())
            .await
            .unwrap()
            .unwrap();
    }
}
