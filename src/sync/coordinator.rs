//! Sync Coordinator: one push-then-pull cycle per collection
//!
//! Push offers unbound, changed and retry-queued records to the remote.
//! Pull fetches remote changes past the pull cursor, resolves each one
//! last-writer-wins and advances the pull cursor over the prefix that
//! applied cleanly. The push cursor moves to the highest acknowledged stamp
//! only once the pull has finished, so a cycle that aborts part way leaves
//! both cursors where they were.
//!
//! Whenever the push cursor is raised, any bound record left at or below the
//! new cursor without a clean acknowledgement is queued for retry, so no
//! local change falls behind the cursor unpushed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use super::conflict::{ConflictResolver, LocalMatch, Resolution};
use super::remote::{
    decode_payload, encode_payload, OutgoingRecord, RemoteRecord, RemoteStore, UpsertAck,
};
use super::retry::with_retry;
use super::tracker::{ChangeTracker, CollectionCursors, CursorKind, SyncStatus};
use crate::error::{EventSyncError, Result};
use crate::realtime::ChangeEvent;
use crate::storage::{Acknowledgement, EntityStore, StoredEntity};
use crate::types::{Collection, SyncConfig, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Push,
    Pull,
}

/// A record that could not be synchronized this cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub phase: SyncPhase,
    pub local_id: Option<i64>,
    pub remote_id: Option<String>,
    pub error: String,
}

/// Outcome of one collection cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub collection: Collection,
    /// Records acknowledged by the remote
    pub pushed: usize,
    /// Remote records written locally
    pub pulled: usize,
    /// Remote records already identical to the local version
    pub unchanged: usize,
    /// Records not applied this cycle
    pub skipped: usize,
    pub conflicts: usize,
    pub failures: Vec<RecordFailure>,
    pub cursors_before: CollectionCursors,
    pub cursors_after: CollectionCursors,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl SyncReport {
    fn new(collection: Collection, cursors: CollectionCursors) -> Self {
        let now = Utc::now();
        Self {
            collection,
            pushed: 0,
            pulled: 0,
            unchanged: 0,
            skipped: 0,
            conflicts: 0,
            failures: Vec::new(),
            cursors_before: cursors,
            cursors_after: cursors,
            cancelled: false,
            started_at: now,
            completed_at: now,
        }
    }

    fn record_failure(
        &mut self,
        phase: SyncPhase,
        local_id: Option<i64>,
        remote_id: Option<&str>,
        error: &EventSyncError,
    ) {
        self.skipped += 1;
        self.failures.push(RecordFailure {
            phase,
            local_id,
            remote_id: remote_id.map(str::to_string),
            error: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

pub struct SyncCoordinator {
    store: EntityStore,
    tracker: ChangeTracker,
    remote: Arc<dyn RemoteStore>,
    resolver: ConflictResolver,
    config: SyncConfig,
    locks: HashMap<Collection, Arc<AsyncMutex<()>>>,
}

impl SyncCoordinator {
    pub fn new(store: EntityStore, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        let locks = Collection::ALL
            .iter()
            .map(|collection| (*collection, Arc::new(AsyncMutex::new(()))))
            .collect();

        Self {
            tracker: ChangeTracker::new(store.clone()),
            store,
            remote,
            resolver: ConflictResolver::new(),
            config,
            locks,
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run_cycle(&self, collection: Collection) -> Result<SyncReport> {
        self.run_cycle_with(collection, &CancellationToken::new())
            .await
    }

    /// Run one cycle; `cancel` is checked between records
    ///
    /// Fails fast with `SyncInProgress` when the collection is already
    /// syncing. An aborted cycle leaves both cursors where they were.
    pub async fn run_cycle_with(
        &self,
        collection: Collection,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let lock = self.locks.get(&collection).cloned().ok_or_else(|| {
            EventSyncError::Internal(format!("no sync lock for {}", collection))
        })?;
        let _guard = lock
            .try_lock_owned()
            .map_err(|_| EventSyncError::SyncInProgress(collection))?;

        let notifier = self.store.notifier();
        notifier.publish(ChangeEvent::sync_started(collection));
        tracing::info!(collection = %collection, "Sync cycle started");

        let result = with_entity!(collection, T => self.run_typed::<T>(cancel).await);

        match &result {
            Ok(report) => {
                let summary = (!report.failures.is_empty())
                    .then(|| format!("{} records failed", report.failures.len()));
                self.tracker.record_run(collection, summary.as_deref())?;

                tracing::info!(
                    collection = %collection,
                    pushed = report.pushed,
                    pulled = report.pulled,
                    unchanged = report.unchanged,
                    skipped = report.skipped,
                    conflicts = report.conflicts,
                    cancelled = report.cancelled,
                    push_cursor = report.cursors_after.push,
                    pull_cursor = report.cursors_after.pull,
                    "Sync cycle completed"
                );
                notifier.publish(ChangeEvent::sync_completed(
                    collection,
                    report.pushed,
                    report.pulled,
                ));
            }
            Err(err) => {
                tracing::error!(collection = %collection, error = %err, "Sync cycle aborted");
                if let Err(record_err) = self.tracker.record_run(collection, Some(&err.to_string())) {
                    tracing::warn!(
                        collection = %collection,
                        error = %record_err,
                        "Could not record failed sync run"
                    );
                }
                notifier.publish(ChangeEvent::sync_failed(collection, &err.to_string()));
            }
        }

        result
    }

    /// Run every collection concurrently
    pub async fn run_all(&self) -> Vec<(Collection, Result<SyncReport>)> {
        self.run_all_with(&CancellationToken::new()).await
    }

    pub async fn run_all_with(
        &self,
        cancel: &CancellationToken,
    ) -> Vec<(Collection, Result<SyncReport>)> {
        let cycles = Collection::ALL.iter().map(|collection| async move {
            (*collection, self.run_cycle_with(*collection, cancel).await)
        });
        join_all(cycles).await
    }

    pub fn status(&self) -> Result<Vec<SyncStatus>> {
        Collection::ALL
            .iter()
            .map(|collection| self.tracker.status(*collection))
            .collect()
    }

    /// Forget local deletions older than the configured retention
    pub fn prune_deletions(&self) -> Result<usize> {
        let pruned = self
            .store
            .prune_deletions(self.config.deletion_retention_days)?;
        tracing::info!(
            pruned,
            retention_days = self.config.deletion_retention_days,
            "Pruned deletion log"
        );
        Ok(pruned)
    }

    async fn run_typed<T: StoredEntity>(&self, cancel: &CancellationToken) -> Result<SyncReport> {
        let collection = T::COLLECTION;
        let cursors_before = self.tracker.cursors(collection)?;
        let mut report = SyncReport::new(collection, cursors_before);

        let pushed = self
            .push_phase::<T>(cursors_before.push, cancel, &mut report)
            .await?;

        if report.cancelled {
            self.raise_push_cursor::<T>(cursors_before.push, pushed.target, &pushed.acked)?;
        } else {
            self.pull_phase::<T>(cursors_before, &pushed, cancel, &mut report)
                .await?;
        }

        report.cursors_after = self.tracker.cursors(collection)?;
        report.completed_at = Utc::now();
        Ok(report)
    }

    // --- Push ---

    async fn push_phase<T: StoredEntity>(
        &self,
        push_cursor: Timestamp,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<PushOutcome> {
        let collection = T::COLLECTION;
        let mut outcome = PushOutcome {
            target: push_cursor,
            acked: HashMap::new(),
            superseded: HashMap::new(),
            remote_behind: HashMap::new(),
        };
        let candidates = self.tracker.push_candidates::<T>()?;
        if candidates.is_empty() {
            return Ok(outcome);
        }

        let replica_id = self.tracker.replica_id()?;
        tracing::debug!(
            collection = %collection,
            candidates = candidates.len(),
            push_cursor,
            "Push phase started"
        );

        for record in &candidates {
            if cancel.is_cancelled() {
                tracing::info!(collection = %collection, "Push cancelled");
                report.cancelled = true;
                break;
            }
            let Some(local_id) = record.local_id().get() else {
                continue;
            };

            match self.push_record(record, local_id, &replica_id).await {
                Ok((upsert, ack)) => {
                    let stamp = upsert.remote_last_modified.unwrap_or(record.last_modified());
                    report.pushed += 1;

                    if ack.superseded {
                        tracing::debug!(
                            collection = %collection,
                            local_id,
                            "Record changed while its push was in flight"
                        );
                        self.tracker
                            .mark_retry(collection, local_id, "edited during push")?;
                        outcome.target = outcome.target.max(stamp);
                        outcome.superseded.insert(upsert.remote_id, stamp);
                    } else {
                        self.tracker.clear_retry(collection, local_id)?;
                        outcome.target = outcome.target.max(ack.last_modified);
                        outcome.acked.insert(local_id, ack.last_modified);
                        if ack.remote_behind {
                            outcome.remote_behind.insert(upsert.remote_id, stamp);
                        }
                    }
                }
                Err(err) if err.aborts_cycle() => return Err(err),
                Err(EventSyncError::NotFound { .. }) => {
                    tracing::debug!(
                        collection = %collection,
                        local_id,
                        "Record deleted while its push was in flight"
                    );
                    report.skipped += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        collection = %collection,
                        local_id,
                        remote_id = record.remote_id(),
                        error = %err,
                        "Push failed, record queued for retry"
                    );
                    report.record_failure(SyncPhase::Push, Some(local_id), record.remote_id(), &err);
                    self.tracker.mark_retry(collection, local_id, &err.to_string())?;
                }
            }
        }

        Ok(outcome)
    }

    /// Upsert one record and record the acknowledgement locally
    async fn push_record<T: StoredEntity>(
        &self,
        record: &T,
        local_id: i64,
        replica_id: &str,
    ) -> Result<(UpsertAck, Acknowledgement)> {
        let collection = T::COLLECTION;
        let pushed_version = record.last_modified();
        let outgoing = OutgoingRecord {
            remote_id: record.remote_id().map(str::to_string),
            idempotency_key: format!("{}:{}:{}", replica_id, collection, local_id),
            natural_key: record.natural_key().map(|key| key.trim().to_string()),
            last_modified: pushed_version,
            payload: encode_payload(record)?,
        };

        let remote = Arc::clone(&self.remote);
        let ack = with_retry(&self.config.retry, "upsert", || {
            let remote = Arc::clone(&remote);
            let outgoing = outgoing.clone();
            async move { remote.upsert(collection, outgoing).await }
        })
        .await?;

        let acknowledgement = self.store.acknowledge_push::<T>(
            local_id,
            &ack.remote_id,
            ack.remote_last_modified,
            pushed_version,
        )?;

        tracing::debug!(
            collection = %collection,
            local_id,
            remote_id = %ack.remote_id,
            last_modified = acknowledgement.last_modified,
            "Pushed record"
        );

        Ok((ack, acknowledgement))
    }

    /// Advance the push cursor from `from` to `to`
    ///
    /// Bound records at or below `to` that `settled` does not hold at their
    /// current stamp are queued for retry first.
    fn raise_push_cursor<T: StoredEntity>(
        &self,
        from: Timestamp,
        to: Timestamp,
        settled: &HashMap<i64, Timestamp>,
    ) -> Result<Timestamp> {
        if to <= from {
            return Ok(from);
        }
        let collection = T::COLLECTION;

        for record in self.tracker.candidates::<T>(from)? {
            if record.last_modified() > to || record.remote_id().is_none() {
                continue;
            }
            let Some(local_id) = record.local_id().get() else {
                continue;
            };
            if settled.get(&local_id) == Some(&record.last_modified()) {
                continue;
            }
            if !self.tracker.is_queued(collection, local_id)? {
                tracing::debug!(
                    collection = %collection,
                    local_id,
                    "Record changed during sync, queued for retry"
                );
                self.tracker
                    .mark_retry(collection, local_id, "changed during sync")?;
            }
        }

        self.tracker.advance(collection, CursorKind::Push, to)
    }

    // --- Pull ---

    async fn pull_phase<T: StoredEntity>(
        &self,
        cursors: CollectionCursors,
        pushed: &PushOutcome,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<()> {
        let collection = T::COLLECTION;
        let pull_cursor = cursors.pull;
        let remote = Arc::clone(&self.remote);
        let mut records = with_retry(&self.config.retry, "fetch_changed_since", || {
            let remote = Arc::clone(&remote);
            async move { remote.fetch_changed_since(collection, pull_cursor).await }
        })
        .await?;

        records.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.remote_id.cmp(&b.remote_id))
        });
        tracing::debug!(
            collection = %collection,
            fetched = records.len(),
            pull_cursor,
            "Pull phase started"
        );

        // Local records with nothing left to push, at the stamp they hold
        let mut settled = pushed.acked.clone();
        let mut applied_through = pull_cursor;
        // Stamp of the first record not applied; the cursor stays below it
        let mut barrier: Option<Timestamp> = None;

        for record in &records {
            if cancel.is_cancelled() {
                tracing::info!(collection = %collection, "Pull cancelled");
                report.cancelled = true;
                barrier.get_or_insert(record.last_modified);
                break;
            }
            self.store.clock().observe(record.last_modified);

            match self.pull_record::<T>(record, pushed, report) {
                Ok(outcome) => {
                    if let Some(local_id) = outcome {
                        settled.insert(local_id, record.last_modified);
                    }
                    if barrier.is_none() {
                        applied_through = applied_through.max(record.last_modified);
                    }
                }
                Err(err) if err.aborts_cycle() => {
                    if let EventSyncError::DuplicateBinding { .. } = err {
                        tracing::error!(
                            collection = %collection,
                            remote_id = %record.remote_id,
                            error = %err,
                            "Integrity fault, manual reconciliation required"
                        );
                    }
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        collection = %collection,
                        remote_id = %record.remote_id,
                        error = %err,
                        "Pull failed, record will be fetched again"
                    );
                    report.record_failure(SyncPhase::Pull, None, Some(&record.remote_id), &err);
                    barrier.get_or_insert(record.last_modified);
                }
            }
        }

        let target = match barrier {
            Some(stamp) => applied_through.min(stamp - 1),
            None => applied_through,
        };
        if target > pull_cursor {
            self.tracker.advance(collection, CursorKind::Pull, target)?;
        }

        // Pushed and pulled versions need no push back
        let high = settled
            .values()
            .copied()
            .fold(pushed.target, Timestamp::max);
        self.raise_push_cursor::<T>(cursors.push, high, &settled)?;
        Ok(())
    }

    /// Apply one remote record; returns the local id when the local record
    /// ends up holding the remote version
    fn pull_record<T: StoredEntity>(
        &self,
        record: &RemoteRecord,
        pushed: &PushOutcome,
        report: &mut SyncReport,
    ) -> Result<Option<i64>> {
        let collection = T::COLLECTION;
        let push_cursor = pushed.target;

        if self.config.honor_local_deletions
            && self.store.was_deleted(collection, &record.remote_id)?
        {
            tracing::debug!(
                collection = %collection,
                remote_id = %record.remote_id,
                "Skipping record deleted locally"
            );
            report.skipped += 1;
            return Ok(None);
        }

        // The remote still holds the version this cycle pushed, but the
        // local record has moved on and is queued to go out again
        if pushed.superseded.get(&record.remote_id) == Some(&record.last_modified) {
            tracing::debug!(
                collection = %collection,
                remote_id = %record.remote_id,
                "Skipping echo of a push superseded by a local edit"
            );
            report.skipped += 1;
            return Ok(None);
        }

        // Our own write, stamped by a remote clock running behind ours
        if pushed.remote_behind.get(&record.remote_id) == Some(&record.last_modified) {
            tracing::debug!(
                collection = %collection,
                remote_id = %record.remote_id,
                "Echo of a push the remote stamped behind the local version"
            );
            report.unchanged += 1;
            return Ok(None);
        }

        let incoming: T = decode_payload(record)?;
        let local = LocalMatch::locate(&self.store, &incoming)?;
        let resolution = self.resolver.resolve(&local, &incoming)?;
        tracing::debug!(
            collection = %collection,
            remote_id = %record.remote_id,
            ?resolution,
            "Resolved remote record"
        );

        match resolution {
            Resolution::Insert => {
                let stored = self.store.insert_replica(&incoming)?;
                report.pulled += 1;
                Ok(stored.local_id().get())
            }
            Resolution::RemoteWins { local_id } => {
                let local_version = matched_version(&local).unwrap_or_default();
                let dirty = local_version > push_cursor
                    || self.tracker.is_queued(collection, local_id)?;

                self.store.overwrite_from_remote(local_id, &incoming)?;
                self.tracker.clear_retry(collection, local_id)?;

                report.pulled += 1;
                if dirty {
                    tracing::info!(
                        collection = %collection,
                        local_id,
                        remote_id = %record.remote_id,
                        "Unpushed local change overwritten by newer remote version"
                    );
                    report.conflicts += 1;
                }
                Ok(Some(local_id))
            }
            Resolution::LocalWins { local_id, bind } => {
                self.tracker
                    .mark_retry(collection, local_id, "local version is newer")?;
                if bind {
                    self.store.bind_remote_id::<T>(local_id, &record.remote_id)?;
                }
                report.conflicts += 1;
                Ok(None)
            }
            Resolution::Converged { local_id, bind } => {
                if bind {
                    self.store.bind_remote_id::<T>(local_id, &record.remote_id)?;
                }
                report.unchanged += 1;
                Ok(Some(local_id))
            }
        }
    }
}

/// Result of the push phase, persisted only once the pull has run
struct PushOutcome {
    /// Push cursor the acknowledgements justify
    target: Timestamp,
    /// Local id to the stamp it holds after a clean acknowledgement
    acked: HashMap<i64, Timestamp>,
    /// Remote id to acknowledged stamp, for pushes overtaken by a local edit
    superseded: HashMap<String, Timestamp>,
    /// Remote id to acknowledged stamp, where the remote stamped below the
    /// pushed version
    remote_behind: HashMap<String, Timestamp>,
}

fn matched_version<T: StoredEntity>(local: &LocalMatch<T>) -> Option<Timestamp> {
    match local {
        LocalMatch::ByRemoteId(record) => Some(record.last_modified()),
        LocalMatch::ByNaturalKey(records) => records.first().map(|r| r.last_modified()),
        LocalMatch::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sync::memory::InMemoryRemote;
    use crate::types::*;
    use pretty_assertions::assert_eq;

    fn setup() -> (SyncCoordinator, Arc<InMemoryRemote>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = EntityStore::open_in_memory_with_clock(clock.clone()).unwrap();
        let remote = Arc::new(InMemoryRemote::new());
        let coordinator = SyncCoordinator::new(store, remote.clone(), SyncConfig::default());
        (coordinator, remote, clock)
    }

    #[tokio::test]
    async fn test_push_binds_new_records() {
        let (coordinator, remote, _) = setup();
        let venue = coordinator.store().insert(&Venue::new("Groove")).unwrap();

        let report = coordinator.run_cycle(Collection::Venues).await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.cursors_after.push, venue.last_modified);

        let stored = coordinator
            .store()
            .get::<Venue>(venue.id.get().unwrap())
            .unwrap()
            .unwrap();
        let remote_id = stored.remote_id.unwrap();
        assert_eq!(
            remote.get(Collection::Venues, &remote_id).unwrap().payload["name"],
            "Groove"
        );
        // Our own record comes back converged on pull
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.pulled, 0);
    }

    #[tokio::test]
    async fn test_pull_inserts_unknown_records() {
        let (coordinator, remote, _) = setup();
        let remote_id = remote
            .put(
                Collection::Guests,
                serde_json::to_value(Guest::new("Bea", 2, "Groove")).unwrap(),
                500,
            )
            .unwrap();

        let report = coordinator.run_cycle(Collection::Guests).await.unwrap();
        assert_eq!(report.pulled, 1);
        assert_eq!(report.cursors_after.pull, 500);

        let local = coordinator
            .store()
            .get_by_remote_id::<Guest>(&remote_id)
            .unwrap()
            .unwrap();
        assert_eq!(local.name, "Bea");
        assert_eq!(local.last_modified, 500);
        // Pulled version is not pushed back
        assert_eq!(remote.upsert_count(), 0);
        assert_eq!(report.cursors_after.push, 500);
    }

    #[tokio::test]
    async fn test_busy_collection_fails_fast() {
        let (coordinator, _, _) = setup();
        let _held = coordinator.locks[&Collection::Jobs]
            .clone()
            .try_lock_owned()
            .unwrap();

        assert!(matches!(
            coordinator.run_cycle(Collection::Jobs).await,
            Err(EventSyncError::SyncInProgress(Collection::Jobs))
        ));
        // Other collections are independent
        assert!(coordinator.run_cycle(Collection::Venues).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_moves_nothing() {
        let (coordinator, remote, _) = setup();
        coordinator.store().insert(&Venue::new("Groove")).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = coordinator
            .run_cycle_with(Collection::Venues, &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.pushed, 0);
        assert_eq!(report.cursors_after, CollectionCursors::default());
        assert_eq!(remote.upsert_count(), 0);
    }

    #[tokio::test]
    async fn test_local_win_is_queued_and_bound() {
        let (coordinator, remote, clock) = setup();
        remote
            .put(
                Collection::Venues,
                serde_json::json!({ "name": "MainHall", "description": "old", "is_active": true }),
                900,
            )
            .unwrap();
        // Push is rejected because the remote already holds the name
        clock.set(2_000);
        let local = coordinator.store().insert(&Venue::new("mainhall")).unwrap();

        let report = coordinator.run_cycle(Collection::Venues).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.conflicts, 1);

        let id = local.id.get().unwrap();
        let bound = coordinator.store().get::<Venue>(id).unwrap().unwrap();
        assert!(bound.remote_id.is_some());
        assert!(coordinator.tracker().is_queued(Collection::Venues, id).unwrap());

        // Next cycle pushes the local values onto the bound remote record
        let report = coordinator.run_cycle(Collection::Venues).await.unwrap();
        assert_eq!(report.pushed, 1);
        assert!(report.failures.is_empty());
        let remote_record = remote
            .get(Collection::Venues, bound.remote_id.as_deref().unwrap())
            .unwrap();
        assert_eq!(remote_record.payload["name"], "mainhall");
        assert_eq!(remote.len(Collection::Venues), 1);
    }

    #[tokio::test]
    async fn test_run_all_covers_every_collection() {
        let (coordinator, _, _) = setup();
        let results = coordinator.run_all().await;
        assert_eq!(results.len(), Collection::ALL.len());
        assert!(results.iter().all(|(_, result)| result.is_ok()));
        assert_eq!(coordinator.status().unwrap().len(), Collection::ALL.len());
    }
}
