//! Entity Store: the only write path into the local replica
//!
//! Each call is one transaction. Local writes are stamped by the hybrid
//! clock, and a `ChangeEvent` is published once the transaction commits.

use std::sync::Arc;

use serde_json::Value;

use super::connection::Storage;
use super::deletions::{self, DeletedRecord};
use super::entity_queries;
use super::queries::{self, Acknowledgement};
use super::records::StoredEntity;
use crate::clock::{Clock, HybridClock, SystemClock};
use crate::error::{EventSyncError, Result};
use crate::realtime::{ChangeEvent, ChangeNotifier};
use crate::types::*;

#[derive(Clone, Debug)]
pub struct EntityStore {
    storage: Storage,
    notifier: ChangeNotifier,
    clock: Arc<HybridClock>,
}

impl EntityStore {
    /// Open the replica; the clock resumes past every stamp already persisted
    pub fn open(config: StorageConfig, physical: Arc<dyn Clock>) -> Result<Self> {
        let storage = Storage::open(config)?;
        let clock = Arc::new(HybridClock::new(physical));

        if let Some(high_water) = storage.with_connection(persisted_high_water)? {
            clock.observe(high_water);
        }

        tracing::debug!(
            db_path = storage.db_path(),
            high_water = ?clock.high_water(),
            "Entity store opened"
        );

        Ok(Self {
            storage,
            notifier: ChangeNotifier::new(),
            clock,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(StorageConfig::in_memory(), Arc::new(SystemClock))
    }

    pub fn open_in_memory_with_clock(physical: Arc<dyn Clock>) -> Result<Self> {
        Self::open(StorageConfig::in_memory(), physical)
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn clock(&self) -> &HybridClock {
        &self.clock
    }

    /// Next local version stamp
    pub fn now(&self) -> Timestamp {
        self.clock.tick()
    }

    /// Insert a new local record, stamped now; returns the stored record
    pub fn insert<T: StoredEntity>(&self, entity: &T) -> Result<T> {
        let (id, stamp) = self.storage.with_transaction(|conn| {
            let stamp = self.clock.tick();
            Ok((queries::insert_entity(conn, entity, stamp)?, stamp))
        })?;

        let mut stored = entity.clone();
        stored.set_local_id(LocalId::Assigned(id));
        stored.set_last_modified(stamp);

        self.notifier.publish(ChangeEvent::inserted(T::COLLECTION, id));
        Ok(stored)
    }

    /// Insert a record received from the remote, keeping its identity and stamp
    pub fn insert_replica<T: StoredEntity>(&self, entity: &T) -> Result<T> {
        let id = self.storage.with_transaction(|conn| {
            queries::insert_entity(conn, entity, entity.last_modified())
        })?;
        self.clock.observe(entity.last_modified());

        let mut stored = entity.clone();
        stored.set_local_id(LocalId::Assigned(id));

        self.notifier.publish(ChangeEvent::inserted(T::COLLECTION, id));
        Ok(stored)
    }

    /// Replace a record's fields, stamped now
    pub fn update<T: StoredEntity>(&self, entity: &T) -> Result<T> {
        let stamp = self.storage.with_transaction(|conn| {
            let stamp = self.clock.tick();
            queries::update_entity(conn, entity, stamp)?;
            Ok(stamp)
        })?;

        let mut stored = entity.clone();
        stored.set_last_modified(stamp);
        self.publish_updated::<T>(entity.local_id());
        Ok(stored)
    }

    /// Replace a record's fields keeping the caller's `last_modified`
    ///
    /// Fails with `NotFound` rather than inserting.
    pub fn replace<T: StoredEntity>(&self, entity: &T) -> Result<()> {
        self.storage.with_transaction(|conn| {
            queries::update_entity(conn, entity, entity.last_modified())
        })?;
        self.clock.observe(entity.last_modified());
        self.publish_updated::<T>(entity.local_id());
        Ok(())
    }

    /// Overwrite a local record with the remote version and bind it
    pub fn overwrite_from_remote<T: StoredEntity>(&self, local_id: i64, remote: &T) -> Result<()> {
        let mut incoming = remote.clone();
        incoming.set_local_id(LocalId::Assigned(local_id));

        self.storage.with_transaction(|conn| {
            queries::update_entity(conn, &incoming, incoming.last_modified())?;
            if let Some(remote_id) = incoming.remote_id() {
                queries::bind_remote_id::<T>(conn, local_id, remote_id)?;
            }
            Ok(())
        })?;
        self.clock.observe(incoming.last_modified());

        self.notifier.publish(ChangeEvent::updated(T::COLLECTION, local_id));
        Ok(())
    }

    /// Hard-delete a record; returns whether it existed
    pub fn delete<T: StoredEntity>(&self, id: i64) -> Result<bool> {
        let removed = self.storage.with_transaction(|conn| {
            queries::delete_entity::<T>(conn, id, self.clock.tick())
        })?;

        if removed.is_some() {
            self.notifier.publish(ChangeEvent::deleted(T::COLLECTION, id));
        }
        Ok(removed.is_some())
    }

    pub fn delete_all<T: StoredEntity>(&self) -> Result<usize> {
        let removed = self.storage.with_transaction(queries::delete_all::<T>)?;
        self.notifier
            .publish(ChangeEvent::cleared(T::COLLECTION, removed));
        Ok(removed)
    }

    /// Raise only the version marker of a record
    pub fn touch_last_modified<T: StoredEntity>(&self, id: i64, timestamp: Timestamp) -> Result<()> {
        self.storage
            .with_transaction(|conn| queries::touch_last_modified::<T>(conn, id, timestamp))?;
        self.clock.observe(timestamp);
        self.notifier.publish(ChangeEvent::updated(T::COLLECTION, id));
        Ok(())
    }

    pub fn bind_remote_id<T: StoredEntity>(&self, id: i64, remote_id: &str) -> Result<()> {
        self.storage
            .with_transaction(|conn| queries::bind_remote_id::<T>(conn, id, remote_id))?;
        self.notifier.publish(ChangeEvent::updated(T::COLLECTION, id));
        Ok(())
    }

    /// Record a remote acknowledgement of the push of `pushed_version`
    pub fn acknowledge_push<T: StoredEntity>(
        &self,
        id: i64,
        remote_id: &str,
        remote_last_modified: Option<Timestamp>,
        pushed_version: Timestamp,
    ) -> Result<Acknowledgement> {
        let ack = self.storage.with_transaction(|conn| {
            queries::acknowledge_push::<T>(conn, id, remote_id, remote_last_modified, pushed_version)
        })?;
        if let Some(stamp) = remote_last_modified {
            self.clock.observe(stamp);
        }
        self.notifier.publish(ChangeEvent::updated(T::COLLECTION, id));
        Ok(ack)
    }

    pub fn set_active<T: StoredEntity>(&self, id: i64, active: bool) -> Result<()> {
        self.storage.with_transaction(|conn| {
            queries::set_active::<T>(conn, id, active, self.clock.tick())
        })?;
        self.notifier.publish(ChangeEvent::updated(T::COLLECTION, id));
        Ok(())
    }

    pub fn get<T: StoredEntity>(&self, id: i64) -> Result<Option<T>> {
        self.storage.with_connection(|conn| queries::get_by_id(conn, id))
    }

    pub fn get_by_remote_id<T: StoredEntity>(&self, remote_id: &str) -> Result<Option<T>> {
        self.storage
            .with_connection(|conn| queries::get_by_remote_id(conn, remote_id))
    }

    pub fn get_by_natural_key<T: StoredEntity>(&self, key: &str) -> Result<Option<T>> {
        self.storage
            .with_connection(|conn| queries::get_by_natural_key(conn, key))
    }

    /// Unbound local records a remote natural key could bind to
    pub fn natural_key_matches<T: StoredEntity>(&self, key: &str) -> Result<Vec<T>> {
        self.storage
            .with_connection(|conn| T::natural_key_matches(conn, key))
    }

    pub fn list_all<T: StoredEntity>(&self) -> Result<Vec<T>> {
        self.storage.with_connection(queries::list_all)
    }

    pub fn list_active<T: StoredEntity>(&self) -> Result<Vec<T>> {
        self.storage.with_connection(queries::list_active)
    }

    pub fn list_by_foreign_key<T: StoredEntity>(&self, foreign_id: i64) -> Result<Vec<T>> {
        self.storage
            .with_connection(|conn| queries::list_by_foreign_key(conn, foreign_id))
    }

    pub fn list_modified_since<T: StoredEntity>(&self, since: Timestamp) -> Result<Vec<T>> {
        self.storage
            .with_connection(|conn| queries::list_modified_since(conn, since))
    }

    pub fn push_candidates<T: StoredEntity>(&self, push_cursor: Timestamp) -> Result<Vec<T>> {
        self.storage
            .with_connection(|conn| queries::list_push_candidates(conn, push_cursor))
    }

    pub fn count<T: StoredEntity>(&self) -> Result<i64> {
        self.storage.with_connection(queries::count::<T>)
    }

    // --- Read accessors ---

    pub fn guests_by_venue(&self, venue_name: &str) -> Result<Vec<Guest>> {
        self.storage
            .with_connection(|conn| entity_queries::guests_by_venue(conn, venue_name))
    }

    pub fn volunteer_benefit_guests(&self) -> Result<Vec<Guest>> {
        self.storage
            .with_connection(entity_queries::volunteer_benefit_guests)
    }

    pub fn benefit_guest_for_volunteer(&self, volunteer_id: i64) -> Result<Option<Guest>> {
        self.storage.with_connection(|conn| {
            entity_queries::benefit_guest_for_volunteer(conn, volunteer_id)
        })
    }

    pub fn inactive_volunteers(&self) -> Result<Vec<Volunteer>> {
        self.storage.with_connection(entity_queries::inactive_volunteers)
    }

    /// Derive each volunteer's last shift and activity flag from their jobs
    ///
    /// Changed volunteers get a fresh stamp, so the next cycle pushes them.
    pub fn refresh_volunteer_activity(&self) -> Result<Vec<i64>> {
        let now = self.clock.wall();
        let changed = self.storage.with_transaction(|conn| {
            entity_queries::refresh_volunteer_activity(conn, now, || self.clock.tick())
        })?;

        for id in &changed {
            self.notifier
                .publish(ChangeEvent::updated(Collection::Volunteers, *id));
        }
        tracing::info!(changed = changed.len(), "Volunteer activity refreshed");
        Ok(changed)
    }

    /// Volunteers without a shift for longer than the cleanup window
    pub fn volunteers_due_for_cleanup(&self) -> Result<Vec<Volunteer>> {
        let now = self.clock.wall();
        self.storage
            .with_connection(|conn| entity_queries::volunteers_due_for_cleanup(conn, now))
    }

    pub fn volunteers_by_rank(&self, rank: VolunteerRank) -> Result<Vec<Volunteer>> {
        self.storage
            .with_connection(|conn| entity_queries::volunteers_by_rank(conn, rank))
    }

    pub fn jobs_by_volunteer(&self, volunteer_id: i64) -> Result<Vec<Job>> {
        self.list_by_foreign_key(volunteer_id)
    }

    pub fn jobs_by_date_range(&self, start: Timestamp, end: Timestamp) -> Result<Vec<Job>> {
        self.storage
            .with_connection(|conn| entity_queries::jobs_by_date_range(conn, start, end))
    }

    pub fn count_jobs(
        &self,
        volunteer_id: i64,
        start: Timestamp,
        end: Timestamp,
        shift_time: Option<ShiftTime>,
    ) -> Result<i64> {
        self.storage.with_connection(|conn| {
            entity_queries::count_jobs(conn, volunteer_id, start, end, shift_time)
        })
    }

    pub fn shift_job_types(&self) -> Result<Vec<JobTypeConfig>> {
        self.storage.with_connection(entity_queries::shift_job_types)
    }

    pub fn orion_job_types(&self) -> Result<Vec<JobTypeConfig>> {
        self.storage.with_connection(entity_queries::orion_job_types)
    }

    // --- Counter ---

    pub fn counter(&self) -> Result<Option<Counter>> {
        self.storage.with_connection(entity_queries::get_counter)
    }

    pub fn set_counter(&self, count: i64) -> Result<Counter> {
        if count < 0 {
            return Err(EventSyncError::InvalidInput(format!(
                "counter cannot be negative: {}",
                count
            )));
        }
        let counter = self.storage.with_transaction(|conn| {
            entity_queries::set_counter(conn, count, self.clock.tick())
        })?;
        self.notifier
            .publish(ChangeEvent::updated(Collection::Counter, COUNTER_ID));
        Ok(counter)
    }

    pub fn adjust_counter(&self, delta: i64) -> Result<Counter> {
        let counter = self.storage.with_transaction(|conn| {
            entity_queries::adjust_counter(conn, delta, self.clock.tick())
        })?;
        self.notifier
            .publish(ChangeEvent::updated(Collection::Counter, COUNTER_ID));
        Ok(counter)
    }

    pub fn reset_counter(&self) -> Result<Counter> {
        self.set_counter(0)
    }

    // --- Deletion log ---

    pub fn was_deleted(&self, collection: Collection, remote_id: &str) -> Result<bool> {
        self.storage
            .with_connection(|conn| deletions::was_deleted(conn, collection, remote_id))
    }

    pub fn deletions(&self, collection: Option<Collection>) -> Result<Vec<DeletedRecord>> {
        self.storage
            .with_connection(|conn| deletions::list_deletions(conn, collection))
    }

    /// Forget deletions older than the retention window
    pub fn prune_deletions(&self, retention_days: u32) -> Result<usize> {
        let now = self.clock.tick();
        self.storage.with_transaction(|conn| {
            deletions::prune_deletions(conn, retention_days, now)
        })
    }

    // --- Collection-erased JSON access ---

    pub fn list_json(&self, collection: Collection) -> Result<Vec<Value>> {
        with_entity!(collection, T => {
            self.list_all::<T>()?
                .iter()
                .map(|e| serde_json::to_value(e).map_err(EventSyncError::from))
                .collect()
        })
    }

    pub fn get_json(&self, collection: Collection, id: i64) -> Result<Option<Value>> {
        with_entity!(collection, T => {
            match self.get::<T>(id)? {
                Some(entity) => Ok(Some(serde_json::to_value(entity)?)),
                None => Ok(None),
            }
        })
    }

    /// Insert a record given as JSON; returns the stored record
    pub fn insert_json(&self, collection: Collection, value: Value) -> Result<Value> {
        with_entity!(collection, T => {
            let entity: T = serde_json::from_value(value)?;
            let stored = self.insert(&entity)?;
            Ok(serde_json::to_value(stored)?)
        })
    }

    pub fn delete_in(&self, collection: Collection, id: i64) -> Result<bool> {
        with_entity!(collection, T => self.delete::<T>(id))
    }

    pub fn count_in(&self, collection: Collection) -> Result<i64> {
        with_entity!(collection, T => self.count::<T>())
    }

    fn publish_updated<T: StoredEntity>(&self, id: LocalId) {
        if let Some(id) = id.get() {
            self.notifier.publish(ChangeEvent::updated(T::COLLECTION, id));
        }
    }
}

/// Highest stamp in any entity table or sync cursor
fn persisted_high_water(conn: &rusqlite::Connection) -> Result<Option<Timestamp>> {
    let mut high_water: Option<Timestamp> = conn.query_row(
        "SELECT MAX(COALESCE(MAX(push_cursor), 0), COALESCE(MAX(pull_cursor), 0))
         FROM sync_state",
        [],
        |row| row.get(0),
    )?;

    for collection in Collection::ALL {
        let max = with_entity!(collection, T => queries::max_last_modified::<T>(conn)?);
        high_water = high_water.max(max);
    }

    Ok(high_water.filter(|ts| *ts > 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::realtime::EventType;
    use pretty_assertions::assert_eq;

    fn store_at(now: Timestamp) -> (EntityStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let store = EntityStore::open_in_memory_with_clock(clock.clone()).unwrap();
        (store, clock)
    }

    #[test]
    fn test_insert_assigns_id_and_stamp() {
        let (store, _) = store_at(1_000);
        let venue = store.insert(&Venue::new("Groove")).unwrap();
        assert!(venue.id.is_assigned());
        assert_eq!(venue.last_modified, 1_000);
        assert_eq!(store.get::<Venue>(venue.id.get().unwrap()).unwrap(), Some(venue));
    }

    #[test]
    fn test_duplicate_venue_leaves_store_unchanged() {
        let (store, _) = store_at(1_000);
        store.insert(&Venue::new("MainHall")).unwrap();
        let before = store.list_all::<Venue>().unwrap();

        let err = store.insert(&Venue::new("MainHall")).unwrap_err();
        assert!(matches!(err, EventSyncError::ConstraintViolation(_)));
        assert_eq!(store.list_all::<Venue>().unwrap(), before);
    }

    #[test]
    fn test_update_stamps_monotonically() {
        let (store, clock) = store_at(1_000);
        let mut guest = store.insert(&Guest::new("Ana", 1, "Groove")).unwrap();

        // Wall clock going backwards must not lower the stamp
        clock.set(500);
        guest.invitations = 3;
        let updated = store.update(&guest).unwrap();
        assert!(updated.last_modified > 1_000);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let (store, _) = store_at(1);
        let mut guest = Guest::new("Nobody", 0, "Groove");
        guest.id = LocalId::Assigned(404);
        assert!(matches!(
            store.update(&guest),
            Err(EventSyncError::NotFound { id: 404, .. })
        ));
    }

    #[test]
    fn test_clock_resumes_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("replica.db").to_string_lossy().to_string(),
            storage_mode: StorageMode::Wal,
        };

        let clock = Arc::new(ManualClock::new(5_000));
        let store = EntityStore::open(config.clone(), clock.clone()).unwrap();
        store.insert(&Venue::new("Groove")).unwrap();
        drop(store);

        clock.set(10);
        let store = EntityStore::open(config, clock).unwrap();
        let venue = store.insert(&Venue::new("Annex")).unwrap();
        assert_eq!(venue.last_modified, 5_001);
    }

    #[test]
    fn test_replica_insert_keeps_remote_stamp() {
        let (store, _) = store_at(10);
        let mut venue = Venue::new("Groove");
        venue.remote_id = Some("r-1".into());
        venue.last_modified = 900;

        let stored = store.insert_replica(&venue).unwrap();
        assert_eq!(stored.last_modified, 900);
        assert_eq!(
            store.get_by_remote_id::<Venue>("r-1").unwrap().unwrap().id,
            stored.id
        );
        // Next local write orders after the observed remote stamp
        assert_eq!(store.now(), 901);
    }

    #[test]
    fn test_get_by_natural_key() {
        let (store, _) = store_at(10);
        let venue = store.insert(&Venue::new("Groove")).unwrap();
        store.insert(&Venue::new("Annex")).unwrap();

        let found = store.get_by_natural_key::<Venue>("Groove").unwrap();
        assert_eq!(found, Some(venue));
        assert!(store.get_by_natural_key::<Venue>("Basement").unwrap().is_none());

        // Guests carry no natural key
        store.insert(&Guest::new("Groove", 1, "Groove")).unwrap();
        assert!(store.get_by_natural_key::<Guest>("Groove").unwrap().is_none());
    }

    #[test]
    fn test_activity_refresh_restamps_changed_volunteers() {
        let (store, clock) = store_at(1_000);
        let ana = store.insert(&Volunteer::new("Ana", "B.")).unwrap();
        let ana_id = ana.id.get().unwrap();
        let mut bo = Volunteer::new("Bo", "C.");
        bo.is_active = false;
        store.insert(&bo).unwrap();
        store
            .insert(&Job::new(ana_id, "bar", "Groove", 900, ShiftTime::BeforeMidnight))
            .unwrap();

        clock.set(2_000);
        assert_eq!(store.refresh_volunteer_activity().unwrap(), vec![ana_id]);
        let refreshed = store.get::<Volunteer>(ana_id).unwrap().unwrap();
        assert_eq!(refreshed.last_shift_date, Some(900));
        assert!(refreshed.is_active);
        assert_eq!(refreshed.last_modified, 2_000);

        assert!(store.refresh_volunteer_activity().unwrap().is_empty());
        assert!(store.volunteers_due_for_cleanup().unwrap().is_empty());
    }

    #[test]
    fn test_overwrite_from_remote_binds() {
        let (store, _) = store_at(50);
        let local = store.insert(&Venue::new("Groove")).unwrap();
        let id = local.id.get().unwrap();

        let mut remote = Venue::new("Groove");
        remote.description = "Basement".into();
        remote.remote_id = Some("r-9".into());
        remote.last_modified = 80;

        store.overwrite_from_remote(id, &remote).unwrap();
        let stored = store.get::<Venue>(id).unwrap().unwrap();
        assert_eq!(stored.description, "Basement");
        assert_eq!(stored.remote_id.as_deref(), Some("r-9"));
        assert_eq!(stored.last_modified, 80);
    }

    #[test]
    fn test_counter_operations() {
        let (store, _) = store_at(1);
        assert!(store.counter().unwrap().is_none());
        assert_eq!(store.adjust_counter(4).unwrap().count, 4);
        assert_eq!(store.adjust_counter(-10).unwrap().count, 0);
        assert_eq!(store.set_counter(7).unwrap().count, 7);
        assert!(store.set_counter(-1).is_err());
        assert_eq!(store.reset_counter().unwrap().count, 0);
        assert_eq!(store.count::<Counter>().unwrap(), 1);
    }

    #[test]
    fn test_set_active_refreshes_stamp() {
        let (store, clock) = store_at(100);
        let volunteer = store.insert(&Volunteer::new("Ana", "B.")).unwrap();
        let id = volunteer.id.get().unwrap();

        clock.set(200);
        store.set_active::<Volunteer>(id, false).unwrap();
        let stored = store.get::<Volunteer>(id).unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.last_modified, 200);
        assert_eq!(store.inactive_volunteers().unwrap().len(), 1);
        assert!(store.list_active::<Volunteer>().unwrap().is_empty());

        assert!(matches!(
            store.set_active::<Guest>(1, false),
            Err(EventSyncError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_json_api() {
        let (store, _) = store_at(1);
        let stored = store
            .insert_json(
                Collection::Venues,
                serde_json::json!({ "name": "Groove", "description": "Main room" }),
            )
            .unwrap();
        let id = stored["id"].as_i64().unwrap();

        let fetched = store.get_json(Collection::Venues, id).unwrap().unwrap();
        assert_eq!(fetched["description"], "Main room");
        assert_eq!(store.list_json(Collection::Venues).unwrap().len(), 1);
        assert!(store.delete_in(Collection::Venues, id).unwrap());
        assert_eq!(store.count_in(Collection::Venues).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mutations_publish_events() {
        let (store, _) = store_at(1);
        let mut rx = store.notifier().subscribe();

        let venue = store.insert(&Venue::new("Groove")).unwrap();
        let id = venue.id.get().unwrap();
        store.delete::<Venue>(id).unwrap();
        store.delete_all::<Guest>().unwrap();

        let kinds: Vec<EventType> = vec![
            rx.recv().await.unwrap().event_type,
            rx.recv().await.unwrap().event_type,
            rx.recv().await.unwrap().event_type,
        ];
        assert_eq!(
            kinds,
            vec![
                EventType::RecordInserted,
                EventType::RecordDeleted,
                EventType::CollectionCleared
            ]
        );
    }

    #[test]
    fn test_failed_insert_publishes_nothing() {
        let (store, _) = store_at(1);
        store.insert(&Venue::new("MainHall")).unwrap();
        let mut rx = store.notifier().subscribe();
        assert!(store.insert(&Venue::new("MainHall")).is_err());
        assert!(rx.try_recv().is_err());
    }
}
