//! Last-writer-wins resolution

use serde::{Deserialize, Serialize};

use super::LocalMatch;
use crate::error::{EventSyncError, Result};
use crate::types::Entity;

/// Outcome of resolving one incoming remote record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// No local counterpart: store the remote record as a new local one
    Insert,
    /// Remote is newer: overwrite the local record and take its stamp
    RemoteWins { local_id: i64 },
    /// Local is newer: keep local values and push them
    LocalWins { local_id: i64, bind: bool },
    /// Same version on both sides
    Converged { local_id: i64, bind: bool },
}

impl Resolution {
    /// Whether the local record still needs the remote id bound
    pub fn needs_binding(&self) -> bool {
        matches!(
            self,
            Resolution::LocalWins { bind: true, .. } | Resolution::Converged { bind: true, .. }
        )
    }
}

/// Decides which side of a divergent record wins
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `remote` against its local match
    ///
    /// Identity binding is independent of which side's values win. Two
    /// unbound local records claiming one natural key fail with
    /// `DuplicateBinding` and are never merged.
    pub fn resolve<T: Entity>(&self, local: &LocalMatch<T>, remote: &T) -> Result<Resolution> {
        match local {
            LocalMatch::None => Ok(Resolution::Insert),
            LocalMatch::ByRemoteId(record) => Self::compare(record, remote, false),
            LocalMatch::ByNaturalKey(records) => match records.as_slice() {
                [] => Ok(Resolution::Insert),
                [record] => Self::compare(record, remote, true),
                many => Err(EventSyncError::DuplicateBinding {
                    collection: T::COLLECTION,
                    natural_key: remote.natural_key().unwrap_or_default().to_string(),
                    local_ids: many.iter().filter_map(|r| r.local_id().get()).collect(),
                }),
            },
        }
    }

    fn compare<T: Entity>(local: &T, remote: &T, bind: bool) -> Result<Resolution> {
        let local_id = local.local_id().get().ok_or_else(|| {
            EventSyncError::Internal(format!("{} match without local id", T::COLLECTION))
        })?;

        let resolution = match remote.last_modified().cmp(&local.last_modified()) {
            std::cmp::Ordering::Greater => Resolution::RemoteWins { local_id },
            std::cmp::Ordering::Less => Resolution::LocalWins { local_id, bind },
            std::cmp::Ordering::Equal => Resolution::Converged { local_id, bind },
        };
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LocalId, Venue};

    fn venue(id: i64, name: &str, last_modified: i64) -> Venue {
        let mut venue = Venue::new(name);
        venue.id = LocalId::Assigned(id);
        venue.last_modified = last_modified;
        venue
    }

    fn remote(name: &str, last_modified: i64) -> Venue {
        let mut venue = Venue::new(name);
        venue.remote_id = Some("r-1".into());
        venue.last_modified = last_modified;
        venue
    }

    #[test]
    fn test_last_writer_wins() {
        let resolver = ConflictResolver::new();
        let local = LocalMatch::ByRemoteId(venue(5, "Groove", 50));

        assert_eq!(
            resolver.resolve(&local, &remote("Groove", 80)).unwrap(),
            Resolution::RemoteWins { local_id: 5 }
        );
        assert_eq!(
            resolver.resolve(&local, &remote("Groove", 20)).unwrap(),
            Resolution::LocalWins { local_id: 5, bind: false }
        );
        assert_eq!(
            resolver.resolve(&local, &remote("Groove", 50)).unwrap(),
            Resolution::Converged { local_id: 5, bind: false }
        );
    }

    #[test]
    fn test_natural_key_match_binds() {
        let resolver = ConflictResolver::new();
        let local = LocalMatch::ByNaturalKey(vec![venue(3, "Groove", 90)]);

        let resolution = resolver.resolve(&local, &remote("Groove", 10)).unwrap();
        assert_eq!(resolution, Resolution::LocalWins { local_id: 3, bind: true });
        assert!(resolution.needs_binding());
    }

    #[test]
    fn test_duplicate_binding() {
        let resolver = ConflictResolver::new();
        let local = LocalMatch::ByNaturalKey(vec![venue(1, "MainHall", 1), venue(2, "mainhall", 2)]);

        match resolver.resolve(&local, &remote("MainHall", 5)) {
            Err(EventSyncError::DuplicateBinding { local_ids, natural_key, .. }) => {
                assert_eq!(local_ids, vec![1, 2]);
                assert_eq!(natural_key, "MainHall");
            }
            other => panic!("expected duplicate binding, got {:?}", other),
        }
    }

    #[test]
    fn test_no_match_inserts() {
        let resolver = ConflictResolver::new();
        assert_eq!(
            resolver.resolve(&LocalMatch::None, &remote("Groove", 1)).unwrap(),
            Resolution::Insert
        );
    }
}
