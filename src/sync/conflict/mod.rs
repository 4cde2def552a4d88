//! Conflict resolution between local and remote versions of a record
//!
//! A pulled record is first matched to its local counterpart (by remote id,
//! else by natural key), then resolved last-writer-wins on `last_modified`.

mod resolver;

pub use resolver::{ConflictResolver, Resolution};

use crate::error::Result;
use crate::storage::{EntityStore, StoredEntity};

/// Local counterpart of an incoming remote record
#[derive(Debug, Clone, PartialEq)]
pub enum LocalMatch<T> {
    /// Already bound to the same remote id
    ByRemoteId(T),
    /// Unbound records sharing the natural key; more than one is an integrity fault
    ByNaturalKey(Vec<T>),
    None,
}

impl<T: StoredEntity> LocalMatch<T> {
    /// Find the local counterpart of `remote` in the store
    pub fn locate(store: &EntityStore, remote: &T) -> Result<Self> {
        if let Some(remote_id) = remote.remote_id() {
            if let Some(local) = store.get_by_remote_id::<T>(remote_id)? {
                return Ok(LocalMatch::ByRemoteId(local));
            }
        }

        match remote.natural_key() {
            Some(key) => {
                let matches = store.natural_key_matches::<T>(key)?;
                if matches.is_empty() {
                    Ok(LocalMatch::None)
                } else {
                    Ok(LocalMatch::ByNaturalKey(matches))
                }
            }
            None => Ok(LocalMatch::None),
        }
    }
}
