//! Log of bound records deleted locally
//!
//! Deletes are not propagated to the remote. The log only keeps pulls from
//! resurrecting a record the user removed, until the entry ages out.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Collection, Timestamp};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedRecord {
    pub collection: Collection,
    pub remote_id: String,
    pub local_id: i64,
    pub deleted_at: Timestamp,
}

pub fn record_deletion(
    conn: &Connection,
    collection: Collection,
    remote_id: &str,
    local_id: i64,
    deleted_at: Timestamp,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO deleted_records (collection, remote_id, local_id, deleted_at)
         VALUES (?, ?, ?, ?)",
        params![collection.as_str(), remote_id, local_id, deleted_at],
    )?;
    Ok(())
}

pub fn was_deleted(conn: &Connection, collection: Collection, remote_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM deleted_records WHERE collection = ? AND remote_id = ?",
        params![collection.as_str(), remote_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Drop entries older than the retention window; returns how many were removed
pub fn prune_deletions(conn: &Connection, retention_days: u32, now: Timestamp) -> Result<usize> {
    let cutoff = now.saturating_sub(i64::from(retention_days) * MILLIS_PER_DAY);
    let removed = conn.execute(
        "DELETE FROM deleted_records WHERE deleted_at < ?",
        params![cutoff],
    )?;
    Ok(removed)
}

pub fn list_deletions(conn: &Connection, collection: Option<Collection>) -> Result<Vec<DeletedRecord>> {
    let mut stmt = conn.prepare(
        "SELECT collection, remote_id, local_id, deleted_at FROM deleted_records
         WHERE (?1 IS NULL OR collection = ?1)
         ORDER BY deleted_at DESC, remote_id ASC",
    )?;

    let rows = stmt.query_map(params![collection.map(|c| c.as_str())], |row| {
        let collection: String = row.get(0)?;
        Ok((collection, row.get(1)?, row.get(2)?, row.get(3)?))
    })?;

    let mut deletions = Vec::new();
    for row in rows {
        let (collection, remote_id, local_id, deleted_at): (String, String, i64, i64) = row?;
        // Rows are only ever written from a typed Collection
        if let Ok(collection) = collection.parse() {
            deletions.push(DeletedRecord {
                collection,
                remote_id,
                local_id,
                deleted_at,
            });
        }
    }
    Ok(deletions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn test_record_and_prune() {
        let storage = Storage::open_in_memory().unwrap();
        let now = 100 * MILLIS_PER_DAY;

        storage
            .with_transaction(|conn| {
                record_deletion(conn, Collection::Guests, "r-old", 1, now - 40 * MILLIS_PER_DAY)?;
                record_deletion(conn, Collection::Guests, "r-new", 2, now - MILLIS_PER_DAY)?;
                Ok(())
            })
            .unwrap();

        storage
            .with_connection(|conn| {
                assert!(was_deleted(conn, Collection::Guests, "r-old")?);
                assert!(!was_deleted(conn, Collection::Venues, "r-old")?);

                assert_eq!(prune_deletions(conn, 30, now)?, 1);
                assert!(!was_deleted(conn, Collection::Guests, "r-old")?);

                let remaining = list_deletions(conn, Some(Collection::Guests))?;
                assert_eq!(remaining.len(), 1);
                assert_eq!(remaining[0].remote_id, "r-new");
                assert_eq!(remaining[0].local_id, 2);
                Ok(())
            })
            .unwrap();
    }
}
