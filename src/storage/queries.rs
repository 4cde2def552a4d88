//! Generic CRUD and sync queries over every entity table

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Params};

use super::deletions::record_deletion;
use super::records::StoredEntity;
use crate::error::{EventSyncError, Result};
use crate::types::*;

fn select_sql<T: StoredEntity>() -> String {
    format!(
        "SELECT id, remote_id, last_modified, {} FROM {}",
        T::DATA_COLUMNS.join(", "),
        T::TABLE
    )
}

fn query_list<T: StoredEntity, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| T::from_row(row))?;
    let mut entities = Vec::new();
    for row in rows {
        entities.push(row?);
    }
    Ok(entities)
}

fn query_one<T: StoredEntity, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<T>> {
    Ok(conn
        .query_row(sql, params, |row| T::from_row(row))
        .optional()?)
}

/// Select records with a trailing `WHERE ... ORDER BY ...` clause
pub(crate) fn query_entities<T: StoredEntity, P: Params>(
    conn: &Connection,
    clause: &str,
    params: P,
) -> Result<Vec<T>> {
    let sql = format!("{} {}", select_sql::<T>(), clause);
    query_list(conn, &sql, params)
}

fn not_found<T: StoredEntity>(id: i64) -> EventSyncError {
    EventSyncError::NotFound {
        collection: T::COLLECTION,
        id,
    }
}

fn assigned_id<T: StoredEntity>(entity: &T) -> Result<i64> {
    entity.local_id().get().ok_or_else(|| {
        EventSyncError::InvalidInput(format!(
            "{} record has no local id",
            T::COLLECTION
        ))
    })
}

/// Insert a record with the given version stamp; returns its local id
///
/// An `Unassigned` id is allocated by SQLite and never reused. The record's
/// `remote_id` is stored as-is.
pub fn insert_entity<T: StoredEntity>(
    conn: &Connection,
    entity: &T,
    last_modified: Timestamp,
) -> Result<i64> {
    let mut columns = vec!["remote_id", "last_modified"];
    let mut values = vec![
        entity
            .remote_id()
            .map(|r| Value::Text(r.to_string()))
            .unwrap_or(Value::Null),
        Value::Integer(last_modified),
    ];

    if let LocalId::Assigned(id) = entity.local_id() {
        columns.insert(0, "id");
        values.insert(0, Value::Integer(id));
    }

    columns.extend_from_slice(T::DATA_COLUMNS);
    values.extend(entity.data_values()?);

    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        T::TABLE,
        columns.join(", "),
        placeholders
    );

    conn.execute(&sql, params_from_iter(values.iter()))
        .map_err(|e| EventSyncError::from_write(e, &format!("insert into {}", T::TABLE)))?;

    match entity.local_id() {
        LocalId::Assigned(id) => Ok(id),
        LocalId::Unassigned => Ok(conn.last_insert_rowid()),
    }
}

/// Replace every data column of an existing record and set its version stamp
///
/// Binding is left untouched; see [`bind_remote_id`].
pub fn update_entity<T: StoredEntity>(
    conn: &Connection,
    entity: &T,
    last_modified: Timestamp,
) -> Result<()> {
    let id = assigned_id(entity)?;

    let assignments: Vec<String> = T::DATA_COLUMNS
        .iter()
        .map(|column| format!("{} = ?", column))
        .collect();
    let sql = format!(
        "UPDATE {} SET last_modified = ?, {} WHERE id = ?",
        T::TABLE,
        assignments.join(", ")
    );

    let mut values = vec![Value::Integer(last_modified)];
    values.extend(entity.data_values()?);
    values.push(Value::Integer(id));

    let affected = conn
        .execute(&sql, params_from_iter(values.iter()))
        .map_err(|e| EventSyncError::from_write(e, &format!("update {}", T::TABLE)))?;

    if affected == 0 {
        return Err(not_found::<T>(id));
    }
    Ok(())
}

/// Hard-delete a record, returning it if it existed
///
/// Bound records are written to the deletion log. Foreign references to the
/// record are left as they are.
pub fn delete_entity<T: StoredEntity>(
    conn: &Connection,
    id: i64,
    deleted_at: Timestamp,
) -> Result<Option<T>> {
    let Some(existing) = get_by_id::<T>(conn, id)? else {
        return Ok(None);
    };

    conn.execute(&format!("DELETE FROM {} WHERE id = ?", T::TABLE), params![id])?;
    conn.execute(
        "DELETE FROM sync_retry WHERE collection = ? AND local_id = ?",
        params![T::COLLECTION.as_str(), id],
    )?;

    if let Some(remote_id) = existing.remote_id() {
        record_deletion(conn, T::COLLECTION, remote_id, id, deleted_at)?;
    }

    Ok(Some(existing))
}

/// Remove every record of the collection; returns the number removed
pub fn delete_all<T: StoredEntity>(conn: &Connection) -> Result<usize> {
    let removed = conn.execute(&format!("DELETE FROM {}", T::TABLE), [])?;
    conn.execute(
        "DELETE FROM sync_retry WHERE collection = ?",
        params![T::COLLECTION.as_str()],
    )?;
    Ok(removed)
}

/// Raise only the version marker; a lower stamp leaves the record as it is
pub fn touch_last_modified<T: StoredEntity>(
    conn: &Connection,
    id: i64,
    timestamp: Timestamp,
) -> Result<()> {
    let affected = conn.execute(
        &format!(
            "UPDATE {} SET last_modified = MAX(last_modified, ?) WHERE id = ?",
            T::TABLE
        ),
        params![timestamp, id],
    )?;
    if affected == 0 {
        return Err(not_found::<T>(id));
    }
    Ok(())
}

pub fn bind_remote_id<T: StoredEntity>(conn: &Connection, id: i64, remote_id: &str) -> Result<()> {
    let affected = conn
        .execute(
            &format!("UPDATE {} SET remote_id = ? WHERE id = ?", T::TABLE),
            params![remote_id, id],
        )
        .map_err(|e| EventSyncError::from_write(e, &format!("bind remote id in {}", T::TABLE)))?;
    if affected == 0 {
        return Err(not_found::<T>(id));
    }
    Ok(())
}

/// Outcome of recording a remote acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement {
    /// Version stamp the record holds afterwards
    pub last_modified: Timestamp,
    /// The record was edited while the push was in flight
    pub superseded: bool,
    /// The remote stamped the write below the pushed version, so the local
    /// stamp was kept
    pub remote_behind: bool,
}

/// Bind the acknowledged remote id and adopt the remote re-stamp
///
/// The stamp is only adopted while the row still holds `pushed_version`;
/// a newer local edit keeps its own stamp and remains a push candidate.
/// A re-stamp below `pushed_version` is never adopted either, since a
/// record's stamp does not move backwards.
pub fn acknowledge_push<T: StoredEntity>(
    conn: &Connection,
    id: i64,
    remote_id: &str,
    remote_last_modified: Option<Timestamp>,
    pushed_version: Timestamp,
) -> Result<Acknowledgement> {
    let current = get_by_id::<T>(conn, id)?.ok_or_else(|| not_found::<T>(id))?;

    if current.remote_id() != Some(remote_id) {
        bind_remote_id::<T>(conn, id, remote_id)?;
    }

    let superseded = current.last_modified() != pushed_version;
    let mut remote_behind = false;
    let last_modified = match remote_last_modified {
        Some(stamp) if !superseded && stamp >= pushed_version => {
            conn.execute(
                &format!("UPDATE {} SET last_modified = ? WHERE id = ?", T::TABLE),
                params![stamp, id],
            )?;
            stamp
        }
        Some(_) if !superseded => {
            remote_behind = true;
            current.last_modified()
        }
        _ => current.last_modified(),
    };

    Ok(Acknowledgement {
        last_modified,
        superseded,
        remote_behind,
    })
}

pub fn get_by_id<T: StoredEntity>(conn: &Connection, id: i64) -> Result<Option<T>> {
    let sql = format!("{} WHERE id = ?", select_sql::<T>());
    query_one(conn, &sql, params![id])
}

pub fn get_by_remote_id<T: StoredEntity>(conn: &Connection, remote_id: &str) -> Result<Option<T>> {
    let sql = format!("{} WHERE remote_id = ?", select_sql::<T>());
    query_one(conn, &sql, params![remote_id])
}

/// Exact lookup by natural key; collections without one never match
pub fn get_by_natural_key<T: StoredEntity>(conn: &Connection, key: &str) -> Result<Option<T>> {
    match T::NATURAL_KEY_COLUMN {
        Some(column) => {
            let sql = format!("{} WHERE {} = ?", select_sql::<T>(), column);
            query_one(conn, &sql, params![key])
        }
        None => Ok(None),
    }
}

/// Records without a remote id whose natural key matches, ignoring case and
/// surrounding whitespace
pub fn find_unbound_by_natural_key<T: StoredEntity>(conn: &Connection, key: &str) -> Result<Vec<T>> {
    match T::NATURAL_KEY_COLUMN {
        Some(column) => {
            let sql = format!(
                "{} WHERE remote_id IS NULL AND LOWER(TRIM({})) = LOWER(TRIM(?)) ORDER BY id ASC",
                select_sql::<T>(),
                column
            );
            query_list(conn, &sql, params![key])
        }
        None => Ok(vec![]),
    }
}

pub fn list_all<T: StoredEntity>(conn: &Connection) -> Result<Vec<T>> {
    let sql = format!("{} ORDER BY {}", select_sql::<T>(), T::ORDER_BY);
    query_list(conn, &sql, [])
}

pub fn list_active<T: StoredEntity>(conn: &Connection) -> Result<Vec<T>> {
    let column = T::ACTIVE_COLUMN.ok_or_else(|| {
        EventSyncError::InvalidInput(format!("{} has no activity flag", T::COLLECTION))
    })?;
    let sql = format!(
        "{} WHERE {} = 1 ORDER BY {}",
        select_sql::<T>(),
        column,
        T::ORDER_BY
    );
    query_list(conn, &sql, [])
}

pub fn list_by_foreign_key<T: StoredEntity>(conn: &Connection, foreign_id: i64) -> Result<Vec<T>> {
    let column = T::FOREIGN_KEY_COLUMN.ok_or_else(|| {
        EventSyncError::InvalidInput(format!("{} has no foreign key", T::COLLECTION))
    })?;
    let sql = format!(
        "{} WHERE {} = ? ORDER BY {}",
        select_sql::<T>(),
        column,
        T::ORDER_BY
    );
    query_list(conn, &sql, params![foreign_id])
}

/// Records with `last_modified` strictly after `since`, oldest first
pub fn list_modified_since<T: StoredEntity>(conn: &Connection, since: Timestamp) -> Result<Vec<T>> {
    let sql = format!(
        "{} WHERE last_modified > ? ORDER BY last_modified ASC, id ASC",
        select_sql::<T>()
    );
    query_list(conn, &sql, params![since])
}

/// Unbound records, records changed after the push cursor, and queued retries
pub fn list_push_candidates<T: StoredEntity>(
    conn: &Connection,
    push_cursor: Timestamp,
) -> Result<Vec<T>> {
    let sql = format!(
        "{} WHERE remote_id IS NULL
            OR last_modified > ?
            OR id IN (SELECT local_id FROM sync_retry WHERE collection = ?)
         ORDER BY last_modified ASC, id ASC",
        select_sql::<T>()
    );
    query_list(conn, &sql, params![push_cursor, T::COLLECTION.as_str()])
}

pub fn set_active<T: StoredEntity>(
    conn: &Connection,
    id: i64,
    active: bool,
    last_modified: Timestamp,
) -> Result<()> {
    let column = T::ACTIVE_COLUMN.ok_or_else(|| {
        EventSyncError::InvalidInput(format!("{} has no activity flag", T::COLLECTION))
    })?;
    let affected = conn.execute(
        &format!(
            "UPDATE {} SET {} = ?, last_modified = ? WHERE id = ?",
            T::TABLE,
            column
        ),
        params![active, last_modified, id],
    )?;
    if affected == 0 {
        return Err(not_found::<T>(id));
    }
    Ok(())
}

pub fn count<T: StoredEntity>(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", T::TABLE), [], |row| {
        row.get(0)
    })?)
}

/// Highest version stamp in the collection
pub fn max_last_modified<T: StoredEntity>(conn: &Connection) -> Result<Option<Timestamp>> {
    Ok(conn.query_row(
        &format!("SELECT MAX(last_modified) FROM {}", T::TABLE),
        [],
        |row| row.get(0),
    )?)
}
