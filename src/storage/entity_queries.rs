//! Per-entity read accessors, volunteer activity and counter operations

use std::collections::HashMap;

use chrono::Duration;
use rusqlite::{params, Connection};

use super::queries::{get_by_id, insert_entity, query_entities, update_entity};
use crate::error::Result;
use crate::types::*;

pub fn guests_by_venue(conn: &Connection, venue_name: &str) -> Result<Vec<Guest>> {
    query_entities(
        conn,
        "WHERE venue_name = ? ORDER BY name ASC, id ASC",
        params![venue_name],
    )
}

pub fn volunteer_benefit_guests(conn: &Connection) -> Result<Vec<Guest>> {
    query_entities(
        conn,
        "WHERE is_volunteer_benefit = 1 ORDER BY name ASC, id ASC",
        [],
    )
}

/// The benefit entry a volunteer's shifts earned them, if any
pub fn benefit_guest_for_volunteer(conn: &Connection, volunteer_id: i64) -> Result<Option<Guest>> {
    Ok(query_entities::<Guest, _>(
        conn,
        "WHERE is_volunteer_benefit = 1 AND volunteer_id = ? ORDER BY id ASC LIMIT 1",
        params![volunteer_id],
    )?
    .into_iter()
    .next())
}

pub fn inactive_volunteers(conn: &Connection) -> Result<Vec<Volunteer>> {
    query_entities(conn, "WHERE is_active = 0 ORDER BY name ASC, id ASC", [])
}

/// A shift within this many days keeps a volunteer active
pub const ACTIVE_WINDOW_DAYS: i64 = 365;
/// Volunteers idle for this many days are due for cleanup
pub const CLEANUP_WINDOW_DAYS: i64 = 4 * 365;

fn days_in_millis(days: i64) -> Timestamp {
    Duration::days(days).num_milliseconds()
}

/// Most recent job date per volunteer
pub fn last_shift_dates(conn: &Connection) -> Result<HashMap<i64, Timestamp>> {
    let mut stmt = conn.prepare("SELECT volunteer_id, MAX(date) FROM jobs GROUP BY volunteer_id")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut dates = HashMap::new();
    for row in rows {
        let (volunteer_id, date) = row?;
        dates.insert(volunteer_id, date);
    }
    Ok(dates)
}

/// Derive `last_shift_date` and `is_active` of every volunteer from their
/// jobs. Volunteers whose values change are rewritten with a fresh stamp;
/// returns their ids.
pub fn refresh_volunteer_activity(
    conn: &Connection,
    now: Timestamp,
    mut next_stamp: impl FnMut() -> Timestamp,
) -> Result<Vec<i64>> {
    let last_shifts = last_shift_dates(conn)?;
    let active_since = now - days_in_millis(ACTIVE_WINDOW_DAYS);
    let mut changed = Vec::new();

    for mut volunteer in query_entities::<Volunteer, _>(conn, "ORDER BY id ASC", [])? {
        let Some(id) = volunteer.id.get() else {
            continue;
        };
        let last_shift = last_shifts.get(&id).copied();
        let active = last_shift.is_some_and(|date| date >= active_since);
        if volunteer.last_shift_date == last_shift && volunteer.is_active == active {
            continue;
        }

        volunteer.last_shift_date = last_shift;
        volunteer.is_active = active;
        update_entity(conn, &volunteer, next_stamp())?;
        changed.push(id);
    }
    Ok(changed)
}

/// Volunteers whose last shift is older than the cleanup window
pub fn volunteers_due_for_cleanup(conn: &Connection, now: Timestamp) -> Result<Vec<Volunteer>> {
    query_entities(
        conn,
        "WHERE last_shift_date IS NOT NULL AND last_shift_date < ? ORDER BY name ASC, id ASC",
        params![now - days_in_millis(CLEANUP_WINDOW_DAYS)],
    )
}

pub fn volunteers_by_rank(conn: &Connection, rank: VolunteerRank) -> Result<Vec<Volunteer>> {
    query_entities(
        conn,
        "WHERE current_rank = ? ORDER BY name ASC, id ASC",
        params![rank.as_str()],
    )
}

/// Jobs dated within `[start, end]`, newest first
pub fn jobs_by_date_range(conn: &Connection, start: Timestamp, end: Timestamp) -> Result<Vec<Job>> {
    query_entities(
        conn,
        "WHERE date >= ? AND date <= ? ORDER BY date DESC, id DESC",
        params![start, end],
    )
}

/// Number of jobs a volunteer worked within `[start, end]`
pub fn count_jobs(
    conn: &Connection,
    volunteer_id: i64,
    start: Timestamp,
    end: Timestamp,
    shift_time: Option<ShiftTime>,
) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM jobs
         WHERE volunteer_id = ?1 AND date >= ?2 AND date <= ?3
           AND (?4 IS NULL OR shift_time = ?4)",
        params![volunteer_id, start, end, shift_time.map(|s| s.as_str())],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Active job types that count toward the shift ranks
pub fn shift_job_types(conn: &Connection) -> Result<Vec<JobTypeConfig>> {
    query_entities(
        conn,
        "WHERE is_active = 1 AND is_shift_job = 1 ORDER BY name ASC",
        [],
    )
}

/// Active job types that count toward the orion rank
pub fn orion_job_types(conn: &Connection) -> Result<Vec<JobTypeConfig>> {
    query_entities(
        conn,
        "WHERE is_active = 1 AND is_orion_job = 1 ORDER BY name ASC",
        [],
    )
}

pub fn get_counter(conn: &Connection) -> Result<Option<Counter>> {
    get_by_id(conn, COUNTER_ID)
}

/// Write the counter value, creating the singleton row on first use
pub fn set_counter(conn: &Connection, count: i64, last_modified: Timestamp) -> Result<Counter> {
    let counter = match get_counter(conn)? {
        Some(mut existing) => {
            existing.count = count;
            update_entity(conn, &existing, last_modified)?;
            existing
        }
        None => {
            let counter = Counter::new(count);
            insert_entity(conn, &counter, last_modified)?;
            counter
        }
    };

    Ok(Counter {
        last_modified,
        ..counter
    })
}

/// Add `delta` to the counter; the result never drops below zero
pub fn adjust_counter(conn: &Connection, delta: i64, last_modified: Timestamp) -> Result<Counter> {
    let current = get_counter(conn)?.map(|c| c.count).unwrap_or(0);
    set_counter(conn, current.saturating_add(delta).max(0), last_modified)
}
