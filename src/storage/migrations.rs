//! Database migrations for the local replica

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < SCHEMA_VERSION {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Entity tables (v1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS guests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT UNIQUE,
            name TEXT NOT NULL,
            last_name_abbreviation TEXT NOT NULL DEFAULT '',
            invitations INTEGER NOT NULL DEFAULT 0,
            venue_name TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            is_volunteer_benefit INTEGER NOT NULL DEFAULT 0,
            volunteer_id INTEGER,
            last_modified INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_guests_volunteer ON guests(volunteer_id);
        CREATE INDEX IF NOT EXISTS idx_guests_venue ON guests(venue_name);
        CREATE INDEX IF NOT EXISTS idx_guests_modified ON guests(last_modified);
        CREATE INDEX IF NOT EXISTS idx_guests_benefit ON guests(is_volunteer_benefit);

        CREATE TABLE IF NOT EXISTS volunteers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT UNIQUE,
            name TEXT NOT NULL,
            last_name_abbreviation TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            phone_number TEXT NOT NULL DEFAULT '',
            date_of_birth TEXT NOT NULL DEFAULT '',
            gender TEXT,
            current_rank TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_shift_date INTEGER,
            last_modified INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_volunteers_active ON volunteers(is_active);
        CREATE INDEX IF NOT EXISTS idx_volunteers_rank ON volunteers(current_rank);
        CREATE INDEX IF NOT EXISTS idx_volunteers_modified ON volunteers(last_modified);

        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT UNIQUE,
            volunteer_id INTEGER NOT NULL,
            job_type TEXT NOT NULL,
            job_type_name TEXT NOT NULL,
            venue_name TEXT NOT NULL,
            date INTEGER NOT NULL,
            shift_time TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            last_modified INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_volunteer ON jobs(volunteer_id);
        CREATE INDEX IF NOT EXISTS idx_jobs_date ON jobs(date);
        CREATE INDEX IF NOT EXISTS idx_jobs_venue ON jobs(venue_name);
        CREATE INDEX IF NOT EXISTS idx_jobs_type_name ON jobs(job_type_name);
        CREATE INDEX IF NOT EXISTS idx_jobs_modified ON jobs(last_modified);
        CREATE INDEX IF NOT EXISTS idx_jobs_volunteer_date ON jobs(volunteer_id, date);
        CREATE INDEX IF NOT EXISTS idx_jobs_date_shift ON jobs(date, shift_time);

        CREATE TABLE IF NOT EXISTS job_type_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT UNIQUE,
            name TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_shift_job INTEGER NOT NULL DEFAULT 1,
            is_orion_job INTEGER NOT NULL DEFAULT 0,
            requires_shift_time INTEGER NOT NULL DEFAULT 1,
            benefit_system_type TEXT NOT NULL DEFAULT 'stellar',
            manual_rewards TEXT,
            description TEXT NOT NULL DEFAULT '',
            last_modified INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_job_types_active ON job_type_configs(is_active);
        CREATE INDEX IF NOT EXISTS idx_job_types_modified ON job_type_configs(last_modified);

        CREATE TABLE IF NOT EXISTS venues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT UNIQUE,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1,
            last_modified INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_venues_active ON venues(is_active);
        CREATE INDEX IF NOT EXISTS idx_venues_modified ON venues(last_modified);

        -- Singleton: the CHECK pins the only row to id 1
        CREATE TABLE IF NOT EXISTS people_counter (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            remote_id TEXT UNIQUE,
            count INTEGER NOT NULL DEFAULT 0,
            last_modified INTEGER NOT NULL
        );

        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )?;

    Ok(())
}

/// Sync bookkeeping (v2)
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Per-collection cursors and last run outcome
        CREATE TABLE IF NOT EXISTS sync_state (
            collection TEXT PRIMARY KEY,
            push_cursor INTEGER NOT NULL DEFAULT 0,
            pull_cursor INTEGER NOT NULL DEFAULT 0,
            last_run_at TEXT,
            last_error TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- Records that must be pushed regardless of the push cursor
        CREATE TABLE IF NOT EXISTS sync_retry (
            collection TEXT NOT NULL,
            local_id INTEGER NOT NULL,
            reason TEXT,
            queued_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (collection, local_id)
        );

        -- Bound records deleted locally, so pulls do not resurrect them
        CREATE TABLE IF NOT EXISTS deleted_records (
            collection TEXT NOT NULL,
            remote_id TEXT NOT NULL,
            local_id INTEGER NOT NULL,
            deleted_at INTEGER NOT NULL,
            PRIMARY KEY (collection, remote_id)
        );

        CREATE INDEX IF NOT EXISTS idx_deleted_records_time ON deleted_records(deleted_at);

        CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        INSERT INTO schema_version (version) VALUES (2);
        "#,
    )?;

    Ok(())
}
