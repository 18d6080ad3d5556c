//! Database schema migrations for fleetcheck.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current version.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations.
///
/// # Errors
/// Returns an error if a migration statement fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or(0)
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: initial schema.
///
/// Timestamps are RFC 3339 TEXT; dates are `YYYY-MM-DD` TEXT. Driver
/// `user_ref` is the external chat identity (negative for placeholder
/// drivers registered by handle before first contact).
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS drivers (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            user_ref         INTEGER NOT NULL UNIQUE,
            handle           TEXT,
            display_name     TEXT,
            active           INTEGER NOT NULL DEFAULT 1,
            streak_current   INTEGER NOT NULL DEFAULT 0,
            streak_best      INTEGER NOT NULL DEFAULT 0,
            notify_channel_id INTEGER,
            last_pass_at     TEXT,
            last_congrats_at TEXT,
            last_check_date  TEXT,
            updated_at       TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS daily_checkins (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            driver_id       INTEGER NOT NULL REFERENCES drivers(id),
            group_id        INTEGER NOT NULL,
            date            TEXT NOT NULL,
            sent_at         TEXT,
            responded_at    TEXT,
            status          TEXT NOT NULL DEFAULT 'pending',
            reason          TEXT,
            reviewer_id     INTEGER,
            reviewed_at     TEXT,
            card_ref        INTEGER,
            media_count     INTEGER NOT NULL DEFAULT 0,
            updated_at      TEXT NOT NULL DEFAULT '',
            UNIQUE (driver_id, date)
        );

        CREATE TABLE IF NOT EXISTS media (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            checkin_id  INTEGER NOT NULL REFERENCES daily_checkins(id),
            kind        TEXT NOT NULL,
            file_id     TEXT NOT NULL,
            batch_id    TEXT,
            created_at  TEXT NOT NULL DEFAULT '',
            UNIQUE (checkin_id, file_id)
        );

        CREATE TABLE IF NOT EXISTS groups (
            id                    INTEGER PRIMARY KEY,
            title                 TEXT NOT NULL,
            review_channel_id     INTEGER NOT NULL,
            compliance_channel_id INTEGER,
            tz_offset_minutes     INTEGER NOT NULL DEFAULT 0,
            paused                INTEGER NOT NULL DEFAULT 0,
            autosend_enabled      INTEGER NOT NULL DEFAULT 0,
            autosend_time         TEXT,
            digest_time           TEXT NOT NULL DEFAULT '10:30',
            created_at            TEXT NOT NULL DEFAULT '',
            updated_at            TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS compliance_tracking (
            driver_id             INTEGER PRIMARY KEY REFERENCES drivers(id),
            consecutive_reports   INTEGER NOT NULL DEFAULT 0,
            last_status           TEXT,
            last_report_at        TEXT,
            last_driver_alert_at  TEXT,
            last_dispatch_alert_at TEXT,
            comment_prompt_ref    TEXT,
            updated_at            TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS compliance_notes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            driver_id   INTEGER NOT NULL REFERENCES drivers(id),
            author_id   INTEGER NOT NULL,
            note        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS compliance_resets (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at  TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_checkins_group_date ON daily_checkins(group_id, date);
        CREATE INDEX IF NOT EXISTS idx_checkins_driver_date ON daily_checkins(driver_id, date);
        CREATE INDEX IF NOT EXISTS idx_media_checkin ON media(checkin_id);
        CREATE INDEX IF NOT EXISTS idx_notes_driver ON compliance_notes(driver_id, created_at);",
    )?;
    set_schema_version(conn, 1)?;
    Ok(())
}
