//! Row-level storage for drivers, daily check-ins, and media.
//!
//! Every mutation is a single read-modify-write statement (or one
//! explicit transaction for the record-media unit), relying on row-level
//! atomicity behind the shared connection. Status strings are the
//! canonical `CheckinStatus` representation.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::Database;
use crate::error::DatabaseError;
use crate::ledger::{Checkin, CheckinStatus, Driver, OFFTHREAD_WARNING};
use crate::transport::MediaKind;

// === Helper functions ===

fn now_str() -> String {
    Utc::now().to_rfc3339()
}

/// Parse an optional RFC 3339 timestamp column.
fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a required timestamp column with fallback to now.
fn parse_ts_fallback(value: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn format_media_kind(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Photo => "photo",
        MediaKind::Video => "video",
    }
}

/// Build a Driver from a `SELECT * FROM drivers` row.
fn row_to_driver(row: &Row) -> Result<Driver, rusqlite::Error> {
    Ok(Driver {
        id: row.get("id")?,
        user_ref: row.get("user_ref")?,
        handle: row.get("handle")?,
        display_name: row.get("display_name")?,
        active: row.get("active")?,
        streak_current: row.get("streak_current")?,
        streak_best: row.get("streak_best")?,
        notify_channel_id: row.get("notify_channel_id")?,
        last_pass_at: parse_ts(row.get("last_pass_at")?),
        last_congrats_at: parse_ts(row.get("last_congrats_at")?),
    })
}

/// Build a Checkin from a `SELECT * FROM daily_checkins` row.
fn row_to_checkin(row: &Row) -> Result<Checkin, rusqlite::Error> {
    let status: String = row.get("status")?;
    let date: String = row.get("date")?;
    Ok(Checkin {
        id: row.get("id")?,
        driver_id: row.get("driver_id")?,
        group_id: row.get("group_id")?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").unwrap_or_default(),
        sent_at: parse_ts(row.get("sent_at")?),
        responded_at: parse_ts(row.get("responded_at")?),
        status: CheckinStatus::parse(&status),
        reason: row.get("reason")?,
        reviewer_id: row.get("reviewer_id")?,
        reviewed_at: parse_ts(row.get("reviewed_at")?),
        card_ref: row.get("card_ref")?,
        media_count: row.get("media_count")?,
        updated_at: parse_ts_fallback(row.get("updated_at")?),
    })
}

/// Stable negative identity for placeholder drivers registered by handle
/// before they make first contact.
fn virtual_user_ref(handle: &str) -> i64 {
    let digest = Sha256::digest(handle.to_lowercase().as_bytes());
    let mut value: i64 = 0;
    for byte in &digest[..7] {
        value = (value << 8) | i64::from(*byte);
    }
    -(1_000_000_000_000 + value % 1_000_000)
}

impl Database {
    // === Drivers ===

    /// Get-or-create a driver profile.
    ///
    /// Matches an existing row by handle first (case-insensitive) so a
    /// placeholder driver adopts the real `user_ref` on first contact;
    /// otherwise upserts by `user_ref`. Always reactivates.
    pub fn upsert_driver(
        &self,
        user_ref: Option<i64>,
        handle: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<Driver, DatabaseError> {
        if let Some(handle) = handle {
            let existing = self
                .conn()
                .query_row(
                    "SELECT * FROM drivers WHERE lower(handle) = lower(?1)",
                    params![handle],
                    row_to_driver,
                )
                .optional()?;
            if let Some(existing) = existing {
                let new_ref = user_ref.unwrap_or(existing.user_ref);
                return Ok(self.conn().query_row(
                    "UPDATE drivers
                     SET user_ref = ?2, handle = ?3, display_name = ?4,
                         active = 1, updated_at = ?5
                     WHERE id = ?1
                     RETURNING *",
                    params![existing.id, new_ref, handle, display_name, now_str()],
                    row_to_driver,
                )?);
            }
        }

        let user_ref = match (user_ref, handle) {
            (Some(user_ref), _) => user_ref,
            (None, Some(handle)) => virtual_user_ref(handle),
            (None, None) => {
                return Err(DatabaseError::QueryFailed(
                    "driver needs a user_ref or a handle".to_string(),
                ))
            }
        };

        Ok(self.conn().query_row(
            "INSERT INTO drivers (user_ref, handle, display_name, active, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT (user_ref)
             DO UPDATE SET handle = excluded.handle,
                           display_name = excluded.display_name,
                           active = 1,
                           updated_at = excluded.updated_at
             RETURNING *",
            params![user_ref, handle, display_name, now_str()],
            row_to_driver,
        )?)
    }

    pub fn driver_by_id(&self, driver_id: i64) -> Result<Option<Driver>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM drivers WHERE id = ?1",
                params![driver_id],
                row_to_driver,
            )
            .optional()?)
    }

    pub fn driver_by_user_ref(&self, user_ref: i64) -> Result<Option<Driver>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM drivers WHERE user_ref = ?1",
                params![user_ref],
                row_to_driver,
            )
            .optional()?)
    }

    pub fn driver_by_handle(&self, handle: &str) -> Result<Option<Driver>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM drivers WHERE lower(handle) = lower(?1)",
                params![handle],
                row_to_driver,
            )
            .optional()?)
    }

    pub fn driver_by_notify_channel(
        &self,
        channel_id: i64,
    ) -> Result<Option<Driver>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM drivers WHERE notify_channel_id = ?1",
                params![channel_id],
                row_to_driver,
            )
            .optional()?)
    }

    pub fn set_driver_notify_channel(
        &self,
        driver_id: i64,
        channel_id: i64,
    ) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE drivers SET notify_channel_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![driver_id, channel_id, now_str()],
        )?;
        Ok(())
    }

    /// Soft-deactivate; history is never deleted.
    pub fn set_driver_active(&self, driver_id: i64, active: bool) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE drivers SET active = ?2, updated_at = ?3 WHERE id = ?1",
            params![driver_id, active, now_str()],
        )?;
        Ok(())
    }

    pub fn active_drivers(&self) -> Result<Vec<Driver>, DatabaseError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT * FROM drivers WHERE active = 1 ORDER BY id")?;
        let rows = stmt.query_map([], row_to_driver)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn set_driver_last_pass(
        &self,
        driver_id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE drivers SET last_pass_at = ?2, updated_at = ?3 WHERE id = ?1",
            params![driver_id, at.map(|t| t.to_rfc3339()), now_str()],
        )?;
        Ok(())
    }

    pub fn set_driver_last_congrats(
        &self,
        driver_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE drivers SET last_congrats_at = ?2, updated_at = ?3 WHERE id = ?1",
            params![driver_id, at.to_rfc3339(), now_str()],
        )?;
        Ok(())
    }

    // === Check-ins ===

    /// Get-or-create the `pending` row for the day; idempotent.
    pub fn ensure_checkin(
        &self,
        driver_id: i64,
        group_id: i64,
        date: NaiveDate,
    ) -> Result<Checkin, DatabaseError> {
        Ok(self.conn().query_row(
            "INSERT INTO daily_checkins (driver_id, group_id, date, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (driver_id, date)
             DO UPDATE SET group_id = excluded.group_id,
                           updated_at = excluded.updated_at
             RETURNING *",
            params![driver_id, group_id, date.to_string(), now_str()],
            row_to_checkin,
        )?)
    }

    /// First-notified time is monotonic: later notifications on the same
    /// day never overwrite it.
    pub fn mark_notified(&self, checkin_id: i64) -> Result<Option<Checkin>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "UPDATE daily_checkins
                 SET sent_at = COALESCE(sent_at, ?2), updated_at = ?2
                 WHERE id = ?1
                 RETURNING *",
                params![checkin_id, now_str()],
                row_to_checkin,
            )
            .optional()?)
    }

    /// Record one media item: upsert the day's row, insert the media
    /// row, bump the count, stamp first-response, advance open status to
    /// `submitted`, and clear any stored reason. One transaction.
    ///
    /// A terminal day keeps its status but still counts the item, so
    /// late evidence stays visible for audit.
    ///
    /// Returns the updated check-in and whether this was the first media
    /// item of the day.
    pub fn record_media(
        &self,
        driver_id: i64,
        group_id: i64,
        date: NaiveDate,
        kind: MediaKind,
        file_id: &str,
        batch_id: Option<&str>,
    ) -> Result<(Checkin, bool), DatabaseError> {
        let tx = self.conn().unchecked_transaction()?;

        let existing = tx.query_row(
            "INSERT INTO daily_checkins (driver_id, group_id, date, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (driver_id, date)
             DO UPDATE SET group_id = excluded.group_id,
                           updated_at = excluded.updated_at
             RETURNING *",
            params![driver_id, group_id, date.to_string(), now_str()],
            row_to_checkin,
        )?;
        let first_media = existing.media_count == 0;

        tx.execute(
            "INSERT OR IGNORE INTO media (checkin_id, kind, file_id, batch_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                existing.id,
                format_media_kind(kind),
                file_id,
                batch_id,
                now_str()
            ],
        )?;

        let updated = tx.query_row(
            "UPDATE daily_checkins
             SET media_count = media_count + 1,
                 responded_at = COALESCE(responded_at, ?2),
                 status = CASE WHEN status IN ('pending', 'submitted')
                               THEN 'submitted' ELSE status END,
                 reason = NULL,
                 updated_at = ?2
             WHERE id = ?1
             RETURNING *",
            params![existing.id, now_str()],
            row_to_checkin,
        )?;

        tx.commit()?;
        Ok((updated, first_media))
    }

    /// Terminal review decision. `Ok(None)` when no row exists for the
    /// day. `pass` stamps the driver's last-pass timestamp;
    /// `fail`/`needs_fix` clear it.
    pub fn update_review_status(
        &self,
        driver_id: i64,
        group_id: i64,
        date: NaiveDate,
        status: CheckinStatus,
        reviewer_id: i64,
        reason: Option<&str>,
    ) -> Result<Option<Checkin>, DatabaseError> {
        let now = now_str();
        let updated = self
            .conn()
            .query_row(
                "UPDATE daily_checkins
                 SET status = ?4, reason = ?5, reviewer_id = ?6,
                     reviewed_at = ?7, updated_at = ?7
                 WHERE driver_id = ?1 AND group_id = ?2 AND date = ?3
                 RETURNING *",
                params![
                    driver_id,
                    group_id,
                    date.to_string(),
                    status.as_str(),
                    reason,
                    reviewer_id,
                    now
                ],
                row_to_checkin,
            )
            .optional()?;

        if updated.is_some() {
            match status {
                CheckinStatus::Pass => self.set_driver_last_pass(driver_id, Some(Utc::now()))?,
                CheckinStatus::Fail | CheckinStatus::NeedsFix => {
                    self.set_driver_last_pass(driver_id, None)?
                }
                _ => {}
            }
        }
        Ok(updated)
    }

    /// System-originated excuse: `reviewed_at` set, reviewer left empty.
    /// Creates the row if absent.
    pub fn set_excused(
        &self,
        driver_id: i64,
        group_id: i64,
        date: NaiveDate,
        reason: &str,
    ) -> Result<Checkin, DatabaseError> {
        let now = now_str();
        let updated = self
            .conn()
            .query_row(
                "UPDATE daily_checkins
                 SET status = 'excused', reason = ?4, reviewer_id = NULL,
                     reviewed_at = ?5, updated_at = ?5
                 WHERE driver_id = ?1 AND group_id = ?2 AND date = ?3
                 RETURNING *",
                params![driver_id, group_id, date.to_string(), reason, now],
                row_to_checkin,
            )
            .optional()?;
        if let Some(updated) = updated {
            return Ok(updated);
        }
        Ok(self.conn().query_row(
            "INSERT INTO daily_checkins
                 (driver_id, group_id, date, status, reason, reviewed_at, updated_at)
             VALUES (?1, ?2, ?3, 'excused', ?4, ?5, ?5)
             RETURNING *",
            params![driver_id, group_id, date.to_string(), reason, now],
            row_to_checkin,
        )?)
    }

    /// Back to `pending`: media rows deleted, counters and review fields
    /// cleared, driver's last-pass cleared. The row is retained for
    /// audit. `Ok(None)` when the id is unknown.
    pub fn reset_checkin(&self, checkin_id: i64) -> Result<Option<Checkin>, DatabaseError> {
        let tx = self.conn().unchecked_transaction()?;

        let driver_id: Option<i64> = tx
            .query_row(
                "SELECT driver_id FROM daily_checkins WHERE id = ?1",
                params![checkin_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(driver_id) = driver_id else {
            return Ok(None);
        };

        tx.execute("DELETE FROM media WHERE checkin_id = ?1", params![checkin_id])?;
        let updated = tx.query_row(
            "UPDATE daily_checkins
             SET media_count = 0, responded_at = NULL, status = 'pending',
                 reason = NULL, reviewer_id = NULL, reviewed_at = NULL,
                 sent_at = NULL, card_ref = NULL, updated_at = ?2
             WHERE id = ?1
             RETURNING *",
            params![checkin_id, now_str()],
            row_to_checkin,
        )?;
        tx.execute(
            "UPDATE drivers SET last_pass_at = NULL, updated_at = ?2 WHERE id = ?1",
            params![driver_id, now_str()],
        )?;

        tx.commit()?;
        Ok(Some(updated))
    }

    /// Back to `submitted`: review fields cleared, media kept, driver's
    /// last-pass cleared. `Ok(None)` when no row exists for the day.
    pub fn reopen_checkin(
        &self,
        driver_id: i64,
        group_id: i64,
        date: NaiveDate,
    ) -> Result<Option<Checkin>, DatabaseError> {
        let updated = self
            .conn()
            .query_row(
                "UPDATE daily_checkins
                 SET status = 'submitted', reason = NULL, reviewer_id = NULL,
                     reviewed_at = NULL, updated_at = ?4
                 WHERE driver_id = ?1 AND group_id = ?2 AND date = ?3
                 RETURNING *",
                params![driver_id, group_id, date.to_string(), now_str()],
                row_to_checkin,
            )
            .optional()?;
        if updated.is_some() {
            self.set_driver_last_pass(driver_id, None)?;
        }
        Ok(updated)
    }

    pub fn set_card_ref(&self, checkin_id: i64, message_ref: i64) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE daily_checkins SET card_ref = ?2, updated_at = ?3 WHERE id = ?1",
            params![checkin_id, message_ref, now_str()],
        )?;
        Ok(())
    }

    /// Store or clear the off-thread warning marker.
    pub fn set_offthread_warning(
        &self,
        checkin_id: i64,
        active: bool,
    ) -> Result<(), DatabaseError> {
        let reason = active.then_some(OFFTHREAD_WARNING);
        self.conn().execute(
            "UPDATE daily_checkins SET reason = ?2, updated_at = ?3 WHERE id = ?1",
            params![checkin_id, reason, now_str()],
        )?;
        Ok(())
    }

    // === Queries ===

    pub fn checkin_by_id(&self, checkin_id: i64) -> Result<Option<Checkin>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM daily_checkins WHERE id = ?1",
                params![checkin_id],
                row_to_checkin,
            )
            .optional()?)
    }

    pub fn checkin_for(
        &self,
        driver_id: i64,
        group_id: i64,
        date: NaiveDate,
    ) -> Result<Option<Checkin>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM daily_checkins
                 WHERE driver_id = ?1 AND group_id = ?2 AND date = ?3",
                params![driver_id, group_id, date.to_string()],
                row_to_checkin,
            )
            .optional()?)
    }

    pub fn latest_checkin(
        &self,
        driver_id: i64,
        group_id: i64,
    ) -> Result<Option<Checkin>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM daily_checkins
                 WHERE driver_id = ?1 AND group_id = ?2
                 ORDER BY date DESC LIMIT 1",
                params![driver_id, group_id],
                row_to_checkin,
            )
            .optional()?)
    }

    /// Latest check-in per driver in the group, for the compliance sweep.
    pub fn latest_checkins_by_driver(
        &self,
        group_id: i64,
    ) -> Result<HashMap<i64, Checkin>, DatabaseError> {
        let mut stmt = self.conn().prepare(
            "SELECT c.* FROM daily_checkins c
             JOIN (SELECT driver_id, MAX(date) AS max_date
                   FROM daily_checkins WHERE group_id = ?1
                   GROUP BY driver_id) latest
               ON c.driver_id = latest.driver_id AND c.date = latest.max_date
             WHERE c.group_id = ?1",
        )?;
        let rows = stmt.query_map(params![group_id], row_to_checkin)?;
        let mut map = HashMap::new();
        for row in rows {
            let checkin = row?;
            map.insert(checkin.driver_id, checkin);
        }
        Ok(map)
    }

    /// Check-ins for the trailing `days` days ending at `today`, newest
    /// first.
    pub fn recent_checkins(
        &self,
        driver_id: i64,
        today: NaiveDate,
        days: i64,
    ) -> Result<Vec<Checkin>, DatabaseError> {
        if days <= 0 {
            return Ok(Vec::new());
        }
        let since = today - chrono::Duration::days(days - 1);
        let mut stmt = self.conn().prepare(
            "SELECT * FROM daily_checkins
             WHERE driver_id = ?1 AND date >= ?2
             ORDER BY date DESC",
        )?;
        let rows = stmt.query_map(params![driver_id, since.to_string()], row_to_checkin)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Passes recorded for a driver inside a date range (inclusive).
    pub fn pass_count_between(
        &self,
        driver_id: i64,
        group_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<i64, DatabaseError> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM daily_checkins
             WHERE driver_id = ?1 AND group_id = ?2
               AND date BETWEEN ?3 AND ?4 AND status = 'pass'",
            params![driver_id, group_id, start.to_string(), end.to_string()],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_memory().unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn upsert_driver_adopts_user_ref_by_handle() {
        let db = db();
        let placeholder = db.upsert_driver(None, Some("Hauler"), None).unwrap();
        assert!(placeholder.user_ref < 0);

        let adopted = db
            .upsert_driver(Some(42), Some("hauler"), Some("Hauler H."))
            .unwrap();
        assert_eq!(adopted.id, placeholder.id);
        assert_eq!(adopted.user_ref, 42);
        assert!(adopted.active);
    }

    #[test]
    fn virtual_refs_are_stable_and_negative() {
        assert_eq!(virtual_user_ref("Hauler"), virtual_user_ref("hauler"));
        assert!(virtual_user_ref("hauler") < 0);
        assert_ne!(virtual_user_ref("hauler"), virtual_user_ref("other"));
    }

    #[test]
    fn ensure_checkin_is_idempotent() {
        let db = db();
        let driver = db.upsert_driver(Some(1), None, Some("A")).unwrap();
        let first = db.ensure_checkin(driver.id, -10, day(1)).unwrap();
        let second = db.ensure_checkin(driver.id, -10, day(1)).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, CheckinStatus::Pending);
        assert_eq!(second.media_count, 0);
    }

    #[test]
    fn record_media_advances_open_status_only() {
        let db = db();
        let driver = db.upsert_driver(Some(1), None, Some("A")).unwrap();

        let (checkin, first) = db
            .record_media(driver.id, -10, day(1), MediaKind::Photo, "f1", None)
            .unwrap();
        assert!(first);
        assert_eq!(checkin.status, CheckinStatus::Submitted);
        assert_eq!(checkin.media_count, 1);
        assert!(checkin.responded_at.is_some());

        db.update_review_status(driver.id, -10, day(1), CheckinStatus::Pass, 99, None)
            .unwrap();
        // Late media on a terminal day still counts but keeps the status.
        let (checkin, first) = db
            .record_media(driver.id, -10, day(1), MediaKind::Video, "f2", None)
            .unwrap();
        assert!(!first);
        assert_eq!(checkin.status, CheckinStatus::Pass);
        assert_eq!(checkin.media_count, 2);
    }

    #[test]
    fn mark_notified_is_monotonic() {
        let db = db();
        let driver = db.upsert_driver(Some(1), None, Some("A")).unwrap();
        let checkin = db.ensure_checkin(driver.id, -10, day(1)).unwrap();

        let first = db.mark_notified(checkin.id).unwrap().unwrap();
        let sent_at = first.sent_at.unwrap();
        let second = db.mark_notified(checkin.id).unwrap().unwrap();
        assert_eq!(second.sent_at.unwrap(), sent_at);
    }

    #[test]
    fn review_status_tracks_driver_last_pass() {
        let db = db();
        let driver = db.upsert_driver(Some(1), None, Some("A")).unwrap();
        db.ensure_checkin(driver.id, -10, day(1)).unwrap();

        db.update_review_status(driver.id, -10, day(1), CheckinStatus::Pass, 99, None)
            .unwrap()
            .unwrap();
        assert!(db.driver_by_id(driver.id).unwrap().unwrap().last_pass_at.is_some());

        db.update_review_status(
            driver.id,
            -10,
            day(1),
            CheckinStatus::Fail,
            99,
            Some("Low tire"),
        )
        .unwrap()
        .unwrap();
        assert!(db.driver_by_id(driver.id).unwrap().unwrap().last_pass_at.is_none());
    }

    #[test]
    fn review_status_missing_row_is_none() {
        let db = db();
        let driver = db.upsert_driver(Some(1), None, Some("A")).unwrap();
        let updated = db
            .update_review_status(driver.id, -10, day(1), CheckinStatus::Pass, 99, None)
            .unwrap();
        assert!(updated.is_none());
    }

    #[test]
    fn set_excused_creates_row_without_reviewer() {
        let db = db();
        let driver = db.upsert_driver(Some(1), None, Some("A")).unwrap();
        let checkin = db.set_excused(driver.id, -10, day(1), "Off today").unwrap();
        assert_eq!(checkin.status, CheckinStatus::Excused);
        assert!(checkin.reviewed_at.is_some());
        assert!(checkin.reviewer_id.is_none());
        assert_eq!(checkin.reason.as_deref(), Some("Off today"));
    }

    #[test]
    fn reset_clears_everything_and_keeps_row() {
        let db = db();
        let driver = db.upsert_driver(Some(1), None, Some("A")).unwrap();
        let (checkin, _) = db
            .record_media(driver.id, -10, day(1), MediaKind::Photo, "f1", None)
            .unwrap();
        db.update_review_status(driver.id, -10, day(1), CheckinStatus::Pass, 99, None)
            .unwrap();

        let reset = db.reset_checkin(checkin.id).unwrap().unwrap();
        assert_eq!(reset.id, checkin.id);
        assert_eq!(reset.status, CheckinStatus::Pending);
        assert_eq!(reset.media_count, 0);
        assert!(reset.reviewer_id.is_none());
        assert!(reset.sent_at.is_none());
        assert!(db.driver_by_id(driver.id).unwrap().unwrap().last_pass_at.is_none());

        // ensure after reset reuses the same row
        let again = db.ensure_checkin(driver.id, -10, day(1)).unwrap();
        assert_eq!(again.id, checkin.id);

        assert!(db.reset_checkin(9999).unwrap().is_none());
    }

    #[test]
    fn reopen_keeps_media() {
        let db = db();
        let driver = db.upsert_driver(Some(1), None, Some("A")).unwrap();
        db.record_media(driver.id, -10, day(1), MediaKind::Photo, "f1", None)
            .unwrap();
        db.update_review_status(
            driver.id,
            -10,
            day(1),
            CheckinStatus::NeedsFix,
            99,
            Some("Needs fix"),
        )
        .unwrap();

        let reopened = db.reopen_checkin(driver.id, -10, day(1)).unwrap().unwrap();
        assert_eq!(reopened.status, CheckinStatus::Submitted);
        assert_eq!(reopened.media_count, 1);
        assert!(reopened.reviewer_id.is_none());
        assert!(reopened.reviewed_at.is_none());
    }

    #[test]
    fn latest_checkins_by_driver_picks_newest() {
        let db = db();
        let a = db.upsert_driver(Some(1), None, Some("A")).unwrap();
        let b = db.upsert_driver(Some(2), None, Some("B")).unwrap();
        db.ensure_checkin(a.id, -10, day(1)).unwrap();
        db.ensure_checkin(a.id, -10, day(2)).unwrap();
        db.ensure_checkin(b.id, -10, day(1)).unwrap();

        let latest = db.latest_checkins_by_driver(-10).unwrap();
        assert_eq!(latest[&a.id].date, day(2));
        assert_eq!(latest[&b.id].date, day(1));
    }

    #[test]
    fn recent_checkins_window() {
        let db = db();
        let driver = db.upsert_driver(Some(1), None, Some("A")).unwrap();
        for d in 1..=9 {
            db.ensure_checkin(driver.id, -10, day(d)).unwrap();
        }
        let recent = db.recent_checkins(driver.id, day(9), 7).unwrap();
        assert_eq!(recent.len(), 7);
        assert_eq!(recent[0].date, day(9));
        assert_eq!(recent[6].date, day(3));
        assert!(db.recent_checkins(driver.id, day(9), 0).unwrap().is_empty());
    }
}
