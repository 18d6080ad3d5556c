//! Row-level storage for group settings and compliance tracking.

use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::HashMap;

use super::Database;
use crate::compliance::{ComplianceState, ComplianceStatus};
use crate::error::DatabaseError;
use crate::roles::GroupSettings;

fn now_str() -> String {
    Utc::now().to_rfc3339()
}

fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an `HH:MM` column, degrading to the stock digest time.
fn parse_time_fallback(value: &str) -> NaiveTime {
    NaiveTime::parse_from_str(value, "%H:%M")
        .unwrap_or_else(|_| NaiveTime::from_hms_opt(10, 30, 0).unwrap_or_default())
}

fn row_to_group(row: &Row) -> Result<GroupSettings, rusqlite::Error> {
    let digest_time: String = row.get("digest_time")?;
    let autosend_time: Option<String> = row.get("autosend_time")?;
    Ok(GroupSettings {
        id: row.get("id")?,
        title: row.get("title")?,
        review_channel_id: row.get("review_channel_id")?,
        compliance_channel_id: row.get("compliance_channel_id")?,
        tz_offset_minutes: row.get("tz_offset_minutes")?,
        paused: row.get("paused")?,
        autosend_enabled: row.get("autosend_enabled")?,
        autosend_time: autosend_time.as_deref().map(parse_time_fallback),
        digest_time: parse_time_fallback(&digest_time),
    })
}

fn row_to_state(row: &Row) -> Result<ComplianceState, rusqlite::Error> {
    let last_status: Option<String> = row.get("last_status")?;
    Ok(ComplianceState {
        driver_id: row.get("driver_id")?,
        consecutive_reports: row.get("consecutive_reports")?,
        last_status: last_status.as_deref().and_then(ComplianceStatus::parse),
        last_report_at: parse_ts(row.get("last_report_at")?),
        last_driver_alert_at: parse_ts(row.get("last_driver_alert_at")?),
        last_dispatch_alert_at: parse_ts(row.get("last_dispatch_alert_at")?),
        comment_prompt_ref: row.get("comment_prompt_ref")?,
    })
}

impl Database {
    // === Groups ===

    /// Create or replace a group's configuration.
    pub fn upsert_group(&self, group: &GroupSettings) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT INTO groups
                 (id, title, review_channel_id, compliance_channel_id,
                  tz_offset_minutes, paused, autosend_enabled, autosend_time,
                  digest_time, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT (id)
             DO UPDATE SET title = excluded.title,
                           review_channel_id = excluded.review_channel_id,
                           compliance_channel_id = excluded.compliance_channel_id,
                           tz_offset_minutes = excluded.tz_offset_minutes,
                           paused = excluded.paused,
                           autosend_enabled = excluded.autosend_enabled,
                           autosend_time = excluded.autosend_time,
                           digest_time = excluded.digest_time,
                           updated_at = excluded.updated_at",
            params![
                group.id,
                group.title,
                group.review_channel_id,
                group.compliance_channel_id,
                group.tz_offset_minutes,
                group.paused,
                group.autosend_enabled,
                group.autosend_time.map(|t| t.format("%H:%M").to_string()),
                group.digest_time.format("%H:%M").to_string(),
                now_str(),
            ],
        )?;
        Ok(())
    }

    pub fn group_by_id(&self, group_id: i64) -> Result<Option<GroupSettings>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM groups WHERE id = ?1",
                params![group_id],
                row_to_group,
            )
            .optional()?)
    }

    /// The configuration singleton: the first-created group.
    pub fn default_group(&self) -> Result<Option<GroupSettings>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM groups ORDER BY created_at, id LIMIT 1",
                [],
                row_to_group,
            )
            .optional()?)
    }

    pub fn all_groups(&self) -> Result<Vec<GroupSettings>, DatabaseError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT * FROM groups ORDER BY created_at, id")?;
        let rows = stmt.query_map([], row_to_group)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn set_group_title_paused(
        &self,
        group_id: i64,
        title: &str,
        paused: bool,
    ) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE groups SET title = ?2, paused = ?3, updated_at = ?4 WHERE id = ?1",
            params![group_id, title, paused, now_str()],
        )?;
        Ok(())
    }

    // === Compliance tracking ===

    /// Record one evaluation. The consecutive counter increments only
    /// when both the new and the previously stored classification are
    /// non-compliant; a fresh non-compliant streak starts at 1; any
    /// other classification resets to 0.
    pub fn upsert_compliance_state(
        &self,
        driver_id: i64,
        status: ComplianceStatus,
        now: DateTime<Utc>,
    ) -> Result<ComplianceState, DatabaseError> {
        Ok(self.conn().query_row(
            "INSERT INTO compliance_tracking
                 (driver_id, last_status, last_report_at, consecutive_reports, updated_at)
             VALUES (?1, ?2, ?3,
                     CASE WHEN ?2 = 'non_compliant' THEN 1 ELSE 0 END, ?3)
             ON CONFLICT (driver_id)
             DO UPDATE SET
                 consecutive_reports = CASE
                     WHEN excluded.last_status = 'non_compliant'
                          AND compliance_tracking.last_status = 'non_compliant'
                         THEN compliance_tracking.consecutive_reports + 1
                     WHEN excluded.last_status = 'non_compliant' THEN 1
                     ELSE 0
                 END,
                 last_status = excluded.last_status,
                 last_report_at = excluded.last_report_at,
                 updated_at = excluded.updated_at
             RETURNING *",
            params![driver_id, status.as_str(), now.to_rfc3339()],
            row_to_state,
        )?)
    }

    pub fn reset_compliance_state(
        &self,
        driver_id: i64,
        status: ComplianceStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE compliance_tracking
             SET consecutive_reports = 0, last_status = ?2,
                 last_report_at = ?3, updated_at = ?3
             WHERE driver_id = ?1",
            params![driver_id, status.as_str(), now.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn compliance_state(
        &self,
        driver_id: i64,
    ) -> Result<Option<ComplianceState>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM compliance_tracking WHERE driver_id = ?1",
                params![driver_id],
                row_to_state,
            )
            .optional()?)
    }

    pub fn mark_driver_alert(
        &self,
        driver_id: i64,
        when: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE compliance_tracking
             SET last_driver_alert_at = ?2, updated_at = ?2 WHERE driver_id = ?1",
            params![driver_id, when.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn mark_dispatch_alert(
        &self,
        driver_id: i64,
        when: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE compliance_tracking
             SET last_dispatch_alert_at = ?2, updated_at = ?2 WHERE driver_id = ?1",
            params![driver_id, when.to_rfc3339()],
        )?;
        Ok(())
    }

    // === Comment workflow ===

    pub fn store_comment_prompt(
        &self,
        driver_id: i64,
        prompt_ref: &str,
    ) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT INTO compliance_tracking (driver_id, comment_prompt_ref, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (driver_id)
             DO UPDATE SET comment_prompt_ref = excluded.comment_prompt_ref,
                           updated_at = excluded.updated_at",
            params![driver_id, prompt_ref, now_str()],
        )?;
        Ok(())
    }

    /// Single-use resolution: clears the correlation id once matched.
    pub fn resolve_comment_prompt(
        &self,
        prompt_ref: &str,
    ) -> Result<Option<i64>, DatabaseError> {
        let driver_id: Option<i64> = self
            .conn()
            .query_row(
                "SELECT driver_id FROM compliance_tracking WHERE comment_prompt_ref = ?1",
                params![prompt_ref],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(driver_id) = driver_id {
            self.conn().execute(
                "UPDATE compliance_tracking
                 SET comment_prompt_ref = NULL, updated_at = ?2 WHERE driver_id = ?1",
                params![driver_id, now_str()],
            )?;
        }
        Ok(driver_id)
    }

    pub fn record_note(
        &self,
        driver_id: i64,
        author_id: i64,
        note: &str,
    ) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT INTO compliance_notes (driver_id, author_id, note, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![driver_id, author_id, note, now_str()],
        )?;
        Ok(())
    }

    /// Latest note per driver, for pending detail lines.
    pub fn latest_notes(
        &self,
        driver_ids: &[i64],
    ) -> Result<HashMap<i64, String>, DatabaseError> {
        let mut notes = HashMap::new();
        let mut stmt = self.conn().prepare(
            "SELECT note FROM compliance_notes
             WHERE driver_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )?;
        for &driver_id in driver_ids {
            let note: Option<String> = stmt
                .query_row(params![driver_id], |row| row.get(0))
                .optional()?;
            if let Some(note) = note {
                notes.insert(driver_id, note);
            }
        }
        Ok(notes)
    }

    /// Audit-logged full tracking reset.
    pub fn clear_compliance_tracking(&self) -> Result<(), DatabaseError> {
        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO compliance_resets (created_at) VALUES (?1)",
            params![now_str()],
        )?;
        tx.execute("DELETE FROM compliance_tracking", [])?;
        tx.commit()?;
        Ok(())
    }
}
