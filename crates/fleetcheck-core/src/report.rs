//! Reporting aggregator: point-in-time and windowed statistics.
//!
//! Pure read/aggregate queries over the ledger. No mutation; safe to
//! call at arbitrary frequency, including from a read replica.

use chrono::{Duration, NaiveDate};
use rusqlite::params;

use crate::error::DatabaseError;
use crate::ledger::Checkin;
use crate::storage::Database;

/// Counts and highlights for one group-local day.
#[derive(Debug, Clone, Default)]
pub struct DailyStats {
    pub done: i64,
    pub pending: i64,
    pub excused: i64,
    pub fails: i64,
    pub total: i64,
    pub pending_handles: Vec<String>,
    /// Top current streaks as (label, current).
    pub top_streaks: Vec<(String, i64)>,
}

/// One driver's weekly pass ratio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankRow {
    pub driver_id: i64,
    pub label: String,
    pub pct: i64,
}

fn label(handle: Option<String>, display_name: Option<String>, driver_id: i64) -> String {
    if let Some(handle) = handle {
        return format!("@{handle}");
    }
    display_name.unwrap_or_else(|| format!("Driver {driver_id}"))
}

/// Done/pending/excused/fail counts for one day, with pending handles
/// and the top-3 current streaks.
pub fn daily_stats(
    db: &Database,
    group_id: i64,
    date: NaiveDate,
) -> Result<DailyStats, DatabaseError> {
    let mut stats = db.conn().query_row(
        "SELECT
            COUNT(*) FILTER (WHERE status = 'pass') AS done,
            COUNT(*) FILTER (WHERE status IN ('pending', 'submitted')) AS pending,
            COUNT(*) FILTER (WHERE status = 'excused') AS excused,
            COUNT(*) FILTER (WHERE status = 'fail') AS fails,
            COUNT(*) AS total
         FROM daily_checkins
         WHERE group_id = ?1 AND date = ?2",
        params![group_id, date.to_string()],
        |row| {
            Ok(DailyStats {
                done: row.get(0)?,
                pending: row.get(1)?,
                excused: row.get(2)?,
                fails: row.get(3)?,
                total: row.get(4)?,
                ..DailyStats::default()
            })
        },
    )?;

    let mut stmt = db.conn().prepare(
        "SELECT d.id, d.handle, d.display_name
         FROM daily_checkins dc
         JOIN drivers d ON dc.driver_id = d.id
         WHERE dc.group_id = ?1 AND dc.date = ?2
           AND dc.status IN ('pending', 'submitted')
         ORDER BY d.handle IS NULL, d.handle, d.display_name",
    )?;
    let rows = stmt.query_map(params![group_id, date.to_string()], |row| {
        Ok(label(row.get(1)?, row.get(2)?, row.get(0)?))
    })?;
    stats.pending_handles = rows.collect::<Result<Vec<_>, _>>()?;

    stats.top_streaks = top_streaks(db, 3)?;
    Ok(stats)
}

/// Highest current streaks among active drivers.
pub fn top_streaks(db: &Database, limit: i64) -> Result<Vec<(String, i64)>, DatabaseError> {
    let mut stmt = db.conn().prepare(
        "SELECT id, handle, display_name, streak_current
         FROM drivers
         WHERE active = 1 AND streak_current > 0
         ORDER BY streak_current DESC, streak_best DESC, handle
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok((
            label(row.get(1)?, row.get(2)?, row.get(0)?),
            row.get::<_, i64>(3)?,
        ))
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Pass-ratio rankings over the trailing 7-day window ending at
/// `end_date`, excluding excused days from the denominator. Returns
/// (best, worst), each at most `limit` rows; drivers with no countable
/// days are skipped.
pub fn weekly_rankings(
    db: &Database,
    group_id: i64,
    end_date: NaiveDate,
    limit: usize,
) -> Result<(Vec<RankRow>, Vec<RankRow>), DatabaseError> {
    let start_date = end_date - Duration::days(6);
    let mut stmt = db.conn().prepare(
        "SELECT d.id, d.handle, d.display_name,
                COUNT(*) FILTER (WHERE dc.status = 'pass') AS passes,
                COUNT(*) FILTER (WHERE dc.status <> 'excused') AS total
         FROM drivers d
         LEFT JOIN daily_checkins dc
             ON dc.driver_id = d.id AND dc.group_id = ?1
            AND dc.date BETWEEN ?2 AND ?3
         WHERE d.active = 1
         GROUP BY d.id
         HAVING COUNT(*) FILTER (WHERE dc.status <> 'excused') > 0",
    )?;
    let rows = stmt.query_map(
        params![group_id, start_date.to_string(), end_date.to_string()],
        |row| {
            let driver_id: i64 = row.get(0)?;
            let passes: i64 = row.get(3)?;
            let total: i64 = row.get(4)?;
            let pct = if total > 0 {
                ((passes as f64 / total as f64) * 100.0).round() as i64
            } else {
                0
            };
            Ok(RankRow {
                driver_id,
                label: label(row.get(1)?, row.get(2)?, driver_id),
                pct,
            })
        },
    )?;
    let rows = rows.collect::<Result<Vec<_>, _>>()?;

    let mut top = rows.clone();
    top.sort_by(|a, b| b.pct.cmp(&a.pct).then_with(|| a.label.cmp(&b.label)));
    top.truncate(limit);

    let mut worst = rows;
    worst.sort_by(|a, b| a.pct.cmp(&b.pct).then_with(|| a.label.cmp(&b.label)));
    worst.truncate(limit);

    Ok((top, worst))
}

/// A driver's check-ins over the trailing `days` days, newest first.
pub fn recent_history(
    db: &Database,
    driver_id: i64,
    today: NaiveDate,
    days: i64,
) -> Result<Vec<Checkin>, DatabaseError> {
    db.recent_checkins(driver_id, today, days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CheckinStatus;
    use crate::streaks;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn seed(db: &Database, user_ref: i64, handle: &str) -> i64 {
        db.upsert_driver(Some(user_ref), Some(handle), None)
            .unwrap()
            .id
    }

    #[test]
    fn daily_stats_counts_by_status() {
        let db = Database::open_memory().unwrap();
        let a = seed(&db, 1, "alpha");
        let b = seed(&db, 2, "bravo");
        let c = seed(&db, 3, "charlie");

        db.ensure_checkin(a, -10, day(1)).unwrap();
        db.update_review_status(a, -10, day(1), CheckinStatus::Pass, 9, None)
            .unwrap();
        db.ensure_checkin(b, -10, day(1)).unwrap();
        db.set_excused(c, -10, day(1), "Off today").unwrap();

        let stats = daily_stats(&db, -10, day(1)).unwrap();
        assert_eq!(stats.done, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.excused, 1);
        assert_eq!(stats.fails, 0);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending_handles, vec!["@bravo".to_string()]);
    }

    #[test]
    fn top_streaks_orders_by_current() {
        let db = Database::open_memory().unwrap();
        let a = seed(&db, 1, "alpha");
        let b = seed(&db, 2, "bravo");
        streaks::update_after_pass(&db, a, day(1)).unwrap();
        for d in 1..=3 {
            streaks::update_after_pass(&db, b, day(d)).unwrap();
        }

        let top = top_streaks(&db, 3).unwrap();
        assert_eq!(top[0], ("@bravo".to_string(), 3));
        assert_eq!(top[1], ("@alpha".to_string(), 1));
    }

    #[test]
    fn weekly_rankings_exclude_excused_days() {
        let db = Database::open_memory().unwrap();
        let a = seed(&db, 1, "alpha");
        let b = seed(&db, 2, "bravo");

        // alpha: 2 passes + 1 excused day -> 2/2 = 100%
        for d in [1, 2] {
            db.ensure_checkin(a, -10, day(d)).unwrap();
            db.update_review_status(a, -10, day(d), CheckinStatus::Pass, 9, None)
                .unwrap();
        }
        db.set_excused(a, -10, day(3), "Off today").unwrap();

        // bravo: 1 pass + 1 fail -> 50%
        db.ensure_checkin(b, -10, day(1)).unwrap();
        db.update_review_status(b, -10, day(1), CheckinStatus::Pass, 9, None)
            .unwrap();
        db.ensure_checkin(b, -10, day(2)).unwrap();
        db.update_review_status(b, -10, day(2), CheckinStatus::Fail, 9, None)
            .unwrap();

        let (top, worst) = weekly_rankings(&db, -10, day(7), 10).unwrap();
        assert_eq!(top[0].label, "@alpha");
        assert_eq!(top[0].pct, 100);
        assert_eq!(worst[0].label, "@bravo");
        assert_eq!(worst[0].pct, 50);
    }

    #[test]
    fn rankings_skip_drivers_without_countable_days() {
        let db = Database::open_memory().unwrap();
        let a = seed(&db, 1, "alpha");
        seed(&db, 2, "bravo"); // no rows at all
        db.set_excused(a, -10, day(1), "Off today").unwrap();

        let (top, worst) = weekly_rankings(&db, -10, day(7), 10).unwrap();
        assert!(top.is_empty());
        assert!(worst.is_empty());
    }
}
