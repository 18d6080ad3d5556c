//! Streak engine: consecutive-pass counters.
//!
//! `current` grows on every pass and `best` never decreases. The
//! nightly rollover zeroes `current` only for drivers with no check-in
//! row at all for the prior day; a recorded fail/needs-fix/excused day
//! does not zero the streak by this pass alone (see the rollover test).

use chrono::{NaiveDate, Utc};
use rusqlite::params;

use crate::error::DatabaseError;
use crate::storage::Database;

/// Bump the streak after a pass decision.
pub fn update_after_pass(
    db: &Database,
    driver_id: i64,
    check_date: NaiveDate,
) -> Result<(), DatabaseError> {
    db.conn().execute(
        "UPDATE drivers
         SET streak_current = streak_current + 1,
             streak_best = MAX(streak_best, streak_current + 1),
             last_check_date = ?2,
             updated_at = ?3
         WHERE id = ?1",
        params![driver_id, check_date.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Midnight rollover: zero the current streak for every active driver
/// with no check-in row at all for `check_date`.
///
/// Returns how many drivers were reset.
pub fn reset_missed(
    db: &Database,
    group_id: i64,
    check_date: NaiveDate,
) -> Result<usize, DatabaseError> {
    let reset = db.conn().execute(
        "UPDATE drivers
         SET streak_current = 0, updated_at = ?3
         WHERE active = 1
           AND NOT EXISTS (
             SELECT 1 FROM daily_checkins
             WHERE daily_checkins.driver_id = drivers.id
               AND daily_checkins.group_id = ?1
               AND daily_checkins.date = ?2
           )",
        params![group_id, check_date.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(reset)
}
