//! Daily digest posted to the review channel.

use chrono::NaiveDate;

use crate::error::Result;
use crate::report::{self, DailyStats};
use crate::roles::GroupSettings;
use crate::storage::DbHandle;
use crate::transport::{SendOptions, Transport};

/// Render the digest text for one day's stats.
pub fn render_daily_digest(stats: &DailyStats) -> String {
    let percent = if stats.total > 0 {
        ((stats.done as f64 / stats.total as f64) * 100.0).round() as i64
    } else {
        0
    };
    let pending_text = if stats.pending_handles.is_empty() {
        "None".to_string()
    } else {
        stats.pending_handles.join(", ")
    };

    format!(
        "Daily Checks — Done {} / Total {} ({percent}%)\n\
         Pending: {pending_text}\n\
         Excused: {}\n\
         Fails: {}\n\
         Top streaks: {}",
        stats.done,
        stats.total,
        stats.excused,
        stats.fails,
        format_top_streaks(&stats.top_streaks),
    )
}

pub fn format_top_streaks(entries: &[(String, i64)]) -> String {
    if entries.is_empty() {
        return "None".to_string();
    }
    entries
        .iter()
        .map(|(name, streak)| format!("{name} {streak}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compute and post the digest for `check_date`.
pub async fn send_daily_digest(
    db: &DbHandle,
    transport: &dyn Transport,
    group: &GroupSettings,
    check_date: NaiveDate,
) -> Result<()> {
    let stats = db.with(|db| report::daily_stats(db, group.id, check_date))?;
    let message = render_daily_digest(&stats);
    transport
        .send_message(group.review_channel_id, &message, SendOptions::default())
        .await?;
    Ok(())
}
