//! Compliance tracker: periodic classification, escalation, and the
//! comment workflow.
//!
//! A sweep runs on an external tick (every 2 hours in the stock
//! schedule) over the current snapshot of active drivers and their
//! latest check-in. Classification is evaluated against a 24-hour
//! window; repeated non-compliant classifications ratchet a per-driver
//! counter that drives the driver nudge and the supervisor escalation,
//! each behind an independent 24-hour cooldown.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::Result;
use crate::ledger::{Checkin, CheckinStatus, Driver};
use crate::report;
use crate::roles::{self, GroupSettings};
use crate::storage::{ComplianceConfig, DbHandle};
use crate::transport::{SendOptions, Transport};

/// Classification of one driver at one evaluation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    Exception,
}

impl ComplianceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "compliant",
            ComplianceStatus::NonCompliant => "non_compliant",
            ComplianceStatus::Exception => "exception",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "compliant" => Some(ComplianceStatus::Compliant),
            "non_compliant" => Some(ComplianceStatus::NonCompliant),
            "exception" => Some(ComplianceStatus::Exception),
            _ => None,
        }
    }
}

/// Per-driver tracking row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceState {
    pub driver_id: i64,
    pub consecutive_reports: i64,
    pub last_status: Option<ComplianceStatus>,
    pub last_report_at: Option<DateTime<Utc>>,
    pub last_driver_alert_at: Option<DateTime<Utc>>,
    pub last_dispatch_alert_at: Option<DateTime<Utc>>,
    /// Outbound comment-prompt correlation id; single-use.
    pub comment_prompt_ref: Option<String>,
}

/// One driver's classification within a sweep.
#[derive(Debug, Clone)]
pub struct ComplianceEntry {
    pub driver: Driver,
    pub status: ComplianceStatus,
    pub reason: Option<String>,
    pub target_date: NaiveDate,
}

/// What a sweep did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub compliant: usize,
    pub pending: usize,
    pub exceptions: usize,
    pub effective_total: usize,
    pub driver_alerts: usize,
    pub dispatch_alerts: usize,
}

/// Periodic compliance evaluation over the ledger snapshot.
#[derive(Clone)]
pub struct ComplianceTracker {
    db: DbHandle,
    transport: Arc<dyn Transport>,
    config: ComplianceConfig,
}

impl ComplianceTracker {
    pub fn new(db: DbHandle, transport: Arc<dyn Transport>, config: ComplianceConfig) -> Self {
        Self {
            db,
            transport,
            config,
        }
    }

    fn window(&self) -> Duration {
        Duration::hours(self.config.window_hours)
    }

    /// Classify one driver against the compliance window.
    ///
    /// Pure; the sweep applies channel-pause downgrades afterwards
    /// because they need a transport lookup.
    pub fn classify(
        &self,
        driver: &Driver,
        checkin: Option<&Checkin>,
        now: DateTime<Utc>,
        fallback_date: NaiveDate,
    ) -> (ComplianceStatus, Option<String>, NaiveDate) {
        let window = self.window();
        if let Some(checkin) = checkin {
            let reason_lower = checkin
                .reason
                .as_deref()
                .map(str::to_lowercase)
                .unwrap_or_default();
            if !reason_lower.is_empty()
                && self
                    .config
                    .exception_keywords
                    .iter()
                    .any(|keyword| reason_lower.contains(keyword))
            {
                return (
                    ComplianceStatus::Exception,
                    checkin.reason.clone(),
                    checkin.date,
                );
            }
            match checkin.status {
                CheckinStatus::Pass => {
                    if checkin
                        .reviewed_at
                        .is_some_and(|reviewed| now - reviewed <= window)
                    {
                        return (ComplianceStatus::Compliant, None, checkin.date);
                    }
                }
                CheckinStatus::Excused => {
                    return (
                        ComplianceStatus::Exception,
                        checkin.reason.clone(),
                        checkin.date,
                    );
                }
                CheckinStatus::NeedsFix => {
                    return (
                        ComplianceStatus::Exception,
                        Some("Needs fix".to_string()),
                        checkin.date,
                    );
                }
                CheckinStatus::Fail => {
                    return (
                        ComplianceStatus::NonCompliant,
                        checkin.reason.clone(),
                        checkin.date,
                    );
                }
                CheckinStatus::Pending | CheckinStatus::Submitted => {
                    if driver
                        .last_pass_at
                        .is_some_and(|last_pass| now - last_pass <= window)
                    {
                        return (ComplianceStatus::Compliant, None, checkin.date);
                    }
                }
            }
            return (
                ComplianceStatus::NonCompliant,
                checkin.reason.clone(),
                checkin.date,
            );
        }

        if driver
            .last_pass_at
            .is_some_and(|last_pass| now - last_pass <= window)
        {
            return (ComplianceStatus::Compliant, None, fallback_date);
        }
        (ComplianceStatus::NonCompliant, None, fallback_date)
    }

    /// Run one evaluation tick and post the report.
    ///
    /// Updates every driver's tracking row in the same pass that decides
    /// alerts, so cooldowns hold on the next tick. No-op without a
    /// compliance channel.
    pub async fn run_sweep(&self, group: &GroupSettings) -> Result<SweepSummary> {
        let Some(compliance_channel) = group.compliance_channel_id else {
            return Ok(SweepSummary::default());
        };
        let now = Utc::now();
        let today = group.local_date(now);

        let (drivers, latest) = self.db.with(|db| {
            let drivers = db.active_drivers()?;
            let latest = db.latest_checkins_by_driver(group.id)?;
            Ok::<_, crate::error::DatabaseError>((drivers, latest))
        })?;

        let mut entries: Vec<ComplianceEntry> = Vec::new();
        for driver in drivers {
            let checkin = latest.get(&driver.id);
            let (status, reason, target_date) = self.classify(&driver, checkin, now, today);
            entries.push(ComplianceEntry {
                driver,
                status,
                reason,
                target_date,
            });
        }
        let total_drivers = entries.len();

        // A paused notification channel downgrades non-compliant to
        // exception: the driver is out of rotation, not delinquent.
        for entry in &mut entries {
            if entry.status != ComplianceStatus::NonCompliant {
                continue;
            }
            let Some(channel_id) = entry.driver.notify_channel_id else {
                continue;
            };
            match self.transport.get_channel_info(channel_id).await {
                Ok(info) => {
                    if roles::is_paused_title(&info.title, &self.config.pause_tokens) {
                        entry.status = ComplianceStatus::Exception;
                        entry.reason = Some("Chat inactive".to_string());
                    }
                }
                Err(e) => {
                    error!(channel_id, error = %e, "failed to inspect driver channel");
                }
            }
        }

        let exceptions = entries
            .iter()
            .filter(|e| e.status == ComplianceStatus::Exception)
            .count();
        let pending: Vec<&ComplianceEntry> = entries
            .iter()
            .filter(|e| e.status == ComplianceStatus::NonCompliant)
            .collect();
        let effective_total = total_drivers.saturating_sub(exceptions);
        let compliant = effective_total.saturating_sub(pending.len());

        // Tracking update + alert decisions in one pass.
        let mut alert_driver: Vec<ComplianceEntry> = Vec::new();
        let mut alert_dispatch: Vec<ComplianceEntry> = Vec::new();
        for entry in &entries {
            let state = self
                .db
                .with(|db| db.upsert_compliance_state(entry.driver.id, entry.status, now))?;
            if entry.status == ComplianceStatus::NonCompliant {
                if entry.driver.notify_channel_id.is_some() && self.should_alert_driver(&state, now)
                {
                    alert_driver.push(entry.clone());
                    self.db
                        .with(|db| db.mark_driver_alert(entry.driver.id, now))?;
                }
                if self.should_alert_dispatch(&state, now) {
                    alert_dispatch.push(entry.clone());
                    self.db
                        .with(|db| db.mark_dispatch_alert(entry.driver.id, now))?;
                }
            } else if state.consecutive_reports != 0 {
                self.db
                    .with(|db| db.reset_compliance_state(entry.driver.id, entry.status, now))?;
            }
        }

        let mut summary_lines = vec![
            "📊 Compliance Report (Last 24h)".to_string(),
            format!("✅ {compliant}/{effective_total} drivers sent daily check media."),
            format!("❌ {} drivers pending", pending.len()),
        ];
        if exceptions > 0 {
            summary_lines.push(format!("🛠️ Exceptions: {exceptions}"));
        }
        self.transport
            .send_message(
                compliance_channel,
                &summary_lines.join("\n"),
                SendOptions::silent(),
            )
            .await?;

        let pending_ids: Vec<i64> = pending.iter().map(|e| e.driver.id).collect();
        let notes = self.db.with(|db| db.latest_notes(&pending_ids))?;
        for entry in &pending {
            let note_line = notes
                .get(&entry.driver.id)
                .map(|note| format!("\nNote: {note}"))
                .unwrap_or_default();
            let detail = format!(
                "🚨 Pending daily check\nDriver: {}\nSince: {}{note_line}",
                entry.driver.mention(),
                entry.target_date,
            );
            if let Err(e) = self
                .transport
                .send_message(compliance_channel, &detail, SendOptions::silent())
                .await
            {
                error!(driver_id = entry.driver.id, error = %e, "failed to post pending detail");
            }
        }

        // Driver nudges and supervisor escalations are best-effort: a
        // failed send must not block the remaining alerts.
        for entry in &alert_driver {
            let Some(channel_id) = entry.driver.notify_channel_id else {
                continue;
            };
            if let Err(e) = self
                .transport
                .send_message(
                    channel_id,
                    "🚨 Daily check media still missing.\nPlease send now to avoid a violation.",
                    SendOptions::default(),
                )
                .await
            {
                error!(driver_id = entry.driver.id, error = %e, "failed to send driver nudge");
            }
        }
        for entry in &alert_dispatch {
            let text = format!(
                "⚠️ Overdue – {} please call {}.",
                self.config.fleet_mention,
                entry.driver.mention()
            );
            if let Err(e) = self
                .transport
                .send_message(compliance_channel, &text, SendOptions::default())
                .await
            {
                error!(driver_id = entry.driver.id, error = %e, "failed to post escalation");
            }
        }

        let summary = SweepSummary {
            compliant,
            pending: pending.len(),
            exceptions,
            effective_total,
            driver_alerts: alert_driver.len(),
            dispatch_alerts: alert_dispatch.len(),
        };
        info!(
            group_id = group.id,
            compliant = summary.compliant,
            pending = summary.pending,
            exceptions = summary.exceptions,
            "compliance sweep complete"
        );
        Ok(summary)
    }

    fn should_alert_driver(&self, state: &ComplianceState, now: DateTime<Utc>) -> bool {
        if state.consecutive_reports < self.config.driver_alert_threshold {
            return false;
        }
        !state
            .last_driver_alert_at
            .is_some_and(|last| now - last < self.window())
    }

    fn should_alert_dispatch(&self, state: &ComplianceState, now: DateTime<Utc>) -> bool {
        if state.consecutive_reports < self.config.dispatch_alert_threshold {
            return false;
        }
        !state
            .last_dispatch_alert_at
            .is_some_and(|last| now - last < self.window())
    }

    /// Post yesterday's snapshot after the midnight rollover.
    pub async fn daily_snapshot(
        &self,
        group: &GroupSettings,
        target_date: NaiveDate,
    ) -> Result<()> {
        let Some(compliance_channel) = group.compliance_channel_id else {
            return Ok(());
        };

        let (total_drivers, counts) = self.db.with(|db| {
            let drivers = db.active_drivers()?;
            let counts = report::daily_stats(db, group.id, target_date)?;
            Ok::<_, crate::error::DatabaseError>((drivers.len(), counts))
        })?;
        let missed = total_drivers.saturating_sub(counts.done as usize);

        let (best, worst) =
            self.db
                .with(|db| report::weekly_rankings(db, group.id, target_date, 3))?;

        let mut lines = vec![
            format!("📅 Daily Compliance ({})", target_date.format("%b %d")),
            format!("✅ {}/{total_drivers} drivers completed yesterday's check.", counts.done),
            format!("❌ {missed} missed"),
        ];
        if !best.is_empty() {
            let text = best
                .iter()
                .map(|row| format!("{} ({}%)", row.label, row.pct))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("Top compliant drivers: {text}."));
        }
        if !worst.is_empty() {
            let text = worst
                .iter()
                .map(|row| format!("{} ({}%)", row.label, row.pct))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("Worst compliance: {text}."));
        }

        self.transport
            .send_message(compliance_channel, &lines.join("\n"), SendOptions::silent())
            .await?;
        Ok(())
    }

    /// Post the Monday leaderboard over the trailing week.
    pub async fn weekly_leaderboard(
        &self,
        group: &GroupSettings,
        end_date: NaiveDate,
    ) -> Result<()> {
        let Some(compliance_channel) = group.compliance_channel_id else {
            return Ok(());
        };
        let (top, worst) = self
            .db
            .with(|db| report::weekly_rankings(db, group.id, end_date, 10))?;
        if top.is_empty() && worst.is_empty() {
            return Ok(());
        }

        let mut lines = vec!["🏆 Compliance Leaderboard".to_string()];
        if !top.is_empty() {
            lines.push("TOP 10".to_string());
            for (idx, row) in top.iter().enumerate() {
                lines.push(format!("{}. {} – {}%", idx + 1, row.label, row.pct));
            }
        }
        if !worst.is_empty() {
            lines.push("Worst TOP 10:".to_string());
            for (idx, row) in worst.iter().enumerate() {
                lines.push(format!("{}. {} – {}%", idx + 1, row.label, row.pct));
            }
        }

        self.transport
            .send_message(compliance_channel, &lines.join("\n"), SendOptions::silent())
            .await?;
        Ok(())
    }

    /// React to a review pass: reset tracking, and congratulate once per
    /// week after five weekly passes.
    pub async fn handle_pass_event(
        &self,
        group: &GroupSettings,
        driver: &Driver,
        reviewed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.db.with(|db| {
            db.upsert_compliance_state(driver.id, ComplianceStatus::Compliant, reviewed_at)?;
            db.reset_compliance_state(driver.id, ComplianceStatus::Compliant, reviewed_at)
        })?;

        let event_date = group.local_date(reviewed_at);
        let week_start =
            event_date - Duration::days(i64::from(event_date.weekday().num_days_from_monday()));
        let week_end = week_start + Duration::days(6);

        let passes = self
            .db
            .with(|db| db.pass_count_between(driver.id, group.id, week_start, week_end))?;
        if passes < 5 {
            return Ok(());
        }
        let already_congratulated = driver
            .last_congrats_at
            .is_some_and(|at| group.local_date(at) >= week_start);
        if already_congratulated {
            return Ok(());
        }

        let text = "🎉 Great job keeping compliant this week!\n\
                    Five or more passing checks – keep it up!";
        match self
            .transport
            .send_message(driver.notify_target(), text, SendOptions::default())
            .await
        {
            Ok(_) => {
                self.db
                    .with(|db| db.set_driver_last_congrats(driver.id, reviewed_at))?;
            }
            Err(e) => {
                error!(driver_id = driver.id, error = %e, "failed to send congrats");
            }
        }
        Ok(())
    }

    // === Comment workflow ===

    /// Remember which driver an outbound comment prompt refers to.
    pub fn store_comment_prompt(&self, driver_id: i64, prompt_ref: &str) -> Result<()> {
        self.db
            .with(|db| db.store_comment_prompt(driver_id, prompt_ref))?;
        Ok(())
    }

    /// Resolve an inbound reply back to a driver id. Single-use: the
    /// correlation id is cleared once matched.
    pub fn resolve_comment_prompt(&self, prompt_ref: &str) -> Result<Option<i64>> {
        Ok(self.db.with(|db| db.resolve_comment_prompt(prompt_ref))?)
    }

    /// Attach a reviewer note to a driver.
    pub fn record_note(&self, driver_id: i64, author_id: i64, note: &str) -> Result<()> {
        self.db
            .with(|db| db.record_note(driver_id, author_id, note))?;
        Ok(())
    }

    /// Audit-logged full tracking reset.
    pub fn clear_tracking(&self) -> Result<()> {
        self.db.with(|db| db.clear_compliance_tracking())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MessageRef;
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send_message(
            &self,
            _channel: i64,
            _text: &str,
            _opts: SendOptions,
        ) -> Result<MessageRef, crate::error::TransportError> {
            Ok(MessageRef(1))
        }
        async fn send_media(
            &self,
            _channel: i64,
            _media: &crate::transport::MediaFile,
            _caption: Option<&str>,
        ) -> Result<MessageRef, crate::error::TransportError> {
            Ok(MessageRef(1))
        }
        async fn edit_message(
            &self,
            _channel: i64,
            _message: MessageRef,
            _text: &str,
        ) -> Result<crate::transport::EditOutcome, crate::error::TransportError> {
            Ok(crate::transport::EditOutcome::Edited)
        }
        async fn get_channel_info(
            &self,
            channel: i64,
        ) -> Result<crate::transport::ChannelInfo, crate::error::TransportError> {
            Ok(crate::transport::ChannelInfo {
                id: channel,
                title: "Unit".to_string(),
            })
        }
        async fn get_membership(
            &self,
            _group_channel: i64,
            _user_ref: i64,
        ) -> Result<crate::transport::MembershipRole, crate::error::TransportError> {
            Ok(crate::transport::MembershipRole::Member)
        }
    }

    fn tracker() -> ComplianceTracker {
        let db = DbHandle::new(crate::storage::Database::open_memory().unwrap());
        ComplianceTracker::new(db, Arc::new(NullTransport), ComplianceConfig::default())
    }

    fn driver(last_pass_at: Option<DateTime<Utc>>) -> Driver {
        Driver {
            id: 1,
            user_ref: 100,
            handle: Some("bigrig".to_string()),
            display_name: None,
            active: true,
            streak_current: 0,
            streak_best: 0,
            notify_channel_id: None,
            last_pass_at,
            last_congrats_at: None,
        }
    }

    fn checkin(status: CheckinStatus, reason: Option<&str>) -> Checkin {
        Checkin {
            id: 7,
            driver_id: 1,
            group_id: -500,
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            sent_at: None,
            responded_at: None,
            status,
            reason: reason.map(str::to_string),
            reviewer_id: None,
            reviewed_at: Some(Utc::now()),
            card_ref: None,
            media_count: 0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn exception_keywords_beat_status() {
        let t = tracker();
        let now = Utc::now();
        let c = checkin(CheckinStatus::Fail, Some("Truck is AT SHOP today"));
        let (status, reason, _) = t.classify(&driver(None), Some(&c), now, c.date);
        assert_eq!(status, ComplianceStatus::Exception);
        assert_eq!(reason.as_deref(), Some("Truck is AT SHOP today"));
    }

    #[test]
    fn recent_pass_is_compliant_stale_pass_is_not() {
        let t = tracker();
        let now = Utc::now();

        let mut fresh = checkin(CheckinStatus::Pass, None);
        fresh.reviewed_at = Some(now - Duration::hours(2));
        let (status, _, _) = t.classify(&driver(None), Some(&fresh), now, fresh.date);
        assert_eq!(status, ComplianceStatus::Compliant);

        let mut stale = checkin(CheckinStatus::Pass, None);
        stale.reviewed_at = Some(now - Duration::hours(30));
        let (status, _, _) = t.classify(&driver(None), Some(&stale), now, stale.date);
        assert_eq!(status, ComplianceStatus::NonCompliant);
    }

    #[test]
    fn open_checkin_rides_on_recent_pass() {
        let t = tracker();
        let now = Utc::now();
        let c = checkin(CheckinStatus::Submitted, None);

        let fresh = driver(Some(now - Duration::hours(3)));
        let (status, _, _) = t.classify(&fresh, Some(&c), now, c.date);
        assert_eq!(status, ComplianceStatus::Compliant);

        let stale = driver(Some(now - Duration::hours(25)));
        let (status, _, _) = t.classify(&stale, Some(&c), now, c.date);
        assert_eq!(status, ComplianceStatus::NonCompliant);
    }

    #[test]
    fn excused_and_needs_fix_are_exceptions() {
        let t = tracker();
        let now = Utc::now();
        let c = checkin(CheckinStatus::Excused, Some("Off today"));
        let (status, _, _) = t.classify(&driver(None), Some(&c), now, c.date);
        assert_eq!(status, ComplianceStatus::Exception);

        let c = checkin(CheckinStatus::NeedsFix, None);
        let (status, reason, _) = t.classify(&driver(None), Some(&c), now, c.date);
        assert_eq!(status, ComplianceStatus::Exception);
        assert_eq!(reason.as_deref(), Some("Needs fix"));
    }

    #[test]
    fn no_row_falls_back_to_last_pass() {
        let t = tracker();
        let now = Utc::now();
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

        let (status, _, date) = t.classify(&driver(None), None, now, today);
        assert_eq!(status, ComplianceStatus::NonCompliant);
        assert_eq!(date, today);

        let (status, _, _) =
            t.classify(&driver(Some(now - Duration::hours(1))), None, now, today);
        assert_eq!(status, ComplianceStatus::Compliant);
    }
}
