//! Reviewer actions over a check-in.
//!
//! Each action is one orchestration: permission guard, ledger
//! transition, follow-up cancellation, card sync, and the downstream
//! reactions (streak bump, compliance pass event). Side-effect sends to
//! the driver are best-effort; the ledger transition is the primary
//! mutation and its errors propagate.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{error, info};

use crate::compliance::ComplianceTracker;
use crate::error::{AccessError, CoreError, Result};
use crate::events::Event;
use crate::ledger::{self, Checkin, CheckinStatus, Driver};
use crate::roles::{self, GroupSettings};
use crate::scheduler::JobScheduler;
use crate::storage::DbHandle;
use crate::streaks;
use crate::transport::{SendOptions, Transport};

/// Reviewer-selectable fail reasons.
pub const FAIL_REASONS: &[(&str, &str)] = &[
    ("low_tire", "Low tire"),
    ("abs_lamp", "ABS lamp"),
    ("air_leak", "Air leak"),
    ("lights", "Lights"),
    ("equipment", "Missing extinguisher/triangles"),
    ("other", "Other"),
];

/// Label for a fail-reason key; unknown keys collapse to "Other".
pub fn fail_reason_label(key: &str) -> &'static str {
    FAIL_REASONS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| *label)
        .unwrap_or("Other")
}

/// A reviewer decision on one driver-day.
#[derive(Debug, Clone)]
pub enum ReviewAction {
    Pass,
    Fail { reason: String },
    NeedsFix,
    /// Send today's notification and arm follow-ups.
    Notify,
    /// Re-render the review card only.
    Refresh,
}

impl ReviewAction {
    fn mutates(&self) -> bool {
        !matches!(self, ReviewAction::Refresh)
    }
}

/// Reviewer-facing orchestration service.
#[derive(Clone)]
pub struct ReviewService {
    db: DbHandle,
    transport: Arc<dyn Transport>,
    scheduler: JobScheduler,
    compliance: ComplianceTracker,
    admin_only_review: bool,
}

impl ReviewService {
    pub fn new(
        db: DbHandle,
        transport: Arc<dyn Transport>,
        scheduler: JobScheduler,
        admin_only_review: bool,
    ) -> Self {
        let compliance = scheduler.tracker();
        Self {
            db,
            transport,
            scheduler,
            compliance,
            admin_only_review,
        }
    }

    /// Apply a reviewer action to the (driver, date) check-in.
    pub async fn apply(
        &self,
        group: &GroupSettings,
        reviewer_ref: i64,
        driver_id: i64,
        date: NaiveDate,
        action: ReviewAction,
    ) -> Result<Event> {
        roles::ensure_reviewer(
            self.transport.as_ref(),
            group,
            reviewer_ref,
            self.admin_only_review,
        )
        .await?;
        if group.paused && action.mutates() {
            return Err(CoreError::Access(AccessError::GroupPaused(group.id)));
        }

        let driver = self
            .db
            .with(|db| db.driver_by_id(driver_id))?
            .ok_or(CoreError::Access(AccessError::NotFound {
                kind: "driver",
                key: driver_id.to_string(),
            }))?;
        let checkin = self
            .db
            .with(|db| db.checkin_for(driver.id, group.id, date))?
            .ok_or(CoreError::Access(AccessError::NotFound {
                kind: "checkin",
                key: format!("{driver_id}@{date}"),
            }))?;

        match action {
            ReviewAction::Pass => {
                self.decide(group, &driver, date, CheckinStatus::Pass, reviewer_ref, None)
                    .await
            }
            ReviewAction::Fail { reason } => {
                let event = self
                    .decide(
                        group,
                        &driver,
                        date,
                        CheckinStatus::Fail,
                        reviewer_ref,
                        Some(&reason),
                    )
                    .await?;
                self.notify_driver(
                    &driver,
                    &format!("Daily Check failed: {reason}. Dispatcher will follow up."),
                )
                .await;
                Ok(event)
            }
            ReviewAction::NeedsFix => {
                let event = self
                    .decide(
                        group,
                        &driver,
                        date,
                        CheckinStatus::NeedsFix,
                        reviewer_ref,
                        Some("Needs fix"),
                    )
                    .await?;
                self.notify_driver(
                    &driver,
                    "Dispatcher needs you to address today's check-in and resubmit.",
                )
                .await;
                Ok(event)
            }
            ReviewAction::Notify => self.notify_today(group, &driver, checkin, date).await,
            ReviewAction::Refresh => {
                let mut checkin = self
                    .db
                    .with(|db| db.checkin_for(driver.id, group.id, date))?
                    .unwrap_or(checkin);
                ledger::sync_review_card(
                    &self.db,
                    self.transport.as_ref(),
                    group,
                    &driver,
                    &mut checkin,
                )
                .await?;
                Ok(Event::CardRefreshed {
                    checkin_id: checkin.id,
                    at: Utc::now(),
                })
            }
        }
    }

    /// Pass a driver from the compliance panel: the row may not exist
    /// yet for the target date, so it is created first.
    pub async fn compliance_pass(
        &self,
        group: &GroupSettings,
        reviewer_ref: i64,
        driver_id: i64,
        date: NaiveDate,
    ) -> Result<Event> {
        roles::ensure_reviewer(
            self.transport.as_ref(),
            group,
            reviewer_ref,
            self.admin_only_review,
        )
        .await?;
        let driver = self
            .db
            .with(|db| db.driver_by_id(driver_id))?
            .ok_or(CoreError::Access(AccessError::NotFound {
                kind: "driver",
                key: driver_id.to_string(),
            }))?;
        self.db
            .with(|db| db.ensure_checkin(driver.id, group.id, date))?;
        self.decide(group, &driver, date, CheckinStatus::Pass, reviewer_ref, None)
            .await
    }

    /// Terminal decision: ledger update, streak/compliance reactions,
    /// follow-up cancel, card sync.
    async fn decide(
        &self,
        group: &GroupSettings,
        driver: &Driver,
        date: NaiveDate,
        status: CheckinStatus,
        reviewer_ref: i64,
        reason: Option<&str>,
    ) -> Result<Event> {
        let updated = self
            .db
            .with(|db| db.update_review_status(driver.id, group.id, date, status, reviewer_ref, reason))?
            .ok_or(CoreError::Access(AccessError::NotFound {
                kind: "checkin",
                key: format!("{}@{date}", driver.id),
            }))?;

        if status == CheckinStatus::Pass {
            self.db
                .with(|db| streaks::update_after_pass(db, driver.id, date))?;
        }
        // Re-read the driver so the card shows the new streak.
        let driver = self
            .db
            .with(|db| db.driver_by_id(driver.id))?
            .unwrap_or_else(|| driver.clone());

        self.scheduler.cancel_followups(updated.id);

        let mut checkin = updated;
        ledger::sync_review_card(
            &self.db,
            self.transport.as_ref(),
            group,
            &driver,
            &mut checkin,
        )
        .await?;

        if status == CheckinStatus::Pass {
            let reviewed_at = checkin.reviewed_at.unwrap_or_else(Utc::now);
            self.compliance
                .handle_pass_event(group, &driver, reviewed_at)
                .await?;
        }

        info!(
            checkin_id = checkin.id,
            driver_id = driver.id,
            status = status.as_str(),
            "review decision recorded"
        );
        Ok(Event::Reviewed {
            checkin_id: checkin.id,
            driver_id: driver.id,
            status,
            reviewer_id: reviewer_ref,
            at: Utc::now(),
        })
    }

    /// One manual notification per local day, arming follow-ups.
    async fn notify_today(
        &self,
        group: &GroupSettings,
        driver: &Driver,
        checkin: Checkin,
        date: NaiveDate,
    ) -> Result<Event> {
        if checkin
            .sent_at
            .is_some_and(|sent| group.local_date(sent) == date)
        {
            return Err(CoreError::Custom("already notified today".to_string()));
        }
        let mut checkin = self
            .db
            .with(|db| db.mark_notified(checkin.id))?
            .unwrap_or(checkin);

        let target_channel =
            ledger::send_driver_notification(self.transport.as_ref(), driver, &checkin, None)
                .await?;
        ledger::sync_review_card(
            &self.db,
            self.transport.as_ref(),
            group,
            driver,
            &mut checkin,
        )
        .await?;
        self.scheduler
            .schedule_followups(checkin.id, group, driver.id, target_channel);

        Ok(Event::Notified {
            checkin_id: checkin.id,
            driver_id: driver.id,
            at: Utc::now(),
        })
    }

    /// Open a comment prompt for a driver in the compliance channel.
    ///
    /// Returns the correlation ref a later reply must carry.
    pub async fn open_comment_prompt(
        &self,
        group: &GroupSettings,
        driver_id: i64,
    ) -> Result<String> {
        let Some(compliance_channel) = group.compliance_channel_id else {
            return Err(CoreError::Access(AccessError::GroupNotConfigured));
        };
        let driver = self
            .db
            .with(|db| db.driver_by_id(driver_id))?
            .ok_or(CoreError::Access(AccessError::NotFound {
                kind: "driver",
                key: driver_id.to_string(),
            }))?;

        let prompt = self
            .transport
            .send_message(
                compliance_channel,
                &format!("Comment for {} — reply with details.", driver.mention()),
                SendOptions::default(),
            )
            .await?;
        let prompt_ref = prompt.0.to_string();
        self.compliance.store_comment_prompt(driver.id, &prompt_ref)?;
        Ok(prompt_ref)
    }

    /// Resolve a reply to an earlier comment prompt and store the note.
    ///
    /// Returns false when the reply does not match an outstanding
    /// prompt (single-use resolution already consumed, or unrelated).
    pub fn submit_comment(&self, prompt_ref: &str, author_ref: i64, note: &str) -> Result<bool> {
        let Some(driver_id) = self.compliance.resolve_comment_prompt(prompt_ref)? else {
            return Ok(false);
        };
        self.compliance.record_note(driver_id, author_ref, note)?;
        Ok(true)
    }

    async fn notify_driver(&self, driver: &Driver, text: &str) {
        if let Err(e) = self
            .transport
            .send_message(driver.user_ref, text, SendOptions::default())
            .await
        {
            error!(driver_id = driver.id, error = %e, "failed to notify driver");
        }
    }
}
