//! Job scheduler: per-checkin follow-up slots and recurring group jobs.
//!
//! One scheduler drives every timer in the system. Follow-up slots are
//! ad-hoc delayed tasks keyed by check-in id; recurring jobs (digest,
//! midnight rollover, autosend, compliance sweep, weekly leaderboard)
//! are per-group loop tasks re-armed from persisted `GroupSettings` at
//! startup and on reconfiguration.
//!
//! The only shared mutable structure is the handle index. Cancel-then-arm
//! runs inside one lock acquisition, and every fired slot re-checks
//! ledger state before acting, so a cancel issued by an event handler
//! happens-before any later slot doing observable work.
//!
//! Follow-up slots are intentionally NOT resurrected after a process
//! restart; only the recurring group jobs are. The worst case is one
//! missed follow-up for a check-in that was already outstanding across
//! the restart.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveTime, Timelike, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::compliance::ComplianceTracker;
use crate::digest;
use crate::error::Result;
use crate::ledger::{self, Driver};
use crate::roles::{self, GroupSettings};
use crate::storage::{AppConfig, DbHandle};
use crate::streaks;
use crate::transport::{SendOptions, Transport};

/// A check-in has at most this many outstanding follow-up slots.
pub const FOLLOWUP_SLOTS: usize = 2;

/// Recurring per-group job kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum JobKind {
    Digest,
    Rollover,
    Autosend,
    Sweep,
    Weekly,
}

impl JobKind {
    fn name(self) -> &'static str {
        match self {
            JobKind::Digest => "digest",
            JobKind::Rollover => "rollover",
            JobKind::Autosend => "autosend",
            JobKind::Sweep => "sweep",
            JobKind::Weekly => "weekly",
        }
    }
}

struct SchedulerInner {
    db: DbHandle,
    transport: Arc<dyn Transport>,
    config: AppConfig,
    compliance: ComplianceTracker,
    /// checkin id -> outstanding (slot, handle) pairs.
    followups: Mutex<HashMap<i64, Vec<(u8, JoinHandle<()>)>>>,
    /// (group id, kind) -> recurring loop task.
    group_jobs: Mutex<HashMap<(i64, JobKind), JoinHandle<()>>>,
}

/// Shared, cheaply clonable scheduler handle.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

impl JobScheduler {
    pub fn new(db: DbHandle, transport: Arc<dyn Transport>, config: AppConfig) -> Self {
        let compliance =
            ComplianceTracker::new(db.clone(), transport.clone(), config.compliance.clone());
        Self {
            inner: Arc::new(SchedulerInner {
                db,
                transport,
                config,
                compliance,
                followups: Mutex::new(HashMap::new()),
                group_jobs: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The compliance tracker this scheduler drives.
    pub fn tracker(&self) -> ComplianceTracker {
        self.inner.compliance.clone()
    }

    /// Re-arm recurring jobs for every configured group.
    ///
    /// Called once at startup. Follow-up slots for in-flight check-ins
    /// are not restored (accepted restart gap).
    pub fn initialize(&self) -> Result<()> {
        let groups = self.inner.db.with(|db| db.all_groups())?;
        for group in groups {
            self.schedule_group(&group);
        }
        Ok(())
    }

    /// Remove-then-recreate the named job set for one group.
    ///
    /// "Job not found" is benign; a group deleted since the last refresh
    /// simply ends up with no jobs.
    pub fn refresh_group(&self, group_id: i64) -> Result<()> {
        self.remove_group_jobs(group_id);
        if let Some(group) = self.inner.db.with(|db| db.group_by_id(group_id))? {
            self.schedule_group(&group);
        }
        Ok(())
    }

    fn schedule_group(&self, group: &GroupSettings) {
        let mut kinds = vec![JobKind::Digest, JobKind::Rollover];
        if group.autosend_enabled && group.autosend_time.is_some() {
            kinds.push(JobKind::Autosend);
        }
        if group.compliance_channel_id.is_some() {
            kinds.push(JobKind::Sweep);
            kinds.push(JobKind::Weekly);
        }

        let mut jobs = lock(&self.inner.group_jobs);
        for kind in kinds {
            if let Some(old) = jobs.remove(&(group.id, kind)) {
                old.abort();
            }
            let task = tokio::spawn(run_recurring(self.inner.clone(), group.id, kind));
            jobs.insert((group.id, kind), task);
            info!(group_id = group.id, job = kind.name(), "recurring job armed");
        }
    }

    fn remove_group_jobs(&self, group_id: i64) {
        let mut jobs = lock(&self.inner.group_jobs);
        for kind in [
            JobKind::Digest,
            JobKind::Rollover,
            JobKind::Autosend,
            JobKind::Sweep,
            JobKind::Weekly,
        ] {
            if let Some(task) = jobs.remove(&(group_id, kind)) {
                task.abort();
            }
        }
    }

    /// Arm exactly two follow-up slots for a check-in, replacing any
    /// existing schedule (cancel-then-arm, never additive).
    pub fn schedule_followups(
        &self,
        checkin_id: i64,
        group: &GroupSettings,
        driver_id: i64,
        target_channel: i64,
    ) {
        arm_followups(&self.inner, checkin_id, group, driver_id, target_channel);
    }

    /// Remove all outstanding follow-up slots for a check-in. No-op when
    /// none exist.
    pub fn cancel_followups(&self, checkin_id: i64) {
        cancel_followups_inner(&self.inner, checkin_id);
    }

    /// Outstanding slot count for a check-in (primarily for tests).
    pub fn outstanding_followups(&self, checkin_id: i64) -> usize {
        lock(&self.inner.followups)
            .get(&checkin_id)
            .map_or(0, Vec::len)
    }

    /// Abort every scheduled task. Used on service shutdown.
    pub fn shutdown(&self) {
        for (_, task) in lock(&self.inner.group_jobs).drain() {
            task.abort();
        }
        for (_, slots) in lock(&self.inner.followups).drain() {
            for (_, task) in slots {
                task.abort();
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn cancel_followups_inner(inner: &SchedulerInner, checkin_id: i64) {
    if let Some(slots) = lock(&inner.followups).remove(&checkin_id) {
        for (_, handle) in slots {
            handle.abort();
        }
    }
}

/// Drop this slot's own handle from the index as it starts running.
fn take_own_slot(inner: &SchedulerInner, checkin_id: i64, slot: u8) {
    let mut followups = lock(&inner.followups);
    if let Some(slots) = followups.get_mut(&checkin_id) {
        slots.retain(|(s, _)| *s != slot);
        if slots.is_empty() {
            followups.remove(&checkin_id);
        }
    }
}

// === Follow-up slot ===

#[allow(clippy::too_many_arguments)]
async fn run_followup_slot(
    inner: Arc<SchedulerInner>,
    delay: Duration,
    checkin_id: i64,
    group_id: i64,
    driver_id: i64,
    target_channel: i64,
    slot: u8,
) {
    tokio::time::sleep(delay).await;
    take_own_slot(&inner, checkin_id, slot);

    if let Err(e) = fire_followup(&inner, checkin_id, group_id, driver_id, target_channel, slot)
        .await
    {
        error!(checkin_id, slot, error = %e, "follow-up slot failed");
    }
}

/// Fire one slot: re-check ledger state, self-cancel if the check-in
/// moved on out-of-band, otherwise re-send the reminder and post the
/// still-pending notice.
async fn fire_followup(
    inner: &SchedulerInner,
    checkin_id: i64,
    group_id: i64,
    driver_id: i64,
    target_channel: i64,
    slot: u8,
) -> Result<()> {
    let Some(checkin) = inner.db.with(|db| db.checkin_by_id(checkin_id))? else {
        cancel_followups_inner(inner, checkin_id);
        return Ok(());
    };
    if !checkin.status.is_open() || checkin.responded_at.is_some() {
        cancel_followups_inner(inner, checkin_id);
        return Ok(());
    }
    let (driver, group) = inner.db.with(|db| {
        Ok::<_, crate::error::DatabaseError>((
            db.driver_by_id(driver_id)?,
            db.group_by_id(group_id)?,
        ))
    })?;
    let (Some(driver), Some(group)) = (driver, group) else {
        cancel_followups_inner(inner, checkin_id);
        return Ok(());
    };

    // A paused driver channel silently ends the schedule; so does a
    // channel we can no longer inspect.
    if target_channel < 0 {
        match inner.transport.get_channel_info(target_channel).await {
            Ok(info) => {
                if roles::is_paused_title(&info.title, &inner.config.compliance.pause_tokens) {
                    info!(driver_id, checkin_id, "follow-up skipped, channel paused");
                    cancel_followups_inner(inner, checkin_id);
                    return Ok(());
                }
            }
            Err(e) => {
                warn!(target_channel, error = %e, "failed to inspect channel, cancelling follow-ups");
                cancel_followups_inner(inner, checkin_id);
                return Ok(());
            }
        }
    }

    ledger::send_driver_notification(
        inner.transport.as_ref(),
        &driver,
        &checkin,
        Some(target_channel),
    )
    .await?;
    inner
        .transport
        .send_message(
            group.review_channel_id,
            &format!(
                "Follow-up {slot}/{FOLLOWUP_SLOTS}: {} still pending. Reminder sent.",
                driver.mention()
            ),
            SendOptions::silent(),
        )
        .await?;

    let mut checkin = checkin;
    ledger::sync_review_card(
        &inner.db,
        inner.transport.as_ref(),
        &group,
        &driver,
        &mut checkin,
    )
    .await?;
    Ok(())
}

// === Recurring jobs ===

async fn run_recurring(inner: Arc<SchedulerInner>, group_id: i64, kind: JobKind) {
    loop {
        let group = match inner.db.with(|db| db.group_by_id(group_id)) {
            Ok(Some(group)) => group,
            Ok(None) => {
                info!(group_id, job = kind.name(), "group gone, stopping job");
                return;
            }
            Err(e) => {
                error!(group_id, job = kind.name(), error = %e, "failed to load group");
                tokio::time::sleep(Duration::from_secs(60)).await;
                continue;
            }
        };

        let now = Utc::now();
        let offset = group.offset();
        let next = match kind {
            JobKind::Digest => next_daily_fire(now, offset, group.digest_time),
            JobKind::Rollover => next_daily_fire(
                now,
                offset,
                NaiveTime::from_hms_opt(0, 5, 0).unwrap_or_default(),
            ),
            JobKind::Autosend => match group.autosend_time.filter(|_| group.autosend_enabled) {
                Some(at) => next_daily_fire(now, offset, at),
                None => {
                    info!(group_id, "autosend disabled, stopping job");
                    return;
                }
            },
            JobKind::Sweep => next_sweep_fire(now, offset),
            JobKind::Weekly => next_weekly_fire(now, offset),
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        let result = match kind {
            JobKind::Digest => run_digest(&inner, group_id).await,
            JobKind::Rollover => run_rollover(&inner, group_id).await,
            JobKind::Autosend => run_autosend(&inner, group_id).await,
            JobKind::Sweep => run_sweep(&inner, group_id).await,
            JobKind::Weekly => run_weekly(&inner, group_id).await,
        };
        if let Err(e) = result {
            error!(group_id, job = kind.name(), error = %e, "recurring job failed");
        }
    }
}

/// Re-fetch the group and refresh its pause flag from the live channel
/// title. `Ok(None)` means "skip this run".
async fn fetch_group_unpaused(
    inner: &SchedulerInner,
    group_id: i64,
) -> Result<Option<GroupSettings>> {
    let Some(group) = inner.db.with(|db| db.group_by_id(group_id))? else {
        return Ok(None);
    };
    let group = match roles::refresh_group_pause(
        &inner.db,
        inner.transport.as_ref(),
        group.clone(),
        &inner.config.compliance.pause_tokens,
    )
    .await
    {
        Ok(refreshed) => refreshed,
        Err(e) => {
            warn!(group_id, error = %e, "pause refresh failed, using stored settings");
            group
        }
    };
    if group.paused {
        info!(group_id, "group paused, skipping run");
        return Ok(None);
    }
    Ok(Some(group))
}

async fn run_digest(inner: &SchedulerInner, group_id: i64) -> Result<()> {
    let Some(group) = fetch_group_unpaused(inner, group_id).await? else {
        return Ok(());
    };
    let today = group.local_date(Utc::now());
    digest::send_daily_digest(&inner.db, inner.transport.as_ref(), &group, today).await
}

async fn run_rollover(inner: &SchedulerInner, group_id: i64) -> Result<()> {
    let Some(group) = inner.db.with(|db| db.group_by_id(group_id))? else {
        return Ok(());
    };
    let target_date = group.local_date(Utc::now()) - ChronoDuration::days(1);
    let reset = inner
        .db
        .with(|db| streaks::reset_missed(db, group.id, target_date))?;
    info!(group_id, %target_date, reset, "midnight rollover complete");

    if let Err(e) = inner.compliance.daily_snapshot(&group, target_date).await {
        error!(group_id, error = %e, "daily snapshot failed");
    }
    Ok(())
}

async fn run_autosend(inner: &Arc<SchedulerInner>, group_id: i64) -> Result<()> {
    let Some(group) = fetch_group_unpaused(inner, group_id).await? else {
        return Ok(());
    };
    if !group.autosend_enabled || group.autosend_time.is_none() {
        return Ok(());
    }
    let now = Utc::now();
    let today = group.local_date(now);
    let drivers = inner.db.with(|db| db.active_drivers())?;

    for driver in drivers {
        if let Err(e) = autosend_one(inner, &group, &driver, today).await {
            error!(driver_id = driver.id, error = %e, "autosend failed for driver");
        }
    }
    Ok(())
}

async fn autosend_one(
    inner: &Arc<SchedulerInner>,
    group: &GroupSettings,
    driver: &Driver,
    today: chrono::NaiveDate,
) -> Result<()> {
    if let Some(channel_id) = driver.notify_channel_id {
        match inner.transport.get_channel_info(channel_id).await {
            Ok(info) => {
                if roles::is_paused_title(&info.title, &inner.config.compliance.pause_tokens) {
                    info!(driver_id = driver.id, "autosend skipped, channel paused");
                    return Ok(());
                }
            }
            Err(e) => {
                warn!(channel_id, error = %e, "failed to inspect driver channel");
            }
        }
    }

    let mut checkin = inner
        .db
        .with(|db| db.ensure_checkin(driver.id, group.id, today))?;
    if checkin
        .sent_at
        .is_some_and(|sent| group.local_date(sent) == today)
    {
        return Ok(());
    }
    // A stale row from a previous cycle is cleared before re-notifying.
    if checkin.media_count > 0 || !checkin.status.is_open() {
        cancel_followups_inner(inner, checkin.id);
        checkin = inner
            .db
            .with(|db| db.reset_checkin(checkin.id))?
            .unwrap_or(checkin);
    }
    let checkin_id = checkin.id;
    let mut checkin = inner
        .db
        .with(|db| db.mark_notified(checkin_id))?
        .unwrap_or(checkin);

    let target_channel =
        ledger::send_driver_notification(inner.transport.as_ref(), driver, &checkin, None).await?;
    ledger::sync_review_card(
        &inner.db,
        inner.transport.as_ref(),
        group,
        driver,
        &mut checkin,
    )
    .await?;

    arm_followups(inner, checkin.id, group, driver.id, target_channel);
    Ok(())
}

/// Cancel-then-arm inside one critical section; shared by the public
/// API and the autosend job.
fn arm_followups(
    inner: &Arc<SchedulerInner>,
    checkin_id: i64,
    group: &GroupSettings,
    driver_id: i64,
    target_channel: i64,
) {
    let delays: Vec<u64> = inner
        .config
        .followup
        .delays_min
        .iter()
        .copied()
        .take(FOLLOWUP_SLOTS)
        .collect();

    let mut followups = lock(&inner.followups);
    if let Some(old) = followups.remove(&checkin_id) {
        for (_, handle) in old {
            handle.abort();
        }
    }
    let mut slots = Vec::with_capacity(delays.len());
    for (idx, delay_min) in delays.into_iter().enumerate() {
        let slot = (idx + 1) as u8;
        let task = tokio::spawn(run_followup_slot(
            inner.clone(),
            Duration::from_secs(delay_min * 60),
            checkin_id,
            group.id,
            driver_id,
            target_channel,
            slot,
        ));
        slots.push((slot, task));
    }
    if !slots.is_empty() {
        followups.insert(checkin_id, slots);
    }
}

async fn run_sweep(inner: &SchedulerInner, group_id: i64) -> Result<()> {
    let Some(group) = fetch_group_unpaused(inner, group_id).await? else {
        return Ok(());
    };
    inner.compliance.run_sweep(&group).await?;
    Ok(())
}

async fn run_weekly(inner: &SchedulerInner, group_id: i64) -> Result<()> {
    let Some(group) = fetch_group_unpaused(inner, group_id).await? else {
        return Ok(());
    };
    let today = group.local_date(Utc::now());
    inner.compliance.weekly_leaderboard(&group, today).await
}

// === Fire-time computation ===

fn local_naive_to_utc(naive: chrono::NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(
        naive - ChronoDuration::seconds(i64::from(offset.local_minus_utc())),
        Utc,
    )
}

/// Next group-local occurrence of `at`, strictly after `now`.
fn next_daily_fire(now: DateTime<Utc>, offset: FixedOffset, at: NaiveTime) -> DateTime<Utc> {
    let local_now = now.with_timezone(&offset).naive_local();
    let mut candidate = local_now.date().and_time(at);
    if candidate <= local_now {
        candidate += ChronoDuration::days(1);
    }
    local_naive_to_utc(candidate, offset)
}

/// Next even group-local hour (the bi-hourly sweep), strictly after `now`.
fn next_sweep_fire(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local_now = now.with_timezone(&offset).naive_local();
    let mut candidate = local_now
        .date()
        .and_time(NaiveTime::from_hms_opt(local_now.hour(), 0, 0).unwrap_or_default());
    loop {
        candidate += ChronoDuration::hours(1);
        if candidate > local_now && candidate.hour() % 2 == 0 {
            return local_naive_to_utc(candidate, offset);
        }
    }
}

/// Next Monday 06:00 group-local, strictly after `now`.
fn next_weekly_fire(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local_now = now.with_timezone(&offset).naive_local();
    let at = NaiveTime::from_hms_opt(6, 0, 0).unwrap_or_default();
    let days_ahead = i64::from((7 - local_now.weekday().num_days_from_monday()) % 7);
    let mut candidate = (local_now.date() + ChronoDuration::days(days_ahead)).and_time(at);
    if candidate <= local_now {
        candidate += ChronoDuration::days(7);
    }
    local_naive_to_utc(candidate, offset)
}
