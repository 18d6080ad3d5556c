//! Compliance sweep behavior: consecutive counters, cooldown-gated
//! alerts, pause downgrades, and the comment workflow.

mod common;

use chrono::{Duration, Utc};

use common::{setup, COMPLIANCE_CHANNEL};
use fleetcheck_core::compliance::{ComplianceStatus, ComplianceTracker};
use fleetcheck_core::review::ReviewService;
use fleetcheck_core::scheduler::JobScheduler;
use fleetcheck_core::storage::ComplianceConfig;

fn tracker(
    db: &fleetcheck_core::DbHandle,
    transport: &std::sync::Arc<common::RecordingTransport>,
) -> ComplianceTracker {
    ComplianceTracker::new(db.clone(), transport.clone(), ComplianceConfig::default())
}

#[tokio::test]
async fn nudge_after_two_escalation_after_three_each_once() {
    let (db, group, transport) = setup();
    let tracker = tracker(&db, &transport);

    let driver = db
        .with(|d| d.upsert_driver(Some(100), Some("bigrig"), None))
        .unwrap();
    // Linked channel so the driver nudge has somewhere to go.
    db.with(|d| d.set_driver_notify_channel(driver.id, -700))
        .unwrap();

    // Tick 1: fresh non-compliant streak, below both thresholds.
    let summary = tracker.run_sweep(&group).await.unwrap();
    assert_eq!(summary.pending, 1);
    assert_eq!(summary.driver_alerts, 0);
    assert_eq!(summary.dispatch_alerts, 0);

    // Tick 2: count reaches 2, the driver nudge fires.
    let summary = tracker.run_sweep(&group).await.unwrap();
    assert_eq!(summary.driver_alerts, 1);
    assert_eq!(summary.dispatch_alerts, 0);

    // Tick 3: count reaches 3. The nudge is inside its cooldown; only
    // the supervisor escalation fires.
    let summary = tracker.run_sweep(&group).await.unwrap();
    assert_eq!(summary.driver_alerts, 0);
    assert_eq!(summary.dispatch_alerts, 1);

    // Tick 4: both alerts inside their cooldowns.
    let summary = tracker.run_sweep(&group).await.unwrap();
    assert_eq!(summary.driver_alerts, 0);
    assert_eq!(summary.dispatch_alerts, 0);

    assert_eq!(transport.count_containing("still missing"), 1);
    assert_eq!(transport.count_containing("please call @bigrig"), 1);

    let state = db
        .with(|d| d.compliance_state(driver.id))
        .unwrap()
        .unwrap();
    assert_eq!(state.consecutive_reports, 4);
}

#[tokio::test]
async fn cooldown_expiry_rearms_the_nudge() {
    let (db, group, transport) = setup();
    let tracker = tracker(&db, &transport);

    let driver = db
        .with(|d| d.upsert_driver(Some(100), Some("bigrig"), None))
        .unwrap();
    db.with(|d| d.set_driver_notify_channel(driver.id, -700))
        .unwrap();

    tracker.run_sweep(&group).await.unwrap();
    let summary = tracker.run_sweep(&group).await.unwrap();
    assert_eq!(summary.driver_alerts, 1);

    // Age the alert stamp past the window; the next tick re-alerts.
    db.with(|d| d.mark_driver_alert(driver.id, Utc::now() - Duration::hours(25)))
        .unwrap();
    let summary = tracker.run_sweep(&group).await.unwrap();
    assert_eq!(summary.driver_alerts, 1);
    assert_eq!(transport.count_containing("still missing"), 2);
}

#[tokio::test]
async fn pass_event_resets_the_streak_counter() {
    let (db, group, transport) = setup();
    let tracker = tracker(&db, &transport);

    let driver = db
        .with(|d| d.upsert_driver(Some(100), Some("bigrig"), None))
        .unwrap();

    tracker.run_sweep(&group).await.unwrap();
    tracker.run_sweep(&group).await.unwrap();
    let state = db
        .with(|d| d.compliance_state(driver.id))
        .unwrap()
        .unwrap();
    assert_eq!(state.consecutive_reports, 2);

    // Reviewer passes today's check-in.
    let today = group.local_date(Utc::now());
    db.with(|d| d.ensure_checkin(driver.id, group.id, today))
        .unwrap();
    db.with(|d| {
        d.update_review_status(
            driver.id,
            group.id,
            today,
            fleetcheck_core::CheckinStatus::Pass,
            900,
            None,
        )
    })
    .unwrap();
    tracker
        .handle_pass_event(&group, &driver, Utc::now())
        .await
        .unwrap();

    let state = db
        .with(|d| d.compliance_state(driver.id))
        .unwrap()
        .unwrap();
    assert_eq!(state.consecutive_reports, 0);
    assert_eq!(state.last_status, Some(ComplianceStatus::Compliant));

    // The tick after the pass stays at zero.
    tracker.run_sweep(&group).await.unwrap();
    let state = db
        .with(|d| d.compliance_state(driver.id))
        .unwrap()
        .unwrap();
    assert_eq!(state.consecutive_reports, 0);
}

#[tokio::test]
async fn paused_channel_downgrades_to_exception() {
    let (db, group, transport) = setup();
    let tracker = tracker(&db, &transport);

    let driver = db
        .with(|d| d.upsert_driver(Some(100), Some("bigrig"), None))
        .unwrap();
    db.with(|d| d.set_driver_notify_channel(driver.id, -700))
        .unwrap();
    transport.set_channel_title(-700, "Unit 12 — home time");

    let summary = tracker.run_sweep(&group).await.unwrap();
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.exceptions, 1);
    assert_eq!(summary.effective_total, 0);
    assert_eq!(summary.driver_alerts, 0);
}

#[tokio::test]
async fn sweep_without_compliance_channel_is_a_noop() {
    let (db, mut group, transport) = setup();
    group.compliance_channel_id = None;
    let tracker = tracker(&db, &transport);

    db.with(|d| d.upsert_driver(Some(100), Some("bigrig"), None))
        .unwrap();
    let summary = tracker.run_sweep(&group).await.unwrap();
    assert_eq!(summary, Default::default());
    assert!(transport.sent_to(COMPLIANCE_CHANNEL).is_empty());
}

#[tokio::test]
async fn pending_detail_carries_latest_note() {
    let (db, group, transport) = setup();
    let tracker = tracker(&db, &transport);

    let driver = db
        .with(|d| d.upsert_driver(Some(100), Some("bigrig"), None))
        .unwrap();
    tracker.record_note(driver.id, 900, "called, voicemail").unwrap();
    tracker.record_note(driver.id, 900, "truck in yard").unwrap();

    tracker.run_sweep(&group).await.unwrap();
    let details = transport.sent_to(COMPLIANCE_CHANNEL);
    assert!(details
        .iter()
        .any(|text| text.contains("Pending daily check") && text.contains("Note: truck in yard")));
}

#[tokio::test]
async fn comment_prompt_resolves_once() {
    let (db, group, transport) = setup();
    let scheduler = JobScheduler::new(db.clone(), transport.clone(), common::app_config());
    let review = ReviewService::new(db.clone(), transport.clone(), scheduler, false);

    let driver = db
        .with(|d| d.upsert_driver(Some(100), Some("bigrig"), None))
        .unwrap();

    let prompt_ref = review.open_comment_prompt(&group, driver.id).await.unwrap();
    assert_eq!(transport.count_containing("Comment for @bigrig"), 1);

    assert!(review.submit_comment(&prompt_ref, 900, "spoke to driver").unwrap());
    // Single-use: the same ref cannot resolve twice.
    assert!(!review.submit_comment(&prompt_ref, 900, "again").unwrap());

    let notes = db.with(|d| d.latest_notes(&[driver.id])).unwrap();
    assert_eq!(notes[&driver.id], "spoke to driver");
}

#[tokio::test]
async fn compliance_panel_pass_creates_the_row() {
    let (db, group, transport) = setup();
    let scheduler = JobScheduler::new(db.clone(), transport.clone(), common::app_config());
    let review = ReviewService::new(db.clone(), transport.clone(), scheduler, false);

    let driver = db
        .with(|d| d.upsert_driver(Some(100), Some("bigrig"), None))
        .unwrap();
    let today = group.local_date(Utc::now());

    // No row exists yet; the panel pass creates one and passes it.
    review
        .compliance_pass(&group, 900, driver.id, today)
        .await
        .unwrap();
    let checkin = db
        .with(|d| d.checkin_for(driver.id, group.id, today))
        .unwrap()
        .unwrap();
    assert_eq!(checkin.status, fleetcheck_core::CheckinStatus::Pass);
    let driver = db.with(|d| d.driver_by_id(driver.id)).unwrap().unwrap();
    assert_eq!(driver.streak_current, 1);
}

#[tokio::test]
async fn congrats_fires_once_per_week() {
    let (db, group, transport) = setup();
    let tracker = tracker(&db, &transport);

    let driver = db
        .with(|d| d.upsert_driver(Some(100), Some("bigrig"), None))
        .unwrap();
    let now = Utc::now();
    let today = group.local_date(now);
    let week_start =
        today - Duration::days(i64::from(chrono::Datelike::weekday(&today).num_days_from_monday()));

    for offset in 0..5 {
        let date = week_start + Duration::days(offset);
        db.with(|d| d.ensure_checkin(driver.id, group.id, date))
            .unwrap();
        db.with(|d| {
            d.update_review_status(
                driver.id,
                group.id,
                date,
                fleetcheck_core::CheckinStatus::Pass,
                900,
                None,
            )
        })
        .unwrap();
    }

    tracker.handle_pass_event(&group, &driver, now).await.unwrap();
    assert_eq!(transport.count_containing("Great job"), 1);

    // The stamped congrats suppresses a repeat within the same week.
    let driver = db.with(|d| d.driver_by_id(driver.id)).unwrap().unwrap();
    assert!(driver.last_congrats_at.is_some());
    tracker.handle_pass_event(&group, &driver, now).await.unwrap();
    assert_eq!(transport.count_containing("Great job"), 1);
}
