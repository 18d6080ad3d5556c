//! Check-in ledger: domain types and the review card.
//!
//! The ledger owns the per-driver, per-day record and its status
//! transitions. Row-level operations live in `storage::checkin_db`; this
//! module defines the domain types, the lifecycle rules they encode, and
//! the rendered review card posted to the review channel.
//!
//! ## Lifecycle
//!
//! ```text
//! pending -> submitted -> {pass, fail, needs_fix}
//! pending | submitted -> excused
//! any terminal -> pending (reset) | submitted (reopen)
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::roles::GroupSettings;
use crate::storage::DbHandle;
use crate::transport::{EditOutcome, MessageRef, SendOptions, Transport};

/// Evidence quota shown on cards and count notices.
pub const MEDIA_QUOTA: u32 = 3;

/// Marker stored in `reason` while a driver owes a threaded reply.
pub const OFFTHREAD_WARNING: &str = "offthread_warning";

/// Lifecycle status of a daily check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinStatus {
    Pending,
    Submitted,
    Pass,
    Fail,
    NeedsFix,
    Excused,
}

impl CheckinStatus {
    /// Database / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            CheckinStatus::Pending => "pending",
            CheckinStatus::Submitted => "submitted",
            CheckinStatus::Pass => "pass",
            CheckinStatus::Fail => "fail",
            CheckinStatus::NeedsFix => "needs_fix",
            CheckinStatus::Excused => "excused",
        }
    }

    /// Parse the database representation. Unknown strings map to
    /// `Pending` so a corrupt row degrades to the open state instead of
    /// poisoning reads.
    pub fn parse(s: &str) -> Self {
        match s {
            "submitted" => CheckinStatus::Submitted,
            "pass" => CheckinStatus::Pass,
            "fail" => CheckinStatus::Fail,
            "needs_fix" => CheckinStatus::NeedsFix,
            "excused" => CheckinStatus::Excused,
            _ => CheckinStatus::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CheckinStatus::Pass
                | CheckinStatus::Fail
                | CheckinStatus::NeedsFix
                | CheckinStatus::Excused
        )
    }

    /// Still awaiting a review decision.
    pub fn is_open(self) -> bool {
        matches!(self, CheckinStatus::Pending | CheckinStatus::Submitted)
    }

    /// Display label for cards and digests.
    pub fn label(self) -> &'static str {
        match self {
            CheckinStatus::Pending => "Pending",
            CheckinStatus::Submitted => "Submitted",
            CheckinStatus::Pass => "Pass",
            CheckinStatus::Fail => "Fail",
            CheckinStatus::NeedsFix => "Needs Fix",
            CheckinStatus::Excused => "Excused",
        }
    }
}

/// A participant in the daily compliance workflow.
///
/// Never hard-deleted; `active = false` removes a driver from sweeps
/// and autosend while keeping history intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: i64,
    /// External chat identity. Negative for placeholder drivers
    /// registered by handle before first contact.
    pub user_ref: i64,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub active: bool,
    pub streak_current: i64,
    pub streak_best: i64,
    /// Linked notification channel, if the dispatcher ran /notify there.
    pub notify_channel_id: Option<i64>,
    pub last_pass_at: Option<DateTime<Utc>>,
    pub last_congrats_at: Option<DateTime<Utc>>,
}

impl Driver {
    /// Display handle used in cards, digests, and alerts.
    pub fn mention(&self) -> String {
        if let Some(handle) = &self.handle {
            return format!("@{handle}");
        }
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("Driver {}", self.user_ref))
    }

    /// Channel to notify: linked channel first, direct channel otherwise.
    pub fn notify_target(&self) -> i64 {
        self.notify_channel_id.unwrap_or(self.user_ref)
    }
}

/// The per-driver, per-day lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkin {
    pub id: i64,
    pub driver_id: i64,
    pub group_id: i64,
    pub date: NaiveDate,
    /// First-notified time; monotonic within the day.
    pub sent_at: Option<DateTime<Utc>>,
    /// First-response time; set by the first media item.
    pub responded_at: Option<DateTime<Utc>>,
    pub status: CheckinStatus,
    pub reason: Option<String>,
    pub reviewer_id: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Message reference of the posted review card, for edits.
    pub card_ref: Option<i64>,
    pub media_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl Checkin {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The off-thread warning marker is carried in `reason` so a later
    /// media item clears it along with any stale skip reason.
    pub fn offthread_warned(&self) -> bool {
        self.reason.as_deref() == Some(OFFTHREAD_WARNING)
    }
}

/// Render the review card text for a check-in.
pub fn render_review_card(driver: &Driver, checkin: &Checkin) -> String {
    let streak_text = format!(
        "Streak current/best: {}/{}",
        driver.streak_current, driver.streak_best
    );
    let media_text = format!("Media: {}/{MEDIA_QUOTA}", checkin.media_count);
    let reason_text = checkin
        .reason
        .as_deref()
        .filter(|r| *r != OFFTHREAD_WARNING)
        .map(|r| format!("Reason: {r}"))
        .unwrap_or_default();

    [
        format!("Daily Check — {}", checkin.date),
        format!("Driver: {}", driver.mention()),
        media_text,
        streak_text,
        format!("Status: {}", checkin.status.label()),
        reason_text,
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("\n")
}

/// Post or edit the review card in the review channel.
///
/// Edits the stored card reference when present; a missing edit target
/// falls back to posting a fresh message and storing the new reference.
/// "Not modified" is benign.
pub async fn sync_review_card(
    db: &DbHandle,
    transport: &dyn Transport,
    group: &GroupSettings,
    driver: &Driver,
    checkin: &mut Checkin,
) -> Result<()> {
    let text = render_review_card(driver, checkin);

    if let Some(card_ref) = checkin.card_ref {
        match transport
            .edit_message(group.review_channel_id, MessageRef(card_ref), &text)
            .await
        {
            Ok(EditOutcome::Edited) | Ok(EditOutcome::NotModified) => return Ok(()),
            Ok(EditOutcome::Missing) => {
                warn!(checkin_id = checkin.id, card_ref, "review card missing, reposting");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let message = transport
        .send_message(group.review_channel_id, &text, SendOptions::default())
        .await?;
    db.with(|db| db.set_card_ref(checkin.id, message.0))?;
    checkin.card_ref = Some(message.0);
    Ok(())
}

/// Send the daily notification prompt to a driver.
///
/// Returns the channel the prompt actually went to.
pub async fn send_driver_notification(
    transport: &dyn Transport,
    driver: &Driver,
    checkin: &Checkin,
    channel_override: Option<i64>,
) -> Result<i64> {
    let target = channel_override.unwrap_or_else(|| driver.notify_target());
    let streak_line = format!(
        "Streak current/best: {}/{}",
        driver.streak_current, driver.streak_best
    );
    let mention = if target != driver.user_ref {
        format!("{}\n\n", driver.mention())
    } else {
        String::new()
    };
    let text = format!(
        "Daily Safety Check (required)\n{mention}Date: {}\n{streak_line}\n\n\
         Upload {MEDIA_QUOTA}-4 photos or a short video covering:\n\
         • Trailer tires (both sides)\n\
         • Glad-hands + pigtail\n\
         • Trailer ABS lamp (key ON)\n\
         Optional: Extinguisher + 3 triangles\n\n\
         If you cannot complete today, pick a skip reason.",
        checkin.date
    );
    transport
        .send_message(target, &text, SendOptions::default())
        .await?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_driver() -> Driver {
        Driver {
            id: 1,
            user_ref: 100,
            handle: Some("bigrig".to_string()),
            display_name: Some("Big Rig".to_string()),
            active: true,
            streak_current: 4,
            streak_best: 9,
            notify_channel_id: None,
            last_pass_at: None,
            last_congrats_at: None,
        }
    }

    fn make_checkin(status: CheckinStatus) -> Checkin {
        Checkin {
            id: 7,
            driver_id: 1,
            group_id: -500,
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            sent_at: None,
            responded_at: None,
            status,
            reason: None,
            reviewer_id: None,
            reviewed_at: None,
            card_ref: None,
            media_count: 2,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_round_trips_through_db_repr() {
        for status in [
            CheckinStatus::Pending,
            CheckinStatus::Submitted,
            CheckinStatus::Pass,
            CheckinStatus::Fail,
            CheckinStatus::NeedsFix,
            CheckinStatus::Excused,
        ] {
            assert_eq!(CheckinStatus::parse(status.as_str()), status);
        }
        assert_eq!(CheckinStatus::parse("garbage"), CheckinStatus::Pending);
    }

    #[test]
    fn terminal_and_open_partition_states() {
        assert!(CheckinStatus::Pass.is_terminal());
        assert!(CheckinStatus::Excused.is_terminal());
        assert!(!CheckinStatus::Submitted.is_terminal());
        assert!(CheckinStatus::Pending.is_open());
        assert!(!CheckinStatus::Fail.is_open());
    }

    #[test]
    fn mention_prefers_handle() {
        let mut driver = make_driver();
        assert_eq!(driver.mention(), "@bigrig");
        driver.handle = None;
        assert_eq!(driver.mention(), "Big Rig");
        driver.display_name = None;
        assert_eq!(driver.mention(), "Driver 100");
    }

    #[test]
    fn card_shows_status_and_media() {
        let card = render_review_card(&make_driver(), &make_checkin(CheckinStatus::Submitted));
        assert!(card.contains("Daily Check — 2025-06-02"));
        assert!(card.contains("Media: 2/3"));
        assert!(card.contains("Status: Submitted"));
        assert!(card.contains("Streak current/best: 4/9"));
    }

    #[test]
    fn card_hides_offthread_marker() {
        let mut checkin = make_checkin(CheckinStatus::Pending);
        checkin.reason = Some(OFFTHREAD_WARNING.to_string());
        let card = render_review_card(&make_driver(), &checkin);
        assert!(!card.contains("Reason:"));

        checkin.reason = Some("Low tire".to_string());
        checkin.status = CheckinStatus::Fail;
        let card = render_review_card(&make_driver(), &checkin);
        assert!(card.contains("Reason: Low tire"));
    }
}
