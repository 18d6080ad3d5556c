//! Group settings and reviewer access guards.
//!
//! One compliance group serves one physical team; several flows assume
//! exactly one active group exists and use `Database::default_group`
//! (the first-created row). Absence is `AccessError::GroupNotConfigured`,
//! never a panic.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, CoreError, Result};
use crate::storage::DbHandle;
use crate::transport::Transport;

/// Per-group configuration driving all timers and channel routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSettings {
    /// Group channel id.
    pub id: i64,
    pub title: String,
    /// Channel where review cards and digests are posted.
    pub review_channel_id: i64,
    /// Channel for compliance sweeps and escalations; sweeps are off
    /// while unset.
    pub compliance_channel_id: Option<i64>,
    /// Fixed UTC offset for the group's local day boundaries.
    pub tz_offset_minutes: i32,
    pub paused: bool,
    pub autosend_enabled: bool,
    /// Local time of the daily autosend, when enabled.
    pub autosend_time: Option<NaiveTime>,
    /// Local time of the daily digest.
    pub digest_time: NaiveTime,
}

impl GroupSettings {
    /// The group's fixed UTC offset. An out-of-range configuration
    /// degrades to UTC.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.tz_offset_minutes * 60)
            .unwrap_or(FixedOffset::east_opt(0).unwrap())
    }

    /// The group-local calendar day at `now`.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset()).date_naive()
    }

    pub fn local_now(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset())
    }
}

/// Whether a channel title marks the channel as out of rotation.
pub fn is_paused_title(title: &str, pause_tokens: &[String]) -> bool {
    let lowered = title.to_lowercase();
    pause_tokens.iter().any(|token| lowered.contains(token))
}

/// Verify the acting user may review in this group.
///
/// Distinct from not-found: callers render "access denied" rather than
/// "no record".
pub async fn ensure_reviewer(
    transport: &dyn Transport,
    group: &GroupSettings,
    user_ref: i64,
    require_admin: bool,
) -> Result<()> {
    let role = transport.get_membership(group.id, user_ref).await?;
    if !role.is_member() {
        return Err(CoreError::Access(AccessError::Unauthorized(
            "must be a member of the dispatcher group".to_string(),
        )));
    }
    if require_admin && !role.is_admin() {
        return Err(CoreError::Access(AccessError::Unauthorized(
            "admin privileges required".to_string(),
        )));
    }
    Ok(())
}

/// Re-read the live channel title and refresh the stored pause flag.
///
/// Pause is derived from the title token set, so renaming the channel
/// pauses or resumes the group without a separate command.
pub async fn refresh_group_pause(
    db: &DbHandle,
    transport: &dyn Transport,
    group: GroupSettings,
    pause_tokens: &[String],
) -> Result<GroupSettings> {
    let info = transport.get_channel_info(group.id).await?;
    let title = if info.title.is_empty() {
        group.title.clone()
    } else {
        info.title
    };
    let paused = is_paused_title(&title, pause_tokens);

    if title != group.title || paused != group.paused {
        db.with(|db| db.set_group_title_paused(group.id, &title, paused))?;
        return Ok(GroupSettings {
            title,
            paused,
            ..group
        });
    }
    Ok(group)
}

/// Fetch the configuration singleton, or fail with group-not-configured.
pub fn require_default_group(db: &DbHandle) -> Result<GroupSettings> {
    db.with(|db| db.default_group())?
        .ok_or(CoreError::Access(AccessError::GroupNotConfigured))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tokens() -> Vec<String> {
        vec!["inactive".to_string(), "home".to_string(), "home time".to_string()]
    }

    #[test]
    fn pause_tokens_match_substrings_case_insensitive() {
        assert!(is_paused_title("Unit 12 — HOME TIME", &tokens()));
        assert!(is_paused_title("inactive: unit 9", &tokens()));
        assert!(!is_paused_title("Unit 12 rolling", &tokens()));
    }

    #[test]
    fn local_date_respects_offset() {
        let group = GroupSettings {
            id: -500,
            title: "Fleet".to_string(),
            review_channel_id: -501,
            compliance_channel_id: None,
            tz_offset_minutes: -360, // UTC-6
            paused: false,
            autosend_enabled: false,
            autosend_time: None,
            digest_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        };
        // 03:00 UTC is still the previous day at UTC-6.
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 3, 0, 0).unwrap();
        assert_eq!(
            group.local_date(now),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
        );
    }
}
