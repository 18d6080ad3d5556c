//! Media intake: inbound evidence, the off-thread policy, and the
//! driver skip flow.
//!
//! Media arrives either in a driver's direct channel or in a linked
//! group channel. Group-channel media must be a reply to the service's
//! reminder thread: the first off-thread item earns a single warning and
//! does not count; further off-thread items are ignored while the
//! warning stands. Mirroring into the review channel is best-effort and
//! never blocks the recorded transition.

use chrono::Utc;
use tracing::{error, info, warn};

use std::sync::Arc;

use crate::error::{AccessError, CoreError, Result};
use crate::events::Event;
use crate::ledger;
use crate::roles;
use crate::scheduler::JobScheduler;
use crate::storage::DbHandle;
use crate::transport::{MediaFile, SendOptions, Transport};

/// Driver-selectable skip reasons.
pub const SKIP_REASONS: &[(&str, &str)] = &[
    ("off", "Off today"),
    ("shop", "In shop"),
    ("no_trailer", "No trailer"),
    ("shipper", "Already at shipper"),
    ("other", "Other"),
];

/// Label for a skip-reason key; unknown keys collapse to "Other".
pub fn skip_reason_label(key: &str) -> &'static str {
    SKIP_REASONS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| *label)
        .unwrap_or("Other")
}

/// Where an inbound message arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// The driver's one-on-one channel with the service.
    Direct,
    /// A linked group channel.
    Group,
}

/// An inbound media message, as handed over by the transport edge.
#[derive(Debug, Clone)]
pub struct InboundMedia {
    pub channel_id: i64,
    pub channel_kind: ChannelKind,
    pub channel_title: Option<String>,
    pub sender_ref: i64,
    pub sender_handle: Option<String>,
    pub sender_display_name: Option<String>,
    pub media: MediaFile,
    pub caption: Option<String>,
    /// Whether the message replied to the service's reminder.
    pub is_reply_to_service: bool,
}

/// Inbound-media orchestration service.
#[derive(Clone)]
pub struct MediaIntake {
    db: DbHandle,
    transport: Arc<dyn Transport>,
    scheduler: JobScheduler,
}

impl MediaIntake {
    pub fn new(db: DbHandle, transport: Arc<dyn Transport>, scheduler: JobScheduler) -> Self {
        Self {
            db,
            transport,
            scheduler,
        }
    }

    /// Handle one inbound media message.
    ///
    /// Returns `Ok(None)` for messages that are deliberately ignored
    /// (wrong channel, unlinked chat, blocked off-thread extras).
    pub async fn handle_media(&self, msg: InboundMedia) -> Result<Option<Event>> {
        let driver = self.db.with(|db| {
            db.upsert_driver(
                Some(msg.sender_ref),
                msg.sender_handle.as_deref(),
                msg.sender_display_name.as_deref(),
            )
        })?;

        let group = match roles::require_default_group(&self.db) {
            Ok(group) => group,
            Err(e) => {
                if msg.channel_kind == ChannelKind::Direct {
                    self.reply(msg.channel_id, "Dispatcher group not configured yet.")
                        .await;
                }
                return Err(e);
            }
        };
        // Media posted straight into the review channel is not intake.
        if msg.channel_id == group.review_channel_id {
            return Ok(None);
        }

        if msg.channel_kind == ChannelKind::Group {
            let expected = self
                .db
                .with(|db| db.driver_by_notify_channel(msg.channel_id))?;
            let Some(expected) = expected else {
                info!(channel_id = msg.channel_id, "media from unlinked channel");
                self.reply(
                    msg.channel_id,
                    "Dispatcher hasn't linked this chat yet. Ask them to run /notify here.",
                )
                .await;
                return Ok(None);
            };
            if expected.id != driver.id {
                info!(
                    channel_id = msg.channel_id,
                    expected = expected.id,
                    actual = driver.id,
                    "media from non-linked driver"
                );
                return Ok(None);
            }
        }

        let today = group.local_date(Utc::now());
        let existing = self
            .db
            .with(|db| db.checkin_for(driver.id, group.id, today))?;
        let prev_count = existing.as_ref().map_or(0, |c| c.media_count);
        let warned = existing.as_ref().is_some_and(|c| c.offthread_warned());

        let offthread = msg.channel_kind == ChannelKind::Group && !msg.is_reply_to_service;
        if offthread && (prev_count >= 1 || warned) {
            info!(driver_id = driver.id, prev_count, "blocked off-thread extra media");
            return Ok(None);
        }

        // First off-thread item: warn once, count nothing, and flag the
        // review channel for a manual look.
        if offthread {
            let checkin = match existing {
                Some(checkin) => checkin,
                None => self
                    .db
                    .with(|db| db.ensure_checkin(driver.id, group.id, today))?,
            };
            self.scheduler.cancel_followups(checkin.id);
            self.db
                .with(|db| db.set_offthread_warning(checkin.id, true))?;
            self.reply(msg.channel_id, "Please reply to the reminder to add more media.")
                .await;
            let channel_name = msg
                .channel_title
                .clone()
                .unwrap_or_else(|| "Driver chat".to_string())
                .to_uppercase();
            self.reply_silent(
                group.review_channel_id,
                &format!(
                    "{} sent media in {channel_name} without replying. \
                     Dispatch, please review the files and resolve when verified.",
                    driver.mention()
                ),
            )
            .await;
            return Ok(Some(Event::OffthreadWarned {
                checkin_id: checkin.id,
                driver_id: driver.id,
                at: Utc::now(),
            }));
        }

        let (mut checkin, first_media) = self.db.with(|db| {
            db.record_media(
                driver.id,
                group.id,
                today,
                msg.media.kind,
                &msg.media.file_id,
                msg.media.batch_id.as_deref(),
            )
        })?;

        if msg.channel_kind == ChannelKind::Direct && first_media {
            self.reply(msg.channel_id, "Submitted. Pending review.").await;
        }
        if msg.channel_kind == ChannelKind::Direct || msg.is_reply_to_service {
            self.scheduler.cancel_followups(checkin.id);
        }

        ledger::sync_review_card(
            &self.db,
            self.transport.as_ref(),
            &group,
            &driver,
            &mut checkin,
        )
        .await?;

        // Mirror + count notice are best-effort; the transition above is
        // already recorded.
        match self
            .transport
            .send_media(group.review_channel_id, &msg.media, msg.caption.as_deref())
            .await
        {
            Ok(_) => {
                let channel_label = match msg.channel_kind {
                    ChannelKind::Direct => String::new(),
                    ChannelKind::Group => format!(
                        "{} ",
                        msg.channel_title
                            .clone()
                            .unwrap_or_else(|| "Driver chat".to_string())
                            .to_uppercase()
                    ),
                };
                self.reply_silent(
                    group.review_channel_id,
                    &format!(
                        "Check-In update — {} {channel_label}media {}/{}",
                        driver.mention(),
                        checkin.media_count,
                        ledger::MEDIA_QUOTA,
                    ),
                )
                .await;
            }
            Err(e) => {
                warn!(driver_id = driver.id, error = %e, "failed to mirror media");
            }
        }

        Ok(Some(Event::MediaRecorded {
            checkin_id: checkin.id,
            driver_id: driver.id,
            media_count: checkin.media_count,
            first_media,
            at: Utc::now(),
        }))
    }

    /// Driver skip flow: excuse today's check-in with a catalogued
    /// reason.
    pub async fn skip_checkin(&self, checkin_id: i64, reason_key: &str) -> Result<Event> {
        let group = roles::require_default_group(&self.db)?;
        let checkin = self
            .db
            .with(|db| db.checkin_by_id(checkin_id))?
            .ok_or(CoreError::Access(AccessError::NotFound {
                kind: "checkin",
                key: checkin_id.to_string(),
            }))?;
        let driver = self
            .db
            .with(|db| db.driver_by_id(checkin.driver_id))?
            .ok_or(CoreError::Access(AccessError::NotFound {
                kind: "driver",
                key: checkin.driver_id.to_string(),
            }))?;

        let reason = skip_reason_label(reason_key);
        let mut excused = self
            .db
            .with(|db| db.set_excused(driver.id, group.id, checkin.date, reason))?;

        ledger::sync_review_card(
            &self.db,
            self.transport.as_ref(),
            &group,
            &driver,
            &mut excused,
        )
        .await?;
        self.scheduler.cancel_followups(excused.id);
        self.reply_silent(
            group.review_channel_id,
            &format!("Excused — {}: {reason}", driver.mention()),
        )
        .await;

        Ok(Event::Excused {
            checkin_id: excused.id,
            driver_id: driver.id,
            reason: reason.to_string(),
            at: Utc::now(),
        })
    }

    async fn reply(&self, channel: i64, text: &str) {
        if let Err(e) = self
            .transport
            .send_message(channel, text, SendOptions::default())
            .await
        {
            error!(channel, error = %e, "failed to send reply");
        }
    }

    async fn reply_silent(&self, channel: i64, text: &str) {
        if let Err(e) = self
            .transport
            .send_message(channel, text, SendOptions::silent())
            .await
        {
            error!(channel, error = %e, "failed to send notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_reason_labels() {
        assert_eq!(skip_reason_label("no_trailer"), "No trailer");
        assert_eq!(skip_reason_label("unknown"), "Other");
    }
}
