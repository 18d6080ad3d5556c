//! Shared fixtures for integration tests: an in-memory database and a
//! recording transport double.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveTime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use fleetcheck_core::error::TransportError;
use fleetcheck_core::roles::GroupSettings;
use fleetcheck_core::storage::{AppConfig, Database, DbHandle};
use fleetcheck_core::transport::{
    ChannelInfo, EditOutcome, MediaFile, MembershipRole, MessageRef, SendOptions, Transport,
};

pub const GROUP_ID: i64 = -500;
pub const REVIEW_CHANNEL: i64 = -501;
pub const COMPLIANCE_CHANNEL: i64 = -502;

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel: i64,
    pub text: String,
    pub silent: bool,
}

/// Transport double that records every call and answers from canned
/// state.
pub struct RecordingTransport {
    next_id: AtomicI64,
    edits_missing: AtomicBool,
    pub messages: Mutex<Vec<SentMessage>>,
    pub media: Mutex<Vec<(i64, MediaFile)>>,
    pub edits: Mutex<Vec<(i64, i64, String)>>,
    channel_titles: Mutex<HashMap<i64, String>>,
    roles: Mutex<HashMap<i64, MembershipRole>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1),
            edits_missing: AtomicBool::new(false),
            messages: Mutex::new(Vec::new()),
            media: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            channel_titles: Mutex::new(HashMap::new()),
            roles: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_channel_title(&self, channel: i64, title: &str) {
        self.channel_titles
            .lock()
            .unwrap()
            .insert(channel, title.to_string());
    }

    pub fn set_role(&self, user_ref: i64, role: MembershipRole) {
        self.roles.lock().unwrap().insert(user_ref, role);
    }

    /// Make every subsequent edit report a missing target.
    pub fn drop_edit_targets(&self) {
        self.edits_missing.store(true, Ordering::SeqCst);
    }

    pub fn sent_to(&self, channel: i64) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel == channel)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.text.contains(needle))
            .count()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(
        &self,
        channel: i64,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageRef, TransportError> {
        self.messages.lock().unwrap().push(SentMessage {
            channel,
            text: text.to_string(),
            silent: opts.silent,
        });
        Ok(MessageRef(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn send_media(
        &self,
        channel: i64,
        media: &MediaFile,
        _caption: Option<&str>,
    ) -> Result<MessageRef, TransportError> {
        self.media.lock().unwrap().push((channel, media.clone()));
        Ok(MessageRef(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn edit_message(
        &self,
        channel: i64,
        message: MessageRef,
        text: &str,
    ) -> Result<EditOutcome, TransportError> {
        if self.edits_missing.load(Ordering::SeqCst) {
            return Ok(EditOutcome::Missing);
        }
        self.edits
            .lock()
            .unwrap()
            .push((channel, message.0, text.to_string()));
        Ok(EditOutcome::Edited)
    }

    async fn get_channel_info(&self, channel: i64) -> Result<ChannelInfo, TransportError> {
        let title = self
            .channel_titles
            .lock()
            .unwrap()
            .get(&channel)
            .cloned()
            .unwrap_or_else(|| "Unit 12 rolling".to_string());
        Ok(ChannelInfo { id: channel, title })
    }

    async fn get_membership(
        &self,
        _group_channel: i64,
        user_ref: i64,
    ) -> Result<MembershipRole, TransportError> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(&user_ref)
            .copied()
            .unwrap_or(MembershipRole::Admin))
    }
}

/// Fresh in-memory database with the standard test group configured.
pub fn setup() -> (DbHandle, GroupSettings, Arc<RecordingTransport>) {
    let db = DbHandle::new(Database::open_memory().unwrap());
    let group = GroupSettings {
        id: GROUP_ID,
        title: "Fleet West".to_string(),
        review_channel_id: REVIEW_CHANNEL,
        compliance_channel_id: Some(COMPLIANCE_CHANNEL),
        tz_offset_minutes: 0,
        paused: false,
        autosend_enabled: false,
        autosend_time: None,
        digest_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
    };
    db.with(|d| d.upsert_group(&group)).unwrap();
    (db, group, RecordingTransport::new())
}

pub fn app_config() -> AppConfig {
    AppConfig::default()
}
