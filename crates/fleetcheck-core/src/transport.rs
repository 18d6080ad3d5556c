//! Chat-transport contract.
//!
//! The core never talks to a chat network directly; everything goes
//! through this trait. The shipped implementation posts JSON to a
//! relay webhook with a bounded timeout. Tests substitute recording
//! doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::error::TransportError;

/// Opaque reference to a delivered message, used for later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef(pub i64);

/// Evidence media kind counted toward the daily quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

/// A media item to deliver or mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub kind: MediaKind,
    pub file_id: String,
    /// Delivery batch the item arrived in, if any.
    pub batch_id: Option<String>,
}

/// Per-send options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Deliver without triggering a notification sound.
    pub silent: bool,
}

impl SendOptions {
    pub fn silent() -> Self {
        Self { silent: true }
    }
}

/// Outcome of an edit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Edited,
    /// The stored text already matched; benign.
    NotModified,
    /// The edit target is gone; callers post fresh and re-store the ref.
    Missing,
}

/// Channel metadata from the transport side.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    pub id: i64,
    pub title: String,
}

/// Membership role of a user within a group channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    /// Left, kicked, or never joined.
    Absent,
    Member,
    Admin,
}

impl MembershipRole {
    pub fn is_member(self) -> bool {
        !matches!(self, MembershipRole::Absent)
    }

    pub fn is_admin(self) -> bool {
        matches!(self, MembershipRole::Admin)
    }
}

/// Everything the core needs from the chat network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(
        &self,
        channel: i64,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageRef, TransportError>;

    async fn send_media(
        &self,
        channel: i64,
        media: &MediaFile,
        caption: Option<&str>,
    ) -> Result<MessageRef, TransportError>;

    async fn edit_message(
        &self,
        channel: i64,
        message: MessageRef,
        text: &str,
    ) -> Result<EditOutcome, TransportError>;

    async fn get_channel_info(&self, channel: i64) -> Result<ChannelInfo, TransportError>;

    async fn get_membership(
        &self,
        group_channel: i64,
        user_ref: i64,
    ) -> Result<MembershipRole, TransportError>;
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message_id: i64,
}

/// Webhook-relay transport.
///
/// Posts JSON to `{base}/{method}` with a bearer token. All requests
/// share one client with a bounded timeout; there is no retry here —
/// best-effort sends log at the call site, primary sends surface the
/// error.
pub struct WebhookTransport {
    client: reqwest::Client,
    base: Url,
    timeout_secs: u64,
}

impl WebhookTransport {
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot
    /// be built.
    pub fn new(base_url: &str, token: &str, timeout_secs: u64) -> Result<Self, TransportError> {
        let base = Url::parse(base_url)
            .map_err(|e| TransportError::Rejected(format!("bad base url: {e}")))?;
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| TransportError::Rejected(format!("bad token: {e}")))?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base,
            timeout_secs,
        })
    }

    fn endpoint(&self, method: &str) -> Result<Url, TransportError> {
        self.base
            .join(method)
            .map_err(|e| TransportError::Rejected(format!("bad endpoint {method}: {e}")))
    }

    fn map_err(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            TransportError::Http(err.to_string())
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, TransportError> {
        let resp = self
            .client
            .post(self.endpoint(method)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;
        if !resp.status().is_success() {
            return Err(TransportError::Rejected(format!(
                "{method}: HTTP {}",
                resp.status()
            )));
        }
        resp.json().await.map_err(|e| self.map_err(e))
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    async fn send_message(
        &self,
        channel: i64,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageRef, TransportError> {
        let resp: MessageResponse = self
            .post_json(
                "sendMessage",
                json!({ "channel": channel, "text": text, "silent": opts.silent }),
            )
            .await?;
        Ok(MessageRef(resp.message_id))
    }

    async fn send_media(
        &self,
        channel: i64,
        media: &MediaFile,
        caption: Option<&str>,
    ) -> Result<MessageRef, TransportError> {
        let resp: MessageResponse = self
            .post_json(
                "sendMedia",
                json!({
                    "channel": channel,
                    "kind": media.kind,
                    "file_id": media.file_id,
                    "caption": caption,
                }),
            )
            .await?;
        Ok(MessageRef(resp.message_id))
    }

    async fn edit_message(
        &self,
        channel: i64,
        message: MessageRef,
        text: &str,
    ) -> Result<EditOutcome, TransportError> {
        let resp = self
            .client
            .post(self.endpoint("editMessage")?)
            .json(&json!({ "channel": channel, "message_id": message.0, "text": text }))
            .send()
            .await
            .map_err(|e| self.map_err(e))?;
        match resp.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(EditOutcome::Missing),
            reqwest::StatusCode::CONFLICT => Ok(EditOutcome::NotModified),
            status if status.is_success() => Ok(EditOutcome::Edited),
            status => Err(TransportError::Rejected(format!(
                "editMessage: HTTP {status}"
            ))),
        }
    }

    async fn get_channel_info(&self, channel: i64) -> Result<ChannelInfo, TransportError> {
        self.post_json("getChannelInfo", json!({ "channel": channel }))
            .await
    }

    async fn get_membership(
        &self,
        group_channel: i64,
        user_ref: i64,
    ) -> Result<MembershipRole, TransportError> {
        #[derive(Deserialize)]
        struct MembershipResponse {
            role: MembershipRole,
        }
        let resp: MembershipResponse = self
            .post_json(
                "getMembership",
                json!({ "channel": group_channel, "user": user_ref }),
            )
            .await?;
        Ok(resp.role)
    }
}
