//! Reply Engine gateway.
//!
//! The assistant is an opaque collaborator: text and ordered history go in,
//! reply text comes out. An empty or failed outcome means "send nothing
//! back" — webhook-side failures never surface to the end user.

use crate::errors::MirrorError;
use crate::mirror::{Platform, SenderType, StoredMessage};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyRequest {
    pub text: String,
    pub history: Vec<HistoryEntry>,
    pub attachments: Vec<Value>,
    pub owner_id: String,
    pub platform: Platform,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyOutcome {
    #[serde(default)]
    pub reply: String,
    #[serde(default)]
    pub success: bool,
}

impl ReplyOutcome {
    /// Whether this outcome carries anything worth sending back.
    pub fn should_send(&self) -> bool {
        self.success && !self.reply.trim().is_empty()
    }
}

#[async_trait]
pub trait ReplyEngine: Send + Sync {
    async fn reply(&self, request: ReplyRequest) -> Result<ReplyOutcome>;
}

/// Map stored conversation messages to reply-engine history roles:
/// customer and seller turns read as `user`, bot turns as `assistant`;
/// admin/system rows are operator bookkeeping and stay out of the prompt.
pub fn build_history(messages: &[StoredMessage]) -> Vec<HistoryEntry> {
    messages
        .iter()
        .filter_map(|message| {
            let role = match message.sender_type {
                SenderType::Customer | SenderType::Seller => "user",
                SenderType::Bot => "assistant",
                SenderType::Admin | SenderType::System => return None,
            };
            Some(HistoryEntry {
                role: role.to_string(),
                content: message.text.clone(),
                time: message.created_at,
            })
        })
        .collect()
}

/// Shipping implementation: POSTs the request to a configured endpoint.
pub struct HttpReplyEngine {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReplyEngine {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ReplyEngine for HttpReplyEngine {
    async fn reply(&self, request: ReplyRequest) -> Result<ReplyOutcome> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(MirrorError::Reply(format!("reply engine returned {}", status)).into());
        }
        let outcome: ReplyOutcome = resp.json().await?;
        debug!(
            "reply engine: success={} reply_len={}",
            outcome.success,
            outcome.reply.len()
        );
        Ok(outcome)
    }
}

/// Used when no reply endpoint is configured: messages are mirrored but no
/// bot reply is ever attempted.
pub struct NullReplyEngine;

#[async_trait]
impl ReplyEngine for NullReplyEngine {
    async fn reply(&self, _request: ReplyRequest) -> Result<ReplyOutcome> {
        Ok(ReplyOutcome::default())
    }
}
