pub mod facebook;
pub mod whatsapp;

pub use facebook::FacebookClient;
pub use whatsapp::WhatsAppClient;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Full post details fetched from a platform, used to bootstrap the local
/// mirror when a webhook references a post we have never seen.
#[derive(Debug, Clone, Default)]
pub struct PostDetails {
    pub author_id: String,
    pub author_name: String,
    pub caption: String,
    pub created_time: Option<DateTime<Utc>>,
    pub media_urls: Vec<String>,
}

/// Result of a platform text-send call. `success == false` with no id means
/// the platform rejected the message; the mirror still records the attempt.
#[derive(Debug, Clone, Default)]
pub struct SendReceipt {
    pub message_id: Option<String>,
    pub success: bool,
}

/// On-demand reads against a platform's content API.
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn fetch_post(&self, post_id: &str) -> Result<PostDetails>;
}

/// Outbound text delivery through a platform's messaging API.
#[async_trait]
pub trait SendApi: Send + Sync {
    async fn send_text(&self, recipient_id: &str, text: &str) -> Result<SendReceipt>;
}

/// Shared client with the fixed short timeouts every platform call uses.
/// On timeout the event is dropped with a logged error — there is no retry
/// scheduling in this subsystem.
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(20))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
