//! WhatsApp Cloud API adapter. Outbound only — inbound traffic arrives via
//! webhook and is routed by `phone_number_id`.

use super::{SendApi, SendReceipt};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::warn;

pub struct WhatsAppClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    phone_number_id: String,
}

impl WhatsAppClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        phone_number_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            phone_number_id: phone_number_id.into(),
        }
    }
}

#[async_trait]
impl SendApi for WhatsAppClient {
    async fn send_text(&self, recipient_id: &str, text: &str) -> Result<SendReceipt> {
        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": recipient_id,
                "type": "text",
                "text": {"preview_url": false, "body": text},
            }))
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let error = body
                .pointer("/error/message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            warn!(
                "whatsapp send to {} failed: {}: {}",
                recipient_id, status, error
            );
            return Ok(SendReceipt {
                message_id: None,
                success: false,
            });
        }

        Ok(SendReceipt {
            message_id: body
                .pointer("/messages/0/id")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            success: true,
        })
    }
}
