//! Facebook Graph API adapter. Also serves Instagram messaging — both run
//! over the same Graph endpoints with a page-scoped token.

use super::{GraphApi, PostDetails, SendApi, SendReceipt};
use crate::errors::MirrorError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, warn};

pub struct FacebookClient {
    client: reqwest::Client,
    base_url: String,
    page_token: String,
}

impl FacebookClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, page_token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_token: page_token.into(),
        }
    }

    fn collect_media_urls(attachments: &Value) -> Vec<String> {
        let mut urls = Vec::new();
        let Some(data) = attachments.pointer("/data").and_then(Value::as_array) else {
            return urls;
        };
        for attachment in data {
            if let Some(src) = attachment
                .pointer("/media/image/src")
                .and_then(Value::as_str)
            {
                urls.push(src.to_string());
            }
            if let Some(video) = attachment.pointer("/media/source").and_then(Value::as_str) {
                urls.push(video.to_string());
            }
            // Albums nest one level deeper
            if let Some(subattachments) = attachment
                .pointer("/subattachments/data")
                .and_then(Value::as_array)
            {
                for sub in subattachments {
                    if let Some(src) = sub.pointer("/media/image/src").and_then(Value::as_str) {
                        urls.push(src.to_string());
                    }
                }
            }
        }
        urls
    }
}

#[async_trait]
impl GraphApi for FacebookClient {
    async fn fetch_post(&self, post_id: &str) -> Result<PostDetails> {
        let url = format!("{}/{}", self.base_url, post_id);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("fields", "message,from,created_time,attachments"),
                ("access_token", &self.page_token),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(MirrorError::Platform {
                platform: "facebook".to_string(),
                message: format!("graph fetch of {} failed: {}: {}", post_id, status, message),
            }
            .into());
        }

        let created_time = body
            .get("created_time")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc));

        let details = PostDetails {
            author_id: body
                .pointer("/from/id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            author_name: body
                .pointer("/from/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            caption: body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            created_time,
            media_urls: body
                .get("attachments")
                .map(Self::collect_media_urls)
                .unwrap_or_default(),
        };
        debug!(
            "graph: fetched post {} ({} media)",
            post_id,
            details.media_urls.len()
        );
        Ok(details)
    }
}

#[async_trait]
impl SendApi for FacebookClient {
    async fn send_text(&self, recipient_id: &str, text: &str) -> Result<SendReceipt> {
        let url = format!("{}/me/messages", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("access_token", &self.page_token)])
            .json(&json!({
                "recipient": {"id": recipient_id},
                "messaging_type": "RESPONSE",
                "message": {"text": text},
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
                "messenger send to {} failed: {}: {}",
                recipient_id, status, error
            );
            return Ok(SendReceipt {
                message_id: None,
                success: false,
            });
        }

        Ok(SendReceipt {
            message_id: body
                .get("message_id")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            success: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> FacebookClient {
        FacebookClient::new(reqwest::Client::new(), server.uri(), "page-token")
    }

    #[tokio::test]
    async fn fetch_post_parses_details() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p1"))
            .and(query_param("access_token", "page-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "caption text",
                "from": {"id": "page-9", "name": "My Page"},
                "created_time": "2026-01-05T10:00:00+00:00",
                "attachments": {"data": [
                    {"media": {"image": {"src": "https://cdn.example/a.jpg"}}},
                    {"subattachments": {"data": [
                        {"media": {"image": {"src": "https://cdn.example/b.jpg"}}}
                    ]}}
                ]}
            })))
            .mount(&server)
            .await;

        let details = client(&server).fetch_post("p1").await.expect("fetch");
        assert_eq!(details.caption, "caption text");
        assert_eq!(details.author_id, "page-9");
        assert_eq!(details.author_name, "My Page");
        assert!(details.created_time.is_some());
        assert_eq!(
            details.media_urls,
            vec!["https://cdn.example/a.jpg", "https://cdn.example/b.jpg"]
        );
    }

    #[tokio::test]
    async fn fetch_post_api_error_is_err() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p404"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "Unsupported get request"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).fetch_post("p404").await;
        assert!(err.is_err());
        assert!(err.unwrap_err().to_string().contains("Unsupported"));
    }

    #[tokio::test]
    async fn send_text_extracts_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "recipient_id": "U1",
                "message_id": "mid.12345"
            })))
            .mount(&server)
            .await;

        let receipt = client(&server)
            .send_text("U1", "hello")
            .await
            .expect("send");
        assert!(receipt.success);
        assert_eq!(receipt.message_id.as_deref(), Some("mid.12345"));
    }

    #[tokio::test]
    async fn send_text_platform_rejection_is_unsent_receipt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "Message sent outside allowed window"}
            })))
            .mount(&server)
            .await;

        let receipt = client(&server)
            .send_text("U1", "hello")
            .await
            .expect("send call itself succeeds");
        assert!(!receipt.success);
        assert!(receipt.message_id.is_none());
    }
}
