pub mod tiktok;

use serde_json::Value;

/// Canonical action vocabulary shared by every platform.
///
/// Webhook payloads use a loose verb vocabulary (`created`, `edited`,
/// `removed`, ...); everything is folded into these four before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Add,
    Update,
    Delete,
    Unknown,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Add => "add",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fold a raw platform verb into the canonical vocabulary. Total: any
/// unrecognized input maps to `Verb::Unknown`, never an error.
pub fn normalize_verb(raw: &str) -> Verb {
    match raw.trim().to_ascii_lowercase().as_str() {
        "add" | "added" | "create" | "created" => Verb::Add,
        "update" | "updated" | "edit" | "edited" => Verb::Update,
        "delete" | "deleted" | "remove" | "removed" => Verb::Delete,
        _ => Verb::Unknown,
    }
}

/// What changed in a feed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedItem {
    Comment,
    Reaction,
    Status,
    Photo,
    Video,
    Unknown,
}

impl FeedItem {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "comment" => FeedItem::Comment,
            "reaction" | "like" => FeedItem::Reaction,
            "status" | "post" => FeedItem::Status,
            "photo" => FeedItem::Photo,
            "video" => FeedItem::Video,
            _ => FeedItem::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedItem::Comment => "comment",
            FeedItem::Reaction => "reaction",
            FeedItem::Status => "status",
            FeedItem::Photo => "photo",
            FeedItem::Video => "video",
            FeedItem::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FeedItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One normalized Facebook/Instagram feed change: the `(item, verb)` key
/// plus the raw change value the handler digs its fields out of.
#[derive(Debug, Clone)]
pub struct FeedChange {
    pub item: FeedItem,
    pub verb: Verb,
    pub value: Value,
}

impl FeedChange {
    /// Classify a single `changes[]` entry. Malformed shapes degrade to the
    /// `(Unknown, Unknown)` key so the dispatcher's fallback logs and drops
    /// them; this never fails.
    pub fn from_change(change: &Value) -> Self {
        let value = change.get("value").cloned().unwrap_or(Value::Null);
        let item = value
            .get("item")
            .and_then(Value::as_str)
            .map_or(FeedItem::Unknown, FeedItem::parse);
        let verb = value
            .get("verb")
            .and_then(Value::as_str)
            .map_or(Verb::Unknown, normalize_verb);
        Self { item, verb, value }
    }
}

/// One normalized Messenger-style `messaging[]` event.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagingEvent {
    /// Inbound chat message. `is_echo` marks our own outbound message
    /// reflected back by the platform.
    Text {
        sender_id: String,
        message_id: Option<String>,
        text: String,
        attachments: Vec<Value>,
        is_echo: bool,
    },
    /// Button press; carries the button title (payload as fallback) as text.
    Postback { sender_id: String, text: String },
    /// Delivery receipt. The confirmer is the original *recipient* of our
    /// messages, so the end-user id comes from `recipient.id`.
    Delivery {
        external_user_id: String,
        message_ids: Vec<String>,
    },
    /// Read receipt up to a watermark timestamp (epoch milliseconds).
    Read {
        external_user_id: String,
        watermark_ms: i64,
    },
    Unknown,
}

impl MessagingEvent {
    pub fn from_event(event: &Value) -> Self {
        let sender_id = event
            .pointer("/sender/id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let recipient_id = event
            .pointer("/recipient/id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Some(message) = event.get("message") {
            let text = message
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let attachments = message
                .get("attachments")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            return MessagingEvent::Text {
                sender_id,
                message_id: message
                    .get("mid")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                text,
                attachments,
                is_echo: message
                    .get("is_echo")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            };
        }

        if let Some(postback) = event.get("postback") {
            let text = postback
                .get("title")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .or_else(|| postback.get("payload").and_then(Value::as_str))
                .unwrap_or_default()
                .to_string();
            return MessagingEvent::Postback { sender_id, text };
        }

        if let Some(delivery) = event.get("delivery") {
            let message_ids = delivery
                .get("mids")
                .and_then(Value::as_array)
                .map(|mids| {
                    mids.iter()
                        .filter_map(Value::as_str)
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default();
            return MessagingEvent::Delivery {
                external_user_id: recipient_id,
                message_ids,
            };
        }

        if let Some(read) = event.get("read") {
            return MessagingEvent::Read {
                external_user_id: recipient_id,
                watermark_ms: read.get("watermark").and_then(Value::as_i64).unwrap_or(0),
            };
        }

        MessagingEvent::Unknown
    }
}

#[cfg(test)]
mod tests;
