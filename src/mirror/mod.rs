pub mod store;

pub use store::MirrorStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Platform a conversation or comment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Facebook,
    Instagram,
    Whatsapp,
    Tiktok,
    Widget,
    WidgetBot,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Whatsapp => "whatsapp",
            Platform::Tiktok => "tiktok",
            Platform::Widget => "widget",
            Platform::WidgetBot => "widget_bot",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "whatsapp" => Ok(Platform::Whatsapp),
            "tiktok" => Ok(Platform::Tiktok),
            "widget" => Ok(Platform::Widget),
            "widget_bot" => Ok(Platform::WidgetBot),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who authored a mirrored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Customer,
    Bot,
    Admin,
    Seller,
    System,
}

impl SenderType {
    pub fn as_str(self) -> &'static str {
        match self {
            SenderType::Customer => "customer",
            SenderType::Bot => "bot",
            SenderType::Admin => "admin",
            SenderType::Seller => "seller",
            SenderType::System => "system",
        }
    }
}

impl std::str::FromStr for SenderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(SenderType::Customer),
            "bot" => Ok(SenderType::Bot),
            "admin" => Ok(SenderType::Admin),
            "seller" => Ok(SenderType::Seller),
            "system" => Ok(SenderType::System),
            _ => Err(format!("Unknown sender type: {}", s)),
        }
    }
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A 1:1 thread between a platform-connected account and one external
/// end-user. Unique per `(platform, account_id, external_user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub platform: Platform,
    pub account_id: String,
    pub external_user_id: String,
    pub external_username: Option<String>,
    pub is_bot_active: bool,
    pub last_message_at: DateTime<Utc>,
}

/// One inbound or outbound chat message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_type: SenderType,
    pub text: String,
    pub attachments: Vec<Value>,
    /// Platform-native id. Inbound messages carry it from the webhook;
    /// outbound messages get it once the send API confirms delivery.
    pub message_id: Option<String>,
    pub is_sent: bool,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// One `post_ids` entry on a mirrored post. A post may hold several after
/// cross-posting, and each platform may assign more than one id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostIdEntry {
    pub platform: String,
    pub post_id: Vec<String>,
    pub status: String,
}

/// A page/account feed post mirrored from the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPost {
    pub id: i64,
    pub author: String,
    pub caption: String,
    pub post_ids: Vec<PostIdEntry>,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SocialPost {
    /// Whether any `post_ids` entry carries the given external id.
    pub fn has_external_id(&self, external_id: &str) -> bool {
        self.post_ids
            .iter()
            .any(|entry| entry.post_id.iter().any(|id| id == external_id))
    }
}

/// Normalize the historical shapes of a stored `post_ids` field into the
/// canonical list of entries. Legacy records stored a scalar id or a bare
/// list of ids; current records store a list of entry objects whose
/// `post_id` may itself be scalar or list. This is the single
/// compatibility read-path — lookups never touch raw shapes directly.
pub fn normalize_post_id_field(raw: &Value) -> Vec<PostIdEntry> {
    fn ids_of(value: &Value) -> Vec<String> {
        match value {
            Value::String(s) => vec![s.clone()],
            Value::Number(n) => vec![n.to_string()],
            Value::Array(items) => items.iter().flat_map(ids_of).collect(),
            _ => Vec::new(),
        }
    }

    match raw {
        // Legacy scalar: "123_456"
        Value::String(_) | Value::Number(_) => vec![PostIdEntry {
            platform: "facebook".to_string(),
            post_id: ids_of(raw),
            status: "published".to_string(),
        }],
        Value::Array(items) => {
            let mut entries = Vec::new();
            let mut legacy_ids = Vec::new();
            for item in items {
                match item {
                    Value::Object(obj) => entries.push(PostIdEntry {
                        platform: obj
                            .get("platform")
                            .and_then(Value::as_str)
                            .unwrap_or("facebook")
                            .to_string(),
                        post_id: obj.get("post_id").map(ids_of).unwrap_or_default(),
                        status: obj
                            .get("status")
                            .and_then(Value::as_str)
                            .unwrap_or("published")
                            .to_string(),
                    }),
                    // Legacy bare list: ["123_456", "123_789"]
                    other => legacy_ids.extend(ids_of(other)),
                }
            }
            if !legacy_ids.is_empty() {
                entries.push(PostIdEntry {
                    platform: "facebook".to_string(),
                    post_id: legacy_ids,
                    status: "published".to_string(),
                });
            }
            entries
        }
        _ => Vec::new(),
    }
}

/// A top-level comment on a mirrored post, keyed by its platform-native id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub comment_id: String,
    pub text: String,
    pub commenter_id: String,
    pub commenter_name: String,
    pub platform: Platform,
    pub attachments: Vec<Value>,
    pub reaction_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A reply to a comment, keyed by `(parent comment, sub_comment_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubComment {
    pub id: i64,
    pub comment_id: i64,
    pub sub_comment_id: String,
    pub text: String,
    pub commenter_id: String,
    pub commenter_name: String,
    pub created_at: DateTime<Utc>,
}

/// A `(post, reactor)` reaction. A reactor may change reaction type but
/// never holds two simultaneous reactions on the same post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub id: i64,
    pub post_id: i64,
    pub reactor_id: String,
    pub reactor_name: String,
    pub reaction_type: String,
}

/// A tenant's WhatsApp Business account. `phone_number_id` is the webhook
/// routing key for all inbound WhatsApp traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WabaAccount {
    pub id: i64,
    pub owner_id: String,
    pub waba_id: String,
    pub phone_number_id: String,
}
