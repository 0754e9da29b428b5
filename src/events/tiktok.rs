//! TikTok webhook classification.
//!
//! TikTok's callback shape is the least structured of the supported
//! platforms: there is no fixed verb/item vocabulary, and event fields may
//! live at the top level, inside a `value` or `data` object, or inside a
//! JSON-encoded `content` string. This module merges those locations into
//! one working object and applies a best-effort inference cascade. The
//! heuristics are isolated here on purpose — if the real schema diverges,
//! this is the only file that changes.

use super::{Verb, normalize_verb};
use serde_json::{Map, Value};
use tracing::debug;

/// A classified TikTok callback.
#[derive(Debug, Clone, PartialEq)]
pub enum TikTokEvent {
    Comment {
        action: Verb,
        comment_id: String,
        video_id: String,
        text: String,
        user_id: String,
        user_name: String,
    },
    Reaction {
        action: Verb,
        video_id: String,
        user_id: String,
        reaction_type: String,
    },
    Unknown,
}

/// Merge `value`, `data`, and the JSON-encoded `content` string into one
/// working object. Later, more specific locations override earlier ones.
fn merge_locations(payload: &Value) -> Map<String, Value> {
    let mut working = payload.as_object().cloned().unwrap_or_default();

    for key in ["value", "data"] {
        if let Some(Value::Object(fields)) = payload.get(key) {
            for (k, v) in fields {
                working.insert(k.clone(), v.clone());
            }
        }
    }

    if let Some(content) = payload.get("content").and_then(Value::as_str)
        && let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(content)
    {
        for (k, v) in fields {
            working.insert(k, v);
        }
    }

    working
}

/// Action inference cascade: explicit `verb`/`action`/`op` field first, then
/// keyword scan of the event-type string, defaulting to add.
fn infer_action(working: &Map<String, Value>) -> Verb {
    for key in ["verb", "action", "op"] {
        if let Some(raw) = working.get(key).and_then(Value::as_str) {
            let verb = normalize_verb(raw);
            if verb != Verb::Unknown {
                return verb;
            }
        }
    }

    let event_type = ["event", "event_type", "type"]
        .iter()
        .find_map(|key| working.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_ascii_lowercase();

    if event_type.contains("delete") || event_type.contains("remove") {
        Verb::Delete
    } else if event_type.contains("update") || event_type.contains("edit") {
        Verb::Update
    } else {
        Verb::Add
    }
}

fn str_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        // TikTok sends numeric ids for some fields
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Classify a raw TikTok callback payload. Never fails; shapes that match
/// neither the comment nor the reaction heuristics come back as `Unknown`.
pub fn classify(payload: &Value) -> TikTokEvent {
    let working = merge_locations(payload);
    if working.is_empty() {
        debug!("tiktok: empty or non-object payload");
        return TikTokEvent::Unknown;
    }

    let action = infer_action(&working);

    // Comment heuristic: a `comment` sub-object or a bare `comment_id`.
    if let Some(Value::Object(comment)) = working.get("comment") {
        return TikTokEvent::Comment {
            action,
            comment_id: str_field(comment, "id"),
            video_id: str_field(comment, "video_id"),
            text: str_field(comment, "text"),
            user_id: str_field(comment, "user_id"),
            user_name: str_field(comment, "user_name"),
        };
    }
    if working.contains_key("comment_id") {
        return TikTokEvent::Comment {
            action,
            comment_id: str_field(&working, "comment_id"),
            video_id: str_field(&working, "video_id"),
            text: str_field(&working, "text"),
            user_id: str_field(&working, "user_id"),
            user_name: str_field(&working, "user_name"),
        };
    }

    // Reaction heuristic: reaction-related keys, or item == like/reaction.
    let item = str_field(&working, "item").to_ascii_lowercase();
    if working.contains_key("reaction_type") || item == "like" || item == "reaction" {
        let reaction_type = match working.get("reaction_type").and_then(Value::as_str) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => "like".to_string(),
        };
        return TikTokEvent::Reaction {
            action,
            video_id: str_field(&working, "video_id"),
            user_id: str_field(&working, "user_id"),
            reaction_type,
        };
    }

    debug!(
        "tiktok: unclassifiable payload keys: {:?}",
        working.keys().collect::<Vec<_>>()
    );
    TikTokEvent::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn comment_create_with_encoded_content() {
        let payload = json!({
            "event": "comment.create",
            "content": r#"{"comment":{"id":"c1","video_id":"v1","text":"hi","user_id":"u1"}}"#
        });
        let event = classify(&payload);
        assert_eq!(
            event,
            TikTokEvent::Comment {
                action: Verb::Add,
                comment_id: "c1".into(),
                video_id: "v1".into(),
                text: "hi".into(),
                user_id: "u1".into(),
                user_name: String::new(),
            }
        );
    }

    #[test]
    fn explicit_verb_wins_over_event_type() {
        let payload = json!({
            "event": "comment.create",
            "verb": "removed",
            "comment_id": "c2",
            "video_id": "v1"
        });
        assert!(matches!(
            classify(&payload),
            TikTokEvent::Comment {
                action: Verb::Delete,
                ..
            }
        ));
    }

    #[test]
    fn event_type_keywords_infer_verb() {
        for (event_type, expected) in [
            ("comment.delete", Verb::Delete),
            ("comment.remove", Verb::Delete),
            ("comment.update", Verb::Update),
            ("comment.edited", Verb::Update),
            ("comment.create", Verb::Add),
            ("comment", Verb::Add),
        ] {
            let payload = json!({"type": event_type, "comment_id": "c1"});
            match classify(&payload) {
                TikTokEvent::Comment { action, .. } => assert_eq!(action, expected),
                other => panic!("expected Comment for {}, got {:?}", event_type, other),
            }
        }
    }

    #[test]
    fn reaction_by_reaction_type_key() {
        let payload = json!({
            "event": "video.like",
            "data": {"video_id": "v3", "user_id": "u7", "reaction_type": "LOVE"}
        });
        assert_eq!(
            classify(&payload),
            TikTokEvent::Reaction {
                action: Verb::Add,
                video_id: "v3".into(),
                user_id: "u7".into(),
                reaction_type: "LOVE".into(),
            }
        );
    }

    #[test]
    fn reaction_by_item_like() {
        let payload = json!({
            "event": "item.remove",
            "value": {"item": "like", "video_id": "v3", "user_id": "u7"}
        });
        assert_eq!(
            classify(&payload),
            TikTokEvent::Reaction {
                action: Verb::Delete,
                video_id: "v3".into(),
                user_id: "u7".into(),
                reaction_type: "like".into(),
            }
        );
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let payload = json!({
            "event": "comment.create",
            "comment": {"id": 991, "video_id": 17, "text": "num", "user_id": 5}
        });
        match classify(&payload) {
            TikTokEvent::Comment {
                comment_id,
                video_id,
                user_id,
                ..
            } => {
                assert_eq!(comment_id, "991");
                assert_eq!(video_id, "17");
                assert_eq!(user_id, "5");
            }
            other => panic!("expected Comment, got {:?}", other),
        }
    }

    #[test]
    fn content_overrides_outer_fields() {
        // The encoded content is the most specific location and wins.
        let payload = json!({
            "event": "comment.create",
            "comment_id": "outer",
            "content": r#"{"comment_id":"inner","video_id":"v1"}"#
        });
        match classify(&payload) {
            TikTokEvent::Comment { comment_id, .. } => assert_eq!(comment_id, "inner"),
            other => panic!("expected Comment, got {:?}", other),
        }
    }

    #[test]
    fn malformed_shapes_are_unknown() {
        assert_eq!(classify(&json!(null)), TikTokEvent::Unknown);
        assert_eq!(classify(&json!("just a string")), TikTokEvent::Unknown);
        assert_eq!(classify(&json!({"event": "mystery.event"})), TikTokEvent::Unknown);
        // Invalid JSON in content is ignored rather than an error
        assert_eq!(
            classify(&json!({"event": "comment.create", "content": "{not json"})),
            TikTokEvent::Unknown
        );
    }
}
