use super::*;
use serde_json::json;

#[test]
fn normalize_verb_maps_synonyms() {
    assert_eq!(normalize_verb("add"), Verb::Add);
    assert_eq!(normalize_verb("created"), Verb::Add);
    assert_eq!(normalize_verb("Added"), Verb::Add);
    assert_eq!(normalize_verb("edited"), Verb::Update);
    assert_eq!(normalize_verb("UPDATED"), Verb::Update);
    assert_eq!(normalize_verb("removed"), Verb::Delete);
    assert_eq!(normalize_verb("deleted"), Verb::Delete);
}

#[test]
fn normalize_verb_is_total() {
    // Any input maps into the four-variant vocabulary, never a panic.
    for raw in ["", "   ", "hide", "réagir", "add\u{0}junk", "ADDED "] {
        let verb = normalize_verb(raw);
        assert!(matches!(
            verb,
            Verb::Add | Verb::Update | Verb::Delete | Verb::Unknown
        ));
    }
    assert_eq!(normalize_verb("hide"), Verb::Unknown);
}

#[test]
fn feed_change_extracts_item_and_verb() {
    let change = json!({
        "field": "feed",
        "value": {"item": "comment", "verb": "add", "comment_id": "c1"}
    });
    let parsed = FeedChange::from_change(&change);
    assert_eq!(parsed.item, FeedItem::Comment);
    assert_eq!(parsed.verb, Verb::Add);
    assert_eq!(parsed.value["comment_id"], "c1");
}

#[test]
fn feed_change_malformed_degrades_to_unknown() {
    let parsed = FeedChange::from_change(&json!({"field": "feed"}));
    assert_eq!(parsed.item, FeedItem::Unknown);
    assert_eq!(parsed.verb, Verb::Unknown);

    let parsed = FeedChange::from_change(&json!({"value": {"item": 42, "verb": []}}));
    assert_eq!(parsed.item, FeedItem::Unknown);
    assert_eq!(parsed.verb, Verb::Unknown);
}

#[test]
fn messaging_text_event() {
    let event = json!({
        "sender": {"id": "U1"},
        "recipient": {"id": "PAGE1"},
        "message": {"mid": "m1", "text": "hello", "attachments": [{"type": "image"}]}
    });
    match MessagingEvent::from_event(&event) {
        MessagingEvent::Text {
            sender_id,
            message_id,
            text,
            attachments,
            is_echo,
        } => {
            assert_eq!(sender_id, "U1");
            assert_eq!(message_id.as_deref(), Some("m1"));
            assert_eq!(text, "hello");
            assert_eq!(attachments.len(), 1);
            assert!(!is_echo);
        }
        other => panic!("expected Text, got {:?}", other),
    }
}

#[test]
fn messaging_echo_flag_preserved() {
    let event = json!({
        "sender": {"id": "PAGE1"},
        "recipient": {"id": "U1"},
        "message": {"mid": "m2", "text": "our own reply", "is_echo": true}
    });
    assert!(matches!(
        MessagingEvent::from_event(&event),
        MessagingEvent::Text { is_echo: true, .. }
    ));
}

#[test]
fn postback_prefers_title_over_payload() {
    let event = json!({
        "sender": {"id": "U1"},
        "postback": {"title": "Get started", "payload": "GET_STARTED"}
    });
    match MessagingEvent::from_event(&event) {
        MessagingEvent::Postback { text, .. } => assert_eq!(text, "Get started"),
        other => panic!("expected Postback, got {:?}", other),
    }

    let event = json!({
        "sender": {"id": "U1"},
        "postback": {"title": "", "payload": "GET_STARTED"}
    });
    match MessagingEvent::from_event(&event) {
        MessagingEvent::Postback { text, .. } => assert_eq!(text, "GET_STARTED"),
        other => panic!("expected Postback, got {:?}", other),
    }
}

#[test]
fn delivery_resolves_user_via_recipient_id() {
    // Delivery receipts report the confirmer: sender is the end user, but
    // the conversation key must come from recipient.id.
    let event = json!({
        "sender": {"id": "U1"},
        "recipient": {"id": "PAGE1"},
        "delivery": {"mids": ["m1", "m2"], "watermark": 1_700_000_000_000_i64}
    });
    match MessagingEvent::from_event(&event) {
        MessagingEvent::Delivery {
            external_user_id,
            message_ids,
        } => {
            assert_eq!(external_user_id, "PAGE1");
            assert_eq!(message_ids, vec!["m1", "m2"]);
        }
        other => panic!("expected Delivery, got {:?}", other),
    }
}

#[test]
fn read_carries_watermark() {
    let event = json!({
        "sender": {"id": "U1"},
        "recipient": {"id": "U9"},
        "read": {"watermark": 1_700_000_000_000_i64}
    });
    match MessagingEvent::from_event(&event) {
        MessagingEvent::Read {
            external_user_id,
            watermark_ms,
        } => {
            assert_eq!(external_user_id, "U9");
            assert_eq!(watermark_ms, 1_700_000_000_000);
        }
        other => panic!("expected Read, got {:?}", other),
    }
}

#[test]
fn unmapped_event_keys_are_unknown() {
    let event = json!({"sender": {"id": "U1"}, "reaction": {"emoji": "x"}});
    assert_eq!(MessagingEvent::from_event(&event), MessagingEvent::Unknown);
}
