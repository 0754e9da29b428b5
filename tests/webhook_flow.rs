mod common;

use common::{ScriptedReplyEngine, gateway_state, post_webhook};
use hubmirror::config::Config;
use hubmirror::mirror::{Platform, SenderType};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn messenger_payload(mid: &str, text: &str) -> serde_json::Value {
    json!({
        "object": "page",
        "entry": [{
            "id": "page-1",
            "messaging": [{
                "sender": {"id": "user-1"},
                "recipient": {"id": "page-1"},
                "message": {"mid": mid, "text": text}
            }]
        }]
    })
}

async fn messenger_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "recipient_id": "user-1",
            "message_id": "mid-out-1"
        })))
        .mount(&server)
        .await;
    server
}

fn facebook_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.webhook.verify_token = "sekrit".to_string();
    config.facebook.page_token = "page-token".to_string();
    config.facebook.page_id = "page-1".to_string();
    config.facebook.graph_base_url = server.uri();
    config
}

#[tokio::test]
async fn inbound_message_is_mirrored_answered_and_sent() {
    let tmp = TempDir::new().expect("create temp dir");
    let server = messenger_server().await;
    let reply = ScriptedReplyEngine::with_replies(vec!["Your order ships tomorrow."]);
    let state = gateway_state(&tmp, facebook_config(&server), reply.clone());

    let (status, body) = post_webhook(
        state.clone(),
        "facebook",
        &messenger_payload("m1", "where is my order?"),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, "EVENT_RECEIVED");

    let conversation = state
        .store
        .find_conversation(Platform::Facebook, "page-1", "user-1")
        .expect("find conversation")
        .expect("conversation created");
    let history = state.store.history(conversation.id, 10).expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sender_type, SenderType::Customer);
    assert_eq!(history[0].text, "where is my order?");
    assert_eq!(history[1].sender_type, SenderType::Bot);
    assert_eq!(history[1].text, "Your order ships tomorrow.");
    assert!(history[1].is_sent);
    assert_eq!(history[1].message_id.as_deref(), Some("mid-out-1"));

    // The engine saw the message text and an empty prior history
    let requests = reply.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].text, "where is my order?");
    assert!(requests[0].history.is_empty());
    assert_eq!(requests[0].owner_id, "page-1");
}

#[tokio::test]
async fn second_message_carries_prior_history() {
    let tmp = TempDir::new().expect("create temp dir");
    let server = messenger_server().await;
    let reply = ScriptedReplyEngine::with_replies(vec!["Hello!", "It ships tomorrow."]);
    let state = gateway_state(&tmp, facebook_config(&server), reply.clone());

    post_webhook(state.clone(), "facebook", &messenger_payload("m1", "hi")).await;
    post_webhook(
        state.clone(),
        "facebook",
        &messenger_payload("m2", "and my order?"),
    )
    .await;

    let requests = reply.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    // Second request sees the first exchange, oldest first
    let history = &requests[1].history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, "user");
    assert_eq!(history[0].content, "hi");
    assert_eq!(history[1].role, "assistant");
    assert_eq!(history[1].content, "Hello!");
}

#[tokio::test]
async fn redelivered_webhook_produces_no_second_reply() {
    let tmp = TempDir::new().expect("create temp dir");
    let server = messenger_server().await;
    let reply = ScriptedReplyEngine::with_replies(vec!["Hello!", "never sent"]);
    let state = gateway_state(&tmp, facebook_config(&server), reply.clone());

    let payload = messenger_payload("m1", "hi");
    post_webhook(state.clone(), "facebook", &payload).await;
    post_webhook(state.clone(), "facebook", &payload).await;

    let conversation = state
        .store
        .find_conversation(Platform::Facebook, "page-1", "user-1")
        .expect("find conversation")
        .expect("conversation created");
    assert_eq!(state.store.message_count(conversation.id).expect("count"), 2);
    assert_eq!(reply.request_count(), 1);
}

#[tokio::test]
async fn platform_send_rejection_keeps_unsent_row() {
    let tmp = TempDir::new().expect("create temp dir");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/me/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "user unreachable"}
        })))
        .mount(&server)
        .await;
    let reply = ScriptedReplyEngine::with_replies(vec!["Hello!"]);
    let state = gateway_state(&tmp, facebook_config(&server), reply);

    let (status, _) = post_webhook(state.clone(), "facebook", &messenger_payload("m1", "hi")).await;
    assert_eq!(status, 200);

    let conversation = state
        .store
        .find_conversation(Platform::Facebook, "page-1", "user-1")
        .expect("find conversation")
        .expect("conversation created");
    let history = state.store.history(conversation.id, 10).expect("history");
    assert_eq!(history.len(), 2);
    assert!(!history[1].is_sent);
    assert_eq!(history[1].message_id, None);
}

#[tokio::test]
async fn disabled_bot_conversation_gets_no_reply() {
    let tmp = TempDir::new().expect("create temp dir");
    let server = messenger_server().await;
    let reply = ScriptedReplyEngine::with_replies(vec!["never sent"]);
    let state = gateway_state(&tmp, facebook_config(&server), reply.clone());

    let conversation = state
        .store
        .get_or_create_conversation(Platform::Facebook, "page-1", "user-1", None)
        .expect("seed conversation");
    state
        .store
        .set_bot_active(conversation.id, false)
        .expect("disable bot");

    post_webhook(
        state.clone(),
        "facebook",
        &messenger_payload("m1", "human please"),
    )
    .await;

    assert_eq!(state.store.message_count(conversation.id).expect("count"), 1);
    assert_eq!(reply.request_count(), 0);
}

#[tokio::test]
async fn send_request_body_matches_messenger_shape() {
    let tmp = TempDir::new().expect("create temp dir");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/me/messages"))
        .and(body_partial_json(json!({
            "recipient": {"id": "user-1"},
            "messaging_type": "RESPONSE",
            "message": {"text": "Hello!"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message_id": "mid-out-1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let reply = ScriptedReplyEngine::with_replies(vec!["Hello!"]);
    let state = gateway_state(&tmp, facebook_config(&server), reply);

    post_webhook(state.clone(), "facebook", &messenger_payload("m1", "hi")).await;
    server.verify().await;
}
