// Shared test helpers — not all items used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hubmirror::config::Config;
use hubmirror::gateway::{GatewayState, router};
use hubmirror::mirror::MirrorStore;
use hubmirror::reply::{ReplyEngine, ReplyOutcome, ReplyRequest};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

/// Reply engine scripted with a queue of outcomes; records every request
/// it was asked to answer. An empty queue yields the default (no-send)
/// outcome.
pub struct ScriptedReplyEngine {
    outcomes: Mutex<VecDeque<ReplyOutcome>>,
    pub requests: Arc<Mutex<Vec<ReplyRequest>>>,
}

impl ScriptedReplyEngine {
    pub fn with_replies(replies: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(
                replies
                    .into_iter()
                    .map(|reply| ReplyOutcome {
                        reply: reply.to_string(),
                        success: true,
                    })
                    .collect(),
            ),
            requests: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn silent() -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
            requests: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ReplyEngine for ScriptedReplyEngine {
    async fn reply(&self, request: ReplyRequest) -> anyhow::Result<ReplyOutcome> {
        self.requests.lock().unwrap().push(request);
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

pub fn gateway_state(
    tmp: &TempDir,
    config: Config,
    reply: Arc<dyn ReplyEngine>,
) -> Arc<GatewayState> {
    let store = Arc::new(MirrorStore::new(tmp.path().join("mirror.db")).expect("create store"));
    Arc::new(GatewayState::new(config, store, reply))
}

/// Deliver one webhook POST through the router, returning status and body.
pub async fn post_webhook(
    state: Arc<GatewayState>,
    platform: &str,
    payload: &Value,
) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri(format!("/webhook/{platform}"))
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build request");
    let response = router(state).oneshot(request).await.expect("route request");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, String::from_utf8_lossy(&bytes).into_owned())
}
