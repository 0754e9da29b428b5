//! Webhook gateway.
//!
//! One HTTP surface for every platform: `GET /webhook/{platform}` answers
//! the subscription handshake, `POST /webhook/{platform}` ingests events.
//! The POST path has a single contract with upstream providers: respond
//! `200 EVENT_RECEIVED` no matter what happened inside, because any other
//! status triggers redelivery storms and, eventually, subscription
//! suspension. All processing failures are logged and swallowed here, at
//! the top, and nowhere else.

use crate::config::Config;
use crate::dispatch::{
    FeedContext, FeedRegistry, MessagingContext, SendApiFactory, WhatsAppContext,
    dispatch_messaging_event, dispatch_whatsapp, feed,
};
use crate::events::{FeedChange, tiktok};
use crate::live::LiveFeed;
use crate::mirror::{MirrorStore, Platform};
use crate::platforms::{FacebookClient, GraphApi, SendApi, WhatsAppClient, default_http_client};
use crate::reply::ReplyEngine;
use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

pub struct GatewayState {
    pub config: Config,
    pub store: Arc<MirrorStore>,
    pub registry: Arc<FeedRegistry>,
    pub reply: Arc<dyn ReplyEngine>,
    pub live: LiveFeed,
    pub client: reqwest::Client,
}

impl GatewayState {
    pub fn new(config: Config, store: Arc<MirrorStore>, reply: Arc<dyn ReplyEngine>) -> Self {
        Self {
            config,
            store,
            registry: Arc::new(FeedRegistry::builtin()),
            reply,
            live: LiveFeed::default(),
            client: default_http_client(),
        }
    }
}

const WEBHOOK_MAX_BODY: usize = 1_048_576;

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/webhook/{platform}", get(verify_webhook).post(receive_webhook))
        .layer(DefaultBodyLimit::max(WEBHOOK_MAX_BODY))
        .with_state(state)
}

/// Bind and serve until the process is told to stop.
pub async fn start(state: Arc<GatewayState>) -> Result<()> {
    let addr = format!(
        "{}:{}",
        state.config.gateway.host, state.config.gateway.port
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("webhook gateway listening on {}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Subscription handshake: echo the challenge when the verify token
/// matches, refuse otherwise.
async fn verify_webhook(
    State(state): State<Arc<GatewayState>>,
    Path(platform): Path<String>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    let expected = &state.config.webhook.verify_token;
    let token_ok = !expected.is_empty()
        && params.verify_token.as_deref() == Some(expected.as_str())
        && params.mode.as_deref() == Some("subscribe");
    if token_ok {
        info!("webhook verification succeeded for {}", platform);
        (StatusCode::OK, params.challenge.unwrap_or_default())
    } else {
        warn!("webhook verification failed for {}", platform);
        (StatusCode::FORBIDDEN, String::new())
    }
}

/// The always-200 ingest endpoint. This is the only place where processing
/// errors are allowed to die.
async fn receive_webhook(
    State(state): State<Arc<GatewayState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if body.len() > WEBHOOK_MAX_BODY {
        warn!("webhook body for {} too large ({} bytes), dropping", platform, body.len());
        return (StatusCode::OK, "EVENT_RECEIVED");
    }
    if let Err(e) = process_webhook(&state, &platform, &headers, &body).await {
        let transient = e
            .downcast_ref::<crate::errors::MirrorError>()
            .is_some_and(crate::errors::MirrorError::is_transient);
        if transient {
            warn!(
                "webhook processing for {} hit a transient failure, relying on redelivery: {:#}",
                platform, e
            );
        } else {
            warn!("webhook processing for {} failed, dropping: {:#}", platform, e);
        }
    }
    (StatusCode::OK, "EVENT_RECEIVED")
}

async fn process_webhook(
    state: &GatewayState,
    platform: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<()> {
    let payload: Value = serde_json::from_slice(body).context("unparseable webhook body")?;
    match platform {
        "facebook" => process_meta(state, Platform::Facebook, &payload).await,
        "instagram" => process_meta(state, Platform::Instagram, &payload).await,
        "tiktok" => process_tiktok(state, headers, body, &payload).await,
        "whatsapp" => process_whatsapp(state, &payload).await,
        other => {
            warn!("webhook for unknown platform {:?}, dropping", other);
            Ok(())
        }
    }
}

// ---- Facebook / Instagram ----

fn graph_client(state: &GatewayState) -> Option<Arc<dyn GraphApi>> {
    let fb = &state.config.facebook;
    if fb.page_token.is_empty() {
        return None;
    }
    Some(Arc::new(FacebookClient::new(
        state.client.clone(),
        fb.graph_base_url.clone(),
        fb.page_token.clone(),
    )))
}

async fn process_meta(state: &GatewayState, platform: Platform, payload: &Value) -> Result<()> {
    let entries = payload.get("entry").and_then(Value::as_array);
    for entry in entries.into_iter().flatten() {
        let page_id = entry
            .get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        for change in entry
            .get("changes")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if change.get("field").and_then(Value::as_str) != Some("feed") {
                debug!("non-feed change, ignoring");
                continue;
            }
            let ctx = FeedContext {
                store: state.store.clone(),
                graph: graph_client(state),
                platform,
                page_id: page_id.clone(),
            };
            state
                .registry
                .dispatch(&ctx, FeedChange::from_change(change))
                .await;
        }

        if let Some(events) = entry.get("messaging").and_then(Value::as_array) {
            let account_id = page_id
                .clone()
                .unwrap_or_else(|| state.config.facebook.page_id.clone());
            let owner_id = if state.config.facebook.page_id.is_empty() {
                account_id.clone()
            } else {
                state.config.facebook.page_id.clone()
            };
            let fb = &state.config.facebook;
            let send: Arc<dyn SendApi> = Arc::new(FacebookClient::new(
                state.client.clone(),
                fb.graph_base_url.clone(),
                fb.page_token.clone(),
            ));
            let ctx = MessagingContext {
                store: state.store.clone(),
                send,
                reply: state.reply.clone(),
                live: state.live.clone(),
                platform,
                account_id,
                owner_id,
                history_limit: state.config.reply.history_limit,
            };
            for event in events {
                if let Err(e) = dispatch_messaging_event(&ctx, event).await {
                    warn!("messaging event failed, dropping: {:#}", e);
                }
            }
        }
    }
    Ok(())
}

// ---- TikTok ----

/// Constant-time check of the TikTok callback signature. Skipped when no
/// client secret is configured.
fn tiktok_signature_ok(secret: &str, body: &[u8], headers: &HeaderMap) -> bool {
    if secret.is_empty() {
        return true;
    }
    let Some(signature) = headers
        .get("x-tiktok-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    // Support both raw hex and a "sha256=..." prefix
    let sig = signature.trim();
    let sig = sig.strip_prefix("sha256=").unwrap_or(sig);
    expected.as_bytes().ct_eq(sig.as_bytes()).into()
}

async fn process_tiktok(
    state: &GatewayState,
    headers: &HeaderMap,
    body: &[u8],
    payload: &Value,
) -> Result<()> {
    if !tiktok_signature_ok(&state.config.tiktok.client_secret, body, headers) {
        warn!("tiktok callback signature mismatch, dropping");
        return Ok(());
    }
    let ctx = FeedContext {
        store: state.store.clone(),
        graph: None,
        platform: Platform::Tiktok,
        page_id: None,
    };
    feed::handle_tiktok(&ctx, tiktok::classify(payload)).await
}

// ---- WhatsApp ----

/// Builds a send client bound to one business phone number per request.
struct WhatsAppSenderFactory {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl SendApiFactory for WhatsAppSenderFactory {
    fn for_phone_number(&self, phone_number_id: &str) -> Arc<dyn SendApi> {
        Arc::new(WhatsAppClient::new(
            self.client.clone(),
            self.base_url.clone(),
            self.access_token.clone(),
            phone_number_id,
        ))
    }
}

async fn process_whatsapp(state: &GatewayState, payload: &Value) -> Result<()> {
    let wa = &state.config.whatsapp;
    let ctx = WhatsAppContext {
        store: state.store.clone(),
        senders: Arc::new(WhatsAppSenderFactory {
            client: state.client.clone(),
            base_url: wa.base_url.clone(),
            access_token: wa.access_token.clone(),
        }),
        reply: state.reply.clone(),
        live: state.live.clone(),
        history_limit: state.config.reply.history_limit,
    };
    dispatch_whatsapp(&ctx, payload).await
}
