//! Chat-side dispatch: Messenger-style `messaging[]` events for
//! Facebook/Instagram and the WhatsApp Cloud API value shape. Both paths
//! share the reply flow: persist the inbound message, fan it out to live
//! viewers, and when the conversation has its bot enabled, run the reply
//! engine and send the answer back through the platform.

use crate::events::MessagingEvent;
use crate::live::LiveFeed;
use crate::mirror::{Conversation, MirrorStore, Platform, SenderType};
use crate::platforms::{SendApi, SendReceipt};
use crate::reply::{ReplyEngine, ReplyRequest, build_history};
use anyhow::Result;
use chrono::DateTime;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-page dispatch state for Facebook/Instagram messaging events.
pub struct MessagingContext {
    pub store: Arc<MirrorStore>,
    pub send: Arc<dyn SendApi>,
    pub reply: Arc<dyn ReplyEngine>,
    pub live: LiveFeed,
    pub platform: Platform,
    /// The page or business account the webhook entry belongs to.
    pub account_id: String,
    pub owner_id: String,
    pub history_limit: usize,
}

/// Handle one raw `messaging[]` entry. Never bubbles platform noise: an
/// unparseable or unknown event is logged and dropped.
pub async fn dispatch_messaging_event(ctx: &MessagingContext, event: &Value) -> Result<()> {
    match MessagingEvent::from_event(event) {
        MessagingEvent::Text {
            sender_id,
            message_id,
            text,
            attachments,
            is_echo,
        } => {
            if is_echo {
                debug!("echo of our own message, ignoring");
                return Ok(());
            }
            handle_inbound_text(ctx, &sender_id, None, message_id.as_deref(), &text, &attachments)
                .await
        }
        MessagingEvent::Postback { sender_id, text } => {
            // A button press reads like a customer message with no
            // platform-native id, so it can never dedup against anything.
            handle_inbound_text(ctx, &sender_id, None, None, &text, &[]).await
        }
        MessagingEvent::Delivery {
            external_user_id,
            message_ids,
        } => {
            let Some(conversation) =
                ctx.store
                    .find_conversation(ctx.platform, &ctx.account_id, &external_user_id)?
            else {
                warn!(
                    "delivery receipt for unknown conversation with {}, ignoring",
                    external_user_id
                );
                return Ok(());
            };
            ctx.store.mark_delivered(conversation.id, &message_ids)?;
            Ok(())
        }
        MessagingEvent::Read {
            external_user_id,
            watermark_ms,
        } => {
            let Some(conversation) =
                ctx.store
                    .find_conversation(ctx.platform, &ctx.account_id, &external_user_id)?
            else {
                warn!(
                    "read receipt for unknown conversation with {}, ignoring",
                    external_user_id
                );
                return Ok(());
            };
            let Some(watermark) = DateTime::from_timestamp_millis(watermark_ms) else {
                warn!("read receipt with unusable watermark {}", watermark_ms);
                return Ok(());
            };
            ctx.store.mark_read_up_to(conversation.id, watermark)?;
            Ok(())
        }
        MessagingEvent::Unknown => {
            debug!("unrecognized messaging event shape, ignoring");
            Ok(())
        }
    }
}

async fn handle_inbound_text(
    ctx: &MessagingContext,
    sender_id: &str,
    sender_name: Option<&str>,
    message_id: Option<&str>,
    text: &str,
    attachments: &[Value],
) -> Result<()> {
    if sender_id.is_empty() {
        warn!("inbound message without sender id, dropping");
        return Ok(());
    }
    let conversation =
        ctx.store
            .get_or_create_conversation(ctx.platform, &ctx.account_id, sender_id, sender_name)?;
    let Some(row_id) =
        ctx.store
            .insert_customer_message(conversation.id, text, attachments, message_id)?
    else {
        debug!("message {:?} already mirrored, redelivery ignored", message_id);
        return Ok(());
    };
    ctx.live
        .broadcast(conversation.id, SenderType::Customer, text, attachments);

    attempt_bot_reply(
        &ctx.store,
        ctx.send.as_ref(),
        ctx.reply.as_ref(),
        &ctx.live,
        &conversation,
        row_id,
        text,
        attachments,
        &ctx.owner_id,
        ctx.history_limit,
    )
    .await
}

/// Run the reply engine for one just-stored inbound message and send the
/// answer back. All failure modes end the flow quietly: the customer
/// message is already mirrored, and the provider-facing response must not
/// depend on the bot.
#[allow(clippy::too_many_arguments)]
async fn attempt_bot_reply(
    store: &MirrorStore,
    send: &dyn SendApi,
    engine: &dyn ReplyEngine,
    live: &LiveFeed,
    conversation: &Conversation,
    inbound_row: i64,
    text: &str,
    attachments: &[Value],
    owner_id: &str,
    history_limit: usize,
) -> Result<()> {
    if !conversation.is_bot_active {
        debug!("bot disabled on conversation {}, not replying", conversation.id);
        return Ok(());
    }
    // Only textual messages reach the engine. Attachment-only payloads
    // are mirrored and fanned out, nothing more.
    if text.trim().is_empty() {
        return Ok(());
    }

    // The current message goes in the request itself, not the history.
    let prior: Vec<_> = store
        .history(conversation.id, history_limit)?
        .into_iter()
        .filter(|message| message.id != inbound_row)
        .collect();
    let outcome = match engine
        .reply(ReplyRequest {
            text: text.to_string(),
            history: build_history(&prior),
            attachments: attachments.to_vec(),
            owner_id: owner_id.to_string(),
            platform: conversation.platform,
        })
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(
                "reply engine failed for conversation {}: {:#}",
                conversation.id, e
            );
            return Ok(());
        }
    };
    if !outcome.should_send() {
        debug!("reply engine returned nothing to send");
        return Ok(());
    }

    let receipt = match send
        .send_text(&conversation.external_user_id, &outcome.reply)
        .await
    {
        Ok(receipt) => receipt,
        Err(e) => {
            warn!(
                "send to {} failed: {:#}",
                conversation.external_user_id, e
            );
            SendReceipt::default()
        }
    };
    // A failed send still gets a row, marked not-sent.
    store.insert_outbound_message(
        conversation.id,
        SenderType::Bot,
        &outcome.reply,
        receipt.message_id.as_deref(),
        receipt.success,
    )?;
    live.broadcast(conversation.id, SenderType::Bot, &outcome.reply, &[]);
    Ok(())
}

// ---- WhatsApp ----

/// Hands out a send client bound to one business phone number. WhatsApp
/// sends go through per-number endpoints, unlike the page-wide Messenger
/// send API.
pub trait SendApiFactory: Send + Sync {
    fn for_phone_number(&self, phone_number_id: &str) -> Arc<dyn SendApi>;
}

pub struct WhatsAppContext {
    pub store: Arc<MirrorStore>,
    pub senders: Arc<dyn SendApiFactory>,
    pub reply: Arc<dyn ReplyEngine>,
    pub live: LiveFeed,
    pub history_limit: usize,
}

/// Walk a WhatsApp Cloud API webhook payload: `entry[].changes[].value`.
/// Each value is routed by `metadata.phone_number_id` to its registered
/// business account; a value for an unregistered number is dropped whole,
/// before any write.
pub async fn dispatch_whatsapp(ctx: &WhatsAppContext, payload: &Value) -> Result<()> {
    let entries = payload.get("entry").and_then(Value::as_array);
    for entry in entries.into_iter().flatten() {
        let changes = entry.get("changes").and_then(Value::as_array);
        for change in changes.into_iter().flatten() {
            let Some(value) = change.get("value") else {
                continue;
            };
            if let Err(e) = dispatch_whatsapp_value(ctx, value).await {
                warn!("whatsapp change failed, dropping: {:#}", e);
            }
        }
    }
    Ok(())
}

async fn dispatch_whatsapp_value(ctx: &WhatsAppContext, value: &Value) -> Result<()> {
    let phone_number_id = value
        .pointer("/metadata/phone_number_id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let Some(waba) = ctx.store.find_waba_by_phone_number_id(phone_number_id)? else {
        warn!(
            "webhook for unregistered phone_number_id {:?}, dropping",
            phone_number_id
        );
        return Ok(());
    };

    // wa_id -> profile name, used to label new conversations
    let mut contact_names: HashMap<&str, &str> = HashMap::new();
    for contact in value
        .get("contacts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if let (Some(wa_id), Some(name)) = (
            contact.get("wa_id").and_then(Value::as_str),
            contact.pointer("/profile/name").and_then(Value::as_str),
        ) {
            contact_names.insert(wa_id, name);
        }
    }

    // Status receipts first, so a read watermark delivered in the same
    // batch as new messages applies only to what preceded them.
    for status in value
        .get("statuses")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        handle_whatsapp_status(ctx, &waba.phone_number_id, status)?;
    }

    for message in value
        .get("messages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        handle_whatsapp_message(ctx, &waba, &contact_names, message).await?;
    }
    Ok(())
}

fn handle_whatsapp_status(
    ctx: &WhatsAppContext,
    phone_number_id: &str,
    status: &Value,
) -> Result<()> {
    let recipient_id = status
        .get("recipient_id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let Some(conversation) =
        ctx.store
            .find_conversation(Platform::Whatsapp, phone_number_id, recipient_id)?
    else {
        debug!("status receipt for unknown conversation with {}", recipient_id);
        return Ok(());
    };

    let message_id = status.get("id").and_then(Value::as_str).unwrap_or_default();
    match status.get("status").and_then(Value::as_str) {
        Some("sent") | Some("delivered") => {
            ctx.store
                .mark_delivered(conversation.id, &[message_id.to_string()])?;
        }
        Some("read") => {
            ctx.store
                .mark_delivered(conversation.id, &[message_id.to_string()])?;
            // Status timestamps are epoch seconds.
            let watermark = status
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0));
            if let Some(watermark) = watermark {
                ctx.store.mark_read_up_to(conversation.id, watermark)?;
            }
        }
        other => {
            debug!("whatsapp status {:?} ignored", other);
        }
    }
    Ok(())
}

async fn handle_whatsapp_message(
    ctx: &WhatsAppContext,
    waba: &crate::mirror::WabaAccount,
    contact_names: &HashMap<&str, &str>,
    message: &Value,
) -> Result<()> {
    let from = message.get("from").and_then(Value::as_str).unwrap_or_default();
    if from.is_empty() {
        warn!("whatsapp message without sender, dropping");
        return Ok(());
    }
    let message_id = message.get("id").and_then(Value::as_str);

    // Text body for text messages; anything else (image, audio, location,
    // ...) rides along as an opaque attachment payload.
    let text = message
        .pointer("/text/body")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let attachments: Vec<Value> = if text.is_empty() {
        vec![message.clone()]
    } else {
        Vec::new()
    };

    let conversation = ctx.store.get_or_create_conversation(
        Platform::Whatsapp,
        &waba.phone_number_id,
        from,
        contact_names.get(from).copied(),
    )?;
    let Some(row_id) =
        ctx.store
            .insert_customer_message(conversation.id, text, &attachments, message_id)?
    else {
        debug!("whatsapp message {:?} already mirrored", message_id);
        return Ok(());
    };
    ctx.live
        .broadcast(conversation.id, SenderType::Customer, text, &attachments);

    let send = ctx.senders.for_phone_number(&waba.phone_number_id);
    attempt_bot_reply(
        &ctx.store,
        send.as_ref(),
        ctx.reply.as_ref(),
        &ctx.live,
        &conversation,
        row_id,
        text,
        &attachments,
        &waba.owner_id,
        ctx.history_limit,
    )
    .await
}
