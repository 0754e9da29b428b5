//! Realtime fan-out to connected live-view clients (operators watching a
//! conversation). Push-only and best-effort: a send with no receivers, a
//! lagging receiver, or a closed channel must never block or fail
//! persistence.

use crate::mirror::SenderType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct LiveEvent {
    /// Unique per broadcast, so dashboards can dedup on reconnect.
    pub id: Uuid,
    pub conversation_id: i64,
    pub sender_type: SenderType,
    pub text: String,
    pub attachments: Vec<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct LiveFeed {
    tx: broadcast::Sender<LiveEvent>,
}

impl LiveFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }

    /// Fan a stored message out to any connected dashboards. The error from
    /// a receiver-less channel is deliberately ignored.
    pub fn broadcast(
        &self,
        conversation_id: i64,
        sender_type: SenderType,
        text: &str,
        attachments: &[Value],
    ) {
        let _ = self.tx.send(LiveEvent {
            id: Uuid::new_v4(),
            conversation_id,
            sender_type,
            text: text.to_string(),
            attachments: attachments.to_vec(),
            created_at: Utc::now(),
        });
    }
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new(256)
    }
}
