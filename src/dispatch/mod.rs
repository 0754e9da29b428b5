pub mod feed;
pub mod messaging;

pub use messaging::{
    MessagingContext, SendApiFactory, WhatsAppContext, dispatch_messaging_event, dispatch_whatsapp,
};

use crate::events::{FeedChange, FeedItem, Verb};
use crate::mirror::{MirrorStore, Platform};
use crate::platforms::GraphApi;
use anyhow::Result;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a feed handler needs: the mirror, the upstream content API
/// for on-demand post bootstrap, and which platform/page the event belongs
/// to. `page_id` is `None` when the payload carries no page context — post
/// bootstrap is then impossible and dependent events are dropped.
pub struct FeedContext {
    pub store: Arc<MirrorStore>,
    pub graph: Option<Arc<dyn GraphApi>>,
    pub platform: Platform,
    pub page_id: Option<String>,
}

pub type FeedHandler = for<'a> fn(&'a FeedContext, &'a Value) -> BoxFuture<'a, Result<()>>;

/// Routing table from `(item, verb)` to a handler. Built once at process
/// start and injected into the gateway state, so tests can swap handlers
/// without touching globals. Dispatch is total: pairs without an entry go
/// to a logging fallback, and handler errors are logged and dropped — the
/// webhook response never depends on them.
pub struct FeedRegistry {
    handlers: HashMap<(FeedItem, Verb), FeedHandler>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The production routing table.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(FeedItem::Comment, Verb::Add, feed::comment_add);
        registry.register(FeedItem::Comment, Verb::Update, feed::comment_update);
        registry.register(FeedItem::Comment, Verb::Delete, feed::comment_delete);
        registry.register(FeedItem::Reaction, Verb::Add, feed::reaction_add);
        registry.register(FeedItem::Reaction, Verb::Update, feed::reaction_update);
        registry.register(FeedItem::Reaction, Verb::Delete, feed::reaction_delete);
        for item in [FeedItem::Status, FeedItem::Photo, FeedItem::Video] {
            registry.register(item, Verb::Add, feed::post_change);
            registry.register(item, Verb::Update, feed::post_change);
            registry.register(item, Verb::Delete, feed::post_delete);
        }
        registry
    }

    pub fn register(&mut self, item: FeedItem, verb: Verb, handler: FeedHandler) {
        self.handlers.insert((item, verb), handler);
    }

    pub async fn dispatch(&self, ctx: &FeedContext, change: FeedChange) {
        match self.handlers.get(&(change.item, change.verb)) {
            Some(handler) => {
                if let Err(e) = handler(ctx, &change.value).await {
                    warn!(
                        "feed handler ({}, {}) failed, dropping event: {:#}",
                        change.item, change.verb, e
                    );
                }
            }
            None => handle_feed_unknown(&change),
        }
    }
}

impl Default for FeedRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Fallback for `(item, verb)` pairs with no handler: log and ignore.
fn handle_feed_unknown(change: &FeedChange) {
    debug!(
        "unhandled feed event ({}, {}), ignoring",
        change.item, change.verb
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_ctx(tmp: &TempDir) -> FeedContext {
        FeedContext {
            store: Arc::new(MirrorStore::new(tmp.path().join("m.db")).expect("store")),
            graph: None,
            platform: Platform::Facebook,
            page_id: None,
        }
    }

    fn noop<'a>(_ctx: &'a FeedContext, _value: &'a Value) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn failing<'a>(_ctx: &'a FeedContext, _value: &'a Value) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Err(anyhow::anyhow!("handler exploded")) })
    }

    #[tokio::test]
    async fn unknown_pair_routes_to_fallback() {
        let tmp = TempDir::new().expect("temp dir");
        let registry = FeedRegistry::builtin();
        // (Unknown, Unknown) has no entry; dispatch must not panic or error
        registry
            .dispatch(
                &test_ctx(&tmp),
                FeedChange {
                    item: FeedItem::Unknown,
                    verb: Verb::Unknown,
                    value: Value::Null,
                },
            )
            .await;
    }

    #[tokio::test]
    async fn handler_errors_are_swallowed() {
        let tmp = TempDir::new().expect("temp dir");
        let mut registry = FeedRegistry::new();
        registry.register(FeedItem::Comment, Verb::Add, failing);
        registry
            .dispatch(
                &test_ctx(&tmp),
                FeedChange {
                    item: FeedItem::Comment,
                    verb: Verb::Add,
                    value: Value::Null,
                },
            )
            .await;
    }

    #[tokio::test]
    async fn registered_handler_is_invoked_by_key() {
        let tmp = TempDir::new().expect("temp dir");
        let mut registry = FeedRegistry::new();
        registry.register(FeedItem::Reaction, Verb::Delete, noop);
        assert!(
            registry
                .handlers
                .contains_key(&(FeedItem::Reaction, Verb::Delete))
        );
        assert!(
            !registry
                .handlers
                .contains_key(&(FeedItem::Reaction, Verb::Add))
        );
    }

    #[test]
    fn builtin_covers_all_concrete_pairs() {
        let registry = FeedRegistry::builtin();
        for item in [
            FeedItem::Comment,
            FeedItem::Reaction,
            FeedItem::Status,
            FeedItem::Photo,
            FeedItem::Video,
        ] {
            for verb in [Verb::Add, Verb::Update, Verb::Delete] {
                assert!(
                    registry.handlers.contains_key(&(item, verb)),
                    "missing handler for ({}, {})",
                    item,
                    verb
                );
            }
        }
    }
}
