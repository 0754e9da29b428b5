//! Feed event handlers: comments, reactions, and post lifecycle, all
//! written as idempotent upserts keyed by external ids so that redelivered
//! or reordered webhook batches converge on the same local state.

use super::FeedContext;
use crate::events::Verb;
use crate::events::tiktok::TikTokEvent;
use crate::mirror::{PostIdEntry, SocialPost};
use anyhow::Result;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info, warn};

fn str_of<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn from_of(value: &Value) -> (String, String) {
    (
        value
            .pointer("/from/id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        value
            .pointer("/from/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    )
}

/// A comment event is a reply when its parent is another comment rather
/// than the post itself.
fn is_reply(value: &Value) -> bool {
    let parent_id = str_of(value, "parent_id");
    !parent_id.is_empty() && parent_id != str_of(value, "post_id")
}

/// Look the post up by external id; on a miss, fetch the full post from the
/// platform and create the local mirror row, attaching any media found in
/// the attachments. Returns `None` when the post cannot be resolved — no
/// page context, no content API, or the upstream fetch failed — in which
/// case the caller drops the whole event (the provider will redeliver).
pub async fn get_or_create_post(
    ctx: &FeedContext,
    external_post_id: &str,
) -> Result<Option<SocialPost>> {
    if external_post_id.is_empty() {
        warn!("feed event without post_id, dropping");
        return Ok(None);
    }
    if let Some(post) = ctx.store.find_post_by_external_id(external_post_id)? {
        return Ok(Some(post));
    }

    let (Some(graph), Some(_page_id)) = (&ctx.graph, &ctx.page_id) else {
        warn!(
            "post {} unknown and no page context to bootstrap from, dropping event",
            external_post_id
        );
        return Ok(None);
    };

    let details = match graph.fetch_post(external_post_id).await {
        Ok(details) => details,
        Err(e) => {
            warn!(
                "could not resolve post {} from platform, dropping event: {:#}",
                external_post_id, e
            );
            return Ok(None);
        }
    };

    let entry = PostIdEntry {
        platform: ctx.platform.as_str().to_string(),
        post_id: vec![external_post_id.to_string()],
        status: "published".to_string(),
    };
    let author = if details.author_name.is_empty() {
        details.author_id.clone()
    } else {
        details.author_name.clone()
    };
    let id = ctx.store.create_post(
        &author,
        &details.caption,
        &[entry],
        true,
        details.created_time,
    )?;
    ctx.store.attach_media(id, &details.media_urls)?;
    info!("mirrored post {} as local post {}", external_post_id, id);
    ctx.store.get_post(id)
}

/// Idempotent refresh of an already-mirrored post: write only the fields
/// that differ from the fetched state, and only touch media when none is
/// recorded yet — a status-update webhook must not re-download anything.
async fn sync_post_from_platform(ctx: &FeedContext, post: &SocialPost, external_id: &str) -> Result<()> {
    let Some(graph) = &ctx.graph else {
        return Ok(());
    };
    let details = match graph.fetch_post(external_id).await {
        Ok(details) => details,
        Err(e) => {
            warn!("post sync fetch for {} failed, skipping: {:#}", external_id, e);
            return Ok(());
        }
    };

    let caption = (details.caption != post.caption).then_some(details.caption.as_str());
    let published_at = details
        .created_time
        .filter(|fetched| post.published_at.as_ref() != Some(fetched));
    if caption.is_some() || published_at.is_some() {
        ctx.store.update_post_fields(post.id, caption, published_at)?;
    }
    if ctx.store.media_count(post.id)? == 0 {
        ctx.store.attach_media(post.id, &details.media_urls)?;
    }
    Ok(())
}

// ---- comment handlers ----

pub fn comment_add<'a>(ctx: &'a FeedContext, value: &'a Value) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let comment_id = str_of(value, "comment_id");
        if comment_id.is_empty() {
            warn!("comment add without comment_id, dropping");
            return Ok(());
        }
        let (commenter_id, commenter_name) = from_of(value);
        let text = str_of(value, "message");

        if is_reply(value) {
            let created = ctx.store.create_sub_comment(
                str_of(value, "parent_id"),
                comment_id,
                text,
                &commenter_id,
                &commenter_name,
            )?;
            if !created {
                debug!("comment reply {} already mirrored or parent unknown", comment_id);
            }
            return Ok(());
        }

        let Some(post) = get_or_create_post(ctx, str_of(value, "post_id")).await? else {
            return Ok(());
        };
        let created = ctx.store.create_comment(
            post.id,
            comment_id,
            text,
            &commenter_id,
            &commenter_name,
            ctx.platform,
            &[],
        )?;
        if !created {
            debug!("comment {} already mirrored, redelivery ignored", comment_id);
        }
        Ok(())
    })
}

pub fn comment_update<'a>(ctx: &'a FeedContext, value: &'a Value) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let comment_id = str_of(value, "comment_id");
        let text = str_of(value, "message");
        // Unknown ids are silent no-ops: the event may reference a comment
        // received before the post existed locally. External comment ids are
        // scoped by their post (or parent), never global.
        let updated = if is_reply(value) {
            ctx.store
                .update_sub_comment(str_of(value, "parent_id"), comment_id, text)?
        } else {
            match ctx.store.find_post_by_external_id(str_of(value, "post_id"))? {
                Some(post) => ctx.store.update_comment(post.id, comment_id, text)?,
                None => false,
            }
        };
        if !updated {
            debug!("update for unknown comment {}, ignoring", comment_id);
        }
        Ok(())
    })
}

pub fn comment_delete<'a>(ctx: &'a FeedContext, value: &'a Value) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let comment_id = str_of(value, "comment_id");
        let deleted = if is_reply(value) {
            ctx.store
                .delete_sub_comment(str_of(value, "parent_id"), comment_id)?
        } else {
            match ctx.store.find_post_by_external_id(str_of(value, "post_id"))? {
                Some(post) => ctx.store.delete_comment(post.id, comment_id)?,
                None => false,
            }
        };
        if !deleted {
            debug!("delete for unknown comment {}, ignoring", comment_id);
        }
        Ok(())
    })
}

// ---- reaction handlers ----

pub fn reaction_add<'a>(ctx: &'a FeedContext, value: &'a Value) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let (reactor_id, reactor_name) = from_of(value);
        if reactor_id.is_empty() {
            warn!("reaction add without reactor identity, dropping");
            return Ok(());
        }
        let Some(post) = get_or_create_post(ctx, str_of(value, "post_id")).await? else {
            return Ok(());
        };
        let reaction_type = match str_of(value, "reaction_type") {
            "" => "LIKE",
            t => t,
        };
        ctx.store
            .create_reaction(post.id, &reactor_id, &reactor_name, reaction_type)?;
        Ok(())
    })
}

pub fn reaction_update<'a>(ctx: &'a FeedContext, value: &'a Value) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let (reactor_id, _) = from_of(value);
        // Update never bootstraps: without an existing post and reaction row
        // there is nothing to mutate and the event is dropped.
        let Some(post) = ctx
            .store
            .find_post_by_external_id(str_of(value, "post_id"))?
        else {
            debug!("reaction update for unknown post, ignoring");
            return Ok(());
        };
        if ctx
            .store
            .update_reaction(post.id, str_of(value, "reaction_type"), &reactor_id)?
            .is_none()
        {
            debug!(
                "reaction update for {} without prior create, ignoring",
                reactor_id
            );
        }
        Ok(())
    })
}

pub fn reaction_delete<'a>(ctx: &'a FeedContext, value: &'a Value) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let (reactor_id, _) = from_of(value);
        if let Some(post) = ctx
            .store
            .find_post_by_external_id(str_of(value, "post_id"))?
        {
            ctx.store.delete_reaction(post.id, &reactor_id)?;
        }
        Ok(())
    })
}

// ---- post lifecycle handlers ----

pub fn post_change<'a>(ctx: &'a FeedContext, value: &'a Value) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let external_id = str_of(value, "post_id");
        match ctx.store.find_post_by_external_id(external_id)? {
            Some(post) => sync_post_from_platform(ctx, &post, external_id).await,
            None => {
                get_or_create_post(ctx, external_id).await?;
                Ok(())
            }
        }
    })
}

pub fn post_delete<'a>(ctx: &'a FeedContext, value: &'a Value) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let external_id = str_of(value, "post_id");
        if let Some(post) = ctx.store.find_post_by_external_id(external_id)? {
            ctx.store.delete_post(post.id)?;
            info!("post {} deleted upstream, local mirror removed", external_id);
        }
        Ok(())
    })
}

// ---- TikTok ----

/// TikTok videos have no content API to bootstrap from; first reference
/// creates a stub post carrying just the external id.
fn ensure_tiktok_post(ctx: &FeedContext, video_id: &str) -> Result<Option<i64>> {
    if video_id.is_empty() {
        warn!("tiktok event without video_id, dropping");
        return Ok(None);
    }
    if let Some(post) = ctx.store.find_post_by_external_id(video_id)? {
        return Ok(Some(post.id));
    }
    let id = ctx.store.create_post(
        "",
        "",
        &[PostIdEntry {
            platform: "tiktok".to_string(),
            post_id: vec![video_id.to_string()],
            status: "published".to_string(),
        }],
        true,
        None,
    )?;
    Ok(Some(id))
}

/// Apply a classified TikTok event to the mirror. Same idempotency rules as
/// the feed registry handlers.
pub async fn handle_tiktok(ctx: &FeedContext, event: TikTokEvent) -> Result<()> {
    match event {
        TikTokEvent::Comment {
            action,
            comment_id,
            video_id,
            text,
            user_id,
            user_name,
        } => match action {
            Verb::Add => {
                let Some(post_id) = ensure_tiktok_post(ctx, &video_id)? else {
                    return Ok(());
                };
                ctx.store.create_comment(
                    post_id,
                    &comment_id,
                    &text,
                    &user_id,
                    &user_name,
                    ctx.platform,
                    &[],
                )?;
                Ok(())
            }
            Verb::Update => {
                if let Some(post) = ctx.store.find_post_by_external_id(&video_id)? {
                    ctx.store.update_comment(post.id, &comment_id, &text)?;
                }
                Ok(())
            }
            Verb::Delete => {
                if let Some(post) = ctx.store.find_post_by_external_id(&video_id)? {
                    ctx.store.delete_comment(post.id, &comment_id)?;
                }
                Ok(())
            }
            Verb::Unknown => Ok(()),
        },
        TikTokEvent::Reaction {
            action,
            video_id,
            user_id,
            reaction_type,
        } => match action {
            Verb::Add => {
                let Some(post_id) = ensure_tiktok_post(ctx, &video_id)? else {
                    return Ok(());
                };
                ctx.store
                    .create_reaction(post_id, &user_id, "", &reaction_type)?;
                Ok(())
            }
            Verb::Update => {
                if let Some(post) = ctx.store.find_post_by_external_id(&video_id)? {
                    ctx.store
                        .update_reaction(post.id, &reaction_type, &user_id)?;
                }
                Ok(())
            }
            Verb::Delete => {
                if let Some(post) = ctx.store.find_post_by_external_id(&video_id)? {
                    ctx.store.delete_reaction(post.id, &user_id)?;
                }
                Ok(())
            }
            Verb::Unknown => Ok(()),
        },
        TikTokEvent::Unknown => {
            debug!("unclassifiable tiktok event, ignoring");
            Ok(())
        }
    }
}
