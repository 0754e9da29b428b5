//! SQLite-backed mirror store.
//!
//! Every write keyed by an external id is a single atomic statement backed
//! by a uniqueness constraint (`INSERT OR IGNORE` / `ON CONFLICT`), which is
//! the only concurrency control: upstream providers deliver at-least-once
//! and out of order, and the constraints make redelivery a no-op.

use super::{
    Comment, Conversation, Platform, PostIdEntry, Reaction, SenderType, SocialPost, StoredMessage,
    SubComment, WabaAccount, normalize_post_id_field,
};
use crate::errors::MirrorError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub struct MirrorStore {
    db_path: PathBuf,
}

impl MirrorStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store
            .ensure_schema()
            .map_err(|e| MirrorError::Store(format!("schema init failed: {e:#}")))?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;
             PRAGMA foreign_keys=ON;",
        )?;
        Ok(conn)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY,
                platform TEXT NOT NULL,
                account_id TEXT NOT NULL,
                external_user_id TEXT NOT NULL,
                external_username TEXT,
                is_bot_active INTEGER NOT NULL DEFAULT 1,
                last_message_at TEXT NOT NULL,
                UNIQUE (platform, account_id, external_user_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY,
                conversation_id INTEGER NOT NULL
                    REFERENCES conversations(id) ON DELETE CASCADE,
                sender_type TEXT NOT NULL,
                text TEXT NOT NULL,
                attachments TEXT NOT NULL DEFAULT '[]',
                message_id TEXT,
                is_sent INTEGER NOT NULL DEFAULT 0,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_dedup
                ON messages (conversation_id, message_id, sender_type)
                WHERE message_id IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages (conversation_id, created_at);

            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                author TEXT NOT NULL,
                caption TEXT NOT NULL DEFAULT '',
                post_ids TEXT NOT NULL DEFAULT '[]',
                is_published INTEGER NOT NULL DEFAULT 1,
                published_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS post_media (
                id INTEGER PRIMARY KEY,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                url TEXT NOT NULL,
                file_name TEXT NOT NULL,
                UNIQUE (post_id, file_name)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                comment_id TEXT NOT NULL,
                text TEXT NOT NULL DEFAULT '',
                commenter_id TEXT NOT NULL DEFAULT '',
                commenter_name TEXT NOT NULL DEFAULT '',
                platform TEXT NOT NULL,
                attachments TEXT NOT NULL DEFAULT '[]',
                reaction_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE (post_id, comment_id)
            );

            CREATE TABLE IF NOT EXISTS sub_comments (
                id INTEGER PRIMARY KEY,
                comment_id INTEGER NOT NULL
                    REFERENCES comments(id) ON DELETE CASCADE,
                sub_comment_id TEXT NOT NULL,
                text TEXT NOT NULL DEFAULT '',
                commenter_id TEXT NOT NULL DEFAULT '',
                commenter_name TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                UNIQUE (comment_id, sub_comment_id)
            );

            CREATE TABLE IF NOT EXISTS reactions (
                id INTEGER PRIMARY KEY,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                reactor_id TEXT NOT NULL,
                reactor_name TEXT NOT NULL DEFAULT '',
                reaction_type TEXT NOT NULL,
                UNIQUE (post_id, reactor_id)
            );

            CREATE TABLE IF NOT EXISTS waba_accounts (
                id INTEGER PRIMARY KEY,
                owner_id TEXT NOT NULL,
                waba_id TEXT NOT NULL,
                phone_number_id TEXT NOT NULL UNIQUE
            );",
        )?;
        Ok(())
    }

    // ---- conversations ----

    pub fn get_or_create_conversation(
        &self,
        platform: Platform,
        account_id: &str,
        external_user_id: &str,
        username: Option<&str>,
    ) -> Result<Conversation> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO conversations
                (platform, account_id, external_user_id, external_username, last_message_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (platform, account_id, external_user_id)
             DO UPDATE SET external_username = COALESCE(?4, external_username)",
            params![platform.as_str(), account_id, external_user_id, username, now],
        )?;
        let conversation = conn.query_row(
            "SELECT id, platform, account_id, external_user_id, external_username,
                    is_bot_active, last_message_at
             FROM conversations
             WHERE platform = ?1 AND account_id = ?2 AND external_user_id = ?3",
            params![platform.as_str(), account_id, external_user_id],
            conversation_from_row,
        )?;
        Ok(conversation)
    }

    pub fn find_conversation(
        &self,
        platform: Platform,
        account_id: &str,
        external_user_id: &str,
    ) -> Result<Option<Conversation>> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT id, platform, account_id, external_user_id, external_username,
                        is_bot_active, last_message_at
                 FROM conversations
                 WHERE platform = ?1 AND account_id = ?2 AND external_user_id = ?3",
                params![platform.as_str(), account_id, external_user_id],
                conversation_from_row,
            )
            .map(Some)
            .or_else(ignore_not_found)?;
        Ok(found)
    }

    pub fn set_bot_active(&self, conversation_id: i64, active: bool) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE conversations SET is_bot_active = ?2 WHERE id = ?1",
            params![conversation_id, active],
        )?;
        Ok(())
    }

    // ---- messages ----

    /// Store an inbound customer message, deduplicating on
    /// `(conversation, message_id, sender_type=customer)`. Returns `None`
    /// when the platform redelivered a message we already hold.
    pub fn insert_customer_message(
        &self,
        conversation_id: i64,
        text: &str,
        attachments: &[Value],
        message_id: Option<&str>,
    ) -> Result<Option<i64>> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO messages
                (conversation_id, sender_type, text, attachments, message_id,
                 is_sent, is_read, created_at)
             VALUES (?1, 'customer', ?2, ?3, ?4, 1, 0, ?5)",
            params![
                conversation_id,
                text,
                serde_json::to_string(attachments)?,
                message_id,
                now
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        conn.execute(
            "UPDATE conversations SET last_message_at = ?2 WHERE id = ?1",
            params![conversation_id, now],
        )?;
        Ok(Some(conn.last_insert_rowid()))
    }

    /// Store an outbound (bot/admin/seller) message. `message_id` and
    /// `is_sent` reflect the send-API result; a failed send still gets a
    /// row, just marked not-sent.
    pub fn insert_outbound_message(
        &self,
        conversation_id: i64,
        sender_type: SenderType,
        text: &str,
        message_id: Option<&str>,
        is_sent: bool,
    ) -> Result<i64> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO messages
                (conversation_id, sender_type, text, attachments, message_id,
                 is_sent, is_read, created_at)
             VALUES (?1, ?2, ?3, '[]', ?4, ?5, 0, ?6)",
            params![
                conversation_id,
                sender_type.as_str(),
                text,
                message_id,
                is_sent,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "UPDATE conversations SET last_message_at = ?2 WHERE id = ?1",
            params![conversation_id, now],
        )?;
        Ok(id)
    }

    /// Flip `is_sent` on the listed platform message ids.
    pub fn mark_delivered(&self, conversation_id: i64, message_ids: &[String]) -> Result<usize> {
        let conn = self.connect()?;
        let mut updated = 0;
        for mid in message_ids {
            updated += conn.execute(
                "UPDATE messages SET is_sent = 1
                 WHERE conversation_id = ?1 AND message_id = ?2",
                params![conversation_id, mid],
            )?;
        }
        Ok(updated)
    }

    /// Mark all bot messages up to the watermark as read.
    pub fn mark_read_up_to(
        &self,
        conversation_id: i64,
        watermark: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE messages SET is_read = 1
             WHERE conversation_id = ?1 AND sender_type = 'bot' AND created_at <= ?2",
            params![conversation_id, watermark.to_rfc3339()],
        )?;
        Ok(updated)
    }

    /// The last `limit` messages of a conversation, oldest first.
    pub fn history(&self, conversation_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, sender_type, text, attachments, message_id,
                    is_sent, is_read, created_at
             FROM (SELECT * FROM messages
                   WHERE conversation_id = ?1
                   ORDER BY created_at DESC, id DESC
                   LIMIT ?2)
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id, limit], message_from_row)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn message_count(&self, conversation_id: i64) -> Result<i64> {
        let conn = self.connect()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn get_message(&self, id: i64) -> Result<Option<StoredMessage>> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT id, conversation_id, sender_type, text, attachments, message_id,
                        is_sent, is_read, created_at
                 FROM messages WHERE id = ?1",
                params![id],
                message_from_row,
            )
            .map(Some)
            .or_else(ignore_not_found)?;
        Ok(found)
    }

    // ---- posts & media ----

    pub fn create_post(
        &self,
        author: &str,
        caption: &str,
        post_ids: &[PostIdEntry],
        is_published: bool,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO posts (author, caption, post_ids, is_published, published_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                author,
                caption,
                serde_json::to_string(post_ids)?,
                is_published,
                published_at.map(|t| t.to_rfc3339()),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Look up a post by one of its platform-native ids, scanning the
    /// `post_ids` entries through the legacy-tolerant normalizer.
    pub fn find_post_by_external_id(&self, external_id: &str) -> Result<Option<SocialPost>> {
        let conn = self.connect()?;
        // LIKE prefilter narrows the scan; the parse below is authoritative.
        let mut stmt = conn.prepare(
            "SELECT id, author, caption, post_ids, is_published, published_at, created_at
             FROM posts WHERE post_ids LIKE '%' || ?1 || '%'",
        )?;
        let rows = stmt.query_map(params![external_id], post_from_row)?;
        for row in rows {
            let post = row?;
            if post.has_external_id(external_id) {
                return Ok(Some(post));
            }
        }
        Ok(None)
    }

    pub fn get_post(&self, id: i64) -> Result<Option<SocialPost>> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT id, author, caption, post_ids, is_published, published_at, created_at
                 FROM posts WHERE id = ?1",
                params![id],
                post_from_row,
            )
            .map(Some)
            .or_else(ignore_not_found)?;
        Ok(found)
    }

    /// Field-diff refresh: writes only the fields the caller found changed.
    pub fn update_post_fields(
        &self,
        id: i64,
        caption: Option<&str>,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.connect()?;
        if let Some(caption) = caption {
            conn.execute(
                "UPDATE posts SET caption = ?2 WHERE id = ?1",
                params![id, caption],
            )?;
        }
        if let Some(published_at) = published_at {
            conn.execute(
                "UPDATE posts SET published_at = ?2, is_published = 1 WHERE id = ?1",
                params![id, published_at.to_rfc3339()],
            )?;
        }
        Ok(())
    }

    /// Hard delete; comments, sub-comments, reactions and media cascade.
    pub fn delete_post(&self, id: i64) -> Result<bool> {
        let conn = self.connect()?;
        Ok(conn.execute("DELETE FROM posts WHERE id = ?1", params![id])? > 0)
    }

    /// Record media files for a post, deduplicated by a name derived from
    /// the URL's content hash — an already-recorded file is never added
    /// (and by contract never re-downloaded) twice. Returns how many were
    /// actually new.
    pub fn attach_media(&self, post_id: i64, urls: &[String]) -> Result<usize> {
        let conn = self.connect()?;
        let mut added = 0;
        for url in urls {
            let file_name = media_file_name(url);
            added += conn.execute(
                "INSERT OR IGNORE INTO post_media (post_id, url, file_name)
                 VALUES (?1, ?2, ?3)",
                params![post_id, url, file_name],
            )?;
        }
        Ok(added)
    }

    pub fn media_count(&self, post_id: i64) -> Result<i64> {
        let conn = self.connect()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM post_media WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ---- comments ----

    /// Idempotent comment insert keyed by `(post, comment_id)`. Returns
    /// false when the event was a redelivery of a comment we already hold.
    pub fn create_comment(
        &self,
        post_id: i64,
        comment_id: &str,
        text: &str,
        commenter_id: &str,
        commenter_name: &str,
        platform: Platform,
        attachments: &[Value],
    ) -> Result<bool> {
        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO comments
                (post_id, comment_id, text, commenter_id, commenter_name,
                 platform, attachments, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                post_id,
                comment_id,
                text,
                commenter_id,
                commenter_name,
                platform.as_str(),
                serde_json::to_string(attachments)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Update by `(post, comment_id)` — external comment ids are only unique
    /// within one post, so the post always scopes the mutation. An unknown
    /// pair is a silent no-op (the event may reference a comment captured
    /// before the post existed locally).
    pub fn update_comment(&self, post_id: i64, comment_id: &str, text: &str) -> Result<bool> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE comments SET text = ?3 WHERE post_id = ?1 AND comment_id = ?2",
            params![post_id, comment_id, text],
        )?;
        Ok(updated > 0)
    }

    pub fn delete_comment(&self, post_id: i64, comment_id: &str) -> Result<bool> {
        let conn = self.connect()?;
        Ok(conn.execute(
            "DELETE FROM comments WHERE post_id = ?1 AND comment_id = ?2",
            params![post_id, comment_id],
        )? > 0)
    }

    pub fn find_comment(&self, comment_id: &str) -> Result<Option<Comment>> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT id, post_id, comment_id, text, commenter_id, commenter_name,
                        platform, attachments, reaction_count, created_at
                 FROM comments WHERE comment_id = ?1",
                params![comment_id],
                comment_from_row,
            )
            .map(Some)
            .or_else(ignore_not_found)?;
        Ok(found)
    }

    pub fn comment_count(&self, post_id: i64) -> Result<i64> {
        let conn = self.connect()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ---- comment replies ----

    /// Insert a reply under the parent's external comment id. A missing
    /// parent is a silent no-op, same as unknown-comment updates.
    pub fn create_sub_comment(
        &self,
        parent_comment_id: &str,
        sub_comment_id: &str,
        text: &str,
        commenter_id: &str,
        commenter_name: &str,
    ) -> Result<bool> {
        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sub_comments
                (comment_id, sub_comment_id, text, commenter_id, commenter_name, created_at)
             SELECT id, ?2, ?3, ?4, ?5, ?6 FROM comments WHERE comment_id = ?1",
            params![
                parent_comment_id,
                sub_comment_id,
                text,
                commenter_id,
                commenter_name,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Like comments, replies are scoped by their parent: the same external
    /// reply id under a different parent comment is a different row.
    pub fn update_sub_comment(
        &self,
        parent_comment_id: &str,
        sub_comment_id: &str,
        text: &str,
    ) -> Result<bool> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE sub_comments SET text = ?3
             WHERE sub_comment_id = ?2
               AND comment_id IN (SELECT id FROM comments WHERE comment_id = ?1)",
            params![parent_comment_id, sub_comment_id, text],
        )?;
        Ok(updated > 0)
    }

    pub fn delete_sub_comment(&self, parent_comment_id: &str, sub_comment_id: &str) -> Result<bool> {
        let conn = self.connect()?;
        Ok(conn.execute(
            "DELETE FROM sub_comments
             WHERE sub_comment_id = ?2
               AND comment_id IN (SELECT id FROM comments WHERE comment_id = ?1)",
            params![parent_comment_id, sub_comment_id],
        )? > 0)
    }

    pub fn find_sub_comment(&self, sub_comment_id: &str) -> Result<Option<SubComment>> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT id, comment_id, sub_comment_id, text, commenter_id,
                        commenter_name, created_at
                 FROM sub_comments WHERE sub_comment_id = ?1",
                params![sub_comment_id],
                sub_comment_from_row,
            )
            .map(Some)
            .or_else(ignore_not_found)?;
        Ok(found)
    }

    // ---- reactions ----

    /// Upsert by `(post, reactor)`: a reactor changing their reaction type
    /// replaces the old row rather than holding two.
    pub fn create_reaction(
        &self,
        post_id: i64,
        reactor_id: &str,
        reactor_name: &str,
        reaction_type: &str,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO reactions (post_id, reactor_id, reactor_name, reaction_type)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (post_id, reactor_id)
             DO UPDATE SET reaction_type = excluded.reaction_type,
                           reactor_name = excluded.reactor_name",
            params![post_id, reactor_id, reactor_name, reaction_type],
        )?;
        Ok(())
    }

    /// Mutates reaction type on an existing row only — if the create event
    /// was missed, the update is dropped and `None` comes back.
    pub fn update_reaction(
        &self,
        post_id: i64,
        reaction_type: &str,
        reactor_id: &str,
    ) -> Result<Option<()>> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE reactions SET reaction_type = ?2
             WHERE post_id = ?1 AND reactor_id = ?3",
            params![post_id, reaction_type, reactor_id],
        )?;
        Ok((updated > 0).then_some(()))
    }

    pub fn delete_reaction(&self, post_id: i64, reactor_id: &str) -> Result<bool> {
        let conn = self.connect()?;
        Ok(conn.execute(
            "DELETE FROM reactions WHERE post_id = ?1 AND reactor_id = ?2",
            params![post_id, reactor_id],
        )? > 0)
    }

    pub fn find_reaction(&self, post_id: i64, reactor_id: &str) -> Result<Option<Reaction>> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT id, post_id, reactor_id, reactor_name, reaction_type
                 FROM reactions WHERE post_id = ?1 AND reactor_id = ?2",
                params![post_id, reactor_id],
                reaction_from_row,
            )
            .map(Some)
            .or_else(ignore_not_found)?;
        Ok(found)
    }

    pub fn reaction_count(&self, post_id: i64) -> Result<i64> {
        let conn = self.connect()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM reactions WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ---- WhatsApp business accounts ----

    pub fn upsert_waba_account(
        &self,
        owner_id: &str,
        waba_id: &str,
        phone_number_id: &str,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO waba_accounts (owner_id, waba_id, phone_number_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (phone_number_id)
             DO UPDATE SET owner_id = excluded.owner_id, waba_id = excluded.waba_id",
            params![owner_id, waba_id, phone_number_id],
        )?;
        Ok(())
    }

    pub fn find_waba_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<WabaAccount>> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT id, owner_id, waba_id, phone_number_id
                 FROM waba_accounts WHERE phone_number_id = ?1",
                params![phone_number_id],
                |row| {
                    Ok(WabaAccount {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        waba_id: row.get(2)?,
                        phone_number_id: row.get(3)?,
                    })
                },
            )
            .map(Some)
            .or_else(ignore_not_found)?;
        Ok(found)
    }
}

/// Derive a stable local file name from the media URL's content hash, so
/// the same URL never produces a second download.
pub fn media_file_name(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let ext = url
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.split(['?', '#']).next().unwrap_or(ext))
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
        .unwrap_or("bin");
    format!("{}.{}", hex::encode(&digest[..16]), ext)
}

fn ignore_not_found<T>(err: rusqlite::Error) -> Result<Option<T>, rusqlite::Error> {
    match err {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}

fn column_err(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::<dyn std::error::Error + Send + Sync>::from(message),
    )
}

fn parse_timestamp(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| column_err(idx, format!("bad timestamp {raw:?}: {e}")))
}

fn conversation_from_row(row: &Row<'_>) -> Result<Conversation, rusqlite::Error> {
    let platform: String = row.get(1)?;
    let last_message_at: String = row.get(6)?;
    Ok(Conversation {
        id: row.get(0)?,
        platform: platform
            .parse()
            .map_err(|e: String| column_err(1, e))?,
        account_id: row.get(2)?,
        external_user_id: row.get(3)?,
        external_username: row.get(4)?,
        is_bot_active: row.get(5)?,
        last_message_at: parse_timestamp(6, &last_message_at)?,
    })
}

fn message_from_row(row: &Row<'_>) -> Result<StoredMessage, rusqlite::Error> {
    let sender_type: String = row.get(2)?;
    let attachments: String = row.get(4)?;
    let created_at: String = row.get(8)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_type: sender_type
            .parse()
            .map_err(|e: String| column_err(2, e))?,
        text: row.get(3)?,
        attachments: serde_json::from_str(&attachments)
            .map_err(|e| column_err(4, format!("bad attachments JSON: {e}")))?,
        message_id: row.get(5)?,
        is_sent: row.get(6)?,
        is_read: row.get(7)?,
        created_at: parse_timestamp(8, &created_at)?,
    })
}

fn post_from_row(row: &Row<'_>) -> Result<SocialPost, rusqlite::Error> {
    let post_ids: String = row.get(3)?;
    let published_at: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    let raw: Value = serde_json::from_str(&post_ids)
        .map_err(|e| column_err(3, format!("bad post_ids JSON: {e}")))?;
    Ok(SocialPost {
        id: row.get(0)?,
        author: row.get(1)?,
        caption: row.get(2)?,
        post_ids: normalize_post_id_field(&raw),
        is_published: row.get(4)?,
        published_at: published_at
            .map(|raw| parse_timestamp(5, &raw))
            .transpose()?,
        created_at: parse_timestamp(6, &created_at)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> Result<Comment, rusqlite::Error> {
    let platform: String = row.get(6)?;
    let attachments: String = row.get(7)?;
    let created_at: String = row.get(9)?;
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        comment_id: row.get(2)?,
        text: row.get(3)?,
        commenter_id: row.get(4)?,
        commenter_name: row.get(5)?,
        platform: platform
            .parse()
            .map_err(|e: String| column_err(6, e))?,
        attachments: serde_json::from_str(&attachments)
            .map_err(|e| column_err(7, format!("bad attachments JSON: {e}")))?,
        reaction_count: row.get(8)?,
        created_at: parse_timestamp(9, &created_at)?,
    })
}

fn sub_comment_from_row(row: &Row<'_>) -> Result<SubComment, rusqlite::Error> {
    let created_at: String = row.get(6)?;
    Ok(SubComment {
        id: row.get(0)?,
        comment_id: row.get(1)?,
        sub_comment_id: row.get(2)?,
        text: row.get(3)?,
        commenter_id: row.get(4)?,
        commenter_name: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
    })
}

fn reaction_from_row(row: &Row<'_>) -> Result<Reaction, rusqlite::Error> {
    Ok(Reaction {
        id: row.get(0)?,
        post_id: row.get(1)?,
        reactor_id: row.get(2)?,
        reactor_name: row.get(3)?,
        reaction_type: row.get(4)?,
    })
}
