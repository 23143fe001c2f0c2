//! SQLite-backed persistence for conversation messages.
//!
//! One append-only table holds every stored turn, keyed by conversation
//! id with the rowid as the monotonic sequence marker. Rows are never
//! updated in place; the only destructive operation is a full per-id
//! clear. All public methods are async — the blocking SQLite work runs on
//! the tokio blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, params};
use thiserror::Error;
use tokio::task;
use tracing::{debug, info};

use crate::models::Message;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS conversation_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    message_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversation_messages_conversation
    ON conversation_messages(conversation_id, id);
";

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    /// A stored row no longer decodes as a message. Recoverable: callers
    /// should start the conversation empty rather than abort.
    #[error("corrupt stored record for {conversation_id}: {detail}")]
    Corrupt {
        conversation_id: String,
        detail: String,
    },
    #[error("could not create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage task failed: {0}")]
    Background(String),
}

/// Handle to the conversation database. Cheap to clone; safe to use
/// concurrently across conversation ids.
#[derive(Clone)]
pub struct ConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl ConversationStore {
    /// Open (or create) the database at `path`, creating parent
    /// directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "conversation store opened");
        Ok(store)
    }

    /// In-memory database for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(conn: &Arc<Mutex<Connection>>) -> MutexGuard<'_, Connection> {
        conn.lock().expect("connection mutex poisoned")
    }

    /// Durably append one message to a conversation's log.
    pub async fn append(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(message)?;
        let conversation_id = conversation_id.to_string();
        let conn = Arc::clone(&self.conn);
        run_blocking(move || {
            Self::lock(&conn).execute(
                "INSERT INTO conversation_messages (conversation_id, timestamp, message_json)
                 VALUES (?1, ?2, ?3)",
                params![conversation_id, now_rfc3339(), json],
            )?;
            Ok(())
        })
        .await
    }

    /// Append a batch of messages in one transaction, preserving order.
    pub async fn append_batch(
        &self,
        conversation_id: &str,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        let encoded: Vec<String> = messages
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<_, _>>()?;
        let conversation_id = conversation_id.to_string();
        let conn = Arc::clone(&self.conn);
        let count = encoded.len();
        run_blocking(move || {
            let mut conn = Self::lock(&conn);
            let tx = conn.transaction()?;
            let stamp = now_rfc3339();
            for json in &encoded {
                tx.execute(
                    "INSERT INTO conversation_messages (conversation_id, timestamp, message_json)
                     VALUES (?1, ?2, ?3)",
                    params![conversation_id, stamp, json],
                )?;
            }
            tx.commit()?;
            debug!(%conversation_id, count, "appended message batch");
            Ok(())
        })
        .await
    }

    /// Load the most recent `max_count` messages for a conversation, in
    /// chronological (oldest-first) order. An unknown id yields an empty
    /// list, never an error; an undecodable row yields
    /// [`StoreError::Corrupt`].
    pub async fn load(
        &self,
        conversation_id: &str,
        max_count: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let conversation_id = conversation_id.to_string();
        let conn = Arc::clone(&self.conn);
        let limit = i64::try_from(max_count).unwrap_or(i64::MAX);
        run_blocking(move || {
            let conn = Self::lock(&conn);
            let mut stmt = conn.prepare(
                "SELECT message_json FROM conversation_messages
                 WHERE conversation_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;
            let mut rows: Vec<String> = stmt
                .query_map(params![conversation_id, limit], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            rows.reverse();

            let mut messages = Vec::with_capacity(rows.len());
            for json in rows {
                let message =
                    serde_json::from_str(&json).map_err(|err| StoreError::Corrupt {
                        conversation_id: conversation_id.clone(),
                        detail: err.to_string(),
                    })?;
                messages.push(message);
            }
            debug!(%conversation_id, count = messages.len(), "loaded stored messages");
            Ok(messages)
        })
        .await
    }

    /// Irreversibly delete every stored message for a conversation.
    pub async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        let conversation_id = conversation_id.to_string();
        let conn = Arc::clone(&self.conn);
        run_blocking(move || {
            let removed = Self::lock(&conn).execute(
                "DELETE FROM conversation_messages WHERE conversation_id = ?1",
                params![conversation_id],
            )?;
            info!(%conversation_id, removed, "cleared conversation history");
            Ok(())
        })
        .await
    }

    /// Number of stored messages for a conversation.
    pub async fn count(&self, conversation_id: &str) -> Result<usize, StoreError> {
        let conversation_id = conversation_id.to_string();
        let conn = Arc::clone(&self.conn);
        run_blocking(move || {
            let count: i64 = Self::lock(&conn).query_row(
                "SELECT COUNT(*) FROM conversation_messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|err| StoreError::Background(err.to_string()))?
}
