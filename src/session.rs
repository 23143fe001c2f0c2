//! Per-user sessions and the registry that owns them.
//!
//! A session wires the pure windowing/healing layers to the durable store
//! and the model capability for one conversation id. The registry keeps
//! one session per connected user, created on first contact and torn down
//! explicitly at shutdown; nothing here is process-global.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::HistoryConfig;
use crate::healing::heal;
use crate::llm_client::LlmClient;
use crate::models::{Message, Role};
use crate::store::{ConversationStore, StoreError};
use crate::windowing::trim_to_limit;

/// Live conversation state for one user identifier.
pub struct Session {
    conversation_id: String,
    history: Vec<Message>,
    store: ConversationStore,
    client: Arc<dyn LlmClient>,
    config: HistoryConfig,
}

impl Session {
    /// Load, heal, and activate the stored conversation for
    /// `conversation_id`. A corrupt stored record degrades to an empty
    /// history rather than an error; an unreachable store propagates.
    pub async fn open(
        conversation_id: impl Into<String>,
        store: ConversationStore,
        client: Arc<dyn LlmClient>,
        config: HistoryConfig,
    ) -> Result<Self> {
        let conversation_id = conversation_id.into();
        let raw = match store.load(&conversation_id, config.db_load_limit).await {
            Ok(messages) => messages,
            Err(StoreError::Corrupt { detail, .. }) => {
                warn!(%conversation_id, detail, "stored history unreadable; starting empty");
                Vec::new()
            }
            Err(err) => {
                return Err(err).context("failed to load conversation history");
            }
        };

        let loaded = raw.len();
        let history = heal(raw);
        info!(
            %conversation_id,
            loaded,
            active = history.len(),
            "session opened"
        );

        Ok(Self {
            conversation_id,
            history,
            store,
            client,
            config,
        })
    }

    /// Run one conversational turn: trim the active window, invoke the
    /// model, append and persist everything the turn produced, and return
    /// the reply text.
    pub async fn send(&mut self, text: &str) -> Result<String> {
        let keep = trim_to_limit(&self.history, self.config.history_limit).len();
        let dropped = self.history.len() - keep;
        if dropped > 0 {
            self.history.drain(..dropped);
        }

        let produced = self
            .client
            .invoke(&self.history, Message::user(text))
            .await
            .context("model invocation failed")?;

        let reply = reply_text(&produced);
        self.history.extend(produced.iter().cloned());
        self.store
            .append_batch(&self.conversation_id, &produced)
            .await
            .context("failed to persist conversation turn")?;

        Ok(reply)
    }

    /// Forget this conversation everywhere: durable log and active window.
    pub async fn clear(&mut self) -> Result<()> {
        self.store
            .clear(&self.conversation_id)
            .await
            .context("failed to clear stored conversation")?;
        self.history.clear();
        Ok(())
    }

    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// The active in-memory window.
    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.history
    }
}

/// Text of the turn's final model response, empty when the turn produced
/// none.
fn reply_text(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|message| message.role == Role::Response)
        .map(Message::text)
        .unwrap_or_default()
}

/// Owns one [`Session`] per conversation id.
pub struct SessionRegistry {
    store: ConversationStore,
    client: Arc<dyn LlmClient>,
    config: HistoryConfig,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(store: ConversationStore, client: Arc<dyn LlmClient>, config: HistoryConfig) -> Self {
        Self {
            store,
            client,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the session for `conversation_id`, opening it on first
    /// contact.
    pub async fn get_or_create(&self, conversation_id: &str) -> Result<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(conversation_id) {
            return Ok(Arc::clone(session));
        }

        info!(%conversation_id, "creating session");
        let session = Session::open(
            conversation_id,
            self.store.clone(),
            Arc::clone(&self.client),
            self.config.clone(),
        )
        .await?;
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(conversation_id.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Drop the in-memory session for `conversation_id`, if any. Durable
    /// history is untouched.
    pub async fn remove(&self, conversation_id: &str) -> bool {
        self.sessions.lock().await.remove(conversation_id).is_some()
    }

    /// Tear down every active session. Called once at process shutdown.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        sessions.clear();
        info!(sessions = count, "session registry shut down");
    }
}
