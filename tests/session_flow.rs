//! End-to-end session flow against a scripted model client and an
//! on-disk store: resume, healing after a crash, trimming, and clearing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use askari_conversation::{
    ConversationStore, HistoryConfig, LlmClient, Message, Session, SessionRegistry,
};

/// Replays pre-scripted turn suffixes and records the window sizes it was
/// handed, so tests can assert on what the model actually saw.
struct ScriptedClient {
    turns: Mutex<VecDeque<Vec<Message>>>,
    window_sizes: Mutex<Vec<usize>>,
}

impl ScriptedClient {
    fn new(turns: Vec<Vec<Message>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            window_sizes: Mutex::new(Vec::new()),
        })
    }

    fn window_sizes(&self) -> Vec<usize> {
        self.window_sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn invoke(&self, history: &[Message], user_message: Message) -> Result<Vec<Message>> {
        self.window_sizes.lock().unwrap().push(history.len());
        let suffix = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Message::response_text("out of script")]);
        let mut produced = vec![user_message];
        produced.extend(suffix);
        Ok(produced)
    }
}

fn config_with(dir: &tempfile::TempDir, history_limit: usize) -> HistoryConfig {
    HistoryConfig {
        history_limit,
        db_path: dir.path().join("conversations.db"),
        ..HistoryConfig::default()
    }
}

#[tokio::test]
async fn plain_turn_persists_and_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_with(&dir, 10);
    let store = ConversationStore::open(&config.db_path).expect("open store");
    let client = ScriptedClient::new(vec![vec![Message::response_text("hello there")]]);

    let mut session = Session::open("+254700000001", store.clone(), client.clone(), config.clone())
        .await
        .expect("open session");
    let reply = session.send("hi").await.expect("send");
    assert_eq!(reply, "hello there");
    assert_eq!(store.count("+254700000001").await.expect("count"), 2);

    // A fresh session sees the same history back from disk.
    let reopened = Session::open("+254700000001", store, client, config)
        .await
        .expect("reopen session");
    assert_eq!(
        reopened.history(),
        &[Message::user("hi"), Message::response_text("hello there")]
    );
}

#[tokio::test]
async fn tool_turn_is_persisted_as_one_unit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_with(&dir, 10);
    let store = ConversationStore::open(&config.db_path).expect("open store");
    let client = ScriptedClient::new(vec![vec![
        Message::tool_call("call_w1", "get_weather", json!({"city": "Nairobi"})),
        Message::tool_result("call_w1", "sunny, 24C"),
        Message::response_text("Sunny and 24C in Nairobi."),
    ]]);

    let mut session = Session::open("+254700000002", store.clone(), client, config)
        .await
        .expect("open session");
    let reply = session.send("weather in Nairobi?").await.expect("send");
    assert_eq!(reply, "Sunny and 24C in Nairobi.");
    assert_eq!(session.history().len(), 4);
    assert_eq!(store.count("+254700000002").await.expect("count"), 4);
}

#[tokio::test]
async fn crash_mid_tool_call_heals_on_resume() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_with(&dir, 10);
    let store = ConversationStore::open(&config.db_path).expect("open store");

    // A process died right after emitting a tool call: the stored log ends
    // mid-turn.
    store
        .append_batch(
            "+254700000003",
            &[
                Message::user("hi"),
                Message::response_text("hello"),
                Message::user("weather?"),
                Message::tool_call("call_c1", "get_weather", json!({})),
            ],
        )
        .await
        .expect("seed");

    let client = ScriptedClient::new(vec![vec![Message::response_text("back online")]]);
    let mut session = Session::open("+254700000003", store, client, config)
        .await
        .expect("open session");
    assert_eq!(
        session.history(),
        &[Message::user("hi"), Message::response_text("hello")]
    );

    // The healed session keeps working.
    let reply = session.send("are you there?").await.expect("send");
    assert_eq!(reply, "back online");
    assert_eq!(session.history().len(), 4);
}

#[tokio::test]
async fn window_is_trimmed_before_invocation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_with(&dir, 5);
    let store = ConversationStore::open(&config.db_path).expect("open store");

    let seed: Vec<Message> = (0..12)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(format!("question {i}"))
            } else {
                Message::response_text(format!("answer {i}"))
            }
        })
        .collect();
    store.append_batch("+254700000004", &seed).await.expect("seed");

    let client = ScriptedClient::new(vec![vec![Message::response_text("trimmed reply")]]);
    let mut session = Session::open("+254700000004", store, client.clone(), config)
        .await
        .expect("open session");
    assert_eq!(session.history().len(), 12);

    session.send("one more").await.expect("send");
    // Twelve messages with a limit of five trim to the boundary at index
    // eight, leaving four.
    assert_eq!(client.window_sizes(), vec![4]);
    assert_eq!(session.history().len(), 6);
}

#[tokio::test]
async fn clear_wipes_memory_and_storage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_with(&dir, 10);
    let store = ConversationStore::open(&config.db_path).expect("open store");
    let client = ScriptedClient::new(vec![vec![Message::response_text("noted")]]);

    let mut session = Session::open("+254700000005", store.clone(), client, config)
        .await
        .expect("open session");
    session.send("remember this").await.expect("send");
    session.clear().await.expect("clear");

    assert!(session.history().is_empty());
    assert_eq!(store.count("+254700000005").await.expect("count"), 0);
    assert!(store
        .load("+254700000005", 30)
        .await
        .expect("load")
        .is_empty());
}

#[tokio::test]
async fn registry_reuses_sessions_per_identifier() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_with(&dir, 10);
    let store = ConversationStore::open(&config.db_path).expect("open store");
    let client = ScriptedClient::new(vec![
        vec![Message::response_text("first")],
        vec![Message::response_text("second")],
    ]);

    let registry = SessionRegistry::new(store, client, config);
    let first = registry.get_or_create("+254700000006").await.expect("create");
    let again = registry.get_or_create("+254700000006").await.expect("reuse");
    assert!(Arc::ptr_eq(&first, &again));

    let reply = first.lock().await.send("hello").await.expect("send");
    assert_eq!(reply, "first");

    registry.shutdown().await;
    let fresh = registry.get_or_create("+254700000006").await.expect("recreate");
    assert!(!Arc::ptr_eq(&first, &fresh));
    // The recreated session resumes from durable history.
    assert_eq!(fresh.lock().await.history().len(), 2);
}
