//! Conversation-history management for the Askari Patrol WhatsApp agent.
//!
//! A multi-turn tool-calling conversation has to survive two hostile
//! forces: a token-limited context window and process restarts that can
//! land mid-turn. This crate owns that problem for the agent runtime:
//!
//! - [`windowing`] classifies turns, finds the indices where the history
//!   can be cut without separating a tool call from its result, and trims
//!   the active window to a message budget.
//! - [`healing`] repairs a history reconstructed from storage so it ends
//!   on a complete turn and contains no unpaired tool traffic.
//! - [`store`] is the append-only SQLite log of serialized turns, keyed
//!   by conversation id.
//! - [`session`] ties the above together per user: resume is load → heal
//!   → activate; every turn is trim → invoke → append → persist.
//!
//! The model itself stays behind the [`LlmClient`] seam; this crate never
//! talks to a backend.

pub mod config;
pub mod healing;
pub mod llm_client;
pub mod models;
pub mod session;
pub mod store;
pub mod windowing;

pub use config::HistoryConfig;
pub use healing::{TailState, heal, tail_state};
pub use llm_client::LlmClient;
pub use models::{Message, Part, Role, new_call_id};
pub use session::{Session, SessionRegistry};
pub use store::{ConversationStore, StoreError};
pub use windowing::{TurnFacts, classify, safe_boundaries, trim_to_limit};
