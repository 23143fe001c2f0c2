//! Seam between the conversation layer and whichever model backend drives it.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Message;

/// A tool-calling model capability, opaque to this crate.
///
/// `history` is the trimmed active window and `user_message` the new
/// user-request turn. Implementations run their full tool loop and return
/// every message the turn produced — beginning with `user_message` itself —
/// so the caller can append and persist the whole turn as one unit.
///
/// Failures propagate unshaped; whatever partial messages a failed
/// invocation already persisted are repaired by healing on the next
/// session start.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(&self, history: &[Message], user_message: Message) -> Result<Vec<Message>>;
}
