//! Turn classification, safe-boundary discovery, and window trimming.
//!
//! Everything here is a pure scan over `&[Message]`. Trimming hands back a
//! suffix view of its input; it never copies or mutates.

use tracing::warn;

use crate::models::{Message, Part, Role};

/// Facts about one message that windowing and healing decisions depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnFacts {
    /// Any part is a tool invocation.
    pub has_pending_tool_call: bool,
    /// Any part is a tool result or a retry request.
    pub has_tool_result: bool,
    /// A plain user message: safe to cut the history here.
    pub is_safe_boundary_candidate: bool,
}

/// Classify a single message. Pure and infallible — a message with no
/// parts is a valid, classified state.
#[must_use]
pub fn classify(message: &Message) -> TurnFacts {
    let has_pending_tool_call = message
        .parts
        .iter()
        .any(|part| matches!(part, Part::ToolCall { .. }));
    let has_tool_result = message.parts.iter().any(|part| part.resolves_call().is_some());
    TurnFacts {
        has_pending_tool_call,
        has_tool_result,
        is_safe_boundary_candidate: message.role == Role::Request && !has_tool_result,
    }
}

/// Indices at which the conversation can be cut without separating a tool
/// call from its result: plain user messages, in increasing order.
///
/// An empty result means there is no safe cut point at all; callers must
/// keep the whole history or drop it entirely.
#[must_use]
pub fn safe_boundaries(conversation: &[Message]) -> Vec<usize> {
    conversation
        .iter()
        .enumerate()
        .filter(|(_, message)| classify(message).is_safe_boundary_candidate)
        .map(|(index, _)| index)
        .collect()
}

/// Reduce the conversation to at most `limit` messages, cutting only at a
/// safe boundary. Returns a suffix of the input.
///
/// Picks the earliest boundary that fits inside `limit`; if every boundary
/// leaves more than `limit` messages, the latest boundary wins as the
/// closest approach. When no boundary exists the full history is returned
/// unchanged — an oversized model input beats a conversation with a
/// dangling tool call — and a warning is emitted.
#[must_use]
pub fn trim_to_limit(conversation: &[Message], limit: usize) -> &[Message] {
    if conversation.len() <= limit {
        return conversation;
    }

    let boundaries = safe_boundaries(conversation);
    if boundaries.is_empty() {
        warn!(
            len = conversation.len(),
            limit, "no safe boundary to trim at; keeping full history"
        );
        return conversation;
    }

    let cut = match boundaries
        .iter()
        .copied()
        .find(|&boundary| conversation.len() - boundary <= limit)
    {
        Some(boundary) => boundary,
        None => boundaries[boundaries.len() - 1],
    };

    &conversation[cut..]
}
