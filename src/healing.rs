//! Crash recovery for reconstructed conversations.
//!
//! A process can die between emitting a tool call and recording its
//! result, or between accepting a user message and producing a response.
//! Either leaves the stored history in a state the model must never see
//! again. Healing repairs such a history by truncation: it never edits a
//! message and never fails, it only returns a reduced (possibly empty)
//! conversation that ends on a complete turn and contains no unpaired
//! tool call or result.

use std::collections::HashMap;
use std::collections::HashSet;

use tracing::warn;

use crate::models::{Message, Part, Role};
use crate::windowing::{classify, safe_boundaries};

/// Completeness of a conversation's final message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Complete,
    /// Ends on a model response whose tool call has no recorded result.
    UnprocessedToolCall,
    /// Ends on a plain user message that never received a response.
    MissingResponse,
}

/// Classify the final message of a conversation. An empty conversation is
/// complete.
#[must_use]
pub fn tail_state(conversation: &[Message]) -> TailState {
    let Some(last) = conversation.last() else {
        return TailState::Complete;
    };

    match last.role {
        Role::Response => {
            let resolved = resolved_call_ids(conversation);
            let unresolved = last.parts.iter().any(|part| {
                part.opens_call()
                    .is_some_and(|id| !resolved.contains(id))
            });
            if unresolved {
                TailState::UnprocessedToolCall
            } else {
                TailState::Complete
            }
        }
        Role::Request => {
            if classify(last).has_tool_result {
                // Results were recorded; the turn is resumable as-is.
                TailState::Complete
            } else {
                TailState::MissingResponse
            }
        }
    }
}

fn resolved_call_ids(conversation: &[Message]) -> HashSet<&str> {
    conversation
        .iter()
        .flat_map(|message| message.parts.iter())
        .filter_map(Part::resolves_call)
        .collect()
}

/// Index of the earliest message where call/result pairing breaks: a tool
/// call that is never resolved anywhere later, or a result that resolves
/// nothing. `None` means every call and result is paired.
fn first_damage_index(conversation: &[Message]) -> Option<usize> {
    let mut pending: HashMap<&str, usize> = HashMap::new();
    let mut stray_result: Option<usize> = None;

    for (index, message) in conversation.iter().enumerate() {
        for part in &message.parts {
            if let Some(id) = part.opens_call() {
                pending.insert(id, index);
            } else if let Some(id) = part.resolves_call() {
                if pending.remove(id).is_none() && stray_result.is_none() {
                    stray_result = Some(index);
                }
            }
        }
    }

    let first_orphan = pending.into_values().min();
    match (first_orphan, stray_result) {
        (Some(orphan), Some(stray)) => Some(orphan.min(stray)),
        (Some(orphan), None) => Some(orphan),
        (None, Some(stray)) => Some(stray),
        (None, None) => None,
    }
}

/// Drop everything from the `look_back`-th safe boundary (counted from the
/// end) onwards, considering only boundaries strictly below `below`. With
/// fewer boundaries than `look_back`, the earliest one is used; with none,
/// the whole conversation is dropped.
fn cut_at_boundary(mut conversation: Vec<Message>, below: usize, look_back: usize) -> Vec<Message> {
    let eligible: Vec<usize> = safe_boundaries(&conversation)
        .into_iter()
        .filter(|&boundary| boundary < below)
        .collect();

    if eligible.is_empty() {
        return Vec::new();
    }

    let cut = eligible[eligible.len().saturating_sub(look_back)];
    conversation.truncate(cut);
    conversation
}

/// Repair a freshly reconstructed conversation.
///
/// First the whole history is swept for unpaired tool calls and results,
/// truncating before the earliest break. Then the trailing turn is
/// checked: a dangling tool call truncates at the latest boundary; a
/// missing response truncates one boundary further back, discarding the
/// exchange preceding the defect along with it. Both passes repeat until
/// the result is complete or empty; each truncation strictly shrinks the
/// history, so the loop terminates. Well-formed input passes through
/// untouched in a single iteration.
#[must_use]
pub fn heal(mut conversation: Vec<Message>) -> Vec<Message> {
    let original_len = conversation.len();

    loop {
        if conversation.is_empty() {
            break;
        }

        if let Some(damage) = first_damage_index(&conversation) {
            conversation = cut_at_boundary(conversation, damage, 1);
            continue;
        }

        match tail_state(&conversation) {
            TailState::Complete => break,
            TailState::UnprocessedToolCall => {
                let len = conversation.len();
                conversation = cut_at_boundary(conversation, len, 1);
            }
            TailState::MissingResponse => {
                let len = conversation.len();
                conversation = cut_at_boundary(conversation, len, 2);
            }
        }
    }

    if conversation.len() < original_len {
        warn!(
            discarded = original_len - conversation.len(),
            retained = conversation.len(),
            "healed conversation by truncation"
        );
    }

    conversation
}
