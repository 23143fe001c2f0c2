//! Conversation message model shared by the windowing, healing, and storage layers.

use serde::{Deserialize, Serialize};

/// Originator of a conversation message.
///
/// Tool results travel back to the model attached to a `Request` message;
/// that is the transport's convention, not a statement about who authored
/// them, so code inspecting tool traffic should look at parts, not roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A user submission, or tool results relayed back on the user side.
    Request,
    /// A model production: text and/or tool invocations.
    Response,
}

/// A single typed payload fragment inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    ToolResult {
        call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    /// Asks the model to redo a prior step. Resolves the named call the
    /// same way a tool result does.
    RetryRequest {
        call_id: String,
        reason: String,
    },
}

impl Part {
    /// The call id this part opens, if it is a tool invocation.
    #[must_use]
    pub fn opens_call(&self) -> Option<&str> {
        match self {
            Part::ToolCall { id, .. } => Some(id),
            _ => None,
        }
    }

    /// The call id this part resolves, if it is a result or retry.
    #[must_use]
    pub fn resolves_call(&self) -> Option<&str> {
        match self {
            Part::ToolResult { call_id, .. } | Part::RetryRequest { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}

/// One atomic conversation turn. Never mutated after creation; windowing
/// and healing only ever drop whole messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    /// A plain user submission.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::Request,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    /// A plain text model response.
    #[must_use]
    pub fn response_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Response,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    /// A model response invoking one tool.
    #[must_use]
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            role: Role::Response,
            parts: vec![Part::ToolCall {
                id: id.into(),
                name: name.into(),
                arguments,
            }],
        }
    }

    /// A user-side message delivering one tool result back to the model.
    #[must_use]
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Request,
            parts: vec![Part::ToolResult {
                call_id: call_id.into(),
                content: content.into(),
                is_error: false,
            }],
        }
    }

    /// Concatenated text parts, in order.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Generate a fresh tool-call id.
#[must_use]
pub fn new_call_id() -> String {
    format!("call_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}
