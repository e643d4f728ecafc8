//! Conversation types for tool-calling models.
//!
//! The shapes mirror the Messages API so a [`Message`] serializes directly
//! into a request body.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LlmError, LlmResult};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One segment of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Block kinds this client does not interpret (thinking, citations, ...)
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }
}

/// A single conversation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a user message with a single text segment
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Tool calls contained in this message, in order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn tool_result_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Result of executing a [`ToolCall`], keyed by the call id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

/// Tool definition advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Why the model stopped producing output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Other,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// One model response.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmTurn {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
}

impl LlmTurn {
    pub fn new(content: Vec<ContentBlock>, stop_reason: StopReason) -> Self {
        Self {
            content,
            stop_reason: Some(stop_reason),
            usage: Usage::default(),
        }
    }

    /// A pure text response ending the turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![ContentBlock::text(text)], StopReason::EndTurn)
    }

    /// Text segments, in order.
    pub fn texts(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        Message::assistant(self.content.clone()).tool_calls()
    }

    pub fn is_end_turn(&self) -> bool {
        self.stop_reason == Some(StopReason::EndTurn)
    }
}

/// Ordered, append-only message history of one session.
///
/// Every tool call in an assistant message must be answered by exactly one
/// tool result in the immediately following user message before the next
/// model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    /// Start a conversation with the generation brief.
    pub fn new(brief: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user_text(brief)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a model response. Unknown block kinds are dropped.
    pub fn push_assistant(&mut self, content: Vec<ContentBlock>) -> LlmResult<()> {
        let pending = self.pending_tool_calls();
        if !pending.is_empty() {
            return Err(LlmError::Conversation(format!(
                "assistant message appended with unanswered tool calls: {}",
                pending.join(", ")
            )));
        }
        let content: Vec<ContentBlock> = content
            .into_iter()
            .filter(|block| !matches!(block, ContentBlock::Unknown))
            .collect();
        self.messages.push(Message::assistant(content));
        Ok(())
    }

    /// Append the results for the last assistant message as one user message.
    ///
    /// `results` must answer every pending call exactly once.
    pub fn push_tool_results(&mut self, results: Vec<ToolResult>) -> LlmResult<()> {
        let pending = self.pending_tool_calls();
        let mut seen = HashSet::new();
        for result in &results {
            if !pending.contains(&result.tool_use_id) {
                return Err(LlmError::Conversation(format!(
                    "result for unknown tool call {}",
                    result.tool_use_id
                )));
            }
            if !seen.insert(result.tool_use_id.clone()) {
                return Err(LlmError::Conversation(format!(
                    "duplicate result for tool call {}",
                    result.tool_use_id
                )));
            }
        }
        if seen.len() != pending.len() {
            return Err(LlmError::Conversation(format!(
                "{} tool calls but {} results",
                pending.len(),
                seen.len()
            )));
        }

        let content = results
            .into_iter()
            .map(|r| ContentBlock::ToolResult {
                tool_use_id: r.tool_use_id,
                content: r.content,
                is_error: r.is_error,
            })
            .collect();
        self.messages.push(Message {
            role: Role::User,
            content,
        });
        Ok(())
    }

    /// Ids of tool calls in the last message that have no result yet.
    pub fn pending_tool_calls(&self) -> Vec<String> {
        match self.messages.last() {
            Some(last) if last.role == Role::Assistant => {
                last.tool_calls().into_iter().map(|c| c.id).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Check the history is ready to be sent to the model.
    pub fn validate(&self) -> LlmResult<()> {
        match self.messages.last() {
            None => return Err(LlmError::Conversation("empty conversation".to_string())),
            Some(last) if last.role != Role::User => {
                return Err(LlmError::Conversation(
                    "conversation must end with a user message".to_string(),
                ))
            }
            _ => {}
        }

        for (index, message) in self.messages.iter().enumerate() {
            if message.role != Role::Assistant {
                continue;
            }
            let mut calls: Vec<String> = message.tool_calls().into_iter().map(|c| c.id).collect();
            let mut answered: Vec<String> = self
                .messages
                .get(index + 1)
                .map(|next| next.tool_result_ids().into_iter().map(str::to_string).collect())
                .unwrap_or_default();
            calls.sort();
            answered.sort();
            if calls != answered {
                return Err(LlmError::Conversation(format!(
                    "message {} has tool calls {:?} answered by {:?}",
                    index, calls, answered
                )));
            }
        }
        Ok(())
    }
}
