//! # yeevu_llm
//!
//! Turn-based, tool-calling LLM access for Yeevu.
//!
//! - [`ConversationState`] holds the message history and enforces that every
//!   tool call is answered before the next model call.
//! - [`LlmClient`] is the provider seam; [`AnthropicClient`] implements it
//!   over the Messages API and [`ScriptedLlm`] replays canned turns in tests.

pub mod anthropic;
pub mod client;
pub mod error;
pub mod scripted;
pub mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::{LlmError, LlmResult};
pub use scripted::{CapturedRequest, ScriptedLlm};
pub use types::{
    ContentBlock, ConversationState, LlmTurn, Message, Role, StopReason, ToolCall, ToolResult,
    ToolSchema, Usage,
};
