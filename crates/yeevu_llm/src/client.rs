//! Provider-agnostic client seam.

use async_trait::async_trait;

use crate::error::LlmResult;
use crate::types::{LlmTurn, Message, ToolSchema};

/// A turn-based, tool-calling model.
///
/// Implementations send the full history on every call; they hold no
/// conversation state of their own. Dropping the returned future aborts the
/// in-flight request.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier used for requests.
    fn model(&self) -> &str;

    /// Request the next assistant turn.
    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> LlmResult<LlmTurn>;
}
