//! Scripted client for testing.
//!
//! Replays a queue of turns and records every request. When the script runs
//! out, the last step repeats, which makes "a model that never stops calling
//! tools" a one-liner.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::client::LlmClient;
use crate::error::{LlmError, LlmResult};
use crate::types::{LlmTurn, Message, ToolSchema};

#[derive(Debug, Clone)]
enum ScriptStep {
    Turn(LlmTurn),
    Error(String),
}

/// Captured request for verification.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Client returning predefined turns.
#[derive(Clone)]
pub struct ScriptedLlm {
    steps: Arc<RwLock<VecDeque<ScriptStep>>>,
    requests: Arc<RwLock<Vec<CapturedRequest>>>,
    delay: Option<Duration>,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            steps: Arc::new(RwLock::new(VecDeque::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
            delay: None,
        }
    }

    /// Add a turn to the script.
    pub fn then(self, turn: LlmTurn) -> Self {
        self.steps.write().push_back(ScriptStep::Turn(turn));
        self
    }

    /// Add a provider failure to the script.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.steps.write().push_back(ScriptStep::Error(message.into()));
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.read().len()
    }

    fn next_step(&self) -> Option<ScriptStep> {
        let mut steps = self.steps.write();
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> LlmResult<LlmTurn> {
        self.requests.write().push(CapturedRequest {
            system: system.map(str::to_string),
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_step() {
            Some(ScriptStep::Turn(turn)) => Ok(turn),
            Some(ScriptStep::Error(message)) => Err(LlmError::Api {
                status: 500,
                body: message,
            }),
            None => Ok(LlmTurn::text("Done.")),
        }
    }
}
