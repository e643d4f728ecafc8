//! The agentic generation loop.
//!
//! One model call per turn. Text segments are forwarded as progress, tool
//! calls are executed in order and their results appended to the history as
//! a single user message before the next call.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, info};
use yeevu_llm::{ConversationState, LlmClient, ToolResult, ToolSchema};

use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventSink, ProgressEvent};
use crate::tools::{tool_schemas, ToolExecutor, ToolName};

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The model answered without tool calls
    NaturalCompletion,
    /// The model signalled `end_turn` after calling tools
    EndTurn,
    /// The turn budget ran out
    TurnBudgetExhausted,
}

/// Result of a generation run.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Model calls made
    pub turns: u32,
    pub exit: LoopExit,
    /// Project-relative paths successfully written by the model
    pub files_written: BTreeSet<String>,
    pub conversation: ConversationState,
}

/// Drives the conversation between the model and the tool executor.
pub struct GenerationLoop {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    tools: Vec<ToolSchema>,
    max_turns: u32,
    turns_taken: AtomicU32,
}

impl GenerationLoop {
    pub fn new(llm: Arc<dyn LlmClient>, executor: ToolExecutor, max_turns: u32) -> Self {
        let tools = tool_schemas(executor.allowed());
        Self {
            llm,
            executor,
            tools,
            max_turns,
            turns_taken: AtomicU32::new(0),
        }
    }

    /// Model calls answered so far, including those of a run that failed.
    pub fn turns_taken(&self) -> u32 {
        self.turns_taken.load(Ordering::SeqCst)
    }

    /// Run until the model stops or the turn budget is spent.
    ///
    /// Provider failures and cancellation are fatal; tool failures are not.
    pub async fn run(&self, brief: String, sink: &EventSink) -> PipelineResult<GenerationOutcome> {
        let cancel = sink.cancellation();
        let mut conversation = ConversationState::new(brief);
        let mut files_written = BTreeSet::new();
        let mut turns = 0;

        let exit = loop {
            if turns >= self.max_turns {
                info!("Turn budget of {} exhausted", self.max_turns);
                sink.log(format!(
                    "Reached the limit of {} turns; continuing with the files written so far",
                    self.max_turns
                ))
                .await;
                break LoopExit::TurnBudgetExhausted;
            }

            conversation.validate()?;
            debug!("Turn {}/{}", turns + 1, self.max_turns);

            let turn = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                result = self.llm.complete(None, conversation.messages(), &self.tools) => result?,
            };
            turns += 1;
            self.turns_taken.store(turns, Ordering::SeqCst);

            for text in turn.texts() {
                sink.emit(ProgressEvent::ModelMessage {
                    content: text.to_string(),
                })
                .await;
            }

            let calls = turn.tool_calls();
            conversation.push_assistant(turn.content.clone())?;
            if calls.is_empty() {
                break LoopExit::NaturalCompletion;
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
                sink.emit(ProgressEvent::ToolUse {
                    name: call.name.clone(),
                    input: call.input.clone(),
                })
                .await;

                let output = self.executor.execute(&call.name, &call.input).await;
                if call.name == ToolName::Write.as_str() && !output.is_error {
                    if let Some(path) = call
                        .input
                        .get("file_path")
                        .and_then(|p| p.as_str())
                        .and_then(|p| self.executor.relative_path(p).ok())
                    {
                        files_written.insert(path);
                    }
                }

                sink.emit(ProgressEvent::tool_result(&output.content)).await;
                results.push(ToolResult {
                    tool_use_id: call.id,
                    content: output.content,
                    is_error: output.is_error,
                });
            }
            conversation.push_tool_results(results)?;

            if turn.is_end_turn() {
                break LoopExit::EndTurn;
            }
        };

        info!(
            "Generation finished after {} turns ({:?}), {} files written",
            turns,
            exit,
            files_written.len()
        );
        Ok(GenerationOutcome {
            turns,
            exit,
            files_written,
            conversation,
        })
    }
}
