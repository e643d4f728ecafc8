//! Progress events and the per-session event sink.
//!
//! Events are produced by the pipeline in emission order and delivered over a
//! bounded channel. The sink notices when the consumer has gone away and
//! cancels the session's [`CancellationToken`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Maximum characters of a tool result forwarded to the client.
pub const RESULT_PREVIEW_CHARS: usize = 200;

/// One event of the progress stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Pipeline stage message
    Progress { message: String },
    /// Text emitted by the model
    #[serde(rename = "claude_message")]
    ModelMessage { content: String },
    /// Tool call requested by the model
    ToolUse { name: String, input: Value },
    /// Truncated tool output
    ToolResult {
        result: String,
        full_result_length: usize,
    },
    /// Operator diagnostics
    BackendLog {
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Fatal session error
    Error { message: String },
    /// Session finished with a running preview
    Complete {
        #[serde(rename = "previewUrl")]
        preview_url: String,
        #[serde(rename = "sandboxId")]
        sandbox_id: String,
        #[serde(rename = "filesCreated")]
        files_created: usize,
        #[serde(rename = "failsafeFiles")]
        failsafe_files: usize,
    },
}

impl ProgressEvent {
    pub fn progress(message: impl Into<String>) -> Self {
        Self::Progress {
            message: message.into(),
        }
    }

    pub fn backend_log(message: impl Into<String>) -> Self {
        Self::BackendLog {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Tool result event carrying a preview of `full` and its length.
    pub fn tool_result(full: &str) -> Self {
        Self::ToolResult {
            result: preview(full, RESULT_PREVIEW_CHARS),
            full_result_length: full.chars().count(),
        }
    }

    /// Whether this event ends a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Complete { .. })
    }

    /// Value of the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::ModelMessage { .. } => "claude_message",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::BackendLog { .. } => "backend_log",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
        }
    }
}

/// First `max` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Producer side of a session's event stream.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ProgressEvent>,
    cancel: CancellationToken,
    disconnected: Arc<AtomicBool>,
}

impl EventSink {
    /// Create a sink and the receiver the transport drains.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tx,
                cancel: CancellationToken::new(),
                disconnected: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Deliver an event. Returns `false` once the consumer is gone.
    pub async fn emit(&self, event: ProgressEvent) -> bool {
        match &event {
            ProgressEvent::BackendLog { message, .. } => info!("{}", message),
            ProgressEvent::Error { message } => warn!("Session error: {}", message),
            _ => {}
        }

        if self.is_disconnected() {
            return false;
        }
        if self.tx.send(event).await.is_err() {
            if !self.disconnected.swap(true, Ordering::SeqCst) {
                warn!("Event consumer disconnected; cancelling session");
            }
            self.cancel.cancel();
            return false;
        }
        true
    }

    pub async fn progress(&self, message: impl Into<String>) -> bool {
        self.emit(ProgressEvent::progress(message)).await
    }

    pub async fn log(&self, message: impl Into<String>) -> bool {
        self.emit(ProgressEvent::backend_log(message)).await
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Token cancelled when the consumer disconnects.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let value = serde_json::to_value(ProgressEvent::progress("Creating sandbox...")).unwrap();
        assert_eq!(value, json!({"type": "progress", "message": "Creating sandbox..."}));

        let complete = ProgressEvent::Complete {
            preview_url: "https://3000-abc.proxy".to_string(),
            sandbox_id: "abc".to_string(),
            files_created: 2,
            failsafe_files: 1,
        };
        let value = serde_json::to_value(&complete).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["previewUrl"], "https://3000-abc.proxy");
        assert_eq!(value["sandboxId"], "abc");
        assert_eq!(value["filesCreated"], 2);
        assert_eq!(value["failsafeFiles"], 1);

        let message = ProgressEvent::ModelMessage {
            content: "hi".to_string(),
        };
        assert_eq!(serde_json::to_value(&message).unwrap()["type"], "claude_message");
        assert_eq!(message.kind(), "claude_message");
    }

    #[test]
    fn test_tool_result_preview() {
        let long = "x".repeat(450);
        match ProgressEvent::tool_result(&long) {
            ProgressEvent::ToolResult {
                result,
                full_result_length,
            } => {
                assert_eq!(result.len(), RESULT_PREVIEW_CHARS + 3);
                assert!(result.ends_with("..."));
                assert_eq!(full_result_length, 450);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(preview("short", 200), "short");
        // multi-byte characters are never split
        assert_eq!(preview("ééé", 2), "éé...");
    }

    #[tokio::test]
    async fn test_sink_detects_disconnect() {
        let (sink, rx) = EventSink::channel(4);
        let token = sink.cancellation();
        assert!(sink.progress("one").await);

        drop(rx);
        assert!(!sink.progress("two").await);
        assert!(sink.is_disconnected());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_sink_preserves_order() {
        let (sink, mut rx) = EventSink::channel(8);
        sink.progress("a").await;
        sink.log("b").await;
        sink.emit(ProgressEvent::error("c")).await;
        drop(sink);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.kind());
        }
        assert_eq!(kinds, vec!["progress", "backend_log", "error"]);
    }
}
