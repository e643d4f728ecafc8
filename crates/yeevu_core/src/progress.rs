//! Client-side progress projection.
//!
//! Maps the event stream onto seven display phases using substring
//! heuristics on progress messages and written file names. This is for
//! display only; the pipeline never reads it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::ProgressEvent;

/// Status of one display phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
    Error,
}

/// One display phase.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationStep {
    pub id: &'static str,
    pub title: &'static str,
    pub status: StepStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

const PHASES: [(&str, &str); 7] = [
    ("sandbox", "Environment Setup"),
    ("dependencies", "Installing Dependencies"),
    ("structure", "Project Structure"),
    ("components", "Building Components"),
    ("styling", "Applying Styles"),
    ("testing", "Testing & Optimization"),
    ("deployment", "Starting Server"),
];

/// Progress of one session as shown to a user.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSteps {
    pub steps: Vec<GenerationStep>,
    /// File names from Write tool calls, in order
    pub files_created: Vec<String>,
    pub first_error: Option<String>,
    pub preview_url: Option<String>,
    pub sandbox_id: Option<String>,
}

impl Default for GenerationSteps {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationSteps {
    /// All phases pending except the first, which is active.
    pub fn new() -> Self {
        let steps = PHASES
            .iter()
            .enumerate()
            .map(|(i, (id, title))| GenerationStep {
                id,
                title,
                status: if i == 0 {
                    StepStatus::Active
                } else {
                    StepStatus::Pending
                },
                completed_at: None,
            })
            .collect();
        Self {
            steps,
            files_created: Vec::new(),
            first_error: None,
            preview_url: None,
            sandbox_id: None,
        }
    }

    pub fn step(&self, id: &str) -> Option<&GenerationStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn status(&self, id: &str) -> Option<StepStatus> {
        self.step(id).map(|s| s.status)
    }

    pub fn active(&self) -> Option<&GenerationStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Active)
    }

    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    /// Fold one event into the projection.
    pub fn apply(&mut self, event: &ProgressEvent, now: DateTime<Utc>) {
        match event {
            ProgressEvent::Progress { message } => {
                let m = message.as_str();
                if m.contains("sandbox") || m.contains("Creating") {
                    self.advance("sandbox", "dependencies", now);
                } else if m.contains("Installing") || m.contains("LLM SDK") {
                    self.advance("dependencies", "structure", now);
                } else if m.contains("generation") || m.contains("AI") {
                    self.advance("structure", "components", now);
                } else if m.contains("development server") {
                    self.advance("testing", "deployment", now);
                }
            }
            ProgressEvent::ToolUse { name, input } if name == "Write" => {
                let Some(path) = input.get("file_path").and_then(|p| p.as_str()) else {
                    return;
                };
                let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
                if file_name.contains("package.json") || file_name.contains("tsconfig") {
                    self.advance("structure", "components", now);
                } else if file_name.contains(".css") || file_name.contains("tailwind") {
                    self.advance("components", "styling", now);
                }
                self.files_created.push(file_name);
            }
            ProgressEvent::Error { message } => {
                if self.first_error.is_none() {
                    self.first_error = Some(message.clone());
                }
                let index = self
                    .steps
                    .iter()
                    .position(|s| s.status == StepStatus::Active)
                    .unwrap_or(0);
                self.steps[index].status = StepStatus::Error;
            }
            ProgressEvent::Complete {
                preview_url,
                sandbox_id,
                ..
            } => {
                self.preview_url = Some(preview_url.clone());
                self.sandbox_id = Some(sandbox_id.clone());
                for step in &mut self.steps {
                    if step.status != StepStatus::Error && step.status != StepStatus::Completed {
                        step.status = StepStatus::Completed;
                        step.completed_at = Some(now);
                    }
                }
            }
            _ => {}
        }
    }

    /// Complete `done` and everything before it, then activate `next`,
    /// unless the projection is already past `next`.
    fn advance(&mut self, done: &str, next: &str, now: DateTime<Utc>) {
        let (Some(done_index), Some(next_index)) = (self.index(done), self.index(next)) else {
            return;
        };
        let already_past = self.steps[next_index..]
            .iter()
            .any(|s| s.status != StepStatus::Pending);
        if already_past {
            return;
        }
        for step in &mut self.steps[..=done_index] {
            if step.status != StepStatus::Completed {
                step.status = StepStatus::Completed;
                step.completed_at = Some(now);
            }
        }
        for step in &mut self.steps[done_index + 1..next_index] {
            if step.status == StepStatus::Active {
                step.status = StepStatus::Completed;
                step.completed_at = Some(now);
            }
        }
        self.steps[next_index].status = StepStatus::Active;
    }

    fn index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }
}
