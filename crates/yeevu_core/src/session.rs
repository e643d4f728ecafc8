//! One generation session, end to end.
//!
//! The runner owns the ordering of stages and the error boundary: whatever
//! happens after the first event, the stream ends with exactly one `error` or
//! `complete` event.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use yeevu_llm::LlmClient;
use yeevu_sandbox::{CommandOptions, Sandbox, SandboxProvider, SandboxSpec};

use crate::deploy::{DeploySettings, Deployer, DEV_SERVER_LOG};
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventSink, ProgressEvent};
use crate::failsafe::apply_failsafe;
use crate::generation::GenerationLoop;
use crate::profile::GenerationProfile;
use crate::tools::{ToolExecutor, BASH_TIMEOUT};

/// Directory under the sandbox user's home holding the generated project.
pub const PROJECT_DIR_NAME: &str = "website-project";

/// Project directory for a sandbox home directory.
pub fn project_dir_for(root: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), PROJECT_DIR_NAME)
}

/// When the runner removes the sandbox it created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// Always keep the sandbox
    Never,
    /// Remove after a failed session
    OnFailure,
    /// Remove after a failed session or a client disconnect
    #[default]
    OnFailureOrDisconnect,
}

impl TeardownPolicy {
    pub fn should_remove(&self, failed: bool, disconnected: bool) -> bool {
        match self {
            Self::Never => false,
            Self::OnFailure => failed,
            Self::OnFailureOrDisconnect => failed || disconnected,
        }
    }
}

/// Terminal status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Complete,
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// State of one generation request.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub prompt: String,
    pub sandbox_id: Option<String>,
    pub project_dir: Option<String>,
    pub turns: u32,
    pub status: SessionStatus,
    pub preview_url: Option<String>,
    /// Files the model wrote
    pub files_created: usize,
    /// Files replaced by fallbacks
    pub failsafe_files: usize,
    pub error: Option<String>,
    /// Whether the sandbox was removed at the end of the session
    pub torn_down: bool,
}

impl Session {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            sandbox_id: None,
            project_dir: None,
            turns: 0,
            status: SessionStatus::Pending,
            preview_url: None,
            files_created: 0,
            failsafe_files: 0,
            error: None,
            torn_down: false,
        }
    }
}

/// Settings for a [`SessionRunner`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub profile: GenerationProfile,
    pub sandbox: SandboxSpec,
    pub deploy: DeploySettings,
    pub teardown: TeardownPolicy,
    /// Limit for each `Bash` tool call
    pub bash_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            profile: GenerationProfile::default(),
            sandbox: SandboxSpec::default(),
            deploy: DeploySettings::default(),
            teardown: TeardownPolicy::default(),
            bash_timeout: BASH_TIMEOUT,
        }
    }
}

/// Runs generation sessions against a sandbox provider and a model.
#[derive(Clone)]
pub struct SessionRunner {
    provider: Arc<dyn SandboxProvider>,
    llm: Arc<dyn LlmClient>,
    settings: SessionSettings,
}

impl SessionRunner {
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        llm: Arc<dyn LlmClient>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            provider,
            llm,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn provider(&self) -> Arc<dyn SandboxProvider> {
        self.provider.clone()
    }

    /// Run a session to completion. Never fails: the outcome is reported on
    /// the sink and in the returned [`Session`].
    pub async fn run(&self, prompt: &str, sink: &EventSink) -> Session {
        let mut session = Session::new(prompt);
        session.status = SessionStatus::Running;
        info!("Session {} started", session.id);

        let mut sandbox: Option<Arc<dyn Sandbox>> = None;
        let result = self.execute(&mut session, &mut sandbox, sink).await;

        match result {
            Ok(()) => {
                session.status = SessionStatus::Complete;
                info!("Session {} complete", session.id);
            }
            Err(e) => {
                session.status = SessionStatus::Error;
                session.error = Some(e.to_string());
                error!("Session {} failed: {}", session.id, e);

                if let (Some(sandbox), Some(project_dir)) = (&sandbox, &session.project_dir) {
                    if !sink.is_disconnected() {
                        collect_diagnostics(sandbox, project_dir, sink).await;
                    }
                }
                sink.emit(ProgressEvent::error(e.to_string())).await;
            }
        }

        let failed = session.status == SessionStatus::Error;
        if let Some(sandbox) = &sandbox {
            if self
                .settings
                .teardown
                .should_remove(failed, sink.is_disconnected())
            {
                match self.provider.remove(sandbox.id()).await {
                    Ok(()) => {
                        info!("Removed sandbox {}", sandbox.id());
                        session.torn_down = true;
                    }
                    Err(e) => warn!("Failed to remove sandbox {}: {}", sandbox.id(), e),
                }
            }
        }
        session
    }

    async fn execute(
        &self,
        session: &mut Session,
        slot: &mut Option<Arc<dyn Sandbox>>,
        sink: &EventSink,
    ) -> PipelineResult<()> {
        let profile = &self.settings.profile;

        sink.progress("Creating sandbox environment...").await;
        let sandbox = self.provider.create(&self.settings.sandbox).await?;
        *slot = Some(sandbox.clone());
        session.sandbox_id = Some(sandbox.id().to_string());
        sink.progress(format!("Sandbox created: {}", sandbox.id())).await;
        check_cancelled(sink)?;

        let root = sandbox.user_root_dir().await?;
        let project_dir = project_dir_for(&root);
        session.project_dir = Some(project_dir.clone());
        let mkdir = sandbox
            .execute_command(
                &format!("mkdir -p {}", yeevu_sandbox::shell::quote(&project_dir)),
                &CommandOptions::new(),
            )
            .await?;
        if !mkdir.success() {
            return Err(PipelineError::Sandbox(
                yeevu_sandbox::SandboxError::ExecutionFailed(mkdir.result),
            ));
        }
        sink.log(format!("Project directory: {}", project_dir)).await;

        sink.progress(format!(
            "Starting AI generation ({} profile, up to {} turns)...",
            profile.kind, profile.max_turns
        ))
        .await;
        let executor = ToolExecutor::new(sandbox.clone(), project_dir.clone())
            .allow(&profile.allowed_tools)
            .bash_timeout(self.settings.bash_timeout);
        let generation_loop = GenerationLoop::new(self.llm.clone(), executor, profile.max_turns);
        let result = generation_loop
            .run(profile.brief(&session.prompt), sink)
            .await;
        session.turns = generation_loop.turns_taken();
        let generation = result?;
        session.files_created = generation.files_written.len();
        sink.progress(format!(
            "Generation finished after {} turns, {} files written",
            generation.turns, session.files_created
        ))
        .await;
        check_cancelled(sink)?;

        sink.progress("Validating required files...").await;
        let failsafe = apply_failsafe(&sandbox, &project_dir, profile, &session.prompt, sink).await?;
        session.failsafe_files = failsafe.repaired.len();
        check_cancelled(sink)?;

        let deployment = Deployer::new(sandbox.clone(), project_dir, self.settings.deploy.clone())
            .run(sink)
            .await?;
        session.preview_url = Some(deployment.preview_url.clone());

        sink.emit(ProgressEvent::Complete {
            preview_url: deployment.preview_url,
            sandbox_id: sandbox.id().to_string(),
            files_created: session.files_created,
            failsafe_files: session.failsafe_files,
        })
        .await;
        Ok(())
    }
}

fn check_cancelled(sink: &EventSink) -> PipelineResult<()> {
    if sink.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

/// Emit best-effort debugging output for a failed session.
async fn collect_diagnostics(sandbox: &Arc<dyn Sandbox>, project_dir: &str, sink: &EventSink) {
    let probes = [
        ("Directory contents", "pwd && ls -la".to_string()),
        (
            "package.json",
            "test -f package.json && head -10 package.json || echo 'No package.json'".to_string(),
        ),
        (
            "App directory",
            "test -d app && ls -la app || echo 'No app directory'".to_string(),
        ),
        (
            "Server logs",
            format!(
                "test -f {log} && tail -20 {log} || echo 'No server logs'",
                log = DEV_SERVER_LOG
            ),
        ),
    ];
    let options = CommandOptions::new().cwd(project_dir);
    for (label, command) in probes {
        if let Ok(output) = sandbox.execute_command(&command, &options).await {
            sink.log(format!("{}:\n{}", label, output.result.trim_end()))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_policy() {
        assert!(!TeardownPolicy::Never.should_remove(true, true));
        assert!(TeardownPolicy::OnFailure.should_remove(true, false));
        assert!(!TeardownPolicy::OnFailure.should_remove(false, true));
        assert!(TeardownPolicy::OnFailureOrDisconnect.should_remove(false, true));
        assert!(!TeardownPolicy::OnFailureOrDisconnect.should_remove(false, false));
    }

    #[test]
    fn test_project_dir_for() {
        assert_eq!(project_dir_for("/home/daytona"), "/home/daytona/website-project");
        assert_eq!(project_dir_for("/root/"), "/root/website-project");
    }

    #[test]
    fn test_session_defaults() {
        let session = Session::new("portfolio site");
        assert_eq!(session.status, SessionStatus::Pending);
        assert!(session.sandbox_id.is_none());
        assert_eq!(SessionStatus::Complete.to_string(), "complete");
    }
}
