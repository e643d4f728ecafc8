//! # yeevu_core
//!
//! Generation pipeline for Yeevu.
//!
//! A session takes a natural-language prompt and turns it into a running
//! Next.js project inside a sandbox, reporting progress as a stream of
//! [`ProgressEvent`]s.
//!
//! # Architecture
//!
//! - **Tools**: Write/Read/Edit/Bash/Glob/Grep executed against the sandbox
//! - **Generation loop**: bounded conversation between the model and the tools
//! - **Validation & failsafe**: required files are checked and repaired
//! - **Deployment**: install, dev server, health probe, preview URL
//! - **Session**: orders the stages and owns the error boundary
//!
//! # Example
//!
//! ```rust,ignore
//! use yeevu_core::{EventSink, SessionRunner, YeevuConfig};
//!
//! let config = YeevuConfig::load(None)?;
//! config.require_credentials()?;
//! let runner = SessionRunner::new(
//!     config.build_provider()?,
//!     config.build_llm()?,
//!     config.session_settings(),
//! );
//!
//! let (sink, mut events) = EventSink::channel(64);
//! tokio::spawn(async move { runner.run("A portfolio site", &sink).await });
//! while let Some(event) = events.recv().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

pub mod archive;
pub mod config;
pub mod deploy;
pub mod error;
pub mod events;
pub mod failsafe;
pub mod generation;
pub mod profile;
pub mod progress;
pub mod quota;
pub mod session;
pub mod tools;
pub mod validation;

pub use archive::{archive_file_name, build_archive};
pub use config::{SandboxProviderKind, YeevuConfig, DEFAULT_CONFIG_FILE};
pub use deploy::{DeployOutcome, DeploySettings, Deployer, DEV_SERVER_LOG};
pub use error::{PipelineError, PipelineResult};
pub use events::{EventSink, ProgressEvent};
pub use failsafe::{apply_failsafe, fallback_content, FailsafeOutcome};
pub use generation::{GenerationLoop, GenerationOutcome, LoopExit};
pub use profile::{GenerationProfile, ProfileKind};
pub use progress::{GenerationStep, GenerationSteps, StepStatus};
pub use quota::{is_local_client, DailyQuota, QuotaDecision};
pub use session::{
    project_dir_for, Session, SessionRunner, SessionSettings, SessionStatus, TeardownPolicy,
    PROJECT_DIR_NAME,
};
pub use tools::{ToolExecutor, ToolName, ToolOutput};
pub use validation::{validate_project, FileCheck, RequiredFile, ValidationReport};
