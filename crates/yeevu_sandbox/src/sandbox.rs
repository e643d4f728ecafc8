//! Sandbox traits and types.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{CommandOptions, SandboxSpec};
use crate::error::{SandboxError, SandboxResult};
use crate::shell;

/// Result of a command executed inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code reported by the sandbox
    #[serde(rename = "exitCode")]
    pub exit_code: i64,
    /// Captured output (stdout followed by stderr)
    pub result: String,
}

impl CommandOutput {
    pub fn new(exit_code: i64, result: impl Into<String>) -> Self {
        Self {
            exit_code,
            result: result.into(),
        }
    }

    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Public address for a port exposed by a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewLink {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// An isolated filesystem + process environment.
///
/// Paths passed to the file methods are absolute paths inside the sandbox.
/// The default file methods stream content through [`Sandbox::execute_command`]
/// so a provider only has to implement command execution.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Opaque identifier issued by the provider.
    fn id(&self) -> &str;

    /// Home directory of the sandbox user.
    async fn user_root_dir(&self) -> SandboxResult<String>;

    /// Execute a shell command.
    async fn execute_command(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> SandboxResult<CommandOutput>;

    /// Public link for a port.
    async fn preview_link(&self, port: u16) -> SandboxResult<PreviewLink>;

    /// Write a file, creating parent directories and overwriting existing content.
    async fn upload_file(&self, path: &str, content: &[u8]) -> SandboxResult<()> {
        for command in shell::upload_commands(path, content) {
            let output = self.execute_command(&command, &CommandOptions::new()).await?;
            if !output.success() {
                return Err(SandboxError::Transfer {
                    path: path.to_string(),
                    message: output.result,
                });
            }
        }
        Ok(())
    }

    /// Read a file. Returns `None` when the file does not exist.
    async fn download_file(&self, path: &str) -> SandboxResult<Option<Vec<u8>>> {
        let output = self
            .execute_command(&shell::download_command(path), &CommandOptions::new())
            .await?;
        shell::decode_download(path, &output)
    }

    /// List files under a directory as paths relative to it, skipping
    /// dependency and build output directories.
    async fn list_files(&self, dir: &str) -> SandboxResult<Vec<String>> {
        let output = self
            .execute_command(&shell::list_command(), &CommandOptions::new().cwd(dir))
            .await?;
        if !output.success() {
            return Err(SandboxError::ExecutionFailed(output.result));
        }
        Ok(shell::parse_listing(&output.result))
    }
}

/// Creates, reconnects to and removes sandboxes.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Create a fresh sandbox.
    async fn create(&self, spec: &SandboxSpec) -> SandboxResult<Arc<dyn Sandbox>>;

    /// Attach to an existing sandbox by id.
    async fn connect(&self, id: &str) -> SandboxResult<Arc<dyn Sandbox>>;

    /// Tear down a sandbox and everything running inside it.
    async fn remove(&self, id: &str) -> SandboxResult<()>;
}
