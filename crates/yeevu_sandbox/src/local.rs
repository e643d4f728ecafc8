//! Directory-backed sandboxes for local development.
//!
//! Each sandbox is a directory under a base path; commands run through
//! `sh -c` on the host with that directory as the default working directory.
//! There is no isolation beyond the directory boundary.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{CommandOptions, SandboxSpec};
use crate::error::{SandboxError, SandboxResult};
use crate::sandbox::{CommandOutput, PreviewLink, Sandbox, SandboxProvider};
use crate::shell;

/// Provider creating sandboxes as directories on the host.
pub struct LocalProvider {
    base_dir: PathBuf,
}

impl LocalProvider {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn sandbox_dir(&self, id: &str) -> SandboxResult<PathBuf> {
        if id.is_empty() || id.contains('/') || id.contains("..") {
            return Err(SandboxError::NotFound(id.to_string()));
        }
        Ok(self.base_dir.join(id))
    }
}

#[async_trait]
impl SandboxProvider for LocalProvider {
    async fn create(&self, spec: &SandboxSpec) -> SandboxResult<Arc<dyn Sandbox>> {
        let id = uuid::Uuid::new_v4().to_string();
        let root = self.sandbox_dir(&id)?;
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SandboxError::CreateFailed(e.to_string()))?;

        info!("Created local sandbox {} (image {} ignored)", id, spec.image);
        Ok(Arc::new(LocalSandbox::new(id, root)))
    }

    async fn connect(&self, id: &str) -> SandboxResult<Arc<dyn Sandbox>> {
        let root = self.sandbox_dir(id)?;
        if !root.is_dir() {
            return Err(SandboxError::NotFound(id.to_string()));
        }
        Ok(Arc::new(LocalSandbox::new(id.to_string(), root)))
    }

    async fn remove(&self, id: &str) -> SandboxResult<()> {
        let root = self.sandbox_dir(id)?;
        if !root.exists() {
            return Err(SandboxError::NotFound(id.to_string()));
        }
        tokio::fs::remove_dir_all(&root).await?;
        info!("Removed local sandbox {}", id);
        Ok(())
    }
}

/// A sandbox rooted at a host directory.
pub struct LocalSandbox {
    id: String,
    root: PathBuf,
}

impl LocalSandbox {
    pub fn new(id: String, root: PathBuf) -> Self {
        Self { id, root }
    }

    /// Host directory backing this sandbox.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn user_root_dir(&self) -> SandboxResult<String> {
        Ok(self.root.to_string_lossy().to_string())
    }

    async fn execute_command(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> SandboxResult<CommandOutput> {
        let cwd = options
            .cwd
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.root.clone());

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("[{}] Executing: {}", self.id, command);
        let started = Instant::now();

        let child = cmd.spawn().map_err(|e| {
            SandboxError::ExecutionFailed(format!("Failed to spawn sh: {}", e))
        })?;

        let output = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("[{}] Command timed out after {:?}: {}", self.id, limit, command);
                    return Err(SandboxError::Timeout(options.timeout_secs().unwrap_or(0)));
                }
            },
            None => child.wait_with_output().await?,
        };

        let mut result = String::from_utf8_lossy(&output.stdout).to_string();
        result.push_str(&String::from_utf8_lossy(&output.stderr));
        let exit_code = output.status.code().unwrap_or(-1) as i64;

        debug!(
            "[{}] Exit code {} after {}ms",
            self.id,
            exit_code,
            started.elapsed().as_millis()
        );

        Ok(CommandOutput { exit_code, result })
    }

    async fn preview_link(&self, port: u16) -> SandboxResult<PreviewLink> {
        Ok(PreviewLink {
            url: format!("http://localhost:{}", port),
            token: None,
        })
    }

    async fn upload_file(&self, path: &str, content: &[u8]) -> SandboxResult<()> {
        let path = Path::new(path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn download_file(&self, path: &str) -> SandboxResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_files(&self, dir: &str) -> SandboxResult<Vec<String>> {
        let base = PathBuf::from(dir);
        let mut files = Vec::new();
        for entry in WalkDir::new(&base).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match entry.path().strip_prefix(&base) {
                Ok(p) => p.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            if shell::is_listable(&relative) {
                files.push(relative);
            }
        }
        files.sort();
        Ok(files)
    }
}
