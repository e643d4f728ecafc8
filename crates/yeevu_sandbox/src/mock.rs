//! Mock sandbox for testing.
//!
//! Provides an in-memory implementation of the [`Sandbox`] and
//! [`SandboxProvider`] traits. Files live in a map; commands are answered by
//! scripted responses matched on a substring of the command text.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::config::{CommandOptions, SandboxSpec};
use crate::error::{SandboxError, SandboxResult};
use crate::sandbox::{CommandOutput, PreviewLink, Sandbox, SandboxProvider};
use crate::shell;

/// Predefined response for a command.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub result: String,
    /// Report a timeout instead of an output
    pub timed_out: bool,
}

impl MockResponse {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            result: result.into(),
            timed_out: false,
        }
    }

    pub fn failure(exit_code: i64, result: impl Into<String>) -> Self {
        Self {
            exit_code,
            result: result.into(),
            timed_out: false,
        }
    }

    pub fn timeout() -> Self {
        Self {
            exit_code: -1,
            result: String::new(),
            timed_out: true,
        }
    }
}

/// Captured command for verification.
#[derive(Debug, Clone)]
pub struct CapturedCommand {
    pub command: String,
    pub options: CommandOptions,
    pub at: DateTime<Utc>,
}

struct ScriptedResponses {
    pattern: String,
    queue: VecDeque<MockResponse>,
}

/// In-memory sandbox.
///
/// Cloning shares state, so a test can keep a handle while the code under
/// test owns another.
#[derive(Clone)]
pub struct MockSandbox {
    id: String,
    root: String,
    files: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    responses: Arc<RwLock<Vec<ScriptedResponses>>>,
    captured: Arc<RwLock<Vec<CapturedCommand>>>,
    preview_url: String,
    preview_failure: Arc<RwLock<Option<String>>>,
}

impl Default for MockSandbox {
    fn default() -> Self {
        Self::new("mock-sandbox")
    }
}

impl MockSandbox {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            preview_url: format!("https://3000-{}.preview.test", id),
            id,
            root: "/home/daytona".to_string(),
            files: Arc::new(RwLock::new(BTreeMap::new())),
            responses: Arc::new(RwLock::new(Vec::new())),
            captured: Arc::new(RwLock::new(Vec::new())),
            preview_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Seed a file.
    pub fn with_file(self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.write().insert(path.into(), content.into());
        self
    }

    /// Queue a response for commands containing `pattern`.
    ///
    /// Responses for a pattern are consumed in order; the last one repeats.
    /// Earlier patterns take precedence over later ones.
    pub fn respond_to(self, pattern: impl Into<String>, response: MockResponse) -> Self {
        let pattern = pattern.into();
        {
            let mut responses = self.responses.write();
            match responses.iter_mut().find(|r| r.pattern == pattern) {
                Some(scripted) => scripted.queue.push_back(response),
                None => responses.push(ScriptedResponses {
                    pattern,
                    queue: VecDeque::from(vec![response]),
                }),
            }
        }
        self
    }

    /// Make `preview_link` fail.
    pub fn fail_preview(self, message: impl Into<String>) -> Self {
        *self.preview_failure.write() = Some(message.into());
        self
    }

    /// Content of a file as UTF-8, if present.
    pub fn file(&self, path: &str) -> Option<String> {
        self.files
            .read()
            .get(path)
            .map(|c| String::from_utf8_lossy(c).to_string())
    }

    /// All file paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    /// Get all captured commands.
    pub fn get_commands(&self) -> Vec<CapturedCommand> {
        self.captured.read().clone()
    }

    /// Number of captured commands containing `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.captured
            .read()
            .iter()
            .filter(|c| c.command.contains(pattern))
            .count()
    }

    fn next_response(&self, command: &str) -> Option<MockResponse> {
        let mut responses = self.responses.write();
        let scripted = responses
            .iter_mut()
            .find(|r| command.contains(r.pattern.as_str()))?;
        if scripted.queue.len() > 1 {
            scripted.queue.pop_front()
        } else {
            scripted.queue.front().cloned()
        }
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn user_root_dir(&self) -> SandboxResult<String> {
        Ok(self.root.clone())
    }

    async fn execute_command(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> SandboxResult<CommandOutput> {
        self.captured.write().push(CapturedCommand {
            command: command.to_string(),
            options: options.clone(),
            at: Utc::now(),
        });

        match self.next_response(command) {
            Some(response) if response.timed_out => Err(SandboxError::Timeout(
                options.timeout_secs().unwrap_or(0),
            )),
            Some(response) => Ok(CommandOutput::new(response.exit_code, response.result)),
            None => Ok(CommandOutput::new(0, "")),
        }
    }

    async fn preview_link(&self, port: u16) -> SandboxResult<PreviewLink> {
        if let Some(message) = self.preview_failure.read().clone() {
            return Err(SandboxError::PreviewUnavailable { port, message });
        }
        Ok(PreviewLink {
            url: self.preview_url.clone(),
            token: None,
        })
    }

    async fn upload_file(&self, path: &str, content: &[u8]) -> SandboxResult<()> {
        self.files.write().insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn download_file(&self, path: &str) -> SandboxResult<Option<Vec<u8>>> {
        Ok(self.files.read().get(path).cloned())
    }

    async fn list_files(&self, dir: &str) -> SandboxResult<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files
            .read()
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|relative| shell::is_listable(relative))
            .map(str::to_string)
            .collect())
    }
}

/// Provider handing out a single shared [`MockSandbox`].
#[derive(Clone)]
pub struct MockSandboxProvider {
    sandbox: MockSandbox,
    created: Arc<AtomicUsize>,
    removed: Arc<RwLock<Vec<String>>>,
    create_failure: Arc<RwLock<Option<String>>>,
}

impl Default for MockSandboxProvider {
    fn default() -> Self {
        Self::new(MockSandbox::default())
    }
}

impl MockSandboxProvider {
    pub fn new(sandbox: MockSandbox) -> Self {
        Self {
            sandbox,
            created: Arc::new(AtomicUsize::new(0)),
            removed: Arc::new(RwLock::new(Vec::new())),
            create_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Make `create` fail.
    pub fn fail_create(self, message: impl Into<String>) -> Self {
        *self.create_failure.write() = Some(message.into());
        self
    }

    pub fn sandbox(&self) -> &MockSandbox {
        &self.sandbox
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Ids passed to `remove`, in order.
    pub fn removed(&self) -> Vec<String> {
        self.removed.read().clone()
    }
}

#[async_trait]
impl SandboxProvider for MockSandboxProvider {
    async fn create(&self, _spec: &SandboxSpec) -> SandboxResult<Arc<dyn Sandbox>> {
        if let Some(message) = self.create_failure.read().clone() {
            return Err(SandboxError::CreateFailed(message));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.sandbox.clone()))
    }

    async fn connect(&self, id: &str) -> SandboxResult<Arc<dyn Sandbox>> {
        if id != self.sandbox.id {
            return Err(SandboxError::NotFound(id.to_string()));
        }
        Ok(Arc::new(self.sandbox.clone()))
    }

    async fn remove(&self, id: &str) -> SandboxResult<()> {
        self.removed.write().push(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_repeat_last() {
        let sandbox = MockSandbox::default()
            .respond_to("npm install", MockResponse::failure(1, "ERESOLVE"))
            .respond_to("npm install", MockResponse::success("added 300 packages"));

        let options = CommandOptions::new();
        let first = sandbox.execute_command("npm install", &options).await.unwrap();
        let second = sandbox.execute_command("npm install", &options).await.unwrap();
        let third = sandbox.execute_command("npm install", &options).await.unwrap();

        assert_eq!(first.exit_code, 1);
        assert!(second.success());
        assert_eq!(third.result, "added 300 packages");
        assert_eq!(sandbox.count_matching("npm install"), 3);
    }

    #[tokio::test]
    async fn test_unmatched_command_succeeds_empty() {
        let sandbox = MockSandbox::default();
        let output = sandbox
            .execute_command("ls", &CommandOptions::new())
            .await
            .unwrap();
        assert!(output.success());
        assert!(output.result.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_response() {
        let sandbox = MockSandbox::default().respond_to("sleep", MockResponse::timeout());
        let result = sandbox
            .execute_command(
                "sleep 100",
                &CommandOptions::new().timeout(std::time::Duration::from_secs(60)),
            )
            .await;
        assert!(matches!(result, Err(SandboxError::Timeout(60))));
    }

    #[tokio::test]
    async fn test_files_and_listing() {
        let sandbox = MockSandbox::default()
            .with_file("/p/app/page.tsx", "page")
            .with_file("/p/node_modules/a.js", "a")
            .with_file("/other/x", "x");

        sandbox.upload_file("/p/package.json", b"{}").await.unwrap();
        assert_eq!(sandbox.file("/p/package.json").as_deref(), Some("{}"));

        let files = sandbox.list_files("/p").await.unwrap();
        assert_eq!(files, vec!["app/page.tsx", "package.json"]);
    }

    #[tokio::test]
    async fn test_provider_records_removals() {
        let provider = MockSandboxProvider::default();
        let sandbox = provider.create(&SandboxSpec::default()).await.unwrap();
        assert_eq!(provider.created_count(), 1);

        provider.remove(sandbox.id()).await.unwrap();
        assert_eq!(provider.removed(), vec!["mock-sandbox".to_string()]);
        assert!(provider.connect("other").await.is_err());
    }

    #[tokio::test]
    async fn test_preview_failure() {
        let sandbox = MockSandbox::default().fail_preview("port not exposed");
        let result = sandbox.preview_link(3000).await;
        assert!(matches!(
            result,
            Err(SandboxError::PreviewUnavailable { port: 3000, .. })
        ));
    }
}
