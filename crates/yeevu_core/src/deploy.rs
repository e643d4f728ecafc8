//! Deployment stage: install, start the dev server, wait for it, resolve the preview URL.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use yeevu_sandbox::{CommandOptions, CommandOutput, Sandbox, SandboxResult};

use crate::error::{PipelineError, PipelineResult};
use crate::events::{preview, EventSink};

/// File the dev server writes its output to, inside the project directory.
pub const DEV_SERVER_LOG: &str = "dev-server.log";

/// Deployment tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Port the dev server listens on
    pub port: u16,
    /// Timeout for each install attempt
    #[serde(with = "duration_secs")]
    pub install_timeout: Duration,
    /// Health probes before giving up
    pub health_attempts: u32,
    /// Delay before each health probe
    #[serde(with = "duration_secs")]
    pub health_interval: Duration,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            port: 3000,
            install_timeout: Duration::from_secs(300),
            health_attempts: 15,
            health_interval: Duration::from_secs(2),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Outcome of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub preview_url: String,
    /// Whether a health probe returned 2xx
    pub healthy: bool,
    /// Health probes made
    pub attempts: u32,
    /// Whether install needed the clean retry
    pub install_retried: bool,
}

/// Runs the deployment steps for one project directory.
pub struct Deployer {
    sandbox: Arc<dyn Sandbox>,
    project_dir: String,
    settings: DeploySettings,
}

impl Deployer {
    pub fn new(sandbox: Arc<dyn Sandbox>, project_dir: impl Into<String>, settings: DeploySettings) -> Self {
        Self {
            sandbox,
            project_dir: project_dir.into(),
            settings,
        }
    }

    fn options(&self) -> CommandOptions {
        CommandOptions::new().cwd(self.project_dir.clone())
    }

    async fn run_command(&self, command: &str, options: &CommandOptions) -> SandboxResult<CommandOutput> {
        self.sandbox.execute_command(command, options).await
    }

    /// Run every step. Install failure after retry and preview failure are
    /// fatal; an unhealthy server is not.
    pub async fn run(&self, sink: &EventSink) -> PipelineResult<DeployOutcome> {
        let install_retried = self.install(sink).await?;
        check_cancelled(sink)?;

        self.start_dev_server(sink).await?;
        check_cancelled(sink)?;

        let (healthy, attempts) = self.wait_until_ready(sink).await?;
        check_cancelled(sink)?;

        let preview_url = self.preview_url().await?;
        sink.progress(format!("Preview available at {}", preview_url))
            .await;

        Ok(DeployOutcome {
            preview_url,
            healthy,
            attempts,
            install_retried,
        })
    }

    /// Install dependencies, retrying once from a clean state.
    ///
    /// Returns whether the retry was needed.
    pub async fn install(&self, sink: &EventSink) -> PipelineResult<bool> {
        sink.progress("Installing project dependencies...").await;
        let options = self.options().timeout(self.settings.install_timeout);

        let first = self.run_command("npm install", &options).await;
        match &first {
            Ok(output) if output.success() => {
                sink.progress("Dependencies installed").await;
                return Ok(false);
            }
            Ok(output) => {
                warn!("npm install failed with exit code {}", output.exit_code);
                sink.log(format!(
                    "npm install failed (exit {}): {}",
                    output.exit_code,
                    tail_chars(&output.result, 500)
                ))
                .await;
            }
            Err(e) => {
                warn!("npm install failed: {}", e);
                sink.log(format!("npm install failed: {}", e)).await;
            }
        }

        sink.progress("Retrying npm install from a clean state...").await;
        self.run_command("rm -rf node_modules package-lock.json", &self.options())
            .await?;

        match self
            .run_command("npm install --no-audit --no-fund", &options)
            .await
        {
            Ok(output) if output.success() => {
                sink.progress("Dependencies installed after retry").await;
                Ok(true)
            }
            Ok(output) => Err(PipelineError::InstallFailed(tail_chars(&output.result, 1000))),
            Err(e) => Err(PipelineError::InstallFailed(e.to_string())),
        }
    }

    /// Launch the dev server detached from the command session.
    pub async fn start_dev_server(&self, sink: &EventSink) -> PipelineResult<()> {
        sink.progress("Starting development server...").await;

        self.run_command(
            "pkill -f 'npm run dev' || pkill -f 'next dev' || true",
            &self.options(),
        )
        .await?;

        let command = format!(
            "nohup npm run dev -- --port {} > {} 2>&1 &",
            self.settings.port, DEV_SERVER_LOG
        );
        let options = self.options().env("PORT", self.settings.port.to_string());
        let output = self.run_command(&command, &options).await?;
        if !output.success() {
            warn!("Dev server launch returned exit code {}", output.exit_code);
        }
        info!("Dev server launched on port {}", self.settings.port);
        Ok(())
    }

    /// Poll the dev server until it answers 2xx or the attempt budget runs out.
    ///
    /// Returns `(healthy, attempts)`.
    pub async fn wait_until_ready(&self, sink: &EventSink) -> PipelineResult<(bool, u32)> {
        let probe = format!(
            "curl -s -o /dev/null -w '%{{http_code}}' http://localhost:{} || echo 'failed'",
            self.settings.port
        );
        let max = self.settings.health_attempts;

        for attempt in 1..=max {
            tokio::time::sleep(self.settings.health_interval).await;
            check_cancelled(sink)?;

            let status = match self.run_command(&probe, &self.options()).await {
                Ok(output) => output.result.trim().to_string(),
                Err(e) => format!("error: {}", e),
            };
            if is_success_status(&status) {
                info!("Dev server responded with {} after {} attempts", status, attempt);
                sink.progress("Development server is running and responding").await;
                return Ok((true, attempt));
            }

            sink.log(format!(
                "Dev server not ready yet ({}/{}): got {}",
                attempt, max, status
            ))
            .await;
            if attempt % 3 == 0 {
                let tail = self
                    .run_command(
                        &format!("tail -5 {} || echo 'No logs yet'", DEV_SERVER_LOG),
                        &self.options(),
                    )
                    .await;
                if let Ok(tail) = tail {
                    sink.log(format!("Recent server logs:\n{}", tail.result)).await;
                }
            }
        }

        warn!("Dev server did not become healthy after {} attempts", max);
        if let Ok(full) = self
            .run_command(&format!("cat {} || echo 'No logs'", DEV_SERVER_LOG), &self.options())
            .await
        {
            sink.log(format!("Full server logs:\n{}", full.result)).await;
        }
        sink.progress("Server may still be starting; proceeding despite health check issues")
            .await;
        Ok((false, max))
    }

    /// Resolve the public preview link for the dev server port.
    pub async fn preview_url(&self) -> PipelineResult<String> {
        match self.sandbox.preview_link(self.settings.port).await {
            Ok(link) if !link.url.is_empty() => Ok(link.url),
            Ok(_) => Err(PipelineError::PreviewFailed("Preview URL not generated".to_string())),
            Err(e) => Err(PipelineError::PreviewFailed(e.to_string())),
        }
    }
}

fn check_cancelled(sink: &EventSink) -> PipelineResult<()> {
    if sink.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

fn is_success_status(status: &str) -> bool {
    matches!(status.parse::<u16>(), Ok(code) if (200..300).contains(&code))
}

/// Last `max` characters of `text`.
fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let skipped: String = text.chars().skip(count - max).collect();
    format!("...{}", preview(&skipped, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use yeevu_sandbox::{MockResponse, MockSandbox};

    fn fast_settings() -> DeploySettings {
        DeploySettings {
            health_interval: Duration::ZERO,
            ..DeploySettings::default()
        }
    }

    fn deployer(mock: &MockSandbox) -> Deployer {
        Deployer::new(Arc::new(mock.clone()), "/p", fast_settings())
    }

    #[test]
    fn test_status_parsing() {
        assert!(is_success_status("200"));
        assert!(is_success_status("204"));
        assert!(!is_success_status("500"));
        assert!(!is_success_status("000failed"));
        assert!(!is_success_status("failed"));
    }

    #[tokio::test]
    async fn test_install_retries_once() {
        let mock = MockSandbox::default()
            .respond_to("npm install --no-audit", MockResponse::success("added 312 packages"))
            .respond_to("npm install", MockResponse::failure(1, "ERESOLVE"));
        let (sink, _rx) = EventSink::channel(64);

        let retried = deployer(&mock).install(&sink).await.unwrap();
        assert!(retried);
        assert_eq!(mock.count_matching("rm -rf node_modules package-lock.json"), 1);

        let install = &mock.get_commands()[0];
        assert_eq!(install.options.timeout, Some(Duration::from_secs(300)));
        assert_eq!(install.options.cwd.as_deref(), Some("/p"));
    }

    #[tokio::test]
    async fn test_install_fails_after_retry() {
        let mock = MockSandbox::default().respond_to("npm install", MockResponse::failure(1, "ENOSPC"));
        let (sink, _rx) = EventSink::channel(64);

        let err = deployer(&mock).install(&sink).await.unwrap_err();
        assert!(err.to_string().contains("npm install failed after retry"));
        assert!(err.to_string().contains("ENOSPC"));
        assert_eq!(mock.count_matching("npm install"), 2);
    }

    #[tokio::test]
    async fn test_dev_server_launch_is_detached() {
        let mock = MockSandbox::default();
        let (sink, _rx) = EventSink::channel(64);

        deployer(&mock).start_dev_server(&sink).await.unwrap();

        let commands = mock.get_commands();
        assert!(commands[0].command.starts_with("pkill"));
        assert_eq!(
            commands[1].command,
            "nohup npm run dev -- --port 3000 > dev-server.log 2>&1 &"
        );
        assert_eq!(commands[1].options.env.get("PORT"), Some(&"3000".to_string()));
    }

    #[tokio::test]
    async fn test_health_check_succeeds_on_2xx() {
        let mock = MockSandbox::default()
            .respond_to("curl", MockResponse::success("000failed"))
            .respond_to("curl", MockResponse::success("200"));
        let (sink, _rx) = EventSink::channel(64);

        let (healthy, attempts) = deployer(&mock).wait_until_ready(&sink).await.unwrap();
        assert!(healthy);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_health_check_exhaustion_is_not_fatal() {
        let mock = MockSandbox::default()
            .respond_to("curl", MockResponse::success("500"))
            .respond_to("tail -5", MockResponse::success("compiling..."))
            .respond_to("cat dev-server.log", MockResponse::success("full log"));
        let (sink, mut rx) = EventSink::channel(256);

        let (healthy, attempts) = deployer(&mock).wait_until_ready(&sink).await.unwrap();
        assert!(!healthy);
        assert_eq!(attempts, 15);
        assert_eq!(mock.count_matching("curl"), 15);
        assert_eq!(mock.count_matching("tail -5"), 5);
        assert_eq!(mock.count_matching("cat dev-server.log"), 1);

        drop(sink);
        let mut saw_full_log = false;
        while let Some(event) = rx.recv().await {
            if let crate::events::ProgressEvent::BackendLog { message, .. } = event {
                saw_full_log |= message.contains("full log");
            }
        }
        assert!(saw_full_log);
    }

    #[tokio::test]
    async fn test_preview_failure_is_fatal() {
        let mock = MockSandbox::default().fail_preview("port closed");
        let err = deployer(&mock).preview_url().await.unwrap_err();
        assert!(err.to_string().starts_with("Preview URL generation failed"));
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abc", 5), "abc");
        assert_eq!(tail_chars("abcdef", 3), "...def");
    }
}
