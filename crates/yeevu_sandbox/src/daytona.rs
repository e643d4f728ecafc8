//! Daytona implementation of [`SandboxProvider`].
//!
//! Talks to the Daytona REST API. Only process execution, preview links and
//! sandbox lifecycle endpoints are used; file transfer goes through the
//! command channel (see [`crate::shell`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CommandOptions, SandboxSpec};
use crate::error::{SandboxError, SandboxResult};
use crate::sandbox::{CommandOutput, PreviewLink, Sandbox, SandboxProvider};
use crate::shell;

pub const DEFAULT_API_URL: &str = "https://app.daytona.io/api";

/// Thin authenticated client shared by the provider and its sandboxes.
struct DaytonaApi {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl DaytonaApi {
    async fn request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        timeout: Option<Duration>,
    ) -> SandboxResult<T> {
        let url = format!("{}{}", self.api_url.trim_end_matches('/'), path);
        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_key);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SandboxError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SandboxError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            // DELETE and friends answer with an empty body
            return Ok(serde_json::from_str("null")?);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Provider backed by the Daytona cloud.
pub struct DaytonaProvider {
    api: Arc<DaytonaApi>,
    start_timeout: Duration,
    poll_interval: Duration,
}

impl DaytonaProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_api_url(api_key, DEFAULT_API_URL)
    }

    pub fn with_api_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            api: Arc::new(DaytonaApi {
                client: reqwest::Client::new(),
                api_url: api_url.into(),
                api_key: api_key.into(),
            }),
            start_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// How long `create` waits for the sandbox to report `started`.
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn wait_until_started(&self, id: &str) -> SandboxResult<()> {
        let started = std::time::Instant::now();
        loop {
            let info: SandboxInfo = self
                .api
                .request::<(), _>(Method::GET, &format!("/sandbox/{}", id), None, None)
                .await?;
            match info.state.as_deref() {
                Some("started") => return Ok(()),
                Some("error") | Some("build_failed") | Some("destroyed") => {
                    return Err(SandboxError::CreateFailed(format!(
                        "sandbox {} entered state {}",
                        id,
                        info.state.unwrap_or_default()
                    )));
                }
                state => debug!("Sandbox {} state: {:?}", id, state),
            }
            if started.elapsed() >= self.start_timeout {
                return Err(SandboxError::StartTimeout(self.start_timeout.as_secs()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl SandboxProvider for DaytonaProvider {
    async fn create(&self, spec: &SandboxSpec) -> SandboxResult<Arc<dyn Sandbox>> {
        info!("Creating Daytona sandbox from image {}", spec.image);
        let request = CreateSandboxRequest {
            image: &spec.image,
            public: spec.public,
            labels: &spec.labels,
        };
        let info: SandboxInfo = self
            .api
            .request(Method::POST, "/sandbox", Some(&request), None)
            .await
            .map_err(|e| SandboxError::CreateFailed(e.to_string()))?;

        if info.state.as_deref() != Some("started") {
            self.wait_until_started(&info.id).await?;
        }

        info!("Daytona sandbox {} is running", info.id);
        Ok(Arc::new(DaytonaSandbox {
            id: info.id,
            api: self.api.clone(),
        }))
    }

    async fn connect(&self, id: &str) -> SandboxResult<Arc<dyn Sandbox>> {
        let info: SandboxInfo = self
            .api
            .request::<(), _>(Method::GET, &format!("/sandbox/{}", id), None, None)
            .await?;
        if info.state.as_deref() != Some("started") {
            warn!("Sandbox {} is in state {:?}", id, info.state);
        }
        Ok(Arc::new(DaytonaSandbox {
            id: info.id,
            api: self.api.clone(),
        }))
    }

    async fn remove(&self, id: &str) -> SandboxResult<()> {
        info!("Removing Daytona sandbox {}", id);
        let _: serde_json::Value = self
            .api
            .request::<(), _>(Method::DELETE, &format!("/sandbox/{}", id), None, None)
            .await?;
        Ok(())
    }
}

/// A running Daytona sandbox.
pub struct DaytonaSandbox {
    id: String,
    api: Arc<DaytonaApi>,
}

#[async_trait]
impl Sandbox for DaytonaSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn user_root_dir(&self) -> SandboxResult<String> {
        let response: ProjectDirResponse = self
            .api
            .request::<(), _>(
                Method::GET,
                &format!("/toolbox/{}/toolbox/project-dir", self.id),
                None,
                None,
            )
            .await?;
        Ok(response.dir)
    }

    async fn execute_command(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> SandboxResult<CommandOutput> {
        let wrapped = format!("sh -c {}", shell::quote(&shell::with_env(command, &options.env)));
        let request = ExecuteRequest {
            command: &wrapped,
            cwd: options.cwd.as_deref(),
            timeout: options.timeout_secs(),
        };
        debug!("[{}] Executing: {}", self.id, command);

        // Give the HTTP call a little longer than the remote timeout
        let http_timeout = options.timeout.map(|t| t + Duration::from_secs(30));
        let result: SandboxResult<CommandOutput> = self
            .api
            .request(
                Method::POST,
                &format!("/toolbox/{}/toolbox/process/execute", self.id),
                Some(&request),
                http_timeout,
            )
            .await;

        match result {
            Err(SandboxError::Http(e)) if e.is_timeout() => {
                Err(SandboxError::Timeout(options.timeout_secs().unwrap_or(0)))
            }
            other => other,
        }
    }

    async fn preview_link(&self, port: u16) -> SandboxResult<PreviewLink> {
        let link: PreviewLink = self
            .api
            .request::<(), _>(
                Method::GET,
                &format!("/sandbox/{}/ports/{}/preview-url", self.id, port),
                None,
                None,
            )
            .await
            .map_err(|e| SandboxError::PreviewUnavailable {
                port,
                message: e.to_string(),
            })?;
        if link.url.is_empty() {
            return Err(SandboxError::PreviewUnavailable {
                port,
                message: "empty preview URL".to_string(),
            });
        }
        Ok(link)
    }
}

// Daytona API types
#[derive(Debug, Serialize)]
struct CreateSandboxRequest<'a> {
    image: &'a str,
    public: bool,
    labels: &'a std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SandboxInfo {
    id: String,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectDirResponse {
    dir: String,
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cwd: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_waits_for_started_state() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/sandbox")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({"image": "node:20", "public": true})))
            .with_status(200)
            .with_body(r#"{"id":"sb-1","state":"creating"}"#)
            .create_async()
            .await;
        let status = server
            .mock("GET", "/sandbox/sb-1")
            .with_status(200)
            .with_body(r#"{"id":"sb-1","state":"started"}"#)
            .create_async()
            .await;

        let provider = DaytonaProvider::with_api_url("test-key", server.url())
            .poll_interval(Duration::from_millis(10));
        let sandbox = provider.create(&SandboxSpec::default()).await.unwrap();

        assert_eq!(sandbox.id(), "sb-1");
        create.assert_async().await;
        status.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_fails_on_error_state() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/sandbox")
            .with_status(200)
            .with_body(r#"{"id":"sb-2","state":"creating"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/sandbox/sb-2")
            .with_status(200)
            .with_body(r#"{"id":"sb-2","state":"error"}"#)
            .create_async()
            .await;

        let provider = DaytonaProvider::with_api_url("k", server.url())
            .poll_interval(Duration::from_millis(10));
        let result = provider.create(&SandboxSpec::default()).await;
        assert!(matches!(result, Err(SandboxError::CreateFailed(_))));
    }

    #[tokio::test]
    async fn test_execute_wraps_command_with_env() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sandbox/sb-3")
            .with_status(200)
            .with_body(r#"{"id":"sb-3","state":"started"}"#)
            .create_async()
            .await;
        let execute = server
            .mock("POST", "/toolbox/sb-3/toolbox/process/execute")
            .match_body(Matcher::PartialJson(json!({
                "command": "sh -c 'export PORT='\\''3000'\\''; npm run dev'",
                "cwd": "/root/website-project",
                "timeout": 60
            })))
            .with_status(200)
            .with_body(r#"{"exitCode":0,"result":"ok"}"#)
            .create_async()
            .await;

        let provider = DaytonaProvider::with_api_url("k", server.url());
        let sandbox = provider.connect("sb-3").await.unwrap();
        let output = sandbox
            .execute_command(
                "npm run dev",
                &CommandOptions::new()
                    .cwd("/root/website-project")
                    .env("PORT", "3000")
                    .timeout(Duration::from_secs(60)),
            )
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.result, "ok");
        execute.assert_async().await;
    }

    #[tokio::test]
    async fn test_preview_link_and_remove() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sandbox/sb-4")
            .with_status(200)
            .with_body(r#"{"id":"sb-4","state":"started"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/sandbox/sb-4/ports/3000/preview-url")
            .with_status(200)
            .with_body(r#"{"url":"https://3000-sb-4.proxy.daytona.work","token":"tok"}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/sandbox/sb-4")
            .with_status(200)
            .create_async()
            .await;

        let provider = DaytonaProvider::with_api_url("k", server.url());
        let sandbox = provider.connect("sb-4").await.unwrap();
        let link = sandbox.preview_link(3000).await.unwrap();
        assert_eq!(link.url, "https://3000-sb-4.proxy.daytona.work");
        assert_eq!(link.token.as_deref(), Some("tok"));

        provider.remove("sb-4").await.unwrap();
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_sandbox_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sandbox/nope")
            .with_status(404)
            .create_async()
            .await;

        let provider = DaytonaProvider::with_api_url("k", server.url());
        let result = provider.connect("nope").await;
        assert!(matches!(result, Err(SandboxError::NotFound(_))));
    }
}
