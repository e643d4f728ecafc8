//! Integration tests for the HTTP surface.
//!
//! Requests are driven through the router with `tower::ServiceExt::oneshot`;
//! sandboxes and the model are replaced by the in-memory fakes or by a
//! `mockall` provider where call expectations matter.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use mockall::mock;
use serde_json::{json, Value};
use tower::ServiceExt;
use yeevu_core::{ProfileKind, YeevuConfig};
use yeevu_llm::{ContentBlock, LlmTurn, ScriptedLlm, StopReason};
use yeevu_sandbox::{
    MockResponse, MockSandbox, MockSandboxProvider, Sandbox, SandboxError, SandboxProvider,
    SandboxResult, SandboxSpec,
};
use yeevu_server::{router, AppState, DONE};

mock! {
    pub Provider {}

    #[async_trait]
    impl SandboxProvider for Provider {
        async fn create(&self, spec: &SandboxSpec) -> SandboxResult<Arc<dyn Sandbox>>;
        async fn connect(&self, id: &str) -> SandboxResult<Arc<dyn Sandbox>>;
        async fn remove(&self, id: &str) -> SandboxResult<()>;
    }
}

fn test_config() -> YeevuConfig {
    let mut config = YeevuConfig::default();
    config.generation.profile = ProfileKind::Minimal;
    config.generation.health_attempts = 1;
    config.generation.health_interval_secs = 0;
    config
}

fn state_with(provider: Arc<dyn SandboxProvider>, llm: ScriptedLlm) -> AppState {
    AppState::new(&test_config(), provider, Arc::new(llm))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// `data:` payloads of an SSE body, in order.
fn sse_data(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}

/// Test the liveness endpoint.
#[tokio::test]
async fn test_health() {
    let app = router(state_with(Arc::new(MockSandboxProvider::default()), ScriptedLlm::new()));
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

/// Test that a missing prompt is rejected before any stream opens.
#[tokio::test]
async fn test_generate_requires_prompt() {
    let provider = MockSandboxProvider::default();
    let app = router(state_with(Arc::new(provider.clone()), ScriptedLlm::new()));

    let response = app
        .oneshot(post_json("/generate", json!({ "prompt": "   " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Prompt is required");
    assert_eq!(provider.created_count(), 0);
}

/// Test that missing credentials are a plain JSON error, not a stream.
#[tokio::test]
async fn test_generate_without_credentials() {
    let app = router(AppState::from_config(&YeevuConfig::default()));

    let response = app
        .oneshot(post_json("/generate", json!({ "prompt": "A bakery" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Missing required API keys"));
}

/// Test a full session streamed as SSE, ending with `complete` then `[DONE]`.
#[tokio::test]
async fn test_generate_streams_events() {
    let sandbox = MockSandbox::new("sb-stream").respond_to("curl", MockResponse::success("200"));
    let provider = MockSandboxProvider::new(sandbox);
    let llm = ScriptedLlm::new()
        .then(LlmTurn::new(
            vec![
                ContentBlock::text("Writing the homepage"),
                ContentBlock::tool_use(
                    "w1",
                    "Write",
                    json!({
                        "file_path": "app/page.tsx",
                        "content": "export default function Page() { return <main>Hi</main>; }"
                    }),
                ),
            ],
            StopReason::ToolUse,
        ))
        .then(LlmTurn::text("Done"));
    let app = router(state_with(Arc::new(provider), llm));

    let response = app
        .oneshot(post_json("/generate", json!({ "prompt": "A florist" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let data = sse_data(&body_bytes(response).await);
    assert_eq!(data.last().map(String::as_str), Some(DONE));

    let events: Vec<Value> = data[..data.len() - 1]
        .iter()
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();
    assert_eq!(events[0]["type"], "progress");
    assert!(events.iter().any(|e| e["type"] == "claude_message"));
    assert!(events
        .iter()
        .any(|e| e["type"] == "tool_use" && e["input"]["file_path"] == "app/page.tsx"));

    let complete = events.last().unwrap();
    assert_eq!(complete["type"], "complete");
    assert_eq!(complete["sandboxId"], "sb-stream");
    assert_eq!(complete["previewUrl"], "https://3000-sb-stream.preview.test");
    assert_eq!(complete["filesCreated"], 1);
    assert_eq!(complete["failsafeFiles"], 2);
}

/// Test that remote clients are limited by the daily quota.
#[tokio::test]
async fn test_generate_quota_exhausted() {
    let mut config = test_config();
    config.quota.daily_capacity = 1;
    let state = AppState::new(
        &config,
        Arc::new(MockSandboxProvider::default()),
        Arc::new(ScriptedLlm::new()),
    );

    let remote = || {
        let mut request = post_json("/generate", json!({ "prompt": "A gym" }));
        request
            .headers_mut()
            .insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
        request
    };

    let first = router(state.clone()).oneshot(remote()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = router(state.clone()).oneshot(remote()).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(second).await;
    assert_eq!(body["error"], "Daily generation limit reached");
    assert!(body["resetTime"].is_string());

    // loopback clients stay exempt
    let local = router(state)
        .oneshot(post_json("/generate", json!({ "prompt": "A gym" })))
        .await
        .unwrap();
    assert_eq!(local.status(), StatusCode::OK);
}

/// Test that download requires a sandbox id.
#[tokio::test]
async fn test_download_requires_sandbox_id() {
    let app = router(state_with(Arc::new(MockSandboxProvider::default()), ScriptedLlm::new()));

    let response = app.oneshot(post_json("/download", json!({}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Sandbox ID is required");
}

/// Test downloading a project as a zip attachment.
#[tokio::test]
async fn test_download_returns_zip() {
    let sandbox = MockSandbox::new("f11f1074-76af-4b49-bdc9-082a60558055")
        .with_file("/home/daytona/website-project/package.json", "{}")
        .with_file(
            "/home/daytona/website-project/app/page.tsx",
            "export default function Page() {}",
        );
    let app = router(state_with(
        Arc::new(MockSandboxProvider::new(sandbox)),
        ScriptedLlm::new(),
    ));

    let response = app
        .oneshot(post_json(
            "/download",
            json!({ "sandboxId": "f11f1074-76af-4b49-bdc9-082a60558055" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"website-project-f11f1074.zip\""
    );

    let bytes = body_bytes(response).await;
    let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort();
    assert_eq!(names, vec!["app/page.tsx", "package.json"]);
}

/// Test that provider failures during download are reported as 500.
#[tokio::test]
async fn test_download_unknown_sandbox() {
    let mut provider = MockProvider::new();
    provider
        .expect_connect()
        .withf(|id: &str| id == "missing")
        .times(1)
        .returning(|id| Err(SandboxError::NotFound(id.to_string())));
    let app = router(state_with(Arc::new(provider), ScriptedLlm::new()));

    let response = app
        .oneshot(post_json("/download", json!({ "sandboxId": "missing" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("Download failed:"));
}

/// Test explicit sandbox removal.
#[tokio::test]
async fn test_remove_sandbox() {
    let mut provider = MockProvider::new();
    provider
        .expect_remove()
        .withf(|id: &str| id == "sb-1")
        .times(1)
        .returning(|_| Ok(()));
    provider
        .expect_remove()
        .withf(|id: &str| id == "sb-gone")
        .times(1)
        .returning(|id| Err(SandboxError::NotFound(id.to_string())));
    let state = state_with(Arc::new(provider), ScriptedLlm::new());

    let removed = router(state.clone())
        .oneshot(Request::delete("/sandbox/sb-1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(removed.status(), StatusCode::OK);
    assert_eq!(body_json(removed).await["removed"], "sb-1");

    let missing = router(state)
        .oneshot(Request::delete("/sandbox/sb-gone").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
