//! Router and the non-streaming handlers.

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use yeevu_core::{archive_file_name, build_archive, project_dir_for, PipelineError};

use crate::error::{ServerError, ServerResult};
use crate::generate::generate;
use crate::state::AppState;

/// All routes with their middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/download", post(download))
        .route("/sandbox/:id", delete(remove_sandbox))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: AppState, bind: &str) -> ServerResult<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    })
    .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    #[serde(default)]
    pub sandbox_id: Option<String>,
}

/// Zip the project directory of a sandbox.
pub async fn download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> ServerResult<Response> {
    let sandbox_id = request
        .sandbox_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("Sandbox ID is required".to_string()))?;
    let provider = state.provider()?;

    info!("Starting download for sandbox {}", sandbox_id);
    let archive = async {
        let sandbox = provider.connect(&sandbox_id).await?;
        let root = sandbox.user_root_dir().await?;
        build_archive(&sandbox, &project_dir_for(&root)).await
    }
    .await
    .map_err(|e: PipelineError| {
        error!("Download failed for {}: {}", sandbox_id, e);
        ServerError::Download(e.to_string())
    })?;
    info!("Archive for {} is {} bytes", sandbox_id, archive.len());

    Ok((
        [
            (CONTENT_TYPE, "application/zip".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", archive_file_name(&sandbox_id)),
            ),
        ],
        archive,
    )
        .into_response())
}

/// Tear down a sandbox and its dev server.
pub async fn remove_sandbox(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Value>> {
    state.provider()?.remove(&id).await?;
    info!("Removed sandbox {}", id);
    Ok(Json(json!({ "removed": id })))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
