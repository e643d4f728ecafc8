//! `POST /generate`: run a session and stream its events as SSE.
//!
//! Each event is sent as `data: <json>`; the stream ends with `data: [DONE]`.
//! Validation, credential and quota failures are answered with a plain JSON
//! error before the stream opens.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};
use yeevu_core::{EventSink, ProgressEvent};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Terminal sentinel after the last event.
pub const DONE: &str = "[DONE]";

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Serialize an event as an SSE frame.
pub fn to_sse_event(event: &ProgressEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(data) => Event::default().data(data),
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            Event::default().data(r#"{"type":"error","message":"Failed to serialize event"}"#)
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub async fn generate(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> ServerResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let prompt = request
        .prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Prompt is required".to_string()))?;

    let runner = state.runner()?;
    state.admit(
        header(&headers, "x-forwarded-for"),
        header(&headers, "x-real-ip"),
        peer.map(|ConnectInfo(addr)| addr.ip()),
    )?;

    info!("Starting generation for prompt: {}", prompt);
    let (sink, events) = EventSink::channel(EVENT_BUFFER);

    tokio::spawn(async move {
        let session_sink = sink.clone();
        let session = tokio::spawn(async move { runner.run(&prompt, &session_sink).await });
        match session.await {
            Ok(session) => info!("Session {} ended: {}", session.id, session.status),
            Err(e) => {
                error!("Session task failed: {}", e);
                sink.emit(ProgressEvent::error(format!("Internal error: {}", e)))
                    .await;
            }
        }
    });

    let stream = ReceiverStream::new(events)
        .map(|event| Ok::<_, Infallible>(to_sse_event(&event)))
        .chain(stream::once(async { Ok::<_, Infallible>(Event::default().data(DONE)) }));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
