//! REST API and SSE routes

use crate::director::DirectorState;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use caster_core::{DriverState, Event, EventKind};
use futures::stream::{Stream, StreamExt as FuturesStreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sources", get(list_sources))
        .route("/api/director", get(director_status))
        .route("/api/director/stop", post(stop_director))
        .route("/api/standings", get(standings))
        .route("/api/commentary", get(commentary))
        .route("/api/events", get(list_events))
        .route("/api/events/next", get(next_event))
        .route("/api/events/stream", get(event_stream))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Source Endpoints ===

#[derive(Serialize)]
struct SourceInfo {
    name: String,
    detected: bool,
    active: bool,
}

async fn list_sources(State(state): State<AppState>) -> Json<Vec<SourceInfo>> {
    let sources = state.sources.read().await;
    let active_name = state.active_source.read().await;

    let info: Vec<SourceInfo> = sources
        .iter()
        .map(|source| SourceInfo {
            name: source.name().to_string(),
            detected: source.detect(),
            active: source.is_active() || active_name.as_deref() == Some(source.name()),
        })
        .collect();

    Json(info)
}

// === Director Endpoints ===

#[derive(Serialize)]
struct DirectorStatusResponse {
    state: DirectorState,
    ticks: u64,
}

async fn director_status(State(state): State<AppState>) -> Json<DirectorStatusResponse> {
    let director = state.director.read().await;
    let response = match director.as_ref() {
        Some(control) => DirectorStatusResponse {
            state: control.state(),
            ticks: control.ticks(),
        },
        None => DirectorStatusResponse {
            state: DirectorState::Idle,
            ticks: 0,
        },
    };
    Json(response)
}

async fn stop_director(State(state): State<AppState>) -> Response {
    let director = state.director.read().await;
    match director.as_ref() {
        Some(control) => {
            control.stop();
            tracing::info!("Director stop requested via API");
            (
                StatusCode::ACCEPTED,
                Json(DirectorStatusResponse {
                    state: control.state(),
                    ticks: control.ticks(),
                }),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Director not running").into_response(),
    }
}

// === Race Feed Endpoints ===

#[derive(Serialize)]
struct StandingsResponse {
    source: Option<String>,
    updated: Option<chrono::DateTime<chrono::Utc>>,
    drivers: Vec<DriverState>,
}

async fn standings(State(state): State<AppState>) -> Json<StandingsResponse> {
    let feed = state.feed.read().await;
    Json(StandingsResponse {
        source: feed.source.clone(),
        updated: feed.updated,
        drivers: feed.standings.clone(),
    })
}

#[derive(Serialize)]
struct CommentaryResponse {
    text: Option<String>,
}

async fn commentary(State(state): State<AppState>) -> Json<CommentaryResponse> {
    let feed = state.feed.read().await;
    Json(CommentaryResponse {
        text: feed.commentary.clone(),
    })
}

// === Event Endpoints ===

#[derive(Deserialize)]
struct EventQuery {
    kind: Option<EventKind>,
}

impl EventQuery {
    fn matches(&self, event: &Event) -> bool {
        self.kind.map_or(true, |kind| event.kind == kind)
    }
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Json<Vec<Event>> {
    let events = state
        .queue
        .snapshot()
        .into_iter()
        .filter(|e| query.matches(e))
        .collect();
    Json(events)
}

/// Consume the newest live event
async fn next_event(State(state): State<AppState>) -> Response {
    match state.queue.get_next() {
        Some(event) => Json(event).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let keep = result.as_ref().map_or(true, |event| query.matches(event));
        async move {
            match result {
                Ok(_) if !keep => None,
                Ok(event) => match SseEvent::default().event(event.kind.as_str()).json_data(&event) {
                    Ok(sse) => Some(Ok(sse)),
                    Err(e) => {
                        tracing::error!("Failed to serialize event: {}", e);
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!("Broadcast stream error: {}", e);
                    None
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
