//! JSON endpoints over the player contract.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rondoplayer::{Library, PlayState, Player, PlayerError, Playlist, Track};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ws;

pub(crate) type SharedPlayer = Arc<dyn Player>;

/// Build the facade router for one player.
pub fn router(player: SharedPlayer) -> Router {
    Router::new()
        .route("/player/state", post(set_state))
        .route("/player/next", post(next_track))
        .route("/track/current", get(current_track))
        .route("/track/playlist", get(playlist_tracks))
        .route("/track/browse", get(browse_root))
        .route("/track/browse/{*path}", get(browse))
        .route("/listen", get(ws::listen))
        .with_state(player)
}

#[derive(Debug, Deserialize)]
struct SetStateRequest {
    state: PlayState,
}

#[derive(Debug, Serialize)]
struct CurrentTrackResponse {
    track: Track,
    /// Playback offset in whole seconds.
    progress: u64,
    state: PlayState,
}

#[derive(Debug, Serialize)]
struct TracksResponse {
    tracks: Vec<Track>,
}

async fn set_state(
    State(player): State<SharedPlayer>,
    Json(request): Json<SetStateRequest>,
) -> Response {
    match player.set_state(request.state).await {
        Ok(()) => Json(json!({})).into_response(),
        Err(err) => map_error(err),
    }
}

async fn next_track(State(player): State<SharedPlayer>) -> Response {
    match player.next().await {
        Ok(()) => Json(json!({})).into_response(),
        Err(err) => map_error(err),
    }
}

async fn current_track(State(player): State<SharedPlayer>) -> Response {
    let current = async {
        let state = player.state().await?;
        let index = player.track_index().await?;
        let (track, progress) = if index >= 0 {
            let tracks = player.playlist().tracks().await?;
            let track = tracks.into_iter().nth(index as usize).unwrap_or_default();
            (track, player.time().await?)
        } else {
            (Track::default(), Duration::ZERO)
        };
        Ok::<_, PlayerError>(CurrentTrackResponse {
            track,
            progress: progress.as_secs(),
            state,
        })
    }
    .await;

    match current {
        Ok(current) => Json(current).into_response(),
        Err(err) => map_error(err),
    }
}

async fn playlist_tracks(State(player): State<SharedPlayer>) -> Response {
    match player.playlist().tracks().await {
        Ok(tracks) => Json(TracksResponse { tracks }).into_response(),
        Err(err) => map_error(err),
    }
}

async fn browse_root(state: State<SharedPlayer>) -> Response {
    browse(state, Path(String::new())).await
}

/// List library tracks under a path. The path is matched as a prefix
/// of the URI with its scheme stripped; the empty path lists
/// everything.
async fn browse(State(player): State<SharedPlayer>, Path(path): Path<String>) -> Response {
    let path = path.trim_matches('/').to_string();
    match player.tracks().await {
        Ok(mut tracks) => {
            if !path.is_empty() {
                tracks.retain(|track| {
                    track
                        .uri
                        .split_once("://")
                        .map(|(_, rest)| rest)
                        .unwrap_or(&track.uri)
                        .trim_start_matches('/')
                        .starts_with(&path)
                });
            }
            Json(TracksResponse { tracks }).into_response()
        }
        Err(err) => map_error(err),
    }
}

/// Any player error becomes a non-2xx response carrying the error
/// text; clients refresh via `/track/current` afterwards.
fn map_error(err: PlayerError) -> Response {
    let status = match &err {
        PlayerError::State(_) => StatusCode::BAD_REQUEST,
        PlayerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        PlayerError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        PlayerError::Transport(_) | PlayerError::Protocol(_) => StatusCode::BAD_GATEWAY,
    };
    (status, err.to_string()).into_response()
}
