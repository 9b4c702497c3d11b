//! HTTP + WebSocket facade binding the player contract to JSON
//! endpoints.
//!
//! Routes:
//! - `POST /player/state`: transition the playstate
//! - `POST /player/next`: advance to the next track
//! - `GET /track/current`: current track, progress and state
//! - `GET /track/playlist`: live playlist contents
//! - `GET /track/browse/{path}`: library tracks under a path
//! - `GET /listen`: WebSocket streaming event tags

mod api;
mod ws;

pub use api::router;
