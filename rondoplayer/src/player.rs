//! The contracts every playback backend satisfies.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::Emitter;
use crate::metakeeper::PlaylistMetaKeeper;
use crate::track::Track;

/// Playback state of a player.
///
/// `Invalid` is an error sentinel only; it is never serialized and no
/// transition accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Playing,
    Paused,
    Stopped,
    #[serde(skip)]
    Invalid,
}

impl PlayState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
            PlayState::Stopped => "stopped",
            PlayState::Invalid => "invalid",
        }
    }
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cover art payload: a MIME type and a streamed body. The stream is
/// released by dropping it.
pub struct TrackArt {
    pub mime: String,
    pub data: BoxStream<'static, std::io::Result<Bytes>>,
}

impl fmt::Debug for TrackArt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackArt").field("mime", &self.mime).finish()
    }
}

/// Enumeration of and metadata lookup in a backend's track collection.
#[async_trait]
pub trait Library: Send + Sync {
    /// Full enumeration. May be expensive.
    async fn tracks(&self) -> Result<Vec<Track>>;

    /// One track per input URI, in input order. Unknown URIs yield a
    /// track carrying only the URI; known tracks have missing fields
    /// interpolated before return.
    async fn track_info(&self, uris: &[String]) -> Result<Vec<Track>>;

    /// Cover art for a URI, or `None` when unavailable.
    async fn track_art(&self, uri: &str) -> Result<Option<TrackArt>>;
}

/// An ordered, mutable sequence of tracks. Positions are not stable
/// identifiers; any mutation may renumber.
#[async_trait]
pub trait Playlist: Send + Sync {
    /// Insert at `pos`, 0 prepends, -1 appends. Relative order among
    /// the inserted tracks is preserved.
    async fn insert(&self, pos: i64, tracks: Vec<Track>) -> Result<()>;

    /// Relocate one track. `from == to` is a no-op; out of range is an
    /// error.
    async fn move_track(&self, from: usize, to: usize) -> Result<()>;

    /// Remove the given positions.
    async fn remove(&self, positions: Vec<usize>) -> Result<()>;

    /// Snapshot of the current contents, in order.
    async fn tracks(&self) -> Result<Vec<Track>>;

    async fn len(&self) -> Result<usize>;
}

/// A single playback backend: state machine, volume, seek, track
/// index, named lists and availability, plus the [`Library`] view.
#[async_trait]
pub trait Player: Library {
    /// Current playback offset from the start of the track.
    async fn time(&self) -> Result<Duration>;

    /// Seek within the current track. Does not change the playstate.
    async fn set_time(&self, offset: Duration) -> Result<()>;

    /// Index of the playing track, -1 when stopped or the playlist is
    /// empty.
    async fn track_index(&self) -> Result<i64>;

    /// Play track `index`; an index at or past the end of the playlist
    /// transitions to `Stopped`.
    async fn set_track_index(&self, index: i64) -> Result<()>;

    async fn state(&self) -> Result<PlayState>;

    /// Transition the playstate. Blocks until the backend confirms the
    /// transition via an event, or a bounded timeout fires.
    async fn set_state(&self, state: PlayState) -> Result<()>;

    /// Volume in [0.0, 1.0]; 0 when muted.
    async fn volume(&self) -> Result<f32>;

    /// Unmutes, then sets the volume. Values outside [0, 1] are
    /// clamped.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Saved playlists by name. Whether they are editable depends on
    /// the backend.
    async fn lists(&self) -> Result<HashMap<String, Arc<dyn Playlist>>>;

    /// Whether the backend is reachable and powered on.
    async fn available(&self) -> bool;

    /// The live playlist, with client-supplied metadata preserved.
    fn playlist(&self) -> Arc<PlaylistMetaKeeper>;

    /// The player's event bus.
    fn events(&self) -> &Emitter;

    /// Advance to the next track. Past the last track this stops
    /// playback, per `set_track_index`.
    async fn next(&self) -> Result<()> {
        let index = self.track_index().await?;
        self.set_track_index(index + 1).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playstate_serde_round_trip() {
        for (state, tag) in [
            (PlayState::Playing, "\"playing\""),
            (PlayState::Paused, "\"paused\""),
            (PlayState::Stopped, "\"stopped\""),
        ] {
            assert_eq!(serde_json::to_string(&state).unwrap(), tag);
            assert_eq!(serde_json::from_str::<PlayState>(tag).unwrap(), state);
        }
    }

    #[test]
    fn invalid_is_not_deserializable() {
        assert!(serde_json::from_str::<PlayState>("\"invalid\"").is_err());
    }
}
