//! In-memory contract implementations for tests.
//!
//! These back the unit tests here and the facade tests in dependent
//! crates; they are not part of the production surface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PlayerError, Result};
use crate::event::{Emitter, PlayerEvent};
use crate::metakeeper::PlaylistMetaKeeper;
use crate::player::{Library, PlayState, Player, Playlist, TrackArt};
use crate::track::{interpolate_missing_fields, Track};

/// Playlist held in a `Vec`, optionally stripping every field but the
/// URI on read to mimic a backend that cannot introspect streams.
#[derive(Default)]
pub struct MemoryPlaylist {
    tracks: Mutex<Vec<Track>>,
    bare: bool,
}

impl MemoryPlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    /// A playlist whose `tracks()` forgets all metadata.
    pub fn bare() -> Self {
        Self {
            tracks: Mutex::new(Vec::new()),
            bare: true,
        }
    }

    /// Swap the whole contents, as if the backend re-read its library.
    pub async fn replace(&self, tracks: Vec<Track>) {
        *self.tracks.lock().unwrap() = tracks;
    }
}

#[async_trait]
impl Playlist for MemoryPlaylist {
    async fn insert(&self, pos: i64, tracks: Vec<Track>) -> Result<()> {
        let mut current = self.tracks.lock().unwrap();
        let at = if pos < 0 {
            current.len()
        } else {
            (pos as usize).min(current.len())
        };
        current.splice(at..at, tracks);
        Ok(())
    }

    async fn move_track(&self, from: usize, to: usize) -> Result<()> {
        let mut current = self.tracks.lock().unwrap();
        if from >= current.len() || to >= current.len() {
            return Err(PlayerError::Protocol(format!(
                "move {from} -> {to} out of range"
            )));
        }
        if from != to {
            let track = current.remove(from);
            current.insert(to, track);
        }
        Ok(())
    }

    async fn remove(&self, mut positions: Vec<usize>) -> Result<()> {
        let mut current = self.tracks.lock().unwrap();
        positions.sort_unstable();
        for pos in positions.into_iter().rev() {
            if pos >= current.len() {
                return Err(PlayerError::Protocol(format!("remove {pos} out of range")));
            }
            current.remove(pos);
        }
        Ok(())
    }

    async fn tracks(&self) -> Result<Vec<Track>> {
        let current = self.tracks.lock().unwrap();
        if self.bare {
            Ok(current.iter().map(|t| Track::new(&t.uri)).collect())
        } else {
            Ok(current.clone())
        }
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.tracks.lock().unwrap().len())
    }
}

/// Library backed by a fixed track list.
#[derive(Default)]
pub struct MemoryLibrary {
    tracks: Vec<Track>,
}

impl MemoryLibrary {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }
}

#[async_trait]
impl Library for MemoryLibrary {
    async fn tracks(&self) -> Result<Vec<Track>> {
        Ok(self.tracks.clone())
    }

    async fn track_info(&self, uris: &[String]) -> Result<Vec<Track>> {
        Ok(uris
            .iter()
            .map(|uri| {
                match self.tracks.iter().find(|t| &t.uri == uri) {
                    Some(known) => {
                        let mut track = known.clone();
                        interpolate_missing_fields(&mut track);
                        track
                    }
                    None => Track::new(uri),
                }
            })
            .collect())
    }

    async fn track_art(&self, _uri: &str) -> Result<Option<TrackArt>> {
        Ok(None)
    }
}

/// A fully in-memory [`Player`] with the contract's observable
/// semantics: clamped volume, overflow-to-stopped track index, events
/// on every transition.
pub struct MemoryPlayer {
    library: MemoryLibrary,
    backing: Arc<MemoryPlaylist>,
    playlist: Arc<PlaylistMetaKeeper>,
    emitter: Emitter,
    state: Mutex<PlayState>,
    volume: Mutex<f32>,
    offset: Mutex<Duration>,
    index: Mutex<i64>,
}

impl MemoryPlayer {
    pub fn new(library_tracks: Vec<Track>) -> Self {
        let backing = Arc::new(MemoryPlaylist::new());
        let playlist = Arc::new(PlaylistMetaKeeper::new(backing.clone()));
        Self {
            library: MemoryLibrary::new(library_tracks),
            backing,
            playlist,
            emitter: Emitter::new(),
            state: Mutex::new(PlayState::Stopped),
            volume: Mutex::new(0.0),
            offset: Mutex::new(Duration::ZERO),
            index: Mutex::new(-1),
        }
    }

    pub fn backing(&self) -> Arc<MemoryPlaylist> {
        self.backing.clone()
    }
}

#[async_trait]
impl Library for MemoryPlayer {
    async fn tracks(&self) -> Result<Vec<Track>> {
        self.library.tracks().await
    }

    async fn track_info(&self, uris: &[String]) -> Result<Vec<Track>> {
        self.library.track_info(uris).await
    }

    async fn track_art(&self, uri: &str) -> Result<Option<TrackArt>> {
        self.library.track_art(uri).await
    }
}

#[async_trait]
impl Player for MemoryPlayer {
    async fn time(&self) -> Result<Duration> {
        Ok(*self.offset.lock().unwrap())
    }

    async fn set_time(&self, offset: Duration) -> Result<()> {
        *self.offset.lock().unwrap() = offset;
        self.emitter.emit(PlayerEvent::Time);
        Ok(())
    }

    async fn track_index(&self) -> Result<i64> {
        if *self.state.lock().unwrap() == PlayState::Stopped {
            return Ok(-1);
        }
        Ok(*self.index.lock().unwrap())
    }

    async fn set_track_index(&self, index: i64) -> Result<()> {
        let len = self.playlist.len().await? as i64;
        if index >= len {
            return self.set_state(PlayState::Stopped).await;
        }
        *self.index.lock().unwrap() = index.max(0);
        *self.state.lock().unwrap() = PlayState::Playing;
        self.emitter.emit(PlayerEvent::Playlist);
        self.emitter.emit(PlayerEvent::Playstate);
        Ok(())
    }

    async fn state(&self) -> Result<PlayState> {
        Ok(*self.state.lock().unwrap())
    }

    async fn set_state(&self, state: PlayState) -> Result<()> {
        if state == PlayState::Invalid {
            return Err(PlayerError::State("invalid".into()));
        }
        *self.state.lock().unwrap() = state;
        self.emitter.emit(PlayerEvent::Playstate);
        Ok(())
    }

    async fn volume(&self) -> Result<f32> {
        Ok(*self.volume.lock().unwrap())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        *self.volume.lock().unwrap() = volume.clamp(0.0, 1.0);
        self.emitter.emit(PlayerEvent::Volume);
        Ok(())
    }

    async fn lists(&self) -> Result<HashMap<String, Arc<dyn Playlist>>> {
        Ok(HashMap::new())
    }

    async fn available(&self) -> bool {
        true
    }

    fn playlist(&self) -> Arc<PlaylistMetaKeeper> {
        self.playlist.clone()
    }

    fn events(&self) -> &Emitter {
        &self.emitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn player_with_playlist(n: usize) -> MemoryPlayer {
        let tracks: Vec<Track> = (0..n)
            .map(|i| Track::new(format!("file:///music/{i}.flac")))
            .collect();
        let player = MemoryPlayer::new(tracks.clone());
        player.playlist().insert(0, tracks).await.unwrap();
        player
    }

    #[tokio::test]
    async fn volume_is_clamped() {
        let player = MemoryPlayer::new(vec![]);
        player.set_volume(2.0).await.unwrap();
        assert_eq!(player.volume().await.unwrap(), 1.0);
        player.set_volume(-1.0).await.unwrap();
        assert_eq!(player.volume().await.unwrap(), 0.0);
        player.set_volume(0.4).await.unwrap();
        assert_eq!(player.volume().await.unwrap(), 0.4);
    }

    #[tokio::test]
    async fn state_round_trips() {
        let player = MemoryPlayer::new(vec![]);
        for state in [PlayState::Playing, PlayState::Paused, PlayState::Stopped] {
            player.set_state(state).await.unwrap();
            assert_eq!(player.state().await.unwrap(), state);
        }
    }

    #[tokio::test]
    async fn index_past_end_stops_playback() {
        let player = player_with_playlist(3).await;

        player.set_track_index(0).await.unwrap();
        assert_eq!(player.state().await.unwrap(), PlayState::Playing);

        player.set_track_index(99).await.unwrap();
        assert_eq!(player.state().await.unwrap(), PlayState::Stopped);
        assert_eq!(player.track_index().await.unwrap(), -1);
    }

    #[tokio::test]
    async fn transitions_emit_playstate_events() {
        let player = MemoryPlayer::new(vec![]);
        let (sub, mut rx) = player.events().listen();

        player.set_state(PlayState::Playing).await.unwrap();
        player.set_state(PlayState::Stopped).await.unwrap();

        assert_eq!(rx.recv().await, Some(PlayerEvent::Playstate));
        player.events().unlisten(sub);
    }
}
