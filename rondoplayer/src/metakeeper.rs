//! Playlist wrapper that preserves client-supplied track metadata.
//!
//! Some backends cannot persist metadata for streaming URIs; they know
//! only the URL. The keeper remembers the tracks handed to `insert`
//! and re-applies their fields to whatever the backend returns.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::player::Playlist;
use crate::track::Track;

/// Transparent overlay around a backing [`Playlist`].
///
/// Invariant after reconciliation: every overlay entry's URI is present
/// in the backing playlist.
pub struct PlaylistMetaKeeper {
    backing: Arc<dyn Playlist>,
    overlay: Mutex<HashMap<String, Track>>,
}

impl PlaylistMetaKeeper {
    pub fn new(backing: Arc<dyn Playlist>) -> Self {
        Self {
            backing,
            overlay: Mutex::new(HashMap::new()),
        }
    }

    /// Record tracks about to be inserted. An entry that already has an
    /// artist or title is not overwritten by a bare one.
    fn remember(&self, tracks: &[Track]) {
        let mut overlay = self.overlay.lock().unwrap();
        for track in tracks {
            if let Some(existing) = overlay.get(&track.uri) {
                let informative = !existing.artist.is_empty() || !existing.title.is_empty();
                let bare = track.artist.is_empty() && track.title.is_empty();
                if informative && bare {
                    continue;
                }
            }
            overlay.insert(track.uri.clone(), track.clone());
        }
    }

    /// Drop overlay entries whose URI no longer appears in the backing
    /// playlist. Callers pass the freshest snapshot they have.
    fn reconcile(&self, current: &[Track]) {
        let live: HashSet<&str> = current.iter().map(|t| t.uri.as_str()).collect();
        let mut overlay = self.overlay.lock().unwrap();
        overlay.retain(|uri, _| live.contains(uri.as_str()));
    }

    /// Best-effort reconciliation after a mutation; a transport error
    /// here is not the mutation's problem.
    async fn reconcile_from_backing(&self) {
        match self.backing.tracks().await {
            Ok(current) => self.reconcile(&current),
            Err(err) => debug!(error = %err, "overlay reconciliation skipped"),
        }
    }

    /// Overlay fields win wherever the backing field is empty.
    fn merge(mut backing: Track, overlay: &Track) -> Track {
        if backing.artist.is_empty() {
            backing.artist = overlay.artist.clone();
        }
        if backing.title.is_empty() {
            backing.title = overlay.title.clone();
        }
        if backing.album.is_empty() {
            backing.album = overlay.album.clone();
        }
        if backing.album_artist.is_empty() {
            backing.album_artist = overlay.album_artist.clone();
        }
        if backing.genre.is_empty() {
            backing.genre = overlay.genre.clone();
        }
        if backing.duration.is_zero() {
            backing.duration = overlay.duration;
        }
        if backing.track_number == 0 {
            backing.track_number = overlay.track_number;
        }
        if backing.disc_number == 0 {
            backing.disc_number = overlay.disc_number;
        }
        backing.has_art |= overlay.has_art;
        backing
    }
}

#[async_trait]
impl Playlist for PlaylistMetaKeeper {
    async fn insert(&self, pos: i64, tracks: Vec<Track>) -> Result<()> {
        self.remember(&tracks);
        self.backing.insert(pos, tracks).await
    }

    async fn move_track(&self, from: usize, to: usize) -> Result<()> {
        self.backing.move_track(from, to).await?;
        self.reconcile_from_backing().await;
        Ok(())
    }

    async fn remove(&self, positions: Vec<usize>) -> Result<()> {
        self.backing.remove(positions).await?;
        self.reconcile_from_backing().await;
        Ok(())
    }

    async fn tracks(&self) -> Result<Vec<Track>> {
        let current = self.backing.tracks().await?;
        let merged = {
            let overlay = self.overlay.lock().unwrap();
            current
                .iter()
                .cloned()
                .map(|track| match overlay.get(&track.uri) {
                    Some(kept) => Self::merge(track, kept),
                    None => track,
                })
                .collect()
        };
        self.reconcile(&current);
        Ok(merged)
    }

    async fn len(&self) -> Result<usize> {
        self.backing.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryPlaylist;

    fn track(uri: &str, artist: &str, title: &str) -> Track {
        Track {
            uri: uri.into(),
            artist: artist.into(),
            title: title.into(),
            ..Track::default()
        }
    }

    #[tokio::test]
    async fn overlay_fills_bare_backing_tracks() {
        // The backing playlist strips everything but the URI, the way
        // a backend treats stream URLs it cannot introspect.
        let backing = Arc::new(MemoryPlaylist::bare());
        let keeper = PlaylistMetaKeeper::new(backing);

        keeper
            .insert(0, vec![track("http://radio/stream", "A", "B")])
            .await
            .unwrap();

        let tracks = keeper.tracks().await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].artist, "A");
        assert_eq!(tracks[0].title, "B");
    }

    #[tokio::test]
    async fn backing_fields_take_precedence_when_present() {
        let backing = Arc::new(MemoryPlaylist::new());
        let keeper = PlaylistMetaKeeper::new(backing.clone());

        keeper
            .insert(0, vec![track("file:///a.flac", "Overlay Artist", "")])
            .await
            .unwrap();
        // The backend knows this file and reports its own tags.
        backing
            .replace(vec![track("file:///a.flac", "Tagged Artist", "Tagged Title")])
            .await;

        let tracks = keeper.tracks().await.unwrap();
        assert_eq!(tracks[0].artist, "Tagged Artist");
        assert_eq!(tracks[0].title, "Tagged Title");
    }

    #[tokio::test]
    async fn informative_entries_survive_bare_reinsertion() {
        let backing = Arc::new(MemoryPlaylist::bare());
        let keeper = PlaylistMetaKeeper::new(backing);

        keeper
            .insert(0, vec![track("http://radio/stream", "A", "B")])
            .await
            .unwrap();
        keeper
            .insert(-1, vec![track("http://radio/stream", "", "")])
            .await
            .unwrap();

        let tracks = keeper.tracks().await.unwrap();
        assert_eq!(tracks[0].artist, "A");
        assert_eq!(tracks[1].artist, "A");
    }

    #[tokio::test]
    async fn removal_reconciles_the_overlay() {
        let backing = Arc::new(MemoryPlaylist::bare());
        let keeper = PlaylistMetaKeeper::new(backing);

        keeper
            .insert(
                0,
                vec![
                    track("http://radio/one", "A1", "T1"),
                    track("http://radio/two", "A2", "T2"),
                ],
            )
            .await
            .unwrap();
        keeper.remove(vec![0]).await.unwrap();

        assert_eq!(keeper.overlay.lock().unwrap().len(), 1);

        let tracks = keeper.tracks().await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].uri, "http://radio/two");
        assert_eq!(tracks[0].artist, "A2");
    }

    #[tokio::test]
    async fn len_delegates() {
        let backing = Arc::new(MemoryPlaylist::new());
        let keeper = PlaylistMetaKeeper::new(backing);
        keeper
            .insert(0, vec![track("file:///a", "", ""), track("file:///b", "", "")])
            .await
            .unwrap();
        assert_eq!(keeper.len().await.unwrap(), 2);
    }
}
