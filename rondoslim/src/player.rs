//! The backend player: contract implementation and notification
//! stream.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use rondoplayer::{
    Emitter, Library, PlayState, Player, PlayerError, PlayerEvent, Playlist, PlaylistMetaKeeper,
    Result, Track, TrackArt, interpolate_missing_fields,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::proto;
use crate::server::{SlimPlayerInfo, SlimServer, TRACK_TAGS, track_from_attrs};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Ordered notification-line translations. Player-scoped entries are
/// matched only against lines starting with the player's id; every
/// matching entry fires.
static EVENT_TRANSLATIONS: Lazy<Vec<(Regex, PlayerEvent, bool)>> = Lazy::new(|| {
    vec![
        (
            Regex::new("^rescan done").unwrap(),
            PlayerEvent::LibraryUpdate,
            true,
        ),
        (
            Regex::new(r"^\S+ mixer (?:volume|muting)").unwrap(),
            PlayerEvent::Volume,
            false,
        ),
        (
            Regex::new(r"^\S+ playlist").unwrap(),
            PlayerEvent::Playlist,
            false,
        ),
        (
            Regex::new(r"^\S+ playlist").unwrap(),
            PlayerEvent::TrackIndex,
            false,
        ),
        (
            // The word boundary keeps `play` from matching as a
            // prefix of `playlist` lines.
            Regex::new(r"^\S+ (?:play|stop|pause)\b").unwrap(),
            PlayerEvent::Playstate,
            false,
        ),
        (
            Regex::new(r"^\S+ time").unwrap(),
            PlayerEvent::Time,
            false,
        ),
        (
            Regex::new(r"^\S+ client").unwrap(),
            PlayerEvent::Availability,
            false,
        ),
    ]
});

/// One player attached to a backend server.
pub struct SlimPlayer {
    id: String,
    name: String,
    model: String,
    server: Arc<SlimServer>,
    playlist: Arc<PlaylistMetaKeeper>,
    emitter: Emitter,
    listener: JoinHandle<()>,
}

impl SlimPlayer {
    /// Attach to the player with the given backend id, or to the first
    /// player the backend reports.
    pub async fn connect(server: Arc<SlimServer>, player_id: Option<&str>) -> Result<Arc<Self>> {
        let players = server.players().await?;
        let info = match player_id {
            Some(id) => players
                .into_iter()
                .find(|p| p.id == id)
                .ok_or_else(|| PlayerError::Protocol(format!("backend has no player {id}")))?,
            None => players
                .into_iter()
                .next()
                .ok_or_else(|| PlayerError::Protocol("backend reports no players".into()))?,
        };
        Ok(Self::attach(server, info))
    }

    /// Build the player for a known backend id and start its
    /// notification stream.
    pub fn attach(server: Arc<SlimServer>, info: SlimPlayerInfo) -> Arc<Self> {
        let emitter = Emitter::new();
        let backing: Arc<dyn Playlist> = Arc::new(SlimPlaylist {
            server: server.clone(),
            player_id: info.id.clone(),
        });
        let listener = tokio::spawn(event_loop(
            server.clone(),
            info.id.clone(),
            emitter.clone(),
        ));
        Arc::new(Self {
            id: info.id,
            name: info.name,
            model: info.model,
            server,
            playlist: Arc::new(PlaylistMetaKeeper::new(backing)),
            emitter,
            listener,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SlimPlayer {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl fmt::Display for SlimPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slim{{{}, {}, {}}}", self.name, self.id, self.model)
    }
}

/// Reads the notification stream and translates lines into events.
/// Runs until the owning player is dropped; connection loss surfaces
/// as an availability event followed by a reconnect.
async fn event_loop(server: Arc<SlimServer>, player_id: String, emitter: Emitter) {
    loop {
        let stream = match server.subscribe().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "notification stream unavailable");
                emitter.emit(PlayerEvent::Availability);
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = match urlencoding::decode(&line) {
                        Ok(line) => line,
                        Err(err) => {
                            warn!(error = %err, "undecodable notification line");
                            continue;
                        }
                    };
                    if line.is_empty() {
                        continue;
                    }
                    translate_line(&line, &player_id, &emitter);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "notification stream read failed");
                    break;
                }
            }
        }

        emitter.emit(PlayerEvent::Availability);
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

fn translate_line(line: &str, player_id: &str, emitter: &Emitter) {
    for (pattern, event, global) in EVENT_TRANSLATIONS.iter() {
        if !global && !line.starts_with(player_id) {
            continue;
        }
        if pattern.is_match(line) {
            emitter.emit(*event);
        }
    }
}

#[async_trait]
impl Library for SlimPlayer {
    async fn tracks(&self) -> Result<Vec<Track>> {
        let res = self.server.request(&["info", "total", "songs", "?"]).await?;
        let total: usize = proto::field(&res, 3)?
            .parse()
            .map_err(|_| PlayerError::Protocol("song count is not a number".into()))?;
        let count = total.to_string();
        let tags = format!("tags:{TRACK_TAGS}");
        self.server
            .decode_tracks("id", &["songs", "0", &count, &tags])
            .await
    }

    async fn track_info(&self, uris: &[String]) -> Result<Vec<Track>> {
        let res = self.server.request(&[&self.id, "path", "?"]).await?;
        let current_uri = res.get(2).cloned();

        let mut tracks = Vec::with_capacity(uris.len());
        for uri in uris {
            let is_http = uri.starts_with("http://") || uri.starts_with("https://");
            if is_http {
                let mut track = Track::new(uri);
                // Stream metadata only exists for the track currently
                // playing; other stream URIs stay bare.
                if current_uri.as_deref() == Some(uri.as_str()) {
                    track.album = uri.clone();
                    if let Ok(res) = self.server.request(&[&self.id, "artist", "?"]).await {
                        if let Some(artist) = res.get(2) {
                            track.artist = artist.clone();
                        }
                    }
                    if let Ok(res) = self.server.request(&[&self.id, "title", "?"]).await {
                        if let Some(title) = res.get(2) {
                            track.title = title.clone();
                        }
                    }
                    interpolate_missing_fields(&mut track);
                }
                tracks.push(track);
            } else {
                let tags = format!("tags:{TRACK_TAGS}");
                let url_param = format!("url:{uri}");
                let attrs = self
                    .server
                    .request_attrs(&["songinfo", "0", "100", &tags, &url_param])
                    .await?;
                // No duration means the backend does not know the URI.
                if !attrs.contains_key("duration") {
                    tracks.push(Track::new(uri));
                    continue;
                }
                let mut track = track_from_attrs(attrs);
                if track.uri.is_empty() {
                    track.uri = uri.clone();
                }
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    async fn track_art(&self, uri: &str) -> Result<Option<TrackArt>> {
        self.server.track_art(uri).await
    }
}

#[async_trait]
impl Player for SlimPlayer {
    async fn time(&self) -> Result<Duration> {
        let res = self.server.request(&[&self.id, "time", "?"]).await?;
        let secs: f64 = proto::field(&res, 2)?
            .parse()
            .map_err(|_| PlayerError::Protocol("time is not a number".into()))?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(PlayerError::Protocol(format!("invalid time value {secs}")));
        }
        Ok(Duration::from_secs_f64(secs))
    }

    async fn set_time(&self, offset: Duration) -> Result<()> {
        let secs = offset.as_secs().to_string();
        self.server.request(&[&self.id, "time", &secs]).await?;
        Ok(())
    }

    async fn track_index(&self) -> Result<i64> {
        let res = self
            .server
            .request(&[&self.id, "playlist", "tracks", "?"])
            .await?;
        if proto::field(&res, 3)? == "0" {
            return Ok(-1);
        }
        if self.state().await? == PlayState::Stopped {
            return Ok(-1);
        }
        let res = self
            .server
            .request(&[&self.id, "playlist", "index", "?"])
            .await?;
        proto::field(&res, 3)?
            .parse()
            .map_err(|_| PlayerError::Protocol("track index is not a number".into()))
    }

    async fn set_track_index(&self, index: i64) -> Result<()> {
        let len = self.playlist.len().await? as i64;
        if index >= len {
            return self.set_state(PlayState::Stopped).await;
        }
        let index = index.to_string();
        self.server
            .request(&[&self.id, "playlist", "index", &index])
            .await?;
        Ok(())
    }

    async fn state(&self) -> Result<PlayState> {
        let res = self.server.request(&[&self.id, "mode", "?"]).await?;
        match proto::field(&res, 2)? {
            "play" => Ok(PlayState::Playing),
            "pause" => Ok(PlayState::Paused),
            "stop" => Ok(PlayState::Stopped),
            other => Err(PlayerError::Protocol(format!(
                "backend returned an invalid playstate: {other:?}"
            ))),
        }
    }

    async fn set_state(&self, state: PlayState) -> Result<()> {
        // The backend acknowledges the command before applying it; a
        // state query straight after could still observe the old
        // value. Subscribe before sending, then wait for the playstate
        // event the transition causes.
        let (subscription, mut events) = self.emitter.listen();

        let token = match state {
            PlayState::Playing => "play",
            PlayState::Paused => "pause",
            PlayState::Stopped => "stop",
            PlayState::Invalid => {
                self.emitter.unlisten(subscription);
                return Err(PlayerError::State(
                    "cannot set an invalid playstate".into(),
                ));
            }
        };
        if let Err(err) = self.server.request(&[&self.id, "mode", token]).await {
            self.emitter.unlisten(subscription);
            return Err(err);
        }

        let acked = tokio::time::timeout(self.server.ack_timeout(), async {
            while let Some(event) = events.recv().await {
                if event == PlayerEvent::Playstate {
                    return true;
                }
            }
            false
        })
        .await;
        self.emitter.unlisten(subscription);

        match acked {
            Ok(true) => Ok(()),
            _ => Err(PlayerError::Timeout),
        }
    }

    async fn volume(&self) -> Result<f32> {
        let res = self
            .server
            .request(&[&self.id, "mixer", "volume", "?"])
            .await?;
        let volume: i64 = proto::field(&res, 3)?
            .parse()
            .map_err(|_| PlayerError::Protocol("volume is not a number".into()))?;
        // A negative volume means the player is muted.
        if volume < 0 {
            return Ok(0.0);
        }
        Ok(volume as f32 / 100.0)
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        // Unmute first in case the player was muted.
        self.server
            .request(&[&self.id, "mixer", "muting", "0"])
            .await?;
        let percent = ((volume.clamp(0.0, 1.0) * 100.0).round() as i64).to_string();
        self.server
            .request(&[&self.id, "mixer", "volume", &percent])
            .await?;
        Ok(())
    }

    async fn lists(&self) -> Result<HashMap<String, Arc<dyn Playlist>>> {
        let count_attrs = self.server.request_attrs(&["playlists"]).await?;
        let count: usize = count_attrs
            .get("count")
            .and_then(|count| count.parse().ok())
            .ok_or_else(|| PlayerError::Protocol("playlists response missing count".into()))?;

        let mut lists: HashMap<String, Arc<dyn Playlist>> = HashMap::new();
        for i in 0..count {
            let index = i.to_string();
            let attrs = self.server.request_attrs(&["playlists", &index, "1"]).await?;
            let (Some(name), Some(id)) = (attrs.get("playlist"), attrs.get("id")) else {
                continue;
            };
            lists.insert(
                name.clone(),
                Arc::new(SlimUserPlaylist {
                    server: self.server.clone(),
                    id: id.clone(),
                }),
            );
        }
        Ok(lists)
    }

    async fn available(&self) -> bool {
        for probe in ["power", "connected"] {
            let on = match self.server.request(&[&self.id, probe, "?"]).await {
                Ok(res) => proto::field(&res, 2).map(|v| v == "1").unwrap_or(false),
                Err(_) => false,
            };
            if !on {
                return false;
            }
        }
        true
    }

    fn playlist(&self) -> Arc<PlaylistMetaKeeper> {
        self.playlist.clone()
    }

    fn events(&self) -> &Emitter {
        &self.emitter
    }
}

/// The player's live playlist on the backend.
struct SlimPlaylist {
    server: Arc<SlimServer>,
    player_id: String,
}

#[async_trait]
impl Playlist for SlimPlaylist {
    async fn insert(&self, pos: i64, tracks: Vec<Track>) -> Result<()> {
        let original_len = self.len().await?;

        // The backend can only append; move the tracks into place
        // afterwards.
        for track in &tracks {
            self.server
                .request(&[&self.player_id, "playlist", "add", &track.uri])
                .await?;
        }
        if pos < 0 || original_len == 0 {
            return Ok(());
        }
        let pos = pos as usize;
        for i in 0..tracks.len() {
            self.move_track(original_len + i, pos + i).await?;
        }
        Ok(())
    }

    async fn move_track(&self, from: usize, to: usize) -> Result<()> {
        if from == to {
            return Ok(());
        }
        let (from, to) = (from.to_string(), to.to_string());
        self.server
            .request(&[&self.player_id, "playlist", "move", &from, &to])
            .await?;
        Ok(())
    }

    async fn remove(&self, mut positions: Vec<usize>) -> Result<()> {
        // Delete back to front so the remaining positions stay valid.
        positions.sort_unstable();
        for pos in positions.into_iter().rev() {
            let pos = pos.to_string();
            self.server
                .request(&[&self.player_id, "playlist", "delete", &pos])
                .await?;
        }
        Ok(())
    }

    async fn tracks(&self) -> Result<Vec<Track>> {
        let count = self.len().await?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let count = count.to_string();
        let tags = format!("tags:{TRACK_TAGS}");
        self.server
            .decode_tracks("id", &[&self.player_id, "status", "0", &count, &tags])
            .await
    }

    async fn len(&self) -> Result<usize> {
        let res = self
            .server
            .request(&[&self.player_id, "playlist", "tracks", "?"])
            .await?;
        proto::field(&res, 3)?
            .parse()
            .map_err(|_| PlayerError::Protocol("playlist length is not a number".into()))
    }
}

/// A saved playlist. Read-only on this backend.
struct SlimUserPlaylist {
    server: Arc<SlimServer>,
    id: String,
}

#[async_trait]
impl Playlist for SlimUserPlaylist {
    async fn insert(&self, _pos: i64, _tracks: Vec<Track>) -> Result<()> {
        Err(PlayerError::Unsupported("saved playlists are read-only"))
    }

    async fn move_track(&self, _from: usize, _to: usize) -> Result<()> {
        Err(PlayerError::Unsupported("saved playlists are read-only"))
    }

    async fn remove(&self, _positions: Vec<usize>) -> Result<()> {
        Err(PlayerError::Unsupported("saved playlists are read-only"))
    }

    async fn tracks(&self) -> Result<Vec<Track>> {
        let id_param = format!("playlist_id:{}", self.id);
        let tags = format!("tags:{TRACK_TAGS}");
        self.server
            .decode_tracks(
                "id",
                &["playlists", "tracks", "0", "10000", &id_param, &tags],
            )
            .await
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.tracks().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events_for(line: &str, player_id: &str) -> Vec<PlayerEvent> {
        let emitter = Emitter::new();
        let (_sub, mut rx) = emitter.listen();
        translate_line(line, player_id, &emitter);
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn rescan_lines_are_global() {
        assert_eq!(
            events_for("rescan done", "aa:bb"),
            vec![PlayerEvent::LibraryUpdate]
        );
    }

    #[test]
    fn player_scoped_lines_need_the_id_prefix() {
        assert_eq!(
            events_for("aa:bb mixer volume 40", "aa:bb"),
            vec![PlayerEvent::Volume]
        );
        assert_eq!(events_for("cc:dd mixer volume 40", "aa:bb"), vec![]);
    }

    #[test]
    fn playlist_lines_fire_playlist_and_trackindex() {
        assert_eq!(
            events_for("aa:bb playlist newsong", "aa:bb"),
            vec![PlayerEvent::Playlist, PlayerEvent::TrackIndex]
        );
    }

    #[test]
    fn mode_lines_fire_playstate() {
        for line in ["aa:bb play", "aa:bb stop", "aa:bb pause"] {
            assert_eq!(events_for(line, "aa:bb"), vec![PlayerEvent::Playstate]);
        }
    }

    #[test]
    fn client_lines_fire_availability() {
        assert_eq!(
            events_for("aa:bb client disconnect", "aa:bb"),
            vec![PlayerEvent::Availability]
        );
    }
}
