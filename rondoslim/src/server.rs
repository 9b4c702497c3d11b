//! Connection handle to one backend server.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use futures::StreamExt;
use rondoplayer::{PlayerError, Result, Track, TrackArt, interpolate_missing_fields};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::proto;

/// Tag characters selecting the track attributes rondo consumes:
/// URI, artist, album, genre, length, id, title, disc, coverid.
pub(crate) const TRACK_TAGS: &str = "uAglitdc";

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(8);

/// A backend player as reported by the server.
#[derive(Debug, Clone)]
pub struct SlimPlayerInfo {
    pub id: String,
    pub name: String,
    pub model: String,
}

/// Handle to a SlimServer-style CLI endpoint.
///
/// Every command uses its own connection; request serialization per
/// connection is therefore trivial. The notification stream (`listen`)
/// holds a separate, persistent connection.
pub struct SlimServer {
    host: String,
    port: u16,
    web_url: Option<String>,
    command_timeout: Duration,
    ack_timeout: Duration,
    http: reqwest::Client,
}

impl SlimServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            web_url: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            http: reqwest::Client::new(),
        }
    }

    /// Base URL of the backend's web interface, enabling cover art
    /// fetching. A trailing slash is added when missing.
    pub fn with_web_url(mut self, web_url: impl Into<String>) -> Self {
        let mut url = web_url.into();
        if !url.is_empty() {
            if !url.ends_with('/') {
                url.push('/');
            }
            self.web_url = Some(url);
        }
        self
    }

    /// Deadline for a single command round trip.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Deadline for the event acknowledging a state change.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub(crate) fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    async fn connect(&self) -> io::Result<TcpStream> {
        let addr = format!("{}:{}", self.host, self.port);
        match tokio::time::timeout(self.command_timeout, TcpStream::connect(&addr)).await {
            Ok(stream) => stream,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connecting to {addr} timed out"),
            )),
        }
    }

    /// Issue one command and decode the response line, command echo
    /// included.
    pub async fn request(&self, cmd: &[&str]) -> Result<Vec<String>> {
        let mut stream = self.connect().await?;
        let line = proto::encode_line(cmd);
        debug!(command = %line, "slim request");
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        let read = tokio::time::timeout(self.command_timeout, reader.read_line(&mut response))
            .await
            .map_err(|_| {
                PlayerError::Transport(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "command response timed out",
                ))
            })??;
        if read == 0 {
            return Err(PlayerError::Protocol(
                "connection closed before response".into(),
            ));
        }
        proto::decode_line(response.trim_end())
    }

    /// Issue one command and decode an attribute-style response,
    /// skipping the echoed command tokens.
    pub async fn request_attrs(&self, cmd: &[&str]) -> Result<HashMap<String, String>> {
        let tokens = self.request(cmd).await?;
        Ok(proto::attrs(tokens.get(cmd.len()..).unwrap_or(&[])))
    }

    /// Issue one command and decode an attribute-list response into
    /// tracks, one per `boundary` occurrence.
    pub(crate) async fn decode_tracks(&self, boundary: &str, cmd: &[&str]) -> Result<Vec<Track>> {
        let tokens = self.request(cmd).await?;
        let body = tokens.get(cmd.len()..).unwrap_or(&[]);
        Ok(proto::split_records(body, boundary)
            .into_iter()
            .map(track_from_attrs)
            .collect())
    }

    /// Open the persistent notification stream (`listen 1`). The
    /// caller owns the connection; it has no idle deadline.
    pub(crate) async fn subscribe(&self) -> io::Result<TcpStream> {
        let mut stream = self.connect().await?;
        let line = proto::encode_line(&["listen", "1"]);
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        Ok(stream)
    }

    /// Enumerate the players attached to the backend.
    pub async fn players(&self) -> Result<Vec<SlimPlayerInfo>> {
        let res = self.request(&["player", "count", "?"]).await?;
        let count: usize = proto::field(&res, 2)?
            .parse()
            .map_err(|_| PlayerError::Protocol("player count is not a number".into()))?;

        let mut players = Vec::with_capacity(count);
        for i in 0..count {
            let index = i.to_string();
            let attrs = self.request_attrs(&["players", &index, "1"]).await?;
            let id = attrs
                .get("playerid")
                .cloned()
                .ok_or_else(|| PlayerError::Protocol("players response missing playerid".into()))?;
            players.push(SlimPlayerInfo {
                id,
                name: attrs.get("name").cloned().unwrap_or_default(),
                model: attrs
                    .get("modelname")
                    .or_else(|| attrs.get("model"))
                    .cloned()
                    .unwrap_or_default(),
            });
        }
        Ok(players)
    }

    /// Cover art for a URI: `songinfo` yields a cover id which the web
    /// interface serves as a JPEG. `None` when the backend has no art,
    /// no web URL is configured, or the fetch fails.
    pub(crate) async fn track_art(&self, uri: &str) -> Result<Option<TrackArt>> {
        let url_param = format!("url:{uri}");
        let attrs = self
            .request_attrs(&["songinfo", "0", "100", "tags:c", &url_param])
            .await?;

        let Some(web_url) = &self.web_url else {
            return Ok(None);
        };
        let Some(cover_id) = attrs.get("coverid").filter(|id| !id.is_empty()) else {
            return Ok(None);
        };

        let art_url = format!("{web_url}music/{cover_id}/cover.jpg");
        let response = match self.http.get(&art_url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(url = %art_url, status = %response.status(), "cover fetch failed");
                return Ok(None);
            }
            Err(err) => {
                debug!(url = %art_url, error = %err, "cover fetch failed");
                return Ok(None);
            }
        };

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let data = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other))
            .boxed();
        Ok(Some(TrackArt { mime, data }))
    }
}

pub(crate) fn track_from_attrs(attrs: HashMap<String, String>) -> Track {
    let mut track = Track::default();
    for (name, value) in attrs {
        set_track_attr(&mut track, &name, value);
    }
    interpolate_missing_fields(&mut track);
    track
}

fn set_track_attr(track: &mut Track, name: &str, value: String) {
    match name {
        "url" => track.uri = value,
        "artist" => track.artist = value,
        "albumartist" => track.album_artist = value,
        "album" => track.album = value,
        "genre" => track.genre = value,
        "title" => track.title = value,
        "duration" => {
            if let Some(secs) = value
                .parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
            {
                track.duration = Duration::from_secs_f64(secs);
            }
        }
        "tracknum" => {
            if let Ok(number) = value.parse() {
                track.track_number = number;
            }
        }
        "disc" => {
            if let Ok(number) = value.parse() {
                track.disc_number = number;
            }
        }
        "coverid" => track.has_art = !value.is_empty(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_are_built_from_attrs() {
        let attrs: HashMap<String, String> = [
            ("id", "17"),
            ("url", "file:///music/one.flac"),
            ("artist", "Someone"),
            ("title", "Something"),
            ("duration", "181.2"),
            ("coverid", "deadbeef"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let track = track_from_attrs(attrs);
        assert_eq!(track.uri, "file:///music/one.flac");
        assert_eq!(track.artist, "Someone");
        assert_eq!(track.duration.as_secs(), 181);
        assert!(track.has_art);
    }

    #[test]
    fn bare_file_tracks_get_interpolated() {
        let attrs: HashMap<String, String> = [
            ("id", "3"),
            ("url", "file:///x/01 - Some Artist - Some Title.flac"),
            ("duration", "10"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let track = track_from_attrs(attrs);
        assert_eq!(track.artist, "Some Artist");
        assert_eq!(track.title, "Some Title");
    }
}
