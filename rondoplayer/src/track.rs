//! Track record and best-effort metadata interpolation.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single track as known to a library or playlist.
///
/// The URI alone identifies a track within a given library. A track
/// carrying only a URI is valid; consumers interpolate missing fields
/// with [`interpolate_missing_fields`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub uri: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub album: String,
    #[serde(default, rename = "albumartist")]
    pub album_artist: String,
    #[serde(default)]
    pub genre: String,
    /// Track length, serialized as whole seconds.
    #[serde(default, with = "duration_secs")]
    pub duration: Duration,
    #[serde(default, rename = "tracknumber")]
    pub track_number: u32,
    #[serde(default, rename = "discnumber")]
    pub disc_number: u32,
    #[serde(default, rename = "hasart")]
    pub has_art: bool,
}

impl Track {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Whether the URI points at a remote stream rather than a library
    /// file. Streams carry their own metadata; nothing is derivable
    /// from the URI.
    pub fn is_stream(&self) -> bool {
        self.uri.starts_with("http://") || self.uri.starts_with("https://")
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

static ARTIST_DASH_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<artist>.+?)\s+-\s+(?P<title>.+?)\s*$").unwrap());

// The dash form must be tried before the dot form, or "01 - Foo" would
// lose only "01 " to the dot alternative.
static LEADING_ORDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+\s*-\s*|\d+\.?\s+)").unwrap());

/// Fill in missing artist/title from the title or the URI.
///
/// Applies the first matching rule only:
/// 1. remote streams are left untouched;
/// 2. tracks with both artist and title set are left untouched;
/// 3. a title of the form `<artist> - <title>` is split;
/// 4. the URI basename, stripped of one extension and a leading
///    ordering prefix, is split the same way, or used verbatim as the
///    title.
pub fn interpolate_missing_fields(track: &mut Track) {
    if track.is_stream() {
        return;
    }
    if !track.artist.is_empty() && !track.title.is_empty() {
        return;
    }

    if track.artist.is_empty() {
        if let Some(caps) = ARTIST_DASH_TITLE.captures(&track.title) {
            let artist = caps["artist"].to_string();
            let title = caps["title"].to_string();
            track.artist = artist;
            track.title = title;
            return;
        }
    }

    let basename = track.uri.rsplit('/').next().unwrap_or_default();
    let basename = match basename.rfind('.') {
        Some(dot) => &basename[..dot],
        None => basename,
    };
    let basename = LEADING_ORDER.replace(basename, "");

    if track.artist.is_empty() {
        if let Some(caps) = ARTIST_DASH_TITLE.captures(&basename) {
            track.artist = caps["artist"].to_string();
            track.title = caps["title"].to_string();
            return;
        }
    }
    if track.title.is_empty() {
        track.title = basename.into_owned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpolated(track: Track) -> Track {
        let mut track = track;
        interpolate_missing_fields(&mut track);
        track
    }

    #[test]
    fn streams_are_left_as_is() {
        for uri in ["http://example.com/", "https://example.com/"] {
            let track = interpolated(Track::new(uri));
            assert_eq!(track.artist, "");
            assert_eq!(track.title, "");
        }
    }

    #[test]
    fn complete_tracks_are_left_as_is() {
        let track = interpolated(Track {
            uri: "file://Wrong Artist - Wrong Title.wav".into(),
            artist: "Some Artist".into(),
            title: "Some Title".into(),
            ..Track::default()
        });
        assert_eq!(track.artist, "Some Artist");
        assert_eq!(track.title, "Some Title");
    }

    #[test]
    fn artist_and_title_from_title() {
        let track = interpolated(Track {
            title: "Some Artist - Some Title".into(),
            ..Track::default()
        });
        assert_eq!(track.artist, "Some Artist");
        assert_eq!(track.title, "Some Title");
    }

    #[test]
    fn artist_and_title_from_filename() {
        for uri in [
            "file://foo/bar/baz/Some Artist - Some Title.wav",
            "file://foo/bar/baz/01. Some Artist - Some Title.wav",
            "file://foo/bar/baz/01 - Some Artist - Some Title.wav",
        ] {
            let track = interpolated(Track::new(uri));
            assert_eq!(track.artist, "Some Artist", "uri: {uri}");
            assert_eq!(track.title, "Some Title", "uri: {uri}");
        }
    }

    #[test]
    fn filename_is_title_fallback() {
        let track = interpolated(Track::new("file://foo/bar/baz/Unintelligible.wav"));
        assert_eq!(track.artist, "");
        assert_eq!(track.title, "Unintelligible");
    }

    #[test]
    fn json_shape() {
        let track = Track {
            uri: "file:///music/a.flac".into(),
            artist: "A".into(),
            title: "B".into(),
            duration: Duration::from_secs(42),
            has_art: true,
            ..Track::default()
        };
        let value = serde_json::to_value(&track).unwrap();
        assert_eq!(value["uri"], "file:///music/a.flac");
        assert_eq!(value["duration"], 42);
        assert_eq!(value["hasart"], true);
        assert_eq!(value["albumartist"], "");
    }
}
