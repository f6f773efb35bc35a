//! Clasificación de URLs del catálogo.
//!
//! Turns `https://open.spotify.com/<entity>/<id>` style links into an
//! [`EntityKey`]. Patterns are tried in a fixed order (track, playlist,
//! user playlist, album, artist) and ids are returned exactly as they
//! appear in the URL, since the catalog treats them as case-sensitive.

use std::fmt;

use regex::Regex;

/// Id used when a URL matches a pattern but carries no id at all.
pub const SENTINEL_ID: &str = "no-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Track,
    Playlist,
    UserPlaylist,
    Album,
    Artist,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Track => "track",
            EntityKind::Playlist => "playlist",
            EntityKind::UserPlaylist => "user playlist",
            EntityKind::Album => "album",
            EntityKind::Artist => "artist",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackKey(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaylistKey(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserPlaylistKey {
    pub owner_id: String,
    pub playlist_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlbumKey(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtistKey(pub String);

/// Identificador de una entidad del catálogo, usado como clave de caché.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Track(TrackKey),
    Playlist(PlaylistKey),
    UserPlaylist(UserPlaylistKey),
    Album(AlbumKey),
    Artist(ArtistKey),
}

impl EntityKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityKey::Track(_) => EntityKind::Track,
            EntityKey::Playlist(_) => EntityKind::Playlist,
            EntityKey::UserPlaylist(_) => EntityKind::UserPlaylist,
            EntityKey::Album(_) => EntityKind::Album,
            EntityKey::Artist(_) => EntityKind::Artist,
        }
    }

    /// Primary id of the entity (the playlist id for user playlists).
    pub fn id(&self) -> &str {
        match self {
            EntityKey::Track(TrackKey(id))
            | EntityKey::Playlist(PlaylistKey(id))
            | EntityKey::Album(AlbumKey(id))
            | EntityKey::Artist(ArtistKey(id)) => id,
            EntityKey::UserPlaylist(key) => &key.playlist_id,
        }
    }

    /// True when the URL matched a pattern but no id could be extracted.
    pub fn is_sentinel(&self) -> bool {
        match self {
            EntityKey::UserPlaylist(key) => {
                key.owner_id == SENTINEL_ID || key.playlist_id == SENTINEL_ID
            }
            other => other.id() == SENTINEL_ID,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::UserPlaylist(key) => {
                write!(f, "user playlist {}/{}", key.owner_id, key.playlist_id)
            }
            other => write!(f, "{} {}", other.kind(), other.id()),
        }
    }
}

/// Pattern matcher for catalog URLs on a single host.
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    host: String,
    track: Regex,
    playlist: Regex,
    user_playlist: Regex,
    album: Regex,
    artist: Regex,
}

impl UrlClassifier {
    pub fn new(host: &str) -> Result<Self, regex::Error> {
        let host_pattern = format!("(?i:{})", regex::escape(host));
        let build = |path: &str| {
            Regex::new(&format!(
                r"^https?://{host_pattern}/{path}/?(?:[?#]\S*)?$"
            ))
        };

        Ok(Self {
            host: host.to_lowercase(),
            track: build(r"tracks?/([^?#/\s]*)")?,
            playlist: build(r"playlists?/([^?#/\s]*)")?,
            user_playlist: build(r"user/([^?#/\s]*)/playlists?/([^?#/\s]*)")?,
            album: build(r"albums?/([^?#/\s]*)")?,
            artist: build(r"artists?/([^?#/\s]*)")?,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Quick pre-check used before running the individual patterns.
    pub fn is_catalog_url(&self, url: &str) -> bool {
        match url::Url::parse(url.trim()) {
            Ok(parsed) => parsed
                .host_str()
                .map(|h| h.eq_ignore_ascii_case(&self.host))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Returns `None` when the URL does not belong to the catalog.
    pub fn classify(&self, url: &str) -> Option<EntityKey> {
        let url = url.trim();
        if !self.is_catalog_url(url) {
            return None;
        }

        if let Some(id) = capture_id(&self.track, url) {
            return Some(EntityKey::Track(TrackKey(id)));
        }
        if let Some(id) = capture_id(&self.playlist, url) {
            return Some(EntityKey::Playlist(PlaylistKey(id)));
        }
        if let Some(caps) = self.user_playlist.captures(url) {
            return Some(EntityKey::UserPlaylist(UserPlaylistKey {
                owner_id: non_empty(caps.get(1).map(|m| m.as_str())),
                playlist_id: non_empty(caps.get(2).map(|m| m.as_str())),
            }));
        }
        if let Some(id) = capture_id(&self.album, url) {
            return Some(EntityKey::Album(AlbumKey(id)));
        }
        if let Some(id) = capture_id(&self.artist, url) {
            return Some(EntityKey::Artist(ArtistKey(id)));
        }

        None
    }
}

fn capture_id(regex: &Regex, url: &str) -> Option<String> {
    regex
        .captures(url)
        .map(|caps| non_empty(caps.get(1).map(|m| m.as_str())))
}

fn non_empty(capture: Option<&str>) -> String {
    match capture {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => SENTINEL_ID.to_string(),
    }
}
