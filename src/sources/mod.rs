pub mod direct_url;
pub mod events;
pub mod spotify;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ResolveError;

pub use direct_url::DirectUrlClient;
pub use spotify::SpotifySource;

/// Trait común para todas las fuentes de música
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Resuelve una URL en un track o una colección.
    ///
    /// `Ok(None)` means the URL does not belong to this source.
    async fn load_item(&self, url: &str) -> Result<Option<AudioItem>, ResolveError>;

    /// Verifica si la URL es válida para esta fuente
    fn is_valid_url(&self, url: &str) -> bool;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

/// Track ready to be handed to the audio engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackDescriptor {
    name: String,
    source_url: String,
    artists: Vec<String>,
    /// 0 when unknown
    duration_ms: u64,
}

impl TrackDescriptor {
    pub fn new(name: String, source_url: String) -> Self {
        Self {
            name,
            source_url,
            artists: Vec::new(),
            duration_ms: 0,
        }
    }

    // Getters
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn source_url(&self) -> &str {
        &self.source_url
    }
    pub fn artists(&self) -> &[String] {
        &self.artists
    }
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_ms > 0).then(|| Duration::from_millis(self.duration_ms))
    }

    // Setters
    pub fn with_artists(mut self, artists: Vec<String>) -> Self {
        self.artists = artists;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Named, ordered collection (playlist, album or artist top songs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistDescriptor {
    pub name: String,
    pub tracks: Vec<TrackDescriptor>,
    /// Locally-stored items left out of `tracks`
    pub skipped_local: usize,
}

/// Resultado de resolver una URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AudioItem {
    Track(TrackDescriptor),
    Playlist(PlaylistDescriptor),
}

impl AudioItem {
    pub fn len(&self) -> usize {
        match self {
            AudioItem::Track(_) => 1,
            AudioItem::Playlist(p) => p.tracks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_tracks(self) -> Vec<TrackDescriptor> {
        match self {
            AudioItem::Track(t) => vec![t],
            AudioItem::Playlist(p) => p.tracks,
        }
    }
}

/// Manager para todas las fuentes de música
///
/// Sources are asked in registration order. The first one that recognizes
/// the URL decides the outcome, including errors.
#[derive(Default, Clone)]
pub struct SourceManager {
    sources: Vec<Arc<dyn MusicSource>>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Arc<dyn MusicSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn sources(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sources.iter().map(|s| s.source_name())
    }

    /// Detecta la fuente y resuelve la URL
    pub async fn load(&self, url: &str) -> Result<Option<AudioItem>, ResolveError> {
        for source in &self.sources {
            match source.load_item(url).await {
                Ok(Some(item)) => {
                    info!("🎵 {} resolvió {} ({} canciones)", source.source_name(), url, item.len());
                    return Ok(Some(item));
                }
                Ok(None) => debug!("{} no reconoce {}", source.source_name(), url),
                Err(e) => {
                    warn!("❌ {} falló para {}: {}", source.source_name(), url, e);
                    return Err(e);
                }
            }
        }

        warn!("URL no soportada: {}", url);
        Ok(None)
    }
}
