//! # Spotify Source
//!
//! Resolves catalog links (tracks, playlists, user playlists, albums and
//! artist top songs) into ordered [`TrackDescriptor`]s for the audio engine.
//!
//! ```text
//! URL ─► UrlClassifier ─► EntityKey
//!                            │
//!                 RateLimitGuard (fail fast while blocked)
//!                            │
//!          LoadingCache (track / playlist / album / artist)
//!                 │ miss or refresh               user playlists skip the cache
//!                 ▼                                          │
//!          CatalogClient ◄── PageCrawler ◄───────────────────┘
//!                            │
//!                 TrackDescriptor / PlaylistDescriptor
//! ```
//!
//! Only rate limiting (and a rejected token) travels up unchanged; any
//! other failure is logged where it happens and ends as "not found".

pub mod auth;
pub mod client;
pub mod crawler;
mod loaders;
pub mod models;
pub mod rate_limit;
pub mod url;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use self::auth::TokenProvider;
use self::client::CatalogClient;
use self::crawler::{PageCrawler, DEFAULT_MAX_PAGES};
use self::loaders::{
    AlbumLoader, CatalogContext, PlaylistLoader, TopTracksLoader, TrackLoader,
};
use self::models::Track;
use self::rate_limit::RateLimitGuard;
use self::url::{AlbumKey, ArtistKey, EntityKey, PlaylistKey, TrackKey, UrlClassifier};
use super::events::LocalTracksNotifier;
use super::{AudioItem, MusicSource, PlaylistDescriptor, TrackDescriptor};
use crate::cache::{CacheMetrics, CacheSettings, LoadingCache};
use crate::error::ResolveError;

pub use self::loaders::{TrackCollection, TOP_TRACKS_LIMIT};

pub const DEFAULT_CATALOG_HOST: &str = "open.spotify.com";
pub const DEFAULT_MARKET: &str = "US";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Tunables for [`SpotifySource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifySettings {
    pub host: String,
    pub market: String,
    pub max_pages: usize,
    pub tracks: CacheSettings,
    pub playlists: CacheSettings,
    pub albums: CacheSettings,
    pub artists: CacheSettings,
}

impl Default for SpotifySettings {
    fn default() -> Self {
        let with_capacity = |capacity| CacheSettings {
            capacity,
            ttl: DEFAULT_CACHE_TTL,
        };

        Self {
            host: DEFAULT_CATALOG_HOST.to_string(),
            market: DEFAULT_MARKET.to_string(),
            max_pages: DEFAULT_MAX_PAGES,
            tracks: with_capacity(100),
            playlists: with_capacity(30),
            albums: with_capacity(30),
            artists: with_capacity(25),
        }
    }
}

/// Snapshot of every entity cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceMetrics {
    pub tracks: CacheMetrics,
    pub playlists: CacheMetrics,
    pub albums: CacheMetrics,
    pub artists: CacheMetrics,
}

pub struct SpotifySource {
    classifier: UrlClassifier,
    ctx: Arc<CatalogContext>,
    tracks: LoadingCache<TrackKey, Track, ResolveError>,
    playlists: LoadingCache<PlaylistKey, TrackCollection, ResolveError>,
    albums: LoadingCache<AlbumKey, TrackCollection, ResolveError>,
    top_tracks: LoadingCache<ArtistKey, TrackCollection, ResolveError>,
}

impl SpotifySource {
    pub fn new(
        settings: SpotifySettings,
        client: Arc<dyn CatalogClient>,
        tokens: Arc<dyn TokenProvider>,
        guard: Arc<RateLimitGuard>,
        notifier: Arc<dyn LocalTracksNotifier>,
    ) -> Result<Self, regex::Error> {
        let classifier = UrlClassifier::new(&settings.host)?;
        let ctx = Arc::new(CatalogContext {
            crawler: PageCrawler::new(Arc::clone(&client), notifier, settings.max_pages),
            client,
            tokens,
            guard,
            market: settings.market.clone(),
        });

        Ok(Self {
            classifier,
            tracks: LoadingCache::new(
                "tracks",
                settings.tracks,
                Arc::new(TrackLoader(Arc::clone(&ctx))),
            ),
            playlists: LoadingCache::new(
                "playlists",
                settings.playlists,
                Arc::new(PlaylistLoader(Arc::clone(&ctx))),
            ),
            albums: LoadingCache::new(
                "albums",
                settings.albums,
                Arc::new(AlbumLoader(Arc::clone(&ctx))),
            ),
            top_tracks: LoadingCache::new(
                "artist-top-songs",
                settings.artists,
                Arc::new(TopTracksLoader(Arc::clone(&ctx))),
            ),
            ctx,
        })
    }

    pub fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }

    pub fn rate_limit_guard(&self) -> &Arc<RateLimitGuard> {
        &self.ctx.guard
    }

    pub fn metrics(&self) -> SourceMetrics {
        SourceMetrics {
            tracks: self.tracks.metrics(),
            playlists: self.playlists.metrics(),
            albums: self.albums.metrics(),
            artists: self.top_tracks.metrics(),
        }
    }

    /// Resolves a catalog URL.
    ///
    /// - `Ok(None)`: not a catalog URL, another source may handle it
    /// - `Ok(Some(item))`: a single track or a named, ordered collection
    /// - `Err(RateLimited)`: blocked, no request was sent
    /// - `Err(Unauthenticated)`: token rejected, a refresh is under way
    /// - `Err(NotFound)`: nothing usable came back
    pub async fn resolve(&self, url: &str) -> Result<Option<AudioItem>, ResolveError> {
        let Some(key) = self.classifier.classify(url) else {
            debug!("URL no pertenece al catálogo: {}", url);
            return Ok(None);
        };

        if let Some(retry_after) = self.ctx.guard.remaining() {
            warn!("⏳ Rate limit activo, {} rechazado sin consultar", key);
            return Err(ResolveError::RateLimited { retry_after });
        }

        if key.is_sentinel() {
            warn!("⚠️ URL sin identificador: {}", url);
            return Err(ResolveError::not_found(key.kind(), key.id()));
        }

        match self.resolve_key(&key).await {
            Ok(item) => {
                info!("✅ {} resuelto: {} canciones", key, item.len());
                Ok(Some(item))
            }
            Err(e) => {
                warn!("❌ No se pudo resolver {}: {}", key, e);
                Err(e)
            }
        }
    }

    async fn resolve_key(&self, key: &EntityKey) -> Result<AudioItem, ResolveError> {
        let item = match key {
            EntityKey::Track(k) => AudioItem::Track(self.describe(&self.tracks.get(k).await?)),
            EntityKey::Playlist(k) => self.collection_item(self.playlists.get(k).await?),
            EntityKey::UserPlaylist(k) => self.collection_item(self.ctx.load_user_playlist(k).await?),
            EntityKey::Album(k) => self.collection_item(self.albums.get(k).await?),
            EntityKey::Artist(k) => self.collection_item(self.top_tracks.get(k).await?),
        };
        Ok(item)
    }

    fn collection_item(&self, collection: TrackCollection) -> AudioItem {
        AudioItem::Playlist(PlaylistDescriptor {
            tracks: collection.tracks.iter().map(|t| self.describe(t)).collect(),
            name: collection.name,
            skipped_local: collection.filtered_local,
        })
    }

    fn describe(&self, track: &Track) -> TrackDescriptor {
        let source_url = match (track.catalog_url(), &track.id) {
            (Some(url), _) => url.to_string(),
            (None, Some(id)) => format!("https://{}/track/{}", self.classifier.host(), id),
            (None, None) => String::new(),
        };

        TrackDescriptor::new(track.name.clone(), source_url)
            .with_artists(track.artists.iter().map(|a| a.name.clone()).collect())
            .with_duration_ms(track.duration_ms)
    }
}

#[async_trait]
impl MusicSource for SpotifySource {
    async fn load_item(&self, url: &str) -> Result<Option<AudioItem>, ResolveError> {
        self.resolve(url).await
    }

    fn is_valid_url(&self, url: &str) -> bool {
        self.classifier.is_catalog_url(url)
    }

    fn source_name(&self) -> &'static str {
        "spotify"
    }
}
