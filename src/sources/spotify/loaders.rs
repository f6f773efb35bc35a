//! Loaders used by the per-entity caches (and directly for user playlists).
//!
//! Loaders run both for misses and for background refreshes, so they are
//! the ones that record rate limits in the guard and kick off token
//! refreshes. A background refresh that gets a 429 therefore still blocks
//! every later request.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::auth::TokenProvider;
use super::client::CatalogClient;
use super::crawler::PageCrawler;
use super::models::{Playlist, Track};
use super::rate_limit::RateLimitGuard;
use super::url::{AlbumKey, ArtistKey, EntityKind, PlaylistKey, TrackKey, UserPlaylistKey};
use crate::cache::CacheLoader;
use crate::error::{CatalogError, ResolveError};

/// Maximum number of tracks in an artist's top-songs list.
pub const TOP_TRACKS_LIMIT: usize = 10;

/// Tracks gathered for a playlist, album or artist, ready for conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCollection {
    pub name: String,
    pub tracks: Vec<Track>,
    pub filtered_local: usize,
}

/// Shared handles every loader needs.
pub(crate) struct CatalogContext {
    pub client: Arc<dyn CatalogClient>,
    pub tokens: Arc<dyn TokenProvider>,
    pub guard: Arc<RateLimitGuard>,
    pub crawler: PageCrawler,
    pub market: String,
}

impl CatalogContext {
    /// Applies the side effects of a catalog error and converts it.
    pub fn fail(&self, err: CatalogError) -> ResolveError {
        match &err {
            CatalogError::RateLimited { retry_after } => {
                warn!("🚫 El catálogo respondió TooManyRequests");
                self.guard.record_rate_limited(*retry_after);
            }
            CatalogError::Unauthorized(reason) => {
                warn!("🔒 Token rechazado ({}), solicitando uno nuevo", reason);
                let tokens = Arc::clone(&self.tokens);
                tokio::spawn(async move {
                    if let Err(e) = tokens.refresh_access_token().await {
                        warn!("❌ No se pudo renovar el token: {}", e);
                    }
                });
            }
            CatalogError::TokenUnavailable(reason) => {
                warn!("🔒 Sin token de acceso disponible: {}", reason);
            }
        }
        err.into()
    }

    pub async fn collect_playlist(&self, playlist: Playlist) -> Result<TrackCollection, ResolveError> {
        let name = playlist.name.clone();
        let id = playlist.id.clone();
        let collected = self
            .crawler
            .crawl_playlist(playlist)
            .await
            .map_err(|e| self.fail(e))?;

        if collected.tracks.is_empty() {
            return Err(ResolveError::not_found(EntityKind::Playlist, id));
        }

        Ok(TrackCollection {
            name,
            tracks: collected.tracks,
            filtered_local: collected.filtered_local,
        })
    }

    pub async fn load_user_playlist(&self, key: &UserPlaylistKey) -> Result<TrackCollection, ResolveError> {
        let playlist = self
            .client
            .get_user_playlist(&key.owner_id, &key.playlist_id)
            .await
            .map_err(|e| self.fail(e))?
            .ok_or_else(|| ResolveError::not_found(EntityKind::UserPlaylist, &key.playlist_id))?;

        self.collect_playlist(playlist).await
    }
}

pub(crate) struct TrackLoader(pub Arc<CatalogContext>);

#[async_trait]
impl CacheLoader<TrackKey, Track> for TrackLoader {
    type Error = ResolveError;

    async fn load(&self, key: &TrackKey) -> Result<Track, ResolveError> {
        self.0
            .client
            .get_track(&key.0)
            .await
            .map_err(|e| self.0.fail(e))?
            .ok_or_else(|| ResolveError::not_found(EntityKind::Track, &key.0))
    }
}

pub(crate) struct PlaylistLoader(pub Arc<CatalogContext>);

#[async_trait]
impl CacheLoader<PlaylistKey, TrackCollection> for PlaylistLoader {
    type Error = ResolveError;

    async fn load(&self, key: &PlaylistKey) -> Result<TrackCollection, ResolveError> {
        let playlist = self
            .0
            .client
            .get_playlist(&key.0)
            .await
            .map_err(|e| self.0.fail(e))?
            .ok_or_else(|| ResolveError::not_found(EntityKind::Playlist, &key.0))?;

        self.0.collect_playlist(playlist).await
    }
}

pub(crate) struct AlbumLoader(pub Arc<CatalogContext>);

#[async_trait]
impl CacheLoader<AlbumKey, TrackCollection> for AlbumLoader {
    type Error = ResolveError;

    async fn load(&self, key: &AlbumKey) -> Result<TrackCollection, ResolveError> {
        let ctx = &self.0;
        let album = ctx
            .client
            .get_album(&key.0)
            .await
            .map_err(|e| ctx.fail(e))?
            .ok_or_else(|| ResolveError::not_found(EntityKind::Album, &key.0))?;

        let name = album.name.clone();
        let collected = ctx.crawler.crawl_album(album).await.map_err(|e| ctx.fail(e))?;
        if collected.tracks.is_empty() {
            return Err(ResolveError::not_found(EntityKind::Album, &key.0));
        }

        Ok(TrackCollection {
            name,
            tracks: collected.tracks,
            filtered_local: 0,
        })
    }
}

pub(crate) struct TopTracksLoader(pub Arc<CatalogContext>);

#[async_trait]
impl CacheLoader<ArtistKey, TrackCollection> for TopTracksLoader {
    type Error = ResolveError;

    async fn load(&self, key: &ArtistKey) -> Result<TrackCollection, ResolveError> {
        let ctx = &self.0;
        let artist = ctx
            .client
            .get_artist(&key.0)
            .await
            .map_err(|e| ctx.fail(e))?
            .ok_or_else(|| ResolveError::not_found(EntityKind::Artist, &key.0))?;

        let mut tracks = ctx
            .client
            .get_artist_top_tracks(&artist.id, &ctx.market)
            .await
            .map_err(|e| ctx.fail(e))?
            .unwrap_or_default();
        if tracks.is_empty() {
            warn!("⚠️ Sin canciones populares para el artista {}", artist.name);
            return Err(ResolveError::not_found(EntityKind::Artist, &key.0));
        }
        tracks.truncate(TOP_TRACKS_LIMIT);

        Ok(TrackCollection {
            name: format!("Top 10 Songs by {}", artist.name),
            tracks,
            filtered_local: 0,
        })
    }
}
