//! Cliente del API remoto del catálogo.
//!
//! [`CatalogClient`] is the seam between the resolver and the network. Every
//! call returns `Result<Option<T>, CatalogError>`:
//!
//! - `Err(RateLimited)` / `Err(Unauthorized)` / `Err(TokenUnavailable)` must
//!   reach the orchestrator, which updates the rate-limit guard or refreshes
//!   the token after a 401.
//! - `Ok(None)` covers every other failure (404, 5xx, network, bad JSON).
//!   Those are logged here so one missing entity never aborts a whole
//!   resolution.
//!
//! The client never retries on its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use super::auth::TokenProvider;
use super::models::{Album, Artist, Page, Playlist, PlaylistItem, TopTracksResponse, Track};
use super::rate_limit::MAX_RETRY_AFTER;
use crate::error::CatalogError;

pub type CatalogResult<T> = Result<Option<T>, CatalogError>;

/// Wait used when a 429 arrives without a usable `Retry-After` header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Default page size requested by the catalog for track listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Position of a page inside a paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub offset: u32,
    pub limit: u32,
}

impl PageCursor {
    /// Parses the `next` link of a page (`...?offset=100&limit=100`).
    ///
    /// Returns `None` when the link is not a URL or carries no valid offset.
    pub fn parse(next: &str) -> Option<Self> {
        let parsed = url::Url::parse(next).ok()?;

        let mut offset = None;
        let mut limit = DEFAULT_PAGE_LIMIT;
        for (name, value) in parsed.query_pairs() {
            match name.as_ref() {
                "offset" => offset = Some(value.parse::<u32>().ok()?),
                "limit" => limit = value.parse::<u32>().ok()?,
                _ => {}
            }
        }

        Some(Self {
            offset: offset?,
            limit,
        })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn get_track(&self, id: &str) -> CatalogResult<Track>;

    /// Album with its first page of tracks.
    async fn get_album(&self, id: &str) -> CatalogResult<Album>;

    async fn get_artist(&self, id: &str) -> CatalogResult<Artist>;

    /// Playlist with its first page of items.
    async fn get_playlist(&self, id: &str) -> CatalogResult<Playlist>;

    /// Playlist addressed through its owner (`/user/{owner}/playlist/{id}` links).
    async fn get_user_playlist(&self, owner_id: &str, playlist_id: &str) -> CatalogResult<Playlist>;

    /// Next page of a playlist's items. The API addresses pages by playlist
    /// id alone, so `owner_id` only shows up in logs.
    async fn get_playlist_page(
        &self,
        owner_id: &str,
        playlist_id: &str,
        cursor: &PageCursor,
    ) -> CatalogResult<Page<PlaylistItem>>;

    async fn get_album_page(&self, album_id: &str, cursor: &PageCursor) -> CatalogResult<Page<Track>>;

    async fn get_artist_top_tracks(&self, artist_id: &str, market: &str) -> CatalogResult<Vec<Track>>;
}

/// Reads `Retry-After` (seconds) from a 429 response, capped at
/// [`MAX_RETRY_AFTER`].
pub(crate) fn retry_after_from(headers: &HeaderMap) -> Duration {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// [`CatalogClient`] over the catalog's REST API.
pub struct HttpCatalogClient {
    client: Client,
    api_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpCatalogClient {
    pub fn new(client: Client, api_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// The provider renews the token itself when it knows it has expired.
    async fn bearer(&self) -> Result<String, CatalogError> {
        if self.tokens.is_access_token_expired() {
            debug!("🔑 Token expirado, se renovará antes de llamar al catálogo");
        }
        self.tokens.access_token().await
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> CatalogResult<T> {
        let token = self.bearer().await?;
        let url = format!("{}/{}", self.api_url, path);
        debug!("🌐 GET {}", url);

        let response = match self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("❌ Error de red consultando {}: {}", url, e);
                return Ok(None);
            }
        };

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = retry_after_from(response.headers());
                error!("🚫 TooManyRequests en {} (retry after {:?})", url, retry_after);
                Err(CatalogError::RateLimited { retry_after })
            }
            StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                warn!("🔒 Token rechazado por el catálogo: {}", body);
                Err(CatalogError::Unauthorized(body))
            }
            StatusCode::NOT_FOUND => {
                debug!("🔍 No encontrado: {}", url);
                Ok(None)
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                error!("❌ Error del API del catálogo: {} - {}", status, body);
                Ok(None)
            }
            _ => match response.json::<T>().await {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    error!("❌ Respuesta inválida de {}: {}", url, e);
                    Ok(None)
                }
            },
        }
    }
}

fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

fn page_query(cursor: &PageCursor) -> [(&'static str, String); 2] {
    [
        ("offset", cursor.offset.to_string()),
        ("limit", cursor.limit.to_string()),
    ]
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn get_track(&self, id: &str) -> CatalogResult<Track> {
        self.fetch(&format!("tracks/{}", segment(id)), &[]).await
    }

    async fn get_album(&self, id: &str) -> CatalogResult<Album> {
        self.fetch(&format!("albums/{}", segment(id)), &[]).await
    }

    async fn get_artist(&self, id: &str) -> CatalogResult<Artist> {
        self.fetch(&format!("artists/{}", segment(id)), &[]).await
    }

    async fn get_playlist(&self, id: &str) -> CatalogResult<Playlist> {
        self.fetch(&format!("playlists/{}", segment(id)), &[]).await
    }

    async fn get_user_playlist(&self, owner_id: &str, playlist_id: &str) -> CatalogResult<Playlist> {
        self.fetch(
            &format!("users/{}/playlists/{}", segment(owner_id), segment(playlist_id)),
            &[],
        )
        .await
    }

    async fn get_playlist_page(
        &self,
        owner_id: &str,
        playlist_id: &str,
        cursor: &PageCursor,
    ) -> CatalogResult<Page<PlaylistItem>> {
        debug!(
            "📄 Página de playlist {} (owner {}) offset {}",
            playlist_id, owner_id, cursor.offset
        );
        self.fetch(
            &format!("playlists/{}/tracks", segment(playlist_id)),
            &page_query(cursor),
        )
        .await
    }

    async fn get_album_page(&self, album_id: &str, cursor: &PageCursor) -> CatalogResult<Page<Track>> {
        self.fetch(
            &format!("albums/{}/tracks", segment(album_id)),
            &page_query(cursor),
        )
        .await
    }

    async fn get_artist_top_tracks(&self, artist_id: &str, market: &str) -> CatalogResult<Vec<Track>> {
        let response: Option<TopTracksResponse> = self
            .fetch(
                &format!("artists/{}/top-tracks", segment(artist_id)),
                &[("market", market.to_string())],
            )
            .await?;
        Ok(response.map(|r| r.tracks))
    }
}
