use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::CacheSettings;
use crate::sources::spotify::SpotifySettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Credenciales del catálogo
    pub spotify_client_id: String,
    pub spotify_client_secret: String,

    // Endpoints
    pub spotify_api_url: String,
    pub spotify_accounts_url: String,
    pub catalog_host: String,
    pub catalog_market: String,

    // Caché
    pub cache_ttl_secs: u64,
    pub track_cache_size: usize,
    pub playlist_cache_size: usize,
    pub album_cache_size: usize,
    pub artist_cache_size: usize,

    // Límites
    pub max_crawl_pages: usize,
    pub http_timeout_secs: u64,

    // Rendimiento
    pub worker_threads: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (the process
    /// environment in [`Config::load`]).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str, default: String| lookup(key).unwrap_or(default);

        let config = Self {
            spotify_client_id: lookup("SPOTIFY_CLIENT_ID").context("SPOTIFY_CLIENT_ID is required")?,
            spotify_client_secret: lookup("SPOTIFY_CLIENT_SECRET")
                .context("SPOTIFY_CLIENT_SECRET is required")?,

            spotify_api_url: var("SPOTIFY_API_URL", defaults.spotify_api_url),
            spotify_accounts_url: var("SPOTIFY_ACCOUNTS_URL", defaults.spotify_accounts_url),
            catalog_host: var("CATALOG_HOST", defaults.catalog_host),
            catalog_market: var("CATALOG_MARKET", defaults.catalog_market),

            cache_ttl_secs: var("CACHE_TTL_SECS", defaults.cache_ttl_secs.to_string())
                .parse()
                .context("CACHE_TTL_SECS")?,
            track_cache_size: var("TRACK_CACHE_SIZE", defaults.track_cache_size.to_string())
                .parse()
                .context("TRACK_CACHE_SIZE")?,
            playlist_cache_size: var("PLAYLIST_CACHE_SIZE", defaults.playlist_cache_size.to_string())
                .parse()
                .context("PLAYLIST_CACHE_SIZE")?,
            album_cache_size: var("ALBUM_CACHE_SIZE", defaults.album_cache_size.to_string())
                .parse()
                .context("ALBUM_CACHE_SIZE")?,
            artist_cache_size: var("ARTIST_CACHE_SIZE", defaults.artist_cache_size.to_string())
                .parse()
                .context("ARTIST_CACHE_SIZE")?,

            max_crawl_pages: var("MAX_CRAWL_PAGES", defaults.max_crawl_pages.to_string())
                .parse()
                .context("MAX_CRAWL_PAGES")?,
            http_timeout_secs: var("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs.to_string())
                .parse()
                .context("HTTP_TIMEOUT_SECS")?,

            worker_threads: match lookup("WORKER_THREADS") {
                Some(val) if !val.trim().is_empty() => val.trim().parse().context("WORKER_THREADS")?,
                _ => defaults.worker_threads,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Client id and secret must not be blank
    /// - Cache sizes, TTL, page cap and HTTP timeout must be > 0
    /// - The catalog host and market must not be blank
    pub fn validate(&self) -> Result<()> {
        if self.spotify_client_id.trim().is_empty() || self.spotify_client_secret.trim().is_empty() {
            anyhow::bail!("Spotify client id and secret must not be empty");
        }

        if self.catalog_host.trim().is_empty() {
            anyhow::bail!("Catalog host must not be empty");
        }

        if self.catalog_market.trim().is_empty() {
            anyhow::bail!("Catalog market must not be empty");
        }

        if self.cache_ttl_secs == 0 {
            anyhow::bail!("Cache TTL must be greater than 0");
        }

        for (name, size) in [
            ("Track", self.track_cache_size),
            ("Playlist", self.playlist_cache_size),
            ("Album", self.album_cache_size),
            ("Artist", self.artist_cache_size),
        ] {
            if size == 0 {
                anyhow::bail!("{} cache size must be greater than 0", name);
            }
        }

        if self.max_crawl_pages == 0 {
            anyhow::bail!("Max crawl pages must be greater than 0");
        }

        if self.http_timeout_secs == 0 {
            anyhow::bail!("HTTP timeout must be greater than 0");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Credentials are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Catalog: {} (market {}, api {})\n  \
            Cache: {} tracks, {} playlists, {} albums, {} artists, TTL {}\n  \
            Limits: {} pages per crawl, {}s HTTP timeout\n  \
            Runtime: {} worker threads",
            self.catalog_host,
            self.catalog_market,
            self.spotify_api_url,
            self.track_cache_size,
            self.playlist_cache_size,
            self.album_cache_size,
            self.artist_cache_size,
            humantime::format_duration(self.cache_ttl()),
            self.max_crawl_pages,
            self.http_timeout_secs,
            self.worker_threads
        )
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn cache_settings(&self, capacity: usize) -> CacheSettings {
        CacheSettings {
            capacity,
            ttl: self.cache_ttl(),
        }
    }

    pub fn spotify_settings(&self) -> SpotifySettings {
        SpotifySettings {
            host: self.catalog_host.clone(),
            market: self.catalog_market.clone(),
            max_pages: self.max_crawl_pages,
            tracks: self.cache_settings(self.track_cache_size),
            playlists: self.cache_settings(self.playlist_cache_size),
            albums: self.cache_settings(self.album_cache_size),
            artists: self.cache_settings(self.artist_cache_size),
        }
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Credenciales (sin valor por defecto)
            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),

            spotify_api_url: "https://api.spotify.com/v1".to_string(),
            spotify_accounts_url: "https://accounts.spotify.com".to_string(),
            catalog_host: "open.spotify.com".to_string(),
            catalog_market: "US".to_string(),

            cache_ttl_secs: 12 * 60 * 60, // 12 horas
            track_cache_size: 100,
            playlist_cache_size: 30,
            album_cache_size: 30,
            artist_cache_size: 25,

            max_crawl_pages: 100,
            http_timeout_secs: 10,

            worker_threads: num_cpus::get(),
        }
    }
}
