//! # Cache Module
//!
//! In-memory caches for catalog entities.
//!
//! Every entity kind (tracks, playlists, albums, artist top songs) gets its
//! own [`LoadingCache`], so a burst of playlist lookups never pushes tracks
//! out and vice versa. User playlists are not cached at all.
//!
//! ## Features
//!
//! - **LRU Eviction**: capacity-bounded, least recently used entry goes first
//! - **TTL Support**: entries expire after a fixed time-to-live (12h default)
//! - **Stale-While-Revalidate**: expired values are still served while a
//!   background reload runs on the tokio runtime
//! - **Single-Flight**: concurrent misses or refreshes for one key share a
//!   single loader call
//! - **Metrics**: hits, misses, stale hits, refreshes, failures, evictions
//!
//! ## Configuration
//!
//! ```env
//! TRACK_CACHE_SIZE=100        # Track entries
//! PLAYLIST_CACHE_SIZE=30      # Crawled playlists
//! ALBUM_CACHE_SIZE=30         # Crawled albums
//! ARTIST_CACHE_SIZE=25        # Artist top-song lists
//! CACHE_TTL_SECS=43200        # Time-to-live in seconds (12 hours)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//! use async_trait::async_trait;
//! use open_music_resolver::cache::{CacheLoader, CacheSettings, LoadingCache};
//!
//! struct Upper;
//!
//! #[async_trait]
//! impl CacheLoader<String, String> for Upper {
//!     type Error = String;
//!     async fn load(&self, key: &String) -> Result<String, String> {
//!         Ok(key.to_uppercase())
//!     }
//! }
//!
//! # async fn example() {
//! let settings = CacheSettings { capacity: 100, ttl: Duration::from_secs(3600) };
//! let cache = LoadingCache::new("upper", settings, Arc::new(Upper));
//! assert_eq!(cache.get(&"abc".to_string()).await.unwrap(), "ABC");
//! # }
//! ```

pub mod loading_cache;

pub use loading_cache::{CacheLoader, CacheMetrics, CacheSettings, EntryState, LoadingCache};
