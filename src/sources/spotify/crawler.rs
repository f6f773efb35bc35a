//! Recorre todas las páginas de una playlist o un álbum.
//!
//! A crawl starts from the first page embedded in the entity and follows
//! each page's `next` cursor until a page has none. Policy on failures:
//!
//! - `RateLimited` and authentication errors abort the crawl and propagate; pages
//!   collected so far are dropped.
//! - An unparsable cursor, a page that cannot be fetched, or more pages than
//!   `max_pages` abort the crawl with an empty result (never a partial one),
//!   for playlists and albums alike.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::client::{CatalogClient, CatalogResult, PageCursor};
use super::models::{Album, Page, Playlist, Track};
use crate::error::CatalogError;
use crate::sources::events::{LocalTracksNotifier, LocalTracksSkipped};

/// Upper bound on follow-up page requests for a single crawl.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Result of a complete crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedTracks {
    pub tracks: Vec<Track>,
    /// Locally-stored items removed from a playlist during this crawl.
    pub filtered_local: usize,
}

#[derive(Clone)]
pub struct PageCrawler {
    client: Arc<dyn CatalogClient>,
    notifier: Arc<dyn LocalTracksNotifier>,
    max_pages: usize,
}

impl PageCrawler {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        notifier: Arc<dyn LocalTracksNotifier>,
        max_pages: usize,
    ) -> Self {
        Self {
            client,
            notifier,
            max_pages,
        }
    }

    pub async fn crawl_playlist(&self, playlist: Playlist) -> Result<CollectedTracks, CatalogError> {
        let client = self.client.as_ref();
        let owner_id = playlist.owner.id.as_str();
        let playlist_id = playlist.id.as_str();

        let items = self
            .collect_pages("playlist", playlist_id, playlist.tracks, |cursor| async move {
                client.get_playlist_page(owner_id, playlist_id, &cursor).await
            })
            .await?;
        let Some(items) = items else {
            return Ok(CollectedTracks::default());
        };

        let mut filtered_local = 0;
        let mut tracks = Vec::with_capacity(items.len());
        for item in items {
            match item.track {
                _ if item.is_local => filtered_local += 1,
                Some(track) if track.is_local => filtered_local += 1,
                Some(track) => tracks.push(track),
                None => debug!("Elemento sin track en la playlist {}, omitido", playlist_id),
            }
        }

        if filtered_local > 0 {
            self.notifier.local_tracks_skipped(LocalTracksSkipped {
                playlist_id: playlist_id.to_string(),
                count: filtered_local,
            });
        }

        Ok(CollectedTracks {
            tracks,
            filtered_local,
        })
    }

    pub async fn crawl_album(&self, album: Album) -> Result<CollectedTracks, CatalogError> {
        let client = self.client.as_ref();
        let album_id = album.id.as_str();

        let tracks = self
            .collect_pages("album", album_id, album.tracks, |cursor| async move {
                client.get_album_page(album_id, &cursor).await
            })
            .await?;

        Ok(CollectedTracks {
            tracks: tracks.unwrap_or_default(),
            filtered_local: 0,
        })
    }

    /// Follows cursors from `first`. `Ok(None)` means the crawl was aborted.
    async fn collect_pages<T, F, Fut>(
        &self,
        what: &str,
        id: &str,
        first: Page<T>,
        mut fetch_page: F,
    ) -> Result<Option<Vec<T>>, CatalogError>
    where
        F: FnMut(PageCursor) -> Fut,
        Fut: Future<Output = CatalogResult<Page<T>>>,
    {
        let mut items = first.items;
        let mut next = first.next;
        let mut requests = 0usize;

        while let Some(link) = next {
            if requests >= self.max_pages {
                warn!(
                    "⚠️ {} {}: se alcanzó el límite de {} páginas, abortando",
                    what, id, self.max_pages
                );
                return Ok(None);
            }

            let Some(cursor) = PageCursor::parse(&link) else {
                error!("❌ Cursor de página inválido para {} {}: {}", what, id, link);
                return Ok(None);
            };

            requests += 1;
            match fetch_page(cursor).await? {
                Some(page) => {
                    items.extend(page.items);
                    next = page.next;
                }
                None => {
                    error!("❌ No se pudo obtener la página {} de {} {}", cursor.offset, what, id);
                    return Ok(None);
                }
            }
        }

        info!(
            "📄 {} {}: {} elementos, petición de páginas ejecutada {} veces",
            what,
            id,
            items.len(),
            requests
        );
        Ok(Some(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::spotify::client::MockCatalogClient;
    use crate::sources::spotify::models::{Owner, PlaylistItem};
    use mockall::predicate::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<LocalTracksSkipped>>,
    }

    impl LocalTracksNotifier for RecordingNotifier {
        fn local_tracks_skipped(&self, event: LocalTracksSkipped) {
            self.events.lock().push(event);
        }
    }

    fn track(id: &str) -> Track {
        Track {
            id: Some(id.to_string()),
            name: format!("Track {id}"),
            artists: vec![],
            duration_ms: 1000,
            external_urls: Default::default(),
            is_local: false,
        }
    }

    fn item(id: &str) -> PlaylistItem {
        PlaylistItem {
            is_local: false,
            track: Some(track(id)),
        }
    }

    fn local_item(name: &str) -> PlaylistItem {
        PlaylistItem {
            is_local: true,
            track: Some(Track {
                id: None,
                is_local: true,
                ..track(name)
            }),
        }
    }

    fn next_link(offset: u32) -> Option<String> {
        Some(format!(
            "https://api.spotify.com/v1/playlists/pl/tracks?offset={offset}&limit=2"
        ))
    }

    fn playlist(first: Page<PlaylistItem>) -> Playlist {
        Playlist {
            id: "pl".to_string(),
            name: "Mix".to_string(),
            owner: Owner {
                id: "alice".to_string(),
                display_name: None,
            },
            tracks: first,
        }
    }

    fn ids(collected: &CollectedTracks) -> Vec<String> {
        collected
            .tracks
            .iter()
            .map(|t| t.id.clone().unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn test_three_pages_with_local_items_on_page_two() {
        let mut client = MockCatalogClient::new();
        client
            .expect_get_playlist_page()
            .with(eq("alice"), eq("pl"), eq(PageCursor { offset: 2, limit: 2 }))
            .times(1)
            .returning(|_, _, _| {
                Ok(Some(Page {
                    items: vec![local_item("l1"), item("t3"), local_item("l2")],
                    next: next_link(5),
                    total: 7,
                }))
            });
        client
            .expect_get_playlist_page()
            .with(eq("alice"), eq("pl"), eq(PageCursor { offset: 5, limit: 2 }))
            .times(1)
            .returning(|_, _, _| {
                Ok(Some(Page {
                    items: vec![item("t4"), item("t5")],
                    next: None,
                    total: 7,
                }))
            });

        let notifier = Arc::new(RecordingNotifier::default());
        let crawler = PageCrawler::new(Arc::new(client), notifier.clone(), DEFAULT_MAX_PAGES);

        let collected = crawler
            .crawl_playlist(playlist(Page {
                items: vec![item("t1"), item("t2")],
                next: next_link(2),
                total: 7,
            }))
            .await
            .unwrap();

        assert_eq!(ids(&collected), vec!["t1", "t2", "t3", "t4", "t5"]);
        assert_eq!(collected.filtered_local, 2);
        assert_eq!(
            *notifier.events.lock(),
            vec![LocalTracksSkipped {
                playlist_id: "pl".to_string(),
                count: 2
            }]
        );
    }

    #[tokio::test]
    async fn test_malformed_cursor_on_page_two_aborts_to_empty() {
        let mut client = MockCatalogClient::new();
        client
            .expect_get_playlist_page()
            .times(1)
            .returning(|_, _, _| {
                Ok(Some(Page {
                    items: vec![item("t3")],
                    next: Some("%%% not a cursor %%%".to_string()),
                    total: 9,
                }))
            });

        let notifier = Arc::new(RecordingNotifier::default());
        let crawler = PageCrawler::new(Arc::new(client), notifier.clone(), DEFAULT_MAX_PAGES);

        let collected = crawler
            .crawl_playlist(playlist(Page {
                items: vec![item("t1"), local_item("l1")],
                next: next_link(2),
                total: 9,
            }))
            .await
            .unwrap();

        assert_eq!(collected, CollectedTracks::default());
        assert!(notifier.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_mid_crawl_propagates() {
        let mut client = MockCatalogClient::new();
        client.expect_get_album_page().times(1).returning(|_, _| {
            Err(CatalogError::RateLimited {
                retry_after: Duration::from_secs(12),
            })
        });

        let crawler = PageCrawler::new(
            Arc::new(client),
            Arc::new(RecordingNotifier::default()),
            DEFAULT_MAX_PAGES,
        );
        let album = Album {
            id: "al".to_string(),
            name: "Record".to_string(),
            artists: vec![],
            tracks: Page {
                items: vec![track("t1")],
                next: Some("https://api.spotify.com/v1/albums/al/tracks?offset=1".to_string()),
                total: 2,
            },
        };

        let err = crawler.crawl_album(album).await.unwrap_err();
        assert_eq!(
            err,
            CatalogError::RateLimited {
                retry_after: Duration::from_secs(12)
            }
        );
    }

    #[tokio::test]
    async fn test_failed_album_page_aborts_to_empty() {
        let mut client = MockCatalogClient::new();
        client
            .expect_get_album_page()
            .times(1)
            .returning(|_, _| Ok(None));

        let crawler = PageCrawler::new(
            Arc::new(client),
            Arc::new(RecordingNotifier::default()),
            DEFAULT_MAX_PAGES,
        );
        let album = Album {
            id: "al".to_string(),
            name: "Record".to_string(),
            artists: vec![],
            tracks: Page {
                items: vec![track("t1")],
                next: Some("https://api.spotify.com/v1/albums/al/tracks?offset=1".to_string()),
                total: 2,
            },
        };

        let collected = crawler.crawl_album(album).await.unwrap();
        assert!(collected.tracks.is_empty());
    }

    #[tokio::test]
    async fn test_single_page_needs_no_requests() {
        let client = MockCatalogClient::new();
        let crawler = PageCrawler::new(
            Arc::new(client),
            Arc::new(RecordingNotifier::default()),
            DEFAULT_MAX_PAGES,
        );

        let collected = crawler
            .crawl_playlist(playlist(Page {
                items: vec![
                    item("t1"),
                    PlaylistItem {
                        is_local: false,
                        track: None,
                    },
                ],
                next: None,
                total: 2,
            }))
            .await
            .unwrap();

        assert_eq!(ids(&collected), vec!["t1"]);
        assert_eq!(collected.filtered_local, 0);
    }

    #[tokio::test]
    async fn test_endless_cursors_stop_at_page_cap() {
        let mut client = MockCatalogClient::new();
        client.expect_get_album_page().times(3).returning(|_, _| {
            Ok(Some(Page {
                items: vec![track("again")],
                next: Some("https://api.spotify.com/v1/albums/al/tracks?offset=1".to_string()),
                total: 1,
            }))
        });

        let crawler = PageCrawler::new(Arc::new(client), Arc::new(RecordingNotifier::default()), 3);
        let album = Album {
            id: "al".to_string(),
            name: "Loop".to_string(),
            artists: vec![],
            tracks: Page {
                items: vec![],
                next: Some("https://api.spotify.com/v1/albums/al/tracks?offset=1".to_string()),
                total: 1,
            },
        };

        assert!(crawler.crawl_album(album).await.unwrap().tracks.is_empty());
    }
}
