use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use pretty_assertions::assert_eq;

use open_music_resolver::cache::CacheSettings;
use open_music_resolver::sources::events::{ChannelNotifier, LocalTracksSkipped, TracingNotifier};
use open_music_resolver::sources::spotify::auth::{ClientCredentialsTokenProvider, StaticTokenProvider};
use open_music_resolver::sources::spotify::client::HttpCatalogClient;
use open_music_resolver::sources::spotify::rate_limit::{RateLimitGuard, MAX_RETRY_AFTER};
use open_music_resolver::sources::spotify::url::EntityKind;
use open_music_resolver::sources::spotify::{SpotifySettings, SpotifySource};
use open_music_resolver::sources::{AudioItem, DirectUrlClient, SourceManager};
use open_music_resolver::ResolveError;

const HOST: &str = "open.catalog.com";

fn settings() -> SpotifySettings {
    let small = CacheSettings {
        capacity: 10,
        ttl: Duration::from_secs(60),
    };
    SpotifySettings {
        host: HOST.to_string(),
        market: "US".to_string(),
        max_pages: 10,
        tracks: small,
        playlists: small,
        albums: small,
        artists: small,
    }
}

fn track_json(id: &str, name: &str) -> String {
    format!(
        r#"{{"id":"{id}","name":"{name}","duration_ms":200000,
            "artists":[{{"id":"a1","name":"Someone"}}],
            "external_urls":{{"spotify":"https://{HOST}/track/{id}"}}}}"#
    )
}

fn source_for(server: &mockito::Server, guard: Arc<RateLimitGuard>) -> SpotifySource {
    let tokens = Arc::new(StaticTokenProvider::new("test-token"));
    let client = Arc::new(HttpCatalogClient::new(
        reqwest::Client::new(),
        server.url(),
        tokens.clone(),
    ));
    SpotifySource::new(settings(), client, tokens, guard, Arc::new(TracingNotifier)).unwrap()
}

#[tokio::test]
async fn cold_track_resolves_with_a_single_remote_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/tracks/abc123")
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(track_json("abc123", "Cold Start"))
        .expect(1)
        .create_async()
        .await;

    let source = source_for(&server, Arc::new(RateLimitGuard::new()));
    let url = format!("https://{HOST}/track/abc123");

    for _ in 0..3 {
        let item = source.resolve(&url).await.unwrap().unwrap();
        let tracks = item.into_tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].name(), "Cold Start");
        assert_eq!(tracks[0].source_url(), url);
        assert_eq!(tracks[0].artists().to_vec(), vec!["Someone".to_string()]);
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn rate_limited_response_blocks_every_entity_kind() {
    let mut server = mockito::Server::new_async().await;
    let limited = server
        .mock("GET", "/albums/al1")
        .with_status(429)
        .with_header("retry-after", "30")
        .expect(1)
        .create_async()
        .await;
    let untouched = server
        .mock("GET", Matcher::Regex("^/(tracks|playlists|users|artists)/".to_string()))
        .expect(0)
        .create_async()
        .await;

    let guard = Arc::new(RateLimitGuard::new());
    let source = source_for(&server, guard.clone());

    let err = source
        .resolve(&format!("https://{HOST}/album/al1"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ResolveError::RateLimited {
            retry_after: Duration::from_secs(30)
        }
    );
    assert!(guard.is_blocked());

    for path in ["track/t1", "playlist/p1", "user/u1/playlist/p2", "album/al1", "artist/ar1"] {
        let err = source
            .resolve(&format!("https://{HOST}/{path}"))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{path}: {err}");
        assert!(matches!(err, ResolveError::RateLimited { .. }));
    }

    limited.assert_async().await;
    untouched.assert_async().await;
}

#[tokio::test]
async fn absurd_retry_after_blocks_for_at_most_a_day() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/tracks/t1")
        .with_status(429)
        .with_header("retry-after", "18446744073709551615")
        .create_async()
        .await;

    let guard = Arc::new(RateLimitGuard::new());
    let source = source_for(&server, guard.clone());

    let err = source
        .resolve(&format!("https://{HOST}/track/t1"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ResolveError::RateLimited {
            retry_after: MAX_RETRY_AFTER
        }
    );
    assert!(guard.remaining().unwrap() <= MAX_RETRY_AFTER);
}

#[tokio::test]
async fn rejected_credentials_hit_the_accounts_service_once() {
    let mut accounts = mockito::Server::new_async().await;
    let token_mock = accounts
        .mock("POST", "/api/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_client"}"#)
        .expect(1)
        .create_async()
        .await;
    let mut catalog = mockito::Server::new_async().await;
    let untouched = catalog
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let http = reqwest::Client::new();
    let tokens = Arc::new(ClientCredentialsTokenProvider::new(
        http.clone(),
        accounts.url(),
        "id",
        "bad",
    ));
    let client = Arc::new(HttpCatalogClient::new(http, catalog.url(), tokens.clone()));
    let source = SpotifySource::new(
        settings(),
        client,
        tokens,
        Arc::new(RateLimitGuard::new()),
        Arc::new(TracingNotifier),
    )
    .unwrap();

    let err = source
        .resolve(&format!("https://{HOST}/track/t1"))
        .await
        .unwrap_err();
    assert_eq!(err, ResolveError::Unauthenticated);

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    token_mock.assert_async().await;
    untouched.assert_async().await;
}

#[tokio::test]
async fn multi_page_playlist_is_crawled_in_order_without_local_files() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let first = server
        .mock("GET", "/playlists/pl1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"id":"pl1","name":"Road Trip","owner":{{"id":"owner1"}},
                "tracks":{{"items":[{{"track":{}}}],
                           "next":"{base}/playlists/pl1/tracks?offset=1&limit=1","total":3}}}}"#,
            track_json("t1", "One")
        ))
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/playlists/pl1/tracks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("offset".into(), "1".into()),
            Matcher::UrlEncoded("limit".into(), "1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"items":[{{"is_local":true,"track":{{"id":null,"name":"home.mp3","is_local":true}}}},
                          {{"track":{}}}],
                 "next":null,"total":3}}"#,
            track_json("t2", "Two")
        ))
        .expect(1)
        .create_async()
        .await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let tokens = Arc::new(StaticTokenProvider::new("test-token"));
    let client = Arc::new(HttpCatalogClient::new(
        reqwest::Client::new(),
        base.clone(),
        tokens.clone(),
    ));
    let source = SpotifySource::new(
        settings(),
        client,
        tokens,
        Arc::new(RateLimitGuard::new()),
        Arc::new(ChannelNotifier::new(tx)),
    )
    .unwrap();

    let item = source
        .resolve(&format!("https://{HOST}/playlist/pl1?si=abc"))
        .await
        .unwrap()
        .unwrap();
    let AudioItem::Playlist(playlist) = item else {
        panic!("expected a playlist");
    };

    assert_eq!(playlist.name, "Road Trip");
    assert_eq!(
        playlist.tracks.iter().map(|t| t.name()).collect::<Vec<_>>(),
        vec!["One", "Two"]
    );
    assert_eq!(playlist.skipped_local, 1);
    assert_eq!(
        rx.recv().await,
        Some(LocalTracksSkipped {
            playlist_id: "pl1".to_string(),
            count: 1
        })
    );

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn missing_entities_are_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/artists/ghost")
        .with_status(404)
        .create_async()
        .await;

    let source = source_for(&server, Arc::new(RateLimitGuard::new()));
    assert_eq!(
        source.resolve(&format!("https://{HOST}/artist/ghost")).await,
        Err(ResolveError::not_found(EntityKind::Artist, "ghost"))
    );
}

#[tokio::test]
async fn source_manager_falls_back_to_direct_urls() {
    let server = mockito::Server::new_async().await;
    let manager = SourceManager::new()
        .with_source(Arc::new(source_for(&server, Arc::new(RateLimitGuard::new()))))
        .with_source(Arc::new(DirectUrlClient::new()));

    let item = manager
        .load("https://files.example.com/mixes/late-night.mp3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.into_tracks()[0].name(), "late-night.mp3");

    assert_eq!(manager.load("https://example.com/about").await, Ok(None));
}
