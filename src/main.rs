use anyhow::Result;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use open_music_resolver::config::Config;
use open_music_resolver::sources::events::TracingNotifier;
use open_music_resolver::sources::spotify::auth::ClientCredentialsTokenProvider;
use open_music_resolver::sources::spotify::client::HttpCatalogClient;
use open_music_resolver::sources::spotify::rate_limit::RateLimitGuard;
use open_music_resolver::sources::{DirectUrlClient, SourceManager, SpotifySource};

fn main() -> Result<ExitCode> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music_resolver=debug".parse()?)
                .add_directive("reqwest=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("🎵 Iniciando Open Music Resolver v{}", env!("CARGO_PKG_VERSION"));

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        anyhow::bail!("Uso: open-music-resolver <url>...");
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(run(config, urls))
}

async fn run(config: Config, urls: Vec<String>) -> Result<ExitCode> {
    let manager = build_sources(&config)?;
    info!(
        "🚀 Fuentes activas: {}",
        manager.sources().collect::<Vec<_>>().join(", ")
    );

    let mut failed = false;
    for url in &urls {
        match manager.load(url).await {
            Ok(Some(item)) => println!("{}", serde_json::to_string_pretty(&item)?),
            Ok(None) => {
                error!("❌ URL no soportada: {}", url);
                failed = true;
            }
            Err(e) => {
                error!("❌ Error resolviendo {}: {}", url, e);
                failed = true;
            }
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn build_sources(config: &Config) -> Result<SourceManager> {
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(concat!("open-music-resolver/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let tokens = Arc::new(ClientCredentialsTokenProvider::new(
        http.clone(),
        config.spotify_accounts_url.clone(),
        config.spotify_client_id.clone(),
        config.spotify_client_secret.clone(),
    ));
    let client = Arc::new(HttpCatalogClient::new(
        http,
        config.spotify_api_url.clone(),
        tokens.clone(),
    ));

    let spotify = SpotifySource::new(
        config.spotify_settings(),
        client,
        tokens,
        Arc::new(RateLimitGuard::new()),
        Arc::new(TracingNotifier),
    )?;

    Ok(SourceManager::new()
        .with_source(Arc::new(spotify))
        .with_source(Arc::new(DirectUrlClient::new())))
}
