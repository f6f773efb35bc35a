// Cliente para URLs directas a archivos de audio

use super::{AudioItem, MusicSource, TrackDescriptor};
use crate::error::ResolveError;
use async_trait::async_trait;
use tracing::debug;
use url::Url;

const AUDIO_EXTENSIONS: [&str; 7] = [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus", ".aac"];

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectUrlClient;

impl DirectUrlClient {
    pub fn new() -> Self {
        Self
    }

    /// File name of an http(s) audio URL, `None` for anything else.
    fn file_name(url: &str) -> Option<String> {
        let parsed = Url::parse(url.trim()).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }

        let segment = parsed.path_segments()?.next_back()?;
        let lower = segment.to_lowercase();
        if !AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            return None;
        }

        let decoded = urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string());
        Some(decoded)
    }
}

#[async_trait]
impl MusicSource for DirectUrlClient {
    async fn load_item(&self, url: &str) -> Result<Option<AudioItem>, ResolveError> {
        let Some(name) = Self::file_name(url) else {
            return Ok(None);
        };

        debug!("🔗 URL directa: {}", name);
        Ok(Some(AudioItem::Track(TrackDescriptor::new(
            name,
            url.trim().to_string(),
        ))))
    }

    fn is_valid_url(&self, url: &str) -> bool {
        Self::file_name(url).is_some()
    }

    fn source_name(&self) -> &'static str {
        "direct"
    }
}
