//! Events emitted by the resolver towards the rest of the bot.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// A playlist crawl skipped locally-stored files that cannot be streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTracksSkipped {
    pub playlist_id: String,
    pub count: usize,
}

/// Receives "N local tracks were skipped" announcements, once per crawl.
pub trait LocalTracksNotifier: Send + Sync {
    fn local_tracks_skipped(&self, event: LocalTracksSkipped);
}

/// Solo registra el evento en los logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl LocalTracksNotifier for TracingNotifier {
    fn local_tracks_skipped(&self, event: LocalTracksSkipped) {
        info!(
            "📁 Se omitieron {} canciones locales en la playlist {}",
            event.count, event.playlist_id
        );
    }
}

/// Forwards events to whoever owns the receiving end (e.g. the announcer).
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: UnboundedSender<LocalTracksSkipped>,
}

impl ChannelNotifier {
    pub fn new(sender: UnboundedSender<LocalTracksSkipped>) -> Self {
        Self { sender }
    }
}

impl LocalTracksNotifier for ChannelNotifier {
    fn local_tracks_skipped(&self, event: LocalTracksSkipped) {
        if self.sender.send(event).is_err() {
            warn!("⚠️ Receptor de anuncios cerrado, evento descartado");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier_forwards_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let notifier = ChannelNotifier::new(tx);

        notifier.local_tracks_skipped(LocalTracksSkipped {
            playlist_id: "pl".to_string(),
            count: 3,
        });

        assert_eq!(
            rx.recv().await,
            Some(LocalTracksSkipped {
                playlist_id: "pl".to_string(),
                count: 3
            })
        );
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        ChannelNotifier::new(tx).local_tracks_skipped(LocalTracksSkipped {
            playlist_id: "pl".to_string(),
            count: 1,
        });
    }
}
