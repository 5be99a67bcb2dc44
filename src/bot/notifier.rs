use async_trait::async_trait;
use serenity::{cache::Cache, http::Http, model::id::GuildId};
use std::sync::Arc;
use tracing::warn;

use crate::audio::PlaybackErrorSink;
use crate::sources::Track;

/// Publica los errores de reproducción en el canal del sistema del guild
pub struct SystemChannelNotifier {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SystemChannelNotifier {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }
}

pub fn playback_error_message(track: &Track, message: &str) -> String {
    format!("⚠️ Error de reproducción en **{}**: {}", track.title(), message)
}

#[async_trait]
impl PlaybackErrorSink for SystemChannelNotifier {
    async fn report(&self, guild_id: GuildId, track: &Track, message: &str) {
        let channel_id = guild_id
            .to_guild_cached(&self.cache)
            .and_then(|guild| guild.system_channel_id);

        let Some(channel_id) = channel_id else {
            warn!("⚠️ Guild {} sin canal del sistema; error de '{}': {}", guild_id, track.title(), message);
            return;
        };

        if let Err(e) = channel_id
            .say(&self.http, playback_error_message(track, message))
            .await
        {
            warn!("⚠️ No se pudo notificar el error en guild {}: {}", guild_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::test_requester;
    use parking_lot::Mutex;
    use std::io::Write;

    /// Destino de logs en memoria
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_playback_error_message() {
        let track = Track::new("q", "Song", "YouTube", test_requester()).unwrap();
        assert_eq!(
            playback_error_message(&track, "sin formatos"),
            "⚠️ Error de reproducción en **Song**: sin formatos"
        );
    }

    #[tokio::test]
    async fn test_missing_system_channel_logs_warning() {
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        // Guild ausente de la caché: no hay canal del sistema
        let notifier = SystemChannelNotifier::new(Arc::new(Http::new("")), Arc::new(Cache::new()));
        let track = Track::new("q", "Song", "YouTube", test_requester()).unwrap();
        notifier.report(GuildId::new(7), &track, "sin formatos").await;

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("sin canal del sistema"));
        assert!(output.contains("sin formatos"));
    }
}
