use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::cache::Cache;
use serenity::model::id::{ChannelId, GuildId};
use serenity::model::permissions::Permissions;
use songbird::{
    input::{File, HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::MusicError;
use crate::sources::PreparedSource;

/// Aviso de fin de pista; sólo el primer disparo cuenta.
///
/// Lo disparan tanto el transporte (fin natural o error) como el reproductor
/// al saltar o detener, así que los disparos repetidos se ignoran.
#[derive(Debug, Clone)]
pub struct FinishedSignal {
    sender: Arc<Mutex<Option<oneshot::Sender<Option<String>>>>>,
}

impl FinishedSignal {
    pub fn new() -> (Self, oneshot::Receiver<Option<String>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Devuelve `false` si ya se había disparado
    pub fn fire(&self, error: Option<String>) -> bool {
        match self.sender.lock().take() {
            Some(tx) => {
                let _ = tx.send(error);
                true
            }
            None => false,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Abre conexiones de voz
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, MusicError>;
}

/// Una conexión de voz activa en un guild
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel(&self) -> Option<ChannelId>;

    async fn is_connected(&self) -> bool;

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), MusicError>;

    /// Empieza a sonar; `on_finished` se dispara al terminar o fallar
    async fn play(
        &self,
        source: &PreparedSource,
        volume: f32,
        on_finished: FinishedSignal,
    ) -> Result<Box<dyn AudioTransport>, MusicError>;

    async fn disconnect(&self);
}

/// Control de la pista en curso
pub trait AudioTransport: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
    fn set_volume(&self, volume: f32);
}

/// Conector respaldado por songbird
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    cache: Arc<Cache>,
    http: reqwest::Client,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, cache: Arc<Cache>) -> Self {
        Self {
            manager,
            cache,
            http: reqwest::Client::new(),
        }
    }

    /// Sin datos en caché se deja que songbird decida
    fn check_permissions(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError> {
        let bot_id = self.cache.current_user().id;
        let Some(guild) = self.cache.guild(guild_id) else {
            return Ok(());
        };
        let (Some(channel), Some(member)) = (guild.channels.get(&channel_id), guild.members.get(&bot_id))
        else {
            return Ok(());
        };

        if guild.user_permissions_in(channel, member).contains(Permissions::CONNECT) {
            Ok(())
        } else {
            Err(MusicError::ConnectionDenied)
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, MusicError> {
        self.check_permissions(guild_id, channel_id)?;

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| MusicError::ConnectionFailed(e.to_string()))?;

        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(Arc::new(SongbirdConnection {
            guild_id,
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
            channel: Mutex::new(channel_id),
        }))
    }
}

struct SongbirdConnection {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    channel: Mutex<ChannelId>,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn channel(&self) -> Option<ChannelId> {
        Some(*self.channel.lock())
    }

    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), MusicError> {
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(|e| MusicError::ConnectionFailed(e.to_string()))?;
        *self.channel.lock() = channel_id;
        info!("🔀 Movido al canal {} en guild {}", channel_id, self.guild_id);
        Ok(())
    }

    async fn play(
        &self,
        source: &PreparedSource,
        volume: f32,
        on_finished: FinishedSignal,
    ) -> Result<Box<dyn AudioTransport>, MusicError> {
        let input: Input = match &source.local_path {
            Some(path) => File::new(path.clone()).into(),
            None => HttpRequest::new(self.http.clone(), source.reference.clone()).into(),
        };

        let handle = self.call.lock().await.play_input(input);
        let _ = handle.set_volume(volume);

        let notifier = TrackFinishedHandler {
            signal: on_finished.clone(),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                // La pista terminó antes de registrar el evento
                warn!("⚠️ No se pudo registrar el evento de pista: {}", e);
                on_finished.fire(Some(e.to_string()));
                break;
            }
        }

        Ok(Box::new(SongbirdTransport { handle }))
    }

    async fn disconnect(&self) {
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Err(e) => debug!("Desconexión de guild {}: {}", self.guild_id, e),
        }
    }
}

struct SongbirdTransport {
    handle: TrackHandle,
}

impl AudioTransport for SongbirdTransport {
    fn pause(&self) {
        let _ = self.handle.pause();
    }

    fn resume(&self) {
        let _ = self.handle.play();
    }

    fn stop(&self) {
        let _ = self.handle.stop();
    }

    fn set_volume(&self, volume: f32) {
        let _ = self.handle.set_volume(volume);
    }
}

/// Handler para cuando termina una canción
#[derive(Clone)]
struct TrackFinishedHandler {
    signal: FinishedSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishedHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(states) => states.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(e.to_string()),
                _ => None,
            }),
            _ => None,
        };

        debug!("Track terminado (error: {:?})", error);
        self.signal.fire(error);
        Some(Event::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_finished_signal_fires_once() {
        let (signal, rx) = FinishedSignal::new();
        let other = signal.clone();

        assert!(!signal.is_fired());
        assert!(signal.fire(Some("boom".into())));
        assert!(!other.fire(None));
        assert!(other.is_fired());

        assert_eq!(rx.await.unwrap(), Some("boom".to_string()));
    }

    #[test]
    fn test_fire_without_receiver_is_harmless() {
        let (signal, rx) = FinishedSignal::new();
        drop(rx);
        assert!(signal.fire(None));
    }
}
