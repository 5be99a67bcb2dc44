use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::queue::{MusicQueue, QueueSnapshot};
use crate::audio::voice::{AudioTransport, FinishedSignal, VoiceConnection, VoiceConnector};
use crate::error::MusicError;
use crate::sources::{format_duration, ytdlp::remove_temporary_file, PlaybackSourceProvider, Track};

pub const DEFAULT_VOLUME: f32 = 0.5;
pub const MAX_VOLUME: f32 = 2.0;
pub const PROGRESS_BAR_LENGTH: usize = 18;
pub const LIVE_PROGRESS: &str = "[en vivo]";

const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Recibe los errores de reproducción que no tienen un comando a quien responder
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaybackErrorSink: Send + Sync {
    async fn report(&self, guild_id: GuildId, track: &Track, message: &str);
}

/// Colaboradores compartidos por todos los reproductores
#[derive(Clone)]
pub struct PlayerDeps {
    pub connector: Arc<dyn VoiceConnector>,
    pub provider: Arc<dyn PlaybackSourceProvider>,
    pub errors: Arc<dyn PlaybackErrorSink>,
    pub default_volume: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    Connecting,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct PlayerState {
    status: PlayerStatus,
    connection_state: ConnectionState,
    voice_channel: Option<ChannelId>,
    connection: Option<Arc<dyn VoiceConnection>>,
    current: Option<Track>,
    transport: Option<Arc<dyn AudioTransport>>,
    finished: Option<FinishedSignal>,
    cleanup_path: Option<PathBuf>,
    volume: f32,
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    /// Se incrementa al abandonar la pista en curso (stop/disconnect)
    epoch: u64,
}

/// Reproductor de un guild: cola, conexión de voz y bucle de reproducción.
///
/// El bucle es la única tarea que saca pistas de la cola y las reproduce de
/// a una, y sólo mientras haya un canal destino. Los comandos sólo tocan el
/// estado compartido y la señal de fin de la pista actual; el candado de
/// estado nunca se mantiene durante un await.
pub struct GuildPlayer {
    guild_id: GuildId,
    queue: MusicQueue,
    state: Mutex<PlayerState>,
    /// Refleja `voice_channel.is_some()` para despertar al bucle
    has_target: watch::Sender<bool>,
    connection_gate: tokio::sync::Mutex<()>,
    deps: PlayerDeps,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GuildPlayer {
    fn new(guild_id: GuildId, deps: PlayerDeps) -> Self {
        let volume = clamp_volume(deps.default_volume);
        Self {
            guild_id,
            queue: MusicQueue::new(),
            state: Mutex::new(PlayerState {
                status: PlayerStatus::Idle,
                connection_state: ConnectionState::Disconnected,
                voice_channel: None,
                connection: None,
                current: None,
                transport: None,
                finished: None,
                cleanup_path: None,
                volume,
                started_at: None,
                paused_at: None,
                epoch: 0,
            }),
            has_target: watch::channel(false).0,
            connection_gate: tokio::sync::Mutex::new(()),
            deps,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Crea el reproductor y arranca su bucle
    pub fn spawn(guild_id: GuildId, deps: PlayerDeps) -> Arc<Self> {
        let player = Arc::new(Self::new(guild_id, deps));
        let handle = tokio::spawn(player.clone().run());
        *player.task.lock() = Some(handle);
        player
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Agrega un track a la cola; devuelve su posición
    pub fn enqueue(&self, track: Track) -> usize {
        self.queue.push(track)
    }

    /// Une o mueve el bot al canal indicado.
    ///
    /// Llamar dos veces con el mismo canal abre una sola conexión.
    pub async fn connect(&self, channel_id: ChannelId) -> Result<(), MusicError> {
        let _gate = self.connection_gate.lock().await;

        let existing = {
            let mut state = self.state.lock();
            state.voice_channel = Some(channel_id);
            state.connection.clone()
        };
        self.has_target.send_replace(true);

        if let Some(connection) = existing {
            if connection.is_connected().await {
                if connection.channel() != Some(channel_id) {
                    connection.move_to(channel_id).await?;
                }
                return Ok(());
            }
        }

        self.establish(channel_id).await.map(|_| ())
    }

    /// Suelta la conexión de voz sin tocar la cola.
    ///
    /// Las pistas pendientes esperan hasta el próximo `connect`.
    pub async fn disconnect(&self) {
        let _gate = self.connection_gate.lock().await;

        // El canal se borra antes de subir la época
        let connection = {
            let mut state = self.state.lock();
            state.voice_channel = None;
            state.connection_state = ConnectionState::Disconnected;
            state.connection.take()
        };
        self.has_target.send_replace(false);
        self.halt_current();

        if let Some(connection) = connection {
            connection.disconnect().await;
            info!("👋 Guild {} desconectado", self.guild_id);
        }
    }

    /// Vacía la cola, corta la pista actual y se desconecta
    pub async fn stop(&self) {
        let cleared = self.queue.clear();
        self.disconnect().await;

        {
            let mut state = self.state.lock();
            state.current = None;
            state.started_at = None;
            state.paused_at = None;
            state.status = PlayerStatus::Idle;
        }
        info!("⏹️ Reproducción detenida en guild {} ({} en cola descartadas)", self.guild_id, cleared);
    }

    /// Salta la pista actual; `false` si no había ninguna
    pub fn skip(&self) -> bool {
        let (transport, finished) = {
            let state = self.state.lock();
            if !matches!(state.status, PlayerStatus::Playing | PlayerStatus::Paused) {
                return false;
            }
            (state.transport.clone(), state.finished.clone())
        };

        if let Some(transport) = transport {
            transport.stop();
        }
        if let Some(finished) = finished {
            finished.fire(None);
        }
        info!("⏭️ Pista saltada en guild {}", self.guild_id);
        true
    }

    pub fn pause(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != PlayerStatus::Playing {
            return false;
        }
        if let Some(transport) = &state.transport {
            transport.pause();
        }
        state.status = PlayerStatus::Paused;
        state.paused_at = Some(Instant::now());
        info!("⏸️ Reproducción pausada");
        true
    }

    pub fn resume(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != PlayerStatus::Paused {
            return false;
        }
        if let Some(transport) = &state.transport {
            transport.resume();
        }
        // El reloj de progreso no avanza mientras está en pausa
        if let (Some(started), Some(paused)) = (state.started_at, state.paused_at.take()) {
            state.started_at = Some(started + paused.elapsed());
        }
        state.status = PlayerStatus::Playing;
        info!("▶️ Reproducción reanudada");
        true
    }

    /// Ajusta el volumen (0.0–2.0); devuelve el valor aplicado
    pub fn set_volume(&self, level: f32) -> f32 {
        let volume = clamp_volume(level);
        let mut state = self.state.lock();
        state.volume = volume;
        if let Some(transport) = &state.transport {
            transport.set_volume(volume);
        }
        info!("🔊 Volumen ajustado a {}%", (volume * 100.0).round() as u32);
        volume
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn status(&self) -> PlayerStatus {
        self.state.lock().status
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection_state
    }

    pub fn voice_channel(&self) -> Option<ChannelId> {
        self.state.lock().voice_channel
    }

    pub fn current(&self) -> Option<Track> {
        self.state.lock().current.clone()
    }

    pub fn formatted_queue(&self) -> QueueSnapshot {
        self.queue.snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Barra de progreso de la pista actual, o el indicador de vivo
    pub fn progress(&self) -> String {
        let state = self.state.lock();
        let (Some(track), Some(started)) = (&state.current, state.started_at) else {
            return LIVE_PROGRESS.to_string();
        };
        if track.is_live() {
            return LIVE_PROGRESS.to_string();
        }

        let now = state.paused_at.unwrap_or_else(Instant::now);
        render_progress(
            now.saturating_duration_since(started),
            track.duration_seconds(),
            PROGRESS_BAR_LENGTH,
        )
    }

    /// Cancela el bucle y espera a que libere la conexión
    pub async fn teardown(&self) {
        self.shutdown.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(TEARDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => debug!("Bucle de guild {} finalizado", self.guild_id),
                Ok(Err(e)) => warn!("⚠️ El bucle de guild {} terminó con error: {}", self.guild_id, e),
                Err(_) => warn!("⏰ Timeout cerrando el bucle de guild {}", self.guild_id),
            }
        }
    }

    async fn run(self: Arc<Self>) {
        info!("🎧 Bucle de reproducción iniciado para guild {}", self.guild_id);

        loop {
            let (track, epoch) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = self.next_track() => next,
            };

            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                outcome = AssertUnwindSafe(self.play_track(track.clone(), epoch)).catch_unwind() => outcome,
            };

            // Un stop o disconnect en medio abandona la pista; no es un fallo
            let abandoned = self.state.lock().epoch != epoch;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) if abandoned => {
                    debug!("Pista '{}' abandonada en guild {}: {}", track.title(), self.guild_id, e);
                }
                Ok(Err(e)) => {
                    error!("❌ Falló '{}' en guild {}: {}", track.title(), self.guild_id, e);
                    self.report(&track, e.to_string());
                }
                Err(_) => {
                    error!("💥 Pánico reproduciendo '{}' en guild {}", track.title(), self.guild_id);
                    self.report(&track, "Error inesperado durante la reproducción.".to_string());
                }
            }

            self.finish_track().await;
        }

        self.halt_current();
        let connection = {
            let mut state = self.state.lock();
            state.connection_state = ConnectionState::Disconnected;
            state.connection.take()
        };
        if let Some(connection) = connection {
            connection.disconnect().await;
        }
        self.finish_track().await;
        info!("🛑 Bucle de reproducción detenido para guild {}", self.guild_id);
    }

    /// Espera a que haya canal destino y saca la siguiente pista.
    ///
    /// La pista queda como actual; se devuelve junto con la época vigente.
    async fn next_track(&self) -> (Track, u64) {
        let mut target = self.has_target.subscribe();
        loop {
            wait_for_target(&mut target, true).await;
            let track = tokio::select! {
                track = self.queue.pop() => track,
                _ = wait_for_target(&mut target, false) => continue,
            };

            let epoch = {
                let mut state = self.state.lock();
                if state.voice_channel.is_some() {
                    state.current = Some(track.clone());
                    Some(state.epoch)
                } else {
                    None
                }
            };
            match epoch {
                Some(epoch) => return (track, epoch),
                // Sacada justo al desconectar: cuenta como la pista cortada
                None => debug!("Pista '{}' descartada al desconectar", track.title()),
            }
        }
    }

    async fn play_track(&self, track: Track, epoch: u64) -> Result<(), MusicError> {
        {
            let mut state = self.state.lock();
            if state.connection_state != ConnectionState::Connected {
                state.status = PlayerStatus::Connecting;
            }
        }

        self.ensure_connection().await?;
        let prepared = self.deps.provider.prepare(&track).await?;

        let (connection, volume) = {
            let mut state = self.state.lock();
            state.cleanup_path = prepared.cleanup_path().map(Path::to_path_buf);
            if state.epoch != epoch {
                debug!("Pista '{}' abandonada antes de sonar", track.title());
                return Ok(());
            }
            if let (Some(seconds), Some(current)) = (prepared.duration_seconds, state.current.as_mut()) {
                current.backfill_duration(seconds);
            }
            (state.connection.clone(), state.volume)
        };

        let Some(connection) = connection else {
            error!("❌ Sin conexión de voz al reproducir '{}' en guild {}", track.title(), self.guild_id);
            return Ok(());
        };

        let (finished, done) = FinishedSignal::new();
        let transport: Arc<dyn AudioTransport> =
            Arc::from(connection.play(&prepared, volume, finished.clone()).await?);

        let abandoned = {
            let mut state = self.state.lock();
            state.transport = Some(transport.clone());
            state.finished = Some(finished.clone());
            state.started_at = Some(Instant::now());
            state.paused_at = None;
            state.status = PlayerStatus::Playing;
            state.epoch != epoch
        };
        if abandoned {
            transport.stop();
            finished.fire(None);
        }

        info!("🎵 Reproduciendo '{}' en guild {}", track.title(), self.guild_id);
        match done.await {
            Ok(Some(e)) => error!("❌ Error del transporte en '{}': {}", track.title(), e),
            Ok(None) => debug!("Track terminado: {}", track.title()),
            Err(_) => debug!("Señal de fin descartada para {}", track.title()),
        }
        Ok(())
    }

    async fn ensure_connection(&self) -> Result<Arc<dyn VoiceConnection>, MusicError> {
        let _gate = self.connection_gate.lock().await;

        let (existing, channel) = {
            let state = self.state.lock();
            (state.connection.clone(), state.voice_channel)
        };

        if let Some(connection) = existing {
            if connection.is_connected().await {
                return Ok(connection);
            }
        }

        let channel = channel.ok_or(MusicError::NotConnected)?;
        self.establish(channel).await
    }

    /// Abre la conexión; llamar con la compuerta tomada
    async fn establish(&self, channel_id: ChannelId) -> Result<Arc<dyn VoiceConnection>, MusicError> {
        self.state.lock().connection_state = ConnectionState::Connecting;

        match self.deps.connector.join(self.guild_id, channel_id).await {
            Ok(connection) => {
                let mut state = self.state.lock();
                state.connection = Some(connection.clone());
                state.connection_state = ConnectionState::Connected;
                Ok(connection)
            }
            Err(e) => {
                let mut state = self.state.lock();
                state.connection = None;
                state.connection_state = ConnectionState::Disconnected;
                warn!("⚠️ No se pudo conectar en guild {}: {}", self.guild_id, e);
                Err(e)
            }
        }
    }

    /// Corta la pista en curso y marca como abandonada la que se esté preparando
    fn halt_current(&self) {
        let (transport, finished) = {
            let mut state = self.state.lock();
            state.epoch += 1;
            (state.transport.clone(), state.finished.clone())
        };
        if let Some(transport) = transport {
            transport.stop();
        }
        if let Some(finished) = finished {
            finished.fire(None);
        }
    }

    async fn finish_track(&self) {
        let cleanup = {
            let mut state = self.state.lock();
            state.current = None;
            state.transport = None;
            state.finished = None;
            state.started_at = None;
            state.paused_at = None;
            state.status = PlayerStatus::Idle;
            state.cleanup_path.take()
        };

        if let Some(path) = cleanup {
            remove_temporary_file(&path).await;
        }
    }

    fn report(&self, track: &Track, message: String) {
        let errors = self.deps.errors.clone();
        let guild_id = self.guild_id;
        let track = track.clone();
        tokio::spawn(async move {
            errors.report(guild_id, &track, &message).await;
        });
    }
}

async fn wait_for_target(target: &mut watch::Receiver<bool>, present: bool) {
    // El emisor vive en el reproductor; el canal no se cierra antes que el bucle
    let _ = target.wait_for(|has| *has == present).await;
}

fn clamp_volume(level: f32) -> f32 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, MAX_VOLUME)
    }
}

/// `transcurrido [████──…] total`
pub fn render_progress(elapsed: Duration, total_seconds: u64, length: usize) -> String {
    let total = Duration::from_secs(total_seconds);
    let elapsed = elapsed.min(total);
    let ratio = if total_seconds == 0 {
        0.0
    } else {
        elapsed.as_secs_f64() / total.as_secs_f64()
    };
    let filled = ((ratio * length as f64) as usize).min(length);

    format!(
        "{} [{}{}] {}",
        format_duration(Duration::from_secs(elapsed.as_secs())),
        "█".repeat(filled),
        "─".repeat(length - filled),
        format_duration(total)
    )
}
