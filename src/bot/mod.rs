//! # Bot Module
//!
//! Discord event handling for TuneCog.
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`]. On `ready` it builds the
//! [`PlayerRegistry`] (the voice connector and the error notifier need the
//! gateway cache and HTTP client) and registers the slash commands. Slash
//! commands are dispatched to [`handlers`]; a forced voice disconnect of the
//! bot drops the guild player's connection.

use anyhow::{anyhow, Result};
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use songbird::Songbird;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;

use crate::{
    audio::{GuildPlayer, PlayerDeps, PlayerRegistry, SongbirdConnector},
    config::Config,
    sources::{PlaybackSourceProvider, SourceResolver},
};
use notifier::SystemChannelNotifier;

/// Manejador principal del bot
pub struct MusicBot {
    config: Arc<Config>,
    resolver: Arc<SourceResolver>,
    provider: Arc<dyn PlaybackSourceProvider>,
    songbird: Arc<Songbird>,
    /// Se inicializa en `ready`, cuando la caché y el cliente HTTP existen
    players: OnceLock<Arc<PlayerRegistry>>,
}

impl MusicBot {
    pub fn new(
        config: Arc<Config>,
        resolver: Arc<SourceResolver>,
        provider: Arc<dyn PlaybackSourceProvider>,
        songbird: Arc<Songbird>,
    ) -> Self {
        Self {
            config,
            resolver,
            provider,
            songbird,
            players: OnceLock::new(),
        }
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    /// Registro de reproductores; falla si el bot todavía no recibió `ready`
    pub fn players(&self) -> Result<&Arc<PlayerRegistry>> {
        self.players
            .get()
            .ok_or_else(|| anyhow!("El registro de reproductores aún no está listo"))
    }

    pub fn player(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.get()?.get(guild_id)
    }

    /// Detiene todos los reproductores antes de cerrar
    pub async fn shutdown(&self) {
        if let Some(players) = self.players.get() {
            info!("🛑 Deteniendo {} reproductores", players.len());
            players.teardown_all().await;
        }
    }

    fn init_players(&self, ctx: &Context) {
        let deps = PlayerDeps {
            connector: Arc::new(SongbirdConnector::new(self.songbird.clone(), ctx.cache.clone())),
            provider: self.provider.clone(),
            errors: Arc::new(SystemChannelNotifier::new(ctx.http.clone(), ctx.cache.clone())),
            default_volume: self.config.default_volume,
        };

        // `ready` se repite en cada reconexión; el registro existente se conserva
        if self.players.set(Arc::new(PlayerRegistry::new(deps))).is_err() {
            info!("♻️ Reconexión: se conserva el registro de reproductores");
        }
    }

    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        self.init_players(&ctx);

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, &command, self).await {
                error!("Error manejando comando /{}: {:?}", command.data.name, e);
                handlers::report_unexpected(&ctx, &command).await;
            }
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        // Solo interesa el estado de voz del propio bot
        if new.user_id != ctx.cache.current_user().id {
            return;
        }
        if old.is_none() || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        match self.player(guild_id) {
            Some(player) => {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                player.disconnect().await;
            }
            None => warn!("🔌 Desconexión en guild {} sin reproductor activo", guild_id),
        }
    }
}
