use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::bot::MusicBot;
use crate::config::Config;
use crate::sources::{AppleMusicClient, SourceResolver, SpotifyClient, YtDlpClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar configuración
    let config = Arc::new(Config::load()?);

    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("tunecog={}", config.log_level).parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando TuneCog v{}", env!("CARGO_PKG_VERSION"));
    info!("⚙️ {}", config.summary());

    let ytdlp = Arc::new(YtDlpClient::from_config(&config));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&ytdlp).await;
    }

    match ytdlp.verify().await {
        Ok(version) => info!("✅ yt-dlp {}", version),
        Err(e) => warn!("⚠️ yt-dlp no disponible, la resolución fallará: {:?}", e),
    }

    let resolver = Arc::new(build_resolver(&config, ytdlp.clone())?);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let handler = Arc::new(MusicBot::new(config.clone(), resolver, ytdlp, songbird.clone()));

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler_arc(handler.clone())
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        handler.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Arma la cadena de resolución con las integraciones habilitadas
fn build_resolver(config: &Config, ytdlp: Arc<YtDlpClient>) -> Result<SourceResolver> {
    let mut resolver = SourceResolver::new(ytdlp, config.max_playlist_size);

    match config.spotify_credentials() {
        Some((client_id, client_secret)) => {
            resolver = resolver.with_spotify(Arc::new(SpotifyClient::new(client_id, client_secret)?));
            info!("🟢 Spotify habilitado");
        }
        None => info!("⚪ Spotify sin credenciales; se usa extracción genérica"),
    }

    if config.enable_apple_music {
        resolver = resolver.with_apple_music(Arc::new(AppleMusicClient::new()?));
        info!("🍎 Apple Music habilitado");
    }

    Ok(resolver)
}

async fn health_check(ytdlp: &YtDlpClient) -> Result<()> {
    let version = ytdlp.verify().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
