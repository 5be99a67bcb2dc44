use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    bot::MusicBot,
    error::MusicError,
    sources::Requester,
    ui::embeds,
};

const NO_PLAYER: &str = "❌ No hay una cola activa en este servidor.";
const NOTHING_PLAYING: &str = "❌ No hay nada reproduciéndose.";

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: &CommandInteraction, bot: &MusicBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply(ctx, command, "❌ Este comando solo funciona en servidores.", true).await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot, guild_id).await,
        "pause" => handle_pause(ctx, command, bot, guild_id).await,
        "resume" => handle_resume(ctx, command, bot, guild_id).await,
        "skip" => handle_skip(ctx, command, bot, guild_id).await,
        "stop" => handle_stop(ctx, command, bot, guild_id).await,
        "queue" => handle_queue(ctx, command, bot, guild_id).await,
        "volume" => handle_volume(ctx, command, bot, guild_id).await,
        "nowplaying" => handle_nowplaying(ctx, command, bot, guild_id).await,
        _ => reply(ctx, command, "❌ Comando no reconocido", true).await,
    }
}

/// Respuesta genérica cuando un comando falla de forma inesperada
pub async fn report_unexpected(ctx: &Context, command: &CommandInteraction) {
    let content = "❌ Ocurrió un error inesperado. Inténtalo de nuevo.";
    if reply(ctx, command, content, true).await.is_err() {
        // Ya había respuesta (diferida); queda el seguimiento
        if let Err(e) = followup(ctx, command, content).await {
            warn!("⚠️ No se pudo avisar del error: {}", e);
        }
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(query) = option_str(command, "query") else {
        return reply(ctx, command, "❌ Debes indicar una URL o búsqueda.", true).await;
    };

    // Verificar que el usuario esté en un canal de voz
    let Some(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, "❌ Debes unirte a un canal de voz primero.", true).await;
    };

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let player = bot.players()?.get_or_create(guild_id);
    if let Err(e) = player.connect(voice_channel_id).await {
        return fail_deferred(ctx, command, &e).await;
    }

    let requester = Requester::from_user(&command.user, command.member.as_deref());
    let tracks = match bot.resolver().resolve(query, &requester).await {
        Ok(tracks) => tracks,
        Err(e) => return fail_deferred(ctx, command, &e).await,
    };

    let embed = match tracks.as_slice() {
        [track] => {
            let position = player.enqueue(track.clone());
            embeds::create_track_added_embed(track, position)
        }
        many => {
            for track in many {
                player.enqueue(track.clone());
            }
            embeds::create_playlist_added_embed(many)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.player(guild_id) else {
        return reply(ctx, command, NO_PLAYER, true).await;
    };

    if player.pause() {
        reply(ctx, command, "⏸️ Reproducción pausada", false).await
    } else {
        reply(ctx, command, NOTHING_PLAYING, true).await
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.player(guild_id) else {
        return reply(ctx, command, NO_PLAYER, true).await;
    };

    if player.resume() {
        reply(ctx, command, "▶️ Reproducción reanudada", false).await
    } else {
        reply(ctx, command, "❌ La reproducción no está en pausa.", true).await
    }
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.player(guild_id) else {
        return reply(ctx, command, NO_PLAYER, true).await;
    };

    if player.skip() {
        reply(ctx, command, "⏭️ Canción saltada", false).await
    } else {
        reply(ctx, command, NOTHING_PLAYING, true).await
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.player(guild_id) else {
        return reply(ctx, command, NO_PLAYER, true).await;
    };

    player.stop().await;
    reply(ctx, command, "⏹️ Reproducción detenida y cola limpiada", false).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.player(guild_id) else {
        return reply(ctx, command, NO_PLAYER, true).await;
    };

    let page = option_i64(command, "page").unwrap_or(1).max(1) as usize;
    let current = player.current();
    let embed = embeds::create_queue_embed(&player.formatted_queue(), current.as_ref(), page);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.player(guild_id) else {
        return reply(ctx, command, NO_PLAYER, true).await;
    };
    let Some(level) = option_i64(command, "level") else {
        return reply(ctx, command, "❌ Debes indicar un volumen entre 0 y 200.", true).await;
    };

    let applied = player.set_volume(level.clamp(0, 200) as f32 / 100.0);
    reply(
        ctx,
        command,
        &format!("🔊 Volumen ajustado a {}%", (applied * 100.0).round() as u32),
        false,
    )
    .await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.player(guild_id) else {
        return reply(ctx, command, NO_PLAYER, true).await;
    };
    let Some(track) = player.current() else {
        return reply(ctx, command, NOTHING_PLAYING, true).await;
    };

    let embed = embeds::create_now_playing_embed(&track, &player.progress(), player.volume());
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

/// Cierra una respuesta diferida con un error visible sólo para quien la pidió
async fn fail_deferred(ctx: &Context, command: &CommandInteraction, error: &MusicError) -> Result<()> {
    info!("🚫 /{} rechazado: {}", command.data.name, error);
    followup(ctx, command, &format!("❌ {}", error)).await?;
    if let Err(e) = command.delete_response(&ctx.http).await {
        warn!("⚠️ No se pudo borrar la respuesta diferida: {}", e);
    }
    Ok(())
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn followup(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new()
                .content(content)
                .ephemeral(true),
        )
        .await?;
    Ok(())
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

/// Obtiene el canal de voz del usuario desde la caché
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
