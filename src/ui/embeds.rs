use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::queue::QueueSnapshot,
    sources::{format_duration, Track},
};

pub const QUEUE_PAGE_SIZE: usize = 10;
const PLAYLIST_PREVIEW: usize = 10;

/// Límites de Discord, en caracteres
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_LIMIT: usize = 1024;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 TuneCog";

fn track_fields(mut embed: CreateEmbed, track: &Track) -> CreateEmbed {
    embed = embed
        .field("🎤 Artista", track.author().unwrap_or("Desconocido"), true)
        .field("⏱️ Duración", duration_field(track), true)
        .field("👤 Solicitado por", track.requester().mention(), true)
        .field("🔗 Fuente", track.source_label(), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed.url(track.canonical_url())
}

/// Recorta el texto a `max` caracteres terminando en `…`
fn fit(text: String, max: usize) -> String {
    if text.chars().count() <= max {
        return text;
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn duration_field(track: &Track) -> String {
    if track.is_live() {
        "🔴 En vivo".to_string()
    } else {
        track.duration_display()
    }
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola (posición {})", track.title(), position))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Crea un embed para mostrar que una colección fue agregada
pub fn create_playlist_added_embed(tracks: &[Track]) -> CreateEmbed {
    let source = tracks.first().map(Track::source_label).unwrap_or("Desconocida");

    CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(fit(playlist_preview(tracks), DESCRIPTION_LIMIT))
        .color(colors::MUSIC_PURPLE)
        .field("📊 Canciones agregadas", tracks.len().to_string(), true)
        .field("🔗 Fuente", source, true)
        .footer(CreateEmbedFooter::new(
            "🎵 La reproducción comenzará automáticamente • Usa /queue para ver todas las canciones",
        ))
        .timestamp(Timestamp::now())
}

/// Primeras etiquetas de la colección y cuántas quedan fuera
fn playlist_preview(tracks: &[Track]) -> String {
    let mut lines: Vec<String> = tracks
        .iter()
        .take(PLAYLIST_PREVIEW)
        .map(|t| format!("• {}", t.label()))
        .collect();

    if tracks.len() > PLAYLIST_PREVIEW {
        lines.push(format!("…y {} más", tracks.len() - PLAYLIST_PREVIEW));
    }
    lines.join("\n")
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track, progress: &str, volume: f32) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track)
        .field("📊 Progreso", format!("`{}`", progress), false)
        .field("🔊 Volumen", format!("{}%", (volume * 100.0).round() as u32), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot, current: Option<&Track>, page: usize) -> CreateEmbed {
    let queue_page = snapshot.get_page(page, QUEUE_PAGE_SIZE);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = current {
        embed = embed.field("▶️ Reproduciendo", fit(current.label(), FIELD_LIMIT), false);
    }

    if snapshot.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Diez títulos largos no caben en un campo
    embed = embed.description(fit(
        format!("**Próximas canciones**\n{}", queue_page.lines.join("\n")),
        DESCRIPTION_LIMIT,
    ));

    let mut info = format!("**Total:** {} canciones", queue_page.total_items);
    let total = snapshot.total_duration();
    if !total.is_zero() {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total)));
    }
    embed = embed.field("Información", info, false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • TuneCog",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}
