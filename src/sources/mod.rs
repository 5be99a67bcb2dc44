pub mod apple_music;
pub mod resolver;
pub mod spotify;
pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::UserId;
use serenity::model::{guild::Member, user::User};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::MusicError;

pub use apple_music::AppleMusicClient;
pub use resolver::SourceResolver;
pub use spotify::SpotifyClient;
pub use ytdlp::{MediaInfo, YtDlpClient};

/// Texto que se muestra cuando la pista no tiene duración conocida
pub const LIVE_LABEL: &str = "En vivo";

/// Usuario que pidió la pista
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub display_name: String,
}

impl Requester {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    /// Usa el apodo del servidor cuando existe
    pub fn from_user(user: &User, member: Option<&Member>) -> Self {
        let display_name = member
            .map(|m| m.display_name().to_string())
            .unwrap_or_else(|| user.display_name().to_string());
        Self::new(user.id, display_name)
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// Una pista reproducible tal como la resolvió el pipeline.
///
/// `query` es lo que se le entrega a yt-dlp al preparar la reproducción; no
/// puede estar vacío. Una duración de cero significa "en vivo o desconocida".
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    query: String,
    title: String,
    canonical_url: String,
    duration_seconds: u64,
    source_label: String,
    thumbnail: Option<String>,
    author: Option<String>,
    requester: Requester,
}

impl Track {
    /// Devuelve `None` si la consulta de reproducción está vacía
    pub fn new(
        query: impl Into<String>,
        title: impl Into<String>,
        source_label: impl Into<String>,
        requester: Requester,
    ) -> Option<Self> {
        let query = query.into();
        if query.trim().is_empty() {
            return None;
        }

        Some(Self {
            canonical_url: query.clone(),
            query,
            title: title.into(),
            duration_seconds: 0,
            source_label: source_label.into(),
            thumbnail: None,
            author: None,
            requester,
        })
    }

    pub fn with_canonical_url(mut self, url: impl Into<String>) -> Self {
        self.canonical_url = url.into();
        self
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }
    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }
    pub fn source_label(&self) -> &str {
        &self.source_label
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    pub fn is_live(&self) -> bool {
        self.duration_seconds == 0
    }

    /// Completa la duración con la que reporta la preparación, sin pisar una conocida
    pub fn backfill_duration(&mut self, seconds: u64) {
        if self.duration_seconds == 0 {
            self.duration_seconds = seconds;
        }
    }

    pub fn duration_display(&self) -> String {
        if self.is_live() {
            LIVE_LABEL.to_string()
        } else {
            format_duration(Duration::from_secs(self.duration_seconds))
        }
    }

    pub fn label(&self) -> String {
        format!("{} • Solicitado por {}", self.title, self.requester.display_name)
    }

    /// Línea de la cola, numerada desde 1
    pub fn queue_line(&self, position: usize) -> String {
        format!("{}. {} ({})", position, self.title, self.duration_display())
    }
}

/// Formatea como `H:MM:SS`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

/// Fuente de audio lista para entregar al transporte de voz
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSource {
    /// URL de stream o ruta local
    pub reference: String,
    pub duration_seconds: Option<u64>,
    pub local_path: Option<PathBuf>,
    /// El archivo local se borra al terminar la pista
    pub temporary: bool,
}

impl PreparedSource {
    pub fn stream(url: impl Into<String>, duration_seconds: Option<u64>) -> Self {
        Self {
            reference: url.into(),
            duration_seconds,
            local_path: None,
            temporary: false,
        }
    }

    pub fn file(path: PathBuf, duration_seconds: Option<u64>, temporary: bool) -> Self {
        Self {
            reference: path.display().to_string(),
            duration_seconds,
            local_path: Some(path),
            temporary,
        }
    }

    pub fn cleanup_path(&self) -> Option<&Path> {
        if self.temporary {
            self.local_path.as_deref()
        } else {
            None
        }
    }
}

/// Tipo de elemento de un catálogo externo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Track,
    Playlist,
    Album,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub kind: ItemKind,
    pub id: String,
}

impl CatalogItem {
    pub fn new(kind: ItemKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Metadatos mínimos de una canción de catálogo
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: Option<String>,
    pub artists: Vec<String>,
}

impl CatalogEntry {
    pub fn new(title: impl Into<String>, artists: Vec<String>) -> Self {
        Self {
            title: Some(title.into()),
            artists,
        }
    }

    /// "artistas - título", o sólo el título si no hay artistas
    pub fn search_term(&self) -> Option<String> {
        let title = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let artists: Vec<&str> = self
            .artists
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect();

        if artists.is_empty() {
            Some(title.to_string())
        } else {
            Some(format!("{} - {}", artists.join(", "), title))
        }
    }
}

/// Extractor de metadatos (yt-dlp)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Metadatos de una URL o consulta, sin descargar
    async fn extract_metadata(&self, query: &str) -> Result<MediaInfo>;

    /// Primeros `limit` resultados de búsqueda
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<MediaInfo>>;
}

/// Cliente de un catálogo musical (Spotify, Apple Music)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn fetch(&self, item: &CatalogItem, limit: usize) -> Result<Vec<CatalogEntry>>;
}

/// Convierte una pista encolada en una fuente reproducible
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaybackSourceProvider: Send + Sync {
    async fn prepare(&self, track: &Track) -> Result<PreparedSource, MusicError>;
}

#[cfg(test)]
pub(crate) fn test_requester() -> Requester {
    Requester::new(UserId::new(42), "ana")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_track_requires_query() {
        assert!(Track::new("", "Nada", "YouTube", test_requester()).is_none());
        assert!(Track::new("   ", "Nada", "YouTube", test_requester()).is_none());
    }

    #[test]
    fn test_track_formatting() {
        let track = Track::new("https://youtu.be/abc", "Song", "YouTube", test_requester())
            .unwrap()
            .with_duration(3725);

        assert_eq!(track.canonical_url(), "https://youtu.be/abc");
        assert_eq!(track.duration_display(), "1:02:05");
        assert_eq!(track.label(), "Song • Solicitado por ana");
        assert_eq!(track.queue_line(3), "3. Song (1:02:05)");
    }

    #[test]
    fn test_live_track() {
        let mut track = Track::new("q", "Radio", "YouTube", test_requester()).unwrap();
        assert!(track.is_live());
        assert_eq!(track.duration_display(), LIVE_LABEL);

        track.backfill_duration(200);
        assert_eq!(track.duration_seconds(), 200);
        track.backfill_duration(999);
        assert_eq!(track.duration_seconds(), 200);
    }

    #[test]
    fn test_catalog_search_term() {
        let entry = CatalogEntry::new("Song", vec!["A".into(), "B".into()]);
        assert_eq!(entry.search_term().as_deref(), Some("A, B - Song"));

        let solo = CatalogEntry::new("Song", vec![]);
        assert_eq!(solo.search_term().as_deref(), Some("Song"));

        assert_eq!(CatalogEntry::default().search_term(), None);
    }

    #[test]
    fn test_prepared_source_cleanup() {
        let stream = PreparedSource::stream("https://cdn/x", Some(10));
        assert!(stream.cleanup_path().is_none());

        let kept = PreparedSource::file(PathBuf::from("/tmp/a.webm"), None, false);
        assert!(kept.cleanup_path().is_none());

        let temp = PreparedSource::file(PathBuf::from("/tmp/b.webm"), None, true);
        assert_eq!(temp.cleanup_path(), Some(Path::new("/tmp/b.webm")));
    }
}
