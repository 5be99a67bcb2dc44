//! Resolución de consultas de usuario a pistas reproducibles.
//!
//! La consulta se clasifica por dominio: Spotify y Apple Music pasan por su
//! catálogo y cada canción se busca en YouTube; SoundCloud y cualquier otra
//! URL van directo al extractor; el texto libre se busca y devuelve un único
//! resultado.

use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::apple_music::{classify_apple_url, is_apple_music_host, APPLE_MUSIC};
use super::spotify::{classify_spotify_url, is_spotify_host, SPOTIFY};
use super::{CatalogClient, CatalogItem, ItemKind, MediaInfo, MetadataExtractor, Requester, Track};
use crate::error::MusicError;

pub const SEARCH_LABEL: &str = "YouTube Search";
pub const SOUNDCLOUD: &str = "SoundCloud";
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const MAX_TRACKS_PER_RESOLVE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    Spotify,
    AppleMusic,
    SoundCloud,
    Generic,
}

impl Provider {
    fn from_host(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        if is_spotify_host(&host) {
            Provider::Spotify
        } else if is_apple_music_host(&host) {
            Provider::AppleMusic
        } else if host.contains("soundcloud") {
            Provider::SoundCloud
        } else {
            Provider::Generic
        }
    }
}

/// Una consulta es URL si tiene esquema y host
fn parse_url(query: &str) -> Option<Url> {
    Url::parse(query)
        .ok()
        .filter(|url| url.host_str().is_some_and(|h| !h.is_empty()))
}

pub struct SourceResolver {
    extractor: Arc<dyn MetadataExtractor>,
    spotify: Option<Arc<dyn CatalogClient>>,
    apple_music: Option<Arc<dyn CatalogClient>>,
    max_tracks: usize,
}

impl SourceResolver {
    pub fn new(extractor: Arc<dyn MetadataExtractor>, max_tracks: usize) -> Self {
        Self {
            extractor,
            spotify: None,
            apple_music: None,
            max_tracks: max_tracks.clamp(1, MAX_TRACKS_PER_RESOLVE),
        }
    }

    pub fn with_spotify(mut self, client: Arc<dyn CatalogClient>) -> Self {
        self.spotify = Some(client);
        self
    }

    pub fn with_apple_music(mut self, client: Arc<dyn CatalogClient>) -> Self {
        self.apple_music = Some(client);
        self
    }

    /// Resuelve la consulta en una lista no vacía de pistas
    pub async fn resolve(&self, raw: &str, requester: &Requester) -> Result<Vec<Track>, MusicError> {
        let query = raw.trim();
        if query.is_empty() {
            return Err(MusicError::EmptyQuery);
        }

        let Some(url) = parse_url(query) else {
            return self.search(query, requester, SEARCH_LABEL).await.map(|t| vec![t]);
        };

        let provider = Provider::from_host(url.host_str().unwrap_or_default());
        debug!("🔗 Resolviendo {} vía {:?}", query, provider);

        let tracks = match provider {
            Provider::Spotify => {
                self.resolve_catalog(SPOTIFY, self.spotify.as_deref(), &url, requester, classify_spotify_url)
                    .await?
            }
            Provider::AppleMusic => {
                self.resolve_catalog(APPLE_MUSIC, self.apple_music.as_deref(), &url, requester, classify_apple_url)
                    .await?
            }
            Provider::SoundCloud => {
                let info = self.extract(query).await?;
                self.info_to_tracks(info, requester, Some(SOUNDCLOUD))
            }
            Provider::Generic => {
                let info = self.extract(query).await?;
                self.info_to_tracks(info, requester, None)
            }
        };

        if tracks.is_empty() {
            return Err(MusicError::resolution(
                "No se encontraron pistas reproducibles para esa URL.",
            ));
        }

        info!("📥 '{}' resuelto en {} pista(s)", query, tracks.len());
        Ok(tracks)
    }

    async fn resolve_catalog(
        &self,
        service: &'static str,
        client: Option<&dyn CatalogClient>,
        url: &Url,
        requester: &Requester,
        classify: fn(&Url) -> Result<CatalogItem, MusicError>,
    ) -> Result<Vec<Track>, MusicError> {
        let Some(client) = client else {
            return self.resolve_without_catalog(service, url, requester).await;
        };

        let item = classify(url)?;
        let entries = client.fetch(&item, self.max_tracks).await.map_err(|e| {
            warn!("⚠️ Falló la consulta a {} para {}: {:#}", service, item.id, e);
            MusicError::resolution(format!("No se pudo consultar {} para ese enlace.", service))
        })?;

        if item.kind == ItemKind::Track {
            let term = entries
                .first()
                .and_then(|e| e.search_term())
                .ok_or_else(|| {
                    MusicError::resolution(format!(
                        "No se obtuvieron resultados de {} para ese enlace.",
                        service
                    ))
                })?;
            return self.search(&term, requester, service).await.map(|t| vec![t]);
        }

        let mut tracks = Vec::new();
        for entry in entries.iter().take(self.max_tracks) {
            let Some(term) = entry.search_term() else {
                warn!("⚠️ Elemento de {} sin título, omitido", service);
                continue;
            };
            match self.search(&term, requester, service).await {
                Ok(track) => tracks.push(track),
                Err(e) => warn!("⚠️ No se pudo resolver '{}' de {}: {}", term, service, e),
            }
        }

        if tracks.is_empty() {
            return Err(MusicError::resolution(format!(
                "No se encontraron canciones reproducibles en la colección de {}.",
                service
            )));
        }
        Ok(tracks)
    }

    /// Sin cliente de catálogo: el extractor genérico intenta con el enlace
    async fn resolve_without_catalog(
        &self,
        service: &'static str,
        url: &Url,
        requester: &Requester,
    ) -> Result<Vec<Track>, MusicError> {
        info!("ℹ️ {} sin cliente configurado, usando extracción genérica", service);
        let info = self.extract(url.as_str()).await?;
        let tracks = self.info_to_tracks(info, requester, Some(service));

        if tracks.is_empty() {
            return Err(MusicError::resolution(format!(
                "No se pudo resolver el enlace de {}. Prueba con una búsqueda de texto.",
                service
            )));
        }
        Ok(tracks)
    }

    async fn search(&self, term: &str, requester: &Requester, label: &str) -> Result<Track, MusicError> {
        let results = self.extractor.search(term, 1).await.map_err(|e| {
            warn!("⚠️ Búsqueda fallida para '{}': {:#}", term, e);
            MusicError::resolution("No se encontraron canciones para la búsqueda.")
        })?;

        results
            .into_iter()
            .next()
            .and_then(|entry| entry_to_track(entry, requester, Some(label)))
            .ok_or_else(|| MusicError::resolution("No se encontraron canciones para la búsqueda."))
    }

    async fn extract(&self, query: &str) -> Result<MediaInfo, MusicError> {
        self.extractor.extract_metadata(query).await.map_err(|e| {
            warn!("⚠️ Extracción fallida para '{}': {:#}", query, e);
            MusicError::resolution("No se devolvieron resultados para la consulta.")
        })
    }

    fn info_to_tracks(&self, info: MediaInfo, requester: &Requester, label: Option<&str>) -> Vec<Track> {
        if !info.has_entries() {
            return entry_to_track(info, requester, label).into_iter().collect();
        }

        let entries = info.entries.unwrap_or_default();
        let total = entries.len();
        let tracks: Vec<Track> = entries
            .into_iter()
            .take(self.max_tracks)
            .flatten()
            .filter_map(|entry| entry_to_track(entry, requester, label))
            .collect();

        if tracks.len() < total {
            debug!("📋 {} de {} entradas convertidas en pistas", tracks.len(), total);
        }
        tracks
    }
}

/// Convierte una entrada del extractor; `None` si no hay enlace reproducible
pub(crate) fn entry_to_track(entry: MediaInfo, requester: &Requester, label: Option<&str>) -> Option<Track> {
    let link = entry.link()?.to_string();
    let title = entry
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(UNKNOWN_TITLE);
    let source = label.unwrap_or_else(|| entry.extractor_label());

    Track::new(link.clone(), title, source, requester.clone()).map(|track| {
        track
            .with_canonical_url(link)
            .with_duration(entry.duration_seconds())
            .with_thumbnail(entry.thumbnail_url().map(str::to_string))
            .with_author(entry.author().map(str::to_string))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{test_requester, CatalogEntry, MockCatalogClient, MockMetadataExtractor};
    use pretty_assertions::assert_eq;

    fn media(title: &str, url: &str) -> MediaInfo {
        MediaInfo {
            title: Some(title.into()),
            webpage_url: Some(url.into()),
            duration: Some(180.0),
            extractor_key: Some("Youtube".into()),
            ..Default::default()
        }
    }

    fn collection(entries: Vec<Option<MediaInfo>>) -> MediaInfo {
        MediaInfo {
            title: Some("Playlist".into()),
            entries: Some(entries),
            ..Default::default()
        }
    }

    fn resolver(extractor: MockMetadataExtractor) -> SourceResolver {
        SourceResolver::new(Arc::new(extractor), MAX_TRACKS_PER_RESOLVE)
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let resolver = resolver(MockMetadataExtractor::new());
        let err = resolver.resolve("   ", &test_requester()).await.unwrap_err();
        assert!(matches!(err, MusicError::EmptyQuery));
    }

    #[tokio::test]
    async fn test_free_text_returns_single_search_result() {
        let mut extractor = MockMetadataExtractor::new();
        extractor
            .expect_search()
            .withf(|term, limit| term == "never gonna give you up" && *limit == 1)
            .times(1)
            .returning(|_, _| Ok(vec![media("Rick", "https://youtu.be/dQw4w9WgXcQ")]));

        let tracks = resolver(extractor)
            .resolve(" never gonna give you up ", &test_requester())
            .await
            .unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].source_label(), SEARCH_LABEL);
        assert_eq!(tracks[0].query(), "https://youtu.be/dQw4w9WgXcQ");
    }

    #[tokio::test]
    async fn test_search_without_results_fails() {
        let mut extractor = MockMetadataExtractor::new();
        extractor.expect_search().returning(|_, _| Ok(vec![]));

        let err = resolver(extractor).resolve("zzzz", &test_requester()).await.unwrap_err();
        assert!(matches!(err, MusicError::ResolutionFailed(_)));
    }

    #[tokio::test]
    async fn test_generic_url_skips_unusable_entries() {
        let mut extractor = MockMetadataExtractor::new();
        extractor.expect_extract_metadata().returning(|_| {
            Ok(collection(vec![
                Some(media("One", "https://youtu.be/1")),
                None,
                Some(MediaInfo {
                    title: Some("Sin enlace".into()),
                    ..Default::default()
                }),
                Some(media("Two", "https://youtu.be/2")),
            ]))
        });

        let tracks = resolver(extractor)
            .resolve("https://www.youtube.com/playlist?list=PL1", &test_requester())
            .await
            .unwrap();

        let titles: Vec<&str> = tracks.iter().map(Track::title).collect();
        assert_eq!(titles, vec!["One", "Two"]);
        assert_eq!(tracks[0].source_label(), "Youtube");
    }

    #[tokio::test]
    async fn test_collection_is_capped() {
        let mut extractor = MockMetadataExtractor::new();
        extractor.expect_extract_metadata().returning(|_| {
            Ok(collection(
                (0..150)
                    .map(|i| Some(media(&format!("T{i}"), &format!("https://youtu.be/{i}"))))
                    .collect(),
            ))
        });

        let tracks = resolver(extractor)
            .resolve("https://www.youtube.com/playlist?list=big", &test_requester())
            .await
            .unwrap();
        assert_eq!(tracks.len(), MAX_TRACKS_PER_RESOLVE);
    }

    #[tokio::test]
    async fn test_soundcloud_is_relabelled() {
        let mut extractor = MockMetadataExtractor::new();
        extractor
            .expect_extract_metadata()
            .returning(|_| Ok(media("Mix", "https://soundcloud.com/a/mix")));

        let tracks = resolver(extractor)
            .resolve("https://soundcloud.com/a/mix", &test_requester())
            .await
            .unwrap();
        assert_eq!(tracks[0].source_label(), SOUNDCLOUD);
    }

    #[tokio::test]
    async fn test_spotify_collection_skips_failed_items() {
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_fetch()
            .withf(|item, _| item.kind == ItemKind::Playlist && item.id == "abc")
            .returning(|_, _| {
                Ok(vec![
                    CatalogEntry::new("First", vec!["A".into()]),
                    CatalogEntry::new("Missing", vec!["B".into()]),
                    CatalogEntry::new("Third", vec!["C".into()]),
                ])
            });

        let mut extractor = MockMetadataExtractor::new();
        extractor.expect_search().returning(|term, _| {
            if term == "B - Missing" {
                Ok(vec![])
            } else {
                Ok(vec![media(term, &format!("https://youtu.be/{}", term.len()))])
            }
        });

        let resolver = resolver(extractor).with_spotify(Arc::new(catalog));
        let tracks = resolver
            .resolve("https://open.spotify.com/playlist/abc", &test_requester())
            .await
            .unwrap();

        let titles: Vec<&str> = tracks.iter().map(Track::title).collect();
        assert_eq!(titles, vec!["A - First", "C - Third"]);
        assert!(tracks.iter().all(|t| t.source_label() == SPOTIFY));
    }

    #[tokio::test]
    async fn test_spotify_unsupported_type() {
        let catalog = MockCatalogClient::new();
        let resolver = resolver(MockMetadataExtractor::new()).with_spotify(Arc::new(catalog));

        let err = resolver
            .resolve("https://open.spotify.com/artist/xyz", &test_requester())
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::UnsupportedItemType { .. }));
    }

    #[tokio::test]
    async fn test_spotify_without_client_falls_back_to_extraction() {
        let mut extractor = MockMetadataExtractor::new();
        extractor
            .expect_extract_metadata()
            .withf(|q| q.starts_with("https://open.spotify.com/track/"))
            .returning(|_| Ok(media("Song", "https://open.spotify.com/track/1")));

        let tracks = resolver(extractor)
            .resolve("https://open.spotify.com/track/1", &test_requester())
            .await
            .unwrap();
        assert_eq!(tracks[0].source_label(), SPOTIFY);
    }

    #[tokio::test]
    async fn test_apple_track_searches_with_artist() {
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_fetch()
            .returning(|_, _| Ok(vec![CatalogEntry::new("Come Together", vec!["The Beatles".into()])]));

        let mut extractor = MockMetadataExtractor::new();
        extractor
            .expect_search()
            .withf(|term, _| term == "The Beatles - Come Together")
            .returning(|_, _| Ok(vec![media("Come Together", "https://youtu.be/ct")]));

        let tracks = resolver(extractor)
            .with_apple_music(Arc::new(catalog))
            .resolve(
                "https://music.apple.com/us/album/abbey-road/1441164426?i=1441164430",
                &test_requester(),
            )
            .await
            .unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].source_label(), APPLE_MUSIC);
    }

    #[test]
    fn test_entry_mapping_defaults() {
        let entry = MediaInfo {
            url: Some("https://cdn/a".into()),
            ..Default::default()
        };
        let track = entry_to_track(entry, &test_requester(), None).unwrap();

        assert_eq!(track.title(), UNKNOWN_TITLE);
        assert_eq!(track.canonical_url(), "https://cdn/a");
        assert_eq!(track.source_label(), "Unknown");
        assert!(track.is_live());

        assert!(entry_to_track(MediaInfo::default(), &test_requester(), None).is_none());
    }

    #[test]
    fn test_url_detection() {
        assert!(parse_url("https://youtu.be/x").is_some());
        assert!(parse_url("lofi hip hop").is_none());
        assert!(parse_url("mailto:someone@example.com").is_none());
    }
}
