use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;
use url::Url;

use super::{CatalogClient, CatalogEntry, CatalogItem, ItemKind};
use crate::error::MusicError;

pub const APPLE_MUSIC: &str = "Apple Music";

const LOOKUP_URL: &str = "https://itunes.apple.com/lookup";

/// Tipos de enlace de Apple Music que no son canciones ni álbumes
const UNSUPPORTED_KINDS: &[&str] = &["playlist", "artist", "music-video", "station", "curator"];

pub fn is_apple_music_host(host: &str) -> bool {
    host.contains("music.apple") || host.contains("itunes.apple")
}

/// Extrae tipo e id de un enlace de Apple Music o iTunes.
///
/// El parámetro `?i=` identifica una canción dentro de un álbum y tiene
/// prioridad. Sin tipo reconocible se toma el último segmento como canción.
pub fn classify_apple_url(url: &Url) -> Result<CatalogItem, MusicError> {
    if let Some((_, id)) = url.query_pairs().find(|(key, value)| key == "i" && !value.is_empty()) {
        return Ok(CatalogItem::new(ItemKind::Track, id.into_owned()));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    let Some(last) = segments.last() else {
        return Err(MusicError::resolution(
            "No se pudo determinar el identificador de Apple Music en la URL.",
        ));
    };
    let id = last.strip_prefix("id").unwrap_or(*last);

    if let Some(kind) = segments.iter().find(|s| UNSUPPORTED_KINDS.contains(*s)) {
        return Err(MusicError::UnsupportedItemType {
            service: APPLE_MUSIC,
            kind: kind.to_string(),
        });
    }

    let kind = if segments.contains(&"album") {
        ItemKind::Album
    } else {
        ItemKind::Track
    };
    Ok(CatalogItem::new(kind, id))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResult {
    wrapper_type: Option<String>,
    track_name: Option<String>,
    collection_name: Option<String>,
    artist_name: Option<String>,
}

impl LookupResult {
    fn is_track(&self) -> bool {
        self.wrapper_type.as_deref() == Some("track")
    }

    fn into_entry(self) -> CatalogEntry {
        CatalogEntry {
            title: self.track_name.or(self.collection_name),
            artists: self.artist_name.into_iter().collect(),
        }
    }
}

/// Convierte la respuesta de lookup en entradas según el tipo pedido
fn entries_from_lookup(kind: ItemKind, response: LookupResponse, limit: usize) -> Vec<CatalogEntry> {
    match kind {
        ItemKind::Track => response
            .results
            .into_iter()
            .next()
            .map(LookupResult::into_entry)
            .into_iter()
            .collect(),
        ItemKind::Album | ItemKind::Playlist => response
            .results
            .into_iter()
            .filter(LookupResult::is_track)
            .take(limit)
            .map(LookupResult::into_entry)
            .collect(),
    }
}

/// Cliente de la API pública de búsqueda de iTunes
pub struct AppleMusicClient {
    http: reqwest::Client,
    lookup_url: String,
}

impl AppleMusicClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("No se pudo crear el cliente HTTP de iTunes")?;

        Ok(Self {
            http,
            lookup_url: LOOKUP_URL.to_string(),
        })
    }

    pub fn with_lookup_url(mut self, url: impl Into<String>) -> Self {
        self.lookup_url = url.into();
        self
    }
}

#[async_trait]
impl CatalogClient for AppleMusicClient {
    async fn fetch(&self, item: &CatalogItem, limit: usize) -> Result<Vec<CatalogEntry>> {
        let mut request = self.http.get(&self.lookup_url).query(&[("id", item.id.as_str())]);
        if item.kind != ItemKind::Track {
            let limit = limit.to_string();
            request = request.query(&[("entity", "song"), ("limit", limit.as_str())]);
        }

        let response: LookupResponse = request
            .send()
            .await?
            .error_for_status()
            .context("iTunes lookup falló")?
            .json()
            .await?;

        let entries = entries_from_lookup(item.kind, response, limit);
        info!("🍎 iTunes devolvió {} elemento(s) para {}", entries.len(), item.id);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn classify(url: &str) -> Result<CatalogItem, MusicError> {
        classify_apple_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_apple_url_classification() {
        assert_eq!(
            classify("https://music.apple.com/us/album/abbey-road/1441164426?i=1441164430").unwrap(),
            CatalogItem::new(ItemKind::Track, "1441164430")
        );
        assert_eq!(
            classify("https://music.apple.com/us/album/abbey-road/1441164426").unwrap(),
            CatalogItem::new(ItemKind::Album, "1441164426")
        );
        assert_eq!(
            classify("https://music.apple.com/us/song/come-together/1441164430").unwrap(),
            CatalogItem::new(ItemKind::Track, "1441164430")
        );
        assert_eq!(
            classify("https://itunes.apple.com/us/album/id1441164426").unwrap().id,
            "1441164426"
        );
    }

    #[test]
    fn test_apple_unsupported_kinds() {
        assert!(matches!(
            classify("https://music.apple.com/us/playlist/todays-hits/pl.f4d106fed2bd41149aaacabb233eb5eb"),
            Err(MusicError::UnsupportedItemType { service: APPLE_MUSIC, .. })
        ));
        assert!(matches!(
            classify("https://music.apple.com/"),
            Err(MusicError::ResolutionFailed(_))
        ));
    }

    #[test]
    fn test_album_lookup_skips_collection_row() {
        let response: LookupResponse = serde_json::from_str(
            r#"{"resultCount":3,"results":[
                {"wrapperType":"collection","collectionName":"Abbey Road","artistName":"The Beatles"},
                {"wrapperType":"track","trackName":"Come Together","artistName":"The Beatles"},
                {"wrapperType":"track","trackName":"Something","artistName":"The Beatles"}]}"#,
        )
        .unwrap();

        let entries = entries_from_lookup(ItemKind::Album, response, 100);
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].search_term().as_deref(),
            Some("The Beatles - Come Together")
        );
    }

    #[test]
    fn test_track_lookup_falls_back_to_collection_name() {
        let response: LookupResponse = serde_json::from_str(
            r#"{"results":[{"wrapperType":"collection","collectionName":"Single"}]}"#,
        )
        .unwrap();

        let entries = entries_from_lookup(ItemKind::Track, response, 100);
        assert_eq!(entries, vec![CatalogEntry::new("Single", vec![])]);

        let empty = entries_from_lookup(ItemKind::Track, LookupResponse { results: vec![] }, 100);
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_album_fetch_requests_songs_up_to_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lookup"))
            .and(query_param("id", "1441164426"))
            .and(query_param("entity", "song"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultCount": 2,
                "results": [
                    {"wrapperType": "collection", "collectionName": "Abbey Road", "artistName": "The Beatles"},
                    {"wrapperType": "track", "trackName": "Come Together", "artistName": "The Beatles"},
                ],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AppleMusicClient::new()
            .unwrap()
            .with_lookup_url(format!("{}/lookup", server.uri()));
        let entries = client
            .fetch(&CatalogItem::new(ItemKind::Album, "1441164426"), 5)
            .await
            .unwrap();

        assert_eq!(
            entries,
            vec![CatalogEntry::new("Come Together", vec!["The Beatles".to_string()])]
        );
    }

    #[tokio::test]
    async fn test_track_fetch_has_no_entity_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lookup"))
            .and(query_param("id", "1441164430"))
            .and(query_param_is_missing("entity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"wrapperType": "track", "trackName": "Come Together", "artistName": "The Beatles"}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AppleMusicClient::new()
            .unwrap()
            .with_lookup_url(format!("{}/lookup", server.uri()));
        let entries = client
            .fetch(&CatalogItem::new(ItemKind::Track, "1441164430"), 100)
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].search_term().as_deref(),
            Some("The Beatles - Come Together")
        );
    }
}
