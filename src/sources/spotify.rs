use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64_ENGINE, Engine as _};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::{CatalogClient, CatalogEntry, CatalogItem, ItemKind};
use crate::error::MusicError;

pub const SPOTIFY: &str = "Spotify";

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const PLAYLIST_PAGE: usize = 100;
const ALBUM_PAGE: usize = 50;

pub fn is_spotify_host(host: &str) -> bool {
    host.contains("spotify")
}

/// Extrae tipo e id de una URL de Spotify (`/track/<id>`, `/intl-es/album/<id>`)
pub fn classify_spotify_url(url: &Url) -> Result<CatalogItem, MusicError> {
    let mut segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    if segments.first().is_some_and(|s| s.starts_with("intl-")) {
        segments.remove(0);
    }

    let (kind, id) = match segments.as_slice() {
        [kind, id, ..] => (*kind, *id),
        _ => return Err(MusicError::resolution("Formato de URL de Spotify no soportado.")),
    };

    let kind = match kind {
        "track" => ItemKind::Track,
        "playlist" => ItemKind::Playlist,
        "album" => ItemKind::Album,
        other => {
            return Err(MusicError::UnsupportedItemType {
                service: SPOTIFY,
                kind: other.to_string(),
            })
        }
    };

    Ok(CatalogItem::new(kind, id))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: Option<String>,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

impl From<SpotifyTrack> for CatalogEntry {
    fn from(track: SpotifyTrack) -> Self {
        CatalogEntry {
            title: track.name,
            artists: track.artists.into_iter().filter_map(|a| a.name).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Cliente de la Web API de Spotify con credenciales de aplicación
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_base: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("No se pudo crear el cliente HTTP de Spotify")?;

        Ok(Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Apunta el cliente a otro servidor (pruebas, proxies)
    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("🔑 Solicitando token de Spotify");
        let auth = B64_ENGINE.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response: TokenResponse = self
            .http
            .post(&self.token_url)
            .header("Authorization", format!("Basic {}", auth))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()
            .context("Spotify rechazó las credenciales")?
            .json()
            .await?;

        // Margen para no usar un token a punto de vencer
        let lifetime = Duration::from_secs(response.expires_in.saturating_sub(60));
        let value = response.access_token;
        *cached = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn collect_pages<T, F>(&self, first: String, limit: usize, mut map: F) -> Result<Vec<CatalogEntry>>
    where
        T: serde::de::DeserializeOwned,
        F: FnMut(T) -> Option<CatalogEntry>,
    {
        let mut entries = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            let page: Page<T> = self.get(&url).await?;
            entries.extend(page.items.into_iter().filter_map(&mut map));
            if entries.len() >= limit {
                entries.truncate(limit);
                break;
            }
            next = page.next;
        }

        Ok(entries)
    }
}

#[async_trait]
impl CatalogClient for SpotifyClient {
    async fn fetch(&self, item: &CatalogItem, limit: usize) -> Result<Vec<CatalogEntry>> {
        let entries = match item.kind {
            ItemKind::Track => {
                let track: SpotifyTrack = self
                    .get(&format!("{}/tracks/{}", self.api_base, item.id))
                    .await?;
                vec![track.into()]
            }
            ItemKind::Playlist => {
                let first = format!(
                    "{}/playlists/{}/tracks?limit={}&additional_types=track",
                    self.api_base, item.id, PLAYLIST_PAGE
                );
                self.collect_pages(first, limit, |item: PlaylistItem| {
                    if item.track.is_none() {
                        warn!("⚠️ Elemento de playlist de Spotify sin pista, omitido");
                    }
                    item.track.map(CatalogEntry::from)
                })
                .await?
            }
            ItemKind::Album => {
                let first = format!(
                    "{}/albums/{}/tracks?limit={}",
                    self.api_base, item.id, ALBUM_PAGE
                );
                self.collect_pages(first, limit, |track: SpotifyTrack| Some(track.into()))
                    .await?
            }
        };

        info!("🟢 Spotify devolvió {} elemento(s) para {}", entries.len(), item.id);
        Ok(entries)
    }
}
