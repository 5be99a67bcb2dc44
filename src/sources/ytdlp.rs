use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{MetadataExtractor, PlaybackSourceProvider, PreparedSource, Track};
use crate::config::Config;
use crate::error::MusicError;

const AUDIO_FORMAT: &str = "bestaudio/best";
const OUTPUT_TEMPLATE: &str = "%(title)s-%(id)s.%(ext)s";

/// Información extraída de yt-dlp (`-J`).
///
/// Todos los campos son opcionales: yt-dlp omite o deja en `null` cualquier
/// campo que el extractor no conozca, y las entradas de playlist pueden ser
/// `null` cuando se usa `--ignore-errors`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MediaInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub webpage_url: Option<String>,
    pub url: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub thumbnails: Option<Vec<Thumbnail>>,
    pub uploader: Option<String>,
    pub artist: Option<String>,
    pub channel: Option<String>,
    pub extractor_key: Option<String>,
    pub extractor: Option<String>,
    pub entries: Option<Vec<Option<MediaInfo>>>,
    pub requested_downloads: Option<Vec<RequestedDownload>>,
    #[serde(rename = "_filename")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Thumbnail {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RequestedDownload {
    pub filepath: Option<String>,
}

impl MediaInfo {
    pub fn has_entries(&self) -> bool {
        self.entries.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Duración en segundos enteros; cero si falta
    pub fn duration_seconds(&self) -> u64 {
        match self.duration {
            Some(d) if d.is_finite() && d > 0.0 => d as u64,
            _ => 0,
        }
    }

    /// URL de la página o, si falta, la URL directa
    pub fn link(&self) -> Option<&str> {
        non_empty(self.webpage_url.as_deref()).or_else(|| non_empty(self.url.as_deref()))
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        non_empty(self.thumbnail.as_deref()).or_else(|| {
            self.thumbnails
                .as_ref()
                .and_then(|t| t.first())
                .and_then(|t| non_empty(t.url.as_deref()))
        })
    }

    pub fn author(&self) -> Option<&str> {
        non_empty(self.uploader.as_deref())
            .or_else(|| non_empty(self.artist.as_deref()))
            .or_else(|| non_empty(self.channel.as_deref()))
    }

    pub fn extractor_label(&self) -> &str {
        non_empty(self.extractor_key.as_deref())
            .or_else(|| non_empty(self.extractor.as_deref()))
            .unwrap_or("Unknown")
    }

    /// Primera entrada no nula, o la información misma si no es una colección
    fn into_single(self) -> Option<MediaInfo> {
        match self.entries {
            Some(entries) => entries.into_iter().flatten().next(),
            None => Some(self),
        }
    }

    fn downloaded_path(&self) -> Option<PathBuf> {
        self.requested_downloads
            .as_ref()
            .and_then(|d| d.iter().find_map(|d| non_empty(d.filepath.as_deref())))
            .or_else(|| non_empty(self.filename.as_deref()))
            .map(PathBuf::from)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Cliente de línea de comandos para yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpClient {
    binary: String,
    cache_dir: Option<PathBuf>,
    keep_files: bool,
    playlist_limit: usize,
    timeout: Duration,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            cache_dir: None,
            keep_files: true,
            playlist_limit: 100,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            binary: config.ytdlp_path.clone(),
            cache_dir: config.cache_dir.clone(),
            keep_files: config.cache_keep_files,
            playlist_limit: config.max_playlist_size,
            timeout: Duration::from_secs(config.extraction_timeout_secs),
        }
    }

    /// Verifica que el binario responde; devuelve su versión
    pub async fn verify(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("No se pudo ejecutar {}", self.binary))?;

        if !output.status.success() {
            anyhow::bail!("{} --version terminó con {}", self.binary, output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn metadata_args(&self, query: &str) -> Vec<String> {
        vec![
            "-J".into(),
            "--flat-playlist".into(),
            "--playlist-end".into(),
            self.playlist_limit.to_string(),
            "--ignore-errors".into(),
            "--no-warnings".into(),
            "--default-search".into(),
            "ytsearch".into(),
            query.into(),
        ]
    }

    fn prepare_args(&self, query: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-J".into(),
            "--no-playlist".into(),
            "-f".into(),
            AUDIO_FORMAT.into(),
            "--no-warnings".into(),
            "--default-search".into(),
            "ytsearch".into(),
        ];

        if let Some(dir) = &self.cache_dir {
            args.extend([
                "--no-simulate".into(),
                "--no-progress".into(),
                "--restrict-filenames".into(),
                "-o".into(),
                dir.join(OUTPUT_TEMPLATE).display().to_string(),
            ]);
        }

        args.push(query.into());
        args
    }

    /// Ejecuta yt-dlp con límite de tiempo; el proceso muere si se abandona la espera
    async fn run(&self, args: &[String]) -> Result<Output> {
        debug!("🔧 {} {}", self.binary, args.join(" "));

        tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary).args(args).kill_on_drop(true).output(),
        )
        .await
        .context("yt-dlp excedió el tiempo límite")?
        .context("Error al ejecutar yt-dlp")
    }

    async fn run_json(&self, args: Vec<String>) -> Result<Option<MediaInfo>> {
        let output = self.run(&args).await?;
        parse_output(output.status.success(), &output.stdout, &output.stderr)
    }
}

/// Interpreta la salida de `yt-dlp -J`.
///
/// Con `--ignore-errors` el proceso puede terminar con error y aun así
/// imprimir un JSON útil, así que sólo falla si no hay nada que leer.
fn parse_output(success: bool, stdout: &[u8], stderr: &[u8]) -> Result<Option<MediaInfo>> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();

    if text.is_empty() {
        if success {
            return Ok(None);
        }
        anyhow::bail!("yt-dlp error: {}", String::from_utf8_lossy(stderr).trim());
    }

    serde_json::from_str::<Option<MediaInfo>>(text).context("Error al parsear respuesta de yt-dlp")
}

/// Arma la fuente reproducible a partir de la respuesta de preparación
fn playback_from_info(
    info: MediaInfo,
    cache_enabled: bool,
    keep_files: bool,
) -> Result<PreparedSource, MusicError> {
    let info = info
        .into_single()
        .ok_or_else(|| MusicError::preparation("yt-dlp no devolvió ninguna entrada"))?;
    let duration = Some(info.duration_seconds()).filter(|d| *d > 0);

    if cache_enabled {
        let path = info
            .downloaded_path()
            .ok_or_else(|| MusicError::preparation("yt-dlp no informó el archivo descargado"))?;
        return Ok(PreparedSource::file(path, duration, !keep_files));
    }

    let url = non_empty(info.url.as_deref())
        .ok_or_else(|| MusicError::preparation("yt-dlp no devolvió una URL de stream"))?;
    Ok(PreparedSource::stream(url, duration))
}

#[async_trait]
impl MetadataExtractor for YtDlpClient {
    async fn extract_metadata(&self, query: &str) -> Result<MediaInfo> {
        info!("📊 Obteniendo info de: {}", query);
        self.run_json(self.metadata_args(query))
            .await?
            .context("yt-dlp no devolvió resultados")
    }

    async fn search(&self, term: &str, limit: usize) -> Result<Vec<MediaInfo>> {
        info!("🔍 Buscando: {}", term);
        let query = format!("ytsearch{}:{}", limit.max(1), term);
        let info = self.run_json(self.metadata_args(&query)).await?;

        Ok(info
            .and_then(|info| info.entries)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl PlaybackSourceProvider for YtDlpClient {
    async fn prepare(&self, track: &Track) -> Result<PreparedSource, MusicError> {
        let started = std::time::Instant::now();
        let output = self
            .run(&self.prepare_args(track.query()))
            .await
            .map_err(|e| {
                warn!("⚠️ No se pudo preparar '{}': {:#}", track.title(), e);
                MusicError::preparation(format!("{:#}", e))
            })?;

        let info = parse_output(output.status.success(), &output.stdout, &output.stderr)
            .map_err(MusicError::preparation)?
            .ok_or_else(|| MusicError::preparation("yt-dlp no devolvió resultados"))?;

        let prepared = playback_from_info(info, self.cache_dir.is_some(), self.keep_files)?;
        info!(
            "✅ Fuente preparada para '{}' en {:?}",
            track.title(),
            started.elapsed()
        );
        Ok(prepared)
    }
}

/// Borra un archivo temporal de reproducción; un archivo ya ausente no es error
pub async fn remove_temporary_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("🗑️ Archivo temporal eliminado: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("⚠️ No se pudo eliminar {}: {}", path.display(), e),
    }
}
