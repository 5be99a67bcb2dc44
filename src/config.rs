use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Runtime configuration, read from the process environment (and `.env`).
///
/// Keys map one-to-one to upper-case environment variables:
/// `DISCORD_TOKEN` → `discord_token`, `CACHE_DIR` → `cache_dir`, etc.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    #[serde(default)]
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_playlist_size: usize,

    // Caché de descargas
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    pub cache_keep_files: bool,

    // Integraciones
    #[serde(default)]
    pub spotify_client_id: Option<String>,
    #[serde(default)]
    pub spotify_client_secret: Option<String>,
    pub enable_apple_music: bool,

    // yt-dlp
    pub ytdlp_path: String,
    pub extraction_timeout_secs: u64,

    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_environment(::config::Environment::default().try_parsing(true))?;

        // Create the cache directory if caching is enabled
        if let Some(dir) = &config.cache_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("No se pudo crear CACHE_DIR {}", dir.display()))?;
        }

        Ok(config)
    }

    fn from_environment(environment: ::config::Environment) -> Result<Self> {
        let defaults = Self::default();
        let settings = ::config::Config::builder()
            .set_default("default_volume", defaults.default_volume as f64)?
            .set_default("max_playlist_size", defaults.max_playlist_size as u64)?
            .set_default("cache_keep_files", defaults.cache_keep_files)?
            .set_default("enable_apple_music", defaults.enable_apple_music)?
            .set_default("ytdlp_path", defaults.ytdlp_path)?
            .set_default("extraction_timeout_secs", defaults.extraction_timeout_secs)?
            .set_default("log_level", defaults.log_level)?
            .add_source(environment)
            .build()
            .context("No se pudo leer la configuración")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Configuración inválida (¿falta DISCORD_TOKEN?)")?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Empty variables count as unset
    fn normalize(&mut self) {
        fn blank(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| v.trim().is_empty())
        }

        if blank(&self.spotify_client_id) {
            self.spotify_client_id = None;
        }
        if blank(&self.spotify_client_secret) {
            self.spotify_client_secret = None;
        }
        if self.cache_dir.as_ref().is_some_and(|d| d.as_os_str().is_empty()) {
            self.cache_dir = None;
        }
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token must be present
    /// - Volume must be between 0.0 and 2.0
    /// - Playlist cap must be between 1 and 100
    /// - Extraction timeout must be greater than 0
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_playlist_size == 0 || self.max_playlist_size > 100 {
            anyhow::bail!(
                "Max playlist size must be between 1 and 100, got: {}",
                self.max_playlist_size
            );
        }

        if self.extraction_timeout_secs == 0 {
            anyhow::bail!("Extraction timeout must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    pub fn spotify_credentials(&self) -> Option<(&str, &str)> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }

    pub fn spotify_enabled(&self) -> bool {
        self.spotify_credentials().is_some()
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Provides a safe summary that excludes sensitive information
    /// like tokens while showing key configuration parameters.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: Guild {}\n  \
            Audio: {}% vol, {} max tracks per request\n  \
            Cache: {} (keep files: {})\n  \
            Integrations: Spotify={}, Apple Music={}\n  \
            yt-dlp: {} ({}s timeout)",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_playlist_size,
            self.cache_dir
                .as_ref()
                .map_or("streaming".to_string(), |d| d.display().to_string()),
            self.cache_keep_files,
            self.spotify_enabled(),
            self.enable_apple_music,
            self.ytdlp_path,
            self.extraction_timeout_secs,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            default_volume: 0.5,
            max_playlist_size: 100,

            cache_dir: None,
            cache_keep_files: true,

            spotify_client_id: None,
            spotify_client_secret: None,
            enable_apple_music: true,

            ytdlp_path: "yt-dlp".to_string(),
            extraction_timeout_secs: 120,

            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn from_vars(vars: &[(&str, &str)]) -> Result<Config> {
        let mut map = ::config::Map::new();
        for (key, value) in vars {
            map.insert(key.to_string(), value.to_string());
        }
        Config::from_environment(
            ::config::Environment::default()
                .try_parsing(true)
                .source(Some(map)),
        )
    }

    #[test]
    fn test_defaults_apply() {
        let config = from_vars(&[("DISCORD_TOKEN", "abc.def")]).unwrap();

        assert_eq!(config.discord_token, "abc.def");
        assert_eq!(config.default_volume, 0.5);
        assert_eq!(config.max_playlist_size, 100);
        assert_eq!(config.cache_dir, None);
        assert!(config.enable_apple_music);
        assert!(!config.spotify_enabled());
        assert_eq!(config.ytdlp_path, "yt-dlp");
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = from_vars(&[
            ("DISCORD_TOKEN", "abc.def"),
            ("GUILD_ID", "123456789"),
            ("DEFAULT_VOLUME", "1.5"),
            ("CACHE_DIR", ""),
            ("SPOTIFY_CLIENT_ID", " "),
            ("ENABLE_APPLE_MUSIC", "false"),
        ])
        .unwrap();

        assert_eq!(config.guild_id, Some(123456789));
        assert_eq!(config.default_volume, 1.5);
        assert_eq!(config.cache_dir, None);
        assert_eq!(config.spotify_client_id, None);
        assert!(!config.enable_apple_music);
    }

    #[test]
    fn test_validation_rules() {
        assert!(from_vars(&[]).is_err());
        assert!(from_vars(&[("DISCORD_TOKEN", "t"), ("DEFAULT_VOLUME", "2.5")]).is_err());
        assert!(from_vars(&[("DISCORD_TOKEN", "t"), ("MAX_PLAYLIST_SIZE", "0")]).is_err());
        assert!(from_vars(&[("DISCORD_TOKEN", "t"), ("MAX_PLAYLIST_SIZE", "500")]).is_err());
        assert!(from_vars(&[("DISCORD_TOKEN", "t"), ("SPOTIFY_CLIENT_ID", "id")]).is_err());

        let spotify = from_vars(&[
            ("DISCORD_TOKEN", "t"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
        ])
        .unwrap();
        assert_eq!(spotify.spotify_credentials(), Some(("id", "secret")));
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = Config {
            discord_token: "super-secret".into(),
            spotify_client_secret: Some("also-secret".into()),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(!summary.contains("also-secret"));
        assert!(summary.contains("streaming"));
    }
}
