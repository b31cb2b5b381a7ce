use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::autoplay::AutoMode;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub skips_required: usize,

    // Paths
    pub data_dir: PathBuf,
    pub auto_playlist_file: PathBuf,
    pub auto_stream_file: PathBuf,

    // Autoplay
    pub auto_playlist: bool,
    pub auto_stream: bool,
    pub auto_mode: AutoMode,
    pub auto_playlist_random: bool,
    pub auto_pause: bool,
    pub write_current_song: bool,

    // Extracción
    #[serde(with = "humantime_serde_compat")]
    pub extraction_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }

    /// Construye la configuración a partir de una fuente de variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: lookup("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            // Audio
            default_volume: var("DEFAULT_VOLUME", "0.5").parse()?,
            max_queue_size: var("MAX_QUEUE_SIZE", "1000").parse()?,
            skips_required: var("SKIPS_REQUIRED", "2").parse()?,

            // Paths
            data_dir: var("DATA_DIR", "data").into(),
            auto_playlist_file: var("AUTO_PLAYLIST_FILE", "config/autoplaylist.txt").into(),
            auto_stream_file: var("AUTO_STREAM_FILE", "config/autostream.txt").into(),

            // Autoplay
            auto_playlist: var("AUTO_PLAYLIST", "true").parse()?,
            auto_stream: var("AUTO_STREAM", "true").parse()?,
            auto_mode: var("AUTO_MODE", "merge").parse()?,
            auto_playlist_random: var("AUTO_PLAYLIST_RANDOM", "true").parse()?,
            auto_pause: var("AUTO_PAUSE", "true").parse()?,
            write_current_song: var("WRITE_CURRENT_SONG", "false").parse()?,

            // Extracción
            extraction_timeout: humantime::parse_duration(&var("EXTRACTION_TIMEOUT", "30s"))
                .context("EXTRACTION_TIMEOUT inválido")?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size, skip votes and extraction timeout must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.skips_required == 0 {
            anyhow::bail!("Skips required must be greater than 0");
        }

        if self.extraction_timeout.is_zero() {
            anyhow::bail!("Extraction timeout must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} queue, {} skips\n  \
            Autoplay: mode={}, playlist={}, stream={}, random={}, autopause={}\n  \
            Data: {} (seeds: {}, {})\n  \
            Extraction timeout: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.skips_required,
            self.auto_mode,
            self.auto_playlist,
            self.auto_stream,
            self.auto_playlist_random,
            self.auto_pause,
            self.data_dir.display(),
            self.auto_playlist_file.display(),
            self.auto_stream_file.display(),
            humantime::format_duration(self.extraction_timeout)
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
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            max_queue_size: 1000,
            skips_required: 2,

            data_dir: "data".into(),
            auto_playlist_file: "config/autoplaylist.txt".into(),
            auto_stream_file: "config/autostream.txt".into(),

            auto_playlist: true,
            auto_stream: true,
            auto_mode: AutoMode::Merge,
            auto_playlist_random: true,
            auto_pause: true,
            write_current_song: false,

            extraction_timeout: Duration::from_secs(30),
        }
    }
}

/// Serializa duraciones como texto legible (`30s`, `1m 30s`)
mod humantime_serde_compat {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
