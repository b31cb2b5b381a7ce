use anyhow::Result;
use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::{path::Path, sync::OnceLock, time::Duration};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{ExtractionError, Extractor, TrackMetadata};
use crate::autoplay::{Category, MediaReference};

/// Extractor basado en `yt-dlp -J`
pub struct YtDlpExtractor {
    binary: String,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            timeout,
        }
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn verify(&self) -> Result<()> {
        let output = Command::new(&self.binary).arg("--version").output().await?;

        if !output.status.success() {
            anyhow::bail!("yt-dlp no puede ejecutarse correctamente");
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("✅ yt-dlp versión: {}", version.trim());
        Ok(())
    }

    async fn dump_json(&self, locator: &str) -> Result<Value, ExtractionError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-J", "--flat-playlist", "--no-warnings", "--", locator])
            .kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(ExtractionError::Transient(format!(
                    "timeout de {}s",
                    self.timeout.as_secs()
                )))
            }
            Ok(Err(e)) => {
                return Err(ExtractionError::Transient(format!(
                    "no se pudo ejecutar yt-dlp: {}",
                    e
                )))
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractionError::Transient(format!("JSON inválido de yt-dlp: {}", e)))
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn resolve(&self, reference: &MediaReference) -> Result<TrackMetadata, ExtractionError> {
        let locator = reference.locator.as_str();
        let path = Path::new(locator);

        if path.is_file() {
            return match reference.category {
                Category::Stream => Err(ExtractionError::NotAStream(
                    "es una ruta de archivo, no una transmisión".to_string(),
                )),
                Category::Default => {
                    let title = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or(locator);
                    Ok(TrackMetadata::new(title))
                }
            };
        }

        debug!("🔎 Extrayendo {} ({:?})", locator, reference.category);
        let document = self.dump_json(locator).await?;
        let metadata = interpret(reference.category, locator, &document)?;

        if metadata.is_live {
            debug!("📡 Transmisión en vivo: {}", metadata.title);
        }
        Ok(metadata)
    }
}

fn permanent_failure() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(unsupported url|video unavailable|private video|is not a valid url|http error 404|http error 410|does not exist|youtube said|account associated with this video has been terminated|removed by the uploader)",
        )
        .expect("patrón de errores permanentes válido")
    })
}

fn transient_failure() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(http error 429|http error 5\d\d|timed out|unable to download webpage|temporary failure|connection (reset|refused)|network is unreachable)",
        )
        .expect("patrón de errores temporales válido")
    })
}

/// Clasifica el stderr de una ejecución fallida de yt-dlp
pub(crate) fn classify_failure(stderr: &str) -> ExtractionError {
    let message = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .unwrap_or_else(|| stderr.trim())
        .trim()
        .to_string();

    // Un 404 llega envuelto en "Unable to download webpage", así que los
    // códigos permanentes se comprueban primero
    if permanent_failure().is_match(stderr) {
        ExtractionError::InvalidSource(message)
    } else if transient_failure().is_match(stderr) {
        ExtractionError::Transient(message)
    } else {
        warn!("❓ Error de yt-dlp no reconocido, se trata como temporal: {}", message);
        ExtractionError::Transient(message)
    }
}

/// Interpreta el documento de `yt-dlp -J` según la categoría
pub(crate) fn interpret(
    category: Category,
    locator: &str,
    document: &Value,
) -> Result<TrackMetadata, ExtractionError> {
    let is_playlist = document.get("_type").and_then(Value::as_str) == Some("playlist")
        || document.get("entries").is_some_and(|e| !e.is_null());
    if is_playlist {
        return Err(ExtractionError::Transient(
            "las playlists no están soportadas como fuente de respaldo".to_string(),
        ));
    }

    let is_live = document.get("is_live").and_then(Value::as_bool) == Some(true)
        || document.get("live_status").and_then(Value::as_str) == Some("is_live");
    let extractor = document
        .get("extractor")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if category == Category::Stream && !is_live && extractor != "generic" {
        return Err(ExtractionError::NotAStream(format!(
            "el extractor '{}' no reporta una transmisión en vivo",
            extractor
        )));
    }

    let title = document
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(locator)
        .to_string();
    let duration = document
        .get("duration")
        .and_then(Value::as_f64)
        .filter(|d| *d > 0.0)
        .map(Duration::from_secs_f64);

    Ok(TrackMetadata {
        title,
        duration,
        is_live: is_live || category == Category::Stream,
    })
}
