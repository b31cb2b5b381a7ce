pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::autoplay::MediaReference;

pub use ytdlp::YtDlpExtractor;

/// Clasificación de fallos de extracción.
///
/// El selector decide con esto si expulsa la entrada o solo la salta.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// La fuente no volverá a funcionar (URL rota, video eliminado...)
    #[error("Fuente inválida: {0}")]
    InvalidSource(String),

    /// La fuente existe pero no es una transmisión en vivo
    #[error("No es una transmisión: {0}")]
    NotAStream(String),

    /// Fallo temporal (red, timeout, rate limit)
    #[error("Error temporal de extracción: {0}")]
    Transient(String),
}

/// Metadatos de un medio resuelto
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub duration: Option<Duration>,
    pub is_live: bool,
}

impl TrackMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            duration: None,
            is_live: false,
        }
    }
}

/// Servicio de extracción de metadatos
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn resolve(&self, reference: &MediaReference) -> Result<TrackMetadata, ExtractionError>;
}
