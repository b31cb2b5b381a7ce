use thiserror::Error;

/// Errores del orquestador de autoplay
#[derive(Debug, Error)]
pub enum AutoplayError {
    /// Una mutación no pudo registrarse de forma durable
    #[error("Error de persistencia: {0}")]
    Persistence(String),

    /// Operación no válida para la configuración actual (sin cambios de estado)
    #[error("Configuración inválida: {0}")]
    Configuration(String),
}

impl From<std::io::Error> for AutoplayError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for AutoplayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AutoplayError>;
