use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Format non supporté: {0}")]
    UnsupportedFormat(String),

    #[error("Fichier illisible: {0}")]
    UnreadableFile(String),

    #[error("Validation échouée: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Report archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl EtlError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
