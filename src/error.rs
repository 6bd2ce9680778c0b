//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore del motore di ottimizzazione.
//!
//! ## Responsabilità:
//! - Definisce `EngineError` enum per categorizzare tutti gli errori possibili
//! - Classifica ogni errore come retryable o fatale (`is_retryable`)
//! - Distingue errori del client da errori di servizio (`is_client_error`)
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Validation`: Input non valido (enum sconosciuti, batch vuoti o troppo grandi)
//! - `UnknownStrategy`: Strategia non presente nel catalogo
//! - `Analysis`: Media corrotto o illeggibile durante l'analisi
//! - `CorruptInput`: Il backend rifiuta i dati in ingresso
//! - `UnsupportedFormat`: Tipo di contenuto non gestibile dal backend
//! - `MissingDependency`: Tool esterno mancante (ffmpeg, ffprobe, cwebp)
//! - `TranscodeBackend`: Crash del tool o esaurimento risorse (retryable)
//! - `Timeout`: Task oltre il tempo massimo (retryable una volta)
//! - `Storage`: Lettura/scrittura fallita sullo storage (retryable una volta)
//! - `Cancelled`: Batch cancellato
//! - `Service`: Ultimo errore dopo aver esaurito i tentativi
//!
//! ## Esempio:
//! ```rust
//! use content_optimizer::EngineError;
//!
//! let err = EngineError::TranscodeBackend("ffmpeg exited with signal 9".to_string());
//! assert!(err.is_retryable());
//! ```

use serde::Serialize;
use std::fmt;

/// Stable, serializable classification of an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    UnknownStrategy,
    Analysis,
    CorruptInput,
    UnsupportedFormat,
    MissingDependency,
    TranscodeBackend,
    Timeout,
    Storage,
    Cancelled,
    Service,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::UnknownStrategy => "UnknownStrategyError",
            ErrorKind::Analysis => "AnalysisError",
            ErrorKind::CorruptInput => "CorruptInputError",
            ErrorKind::UnsupportedFormat => "UnsupportedFormatError",
            ErrorKind::MissingDependency => "MissingDependencyError",
            ErrorKind::TranscodeBackend => "TranscodeBackendError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Storage => "StorageError",
            ErrorKind::Cancelled => "CancelledError",
            ErrorKind::Service => "ServiceError",
        };
        f.write_str(name)
    }
}

/// Errors raised by the content optimization engine
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Corrupt input: {0}")]
    CorruptInput(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Transcode backend error: {0}")]
    TranscodeBackend(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Service error after {attempts} attempt(s): {source}")]
    Service {
        attempts: u32,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::UnknownStrategy(_) => ErrorKind::UnknownStrategy,
            EngineError::Analysis(_) => ErrorKind::Analysis,
            EngineError::CorruptInput(_) => ErrorKind::CorruptInput,
            EngineError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            EngineError::MissingDependency(_) => ErrorKind::MissingDependency,
            EngineError::TranscodeBackend(_) => ErrorKind::TranscodeBackend,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::Storage(_) => ErrorKind::Storage,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Service { .. } => ErrorKind::Service,
        }
    }

    /// Transient failures the orchestrator may retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::TranscodeBackend(_) | EngineError::Timeout(_) | EngineError::Storage(_)
        )
    }

    /// Errors caused by the request itself rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::UnknownStrategy(_)
                | EngineError::Analysis(_)
                | EngineError::CorruptInput(_)
                | EngineError::UnsupportedFormat(_)
        )
    }

    /// Wrap the last error of an exhausted retry loop
    pub fn service(attempts: u32, last: EngineError) -> Self {
        EngineError::Service {
            attempts,
            source: Box::new(last),
        }
    }

    /// The innermost error, looking through `Service` wrappers
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::Service { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<image::ImageError> for EngineError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Decoding(e) => EngineError::CorruptInput(e.to_string()),
            image::ImageError::Unsupported(e) => EngineError::UnsupportedFormat(e.to_string()),
            image::ImageError::Limits(e) => EngineError::TranscodeBackend(e.to_string()),
            other => EngineError::TranscodeBackend(other.to_string()),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::TranscodeBackend(format!("I/O failure: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
