//! Domain errors for the close-loop engine.

use std::path::PathBuf;

use thiserror::Error;

use super::models::SessionKind;

/// Domain-level errors that can occur while planning, scheduling or persisting runs.
///
/// Gate and budget outcomes are *not* represented here: a failed gate is a
/// value (`passed: false`) on the result payload, so callers can tell
/// "ran and failed the gate" apart from "could not run".
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{kind} not found: {reference}")]
    SessionNotFound { kind: SessionKind, reference: String },

    #[error("Decomposition quality {score:.1} is below the required minimum {min:.1}")]
    DecompositionQuality { score: f64, min: f64 },

    #[error("Goal runner failed: {0}")]
    Runner(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt record {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from invalid input rather than execution.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_))
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
