//! Error types for trust material operations.

use thiserror::Error;

/// PKI errors.
///
/// Generation failures are fatal for the caller: they are local and
/// deterministic, so retrying cannot help.
#[derive(Debug, Error)]
pub enum PkiError {
    /// Key pair generation failed.
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Certificate creation or signing failed.
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    /// PEM or DER material could not be parsed.
    #[error("certificate parsing error: {0}")]
    ParseError(String),

    /// Reading or writing local trust material failed.
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PkiError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result type for PKI operations.
pub type Result<T> = std::result::Result<T, PkiError>;
