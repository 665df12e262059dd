//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Resolver or backend hiccup; retried with backoff by the supervisor.
    #[error("Transient resolution failure: {0}")]
    TransientResolution(String),

    /// Status-API quota exhausted; triggers the scraping fallback.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A required capture or resolution capability is missing entirely.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Retries exhausted for channel {channel_id} after {attempts} attempts")]
    RetriesExhausted { channel_id: String, attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} at {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientResolution(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientResolution(_)
                | Self::ResourceExhausted(_)
                | Self::Http(_)
                | Self::Io(_)
                | Self::IoPath { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::transient("no locator").is_transient());
        assert!(Error::ResourceExhausted("quota".into()).is_transient());
        assert!(!Error::unavailable("ffmpeg missing").is_transient());
        assert!(!Error::config("bad").is_transient());
    }

    #[test]
    fn test_io_path_message_includes_context() {
        let err = Error::io_path(
            "writing manifest",
            Path::new("/tmp/x/manifest.json"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("writing manifest"));
        assert!(msg.contains("manifest.json"));
    }
}
