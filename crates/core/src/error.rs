// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a `JobStore` backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Permission denied accessing job store: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error accessing job store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode job collection: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors that can occur when computing a dial target for a progress channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Stream address is empty")]
    EmptyAddress,

    #[error("Invalid stream address {address:?}: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("No host available: API base {api_base:?} is relative and the page origin has no host")]
    NoHost { api_base: String },
}

impl ResolveError {
    pub fn invalid(address: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.to_string(),
        }
    }
}

/// Why an inbound frame was skipped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame is not a JSON object")]
    NotObject,
}

/// Errors surfaced by a progress channel transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed unexpectedly (code {code:?}): {reason}")]
    UnexpectedClose { code: Option<u16>, reason: String },

    #[error("Gave up after {attempts} failed connection attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_io_classification() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StorageError::io("/data/jobs.json", io_err);
        assert!(matches!(err, StorageError::PermissionDenied { .. }));

        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = StorageError::io("/data/jobs.json", io_err);
        assert!(matches!(err, StorageError::Io { .. }));
        assert!(err.to_string().contains("/data/jobs.json"));
    }

    #[test]
    fn test_resolve_error_display() {
        let err = ResolveError::invalid("ht!tp://x", "relative URL without a base");
        assert!(err.to_string().contains("ht!tp://x"));

        let err = ResolveError::NoHost {
            api_base: "/api".into(),
        };
        assert!(err.to_string().contains("/api"));
    }

    #[test]
    fn test_frame_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: FrameError = json_err.into();
        assert!(matches!(err, FrameError::Json(_)));
        assert!(err.to_string().starts_with("Frame is not valid JSON"));
    }

    #[test]
    fn test_channel_error_display() {
        let err = ChannelError::RetriesExhausted {
            attempts: 4,
            last_error: "connection refused".into(),
        };
        assert!(err.to_string().contains("4 failed"));
        assert!(err.to_string().contains("connection refused"));

        let err = ChannelError::UnexpectedClose {
            code: Some(1006),
            reason: String::new(),
        };
        assert!(err.to_string().contains("1006"));
    }
}
