//! Shared Error Types
//!
//! Crate-wide error type covering every failure class the engine handles.
//! Variants are grouped by how they are treated: transport and http failures
//! are transient (retried by the push channel's backoff loop or the mutation
//! queue's retry counter), storage and serialization failures are local, and
//! `Unreachable` is the class-level failure surfaced to the operator.
//!
//! All variants carry owned strings so the type stays `Clone` and can travel
//! through watch channels and event payloads.
use thiserror::Error;

/// Errors produced by the synchronization engine
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// Push channel transport failure (connect, read, close)
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable error message
        message: String,
    },

    /// Backend request failed (non-2xx status or network error)
    #[error("request to {endpoint} failed: {message}")]
    Http {
        /// Endpoint path or URL the request targeted
        endpoint: String,
        /// Human-readable error message
        message: String,
    },

    /// Local database failure
    #[error("storage error: {message}")]
    Storage {
        /// Human-readable error message
        message: String,
    },

    /// JSON encoding or decoding failure
    #[error("serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// The backend did not answer the health probe at all
    #[error("backend unreachable at {url}")]
    Unreachable {
        /// The base URL that was probed
        url: String,
    },

    /// Invalid engine configuration
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message
        message: String,
    },
}

impl SyncError {
    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new http error
    pub fn http(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a new unreachable-backend error
    pub fn unreachable(url: impl Into<String>) -> Self {
        Self::Unreachable { url: url.into() }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether a retry can reasonably succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. } | SyncError::Http { .. } | SyncError::Unreachable { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "backend".to_string());
        Self::http(endpoint, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let error = SyncError::http("/api/orders", "connection refused");
        let display = format!("{}", error);
        assert!(display.contains("/api/orders"));
        assert!(display.contains("connection refused"));
    }

    #[test]
    fn test_from_serde_error() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{ nope");
        let error: SyncError = result.unwrap_err().into();
        assert!(matches!(error, SyncError::Serialization { .. }));
    }

    #[test]
    fn test_transient_classification() {
        assert!(SyncError::transport("closed").is_transient());
        assert!(SyncError::http("/api/bills", "503").is_transient());
        assert!(!SyncError::storage("disk full").is_transient());
        assert!(!SyncError::config("bad url").is_transient());
    }

    #[test]
    fn test_error_clone() {
        let error = SyncError::unreachable("http://127.0.0.1:3000");
        let cloned = error.clone();
        assert_eq!(format!("{error}"), format!("{cloned}"));
    }
}
