//! Error types for remote catalog and asset access.

use thiserror::Error;

/// Errors produced by STAC search and remote reads.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("server does not support Range requests for {url}")]
    RangeNotSupported { url: String },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid STAC document: {0}")]
    InvalidStac(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(#[from] vegmon_core::Error),
}

impl CloudError {
    /// Whether retrying the same request may succeed: timeouts, connection
    /// failures, HTTP 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.as_u16() == 429 || s.is_server_error())
            }
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Network(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let busy = CloudError::Status {
            status: 503,
            url: "https://x".into(),
        };
        let throttled = CloudError::Status {
            status: 429,
            url: "https://x".into(),
        };
        let missing = CloudError::Status {
            status: 404,
            url: "https://x".into(),
        };
        assert!(busy.is_transient());
        assert!(throttled.is_transient());
        assert!(!missing.is_transient());
        assert!(!CloudError::Auth("denied".into()).is_transient());
        assert!(CloudError::Network("reset".into()).is_transient());
    }
}
