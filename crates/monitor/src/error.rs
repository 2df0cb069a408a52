//! Error types for the monitor

use thiserror::Error;
use vegmon_cloud::CloudError;
use vegmon_colormap::ColorError;

/// Errors produced while building windows, reducing months and exporting
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Core(#[from] vegmon_core::Error),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("color error: {0}")]
    Color(#[from] ColorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid month '{0}', expected YYYY-MM")]
    InvalidMonth(String),

    #[error("scene {scene} has no {band} asset")]
    MissingAsset { scene: String, band: String },

    #[error("aggregation of {month} failed: {source}")]
    Aggregation {
        month: String,
        #[source]
        source: Box<MonitorError>,
    },
}

impl MonitorError {
    /// Whether retrying the request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Cloud(e) => e.is_transient(),
            Self::Core(e) => e.io_kind().is_some_and(transient_io),
            Self::Io(e) => transient_io(e.kind()),
            Self::Aggregation { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

fn transient_io(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::Interrupted
    )
}

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;
