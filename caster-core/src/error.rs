//! Error types shared by sources, collaborators and stores

use thiserror::Error;

/// Failure to obtain a snapshot from a telemetry source
#[derive(Debug, Error)]
pub enum SourceError {
    /// The simulation link is down; skip detection this tick
    #[error("telemetry source unavailable: {0}")]
    Unavailable(String),

    /// Connected, but the sample could not be decoded
    #[error("failed to read telemetry: {0}")]
    Read(String),
}

/// Failure of a commentary or camera call
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },

    #[error("{service} failed: {reason}")]
    Failed { service: &'static str, reason: String },

    #[error("{service} timed out after {millis} ms")]
    TimedOut { service: &'static str, millis: u64 },
}

/// Failure of the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
