//! Telemetry source trait definition

use crate::error::SourceError;
use crate::model::TelemetrySnapshot;
use anyhow::Result;

/// Trait for sim-specific telemetry sources
///
/// Each source is responsible for:
/// - Detecting if the sim is currently running
/// - Reading the whole field's state once per call
/// - Converting sim-specific data to an unranked TelemetrySnapshot
pub trait TelemetrySource: Send + Sync {
    /// Get the name of this source (e.g., "iRacing", "Demo")
    fn name(&self) -> &str;

    /// Check if the sim is currently running and accessible
    ///
    /// This should be a lightweight check (e.g., shared memory existence)
    fn detect(&self) -> bool;

    /// Open the connection
    fn start(&mut self) -> Result<()>;

    /// Release the connection
    fn stop(&mut self) -> Result<()>;

    /// Read the current state of the field
    ///
    /// Returns `Err(SourceError::Unavailable)` when the sim link is down
    /// instead of blocking or panicking. Should return within a few ms.
    fn read_snapshot(&mut self) -> Result<TelemetrySnapshot, SourceError>;

    /// Get whether the source is currently active
    fn is_active(&self) -> bool;
}
