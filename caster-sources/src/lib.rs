//! Telemetry sources for IntelliCaster

pub mod demo;
pub mod iracing;

pub use demo::DemoSource;
pub use iracing::IRacingSource;
