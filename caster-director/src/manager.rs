//! Source lifecycle manager
//!
//! Picks the first registered source whose sim is detected, starts it, and
//! stops it again once the sim goes away. Detection is rate limited; reads
//! happen every time the caller asks for a snapshot.

use caster_core::{SourceError, TelemetrySnapshot, TelemetrySource};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info};

/// Registered sources, shared with the API
pub type SharedSources = Arc<RwLock<Vec<Box<dyn TelemetrySource>>>>;

const DETECTION_INTERVAL: Duration = Duration::from_secs(1);

pub struct SourceManager {
    sources: SharedSources,
    active: Arc<RwLock<Option<String>>>,
    last_check: Option<Instant>,
}

impl SourceManager {
    pub fn new(sources: SharedSources) -> Self {
        Self {
            sources,
            active: Arc::new(RwLock::new(None)),
            last_check: None,
        }
    }

    /// Share the active-source slot with someone else (the API state)
    pub fn with_active_slot(mut self, active: Arc<RwLock<Option<String>>>) -> Self {
        self.active = active;
        self
    }

    pub async fn active_source(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    /// Run a detection cycle if one is due, then read from the active source
    pub async fn read(&mut self) -> Result<TelemetrySnapshot, SourceError> {
        let due = self
            .last_check
            .map_or(true, |last| last.elapsed() >= DETECTION_INTERVAL);
        if due {
            self.last_check = Some(Instant::now());
            self.detection_cycle().await;
        }

        let Some(active_name) = self.active.read().await.clone() else {
            return Err(SourceError::Unavailable("no sim detected".to_string()));
        };

        let mut sources = self.sources.write().await;
        match sources.iter_mut().find(|s| s.name() == active_name) {
            Some(source) => source.read_snapshot(),
            None => Err(SourceError::Unavailable(format!(
                "source {active_name} is not registered"
            ))),
        }
    }

    /// Stop the active source, if any
    pub async fn shutdown(&mut self) {
        // Same lock order as detection_cycle
        let mut sources = self.sources.write().await;
        let mut active = self.active.write().await;
        let Some(name) = active.take() else {
            return;
        };
        if let Some(source) = sources.iter_mut().find(|s| s.name() == name) {
            if let Err(e) = source.stop() {
                error!("Error stopping source {}: {}", name, e);
            }
        }
    }

    async fn detection_cycle(&self) {
        let mut sources = self.sources.write().await;
        let mut active = self.active.write().await;

        // Keep the active source while its sim is still there
        if let Some(active_name) = active.clone() {
            if let Some(source) = sources.iter_mut().find(|s| s.name() == active_name) {
                if !source.detect() {
                    info!("Sim {} no longer detected, stopping source", active_name);
                    if let Err(e) = source.stop() {
                        error!("Error stopping source {}: {}", active_name, e);
                    }
                    *active = None;
                }
                return;
            }
            *active = None;
        }

        for source in sources.iter_mut() {
            if source.detect() && !source.is_active() {
                info!("Sim {} detected, starting source", source.name());
                match source.start() {
                    Ok(()) => {
                        *active = Some(source.name().to_string());
                        break;
                    }
                    Err(e) => error!("Failed to start source {}: {}", source.name(), e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caster_sources::DemoSource;

    struct Absent;

    impl TelemetrySource for Absent {
        fn name(&self) -> &str {
            "Absent"
        }
        fn detect(&self) -> bool {
            false
        }
        fn start(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("not running")
        }
        fn stop(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        fn read_snapshot(&mut self) -> Result<TelemetrySnapshot, SourceError> {
            Err(SourceError::Unavailable("not running".to_string()))
        }
        fn is_active(&self) -> bool {
            false
        }
    }

    fn shared(sources: Vec<Box<dyn TelemetrySource>>) -> SharedSources {
        Arc::new(RwLock::new(sources))
    }

    #[tokio::test]
    async fn test_picks_first_detected_source() {
        let absent: Box<dyn TelemetrySource> = Box::new(Absent);
        let demo: Box<dyn TelemetrySource> = Box::new(DemoSource::new());
        let sources = shared(vec![absent, demo]);
        let mut manager = SourceManager::new(sources.clone());

        let snapshot = manager.read().await.unwrap();
        assert_eq!(snapshot.source, "Demo");
        assert_eq!(manager.active_source().await.as_deref(), Some("Demo"));

        manager.shutdown().await;
        assert!(manager.active_source().await.is_none());
        assert!(!sources.read().await[1].is_active());
    }

    #[tokio::test]
    async fn test_nothing_detected_is_unavailable() {
        let absent: Box<dyn TelemetrySource> = Box::new(Absent);
        let mut manager = SourceManager::new(shared(vec![absent]));
        assert!(matches!(manager.read().await, Err(SourceError::Unavailable(_))));
    }
}
