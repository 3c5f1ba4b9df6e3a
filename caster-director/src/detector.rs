//! Ranking and event detection over a stream of snapshots
//!
//! `Detector` owns the race state the detectors diff against. The director
//! drives one per tick; `run` is a lighter loop that only feeds the queue.

use crate::config::DirectorConfig;
use crate::manager::SourceManager;
use caster_core::{
    detect::{detect_all, DetectorSettings},
    ranking::rank,
    Event, EventQueue, RaceSnapshot, RaceState, TelemetrySnapshot,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Detector {
    race: RaceState,
    settings: DetectorSettings,
    horizon: Duration,
    queue: Arc<EventQueue>,
}

impl Detector {
    pub fn new(queue: Arc<EventQueue>, settings: DetectorSettings, horizon: Duration) -> Self {
        Self {
            race: RaceState::new(),
            settings,
            horizon,
            queue,
        }
    }

    pub fn from_config(queue: Arc<EventQueue>, config: &DirectorConfig) -> Self {
        Self::new(queue, config.detector_settings(), config.event_horizon())
    }

    /// Rank the snapshot, diff it against the last one and queue what changed
    ///
    /// Does not expire old events; call `expire` for that.
    ///
    /// Returns the events that were inserted this call.
    pub fn process(&mut self, snapshot: TelemetrySnapshot) -> Vec<Event> {
        let previous = (!self.race.current.is_empty()).then_some(&self.race.current);
        let ranked = rank(snapshot.drivers, snapshot.race_started, previous);
        self.race.advance(ranked);

        if !self.race.has_previous() {
            return Vec::new();
        }

        let batch = detect_all(&self.race, &self.settings);
        self.queue.insert_batch(batch)
    }

    /// Evict queued events older than the horizon
    ///
    /// Runs once per tick whether or not a snapshot could be read.
    pub fn expire(&self) -> usize {
        let expired = self.queue.expire(self.horizon);
        if expired > 0 {
            debug!(expired, "Expired stale events");
        }
        expired
    }

    pub fn race(&self) -> &RaceState {
        &self.race
    }

    /// Latest ranked snapshot
    pub fn current(&self) -> &RaceSnapshot {
        &self.race.current
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}

/// Detection-only loop at `events_update_freq`; no commentary or camera
pub async fn run(
    mut detector: Detector,
    mut sources: SourceManager,
    interval: Duration,
    token: CancellationToken,
) -> Detector {
    info!("Event detector started");

    while !token.is_cancelled() {
        detector.expire();
        match sources.read().await {
            Ok(snapshot) => {
                for event in detector.process(snapshot) {
                    debug!(id = event.id, kind = %event.kind, "{}", event.description);
                }
            }
            Err(e) => warn!("Skipping detection: {}", e),
        }

        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }

    sources.shutdown().await;
    info!("Event detector stopped");
    detector
}

#[cfg(test)]
mod tests {
    use super::*;
    use caster_core::{units::Meters, DriverId, DriverState, EventKind};

    fn car(idx: u32, name: &str, laps: i32, distance: f32) -> DriverState {
        let mut d = DriverState::new(DriverId::new(idx, name, idx.to_string()));
        d.laps_completed = laps;
        d.total_distance = Some(Meters(distance));
        d
    }

    fn snapshot(drivers: Vec<DriverState>) -> TelemetrySnapshot {
        TelemetrySnapshot::new("Test", true, drivers)
    }

    fn detector() -> (Detector, Arc<EventQueue>) {
        let queue = Arc::new(EventQueue::new());
        let detector = Detector::new(queue.clone(), DetectorSettings::default(), Duration::from_secs(30));
        (detector, queue)
    }

    #[test]
    fn test_first_snapshot_has_nothing_to_diff() {
        let (mut detector, queue) = detector();
        let events = detector.process(snapshot(vec![car(0, "Alpha", 1, 100.0)]));
        assert!(events.is_empty());
        assert!(queue.is_empty());
        assert_eq!(detector.current().leader().map(|d| d.id.car_idx), Some(0));
    }

    #[test]
    fn test_pass_between_snapshots_is_queued() {
        let (mut detector, queue) = detector();
        detector.process(snapshot(vec![car(0, "Alpha", 2, 200.0), car(1, "Bravo", 1, 100.0)]));
        let events = detector.process(snapshot(vec![car(0, "Alpha", 2, 250.0), car(1, "Bravo", 3, 400.0)]));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Overtake);
        assert_eq!(events[0].description, "Bravo overtook Alpha for P1");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_stationary_car_is_reported() {
        let (mut detector, _) = detector();
        detector.process(snapshot(vec![car(0, "Alpha", 2, 200.0), car(1, "Bravo", 1, 100.0)]));
        let events = detector.process(snapshot(vec![car(0, "Alpha", 2, 260.0), car(1, "Bravo", 1, 100.5)]));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Stopped);
        assert_eq!(events[0].focus.as_ref().map(|f| f.car_idx), Some(1));
    }

    #[test]
    fn test_expire_is_separate_from_processing() {
        let (mut detector, queue) = detector();
        let old = chrono::Utc::now() - chrono::TimeDelta::seconds(60);
        queue.add_at(EventKind::Stopped, "old", None, None, old);

        detector.process(snapshot(vec![car(0, "Alpha", 1, 100.0)]));
        assert_eq!(queue.len(), 1);

        assert_eq!(detector.expire(), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (detector, queue) = detector();
        let demo: Box<dyn caster_core::TelemetrySource> = Box::new(caster_sources::DemoSource::new());
        let sources = Arc::new(tokio::sync::RwLock::new(vec![demo]));
        let token = CancellationToken::new();

        let handle = tokio::spawn(run(
            detector,
            SourceManager::new(sources),
            Duration::from_millis(5),
            token.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let detector = handle.await.unwrap();
        assert_eq!(detector.current().len(), 8);
        assert!(Arc::ptr_eq(detector.queue(), &queue));
    }
}
