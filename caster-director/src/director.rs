//! Director loop
//!
//! One tokio task that, every `director_update_freq` seconds:
//! - expires queued events past the horizon
//! - reads a snapshot from the active source
//! - persists it as read and smooths its time series
//! - ranks the field and runs the detectors
//! - queues, persists and broadcasts new events
//! - asks for commentary when something happened
//! - points the camera at the car that matters
//!
//! Stopping is cooperative. `DirectorControl::stop` cancels the token; the
//! loop notices at the top of the next iteration, so a tick that is already
//! running always completes.

use crate::camera::{choose_camera, choose_focus};
use crate::config::DirectorConfig;
use crate::detector::Detector;
use crate::manager::SourceManager;
use crate::state::Feed;
use caster_core::{
    collaborators::RaceContext, smoothing::smooth_series, CameraSelector, CommentaryDispatcher,
    DispatchError, Event, EventQueue, RaceState, RaceStore, TelemetrySnapshot,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectorState {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Snapshot was ranked and diffed; `events` were queued
    Processed { events: Vec<Event> },

    /// No source could produce a snapshot; nothing was detected
    SourceUnavailable,
}

#[derive(Debug, Default)]
struct DirectorStatus {
    state: Mutex<DirectorState>,
    ticks: AtomicU64,
}

impl DirectorStatus {
    fn set(&self, state: DirectorState) {
        *self.state.lock() = state;
    }
}

/// Cloneable handle for observing and stopping a director
#[derive(Debug, Clone)]
pub struct DirectorControl {
    token: CancellationToken,
    status: Arc<DirectorStatus>,
}

impl DirectorControl {
    /// Request a cooperative stop
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> DirectorState {
        *self.status.state.lock()
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.status.ticks.load(Ordering::Relaxed)
    }
}

/// Handle to a running director task
pub struct DirectorHandle {
    control: DirectorControl,
    task: JoinHandle<Director>,
}

impl DirectorHandle {
    pub fn control(&self) -> DirectorControl {
        self.control.clone()
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    /// Wait for the loop to exit and take the director back
    pub async fn join(self) -> anyhow::Result<Director> {
        Ok(self.task.await?)
    }
}

pub struct Director {
    config: DirectorConfig,
    sources: SourceManager,
    detector: Detector,
    store: Option<Arc<dyn RaceStore>>,
    commentary: Option<Arc<dyn CommentaryDispatcher>>,
    camera: Option<Arc<dyn CameraSelector>>,
    events_tx: Option<broadcast::Sender<Event>>,
    feed: Option<Arc<RwLock<Feed>>>,
    token: CancellationToken,
    status: Arc<DirectorStatus>,
}

impl Director {
    pub fn new(config: DirectorConfig, sources: SourceManager, queue: Arc<EventQueue>) -> Self {
        let detector = Detector::from_config(queue, &config);
        Self {
            config,
            sources,
            detector,
            store: None,
            commentary: None,
            camera: None,
            events_tx: None,
            feed: None,
            token: CancellationToken::new(),
            status: Arc::new(DirectorStatus::default()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn RaceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_commentary(mut self, commentary: Arc<dyn CommentaryDispatcher>) -> Self {
        self.commentary = Some(commentary);
        self
    }

    pub fn with_camera(mut self, camera: Arc<dyn CameraSelector>) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Also publish every queued event on this channel
    pub fn with_event_sender(mut self, events_tx: broadcast::Sender<Event>) -> Self {
        self.events_tx = Some(events_tx);
        self
    }

    /// Publish standings and commentary here after each tick
    pub fn with_feed(mut self, feed: Arc<RwLock<Feed>>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Use a token owned by the caller, e.g. one shared with the server
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn control(&self) -> DirectorControl {
        DirectorControl {
            token: self.token.clone(),
            status: self.status.clone(),
        }
    }

    pub fn race(&self) -> &RaceState {
        self.detector.race()
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    /// Spawn the loop on the current runtime
    pub fn start(self) -> DirectorHandle {
        let control = self.control();
        self.status.set(DirectorState::Running);
        let task = tokio::spawn(self.run());
        DirectorHandle { control, task }
    }

    async fn run(mut self) -> Self {
        info!(
            interval_ms = self.config.poll_interval().as_millis() as u64,
            "Director started"
        );

        loop {
            if self.token.is_cancelled() {
                break;
            }

            if let TickOutcome::Processed { events } = self.tick().await {
                if !events.is_empty() {
                    debug!(count = events.len(), "Tick produced events");
                }
            }

            tokio::select! {
                _ = self.token.cancelled() => {}
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        self.sources.shutdown().await;
        self.status.set(DirectorState::Stopped);
        info!(ticks = self.status.ticks.load(Ordering::Relaxed), "Director stopped");
        self
    }

    /// Run one full iteration of the pipeline
    pub async fn tick(&mut self) -> TickOutcome {
        self.status.ticks.fetch_add(1, Ordering::Relaxed);
        self.detector.expire();

        let snapshot = match self.sources.read().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Skipping tick: {}", e);
                return TickOutcome::SourceUnavailable;
            }
        };

        self.persist_snapshot(&snapshot);
        let series = smooth_series(&snapshot.series, self.config.smoothing_window);

        let source = snapshot.source.clone();
        let mut context = RaceContext {
            league: self.config.league(),
            track_name: snapshot.session.as_ref().and_then(|s| s.track_name.clone()),
            lap: snapshot.session.as_ref().and_then(|s| s.lap),
            standings: Vec::new(),
            series,
        };

        let events = self.detector.process(snapshot);
        context = context.with_standings(self.detector.current(), self.config.context_standings);

        for event in &events {
            info!(id = event.id, kind = %event.kind, "{}", event.description);
            self.persist_event(event);
            if let Some(tx) = &self.events_tx {
                // No receivers is fine
                let _ = tx.send(event.clone());
            }
        }

        let commentary = if events.is_empty() {
            None
        } else {
            self.request_commentary(&events, context).await
        };

        self.publish(source, commentary).await;
        self.point_camera(&events).await;

        TickOutcome::Processed { events }
    }

    fn persist_snapshot(&self, snapshot: &TelemetrySnapshot) {
        let Some(store) = &self.store else {
            return;
        };
        let result = serde_json::to_value(snapshot)
            .map_err(caster_core::StoreError::from)
            .and_then(|raw| store.insert_telemetry(snapshot.timestamp, &raw));
        if let Err(e) = result {
            warn!("Failed to persist telemetry: {}", e);
        }
    }

    fn persist_event(&self, event: &Event) {
        let Some(store) = &self.store else {
            return;
        };
        let focus = event.focus.as_ref().map(|f| f.name.as_str());
        if let Err(e) =
            store.insert_event(event.kind.as_str(), &event.description, focus, event.timestamp)
        {
            warn!("Failed to persist event {}: {}", event.id, e);
        }
    }

    async fn request_commentary(&self, events: &[Event], context: RaceContext) -> Option<String> {
        let commentary = self.commentary.clone()?;
        let batch = events.to_vec();
        let result = dispatch("commentary", self.config.dispatch_timeout(), move || {
            commentary.generate(&batch, &context)
        })
        .await;

        match result {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!("Commentary unavailable: {}", e);
                None
            }
        }
    }

    async fn publish(&self, source: String, commentary: Option<String>) {
        let Some(feed) = &self.feed else {
            return;
        };
        let mut feed = feed.write().await;
        feed.source = Some(source);
        feed.standings = self.detector.current().drivers.clone();
        if commentary.is_some() {
            feed.commentary = commentary;
        }
        feed.updated = Some(Utc::now());
    }

    async fn point_camera(&self, events: &[Event]) {
        let Some(camera) = self.camera.clone() else {
            return;
        };
        let Some(focus) = choose_focus(events, self.detector.current()) else {
            return;
        };

        let count = match camera.camera_count() {
            0 => self.config.camera_count,
            n => n,
        };
        let index = {
            let mut rng = rand::rng();
            choose_camera(count, &mut rng)
        };
        let Some(index) = index else {
            debug!("No camera groups known, not switching");
            return;
        };

        let result = dispatch("camera", self.config.dispatch_timeout(), move || {
            camera.switch(index, focus)
        })
        .await;
        if let Err(e) = result {
            warn!("Camera switch failed: {}", e);
        }
    }
}

/// Run a collaborator call on the blocking pool, bounded by `timeout`
async fn dispatch<T, F>(service: &'static str, timeout: Duration, call: F) -> Result<T, DispatchError>
where
    F: FnOnce() -> Result<T, DispatchError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(call)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(DispatchError::Failed {
            service,
            reason: e.to_string(),
        }),
        Err(_) => Err(DispatchError::TimedOut {
            service,
            millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
