//! Application state management

use crate::director::DirectorControl;
use crate::manager::{SharedSources, SourceManager};
use caster_core::{DriverState, Event, EventQueue, TelemetrySource};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// What the director last published for the API to show
#[derive(Debug, Clone, Default, Serialize)]
pub struct Feed {
    /// Source the standings came from
    pub source: Option<String>,

    /// Latest ranked field, P1 first
    pub standings: Vec<DriverState>,

    /// Last non-empty commentary line
    pub commentary: Option<String>,

    pub updated: Option<DateTime<Utc>>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// All registered sources
    pub sources: SharedSources,

    /// Name of the source currently being read
    pub active_source: Arc<RwLock<Option<String>>>,

    /// Events waiting to be consumed
    pub queue: Arc<EventQueue>,

    /// Broadcast channel for newly detected events
    pub events_tx: broadcast::Sender<Event>,

    pub feed: Arc<RwLock<Feed>>,

    /// Control handle of the running director, once started
    pub director: Arc<RwLock<Option<DirectorControl>>>,
}

impl AppState {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(100);

        Self {
            sources: Arc::new(RwLock::new(Vec::new())),
            active_source: Arc::new(RwLock::new(None)),
            queue: Arc::new(EventQueue::new()),
            events_tx,
            feed: Arc::new(RwLock::new(Feed::default())),
            director: Arc::new(RwLock::new(None)),
        }
    }

    /// Register a source
    pub async fn register_source(&self, source: Box<dyn TelemetrySource>) {
        let mut sources = self.sources.write().await;
        sources.push(source);
    }

    /// Source manager that reports its active source into this state
    pub fn source_manager(&self) -> SourceManager {
        SourceManager::new(self.sources.clone()).with_active_slot(self.active_source.clone())
    }

    /// Subscribe to newly detected events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
