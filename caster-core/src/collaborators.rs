//! Interfaces the director calls out to
//!
//! Implementations may talk to slow or flaky services. They report failure
//! through a typed error; the director logs it and carries on with an empty
//! result, so an implementation must not panic.

use crate::error::{DispatchError, StoreError};
use crate::events::Event;
use crate::model::RaceSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// League the broadcast is for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub name: String,
    pub short_name: String,
}

/// One line of the running order handed to the commentator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub position: u32,
    pub name: String,
    pub car_number: String,
    pub in_pits: bool,
}

/// Race context sent along with an event batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceContext {
    pub league: Option<League>,
    pub track_name: Option<String>,
    pub lap: Option<u32>,
    pub standings: Vec<Standing>,

    /// Smoothed time-series fields from the snapshot
    pub series: BTreeMap<String, Vec<f32>>,
}

impl RaceContext {
    /// Build the running order from a ranked snapshot, keeping the top `limit`
    pub fn with_standings(mut self, snapshot: &RaceSnapshot, limit: usize) -> Self {
        self.standings = snapshot
            .drivers
            .iter()
            .take(limit)
            .map(|d| Standing {
                position: d.position,
                name: d.id.display_name(),
                car_number: d.id.car_number.clone(),
                in_pits: d.in_pits,
            })
            .collect();
        self
    }

    pub fn leader(&self) -> Option<&Standing> {
        self.standings.iter().find(|s| s.position == 1)
    }
}

/// Generates commentary text for a batch of events
pub trait CommentaryDispatcher: Send + Sync {
    fn generate(&self, events: &[Event], context: &RaceContext) -> Result<String, DispatchError>;
}

/// Switches the broadcast camera
pub trait CameraSelector: Send + Sync {
    /// Number of camera groups available; 0 when unknown
    fn camera_count(&self) -> usize;

    fn switch(&self, camera_index: usize, focus_car_index: u32) -> Result<(), DispatchError>;
}

/// Append-only persistence for telemetry, events and settings
pub trait RaceStore: Send + Sync {
    fn insert_telemetry(
        &self,
        timestamp: DateTime<Utc>,
        raw_snapshot: &serde_json::Value,
    ) -> Result<(), StoreError>;

    fn insert_event(
        &self,
        kind: &str,
        description: &str,
        focus: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
