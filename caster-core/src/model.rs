//! Race data model
//!
//! Defines the snapshot a telemetry source hands to the director, the per-car
//! `DriverState` record, and the current/previous pair the detectors diff.
//! Uses Option<T> for values a sim only reports some of the time (fastest
//! lap before any lap is completed, gaps before the leader crosses the line).

use crate::units::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable identity of one competitor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverId {
    /// Car slot index in the sim (stable for the whole session)
    pub car_idx: u32,

    /// Display name as reported by the sim
    pub name: String,

    /// Car number as painted on the car
    pub car_number: String,
}

impl DriverId {
    pub fn new(car_idx: u32, name: impl Into<String>, car_number: impl Into<String>) -> Self {
        Self {
            car_idx,
            name: name.into(),
            car_number: car_number.into(),
        }
    }

    /// Name with any embedded car numbers removed ("Max Verstappen33" -> "Max Verstappen")
    pub fn display_name(&self) -> String {
        strip_numbers(&self.name)
    }
}

/// Remove digits from a name and collapse the whitespace left behind
pub fn strip_numbers(name: &str) -> String {
    let without_digits: String = name.chars().filter(|c| !c.is_ascii_digit()).collect();
    without_digits.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One competitor at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverState {
    pub id: DriverId,

    /// Race position (1 = leader). Sources leave this at 0; the ranking
    /// engine assigns it.
    pub position: u32,

    /// Starting slot on the grid (1-based)
    pub grid_position: u32,

    /// Fraction of the current lap covered
    pub lap_percent: Percentage,

    /// Laps started (the lap the car is on)
    pub laps_started: i32,

    /// Laps completed; negative means the car retired (DNF)
    pub laps_completed: i32,

    pub last_lap_time: Option<Seconds>,

    pub fastest_lap_time: Option<Seconds>,

    pub gap_to_leader: Option<Seconds>,

    pub in_pits: bool,

    pub on_track: bool,

    pub incident_count: u32,

    /// Total distance covered in the session
    pub total_distance: Option<Meters>,
}

impl DriverState {
    /// Minimal unranked record, used by sources and tests as a starting point
    pub fn new(id: DriverId) -> Self {
        Self {
            id,
            position: 0,
            grid_position: 0,
            lap_percent: Percentage::new(0.0),
            laps_started: 0,
            laps_completed: 0,
            last_lap_time: None,
            fastest_lap_time: None,
            gap_to_leader: None,
            in_pits: false,
            on_track: true,
            incident_count: 0,
            total_distance: None,
        }
    }

    /// Laps completed plus the fraction of the current lap
    pub fn progress(&self) -> f64 {
        f64::from(self.laps_completed) + f64::from(self.lap_percent.0)
    }

    /// Whether the car carries the retirement sentinel
    pub fn is_retired(&self) -> bool {
        self.laps_completed < 0
    }
}

/// Session-level information that accompanies a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub track_name: Option<String>,

    /// Length of one lap
    pub track_length: Option<Meters>,

    /// Lap the leader is on
    pub lap: Option<u32>,

    pub total_laps: Option<u32>,
}

/// Raw per-tick output of a telemetry source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Timestamp when this snapshot was captured
    pub timestamp: DateTime<Utc>,

    /// Name of the source that produced it
    pub source: String,

    /// Green flag has dropped
    pub race_started: bool,

    pub session: Option<SessionInfo>,

    /// Unranked driver records
    pub drivers: Vec<DriverState>,

    /// Time-series numeric fields (speed trace, recent lap times, ...)
    #[serde(default)]
    pub series: BTreeMap<String, Vec<f32>>,
}

impl TelemetrySnapshot {
    pub fn new(source: impl Into<String>, race_started: bool, drivers: Vec<DriverState>) -> Self {
        Self {
            timestamp: Utc::now(),
            source: source.into(),
            race_started,
            session: None,
            drivers,
            series: BTreeMap::new(),
        }
    }
}

/// Ordered driver states for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub race_started: bool,
    pub drivers: Vec<DriverState>,
}

impl RaceSnapshot {
    pub fn new(race_started: bool, drivers: Vec<DriverState>) -> Self {
        Self {
            race_started,
            drivers,
        }
    }

    /// Look up a driver by car index
    pub fn find(&self, car_idx: u32) -> Option<&DriverState> {
        self.drivers.iter().find(|d| d.id.car_idx == car_idx)
    }

    /// Driver currently holding `position`
    pub fn at_position(&self, position: u32) -> Option<&DriverState> {
        self.drivers.iter().find(|d| d.position == position)
    }

    /// Driver in P1
    pub fn leader(&self) -> Option<&DriverState> {
        self.at_position(1)
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

/// Current and previous snapshot, owned by whoever runs detection
#[derive(Debug, Clone, Default)]
pub struct RaceState {
    pub current: RaceSnapshot,
    pub previous: RaceSnapshot,
}

impl RaceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `next` as current; the old current becomes previous
    pub fn advance(&mut self, next: RaceSnapshot) {
        self.previous = std::mem::replace(&mut self.current, next);
    }

    /// Whether there is a previous tick to diff against
    pub fn has_previous(&self) -> bool {
        !self.previous.is_empty()
    }
}
