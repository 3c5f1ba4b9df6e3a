//! Overtake and stall detection
//!
//! Both detectors diff the current snapshot against the previous one held in
//! a `RaceState`. A driver missing from the previous snapshot, or missing a
//! field a detector needs, is skipped without affecting the rest of the field.

use crate::events::{DetectedEvent, EventKind};
use crate::model::{DriverState, RaceState};
use tracing::debug;

/// Default minimum distance a car must cover per tick to count as moving
pub const DEFAULT_STALL_THRESHOLD: f32 = 1.0;

/// Detector tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    pub stall_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            stall_threshold: DEFAULT_STALL_THRESHOLD,
        }
    }
}

/// Overtakes first, then stalls, in snapshot order
pub fn detect_all(state: &RaceState, settings: &DetectorSettings) -> Vec<DetectedEvent> {
    let mut batch: Vec<DetectedEvent> = detect_overtake(state).into_iter().collect();
    batch.extend(detect_stalls(state, settings.stall_threshold));
    batch
}

/// Find the first legitimate overtake in the current snapshot
///
/// At most one overtake is reported per tick; the scan stops at the first
/// driver that gained a position on a car that is neither pitting nor
/// retired.
pub fn detect_overtake(state: &RaceState) -> Option<DetectedEvent> {
    let current = &state.current;
    let previous = &state.previous;

    for driver in &current.drivers {
        let Some(before) = previous.find(driver.id.car_idx) else {
            continue;
        };
        if driver.position >= before.position {
            continue;
        }

        let Some(overtaken) = current.at_position(driver.position + 1) else {
            debug!(
                car_idx = driver.id.car_idx,
                position = driver.position,
                "no car behind the overtaking driver"
            );
            continue;
        };

        if !is_legitimate(driver, overtaken) {
            debug!(
                "{} passed {} for P{} but pit lane or retired car involved",
                driver.id.name, overtaken.id.name, driver.position
            );
            continue;
        }

        let description = format!(
            "{} overtook {} for P{}",
            driver.id.display_name(),
            overtaken.id.display_name(),
            driver.position
        );
        return Some(
            DetectedEvent::new(EventKind::Overtake, description)
                .with_focus(driver.id.clone())
                .with_lap_percent(driver.lap_percent),
        );
    }

    None
}

fn is_legitimate(driver: &DriverState, overtaken: &DriverState) -> bool {
    !(driver.in_pits || overtaken.in_pits || driver.is_retired() || overtaken.is_retired())
}

/// Report every driver whose total distance advanced less than `threshold`
pub fn detect_stalls(state: &RaceState, threshold: f32) -> Vec<DetectedEvent> {
    let mut events = Vec::new();

    for driver in &state.current.drivers {
        let Some(before) = state.previous.find(driver.id.car_idx) else {
            continue;
        };
        let (Some(now), Some(then)) = (driver.total_distance, before.total_distance) else {
            debug!(car_idx = driver.id.car_idx, "no distance reading, skipping stall check");
            continue;
        };

        if now.since(then) < threshold {
            let description = format!(
                "{} shows minimal progress in distance, possibly stopped.",
                driver.id.display_name()
            );
            events.push(
                DetectedEvent::new(EventKind::Stopped, description)
                    .with_focus(driver.id.clone())
                    .with_lap_percent(driver.lap_percent),
            );
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DriverId, RaceSnapshot};
    use crate::units::{Meters, Percentage};

    fn driver(car_idx: u32, name: &str, position: u32) -> DriverState {
        let mut d = DriverState::new(DriverId::new(car_idx, name, car_idx.to_string()));
        d.position = position;
        d.laps_completed = 3;
        d
    }

    fn at(mut d: DriverState, distance: f32) -> DriverState {
        d.total_distance = Some(Meters(distance));
        d
    }

    fn state(previous: Vec<DriverState>, current: Vec<DriverState>) -> RaceState {
        let mut state = RaceState::new();
        state.advance(RaceSnapshot::new(true, previous));
        state.advance(RaceSnapshot::new(true, current));
        state
    }

    #[test]
    fn test_simple_overtake() {
        let state = state(
            vec![driver(0, "A", 2), driver(1, "B", 1)],
            vec![driver(0, "A", 1), driver(1, "B", 2)],
        );
        let event = detect_overtake(&state).unwrap();
        assert_eq!(event.kind, EventKind::Overtake);
        assert_eq!(event.description, "A overtook B for P1");
        assert_eq!(event.focus.map(|f| f.car_idx), Some(0));
    }

    #[test]
    fn test_overtake_strips_car_numbers_from_names() {
        let state = state(
            vec![driver(0, "Anna Berg7", 3), driver(1, "Carl 12 Dahl", 2)],
            vec![driver(0, "Anna Berg7", 2), driver(1, "Carl 12 Dahl", 3)],
        );
        let event = detect_overtake(&state).unwrap();
        assert_eq!(event.description, "Anna Berg overtook Carl Dahl for P2");
    }

    #[test]
    fn test_overtake_suppressed_when_overtaker_in_pits() {
        let mut a = driver(0, "A", 1);
        a.in_pits = true;
        let state = state(vec![driver(0, "A", 2), driver(1, "B", 1)], vec![a, driver(1, "B", 2)]);
        assert!(detect_overtake(&state).is_none());
    }

    #[test]
    fn test_overtake_suppressed_when_overtaken_in_pits() {
        let mut b = driver(1, "B", 2);
        b.in_pits = true;
        let state = state(vec![driver(0, "A", 2), driver(1, "B", 1)], vec![driver(0, "A", 1), b]);
        assert!(detect_overtake(&state).is_none());
    }

    #[test]
    fn test_overtake_suppressed_for_retired_car() {
        let mut b = driver(1, "B", 2);
        b.laps_completed = -1;
        let state = state(vec![driver(0, "A", 2), driver(1, "B", 1)], vec![driver(0, "A", 1), b]);
        assert!(detect_overtake(&state).is_none());
    }

    #[test]
    fn test_no_overtake_without_previous_snapshot() {
        let mut state = RaceState::new();
        state.advance(RaceSnapshot::new(true, vec![driver(0, "A", 1), driver(1, "B", 2)]));
        assert!(detect_overtake(&state).is_none());
    }

    #[test]
    fn test_unknown_driver_is_skipped() {
        let state = state(
            vec![driver(1, "B", 1)],
            vec![driver(0, "A", 1), driver(1, "B", 2)],
        );
        assert!(detect_overtake(&state).is_none());
    }

    #[test]
    fn test_missing_car_behind_is_skipped() {
        // A improved but nobody is behind it
        let state = state(vec![driver(0, "A", 2)], vec![driver(0, "A", 1)]);
        assert!(detect_overtake(&state).is_none());
    }

    #[test]
    fn test_only_first_overtake_per_tick() {
        let state = state(
            vec![driver(0, "A", 2), driver(1, "B", 1), driver(2, "C", 4), driver(3, "D", 3)],
            vec![driver(0, "A", 1), driver(1, "B", 2), driver(2, "C", 3), driver(3, "D", 4)],
        );
        let batch = detect_all(&state, &DetectorSettings::default());
        let overtakes: Vec<_> = batch.iter().filter(|e| e.kind == EventKind::Overtake).collect();
        assert_eq!(overtakes.len(), 1);
        assert_eq!(overtakes[0].description, "A overtook B for P1");
    }

    #[test]
    fn test_illegitimate_first_overtake_does_not_hide_later_one() {
        let mut a = driver(0, "A", 1);
        a.in_pits = true;
        let state = state(
            vec![driver(0, "A", 2), driver(1, "B", 1), driver(2, "C", 4), driver(3, "D", 3)],
            vec![a, driver(1, "B", 2), driver(2, "C", 3), driver(3, "D", 4)],
        );
        let event = detect_overtake(&state).unwrap();
        assert_eq!(event.description, "C overtook D for P3");
    }

    #[test]
    fn test_stall_below_threshold() {
        let state = state(vec![at(driver(0, "A", 1), 500.0)], vec![at(driver(0, "A", 1), 500.5)]);
        let events = detect_stalls(&state, 1.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Stopped);
        assert_eq!(
            events[0].description,
            "A shows minimal progress in distance, possibly stopped."
        );
    }

    #[test]
    fn test_no_stall_at_or_above_threshold() {
        let state = state(
            vec![at(driver(0, "A", 1), 500.0), at(driver(1, "B", 2), 400.0)],
            vec![at(driver(0, "A", 1), 501.0), at(driver(1, "B", 2), 450.0)],
        );
        assert!(detect_stalls(&state, 1.0).is_empty());
    }

    #[test]
    fn test_stall_checks_every_driver() {
        let state = state(
            vec![at(driver(0, "A", 1), 500.0), at(driver(1, "B", 2), 400.0)],
            vec![at(driver(0, "A", 1), 500.0), at(driver(1, "B", 2), 400.2)],
        );
        assert_eq!(detect_stalls(&state, 1.0).len(), 2);
    }

    #[test]
    fn test_stall_skips_missing_distance() {
        let state = state(vec![driver(0, "A", 1)], vec![at(driver(0, "A", 1), 10.0)]);
        assert!(detect_stalls(&state, 1.0).is_empty());
    }

    #[test]
    fn test_stall_carries_lap_percent() {
        let mut now = at(driver(0, "A", 1), 100.0);
        now.lap_percent = Percentage::new(0.4);
        let state = state(vec![at(driver(0, "A", 1), 100.0)], vec![now]);
        let events = detect_stalls(&state, DEFAULT_STALL_THRESHOLD);
        assert_eq!(events[0].lap_percent, Some(Percentage::new(0.4)));
    }
}
