//! Demo source that simulates a whole field for testing
//!
//! Runs a short formation period, then a race with eight cars of nearly equal
//! pace so positions change regularly. One car makes a pit stop, one stalls
//! on track for half a minute and one retires. Simulated time advances by a
//! fixed step per read, so a given number of reads always produces the same
//! race.

use caster_core::{
    model::{DriverId, DriverState, SessionInfo, TelemetrySnapshot},
    units::*,
    SourceError, TelemetrySource,
};
use std::collections::VecDeque;

const TRACK_LENGTH: f32 = 3_700.0;
const TRACK_NAME: &str = "Demo Raceway";
const TOTAL_LAPS: u32 = 20;
const BASE_LAP_TIME: f32 = 85.0;
const FORMATION_SPEED: f32 = 15.0;
const PIT_LANE_SPEED: f32 = 18.0;
const TRACE_LEN: usize = 10;

/// Reads spent on the grid before the green flag
const FORMATION_TICKS: u64 = 5;

/// Car 5 pits at the end of this lap
const PIT_CAR: usize = 5;
const PIT_LAP: i32 = 2;

/// Car 6 stops on track for this window of race time
const STALL_CAR: usize = 6;
const STALL_WINDOW: (f32, f32) = (200.0, 230.0);

/// Car 7 retires at this race time
const RETIRE_CAR: usize = 7;
const RETIRE_AT: f32 = 300.0;

const ROSTER: [(&str, &str); 8] = [
    ("Anna Berg7", "7"),
    ("Carl Dahl12", "12"),
    ("Eva Fors", "3"),
    ("Gustav Holm", "44"),
    ("Ines Jansson", "21"),
    ("Karl Lind", "5"),
    ("Maja Nord", "88"),
    ("Olle Persson", "16"),
];

/// Simple deterministic noise from a seed
fn noise(seed: f32) -> f32 {
    let x = (seed * 12.9898 + 78.233).sin() * 43_758.547;
    x - x.floor()
}

/// Small jitter centered around 0
fn jitter(seed: f32, amplitude: f32) -> f32 {
    (noise(seed) - 0.5) * 2.0 * amplitude
}

struct SimCar {
    id: DriverId,
    grid: u32,
    lap_time: f32,
    /// Session odometer, including the formation period
    odometer: f32,
    /// Distance since the green flag
    race_distance: f32,
    lap_started_at: f32,
    last_lap: Option<f32>,
    best_lap: Option<f32>,
    in_pits: bool,
    retired: bool,
}

impl SimCar {
    fn laps_completed(&self) -> i32 {
        (self.race_distance / TRACK_LENGTH).floor() as i32
    }

    fn lap_fraction(&self) -> f32 {
        (self.race_distance % TRACK_LENGTH) / TRACK_LENGTH
    }
}

pub struct DemoSource {
    active: bool,
    tick: u64,
    step: f32,
    race_time: f32,
    cars: Vec<SimCar>,
    speed_trace: VecDeque<f32>,
    lap_times: Vec<f32>,
}

impl DemoSource {
    /// Demo with one simulated second per read
    pub fn new() -> Self {
        Self::with_step(1.0)
    }

    /// Demo with `step` simulated seconds per read
    pub fn with_step(step: f32) -> Self {
        let cars = ROSTER
            .iter()
            .enumerate()
            .map(|(i, (name, number))| SimCar {
                id: DriverId::new(i as u32, *name, *number),
                grid: i as u32 + 1,
                lap_time: BASE_LAP_TIME + i as f32 * 0.15,
                odometer: 0.0,
                race_distance: 0.0,
                lap_started_at: 0.0,
                last_lap: None,
                best_lap: None,
                in_pits: false,
                retired: false,
            })
            .collect();

        Self {
            active: false,
            tick: 0,
            step: step.max(0.01),
            race_time: 0.0,
            cars,
            speed_trace: VecDeque::with_capacity(TRACE_LEN),
            lap_times: Vec::new(),
        }
    }

    fn race_started(&self) -> bool {
        self.tick > FORMATION_TICKS
    }

    fn advance(&mut self) {
        self.tick += 1;

        if !self.race_started() {
            for car in &mut self.cars {
                car.odometer += FORMATION_SPEED * self.step;
            }
            return;
        }

        self.race_time += self.step;
        let t = self.race_time;
        let n = self.tick as f32;

        for (i, car) in self.cars.iter_mut().enumerate() {
            if i == RETIRE_CAR && t >= RETIRE_AT {
                car.retired = true;
            }
            if car.retired {
                continue;
            }

            car.in_pits = i == PIT_CAR && {
                let laps = car.laps_completed();
                let frac = car.lap_fraction();
                (laps == PIT_LAP - 1 && frac > 0.92) || (laps == PIT_LAP && frac < 0.08)
            };

            let stalled = i == STALL_CAR && (STALL_WINDOW.0..STALL_WINDOW.1).contains(&t);
            let speed = if stalled {
                0.0
            } else if car.in_pits {
                PIT_LANE_SPEED
            } else {
                TRACK_LENGTH / car.lap_time * (1.0 + jitter(n * 1.7 + i as f32 * 31.0, 0.04))
            };

            let laps_before = car.laps_completed();
            car.race_distance += speed * self.step;
            car.odometer += speed * self.step;

            if car.laps_completed() > laps_before {
                let lap = t - car.lap_started_at;
                car.lap_started_at = t;
                car.last_lap = Some(lap);
                car.best_lap = Some(car.best_lap.map_or(lap, |b| b.min(lap)));
                if i == 0 {
                    self.lap_times.push(lap);
                }
            }

            if i == 0 {
                if self.speed_trace.len() == TRACE_LEN {
                    self.speed_trace.pop_front();
                }
                self.speed_trace.push_back(speed * 3.6);
            }
        }
    }

    fn build_snapshot(&self) -> TelemetrySnapshot {
        let started = self.race_started();
        let leader_distance = self
            .cars
            .iter()
            .filter(|c| !c.retired)
            .map(|c| c.race_distance)
            .fold(0.0_f32, f32::max);
        let reference_speed = TRACK_LENGTH / BASE_LAP_TIME;

        let drivers = self
            .cars
            .iter()
            .map(|car| {
                let mut d = DriverState::new(car.id.clone());
                d.grid_position = car.grid;
                d.total_distance = Some(Meters(car.odometer));
                if started {
                    d.laps_completed = if car.retired { -1 } else { car.laps_completed() };
                    d.laps_started = car.laps_completed().max(0) + 1;
                    d.lap_percent = Percentage::new(car.lap_fraction());
                    d.last_lap_time = car.last_lap.map(Seconds);
                    d.fastest_lap_time = car.best_lap.map(Seconds);
                    d.gap_to_leader =
                        Some(Seconds((leader_distance - car.race_distance) / reference_speed));
                    d.in_pits = car.in_pits;
                    d.on_track = !car.retired && !car.in_pits;
                }
                d
            })
            .collect();

        let mut snapshot = TelemetrySnapshot::new("Demo", started, drivers);
        snapshot.session = Some(SessionInfo {
            track_name: Some(TRACK_NAME.to_string()),
            track_length: Some(Meters(TRACK_LENGTH)),
            lap: started.then(|| (leader_distance / TRACK_LENGTH) as u32 + 1),
            total_laps: Some(TOTAL_LAPS),
        });
        snapshot
            .series
            .insert("speed".to_string(), self.speed_trace.iter().copied().collect());
        snapshot
            .series
            .insert("lap_times".to_string(), self.lap_times.clone());
        snapshot
    }
}

impl Default for DemoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySource for DemoSource {
    fn name(&self) -> &str {
        "Demo"
    }

    fn detect(&self) -> bool {
        // Always available
        true
    }

    fn start(&mut self) -> anyhow::Result<()> {
        self.active = true;
        tracing::info!(cars = self.cars.len(), "Demo race started");
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.active = false;
        Ok(())
    }

    fn read_snapshot(&mut self) -> Result<TelemetrySnapshot, SourceError> {
        if !self.active {
            return Err(SourceError::Unavailable("demo source not started".to_string()));
        }
        self.advance();
        Ok(self.build_snapshot())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_is_bounded() {
        for i in 0..1000 {
            assert!(jitter(i as f32, 0.04).abs() <= 0.04);
        }
    }

    #[test]
    fn test_lap_fraction_wraps() {
        let mut car = DemoSource::new().cars.remove(0);
        car.race_distance = TRACK_LENGTH * 2.5;
        assert_eq!(car.laps_completed(), 2);
        assert!((car.lap_fraction() - 0.5).abs() < 1e-4);
    }
}
