//! iRacing source using the iracing.rs library
//!
//! Reads the per-car `CarIdx*` arrays from shared memory and turns them into
//! an unranked snapshot of the whole field. Only available on Windows.

#[cfg(target_os = "windows")]
mod windows_impl {
    use anyhow::Result;
    use caster_core::{
        model::{DriverId, DriverState, SessionInfo, TelemetrySnapshot},
        units::*,
        SourceError, TelemetrySource,
    };
    use iracing::telemetry::{Blocking, Connection, Sample as IRacingSample};
    use std::collections::HashMap;
    use std::convert::TryInto;
    use std::time::Duration;
    use tracing::{debug, warn};

    /// irsdk_SessionState: racing and later
    const SESSION_STATE_RACING: i32 = 4;

    /// irsdk_TrkLoc: car not in world
    const TRACK_SURFACE_NOT_IN_WORLD: i32 = -1;

    /// irsdk_TrkLoc: in pit stall or on pit road
    const TRACK_SURFACE_PIT_STALL: i32 = 1;
    const TRACK_SURFACE_APPROACHING_PITS: i32 = 2;

    #[derive(Debug, Clone)]
    struct RosterEntry {
        name: String,
        car_number: String,
        incidents: u32,
    }

    pub struct IRacingSource {
        connection: Option<Connection>,
        blocking: Option<Blocking>,
        roster: HashMap<u32, RosterEntry>,
        track_name: Option<String>,
        track_length: Option<Meters>,
        grid: HashMap<u32, u32>,
        /// Furthest distance seen per car
        odometer: HashMap<u32, Meters>,
        active: bool,
    }

    // SAFETY: iRacing's shared memory is thread-safe for reading.
    // The Connection and Blocking types contain raw pointers to memory-mapped files,
    // which are safe to access from multiple threads (Windows handles the synchronization).
    // We never mutate the shared state, only read from it.
    unsafe impl Send for IRacingSource {}
    unsafe impl Sync for IRacingSource {}

    impl IRacingSource {
        pub fn new() -> Self {
            Self {
                connection: None,
                blocking: None,
                roster: HashMap::new(),
                track_name: None,
                track_length: None,
                grid: HashMap::new(),
                odometer: HashMap::new(),
                active: false,
            }
        }

        /// Reload driver names and track details from the session YAML
        fn refresh_session(&mut self) {
            let Some(connection) = self.connection.as_mut() else {
                return;
            };
            match connection.session_info() {
                Ok(session) => {
                    self.roster = session
                        .drivers
                        .other_drivers
                        .iter()
                        .filter(|d| !d.user_name.is_empty())
                        .map(|d| {
                            (
                                d.index as u32,
                                RosterEntry {
                                    name: d.user_name.clone(),
                                    car_number: d.car_number.clone(),
                                    incidents: d.current_driver_incident_count.max(0) as u32,
                                },
                            )
                        })
                        .collect();
                    self.track_name = Some(session.weekend.track_display_name.clone());
                    self.track_length = parse_track_length(&session.weekend.track_length);
                    debug!(drivers = self.roster.len(), "Loaded iRacing session info");
                }
                Err(e) => warn!("Failed to read iRacing session info: {}", e),
            }
        }

        /// Convert one telemetry sample into an unranked snapshot
        fn convert_sample(&mut self, sample: &IRacingSample) -> TelemetrySnapshot {
            let get_i32 = |name: &'static str| -> Option<i32> {
                sample.get(name).ok().and_then(|v| v.try_into().ok())
            };
            let ints = |name: &'static str| -> Vec<i32> {
                sample.get(name).ok().and_then(|v| v.try_into().ok()).unwrap_or_default()
            };
            let floats = |name: &'static str| -> Vec<f32> {
                sample.get(name).ok().and_then(|v| v.try_into().ok()).unwrap_or_default()
            };
            let bools = |name: &'static str| -> Vec<bool> {
                sample.get(name).ok().and_then(|v| v.try_into().ok()).unwrap_or_default()
            };

            let positions = ints("CarIdxPosition");
            let laps_completed = ints("CarIdxLapCompleted");
            let laps_started = ints("CarIdxLap");
            let lap_pct = floats("CarIdxLapDistPct");
            let on_pit_road = bools("CarIdxOnPitRoad");
            let f2_time = floats("CarIdxF2Time");
            let last_lap = floats("CarIdxLastLapTime");
            let best_lap = floats("CarIdxBestLapTime");
            let surface = ints("CarIdxTrackSurface");

            let race_started = get_i32("SessionState")
                .map(|s| s >= SESSION_STATE_RACING)
                .unwrap_or(false);

            let mut drivers = Vec::new();
            for (i, &pos) in positions.iter().enumerate() {
                let car_idx = i as u32;
                // Position 0: empty slot or the pace car
                if pos == 0 && race_started {
                    continue;
                }
                let Some(entry) = self.roster.get(&car_idx) else {
                    continue;
                };

                let grid = *self
                    .grid
                    .entry(car_idx)
                    .or_insert_with(|| if race_started { 0 } else { pos.max(0) as u32 });

                let mut d = DriverState::new(DriverId::new(
                    car_idx,
                    entry.name.clone(),
                    entry.car_number.clone(),
                ));
                d.grid_position = grid;
                d.incident_count = entry.incidents;
                d.laps_completed = laps_completed.get(i).copied().unwrap_or(0);
                d.laps_started = laps_started.get(i).copied().unwrap_or(0);
                d.lap_percent = Percentage::new(lap_pct.get(i).copied().unwrap_or(0.0));
                d.in_pits = on_pit_road.get(i).copied().unwrap_or(false);
                d.gap_to_leader = f2_time.get(i).copied().filter(|t| *t >= 0.0).map(Seconds);
                d.last_lap_time = last_lap.get(i).copied().filter(|t| *t > 0.0).map(Seconds);
                d.fastest_lap_time = best_lap.get(i).copied().filter(|t| *t > 0.0).map(Seconds);

                let loc = surface.get(i).copied().unwrap_or(TRACK_SURFACE_NOT_IN_WORLD);
                d.on_track = loc != TRACK_SURFACE_NOT_IN_WORLD
                    && loc != TRACK_SURFACE_PIT_STALL
                    && loc != TRACK_SURFACE_APPROACHING_PITS;

                d.total_distance = self.track_length.map(|len| {
                    let derived = Meters(len.0 * d.progress().max(0.0) as f32);
                    let odometer = self.odometer.entry(car_idx).or_insert(derived);
                    *odometer = super::never_backwards(*odometer, derived);
                    *odometer
                });

                drivers.push(d);
            }

            let mut snapshot = TelemetrySnapshot::new("iRacing", race_started, drivers);
            snapshot.session = Some(SessionInfo {
                track_name: self.track_name.clone(),
                track_length: self.track_length,
                lap: get_i32("RaceLaps").map(|l| l.max(0) as u32),
                total_laps: None,
            });

            let speed: Option<f32> = sample.get("Speed").ok().and_then(|v| v.try_into().ok());
            if let Some(speed) = speed {
                snapshot.series.insert("speed".to_string(), vec![speed * 3.6]);
            }

            snapshot
        }
    }

    /// Parse the session YAML's "3.70 km" style track length
    fn parse_track_length(raw: &str) -> Option<Meters> {
        let km: f32 = raw.split_whitespace().next()?.parse().ok()?;
        Some(Meters(km * 1000.0))
    }

    impl TelemetrySource for IRacingSource {
        fn name(&self) -> &str {
            "iRacing"
        }

        fn detect(&self) -> bool {
            // Try to open the connection - if it succeeds, iRacing is running
            Connection::new().is_ok()
        }

        fn start(&mut self) -> Result<()> {
            let connection = Connection::new()?;
            let blocking = connection.blocking()?;

            self.connection = Some(connection);
            self.blocking = Some(blocking);
            self.grid.clear();
            self.odometer.clear();
            self.refresh_session();
            self.active = true;

            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.blocking = None;
            self.connection = None;
            self.roster.clear();
            self.active = false;
            Ok(())
        }

        fn read_snapshot(&mut self) -> std::result::Result<TelemetrySnapshot, SourceError> {
            if !self.active {
                return Err(SourceError::Unavailable("iRacing not connected".to_string()));
            }

            let sample = match &self.blocking {
                Some(b) => b
                    .sample(Duration::from_millis(5))
                    .map_err(|e| SourceError::Unavailable(format!("no sample: {e}")))?,
                None => return Err(SourceError::Unavailable("iRacing not connected".to_string())),
            };

            let snapshot = self.convert_sample(&sample);
            if snapshot.drivers.is_empty() {
                // Drivers joined after the roster was loaded
                self.refresh_session();
            }
            Ok(snapshot)
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }
}

/// Distance to report given the last reported one and a fresh estimate
///
/// `CarIdxLapDistPct` wraps to 0 a few samples before `CarIdxLapCompleted`
/// increments, so laps + fraction briefly drops by almost a lap at the line.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn never_backwards(
    last: caster_core::units::Meters,
    derived: caster_core::units::Meters,
) -> caster_core::units::Meters {
    if derived.0 < last.0 {
        last
    } else {
        derived
    }
}

// Re-export for Windows
#[cfg(target_os = "windows")]
pub use windows_impl::IRacingSource;

// Stub implementation for non-Windows platforms
#[cfg(not(target_os = "windows"))]
#[derive(Default)]
pub struct IRacingSource;

#[cfg(not(target_os = "windows"))]
impl IRacingSource {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(target_os = "windows"))]
impl caster_core::TelemetrySource for IRacingSource {
    fn name(&self) -> &str {
        "iRacing (Windows only)"
    }

    fn detect(&self) -> bool {
        false
    }

    fn start(&mut self) -> anyhow::Result<()> {
        anyhow::bail!("iRacing source only available on Windows")
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn read_snapshot(
        &mut self,
    ) -> Result<caster_core::TelemetrySnapshot, caster_core::SourceError> {
        Err(caster_core::SourceError::Unavailable(
            "iRacing source only available on Windows".to_string(),
        ))
    }

    fn is_active(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caster_core::units::Meters;

    #[test]
    fn test_distance_holds_across_line_crossing() {
        let track = 3700.0;
        // Lap 3 at 99.8%, then the fraction wraps before the lap count moves
        let samples = [3.998 * track, 3.0 * track + 2.0, 4.0 * track + 5.0];

        let mut reported = Vec::new();
        let mut odometer = Meters(samples[0]);
        for s in samples {
            odometer = never_backwards(odometer, Meters(s));
            reported.push(odometer.0);
        }

        assert_eq!(reported[1], reported[0]);
        assert!(reported[2] > reported[1]);
    }
}
