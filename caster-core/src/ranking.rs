//! Ranking engine
//!
//! Turns a source's unranked driver list into a `RaceSnapshot` with
//! contiguous positions 1..N.
//!
//! - Race started: descending `laps_completed + lap_percent`. Ties keep the
//!   order of the previous tick so two cars side by side do not swap
//!   positions every tick.
//! - Before the start: ascending grid slot. Cars without a grid slot (0) go
//!   to the back in the order they were reported.

use crate::model::{DriverState, RaceSnapshot};

/// Rank `drivers` and assign `position = index + 1`
pub fn rank(
    mut drivers: Vec<DriverState>,
    race_started: bool,
    previous: Option<&RaceSnapshot>,
) -> RaceSnapshot {
    if race_started {
        if let Some(previous) = previous {
            // Seed the prior ordering; unseen cars keep input order at the back
            drivers.sort_by_key(|d| {
                previous
                    .find(d.id.car_idx)
                    .map(|p| p.position)
                    .filter(|&p| p > 0)
                    .unwrap_or(u32::MAX)
            });
        }
        drivers.sort_by(|a, b| b.progress().total_cmp(&a.progress()));
    } else {
        drivers.sort_by_key(|d| (d.grid_position == 0, d.grid_position));
    }

    for (i, driver) in drivers.iter_mut().enumerate() {
        driver.position = u32::try_from(i + 1).unwrap_or(u32::MAX);
    }

    RaceSnapshot::new(race_started, drivers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DriverId;
    use crate::units::Percentage;
    use std::collections::HashSet;

    fn car(car_idx: u32, laps: i32, pct: f32, grid: u32) -> DriverState {
        let mut d = DriverState::new(DriverId::new(car_idx, format!("Driver {car_idx}"), ""));
        d.laps_completed = laps;
        d.lap_percent = Percentage::new(pct);
        d.grid_position = grid;
        d
    }

    fn order(snapshot: &RaceSnapshot) -> Vec<u32> {
        snapshot.drivers.iter().map(|d| d.id.car_idx).collect()
    }

    #[test]
    fn test_started_race_orders_by_descending_progress() {
        let drivers = vec![
            car(1, 2, 0.10, 1),
            car(2, 3, 0.05, 2),
            car(3, 2, 0.90, 3),
            car(4, -1, 0.50, 4),
        ];
        let ranked = rank(drivers, true, None);

        assert_eq!(order(&ranked), vec![2, 3, 1, 4]);
        let positions: Vec<u32> = ranked.drivers.iter().map(|d| d.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_positions_are_a_permutation() {
        let drivers: Vec<DriverState> = (0..20)
            .map(|i| car(i, (i % 4) as i32, (i as f32 * 0.37) % 1.0, i + 1))
            .collect();
        let ranked = rank(drivers, true, None);

        let positions: HashSet<u32> = ranked.drivers.iter().map(|d| d.position).collect();
        assert_eq!(positions, (1..=20).collect::<HashSet<u32>>());
        for pair in ranked.drivers.windows(2) {
            assert!(pair[0].progress() >= pair[1].progress());
        }
    }

    #[test]
    fn test_ties_keep_previous_order() {
        let previous = rank(vec![car(5, 1, 0.5, 1), car(6, 1, 0.4, 2)], true, None);
        assert_eq!(order(&previous), vec![5, 6]);

        // Dead heat, reported in the opposite order
        let ranked = rank(vec![car(6, 1, 0.6, 2), car(5, 1, 0.6, 1)], true, Some(&previous));
        assert_eq!(order(&ranked), vec![5, 6]);
    }

    #[test]
    fn test_ties_without_previous_keep_input_order() {
        let ranked = rank(vec![car(9, 1, 0.5, 2), car(8, 1, 0.5, 1)], true, None);
        assert_eq!(order(&ranked), vec![9, 8]);
    }

    #[test]
    fn test_pre_race_orders_by_grid() {
        let drivers = vec![car(1, 0, 0.9, 3), car(2, 0, 0.1, 1), car(3, 0, 0.5, 0), car(4, 0, 0.2, 2)];
        let ranked = rank(drivers, false, None);
        assert_eq!(order(&ranked), vec![2, 4, 1, 3]);
        assert_eq!(ranked.leader().map(|d| d.id.car_idx), Some(2));
    }

    #[test]
    fn test_empty_field() {
        let ranked = rank(Vec::new(), true, None);
        assert!(ranked.is_empty());
    }
}
