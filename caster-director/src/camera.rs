//! Camera selection

use caster_core::{events::Event, CameraSelector, DispatchError, RaceSnapshot};
use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

/// Car to put on screen: whoever the first event is about, else the leader
pub fn choose_focus(events: &[Event], snapshot: &RaceSnapshot) -> Option<u32> {
    events
        .iter()
        .find_map(|e| e.focus.as_ref().map(|f| f.car_idx))
        .or_else(|| snapshot.leader().map(|d| d.id.car_idx))
}

/// Random camera group in `0..count`
pub fn choose_camera<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Option<usize> {
    (count > 0).then(|| rng.random_range(0..count))
}

/// Selector that only records the switch; used when no sim camera control
/// is available
#[derive(Debug, Default)]
pub struct LoggingCamera {
    cameras: usize,
    current: Mutex<Option<(usize, u32)>>,
}

impl LoggingCamera {
    pub fn new(cameras: usize) -> Self {
        Self {
            cameras,
            current: Mutex::new(None),
        }
    }

    /// Last (camera, car) switched to
    pub fn current(&self) -> Option<(usize, u32)> {
        *self.current.lock()
    }
}

impl CameraSelector for LoggingCamera {
    fn camera_count(&self) -> usize {
        self.cameras
    }

    fn switch(&self, camera_index: usize, focus_car_index: u32) -> Result<(), DispatchError> {
        if camera_index >= self.cameras {
            return Err(DispatchError::Failed {
                service: "camera",
                reason: format!("camera {} out of range (have {})", camera_index, self.cameras),
            });
        }
        let mut current = self.current.lock();
        if *current != Some((camera_index, focus_car_index)) {
            debug!(camera = camera_index, car = focus_car_index, "Switching camera");
        }
        *current = Some((camera_index, focus_car_index));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caster_core::{DriverId, DriverState, EventKind};
    use chrono::Utc;

    fn snapshot() -> RaceSnapshot {
        let mut leader = DriverState::new(DriverId::new(4, "Leader", "4"));
        leader.position = 1;
        let mut second = DriverState::new(DriverId::new(9, "Second", "9"));
        second.position = 2;
        RaceSnapshot::new(true, vec![leader, second])
    }

    #[test]
    fn test_focus_follows_event() {
        let event = Event {
            id: 1,
            kind: EventKind::Overtake,
            description: "Second overtook Third for P2".to_string(),
            focus: Some(DriverId::new(9, "Second", "9")),
            lap_percent: None,
            timestamp: Utc::now(),
        };
        assert_eq!(choose_focus(&[event], &snapshot()), Some(9));
    }

    #[test]
    fn test_focus_defaults_to_leader() {
        assert_eq!(choose_focus(&[], &snapshot()), Some(4));
        assert_eq!(choose_focus(&[], &RaceSnapshot::default()), None);
    }

    #[test]
    fn test_choose_camera_in_range() {
        let mut rng = rand::rng();
        assert_eq!(choose_camera(0, &mut rng), None);
        for _ in 0..100 {
            let cam = choose_camera(5, &mut rng).unwrap();
            assert!(cam < 5);
        }
    }

    #[test]
    fn test_logging_camera_rejects_bad_index() {
        let camera = LoggingCamera::new(3);
        assert!(camera.switch(3, 0).is_err());
        assert!(camera.current().is_none());
        camera.switch(2, 7).unwrap();
        assert_eq!(camera.current(), Some((2, 7)));
    }
}
