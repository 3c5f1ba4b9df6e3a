//! Detected race events and the shared event queue
//!
//! The queue is written by the detection loop and read by the broadcast side
//! (`get_next`), possibly from another thread, so all access goes through an
//! internal lock. Reads are destructive: every event is handed out at most
//! once. Events that nobody consumed are evicted once they are older than
//! the configured horizon.

use crate::model::DriverId;
use crate::units::Percentage;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Kind of race event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Overtake,
    Stopped,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Overtake => "overtake",
            EventKind::Stopped => "stopped",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event as emitted by a detector, before the queue stamps it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEvent {
    pub kind: EventKind,
    pub description: String,
    pub focus: Option<DriverId>,
    pub lap_percent: Option<Percentage>,
}

impl DetectedEvent {
    pub fn new(kind: EventKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            focus: None,
            lap_percent: None,
        }
    }

    pub fn with_focus(mut self, focus: DriverId) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn with_lap_percent(mut self, lap_percent: Percentage) -> Self {
        self.lap_percent = Some(lap_percent);
        self
    }
}

/// Event stored in the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub kind: EventKind,
    pub description: String,
    pub focus: Option<DriverId>,
    pub lap_percent: Option<Percentage>,
    pub timestamp: DateTime<Utc>,
}

/// Keep only the first occurrence of each description in a batch
pub fn dedupe(batch: Vec<DetectedEvent>) -> Vec<DetectedEvent> {
    let mut seen = HashSet::new();
    batch
        .into_iter()
        .filter(|e| seen.insert(e.description.clone()))
        .collect()
}

#[derive(Debug, Default)]
struct QueueInner {
    events: Vec<Event>,
    next_id: u64,
}

impl QueueInner {
    fn push(&mut self, detected: DetectedEvent, timestamp: DateTime<Utc>) -> Event {
        let event = Event {
            id: self.next_id,
            kind: detected.kind,
            description: detected.description,
            focus: detected.focus,
            lap_percent: detected.lap_percent,
            timestamp,
        };
        self.next_id += 1;
        self.events.push(event.clone());
        event
    }
}

/// Time-ordered, auto-expiring store of detected events
#[derive(Debug, Default)]
pub struct EventQueue {
    inner: Mutex<QueueInner>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event stamped with the current wall-clock time
    pub fn add(
        &self,
        kind: EventKind,
        description: impl Into<String>,
        focus: Option<DriverId>,
        lap_percent: Option<Percentage>,
    ) -> Event {
        self.add_at(kind, description, focus, lap_percent, Utc::now())
    }

    /// Append an event with an explicit timestamp
    pub fn add_at(
        &self,
        kind: EventKind,
        description: impl Into<String>,
        focus: Option<DriverId>,
        lap_percent: Option<Percentage>,
        timestamp: DateTime<Utc>,
    ) -> Event {
        let detected = DetectedEvent {
            kind,
            description: description.into(),
            focus,
            lap_percent,
        };
        self.inner.lock().push(detected, timestamp)
    }

    /// Dedupe a detection batch and append what remains, in batch order
    ///
    /// Returns the stored events.
    pub fn insert_batch(&self, batch: Vec<DetectedEvent>) -> Vec<Event> {
        let now = Utc::now();
        let batch = dedupe(batch);
        let mut inner = self.inner.lock();
        batch.into_iter().map(|e| inner.push(e, now)).collect()
    }

    /// Remove and return the most recently created live event
    pub fn get_next(&self) -> Option<Event> {
        let mut inner = self.inner.lock();
        let idx = inner
            .events
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| (e.timestamp, e.id))
            .map(|(i, _)| i)?;
        Some(inner.events.remove(idx))
    }

    /// Evict every event older than `horizon`; returns how many were removed
    pub fn expire(&self, horizon: Duration) -> usize {
        self.expire_at(Utc::now(), horizon)
    }

    /// Evict relative to an explicit clock value
    pub fn expire_at(&self, now: DateTime<Utc>, horizon: Duration) -> usize {
        let horizon = TimeDelta::from_std(horizon).unwrap_or(TimeDelta::MAX);
        let mut inner = self.inner.lock();
        let before = inner.events.len();
        inner.events.retain(|e| now.signed_duration_since(e.timestamp) <= horizon);
        before - inner.events.len()
    }

    /// Live events, newest first, without consuming them
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events = self.inner.lock().events.clone();
        events.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        events
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn overtake(desc: &str) -> DetectedEvent {
        DetectedEvent::new(EventKind::Overtake, desc)
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let batch = vec![
            overtake("A overtook B for P1").with_lap_percent(Percentage::new(0.1)),
            DetectedEvent::new(EventKind::Stopped, "C shows minimal progress"),
            overtake("A overtook B for P1").with_lap_percent(Percentage::new(0.9)),
        ];
        let unique = dedupe(batch);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].lap_percent, Some(Percentage::new(0.1)));
        assert_eq!(unique[1].kind, EventKind::Stopped);
    }

    #[test]
    fn test_insert_batch_collapses_duplicate_descriptions() {
        let queue = EventQueue::new();
        let stored = queue.insert_batch(vec![overtake("same"), overtake("same")]);
        assert_eq!(stored.len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_duplicates_across_batches_are_kept() {
        let queue = EventQueue::new();
        queue.insert_batch(vec![overtake("same")]);
        queue.insert_batch(vec![overtake("same")]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_ids_increase() {
        let queue = EventQueue::new();
        let a = queue.add(EventKind::Overtake, "a", None, None);
        let b = queue.add(EventKind::Stopped, "b", None, None);
        assert!(b.id > a.id);
    }

    #[test]
    fn test_get_next_on_empty_queue() {
        let queue = EventQueue::new();
        assert!(queue.get_next().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_get_next_returns_newest_and_removes_it() {
        let queue = EventQueue::new();
        let now = Utc::now();
        queue.add_at(EventKind::Overtake, "old", None, None, now - TimeDelta::seconds(5));
        queue.add_at(EventKind::Overtake, "new", None, None, now);
        queue.add_at(EventKind::Stopped, "middle", None, None, now - TimeDelta::seconds(2));

        let first = queue.get_next().unwrap();
        assert_eq!(first.description, "new");
        let second = queue.get_next().unwrap();
        assert_eq!(second.description, "middle");
        let third = queue.get_next().unwrap();
        assert_eq!(third.description, "old");
        assert!(queue.get_next().is_none());

        let ids: HashSet<u64> = [first.id, second.id, third.id].into_iter().collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_get_next_breaks_timestamp_ties_by_id() {
        let queue = EventQueue::new();
        let now = Utc::now();
        queue.add_at(EventKind::Overtake, "first", None, None, now);
        queue.add_at(EventKind::Overtake, "second", None, None, now);
        assert_eq!(queue.get_next().unwrap().description, "second");
    }

    #[test]
    fn test_expire_removes_events_older_than_horizon() {
        let queue = EventQueue::new();
        let now = Utc::now();
        queue.add_at(EventKind::Stopped, "stale", None, None, now - TimeDelta::seconds(31));
        queue.add_at(EventKind::Stopped, "fresh", None, None, now - TimeDelta::seconds(10));

        let removed = queue.expire_at(now, Duration::from_secs(30));
        assert_eq!(removed, 1);
        let live = queue.snapshot();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].description, "fresh");
    }

    #[test]
    fn test_expire_ignores_consumption_state() {
        let queue = EventQueue::new();
        let now = Utc::now();
        queue.add_at(EventKind::Stopped, "a", None, None, now - TimeDelta::seconds(60));
        queue.add_at(EventKind::Stopped, "b", None, None, now - TimeDelta::seconds(61));
        assert_eq!(queue.expire_at(now, Duration::from_secs(30)), 2);
        assert!(queue.get_next().is_none());
    }

    #[test]
    fn test_snapshot_does_not_consume() {
        let queue = EventQueue::new();
        queue.add(EventKind::Overtake, "a", None, None);
        assert_eq!(queue.snapshot().len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_concurrent_consumers_never_share_an_event() {
        let queue = Arc::new(EventQueue::new());
        for i in 0..200 {
            queue.add(EventKind::Overtake, format!("event {i}"), None, None);
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let mut ids = Vec::new();
                    while let Some(event) = queue.get_next() {
                        ids.push(event.id);
                    }
                    ids
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        let unique: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique.len(), 200);
    }
}
