//! Persistence for raw telemetry, detected events and settings
//!
//! `JsonlStore` appends one JSON record per line (NDJSON) to
//! `telemetry.jsonl` and `events.jsonl` and keeps settings in
//! `settings.json`. `MemoryStore` keeps everything in process.

use caster_core::{RaceStore, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One persisted telemetry snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// One persisted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    pub event_type: String,
    pub description: String,
    pub driver: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Default data directory (`<data dir>/intellicaster`)
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("intellicaster")
}

// === In-memory store ===

#[derive(Debug, Default)]
struct TelemetryLog {
    records: VecDeque<TelemetryRecord>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    telemetry: Mutex<TelemetryLog>,
    /// Keep at most this many telemetry records, oldest dropped first
    telemetry_limit: Option<usize>,
    events: Mutex<Vec<EventRecord>>,
    settings: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that only retains the most recent `limit` telemetry records
    pub fn with_telemetry_limit(limit: usize) -> Self {
        Self {
            telemetry_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn telemetry_records(&self) -> Vec<TelemetryRecord> {
        self.telemetry.lock().records.iter().cloned().collect()
    }

    pub fn event_records(&self) -> Vec<EventRecord> {
        self.events.lock().clone()
    }
}

impl RaceStore for MemoryStore {
    fn insert_telemetry(
        &self,
        timestamp: DateTime<Utc>,
        raw_snapshot: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut telemetry = self.telemetry.lock();
        telemetry.next_id += 1;
        let id = telemetry.next_id;
        telemetry.records.push_back(TelemetryRecord {
            id,
            timestamp,
            data: raw_snapshot.clone(),
        });
        if let Some(limit) = self.telemetry_limit {
            while telemetry.records.len() > limit {
                telemetry.records.pop_front();
            }
        }
        Ok(())
    }

    fn insert_event(
        &self,
        kind: &str,
        description: &str,
        focus: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut events = self.events.lock();
        let id = events.len() as u64 + 1;
        events.push(EventRecord {
            id,
            event_type: kind.to_string(),
            description: description.to_string(),
            driver: focus.map(str::to_string),
            timestamp,
        });
        Ok(())
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.settings.lock().get(key).cloned())
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.settings.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// === NDJSON file store ===

/// Append-only NDJSON file with an autoincrement id
struct Table {
    file: File,
    next_id: u64,
}

impl Table {
    fn open(path: &Path) -> Result<Self, StoreError> {
        // Resume numbering after existing records
        let existing = match File::open(path) {
            Ok(f) => BufReader::new(f).lines().map_while(Result::ok).count() as u64,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            next_id: existing + 1,
        })
    }

    fn append<T: Serialize>(&mut self, make: impl FnOnce(u64) -> T) -> Result<(), StoreError> {
        let record = make(self.next_id);
        let json = serde_json::to_string(&record)?;
        writeln!(self.file, "{}", json)?;
        self.next_id += 1;
        Ok(())
    }
}

pub struct JsonlStore {
    dir: PathBuf,
    telemetry: Mutex<Table>,
    events: Mutex<Table>,
    settings: Mutex<BTreeMap<String, String>>,
}

impl JsonlStore {
    /// Open (or create) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let settings = match std::fs::read_to_string(dir.join("settings.json")) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            telemetry: Mutex::new(Table::open(&dir.join("telemetry.jsonl"))?),
            events: Mutex::new(Table::open(&dir.join("events.jsonl"))?),
            settings: Mutex::new(settings),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read back every persisted event
    pub fn read_events(&self) -> Result<Vec<EventRecord>, StoreError> {
        let file = File::open(self.dir.join("events.jsonl"))?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

impl RaceStore for JsonlStore {
    fn insert_telemetry(
        &self,
        timestamp: DateTime<Utc>,
        raw_snapshot: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.telemetry.lock().append(|id| TelemetryRecord {
            id,
            timestamp,
            data: raw_snapshot.clone(),
        })
    }

    fn insert_event(
        &self,
        kind: &str,
        description: &str,
        focus: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.events.lock().append(|id| EventRecord {
            id,
            event_type: kind.to_string(),
            description: description.to_string(),
            driver: focus.map(str::to_string),
            timestamp,
        })
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.settings.lock().get(key).cloned())
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut settings = self.settings.lock();
        settings.insert(key.to_string(), value.to_string());
        let json = serde_json::to_string_pretty(&*settings)?;
        std::fs::write(self.dir.join("settings.json"), json)?;
        Ok(())
    }
}
