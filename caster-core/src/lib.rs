//! IntelliCaster Core Library
//!
//! This crate provides the race data model, the ranking engine, the
//! overtake/stall detectors and the shared event queue that the director
//! loop is built on. It does no I/O of its own.

pub mod collaborators;
pub mod detect;
pub mod error;
pub mod events;
pub mod model;
pub mod ranking;
pub mod smoothing;
pub mod source;
pub mod units;

pub use collaborators::{CameraSelector, CommentaryDispatcher, RaceContext, RaceStore};
pub use error::{DispatchError, SourceError, StoreError};
pub use events::{DetectedEvent, Event, EventKind, EventQueue};
pub use model::{DriverId, DriverState, RaceSnapshot, RaceState, TelemetrySnapshot};
pub use source::TelemetrySource;
