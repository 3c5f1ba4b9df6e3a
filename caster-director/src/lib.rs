//! IntelliCaster Director Library
//!
//! Exposes the director loop, its collaborators and the HTTP API for
//! integration testing.

pub mod api;
pub mod camera;
pub mod commentary;
pub mod config;
pub mod detector;
pub mod director;
pub mod manager;
pub mod state;
pub mod store;

pub use config::DirectorConfig;
pub use director::{Director, DirectorControl, DirectorHandle, DirectorState, TickOutcome};
pub use state::AppState;
