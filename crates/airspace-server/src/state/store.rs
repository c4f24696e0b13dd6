//! In-memory state store wrapping the control engine.

use airspace_core::AirspaceControlEngine;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Application state - the engine plus loop liveness.
pub struct AppState {
    engine: AirspaceControlEngine,
    loop_heartbeats: DashMap<&'static str, DateTime<Utc>>,
}

impl AppState {
    pub fn new(engine: AirspaceControlEngine) -> Self {
        Self {
            engine,
            loop_heartbeats: DashMap::new(),
        }
    }

    pub fn engine(&self) -> &AirspaceControlEngine {
        &self.engine
    }

    /// Record that a background loop is still ticking.
    pub fn mark_loop_heartbeat(&self, name: &'static str) {
        self.loop_heartbeats.insert(name, Utc::now());
    }

    pub fn last_heartbeat(&self, name: &str) -> Option<DateTime<Utc>> {
        self.loop_heartbeats.get(name).map(|entry| *entry.value())
    }
}
