//! The reference scenario: a 2x2x1 grid over the unit square and two
//! vehicles contending for the cell at its center.

use std::sync::Arc;

use airspace_core::{
    AirspaceControlEngine, AuditEvent, CellStatus, ControlError, GridConfig,
    InMemoryPriorityRegistry, LatLon, RecordingAuditSink,
};
use anyhow::{Context, Result};
use serde::Serialize;

/// Outcome of one engine call.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioStep {
    pub action: String,
    pub vehicle_id: Option<String>,
    pub accepted: bool,
    /// Reason code when the call was refused
    pub code: Option<&'static str>,
    /// Cell status after the call
    pub status: CellStatus,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioRun {
    pub cell_id: String,
    pub cell_count: usize,
    pub steps: Vec<ScenarioStep>,
    pub audit: Vec<AuditEvent>,
}

pub fn reference_config(lease_ms: u64) -> GridConfig {
    GridConfig {
        boundary_corners: [
            LatLon::new(1.0, 0.0),
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, 1.0),
            LatLon::new(1.0, 1.0),
        ],
        min_altitude: 0.0,
        max_altitude: 10.0,
        altitude_partitions: 1,
        longitude_partitions: 2,
        latitude_partitions: 2,
        lease_duration_ms: lease_ms,
        ..GridConfig::default()
    }
}

/// Walk the center cell through reservation, contention, occupancy,
/// restriction and closure.
pub fn run_reference_scenario(lease_ms: u64) -> Result<ScenarioRun> {
    let sink = Arc::new(RecordingAuditSink::new());
    let engine = AirspaceControlEngine::with_collaborators(
        reference_config(lease_ms),
        Arc::new(InMemoryPriorityRegistry::new(0)),
        sink.clone(),
    )
    .context("failed to build reference grid")?;

    let cell = engine
        .resolve_cell(0.5, 0.5, 5.0)
        .context("center point did not resolve")?;

    let mut steps = Vec::new();
    let mut record = |action: &str,
                      vehicle: Option<&str>,
                      result: Result<(), ControlError>|
     -> Result<(), ControlError> {
        let snapshot = engine.query(&cell)?;
        steps.push(ScenarioStep {
            action: action.to_string(),
            vehicle_id: vehicle.map(str::to_string),
            accepted: result.is_ok(),
            code: result.err().map(|err| err.code()),
            status: snapshot.status,
            owner: snapshot.owner,
        });
        Ok(())
    };

    record("reserve", Some("drone-A"), engine.reserve("drone-A", &cell).map(drop))?;
    record("reserve", Some("drone-B"), engine.reserve("drone-B", &cell).map(drop))?;
    record("enter", Some("drone-A"), engine.add_occupant("drone-A", &cell).map(drop))?;
    record("enter", Some("drone-B"), engine.add_occupant("drone-B", &cell).map(drop))?;
    record("renew", Some("drone-A"), engine.renew("drone-A", &cell).map(drop))?;
    record("exit", Some("drone-A"), engine.remove_occupant("drone-A", &cell).map(drop))?;
    record("mark_restricted", None, engine.mark_restricted(&cell).map(drop))?;
    record("reserve", Some("drone-B"), engine.reserve("drone-B", &cell).map(drop))?;
    record("revoke", None, engine.revoke(&cell))?;
    record("mark_no_fly", None, engine.mark_no_fly(&cell).map(drop))?;
    record("reserve", Some("drone-A"), engine.reserve("drone-A", &cell).map(drop))?;

    Ok(ScenarioRun {
        cell_id: cell,
        cell_count: engine.cell_count(),
        steps,
        audit: sink.events(),
    })
}
