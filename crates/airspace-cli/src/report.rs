//! Per-cell summaries for inspecting a built grid.

use airspace_core::spatial::extent_m;
use airspace_core::{AirspaceControlEngine, Bounds, CellStatus, NeighborKind};
use serde::Serialize;

/// One cell as printed by `airspace grid`.
#[derive(Debug, Clone, Serialize)]
pub struct CellReport {
    pub cell_id: String,
    pub sequence: u64,
    pub status: CellStatus,
    pub bounds: Bounds,
    /// East-west width, north-south depth and height in meters
    pub extent_m: (f64, f64, f64),
    pub lateral_neighbors: usize,
    pub upper_neighbors: usize,
    pub lower_neighbors: usize,
}

/// Summaries for every cell, in registration order.
pub fn grid_report(engine: &AirspaceControlEngine) -> Vec<CellReport> {
    let index = engine.index();
    index
        .ids()
        .iter()
        .filter_map(|id| {
            let cell = index.get(id)?;
            Some(CellReport {
                cell_id: id.clone(),
                sequence: cell.sequence(),
                status: cell.status(),
                bounds: *cell.bounds(),
                extent_m: extent_m(cell.bounds()),
                lateral_neighbors: cell.neighbors(NeighborKind::Lateral).len(),
                upper_neighbors: cell.neighbors(NeighborKind::Upper).len(),
                lower_neighbors: cell.neighbors(NeighborKind::Lower).len(),
            })
        })
        .collect()
}
