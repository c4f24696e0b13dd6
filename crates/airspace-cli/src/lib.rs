//! Airspace CLI - command line tools for the airspace control engine.
//!
//! - `airspace grid`: build a grid from flags and dump its cells as JSON
//! - `airspace scenario`: run the 2x2x1 reference scenario end-to-end

pub mod report;
pub mod scenario;

pub use report::{grid_report, CellReport};
pub use scenario::{run_reference_scenario, ScenarioRun, ScenarioStep};
