//! Airspace partitioning and lease arbitration for cooperative UAVs.
//!
//! The managed volume is cut into a grid of cells; vehicles reserve cells
//! under time-bounded leases, enter and leave them, and operators can close
//! or restrict cells. Security-relevant transitions are reported through an
//! [`AuditSink`].

pub mod audit;
pub mod cell;
pub mod config;
pub mod engine;
pub mod error;
pub mod neighbors;
pub mod partition;
pub mod priority;
pub mod spatial;

pub use audit::{
    AuditEvent, AuditEventKind, AuditSeverity, AuditSink, FanoutAuditSink, RecordingAuditSink,
    TracingAuditSink,
};
pub use cell::{AirspaceRegion, Bounds, CellSnapshot, CellStatus, NeighborKind};
pub use config::{GridConfig, LatLon};
pub use engine::{AirspaceControlEngine, ExpiredLease, PartitionReport};
pub use error::{ControlAction, ControlError, InitError};
pub use partition::GridDims;
pub use priority::{InMemoryPriorityRegistry, PriorityRegistry};
pub use spatial::{haversine_distance, SpatialIndex};
