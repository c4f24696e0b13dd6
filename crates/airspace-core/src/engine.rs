//! Lease & arbitration engine.
//!
//! Owns the cell index, the vehicle→region map and the collaborators
//! (priority registry, audit sink). Every mutating operation runs under the
//! write guard of the one cell it touches; reads copy a snapshot out under a
//! read guard. The vehicle→region map is only updated while the cell guard
//! is held, never the other way round. Audit records are emitted after the
//! guard is released.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEvent, AuditEventKind, AuditSeverity, AuditSink, TracingAuditSink};
use crate::cell::{AirspaceRegion, CellChange, CellField, CellSnapshot, CellStatus, NeighborKind};
use crate::config::GridConfig;
use crate::error::{ControlAction, ControlError, InitError};
use crate::neighbors::build_neighbors;
use crate::partition::{build_grid, GridDims};
use crate::priority::{InMemoryPriorityRegistry, PriorityRegistry};
use crate::spatial::SpatialIndex;

/// A lease reclaimed by the sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredLease {
    pub cell_id: String,
    pub vehicle_id: String,
    pub status: CellStatus,
}

/// Partition diagnostics over index-adjacent cell pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionReport {
    /// Neighbor pairs whose bounding boxes intersect in their interiors
    pub overlapping_pairs: Vec<(String, String)>,
    /// Neighbor pairs that share a full face
    pub face_adjacent_pairs: usize,
}

/// Public controller over the partitioned airspace.
pub struct AirspaceControlEngine {
    index: SpatialIndex,
    dims: GridDims,
    lease_duration: Duration,
    /// Cell each vehicle most recently reserved
    drone_region: DashMap<String, String>,
    priorities: Arc<dyn PriorityRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl AirspaceControlEngine {
    /// Build the grid with an in-memory priority registry and audit records
    /// written to tracing.
    pub fn new(config: GridConfig) -> Result<Self, InitError> {
        let priorities = Arc::new(InMemoryPriorityRegistry::new(config.default_priority));
        Self::with_collaborators(config, priorities, Arc::new(TracingAuditSink))
    }

    /// Build the grid with externally supplied collaborators.
    ///
    /// Fails if the configuration is invalid or if the number of registered
    /// cells differs from the requested partition product.
    pub fn with_collaborators(
        config: GridConfig,
        priorities: Arc<dyn PriorityRegistry>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, InitError> {
        config.validate()?;

        let dims = config.dims();
        let mut index = SpatialIndex::new(config.spatial_precision, config.altitude_bucket_size);
        let grid = build_grid(
            &config.boundary_corners,
            config.min_altitude,
            config.max_altitude,
            dims,
            &mut index,
        )?;

        let expected = dims.total();
        if index.len() != expected || grid.registered() != expected {
            tracing::error!(
                "Airspace grid inconsistent: {} of {} cells registered",
                index.len(),
                expected
            );
            return Err(InitError::CellCountMismatch {
                expected,
                registered: index.len(),
                collisions: expected.saturating_sub(grid.registered()),
            });
        }

        let links = build_neighbors(&grid, &index);

        let engine = Self {
            index,
            dims,
            lease_duration: config.lease_duration(),
            drone_region: DashMap::new(),
            priorities,
            audit,
        };

        let report = engine.partition_report();
        for (a, b) in &report.overlapping_pairs {
            tracing::warn!("Cells {} and {} overlap; boundary is not axis aligned", a, b);
        }

        tracing::info!(
            "Airspace grid ready: {} cells ({}x{}x{}), {} neighbor links, lease {}ms",
            expected,
            dims.altitude,
            dims.longitude,
            dims.latitude,
            links,
            engine.lease_duration.num_milliseconds()
        );
        Ok(engine)
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn cell_count(&self) -> usize {
        self.index.len()
    }

    /// Cell ids in creation order.
    pub fn cell_ids(&self) -> &[String] {
        self.index.ids()
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    // ==== Reservation & lease ====

    /// Reserve a cell for a vehicle.
    ///
    /// First come, first served: a cell held by another vehicle is refused
    /// regardless of priority. Re-reserving a cell the vehicle already holds
    /// refreshes its lease and recorded priority without changing status.
    pub fn reserve(&self, vehicle_id: &str, cell_id: &str) -> Result<CellSnapshot, ControlError> {
        let priority = self.priorities.get_priority(vehicle_id);
        let now = Utc::now();
        let lease = self.lease_duration;

        let (result, changes) = self.mutate(cell_id, |cell, changes| {
            match cell.owner() {
                Some(owner) if owner == vehicle_id => {}
                Some(owner) => {
                    return Err(ControlError::Conflict {
                        cell_id: cell_id.to_string(),
                        owner: owner.to_string(),
                    });
                }
                None => {
                    let next = match cell.status() {
                        CellStatus::Free => CellStatus::Allocated,
                        CellStatus::RestrictedAvailable => CellStatus::RestrictedAllocated,
                        status => {
                            return Err(ControlError::InvalidState {
                                cell_id: cell_id.to_string(),
                                status,
                                action: ControlAction::Reserve,
                            });
                        }
                    };
                    changes.extend(cell.set_status(next));
                }
            }
            changes.extend(cell.set_owner(Some(vehicle_id), Some(priority)));
            changes.extend(cell.set_lease(now, lease));
            self.drone_region
                .insert(vehicle_id.to_string(), cell_id.to_string());
            Ok(cell.snapshot())
        })?;

        self.emit_changes(cell_id, Some(vehicle_id), &changes);
        if let Err(err) = &result {
            self.audit_denial(cell_id, vehicle_id, AuditEventKind::ReservationDenied, err);
        }
        result
    }

    /// Resolve a coordinate and reserve the containing cell.
    pub fn reserve_at(
        &self,
        vehicle_id: &str,
        lat: f64,
        lon: f64,
        alt: f64,
    ) -> Result<CellSnapshot, ControlError> {
        let cell_id = self.resolve_cell(lat, lon, alt)?;
        self.reserve(vehicle_id, &cell_id)
    }

    /// Reset the lease of a cell the caller owns.
    pub fn renew(&self, vehicle_id: &str, cell_id: &str) -> Result<CellSnapshot, ControlError> {
        let now = Utc::now();
        let lease = self.lease_duration;

        let (result, changes) = self.mutate(cell_id, |cell, changes| {
            if cell.owner() != Some(vehicle_id) || !cell.status().is_owned() {
                return Err(ControlError::Unauthorized {
                    cell_id: cell_id.to_string(),
                    vehicle_id: vehicle_id.to_string(),
                    action: ControlAction::Renew,
                });
            }
            changes.extend(cell.set_lease(now, lease));
            Ok(cell.snapshot())
        })?;

        self.emit_changes(cell_id, Some(vehicle_id), &changes);
        if let Err(err) = &result {
            self.audit_denial(cell_id, vehicle_id, AuditEventKind::UnauthorizedRenew, err);
        }
        result
    }

    /// Administrative revoke.
    ///
    /// Acknowledged and audited, but ownership is left in place: nothing
    /// confirms the vehicle has vacated the cell, so the lease runs out
    /// through the sweep instead.
    pub fn revoke(&self, cell_id: &str) -> Result<(), ControlError> {
        let owner = match self.index.get(cell_id) {
            None => None,
            Some(cell) => Some(cell.owner().map(str::to_string)),
        };
        let detail = match &owner {
            None => "revoke requested for unknown cell".to_string(),
            Some(Some(owner)) => format!("revoke acknowledged; {} not yet evicted", owner),
            Some(None) => "revoke acknowledged; cell has no owner".to_string(),
        };
        let owner = owner.flatten();
        self.audit.emit(&AuditEvent::new(
            AuditSeverity::Warning,
            AuditEventKind::RevokeRequested,
            Some(cell_id),
            owner.as_deref(),
            detail,
        ));
        Ok(())
    }

    // ==== Occupancy ====

    /// Record that the owning vehicle entered its reserved cell.
    pub fn add_occupant(&self, vehicle_id: &str, cell_id: &str) -> Result<CellSnapshot, ControlError> {
        let now = Utc::now();
        let lease = self.lease_duration;

        let (result, changes) = self.mutate(cell_id, |cell, changes| {
            check_owner(cell, cell_id, vehicle_id, ControlAction::Occupy)?;
            let next = match cell.status() {
                CellStatus::Allocated => CellStatus::Occupied,
                CellStatus::RestrictedAllocated => CellStatus::RestrictedOccupied,
                status => {
                    return Err(ControlError::InvalidState {
                        cell_id: cell_id.to_string(),
                        status,
                        action: ControlAction::Occupy,
                    });
                }
            };
            changes.extend(cell.set_status(next));
            changes.extend(cell.set_lease(now, lease));
            Ok(cell.snapshot())
        })?;

        self.emit_changes(cell_id, Some(vehicle_id), &changes);
        if let Err(err) = &result {
            if matches!(err, ControlError::Unauthorized { .. }) {
                self.audit_denial(cell_id, vehicle_id, AuditEventKind::UnauthorizedOccupy, err);
            }
        }
        result
    }

    /// Record that the owning vehicle left; the cell is released.
    pub fn remove_occupant(&self, vehicle_id: &str, cell_id: &str) -> Result<CellSnapshot, ControlError> {
        let (result, changes) = self.mutate(cell_id, |cell, changes| {
            check_owner(cell, cell_id, vehicle_id, ControlAction::Exit)?;
            let status = cell.status();
            if !matches!(status, CellStatus::Occupied | CellStatus::RestrictedOccupied) {
                return Err(ControlError::InvalidState {
                    cell_id: cell_id.to_string(),
                    status,
                    action: ControlAction::Exit,
                });
            }
            changes.extend(cell.set_status(status.unowned_counterpart()));
            changes.extend(cell.set_owner(None, None));
            changes.extend(cell.clear_lease());
            self.forget_region(vehicle_id, cell_id);
            Ok(cell.snapshot())
        })?;

        self.emit_changes(cell_id, Some(vehicle_id), &changes);
        if let Err(err) = &result {
            if matches!(err, ControlError::Unauthorized { .. }) {
                self.audit_denial(cell_id, vehicle_id, AuditEventKind::UnauthorizedExit, err);
            }
        }
        result
    }

    // ==== Administrative marking ====

    /// Close a cell. Any holder loses the cell and its lease.
    pub fn mark_no_fly(&self, cell_id: &str) -> Result<CellSnapshot, ControlError> {
        self.mark(cell_id, CellStatus::NoFly)
    }

    /// Move a cell to the restricted track. Any holder loses the cell.
    pub fn mark_restricted(&self, cell_id: &str) -> Result<CellSnapshot, ControlError> {
        self.mark(cell_id, CellStatus::RestrictedAvailable)
    }

    fn mark(&self, cell_id: &str, status: CellStatus) -> Result<CellSnapshot, ControlError> {
        let (result, changes) = self.mutate(cell_id, |cell, changes| {
            if let Some(owner) = cell.owner() {
                self.forget_region(owner, cell_id);
            }
            changes.extend(cell.set_status(status));
            changes.extend(cell.set_owner(None, None));
            changes.extend(cell.clear_lease());
            Ok(cell.snapshot())
        })?;

        self.emit_changes(cell_id, None, &changes);
        // Unchanged status yields no change record.
        if !changes.iter().any(|change| change.field == CellField::Status) {
            let kind = if status == CellStatus::NoFly {
                AuditEventKind::NoFlyEntered
            } else {
                AuditEventKind::RestrictedEntered
            };
            self.audit.emit(&AuditEvent::new(
                AuditSeverity::Critical,
                kind,
                Some(cell_id),
                None,
                format!("status {} re-asserted", status),
            ));
        }
        result
    }

    // ==== Queries ====

    pub fn query(&self, cell_id: &str) -> Result<CellSnapshot, ControlError> {
        self.index
            .get(cell_id)
            .map(|cell| cell.snapshot())
            .ok_or_else(|| ControlError::not_found(cell_id))
    }

    pub fn query_neighbors(&self, cell_id: &str, kind: NeighborKind) -> Result<Vec<String>, ControlError> {
        self.index
            .get(cell_id)
            .map(|cell| cell.neighbors(kind))
            .ok_or_else(|| ControlError::not_found(cell_id))
    }

    pub fn resolve_cell(&self, lat: f64, lon: f64, alt: f64) -> Result<String, ControlError> {
        self.index
            .resolve(lat, lon, alt)
            .ok_or_else(|| ControlError::not_found(format!("({}, {}, {})", lat, lon, alt)))
    }

    /// Cell the vehicle most recently reserved and still holds.
    pub fn vehicle_region(&self, vehicle_id: &str) -> Option<String> {
        self.drone_region
            .get(vehicle_id)
            .map(|entry| entry.value().clone())
    }

    /// Every cell currently owned by the vehicle.
    pub fn cells_owned_by(&self, vehicle_id: &str) -> Vec<String> {
        self.index
            .ids()
            .iter()
            .filter(|id| {
                self.index
                    .get(id.as_str())
                    .map(|cell| cell.owner() == Some(vehicle_id))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub fn status_counts(&self) -> BTreeMap<CellStatus, usize> {
        let mut counts = BTreeMap::new();
        for cell in self.index.cells().iter() {
            *counts.entry(cell.status()).or_insert(0) += 1;
        }
        counts
    }

    // ==== Priority ====

    pub fn set_priority(&self, vehicle_id: &str, priority: i32) {
        self.priorities.set_priority(vehicle_id, priority);
        tracing::debug!("Priority of {} set to {}", vehicle_id, priority);
    }

    pub fn priority(&self, vehicle_id: &str) -> i32 {
        self.priorities.get_priority(vehicle_id)
    }

    // ==== Lease expiry ====

    /// Release every cell whose lease has lapsed.
    pub fn sweep_expired_leases(&self) -> Vec<ExpiredLease> {
        self.sweep_expired_leases_at(Utc::now())
    }

    /// Same as [`Self::sweep_expired_leases`] against an explicit clock.
    pub fn sweep_expired_leases_at(&self, now: DateTime<Utc>) -> Vec<ExpiredLease> {
        let mut expired = Vec::new();
        let mut all_changes = Vec::new();

        for mut entry in self.index.cells().iter_mut() {
            let cell = entry.value_mut();
            if !cell.is_lease_expired(now) {
                continue;
            }
            let Some(owner) = cell.owner().map(str::to_string) else {
                continue;
            };
            let mut changes = Vec::new();
            let status = cell.status().unowned_counterpart();
            changes.extend(cell.set_status(status));
            changes.extend(cell.set_owner(None, None));
            changes.extend(cell.clear_lease());

            let cell_id = entry.key().clone();
            self.forget_region(&owner, &cell_id);
            all_changes.push((cell_id.clone(), owner.clone(), changes));
            expired.push(ExpiredLease {
                cell_id,
                vehicle_id: owner,
                status,
            });
        }

        for (cell_id, owner, changes) in &all_changes {
            self.audit.emit(&AuditEvent::new(
                AuditSeverity::Warning,
                AuditEventKind::LeaseExpired,
                Some(cell_id),
                Some(owner),
                "lease expired without renewal",
            ));
            self.emit_changes(cell_id, Some(owner), changes);
        }

        if !expired.is_empty() {
            tracing::info!("Lease sweep reclaimed {} cell(s)", expired.len());
        }
        expired
    }

    // ==== Diagnostics ====

    /// Check index-adjacent pairs for overlap and face sharing.
    pub fn partition_report(&self) -> PartitionReport {
        let mut report = PartitionReport::default();
        for id in self.index.ids() {
            let Some(cell) = self.index.get(id) else {
                continue;
            };
            for neighbor_id in cell.neighbors(NeighborKind::All) {
                if neighbor_id <= *id {
                    continue;
                }
                let Some(neighbor) = self.index.get(&neighbor_id) else {
                    continue;
                };
                if cell.overlaps(&neighbor) {
                    report.overlapping_pairs.push((id.clone(), neighbor_id.clone()));
                }
                if cell.shares_side_with(&neighbor) {
                    report.face_adjacent_pairs += 1;
                }
            }
        }
        report
    }

    // ==== Internals ====

    /// Run `f` under the cell's write guard. The outer `Err` is `NotFound`;
    /// the inner result is the operation's own outcome. Changes are returned
    /// so they can be emitted once the guard is released.
    fn mutate<T>(
        &self,
        cell_id: &str,
        f: impl FnOnce(&mut AirspaceRegion, &mut Vec<CellChange>) -> Result<T, ControlError>,
    ) -> Result<(Result<T, ControlError>, Vec<CellChange>), ControlError> {
        let mut changes = Vec::new();
        let result = {
            let mut cell = self
                .index
                .get_mut(cell_id)
                .ok_or_else(|| ControlError::not_found(cell_id))?;
            f(cell.value_mut(), &mut changes)
        };
        Ok((result, changes))
    }

    fn emit_changes(&self, cell_id: &str, vehicle_id: Option<&str>, changes: &[CellChange]) {
        for change in changes {
            tracing::debug!(
                "Cell {} {:?}: {} -> {}",
                cell_id,
                change.field,
                change.previous.as_deref().unwrap_or("-"),
                change.current.as_deref().unwrap_or("-")
            );
            if !change.security_relevant {
                continue;
            }
            let previous = change.previous.as_deref().unwrap_or("none");
            let current = change.current.as_deref().unwrap_or("none");
            let event = match change.field {
                CellField::Owner => AuditEvent::new(
                    AuditSeverity::Info,
                    AuditEventKind::OwnershipChanged,
                    Some(cell_id),
                    change.current.as_deref().or(change.previous.as_deref()),
                    format!("owner {} -> {}", previous, current),
                ),
                CellField::Status => {
                    let kind = if change.current.as_deref() == Some(CellStatus::NoFly.as_str()) {
                        AuditEventKind::NoFlyEntered
                    } else {
                        AuditEventKind::RestrictedEntered
                    };
                    // Administrative marking carries no vehicle.
                    let severity = if vehicle_id.is_none() {
                        AuditSeverity::Critical
                    } else {
                        AuditSeverity::Warning
                    };
                    AuditEvent::new(
                        severity,
                        kind,
                        Some(cell_id),
                        vehicle_id,
                        format!("status {} -> {}", previous, current),
                    )
                }
                CellField::Lease => continue,
            };
            self.audit.emit(&event);
        }
    }

    fn audit_denial(&self, cell_id: &str, vehicle_id: &str, kind: AuditEventKind, err: &ControlError) {
        tracing::debug!("Denied {} on {}: {}", vehicle_id, cell_id, err);
        if matches!(err, ControlError::NotFound { .. }) {
            return;
        }
        self.audit.emit(&AuditEvent::new(
            AuditSeverity::Warning,
            kind,
            Some(cell_id),
            Some(vehicle_id),
            format!("{}: {}", err.code(), err),
        ));
    }

    fn forget_region(&self, vehicle_id: &str, cell_id: &str) {
        self.drone_region
            .remove_if(vehicle_id, |_, region| region == cell_id);
    }
}

/// Owner check shared by occupy/exit: a cell nobody holds is the wrong state,
/// a cell somebody else holds is unauthorized.
fn check_owner(
    cell: &AirspaceRegion,
    cell_id: &str,
    vehicle_id: &str,
    action: ControlAction,
) -> Result<(), ControlError> {
    match cell.owner() {
        None => Err(ControlError::InvalidState {
            cell_id: cell_id.to_string(),
            status: cell.status(),
            action,
        }),
        Some(owner) if owner != vehicle_id => Err(ControlError::Unauthorized {
            cell_id: cell_id.to_string(),
            vehicle_id: vehicle_id.to_string(),
            action,
        }),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests;
