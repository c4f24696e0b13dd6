//! A single airspace cell: fixed geometry plus lease and ownership state.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LatLon;

/// Tolerance used when comparing shared cell faces.
const FACE_EPSILON: f64 = 1e-9;

/// Occupancy status of a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellStatus {
    /// Unowned and open to reservation
    #[default]
    Free,
    /// Reserved, vehicle not yet inside
    Allocated,
    /// Vehicle physically present
    Occupied,
    /// Restricted track, unowned
    RestrictedAvailable,
    /// Restricted track, reserved
    RestrictedAllocated,
    /// Restricted track, vehicle present
    RestrictedOccupied,
    /// Closed by administrative action
    #[serde(rename = "NOFLY")]
    NoFly,
}

impl CellStatus {
    /// Statuses in which the cell must have an owner and a lease.
    pub fn is_owned(self) -> bool {
        matches!(
            self,
            CellStatus::Allocated
                | CellStatus::Occupied
                | CellStatus::RestrictedAllocated
                | CellStatus::RestrictedOccupied
        )
    }

    pub fn is_restricted(self) -> bool {
        matches!(
            self,
            CellStatus::RestrictedAvailable
                | CellStatus::RestrictedAllocated
                | CellStatus::RestrictedOccupied
        )
    }

    /// Entering one of these statuses must be audited.
    pub fn is_security_sensitive(self) -> bool {
        self == CellStatus::NoFly || self.is_restricted()
    }

    /// Status a cell falls back to once its owner leaves or its lease lapses.
    pub fn unowned_counterpart(self) -> CellStatus {
        match self {
            CellStatus::RestrictedAvailable
            | CellStatus::RestrictedAllocated
            | CellStatus::RestrictedOccupied => CellStatus::RestrictedAvailable,
            CellStatus::NoFly => CellStatus::NoFly,
            CellStatus::Free | CellStatus::Allocated | CellStatus::Occupied => CellStatus::Free,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CellStatus::Free => "FREE",
            CellStatus::Allocated => "ALLOCATED",
            CellStatus::Occupied => "OCCUPIED",
            CellStatus::RestrictedAvailable => "RESTRICTED_AVAILABLE",
            CellStatus::RestrictedAllocated => "RESTRICTED_ALLOCATED",
            CellStatus::RestrictedOccupied => "RESTRICTED_OCCUPIED",
            CellStatus::NoFly => "NOFLY",
        }
    }
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned extent of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_alt: f64,
    pub max_alt: f64,
}

impl Bounds {
    fn axes(&self) -> [(f64, f64); 3] {
        [
            (self.min_lat, self.max_lat),
            (self.min_lon, self.max_lon),
            (self.min_alt, self.max_alt),
        ]
    }
}

/// Which neighbor set a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborKind {
    /// Same altitude band
    Lateral,
    /// One band up
    Upper,
    /// One band down
    Lower,
    /// Union of the three sets
    All,
}

/// Cell field touched by a mutator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellField {
    Status,
    Owner,
    Lease,
}

/// Record produced by a mutator when a field actually changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellChange {
    pub field: CellField,
    pub previous: Option<String>,
    pub current: Option<String>,
    /// Set for status changes into NOFLY/RESTRICTED_* and every ownership change
    pub security_relevant: bool,
}

/// Consistent copy of a cell's occupancy triple and lease deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub cell_id: String,
    pub status: CellStatus,
    pub owner: Option<String>,
    pub owner_priority: Option<i32>,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

/// One partition of the managed airspace.
#[derive(Debug, Clone)]
pub struct AirspaceRegion {
    /// Top-left, bottom-left, bottom-right, top-right
    corners: [LatLon; 4],
    bounds: Bounds,
    cell_id: Option<String>,
    sequence: u64,

    status: CellStatus,
    owner: Option<String>,
    owner_priority: Option<i32>,
    lease_duration: Option<Duration>,
    lease_start: Option<DateTime<Utc>>,

    lateral: BTreeSet<String>,
    upper: BTreeSet<String>,
    lower: BTreeSet<String>,
}

impl AirspaceRegion {
    /// Build a free cell from its four lateral corners and altitude range.
    pub fn new(corners: [LatLon; 4], min_alt: f64, max_alt: f64, sequence: u64) -> Self {
        let lat_iter = corners.iter().map(|c| c.lat);
        let lon_iter = corners.iter().map(|c| c.lon);
        let bounds = Bounds {
            min_lat: lat_iter.clone().fold(f64::INFINITY, f64::min),
            max_lat: lat_iter.fold(f64::NEG_INFINITY, f64::max),
            min_lon: lon_iter.clone().fold(f64::INFINITY, f64::min),
            max_lon: lon_iter.fold(f64::NEG_INFINITY, f64::max),
            min_alt: min_alt.min(max_alt),
            max_alt: min_alt.max(max_alt),
        };

        Self {
            corners,
            bounds,
            cell_id: None,
            sequence,
            status: CellStatus::Free,
            owner: None,
            owner_priority: None,
            lease_duration: None,
            lease_start: None,
            lateral: BTreeSet::new(),
            upper: BTreeSet::new(),
            lower: BTreeSet::new(),
        }
    }

    pub fn cell_id(&self) -> Option<&str> {
        self.cell_id.as_deref()
    }

    /// Creation order within the partition run.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn corners(&self) -> &[LatLon; 4] {
        &self.corners
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn status(&self) -> CellStatus {
        self.status
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn owner_priority(&self) -> Option<i32> {
        self.owner_priority
    }

    pub fn lease_start(&self) -> Option<DateTime<Utc>> {
        self.lease_start
    }

    pub fn lease_duration(&self) -> Option<Duration> {
        self.lease_duration
    }

    pub fn lease_expires_at(&self) -> Option<DateTime<Utc>> {
        Some(self.lease_start? + self.lease_duration?)
    }

    /// True once an active lease has run its full duration.
    pub fn is_lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at()
            .map(|expires| now >= expires)
            .unwrap_or(false)
    }

    /// Whether a requester with `priority` could take this cell if
    /// preemption were enforced. Reservation does not consult this.
    pub fn is_available_for_priority(&self, priority: i32) -> bool {
        match self.status {
            CellStatus::NoFly => false,
            CellStatus::Free | CellStatus::RestrictedAvailable => true,
            _ => self.owner_priority.map(|held| priority > held).unwrap_or(true),
        }
    }

    pub fn neighbors(&self, kind: NeighborKind) -> Vec<String> {
        match kind {
            NeighborKind::Lateral => self.lateral.iter().cloned().collect(),
            NeighborKind::Upper => self.upper.iter().cloned().collect(),
            NeighborKind::Lower => self.lower.iter().cloned().collect(),
            NeighborKind::All => self
                .lateral
                .iter()
                .chain(&self.upper)
                .chain(&self.lower)
                .cloned()
                .collect(),
        }
    }

    pub fn snapshot(&self) -> CellSnapshot {
        CellSnapshot {
            cell_id: self.cell_id.clone().unwrap_or_default(),
            status: self.status,
            owner: self.owner.clone(),
            owner_priority: self.owner_priority,
            lease_expires_at: self.lease_expires_at(),
        }
    }

    // ==== Geometry ====

    /// Axis-aligned containment test, boundaries inclusive.
    pub fn contains(&self, lat: f64, lon: f64, alt: f64) -> bool {
        let b = &self.bounds;
        (b.min_alt..=b.max_alt).contains(&alt)
            && (b.min_lat..=b.max_lat).contains(&lat)
            && (b.min_lon..=b.max_lon).contains(&lon)
    }

    /// Exact lateral test against the quadrilateral formed by the corners.
    ///
    /// Not used for resolution; kept for diagnosing skewed boundaries where
    /// the bounding box over-approximates the cell.
    pub fn contains_lateral_exact(&self, lat: f64, lon: f64) -> bool {
        let point = LatLon::new(lat, lon);
        let mut sign = 0.0_f64;
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            let side = point.side_of_line(a, b);
            if side.abs() <= FACE_EPSILON {
                continue;
            }
            if sign == 0.0 {
                sign = side.signum();
            } else if side.signum() != sign {
                return false;
            }
        }
        true
    }

    pub fn centroid(&self) -> (f64, f64, f64) {
        let b = &self.bounds;
        (
            (b.min_lat + b.max_lat) / 2.0,
            (b.min_lon + b.max_lon) / 2.0,
            (b.min_alt + b.max_alt) / 2.0,
        )
    }

    /// Face adjacency: touching on exactly one axis, overlapping on the other two.
    pub fn shares_side_with(&self, other: &AirspaceRegion) -> bool {
        let mut touching = 0;
        let mut overlapping = 0;
        for ((a_min, a_max), (b_min, b_max)) in self.bounds.axes().into_iter().zip(other.bounds.axes()) {
            if (a_max - b_min).abs() <= FACE_EPSILON || (b_max - a_min).abs() <= FACE_EPSILON {
                touching += 1;
            } else if a_min < b_max - FACE_EPSILON && b_min < a_max - FACE_EPSILON {
                overlapping += 1;
            }
        }
        touching == 1 && overlapping == 2
    }

    /// Interior intersection on all three axes; shared faces do not count.
    pub fn overlaps(&self, other: &AirspaceRegion) -> bool {
        self.bounds
            .axes()
            .into_iter()
            .zip(other.bounds.axes())
            .all(|((a_min, a_max), (b_min, b_max))| {
                a_min < b_max - FACE_EPSILON && b_min < a_max - FACE_EPSILON
            })
    }

    // ==== Mutators (engine only) ====

    pub(crate) fn assign_id(&mut self, cell_id: String) {
        debug_assert!(self.cell_id.is_none(), "cell id assigned twice");
        if self.cell_id.is_none() {
            self.cell_id = Some(cell_id);
        }
    }

    pub(crate) fn add_neighbor(&mut self, kind: NeighborKind, cell_id: String) {
        match kind {
            NeighborKind::Lateral => self.lateral.insert(cell_id),
            NeighborKind::Upper => self.upper.insert(cell_id),
            NeighborKind::Lower => self.lower.insert(cell_id),
            NeighborKind::All => false,
        };
    }

    pub(crate) fn set_status(&mut self, status: CellStatus) -> Option<CellChange> {
        if self.status == status {
            return None;
        }
        let previous = std::mem::replace(&mut self.status, status);
        Some(CellChange {
            field: CellField::Status,
            previous: Some(previous.to_string()),
            current: Some(status.to_string()),
            security_relevant: status.is_security_sensitive(),
        })
    }

    /// Set the owner and the priority it holds the cell with. Only an owner
    /// change is reported; a priority refresh for the same owner is silent.
    pub(crate) fn set_owner(&mut self, owner: Option<&str>, priority: Option<i32>) -> Option<CellChange> {
        self.owner_priority = if owner.is_some() { priority } else { None };
        if self.owner.as_deref() == owner {
            return None;
        }
        let previous = std::mem::replace(&mut self.owner, owner.map(str::to_string));
        Some(CellChange {
            field: CellField::Owner,
            previous,
            current: self.owner.clone(),
            security_relevant: true,
        })
    }

    pub(crate) fn set_lease(&mut self, start: DateTime<Utc>, duration: Duration) -> Option<CellChange> {
        let previous = self.lease_expires_at();
        self.lease_start = Some(start);
        self.lease_duration = Some(duration);
        let current = self.lease_expires_at();
        if previous == current {
            return None;
        }
        Some(CellChange {
            field: CellField::Lease,
            previous: previous.map(|t| t.to_rfc3339()),
            current: current.map(|t| t.to_rfc3339()),
            security_relevant: false,
        })
    }

    pub(crate) fn clear_lease(&mut self) -> Option<CellChange> {
        let previous = self.lease_expires_at();
        self.lease_start = None;
        self.lease_duration = None;
        previous.map(|expires| CellChange {
            field: CellField::Lease,
            previous: Some(expires.to_rfc3339()),
            current: None,
            security_relevant: false,
        })
    }
}
