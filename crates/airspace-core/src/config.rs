//! Construction-time configuration for the airspace grid.

use serde::{Deserialize, Serialize};

use crate::error::InitError;
use crate::partition::GridDims;

/// Longest geohash the spatial index accepts.
pub const MAX_SPATIAL_PRECISION: usize = 12;

/// Longest accepted lease (one day).
pub const MAX_LEASE_DURATION_MS: u64 = 86_400_000;

/// A lateral position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Linear interpolation between two positions; `t = 0` yields `self`,
    /// `t = 1` yields `other` exactly.
    pub fn lerp(self, other: LatLon, t: f64) -> LatLon {
        LatLon {
            lat: self.lat * (1.0 - t) + other.lat * t,
            lon: self.lon * (1.0 - t) + other.lon * t,
        }
    }

    /// Which side of the directed line `a -> b` this point lies on.
    ///
    /// Positive is left, negative is right, zero is on the line
    /// (lon treated as x, lat as y).
    pub fn side_of_line(self, a: LatLon, b: LatLon) -> f64 {
        (b.lon - a.lon) * (self.lat - a.lat) - (b.lat - a.lat) * (self.lon - a.lon)
    }

    fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Grid layout, lease policy and spatial key settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Boundary corners ordered top-left, bottom-left, bottom-right, top-right
    pub boundary_corners: [LatLon; 4],
    /// Floor of the managed volume (meters)
    pub min_altitude: f64,
    /// Ceiling of the managed volume (meters)
    pub max_altitude: f64,
    pub altitude_partitions: usize,
    pub longitude_partitions: usize,
    pub latitude_partitions: usize,
    /// Base lease length granted by reserve/renew/occupy (milliseconds)
    pub lease_duration_ms: u64,
    /// Geohash length used for the lateral part of cell ids (8 is roughly 38m x 19m)
    pub spatial_precision: usize,
    /// Height of one altitude band in the cell id suffix (meters)
    pub altitude_bucket_size: f64,
    /// Priority reported for vehicles that never had one set
    pub default_priority: i32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            boundary_corners: [
                LatLon::new(33.69, -117.83),
                LatLon::new(33.68, -117.83),
                LatLon::new(33.68, -117.82),
                LatLon::new(33.69, -117.82),
            ],
            min_altitude: 0.0,
            max_altitude: 120.0,
            altitude_partitions: 4,
            longitude_partitions: 8,
            latitude_partitions: 8,
            lease_duration_ms: 10_000,
            spatial_precision: 8,
            altitude_bucket_size: 10.0,
            default_priority: 0,
        }
    }
}

impl GridConfig {
    pub fn dims(&self) -> GridDims {
        GridDims {
            altitude: self.altitude_partitions,
            longitude: self.longitude_partitions,
            latitude: self.latitude_partitions,
        }
    }

    pub fn lease_duration(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.lease_duration_ms.min(i64::MAX as u64) as i64)
    }

    /// Reject layouts the partitioner cannot turn into a consistent grid.
    pub fn validate(&self) -> Result<(), InitError> {
        if let Some(corner) = self.boundary_corners.iter().find(|c| !c.is_valid()) {
            return Err(InitError::InvalidConfig(format!(
                "boundary corner ({}, {}) is not a valid lat/lon",
                corner.lat, corner.lon
            )));
        }
        if !self.min_altitude.is_finite() || !self.max_altitude.is_finite() {
            return Err(InitError::InvalidConfig(
                "altitude limits must be finite".to_string(),
            ));
        }
        if self.min_altitude >= self.max_altitude {
            return Err(InitError::InvalidConfig(format!(
                "min altitude {} must be below max altitude {}",
                self.min_altitude, self.max_altitude
            )));
        }
        if self.altitude_partitions == 0
            || self.longitude_partitions == 0
            || self.latitude_partitions == 0
        {
            return Err(InitError::InvalidConfig(
                "partition counts must be at least 1".to_string(),
            ));
        }
        if self.dims().checked_total().is_none() {
            return Err(InitError::InvalidConfig(
                "partition counts overflow the cell count".to_string(),
            ));
        }
        if !(1..=MAX_SPATIAL_PRECISION).contains(&self.spatial_precision) {
            return Err(InitError::InvalidConfig(format!(
                "spatial precision {} outside 1..={}",
                self.spatial_precision, MAX_SPATIAL_PRECISION
            )));
        }
        if self.lease_duration_ms > MAX_LEASE_DURATION_MS {
            return Err(InitError::InvalidConfig(format!(
                "lease duration {}ms exceeds the {}ms limit",
                self.lease_duration_ms, MAX_LEASE_DURATION_MS
            )));
        }
        if !self.altitude_bucket_size.is_finite() || self.altitude_bucket_size <= 0.0 {
            return Err(InitError::InvalidConfig(
                "altitude bucket size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
