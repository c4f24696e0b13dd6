//! Spatial keys and the cell-id index.
//!
//! A cell id is the geohash of the cell centroid truncated to the configured
//! precision, followed by the altitude band of the centroid:
//! `"9mupq6b3:4"`. The band suffix keeps vertically stacked cells with the
//! same lateral code apart.

use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;
use geohash::{Coord, GeohashError};

use crate::cell::{AirspaceRegion, Bounds};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Altitude band index for a height, given the bucket size.
pub fn altitude_band(altitude: f64, bucket_size: f64) -> i64 {
    (altitude / bucket_size).floor() as i64
}

/// Spatial key for a point.
pub fn spatial_key(
    lat: f64,
    lon: f64,
    altitude: f64,
    precision: usize,
    bucket_size: f64,
) -> Result<String, GeohashError> {
    let lateral = geohash::encode(Coord { x: lon, y: lat }, precision)?;
    Ok(format!("{}:{}", lateral, altitude_band(altitude, bucket_size)))
}

/// Great-circle distance in meters (Haversine).
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// East-west width, north-south depth and height of a bounding box in meters,
/// measured through its center.
pub fn extent_m(bounds: &Bounds) -> (f64, f64, f64) {
    let mid_lat = (bounds.min_lat + bounds.max_lat) / 2.0;
    let mid_lon = (bounds.min_lon + bounds.max_lon) / 2.0;
    let width = haversine_distance(mid_lat, bounds.min_lon, mid_lat, bounds.max_lon);
    let depth = haversine_distance(bounds.min_lat, mid_lon, bounds.max_lat, mid_lon);
    (width, depth, bounds.max_alt - bounds.min_alt)
}

/// Map from cell id to cell, built once at startup and never resized.
#[derive(Debug)]
pub struct SpatialIndex {
    precision: usize,
    altitude_bucket_size: f64,
    cells: DashMap<String, AirspaceRegion>,
    /// Registration order, used for deterministic scans.
    order: Vec<String>,
}

impl SpatialIndex {
    pub fn new(precision: usize, altitude_bucket_size: f64) -> Self {
        Self {
            precision,
            altitude_bucket_size,
            cells: DashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn altitude_bucket_size(&self) -> f64 {
        self.altitude_bucket_size
    }

    pub fn key_for_point(&self, lat: f64, lon: f64, altitude: f64) -> Result<String, GeohashError> {
        spatial_key(lat, lon, altitude, self.precision, self.altitude_bucket_size)
    }

    pub fn key_for_region(&self, region: &AirspaceRegion) -> Result<String, GeohashError> {
        let (lat, lon, alt) = region.centroid();
        self.key_for_point(lat, lon, alt)
    }

    /// Assign the region its id and store it.
    ///
    /// Returns `Ok(None)` when the id is already taken; the region is dropped
    /// and the caller's cell count check reports the collision.
    pub(crate) fn register(&mut self, mut region: AirspaceRegion) -> Result<Option<String>, GeohashError> {
        let key = self.key_for_region(&region)?;
        if self.cells.contains_key(&key) {
            tracing::error!(
                "Spatial key collision on {} (cell #{}); lower the partition count or raise the precision",
                key,
                region.sequence()
            );
            return Ok(None);
        }
        region.assign_id(key.clone());
        self.cells.insert(key.clone(), region);
        self.order.push(key.clone());
        Ok(Some(key))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, cell_id: &str) -> bool {
        self.cells.contains_key(cell_id)
    }

    pub fn get(&self, cell_id: &str) -> Option<Ref<'_, String, AirspaceRegion>> {
        self.cells.get(cell_id)
    }

    pub(crate) fn get_mut(&self, cell_id: &str) -> Option<RefMut<'_, String, AirspaceRegion>> {
        self.cells.get_mut(cell_id)
    }

    /// Cell ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub(crate) fn cells(&self) -> &DashMap<String, AirspaceRegion> {
        &self.cells
    }

    /// Resolve a point to the id of the cell containing it.
    ///
    /// The point's own spatial key is tried first; otherwise cells are scanned
    /// in registration order and the first containing cell wins, which keeps
    /// points on shared faces deterministic.
    pub fn resolve(&self, lat: f64, lon: f64, altitude: f64) -> Option<String> {
        if let Ok(key) = self.key_for_point(lat, lon, altitude) {
            let hit = self
                .cells
                .get(&key)
                .map(|cell| cell.contains(lat, lon, altitude))
                .unwrap_or(false);
            if hit {
                return Some(key);
            }
        }

        self.order
            .iter()
            .find(|id| {
                self.cells
                    .get(id.as_str())
                    .map(|cell| cell.contains(lat, lon, altitude))
                    .unwrap_or(false)
            })
            .cloned()
    }
}
