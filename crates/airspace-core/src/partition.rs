//! Subdivision of the managed volume into an `alt x lon x lat` grid.

use serde::{Deserialize, Serialize};

use crate::cell::AirspaceRegion;
use crate::config::LatLon;
use crate::error::InitError;
use crate::spatial::SpatialIndex;

/// Partition counts along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDims {
    pub altitude: usize,
    pub longitude: usize,
    pub latitude: usize,
}

impl GridDims {
    pub fn total(&self) -> usize {
        self.altitude * self.longitude * self.latitude
    }

    pub fn checked_total(&self) -> Option<usize> {
        self.altitude
            .checked_mul(self.longitude)?
            .checked_mul(self.latitude)
    }
}

/// Dense `[altitude][longitude][latitude]` array of registered cell ids.
///
/// Only lives through startup: the neighbor builder walks it and then it is
/// dropped, leaving the index and the neighbor sets.
#[derive(Debug, Clone)]
pub struct Grid {
    dims: GridDims,
    ids: Vec<Option<String>>,
}

impl Grid {
    fn new(dims: GridDims) -> Self {
        Self {
            dims,
            ids: vec![None; dims.total()],
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    fn offset(&self, alt: usize, lon: usize, lat: usize) -> usize {
        (alt * self.dims.longitude + lon) * self.dims.latitude + lat
    }

    /// Id of the cell at an index, `None` when out of range or never registered.
    pub fn get(&self, alt: usize, lon: usize, lat: usize) -> Option<&str> {
        if alt >= self.dims.altitude || lon >= self.dims.longitude || lat >= self.dims.latitude {
            return None;
        }
        self.ids[self.offset(alt, lon, lat)].as_deref()
    }

    /// Same as [`Grid::get`] but accepts signed indices produced by offsets.
    pub fn get_signed(&self, alt: isize, lon: isize, lat: isize) -> Option<&str> {
        if alt < 0 || lon < 0 || lat < 0 {
            return None;
        }
        self.get(alt as usize, lon as usize, lat as usize)
    }

    pub fn registered(&self) -> usize {
        self.ids.iter().filter(|id| id.is_some()).count()
    }

    fn set(&mut self, alt: usize, lon: usize, lat: usize, id: Option<String>) {
        let offset = self.offset(alt, lon, lat);
        self.ids[offset] = id;
    }
}

/// Split the boundary into cells and register every one in `index`.
///
/// Corners are ordered top-left, bottom-left, bottom-right, top-right.
/// Altitude is split into equal bands; within a band the footprint is cut
/// into longitude strips along the top and bottom edges, and each strip into
/// latitude cells along its left and right edges. Shared edges are computed
/// from identical interpolation inputs, so neighbors meet exactly.
pub fn build_grid(
    corners: &[LatLon; 4],
    min_alt: f64,
    max_alt: f64,
    dims: GridDims,
    index: &mut SpatialIndex,
) -> Result<Grid, InitError> {
    let [top_left, bottom_left, bottom_right, top_right] = *corners;
    let mut grid = Grid::new(dims);
    let mut sequence = 0u64;

    for alt in 0..dims.altitude {
        let band_lo = lerp(min_alt, max_alt, fraction(alt, dims.altitude));
        let band_hi = lerp(min_alt, max_alt, fraction(alt + 1, dims.altitude));

        for lon in 0..dims.longitude {
            let f0 = fraction(lon, dims.longitude);
            let f1 = fraction(lon + 1, dims.longitude);
            let strip_top_west = top_left.lerp(top_right, f0);
            let strip_top_east = top_left.lerp(top_right, f1);
            let strip_bottom_west = bottom_left.lerp(bottom_right, f0);
            let strip_bottom_east = bottom_left.lerp(bottom_right, f1);

            for lat in 0..dims.latitude {
                let g0 = fraction(lat, dims.latitude);
                let g1 = fraction(lat + 1, dims.latitude);
                let cell_corners = [
                    strip_bottom_west.lerp(strip_top_west, g1),
                    strip_bottom_west.lerp(strip_top_west, g0),
                    strip_bottom_east.lerp(strip_top_east, g0),
                    strip_bottom_east.lerp(strip_top_east, g1),
                ];

                let region = AirspaceRegion::new(cell_corners, band_lo, band_hi, sequence);
                sequence += 1;
                let id = index.register(region)?;
                grid.set(alt, lon, lat, id);
            }
        }
    }

    tracing::debug!(
        "Partitioned {} cells ({} registered)",
        sequence,
        grid.registered()
    );
    Ok(grid)
}

fn fraction(step: usize, parts: usize) -> f64 {
    step as f64 / parts as f64
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> [LatLon; 4] {
        [
            LatLon::new(1.0, 0.0),
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, 1.0),
            LatLon::new(1.0, 1.0),
        ]
    }

    #[test]
    fn registers_every_cell() {
        let mut index = SpatialIndex::new(8, 10.0);
        let dims = GridDims {
            altitude: 3,
            longitude: 4,
            latitude: 5,
        };
        let grid = build_grid(&unit_square(), 0.0, 90.0, dims, &mut index).unwrap();
        assert_eq!(index.len(), 60);
        assert_eq!(grid.registered(), 60);
        assert_eq!(dims.checked_total(), Some(60));
    }

    #[test]
    fn cells_tile_the_volume() {
        let mut index = SpatialIndex::new(8, 10.0);
        let dims = GridDims {
            altitude: 2,
            longitude: 2,
            latitude: 2,
        };
        let grid = build_grid(&unit_square(), 0.0, 100.0, dims, &mut index).unwrap();

        let first = index.get(grid.get(0, 0, 0).unwrap()).unwrap();
        let b = *first.bounds();
        assert_eq!((b.min_lat, b.max_lat), (0.0, 0.5));
        assert_eq!((b.min_lon, b.max_lon), (0.0, 0.5));
        assert_eq!((b.min_alt, b.max_alt), (0.0, 50.0));
        drop(first);

        let last = index.get(grid.get(1, 1, 1).unwrap()).unwrap();
        let b = *last.bounds();
        assert_eq!((b.min_lat, b.max_lat), (0.5, 1.0));
        assert_eq!((b.min_lon, b.max_lon), (0.5, 1.0));
        assert_eq!((b.min_alt, b.max_alt), (50.0, 100.0));
        assert_eq!(last.sequence(), 7);
    }

    #[test]
    fn out_of_range_lookups_are_none() {
        let mut index = SpatialIndex::new(8, 10.0);
        let dims = GridDims {
            altitude: 1,
            longitude: 2,
            latitude: 2,
        };
        let grid = build_grid(&unit_square(), 0.0, 10.0, dims, &mut index).unwrap();
        assert!(grid.get(1, 0, 0).is_none());
        assert!(grid.get_signed(0, -1, 0).is_none());
        assert!(grid.get_signed(0, 1, 1).is_some());
    }

    #[test]
    fn collisions_leave_holes() {
        // Five altitude bands inside one 10m bucket share ids.
        let mut index = SpatialIndex::new(8, 10.0);
        let dims = GridDims {
            altitude: 5,
            longitude: 1,
            latitude: 1,
        };
        let grid = build_grid(&unit_square(), 0.0, 10.0, dims, &mut index).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(grid.registered(), 1);
    }
}
