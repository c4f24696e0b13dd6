//! 26-connected neighbor sets derived from grid indices.

use crate::cell::NeighborKind;
use crate::partition::Grid;
use crate::spatial::SpatialIndex;

/// Populate lateral/upper/lower neighbor sets for every registered cell.
///
/// Purely index driven: offsets in `{-1, 0, 1}^3` other than the origin,
/// positive altitude delta is upper, negative is lower, anything else is
/// lateral. Offsets outside the grid are skipped. Returns the number of
/// directed links written.
pub fn build_neighbors(grid: &Grid, index: &SpatialIndex) -> usize {
    let dims = grid.dims();
    let mut links = 0;

    for alt in 0..dims.altitude {
        for lon in 0..dims.longitude {
            for lat in 0..dims.latitude {
                let Some(cell_id) = grid.get(alt, lon, lat) else {
                    continue;
                };

                let found = neighbors_at(grid, alt, lon, lat);
                let Some(mut cell) = index.get_mut(cell_id) else {
                    continue;
                };
                for (kind, neighbor_id) in found {
                    cell.add_neighbor(kind, neighbor_id);
                    links += 1;
                }
            }
        }
    }

    links
}

fn neighbors_at(grid: &Grid, alt: usize, lon: usize, lat: usize) -> Vec<(NeighborKind, String)> {
    let mut found = Vec::with_capacity(26);
    for d_alt in -1isize..=1 {
        for d_lon in -1isize..=1 {
            for d_lat in -1isize..=1 {
                if d_alt == 0 && d_lon == 0 && d_lat == 0 {
                    continue;
                }
                let Some(neighbor_id) = grid.get_signed(
                    alt as isize + d_alt,
                    lon as isize + d_lon,
                    lat as isize + d_lat,
                ) else {
                    continue;
                };
                let kind = match d_alt {
                    1 => NeighborKind::Upper,
                    -1 => NeighborKind::Lower,
                    _ => NeighborKind::Lateral,
                };
                found.push((kind, neighbor_id.to_string()));
            }
        }
    }
    found
}
