//! Server configuration from environment.

use std::env;
use std::time::Duration;

use airspace_core::{GridConfig, LatLon};
use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub grid: GridConfig,
    pub sweep_interval: Duration,
    pub audit_log_path: Option<String>,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut grid = match lookup("AIRSPACE_GRID_FILE") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading grid file {}", path))?;
                serde_json::from_str::<GridConfig>(&raw)
                    .with_context(|| format!("parsing grid file {}", path))?
            }
            None => GridConfig::default(),
        };

        if let Some(raw) = lookup("AIRSPACE_BOUNDARY") {
            grid.boundary_corners = parse_boundary(&raw)
                .ok_or_else(|| anyhow!("AIRSPACE_BOUNDARY must be four lat,lon pairs separated by ';'"))?;
        }
        override_parsed(&lookup, "AIRSPACE_MIN_ALT", &mut grid.min_altitude)?;
        override_parsed(&lookup, "AIRSPACE_MAX_ALT", &mut grid.max_altitude)?;
        override_parsed(&lookup, "AIRSPACE_ALT_PARTS", &mut grid.altitude_partitions)?;
        override_parsed(&lookup, "AIRSPACE_LON_PARTS", &mut grid.longitude_partitions)?;
        override_parsed(&lookup, "AIRSPACE_LAT_PARTS", &mut grid.latitude_partitions)?;
        override_parsed(&lookup, "AIRSPACE_LEASE_MS", &mut grid.lease_duration_ms)?;
        override_parsed(&lookup, "AIRSPACE_SPATIAL_PRECISION", &mut grid.spatial_precision)?;
        override_parsed(&lookup, "AIRSPACE_ALT_BUCKET", &mut grid.altitude_bucket_size)?;
        override_parsed(&lookup, "AIRSPACE_DEFAULT_PRIORITY", &mut grid.default_priority)?;

        let sweep_interval_ms = lookup("AIRSPACE_SWEEP_INTERVAL_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        Ok(Self {
            grid,
            sweep_interval: Duration::from_millis(sweep_interval_ms),
            audit_log_path: lookup("AIRSPACE_AUDIT_LOG").filter(|s| !s.trim().is_empty()),
            log_json: lookup("AIRSPACE_LOG_JSON")
                .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} has an invalid value: {}", key, raw))?;
    }
    Ok(())
}

/// Parse `lat,lon;lat,lon;lat,lon;lat,lon` (top-left, bottom-left,
/// bottom-right, top-right).
pub fn parse_boundary(raw: &str) -> Option<[LatLon; 4]> {
    let corners: Vec<LatLon> = raw
        .split(';')
        .map(|pair| {
            let (lat, lon) = pair.trim().split_once(',')?;
            Some(LatLon::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?))
        })
        .collect::<Option<_>>()?;
    corners.try_into().ok()
}
