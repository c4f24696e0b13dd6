//! Airspace command line tool.
//!
//! Usage:
//!   cargo run -p airspace-cli --bin airspace -- grid --lon-parts 4 --lat-parts 4
//!   cargo run -p airspace-cli --bin airspace -- scenario

use airspace_cli::{grid_report, run_reference_scenario};
use airspace_core::{AirspaceControlEngine, GridConfig, LatLon};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

/// Inspect airspace grids and exercise the lease engine
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a grid and print every cell as JSON
    Grid {
        /// Top-left corner latitude
        #[arg(long, default_value_t = 33.69)]
        north: f64,

        /// Bottom-right corner latitude
        #[arg(long, default_value_t = 33.68)]
        south: f64,

        /// Top-left corner longitude
        #[arg(long, default_value_t = -117.83)]
        west: f64,

        /// Bottom-right corner longitude
        #[arg(long, default_value_t = -117.82)]
        east: f64,

        /// Floor of the managed volume in meters
        #[arg(long, default_value_t = 0.0)]
        min_alt: f64,

        /// Ceiling of the managed volume in meters
        #[arg(long, default_value_t = 120.0)]
        max_alt: f64,

        #[arg(long, default_value_t = 4)]
        alt_parts: usize,

        #[arg(long, default_value_t = 8)]
        lon_parts: usize,

        #[arg(long, default_value_t = 8)]
        lat_parts: usize,

        /// Geohash length used for cell ids
        #[arg(long, default_value_t = 8)]
        precision: usize,

        /// Only print the cell count and partition diagnostics
        #[arg(long)]
        summary: bool,
    },
    /// Run the 2x2x1 reference scenario and print each step
    Scenario {
        /// Lease duration in milliseconds
        #[arg(long, default_value_t = 10_000)]
        lease_ms: u64,

        /// Emit the full run as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airspace_core=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Grid {
            north,
            south,
            west,
            east,
            min_alt,
            max_alt,
            alt_parts,
            lon_parts,
            lat_parts,
            precision,
            summary,
        } => {
            let config = GridConfig {
                boundary_corners: [
                    LatLon::new(north, west),
                    LatLon::new(south, west),
                    LatLon::new(south, east),
                    LatLon::new(north, east),
                ],
                min_altitude: min_alt,
                max_altitude: max_alt,
                altitude_partitions: alt_parts,
                longitude_partitions: lon_parts,
                latitude_partitions: lat_parts,
                spatial_precision: precision,
                ..GridConfig::default()
            };
            let engine = AirspaceControlEngine::new(config).context("failed to build grid")?;

            if summary {
                let report = engine.partition_report();
                println!("Cells:               {}", engine.cell_count());
                println!("Dimensions:          {:?}", engine.dims());
                println!("Face-adjacent pairs: {}", report.face_adjacent_pairs);
                println!("Overlapping pairs:   {}", report.overlapping_pairs.len());
            } else {
                let cells = grid_report(&engine);
                println!("{}", serde_json::to_string_pretty(&cells)?);
            }
        }
        Command::Scenario { lease_ms, json } => {
            let run = run_reference_scenario(lease_ms)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
                return Ok(());
            }

            println!("Reference grid: {} cells, center cell {}", run.cell_count, run.cell_id);
            println!();
            for (i, step) in run.steps.iter().enumerate() {
                let outcome = if step.accepted {
                    "ok".to_string()
                } else {
                    step.code.unwrap_or("denied").to_string()
                };
                println!(
                    "{:>2}. {:<16} {:<8} {:<14} -> {:<22} owner={}",
                    i + 1,
                    step.action,
                    step.vehicle_id.as_deref().unwrap_or("-"),
                    outcome,
                    step.status.to_string(),
                    step.owner.as_deref().unwrap_or("-")
                );
            }
            println!();
            println!("Audit events: {}", run.audit.len());
            for event in &run.audit {
                println!("  [{:?}] {:?}: {}", event.severity, event.kind, event.detail);
            }
        }
    }

    Ok(())
}
