//! Error taxonomy for the airspace engine.
//!
//! Denials (`ControlError`) are ordinary results handed back to the swarm
//! controller. `InitError` is only produced while building the grid and means
//! the process must not start serving requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::CellStatus;

/// The action a vehicle attempted when a denial was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Reserve,
    Renew,
    Occupy,
    Exit,
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlAction::Reserve => "reserve",
            ControlAction::Renew => "renew",
            ControlAction::Occupy => "occupy",
            ControlAction::Exit => "exit",
        };
        f.write_str(name)
    }
}

/// Denial returned by the lease & arbitration engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("cell {cell_id} is held by {owner}")]
    Conflict { cell_id: String, owner: String },

    #[error("vehicle {vehicle_id} is not authorized to {action} cell {cell_id}")]
    Unauthorized {
        cell_id: String,
        vehicle_id: String,
        action: ControlAction,
    },

    #[error("cannot {action} cell {cell_id} while it is {status}")]
    InvalidState {
        cell_id: String,
        status: CellStatus,
        action: ControlAction,
    },

    #[error("no cell found for {target}")]
    NotFound { target: String },
}

impl ControlError {
    /// Stable reason code suitable for relaying to vehicles and operators.
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::Conflict { .. } => "CONFLICT",
            ControlError::Unauthorized { .. } => "UNAUTHORIZED",
            ControlError::InvalidState { .. } => "INVALID_STATE",
            ControlError::NotFound { .. } => "NOT_FOUND",
        }
    }

    pub(crate) fn not_found(target: impl Into<String>) -> Self {
        ControlError::NotFound {
            target: target.into(),
        }
    }
}

/// Fatal errors raised while constructing the airspace grid.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid grid configuration: {0}")]
    InvalidConfig(String),

    #[error("grid registered {registered} cells but {expected} were requested ({collisions} spatial key collisions)")]
    CellCountMismatch {
        expected: usize,
        registered: usize,
        collisions: usize,
    },

    #[error("failed to derive spatial key: {0}")]
    SpatialKey(#[from] geohash::GeohashError),
}
