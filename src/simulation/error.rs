//! Error taxonomy for the traffic simulation

use thiserror::Error;

use super::types::{GridPos, VehicleId};

/// Errors surfaced by network construction, routing and the tick loop
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {field}: {message}")]
    Configuration { field: String, message: String },

    #[error("no route from {from} to {to}")]
    RoutingFailure { from: GridPos, to: GridPos },

    /// A vehicle tried to move somewhere that is not the next single hop.
    /// Always a routing bug.
    #[error("vehicle {vehicle} attempted illegal move {from} -> {to}")]
    AgentStateViolation {
        vehicle: VehicleId,
        from: GridPos,
        to: GridPos,
    },

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize report: {0}")]
    Report(#[from] serde_json::Error),
}

impl SimError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        SimError::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
