//! Action sources: the model-predictive and learned controller variants.
//!
//! Both variants satisfy one contract, `decide(state) -> Action`; the
//! learned variant carries its value estimate in the action's optional
//! `state_value` field rather than through a second method.

pub mod mpc;
pub mod policy;

use crate::core::state::VehicleState;
use crate::core::transition::Action;

pub use mpc::MpcController;
pub use policy::{ActionGrid, PolicyController, PolicyNet};

/// Controller-level failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// A required state field is absent or unusable. Signals a
    /// sensor/environment contract violation, not a controller bug.
    InvalidState { field: &'static str },
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlError::InvalidState { field } => {
                write!(f, "invalid state: required field `{}` is unusable", field)
            }
        }
    }
}

impl std::error::Error for ControlError {}

/// Polymorphic action source for the episode runner.
pub trait Controller {
    /// Compute the action for the current state.
    fn decide(&mut self, state: &VehicleState) -> Result<Action, ControlError>;
}

/// Reject states whose required fields are non-finite.
pub(crate) fn require_well_formed(state: &VehicleState) -> Result<(), ControlError> {
    if !state.velocity.is_finite() {
        return Err(ControlError::InvalidState { field: "velocity" });
    }
    if !state.location.iter().all(|c| c.is_finite()) {
        return Err(ControlError::InvalidState { field: "location" });
    }
    Ok(())
}
