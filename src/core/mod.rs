//! Core types for episode collection and training.

pub mod policy_slot;
pub mod state;
pub mod track;
pub mod transition;

pub use policy_slot::{policy_slot, PolicySlot, SharedPolicySlot};
pub use state::{StateDelta, VehicleState, OBS_SIZE};
pub use track::Track;
pub use transition::{discounted_returns, Action, Control, Transition};
