//! # CarveKit Core
//!
//! Core types for the CarveKit G-code sender:
//! - Machine status data model (positions, states, pins)
//! - Job lifecycle and progress types
//! - Error taxonomy
//! - Event dispatch for controller notifications

pub mod data;
pub mod error;
pub mod event;

pub use data::{
    Axis, JobProgress, JobState, MachineState, MachineStatus, OverrideValues, PinState, Position4,
};
pub use error::{ConnectionError, ControllerError, Error, Result};
pub use event::{ControllerEvent, EventDispatcher};
