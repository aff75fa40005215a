//! Closed-loop ERG power control.

pub mod controller;
pub mod ramp;

pub use controller::PowerRampController;
pub use ramp::{PowerRamp, RampConfig};
