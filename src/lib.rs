//! ergolink - FTMS smart trainer control.
//!
//! Controls a smart indoor bicycle trainer over the Bluetooth Low Energy
//! Fitness Machine Service: establishes a GATT session, negotiates
//! exclusive control via the FTMS Control Point, issues power-target and
//! start/stop commands, decodes streamed Indoor Bike Data notifications,
//! and runs a closed-loop controller that smooths delivered power toward
//! a requested target.

pub mod ftms;
pub mod power;
pub mod transport;

// Re-export commonly used types
pub use ftms::protocol::{BikeDataSample, ControlPointCommand, ControlPointResponse};
pub use ftms::session::{FtmsSession, PowerSubscription};
pub use ftms::types::{ProtocolError, SessionConfig};
pub use power::controller::PowerRampController;
pub use power::ramp::{PowerRamp, RampConfig};
pub use transport::{
    BleCentral, BleCharacteristic, BleTrainer, GattCharacteristic, NotificationStream,
    TransportError,
};
