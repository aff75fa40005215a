//! FTMS (Fitness Machine Service) protocol and session handling.

pub mod protocol;
pub mod session;
pub mod types;

pub use protocol::{
    BikeDataSample, ControlPointCommand, ControlPointResponse, FTMS_CONTROL_POINT_UUID,
    FTMS_SERVICE_UUID, INDOOR_BIKE_DATA_UUID,
};
pub use session::{FtmsSession, PowerSubscription};
pub use types::{ProtocolError, SessionConfig};
