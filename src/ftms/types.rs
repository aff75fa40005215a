//! Session-level error and configuration types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;

/// Errors crossing the FTMS protocol boundary.
///
/// Command operations report machine-side rejection as `Ok(false)` rather
/// than an error; these variants cover the cases where no meaningful
/// boolean outcome exists.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// No matching control point response arrived before the timeout
    #[error("No control point response received before timeout")]
    NoResponse,

    /// Command attempted without a successful control handshake
    #[error("Machine control not granted")]
    ControlNotGranted,

    /// Notification frame did not match the expected layout
    #[error("Malformed notification frame")]
    MalformedNotification,

    /// Failure from the underlying BLE transport
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Configuration for an FTMS session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Timeout for a control point response in seconds
    pub response_timeout_secs: u64,
    /// Timeout for trainer discovery scan in seconds
    pub scan_timeout_secs: u64,
    /// Timeout for a connection attempt in seconds
    pub connection_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: 5,
            scan_timeout_secs: 30,
            connection_timeout_secs: 10,
        }
    }
}
