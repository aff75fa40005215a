//! GATT transport seam between the FTMS core and the BLE stack.
//!
//! The session only needs three primitives from a characteristic: write a
//! raw frame, subscribe to its notification stream, and stop notifications.
//! Expressing that as a trait keeps the protocol layer testable against a
//! scripted transport while the `ble` module provides the btleplug-backed
//! implementation for real hardware.

use std::future::Future;
use std::pin::Pin;

use futures::Stream;
use thiserror::Error;
use uuid::Uuid;

pub mod ble;

pub use ble::{BleCentral, BleCharacteristic, BleTrainer};

/// Lazy, infinite stream of raw notification payloads.
///
/// The stream is not restartable: a fresh subscription observes future
/// notifications only.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Errors from the underlying BLE stack.
#[derive(Debug, Error)]
pub enum TransportError {
    /// BLE adapter not found or unavailable
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Failed to start BLE scanning
    #[error("Failed to start scanning: {0}")]
    ScanFailed(String),

    /// No device advertising the FTMS service was found
    #[error("No FTMS trainer found")]
    DeviceNotFound,

    /// Connection to the trainer failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timed out
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// Required GATT characteristic missing on the connected device
    #[error("Characteristic {0} missing on device")]
    CharacteristicMissing(Uuid),

    /// Characteristic write rejected by the stack
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Failed to subscribe to or stop notifications
    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    /// Other BLE stack error
    #[error("BLE error: {0}")]
    Ble(String),
}

/// A writable and/or notifiable GATT characteristic handle.
///
/// Handles are exclusively owned by the session that drives them; the
/// session serializes writes by requiring `&mut self` on its command
/// methods, so implementations do not need their own write locking.
pub trait GattCharacteristic: Send + Sync + 'static {
    /// Write a raw frame to the characteristic.
    fn write(&self, payload: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Enable notifications and return the payload stream.
    fn subscribe(&self)
        -> impl Future<Output = Result<NotificationStream, TransportError>> + Send;

    /// Stop notifications.
    fn unsubscribe(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
