//! btleplug-backed GATT transport for FTMS trainers.

use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::time::timeout;
use uuid::Uuid;

use crate::ftms::protocol::{FTMS_CONTROL_POINT_UUID, FTMS_SERVICE_UUID, INDOOR_BIKE_DATA_UUID};
use crate::ftms::session::FtmsSession;
use crate::ftms::types::{ProtocolError, SessionConfig};
use crate::transport::{GattCharacteristic, NotificationStream, TransportError};

/// A GATT characteristic on a connected peripheral.
pub struct BleCharacteristic {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

impl GattCharacteristic for BleCharacteristic {
    async fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.peripheral
            .write(&self.characteristic, payload, WriteType::WithResponse)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    async fn subscribe(&self) -> Result<NotificationStream, TransportError> {
        self.peripheral
            .subscribe(&self.characteristic)
            .await
            .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))?;

        // btleplug delivers one notification stream per peripheral;
        // filter it down to this characteristic.
        let uuid = self.characteristic.uuid;
        let notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))?;

        Ok(Box::pin(notifications.filter_map(move |notification| {
            async move { (notification.uuid == uuid).then_some(notification.value) }
        })))
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        self.peripheral
            .unsubscribe(&self.characteristic)
            .await
            .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))
    }
}

/// BLE central wrapping the first available system adapter.
pub struct BleCentral {
    adapter: Adapter,
}

impl BleCentral {
    /// Initialize the BLE adapter.
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::Ble(e.to_string()))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| TransportError::Ble(e.to_string()))?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(TransportError::AdapterNotFound)?;

        tracing::info!("BLE adapter initialized");
        Ok(Self { adapter })
    }

    /// Scan for the first peripheral advertising the FTMS service.
    pub async fn find_trainer(&self, scan_timeout: Duration) -> Result<Peripheral, TransportError> {
        tracing::info!("scanning for FTMS trainers");

        let scan_filter = ScanFilter {
            services: vec![FTMS_SERVICE_UUID],
        };
        self.adapter
            .start_scan(scan_filter)
            .await
            .map_err(|e| TransportError::ScanFailed(e.to_string()))?;

        let found = timeout(scan_timeout, self.first_ftms_peripheral()).await;

        if let Err(e) = self.adapter.stop_scan().await {
            tracing::warn!("failed to stop scan: {}", e);
        }

        match found {
            Ok(result) => result,
            Err(_) => Err(TransportError::DeviceNotFound),
        }
    }

    async fn first_ftms_peripheral(&self) -> Result<Peripheral, TransportError> {
        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| TransportError::Ble(e.to_string()))?;

        while let Some(event) = events.next().await {
            let CentralEvent::DeviceDiscovered(id) = event else {
                continue;
            };

            let peripherals = match self.adapter.peripherals().await {
                Ok(peripherals) => peripherals,
                Err(_) => continue,
            };

            for peripheral in peripherals {
                if peripheral.id() != id {
                    continue;
                }
                if let Some(name) = Self::ftms_advertisement(&peripheral).await {
                    tracing::info!(%name, "found FTMS trainer");
                    return Ok(peripheral);
                }
            }
        }

        Err(TransportError::DeviceNotFound)
    }

    /// The advertised name, if the peripheral advertises FTMS.
    async fn ftms_advertisement(peripheral: &Peripheral) -> Option<String> {
        let properties = peripheral.properties().await.ok()??;
        if !properties.services.contains(&FTMS_SERVICE_UUID) {
            return None;
        }
        Some(
            properties
                .local_name
                .unwrap_or_else(|| "Unknown Trainer".to_string()),
        )
    }

    /// Connect to a trainer and establish an FTMS session over its
    /// control point and Indoor Bike Data characteristics.
    pub async fn connect(
        &self,
        peripheral: Peripheral,
        config: SessionConfig,
    ) -> Result<BleTrainer, ProtocolError> {
        let connect_timeout = Duration::from_secs(config.connection_timeout_secs);
        let connected = timeout(connect_timeout, peripheral.connect())
            .await
            .map_err(|_| TransportError::ConnectionTimeout)?;
        connected.map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let control_point = Self::characteristic(&peripheral, FTMS_CONTROL_POINT_UUID)?;
        let bike_data = Self::characteristic(&peripheral, INDOOR_BIKE_DATA_UUID)?;

        let session = FtmsSession::establish(control_point, bike_data, config).await?;
        tracing::info!("connected to trainer");

        Ok(BleTrainer {
            peripheral,
            session,
        })
    }

    /// Scan, connect, and establish a session in one step.
    pub async fn open_session(&self, config: SessionConfig) -> Result<BleTrainer, ProtocolError> {
        let scan_timeout = Duration::from_secs(config.scan_timeout_secs);
        let peripheral = self.find_trainer(scan_timeout).await?;
        self.connect(peripheral, config).await
    }

    fn characteristic(
        peripheral: &Peripheral,
        uuid: Uuid,
    ) -> Result<BleCharacteristic, TransportError> {
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicMissing(uuid))?;

        Ok(BleCharacteristic {
            peripheral: peripheral.clone(),
            characteristic,
        })
    }
}

/// A connected trainer: the FTMS session plus the peripheral it rides on.
pub struct BleTrainer {
    peripheral: Peripheral,
    /// The FTMS session over the trainer's characteristics.
    pub session: FtmsSession<BleCharacteristic>,
}

impl BleTrainer {
    /// Shut the session down and disconnect from the trainer.
    pub async fn disconnect(mut self) {
        self.session.shutdown().await;
        if let Err(e) = self.peripheral.disconnect().await {
            tracing::warn!("trainer disconnect failed: {}", e);
        }
    }
}
