//! FTMS session: control point handshake, command issuance, and
//! notification dispatch for one connected machine.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::ftms::protocol::{opcode, BikeDataSample, ControlPointCommand, ControlPointResponse};
use crate::ftms::types::{ProtocolError, SessionConfig};
use crate::transport::{GattCharacteristic, NotificationStream};

/// Buffered samples per subscriber before a slow observer starts lagging.
const SAMPLE_CHANNEL_CAPACITY: usize = 32;

/// One FTMS session per connected machine.
///
/// The session exclusively owns the control point and Indoor Bike Data
/// characteristic handles. Responses on the control point carry no request
/// ID, so at most one command may be in flight at a time; command methods
/// take `&mut self`, which serializes control point access by exclusive
/// borrow. Wrap the session in a mutex or single-writer task before
/// sharing it across threads.
pub struct FtmsSession<C: GattCharacteristic> {
    control_point: C,
    bike_data: C,
    config: SessionConfig,
    has_control: bool,
    control_responses: NotificationStream,
    samples: Option<broadcast::Sender<BikeDataSample>>,
    decode_task: Option<JoinHandle<()>>,
}

impl<C: GattCharacteristic> FtmsSession<C> {
    /// Subscribe to both characteristics and start decoding bike data.
    ///
    /// The control point response stream is retained for request
    /// correlation; bike data frames are decoded on a background task and
    /// fanned out through [`FtmsSession::power_stream`]. Malformed bike
    /// data frames are dropped so a single bad packet never breaks the
    /// session.
    pub async fn establish(
        control_point: C,
        bike_data: C,
        config: SessionConfig,
    ) -> Result<Self, ProtocolError> {
        let control_responses = control_point.subscribe().await?;
        let mut frames = bike_data.subscribe().await?;

        let (samples, _) = broadcast::channel(SAMPLE_CHANNEL_CAPACITY);
        let sample_tx = samples.clone();

        let decode_task = tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                match BikeDataSample::parse(&frame) {
                    Ok(sample) => {
                        tracing::trace!(power = sample.power_watts, "bike data sample");
                        let _ = sample_tx.send(sample);
                    }
                    Err(e) => {
                        tracing::trace!("dropping bike data frame: {}", e);
                    }
                }
            }
            tracing::debug!("bike data notification stream ended");
        });

        tracing::info!("FTMS session established");

        Ok(Self {
            control_point,
            bike_data,
            config,
            has_control: false,
            control_responses,
            samples: Some(samples),
            decode_task: Some(decode_task),
        })
    }

    /// Whether a control handshake has succeeded on this session.
    pub fn has_control(&self) -> bool {
        self.has_control
    }

    /// Perform the control acquisition handshake.
    ///
    /// Writes Request Control and waits for the response echoing opcode
    /// `0x00`, under the configured timeout. Frames that are not a
    /// matching response are skipped, never treated as errors. A rejected
    /// write resolves to `Ok(false)`; a missing response fails with
    /// [`ProtocolError::NoResponse`]. `has_control` reflects the outcome
    /// either way.
    pub async fn acquire_control(&mut self) -> Result<bool, ProtocolError> {
        self.has_control = false;

        tracing::debug!("requesting machine control");
        let frame = ControlPointCommand::RequestControl.encode();
        if let Err(e) = self.control_point.write(&frame).await {
            tracing::warn!("request control write failed: {}", e);
            return Ok(false);
        }

        let deadline = Instant::now() + Duration::from_secs(self.config.response_timeout_secs);
        loop {
            let frame = match timeout_at(deadline, self.control_responses.next()).await {
                Ok(Some(frame)) => frame,
                Ok(None) | Err(_) => return Err(ProtocolError::NoResponse),
            };

            let response = match ControlPointResponse::parse(&frame) {
                Ok(response) => response,
                Err(_) => {
                    tracing::trace!("ignoring non-response control point frame");
                    continue;
                }
            };

            if response.request_opcode != opcode::REQUEST_CONTROL {
                tracing::trace!(
                    opcode = response.request_opcode,
                    "ignoring response for other opcode"
                );
                continue;
            }

            self.has_control = response.is_success();
            if self.has_control {
                tracing::info!("machine control granted");
            } else {
                tracing::warn!(
                    result_code = response.result_code,
                    "machine control denied"
                );
            }
            return Ok(self.has_control);
        }
    }

    /// Start or resume training.
    ///
    /// Fire-and-forget: success means the transport acknowledged the
    /// write, not that the machine confirmed the command.
    pub async fn start(&mut self) -> Result<bool, ProtocolError> {
        self.send_command(ControlPointCommand::Start).await
    }

    /// Stop training. Fire-and-forget, like [`FtmsSession::start`].
    pub async fn stop(&mut self) -> Result<bool, ProtocolError> {
        self.send_command(ControlPointCommand::Stop).await
    }

    /// Set the ERG mode target power in watts.
    pub async fn set_target_power(&mut self, watts: i16) -> Result<bool, ProtocolError> {
        self.send_command(ControlPointCommand::SetTargetPower(watts))
            .await
    }

    async fn send_command(&mut self, command: ControlPointCommand) -> Result<bool, ProtocolError> {
        if !self.has_control {
            return Err(ProtocolError::ControlNotGranted);
        }

        match self.control_point.write(&command.encode()).await {
            Ok(()) => {
                tracing::debug!(?command, "control point command sent");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(?command, "control point write failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Subscribe to decoded bike data samples.
    ///
    /// Each receiver observes future notifications only. After shutdown
    /// the returned receiver is already closed.
    pub fn power_stream(&self) -> broadcast::Receiver<BikeDataSample> {
        match &self.samples {
            Some(samples) => samples.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }

    /// Invoke `callback` with the instantaneous power of every future
    /// sample. Dropping the returned handle (or calling
    /// [`PowerSubscription::unsubscribe`]) stops delivery.
    pub fn on_power<F>(&self, mut callback: F) -> PowerSubscription
    where
        F: FnMut(i16) + Send + 'static,
    {
        let mut samples = self.power_stream();
        let task = tokio::spawn(async move {
            loop {
                match samples.recv().await {
                    Ok(sample) => callback(sample.power_watts),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "power observer lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        PowerSubscription { task }
    }

    /// Tear the session down: stop the decode task and notifications on
    /// both characteristics. Best-effort; teardown errors are logged and
    /// absorbed. Control is relinquished, so subsequent commands fail
    /// with [`ProtocolError::ControlNotGranted`].
    pub async fn shutdown(&mut self) {
        tracing::info!("shutting down FTMS session");
        self.has_control = false;
        self.samples.take();

        if let Some(task) = self.decode_task.take() {
            task.abort();
        }

        if let Err(e) = self.bike_data.unsubscribe().await {
            tracing::warn!("failed to stop bike data notifications: {}", e);
        }
        if let Err(e) = self.control_point.unsubscribe().await {
            tracing::warn!("failed to stop control point notifications: {}", e);
        }
    }
}

impl<C: GattCharacteristic> Drop for FtmsSession<C> {
    fn drop(&mut self) {
        if let Some(task) = &self.decode_task {
            task.abort();
        }
    }
}

/// Handle for an active [`FtmsSession::on_power`] subscription.
pub struct PowerSubscription {
    task: JoinHandle<()>,
}

impl PowerSubscription {
    /// Stop delivering samples to the callback.
    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

impl Drop for PowerSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
