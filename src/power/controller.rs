//! Closed-loop power controller driving an FTMS session.

use std::time::Instant;

use tokio::sync::broadcast::error::RecvError;

use crate::ftms::protocol::BikeDataSample;
use crate::ftms::session::FtmsSession;
use crate::ftms::types::ProtocolError;
use crate::power::ramp::{PowerRamp, RampConfig};
use crate::transport::GattCharacteristic;

/// Owns an [`FtmsSession`] and smooths delivered power toward a requested
/// target by recomputing the applied target on every bike data sample.
///
/// Failed target-power writes are reported to the caller and not retried;
/// the ramp state still advances, so the next sample sends the further
/// diverged value again.
pub struct PowerRampController<C: GattCharacteristic> {
    session: FtmsSession<C>,
    ramp: PowerRamp,
}

impl<C: GattCharacteristic> PowerRampController<C> {
    pub fn new(session: FtmsSession<C>, config: RampConfig) -> Self {
        Self {
            session,
            ramp: PowerRamp::new(config, Instant::now()),
        }
    }

    /// The underlying session, for handshake and start/stop commands.
    pub fn session(&self) -> &FtmsSession<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut FtmsSession<C> {
        &mut self.session
    }

    /// Give the session back, discarding the ramp state.
    pub fn into_session(self) -> FtmsSession<C> {
        self.session
    }

    /// The rounded target currently applied to the machine.
    pub fn applied_target(&self) -> i16 {
        self.ramp.applied_target()
    }

    /// Update the requested target and immediately push the current
    /// applied target to the machine. The applied target is not snapped
    /// to the new request; the next sample tick ramps toward it.
    pub async fn set_target(&mut self, watts: i16) -> Result<bool, ProtocolError> {
        let applied = self.ramp.set_target(watts);
        tracing::debug!(requested = watts, applied, "power target updated");
        self.session.set_target_power(applied).await
    }

    /// Feed one bike data sample through the ramp, issuing a Set Target
    /// Power command when the applied target changed. Returns `Ok(true)`
    /// when no command was needed.
    pub async fn handle_sample(&mut self, sample: BikeDataSample) -> Result<bool, ProtocolError> {
        match self.ramp.on_sample(sample.power_watts, Instant::now()) {
            Some(applied) => self.session.set_target_power(applied).await,
            None => Ok(true),
        }
    }

    /// Drive the controller from the session's sample stream.
    ///
    /// Runs until the stream closes (session shutdown); a lagging
    /// receiver resyncs and continues. Typically raced inside a `select!`
    /// against the caller's stop signal.
    pub async fn run(&mut self) -> Result<(), ProtocolError> {
        let mut samples = self.session.power_stream();
        loop {
            match samples.recv().await {
                Ok(sample) => {
                    if !self.handle_sample(sample).await? {
                        tracing::warn!("target power write failed; retrying on next sample");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "sample stream lagging; resyncing");
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}
