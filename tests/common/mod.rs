//! Scripted GATT characteristic mock for session and controller tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::mpsc::{self, UnboundedSender};

use ergolink::{GattCharacteristic, NotificationStream, TransportError};

/// Route library tracing to the test output when `RUST_LOG` is set.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

struct MockInner {
    writes: Mutex<Vec<Vec<u8>>>,
    notifications: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    fail_writes: AtomicBool,
    unsubscribed: AtomicBool,
}

/// A characteristic whose notifications are scripted by the test and
/// whose writes are recorded for inspection.
#[derive(Clone)]
pub struct MockCharacteristic {
    inner: Arc<MockInner>,
}

impl MockCharacteristic {
    /// Returns the mock plus the sender used to script notifications.
    /// Dropping the sender ends the notification stream.
    pub fn new() -> (Self, UnboundedSender<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded();
        let mock = Self {
            inner: Arc::new(MockInner {
                writes: Mutex::new(Vec::new()),
                notifications: Mutex::new(Some(rx)),
                fail_writes: AtomicBool::new(false),
                unsubscribed: AtomicBool::new(false),
            }),
        };
        (mock, tx)
    }

    /// All frames written so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.writes.lock().unwrap().clone()
    }

    /// Make subsequent writes fail at the transport level.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.inner.unsubscribed.load(Ordering::SeqCst)
    }
}

impl GattCharacteristic for MockCharacteristic {
    async fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::WriteFailed("mock write rejected".into()));
        }
        self.inner.writes.lock().unwrap().push(payload.to_vec());
        Ok(())
    }

    async fn subscribe(&self) -> Result<NotificationStream, TransportError> {
        let rx = self
            .inner
            .notifications
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::SubscriptionFailed("already subscribed".into()))?;
        Ok(Box::pin(rx))
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        self.inner.unsubscribed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
