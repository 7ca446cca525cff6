//! In-memory alert transport.
//!
//! A bounded queue decouples the alert producers (evaluator, HTTP ingest)
//! from the single consumer that feeds the diagnosis engine. `send` never
//! blocks: a full queue drops the alert with a warning, which is an accepted
//! overload response, not a fault. Per-producer FIFO order is preserved for
//! accepted events because there is exactly one consumer task.

use faultline_common::types::AlertEvent;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

pub type AlertHandler = Arc<dyn Fn(AlertEvent) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport: alert queue full")]
    QueueFull,

    #[error("Transport: bus stopped")]
    Closed,

    #[error("Transport: no alert handler set")]
    NoHandler,

    #[error("Transport: bus already started")]
    AlreadyStarted,
}

struct BusInner {
    rx: Option<mpsc::Receiver<AlertEvent>>,
    handler: Option<AlertHandler>,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

/// Bounded single-consumer alert bus.
///
/// Lifecycle: `set_handler` must be called before `start`; `stop` cancels
/// the consumer and drains whatever was already accepted.
pub struct AlertBus {
    tx: mpsc::Sender<AlertEvent>,
    capacity: usize,
    inner: Mutex<BusInner>,
}

impl AlertBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            capacity
        };
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            capacity,
            inner: Mutex::new(BusInner {
                rx: Some(rx),
                handler: None,
                task: None,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(AlertEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.handler = Some(Arc::new(handler));
    }

    /// Non-blocking enqueue from any producer. Overflow drops the alert.
    pub fn send(&self, alert: AlertEvent) -> Result<(), TransportError> {
        match self.tx.try_send(alert) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(alert)) => {
                tracing::warn!(
                    alert_id = %alert.alert_id,
                    capacity = self.capacity,
                    "Alert queue full, dropping alert"
                );
                Err(TransportError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    /// Spawn the consumer task. The handler is invoked synchronously for
    /// every accepted alert, in queue order.
    pub fn start(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        let handler = inner.handler.clone().ok_or(TransportError::NoHandler)?;
        let mut rx = inner.rx.take().ok_or(TransportError::AlreadyStarted)?;
        let cancel = inner.cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        // Drain accepted alerts before exiting.
                        while let Ok(alert) = rx.try_recv() {
                            handler(alert);
                        }
                        return;
                    }
                    maybe_alert = rx.recv() => {
                        match maybe_alert {
                            Some(alert) => handler(alert),
                            None => return,
                        }
                    }
                }
            }
        });
        inner.task = Some(task);
        Ok(())
    }

    /// Cancel the consumer and wait for it to finish draining.
    pub async fn stop(&self) {
        let handle = {
            let mut inner = self.inner.lock().unwrap();
            inner.cancel.cancel();
            inner.task.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Alerts currently queued but not yet consumed.
    pub fn queued(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
