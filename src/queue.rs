//! Bounded outbound device message queue
//!
//! Producers enqueue without ever blocking; when the queue is saturated the
//! message is rejected immediately. The queue either owns a private copy of
//! each message or shares the caller's handle, as chosen per call with
//! [`QueueMode`].

use crate::observability::metrics::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error};
use uuid::Uuid;

/// Largest queue the device will allocate
pub const MAX_CAPACITY: usize = 1024;

/// Device-to-cloud message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMessage {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// JSON body. A `null` body is an empty message and cannot be queued.
    pub payload: serde_json::Value,
}

impl DeviceMessage {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            payload,
        }
    }

    pub fn is_null(&self) -> bool {
        self.payload.is_null()
    }
}

/// How the queue holds an enqueued message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// The queue clones the message and owns the clone
    Copy,
    /// The queue shares the caller's handle; the caller keeps ownership
    Reference,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Invalid argument: device message is empty")]
    InvalidArgument,
    #[error("Outgoing message queue is full (capacity {capacity})")]
    Full { capacity: usize },
    #[error("Outgoing message queue is closed")]
    Closed,
}

/// Tracks a private copy held by the queue; released on drop
#[derive(Debug)]
struct CopyGuard {
    outstanding: Arc<AtomicUsize>,
}

impl CopyGuard {
    fn new(outstanding: &Arc<AtomicUsize>) -> Self {
        outstanding.fetch_add(1, Ordering::SeqCst);
        Self {
            outstanding: outstanding.clone(),
        }
    }
}

impl Drop for CopyGuard {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A queued message. Dropping it releases whatever the queue owned.
#[derive(Debug)]
pub struct MessageEnvelope {
    message: Arc<DeviceMessage>,
    copy: Option<CopyGuard>,
}

impl MessageEnvelope {
    pub fn message(&self) -> &DeviceMessage {
        &self.message
    }

    /// Whether the queue owns a private copy of the message
    pub fn is_owned_copy(&self) -> bool {
        self.copy.is_some()
    }
}

/// Fixed-capacity FIFO of outbound device messages
#[derive(Debug)]
pub struct DeviceMessageQueue {
    capacity: usize,
    tx: mpsc::Sender<MessageEnvelope>,
    rx: Mutex<mpsc::Receiver<MessageEnvelope>>,
    closed: watch::Sender<bool>,
    outstanding_copies: Arc<AtomicUsize>,
}

impl DeviceMessageQueue {
    /// Capacity is clamped to `1..=MAX_CAPACITY`
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_CAPACITY);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            capacity,
            tx,
            rx: Mutex::new(rx),
            closed: watch::channel(false).0,
            outstanding_copies: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Private copies currently alive, queued or being consumed
    pub fn outstanding_copies(&self) -> usize {
        self.outstanding_copies.load(Ordering::SeqCst)
    }

    /// Add a message without blocking
    pub fn enqueue(
        &self,
        message: &Arc<DeviceMessage>,
        mode: QueueMode,
    ) -> Result<(), QueueError> {
        if message.is_null() {
            metrics().message_rejected();
            return Err(QueueError::InvalidArgument);
        }
        if self.is_closed() {
            metrics().message_rejected();
            return Err(QueueError::Closed);
        }

        let envelope = match mode {
            QueueMode::Copy => MessageEnvelope {
                message: Arc::new(DeviceMessage::clone(message)),
                copy: Some(CopyGuard::new(&self.outstanding_copies)),
            },
            QueueMode::Reference => MessageEnvelope {
                message: Arc::clone(message),
                copy: None,
            },
        };

        debug!(message_id = %message.id, ?mode, "Adding device message to queue");
        match self.tx.try_send(envelope) {
            Ok(()) => {
                metrics().message_enqueued();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(rejected)) => {
                // Releases the private copy, if one was made.
                drop(rejected);
                metrics().message_rejected();
                error!(
                    message_id = %message.id,
                    capacity = self.capacity,
                    "Device message rejected, outgoing message queue is full"
                );
                Err(QueueError::Full {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(rejected)) => {
                drop(rejected);
                metrics().message_rejected();
                Err(QueueError::Closed)
            }
        }
    }

    /// Wait for the oldest message. Returns `None` once the queue is closed
    /// and drained.
    pub async fn recv(&self) -> Option<MessageEnvelope> {
        let mut closed = self.closed.subscribe();
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            envelope = rx.recv() => envelope,
            _ = closed.wait_for(|closed| *closed) => {
                rx.close();
                rx.try_recv().ok()
            }
        }
    }

    /// Pop the oldest message if one is queued
    pub fn try_recv(&self) -> Option<MessageEnvelope> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Stop accepting messages and wake a pending receiver. Queued messages
    /// can still be received.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
