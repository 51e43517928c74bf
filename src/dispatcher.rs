//! Outbound device message dispatcher
//!
//! Drains the device message queue in FIFO order. Each message waits for a
//! ready cloud session before it is handed to the transport, and is released
//! once the send attempt completes, successful or not.

use crate::connection::ConnectionContext;
use crate::flags::Timeout;
use crate::observability::metrics::metrics;
use crate::queue::MessageEnvelope;
use crate::transport::CloudTransport;
use std::sync::Arc;
use tracing::{debug, error, info, Instrument};

pub struct MessageDispatcher<T>
where
    T: CloudTransport + 'static,
{
    context: Arc<ConnectionContext>,
    transport: Arc<T>,
}

impl<T> MessageDispatcher<T>
where
    T: CloudTransport + 'static,
{
    pub fn new(context: Arc<ConnectionContext>, transport: Arc<T>) -> Self {
        Self { context, transport }
    }

    /// Consume messages until the queue is closed and drained
    pub async fn run(&self) {
        info!("Device message dispatcher started");
        while let Some(envelope) = self.context.queue().recv().await {
            let message_id = envelope.message().id;
            self.dispatch(envelope)
                .instrument(crate::dispatch_span!(%message_id))
                .await;
        }
        info!("Device message queue closed, dispatcher stopped");
    }

    /// Wait for a ready connection and send one message.
    ///
    /// The envelope is dropped on return, which releases the queue's copy.
    pub async fn dispatch(&self, envelope: MessageEnvelope) -> bool {
        if !self.context.await_connection(Timeout::Forever).await {
            return false;
        }

        debug!(
            owned_copy = envelope.is_owned_copy(),
            "Sending device message"
        );
        match self.transport.send_device_message(envelope.message()).await {
            Ok(()) => {
                metrics().message_sent();
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to send device message, dropping it");
                metrics().message_send_failed();
                false
            }
        }
    }
}
