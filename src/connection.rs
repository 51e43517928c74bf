//! Shared connection state and the application-facing API
//!
//! [`ConnectionContext`] owns the network, cloud and date-time flag sets,
//! the inbound message handler slot and the outbound message queue. It is
//! shared by `Arc` between the orchestrator, the event monitors and
//! application code.

use crate::flags::{cloud, date_time, network, ConditionFlags, Timeout};
use crate::queue::{DeviceMessage, DeviceMessageQueue, QueueError, QueueMode};
use crate::transport::InboundMessage;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Callback receiving general device messages from the cloud.
///
/// Runs on the cloud transport's context, so it must not block for long.
pub type InboundMessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

pub struct ConnectionContext {
    network: ConditionFlags,
    cloud: ConditionFlags,
    date_time: ConditionFlags,
    inbound_handler: RwLock<Option<InboundMessageHandler>>,
    queue: DeviceMessageQueue,
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("network", &self.network.peek())
            .field("cloud", &self.cloud.peek())
            .field("date_time", &self.date_time.peek())
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl ConnectionContext {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            network: ConditionFlags::new("network"),
            cloud: ConditionFlags::new("cloud"),
            date_time: ConditionFlags::new("date_time"),
            inbound_handler: RwLock::new(None),
            queue: DeviceMessageQueue::new(queue_capacity),
        }
    }

    pub fn network_flags(&self) -> &ConditionFlags {
        &self.network
    }

    pub fn cloud_flags(&self) -> &ConditionFlags {
        &self.cloud
    }

    pub fn date_time_flags(&self) -> &ConditionFlags {
        &self.date_time
    }

    pub fn queue(&self) -> &DeviceMessageQueue {
        &self.queue
    }

    // ========== APPLICATION API ==========

    /// Wait for the cellular network. True if connected before the timeout.
    pub async fn await_network_connection(&self, timeout: Timeout) -> bool {
        debug!("Awaiting network connection");
        self.network.wait_all(network::CONNECTED, timeout).await != 0
    }

    /// Wait until the modem knows the current date and time
    pub async fn await_date_time_known(&self, timeout: Timeout) -> bool {
        self.date_time.wait_any(date_time::KNOWN, timeout).await != 0
    }

    /// Wait for network connectivity and then a ready cloud session.
    ///
    /// The timeout applies to each of the two waits separately.
    pub async fn await_connection(&self, timeout: Timeout) -> bool {
        self.await_network_connection(timeout).await && self.await_cloud_ready(timeout, false).await
    }

    /// Whether the cloud transport is connected (not necessarily ready)
    pub fn is_connected(&self) -> bool {
        self.cloud.is_set(cloud::CONNECTED)
    }

    /// Whether a disconnect has been detected or requested and the reset has
    /// not happened yet
    pub fn is_disconnecting(&self) -> bool {
        self.cloud.is_set(cloud::DISCONNECTED)
    }

    pub async fn await_disconnection(&self, timeout: Timeout) -> bool {
        self.cloud.wait_any(cloud::DISCONNECTED, timeout).await != 0
    }

    /// Ask the orchestrator to drop the cloud session and reconnect
    pub fn request_disconnect(&self) {
        self.cloud.post(cloud::DISCONNECTED);
    }

    /// Install the general device message handler, replacing any previous one.
    /// Intended to be called during initialization.
    pub fn register_inbound_message_handler<F>(&self, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let mut slot = self
            .inbound_handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(handler));
    }

    pub fn enqueue_device_message(
        &self,
        message: &Arc<DeviceMessage>,
        mode: QueueMode,
    ) -> Result<(), QueueError> {
        self.queue.enqueue(message, mode)
    }

    // ========== INTERNAL SIGNALS ==========

    pub(crate) fn notify_network_connected(&self) {
        self.network.post(network::CONNECTED);
    }

    pub(crate) fn clear_network_connected(&self) {
        self.network.reset();
    }

    pub(crate) fn notify_date_time_known(&self) {
        self.date_time.post(date_time::KNOWN);
    }

    pub(crate) fn notify_cloud_connected(&self) {
        self.cloud.post(cloud::CONNECTED);
    }

    pub(crate) fn notify_cloud_ready(&self) {
        self.cloud.post(cloud::READY);
    }

    pub(crate) fn notify_association_requested(&self) {
        self.cloud.post(cloud::ASSOCIATION_REQUEST);
    }

    pub(crate) fn has_requested_association(&self) -> bool {
        self.cloud.is_set(cloud::ASSOCIATION_REQUEST)
    }

    /// Return to the initial cloud state: every cloud bit cleared together
    pub(crate) fn clear_cloud_state(&self) {
        self.cloud.reset();
    }

    pub(crate) async fn await_cloud_connected(&self, timeout: Timeout) -> bool {
        debug!("Awaiting cloud connection");
        self.cloud.wait_any(cloud::CONNECTED, timeout).await != 0
    }

    /// Wait for the session to become ready. With `timeout_on_disconnection`
    /// a disconnect ends the wait early and counts as a timeout.
    pub(crate) async fn await_cloud_ready(
        &self,
        timeout: Timeout,
        timeout_on_disconnection: bool,
    ) -> bool {
        debug!("Awaiting cloud ready");
        let mut condition = cloud::READY;
        if timeout_on_disconnection {
            condition |= cloud::DISCONNECTED;
        }
        self.cloud.wait_any(condition, timeout).await == cloud::READY
    }

    pub(crate) fn inbound_handler(&self) -> Option<InboundMessageHandler> {
        self.inbound_handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
