//! Cloud transport abstraction
//!
//! The transport owns the socket and the cloud protocol. The connection
//! subsystem only drives it through this trait and listens to the events it
//! raises, which keeps the orchestrator testable without a network.

use crate::queue::DeviceMessage;
use crate::shadow::ShadowStatus;
use std::sync::Arc;
use thiserror::Error;

pub mod events;

pub use events::{CloudEvent, CloudEventHandler, FotaDeviceInfo, FotaType, InboundMessage};

/// Cloud transport errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// The operation needs a connection and there is none.
    /// Benign when returned from [`CloudTransport::disconnect`].
    #[error("Not connected to the cloud")]
    NotConnected,
    #[error("Transport initialization failed: {0}")]
    InitFailed(String),
    #[error("Connect request failed: {0}")]
    ConnectFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Transport returned error code {0}")]
    Code(i32),
}

/// Parameters handed to the transport once at startup
#[derive(Clone)]
pub struct TransportInit {
    /// Receives every transport event for the lifetime of the process
    pub event_handler: Arc<dyn CloudEventHandler>,
    pub application_version: String,
    pub fota_device_info: Option<FotaDeviceInfo>,
}

impl std::fmt::Debug for TransportInit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportInit")
            .field("application_version", &self.application_version)
            .field("fota_device_info", &self.fota_device_info)
            .finish_non_exhaustive()
    }
}

/// Cloud transport operations consumed by the connection subsystem
#[async_trait::async_trait]
pub trait CloudTransport: Send + Sync {
    /// Initialize the client library. Called exactly once.
    async fn init(&self, params: TransportInit) -> Result<(), TransportError>;

    /// Request a connection. Completion is reported through events.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the connection
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Publish the device status descriptor to the shadow
    async fn shadow_update(&self, status: &ShadowStatus) -> Result<(), TransportError>;

    /// Whether the transport can apply the given firmware-update category
    fn is_fota_type_enabled(&self, fota_type: FotaType) -> bool;

    /// Send one queued device message
    async fn send_device_message(&self, message: &DeviceMessage) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    impl CloudEventHandler for NoopHandler {
        fn on_cloud_event(&self, _event: CloudEvent) {}
    }

    #[test]
    fn test_transport_error_display() {
        let errors = vec![
            TransportError::NotConnected,
            TransportError::InitFailed("bad".to_string()),
            TransportError::ConnectFailed("dns".to_string()),
            TransportError::SendFailed("closed".to_string()),
            TransportError::Code(-13),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_transport_init_debug_omits_handler() {
        let init = TransportInit {
            event_handler: Arc::new(NoopHandler),
            application_version: "1.0.0".to_string(),
            fota_device_info: None,
        };
        let debug = format!("{init:?}");
        assert!(debug.contains("1.0.0"));
        assert!(!debug.contains("event_handler"));
    }
}
