//! Events raised by the cloud transport
//!
//! These mirror the callbacks of the cloud client library. They are
//! delivered synchronously through [`CloudEventHandler`] on the transport's
//! own execution context.

use serde::{Deserialize, Serialize};

/// Firmware-update categories the cloud service can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FotaType {
    Application,
    ModemDelta,
    ModemFull,
    Bootloader,
}

impl FotaType {
    pub fn label(self) -> &'static str {
        match self {
            FotaType::Application => "Application",
            FotaType::ModemDelta => "Modem (delta)",
            FotaType::ModemFull => "Modem (full)",
            FotaType::Bootloader => "Bootloader",
        }
    }
}

/// Opaque description of the external flash used for full modem updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FotaDeviceInfo {
    pub device: String,
    pub offset: u64,
    pub size: u64,
}

/// Application payload received from the cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new<P: Into<Vec<u8>>>(payload: P) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Cloud transport event
#[derive(Debug, Clone, PartialEq)]
pub enum CloudEvent {
    /// Transport-level connection established
    Connected,
    /// Transport is attempting to connect
    Connecting,
    /// Connection attempt failed with a transport status code
    ConnectError(i32),
    /// The device must be added to a user account on the service
    UserAssociationRequest,
    /// The device is associated with a user account. Raised on every connect.
    UserAssociated,
    /// Session ready for device messages
    Ready,
    /// Sensor data acknowledged
    SensorDataAck,
    /// Transport disconnected
    Disconnected,
    /// Transport error with status code
    Error(i32),
    /// General device message from the cloud
    RxDataGeneral(InboundMessage),
    /// Shadow delta from the cloud
    RxDataShadow(InboundMessage),
    /// Firmware update job started
    FotaStart,
    /// Firmware image downloaded; `None` if the transport did not say which kind
    FotaDone(Option<FotaType>),
    /// Firmware update failed
    FotaError,
}

impl CloudEvent {
    /// Stable event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            CloudEvent::Connected => "transport_connected",
            CloudEvent::Connecting => "transport_connecting",
            CloudEvent::ConnectError(_) => "transport_connect_error",
            CloudEvent::UserAssociationRequest => "user_association_request",
            CloudEvent::UserAssociated => "user_associated",
            CloudEvent::Ready => "ready",
            CloudEvent::SensorDataAck => "sensor_data_ack",
            CloudEvent::Disconnected => "transport_disconnected",
            CloudEvent::Error(_) => "error",
            CloudEvent::RxDataGeneral(_) => "rx_data_general",
            CloudEvent::RxDataShadow(_) => "rx_data_shadow",
            CloudEvent::FotaStart => "fota_start",
            CloudEvent::FotaDone(_) => "fota_done",
            CloudEvent::FotaError => "fota_error",
        }
    }
}

/// Receiver of cloud transport events.
///
/// Called on the transport's context; implementations must return quickly
/// and never await connection state.
pub trait CloudEventHandler: Send + Sync {
    fn on_cloud_event(&self, event: CloudEvent);
}
