//! Cloud session monitor
//!
//! Maps cloud transport events onto the cloud flag set, forwards inbound
//! device messages to the application handler and completed firmware
//! downloads to the FOTA collaborator.

use crate::connection::ConnectionContext;
use crate::fota::FotaHandler;
use crate::observability::metrics::metrics;
use crate::transport::{CloudEvent, CloudEventHandler, FotaType};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CloudSessionMonitor {
    context: Arc<ConnectionContext>,
    fota: Arc<dyn FotaHandler>,
}

impl CloudSessionMonitor {
    pub fn new(context: Arc<ConnectionContext>, fota: Arc<dyn FotaHandler>) -> Self {
        Self { context, fota }
    }

    fn handle_association_request(&self) {
        info!("Please add this device to your cloud account in the cloud portal.");
        // The next UserAssociated event will now force a reconnect.
        self.context.notify_association_requested();
    }

    fn handle_associated(&self) {
        // Raised on every connect; only a first-time association needs a reconnect.
        if self.context.has_requested_association() {
            info!("Device successfully associated with cloud!");
            metrics().forced_disconnect();
            self.context.request_disconnect();
        }
    }
}

impl CloudEventHandler for CloudSessionMonitor {
    fn on_cloud_event(&self, event: CloudEvent) {
        debug!(event = event.name(), "Cloud transport event");

        match event {
            CloudEvent::Connected => self.context.notify_cloud_connected(),
            CloudEvent::Connecting => {}
            CloudEvent::ConnectError(status) => {
                debug!(status, "Cloud connect error");
            }
            CloudEvent::UserAssociationRequest => self.handle_association_request(),
            CloudEvent::UserAssociated => self.handle_associated(),
            CloudEvent::Ready => self.context.notify_cloud_ready(),
            CloudEvent::SensorDataAck => {}
            CloudEvent::Disconnected => self.context.request_disconnect(),
            CloudEvent::Error(status) => {
                warn!(status, "Cloud transport error, treating as disconnect");
                self.context.request_disconnect();
            }
            CloudEvent::RxDataGeneral(message) => {
                debug!(bytes = message.len(), "Device message received from cloud");
                metrics().inbound_message();
                match self.context.inbound_handler() {
                    Some(handler) => handler(&message),
                    None => debug!("No inbound message handler registered, dropping message"),
                }
            }
            CloudEvent::RxDataShadow(message) => {
                debug!(bytes = message.len(), "Shadow data received from cloud");
            }
            CloudEvent::FotaStart => {}
            CloudEvent::FotaDone(fota_type) => {
                debug!(
                    fota_type = fota_type.map(FotaType::label).unwrap_or("Invalid"),
                    "Firmware update download complete"
                );
                self.fota.on_fota_downloaded(fota_type);
            }
            CloudEvent::FotaError => {
                warn!("Firmware update failed");
            }
        }
    }
}
