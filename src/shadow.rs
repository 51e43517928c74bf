//! Device shadow status publication
//!
//! Once per ready session the device reports which firmware-update kinds
//! it accepts and which UI cards the cloud portal should show for it.

use crate::config::{FeatureSection, LogOutput};
use crate::observability::metrics::metrics;
use crate::transport::{CloudTransport, FotaType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Reports whether location tracking is running
pub trait LocationStatus: Send + Sync {
    fn location_tracking_enabled(&self) -> bool;
}

impl LocationStatus for bool {
    fn location_tracking_enabled(&self) -> bool {
        *self
    }
}

/// Firmware-update kinds the device accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FotaServiceInfo {
    pub application: bool,
    pub bootloader: bool,
    pub modem: bool,
    pub modem_full: bool,
}

/// UI features the device supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiServiceInfo {
    pub gnss: bool,
    pub temperature: bool,
    pub log: bool,
    pub dictionary_log: bool,
}

/// Status descriptor sent to the shadow. Built fresh for every publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowStatus {
    pub fota: FotaServiceInfo,
    pub ui: UiServiceInfo,
}

pub struct ShadowPublisher {
    features: FeatureSection,
    location: Arc<dyn LocationStatus>,
}

impl ShadowPublisher {
    pub fn new(features: FeatureSection, location: Arc<dyn LocationStatus>) -> Self {
        Self { features, location }
    }

    /// Assemble the descriptor from configuration and collaborators
    pub fn build(&self, transport: &dyn CloudTransport) -> ShadowStatus {
        let log_backend = self.features.log_backend;
        ShadowStatus {
            fota: FotaServiceInfo {
                application: transport.is_fota_type_enabled(FotaType::Application),
                bootloader: transport.is_fota_type_enabled(FotaType::Bootloader),
                modem: transport.is_fota_type_enabled(FotaType::ModemDelta),
                modem_full: transport.is_fota_type_enabled(FotaType::ModemFull),
            },
            ui: UiServiceInfo {
                gnss: self.location.location_tracking_enabled(),
                temperature: self.features.temperature_tracking,
                log: log_backend && self.features.log_output == LogOutput::Text,
                dictionary_log: log_backend && self.features.log_output == LogOutput::Dictionary,
            },
        }
    }

    /// Build and submit the descriptor. A failed update is logged and
    /// otherwise ignored; a stale shadow is acceptable.
    pub async fn publish(&self, transport: &dyn CloudTransport) -> bool {
        let status = self.build(transport);
        match transport.shadow_update(&status).await {
            Ok(()) => {
                info!("Device shadow updated");
                metrics().shadow_updated();
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to update device shadow");
                metrics().shadow_failed();
                false
            }
        }
    }
}
