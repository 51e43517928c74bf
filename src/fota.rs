//! Firmware-update collaborator interface
//!
//! Downloading and applying images is handled elsewhere. The cloud session
//! monitor only reports completed downloads here.

use crate::transport::FotaType;
use tracing::info;

pub trait FotaHandler: Send + Sync {
    /// A firmware image finished downloading
    fn on_fota_downloaded(&self, fota_type: Option<FotaType>);
}

/// Handler that only records the download in the log
#[derive(Debug, Default)]
pub struct LoggingFotaHandler;

impl FotaHandler for LoggingFotaHandler {
    fn on_fota_downloaded(&self, fota_type: Option<FotaType>) {
        info!(
            fota_type = fota_type.map(FotaType::label).unwrap_or("Invalid"),
            "Firmware image downloaded, reboot required to apply"
        );
    }
}
