//! Modem and radio-link collaborator interface
//!
//! Bringing up the modem and attaching to the cellular network is done by
//! an external library. The connection subsystem calls it through [`Modem`]
//! and receives link notifications through [`LinkEventHandler`].

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Network registration status reported by the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationStatus {
    NotRegistered,
    RegisteredHome,
    Searching,
    RegistrationDenied,
    Unknown,
    RegisteredRoaming,
    RegisteredEmergency,
    UiccFail,
}

impl RegistrationStatus {
    /// Only home and roaming registration give data connectivity
    pub fn is_registered(self) -> bool {
        matches!(
            self,
            RegistrationStatus::RegisteredHome | RegistrationStatus::RegisteredRoaming
        )
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RegistrationStatus::NotRegistered => "Not Registered",
            RegistrationStatus::RegisteredHome => "Registered Home",
            RegistrationStatus::Searching => "Searching",
            RegistrationStatus::RegistrationDenied => "Registration Denied",
            RegistrationStatus::Unknown => "Unknown",
            RegistrationStatus::RegisteredRoaming => "Registered Roaming",
            RegistrationStatus::RegisteredEmergency => "Registered Emergency",
            RegistrationStatus::UiccFail => "UICC Fail",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RrcMode {
    Connected,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LteMode {
    None,
    LteM,
    NbIot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemDomainEvent {
    LightSearchDone,
    SearchDone,
    ResetLoop,
    BatteryLow,
    Overheated,
}

/// Notification from the radio link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Registration(RegistrationStatus),
    PsmUpdate { tau: i32, active_time: i32 },
    EdrxUpdate { edrx: f32, ptw: f32 },
    RrcUpdate(RrcMode),
    CellUpdate { id: u32, tac: u32 },
    LteModeUpdate(LteMode),
    ModemEvent(ModemDomainEvent),
}

/// Receiver of radio link events. Must return quickly.
pub trait LinkEventHandler: Send + Sync {
    fn on_link_event(&self, event: LinkEvent);
}

/// Notification from the date-time library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeEvent {
    /// Whether the modem currently has a valid wall-clock time
    pub time_valid: bool,
}

/// Receiver of date-time notifications. Must return quickly.
pub trait DateTimeHandler: Send + Sync {
    fn on_date_time_event(&self, event: DateTimeEvent);
}

/// Result of initializing the modem library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemInitOutcome {
    Initialized,
    /// A pending modem firmware update was applied during init
    FirmwareUpdated,
    /// A pending modem firmware update failed; the modem still works
    FirmwareUpdateFailed(i32),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModemError {
    #[error("Modem library initialization failed, error: {0}")]
    InitFailed(i32),
    #[error("Failed to set PSM parameters, error: {0}")]
    PsmRequestFailed(i32),
    #[error("Enabling modem events failed, error: {0}")]
    EventsUnavailable(i32),
    #[error("Modem could not be configured, error: {0}")]
    ConnectFailed(i32),
}

/// Modem and network bring-up operations
#[async_trait::async_trait]
pub trait Modem: Send + Sync {
    async fn init(&self) -> Result<ModemInitOutcome, ModemError>;

    /// Ask to be told when the modem learns the current time
    fn register_date_time_handler(&self, handler: Arc<dyn DateTimeHandler>);

    async fn request_psm(&self, enable: bool) -> Result<(), ModemError>;

    async fn enable_modem_events(&self) -> Result<(), ModemError>;

    /// Start attaching to the network. The modem keeps re-attaching on its
    /// own after this call; progress is reported to `handler`.
    async fn connect_async(&self, handler: Arc<dyn LinkEventHandler>) -> Result<(), ModemError>;
}
