//! Pure connection phase transitions
//!
//! The orchestrator's lifecycle as an explicit state enum plus a transition
//! table. Nothing here performs I/O, so every transition is unit-testable.

use std::fmt;

/// Phase of the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    Init,
    /// Modem library initialized
    ModemReady,
    /// Cloud client library initialized
    CloudClientReady,
    /// Network attach requested; the modem keeps the link up from here on
    NetworkBringupRequested,
    WaitNetwork,
    /// Issuing connect requests until the transport reports connected
    ConnectingCloud,
    /// Connected, waiting for the session to become ready
    WaitCloudReady,
    /// Session ready; the shadow is published here
    Connected,
    WaitDisconnect,
    /// Settling, disconnecting the transport and clearing cloud flags
    Resetting,
    /// Waiting before the next network wait
    Backoff,
    /// Setup failed; the subsystem does nothing further
    Halted,
}

impl ConnectionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionPhase::Init => "init",
            ConnectionPhase::ModemReady => "modem_ready",
            ConnectionPhase::CloudClientReady => "cloud_client_ready",
            ConnectionPhase::NetworkBringupRequested => "network_bringup_requested",
            ConnectionPhase::WaitNetwork => "wait_network",
            ConnectionPhase::ConnectingCloud => "connecting_cloud",
            ConnectionPhase::WaitCloudReady => "wait_cloud_ready",
            ConnectionPhase::Connected => "connected",
            ConnectionPhase::WaitDisconnect => "wait_disconnect",
            ConnectionPhase::Resetting => "resetting",
            ConnectionPhase::Backoff => "backoff",
            ConnectionPhase::Halted => "halted",
        }
    }

    /// One-shot setup phases, where any failure is fatal
    pub fn is_setup(self) -> bool {
        matches!(
            self,
            ConnectionPhase::Init
                | ConnectionPhase::ModemReady
                | ConnectionPhase::CloudClientReady
                | ConnectionPhase::NetworkBringupRequested
        )
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome observed by the orchestrator that drives a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    SetupSucceeded,
    SetupFailed,
    NetworkUp,
    /// The per-attempt connect wait elapsed; the connect is re-issued
    ConnectTimedOut,
    CloudConnected,
    CloudReady,
    /// Ready wait elapsed or the session dropped before becoming ready
    ReadyTimedOut,
    ShadowPublished,
    Disconnected,
    ResetComplete,
    BackoffElapsed,
}

/// Apply `event` to `phase`.
///
/// Returns `None` when the event is not valid in that phase.
pub fn next_phase(phase: ConnectionPhase, event: PhaseEvent) -> Option<ConnectionPhase> {
    use ConnectionPhase as P;
    use PhaseEvent as E;

    let next = match (phase, event) {
        (p, E::SetupFailed) if p.is_setup() => P::Halted,
        (P::Init, E::SetupSucceeded) => P::ModemReady,
        (P::ModemReady, E::SetupSucceeded) => P::CloudClientReady,
        (P::CloudClientReady, E::SetupSucceeded) => P::NetworkBringupRequested,
        (P::NetworkBringupRequested, E::SetupSucceeded) => P::WaitNetwork,
        (P::WaitNetwork, E::NetworkUp) => P::ConnectingCloud,
        (P::ConnectingCloud, E::ConnectTimedOut) => P::ConnectingCloud,
        (P::ConnectingCloud, E::CloudConnected) => P::WaitCloudReady,
        (P::WaitCloudReady, E::CloudReady) => P::Connected,
        (P::WaitCloudReady, E::ReadyTimedOut) => P::Resetting,
        (P::Connected, E::ShadowPublished) => P::WaitDisconnect,
        (P::WaitDisconnect, E::Disconnected) => P::Resetting,
        (P::Resetting, E::ResetComplete) => P::Backoff,
        (P::Backoff, E::BackoffElapsed) => P::WaitNetwork,
        _ => return None,
    };
    Some(next)
}
