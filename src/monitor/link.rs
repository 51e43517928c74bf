//! Radio link monitor
//!
//! Reduces registration status changes to a single "network reachable"
//! flag. Losing registration while the cloud session is up forces a cloud
//! disconnect, since the transport cannot notice on its own that the link
//! underneath it is gone and would stall on the next send.

use crate::connection::ConnectionContext;
use crate::modem::{LinkEvent, LinkEventHandler, LteMode, ModemDomainEvent, RrcMode};
use crate::observability::metrics::metrics;
use std::sync::Arc;
use tracing::{debug, info};

pub struct NetworkLinkMonitor {
    context: Arc<ConnectionContext>,
}

impl NetworkLinkMonitor {
    pub fn new(context: Arc<ConnectionContext>) -> Self {
        Self { context }
    }
}

impl LinkEventHandler for NetworkLinkMonitor {
    fn on_link_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::Registration(status) => {
                debug!(%status, "Network registration status");

                if status.is_registered() {
                    self.context.notify_network_connected();
                    return;
                }

                self.context.clear_network_connected();

                // The disconnecting check only avoids reporting the same loss twice.
                if self.context.is_connected() && !self.context.is_disconnecting() {
                    info!("LTE connection lost. Disconnecting from cloud too...");
                    metrics().link_lost();
                    metrics().forced_disconnect();
                    self.context.request_disconnect();
                }
            }
            LinkEvent::PsmUpdate { tau, active_time } => {
                debug!(tau, active_time, "PSM parameter update");
            }
            LinkEvent::EdrxUpdate { edrx, ptw } => {
                debug!(edrx, ptw, "eDRX parameter update");
            }
            LinkEvent::RrcUpdate(mode) => {
                debug!(
                    rrc_mode = match mode {
                        RrcMode::Connected => "Connected",
                        RrcMode::Idle => "Idle",
                    },
                    "RRC mode"
                );
            }
            LinkEvent::CellUpdate { id, tac } => {
                debug!(cell_id = id, tracking_area = tac, "LTE cell changed");
            }
            LinkEvent::LteModeUpdate(mode) => {
                debug!(
                    lte_mode = match mode {
                        LteMode::None => "None",
                        LteMode::LteM => "LTE-M",
                        LteMode::NbIot => "NB-IoT",
                    },
                    "Active LTE mode changed"
                );
            }
            LinkEvent::ModemEvent(event) => {
                debug!(
                    modem_event = match event {
                        ModemDomainEvent::LightSearchDone => "Light search done",
                        ModemDomainEvent::SearchDone => "Search done",
                        ModemDomainEvent::ResetLoop => "Reset loop detected",
                        ModemDomainEvent::BatteryLow => "Low battery",
                        ModemDomainEvent::Overheated => "Modem is overheated",
                    },
                    "Modem domain event"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{cloud, network};
    use crate::modem::RegistrationStatus;

    fn monitor() -> (Arc<ConnectionContext>, NetworkLinkMonitor) {
        let context = Arc::new(ConnectionContext::new(1));
        let monitor = NetworkLinkMonitor::new(context.clone());
        (context, monitor)
    }

    #[test]
    fn test_registration_sets_network_connected() {
        let (context, monitor) = monitor();
        monitor.on_link_event(LinkEvent::Registration(RegistrationStatus::RegisteredRoaming));
        assert!(context.network_flags().is_set(network::CONNECTED));
    }

    #[test]
    fn test_loss_clears_network_without_cloud_side_effect() {
        let (context, monitor) = monitor();
        monitor.on_link_event(LinkEvent::Registration(RegistrationStatus::RegisteredHome));
        monitor.on_link_event(LinkEvent::Registration(RegistrationStatus::Searching));

        assert_eq!(context.network_flags().peek(), 0);
        assert!(!context.is_disconnecting());
    }

    #[test]
    fn test_loss_while_connected_forces_disconnect() {
        let (context, monitor) = monitor();
        context.notify_cloud_connected();

        monitor.on_link_event(LinkEvent::Registration(
            RegistrationStatus::RegistrationDenied,
        ));

        assert!(context.cloud_flags().is_set(cloud::DISCONNECTED));
    }

    #[test]
    fn test_telemetry_events_do_not_touch_flags() {
        let (context, monitor) = monitor();
        context.notify_network_connected();

        monitor.on_link_event(LinkEvent::PsmUpdate {
            tau: 3600,
            active_time: 60,
        });
        monitor.on_link_event(LinkEvent::EdrxUpdate {
            edrx: 81.92,
            ptw: 1.28,
        });
        monitor.on_link_event(LinkEvent::RrcUpdate(RrcMode::Idle));
        monitor.on_link_event(LinkEvent::CellUpdate { id: 42, tac: 7 });
        monitor.on_link_event(LinkEvent::LteModeUpdate(LteMode::NbIot));
        monitor.on_link_event(LinkEvent::ModemEvent(ModemDomainEvent::BatteryLow));

        assert_eq!(context.network_flags().peek(), network::CONNECTED);
        assert_eq!(context.cloud_flags().peek(), 0);
    }
}
