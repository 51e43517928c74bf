//! Connection orchestrator
//!
//! Performs the one-time modem, cloud client and network setup, then runs
//! the connection cycle forever: wait for the network, connect to the
//! cloud, wait for the session to become ready, publish the shadow, wait
//! for a disconnect, reset and back off.
//!
//! Every suspension point is a condition flag wait or a fixed sleep. The
//! monitors feed the flags; the orchestrator is the only party that waits on
//! them with a timeout and the only party that resets cloud state.

pub mod phase;

pub use phase::{next_phase, ConnectionPhase, PhaseEvent};

use crate::config::LinkConfig;
use crate::connection::ConnectionContext;
use crate::flags::Timeout;
use crate::fota::{FotaHandler, LoggingFotaHandler};
use crate::modem::{Modem, ModemError, ModemInitOutcome};
use crate::monitor::{CloudSessionMonitor, DateTimeMonitor, NetworkLinkMonitor};
use crate::observability::metrics::metrics;
use crate::shadow::{LocationStatus, ShadowPublisher};
use crate::transport::{CloudTransport, FotaDeviceInfo, TransportError, TransportInit};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

/// Fatal setup failures. Nothing is retried after one of these.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("Modem setup failed: {0}")]
    ModemSetup(#[source] ModemError),
    #[error("Cloud library setup failed: {0}")]
    CloudSetup(#[source] TransportError),
    #[error("Network setup failed: {0}")]
    NetworkSetup(#[source] ModemError),
}

/// User-visible indication patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indication {
    Waiting,
    Connected,
    Failure,
}

impl Indication {
    pub fn as_str(self) -> &'static str {
        match self {
            Indication::Waiting => "waiting",
            Indication::Connected => "connected",
            Indication::Failure => "failure",
        }
    }
}

pub struct ConnectionOrchestrator<T, M>
where
    T: CloudTransport + 'static,
    M: Modem + 'static,
{
    config: LinkConfig,
    context: Arc<ConnectionContext>,
    transport: Arc<T>,
    modem: Arc<M>,
    shadow: ShadowPublisher,
    fota: Arc<dyn FotaHandler>,
    fota_device_info: Option<FotaDeviceInfo>,
    phase: watch::Sender<ConnectionPhase>,
}

impl<T, M> ConnectionOrchestrator<T, M>
where
    T: CloudTransport + 'static,
    M: Modem + 'static,
{
    /// Create an orchestrator with injected collaborators.
    ///
    /// Location tracking defaults to disabled and completed firmware
    /// downloads are only logged; see the `with_*` builders.
    pub fn new(
        config: LinkConfig,
        context: Arc<ConnectionContext>,
        transport: Arc<T>,
        modem: Arc<M>,
    ) -> Self {
        let shadow = ShadowPublisher::new(config.features.clone(), Arc::new(false));
        let (phase, _) = watch::channel(ConnectionPhase::Init);

        Self {
            config,
            context,
            transport,
            modem,
            shadow,
            fota: Arc::new(LoggingFotaHandler),
            fota_device_info: None,
            phase,
        }
    }

    pub fn with_location(mut self, location: Arc<dyn LocationStatus>) -> Self {
        self.shadow = ShadowPublisher::new(self.config.features.clone(), location);
        self
    }

    pub fn with_fota_handler(mut self, fota: Arc<dyn FotaHandler>) -> Self {
        self.fota = fota;
        self
    }

    pub fn with_fota_device_info(mut self, info: FotaDeviceInfo) -> Self {
        self.fota_device_info = Some(info);
        self
    }

    pub fn context(&self) -> &Arc<ConnectionContext> {
        &self.context
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    /// Observe phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.subscribe()
    }

    /// Run setup and then the connection cycle.
    ///
    /// Only returns on a fatal setup failure, after entering
    /// [`ConnectionPhase::Halted`]. Otherwise it runs until the task is
    /// dropped or aborted.
    pub async fn run(&self) -> Result<(), OrchestratorError> {
        self.indicate(Indication::Waiting, true);

        if let Err(e) = self.setup().await {
            error!(error = %e, "Fatal: connection setup failed");
            self.advance(PhaseEvent::SetupFailed);
            self.indicate(Indication::Failure, true);
            return Err(e);
        }

        info!("Connecting to network. This may take several minutes...");
        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            self.run_cycle()
                .instrument(crate::connection_span!(cycle))
                .await;
        }
    }

    async fn setup(&self) -> Result<(), OrchestratorError> {
        info!("Setting up modem...");
        self.setup_modem().await?;
        self.advance(PhaseEvent::SetupSucceeded);

        info!("Setting up cloud library...");
        self.setup_cloud().await?;
        self.advance(PhaseEvent::SetupSucceeded);

        info!("Setting up network...");
        self.setup_network().await?;
        self.advance(PhaseEvent::SetupSucceeded);

        // Network bring-up was requested; the modem keeps the link alive from here.
        self.advance(PhaseEvent::SetupSucceeded);
        Ok(())
    }

    async fn setup_modem(&self) -> Result<(), OrchestratorError> {
        match self
            .modem
            .init()
            .await
            .map_err(OrchestratorError::ModemSetup)?
        {
            ModemInitOutcome::Initialized => debug!("Modem library initialized"),
            ModemInitOutcome::FirmwareUpdated => {
                info!("Modem firmware update applied during init")
            }
            ModemInitOutcome::FirmwareUpdateFailed(code) => {
                warn!(code, "Modem firmware update failed, continuing with current firmware")
            }
        }

        self.modem
            .register_date_time_handler(Arc::new(DateTimeMonitor::new(self.context.clone())));
        Ok(())
    }

    async fn setup_cloud(&self) -> Result<(), OrchestratorError> {
        let handler = CloudSessionMonitor::new(self.context.clone(), self.fota.clone());
        let params = TransportInit {
            event_handler: Arc::new(handler),
            application_version: self.config.device.app_version.clone(),
            fota_device_info: self.fota_device_info.clone(),
        };

        self.transport
            .init(params)
            .await
            .map_err(OrchestratorError::CloudSetup)
    }

    async fn setup_network(&self) -> Result<(), OrchestratorError> {
        if self.config.features.power_saving_mode {
            // Asking before attach lets the network accept PSM during the attach itself.
            info!("Requesting PSM mode");
            self.modem
                .request_psm(true)
                .await
                .map_err(OrchestratorError::NetworkSetup)?;
            info!("PSM mode requested");
        }

        self.modem
            .enable_modem_events()
            .await
            .map_err(OrchestratorError::NetworkSetup)?;

        info!("Starting connection to LTE network...");
        self.modem
            .connect_async(Arc::new(NetworkLinkMonitor::new(self.context.clone())))
            .await
            .map_err(OrchestratorError::NetworkSetup)
    }

    async fn run_cycle(&self) {
        info!("Waiting for connection to network...");
        self.indicate(Indication::Waiting, false);
        self.context
            .await_network_connection(Timeout::Forever)
            .await;
        info!("Connected to network");
        self.advance(PhaseEvent::NetworkUp);

        self.connect_cloud().await;

        if self.await_ready().await {
            self.shadow.publish(self.transport.as_ref()).await;
            self.advance(PhaseEvent::ShadowPublished);

            self.context.await_disconnection(Timeout::Forever).await;
            info!("Disconnected from cloud");
            self.advance(PhaseEvent::Disconnected);
        } else {
            info!("Failed to connect to cloud");
            metrics().ready_timeout();
            self.advance(PhaseEvent::ReadyTimedOut);
        }

        self.reset_cloud().await;
        self.advance(PhaseEvent::ResetComplete);

        tokio::time::sleep(self.config.connection.reestablish_delay()).await;
        self.advance(PhaseEvent::BackoffElapsed);
    }

    /// Issue connect requests at a fixed interval until the transport
    /// reports connected
    async fn connect_cloud(&self) {
        let retry_timeout = self.config.connection.retry_timeout();
        info!("Connecting to cloud...");

        loop {
            metrics().connect_attempt();
            if let Err(e) = self.transport.connect().await {
                error!(error = %e, "Cloud connection request failed");
            }

            info!(
                retry_timeout_secs = retry_timeout.as_secs(),
                "Waiting for cloud connection"
            );
            if self
                .context
                .await_cloud_connected(Timeout::After(retry_timeout))
                .await
            {
                break;
            }

            info!("Cloud connection not established yet, retrying");
            self.advance(PhaseEvent::ConnectTimedOut);
        }

        metrics().cloud_connection_established();
        self.advance(PhaseEvent::CloudConnected);
    }

    /// Wait for the session to become ready, giving up early if it drops
    async fn await_ready(&self) -> bool {
        info!("Connected to cloud, waiting for session to become ready");
        let ready = self
            .context
            .await_cloud_ready(Timeout::After(self.config.connection.ready_timeout()), true)
            .await;

        if ready {
            info!("Connected to cloud and ready");
            metrics().cloud_ready();
            self.advance(PhaseEvent::CloudReady);
            self.indicate(Indication::Connected, false);
        } else {
            info!("Timed out or disconnected while waiting for cloud to be ready");
        }
        ready
    }

    /// Settle, disconnect the transport and clear all cloud flags.
    ///
    /// Safe to run whether or not the transport is connected.
    async fn reset_cloud(&self) {
        // Residual transport events must land before the flags are cleared.
        tokio::time::sleep(self.config.connection.settle_delay()).await;

        info!("Disconnecting from cloud");
        match self.transport.disconnect().await {
            Ok(()) => info!("Disconnected from cloud"),
            Err(TransportError::NotConnected) => {
                info!("Cannot disconnect from cloud because we are not currently connected")
            }
            Err(e) => error!(error = %e, "Cannot disconnect from cloud, continuing anyway"),
        }

        self.context.clear_cloud_state();
        metrics().reset_performed();
        info!("Cloud connection state reset");
    }

    fn advance(&self, event: PhaseEvent) {
        let current = self.phase();
        match next_phase(current, event) {
            Some(next) => {
                if next != current {
                    debug!(from = %current, to = %next, ?event, "Connection phase changed");
                }
                self.phase.send_replace(next);
                metrics().set_phase(next.as_str());
            }
            None => warn!(phase = %current, ?event, "Ignoring invalid phase transition"),
        }
    }

    fn indicate(&self, indication: Indication, always: bool) {
        if always || self.config.features.verbose_indication {
            info!(indication = indication.as_str(), "Indication");
        } else {
            debug!(indication = indication.as_str(), "Indication");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::cloud;
    use crate::testing::mocks::{MockCloudTransport, MockModem, SessionScript};
    use std::time::Duration;

    fn test_config() -> LinkConfig {
        let mut config = LinkConfig::with_app_version("1.0.0-test");
        config.connection.retry_timeout_secs = 2;
        config.connection.ready_timeout_secs = 3;
        config.connection.reestablish_delay_secs = 1;
        config.connection.settle_delay_secs = 1;
        config
    }

    fn orchestrator(
        transport: MockCloudTransport,
        modem: MockModem,
    ) -> Arc<ConnectionOrchestrator<MockCloudTransport, MockModem>> {
        let context = Arc::new(ConnectionContext::new(4));
        Arc::new(ConnectionOrchestrator::new(
            test_config(),
            context,
            Arc::new(transport),
            Arc::new(modem),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_modem_init_failure_halts() {
        let orch = orchestrator(
            MockCloudTransport::new(),
            MockModem::new().with_init_result(Err(ModemError::InitFailed(-5))),
        );

        let result = orch.run().await;
        assert_eq!(
            result,
            Err(OrchestratorError::ModemSetup(ModemError::InitFailed(-5)))
        );
        assert_eq!(orch.phase(), ConnectionPhase::Halted);
        assert!(!orch.transport().is_initialized());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cloud_init_failure_halts() {
        let orch = orchestrator(MockCloudTransport::new().with_failing_init(), MockModem::new());

        let result = orch.run().await;
        assert!(matches!(result, Err(OrchestratorError::CloudSetup(_))));
        assert_eq!(orch.phase(), ConnectionPhase::Halted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_psm_failure_halts_when_requested() {
        let context = Arc::new(ConnectionContext::new(4));
        let mut config = test_config();
        config.features.power_saving_mode = true;
        let orch = ConnectionOrchestrator::new(
            config,
            context,
            Arc::new(MockCloudTransport::new()),
            Arc::new(MockModem::new().with_failing_psm(-8)),
        );

        let result = orch.run().await;
        assert_eq!(
            result,
            Err(OrchestratorError::NetworkSetup(ModemError::PsmRequestFailed(-8)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_firmware_update_is_not_fatal() {
        let modem = MockModem::new()
            .with_init_result(Ok(ModemInitOutcome::FirmwareUpdateFailed(-1)))
            .without_auto_register();
        let orch = orchestrator(MockCloudTransport::new(), modem);

        let runner = orch.clone();
        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(orch.phase(), ConnectionPhase::WaitNetwork);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaches_wait_disconnect_and_publishes_once() {
        let orch = orchestrator(MockCloudTransport::new(), MockModem::new());

        let runner = orch.clone();
        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(orch.phase(), ConnectionPhase::WaitDisconnect);
        assert_eq!(orch.transport().shadow_updates().len(), 1);
        assert_eq!(orch.transport().connect_calls(), 1);
        assert!(orch.context().is_connected());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_transport_retries_at_fixed_interval() {
        let orch = orchestrator(
            MockCloudTransport::new().with_script(SessionScript::Silent),
            MockModem::new(),
        );

        let runner = orch.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        // Retry timeout is 2s: connects at t=0, 2, 4, 6.
        tokio::time::sleep(Duration::from_millis(7_500)).await;
        assert_eq!(orch.transport().connect_calls(), 4);
        assert_eq!(orch.phase(), ConnectionPhase::ConnectingCloud);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_cloud_flags() {
        let modem = MockModem::new();
        let orch = orchestrator(MockCloudTransport::new(), modem);

        let runner = orch.clone();
        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(orch.context().cloud_flags().is_set(cloud::READY));

        orch.transport().drop_session();
        // Past the 1s settle delay, inside the 1s backoff.
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(orch.phase(), ConnectionPhase::Backoff);
        assert_eq!(orch.context().cloud_flags().peek(), 0);
        assert_eq!(orch.transport().disconnect_calls(), 1);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_updates_are_observable() {
        let orch = orchestrator(
            MockCloudTransport::new(),
            MockModem::new().without_auto_register(),
        );
        let mut phases = orch.subscribe_phase();

        let runner = orch.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        phases
            .wait_for(|phase| *phase == ConnectionPhase::WaitNetwork)
            .await
            .unwrap();
        assert_eq!(orch.context().network_flags().peek(), 0);
        handle.abort();
    }

    #[test]
    fn test_indication_names() {
        assert_eq!(Indication::Waiting.as_str(), "waiting");
        assert_eq!(Indication::Failure.as_str(), "failure");
    }
}
