//! Mock implementations for testing
//!
//! Provides mock CloudTransport, Modem and FotaHandler implementations that
//! record every call and raise events the way the real collaborators do.

use crate::fota::FotaHandler;
use crate::modem::{
    DateTimeEvent, DateTimeHandler, LinkEvent, LinkEventHandler, Modem, ModemError,
    ModemInitOutcome, RegistrationStatus,
};
use crate::queue::DeviceMessage;
use crate::shadow::ShadowStatus;
use crate::transport::{
    CloudEvent, CloudEventHandler, CloudTransport, FotaDeviceInfo, FotaType, TransportError,
    TransportInit,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Deliver `events` to `handler`, inline or from a spawned task with a pause
/// before each event.
fn deliver(handler: Arc<dyn CloudEventHandler>, events: Vec<CloudEvent>, delay: Option<Duration>) {
    match delay {
        None => events
            .into_iter()
            .for_each(|event| handler.on_cloud_event(event)),
        Some(delay) => {
            tokio::spawn(async move {
                for event in events {
                    tokio::time::sleep(delay).await;
                    handler.on_cloud_event(event);
                }
            });
        }
    }
}

/// What the mock cloud does after a successful connect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScript {
    /// Connected, then ready
    Ready,
    /// Connected but never ready
    NeverReady,
    /// No events at all; the connect wait always times out
    Silent,
    /// The first session asks for user association and the user completes
    /// it; later sessions become ready
    Association,
}

/// Mock cloud transport
pub struct MockCloudTransport {
    script: SessionScript,
    event_delay: Option<Duration>,
    fota_types: Vec<FotaType>,
    fail_init: bool,
    fail_shadow: bool,
    fail_send: bool,
    connect_failures: AtomicUsize,
    handler: Mutex<Option<Arc<dyn CloudEventHandler>>>,
    init_params: Mutex<Option<(String, Option<FotaDeviceInfo>)>>,
    connected: AtomicBool,
    sessions: AtomicUsize,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    shadow_updates: Mutex<Vec<ShadowStatus>>,
    sent_messages: Mutex<Vec<DeviceMessage>>,
}

impl Default for MockCloudTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockCloudTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCloudTransport")
            .field("script", &self.script)
            .field("connected", &self.is_connected())
            .field("connect_calls", &self.connect_calls())
            .field("disconnect_calls", &self.disconnect_calls())
            .finish_non_exhaustive()
    }
}

impl MockCloudTransport {
    pub fn new() -> Self {
        Self {
            script: SessionScript::Ready,
            event_delay: None,
            fota_types: Vec::new(),
            fail_init: false,
            fail_shadow: false,
            fail_send: false,
            connect_failures: AtomicUsize::new(0),
            handler: Mutex::new(None),
            init_params: Mutex::new(None),
            connected: AtomicBool::new(false),
            sessions: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            shadow_updates: Mutex::new(Vec::new()),
            sent_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(mut self, script: SessionScript) -> Self {
        self.script = script;
        self
    }

    /// Raise session events from a background task, pausing before each one
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = Some(delay);
        self
    }

    pub fn with_fota_types(mut self, types: &[FotaType]) -> Self {
        self.fota_types = types.to_vec();
        self
    }

    pub fn with_failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn with_failing_shadow(mut self) -> Self {
        self.fail_shadow = true;
        self
    }

    pub fn with_failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    /// Reject the first `count` connect requests
    pub fn with_connect_failures(self, count: usize) -> Self {
        self.connect_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Raise an arbitrary event through the handler registered at init.
    /// Returns false if init has not happened yet.
    pub fn emit(&self, event: CloudEvent) -> bool {
        let handler = lock(&self.handler).clone();
        match handler {
            Some(handler) => {
                handler.on_cloud_event(event);
                true
            }
            None => false,
        }
    }

    /// Simulate the service dropping the session
    pub fn drop_session(&self) -> bool {
        self.connected.store(false, Ordering::SeqCst);
        self.emit(CloudEvent::Disconnected)
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.handler).is_some()
    }

    /// Application version and FOTA info received at init
    pub fn init_params(&self) -> Option<(String, Option<FotaDeviceInfo>)> {
        lock(&self.init_params).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn shadow_updates(&self) -> Vec<ShadowStatus> {
        lock(&self.shadow_updates).clone()
    }

    pub fn sent_messages(&self) -> Vec<DeviceMessage> {
        lock(&self.sent_messages).clone()
    }

    fn session_events(&self, session: usize) -> Vec<CloudEvent> {
        match self.script {
            SessionScript::Silent => Vec::new(),
            SessionScript::NeverReady => vec![CloudEvent::Connecting, CloudEvent::Connected],
            SessionScript::Association if session == 0 => vec![
                CloudEvent::Connecting,
                CloudEvent::Connected,
                CloudEvent::UserAssociationRequest,
                CloudEvent::UserAssociated,
            ],
            SessionScript::Ready | SessionScript::Association => vec![
                CloudEvent::Connecting,
                CloudEvent::Connected,
                CloudEvent::Ready,
            ],
        }
    }
}

#[async_trait]
impl CloudTransport for MockCloudTransport {
    async fn init(&self, params: TransportInit) -> Result<(), TransportError> {
        if self.fail_init {
            return Err(TransportError::InitFailed("mock init failure".to_string()));
        }
        *lock(&self.init_params) = Some((params.application_version, params.fota_device_info));
        *lock(&self.handler) = Some(params.event_handler);
        Ok(())
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::ConnectFailed("mock connect failure".to_string()));
        }

        let handler = lock(&self.handler)
            .clone()
            .ok_or_else(|| TransportError::InitFailed("transport not initialized".to_string()))?;

        if self.script != SessionScript::Silent {
            self.connected.store(true, Ordering::SeqCst);
        }
        let session = self.sessions.fetch_add(1, Ordering::SeqCst);
        deliver(handler, self.session_events(session), self.event_delay);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.connected.swap(false, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    async fn shadow_update(&self, status: &ShadowStatus) -> Result<(), TransportError> {
        if self.fail_shadow {
            return Err(TransportError::Code(-5));
        }
        lock(&self.shadow_updates).push(*status);
        Ok(())
    }

    fn is_fota_type_enabled(&self, fota_type: FotaType) -> bool {
        self.fota_types.contains(&fota_type)
    }

    async fn send_device_message(&self, message: &DeviceMessage) -> Result<(), TransportError> {
        if self.fail_send {
            return Err(TransportError::SendFailed("mock send failure".to_string()));
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        lock(&self.sent_messages).push(message.clone());
        Ok(())
    }
}

/// Mock modem
///
/// By default the modem registers on its home network as soon as the
/// asynchronous connect is requested and reports a valid clock.
pub struct MockModem {
    init_result: Result<ModemInitOutcome, ModemError>,
    psm_error: Option<ModemError>,
    events_error: Option<ModemError>,
    connect_error: Option<ModemError>,
    auto_register: bool,
    attach_delay: Option<Duration>,
    link_handler: Mutex<Option<Arc<dyn LinkEventHandler>>>,
    date_time_handler: Mutex<Option<Arc<dyn DateTimeHandler>>>,
    psm_requests: Mutex<Vec<bool>>,
    events_enabled: AtomicBool,
    init_calls: AtomicUsize,
}

impl Default for MockModem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockModem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockModem")
            .field("init_result", &self.init_result)
            .field("auto_register", &self.auto_register)
            .field("events_enabled", &self.events_enabled())
            .finish_non_exhaustive()
    }
}

impl MockModem {
    pub fn new() -> Self {
        Self {
            init_result: Ok(ModemInitOutcome::Initialized),
            psm_error: None,
            events_error: None,
            connect_error: None,
            auto_register: true,
            attach_delay: None,
            link_handler: Mutex::new(None),
            date_time_handler: Mutex::new(None),
            psm_requests: Mutex::new(Vec::new()),
            events_enabled: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_init_result(mut self, result: Result<ModemInitOutcome, ModemError>) -> Self {
        self.init_result = result;
        self
    }

    pub fn with_failing_psm(mut self, code: i32) -> Self {
        self.psm_error = Some(ModemError::PsmRequestFailed(code));
        self
    }

    pub fn with_failing_events(mut self, code: i32) -> Self {
        self.events_error = Some(ModemError::EventsUnavailable(code));
        self
    }

    pub fn with_failing_connect(mut self, code: i32) -> Self {
        self.connect_error = Some(ModemError::ConnectFailed(code));
        self
    }

    /// Stay unregistered until a test drives registration explicitly
    pub fn without_auto_register(mut self) -> Self {
        self.auto_register = false;
        self
    }

    /// Register from a background task after `delay`
    pub fn with_attach_delay(mut self, delay: Duration) -> Self {
        self.attach_delay = Some(delay);
        self
    }

    /// Raise a link event through the registered handler.
    /// Returns false if no network connect was requested yet.
    pub fn emit_link(&self, event: LinkEvent) -> bool {
        let handler = lock(&self.link_handler).clone();
        match handler {
            Some(handler) => {
                handler.on_link_event(event);
                true
            }
            None => false,
        }
    }

    pub fn set_registration(&self, status: RegistrationStatus) -> bool {
        self.emit_link(LinkEvent::Registration(status))
    }

    pub fn emit_date_time(&self, time_valid: bool) -> bool {
        let handler = lock(&self.date_time_handler).clone();
        match handler {
            Some(handler) => {
                handler.on_date_time_event(DateTimeEvent { time_valid });
                true
            }
            None => false,
        }
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn psm_requests(&self) -> Vec<bool> {
        lock(&self.psm_requests).clone()
    }

    pub fn events_enabled(&self) -> bool {
        self.events_enabled.load(Ordering::SeqCst)
    }

    pub fn has_link_handler(&self) -> bool {
        lock(&self.link_handler).is_some()
    }

    pub fn has_date_time_handler(&self) -> bool {
        lock(&self.date_time_handler).is_some()
    }

    fn attach(
        link: Arc<dyn LinkEventHandler>,
        date_time: Option<Arc<dyn DateTimeHandler>>,
    ) {
        link.on_link_event(LinkEvent::Registration(RegistrationStatus::Searching));
        link.on_link_event(LinkEvent::Registration(RegistrationStatus::RegisteredHome));
        if let Some(date_time) = date_time {
            date_time.on_date_time_event(DateTimeEvent { time_valid: true });
        }
    }
}

#[async_trait]
impl Modem for MockModem {
    async fn init(&self) -> Result<ModemInitOutcome, ModemError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.init_result.clone()
    }

    fn register_date_time_handler(&self, handler: Arc<dyn DateTimeHandler>) {
        *lock(&self.date_time_handler) = Some(handler);
    }

    async fn request_psm(&self, enable: bool) -> Result<(), ModemError> {
        if let Some(error) = &self.psm_error {
            return Err(error.clone());
        }
        lock(&self.psm_requests).push(enable);
        Ok(())
    }

    async fn enable_modem_events(&self) -> Result<(), ModemError> {
        if let Some(error) = &self.events_error {
            return Err(error.clone());
        }
        self.events_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn connect_async(&self, handler: Arc<dyn LinkEventHandler>) -> Result<(), ModemError> {
        if let Some(error) = &self.connect_error {
            return Err(error.clone());
        }
        *lock(&self.link_handler) = Some(handler.clone());

        if self.auto_register {
            let date_time = lock(&self.date_time_handler).clone();
            match self.attach_delay {
                None => Self::attach(handler, date_time),
                Some(delay) => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        Self::attach(handler, date_time);
                    });
                }
            }
        }
        Ok(())
    }
}

/// FOTA handler that records every completed download
#[derive(Debug, Default)]
pub struct RecordingFotaHandler {
    downloads: Mutex<Vec<Option<FotaType>>>,
}

impl RecordingFotaHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downloads(&self) -> Vec<Option<FotaType>> {
        lock(&self.downloads).clone()
    }
}

impl FotaHandler for RecordingFotaHandler {
    fn on_fota_downloaded(&self, fota_type: Option<FotaType>) {
        lock(&self.downloads).push(fota_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler(AtomicUsize);

    impl CloudEventHandler for CountingHandler {
        fn on_cloud_event(&self, _event: CloudEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn init_params(handler: Arc<dyn CloudEventHandler>) -> TransportInit {
        TransportInit {
            event_handler: handler,
            application_version: "1.0.0".to_string(),
            fota_device_info: None,
        }
    }

    #[tokio::test]
    async fn test_connect_before_init_fails() {
        let transport = MockCloudTransport::new();
        assert!(transport.connect().await.is_err());
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_ready_script_raises_events() {
        let transport = MockCloudTransport::new();
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        transport.init(init_params(handler.clone())).await.unwrap();

        transport.connect().await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(handler.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_reports_not_connected() {
        let transport = MockCloudTransport::new();
        assert_eq!(
            transport.disconnect().await,
            Err(TransportError::NotConnected)
        );
        assert_eq!(transport.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_connect_failures_are_consumed() {
        let transport = MockCloudTransport::new().with_connect_failures(1);
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        transport.init(init_params(handler)).await.unwrap();

        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_ok());
    }

    #[tokio::test]
    async fn test_modem_failures() {
        let modem = MockModem::new()
            .with_init_result(Err(ModemError::InitFailed(-1)))
            .with_failing_psm(-2);
        assert_eq!(modem.init().await, Err(ModemError::InitFailed(-1)));
        assert_eq!(
            modem.request_psm(true).await,
            Err(ModemError::PsmRequestFailed(-2))
        );
        assert!(modem.psm_requests().is_empty());
    }

    #[test]
    fn test_emit_without_handler() {
        let modem = MockModem::new();
        assert!(!modem.set_registration(RegistrationStatus::RegisteredHome));
        assert!(!modem.emit_date_time(true));

        let transport = MockCloudTransport::new();
        assert!(!transport.emit(CloudEvent::Ready));
    }
}
