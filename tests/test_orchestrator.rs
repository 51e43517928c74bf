//! Connection orchestrator behavior against scripted collaborators
//!
//! All tests run on a paused clock. The mock transport raises its session
//! events inline from `connect()`, so the only time that passes is the
//! configured retry/ready/settle/backoff intervals.

use cloudlink::flags::{cloud, network};
use cloudlink::modem::{ModemError, RegistrationStatus};
use cloudlink::testing::{MockCloudTransport, MockModem, RecordingFotaHandler, SessionScript};
use cloudlink::transport::{CloudEvent, FotaDeviceInfo, FotaType, InboundMessage};
use cloudlink::{ConnectionPhase, OrchestratorError, Timeout};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use test_helpers::{secs, test_config, Harness};

#[tokio::test(start_paused = true)]
async fn test_connects_and_publishes_shadow_once() {
    let harness = Harness::start(MockCloudTransport::new(), MockModem::new());

    harness.advance(secs(30.0)).await;

    assert_eq!(harness.phase(), ConnectionPhase::WaitDisconnect);
    assert!(harness.context.await_connection(Timeout::NoWait).await);
    assert_eq!(harness.transport.connect_calls(), 1);
    assert_eq!(harness.transport.shadow_updates().len(), 1);
    assert_eq!(harness.transport.disconnect_calls(), 0);

    let (version, _) = harness.transport.init_params().unwrap();
    assert_eq!(version, "1.0.0-test");
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_injected_collaborators_reach_cloud_session() {
    let fota = Arc::new(RecordingFotaHandler::new());
    let flash = FotaDeviceInfo {
        device: "mx25r64".to_string(),
        offset: 0,
        size: 0x80_0000,
    };
    let transport = MockCloudTransport::new()
        .with_fota_types(&[FotaType::Application, FotaType::ModemFull]);

    let mut harness = Harness::start_with(test_config(), transport, MockModem::new(), {
        let fota = fota.clone();
        let flash = flash.clone();
        move |orchestrator| {
            orchestrator
                .with_location(Arc::new(true))
                .with_fota_handler(fota)
                .with_fota_device_info(flash)
        }
    });
    harness.wait_for_phase(ConnectionPhase::WaitDisconnect).await;

    let (version, device_info) = harness.transport.init_params().unwrap();
    assert_eq!(version, "1.0.0-test");
    assert_eq!(device_info, Some(flash));

    let shadow = harness.transport.shadow_updates();
    assert_eq!(shadow.len(), 1);
    assert!(shadow[0].ui.gnss);
    assert!(shadow[0].fota.application);
    assert!(shadow[0].fota.modem_full);
    assert!(!shadow[0].fota.bootloader);

    assert!(harness
        .transport
        .emit(CloudEvent::FotaDone(Some(FotaType::Application))));
    assert_eq!(fota.downloads(), vec![Some(FotaType::Application)]);
    // A completed download does not touch the session.
    assert_eq!(harness.phase(), ConnectionPhase::WaitDisconnect);
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_default_collaborators_report_no_location_or_flash() {
    let mut harness = Harness::start(MockCloudTransport::new(), MockModem::new());
    harness.wait_for_phase(ConnectionPhase::WaitDisconnect).await;

    let (_, device_info) = harness.transport.init_params().unwrap();
    assert_eq!(device_info, None);
    assert!(!harness.transport.shadow_updates()[0].ui.gnss);
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_forces_disconnect_and_waits_for_network() {
    let mut harness = Harness::start(MockCloudTransport::new(), MockModem::new());
    harness.wait_for_phase(ConnectionPhase::WaitDisconnect).await;

    harness.modem.set_registration(RegistrationStatus::Searching);
    assert!(harness.context.is_disconnecting());
    assert!(!harness.context.network_flags().is_set(network::CONNECTED));

    // Settle 1s + backoff 1s, then parked waiting for the network.
    harness.advance(secs(10.0)).await;
    assert_eq!(harness.phase(), ConnectionPhase::WaitNetwork);
    assert_eq!(harness.transport.disconnect_calls(), 1);
    assert_eq!(harness.context.cloud_flags().peek(), 0);
    assert_eq!(harness.transport.shadow_updates().len(), 1);
    assert_eq!(harness.transport.connect_calls(), 1);

    harness
        .modem
        .set_registration(RegistrationStatus::RegisteredRoaming);
    harness.advance(secs(1.0)).await;

    assert_eq!(harness.phase(), ConnectionPhase::WaitDisconnect);
    assert_eq!(harness.transport.connect_calls(), 2);
    assert_eq!(harness.transport.shadow_updates().len(), 2);
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_repeated_link_loss_reports_single_disconnect() {
    let mut harness = Harness::start(MockCloudTransport::new(), MockModem::new());
    harness.wait_for_phase(ConnectionPhase::WaitDisconnect).await;

    harness.modem.set_registration(RegistrationStatus::Searching);
    harness
        .modem
        .set_registration(RegistrationStatus::NotRegistered);
    harness.modem.set_registration(RegistrationStatus::UiccFail);

    harness.advance(secs(10.0)).await;
    assert_eq!(harness.transport.disconnect_calls(), 1);
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_ready_timeout_runs_exactly_one_reset() {
    let harness = Harness::start(
        MockCloudTransport::new().with_script(SessionScript::NeverReady),
        MockModem::new(),
    );

    // Ready wait ends at t=3, reset finishes at t=4, backoff ends at t=5.
    harness.advance(secs(4.5)).await;
    assert_eq!(harness.phase(), ConnectionPhase::Backoff);
    assert_eq!(harness.transport.disconnect_calls(), 1);
    assert_eq!(harness.transport.connect_calls(), 1);
    assert_eq!(harness.context.cloud_flags().peek(), 0);

    harness.advance(secs(1.0)).await;
    assert_eq!(harness.phase(), ConnectionPhase::WaitCloudReady);
    assert_eq!(harness.transport.connect_calls(), 2);
    assert_eq!(harness.transport.disconnect_calls(), 1);
    assert!(harness.transport.shadow_updates().is_empty());
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_silent_transport_keeps_retrying() {
    let harness = Harness::start(
        MockCloudTransport::new().with_script(SessionScript::Silent),
        MockModem::new(),
    );

    // Retry every 2s with no backoff growth.
    harness.advance(secs(9.0)).await;
    assert_eq!(harness.transport.connect_calls(), 5);
    assert_eq!(harness.phase(), ConnectionPhase::ConnectingCloud);
    assert_eq!(harness.transport.disconnect_calls(), 0);
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_connect_errors_are_retried() {
    let harness = Harness::start(
        MockCloudTransport::new().with_connect_failures(2),
        MockModem::new(),
    );

    harness.advance(secs(4.5)).await;
    assert_eq!(harness.transport.connect_calls(), 3);
    assert_eq!(harness.phase(), ConnectionPhase::WaitDisconnect);
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_association_forces_one_reconnect() {
    let harness = Harness::start(
        MockCloudTransport::new().with_script(SessionScript::Association),
        MockModem::new(),
    );

    harness.advance(secs(30.0)).await;

    assert_eq!(harness.phase(), ConnectionPhase::WaitDisconnect);
    assert_eq!(harness.transport.connect_calls(), 2);
    assert_eq!(harness.transport.disconnect_calls(), 1);
    assert_eq!(harness.transport.shadow_updates().len(), 1);
    assert!(!harness
        .context
        .cloud_flags()
        .is_set(cloud::ASSOCIATION_REQUEST));
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_associated_alone_does_not_disconnect() {
    let mut harness = Harness::start(MockCloudTransport::new(), MockModem::new());
    harness.wait_for_phase(ConnectionPhase::WaitDisconnect).await;

    harness.transport.emit(CloudEvent::UserAssociated);
    harness.advance(secs(10.0)).await;

    assert!(!harness.context.is_disconnecting());
    assert_eq!(harness.phase(), ConnectionPhase::WaitDisconnect);
    assert_eq!(harness.transport.disconnect_calls(), 0);
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_not_connected_disconnect_is_benign() {
    let mut harness = Harness::start(MockCloudTransport::new(), MockModem::new());
    harness.wait_for_phase(ConnectionPhase::WaitDisconnect).await;

    // The service closed the session, so the reset's disconnect finds nothing to close.
    harness.transport.drop_session();
    harness.advance(secs(2.5)).await;

    assert_eq!(harness.transport.disconnect_calls(), 1);
    assert_eq!(harness.phase(), ConnectionPhase::WaitDisconnect);
    assert_eq!(harness.transport.connect_calls(), 2);
    assert_eq!(harness.transport.shadow_updates().len(), 2);
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_event_resets_session() {
    let mut harness = Harness::start(MockCloudTransport::new(), MockModem::new());
    harness.wait_for_phase(ConnectionPhase::WaitDisconnect).await;

    harness.transport.emit(CloudEvent::Error(-113));
    harness.wait_for_phase(ConnectionPhase::Resetting).await;
    harness.wait_for_phase(ConnectionPhase::Backoff).await;

    assert_eq!(harness.context.cloud_flags().peek(), 0);
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_application_disconnect_request_reconnects() {
    let mut harness = Harness::start(MockCloudTransport::new(), MockModem::new());
    harness.wait_for_phase(ConnectionPhase::WaitDisconnect).await;

    harness.context.request_disconnect();
    assert!(harness.context.await_disconnection(Timeout::NoWait).await);

    harness.wait_for_phase(ConnectionPhase::Backoff).await;
    harness.wait_for_phase(ConnectionPhase::WaitDisconnect).await;
    assert_eq!(harness.transport.connect_calls(), 2);
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_fatal_network_setup_halts() {
    let harness = Harness::start(
        MockCloudTransport::new(),
        MockModem::new().with_failing_events(-22),
    );

    let result = harness.handle.await.unwrap();
    assert_eq!(
        result,
        Err(OrchestratorError::NetworkSetup(
            ModemError::EventsUnavailable(-22)
        ))
    );
    assert_eq!(harness.orchestrator.phase(), ConnectionPhase::Halted);
    assert!(harness.transport.is_initialized());
    assert!(!harness.modem.has_link_handler());
    assert_eq!(harness.transport.connect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_modem_connect_halts() {
    let harness = Harness::start(
        MockCloudTransport::new(),
        MockModem::new().with_failing_connect(-1),
    );

    let result = harness.handle.await.unwrap();
    assert!(matches!(result, Err(OrchestratorError::NetworkSetup(_))));
    assert_eq!(harness.orchestrator.phase(), ConnectionPhase::Halted);
}

#[tokio::test(start_paused = true)]
async fn test_power_saving_mode_requested_before_attach() {
    let mut config = test_helpers::test_config();
    config.features.power_saving_mode = true;
    let mut harness =
        Harness::start_with_config(config, MockCloudTransport::new(), MockModem::new());

    harness.wait_for_phase(ConnectionPhase::WaitDisconnect).await;
    assert_eq!(harness.modem.psm_requests(), vec![true]);
    assert!(harness.modem.events_enabled());
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_date_time_known_after_attach() {
    let harness = Harness::start(
        MockCloudTransport::new(),
        MockModem::new().without_auto_register(),
    );
    harness.advance(secs(1.0)).await;

    assert!(!harness.context.await_date_time_known(Timeout::NoWait).await);
    harness.modem.emit_date_time(false);
    assert!(!harness.context.await_date_time_known(Timeout::NoWait).await);
    harness.modem.emit_date_time(true);
    assert!(harness.context.await_date_time_known(Timeout::NoWait).await);
    assert_eq!(harness.phase(), ConnectionPhase::WaitNetwork);
    harness.stop();
}

#[tokio::test(start_paused = true)]
async fn test_inbound_messages_reach_last_registered_handler() {
    let mut harness = Harness::start(MockCloudTransport::new(), MockModem::new());
    harness.wait_for_phase(ConnectionPhase::WaitDisconnect).await;

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let counter = first.clone();
    harness
        .context
        .register_inbound_message_handler(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let counter = second.clone();
    harness
        .context
        .register_inbound_message_handler(move |message| {
            counter.fetch_add(message.len(), Ordering::SeqCst);
        });

    harness
        .transport
        .emit(CloudEvent::RxDataGeneral(InboundMessage::new(b"{\"a\":1}".to_vec())));
    // Shadow deltas are not device messages.
    harness
        .transport
        .emit(CloudEvent::RxDataShadow(InboundMessage::new(b"{}".to_vec())));

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 7);
    harness.stop();
}
