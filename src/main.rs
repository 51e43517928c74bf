//! cloudlink - connection orchestrator entry point
//!
//! Runs the connection subsystem against the built-in simulated modem and
//! cloud transport, which makes the reconnect behavior observable from a
//! terminal.

use cloudlink::config::LinkConfig;
use cloudlink::modem::RegistrationStatus;
use cloudlink::observability::{init_default_logging, metrics};
use cloudlink::testing::{MockCloudTransport, MockModem, SessionScript};
use cloudlink::{
    ConnectionContext, ConnectionOrchestrator, DeviceMessage, LinkError, MessageDispatcher,
    QueueMode, Timeout,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::{
    signal,
    time::{sleep, Duration},
};
use tracing::{error, info, warn};

/// Resilient cellular and cloud connection orchestrator
#[derive(Parser)]
#[command(name = "cloudlink")]
#[command(about = "Cellular and cloud connection orchestrator")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "CLOUDLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator against the simulated modem and cloud
    Run {
        /// The simulated cloud connects but never becomes ready
        #[arg(long, conflicts_with = "associate")]
        never_ready: bool,

        /// The first simulated session goes through user association
        #[arg(long)]
        associate: bool,

        /// Simulate losing the cellular link every N seconds
        #[arg(long, value_name = "SECS")]
        drop_link_every: Option<u64>,

        /// Queue a temperature sample every N seconds
        #[arg(long, value_name = "SECS", default_value_t = 10)]
        sample_every: u64,
    },
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting cloudlink v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run {
            never_ready,
            associate,
            drop_link_every,
            sample_every,
        } => {
            let script = if never_ready {
                SessionScript::NeverReady
            } else if associate {
                SessionScript::Association
            } else {
                SessionScript::Ready
            };
            run_simulation(config, script, drop_link_every, sample_every).await
        }
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!(kind = e.kind(), error = %e, "Command failed");
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(config_path: &Option<PathBuf>) -> Result<LinkConfig, LinkError> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(LinkConfig::load_from_file(path)?);
    }

    for path_str in ["cloudlink.toml", "config/cloudlink.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(LinkConfig::load_from_file(&path)?);
        }
    }

    warn!("No configuration file found, using defaults");
    Ok(LinkConfig::with_app_version(env!("CARGO_PKG_VERSION")))
}

async fn run_simulation(
    config: LinkConfig,
    script: SessionScript,
    drop_link_every: Option<u64>,
    sample_every: u64,
) -> Result<(), LinkError> {
    info!(
        app_version = %config.device.app_version,
        ?script,
        "Running against simulated modem and cloud"
    );

    let context = Arc::new(ConnectionContext::new(config.queue.capacity));
    let transport = Arc::new(
        MockCloudTransport::new()
            .with_script(script)
            .with_event_delay(Duration::from_millis(500)),
    );
    let modem = Arc::new(MockModem::new().with_attach_delay(Duration::from_secs(2)));

    context.register_inbound_message_handler(|message| {
        info!(bytes = message.len(), "Received device message from cloud");
    });

    let orchestrator =
        ConnectionOrchestrator::new(config, context.clone(), transport.clone(), modem.clone());
    let orchestrator_handle = tokio::spawn(async move { orchestrator.run().await });

    let dispatcher = MessageDispatcher::new(context.clone(), transport.clone());
    let dispatcher_handle = tokio::spawn(async move { dispatcher.run().await });

    let sampler_handle = tokio::spawn(sample_temperature(
        context.clone(),
        Duration::from_secs(sample_every.max(1)),
    ));

    let link_handle = drop_link_every.map(|secs| {
        let modem = modem.clone();
        tokio::spawn(async move { flap_link(modem, Duration::from_secs(secs.max(1))).await })
    });

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let outcome = tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
            Ok(())
        }
        result = orchestrator_handle => match result {
            Ok(Err(e)) => Err(LinkError::from(e)),
            Ok(Ok(())) => Ok(()),
            Err(e) => {
                error!(error = %e, "Orchestrator task failed");
                Ok(())
            }
        },
    };

    sampler_handle.abort();
    if let Some(handle) = link_handle {
        handle.abort();
    }
    context.queue().close();
    if let Err(e) = dispatcher_handle.await {
        error!(error = %e, "Dispatcher task failed");
    }

    match serde_json::to_string(&metrics().snapshot()) {
        Ok(snapshot) => info!(metrics = %snapshot, "Final connection metrics"),
        Err(e) => warn!(error = %e, "Failed to serialize metrics"),
    }

    outcome
}

/// Queue a simulated temperature sample at a fixed interval
async fn sample_temperature(context: Arc<ConnectionContext>, interval: Duration) {
    context.await_date_time_known(Timeout::Forever).await;

    let mut reading: f64 = 21.0;
    loop {
        sleep(interval).await;
        reading += 0.1;

        let message = Arc::new(DeviceMessage::new(json!({
            "appId": "TEMP",
            "messageType": "DATA",
            "data": (reading * 10.0).round() / 10.0,
        })));
        if let Err(e) = context.enqueue_device_message(&message, QueueMode::Copy) {
            warn!(error = %e, "Temperature sample dropped");
        }
    }
}

/// Alternate between losing and regaining network registration
async fn flap_link(modem: Arc<MockModem>, interval: Duration) {
    loop {
        sleep(interval).await;
        info!("Simulating cellular link loss");
        modem.set_registration(RegistrationStatus::Searching);
        sleep(Duration::from_secs(5)).await;
        info!("Simulating cellular link recovery");
        modem.set_registration(RegistrationStatus::RegisteredHome);
    }
}

fn handle_config_command(config: &LinkConfig, show: bool) -> Result<(), LinkError> {
    config.validate()?;
    if show {
        match toml::to_string_pretty(config) {
            Ok(rendered) => {
                println!("Current configuration:");
                println!("{rendered}");
            }
            Err(e) => warn!(error = %e, "Failed to render configuration"),
        }
    }
    println!("Configuration is valid");
    Ok(())
}
