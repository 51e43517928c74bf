//! cloudlink - resilient cellular and cloud connection orchestration
//!
//! Keeps an embedded device connected to its cloud service over a cellular
//! link. The modem and the cloud transport are external collaborators behind
//! the [`Modem`] and [`CloudTransport`] traits; this crate turns their events
//! into condition flags and drives the connection cycle from them.
//!
//! # Overview
//!
//! - [`flags`]: bitset wait/notify primitives
//! - [`monitor`]: link, cloud session and date-time event monitors
//! - [`orchestrator`]: setup plus the reconnect loop, as an explicit phase machine
//! - [`queue`] and [`dispatcher`]: bounded outbound device message path
//! - [`shadow`]: device status publication after each ready session
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cloudlink::testing::{MockCloudTransport, MockModem};
//! use cloudlink::{ConnectionContext, ConnectionOrchestrator, LinkConfig, Timeout};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let config = LinkConfig::with_app_version("1.0.0");
//! let context = Arc::new(ConnectionContext::new(config.queue.capacity));
//! let orchestrator = ConnectionOrchestrator::new(
//!     config,
//!     context.clone(),
//!     Arc::new(MockCloudTransport::new()),
//!     Arc::new(MockModem::new()),
//! );
//! tokio::spawn(async move { orchestrator.run().await });
//!
//! context.await_connection(Timeout::Forever).await;
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod flags;
pub mod fota;
pub mod modem;
pub mod monitor;
pub mod observability;
pub mod orchestrator;
pub mod queue;
pub mod shadow;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, LinkConfig};
pub use connection::{ConnectionContext, InboundMessageHandler};
pub use dispatcher::MessageDispatcher;
pub use error::{LinkError, LinkResult};
pub use flags::{ConditionFlags, Timeout};
pub use fota::FotaHandler;
pub use modem::{Modem, ModemError};
pub use orchestrator::{ConnectionOrchestrator, ConnectionPhase, OrchestratorError};
pub use queue::{DeviceMessage, DeviceMessageQueue, QueueError, QueueMode};
pub use shadow::{LocationStatus, ShadowPublisher, ShadowStatus};
pub use transport::{CloudEvent, CloudTransport, TransportError};
