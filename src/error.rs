//! Crate-level error type
//!
//! Each module defines its own error enum. [`LinkError`] aggregates them for
//! callers that drive several modules, such as the CLI.

use crate::config::ConfigError;
use crate::modem::ModemError;
use crate::orchestrator::OrchestratorError;
use crate::queue::QueueError;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cloud transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Modem error: {0}")]
    Modem(#[from] ModemError),

    #[error("Message queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Connection orchestrator halted: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            LinkError::Config(_) => "config",
            LinkError::Transport(_) => "transport",
            LinkError::Modem(_) => "modem",
            LinkError::Queue(_) => "queue",
            LinkError::Orchestrator(_) => "orchestrator",
            LinkError::Io(_) => "io",
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LinkError::Transport(TransportError::NotConnected)
                | LinkError::Queue(QueueError::Full { .. })
        )
    }
}

/// Result type for connection subsystem operations
pub type LinkResult<T> = Result<T, LinkError>;
