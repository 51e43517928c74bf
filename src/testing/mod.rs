//! Testing utilities and mock collaborators
//!
//! Scriptable stand-ins for the modem and the cloud transport, so the
//! orchestrator can be exercised without a radio or a network. The CLI also
//! uses them as its simulated device.

pub mod mocks;

pub use mocks::*;
