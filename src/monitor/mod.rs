//! Event monitors
//!
//! Translate collaborator callbacks into condition flag updates. Every
//! handler here runs on the collaborator's context and returns without
//! waiting on anything.

pub mod cloud;
pub mod date_time;
pub mod link;

pub use cloud::CloudSessionMonitor;
pub use date_time::DateTimeMonitor;
pub use link::NetworkLinkMonitor;
