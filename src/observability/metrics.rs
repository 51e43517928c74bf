//! Thread-safe connection metrics
//!
//! Atomic counters for the orchestrator cycle, the monitors and the device
//! message path. Counters are written from callback contexts as well as the
//! orchestrator task, so everything here is lock-free except the phase name.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<ConnectionMetrics> = Lazy::new(ConnectionMetrics::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static ConnectionMetrics {
    &METRICS
}

pub struct ConnectionMetrics {
    // Orchestrator cycle
    connect_attempts: AtomicU64,
    cloud_connections: AtomicU64,
    cloud_ready: AtomicU64,
    ready_timeouts: AtomicU64,
    resets: AtomicU64,
    cloud_connected: AtomicBool,
    connected_since: AtomicU64,

    // Monitors
    link_losses: AtomicU64,
    forced_disconnects: AtomicU64,
    inbound_messages: AtomicU64,

    // Shadow
    shadow_updates: AtomicU64,
    shadow_failures: AtomicU64,

    // Device messages
    messages_enqueued: AtomicU64,
    messages_rejected: AtomicU64,
    messages_sent: AtomicU64,
    send_failures: AtomicU64,

    phase: Mutex<String>,
    phase_transitions: AtomicU64,
    started_at: AtomicU64,
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self {
            connect_attempts: AtomicU64::new(0),
            cloud_connections: AtomicU64::new(0),
            cloud_ready: AtomicU64::new(0),
            ready_timeouts: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            cloud_connected: AtomicBool::new(false),
            connected_since: AtomicU64::new(0),
            link_losses: AtomicU64::new(0),
            forced_disconnects: AtomicU64::new(0),
            inbound_messages: AtomicU64::new(0),
            shadow_updates: AtomicU64::new(0),
            shadow_failures: AtomicU64::new(0),
            messages_enqueued: AtomicU64::new(0),
            messages_rejected: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            phase: Mutex::new("init".to_string()),
            phase_transitions: AtomicU64::new(0),
            started_at: AtomicU64::new(current_timestamp()),
        }
    }

    pub fn connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cloud_connection_established(&self) {
        self.cloud_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cloud_ready(&self) {
        self.cloud_ready.fetch_add(1, Ordering::Relaxed);
        self.cloud_connected.store(true, Ordering::Relaxed);
        self.connected_since
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn ready_timeout(&self) {
        self.ready_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset_performed(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
        self.cloud_connected.store(false, Ordering::Relaxed);
        self.connected_since.store(0, Ordering::Relaxed);
    }

    pub fn link_lost(&self) {
        self.link_losses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn forced_disconnect(&self) {
        self.forced_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inbound_message(&self) {
        self.inbound_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn shadow_updated(&self) {
        self.shadow_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn shadow_failed(&self) {
        self.shadow_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_enqueued(&self) {
        self.messages_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_phase(&self, phase: &str) {
        if let Ok(mut current) = self.phase.lock() {
            if *current != phase {
                self.phase_transitions.fetch_add(1, Ordering::Relaxed);
                *current = phase.to_string();
            }
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.connect_attempts,
            &self.cloud_connections,
            &self.cloud_ready,
            &self.ready_timeouts,
            &self.resets,
            &self.connected_since,
            &self.link_losses,
            &self.forced_disconnects,
            &self.inbound_messages,
            &self.shadow_updates,
            &self.shadow_failures,
            &self.messages_enqueued,
            &self.messages_rejected,
            &self.messages_sent,
            &self.send_failures,
            &self.phase_transitions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.cloud_connected.store(false, Ordering::Relaxed);
        self.started_at
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut phase) = self.phase.lock() {
            *phase = "init".to_string();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let connected_since = self.connected_since.load(Ordering::Relaxed);
        let phase = self
            .phase
            .lock()
            .map(|phase| phase.clone())
            .unwrap_or_else(|_| "unknown".to_string());

        MetricsSnapshot {
            connection: ConnectionCounters {
                connected: self.cloud_connected.load(Ordering::Relaxed),
                connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
                cloud_connections: self.cloud_connections.load(Ordering::Relaxed),
                cloud_ready: self.cloud_ready.load(Ordering::Relaxed),
                ready_timeouts: self.ready_timeouts.load(Ordering::Relaxed),
                resets: self.resets.load(Ordering::Relaxed),
                link_losses: self.link_losses.load(Ordering::Relaxed),
                forced_disconnects: self.forced_disconnects.load(Ordering::Relaxed),
                connection_duration_seconds: if connected_since == 0 {
                    0
                } else {
                    now.saturating_sub(connected_since)
                },
            },
            messages: MessageCounters {
                enqueued: self.messages_enqueued.load(Ordering::Relaxed),
                rejected: self.messages_rejected.load(Ordering::Relaxed),
                sent: self.messages_sent.load(Ordering::Relaxed),
                send_failures: self.send_failures.load(Ordering::Relaxed),
                inbound: self.inbound_messages.load(Ordering::Relaxed),
                shadow_updates: self.shadow_updates.load(Ordering::Relaxed),
                shadow_failures: self.shadow_failures.load(Ordering::Relaxed),
            },
            phase,
            phase_transitions: self.phase_transitions.load(Ordering::Relaxed),
            uptime_seconds: now.saturating_sub(self.started_at.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for ConnectionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub connection: ConnectionCounters,
    pub messages: MessageCounters,
    pub phase: String,
    pub phase_transitions: u64,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct ConnectionCounters {
    pub connected: bool,
    pub connect_attempts: u64,
    pub cloud_connections: u64,
    pub cloud_ready: u64,
    pub ready_timeouts: u64,
    pub resets: u64,
    pub link_losses: u64,
    pub forced_disconnects: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageCounters {
    pub enqueued: u64,
    pub rejected: u64,
    pub sent: u64,
    pub send_failures: u64,
    pub inbound: u64,
    pub shadow_updates: u64,
    pub shadow_failures: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
