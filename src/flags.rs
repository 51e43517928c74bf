//! Condition flags: bitset wait/notify primitives
//!
//! Each [`ConditionFlags`] instance is an independent bit register. Bits are
//! only ever combined with OR on [`ConditionFlags::post`] and cleared as a
//! whole on [`ConditionFlags::reset`]. Waiters suspend until any or all bits
//! of a mask are present, optionally bounded by a [`Timeout`].
//!
//! Posting is synchronous and never blocks, so collaborator callbacks can
//! update flags without an async context. A post delivers its bits to each
//! waiter it satisfies immediately; a later reset cannot take them back.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

/// Bits of the network flag register
pub mod network {
    /// Raised when the radio registers (home or roaming), cleared on link loss
    pub const CONNECTED: u32 = 1 << 1;
}

/// Bits of the cloud flag register
pub mod cloud {
    /// Transport connected to the cloud service
    pub const CONNECTED: u32 = 1 << 1;
    /// Session fully associated and ready for device messages
    pub const READY: u32 = 1 << 2;
    /// The service asked for first-time user association
    pub const ASSOCIATION_REQUEST: u32 = 1 << 3;
    /// Disconnection detected or requested; drives a full reset
    pub const DISCONNECTED: u32 = 1 << 4;

    /// Every cloud bit, cleared together on reset
    pub const ALL: u32 = CONNECTED | READY | ASSOCIATION_REQUEST | DISCONNECTED;
}

/// Bits of the date-time flag register
pub mod date_time {
    /// Current date and time are known. Set once, never cleared.
    pub const KNOWN: u32 = 1 << 1;
}

/// How long a flag wait may suspend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait until the condition holds
    Forever,
    /// Only sample the current register
    NoWait,
    /// Wait at most the given duration
    After(Duration),
}

impl Timeout {
    pub fn from_secs(secs: u64) -> Self {
        Timeout::After(Duration::from_secs(secs))
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

/// Condition a parked waiter is blocked on
#[derive(Debug, Clone, Copy)]
enum Condition {
    Any(u32),
    All(u32),
}

impl Condition {
    fn matched(self, bits: u32) -> Option<u32> {
        match self {
            Condition::Any(mask) if bits & mask != 0 => Some(bits & mask),
            Condition::All(mask) if bits & mask == mask => Some(mask),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Waiter {
    condition: Condition,
    wake: oneshot::Sender<u32>,
}

#[derive(Debug, Default)]
struct Register {
    bits: u32,
    waiters: Vec<Waiter>,
}

/// Atomic bit register with blocking wait-any / wait-all
///
/// A post hands its result to every waiter it satisfies at that moment, so a
/// `reset` that follows before the waiter runs does not undo the wake-up.
#[derive(Debug)]
pub struct ConditionFlags {
    name: &'static str,
    register: Mutex<Register>,
}

impl ConditionFlags {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            register: Mutex::new(Register::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    // Callers never panic while holding the lock, so a poisoned register
    // still holds a consistent value.
    fn lock(&self) -> MutexGuard<'_, Register> {
        self.register
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// OR `mask` into the register and wake every waiter it satisfies
    pub fn post(&self, mask: u32) {
        let mut register = self.lock();
        register.bits |= mask;
        let bits = register.bits;

        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut register.waiters)
            .into_iter()
            .filter(|waiter| !waiter.wake.is_closed())
            .partition(|waiter| waiter.condition.matched(bits).is_some());
        register.waiters = pending;
        drop(register);

        let woken = ready.len();
        for waiter in ready {
            if let Some(matched) = waiter.condition.matched(bits) {
                // A receiver that timed out in the meantime just misses it.
                let _ = waiter.wake.send(matched);
            }
        }
        tracing::trace!(flags = self.name, mask, woken, "Posted condition flags");
    }

    /// Clear the whole register
    pub fn reset(&self) {
        self.lock().bits = 0;
        tracing::trace!(flags = self.name, "Reset condition flags");
    }

    /// Current register contents
    pub fn peek(&self) -> u32 {
        self.lock().bits
    }

    /// True if any bit of `mask` is currently set
    pub fn is_set(&self, mask: u32) -> bool {
        self.peek() & mask != 0
    }

    /// Wait until any bit of `mask` is set.
    ///
    /// Returns the bits of `mask` that were set when the wait was satisfied,
    /// or zero on timeout.
    pub async fn wait_any(&self, mask: u32, timeout: Timeout) -> u32 {
        self.wait_until(Condition::Any(mask), timeout).await
    }

    /// Wait until every bit of `mask` is set.
    ///
    /// Returns `mask` when satisfied, or zero on timeout.
    pub async fn wait_all(&self, mask: u32, timeout: Timeout) -> u32 {
        self.wait_until(Condition::All(mask), timeout).await
    }

    async fn wait_until(&self, condition: Condition, timeout: Timeout) -> u32 {
        let woken = {
            let mut register = self.lock();
            if let Some(matched) = condition.matched(register.bits) {
                return matched;
            }
            if timeout == Timeout::NoWait {
                return 0;
            }
            let (wake, woken) = oneshot::channel();
            register.waiters.push(Waiter { condition, wake });
            woken
        };

        // The sender is only dropped unsent once this receiver is gone.
        match timeout {
            Timeout::After(duration) => tokio::time::timeout(duration, woken)
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or(0),
            _ => woken.await.unwrap_or(0),
        }
    }
}
