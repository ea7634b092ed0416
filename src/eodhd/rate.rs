// src/eodhd/rate.rs
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Fixed-interval gate in front of the fundamentals endpoint.
///
/// Every `wait()` claims the next request slot, so the aggregate request rate
/// stays at one request per `interval` no matter how many callers share the
/// gate. A zero interval disables the gate entirely.
pub struct RateGate {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Waits until the next request slot is available, then claims it.
    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }

        // The lock is held across the sleep on purpose: the sleeper owns the
        // current slot, and later callers queue behind it.
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        if *next_slot > now {
            tokio::time::sleep_until(*next_slot).await;
        }
        *next_slot = Instant::now() + self.interval;
    }
}
