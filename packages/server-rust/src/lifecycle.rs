//! Registry lifecycle: health state, admission of calls and draining.
//!
//! Health moves `Starting -> Ready -> Draining -> Stopped`. Calls are only
//! admitted while `Ready`; each admitted call holds an [`InFlightGuard`] so
//! shutdown can wait for them to finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::service::OperationError;

const DRAIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Services are initializing.
    Starting,
    Ready,
    /// No new calls are admitted; in-flight calls may still finish.
    Draining,
    Stopped,
}

#[derive(Debug)]
pub struct Lifecycle {
    draining: watch::Sender<bool>,
    in_flight: Arc<AtomicU64>,
    state: ArcSwap<HealthState>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        let (draining, _rx) = watch::channel(false);
        Self {
            draining,
            in_flight: Arc::new(AtomicU64::new(0)),
            state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    #[must_use]
    pub fn state(&self) -> HealthState {
        **self.state.load()
    }

    pub fn set_ready(&self) {
        self.state.store(Arc::new(HealthState::Ready));
    }

    /// Admits one call, returning the guard that tracks it.
    ///
    /// # Errors
    ///
    /// [`OperationError::ShuttingDown`] unless the registry is `Ready`.
    pub fn admit(&self) -> Result<InFlightGuard, OperationError> {
        if self.state() != HealthState::Ready {
            return Err(OperationError::ShuttingDown);
        }
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Resolves to `true` once draining begins.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.draining.subscribe()
    }

    /// Stops admitting calls and notifies subscribers.
    pub fn begin_drain(&self) {
        self.state.store(Arc::new(HealthState::Draining));
        self.draining.send_replace(true);
    }

    /// Waits up to `timeout` for in-flight calls to finish. On success the
    /// state becomes `Stopped`; on expiry it stays `Draining`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.in_flight() == 0 {
                self.state.store(Arc::new(HealthState::Stopped));
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count on drop, including during unwinding.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_only_when_ready() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), HealthState::Starting);
        assert!(matches!(lifecycle.admit(), Err(OperationError::ShuttingDown)));

        lifecycle.set_ready();
        let first = lifecycle.admit().unwrap();
        let second = lifecycle.admit().unwrap();
        assert_eq!(lifecycle.in_flight(), 2);
        drop(first);
        assert_eq!(lifecycle.in_flight(), 1);

        lifecycle.begin_drain();
        assert_eq!(lifecycle.state(), HealthState::Draining);
        assert!(lifecycle.admit().is_err());
        drop(second);
        assert_eq!(lifecycle.in_flight(), 0);
    }

    #[tokio::test]
    async fn subscribers_see_drain() {
        let lifecycle = Lifecycle::new();
        let mut rx = lifecycle.subscribe();
        assert!(!*rx.borrow());

        lifecycle.begin_drain();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_guards() {
        let lifecycle = Lifecycle::new();
        lifecycle.set_ready();
        let guard = lifecycle.admit().unwrap();
        lifecycle.begin_drain();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        assert!(lifecycle.wait_for_drain(Duration::from_secs(2)).await);
        assert_eq!(lifecycle.state(), HealthState::Stopped);
        release.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_with_held_guard() {
        let lifecycle = Lifecycle::new();
        lifecycle.set_ready();
        let _guard = lifecycle.admit().unwrap();
        lifecycle.begin_drain();

        assert!(!lifecycle.wait_for_drain(Duration::from_millis(50)).await);
        assert_eq!(lifecycle.state(), HealthState::Draining);
    }
}
