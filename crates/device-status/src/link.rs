//! Device link capability
//!
//! The physical transport to the dashcam is outside this crate; the
//! supervisor only needs something that can attempt a session.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::LinkError;

/// Transport used by the connection supervisor
pub trait DeviceLink {
    /// Attempt to open a session with the device
    fn connect(&mut self) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Whether an established session is still up
    fn is_alive(&self) -> bool {
        true
    }
}

/// Simulated link for testing and dry runs (no hardware required)
///
/// Fails the first `fail_first` attempts, then succeeds.
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    fail_first: u32,
    latency: Duration,
    attempts: Arc<AtomicU32>,
    alive: Arc<AtomicBool>,
}

impl SimulatedLink {
    /// Link that fails `fail_first` attempts before connecting
    pub fn new(fail_first: u32) -> Self {
        Self {
            fail_first,
            latency: Duration::ZERO,
            attempts: Arc::new(AtomicU32::new(0)),
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Link that never connects
    pub fn unreachable() -> Self {
        Self::new(u32::MAX)
    }

    /// Delay every attempt by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of connect attempts made so far (shared between clones)
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Simulate the device dropping off
    pub fn drop_session(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl DeviceLink for SimulatedLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if attempt <= self.fail_first {
            debug!("Simulated link: attempt {} fails", attempt);
            return Err(LinkError::NotResponding);
        }

        self.alive.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fails_then_connects() {
        let mut link = SimulatedLink::new(2);
        assert!(link.connect().await.is_err());
        assert!(link.connect().await.is_err());
        assert!(link.connect().await.is_ok());
        assert_eq!(link.attempts(), 3);
        assert!(link.is_alive());
    }

    #[tokio::test]
    async fn test_drop_session() {
        let mut link = SimulatedLink::new(0);
        link.connect().await.unwrap();
        let observer = link.clone();
        observer.drop_session();
        assert!(!link.is_alive());
    }
}
