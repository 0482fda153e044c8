//! Connection supervisor
//!
//! Drives the indicator from `Connecting` to `Connected`, or to `Error` once
//! the retry budget is spent, then hands control to the processing loop.

use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ConnectionError;
use crate::indicator::StatusIndicator;
use crate::link::DeviceLink;
use crate::status::{ConnectionState, Status};

/// Supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Connection attempts before giving up (default: 5)
    pub max_retries: u32,
    /// Per-attempt timeout in milliseconds
    pub attempt_timeout_ms: u64,
    /// Fixed delay between failed attempts in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            attempt_timeout_ms: 2000,
            retry_backoff_ms: 0,
        }
    }
}

/// How the processing phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The processing hook asked to stop
    Stopped { iterations: u64 },
    /// The device dropped the session; status is back to connecting
    LinkLost { iterations: u64 },
}

/// Connection supervisor for a dashcam device
pub struct ConnectionSupervisor<L> {
    link: L,
    indicator: StatusIndicator,
    config: SupervisorConfig,
    /// Attempts made over the supervisor lifetime
    attempts: u32,
}

impl<L: DeviceLink> ConnectionSupervisor<L> {
    /// Create a supervisor in the connecting state
    pub fn new(link: L, config: SupervisorConfig) -> Self {
        Self {
            link,
            indicator: StatusIndicator::new(),
            config,
            attempts: 0,
        }
    }

    /// Indicator owned by this supervisor
    pub fn indicator(&self) -> &StatusIndicator {
        &self.indicator
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.indicator.current_status()
    }

    /// Total connection attempts made
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Underlying link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Issue one connection attempt.
    ///
    /// The error state is terminal: no attempt is made once it is reached.
    pub async fn attempt_connect(&mut self, timeout: Option<Duration>) -> Status {
        match self.indicator.connection_state() {
            ConnectionState::Error | ConnectionState::Connected => return self.status(),
            ConnectionState::Connecting => {}
        }

        let timeout =
            timeout.unwrap_or_else(|| Duration::from_millis(self.config.attempt_timeout_ms));
        self.attempts += 1;

        match tokio::time::timeout(timeout, self.link.connect()).await {
            Ok(Ok(())) => {
                info!("Device connected after {} attempt(s)", self.attempts);
                self.indicator.set_connection(ConnectionState::Connected);
            }
            Ok(Err(e)) => debug!("Connection attempt {} failed: {}", self.attempts, e),
            Err(_) => debug!(
                "Connection attempt {} timed out after {}ms",
                self.attempts,
                timeout.as_millis()
            ),
        }

        self.status()
    }

    /// Retry until connected or `max_retries` attempts have failed.
    ///
    /// Exhaustion moves the indicator to `Error`. A supervisor already in
    /// `Error` makes no further attempts.
    pub async fn connect(&mut self, max_retries: u32) -> Result<(), ConnectionError> {
        if self.indicator.connection_state() == ConnectionState::Error {
            debug!("Not connecting: device already in error");
            return Err(ConnectionError::RetriesExhausted { attempts: 0 });
        }

        let mut attempted = 0;

        while self.indicator.connection_state() == ConnectionState::Connecting
            && attempted < max_retries
        {
            self.attempt_connect(None).await;
            attempted += 1;

            let failed = self.indicator.connection_state() != ConnectionState::Connected;
            if failed && attempted < max_retries && self.config.retry_backoff_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
            }
        }

        if self.indicator.connection_state() == ConnectionState::Connected {
            return Ok(());
        }

        warn!("Connection retries exhausted after {} attempts", attempted);
        self.indicator.set_connection(ConnectionState::Error);
        Err(ConnectionError::RetriesExhausted {
            attempts: attempted,
        })
    }

    /// Connect, then call `process` once per iteration while connected.
    ///
    /// `process` returning `ControlFlow::Break` ends the loop; the loop yields
    /// to the runtime between iterations.
    pub async fn run<F>(
        &mut self,
        max_retries: u32,
        mut process: F,
    ) -> Result<RunOutcome, ConnectionError>
    where
        F: FnMut(&StatusIndicator) -> ControlFlow<()>,
    {
        self.connect(max_retries).await?;

        let mut iterations = 0;
        while self.indicator.connection_state() == ConnectionState::Connected {
            if !self.link.is_alive() {
                warn!("Device link lost after {} iterations", iterations);
                self.indicator.set_connection(ConnectionState::Connecting);
                return Ok(RunOutcome::LinkLost { iterations });
            }

            iterations += 1;
            if process(&self.indicator).is_break() {
                info!("Processing stopped after {} iterations", iterations);
                return Ok(RunOutcome::Stopped { iterations });
            }

            tokio::task::yield_now().await;
        }

        Ok(RunOutcome::Stopped { iterations })
    }
}
