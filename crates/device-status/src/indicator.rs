//! Status indicator
//!
//! Holds the device status and resolves the color shown on the LED. The
//! connection state is authoritative; a safety level only drives the
//! indicator while the device is connected.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::status::{Color, ConnectionState, SafetyLevel, Status};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct IndicatorState {
    connection: ConnectionState,
    safety: Option<SafetyLevel>,
}

impl IndicatorState {
    fn status(&self) -> Status {
        match (self.connection, self.safety) {
            (ConnectionState::Connected, Some(level)) => Status::Safety(level),
            (state, _) => Status::Connection(state),
        }
    }
}

fn resolve_color(current: Status, override_status: Option<Status>) -> Color {
    override_status.unwrap_or(current).color()
}

/// Owner side of the indicator, mutated by the connection supervisor
#[derive(Debug)]
pub struct StatusIndicator {
    tx: watch::Sender<IndicatorState>,
}

impl StatusIndicator {
    /// Create an indicator in the connecting state
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(IndicatorState::default());
        Self { tx }
    }

    /// Current status
    pub fn current_status(&self) -> Status {
        self.tx.borrow().status()
    }

    /// Current connection state, regardless of safety level
    pub fn connection_state(&self) -> ConnectionState {
        self.tx.borrow().connection
    }

    /// Color for `override_status` if given, otherwise for the current status
    pub fn color(&self, override_status: Option<Status>) -> Color {
        resolve_color(self.current_status(), override_status)
    }

    /// Move the connection lifecycle. Leaving `Connected` clears any safety level.
    pub fn set_connection(&self, state: ConnectionState) {
        self.tx.send_modify(|s| {
            if s.connection != state {
                info!("Connection state {:?} -> {:?}", s.connection, state);
            }
            s.connection = state;
            if state != ConnectionState::Connected {
                s.safety = None;
            }
        });
    }

    /// Report a safety level. Ignored for display unless connected.
    pub fn set_safety(&self, level: SafetyLevel) {
        self.tx.send_modify(|s| {
            debug!("Safety level set to {:?}", level);
            s.safety = Some(level);
        });
    }

    /// Drop the safety level, falling back to the connection state
    pub fn clear_safety(&self) {
        self.tx.send_modify(|s| s.safety = None);
    }

    /// Read-only handle for a display/actuation consumer
    pub fn subscribe(&self) -> IndicatorHandle {
        IndicatorHandle {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of the indicator (LED driver, display)
#[derive(Debug, Clone)]
pub struct IndicatorHandle {
    rx: watch::Receiver<IndicatorState>,
}

impl IndicatorHandle {
    /// Current status
    pub fn current_status(&self) -> Status {
        self.rx.borrow().status()
    }

    /// Color for `override_status` if given, otherwise for the current status
    pub fn color(&self, override_status: Option<Status>) -> Color {
        resolve_color(self.current_status(), override_status)
    }

    /// Wait for the next status change. Returns `None` once the indicator is gone.
    pub async fn changed(&mut self) -> Option<Status> {
        self.rx.changed().await.ok()?;
        let status = self.rx.borrow_and_update().status();
        Some(status)
    }
}
