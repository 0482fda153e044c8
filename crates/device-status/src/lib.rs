//! Dashcam Device Status
//!
//! Connection lifecycle supervision and the status indicator that an
//! LED/display subsystem polls for its color:
//! - Connection states (connecting, connected, error)
//! - Safety levels (safe, warning, emergency)
//! - Fixed status → color palette with forced-color override
//! - Retrying connection supervisor with an explicit error state

mod error;
mod indicator;
mod link;
mod status;
mod supervisor;

pub use error::{ConnectionError, LinkError};
pub use indicator::{IndicatorHandle, StatusIndicator};
pub use link::{DeviceLink, SimulatedLink};
pub use status::{Color, ConnectionState, SafetyLevel, Status};
pub use supervisor::{ConnectionSupervisor, RunOutcome, SupervisorConfig};

/// Indicator palette
pub mod palette {
    use crate::Color;

    /// Connecting
    pub const BLUE: Color = Color::from_rgb(0x0D, 0x7F, 0xF2);
    /// Connected / safe
    pub const GREEN: Color = Color::from_rgb(0x03, 0xFC, 0x4E);
    /// Warning
    pub const YELLOW: Color = Color::from_rgb(0xFF, 0xF6, 0x00);
    /// Error / emergency
    pub const RED: Color = Color::from_rgb(0xFF, 0x00, 0x18);
}
