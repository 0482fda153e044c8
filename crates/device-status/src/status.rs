//! Status values and their indicator colors

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::palette;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Error,
}

/// Safety level reported while driving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Safe,
    Warning,
    Emergency,
}

/// Device status as seen by the indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Connection(ConnectionState),
    Safety(SafetyLevel),
}

impl Status {
    pub const CONNECTING: Status = Status::Connection(ConnectionState::Connecting);
    pub const CONNECTED: Status = Status::Connection(ConnectionState::Connected);
    pub const ERROR: Status = Status::Connection(ConnectionState::Error);
    pub const SAFE: Status = Status::Safety(SafetyLevel::Safe);
    pub const WARNING: Status = Status::Safety(SafetyLevel::Warning);
    pub const EMERGENCY: Status = Status::Safety(SafetyLevel::Emergency);

    /// Every status value
    pub const ALL: [Status; 6] = [
        Status::CONNECTING,
        Status::CONNECTED,
        Status::ERROR,
        Status::SAFE,
        Status::WARNING,
        Status::EMERGENCY,
    ];

    /// Indicator color for this status
    pub const fn color(self) -> Color {
        match self {
            Status::Connection(ConnectionState::Connecting) => palette::BLUE,
            Status::Connection(ConnectionState::Connected) => palette::GREEN,
            Status::Connection(ConnectionState::Error) => palette::RED,
            Status::Safety(SafetyLevel::Safe) => palette::GREEN,
            Status::Safety(SafetyLevel::Warning) => palette::YELLOW,
            Status::Safety(SafetyLevel::Emergency) => palette::RED,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Connection(ConnectionState::Connecting) => "CONNECTING",
            Status::Connection(ConnectionState::Connected) => "CONNECTED",
            Status::Connection(ConnectionState::Error) => "ERROR",
            Status::Safety(SafetyLevel::Safe) => "SAFE",
            Status::Safety(SafetyLevel::Warning) => "WARNING",
            Status::Safety(SafetyLevel::Emergency) => "EMERGENCY",
        }
    }
}

impl From<ConnectionState> for Status {
    fn from(state: ConnectionState) -> Self {
        Status::Connection(state)
    }
}

impl From<SafetyLevel> for Status {
    fn from(level: SafetyLevel) -> Self {
        Status::Safety(level)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// RGB display value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Packed `0xRRGGBB` value
    pub fn as_u32(&self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// `#RRGGBB`
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_palette_hex() {
        assert_eq!(Status::CONNECTING.color().to_hex(), "#0D7FF2");
        assert_eq!(Status::CONNECTED.color().to_hex(), "#03FC4E");
        assert_eq!(Status::WARNING.color().to_hex(), "#FFF600");
        assert_eq!(Status::ERROR.color().to_hex(), "#FF0018");
    }

    #[test]
    fn test_shared_colors() {
        assert_eq!(Status::SAFE.color(), Status::CONNECTED.color());
        assert_eq!(Status::EMERGENCY.color(), Status::ERROR.color());
        assert_eq!(palette::GREEN.as_u32(), 0x03FC4E);
    }

    #[test]
    fn test_status_names() {
        assert_eq!(Status::CONNECTING.to_string(), "CONNECTING");
        assert_eq!(Status::from(SafetyLevel::Emergency).to_string(), "EMERGENCY");
    }

    proptest! {
        #[test]
        fn test_every_status_has_a_color(idx in 0usize..Status::ALL.len()) {
            let status = Status::ALL[idx];
            let hex = status.color().to_hex();
            prop_assert_eq!(hex.len(), 7);
            prop_assert!(hex.starts_with('#'));
        }
    }
}
