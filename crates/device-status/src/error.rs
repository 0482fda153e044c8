//! Device Connection Error Types

use thiserror::Error;

/// Errors reported by a single link attempt
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// Device did not answer
    #[error("Device not responding")]
    NotResponding,

    /// Transport-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Device refused the session
    #[error("Connection refused: {0}")]
    Refused(String),
}

/// Errors surfaced by the connection supervisor
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Every allowed attempt failed; the supervisor is now in the error state
    #[error("Connection retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}
