use thiserror::Error;

/// Errors that can occur when working with ZeTime smartwatches
#[derive(Error, Debug)]
pub enum ZeTimeError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Watch not found during scanning
    #[error("ZeTime watch not found")]
    DeviceNotFound,

    /// Connection to the watch failed
    #[error("Failed to connect to watch: {0}")]
    ConnectionFailed(String),

    /// Watch disconnected unexpectedly
    #[error("Watch disconnected")]
    Disconnected,

    /// A frame failed the structural well-formedness checks.
    ///
    /// Malformed frames are dropped and logged by the session; this error
    /// never propagates past the dispatcher.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A write or transaction submission failed on the link
    #[error("Transport error: {0}")]
    Transport(String),

    /// A decoded sample could not be persisted by the sample store
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A frame carried an opcode not present in the dispatcher table.
    ///
    /// Informational only; the frame is ignored.
    #[error("Unknown opcode {opcode:02X} on {channel} channel")]
    UnknownOpcode {
        /// Channel the frame arrived on
        channel: &'static str,
        /// Raw opcode byte
        opcode: u8,
    },

    /// An operation timed out
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The watch is not in a state that accepts the command
    #[error("Watch not ready: {reason}")]
    NotReady {
        /// Reason why the watch is not ready
        reason: String,
    },

    /// Invalid command parameters
    #[error("Invalid command parameters: {0}")]
    InvalidParameters(String),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for ZeTime operations
pub type Result<T> = std::result::Result<T, ZeTimeError>;

impl ZeTimeError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_) | Self::ConnectionFailed(_) | Self::Disconnected | Self::DeviceNotFound
        )
    }

    /// Check if this error is non-fatal for the wire-protocol sequence.
    ///
    /// Malformed frames, unknown opcodes, and persistence failures are
    /// reported and skipped; they never abort a running init or fetch.
    #[must_use]
    pub const fn is_wire_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame(_) | Self::UnknownOpcode { .. } | Self::Persistence(_)
        )
    }
}
