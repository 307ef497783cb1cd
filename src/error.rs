//! Error types for Setu

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Setu error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be written
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Node link dropped or failed (recoverable by reconnect)
    #[error("Link fault: {0}")]
    LinkFault(String),

    /// Outbound relay connection broken (recoverable by reconnect)
    #[error("Transport fault: {0}")]
    TransportFault(String),

    /// Checksum mismatch
    #[error("Checksum error: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumError {
        /// Expected checksum value
        expected: u8,
        /// Actual checksum value
        actual: u8,
    },

    /// Invalid packet or field value
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Worker thread panicked
    #[error("Thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for faults the link supervisor recovers from by reconnecting
    pub fn is_link_fault(&self) -> bool {
        matches!(self, Error::LinkFault(_) | Error::Serial(_) | Error::Io(_))
    }

    /// True for faults that end the current relay session
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, Error::TransportFault(_) | Error::Io(_))
    }

    /// True when a received frame failed validation
    pub fn is_corrupt_frame(&self) -> bool {
        matches!(self, Error::ChecksumError { .. } | Error::InvalidPacket(_))
    }
}
