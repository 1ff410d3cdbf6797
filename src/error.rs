//! Error types for the acquisition core.
//!
//! Every fallible operation in this crate returns [`ControlinoError`]. Nothing here is
//! fatal to the poll loop: registration failures leave the registry untouched, command
//! failures drop the offending line, and schedule slips are reported as outcomes of a
//! poll pass rather than as errors.
//!
//! ## Error Categories
//!
//! - **Registration Errors**: unknown channel kinds, bad rates or widths, capacity limits
//! - **Capability Errors**: writing to or re-directing a channel kind that cannot do it
//! - **Command Errors**: unrecognised command names and malformed arguments
//! - **Codec Errors**: malformed packets seen by the host-side reader
//! - **Configuration Errors**: invalid board or packet settings
//! - **I/O Errors**: transport and configuration file failures
//!
//! ## Helper Constructors
//!
//! ```rust
//! use controlino::ControlinoError;
//!
//! let err = ControlinoError::invalid_argument("CH:READ", "missing channel identifier");
//! assert!(!err.is_retryable());
//! for suggestion in err.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use thiserror::Error;

/// Result type alias for controller operations.
pub type Result<T, E = ControlinoError> = std::result::Result<T, E>;

/// Main error type for controller operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ControlinoError {
    #[error("Unknown channel type '{tag}'")]
    UnknownChannelType { tag: char },

    #[error("Invalid sampling rate {rate} Hz (must be between 1 and 1000)")]
    InvalidSamplingRate { rate: u32 },

    #[error("Invalid datapoint width {width:?} for channel type '{tag}'")]
    InvalidByteWidth { tag: char, width: Option<usize> },

    #[error("Failed to allocate a {bytes} byte data block")]
    OutOfMemory { bytes: usize },

    #[error("Channel registry is full ({capacity} channels)")]
    RegistryFull { capacity: usize },

    #[error("Data block needs {required} bytes but packets are limited to {capacity} bytes")]
    PacketOverflow { required: usize, capacity: usize },

    #[error("Channel type '{tag}' does not support {operation}")]
    UnsupportedOperation { tag: char, operation: &'static str },

    #[error("Unknown command '{command}'")]
    UnknownCommand { command: String },

    #[error("Invalid arguments for {command}: {details}")]
    InvalidArgument { command: String, details: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ControlinoError {
    /// Returns whether repeating the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ControlinoError::OutOfMemory { .. } => true,
            ControlinoError::Io { .. } => true,
            ControlinoError::UnknownChannelType { .. } => false,
            ControlinoError::InvalidSamplingRate { .. } => false,
            ControlinoError::InvalidByteWidth { .. } => false,
            ControlinoError::RegistryFull { .. } => false,
            ControlinoError::PacketOverflow { .. } => false,
            ControlinoError::UnsupportedOperation { .. } => false,
            ControlinoError::UnknownCommand { .. } => false,
            ControlinoError::InvalidArgument { .. } => false,
            ControlinoError::Parse { .. } => false,
            ControlinoError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ControlinoError::UnknownChannelType { .. } => vec![
                "Use one of the channel types A, D, P or I",
                "Check the channel identifier prefix",
            ],
            ControlinoError::InvalidSamplingRate { .. } => {
                vec!["Request a sampling rate between 1 and 1000 Hz"]
            }
            ControlinoError::InvalidByteWidth { .. } => vec![
                "Pass the datapoint width when registering bus channels",
                "Use a width of at least one byte",
            ],
            ControlinoError::OutOfMemory { .. } => vec![
                "Lower the sampling rate of the channel",
                "Register fewer channels",
            ],
            ControlinoError::RegistryFull { .. } => vec![
                "Register fewer channels",
                "Select a board profile with more pins",
            ],
            ControlinoError::PacketOverflow { .. } => vec![
                "Lower the sampling rate of the channel",
                "Raise the packet rate",
                "Increase the maximum packet size",
            ],
            ControlinoError::UnsupportedOperation { .. } => {
                vec!["Check which operations the channel type supports"]
            }
            ControlinoError::UnknownCommand { .. } => vec![
                "Check the command spelling against the supported command list",
                "Terminate commands with a carriage return",
            ],
            ControlinoError::InvalidArgument { .. } => {
                vec!["Check the number and format of command arguments"]
            }
            ControlinoError::Parse { .. } => vec![
                "Check that the byte stream is aligned to a packet header",
                "Verify the sender and receiver agree on the packet format",
            ],
            ControlinoError::Config { .. } => vec![
                "Check the configuration file against the documented fields",
                "Fall back to the default board profile",
            ],
            ControlinoError::Io { .. } => vec![
                "Check the serial port is still connected",
                "Check file paths and permissions",
            ],
        }
    }

    /// Helper constructor for malformed command arguments.
    pub fn invalid_argument(command: impl Into<String>, details: impl Into<String>) -> Self {
        ControlinoError::InvalidArgument { command: command.into(), details: details.into() }
    }

    /// Helper constructor for packet decoding errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        ControlinoError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(details: impl Into<String>) -> Self {
        ControlinoError::Config { details: details.into() }
    }

    /// Helper constructor for I/O errors with context.
    pub fn io_error(context: impl Into<String>, source: std::io::Error) -> Self {
        ControlinoError::Io { context: context.into(), source }
    }
}

impl From<std::io::Error> for ControlinoError {
    fn from(err: std::io::Error) -> Self {
        ControlinoError::Io { context: "<unknown>".to_string(), source: err }
    }
}

impl From<serde_yaml_ng::Error> for ControlinoError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        ControlinoError::Config { details: err.to_string() }
    }
}
