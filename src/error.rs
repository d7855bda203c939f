//! Error types for the BIMMS measurement stack.
//!
//! Driver failures are wrapped unchanged in [`BimmsError::Driver`]; the
//! remaining variants cover the board protocol, the relay and mode
//! configuration layers, and persistence.

use std::path::PathBuf;

use daq_driver_dwf::DwfError;
use thiserror::Error;

/// Result type alias for BIMMS operations.
pub type Result<T> = std::result::Result<T, BimmsError>;

/// Errors raised by the BIMMS layer.
#[derive(Error, Debug)]
pub enum BimmsError {
    /// Instrument driver failure, propagated unmodified
    #[error(transparent)]
    Driver(#[from] DwfError),

    /// The board or the analyzer stopped answering as expected
    #[error("Communication error: {0}")]
    Communication(String),

    /// The board ID read over SPI is outside the valid range
    #[error(
        "Failed to communicate with the BIMMS microcontroller (board id {id}). \
         Make sure BIMMS is powered (try to reconnect the power jack)"
    )]
    BoardNotDetected { id: u32 },

    /// Relay name not known to the bitfield
    #[error("Unknown switch '{0}'")]
    UnknownSwitch(String),

    /// Mode option name never registered
    #[error("Unknown option '{0}'")]
    UnknownOption(String),

    /// Value outside the option's domain
    #[error("Invalid value for '{name}': {reason}")]
    InvalidConfigValue { name: String, reason: String },

    /// Wiring or mode the hardware cannot provide
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// File access failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Settings could not be loaded or failed validation
    #[error("Settings error: {0}")]
    Settings(String),
}

impl BimmsError {
    pub(crate) fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Check if the instrument or board could not be found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Driver(e) => e.is_not_found(),
            Self::BoardNotDetected { .. } => true,
            _ => false,
        }
    }

    /// Check if the instrument is already opened elsewhere.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Driver(e) if e.is_busy())
    }

    /// Check if an acquisition timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Driver(e) if e.is_timeout())
    }

    /// Check if the error was raised by validation, before touching hardware.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Driver(e) => e.is_configuration(),
            Self::UnknownSwitch(_)
            | Self::UnknownOption(_)
            | Self::InvalidConfigValue { .. }
            | Self::NotSupported(_)
            | Self::Settings(_) => true,
            _ => false,
        }
    }
}

impl From<figment::Error> for BimmsError {
    fn from(err: figment::Error) -> Self {
        Self::Settings(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_errors_pass_through() {
        let err: BimmsError = DwfError::InvalidChannel { channel: 4, max: 2 }.into();
        assert_eq!(
            err.to_string(),
            DwfError::InvalidChannel { channel: 4, max: 2 }.to_string()
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn test_classification() {
        assert!(BimmsError::BoardNotDetected { id: 0 }.is_not_found());
        assert!(BimmsError::UnknownSwitch("foo".into()).is_configuration());
        assert!(!BimmsError::Communication("lost".into()).is_configuration());
        assert!(BimmsError::from(DwfError::DeviceBusy {
            index: 0,
            serial: "SN:1".into()
        })
        .is_busy());
    }
}
