//! Error types for WaveForms SDK operations.
//!
//! Every SDK call that reports failure is turned into [`DwfError::Sdk`]
//! carrying the function name and the text of the SDK's last-error buffer,
//! read immediately after the failing call.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::time::Duration;

use thiserror::Error;

use crate::acquisition::AcquisitionState;

/// Result type alias for WaveForms operations.
pub type Result<T> = std::result::Result<T, DwfError>;

/// Errors that can occur when working with a WaveForms instrument.
#[derive(Error, Debug)]
pub enum DwfError {
    /// No connected device matches the selector
    #[error("No device matches {selector}")]
    DeviceNotFound { selector: String },

    /// The matching device is already opened by another process
    #[error("Device {index} ({serial}) is already in use")]
    DeviceBusy { index: i32, serial: String },

    /// An SDK function reported failure
    #[error("{function} failed: {message}")]
    Sdk {
        function: &'static str,
        message: String,
    },

    /// Waveform shape not accepted by the requested operation
    #[error("Unsupported waveform shape '{shape}'")]
    UnsupportedWaveform { shape: String },

    /// Channel index outside the instrument's channel count
    #[error("Invalid channel {channel}: instrument has {max} channels")]
    InvalidChannel { channel: i32, max: i32 },

    /// Invalid configuration or parameter, rejected before any I/O
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Samples requested while the acquisition is not complete
    #[error("Acquisition not ready (state {state:?})")]
    NotReady { state: AcquisitionState },

    /// Acquisition did not reach `Done` within the caller's timeout
    #[error("Acquisition timed out after {elapsed:?} (last state {last_state:?})")]
    AcquisitionTimeout {
        elapsed: Duration,
        last_state: AcquisitionState,
    },

    /// The instrument stopped answering as expected mid-operation
    #[error("Communication error: {message}")]
    Communication { message: String },

    /// Operation not supported by this instrument
    #[error("Operation not supported: {message}")]
    NotSupported { message: String },

    /// A string passed to the SDK contained an interior NUL byte
    #[error("String contains a NUL byte: {0}")]
    NullCharacter(#[from] std::ffi::NulError),
}

impl DwfError {
    /// Create an error from the SDK's last-error buffer.
    ///
    /// # Safety
    ///
    /// Must be called right after the failing SDK call, before any other
    /// SDK call can overwrite the buffer.
    pub(crate) unsafe fn from_last_error(function: &'static str) -> Self {
        let message = last_error_message().unwrap_or_else(|| "Unknown error".to_string());
        Self::Sdk { function, message }
    }

    /// Check if this is a "device not found" type error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DeviceNotFound { .. })
    }

    /// Check if the device is busy.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::DeviceBusy { .. })
    }

    /// Check if an acquisition timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AcquisitionTimeout { .. })
    }

    /// Check if the error was raised by validation, before touching hardware.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedWaveform { .. }
                | Self::InvalidChannel { .. }
                | Self::InvalidConfig { .. }
                | Self::NullCharacter(_)
        )
    }
}

/// Text of the SDK's last-error buffer, if any.
///
/// # Safety
///
/// The buffer is process-wide: the caller must make sure no other SDK call
/// ran since the one whose error is wanted.
pub(crate) unsafe fn last_error_message() -> Option<String> {
    let mut buf = [0 as c_char; dwf_sys::DWF_ERROR_MSG_LEN];
    if dwf_sys::FDwfGetLastErrorMsg(buf.as_mut_ptr()) == 0 {
        return None;
    }
    let text = CStr::from_ptr(buf.as_ptr()).to_string_lossy();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Turn an SDK `BOOL` return into a `Result`.
///
/// Must be called while the FFI lock that guarded the call is still held.
pub(crate) fn check(rc: c_int, function: &'static str) -> Result<()> {
    if rc != 0 {
        Ok(())
    } else {
        // SAFETY: called directly after the failing SDK call
        Err(unsafe { DwfError::from_last_error(function) })
    }
}
