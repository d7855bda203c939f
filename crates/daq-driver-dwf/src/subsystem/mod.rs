//! Instrument subsystems.
//!
//! Each accessor holds a clone of the [`DwfDevice`](crate::DwfDevice) and
//! exposes one instrument of the Analog Discovery: scope, waveform
//! generator, network analyzer, static digital I/O and the SPI master.

pub mod analog_in;
pub mod analog_out;
pub mod digital_io;
pub mod impedance;
pub mod spi;

use crate::error::{DwfError, Result};

/// Check a channel index against a channel count. `-1` addresses every
/// channel at once when `allow_all` is set.
pub(crate) fn validate_channel(channel: i32, count: i32, allow_all: bool) -> Result<()> {
    if (allow_all && channel == -1) || (0..count).contains(&channel) {
        Ok(())
    } else {
        Err(DwfError::InvalidChannel {
            channel,
            max: count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_channel() {
        assert!(validate_channel(0, 2, false).is_ok());
        assert!(validate_channel(1, 2, false).is_ok());
        assert!(validate_channel(2, 2, false).is_err());
        assert!(validate_channel(-1, 2, false).is_err());
        assert!(validate_channel(-1, 2, true).is_ok());
    }
}
