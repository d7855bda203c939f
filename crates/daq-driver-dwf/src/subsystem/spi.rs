//! SPI master on the digital I/O pins.
//!
//! Words are 8 bits on a single data line; 32-bit transfers are four bytes
//! framed by one chip-select assertion, most significant byte first.

use std::os::raw::{c_int, c_uchar};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::device::{dwf_call, DwfDevice};
use crate::error::{DwfError, Result};

/// Clock polarity and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpiMode {
    /// CPOL 0, CPHA 0
    #[default]
    Mode0,
    /// CPOL 0, CPHA 1
    Mode1,
    /// CPOL 1, CPHA 0
    Mode2,
    /// CPOL 1, CPHA 1
    Mode3,
}

impl SpiMode {
    pub fn from_index(index: u8) -> Result<Self> {
        match index {
            0 => Ok(Self::Mode0),
            1 => Ok(Self::Mode1),
            2 => Ok(Self::Mode2),
            3 => Ok(Self::Mode3),
            _ => Err(DwfError::InvalidConfig {
                message: format!("SPI mode must be 0-3, got {}", index),
            }),
        }
    }

    fn index(self) -> c_int {
        self as c_int
    }
}

/// Pin assignment and timing of the SPI master.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpiConfig {
    pub frequency_hz: f64,
    pub clock_pin: i32,
    pub mosi_pin: i32,
    pub miso_pin: i32,
    pub cs_pin: i32,
    pub mode: SpiMode,
    pub msb_first: bool,
}

/// SPI master accessor.
#[derive(Clone)]
pub struct Spi {
    device: DwfDevice,
}

const SINGLE_DQ: c_int = 1;
const BITS_PER_WORD: c_int = 8;

impl Spi {
    pub(crate) fn new(device: DwfDevice) -> Self {
        Self { device }
    }

    /// Reset the master and apply `cfg`. Chip select is left released.
    pub fn init(&self, cfg: &SpiConfig) -> Result<()> {
        dwf_call!(self.device, FDwfDigitalSpiReset())?;
        dwf_call!(self.device, FDwfDigitalSpiFrequencySet(cfg.frequency_hz))?;
        dwf_call!(self.device, FDwfDigitalSpiClockSet(cfg.clock_pin))?;
        dwf_call!(self.device, FDwfDigitalSpiDataSet(0, cfg.mosi_pin))?;
        dwf_call!(self.device, FDwfDigitalSpiDataSet(1, cfg.miso_pin))?;
        dwf_call!(self.device, FDwfDigitalSpiModeSet(cfg.mode.index()))?;
        dwf_call!(
            self.device,
            FDwfDigitalSpiOrderSet(cfg.msb_first as c_int)
        )?;
        self.select(cfg.cs_pin, true)?;
        debug!(
            frequency_hz = cfg.frequency_hz,
            clk = cfg.clock_pin,
            mosi = cfg.mosi_pin,
            miso = cfg.miso_pin,
            cs = cfg.cs_pin,
            "SPI master initialised"
        );
        Ok(())
    }

    /// Drive chip select `cs` to `level`.
    pub fn select(&self, cs: i32, level: bool) -> Result<()> {
        dwf_call!(self.device, FDwfDigitalSpiSelect(cs, level as c_int))
    }

    /// Full-duplex transfer of `tx`, returning `n_read` received bytes.
    pub fn write_read(&self, tx: &[u8], n_read: usize) -> Result<Vec<u8>> {
        let mut tx = tx.to_vec();
        let mut rx = vec![0 as c_uchar; n_read];
        let (n_tx, n_rx) = (tx.len() as c_int, n_read as c_int);
        dwf_call!(
            self.device,
            FDwfDigitalSpiWriteRead(
                SINGLE_DQ,
                BITS_PER_WORD,
                tx.as_mut_ptr(),
                n_tx,
                rx.as_mut_ptr(),
                n_rx
            )
        )?;
        Ok(rx)
    }

    /// Send one 32-bit word framed by chip select `cs`.
    pub fn write_u32(&self, cs: i32, word: u32) -> Result<()> {
        self.select(cs, false)?;
        let result = self.write_read(&word.to_be_bytes(), 0);
        self.select(cs, true)?;
        result?;
        trace!(cs, word = format_args!("{:#010x}", word), "SPI write");
        Ok(())
    }

    /// Clock in one 32-bit word framed by chip select `cs`.
    pub fn read_u32(&self, cs: i32) -> Result<u32> {
        self.select(cs, false)?;
        let result = self.write_read(&[], 4);
        self.select(cs, true)?;
        let word = assemble_u32(&result?)?;
        trace!(cs, word = format_args!("{:#010x}", word), "SPI read");
        Ok(word)
    }
}

fn assemble_u32(bytes: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = bytes.try_into().map_err(|_| DwfError::Communication {
        message: format!("Expected 4 SPI bytes, got {}", bytes.len()),
    })?;
    Ok(u32::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_index() {
        assert_eq!(SpiMode::from_index(0).unwrap(), SpiMode::Mode0);
        assert_eq!(SpiMode::from_index(3).unwrap().index(), 3);
        assert!(SpiMode::from_index(4).is_err());
    }

    #[test]
    fn test_assemble_msb_first() {
        assert_eq!(assemble_u32(&[0x12, 0x34, 0x56, 0x78]).unwrap(), 0x1234_5678);
        assert!(assemble_u32(&[0x12]).is_err());
    }
}
