//! Static digital I/O.

use std::os::raw::c_uint;

use tracing::trace;

use crate::device::{dwf_call, DwfDevice};
use crate::error::Result;

/// Digital I/O accessor. Pin `n` is bit `n` of every mask.
#[derive(Clone)]
pub struct DigitalIo {
    device: DwfDevice,
}

impl DigitalIo {
    pub(crate) fn new(device: DwfDevice) -> Self {
        Self { device }
    }

    pub fn reset(&self) -> Result<()> {
        dwf_call!(self.device, FDwfDigitalIOReset())
    }

    /// Select which pins are driven.
    pub fn set_output_enable(&self, mask: u32) -> Result<()> {
        dwf_call!(self.device, FDwfDigitalIOOutputEnableSet(mask as c_uint))?;
        trace!(mask = format_args!("{:#06x}", mask), "DIO output enable");
        Ok(())
    }

    pub fn output_enable(&self) -> Result<u32> {
        let mut mask: c_uint = 0;
        dwf_call!(self.device, FDwfDigitalIOOutputEnableGet(&mut mask))?;
        Ok(mask)
    }

    /// Drive the enabled pins.
    pub fn write(&self, levels: u32) -> Result<()> {
        dwf_call!(self.device, FDwfDigitalIOOutputSet(levels as c_uint))?;
        trace!(levels = format_args!("{:#06x}", levels), "DIO output");
        Ok(())
    }

    /// Levels last written.
    pub fn output(&self) -> Result<u32> {
        let mut levels: c_uint = 0;
        dwf_call!(self.device, FDwfDigitalIOOutputGet(&mut levels))?;
        Ok(levels)
    }

    /// Sample every pin.
    pub fn read(&self) -> Result<u32> {
        dwf_call!(self.device, FDwfDigitalIOStatus())?;
        let mut levels: c_uint = 0;
        dwf_call!(self.device, FDwfDigitalIOInputStatus(&mut levels))?;
        Ok(levels)
    }
}
