//! Network (impedance) analyzer subsystem.
//!
//! Generator channel 1 drives the device under test; scope channel 1 sees
//! its input and scope channel 2 its output.

use std::os::raw::c_int;
use std::ptr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{dwf_call, AutoConfigure, DwfDevice};
use crate::error::{DwfError, Result};

/// Analyzer excitation and reference setup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Excitation amplitude in volts
    pub amplitude: f64,
    /// Excitation offset in volts
    pub offset: f64,
    /// Periods measured per frequency point
    pub periods: i32,
    /// Reference resistor in ohms
    pub reference_ohms: f64,
    /// Wiring mode; `0` is W1-C1-DUT-C2-R-GND
    pub mode: i32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            offset: 0.0,
            periods: 16,
            reference_ohms: 1e4,
            mode: 0,
        }
    }
}

impl AnalyzerConfig {
    pub fn new(amplitude: f64, offset: f64, periods: i32) -> Self {
        Self {
            amplitude,
            offset,
            periods,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.periods < 1 {
            return Err(DwfError::InvalidConfig {
                message: format!("Analyzer needs at least one period, got {}", self.periods),
            });
        }
        if !self.amplitude.is_finite() || !self.offset.is_finite() {
            return Err(DwfError::InvalidConfig {
                message: "Analyzer amplitude and offset must be finite".to_string(),
            });
        }
        Ok(())
    }
}

/// Analyzer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyzerStatus {
    /// Not running; nothing will ever be measured
    Idle,
    /// Measuring
    Busy,
    /// A fresh reading is available
    Done,
}

impl AnalyzerStatus {
    pub fn from_raw(raw: dwf_sys::DwfState) -> Self {
        match raw {
            dwf_sys::DwfStateReady => Self::Idle,
            dwf_sys::DwfStateDone => Self::Done,
            _ => Self::Busy,
        }
    }
}

/// Gain and phase of one analyzer input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub gain: f64,
    /// Phase in radians
    pub phase_rad: f64,
}

/// Network analyzer accessor.
#[derive(Clone)]
pub struct ImpedanceAnalyzer {
    device: DwfDevice,
}

impl ImpedanceAnalyzer {
    pub(crate) fn new(device: DwfDevice) -> Self {
        Self { device }
    }

    /// Configure and start the analyzer.
    pub fn configure(&self, cfg: &AnalyzerConfig) -> Result<()> {
        cfg.validate()?;
        self.device.set_auto_configure(AutoConfigure::Dynamic)?;
        dwf_call!(self.device, FDwfAnalogImpedanceReset())?;
        dwf_call!(self.device, FDwfAnalogImpedanceModeSet(cfg.mode))?;
        dwf_call!(
            self.device,
            FDwfAnalogImpedanceReferenceSet(cfg.reference_ohms)
        )?;
        dwf_call!(self.device, FDwfAnalogImpedanceAmplitudeSet(cfg.amplitude))?;
        dwf_call!(self.device, FDwfAnalogImpedanceOffsetSet(cfg.offset))?;
        dwf_call!(
            self.device,
            FDwfAnalogImpedancePeriodSet(cfg.periods as c_int)
        )?;
        dwf_call!(self.device, FDwfAnalogImpedanceConfigure(1))?;
        debug!(
            amplitude = cfg.amplitude,
            offset = cfg.offset,
            periods = cfg.periods,
            "Network analyzer started"
        );
        Ok(())
    }

    pub fn set_frequency(&self, hz: f64) -> Result<()> {
        dwf_call!(self.device, FDwfAnalogImpedanceFrequencySet(hz))
    }

    /// Drop the reading in progress so the next one starts after this call.
    pub fn discard_last_capture(&self) -> Result<()> {
        dwf_call!(self.device, FDwfAnalogImpedanceStatus(ptr::null_mut()))
    }

    pub fn status(&self) -> Result<AnalyzerStatus> {
        let mut raw: dwf_sys::DwfState = 0;
        dwf_call!(self.device, FDwfAnalogImpedanceStatus(&mut raw))?;
        Ok(AnalyzerStatus::from_raw(raw))
    }

    /// Gain and phase of `channel` for the last reading.
    pub fn raw_input(&self, channel: i32) -> Result<RawReading> {
        let (mut gain, mut phase_rad) = (0.0, 0.0);
        dwf_call!(
            self.device,
            FDwfAnalogImpedanceStatusInput(channel, &mut gain, &mut phase_rad)
        )?;
        Ok(RawReading { gain, phase_rad })
    }

    pub fn stop(&self) -> Result<()> {
        dwf_call!(self.device, FDwfAnalogImpedanceConfigure(0))
    }
}
