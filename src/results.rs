//! Measurement results.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use daq_driver_dwf::AcquisitionWarning;
use serde::{Deserialize, Serialize};

use crate::config::OptionValue;

/// Context recorded with every measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub measurement: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Mode configuration at the time of the measurement
    pub mode: BTreeMap<String, OptionValue>,
    /// Relay bitfield applied on the board
    pub relays: u32,
    pub ch1_gain: u32,
    pub ch2_gain: u32,
    /// Numeric parameters of the request
    pub parameters: BTreeMap<String, f64>,
}

/// Time-domain capture of both scope channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    /// Seconds relative to the trigger
    pub timestamps: Vec<f64>,
    pub ch1: Vec<f64>,
    pub ch2: Vec<f64>,
    pub achieved_rate_hz: f64,
    pub metadata: Metadata,
    pub warnings: Vec<AcquisitionWarning>,
}

/// Gain/phase frequency response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodeResult {
    pub frequencies: Vec<f64>,
    /// Channel 2 gain relative to the reference
    pub gain: Vec<f64>,
    /// Channel 2 phase in radians, unwrapped above π/2
    pub phase: Vec<f64>,
    /// Reciprocal of the raw channel 1 gain (0 when the raw gain is not positive)
    pub gain_ch1: Vec<f64>,
    pub metadata: Metadata,
}

impl BodeResult {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Channel 2 gain in dB.
    pub fn to_db(&self) -> Vec<f64> {
        self.gain.iter().map(|g| to_db(*g)).collect()
    }

    pub fn phase_degrees(&self) -> Vec<f64> {
        self.phase.iter().map(|p| p.to_degrees()).collect()
    }
}

/// `20·log10(gain)`.
pub fn to_db(gain: f64) -> f64 {
    20.0 * gain.log10()
}

/// Move channel 2 phases below π/2 up by one turn.
pub fn unwrap_phase(phase_rad: f64) -> f64 {
    if phase_rad < PI / 2.0 {
        phase_rad + 2.0 * PI
    } else {
        phase_rad
    }
}

/// Reciprocal of the raw channel 1 gain, 0 when it is not positive.
pub fn invert_gain(raw: f64) -> f64 {
    if raw > 0.0 {
        1.0 / raw
    } else {
        0.0
    }
}

/// Gain and phase at one frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainPhase {
    pub frequency_hz: f64,
    pub gain: f64,
    pub phase_rad: f64,
    pub gain_ch1: f64,
}

/// Averaged DC level of both channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcOffsetResult {
    /// Channel 1 in volts at the board input
    pub ch1: f64,
    /// Channel 2 in volts, or in amps in galvanostatic mode
    pub ch2: f64,
    /// Channel means as seen by the scope, before gain calibration
    pub raw_ch1: f64,
    pub raw_ch2: f64,
    pub n_averages: usize,
    pub metadata: Metadata,
    pub warnings: Vec<AcquisitionWarning>,
}

/// Any measurement outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    TimeDomain(MeasurementResult),
    FrequencySweep(BodeResult),
    DcOffset(DcOffsetResult),
}

impl Measurement {
    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::TimeDomain(r) => &r.metadata,
            Self::FrequencySweep(r) => &r.metadata,
            Self::DcOffset(r) => &r.metadata,
        }
    }

    /// Acquisition warnings, empty for sweeps.
    pub fn warnings(&self) -> &[AcquisitionWarning] {
        match self {
            Self::TimeDomain(r) => &r.warnings,
            Self::FrequencySweep(_) => &[],
            Self::DcOffset(r) => &r.warnings,
        }
    }
}
