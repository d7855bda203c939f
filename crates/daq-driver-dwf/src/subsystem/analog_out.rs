//! Waveform generator (analog output) subsystem.
//!
//! Configuration always resets the channel first: the generator ignores
//! partial updates while it is running.

use std::fmt;
use std::os::raw::c_int;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{dwf_call, DwfDevice};
use crate::error::{DwfError, Result};
use crate::subsystem::validate_channel;

/// Generator function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionShape {
    Dc,
    Sine,
    Square,
    Triangle,
    RampUp,
    RampDown,
    Noise,
    /// Sample table loaded with [`AnalogOut::load_custom`]
    Custom,
    /// Streamed samples
    Play,
}

impl FunctionShape {
    /// Shapes [`AnalogOut::configure`] accepts.
    pub const STANDARD: [FunctionShape; 7] = [
        Self::Dc,
        Self::Sine,
        Self::Square,
        Self::Triangle,
        Self::RampUp,
        Self::RampDown,
        Self::Noise,
    ];

    /// Whether the shape is fully described by a [`WaveformConfig`].
    pub fn is_standard(self) -> bool {
        Self::STANDARD.contains(&self)
    }

    pub fn to_raw(self) -> dwf_sys::FUNC {
        match self {
            Self::Dc => dwf_sys::funcDC,
            Self::Sine => dwf_sys::funcSine,
            Self::Square => dwf_sys::funcSquare,
            Self::Triangle => dwf_sys::funcTriangle,
            Self::RampUp => dwf_sys::funcRampUp,
            Self::RampDown => dwf_sys::funcRampDown,
            Self::Noise => dwf_sys::funcNoise,
            Self::Custom => dwf_sys::funcCustom,
            Self::Play => dwf_sys::funcPlay,
        }
    }

    pub fn from_raw(raw: dwf_sys::FUNC) -> Option<Self> {
        match raw {
            dwf_sys::funcDC => Some(Self::Dc),
            dwf_sys::funcSine => Some(Self::Sine),
            dwf_sys::funcSquare => Some(Self::Square),
            dwf_sys::funcTriangle => Some(Self::Triangle),
            dwf_sys::funcRampUp => Some(Self::RampUp),
            dwf_sys::funcRampDown => Some(Self::RampDown),
            dwf_sys::funcNoise => Some(Self::Noise),
            dwf_sys::funcCustom => Some(Self::Custom),
            dwf_sys::funcPlay => Some(Self::Play),
            _ => None,
        }
    }
}

impl fmt::Display for FunctionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dc => "DC",
            Self::Sine => "Sine",
            Self::Square => "Square",
            Self::Triangle => "Triangle",
            Self::RampUp => "RampUp",
            Self::RampDown => "RampDown",
            Self::Noise => "Noise",
            Self::Custom => "Custom",
            Self::Play => "Play",
        };
        f.write_str(name)
    }
}

impl FromStr for FunctionShape {
    type Err = DwfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dc" => Ok(Self::Dc),
            "sine" => Ok(Self::Sine),
            "square" => Ok(Self::Square),
            "triangle" => Ok(Self::Triangle),
            "rampup" => Ok(Self::RampUp),
            "rampdown" => Ok(Self::RampDown),
            "noise" => Ok(Self::Noise),
            "custom" => Ok(Self::Custom),
            "play" => Ok(Self::Play),
            _ => Err(DwfError::UnsupportedWaveform {
                shape: s.to_string(),
            }),
        }
    }
}

/// Full parameter set of one generator channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformConfig {
    pub channel: i32,
    pub shape: FunctionShape,
    pub frequency_hz: f64,
    /// Peak amplitude in volts
    pub amplitude: f64,
    /// DC offset in volts
    pub offset: f64,
    /// Symmetry in percent
    pub symmetry_pct: f64,
    /// Phase in degrees
    pub phase_deg: f64,
    /// Start the channel once configured
    pub enabled: bool,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            shape: FunctionShape::Sine,
            frequency_hz: 1000.0,
            amplitude: 1.0,
            offset: 0.0,
            symmetry_pct: 50.0,
            phase_deg: 0.0,
            enabled: true,
        }
    }
}

impl WaveformConfig {
    /// Sine wave with default offset, symmetry and phase.
    pub fn sine(channel: i32, frequency_hz: f64, amplitude: f64) -> Self {
        Self {
            channel,
            frequency_hz,
            amplitude,
            ..Default::default()
        }
    }

    /// Constant output at `offset` volts.
    pub fn dc(channel: i32, offset: f64) -> Self {
        Self {
            channel,
            shape: FunctionShape::Dc,
            amplitude: 0.0,
            offset,
            ..Default::default()
        }
    }

    pub fn with_shape(mut self, shape: FunctionShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_symmetry(mut self, symmetry_pct: f64) -> Self {
        self.symmetry_pct = symmetry_pct;
        self
    }

    pub fn with_phase(mut self, phase_deg: f64) -> Self {
        self.phase_deg = phase_deg;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Check the configuration without touching hardware.
    pub fn validate(&self) -> Result<()> {
        if !self.shape.is_standard() {
            return Err(DwfError::UnsupportedWaveform {
                shape: self.shape.to_string(),
            });
        }
        if !self.frequency_hz.is_finite() || self.frequency_hz < 0.0 {
            return Err(DwfError::InvalidConfig {
                message: format!("Invalid generator frequency {} Hz", self.frequency_hz),
            });
        }
        if !self.amplitude.is_finite() || !self.offset.is_finite() || !self.phase_deg.is_finite()
        {
            return Err(DwfError::InvalidConfig {
                message: "Generator amplitude, offset and phase must be finite".to_string(),
            });
        }
        if !(0.0..=100.0).contains(&self.symmetry_pct) {
            return Err(DwfError::InvalidConfig {
                message: format!("Symmetry must be 0-100 %, got {}", self.symmetry_pct),
            });
        }
        Ok(())
    }
}

/// A user-supplied sample table played by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomWaveform {
    pub channel: i32,
    /// Rate at which the table is played
    pub sample_rate_hz: f64,
    /// One period of the signal, in volts
    pub data: Vec<f64>,
    /// Start the channel once loaded
    pub enabled: bool,
}

impl CustomWaveform {
    pub fn new(channel: i32, sample_rate_hz: f64, data: Vec<f64>) -> Self {
        Self {
            channel,
            sample_rate_hz,
            data,
            enabled: true,
        }
    }

    /// Table normalised to +/-1, and the `(frequency, amplitude)` that
    /// reproduce the original values.
    pub fn normalized(&self) -> Result<(Vec<f64>, f64, f64)> {
        let peak = self.data.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if self.data.is_empty() || peak == 0.0 || !peak.is_finite() {
            return Err(DwfError::InvalidConfig {
                message: "Custom waveform needs a non-empty, non-zero table".to_string(),
            });
        }
        if !(self.sample_rate_hz > 0.0) {
            return Err(DwfError::InvalidConfig {
                message: format!("Invalid custom sample rate {} Hz", self.sample_rate_hz),
            });
        }
        let table = self.data.iter().map(|v| v / peak).collect();
        let frequency = self.sample_rate_hz / self.data.len() as f64;
        Ok((table, frequency, peak))
    }
}

/// Range reported by a generator `*Info` query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

/// Waveform generator accessor.
#[derive(Clone)]
pub struct AnalogOut {
    device: DwfDevice,
}

const CARRIER: dwf_sys::AnalogOutNode = dwf_sys::AnalogOutNodeCarrier;

macro_rules! node_info {
    ($(#[$meta:meta])* $name:ident, $func:ident) => {
        $(#[$meta])*
        pub fn $name(&self, channel: i32) -> Result<ParamRange> {
            self.validate(channel)?;
            let (mut min, mut max) = (0.0, 0.0);
            dwf_call!(self.device, $func(channel, CARRIER, &mut min, &mut max))?;
            Ok(ParamRange { min, max })
        }
    };
}

macro_rules! node_get {
    ($(#[$meta:meta])* $name:ident, $func:ident) => {
        $(#[$meta])*
        pub fn $name(&self, channel: i32) -> Result<f64> {
            self.validate(channel)?;
            let mut value = 0.0;
            dwf_call!(self.device, $func(channel, CARRIER, &mut value))?;
            Ok(value)
        }
    };
}

impl AnalogOut {
    pub(crate) fn new(device: DwfDevice) -> Self {
        Self { device }
    }

    /// Number of generator channels.
    pub fn channel_count(&self) -> Result<i32> {
        let mut count: c_int = 0;
        dwf_call!(self.device, FDwfAnalogOutCount(&mut count))?;
        Ok(count)
    }

    fn validate(&self, channel: i32) -> Result<()> {
        validate_channel(channel, self.channel_count()?, false)
    }

    /// Reset a channel to its defaults.
    pub fn reset(&self, channel: i32) -> Result<()> {
        self.validate(channel)?;
        dwf_call!(self.device, FDwfAnalogOutReset(channel))
    }

    /// Start or stop a channel.
    pub fn set_enabled(&self, channel: i32, enabled: bool) -> Result<()> {
        self.validate(channel)?;
        dwf_call!(self.device, FDwfAnalogOutConfigure(channel, enabled as c_int))?;
        debug!(channel, enabled, "Generator channel switched");
        Ok(())
    }

    /// Configure a channel from scratch.
    ///
    /// Order: reset, enable the carrier node, stop, function, frequency,
    /// amplitude, offset, symmetry, phase, then start when `enabled`.
    pub fn configure(&self, cfg: &WaveformConfig) -> Result<()> {
        cfg.validate()?;
        self.validate(cfg.channel)?;
        let ch = cfg.channel;

        dwf_call!(self.device, FDwfAnalogOutReset(ch))?;
        dwf_call!(self.device, FDwfAnalogOutNodeEnableSet(ch, CARRIER, 1))?;
        dwf_call!(self.device, FDwfAnalogOutConfigure(ch, 0))?;
        dwf_call!(
            self.device,
            FDwfAnalogOutNodeFunctionSet(ch, CARRIER, cfg.shape.to_raw())
        )?;
        dwf_call!(
            self.device,
            FDwfAnalogOutNodeFrequencySet(ch, CARRIER, cfg.frequency_hz)
        )?;
        dwf_call!(
            self.device,
            FDwfAnalogOutNodeAmplitudeSet(ch, CARRIER, cfg.amplitude)
        )?;
        dwf_call!(self.device, FDwfAnalogOutNodeOffsetSet(ch, CARRIER, cfg.offset))?;
        dwf_call!(
            self.device,
            FDwfAnalogOutNodeSymmetrySet(ch, CARRIER, cfg.symmetry_pct)
        )?;
        dwf_call!(self.device, FDwfAnalogOutNodePhaseSet(ch, CARRIER, cfg.phase_deg))?;
        if cfg.enabled {
            dwf_call!(self.device, FDwfAnalogOutConfigure(ch, 1))?;
        }

        debug!(
            channel = ch,
            shape = %cfg.shape,
            frequency_hz = cfg.frequency_hz,
            amplitude = cfg.amplitude,
            offset = cfg.offset,
            enabled = cfg.enabled,
            "Generator configured"
        );
        Ok(())
    }

    /// Load and optionally start a custom sample table.
    pub fn load_custom(&self, wave: &CustomWaveform) -> Result<()> {
        let (mut table, frequency, amplitude) = wave.normalized()?;
        self.validate(wave.channel)?;
        let ch = wave.channel;

        let (mut min_len, mut max_len): (c_int, c_int) = (0, 0);
        dwf_call!(
            self.device,
            FDwfAnalogOutNodeDataInfo(ch, CARRIER, &mut min_len, &mut max_len)
        )?;
        if table.len() > max_len.max(0) as usize {
            return Err(DwfError::InvalidConfig {
                message: format!(
                    "Custom waveform has {} samples, generator holds at most {}",
                    table.len(),
                    max_len
                ),
            });
        }

        dwf_call!(self.device, FDwfAnalogOutReset(ch))?;
        dwf_call!(self.device, FDwfAnalogOutNodeEnableSet(ch, CARRIER, 1))?;
        dwf_call!(self.device, FDwfAnalogOutConfigure(ch, 0))?;
        dwf_call!(
            self.device,
            FDwfAnalogOutNodeFunctionSet(ch, CARRIER, dwf_sys::funcCustom)
        )?;
        let len = table.len() as c_int;
        dwf_call!(
            self.device,
            FDwfAnalogOutNodeDataSet(ch, CARRIER, table.as_mut_ptr(), len)
        )?;
        dwf_call!(self.device, FDwfAnalogOutNodeFrequencySet(ch, CARRIER, frequency))?;
        dwf_call!(self.device, FDwfAnalogOutNodeAmplitudeSet(ch, CARRIER, amplitude))?;
        if wave.enabled {
            dwf_call!(self.device, FDwfAnalogOutConfigure(ch, 1))?;
        }

        debug!(
            channel = ch,
            samples = table.len(),
            frequency_hz = frequency,
            amplitude,
            "Custom waveform loaded"
        );
        Ok(())
    }

    /// Currently selected function.
    pub fn function(&self, channel: i32) -> Result<FunctionShape> {
        self.validate(channel)?;
        let mut raw: dwf_sys::FUNC = 0;
        dwf_call!(self.device, FDwfAnalogOutNodeFunctionGet(channel, CARRIER, &mut raw))?;
        FunctionShape::from_raw(raw).ok_or_else(|| DwfError::NotSupported {
            message: format!("Unknown generator function {}", raw),
        })
    }

    node_get!(frequency, FDwfAnalogOutNodeFrequencyGet);
    node_get!(amplitude, FDwfAnalogOutNodeAmplitudeGet);
    node_get!(offset, FDwfAnalogOutNodeOffsetGet);
    node_get!(symmetry, FDwfAnalogOutNodeSymmetryGet);
    node_get!(phase, FDwfAnalogOutNodePhaseGet);

    node_info!(
        /// Frequency range of the carrier node.
        frequency_info,
        FDwfAnalogOutNodeFrequencyInfo
    );
    node_info!(amplitude_info, FDwfAnalogOutNodeAmplitudeInfo);
    node_info!(offset_info, FDwfAnalogOutNodeOffsetInfo);
    node_info!(symmetry_info, FDwfAnalogOutNodeSymmetryInfo);
    node_info!(phase_info, FDwfAnalogOutNodePhaseInfo);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_parsing() {
        assert_eq!("Sine".parse::<FunctionShape>().unwrap(), FunctionShape::Sine);
        assert_eq!("dc".parse::<FunctionShape>().unwrap(), FunctionShape::Dc);
        assert_eq!(
            "RAMPDOWN".parse::<FunctionShape>().unwrap(),
            FunctionShape::RampDown
        );
        let err = "Sawtooth".parse::<FunctionShape>().unwrap_err();
        assert!(matches!(err, DwfError::UnsupportedWaveform { .. }));
    }

    #[test]
    fn test_raw_round_trip() {
        for shape in FunctionShape::STANDARD {
            assert_eq!(FunctionShape::from_raw(shape.to_raw()), Some(shape));
        }
    }

    #[test]
    fn test_validate_rejects_non_standard_shapes() {
        let cfg = WaveformConfig::sine(0, 1000.0, 1.0).with_shape(FunctionShape::Play);
        assert!(matches!(
            cfg.validate(),
            Err(DwfError::UnsupportedWaveform { .. })
        ));
        let cfg = WaveformConfig::sine(0, 1000.0, 1.0).with_shape(FunctionShape::Custom);
        assert!(cfg.validate().is_err());
        assert!(WaveformConfig::dc(0, 0.0).validate().is_ok());
    }

    #[test]
    fn test_validate_symmetry_and_frequency() {
        assert!(WaveformConfig::sine(0, 1000.0, 1.0)
            .with_symmetry(120.0)
            .validate()
            .is_err());
        assert!(WaveformConfig::sine(0, -1.0, 1.0).validate().is_err());
        assert!(WaveformConfig::sine(0, f64::NAN, 1.0).validate().is_err());
    }

    #[test]
    fn test_custom_normalization() {
        let wave = CustomWaveform::new(0, 1000.0, vec![0.0, 0.5, -2.0, 1.0]);
        let (table, frequency, amplitude) = wave.normalized().unwrap();
        assert_eq!(table, vec![0.0, 0.25, -1.0, 0.5]);
        assert_eq!(frequency, 250.0);
        assert_eq!(amplitude, 2.0);

        assert!(CustomWaveform::new(0, 1000.0, vec![]).normalized().is_err());
        assert!(CustomWaveform::new(0, 1000.0, vec![0.0; 4])
            .normalized()
            .is_err());
    }
}
