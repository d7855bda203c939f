//! Oscilloscope (analog input) subsystem.
//!
//! A capture is set up in one go with [`AnalogIn::configure`], which
//! programs buffer, ranges, sample rate, trigger and trigger position and
//! reports what the instrument actually accepted. The SDK only knows a
//! trigger position relative to the middle of the buffer; the other
//! [`TriggerReference`]s are translated here.

use std::fmt;
use std::os::raw::c_int;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::acquisition::{
    capture_timestamps, check_rate, AcquisitionPort, AcquisitionState, AcquisitionWarning,
    RecordCounters,
};
use crate::device::{dwf_call, DwfDevice};
use crate::error::{DwfError, Result};
use crate::subsystem::validate_channel;

/// Base clock of the acquisition engine; sample periods are multiples of it.
pub const BASE_CLOCK_HZ: f64 = 100e6;

/// Default timeout of the auto trigger, in seconds.
pub const DEFAULT_AUTO_TIMEOUT_S: f64 = 0.001;

/// Per-channel input filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputFilter {
    Decimate,
    Average,
    MinMax,
}

impl InputFilter {
    fn to_raw(self) -> dwf_sys::FILTER {
        match self {
            Self::Decimate => dwf_sys::filterDecimate,
            Self::Average => dwf_sys::filterAverage,
            Self::MinMax => dwf_sys::filterMinMax,
        }
    }
}

/// Static limits of the scope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputLimits {
    pub channels: i32,
    /// ADC resolution
    pub bits: i32,
    pub min_rate_hz: f64,
    pub max_rate_hz: f64,
    pub min_buffer: usize,
    pub max_buffer: usize,
    /// Smallest selectable range, in volts
    pub range_min: f64,
    /// Largest selectable range, in volts
    pub range_max: f64,
}

/// Where the scope trigger comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSource {
    None,
    Pc,
    DetectorAnalogIn,
    DetectorDigitalIn,
    AnalogIn,
    DigitalIn,
    DigitalOut,
    /// Generator channel, zero-based
    AnalogOut(u8),
    /// External trigger input, zero-based (`0` is T1)
    External(u8),
    High,
    Low,
}

impl TriggerSource {
    pub fn to_raw(self) -> Result<dwf_sys::TRIGSRC> {
        let raw = match self {
            Self::None => dwf_sys::trigsrcNone,
            Self::Pc => dwf_sys::trigsrcPC,
            Self::DetectorAnalogIn => dwf_sys::trigsrcDetectorAnalogIn,
            Self::DetectorDigitalIn => dwf_sys::trigsrcDetectorDigitalIn,
            Self::AnalogIn => dwf_sys::trigsrcAnalogIn,
            Self::DigitalIn => dwf_sys::trigsrcDigitalIn,
            Self::DigitalOut => dwf_sys::trigsrcDigitalOut,
            Self::AnalogOut(ch) if ch < 4 => dwf_sys::trigsrcAnalogOut1 + ch as dwf_sys::TRIGSRC,
            Self::External(port) if port < 4 => {
                dwf_sys::trigsrcExternal1 + port as dwf_sys::TRIGSRC
            }
            Self::High => dwf_sys::trigsrcHigh,
            Self::Low => dwf_sys::trigsrcLow,
            other => {
                return Err(DwfError::InvalidConfig {
                    message: format!("No such trigger source: {:?}", other),
                })
            }
        };
        Ok(raw)
    }
}

/// Edge the trigger fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerSlope {
    #[default]
    Rising,
    Falling,
    Either,
}

impl TriggerSlope {
    fn to_raw(self) -> dwf_sys::DwfTriggerSlope {
        match self {
            Self::Rising => dwf_sys::DwfTriggerSlopeRise,
            Self::Falling => dwf_sys::DwfTriggerSlopeFall,
            Self::Either => dwf_sys::DwfTriggerSlopeEither,
        }
    }
}

impl FromStr for TriggerSlope {
    type Err = DwfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rising" | "rise" => Ok(Self::Rising),
            "falling" | "fall" => Ok(Self::Falling),
            "either" | "both" => Ok(Self::Either),
            _ => Err(DwfError::InvalidConfig {
                message: format!("Unknown trigger slope '{}'", s),
            }),
        }
    }
}

/// Which point of the capture the trigger position is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerReference {
    /// Middle of the buffer
    #[default]
    Center,
    /// 10 % into the buffer
    Left,
    /// 90 % into the buffer
    Right,
    /// First sample
    LeftBorder,
    /// Last sample
    RightBorder,
}

impl TriggerReference {
    /// Device-side (center-referenced) position for a user position
    /// `position_s` relative to this reference.
    pub fn device_position(self, position_s: f64, samples: usize, rate_hz: f64) -> f64 {
        let half = samples as f64 / (2.0 * rate_hz);
        match self {
            Self::Center => position_s,
            Self::Left => position_s + 0.9 * half,
            Self::Right => position_s - 0.9 * half,
            Self::LeftBorder => position_s + half,
            Self::RightBorder => position_s - half,
        }
    }
}

impl FromStr for TriggerReference {
    type Err = DwfError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "center" | "centre" => Ok(Self::Center),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "leftborder" => Ok(Self::LeftBorder),
            "rightborder" => Ok(Self::RightBorder),
            _ => Err(DwfError::InvalidConfig {
                message: format!("Unknown trigger reference '{}'", s),
            }),
        }
    }
}

/// Trigger behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Level crossing on a scope channel
    Edge {
        channel: i32,
        level: f64,
        hysteresis: f64,
    },
    /// Scope channel with an auto-trigger fallback after `timeout_s`
    Auto { channel: i32, timeout_s: f64 },
    /// Any non-analog source
    Source(TriggerSource),
}

/// Complete trigger setup of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub mode: TriggerMode,
    pub slope: TriggerSlope,
    pub reference: TriggerReference,
    /// Position relative to `reference`, in seconds
    pub position_s: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::source(TriggerSource::None)
    }
}

impl TriggerConfig {
    /// Edge trigger on a scope channel.
    pub fn edge(channel: i32, level: f64) -> Self {
        Self {
            mode: TriggerMode::Edge {
                channel,
                level,
                hysteresis: 0.01,
            },
            slope: TriggerSlope::Rising,
            reference: TriggerReference::Center,
            position_s: 0.0,
        }
    }

    /// Auto trigger on a scope channel.
    pub fn auto(channel: i32) -> Self {
        Self {
            mode: TriggerMode::Auto {
                channel,
                timeout_s: DEFAULT_AUTO_TIMEOUT_S,
            },
            ..Self::edge(channel, 0.0)
        }
    }

    /// Trigger on the start of a generator channel.
    pub fn awg(channel: u8) -> Self {
        Self::source(TriggerSource::AnalogOut(channel))
    }

    /// Trigger on an external trigger input.
    pub fn external(port: u8) -> Self {
        Self::source(TriggerSource::External(port))
    }

    fn source(source: TriggerSource) -> Self {
        Self {
            mode: TriggerMode::Source(source),
            slope: TriggerSlope::Rising,
            reference: TriggerReference::Center,
            position_s: 0.0,
        }
    }

    pub fn with_slope(mut self, slope: TriggerSlope) -> Self {
        self.slope = slope;
        self
    }

    pub fn with_reference(mut self, reference: TriggerReference) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_position(mut self, position_s: f64) -> Self {
        self.position_s = position_s;
        self
    }

    /// Whether the trigger listens to a scope channel.
    pub fn is_analog(&self) -> bool {
        !matches!(self.mode, TriggerMode::Source(_))
    }
}

/// Single-capture scope setup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    pub sample_rate_hz: f64,
    pub sample_count: usize,
    /// Range applied to both channels, in volts
    pub voltage_range: f64,
    /// Offset applied to both channels, in volts
    pub voltage_offset: f64,
    pub trigger: TriggerConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 1e6,
            sample_count: 8192,
            voltage_range: 5.0,
            voltage_offset: 0.0,
            trigger: TriggerConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    pub fn new(sample_rate_hz: f64, sample_count: usize) -> Self {
        Self {
            sample_rate_hz,
            sample_count,
            ..Default::default()
        }
    }

    /// Capture covering `duration_s` with the finest sample period that
    /// fits in `max_buffer` samples. Periods are whole base-clock ticks.
    pub fn for_duration(duration_s: f64, max_buffer: usize) -> Result<Self> {
        if !(duration_s > 0.0) || max_buffer < 2 {
            return Err(DwfError::InvalidConfig {
                message: format!("Cannot capture {} s in {} samples", duration_s, max_buffer),
            });
        }
        let ticks = (duration_s * BASE_CLOCK_HZ / (max_buffer - 1) as f64).ceil().max(1.0);
        let rate = BASE_CLOCK_HZ / ticks;
        let samples = ((rate * duration_s) as usize + 1).min(max_buffer);
        Ok(Self::new(rate, samples))
    }

    pub fn with_trigger(mut self, trigger: TriggerConfig) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_range(mut self, volts: f64) -> Self {
        self.voltage_range = volts;
        self
    }

    pub fn with_offset(mut self, volts: f64) -> Self {
        self.voltage_offset = volts;
        self
    }

    /// Check the configuration without touching hardware.
    pub fn validate(&self) -> Result<()> {
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(DwfError::InvalidConfig {
                message: format!("Invalid sample rate {} Hz", self.sample_rate_hz),
            });
        }
        if self.sample_count == 0 {
            return Err(DwfError::InvalidConfig {
                message: "Sample count must be at least 1".to_string(),
            });
        }
        if !(self.voltage_range > 0.0) {
            return Err(DwfError::InvalidConfig {
                message: format!("Invalid voltage range {} V", self.voltage_range),
            });
        }
        if !self.trigger.position_s.is_finite() {
            return Err(DwfError::InvalidConfig {
                message: "Trigger position must be finite".to_string(),
            });
        }
        Ok(())
    }
}

/// What the instrument accepted for a capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigureReport {
    pub achieved_rate_hz: f64,
    pub sample_count: usize,
    /// Trigger position read back from the device (center-referenced)
    pub trigger_position_s: f64,
    pub warnings: Vec<AcquisitionWarning>,
}

impl ConfigureReport {
    /// Time of each sample relative to the trigger.
    pub fn timestamps(&self) -> Vec<f64> {
        capture_timestamps(
            self.sample_count,
            self.achieved_rate_hz,
            self.trigger_position_s,
        )
    }
}

/// Oscilloscope accessor.
#[derive(Clone)]
pub struct AnalogIn {
    device: DwfDevice,
}

impl fmt::Debug for AnalogIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalogIn").field("device", &self.device).finish()
    }
}

impl AnalogIn {
    pub(crate) fn new(device: DwfDevice) -> Self {
        Self { device }
    }

    /// Number of scope channels.
    pub fn channel_count(&self) -> Result<i32> {
        let mut count: c_int = 0;
        dwf_call!(self.device, FDwfAnalogInChannelCount(&mut count))?;
        Ok(count)
    }

    /// Query the scope limits.
    pub fn limits(&self) -> Result<InputLimits> {
        let channels = self.channel_count()?;
        let mut bits: c_int = 0;
        dwf_call!(self.device, FDwfAnalogInBitsInfo(&mut bits))?;
        let (mut min_rate, mut max_rate) = (0.0, 0.0);
        dwf_call!(
            self.device,
            FDwfAnalogInFrequencyInfo(&mut min_rate, &mut max_rate)
        )?;
        let (mut min_buf, mut max_buf): (c_int, c_int) = (0, 0);
        dwf_call!(
            self.device,
            FDwfAnalogInBufferSizeInfo(&mut min_buf, &mut max_buf)
        )?;
        let (mut range_min, mut range_max, mut steps) = (0.0, 0.0, 0.0);
        dwf_call!(
            self.device,
            FDwfAnalogInChannelRangeInfo(&mut range_min, &mut range_max, &mut steps)
        )?;

        Ok(InputLimits {
            channels,
            bits,
            min_rate_hz: min_rate,
            max_rate_hz: max_rate,
            min_buffer: min_buf.max(0) as usize,
            max_buffer: max_buf.max(0) as usize,
            range_min,
            range_max,
        })
    }

    fn validate(&self, channel: i32) -> Result<()> {
        validate_channel(channel, self.channel_count()?, true)
    }

    /// Reset the scope to its defaults.
    pub fn reset(&self) -> Result<()> {
        dwf_call!(self.device, FDwfAnalogInReset())
    }

    /// Set the input filter; `-1` addresses every channel.
    pub fn set_filter(&self, channel: i32, filter: InputFilter) -> Result<()> {
        self.validate(channel)?;
        dwf_call!(
            self.device,
            FDwfAnalogInChannelFilterSet(channel, filter.to_raw())
        )
    }

    /// Set the input range in volts; `-1` addresses every channel.
    pub fn set_range(&self, channel: i32, volts: f64) -> Result<()> {
        self.validate(channel)?;
        dwf_call!(self.device, FDwfAnalogInChannelRangeSet(channel, volts))
    }

    pub fn range(&self, channel: i32) -> Result<f64> {
        validate_channel(channel, self.channel_count()?, false)?;
        let mut volts = 0.0;
        dwf_call!(self.device, FDwfAnalogInChannelRangeGet(channel, &mut volts))?;
        Ok(volts)
    }

    /// Set the input offset in volts; `-1` addresses every channel.
    pub fn set_offset(&self, channel: i32, volts: f64) -> Result<()> {
        self.validate(channel)?;
        dwf_call!(self.device, FDwfAnalogInChannelOffsetSet(channel, volts))
    }

    pub fn offset(&self, channel: i32) -> Result<f64> {
        validate_channel(channel, self.channel_count()?, false)?;
        let mut volts = 0.0;
        dwf_call!(self.device, FDwfAnalogInChannelOffsetGet(channel, &mut volts))?;
        Ok(volts)
    }

    /// Sample rate currently programmed.
    pub fn sample_rate(&self) -> Result<f64> {
        let mut hz = 0.0;
        dwf_call!(self.device, FDwfAnalogInFrequencyGet(&mut hz))?;
        Ok(hz)
    }

    /// Set the sample rate and return the rate the device settled on.
    fn program_rate(&self, requested_hz: f64, warnings: &mut Vec<AcquisitionWarning>) -> Result<f64> {
        dwf_call!(self.device, FDwfAnalogInFrequencySet(requested_hz))?;
        let achieved = self.sample_rate()?;
        if let Some(warning) = check_rate(requested_hz, achieved) {
            warn!(requested_hz, achieved_hz = achieved, "Sample rate inconsistency");
            warnings.push(warning);
        }
        Ok(achieved)
    }

    /// Program the trigger registers.
    pub fn apply_trigger(&self, trigger: &TriggerConfig) -> Result<()> {
        let slope = trigger.slope.to_raw();
        match trigger.mode {
            TriggerMode::Edge {
                channel,
                level,
                hysteresis,
            } => {
                validate_channel(channel, self.channel_count()?, false)?;
                if level < 0.0 {
                    warn!(level, "Negative trigger level is not supported by the instrument");
                }
                if hysteresis < 0.0 {
                    warn!(hysteresis, "Negative trigger hysteresis has no meaning");
                }
                dwf_call!(self.device, FDwfAnalogInTriggerAutoTimeoutSet(0.0))?;
                dwf_call!(
                    self.device,
                    FDwfAnalogInTriggerSourceSet(dwf_sys::trigsrcDetectorAnalogIn)
                )?;
                dwf_call!(self.device, FDwfAnalogInTriggerChannelSet(channel))?;
                dwf_call!(self.device, FDwfAnalogInTriggerTypeSet(dwf_sys::trigtypeEdge))?;
                dwf_call!(self.device, FDwfAnalogInTriggerLevelSet(level))?;
                dwf_call!(self.device, FDwfAnalogInTriggerHysteresisSet(hysteresis))?;
                dwf_call!(
                    self.device,
                    FDwfAnalogInTriggerFilterSet(dwf_sys::filterDecimate)
                )?;
                dwf_call!(self.device, FDwfAnalogInTriggerConditionSet(slope))?;
                self.device.set_analog_trigger(true);
            }
            TriggerMode::Auto { channel, timeout_s } => {
                validate_channel(channel, self.channel_count()?, false)?;
                dwf_call!(self.device, FDwfAnalogInTriggerAutoTimeoutSet(timeout_s))?;
                dwf_call!(
                    self.device,
                    FDwfAnalogInTriggerSourceSet(dwf_sys::trigsrcDetectorAnalogIn)
                )?;
                dwf_call!(self.device, FDwfAnalogInTriggerChannelSet(channel))?;
                dwf_call!(self.device, FDwfAnalogInTriggerTypeSet(dwf_sys::trigtypeEdge))?;
                dwf_call!(
                    self.device,
                    FDwfAnalogInTriggerFilterSet(dwf_sys::filterDecimate)
                )?;
                dwf_call!(self.device, FDwfAnalogInTriggerConditionSet(slope))?;
                self.device.set_analog_trigger(true);
            }
            TriggerMode::Source(source) => {
                let raw = source.to_raw()?;
                dwf_call!(self.device, FDwfAnalogInTriggerAutoTimeoutSet(0.0))?;
                dwf_call!(self.device, FDwfAnalogInTriggerSourceSet(raw))?;
                dwf_call!(self.device, FDwfAnalogInTriggerConditionSet(slope))?;
                self.device.set_analog_trigger(false);
            }
        }
        debug!(mode = ?trigger.mode, slope = ?trigger.slope, "Trigger configured");
        Ok(())
    }

    /// Set up a single capture of both channels. The capture is not armed.
    pub fn configure(&self, cfg: &AcquisitionConfig) -> Result<ConfigureReport> {
        cfg.validate()?;
        let limits = self.limits()?;
        if cfg.sample_count > limits.max_buffer {
            return Err(DwfError::InvalidConfig {
                message: format!(
                    "Max sample count is {}, got {}",
                    limits.max_buffer, cfg.sample_count
                ),
            });
        }

        let mut warnings = Vec::new();
        dwf_call!(
            self.device,
            FDwfAnalogInAcquisitionModeSet(dwf_sys::acqmodeSingle)
        )?;
        dwf_call!(
            self.device,
            FDwfAnalogInBufferSizeSet(cfg.sample_count as c_int)
        )?;
        dwf_call!(self.device, FDwfAnalogInChannelEnableSet(-1, 1))?;
        self.set_range(-1, cfg.voltage_range)?;
        self.set_offset(-1, cfg.voltage_offset)?;
        let achieved = self.program_rate(cfg.sample_rate_hz, &mut warnings)?;

        self.apply_trigger(&cfg.trigger)?;
        let position = cfg.trigger.reference.device_position(
            cfg.trigger.position_s,
            cfg.sample_count,
            achieved,
        );
        dwf_call!(self.device, FDwfAnalogInTriggerPositionSet(position))?;
        let mut actual_position = 0.0;
        dwf_call!(
            self.device,
            FDwfAnalogInTriggerPositionGet(&mut actual_position)
        )?;

        debug!(
            sample_rate_hz = achieved,
            samples = cfg.sample_count,
            trigger_position_s = actual_position,
            "Scope configured"
        );
        Ok(ConfigureReport {
            achieved_rate_hz: achieved,
            sample_count: cfg.sample_count,
            trigger_position_s: actual_position,
            warnings,
        })
    }

    /// Set up and start a record-mode acquisition of one channel.
    pub fn start_record(
        &self,
        channel: i32,
        sample_rate_hz: f64,
        samples: usize,
    ) -> Result<ConfigureReport> {
        validate_channel(channel, self.channel_count()?, false)?;
        if samples == 0 || !(sample_rate_hz > 0.0) {
            return Err(DwfError::InvalidConfig {
                message: format!("Cannot record {} samples at {} Hz", samples, sample_rate_hz),
            });
        }

        let mut warnings = Vec::new();
        let achieved = self.program_rate(sample_rate_hz, &mut warnings)?;
        dwf_call!(
            self.device,
            FDwfAnalogInAcquisitionModeSet(dwf_sys::acqmodeRecord)
        )?;
        dwf_call!(
            self.device,
            FDwfAnalogInRecordLengthSet(samples as f64 / achieved)
        )?;
        dwf_call!(self.device, FDwfAnalogInChannelEnableSet(channel, 1))?;
        dwf_call!(self.device, FDwfAnalogInConfigure(0, 1))?;

        debug!(channel, samples, sample_rate_hz = achieved, "Record started");
        Ok(ConfigureReport {
            achieved_rate_hz: achieved,
            sample_count: samples,
            trigger_position_s: 0.0,
            warnings,
        })
    }

    /// Stop the acquisition engine.
    pub fn stop(&self) -> Result<()> {
        dwf_call!(self.device, FDwfAnalogInConfigure(0, 0))
    }

    /// Whether the programmed trigger listens to a scope channel.
    pub fn uses_analog_trigger(&self) -> bool {
        self.device.analog_trigger()
    }
}

impl AcquisitionPort for AnalogIn {
    fn start(&self) -> Result<()> {
        dwf_call!(self.device, FDwfAnalogInConfigure(1, 1))
    }

    fn poll_state(&self) -> Result<AcquisitionState> {
        let mut raw: dwf_sys::DwfState = 0;
        dwf_call!(self.device, FDwfAnalogInStatus(1, &mut raw))?;
        AcquisitionState::from_raw(raw).ok_or_else(|| DwfError::Communication {
            message: format!("Unknown acquisition state {}", raw),
        })
    }

    fn record_counters(&self) -> Result<RecordCounters> {
        let (mut available, mut lost, mut corrupted): (c_int, c_int, c_int) = (0, 0, 0);
        dwf_call!(
            self.device,
            FDwfAnalogInStatusRecord(&mut available, &mut lost, &mut corrupted)
        )?;
        Ok(RecordCounters {
            available: available.max(0) as usize,
            lost: lost.max(0) as usize,
            corrupted: corrupted.max(0) as usize,
        })
    }

    fn fetch(&self, channel: i32, out: &mut [f64]) -> Result<()> {
        let len = out.len() as c_int;
        dwf_call!(
            self.device,
            FDwfAnalogInStatusData(channel, out.as_mut_ptr(), len)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_position() {
        let (n, fs) = (1000, 1000.0);
        assert_eq!(TriggerReference::Center.device_position(0.1, n, fs), 0.1);
        assert!((TriggerReference::Left.device_position(0.0, n, fs) - 0.45).abs() < 1e-12);
        assert!((TriggerReference::Right.device_position(0.0, n, fs) + 0.45).abs() < 1e-12);
        assert!((TriggerReference::LeftBorder.device_position(0.01, n, fs) - 0.51).abs() < 1e-12);
        assert!((TriggerReference::RightBorder.device_position(0.0, n, fs) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_reference_parsing() {
        assert_eq!(
            "left border".parse::<TriggerReference>().unwrap(),
            TriggerReference::LeftBorder
        );
        assert_eq!(
            "Right_Border".parse::<TriggerReference>().unwrap(),
            TriggerReference::RightBorder
        );
        assert_eq!(
            "CENTER".parse::<TriggerReference>().unwrap(),
            TriggerReference::Center
        );
        assert!("middle".parse::<TriggerReference>().is_err());
    }

    #[test]
    fn test_slope_parsing() {
        assert_eq!("Both".parse::<TriggerSlope>().unwrap(), TriggerSlope::Either);
        assert_eq!("falling".parse::<TriggerSlope>().unwrap(), TriggerSlope::Falling);
        assert!("up".parse::<TriggerSlope>().is_err());
    }

    #[test]
    fn test_trigger_source_raw() {
        assert_eq!(
            TriggerSource::AnalogOut(0).to_raw().unwrap(),
            dwf_sys::trigsrcAnalogOut1
        );
        assert_eq!(
            TriggerSource::External(1).to_raw().unwrap(),
            dwf_sys::trigsrcExternal2
        );
        assert!(TriggerSource::AnalogOut(4).to_raw().is_err());
        assert!(TriggerConfig::auto(0).is_analog());
        assert!(!TriggerConfig::awg(0).is_analog());
    }

    #[test]
    fn test_for_duration_fits_buffer() {
        let cfg = AcquisitionConfig::for_duration(0.01, 8192).unwrap();
        assert!(cfg.sample_count <= 8192);
        // 10 ms over 8191 intervals needs a 123-tick period
        assert!((cfg.sample_rate_hz - BASE_CLOCK_HZ / 123.0).abs() < 1e-6);
        assert_eq!(cfg.sample_count, 8131);

        let fast = AcquisitionConfig::for_duration(1e-6, 8192).unwrap();
        assert_eq!(fast.sample_rate_hz, BASE_CLOCK_HZ);
        assert!((100..=101).contains(&fast.sample_count));

        assert!(AcquisitionConfig::for_duration(0.0, 8192).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(AcquisitionConfig::default().validate().is_ok());
        assert!(AcquisitionConfig::new(0.0, 10).validate().is_err());
        assert!(AcquisitionConfig::new(1e6, 0).validate().is_err());
        assert!(AcquisitionConfig::default().with_range(0.0).validate().is_err());
    }

    #[test]
    fn test_report_timestamps() {
        let report = ConfigureReport {
            achieved_rate_hz: 100.0,
            sample_count: 10,
            trigger_position_s: 0.05,
            warnings: vec![],
        };
        let t = report.timestamps();
        assert_eq!(t.len(), 10);
        assert!(t[0].abs() < 1e-12);
    }
}
