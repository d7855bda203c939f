//! Hardware Abstraction Layer (HAL) capability traits.
//!
//! Measurement code is written against these traits instead of
//! [`DwfDevice`](crate::DwfDevice), so the same sequences run on the real
//! instrument and on [`MockInstrument`](crate::mock::MockInstrument).
//!
//! # Implemented Traits
//!
//! - [`WaveformGenerator`] for the generator channels
//! - [`Oscilloscope`] for the two scope channels (on top of
//!   [`AcquisitionPort`])
//! - [`NetworkAnalyzer`] for the gain/phase analyzer
//! - [`DigitalOutputs`] for static digital I/O
//! - [`SpiBus`] for 32-bit SPI transfers
//!
//! [`Instrument`] bundles all of them.
//!
//! # Example
//!
//! ```rust,ignore
//! use daq_driver_dwf::hal::Oscilloscope;
//!
//! fn capture<S: Oscilloscope>(scope: &S) -> daq_driver_dwf::Result<Vec<f64>> {
//!     let report = scope.configure_input_channel(&AcquisitionConfig::new(1e6, 1000))?;
//!     scope.arm_and_wait(None)?;
//!     let (ch1, _) = scope.read_samples(report.sample_count)?;
//!     Ok(ch1)
//! }
//! ```

mod dwf;

use std::time::Duration;

use tracing::warn;

use crate::acquisition::{
    average_captures, drain_record, wait_for_done, AcquisitionPort, AcquisitionState,
    AcquisitionWarning, PollStats, RecordOutcome,
};
use crate::error::{DwfError, Result};
use crate::subsystem::analog_in::{AcquisitionConfig, ConfigureReport, InputLimits};
use crate::subsystem::analog_out::{CustomWaveform, WaveformConfig};
use crate::subsystem::impedance::{AnalyzerConfig, AnalyzerStatus, RawReading};
use crate::subsystem::spi::SpiConfig;

/// Arbitrary waveform generator.
pub trait WaveformGenerator {
    fn output_channel_count(&self) -> Result<i32>;

    /// Reset and fully configure one channel.
    fn configure_output_channel(&self, cfg: &WaveformConfig) -> Result<()>;

    fn load_custom(&self, wave: &CustomWaveform) -> Result<()>;

    fn set_output_enabled(&self, channel: i32, enabled: bool) -> Result<()>;
}

/// Two-channel oscilloscope.
pub trait Oscilloscope: AcquisitionPort {
    fn input_limits(&self) -> Result<InputLimits>;

    /// Program a single capture. The capture is not armed.
    fn configure_input_channel(&self, cfg: &AcquisitionConfig) -> Result<ConfigureReport>;

    /// Program and start a record-mode acquisition of one channel.
    fn start_record(&self, channel: i32, sample_rate_hz: f64, samples: usize)
        -> Result<ConfigureReport>;

    fn stop(&self) -> Result<()>;

    /// Whether the programmed trigger listens to a scope channel.
    fn uses_analog_trigger(&self) -> bool {
        false
    }

    fn arm(&self) -> Result<()> {
        self.start()
    }

    fn wait_done(&self, timeout: Option<Duration>) -> Result<PollStats> {
        wait_for_done(self, timeout)
    }

    fn arm_and_wait(&self, timeout: Option<Duration>) -> Result<PollStats> {
        self.arm()?;
        self.wait_done(timeout)
    }

    /// Both channels of a completed capture.
    ///
    /// Fails with [`DwfError::NotReady`] unless the scope reports `Done`.
    fn read_samples(&self, samples: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        let state = self.poll_state()?;
        if state != AcquisitionState::Done {
            return Err(DwfError::NotReady { state });
        }
        let mut ch1 = vec![0.0; samples];
        let mut ch2 = vec![0.0; samples];
        self.fetch(0, &mut ch1)?;
        self.fetch(1, &mut ch2)?;
        Ok((ch1, ch2))
    }

    /// Record `samples` of `channel` at `sample_rate_hz` and drain them.
    fn stream_record(
        &self,
        channel: i32,
        sample_rate_hz: f64,
        samples: usize,
    ) -> Result<RecordOutcome> {
        let report = self.start_record(channel, sample_rate_hz, samples)?;
        let mut outcome = drain_record(self, channel, samples)?;
        let mut warnings = report.warnings;
        warnings.append(&mut outcome.warnings);
        outcome.warnings = warnings;
        Ok(outcome)
    }

    /// Average `count` captures of the configured acquisition.
    ///
    /// `pause` is slept between captures.
    fn acquire_averaged(
        &self,
        count: usize,
        samples: usize,
        pause: Duration,
        timeout: Option<Duration>,
    ) -> Result<(Vec<f64>, Vec<f64>, Vec<AcquisitionWarning>)> {
        let mut warnings = Vec::new();
        if count > 1 && self.uses_analog_trigger() {
            warn!("Analog trigger is not recommended for averaged acquisition");
            warnings.push(AcquisitionWarning::AnalogTriggerAveraging);
        }
        let (ch1, ch2) = average_captures(self, count, samples, pause, timeout)?;
        Ok((ch1, ch2, warnings))
    }
}

/// Gain/phase network analyzer.
pub trait NetworkAnalyzer {
    /// Configure and start the analyzer.
    fn configure_analyzer(&self, cfg: &AnalyzerConfig) -> Result<()>;

    fn set_analyzer_frequency(&self, hz: f64) -> Result<()>;

    /// Drop the reading in progress so the next one starts fresh.
    fn discard_last_capture(&self) -> Result<()>;

    fn analyzer_status(&self) -> Result<AnalyzerStatus>;

    fn raw_input(&self, channel: i32) -> Result<RawReading>;

    fn stop_analyzer(&self) -> Result<()>;

    /// Last error reported by the instrument, if it keeps one.
    fn last_error_message(&self) -> Option<String> {
        None
    }
}

/// Static digital outputs.
pub trait DigitalOutputs {
    fn set_output_enable(&self, mask: u32) -> Result<()>;

    fn write_outputs(&self, levels: u32) -> Result<()>;

    fn read_outputs(&self) -> Result<u32>;
}

/// 32-bit SPI transfers framed by a chip select.
pub trait SpiBus {
    /// Reset the bus and apply pin assignment and timing.
    fn init_spi(&self, cfg: &SpiConfig) -> Result<()>;

    fn write_u32(&self, cs: i32, word: u32) -> Result<()>;

    fn read_u32(&self, cs: i32) -> Result<u32>;
}

/// Everything a measurement sequence needs from the instrument.
pub trait Instrument:
    WaveformGenerator + Oscilloscope + NetworkAnalyzer + DigitalOutputs + SpiBus
{
    /// Stop outputs and acquisitions before the instrument is released.
    fn shutdown(&self) -> Result<()> {
        for channel in 0..self.output_channel_count()? {
            self.set_output_enabled(channel, false)?;
        }
        Oscilloscope::stop(self)
    }
}
