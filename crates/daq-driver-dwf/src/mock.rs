//! Scripted in-memory instrument.
//!
//! [`MockInstrument`] implements every [`hal`](crate::hal) trait without
//! touching the SDK. States, record counters, captures, analyzer readings
//! and SPI responses are queued by the test; everything the code under
//! test writes is recorded for inspection. Clones share the same state.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::acquisition::{check_rate, AcquisitionPort, AcquisitionState, RecordCounters};
use crate::error::{DwfError, Result};
use crate::hal::{
    DigitalOutputs, Instrument, NetworkAnalyzer, Oscilloscope, SpiBus, WaveformGenerator,
};
use crate::subsystem::analog_in::{AcquisitionConfig, ConfigureReport, InputLimits};
use crate::subsystem::analog_out::{CustomWaveform, WaveformConfig};
use crate::subsystem::impedance::{AnalyzerConfig, AnalyzerStatus, RawReading};
use crate::subsystem::spi::SpiConfig;

const CHANNELS: i32 = 2;

/// Limits of an Analog Discovery 2 with the default buffer configuration.
pub const AD2_LIMITS: InputLimits = InputLimits {
    channels: 2,
    bits: 14,
    min_rate_hz: 1.0,
    max_rate_hz: 100e6,
    min_buffer: 16,
    max_buffer: 8192,
    range_min: 0.5,
    range_max: 50.0,
};

/// A record-mode acquisition requested from the mock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordRequest {
    pub channel: i32,
    pub sample_rate_hz: f64,
    pub samples: usize,
}

#[derive(Debug)]
struct MockState {
    states: VecDeque<AcquisitionState>,
    idle_state: AcquisitionState,
    record_script: VecDeque<(AcquisitionState, RecordCounters)>,
    last_counters: RecordCounters,
    sequential: bool,
    channel_data: [Vec<f64>; 2],
    cursors: [usize; 2],
    captures: VecDeque<(Vec<f64>, Vec<f64>)>,
    current_capture: Option<(Vec<f64>, Vec<f64>)>,
    starts: usize,
    fetch_sizes: Vec<usize>,
    calls: Vec<String>,

    limits: InputLimits,
    achieved_rate: Option<f64>,
    analog_trigger: bool,
    waveforms: Vec<WaveformConfig>,
    custom_waveforms: Vec<CustomWaveform>,
    output_enabled: [bool; 2],
    acquisitions: Vec<AcquisitionConfig>,
    records: Vec<RecordRequest>,

    analyzer: Option<AnalyzerConfig>,
    analyzer_running: bool,
    analyzer_frequencies: Vec<f64>,
    analyzer_readings: VecDeque<(RawReading, RawReading)>,
    analyzer_default: (RawReading, RawReading),
    analyzer_statuses: VecDeque<AnalyzerStatus>,
    current_reading: (RawReading, RawReading),
    discards: usize,

    spi: Option<SpiConfig>,
    spi_writes: Vec<(i32, u32)>,
    spi_responses: VecDeque<u32>,
    spi_fail: bool,

    dio_enable: u32,
    dio_outputs: Vec<u32>,
}

impl Default for MockState {
    fn default() -> Self {
        let unity = RawReading {
            gain: 1.0,
            phase_rad: 0.0,
        };
        Self {
            states: VecDeque::new(),
            idle_state: AcquisitionState::Done,
            record_script: VecDeque::new(),
            last_counters: RecordCounters::default(),
            sequential: false,
            channel_data: [Vec::new(), Vec::new()],
            cursors: [0, 0],
            captures: VecDeque::new(),
            current_capture: None,
            starts: 0,
            fetch_sizes: Vec::new(),
            calls: Vec::new(),
            limits: AD2_LIMITS,
            achieved_rate: None,
            analog_trigger: false,
            waveforms: Vec::new(),
            custom_waveforms: Vec::new(),
            output_enabled: [false, false],
            acquisitions: Vec::new(),
            records: Vec::new(),
            analyzer: None,
            analyzer_running: false,
            analyzer_frequencies: Vec::new(),
            analyzer_readings: VecDeque::new(),
            analyzer_default: (unity, unity),
            analyzer_statuses: VecDeque::new(),
            current_reading: (unity, unity),
            discards: 0,
            spi: None,
            spi_writes: Vec::new(),
            spi_responses: VecDeque::new(),
            spi_fail: false,
            dio_enable: 0,
            dio_outputs: Vec::new(),
        }
    }
}

/// In-memory instrument for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MockInstrument {
    state: Arc<Mutex<MockState>>,
}

fn check_channel(channel: i32) -> Result<usize> {
    if (0..CHANNELS).contains(&channel) {
        Ok(channel as usize)
    } else {
        Err(DwfError::InvalidChannel {
            channel,
            max: CHANNELS,
        })
    }
}

impl MockInstrument {
    pub fn new() -> Self {
        Self::default()
    }

    // --- scripting ---

    /// States returned by the next polls, before falling back to the idle state.
    pub fn script_states(&self, states: impl IntoIterator<Item = AcquisitionState>) {
        self.state.lock().states.extend(states);
    }

    /// State reported once the script is exhausted (`Done` by default).
    pub fn set_idle_state(&self, state: AcquisitionState) {
        self.state.lock().idle_state = state;
    }

    /// Record-mode polls. Fetches then read channel data sequentially.
    pub fn script_record(
        &self,
        polls: impl IntoIterator<Item = (AcquisitionState, RecordCounters)>,
    ) {
        let mut st = self.state.lock();
        st.record_script.extend(polls);
        st.sequential = true;
    }

    /// Samples returned for `channel` when no capture is queued.
    pub fn set_channel_data(&self, channel: usize, data: Vec<f64>) {
        let mut st = self.state.lock();
        st.channel_data[channel] = data;
        st.cursors[channel] = 0;
    }

    /// Both channels of one capture, consumed by the next start.
    pub fn queue_capture(&self, ch1: Vec<f64>, ch2: Vec<f64>) {
        self.state.lock().captures.push_back((ch1, ch2));
    }

    /// Rate the scope reports instead of the requested one.
    pub fn set_achieved_rate(&self, hz: f64) {
        self.state.lock().achieved_rate = Some(hz);
    }

    pub fn set_limits(&self, limits: InputLimits) {
        self.state.lock().limits = limits;
    }

    /// Analyzer readings (channel 1, channel 2) for the next points.
    pub fn queue_analyzer_reading(&self, ch1: RawReading, ch2: RawReading) {
        self.state.lock().analyzer_readings.push_back((ch1, ch2));
    }

    /// Reading used once the queue is exhausted.
    pub fn set_analyzer_default(&self, ch1: RawReading, ch2: RawReading) {
        self.state.lock().analyzer_default = (ch1, ch2);
    }

    /// Statuses returned before falling back to `Done` (or `Idle` when stopped).
    pub fn script_analyzer_status(&self, statuses: impl IntoIterator<Item = AnalyzerStatus>) {
        self.state.lock().analyzer_statuses.extend(statuses);
    }

    /// Words returned by the next SPI reads.
    pub fn queue_spi_read(&self, words: impl IntoIterator<Item = u32>) {
        self.state.lock().spi_responses.extend(words);
    }

    /// Make every SPI transfer fail.
    pub fn fail_spi(&self, fail: bool) {
        self.state.lock().spi_fail = fail;
    }

    // --- inspection ---

    pub fn starts(&self) -> usize {
        self.state.lock().starts
    }

    /// Length of every fetch, in order.
    pub fn fetch_sizes(&self) -> Vec<usize> {
        self.state.lock().fetch_sizes.clone()
    }

    /// Names of the trait methods called, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn waveforms(&self) -> Vec<WaveformConfig> {
        self.state.lock().waveforms.clone()
    }

    pub fn custom_waveforms(&self) -> Vec<CustomWaveform> {
        self.state.lock().custom_waveforms.clone()
    }

    pub fn output_enabled(&self, channel: usize) -> bool {
        self.state.lock().output_enabled[channel]
    }

    pub fn acquisitions(&self) -> Vec<AcquisitionConfig> {
        self.state.lock().acquisitions.clone()
    }

    pub fn records(&self) -> Vec<RecordRequest> {
        self.state.lock().records.clone()
    }

    pub fn analyzer_config(&self) -> Option<AnalyzerConfig> {
        self.state.lock().analyzer
    }

    pub fn analyzer_running(&self) -> bool {
        self.state.lock().analyzer_running
    }

    pub fn analyzer_frequencies(&self) -> Vec<f64> {
        self.state.lock().analyzer_frequencies.clone()
    }

    pub fn discards(&self) -> usize {
        self.state.lock().discards
    }

    pub fn spi_config(&self) -> Option<SpiConfig> {
        self.state.lock().spi
    }

    /// Words written over SPI, without the chip select.
    pub fn spi_writes(&self) -> Vec<u32> {
        self.state.lock().spi_writes.iter().map(|(_, w)| *w).collect()
    }

    pub fn dio_enable(&self) -> u32 {
        self.state.lock().dio_enable
    }

    /// Every level pattern written to the digital outputs.
    pub fn dio_outputs(&self) -> Vec<u32> {
        self.state.lock().dio_outputs.clone()
    }

    fn log(&self, call: &str) {
        trace!(call, "Mock instrument call");
        self.state.lock().calls.push(call.to_string());
    }
}

impl AcquisitionPort for MockInstrument {
    fn start(&self) -> Result<()> {
        self.log("start");
        let mut st = self.state.lock();
        st.starts += 1;
        if let Some(capture) = st.captures.pop_front() {
            st.current_capture = Some(capture);
        }
        Ok(())
    }

    fn poll_state(&self) -> Result<AcquisitionState> {
        let mut st = self.state.lock();
        if let Some((state, counters)) = st.record_script.pop_front() {
            st.last_counters = counters;
            return Ok(state);
        }
        st.last_counters = RecordCounters::default();
        Ok(st.states.pop_front().unwrap_or(st.idle_state))
    }

    fn record_counters(&self) -> Result<RecordCounters> {
        Ok(self.state.lock().last_counters)
    }

    fn fetch(&self, channel: i32, out: &mut [f64]) -> Result<()> {
        let ch = check_channel(channel)?;
        let mut st = self.state.lock();
        st.fetch_sizes.push(out.len());

        let (source, start) = match &st.current_capture {
            Some((ch1, ch2)) => (if ch == 0 { ch1 } else { ch2 }, 0),
            None => {
                let start = if st.sequential { st.cursors[ch] } else { 0 };
                (&st.channel_data[ch], start)
            }
        };
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = source.get(start + i).copied().unwrap_or(0.0);
        }
        if st.current_capture.is_none() && st.sequential {
            st.cursors[ch] += out.len();
        }
        Ok(())
    }
}

impl WaveformGenerator for MockInstrument {
    fn output_channel_count(&self) -> Result<i32> {
        Ok(CHANNELS)
    }

    fn configure_output_channel(&self, cfg: &WaveformConfig) -> Result<()> {
        cfg.validate()?;
        let ch = check_channel(cfg.channel)?;
        self.log("configure_output_channel");
        let mut st = self.state.lock();
        st.output_enabled[ch] = cfg.enabled;
        st.waveforms.push(cfg.clone());
        Ok(())
    }

    fn load_custom(&self, wave: &CustomWaveform) -> Result<()> {
        wave.normalized()?;
        let ch = check_channel(wave.channel)?;
        self.log("load_custom");
        let mut st = self.state.lock();
        st.output_enabled[ch] = wave.enabled;
        st.custom_waveforms.push(wave.clone());
        Ok(())
    }

    fn set_output_enabled(&self, channel: i32, enabled: bool) -> Result<()> {
        let ch = check_channel(channel)?;
        self.log("set_output_enabled");
        self.state.lock().output_enabled[ch] = enabled;
        Ok(())
    }
}

impl Oscilloscope for MockInstrument {
    fn input_limits(&self) -> Result<InputLimits> {
        Ok(self.state.lock().limits)
    }

    fn configure_input_channel(&self, cfg: &AcquisitionConfig) -> Result<ConfigureReport> {
        cfg.validate()?;
        self.log("configure_input_channel");
        let mut st = self.state.lock();
        if cfg.sample_count > st.limits.max_buffer {
            return Err(DwfError::InvalidConfig {
                message: format!(
                    "Max sample count is {}, got {}",
                    st.limits.max_buffer, cfg.sample_count
                ),
            });
        }
        let achieved = st.achieved_rate.unwrap_or(cfg.sample_rate_hz);
        let warnings = check_rate(cfg.sample_rate_hz, achieved).into_iter().collect();
        st.analog_trigger = cfg.trigger.is_analog();
        st.sequential = false;
        st.acquisitions.push(*cfg);
        Ok(ConfigureReport {
            achieved_rate_hz: achieved,
            sample_count: cfg.sample_count,
            trigger_position_s: cfg.trigger.reference.device_position(
                cfg.trigger.position_s,
                cfg.sample_count,
                achieved,
            ),
            warnings,
        })
    }

    fn start_record(
        &self,
        channel: i32,
        sample_rate_hz: f64,
        samples: usize,
    ) -> Result<ConfigureReport> {
        check_channel(channel)?;
        self.log("start_record");
        let mut st = self.state.lock();
        let achieved = st.achieved_rate.unwrap_or(sample_rate_hz);
        st.sequential = true;
        st.current_capture = None;
        st.records.push(RecordRequest {
            channel,
            sample_rate_hz,
            samples,
        });
        Ok(ConfigureReport {
            achieved_rate_hz: achieved,
            sample_count: samples,
            trigger_position_s: 0.0,
            warnings: check_rate(sample_rate_hz, achieved).into_iter().collect(),
        })
    }

    fn stop(&self) -> Result<()> {
        self.log("stop");
        Ok(())
    }

    fn uses_analog_trigger(&self) -> bool {
        self.state.lock().analog_trigger
    }
}

impl NetworkAnalyzer for MockInstrument {
    fn configure_analyzer(&self, cfg: &AnalyzerConfig) -> Result<()> {
        cfg.validate()?;
        self.log("configure_analyzer");
        let mut st = self.state.lock();
        st.analyzer = Some(*cfg);
        st.analyzer_running = true;
        Ok(())
    }

    fn set_analyzer_frequency(&self, hz: f64) -> Result<()> {
        self.state.lock().analyzer_frequencies.push(hz);
        Ok(())
    }

    fn discard_last_capture(&self) -> Result<()> {
        let mut st = self.state.lock();
        st.discards += 1;
        st.current_reading = match st.analyzer_readings.pop_front() {
            Some(reading) => reading,
            None => st.analyzer_default,
        };
        Ok(())
    }

    fn analyzer_status(&self) -> Result<AnalyzerStatus> {
        let mut st = self.state.lock();
        if let Some(status) = st.analyzer_statuses.pop_front() {
            return Ok(status);
        }
        Ok(if st.analyzer_running {
            AnalyzerStatus::Done
        } else {
            AnalyzerStatus::Idle
        })
    }

    fn raw_input(&self, channel: i32) -> Result<RawReading> {
        let ch = check_channel(channel)?;
        let st = self.state.lock();
        Ok(if ch == 0 {
            st.current_reading.0
        } else {
            st.current_reading.1
        })
    }

    fn stop_analyzer(&self) -> Result<()> {
        self.log("stop_analyzer");
        self.state.lock().analyzer_running = false;
        Ok(())
    }
}

impl DigitalOutputs for MockInstrument {
    fn set_output_enable(&self, mask: u32) -> Result<()> {
        self.state.lock().dio_enable = mask;
        Ok(())
    }

    fn write_outputs(&self, levels: u32) -> Result<()> {
        self.state.lock().dio_outputs.push(levels);
        Ok(())
    }

    fn read_outputs(&self) -> Result<u32> {
        Ok(self.state.lock().dio_outputs.last().copied().unwrap_or(0))
    }
}

impl SpiBus for MockInstrument {
    fn init_spi(&self, cfg: &SpiConfig) -> Result<()> {
        self.log("init_spi");
        self.state.lock().spi = Some(*cfg);
        Ok(())
    }

    fn write_u32(&self, cs: i32, word: u32) -> Result<()> {
        let mut st = self.state.lock();
        if st.spi_fail {
            return Err(DwfError::Communication {
                message: "SPI transfer failed".to_string(),
            });
        }
        st.spi_writes.push((cs, word));
        Ok(())
    }

    fn read_u32(&self, _cs: i32) -> Result<u32> {
        let mut st = self.state.lock();
        if st.spi_fail {
            return Err(DwfError::Communication {
                message: "SPI transfer failed".to_string(),
            });
        }
        Ok(st.spi_responses.pop_front().unwrap_or(0))
    }
}

impl Instrument for MockInstrument {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_read_samples_requires_done() {
        let mock = MockInstrument::new();
        mock.script_states([AcquisitionState::Armed]);
        let err = mock.read_samples(4).unwrap_err();
        assert!(matches!(
            err,
            DwfError::NotReady {
                state: AcquisitionState::Armed
            }
        ));
        // next poll falls back to Done
        assert_eq!(mock.read_samples(4).unwrap().0.len(), 4);
    }

    #[test]
    fn test_stream_record_merges_rate_warning() {
        let mock = MockInstrument::new();
        mock.set_achieved_rate(990.0);
        mock.set_channel_data(0, vec![1.0; 4]);
        mock.script_record([(
            AcquisitionState::Triggered,
            RecordCounters {
                available: 4,
                ..Default::default()
            },
        )]);

        let outcome = mock.stream_record(0, 1000.0, 4).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.samples, vec![1.0; 4]);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(mock.records()[0].samples, 4);
    }

    #[test]
    fn test_averaged_capture_warns_on_analog_trigger() {
        use crate::subsystem::analog_in::TriggerConfig;

        let mock = MockInstrument::new();
        mock.configure_input_channel(
            &AcquisitionConfig::new(1e6, 2).with_trigger(TriggerConfig::edge(0, 0.1)),
        )
        .unwrap();
        mock.queue_capture(vec![1.0, 1.0], vec![0.0, 0.0]);
        mock.queue_capture(vec![3.0, 3.0], vec![0.0, 0.0]);

        let (ch1, _, warnings) = mock
            .acquire_averaged(2, 2, Duration::ZERO, None)
            .unwrap();
        assert_eq!(ch1, vec![2.0, 2.0]);
        assert_eq!(warnings, vec![crate::AcquisitionWarning::AnalogTriggerAveraging]);
    }

    #[test]
    fn test_shutdown_disables_outputs() {
        let mock = MockInstrument::new();
        mock.configure_output_channel(&WaveformConfig::sine(0, 1000.0, 0.5))
            .unwrap();
        assert!(mock.output_enabled(0));
        mock.shutdown().unwrap();
        assert!(!mock.output_enabled(0));
        assert_eq!(mock.calls().last().map(String::as_str), Some("stop"));
    }
}
