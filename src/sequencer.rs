//! Measurement sequences.
//!
//! [`MeasurementSequencer`] owns the instrument, the relay controller, the
//! gain control and the mode configuration. [`measure`](MeasurementSequencer::measure)
//! applies the mode configuration (one relay write at most) and runs one of
//! three sequences:
//!
//! - **Time domain**: one generator-triggered capture of both channels
//! - **Frequency sweep**: gain/phase at log-spaced frequencies through the
//!   network analyzer
//! - **DC offset**: averaged channel means with the generator parked at 0 V
//!
//! Driver errors propagate unchanged and leave the instrument in its last
//! commanded state.

use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use daq_driver_dwf::hal::{Instrument, NetworkAnalyzer, Oscilloscope, WaveformGenerator};
use daq_driver_dwf::{
    AcquisitionConfig, AnalyzerConfig, AnalyzerStatus, CustomWaveform, DwfDevice, InputLimits,
    TriggerConfig, TriggerReference, WaveformConfig,
};
use tracing::{debug, info, warn};

use crate::config::{BoardMode, ExcitationMode, ModeConfig};
use crate::error::{BimmsError, Result};
use crate::gain::GainControl;
use crate::protocol::{McuState, Stm32Link};
use crate::relay::{Channel, Coupling, RelayController, StimNeg, StimPos, TiaNegInput};
use crate::results::{
    invert_gain, unwrap_phase, BodeResult, DcOffsetResult, GainPhase, Measurement,
    MeasurementResult, Metadata,
};
use crate::settings::Settings;

/// Generator channel driving the board excitation input.
pub const AWG_CHANNEL: i32 = 0;

/// Single-frequency time-domain capture.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDomainRequest {
    pub frequency_hz: f64,
    pub phase_deg: f64,
    pub symmetry_pct: f64,
    /// Signal periods covered by the capture
    pub n_periods: f64,
    /// Trigger delay from the generator start, in seconds
    pub delay_s: f64,
    /// Excitation amplitude, `v_amplitude` when unset. Rescales the peak
    /// of a custom table.
    pub amplitude: Option<f64>,
    /// Excitation offset, `v_offset` when unset. Added to every sample of
    /// a custom table.
    pub offset: Option<f64>,
    /// One period of a custom excitation, played instead of the sine.
    /// Phase and symmetry must stay at their defaults.
    pub custom: Option<Vec<f64>>,
}

impl TimeDomainRequest {
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            frequency_hz,
            phase_deg: 0.0,
            symmetry_pct: 50.0,
            n_periods: 8.0,
            delay_s: 0.0,
            amplitude: None,
            offset: None,
            custom: None,
        }
    }

    pub fn with_periods(mut self, n_periods: f64) -> Self {
        self.n_periods = n_periods;
        self
    }

    pub fn with_delay(mut self, delay_s: f64) -> Self {
        self.delay_s = delay_s;
        self
    }

    pub fn with_custom(mut self, table: Vec<f64>) -> Self {
        self.custom = Some(table);
        self
    }
}

/// Logarithmic gain/phase sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRequest {
    pub f_start: f64,
    pub f_stop: f64,
    /// 0 selects ten points per decade
    pub n_points: usize,
    pub settling_time: Duration,
    /// Periods measured per point
    pub n_periods: i32,
    pub amplitude: Option<f64>,
    pub offset: Option<f64>,
}

impl SweepRequest {
    pub fn new(f_start: f64, f_stop: f64) -> Self {
        Self {
            f_start,
            f_stop,
            n_points: 0,
            settling_time: Duration::from_millis(10),
            n_periods: 16,
            amplitude: None,
            offset: None,
        }
    }

    pub fn with_points(mut self, n_points: usize) -> Self {
        self.n_points = n_points;
        self
    }

    pub fn with_settling_time(mut self, settling_time: Duration) -> Self {
        self.settling_time = settling_time;
        self
    }
}

/// Averaged DC level of both channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcOffsetRequest {
    pub acq_duration: Duration,
    pub n_averages: usize,
}

impl DcOffsetRequest {
    pub fn new(acq_duration: Duration, n_averages: usize) -> Self {
        Self {
            acq_duration,
            n_averages,
        }
    }
}

/// Measurement to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Measure {
    TimeDomain(TimeDomainRequest),
    FrequencySweep(SweepRequest),
    DcOffset(DcOffsetRequest),
}

/// Number of sweep points: ten per decade plus one when `n_points` is 0.
pub fn sweep_point_count(f_start: f64, f_stop: f64, n_points: usize) -> usize {
    if n_points > 0 {
        return n_points;
    }
    let ratio = f_stop / f_start;
    let nearest = ratio.log10().round();
    // whole decades up to float rounding of the ratio itself
    let decades = if (ratio / 10f64.powi(nearest as i32) - 1.0).abs() <= 4.0 * f64::EPSILON {
        nearest
    } else {
        ratio.log10().ceil()
    };
    (10.0 * decades + 1.0).max(1.0) as usize
}

/// `n` frequencies spaced evenly on a log scale, end points included.
pub fn log_space(f_start: f64, f_stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![f_start],
        _ => {
            let (a, b) = (f_start.log10(), f_stop.log10());
            let step = (b - a) / (n - 1) as f64;
            (0..n)
                .map(|i| match i {
                    0 => f_start,
                    i if i == n - 1 => f_stop,
                    i => 10f64.powf(a + step * i as f64),
                })
                .collect()
        }
    }
}

/// Custom table rescaled to peak at `amplitude` and shifted by `offset`.
/// Unset values keep the table as given, in volts.
fn scale_table(table: &[f64], amplitude: Option<f64>, offset: Option<f64>) -> Vec<f64> {
    let peak = table.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let gain = match amplitude {
        Some(amplitude) if peak > 0.0 => amplitude / peak,
        _ => 1.0,
    };
    let offset = offset.unwrap_or(0.0);
    table.iter().map(|v| v * gain + offset).collect()
}

/// Sample count and rate covering `n_periods` of `frequency_hz`.
///
/// The full buffer is used unless that needs a rate above the input's
/// maximum, in which case the sample count shrinks and the rate stays at
/// the limit. Below the minimum rate the rate is raised to it and the
/// capture spans fewer periods.
pub fn time_domain_plan(
    frequency_hz: f64,
    n_periods: f64,
    limits: &InputLimits,
) -> Result<(usize, f64)> {
    if !(frequency_hz > 0.0 && frequency_hz.is_finite()) {
        return Err(BimmsError::invalid_value(
            "frequency",
            format!("{} Hz", frequency_hz),
        ));
    }
    if !(n_periods > 0.0 && n_periods.is_finite()) {
        return Err(BimmsError::invalid_value("n_periods", n_periods.to_string()));
    }
    let mut samples = limits.max_buffer;
    let mut rate = frequency_hz * samples as f64 / n_periods;
    if rate > limits.max_rate_hz {
        samples = (limits.max_rate_hz * n_periods / frequency_hz).floor() as usize;
        rate = frequency_hz * samples as f64 / n_periods;
    } else if rate < limits.min_rate_hz {
        rate = limits.min_rate_hz;
        warn!(
            frequency_hz,
            n_periods,
            covered_periods = frequency_hz * samples as f64 / rate,
            "Sample rate raised to the input minimum"
        );
    }
    if samples < 2 {
        return Err(BimmsError::invalid_value(
            "n_periods",
            format!(
                "{} periods of {} Hz do not fit at {} Hz",
                n_periods, frequency_hz, limits.max_rate_hz
            ),
        ));
    }
    Ok((samples, rate))
}

/// Owns the instrument and the board state and runs measurements.
pub struct MeasurementSequencer<I> {
    instrument: I,
    relays: RelayController<I>,
    gains: GainControl<I>,
    config: ModeConfig,
    timeout: Option<Duration>,
    board_id: Option<u32>,
}

/// Sequencer on a real WaveForms device.
pub type Bimms = MeasurementSequencer<DwfDevice>;

impl Bimms {
    /// Open the instrument named in `settings` and bring up the board.
    pub fn connect(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let device = DwfDevice::open(&settings.device.selector()?)?;
        info!(serial = %device.serial(), "Instrument opened");
        Self::connect_with(device, settings)
    }
}

impl<I: Instrument + Clone> MeasurementSequencer<I> {
    pub fn new(
        instrument: I,
        relays: RelayController<I>,
        gains: GainControl<I>,
        config: ModeConfig,
    ) -> Self {
        Self {
            instrument,
            relays,
            gains,
            config,
            timeout: None,
            board_id: None,
        }
    }

    /// Initialise SPI and DIO on an open instrument and check the board ID.
    ///
    /// On failure the instrument is dropped, which closes it.
    pub fn connect_with(instrument: I, settings: &Settings) -> Result<Self> {
        let link = Stm32Link::init(instrument.clone(), &settings.spi.to_config()?)?;
        let board_id = match link.check_board() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "BIMMS board not detected, closing instrument");
                return Err(e);
            }
        };
        let mut gains = GainControl::new(instrument.clone(), settings.dio);
        gains.init()?;

        let mut sequencer = Self::new(
            instrument,
            RelayController::new(link),
            gains,
            ModeConfig::bimms_default(),
        );
        sequencer.timeout = settings.device.acquisition_timeout();
        sequencer.board_id = Some(board_id);
        Ok(sequencer)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn instrument(&self) -> &I {
        &self.instrument
    }

    pub fn board_id(&self) -> Option<u32> {
        self.board_id
    }

    pub fn config(&self) -> &ModeConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ModeConfig {
        &mut self.config
    }

    pub fn relays(&self) -> &RelayController<I> {
        &self.relays
    }

    pub fn relays_mut(&mut self) -> &mut RelayController<I> {
        &mut self.relays
    }

    pub fn gains(&self) -> &GainControl<I> {
        &self.gains
    }

    pub fn gains_mut(&mut self) -> &mut GainControl<I> {
        &mut self.gains
    }

    /// Translate the mode configuration into relay and gain settings.
    ///
    /// Relays are written with a single `send_config`; returns whether it
    /// issued a transaction.
    pub fn apply_config(&mut self) -> Result<bool> {
        let mode = self.config.board_mode()?;
        self.route(&mode)?;
        self.gains.set_channel_gain(Channel::Ch1, mode.ch1_gain)?;
        self.gains.set_channel_gain(Channel::Ch2, mode.ch2_gain)?;
        self.relays.send_config()
    }

    fn route(&mut self, mode: &BoardMode) -> Result<()> {
        let relays = &mut self.relays;
        relays.select_awg(mode.excitation_source);
        relays.set_stim_coupling(mode.excitation_coupling);
        relays.set_dc_feedback(mode.dc_feedback);
        relays.set_wire_mode(mode.wire_mode)?;
        relays.connect_scope(Channel::Ch1, true);
        relays.connect_scope(Channel::Ch2, true);
        relays.set_channel_coupling(Channel::Ch1, mode.ch1_coupling);
        relays.set_channel_coupling(Channel::Ch2, mode.ch2_coupling);
        relays.enable_potentiostat(false);
        relays.set_tia_neg_input(TiaNegInput::Gnd);
        match mode.excitation_mode {
            ExcitationMode::GEis => {
                relays.enable_current_source(true);
                relays.set_current_source_gain(mode.current_source_gain);
                relays.route_stim_pos(StimPos::Ipos);
                relays.route_stim_neg(StimNeg::Ineg);
                relays.connect_tia_to_ch2(false);
            }
            ExcitationMode::PEis => {
                relays.enable_current_source(false);
                relays.route_stim_pos(StimPos::Vpos);
                relays.route_stim_neg(StimNeg::Tia);
                relays.connect_tia_to_ch2(true);
                relays.set_tia_coupling(Coupling::Dc);
            }
        }
        Ok(())
    }

    /// Apply the mode configuration and run one measurement.
    pub fn measure(&mut self, request: Measure) -> Result<Measurement> {
        self.apply_config()?;
        Ok(match request {
            Measure::TimeDomain(req) => {
                Measurement::TimeDomain(self.measure_time_domain_single_frequency(&req)?)
            }
            Measure::FrequencySweep(req) => {
                Measurement::FrequencySweep(self.measure_frequency_sweep(&req)?)
            }
            Measure::DcOffset(req) => Measurement::DcOffset(self.measure_dc_offset(&req)?),
        })
    }

    fn metadata(
        &self,
        measurement: &str,
        started_at: chrono::DateTime<Utc>,
        parameters: BTreeMap<String, f64>,
    ) -> Metadata {
        Metadata {
            measurement: measurement.to_string(),
            started_at,
            finished_at: Utc::now(),
            mode: self.config.snapshot(),
            relays: self.relays.last_sent().bits(),
            ch1_gain: self.gains.channel_gain(Channel::Ch1),
            ch2_gain: self.gains.channel_gain(Channel::Ch2),
            parameters,
        }
    }

    /// Generator-triggered capture of both channels at one frequency.
    ///
    /// Uses the current board wiring; [`measure`](Self::measure) applies
    /// the mode configuration first.
    pub fn measure_time_domain_single_frequency(
        &mut self,
        req: &TimeDomainRequest,
    ) -> Result<MeasurementResult> {
        let started_at = Utc::now();
        let mode = self.config.board_mode()?;
        let limits = self.instrument.input_limits()?;
        let (samples, rate) = time_domain_plan(req.frequency_hz, req.n_periods, &limits)?;
        info!(
            frequency_hz = req.frequency_hz,
            samples,
            rate_hz = rate,
            "Time-domain measurement"
        );

        match &req.custom {
            Some(table) => {
                if req.phase_deg != 0.0 || req.symmetry_pct != 50.0 {
                    return Err(BimmsError::NotSupported(
                        "phase and symmetry apply to the sine excitation only".to_string(),
                    ));
                }
                let wave = CustomWaveform {
                    enabled: false,
                    ..CustomWaveform::new(
                        AWG_CHANNEL,
                        req.frequency_hz * table.len() as f64,
                        scale_table(table, req.amplitude, req.offset),
                    )
                };
                self.instrument.load_custom(&wave)?;
            }
            None => {
                let wave = WaveformConfig::sine(
                    AWG_CHANNEL,
                    req.frequency_hz,
                    req.amplitude.unwrap_or(mode.v_amplitude),
                )
                .with_offset(req.offset.unwrap_or(mode.v_offset))
                .with_symmetry(req.symmetry_pct)
                .with_phase(req.phase_deg)
                .enabled(false);
                self.instrument.configure_output_channel(&wave)?;
            }
        }

        let trigger = TriggerConfig::awg(AWG_CHANNEL as u8)
            .with_reference(TriggerReference::LeftBorder)
            .with_position(req.delay_s);
        let report = self
            .instrument
            .configure_input_channel(&AcquisitionConfig::new(rate, samples).with_trigger(trigger))?;

        self.instrument.arm()?;
        self.instrument.set_output_enabled(AWG_CHANNEL, true)?;
        let stats = self.instrument.wait_done(self.timeout)?;
        self.instrument.set_output_enabled(AWG_CHANNEL, false)?;
        let (ch1, ch2) = self.instrument.read_samples(report.sample_count)?;
        debug!(polls = stats.polls, elapsed = ?stats.elapsed, "Capture complete");

        let parameters = BTreeMap::from([
            ("frequency_hz".to_string(), req.frequency_hz),
            ("phase_deg".to_string(), req.phase_deg),
            ("symmetry_pct".to_string(), req.symmetry_pct),
            ("n_periods".to_string(), req.n_periods),
            ("delay_s".to_string(), req.delay_s),
        ]);
        Ok(MeasurementResult {
            timestamps: report.timestamps(),
            ch1,
            ch2,
            achieved_rate_hz: report.achieved_rate_hz,
            metadata: self.metadata("time_domain", started_at, parameters),
            warnings: report.warnings,
        })
    }

    fn configure_analyzer(
        &mut self,
        amplitude: Option<f64>,
        offset: Option<f64>,
        n_periods: i32,
    ) -> Result<()> {
        let mode = self.config.board_mode()?;
        let cfg = AnalyzerConfig::new(
            amplitude.unwrap_or(mode.v_amplitude),
            offset.unwrap_or(mode.v_offset),
            n_periods,
        );
        self.instrument.configure_analyzer(&cfg)?;
        Ok(())
    }

    /// Measure one point on a running analyzer.
    fn gain_phase_point(&self, frequency_hz: f64, settling_time: Duration) -> Result<GainPhase> {
        self.instrument.set_analyzer_frequency(frequency_hz)?;
        thread::sleep(settling_time);
        self.instrument.discard_last_capture()?;

        let start = Instant::now();
        loop {
            match self.instrument.analyzer_status()? {
                AnalyzerStatus::Done => break,
                AnalyzerStatus::Idle => {
                    let message = self
                        .instrument
                        .last_error_message()
                        .unwrap_or_else(|| "analyzer stopped".to_string());
                    return Err(BimmsError::Communication(format!(
                        "Analyzer stopped at {} Hz: {}",
                        frequency_hz, message
                    )));
                }
                AnalyzerStatus::Busy => {}
            }
            if let Some(limit) = self.timeout {
                if start.elapsed() >= limit {
                    return Err(BimmsError::Communication(format!(
                        "Analyzer did not finish at {} Hz within {:?}",
                        frequency_hz, limit
                    )));
                }
            }
            std::hint::spin_loop();
        }

        let ch1 = self.instrument.raw_input(0)?;
        let ch2 = self.instrument.raw_input(1)?;
        Ok(GainPhase {
            frequency_hz,
            gain: ch2.gain,
            phase_rad: unwrap_phase(ch2.phase_rad),
            gain_ch1: invert_gain(ch1.gain),
        })
    }

    /// Gain/phase sweep through the network analyzer.
    pub fn measure_frequency_sweep(&mut self, req: &SweepRequest) -> Result<BodeResult> {
        if !(req.f_start > 0.0 && req.f_stop > 0.0) {
            return Err(BimmsError::invalid_value(
                "frequency",
                format!("sweep bounds must be positive, got {} to {}", req.f_start, req.f_stop),
            ));
        }
        let started_at = Utc::now();
        let n = sweep_point_count(req.f_start, req.f_stop, req.n_points);
        let frequencies = log_space(req.f_start, req.f_stop, n);
        info!(f_start = req.f_start, f_stop = req.f_stop, points = n, "Frequency sweep");

        self.configure_analyzer(req.amplitude, req.offset, req.n_periods)?;
        thread::sleep(req.settling_time * 10);

        let mut gain = Vec::with_capacity(n);
        let mut phase = Vec::with_capacity(n);
        let mut gain_ch1 = Vec::with_capacity(n);
        for (i, f) in frequencies.iter().enumerate() {
            let point = self.gain_phase_point(*f, req.settling_time)?;
            debug!(point = i + 1, total = n, frequency_hz = *f, gain = point.gain, "Sweep point");
            gain.push(point.gain);
            phase.push(point.phase_rad);
            gain_ch1.push(point.gain_ch1);
        }
        thread::sleep(req.settling_time * 10);
        self.instrument.stop_analyzer()?;

        let parameters = BTreeMap::from([
            ("f_start".to_string(), req.f_start),
            ("f_stop".to_string(), req.f_stop),
            ("n_points".to_string(), n as f64),
            ("settling_time_s".to_string(), req.settling_time.as_secs_f64()),
            ("n_periods".to_string(), f64::from(req.n_periods)),
        ]);
        Ok(BodeResult {
            frequencies,
            gain,
            phase,
            gain_ch1,
            metadata: self.metadata("frequency_sweep", started_at, parameters),
        })
    }

    /// Gain and phase at a single frequency.
    pub fn single_frequency_gain_phase(
        &mut self,
        frequency_hz: f64,
        settling_time: Duration,
    ) -> Result<GainPhase> {
        self.configure_analyzer(None, None, 16)?;
        let point = self.gain_phase_point(frequency_hz, settling_time)?;
        thread::sleep(settling_time * 10);
        self.instrument.stop_analyzer()?;
        Ok(point)
    }

    /// Averaged DC level of both channels, calibrated for the amplifier gains.
    pub fn measure_dc_offset(&mut self, req: &DcOffsetRequest) -> Result<DcOffsetResult> {
        if req.n_averages == 0 {
            return Err(BimmsError::invalid_value("n_averages", "must be at least 1"));
        }
        let started_at = Utc::now();
        let mode = self.config.board_mode()?;
        let limits = self.instrument.input_limits()?;

        self.instrument
            .configure_output_channel(&WaveformConfig::dc(AWG_CHANNEL, 0.0))?;
        let acq = AcquisitionConfig::for_duration(req.acq_duration.as_secs_f64(), limits.max_buffer)?
            .with_trigger(TriggerConfig::auto(0));
        let report = self.instrument.configure_input_channel(&acq)?;
        info!(
            samples = report.sample_count,
            n_averages = req.n_averages,
            "DC offset measurement"
        );

        let (mut sum1, mut sum2) = (0.0, 0.0);
        for i in 0..req.n_averages {
            if i > 0 {
                thread::sleep(req.acq_duration);
            }
            self.instrument.arm_and_wait(self.timeout)?;
            let (ch1, ch2) = self.instrument.read_samples(report.sample_count)?;
            let (m1, m2) = (mean(&ch1), mean(&ch2));
            debug!(capture = i + 1, ch1 = m1, ch2 = m2, "DC capture");
            sum1 += m1;
            sum2 += m2;
        }
        let raw_ch1 = sum1 / req.n_averages as f64;
        let raw_ch2 = sum2 / req.n_averages as f64;

        let ch1 = raw_ch1 / f64::from(mode.ch1_gain);
        let mut ch2 = raw_ch2 / f64::from(mode.ch2_gain);
        if mode.excitation_mode == ExcitationMode::GEis {
            ch2 /= mode.current_conversion;
        }

        let parameters = BTreeMap::from([
            ("acq_duration_s".to_string(), req.acq_duration.as_secs_f64()),
            ("n_averages".to_string(), req.n_averages as f64),
        ]);
        Ok(DcOffsetResult {
            ch1,
            ch2,
            raw_ch1,
            raw_ch2,
            n_averages: req.n_averages,
            metadata: self.metadata("dc_offset", started_at, parameters),
            warnings: report.warnings,
        })
    }

    /// Stop the board and the instrument outputs, then release everything.
    pub fn close(self) -> Result<()> {
        self.relays.link().set_state(McuState::Stopped)?;
        self.instrument.stop_analyzer()?;
        self.instrument.shutdown()?;
        info!("BIMMS closed");
        Ok(())
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_driver_dwf::mock::{MockInstrument, AD2_LIMITS};
    use tracing_test::traced_test;

    fn sequencer(mock: &MockInstrument) -> MeasurementSequencer<MockInstrument> {
        mock.queue_spi_read([1]);
        MeasurementSequencer::connect_with(mock.clone(), &Settings::default()).unwrap()
    }

    #[test]
    fn test_sweep_point_count() {
        assert_eq!(sweep_point_count(1e3, 1e7, 0), 41);
        assert_eq!(sweep_point_count(1.0, 10.0, 0), 11);
        assert_eq!(sweep_point_count(1e3, 5e3, 0), 11);
        assert_eq!(sweep_point_count(1e3, 1e7, 7), 7);
        assert_eq!(sweep_point_count(1e3, 1e3, 0), 1);
    }

    #[test]
    fn test_sweep_point_count_partial_decade() {
        assert_eq!(sweep_point_count(1e3, 2.5e6, 0), 41);
        assert_eq!(sweep_point_count(1.0, 1000.0000002, 0), 41);
        assert_eq!(sweep_point_count(1e3, 1e6, 0), 31);
        assert_eq!(sweep_point_count(0.1, 100.0, 0), 31);
    }

    #[test]
    fn test_log_space() {
        let f = log_space(1e3, 1e7, 41);
        assert_eq!(f.len(), 41);
        assert_eq!(f[0], 1e3);
        assert_eq!(f[40], 1e7);
        assert!((f[10] - 1e4).abs() < 1e-6);
        assert!(f.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(log_space(5.0, 50.0, 1), vec![5.0]);
    }

    #[test]
    fn test_plan_uses_full_buffer() {
        let (samples, rate) = time_domain_plan(1e3, 8.0, &AD2_LIMITS).unwrap();
        assert_eq!(samples, 8192);
        assert!((rate - 1_024_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_plan_shrinks_buffer_not_rate() {
        // 8192 samples over one period of 1 MHz would need 8.192 GHz
        let (samples, rate) = time_domain_plan(1e6, 1.0, &AD2_LIMITS).unwrap();
        assert_eq!(samples, 100);
        assert!(rate <= 100e6);
        assert!((rate - 100e6).abs() < 1.0);
    }

    #[test]
    fn test_plan_raises_rate_to_input_minimum() {
        // 8 periods of 1 mHz in 8192 samples would need about 1 Hz / 977
        let (samples, rate) = time_domain_plan(1e-3, 8.0, &AD2_LIMITS).unwrap();
        assert_eq!(samples, 8192);
        assert_eq!(rate, AD2_LIMITS.min_rate_hz);

        // exactly at the minimum is left alone
        let (_, rate) = time_domain_plan(1.0, 8192.0, &AD2_LIMITS).unwrap();
        assert_eq!(rate, 1.0);
    }

    #[test]
    fn test_plan_rejects_bad_input() {
        assert!(time_domain_plan(0.0, 1.0, &AD2_LIMITS).is_err());
        assert!(time_domain_plan(1e3, 0.0, &AD2_LIMITS).is_err());
        assert!(time_domain_plan(1e8, 0.01, &AD2_LIMITS).is_err());
    }

    #[test]
    fn test_scale_table() {
        let table = [0.0, 0.5, -0.25];
        assert_eq!(scale_table(&table, None, None), table.to_vec());
        assert_eq!(scale_table(&table, Some(2.0), None), vec![0.0, 2.0, -1.0]);
        assert_eq!(scale_table(&table, Some(1.0), Some(0.5)), vec![0.5, 1.5, 0.0]);
        assert_eq!(scale_table(&[0.0, 0.0], Some(1.0), None), vec![0.0, 0.0]);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    #[traced_test]
    fn test_sweep_logs_progress() {
        let mock = MockInstrument::new();
        let mut bimms = sequencer(&mock);
        let request = SweepRequest::new(10.0, 100.0).with_settling_time(Duration::ZERO);
        let bode = bimms.measure_frequency_sweep(&request).unwrap();
        assert_eq!(bode.len(), 11);
        assert!(logs_contain("Frequency sweep"));
        assert!(logs_contain("Sweep point"));
    }

    #[test]
    fn test_apply_config_routes_current_source() {
        let mock = MockInstrument::new();
        let mut bimms = sequencer(&mock);
        assert!(bimms.apply_config().unwrap());

        let relays = bimms.relays().last_sent();
        assert!(relays.contains(crate::relay::Relays::IPOS2STIM_POS));
        assert!(relays.contains(crate::relay::Relays::INEG2STIM_NEG));
        assert!(!bimms.apply_config().unwrap());

        bimms.config_mut().set("excitation_mode", "P_EIS").unwrap();
        bimms.apply_config().unwrap();
        let relays = bimms.relays().last_sent();
        assert!(relays.contains(crate::relay::Relays::VOUTPOS2STIM_POS));
        assert!(relays.contains(crate::relay::Relays::TIA2STIM_NEG));
        assert!(!relays.contains(crate::relay::Relays::IPOS2STIM_POS));
    }

    #[test]
    fn test_apply_config_sets_gains() {
        let mock = MockInstrument::new();
        let mut bimms = sequencer(&mock);
        bimms.config_mut().set("ch1_gain", 50i64).unwrap();
        bimms.apply_config().unwrap();
        assert_eq!(bimms.gains().channel_gain(Channel::Ch1), 50);
        assert_eq!(bimms.gains().channel_gain(Channel::Ch2), 1);
    }
}
