//! Measurement sequences against the scripted mock instrument.
//!
//! Covers the relay write-through cache across measurements, sweep point
//! generation and the phase rule, DC offset averaging and calibration, and
//! the time-domain buffer planning.

use std::f64::consts::PI;
use std::time::Duration;

use anyhow::Result;

use bimms::protocol::{Command, McuState};
use bimms::relay::Relays;
use bimms::{
    BimmsError, DcOffsetRequest, Measure, Measurement, MeasurementSequencer, Settings,
    SweepRequest, TimeDomainRequest,
};
use daq_driver_dwf::mock::MockInstrument;
use daq_driver_dwf::{
    AcquisitionWarning, AnalyzerStatus, RawReading, TriggerMode, TriggerReference, TriggerSource,
};

const BOARD_ID: u32 = 3;

fn connect(mock: &MockInstrument) -> MeasurementSequencer<MockInstrument> {
    mock.queue_spi_read([BOARD_ID]);
    MeasurementSequencer::connect_with(mock.clone(), &Settings::default())
        .unwrap()
        .with_timeout(Some(Duration::from_secs(1)))
}

fn relay_writes(mock: &MockInstrument) -> Vec<u32> {
    mock.spi_writes()
        .into_iter()
        .filter(|w| w >> 29 == Command::SetRelays as u32)
        .map(|w| w & ((1 << 29) - 1))
        .collect()
}

fn reading(gain: f64, phase_rad: f64) -> RawReading {
    RawReading { gain, phase_rad }
}

fn dc_request() -> Measure {
    Measure::DcOffset(DcOffsetRequest::new(Duration::from_millis(1), 1))
}

// =============================================================================
// Connection
// =============================================================================

#[test]
fn connect_checks_board_and_initialises_io() {
    let mock = MockInstrument::new();
    let bimms = connect(&mock);

    assert_eq!(bimms.board_id(), Some(BOARD_ID));
    assert!(mock.spi_config().is_some());
    assert_eq!(mock.dio_enable(), bimms.gains().direction_mask());
    assert_eq!(mock.dio_outputs().last(), Some(&0));
    assert!(relay_writes(&mock).is_empty());
}

#[test]
fn connect_rejects_missing_board() {
    let mock = MockInstrument::new();
    mock.queue_spi_read([0]);
    let err = MeasurementSequencer::connect_with(mock.clone(), &Settings::default())
        .err()
        .unwrap();
    assert!(matches!(err, BimmsError::BoardNotDetected { id: 0 }));
    assert!(err.is_not_found());
}

#[test]
fn connect_propagates_spi_failure() {
    let mock = MockInstrument::new();
    mock.fail_spi(true);
    let err = MeasurementSequencer::connect_with(mock, &Settings::default())
        .err()
        .unwrap();
    assert!(matches!(err, BimmsError::Communication(_)));
}

// =============================================================================
// Relay write-through
// =============================================================================

#[test]
fn unchanged_config_sends_relays_once() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);

    bimms.measure(dc_request()).unwrap();
    bimms.measure(dc_request()).unwrap();
    assert_eq!(relay_writes(&mock).len(), 1);

    bimms.config_mut().set("excitation_mode", "P_EIS").unwrap();
    bimms.measure(dc_request()).unwrap();
    let writes = relay_writes(&mock);
    assert_eq!(writes.len(), 2);
    assert_ne!(writes[0], writes[1]);
}

#[test]
fn excitation_modes_route_differently() -> Result<()> {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);

    bimms.apply_config()?;
    let g_eis = bimms.relays().last_sent();
    assert!(g_eis.contains(Relays::CHAN1_SCOPE1 | Relays::CHAN2_SCOPE2));
    assert!(!g_eis.contains(Relays::EN_POTENTIOSTAT));

    bimms.config_mut().set("excitation_mode", "P_EIS")?;
    assert!(bimms.apply_config()?);
    let p_eis = bimms.relays().last_sent();
    assert_ne!(g_eis, p_eis);

    // back to the first wiring without touching anything else
    bimms.config_mut().set("excitation_mode", "G_EIS")?;
    assert!(bimms.apply_config()?);
    assert_eq!(bimms.relays().last_sent(), g_eis);
    assert!(!bimms.apply_config()?);
    Ok(())
}

#[test]
fn switch_set_twice_is_one_transaction() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);

    bimms.relays_mut().set_switch("coupling_ch1", "AC").unwrap();
    assert!(bimms.relays_mut().send_config().unwrap());
    assert!(!bimms.relays_mut().send_config().unwrap());
    assert_eq!(relay_writes(&mock), vec![Relays::CH1_COUPLING.bits()]);
}

#[test]
fn three_wire_mode_is_rejected_before_any_write() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    assert!(bimms.config_mut().set("wire_mode", "3_WIRE").is_err());
    assert!(relay_writes(&mock).is_empty());
}

// =============================================================================
// Frequency sweep
// =============================================================================

#[test]
fn default_sweep_has_ten_points_per_decade() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);

    let request = SweepRequest::new(1e3, 1e7).with_settling_time(Duration::ZERO);
    let Measurement::FrequencySweep(bode) = bimms.measure(Measure::FrequencySweep(request)).unwrap()
    else {
        panic!("expected a sweep result");
    };

    assert_eq!(bode.len(), 41);
    assert_eq!(bode.frequencies[0], 1e3);
    assert_eq!(bode.frequencies[40], 1e7);
    assert_eq!(mock.analyzer_frequencies(), bode.frequencies);
    assert_eq!(mock.discards(), 41);
    assert!(!mock.analyzer_running());
    assert_eq!(bode.metadata.parameters["n_points"], 41.0);
}

#[test]
fn partial_decade_sweep_rounds_decades_up() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);

    let request = SweepRequest::new(1e3, 2.5e6).with_settling_time(Duration::ZERO);
    let bode = bimms.measure_frequency_sweep(&request).unwrap();

    assert_eq!(bode.len(), 41);
    assert_eq!(bode.frequencies[40], 2.5e6);
    assert_eq!(mock.discards(), 41);
}

#[test]
fn sweep_applies_phase_rule_and_inverts_ch1_gain() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    mock.queue_analyzer_reading(reading(0.5, 0.0), reading(2.0, 0.1));
    mock.queue_analyzer_reading(reading(0.0, 0.0), reading(3.0, 2.0));

    let request = SweepRequest::new(1e3, 1e4)
        .with_points(2)
        .with_settling_time(Duration::ZERO);
    let bode = bimms.measure_frequency_sweep(&request).unwrap();

    assert_eq!(bode.gain, vec![2.0, 3.0]);
    assert!((bode.phase[0] - (0.1 + 2.0 * PI)).abs() < 1e-12);
    assert_eq!(bode.phase[1], 2.0);
    assert_eq!(bode.gain_ch1, vec![2.0, 0.0]);
}

#[test]
fn sweep_uses_configured_amplitude() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    bimms.config_mut().set("v_amplitude", 0.25).unwrap();

    let request = SweepRequest::new(1e3, 1e4)
        .with_points(3)
        .with_settling_time(Duration::ZERO);
    bimms.measure_frequency_sweep(&request).unwrap();

    let cfg = mock.analyzer_config().unwrap();
    assert_eq!(cfg.amplitude, 0.25);
    assert_eq!(cfg.periods, 16);
}

#[test]
fn stopped_analyzer_is_a_communication_error() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    mock.script_analyzer_status([AnalyzerStatus::Busy, AnalyzerStatus::Idle]);

    let request = SweepRequest::new(1e3, 1e4)
        .with_points(2)
        .with_settling_time(Duration::ZERO);
    let err = bimms.measure_frequency_sweep(&request).unwrap_err();
    assert!(matches!(err, BimmsError::Communication(_)));
    // left as commanded
    assert!(mock.analyzer_running());
}

#[test]
fn busy_analyzer_times_out() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock).with_timeout(Some(Duration::ZERO));
    mock.script_analyzer_status([AnalyzerStatus::Busy]);

    let err = bimms
        .single_frequency_gain_phase(1e3, Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, BimmsError::Communication(_)));
}

#[test]
fn single_frequency_point() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    mock.queue_analyzer_reading(reading(0.25, 0.0), reading(1.5, 3.0));

    let point = bimms
        .single_frequency_gain_phase(5e3, Duration::ZERO)
        .unwrap();
    assert_eq!(point.frequency_hz, 5e3);
    assert_eq!(point.gain, 1.5);
    assert_eq!(point.phase_rad, 3.0);
    assert_eq!(point.gain_ch1, 4.0);
    assert!(!mock.analyzer_running());
}

// =============================================================================
// DC offset
// =============================================================================

#[test]
fn dc_offset_is_mean_of_captures() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    bimms.config_mut().set("excitation_mode", "P_EIS").unwrap();
    for (a, b) in [(1.0, 0.3), (2.0, 0.6), (3.0, 0.9)] {
        mock.queue_capture(vec![a; 8192], vec![b; 8192]);
    }

    let request = DcOffsetRequest::new(Duration::from_millis(1), 3);
    let Measurement::DcOffset(dc) = bimms.measure(Measure::DcOffset(request)).unwrap() else {
        panic!("expected a DC result");
    };

    assert_eq!(mock.starts(), 3);
    assert!((dc.raw_ch1 - 2.0).abs() < 1e-9);
    assert!((dc.raw_ch2 - 0.6).abs() < 1e-9);
    assert!((dc.ch1 - 2.0).abs() < 1e-9);
    assert!((dc.ch2 - 0.6).abs() < 1e-9);
    assert_eq!(dc.n_averages, 3);

    // generator parked at 0 V, auto trigger
    let wave = mock.waveforms().pop().unwrap();
    assert_eq!(wave.offset, 0.0);
    assert_eq!(wave.amplitude, 0.0);
    let acq = mock.acquisitions().pop().unwrap();
    assert!(!acq.trigger.is_analog());
}

#[test]
fn dc_offset_is_calibrated_for_gains_and_current() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    bimms.config_mut().set("ch1_gain", 10i64).unwrap();
    bimms.config_mut().set("ch2_gain", 20i64).unwrap();
    bimms.config_mut().set("current_conversion", 100.0).unwrap();
    mock.queue_capture(vec![1.0; 8192], vec![2.0; 8192]);

    let request = DcOffsetRequest::new(Duration::from_millis(1), 1);
    let dc = match bimms.measure(Measure::DcOffset(request)).unwrap() {
        Measurement::DcOffset(dc) => dc,
        other => panic!("unexpected result {:?}", other.metadata().measurement),
    };

    assert!((dc.ch1 - 0.1).abs() < 1e-12);
    // G_EIS: volts to amps
    assert!((dc.ch2 - 2.0 / 20.0 / 100.0).abs() < 1e-12);
    assert_eq!(dc.metadata.ch1_gain, 10);
    assert_eq!(dc.metadata.ch2_gain, 20);
}

#[test]
fn dc_offset_needs_one_capture() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    let err = bimms
        .measure_dc_offset(&DcOffsetRequest::new(Duration::from_millis(1), 0))
        .unwrap_err();
    assert!(err.is_configuration());
}

// =============================================================================
// Time domain
// =============================================================================

#[test]
fn time_domain_uses_full_buffer_at_low_frequency() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    mock.queue_capture(vec![0.5; 8192], vec![-0.5; 8192]);

    let request = TimeDomainRequest::new(1e3).with_periods(8.0).with_delay(1e-4);
    let Measurement::TimeDomain(result) = bimms.measure(Measure::TimeDomain(request)).unwrap()
    else {
        panic!("expected a time-domain result");
    };

    assert_eq!(result.ch1.len(), 8192);
    assert_eq!(result.timestamps.len(), 8192);
    assert!((result.achieved_rate_hz - 1_024_000.0).abs() < 1e-6);
    assert!(result.warnings.is_empty());

    let acq = mock.acquisitions().pop().unwrap();
    assert_eq!(acq.trigger.mode, TriggerMode::Source(TriggerSource::AnalogOut(0)));
    assert_eq!(acq.trigger.reference, TriggerReference::LeftBorder);
    assert_eq!(acq.trigger.position_s, 1e-4);

    let wave = mock.waveforms().pop().unwrap();
    assert!(!wave.enabled);
    assert_eq!(wave.amplitude, 0.1);
    assert!(!mock.output_enabled(0));
}

#[test]
fn time_domain_reduces_samples_not_rate() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);

    let request = TimeDomainRequest::new(1e6).with_periods(1.0);
    let result = bimms.measure_time_domain_single_frequency(&request).unwrap();

    let acq = mock.acquisitions().pop().unwrap();
    assert_eq!(acq.sample_count, 100);
    assert!(acq.sample_rate_hz <= 100e6);
    assert_eq!(result.ch1.len(), 100);
}

#[test]
fn time_domain_generator_runs_only_during_capture() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    bimms
        .measure_time_domain_single_frequency(&TimeDomainRequest::new(1e3))
        .unwrap();

    let calls = mock.calls();
    let pos = |name: &str| calls.iter().position(|c| c == name).unwrap();
    let last = |name: &str| calls.iter().rposition(|c| c == name).unwrap();
    assert!(pos("configure_output_channel") < pos("configure_input_channel"));
    assert!(last("start") < pos("set_output_enabled"));
    assert!(calls.iter().filter(|c| *c == "set_output_enabled").count() == 2);
    assert!(!mock.output_enabled(0));
}

#[test]
fn time_domain_rate_mismatch_is_a_warning() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    mock.set_achieved_rate(1e6);

    let result = bimms
        .measure_time_domain_single_frequency(&TimeDomainRequest::new(1e3))
        .unwrap();
    assert_eq!(result.achieved_rate_hz, 1e6);
    assert!(matches!(
        result.warnings.as_slice(),
        [AcquisitionWarning::RateMismatch { .. }]
    ));
}

#[test]
fn time_domain_custom_table() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    let table: Vec<f64> = (0..100).map(|i| (i as f64 / 50.0) - 1.0).collect();

    let request = TimeDomainRequest::new(2e3).with_custom(table.clone());
    bimms.measure_time_domain_single_frequency(&request).unwrap();

    let wave = mock.custom_waveforms().pop().unwrap();
    assert!(!wave.enabled);
    assert_eq!(wave.data, table);
    assert_eq!(wave.sample_rate_hz, 2e5);
    assert!(mock.waveforms().is_empty());
}

#[test]
fn time_domain_custom_table_takes_amplitude_and_offset() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);

    let request = TimeDomainRequest {
        amplitude: Some(0.2),
        offset: Some(0.1),
        ..TimeDomainRequest::new(1e3).with_custom(vec![0.0, 1.0, 0.0, -1.0])
    };
    bimms.measure_time_domain_single_frequency(&request).unwrap();

    let wave = mock.custom_waveforms().pop().unwrap();
    let expected = [0.1, 0.3, 0.1, -0.1];
    assert_eq!(wave.data.len(), expected.len());
    for (got, want) in wave.data.iter().zip(expected) {
        assert!((got - want).abs() < 1e-12, "{got} != {want}");
    }
}

#[test]
fn time_domain_custom_table_rejects_sine_shaping() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);

    let request = TimeDomainRequest {
        phase_deg: 90.0,
        ..TimeDomainRequest::new(1e3).with_custom(vec![0.0, 1.0, 0.0, -1.0])
    };
    let err = bimms
        .measure_time_domain_single_frequency(&request)
        .unwrap_err();
    assert!(matches!(err, BimmsError::NotSupported(_)));
    assert!(mock.custom_waveforms().is_empty());
    assert!(mock.acquisitions().is_empty());
}

#[test]
fn time_domain_rate_is_clamped_to_input_minimum() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);

    let request = TimeDomainRequest::new(1e-3).with_periods(8.0);
    bimms.measure_time_domain_single_frequency(&request).unwrap();

    let acq = mock.acquisitions().pop().unwrap();
    assert_eq!(acq.sample_count, 8192);
    assert_eq!(acq.sample_rate_hz, 1.0);
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn close_stops_board_and_outputs() {
    let mock = MockInstrument::new();
    let mut bimms = connect(&mock);
    bimms
        .measure_frequency_sweep(
            &SweepRequest::new(1e3, 1e4)
                .with_points(2)
                .with_settling_time(Duration::ZERO),
        )
        .unwrap();
    bimms.close().unwrap();

    let stop = bimms::protocol::command_word(Command::SetState, McuState::Stopped as u32);
    assert_eq!(mock.spi_writes().last(), Some(&stop));
    assert!(!mock.analyzer_running());
    assert!(!mock.output_enabled(0));
    assert!(!mock.output_enabled(1));
}
