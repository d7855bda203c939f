//! WaveForms Hardware Smoke Test Suite
//!
//! Verifies connectivity and basic operation of an Analog Discovery 2.
//!
//! # Hardware Setup
//!
//! Loopback for the acquisition tests:
//! - W1 → 1+ (1- to GND)
//! - W1 → 2+ (2- to GND)
//!
//! # Environment Variables
//!
//! Required:
//! - `DWF_SMOKE_TEST=1` - Enable the test suite
//!
//! Optional:
//! - `DWF_DEVICE` - Device selector: index, serial suffix, or "first"
//!
//! # Running
//!
//! ```bash
//! export DWF_SMOKE_TEST=1
//! cargo nextest run --profile hardware --features hardware -p daq-driver-dwf
//! ```
//!
//! # Test Coverage
//!
//! | Test | Description |
//! |------|-------------|
//! | `device_discovery_test` | Enumerate and open the device |
//! | `device_info_test` | Channel counts and scope limits |
//! | `generator_loopback_test` | W1 DC level seen on scope channel 1 |
//! | `sine_capture_test` | AWG-triggered sine capture, sample rate check |
//! | `record_mode_test` | Record-mode drain of channel 1 |

#![cfg(feature = "hardware")]

use std::env;
use std::time::Duration;

use daq_driver_dwf::hal::{Oscilloscope, WaveformGenerator};
use daq_driver_dwf::{
    enumerate, AcquisitionConfig, DeviceSelector, DwfDevice, TriggerConfig, TriggerReference,
    WaveformConfig,
};

// =============================================================================
// Test Configuration
// =============================================================================

/// DC loopback tolerance (20 mV)
const VOLTAGE_TOLERANCE: f64 = 0.020;

const ACQUISITION_TIMEOUT: Duration = Duration::from_secs(5);

fn smoke_test_enabled() -> bool {
    env::var("DWF_SMOKE_TEST")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

fn selector() -> DeviceSelector {
    env::var("DWF_DEVICE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

macro_rules! skip_if_disabled {
    () => {
        if !smoke_test_enabled() {
            println!("WaveForms smoke test skipped (set DWF_SMOKE_TEST=1 to enable)");
            return;
        }
    };
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn device_discovery_test() {
    skip_if_disabled!();

    let devices = enumerate().expect("Failed to enumerate devices");
    assert!(!devices.is_empty(), "No WaveForms device connected");
    for d in &devices {
        println!("[{}] {} {} in_use={}", d.index, d.name, d.serial, d.in_use);
    }

    let device = DwfDevice::open(&selector()).expect("Failed to open device");
    assert!(!device.serial().is_empty());
    device.close().expect("Failed to close device");
}

#[test]
fn device_info_test() {
    skip_if_disabled!();

    let device = DwfDevice::open(&selector()).expect("Failed to open device");
    let info = device.info().expect("Failed to read device info");
    println!("{:#?}", info);

    assert_eq!(info.analog_in_channels, 2);
    assert!(info.analog_out_channels >= 2);
    assert!(info.input.max_buffer >= 8192);
    assert!(info.input.max_rate_hz >= 100e6);
    device.close().expect("Failed to close device");
}

#[test]
fn generator_loopback_test() {
    skip_if_disabled!();

    let device = DwfDevice::open(&selector()).expect("Failed to open device");
    device
        .configure_output_channel(&WaveformConfig::dc(0, 1.0))
        .expect("Failed to configure W1");
    std::thread::sleep(Duration::from_millis(50));

    let cfg = AcquisitionConfig::new(1e6, 1000).with_trigger(TriggerConfig::auto(0));
    let report = device.configure_input_channel(&cfg).expect("Configure failed");
    device
        .arm_and_wait(Some(ACQUISITION_TIMEOUT))
        .expect("Capture did not complete");
    let (ch1, _) = device.read_samples(report.sample_count).expect("Read failed");

    let level = mean(&ch1);
    println!("W1 = 1.0 V, 1+ reads {:.4} V", level);
    assert!((level - 1.0).abs() < VOLTAGE_TOLERANCE);
    device.close().expect("Failed to close device");
}

#[test]
fn sine_capture_test() {
    skip_if_disabled!();

    let device = DwfDevice::open(&selector()).expect("Failed to open device");
    device
        .configure_output_channel(&WaveformConfig::sine(0, 1000.0, 1.0).enabled(false))
        .expect("Failed to configure W1");

    let trigger = TriggerConfig::awg(0).with_reference(TriggerReference::LeftBorder);
    let cfg = AcquisitionConfig::new(1e6, 4000).with_trigger(trigger);
    let report = device.configure_input_channel(&cfg).expect("Configure failed");
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    device.arm().expect("Arm failed");
    device
        .set_output_enabled(0, true)
        .expect("Failed to start W1");
    device
        .wait_done(Some(ACQUISITION_TIMEOUT))
        .expect("Capture did not complete");
    let (ch1, _) = device.read_samples(report.sample_count).expect("Read failed");

    let peak = ch1.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    println!("Sine peak {:.3} V", peak);
    assert!((peak - 1.0).abs() < 0.05);
    assert!(report.timestamps()[0].abs() < 1e-6);
    device.close().expect("Failed to close device");
}

#[test]
fn record_mode_test() {
    skip_if_disabled!();

    let device = DwfDevice::open(&selector()).expect("Failed to open device");
    device
        .configure_output_channel(&WaveformConfig::dc(0, 0.5))
        .expect("Failed to configure W1");

    let outcome = device
        .stream_record(0, 100e3, 20_000)
        .expect("Record failed");
    println!(
        "lost={} corrupted={} warnings={:?}",
        outcome.lost, outcome.corrupted, outcome.warnings
    );
    assert_eq!(outcome.samples.len(), 20_000);
    assert!(outcome.is_clean());
    device.close().expect("Failed to close device");
}
