//! Safe Rust driver for Digilent WaveForms instruments.
//!
//! This crate provides a safe interface to the Analog Discovery family
//! through the WaveForms SDK (`libdwf`). It wraps the low-level FFI bindings
//! from `dwf-sys` with error handling, RAII resource management and a
//! serialised handle that can be shared between subsystem accessors.
//!
//! # Architecture
//!
//! ## Device Access
//! - [`DwfDevice`] - Device handle with RAII cleanup
//! - [`enumerate`] / [`DeviceSelector`] - Picking the device to open
//! - [`DeviceInfo`] - Device introspection
//!
//! ## Subsystems
//! - [`AnalogIn`] - Two-channel oscilloscope with trigger handling
//! - [`AnalogOut`] - Arbitrary waveform generator
//! - [`ImpedanceAnalyzer`] - Gain/phase network analyzer
//! - [`DigitalIo`] - Static digital I/O
//! - [`Spi`] - SPI master on the digital pins
//!
//! ## Acquisition
//! - [`AcquisitionPort`] - Status/fetch primitives the polling algorithms
//!   run on
//! - [`wait_for_done`], [`drain_record`], [`average_captures`]
//!
//! ## HAL Traits
//! - [`hal::Instrument`] and its parts, implemented by [`DwfDevice`] and
//!   [`mock::MockInstrument`]
//!
//! # Example
//!
//! ```no_run
//! use daq_driver_dwf::hal::{Oscilloscope, WaveformGenerator};
//! use daq_driver_dwf::{AcquisitionConfig, DeviceSelector, DwfDevice, WaveformConfig};
//!
//! # fn example() -> daq_driver_dwf::Result<()> {
//! let device = DwfDevice::open(&DeviceSelector::FirstFree)?;
//! device.configure_output_channel(&WaveformConfig::sine(0, 1000.0, 0.5))?;
//!
//! let report = device.configure_input_channel(&AcquisitionConfig::new(1e6, 4096))?;
//! device.arm_and_wait(None)?;
//! let (ch1, ch2) = device.read_samples(report.sample_count)?;
//! println!("{} / {} samples", ch1.len(), ch2.len());
//!
//! device.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `hardware`: Link against the installed WaveForms runtime. Without it
//!   every SDK call panics; [`mock::MockInstrument`] still works.

pub mod acquisition;
pub mod device;
pub mod error;
pub mod hal;
pub mod mock;
pub mod subsystem;

pub use acquisition::{
    average_captures, captures_for_quantum, capture_timestamps, check_rate, drain_record,
    wait_for_done, AcquisitionPort, AcquisitionState, AcquisitionWarning, PollStats,
    MAX_RECORD_CHUNK, RecordCounters, RecordOutcome, RATE_TOLERANCE,
};
pub use device::{
    enumerate, select_device, AutoConfigure, DeviceInfo, DeviceSelector, DwfDevice,
    EnumeratedDevice,
};
pub use error::{DwfError, Result};
pub use subsystem::analog_in::{
    AcquisitionConfig, AnalogIn, ConfigureReport, InputFilter, InputLimits, TriggerConfig,
    TriggerMode, TriggerReference, TriggerSlope, TriggerSource,
};
pub use subsystem::analog_out::{AnalogOut, CustomWaveform, FunctionShape, WaveformConfig};
pub use subsystem::digital_io::DigitalIo;
pub use subsystem::impedance::{AnalyzerConfig, AnalyzerStatus, ImpedanceAnalyzer, RawReading};
pub use subsystem::spi::{Spi, SpiConfig, SpiMode};
