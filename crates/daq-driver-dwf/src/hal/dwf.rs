//! Capability traits for a real WaveForms device.

use crate::acquisition::{AcquisitionPort, AcquisitionState, RecordCounters};
use crate::device::DwfDevice;
use crate::error::Result;
use crate::hal::{
    DigitalOutputs, Instrument, NetworkAnalyzer, Oscilloscope, SpiBus, WaveformGenerator,
};
use crate::subsystem::analog_in::{AcquisitionConfig, ConfigureReport, InputLimits};
use crate::subsystem::analog_out::{CustomWaveform, WaveformConfig};
use crate::subsystem::impedance::{AnalyzerConfig, AnalyzerStatus, RawReading};
use crate::subsystem::spi::SpiConfig;

impl WaveformGenerator for DwfDevice {
    fn output_channel_count(&self) -> Result<i32> {
        self.analog_out().channel_count()
    }

    fn configure_output_channel(&self, cfg: &WaveformConfig) -> Result<()> {
        self.analog_out().configure(cfg)
    }

    fn load_custom(&self, wave: &CustomWaveform) -> Result<()> {
        self.analog_out().load_custom(wave)
    }

    fn set_output_enabled(&self, channel: i32, enabled: bool) -> Result<()> {
        self.analog_out().set_enabled(channel, enabled)
    }
}

impl AcquisitionPort for DwfDevice {
    fn start(&self) -> Result<()> {
        self.analog_in().start()
    }

    fn poll_state(&self) -> Result<AcquisitionState> {
        self.analog_in().poll_state()
    }

    fn record_counters(&self) -> Result<RecordCounters> {
        self.analog_in().record_counters()
    }

    fn fetch(&self, channel: i32, out: &mut [f64]) -> Result<()> {
        self.analog_in().fetch(channel, out)
    }
}

impl Oscilloscope for DwfDevice {
    fn input_limits(&self) -> Result<InputLimits> {
        Ok(self.info()?.input)
    }

    fn configure_input_channel(&self, cfg: &AcquisitionConfig) -> Result<ConfigureReport> {
        self.analog_in().configure(cfg)
    }

    fn start_record(
        &self,
        channel: i32,
        sample_rate_hz: f64,
        samples: usize,
    ) -> Result<ConfigureReport> {
        self.analog_in().start_record(channel, sample_rate_hz, samples)
    }

    fn stop(&self) -> Result<()> {
        self.analog_in().stop()
    }

    fn uses_analog_trigger(&self) -> bool {
        self.analog_in().uses_analog_trigger()
    }
}

impl NetworkAnalyzer for DwfDevice {
    fn configure_analyzer(&self, cfg: &AnalyzerConfig) -> Result<()> {
        self.impedance().configure(cfg)
    }

    fn set_analyzer_frequency(&self, hz: f64) -> Result<()> {
        self.impedance().set_frequency(hz)
    }

    fn discard_last_capture(&self) -> Result<()> {
        self.impedance().discard_last_capture()
    }

    fn analyzer_status(&self) -> Result<AnalyzerStatus> {
        self.impedance().status()
    }

    fn raw_input(&self, channel: i32) -> Result<RawReading> {
        self.impedance().raw_input(channel)
    }

    fn stop_analyzer(&self) -> Result<()> {
        self.impedance().stop()
    }

    fn last_error_message(&self) -> Option<String> {
        DwfDevice::last_error_message(self)
    }
}

impl DigitalOutputs for DwfDevice {
    fn set_output_enable(&self, mask: u32) -> Result<()> {
        self.digital_io().set_output_enable(mask)
    }

    fn write_outputs(&self, levels: u32) -> Result<()> {
        self.digital_io().write(levels)
    }

    fn read_outputs(&self) -> Result<u32> {
        self.digital_io().output()
    }
}

impl SpiBus for DwfDevice {
    fn init_spi(&self, cfg: &SpiConfig) -> Result<()> {
        self.spi().init(cfg)
    }

    fn write_u32(&self, cs: i32, word: u32) -> Result<()> {
        self.spi().write_u32(cs, word)
    }

    fn read_u32(&self, cs: i32) -> Result<u32> {
        self.spi().read_u32(cs)
    }
}

impl Instrument for DwfDevice {}
