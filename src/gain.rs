//! Instrumentation-amplifier gains and front-panel LEDs, driven over DIO.
//!
//! Each scope channel goes through two amplifier stages. A stage gain is
//! selected by two pins:
//!
//! | gain | A0 | A1 |
//! |------|----|----|
//! | 1    | 0  | 0  |
//! | 2    | 1  | 0  |
//! | 5    | 0  | 1  |
//! | 10   | 1  | 1  |

use daq_driver_dwf::hal::DigitalOutputs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BimmsError, Result};
use crate::relay::Channel;

/// Gains a single stage can provide.
pub const STAGE_GAINS: [u32; 4] = [1, 2, 5, 10];

/// Total channel gains reachable with two stages.
pub const CHANNEL_GAINS: [u32; 9] = [1, 2, 4, 5, 10, 20, 25, 50, 100];

/// DIO pin assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DioPins {
    pub led_status: u8,
    pub led_err: u8,
    pub io6: u8,
    pub io7: u8,
    /// `[stage][A0, A1]` for channel 1
    pub ch1_gain: [[u8; 2]; 2],
    /// `[stage][A0, A1]` for channel 2
    pub ch2_gain: [[u8; 2]; 2],
}

impl Default for DioPins {
    fn default() -> Self {
        Self {
            led_status: 4,
            led_err: 5,
            io6: 6,
            io7: 7,
            ch1_gain: [[8, 9], [10, 11]],
            ch2_gain: [[12, 13], [14, 15]],
        }
    }
}

impl DioPins {
    /// Every assigned pin, in field order.
    pub fn all(&self) -> Vec<u8> {
        let mut pins = vec![self.led_status, self.led_err, self.io6, self.io7];
        for stage in self.ch1_gain.iter().chain(self.ch2_gain.iter()) {
            pins.extend_from_slice(stage);
        }
        pins
    }

    /// Pins that are always outputs.
    fn fixed_outputs(&self) -> u32 {
        let mut mask = bit(self.led_status) | bit(self.led_err);
        for stage in self.ch1_gain.iter().chain(self.ch2_gain.iter()) {
            mask |= bit(stage[0]) | bit(stage[1]);
        }
        mask
    }

    fn stage(&self, channel: Channel, stage: usize) -> [u8; 2] {
        match channel {
            Channel::Ch1 => self.ch1_gain[stage],
            Channel::Ch2 => self.ch2_gain[stage],
        }
    }
}

fn bit(pin: u8) -> u32 {
    1u32 << pin
}

/// A0/A1 levels selecting a stage gain.
pub fn stage_levels(gain: u32) -> Result<(bool, bool)> {
    match gain {
        1 => Ok((false, false)),
        2 => Ok((true, false)),
        5 => Ok((false, true)),
        10 => Ok((true, true)),
        _ => Err(BimmsError::invalid_value(
            "stage gain",
            format!("{} is not one of {:?}", gain, STAGE_GAINS),
        )),
    }
}

/// Split a total channel gain over the two stages, largest first stage first.
pub fn split_gain(total: u32) -> Result<(u32, u32)> {
    STAGE_GAINS
        .iter()
        .rev()
        .filter(|first| total % **first == 0)
        .map(|first| (*first, total / first))
        .find(|(_, second)| STAGE_GAINS.contains(second))
        .ok_or_else(|| {
            BimmsError::invalid_value(
                "channel gain",
                format!("{} is not one of {:?}", total, CHANNEL_GAINS),
            )
        })
}

/// DIO-side state of the board: gain pins, LEDs and the two free pins.
#[derive(Debug)]
pub struct GainControl<D> {
    dio: D,
    pins: DioPins,
    io6_output: bool,
    io7_output: bool,
    levels: u32,
    gains: [[u32; 2]; 2],
}

impl<D: DigitalOutputs> GainControl<D> {
    pub fn new(dio: D, pins: DioPins) -> Self {
        Self {
            dio,
            pins,
            io6_output: true,
            io7_output: true,
            levels: 0,
            gains: [[1, 1], [1, 1]],
        }
    }

    /// Apply the direction mask and drive every output low.
    pub fn init(&mut self) -> Result<()> {
        self.apply_direction()?;
        self.levels = 0;
        self.dio.write_outputs(self.levels)?;
        self.gains = [[1, 1], [1, 1]];
        Ok(())
    }

    pub fn pins(&self) -> &DioPins {
        &self.pins
    }

    /// Direction mask: gain and LED pins are outputs, IO6/IO7 as configured.
    pub fn direction_mask(&self) -> u32 {
        let mut mask = self.pins.fixed_outputs();
        if self.io6_output {
            mask |= bit(self.pins.io6);
        }
        if self.io7_output {
            mask |= bit(self.pins.io7);
        }
        mask
    }

    /// Choose whether the free pins IO6/IO7 are outputs.
    pub fn set_free_io_direction(&mut self, io6_output: bool, io7_output: bool) -> Result<()> {
        self.io6_output = io6_output;
        self.io7_output = io7_output;
        self.apply_direction()
    }

    fn apply_direction(&self) -> Result<()> {
        let mask = self.direction_mask();
        self.dio.set_output_enable(mask)?;
        debug!(target: "bimms::hardware", mask = format_args!("{:#06x}", mask), "DIO direction set");
        Ok(())
    }

    fn write_pins(&mut self, pins: &[(u8, bool)]) -> Result<()> {
        let mut levels = self.levels;
        for (pin, high) in pins {
            if *high {
                levels |= bit(*pin);
            } else {
                levels &= !bit(*pin);
            }
        }
        self.dio.write_outputs(levels)?;
        self.levels = levels;
        Ok(())
    }

    /// Select the gain of one amplifier stage (`stage` is 0 or 1).
    pub fn set_stage_gain(&mut self, channel: Channel, stage: usize, gain: u32) -> Result<()> {
        if stage > 1 {
            return Err(BimmsError::invalid_value(
                "stage",
                format!("{} (channels have two stages)", stage),
            ));
        }
        let (a0, a1) = stage_levels(gain)?;
        let [a0_pin, a1_pin] = self.pins.stage(channel, stage);
        self.write_pins(&[(a0_pin, a0), (a1_pin, a1)])?;
        self.gains[channel_index(channel)][stage] = gain;
        debug!(target: "bimms::hardware", ?channel, stage, gain, "Stage gain set");
        Ok(())
    }

    /// Select a total channel gain, split over both stages.
    pub fn set_channel_gain(&mut self, channel: Channel, total: u32) -> Result<()> {
        let (first, second) = split_gain(total)?;
        self.set_stage_gain(channel, 0, first)?;
        self.set_stage_gain(channel, 1, second)
    }

    /// Total gain currently selected on a channel.
    pub fn channel_gain(&self, channel: Channel) -> u32 {
        let [first, second] = self.gains[channel_index(channel)];
        first * second
    }

    pub fn set_status_led(&mut self, on: bool) -> Result<()> {
        let pin = self.pins.led_status;
        self.write_pins(&[(pin, on)])
    }

    pub fn set_error_led(&mut self, on: bool) -> Result<()> {
        let pin = self.pins.led_err;
        self.write_pins(&[(pin, on)])
    }

    /// Drive one of the free pins. It must be configured as an output.
    pub fn set_free_io(&mut self, pin: u8, high: bool) -> Result<()> {
        let is_output = (pin == self.pins.io6 && self.io6_output)
            || (pin == self.pins.io7 && self.io7_output);
        if !is_output {
            return Err(BimmsError::invalid_value(
                "free io",
                format!("pin {} is not a free output", pin),
            ));
        }
        self.write_pins(&[(pin, high)])
    }

    /// Output levels last written.
    pub fn levels(&self) -> u32 {
        self.levels
    }
}

fn channel_index(channel: Channel) -> usize {
    match channel {
        Channel::Ch1 => 0,
        Channel::Ch2 => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_driver_dwf::mock::MockInstrument;

    fn control() -> (MockInstrument, GainControl<MockInstrument>) {
        let mock = MockInstrument::new();
        let mut gains = GainControl::new(mock.clone(), DioPins::default());
        gains.init().unwrap();
        (mock, gains)
    }

    #[test]
    fn test_split_gain() {
        assert_eq!(split_gain(1).unwrap(), (1, 1));
        assert_eq!(split_gain(4).unwrap(), (2, 2));
        assert_eq!(split_gain(20).unwrap(), (10, 2));
        assert_eq!(split_gain(25).unwrap(), (5, 5));
        assert_eq!(split_gain(100).unwrap(), (10, 10));
        for total in CHANNEL_GAINS {
            let (a, b) = split_gain(total).unwrap();
            assert_eq!(a * b, total);
        }
        assert!(split_gain(3).is_err());
        assert!(split_gain(200).is_err());
    }

    #[test]
    fn test_direction_mask() {
        let (mock, mut gains) = control();
        assert_eq!(mock.dio_enable(), 0xfff0);
        gains.set_free_io_direction(false, true).unwrap();
        assert_eq!(mock.dio_enable(), 0xffb0);
    }

    #[test]
    fn test_stage_pins() {
        let (mock, mut gains) = control();
        gains.set_stage_gain(Channel::Ch1, 0, 2).unwrap();
        assert_eq!(mock.dio_outputs().last(), Some(&(1 << 8)));
        gains.set_stage_gain(Channel::Ch1, 0, 5).unwrap();
        assert_eq!(mock.dio_outputs().last(), Some(&(1 << 9)));
        gains.set_stage_gain(Channel::Ch2, 1, 10).unwrap();
        assert_eq!(mock.dio_outputs().last(), Some(&((1 << 9) | (1 << 14) | (1 << 15))));
    }

    #[test]
    fn test_invalid_stage_gain_rejected() {
        let (mock, mut gains) = control();
        let writes = mock.dio_outputs().len();
        assert!(matches!(
            gains.set_stage_gain(Channel::Ch1, 0, 3),
            Err(BimmsError::InvalidConfigValue { .. })
        ));
        assert_eq!(mock.dio_outputs().len(), writes);
        assert_eq!(gains.channel_gain(Channel::Ch1), 1);
    }

    #[test]
    fn test_channel_gain() {
        let (_, mut gains) = control();
        gains.set_channel_gain(Channel::Ch2, 50).unwrap();
        assert_eq!(gains.channel_gain(Channel::Ch2), 50);
        assert_eq!(gains.levels(), (1 << 12) | (1 << 13) | (1 << 15));
    }

    #[test]
    fn test_leds() {
        let (mock, mut gains) = control();
        gains.set_status_led(true).unwrap();
        gains.set_error_led(true).unwrap();
        gains.set_status_led(false).unwrap();
        assert_eq!(mock.dio_outputs().last(), Some(&(1 << 5)));
    }

    #[test]
    fn test_free_io_requires_output() {
        let (_, mut gains) = control();
        gains.set_free_io(6, true).unwrap();
        gains.set_free_io_direction(true, false).unwrap();
        assert!(gains.set_free_io(7, true).is_err());
        assert!(gains.set_free_io(8, true).is_err());
    }
}
