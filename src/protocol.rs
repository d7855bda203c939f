//! SPI protocol of the BIMMS board microcontroller.
//!
//! Every transfer is one 32-bit word: `command · 2^29 + payload`. A
//! register read writes the read command for the register, then clocks in
//! one word.

use std::fmt;

use daq_driver_dwf::hal::SpiBus;
use daq_driver_dwf::{SpiConfig, SpiMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BimmsError, Result};

/// Multiplier placing the command in the top bits of a word.
pub const CMD_SHIFT: u32 = 1 << 29;

/// Valid board IDs.
pub const BOARD_ID_RANGE: std::ops::RangeInclusive<u32> = 1..=16;

/// Command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    SetState = 1,
    SetRelays = 2,
    ReadRegister = 3,
}

/// Readable registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Register {
    BoardId = 0,
    State = 1,
    Error = 2,
    RelayMap = 3,
}

/// Microcontroller run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum McuState {
    Stopped = 0,
    Idle = 1,
    Locked = 2,
    Error = 3,
}

impl McuState {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Stopped),
            1 => Some(Self::Idle),
            2 => Some(Self::Locked),
            3 => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for McuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Build a command word.
pub fn command_word(command: Command, payload: u32) -> u32 {
    CMD_SHIFT
        .wrapping_mul(command as u32)
        .wrapping_add(payload)
}

/// Default SPI wiring between the instrument and the microcontroller.
pub fn default_spi_config() -> SpiConfig {
    SpiConfig {
        frequency_hz: 1e6,
        clock_pin: 1,
        mosi_pin: 2,
        miso_pin: 3,
        cs_pin: 0,
        mode: SpiMode::Mode0,
        msb_first: true,
    }
}

/// Link to the board microcontroller over an [`SpiBus`].
#[derive(Debug, Clone)]
pub struct Stm32Link<S> {
    bus: S,
    cs: i32,
}

impl<S: SpiBus> Stm32Link<S> {
    /// Initialise the SPI master and wrap it.
    pub fn init(bus: S, spi: &SpiConfig) -> Result<Self> {
        bus.init_spi(spi)?;
        Ok(Self::new(bus, spi.cs_pin))
    }

    /// Wrap an SPI bus that is already configured.
    pub fn new(bus: S, cs: i32) -> Self {
        Self { bus, cs }
    }

    pub fn bus(&self) -> &S {
        &self.bus
    }

    fn send(&self, word: u32) -> Result<()> {
        self.bus
            .write_u32(self.cs, word)
            .map_err(|e| BimmsError::Communication(e.to_string()))
    }

    /// Read one register.
    pub fn read_register(&self, register: Register) -> Result<u32> {
        self.send(command_word(Command::ReadRegister, register as u32))?;
        self.bus
            .read_u32(self.cs)
            .map_err(|e| BimmsError::Communication(e.to_string()))
    }

    pub fn board_id(&self) -> Result<u32> {
        self.read_register(Register::BoardId)
    }

    /// Read the board ID and check it is in [`BOARD_ID_RANGE`].
    pub fn check_board(&self) -> Result<u32> {
        let id = self.board_id()?;
        if !BOARD_ID_RANGE.contains(&id) {
            return Err(BimmsError::BoardNotDetected { id });
        }
        info!(board_id = id, "Connected to BIMMS board");
        Ok(id)
    }

    pub fn set_state(&self, state: McuState) -> Result<()> {
        self.send(command_word(Command::SetState, state as u32))?;
        debug!(target: "bimms::hardware", %state, "Microcontroller state set");
        Ok(())
    }

    pub fn state(&self) -> Result<McuState> {
        let raw = self.read_register(Register::State)?;
        McuState::from_raw(raw).ok_or_else(|| {
            BimmsError::Communication(format!("Unknown microcontroller state {}", raw))
        })
    }

    pub fn error_code(&self) -> Result<u32> {
        self.read_register(Register::Error)
    }

    /// Relay bitfield currently applied by the board.
    pub fn relay_map(&self) -> Result<u32> {
        self.read_register(Register::RelayMap)
    }

    pub fn set_relays(&self, bits: u32) -> Result<()> {
        self.send(command_word(Command::SetRelays, bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_driver_dwf::mock::MockInstrument;

    #[test]
    fn test_command_words() {
        assert_eq!(CMD_SHIFT, 0x2000_0000);
        assert_eq!(command_word(Command::SetRelays, 0b101), 0x4000_0005);
        assert_eq!(
            command_word(Command::ReadRegister, Register::RelayMap as u32),
            0x6000_0003
        );
        assert_eq!(command_word(Command::SetState, McuState::Stopped as u32), CMD_SHIFT);
    }

    #[test]
    fn test_register_read_writes_command_first() {
        let mock = MockInstrument::new();
        mock.queue_spi_read([2]);
        let link = Stm32Link::new(mock.clone(), 0);

        assert_eq!(link.state().unwrap(), McuState::Locked);
        assert_eq!(mock.spi_writes(), vec![0x6000_0001]);
    }

    #[test]
    fn test_board_id_range() {
        for (id, ok) in [(0, false), (1, true), (16, true), (17, false)] {
            let mock = MockInstrument::new();
            mock.queue_spi_read([id]);
            let result = Stm32Link::new(mock, 0).check_board();
            assert_eq!(result.is_ok(), ok, "board id {}", id);
            if !ok {
                assert!(matches!(result, Err(BimmsError::BoardNotDetected { .. })));
            }
        }
    }

    #[test]
    fn test_spi_failure_is_communication_error() {
        let mock = MockInstrument::new();
        mock.fail_spi(true);
        let err = Stm32Link::new(mock, 0).set_relays(1).unwrap_err();
        assert!(matches!(err, BimmsError::Communication(_)));
    }

    #[test]
    fn test_init_configures_bus() {
        let mock = MockInstrument::new();
        let cfg = default_spi_config();
        Stm32Link::init(mock.clone(), &cfg).unwrap();
        assert_eq!(mock.spi_config(), Some(cfg));
    }
}
