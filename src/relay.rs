//! Relay bitfield and the controller that pushes it to the board.
//!
//! Wiring operations only mutate the requested bitfield. Nothing reaches
//! the hardware until [`RelayController::send_config`], which writes one
//! `SetRelays` word when the bitfield differs from the last one sent.
//!
//! Two relays have inverted polarity and are handled as named special
//! cases in their operations: [`Relays::TIA2CHAN2`] and
//! [`Relays::EN_CURRENT_SOURCE`].

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use daq_driver_dwf::hal::SpiBus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OptionValue;
use crate::error::{BimmsError, Result};
use crate::protocol::{McuState, Stm32Link};

bitflags! {
    /// The 23 board relays at their fixed bit positions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Relays: u32 {
        const CH1_COUPLING = 1 << 0;
        const CHAN1_SCOPE1 = 1 << 1;
        const CH2_COUPLING = 1 << 2;
        const CHAN2_SCOPE2 = 1 << 3;
        const DC_FEEDBACK = 1 << 4;
        const INTERNAL_AWG = 1 << 5;
        const TIA_NEG_IN1 = 1 << 6;
        const TIA_NEG_IN2 = 1 << 7;
        const TIA2CHAN2 = 1 << 8;
        const TIA_COUPLING = 1 << 9;
        const EN_POTENTIOSTAT = 1 << 10;
        const EN_CURRENT_SOURCE = 1 << 11;
        const GAIN_CURRENT_SOURCE = 1 << 12;
        const POTENTIOSTAT2STIM_POS = 1 << 13;
        const IPOS2STIM_POS = 1 << 14;
        const VOUTPOS2STIM_POS = 1 << 15;
        const INEG2STIM_NEG = 1 << 16;
        const VOUTNEG2STIM_NEG = 1 << 17;
        const TIA2STIM_NEG = 1 << 18;
        const GND2STIM_NEG = 1 << 19;
        const STIM_COUPLING = 1 << 20;
        const STIM_NEG2VNEG = 1 << 21;
        const STIM_POS2VPOS = 1 << 22;
    }
}

impl Relays {
    const STIM_POS: Self = Self::POTENTIOSTAT2STIM_POS
        .union(Self::IPOS2STIM_POS)
        .union(Self::VOUTPOS2STIM_POS);

    const STIM_NEG: Self = Self::INEG2STIM_NEG
        .union(Self::VOUTNEG2STIM_NEG)
        .union(Self::TIA2STIM_NEG)
        .union(Self::GND2STIM_NEG);

    /// Look up a single relay by name.
    ///
    /// Case and underscores are ignored, so `ch1_coupling`, `CH1_COUPLING`
    /// and `Ch1Coupling` name the same relay. The coupling relays also
    /// answer to `coupling_ch1`, `coupling_ch2`, `coupling_tia` and
    /// `coupling_stim`.
    pub fn by_name(name: &str) -> Option<Self> {
        let wanted = normalize(name);
        if let Some((_, relay)) = COUPLING_ALIASES.iter().find(|(alias, _)| *alias == wanted) {
            return Some(*relay);
        }
        Self::all()
            .iter_names()
            .find(|(flag_name, _)| normalize(flag_name) == wanted)
            .map(|(_, flag)| flag)
    }

    /// Coupling that closes this relay, for the four coupling relays.
    fn closing_coupling(self) -> Option<Coupling> {
        let ac_closed = [Self::CH1_COUPLING, Self::CH2_COUPLING, Self::TIA_COUPLING];
        if self == Self::STIM_COUPLING {
            Some(Coupling::Dc)
        } else if ac_closed.contains(&self) {
            Some(Coupling::Ac)
        } else {
            None
        }
    }
}

/// Normalised alternate names of the coupling relays.
const COUPLING_ALIASES: [(&str, Relays); 4] = [
    ("couplingch1", Relays::CH1_COUPLING),
    ("couplingch2", Relays::CH2_COUPLING),
    ("couplingtia", Relays::TIA_COUPLING),
    ("couplingstim", Relays::STIM_COUPLING),
];

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for Relays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#08x}", self.bits())
    }
}

/// Scope channel of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Ch1,
    Ch2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Coupling {
    Ac,
    Dc,
}

impl FromStr for Coupling {
    type Err = BimmsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AC" => Ok(Self::Ac),
            "DC" => Ok(Self::Dc),
            _ => Err(BimmsError::invalid_value("coupling", s)),
        }
    }
}

/// What drives the positive stimulation electrode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StimPos {
    Vpos,
    Ipos,
    Potentiostat,
    Disconnected,
}

/// What drives the negative stimulation electrode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StimNeg {
    Ineg,
    Vneg,
    Tia,
    Gnd,
    Disconnected,
}

/// Negative input of the trans-impedance amplifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiaNegInput {
    Gnd,
    Vneg,
    Ineg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrentSourceGain {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AwgSource {
    Internal,
    External,
}

/// Electrode wiring of the stimulus and recording paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    TwoWire,
    ThreeWire,
    FourWire,
}

impl FromStr for WireMode {
    type Err = BimmsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "2_WIRE" | "2" => Ok(Self::TwoWire),
            "3_WIRE" | "3" => Ok(Self::ThreeWire),
            "4_WIRE" | "4" => Ok(Self::FourWire),
            _ => Err(BimmsError::invalid_value("wire_mode", s)),
        }
    }
}

/// Requested relay state plus the write-through cache of what the board holds.
#[derive(Debug)]
pub struct RelayController<S> {
    link: Stm32Link<S>,
    requested: Relays,
    last_sent: Relays,
}

impl<S: SpiBus> RelayController<S> {
    /// The board powers up with every relay released.
    pub fn new(link: Stm32Link<S>) -> Self {
        Self {
            link,
            requested: Relays::empty(),
            last_sent: Relays::empty(),
        }
    }

    pub fn link(&self) -> &Stm32Link<S> {
        &self.link
    }

    /// Bitfield that the next [`send_config`](Self::send_config) would write.
    pub fn requested(&self) -> Relays {
        self.requested
    }

    /// Bitfield last written to the board.
    pub fn last_sent(&self) -> Relays {
        self.last_sent
    }

    pub fn is_set(&self, relay: Relays) -> bool {
        self.requested.contains(relay)
    }

    /// Set or clear one or more relays. No I/O.
    pub fn set(&mut self, relay: Relays, value: bool) {
        self.requested.set(relay, value);
    }

    /// Set a switch by name. No I/O.
    ///
    /// Relays take a boolean. The coupling relays also take `"AC"` or
    /// `"DC"`, and `wire_mode` takes a [`WireMode`] name.
    pub fn set_switch(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<()> {
        let value = value.into();
        if normalize(name) == "wiremode" {
            let mode = value
                .as_str()
                .ok_or_else(|| BimmsError::invalid_value(name, value.to_string()))?
                .parse()?;
            return self.set_wire_mode(mode);
        }

        let relay =
            Relays::by_name(name).ok_or_else(|| BimmsError::UnknownSwitch(name.to_string()))?;
        let closed = match &value {
            OptionValue::Bool(closed) => *closed,
            OptionValue::Text(text) => {
                let closing = relay.closing_coupling().ok_or_else(|| {
                    BimmsError::invalid_value(name, format!("{text} on a boolean switch"))
                })?;
                text.parse::<Coupling>()
                    .map_err(|_| BimmsError::invalid_value(name, text.as_str()))?
                    == closing
            }
            other => return Err(BimmsError::invalid_value(name, other.to_string())),
        };
        self.set(relay, closed);
        debug!(target: "bimms::hardware", switch = name, %value, "Switch set");
        Ok(())
    }

    /// Write the requested bitfield if it differs from the cached one.
    ///
    /// Returns whether a transaction was issued. On SPI failure the cache
    /// keeps its previous value.
    pub fn send_config(&mut self) -> Result<bool> {
        if self.requested == self.last_sent {
            return Ok(false);
        }
        self.link.set_relays(self.requested.bits())?;
        self.last_sent = self.requested;
        debug!(target: "bimms::hardware", relays = %self.requested, "Relay configuration sent");
        Ok(true)
    }

    /// Write the requested bitfield unconditionally.
    pub fn force_send(&mut self) -> Result<()> {
        self.link.set_relays(self.requested.bits())?;
        self.last_sent = self.requested;
        debug!(target: "bimms::hardware", relays = %self.requested, "Relay configuration resent");
        Ok(())
    }

    /// Relay map applied by the board, read from its register.
    pub fn read_back(&self) -> Result<Relays> {
        Ok(Relays::from_bits_retain(self.link.relay_map()?))
    }

    /// Put the microcontroller in its stopped state.
    pub fn stop_board(&self) -> Result<()> {
        self.link.set_state(McuState::Stopped)
    }

    // --- wiring operations ---

    pub fn connect_scope(&mut self, channel: Channel, connected: bool) {
        let relay = match channel {
            Channel::Ch1 => Relays::CHAN1_SCOPE1,
            Channel::Ch2 => Relays::CHAN2_SCOPE2,
        };
        self.set(relay, connected);
        debug!(target: "bimms::hardware", ?channel, connected, "Scope connection");
    }

    pub fn set_channel_coupling(&mut self, channel: Channel, coupling: Coupling) {
        let relay = match channel {
            Channel::Ch1 => Relays::CH1_COUPLING,
            Channel::Ch2 => Relays::CH2_COUPLING,
        };
        self.set(relay, coupling == Coupling::Ac);
        debug!(target: "bimms::hardware", ?channel, ?coupling, "Channel coupling");
    }

    pub fn route_stim_pos(&mut self, source: StimPos) {
        self.requested.remove(Relays::STIM_POS);
        match source {
            StimPos::Vpos => self.requested.insert(Relays::VOUTPOS2STIM_POS),
            StimPos::Ipos => self.requested.insert(Relays::IPOS2STIM_POS),
            StimPos::Potentiostat => self.requested.insert(Relays::POTENTIOSTAT2STIM_POS),
            StimPos::Disconnected => {}
        }
        debug!(target: "bimms::hardware", ?source, "StimPos routed");
    }

    pub fn route_stim_neg(&mut self, source: StimNeg) {
        self.requested.remove(Relays::STIM_NEG);
        match source {
            StimNeg::Ineg => self.requested.insert(Relays::INEG2STIM_NEG),
            StimNeg::Vneg => self.requested.insert(Relays::VOUTNEG2STIM_NEG),
            StimNeg::Tia => self.requested.insert(Relays::TIA2STIM_NEG),
            StimNeg::Gnd => self.requested.insert(Relays::GND2STIM_NEG),
            StimNeg::Disconnected => {}
        }
        debug!(target: "bimms::hardware", ?source, "StimNeg routed");
    }

    pub fn set_dc_feedback(&mut self, enabled: bool) {
        self.set(Relays::DC_FEEDBACK, enabled);
        debug!(target: "bimms::hardware", enabled, "DC feedback");
    }

    /// Internal AWG is the released state.
    pub fn select_awg(&mut self, source: AwgSource) {
        self.set(Relays::INTERNAL_AWG, source == AwgSource::External);
        debug!(target: "bimms::hardware", ?source, "AWG source");
    }

    /// Connecting the TIA output to channel 2 clears the relay bit.
    ///
    /// Board wiring bug: the relay is closed when its control bit is low.
    pub fn connect_tia_to_ch2(&mut self, connected: bool) {
        self.set(Relays::TIA2CHAN2, !connected);
        debug!(target: "bimms::hardware", connected, "TIA to CH2");
    }

    pub fn set_tia_neg_input(&mut self, input: TiaNegInput) {
        let (in1, in2) = match input {
            TiaNegInput::Gnd => (false, false),
            TiaNegInput::Vneg => (true, false),
            TiaNegInput::Ineg => (true, true),
        };
        self.set(Relays::TIA_NEG_IN1, in1);
        self.set(Relays::TIA_NEG_IN2, in2);
        debug!(target: "bimms::hardware", ?input, "TIA negative input");
    }

    pub fn set_tia_coupling(&mut self, coupling: Coupling) {
        self.set(Relays::TIA_COUPLING, coupling == Coupling::Ac);
        debug!(target: "bimms::hardware", ?coupling, "TIA coupling");
    }

    pub fn enable_potentiostat(&mut self, enabled: bool) {
        self.set(Relays::EN_POTENTIOSTAT, enabled);
        debug!(target: "bimms::hardware", enabled, "Potentiostat");
    }

    /// The current source enable is active low.
    pub fn enable_current_source(&mut self, enabled: bool) {
        self.set(Relays::EN_CURRENT_SOURCE, !enabled);
        debug!(target: "bimms::hardware", enabled, "Current source");
    }

    /// Low gain sets the relay bit.
    pub fn set_current_source_gain(&mut self, gain: CurrentSourceGain) {
        self.set(Relays::GAIN_CURRENT_SOURCE, gain == CurrentSourceGain::Low);
        debug!(target: "bimms::hardware", ?gain, "Current source gain");
    }

    /// DC coupling sets the relay bit.
    pub fn set_stim_coupling(&mut self, coupling: Coupling) {
        self.set(Relays::STIM_COUPLING, coupling == Coupling::Dc);
        debug!(target: "bimms::hardware", ?coupling, "Stimulus coupling");
    }

    pub fn set_wire_mode(&mut self, mode: WireMode) -> Result<()> {
        let two_wire = match mode {
            WireMode::TwoWire => true,
            WireMode::FourWire => false,
            WireMode::ThreeWire => {
                return Err(BimmsError::NotSupported(
                    "3-wire mode is not available on this board".to_string(),
                ))
            }
        };
        self.set(Relays::STIM_NEG2VNEG, two_wire);
        self.set(Relays::STIM_POS2VPOS, two_wire);
        debug!(target: "bimms::hardware", ?mode, "Wire mode");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_driver_dwf::mock::MockInstrument;

    fn controller() -> (MockInstrument, RelayController<MockInstrument>) {
        let mock = MockInstrument::new();
        let relays = RelayController::new(Stm32Link::new(mock.clone(), 0));
        (mock, relays)
    }

    const SET_RELAYS: u32 = 2 << 29;

    #[test]
    fn test_bit_positions() {
        assert_eq!(Relays::CH1_COUPLING.bits(), 1);
        assert_eq!(Relays::STIM_POS2VPOS.bits(), 1 << 22);
        assert_eq!(Relays::all().bits(), (1 << 23) - 1);
        assert_eq!(Relays::all().iter().count(), 23);
    }

    #[test]
    fn test_name_lookup() {
        assert_eq!(Relays::by_name("ch1_coupling"), Some(Relays::CH1_COUPLING));
        assert_eq!(Relays::by_name("Ch1Coupling"), Some(Relays::CH1_COUPLING));
        assert_eq!(Relays::by_name("TIA2Chan2"), Some(Relays::TIA2CHAN2));
        assert_eq!(Relays::by_name("StimPos2VPos"), Some(Relays::STIM_POS2VPOS));
        assert_eq!(Relays::by_name("coupling_ch1"), Some(Relays::CH1_COUPLING));
        assert_eq!(Relays::by_name("COUPLING_STIM"), Some(Relays::STIM_COUPLING));
        assert_eq!(Relays::by_name("not_a_relay"), None);
    }

    #[test]
    fn test_set_switch_is_local() {
        let (mock, mut relays) = controller();
        relays.set_switch("ch1_coupling", true).unwrap();
        assert!(relays.is_set(Relays::CH1_COUPLING));
        assert!(mock.spi_writes().is_empty());
    }

    #[test]
    fn test_unknown_switch() {
        let (_, mut relays) = controller();
        let err = relays.set_switch("flux_capacitor", true).unwrap_err();
        assert!(matches!(err, BimmsError::UnknownSwitch(name) if name == "flux_capacitor"));
    }

    #[test]
    fn test_send_config_writes_once_per_bitfield() {
        let (mock, mut relays) = controller();
        relays.set_switch("ch1_coupling", true).unwrap();
        assert!(relays.send_config().unwrap());
        assert!(!relays.send_config().unwrap());
        assert_eq!(mock.spi_writes(), vec![SET_RELAYS | 1]);
        assert_eq!(relays.last_sent(), Relays::CH1_COUPLING);
    }

    #[test]
    fn test_coupling_switch_by_value() {
        let (mock, mut relays) = controller();
        relays.set_switch("coupling_ch1", "AC").unwrap();
        assert!(relays.send_config().unwrap());
        assert!(!relays.send_config().unwrap());
        assert_eq!(mock.spi_writes(), vec![SET_RELAYS | 1]);

        relays.set_switch("coupling_ch1", "dc").unwrap();
        assert!(!relays.is_set(Relays::CH1_COUPLING));
    }

    #[test]
    fn test_stim_coupling_switch_is_inverted() {
        let (_, mut relays) = controller();
        relays.set_switch("coupling_stim", "DC").unwrap();
        relays.set_switch("coupling_tia", "AC").unwrap();
        assert_eq!(
            relays.requested(),
            Relays::STIM_COUPLING | Relays::TIA_COUPLING
        );
        relays.set_switch("stim_coupling", "AC").unwrap();
        assert_eq!(relays.requested(), Relays::TIA_COUPLING);
    }

    #[test]
    fn test_switch_value_must_fit_relay() {
        let (_, mut relays) = controller();
        assert!(matches!(
            relays.set_switch("dc_feedback", "AC"),
            Err(BimmsError::InvalidConfigValue { .. })
        ));
        assert!(matches!(
            relays.set_switch("ch2_coupling", "GND"),
            Err(BimmsError::InvalidConfigValue { .. })
        ));
        assert!(matches!(
            relays.set_switch("ch2_coupling", 1.5),
            Err(BimmsError::InvalidConfigValue { .. })
        ));
        assert!(relays.requested().is_empty());
    }

    #[test]
    fn test_wire_mode_switch() {
        let (_, mut relays) = controller();
        relays.set_switch("wire_mode", "2_WIRE").unwrap();
        assert!(relays.is_set(Relays::STIM_NEG2VNEG | Relays::STIM_POS2VPOS));
        relays.set_switch("WIRE_MODE", "4_WIRE").unwrap();
        assert!(relays.requested().is_empty());
        assert!(matches!(
            relays.set_switch("wire_mode", "3_WIRE"),
            Err(BimmsError::NotSupported(_))
        ));
    }

    #[test]
    fn test_power_on_state_needs_no_write() {
        let (mock, mut relays) = controller();
        assert!(!relays.send_config().unwrap());
        assert!(mock.spi_writes().is_empty());
    }

    #[test]
    fn test_failed_send_keeps_cache() {
        let (mock, mut relays) = controller();
        relays.set(Relays::DC_FEEDBACK, true);
        mock.fail_spi(true);
        assert!(matches!(
            relays.send_config(),
            Err(BimmsError::Communication(_))
        ));
        assert_eq!(relays.last_sent(), Relays::empty());

        mock.fail_spi(false);
        assert!(relays.send_config().unwrap());
        assert_eq!(mock.spi_writes(), vec![SET_RELAYS | Relays::DC_FEEDBACK.bits()]);
    }

    #[test]
    fn test_force_send_repeats() {
        let (mock, mut relays) = controller();
        relays.force_send().unwrap();
        relays.force_send().unwrap();
        assert_eq!(mock.spi_writes(), vec![SET_RELAYS, SET_RELAYS]);
    }

    #[test]
    fn test_stim_routing_is_exclusive() {
        let (_, mut relays) = controller();
        relays.route_stim_pos(StimPos::Vpos);
        relays.route_stim_pos(StimPos::Ipos);
        assert_eq!(relays.requested(), Relays::IPOS2STIM_POS);

        relays.route_stim_neg(StimNeg::Tia);
        relays.route_stim_neg(StimNeg::Gnd);
        relays.route_stim_pos(StimPos::Disconnected);
        assert_eq!(relays.requested(), Relays::GND2STIM_NEG);
    }

    #[test]
    fn test_inverted_relays() {
        let (_, mut relays) = controller();
        relays.connect_tia_to_ch2(true);
        relays.enable_current_source(true);
        assert!(!relays.is_set(Relays::TIA2CHAN2));
        assert!(!relays.is_set(Relays::EN_CURRENT_SOURCE));

        relays.connect_tia_to_ch2(false);
        relays.enable_current_source(false);
        assert!(relays.is_set(Relays::TIA2CHAN2));
        assert!(relays.is_set(Relays::EN_CURRENT_SOURCE));
    }

    #[test]
    fn test_tia_neg_input() {
        let (_, mut relays) = controller();
        relays.set_tia_neg_input(TiaNegInput::Ineg);
        assert_eq!(
            relays.requested(),
            Relays::TIA_NEG_IN1 | Relays::TIA_NEG_IN2
        );
        relays.set_tia_neg_input(TiaNegInput::Vneg);
        assert_eq!(relays.requested(), Relays::TIA_NEG_IN1);
        relays.set_tia_neg_input(TiaNegInput::Gnd);
        assert!(relays.requested().is_empty());
    }

    #[test]
    fn test_wire_modes() {
        let (_, mut relays) = controller();
        relays.set_wire_mode(WireMode::TwoWire).unwrap();
        assert_eq!(
            relays.requested(),
            Relays::STIM_NEG2VNEG | Relays::STIM_POS2VPOS
        );
        relays.set_wire_mode(WireMode::FourWire).unwrap();
        assert!(relays.requested().is_empty());
        assert!(matches!(
            relays.set_wire_mode(WireMode::ThreeWire),
            Err(BimmsError::NotSupported(_))
        ));
    }

    #[test]
    fn test_coupling_polarity() {
        let (_, mut relays) = controller();
        relays.set_channel_coupling(Channel::Ch2, Coupling::Ac);
        relays.set_stim_coupling(Coupling::Dc);
        relays.set_current_source_gain(CurrentSourceGain::Low);
        relays.select_awg(AwgSource::External);
        assert_eq!(
            relays.requested(),
            Relays::CH2_COUPLING
                | Relays::STIM_COUPLING
                | Relays::GAIN_CURRENT_SOURCE
                | Relays::INTERNAL_AWG
        );
    }

    #[test]
    fn test_read_back() {
        let (mock, relays) = controller();
        mock.queue_spi_read([0b1010]);
        assert_eq!(
            relays.read_back().unwrap(),
            Relays::CHAN1_SCOPE1 | Relays::CHAN2_SCOPE2
        );
        assert_eq!(mock.spi_writes(), vec![(3 << 29) | 3]);
    }

    #[test]
    fn test_wire_mode_parse() {
        assert_eq!("2_wire".parse::<WireMode>().unwrap(), WireMode::TwoWire);
        assert_eq!("4_WIRE".parse::<WireMode>().unwrap(), WireMode::FourWire);
        assert!("5_WIRE".parse::<WireMode>().is_err());
        assert_eq!("ac".parse::<Coupling>().unwrap(), Coupling::Ac);
        assert!("GND".parse::<Coupling>().is_err());
    }
}
