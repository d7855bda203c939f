//! # BIMMS measurement library
//!
//! Bio-impedance measurements on the BIMMS board driven by a Digilent
//! Analog Discovery 2. The instrument itself is reached through
//! [`daq_driver_dwf`]; this crate adds the board on top of it.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: SPI command words and registers of the board
//!   microcontroller.
//! - **`relay`**: Relay bitfield and the write-through [`RelayController`]
//!   that only talks to the board when the bitfield changes.
//! - **`gain`**: Amplifier gain pins and LEDs on the instrument DIO.
//! - **`config`**: Named measurement-mode options with validated domains,
//!   persisted as TOML.
//! - **`sequencer`**: Time-domain, frequency-sweep and DC-offset
//!   measurements.
//! - **`results`**: Measurement outputs and their conversions.
//! - **`settings`**: Station settings (device, pins, logging) loaded with
//!   Figment.
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`error`**: The [`BimmsError`] enum.
//!
//! ## Example
//!
//! ```no_run
//! use bimms::{logging, Bimms, Measure, Settings, SweepRequest};
//!
//! # fn main() -> bimms::Result<()> {
//! let settings = Settings::load()?;
//! logging::init_from_settings(&settings)?;
//!
//! let mut bimms = Bimms::connect(&settings)?;
//! bimms.config_mut().set("excitation_mode", "P_EIS")?;
//! let result = bimms.measure(Measure::FrequencySweep(SweepRequest::new(1e3, 1e6)))?;
//! println!("{:?}", result.metadata().relays);
//! bimms.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gain;
pub mod logging;
pub mod protocol;
pub mod relay;
pub mod results;
pub mod sequencer;
pub mod settings;

pub use config::{BoardMode, Domain, ExcitationMode, ModeConfig, OptionValue};
pub use error::{BimmsError, Result};
pub use gain::{DioPins, GainControl};
pub use protocol::{McuState, Stm32Link};
pub use relay::{RelayController, Relays};
pub use results::{BodeResult, DcOffsetResult, GainPhase, Measurement, MeasurementResult, Metadata};
pub use sequencer::{
    Bimms, DcOffsetRequest, Measure, MeasurementSequencer, SweepRequest, TimeDomainRequest,
};
pub use settings::Settings;
