//! Station settings loaded with Figment.
//!
//! Settings are read from:
//! 1. a TOML file (`bimms.toml` by default, missing file means defaults)
//! 2. environment variables prefixed with `BIMMS_`
//!
//! Nested keys are separated by a double underscore, so
//! `BIMMS_SPI__FREQUENCY_HZ=2000000` overrides `spi.frequency_hz`.
//!
//! # Example
//! ```no_run
//! use bimms::Settings;
//!
//! let settings = Settings::load()?;
//! settings.validate()?;
//! println!("Device: {}", settings.device.selector);
//! # Ok::<(), bimms::BimmsError>(())
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use daq_driver_dwf::{DeviceSelector, SpiConfig, SpiMode};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{BimmsError, Result};
use crate::gain::DioPins;
use crate::logging::{parse_log_level, OutputFormat};
use crate::protocol::default_spi_config;

/// Digital pins on the instrument connector.
const DIO_PINS: u8 = 16;

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: DeviceSettings,
    pub spi: SpiSettings,
    pub dio: DioPins,
    pub logging: LoggingSettings,
}

/// Which instrument to open and how long to wait on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// `first`, a device index, or a serial number
    pub selector: String,
    /// Acquisition timeout in milliseconds (0 = wait forever)
    pub acquisition_timeout_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            selector: "first".to_string(),
            acquisition_timeout_ms: default_acquisition_timeout(),
        }
    }
}

fn default_acquisition_timeout() -> u64 {
    10_000
}

impl DeviceSettings {
    pub fn selector(&self) -> Result<DeviceSelector> {
        Ok(self.selector.parse()?)
    }

    pub fn acquisition_timeout(&self) -> Option<Duration> {
        match self.acquisition_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// SPI link to the board microcontroller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiSettings {
    pub frequency_hz: f64,
    pub clock_pin: u8,
    pub mosi_pin: u8,
    pub miso_pin: u8,
    pub cs_pin: u8,
    /// CPOL/CPHA mode, 0 to 3
    pub mode: u8,
}

impl Default for SpiSettings {
    fn default() -> Self {
        let spi = default_spi_config();
        Self {
            frequency_hz: spi.frequency_hz,
            clock_pin: spi.clock_pin as u8,
            mosi_pin: spi.mosi_pin as u8,
            miso_pin: spi.miso_pin as u8,
            cs_pin: spi.cs_pin as u8,
            mode: 0,
        }
    }
}

impl SpiSettings {
    pub fn to_config(&self) -> Result<SpiConfig> {
        Ok(SpiConfig {
            frequency_hz: self.frequency_hz,
            clock_pin: i32::from(self.clock_pin),
            mosi_pin: i32::from(self.mosi_pin),
            miso_pin: i32::from(self.miso_pin),
            cs_pin: i32::from(self.cs_pin),
            mode: SpiMode::from_index(self.mode)?,
            msb_first: true,
        })
    }

    fn pins(&self) -> [u8; 4] {
        [self.clock_pin, self.mosi_pin, self.miso_pin, self.cs_pin]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error
    pub level: String,
    /// pretty, compact or json
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Settings {
    /// Load from `bimms.toml` in the working directory and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from("bimms.toml")
    }

    /// Load from a specific file and the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BIMMS_").split("__"))
    }

    /// Check pin assignments, timings and logging options.
    pub fn validate(&self) -> Result<()> {
        if !(self.spi.frequency_hz.is_finite() && self.spi.frequency_hz > 0.0) {
            return Err(BimmsError::Settings(format!(
                "Invalid SPI frequency {} Hz",
                self.spi.frequency_hz
            )));
        }
        if self.spi.mode > 3 {
            return Err(BimmsError::Settings(format!(
                "Invalid SPI mode {}. Must be 0-3",
                self.spi.mode
            )));
        }

        let mut seen = HashSet::new();
        for pin in self.spi.pins().into_iter().chain(self.dio.all()) {
            if pin >= DIO_PINS {
                return Err(BimmsError::Settings(format!(
                    "Pin {} out of range. Must be 0-{}",
                    pin,
                    DIO_PINS - 1
                )));
            }
            if !seen.insert(pin) {
                return Err(BimmsError::Settings(format!("Pin {} assigned twice", pin)));
            }
        }

        self.device.selector()?;
        parse_log_level(&self.logging.level).map_err(BimmsError::Settings)?;
        self.logging
            .format
            .parse::<OutputFormat>()
            .map_err(BimmsError::Settings)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.device.selector().unwrap(), DeviceSelector::FirstFree);
        assert_eq!(
            settings.device.acquisition_timeout(),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.spi, SpiSettings::default());
        assert_eq!(settings.dio, DioPins::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bimms.toml");
        fs::write(
            &path,
            r#"
[device]
selector = "SN:210321A1B2C3"
acquisition_timeout_ms = 0

[spi]
frequency_hz = 2e6

[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(
            settings.device.selector().unwrap(),
            DeviceSelector::Serial("SN:210321A1B2C3".to_string())
        );
        assert_eq!(settings.device.acquisition_timeout(), None);
        assert_eq!(settings.spi.frequency_hz, 2e6);
        assert_eq!(settings.spi.cs_pin, 0);
        assert_eq!(settings.logging.format, "json");
    }

    #[test]
    fn test_duplicate_pin_rejected() {
        let mut settings = Settings::default();
        settings.dio.led_status = settings.spi.cs_pin;
        assert!(matches!(settings.validate(), Err(BimmsError::Settings(_))));
    }

    #[test]
    fn test_pin_range() {
        let mut settings = Settings::default();
        settings.dio.io7 = 16;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.logging.level = "verbose".to_string();
        assert!(settings.validate().is_err());
        settings.logging.level = "warn".to_string();
        settings.logging.format = "xml".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_spi_config_conversion() {
        let mut settings = SpiSettings::default();
        assert_eq!(settings.to_config().unwrap(), default_spi_config());
        settings.mode = 4;
        assert!(settings.to_config().is_err());
    }
}
