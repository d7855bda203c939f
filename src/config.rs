//! Measurement mode configuration.
//!
//! A [`ModeConfig`] is a set of named axes, each with a domain and a
//! default. Values are validated on every write, persisted as flat TOML
//! (`name = value`), and translated into a typed [`BoardMode`] that the
//! sequencer turns into relay and gain settings.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BimmsError, Result};
use crate::gain::CHANNEL_GAINS;
use crate::relay::{AwgSource, Coupling, CurrentSourceGain, WireMode};

/// Value of one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl OptionValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn from_toml(value: &toml::Value) -> Option<Self> {
        match value {
            toml::Value::Boolean(b) => Some(Self::Bool(*b)),
            toml::Value::Integer(i) => Some(Self::Int(*i)),
            toml::Value::Float(f) => Some(Self::Float(*f)),
            toml::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Same value, allowing an integer to match a float and text to differ in case.
    fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.eq_ignore_ascii_case(b),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Admissible values of an axis.
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    /// One of a discrete set
    OneOf(Vec<OptionValue>),
    /// Inclusive numeric range
    Range { min: f64, max: f64 },
}

impl Domain {
    pub fn texts<const N: usize>(values: [&str; N]) -> Self {
        Self::OneOf(values.iter().map(|v| OptionValue::from(*v)).collect())
    }

    pub fn ints(values: impl IntoIterator<Item = i64>) -> Self {
        Self::OneOf(values.into_iter().map(OptionValue::Int).collect())
    }

    pub fn bools() -> Self {
        Self::OneOf(vec![OptionValue::Bool(false), OptionValue::Bool(true)])
    }

    pub fn range(min: f64, max: f64) -> Self {
        Self::Range { min, max }
    }

    /// Canonical form of `value` if it is admissible.
    fn admit(&self, name: &str, value: OptionValue) -> Result<OptionValue> {
        match self {
            Self::OneOf(values) => values
                .iter()
                .find(|candidate| candidate.matches(&value))
                .cloned()
                .ok_or_else(|| {
                    let allowed: Vec<String> = values.iter().map(ToString::to_string).collect();
                    BimmsError::invalid_value(
                        name,
                        format!("{} is not one of [{}]", value, allowed.join(", ")),
                    )
                }),
            Self::Range { min, max } => match value.as_f64() {
                Some(v) if v >= *min && v <= *max => Ok(OptionValue::Float(v)),
                Some(v) => Err(BimmsError::invalid_value(
                    name,
                    format!("{} is outside [{}, {}]", v, min, max),
                )),
                None => Err(BimmsError::invalid_value(
                    name,
                    format!("{} is not a number", value),
                )),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct ConfigOption {
    name: String,
    domain: Domain,
    default: OptionValue,
    value: OptionValue,
}

/// Named, validated measurement axes.
#[derive(Debug, Clone, Default)]
pub struct ModeConfig {
    options: Vec<ConfigOption>,
}

impl ModeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an axis. Registering an existing name replaces it.
    pub fn add_option(
        &mut self,
        name: &str,
        domain: Domain,
        default: impl Into<OptionValue>,
    ) -> Result<()> {
        let default = domain.admit(name, default.into())?;
        let option = ConfigOption {
            name: name.to_string(),
            domain,
            value: default.clone(),
            default,
        };
        match self.options.iter_mut().find(|o| o.name == name) {
            Some(existing) => *existing = option,
            None => self.options.push(option),
        }
        Ok(())
    }

    fn option(&self, name: &str) -> Result<&ConfigOption> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| BimmsError::UnknownOption(name.to_string()))
    }

    fn option_mut(&mut self, name: &str) -> Result<&mut ConfigOption> {
        self.options
            .iter_mut()
            .find(|o| o.name == name)
            .ok_or_else(|| BimmsError::UnknownOption(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<&OptionValue> {
        Ok(&self.option(name)?.value)
    }

    pub fn set(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<()> {
        let option = self.option_mut(name)?;
        let value = option.domain.admit(name, value.into())?;
        debug!(option = name, %value, "Mode option set");
        option.value = value;
        Ok(())
    }

    /// Restore every axis to its default.
    pub fn reset(&mut self) {
        for option in &mut self.options {
            option.value = option.default.clone();
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|o| o.name.as_str())
    }

    pub fn domain(&self, name: &str) -> Result<&Domain> {
        Ok(&self.option(name)?.domain)
    }

    /// Every axis and its current value.
    pub fn snapshot(&self) -> BTreeMap<String, OptionValue> {
        self.options
            .iter()
            .map(|o| (o.name.clone(), o.value.clone()))
            .collect()
    }

    pub fn get_f64(&self, name: &str) -> Result<f64> {
        let value = self.get(name)?;
        value
            .as_f64()
            .ok_or_else(|| BimmsError::invalid_value(name, format!("{} is not a number", value)))
    }

    pub fn get_str(&self, name: &str) -> Result<&str> {
        let value = self.get(name)?;
        value
            .as_str()
            .ok_or_else(|| BimmsError::invalid_value(name, format!("{} is not text", value)))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        let value = self.get(name)?;
        value
            .as_bool()
            .ok_or_else(|| BimmsError::invalid_value(name, format!("{} is not a boolean", value)))
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        let value = self.get(name)?;
        value
            .as_int()
            .ok_or_else(|| BimmsError::invalid_value(name, format!("{} is not an integer", value)))
    }

    /// Serialize every axis as `name = value` TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(&self.snapshot())?)
    }

    /// Replace every axis from TOML text.
    ///
    /// All keys are validated before anything is applied. Axes absent from
    /// the text return to their default.
    pub fn apply_toml(&mut self, text: &str) -> Result<()> {
        let table: toml::Table = toml::from_str(text)?;
        let mut staged = self.clone();
        staged.reset();
        for (name, raw) in &table {
            let value = OptionValue::from_toml(raw).ok_or_else(|| {
                BimmsError::invalid_value(name.as_str(), format!("unsupported value {}", raw))
            })?;
            staged.set(name, value)?;
        }
        *self = staged;
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_toml()?).map_err(|source| BimmsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Mode configuration saved");
        Ok(())
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| BimmsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.apply_toml(&text)?;
        info!(path = %path.display(), "Mode configuration loaded");
        Ok(())
    }

    /// Axes of the BIMMS board.
    pub fn bimms_default() -> Self {
        let mut config = Self::new();
        let gains = Domain::ints(CHANNEL_GAINS.iter().map(|g| i64::from(*g)));
        let axes: [(&str, Domain, OptionValue); 14] = [
            ("excitation_source", Domain::texts(["INTERNAL", "EXTERNAL"]), "INTERNAL".into()),
            ("excitation_mode", Domain::texts(["G_EIS", "P_EIS"]), "G_EIS".into()),
            ("wire_mode", Domain::texts(["2_WIRE", "4_WIRE"]), "2_WIRE".into()),
            ("excitation_coupling", Domain::texts(["AC", "DC"]), "DC".into()),
            ("dc_feedback", Domain::bools(), false.into()),
            ("ch1_coupling", Domain::texts(["AC", "DC"]), "DC".into()),
            ("ch2_coupling", Domain::texts(["AC", "DC"]), "DC".into()),
            ("current_source_gain", Domain::texts(["HIGH", "LOW"]), "HIGH".into()),
            ("ch1_gain", gains.clone(), 1i64.into()),
            ("ch2_gain", gains, 1i64.into()),
            ("v_amplitude", Domain::range(0.0, 2.5), OptionValue::Float(0.1)),
            ("i_amplitude", Domain::range(0.0, 0.01), OptionValue::Float(1e-4)),
            ("v_offset", Domain::range(-2.5, 2.5), OptionValue::Float(0.0)),
            ("current_conversion", Domain::range(1.0, 1e7), OptionValue::Float(1e3)),
        ];
        for (name, domain, default) in axes {
            config.options.push(ConfigOption {
                name: name.to_string(),
                domain,
                value: default.clone(),
                default,
            });
        }
        config
    }

    /// Typed view of the board axes.
    pub fn board_mode(&self) -> Result<BoardMode> {
        let coupling = |name: &str| -> Result<Coupling> {
            let text = self.get_str(name)?;
            text.parse()
                .map_err(|_| BimmsError::invalid_value(name, text))
        };
        let gain = |name: &str| -> Result<u32> {
            u32::try_from(self.get_int(name)?)
                .map_err(|e| BimmsError::invalid_value(name, e.to_string()))
        };
        Ok(BoardMode {
            excitation_source: match self.get_str("excitation_source")? {
                "INTERNAL" => AwgSource::Internal,
                "EXTERNAL" => AwgSource::External,
                other => return Err(BimmsError::invalid_value("excitation_source", other)),
            },
            excitation_mode: match self.get_str("excitation_mode")? {
                "G_EIS" => ExcitationMode::GEis,
                "P_EIS" => ExcitationMode::PEis,
                other => return Err(BimmsError::invalid_value("excitation_mode", other)),
            },
            wire_mode: self.get_str("wire_mode")?.parse()?,
            excitation_coupling: coupling("excitation_coupling")?,
            dc_feedback: self.get_bool("dc_feedback")?,
            ch1_coupling: coupling("ch1_coupling")?,
            ch2_coupling: coupling("ch2_coupling")?,
            current_source_gain: match self.get_str("current_source_gain")? {
                "HIGH" => CurrentSourceGain::High,
                "LOW" => CurrentSourceGain::Low,
                other => return Err(BimmsError::invalid_value("current_source_gain", other)),
            },
            ch1_gain: gain("ch1_gain")?,
            ch2_gain: gain("ch2_gain")?,
            v_amplitude: self.get_f64("v_amplitude")?,
            i_amplitude: self.get_f64("i_amplitude")?,
            v_offset: self.get_f64("v_offset")?,
            current_conversion: self.get_f64("current_conversion")?,
        })
    }
}

/// Galvanostatic or potentiostatic excitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExcitationMode {
    /// Current-driven
    GEis,
    /// Voltage-driven
    PEis,
}

/// Board axes of a [`ModeConfig`], typed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardMode {
    pub excitation_source: AwgSource,
    pub excitation_mode: ExcitationMode,
    pub wire_mode: WireMode,
    pub excitation_coupling: Coupling,
    pub dc_feedback: bool,
    pub ch1_coupling: Coupling,
    pub ch2_coupling: Coupling,
    pub current_source_gain: CurrentSourceGain,
    pub ch1_gain: u32,
    pub ch2_gain: u32,
    pub v_amplitude: f64,
    pub i_amplitude: f64,
    pub v_offset: f64,
    pub current_conversion: f64,
}
