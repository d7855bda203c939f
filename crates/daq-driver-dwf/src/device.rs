//! Core device abstraction for WaveForms instruments.
//!
//! This module provides the main [`DwfDevice`] type which wraps an SDK
//! device handle with RAII semantics, device enumeration, and accessors
//! for the instrument's subsystems.

use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dwf_sys::HDWF;

use crate::error::{check, DwfError, Result};
use crate::subsystem::analog_in::{AnalogIn, InputLimits};
use crate::subsystem::analog_out::AnalogOut;
use crate::subsystem::digital_io::DigitalIo;
use crate::subsystem::impedance::ImpedanceAnalyzer;
use crate::subsystem::spi::Spi;

/// Call an `FDwf*` function on a device's handle, serialised through its
/// FFI lock, and turn a failure into [`DwfError::Sdk`].
///
/// ```ignore
/// dwf_call!(self.device, FDwfAnalogInFrequencySet(hz))?;
/// ```
macro_rules! dwf_call {
    ($device:expr, $func:ident($($arg:expr),* $(,)?)) => {
        $device.call(stringify!($func), |hdwf| unsafe { dwf_sys::$func(hdwf $(, $arg)*) })
    };
}
pub(crate) use dwf_call;

/// A device as seen by enumeration, before it is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratedDevice {
    /// Enumeration index
    pub index: i32,
    /// Device name (e.g., "Analog Discovery 2")
    pub name: String,
    /// Serial number (e.g., "SN:210321A1B2C3")
    pub serial: String,
    /// Whether another process has the device open
    pub in_use: bool,
}

/// How to pick the device to open.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelector {
    /// First device nobody else has opened
    #[default]
    FirstFree,
    /// Enumeration index
    Index(i32),
    /// Serial number, matched on its last 6 characters
    Serial(String),
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstFree => write!(f, "first free device"),
            Self::Index(i) => write!(f, "device index {}", i),
            Self::Serial(s) => write!(f, "serial number {}", s),
        }
    }
}

impl FromStr for DeviceSelector {
    type Err = DwfError;

    /// `""`, `"first"` or `"auto"` select the first free device, a plain
    /// integer selects by index, anything else is a serial number.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("first") || s.eq_ignore_ascii_case("auto") {
            return Ok(Self::FirstFree);
        }
        if let Ok(index) = s.parse::<i32>() {
            if index < 0 {
                return Err(DwfError::InvalidConfig {
                    message: format!("Device index must be positive, got {}", index),
                });
            }
            return Ok(Self::Index(index));
        }
        Ok(Self::Serial(s.to_string()))
    }
}

fn serial_suffix(serial: &str) -> &str {
    let n = serial.chars().count();
    match serial.char_indices().nth(n.saturating_sub(6)) {
        Some((i, _)) => &serial[i..],
        None => serial,
    }
}

/// Pick a device out of an enumeration.
///
/// Returns the position in `devices` of the device to open.
pub fn select_device(devices: &[EnumeratedDevice], selector: &DeviceSelector) -> Result<usize> {
    let not_found = || DwfError::DeviceNotFound {
        selector: selector.to_string(),
    };

    let pos = match selector {
        DeviceSelector::FirstFree => {
            if devices.is_empty() {
                return Err(not_found());
            }
            match devices.iter().position(|d| !d.in_use) {
                Some(pos) => pos,
                None => {
                    // every device is taken; report the first one
                    let d = &devices[0];
                    return Err(DwfError::DeviceBusy {
                        index: d.index,
                        serial: d.serial.clone(),
                    });
                }
            }
        }
        DeviceSelector::Index(index) => devices
            .iter()
            .position(|d| d.index == *index)
            .ok_or_else(not_found)?,
        DeviceSelector::Serial(serial) => {
            let wanted = serial_suffix(serial);
            devices
                .iter()
                .position(|d| serial_suffix(&d.serial).eq_ignore_ascii_case(wanted))
                .ok_or_else(not_found)?
        }
    };

    let device = &devices[pos];
    if device.in_use {
        return Err(DwfError::DeviceBusy {
            index: device.index,
            serial: device.serial.clone(),
        });
    }
    Ok(pos)
}

/// Enumerate connected devices.
pub fn enumerate() -> Result<Vec<EnumeratedDevice>> {
    let mut count: c_int = 0;
    // SAFETY: count is a valid out-pointer
    check(
        unsafe { dwf_sys::FDwfEnum(dwf_sys::enumfilterAll, &mut count) },
        "FDwfEnum",
    )?;

    let mut devices = Vec::with_capacity(count.max(0) as usize);
    for index in 0..count {
        let mut name = [0 as c_char; dwf_sys::DWF_ENUM_STR_LEN];
        let mut serial = [0 as c_char; dwf_sys::DWF_ENUM_STR_LEN];
        let mut in_use: c_int = 0;

        // SAFETY: buffers have the size the SDK writes into
        unsafe {
            check(
                dwf_sys::FDwfEnumDeviceName(index, name.as_mut_ptr()),
                "FDwfEnumDeviceName",
            )?;
            check(dwf_sys::FDwfEnumSN(index, serial.as_mut_ptr()), "FDwfEnumSN")?;
            check(
                dwf_sys::FDwfEnumDeviceIsOpened(index, &mut in_use),
                "FDwfEnumDeviceIsOpened",
            )?;

            devices.push(EnumeratedDevice {
                index,
                name: CStr::from_ptr(name.as_ptr()).to_string_lossy().into_owned(),
                serial: CStr::from_ptr(serial.as_ptr())
                    .to_string_lossy()
                    .into_owned(),
                in_use: in_use != 0,
            });
        }
    }

    debug!(count = devices.len(), "Enumerated WaveForms devices");
    Ok(devices)
}

/// Auto-configuration policy: whether parameter changes are pushed to the
/// device immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoConfigure {
    Disabled = 0,
    Enabled = 1,
    Dynamic = 3,
}

/// Information about an open device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Enumeration index the device was opened from
    pub index: i32,
    pub name: String,
    pub serial: String,
    /// Number of scope channels
    pub analog_in_channels: i32,
    /// Number of generator channels
    pub analog_out_channels: i32,
    /// Scope limits
    pub input: InputLimits,
}

/// Internal state shared between device and subsystems.
pub(crate) struct DeviceInner {
    handle: HDWF,
    enumerated: EnumeratedDevice,
    /// Cached device info.
    info: RwLock<Option<DeviceInfo>>,
    /// Set while the scope trigger listens to an analog channel.
    pub(crate) analog_trigger: AtomicBool,
    /// Mutex to serialize FFI calls to the handle.
    /// The SDK handle is NOT reentrant - all FFI calls must be serialized.
    ffi_lock: parking_lot::Mutex<()>,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        debug!(serial = %self.enumerated.serial, "Closing WaveForms device");
        let _guard = self.ffi_lock.lock();
        // SAFETY: handle is valid and we own it
        unsafe {
            if dwf_sys::FDwfDeviceClose(self.handle) == 0 {
                warn!(serial = %self.enumerated.serial, "Error closing WaveForms device");
            }
        }
    }
}

/// A safe wrapper around a WaveForms device handle.
///
/// This type provides RAII semantics: the device is automatically closed
/// when the last `DwfDevice` clone is dropped. It can be cloned to share the
/// handle between subsystem accessors.
///
/// # Thread Safety
///
/// `DwfDevice` is `Send` and `Sync`; every SDK call goes through a
/// per-handle mutex. Only one acquisition may be in flight per handle, so
/// measurement sequences should still be driven from a single owner.
#[derive(Clone)]
pub struct DwfDevice {
    inner: Arc<DeviceInner>,
}

impl fmt::Debug for DwfDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DwfDevice")
            .field("handle", &self.inner.handle)
            .field("serial", &self.inner.enumerated.serial)
            .finish()
    }
}

impl DwfDevice {
    /// Open a device.
    ///
    /// # Errors
    ///
    /// [`DwfError::DeviceNotFound`] if no connected device matches the
    /// selector, [`DwfError::DeviceBusy`] if the match is already open.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use daq_driver_dwf::{DeviceSelector, DwfDevice};
    ///
    /// let device = DwfDevice::open(&DeviceSelector::Serial("A1B2C3".into()))?;
    /// # Ok::<(), daq_driver_dwf::DwfError>(())
    /// ```
    pub fn open(selector: &DeviceSelector) -> Result<Self> {
        let devices = enumerate()?;
        let pos = select_device(&devices, selector)?;
        let enumerated = devices[pos].clone();

        let mut handle: HDWF = dwf_sys::hdwfNone;
        // SAFETY: handle is a valid out-pointer
        check(
            unsafe { dwf_sys::FDwfDeviceOpen(enumerated.index, &mut handle) },
            "FDwfDeviceOpen",
        )?;
        if handle == dwf_sys::hdwfNone {
            return Err(DwfError::DeviceNotFound {
                selector: selector.to_string(),
            });
        }

        info!(
            index = enumerated.index,
            name = %enumerated.name,
            serial = %enumerated.serial,
            "Opened WaveForms device"
        );

        let device = Self {
            inner: Arc::new(DeviceInner {
                handle,
                enumerated,
                info: RwLock::new(None),
                analog_trigger: AtomicBool::new(false),
                ffi_lock: parking_lot::Mutex::new(()),
            }),
        };

        // scope defaults: average filter and 5 V range on every channel
        let ai = device.analog_in();
        ai.set_filter(-1, crate::subsystem::analog_in::InputFilter::Average)?;
        ai.set_range(-1, 5.0)?;

        Ok(device)
    }

    /// Execute an SDK call with exclusive access to the device handle.
    ///
    /// The SDK's last-error buffer is read before the lock is released.
    pub(crate) fn call<F>(&self, function: &'static str, f: F) -> Result<()>
    where
        F: FnOnce(HDWF) -> c_int,
    {
        let _guard = self.inner.ffi_lock.lock();
        check(f(self.inner.handle), function)
    }

    /// Text of the SDK's last-error buffer.
    pub fn last_error_message(&self) -> Option<String> {
        let _guard = self.inner.ffi_lock.lock();
        // SAFETY: the handle lock keeps other calls on this device out
        unsafe { crate::error::last_error_message() }
    }

    pub(crate) fn set_analog_trigger(&self, analog: bool) {
        self.inner.analog_trigger.store(analog, Ordering::Relaxed);
    }

    pub(crate) fn analog_trigger(&self) -> bool {
        self.inner.analog_trigger.load(Ordering::Relaxed)
    }

    /// Serial number reported by enumeration.
    pub fn serial(&self) -> &str {
        &self.inner.enumerated.serial
    }

    /// Device name reported by enumeration.
    pub fn name(&self) -> &str {
        &self.inner.enumerated.name
    }

    /// Set the auto-configuration policy.
    pub fn set_auto_configure(&self, mode: AutoConfigure) -> Result<()> {
        dwf_call!(self, FDwfDeviceAutoConfigureSet(mode as c_int))?;
        debug!(?mode, "Auto-configure set");
        Ok(())
    }

    /// Reset every instrument of the device to its defaults.
    pub fn reset(&self) -> Result<()> {
        dwf_call!(self, FDwfDeviceReset())
    }

    /// Get device information (cached after first call).
    pub fn info(&self) -> Result<DeviceInfo> {
        if let Some(info) = self.inner.info.read().as_ref() {
            return Ok(info.clone());
        }

        let ai = self.analog_in();
        let info = DeviceInfo {
            index: self.inner.enumerated.index,
            name: self.inner.enumerated.name.clone(),
            serial: self.inner.enumerated.serial.clone(),
            analog_in_channels: ai.channel_count()?,
            analog_out_channels: self.analog_out().channel_count()?,
            input: ai.limits()?,
        };

        *self.inner.info.write() = Some(info.clone());
        Ok(info)
    }

    /// Get the scope (analog input) accessor.
    pub fn analog_in(&self) -> AnalogIn {
        AnalogIn::new(self.clone())
    }

    /// Get the waveform generator (analog output) accessor.
    pub fn analog_out(&self) -> AnalogOut {
        AnalogOut::new(self.clone())
    }

    /// Get the network/impedance analyzer accessor.
    pub fn impedance(&self) -> ImpedanceAnalyzer {
        ImpedanceAnalyzer::new(self.clone())
    }

    /// Get the digital I/O accessor.
    pub fn digital_io(&self) -> DigitalIo {
        DigitalIo::new(self.clone())
    }

    /// Get the SPI master accessor.
    pub fn spi(&self) -> Spi {
        Spi::new(self.clone())
    }

    /// Stop the generator and scope, then close the device.
    ///
    /// Dropping the last clone also closes the device, without the stop.
    pub fn close(self) -> Result<()> {
        let ao = self.analog_out();
        for channel in 0..ao.channel_count()? {
            ao.set_enabled(channel, false)?;
        }
        self.analog_in().stop()?;
        info!(serial = %self.serial(), "Closing WaveForms device");
        Ok(())
    }
}
