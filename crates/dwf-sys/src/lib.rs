//! Low-level FFI bindings for the Digilent WaveForms SDK.
//!
//! This crate provides raw, unsafe bindings to `libdwf`, the runtime shipped
//! with Digilent WaveForms. It drives Analog Discovery instruments: the
//! two-channel oscilloscope, the arbitrary waveform generator, the network
//! (impedance) analyzer, and the digital I/O pins including the SPI master.
//!
//! # Safety
//!
//! All functions in this crate are `unsafe` as they are direct FFI bindings.
//! For a safe wrapper, use the `daq-driver-dwf` crate instead.
//!
//! Every `FDwf*` function returns a C `BOOL`: non-zero on success, zero on
//! failure. On failure the reason is available from [`FDwfGetLastErrorMsg`]
//! until the next SDK call on the same thread.
//!
//! # Features
//!
//! - `dwf-sdk`: Generate bindings from the installed `dwf.h` and link
//!   against `libdwf`. Without this feature, placeholder bindings are used
//!   whose functions panic when called.
//!
//! # Example (unsafe)
//!
//! ```no_run
//! use dwf_sys::*;
//!
//! unsafe {
//!     let mut count = 0;
//!     if FDwfEnum(enumfilterAll, &mut count) != 0 {
//!         println!("{} device(s) connected", count);
//!     }
//! }
//! ```

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]
#![allow(missing_docs)]
#![allow(clippy::all)]

// Include the generated bindings
include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

/// Size of the buffer `FDwfGetLastErrorMsg` writes into.
pub const DWF_ERROR_MSG_LEN: usize = 512;

/// Size of the buffers `FDwfEnumDeviceName` and `FDwfEnumSN` write into.
pub const DWF_ENUM_STR_LEN: usize = 32;

/// C `BOOL` true.
pub const DWF_TRUE: std::os::raw::c_int = 1;

/// C `BOOL` false.
pub const DWF_FALSE: std::os::raw::c_int = 0;
