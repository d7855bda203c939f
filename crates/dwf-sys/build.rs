//! Build script for dwf-sys FFI bindings.
//!
//! This script generates Rust FFI bindings from the WaveForms SDK header
//! (`dwf.h`) using bindgen. It supports two modes:
//!
//! 1. With `dwf-sdk` feature: Generates bindings from the installed headers
//! 2. Without feature: Emits placeholder bindings so the workspace builds
//!    and tests on machines without the WaveForms runtime

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=wrapper.h");
    println!("cargo:rerun-if-env-changed=DWF_INCLUDE_DIR");
    println!("cargo:rerun-if-env-changed=DWF_LIB_DIR");

    #[cfg(feature = "dwf-sdk")]
    generate_bindings();

    #[cfg(not(feature = "dwf-sdk"))]
    generate_dummy_bindings();

    #[cfg(feature = "dwf-sdk")]
    {
        if let Ok(dir) = env::var("DWF_LIB_DIR") {
            println!("cargo:rustc-link-search=native={}", dir);
        }

        // macOS ships the runtime as a framework inside WaveForms.app
        if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
            println!("cargo:rustc-link-search=framework=/Library/Frameworks");
            println!("cargo:rustc-link-lib=framework=dwf");
            return;
        }

        if pkg_config::probe_library("dwf").is_ok() {
            return;
        }

        println!("cargo:rustc-link-lib=dwf");

        let lib_paths = ["/usr/lib", "/usr/local/lib", "/usr/lib/x86_64-linux-gnu"];
        for path in lib_paths {
            if std::path::Path::new(path).join("libdwf.so").exists() {
                println!("cargo:rustc-link-search=native={}", path);
                break;
            }
        }
    }
}

#[cfg(feature = "dwf-sdk")]
fn generate_bindings() {
    let include_dir = env::var("DWF_INCLUDE_DIR").unwrap_or_else(|_| {
        for path in ["/usr/include", "/usr/local/include"] {
            if std::path::Path::new(path)
                .join("digilent/waveforms/dwf.h")
                .exists()
            {
                return path.to_string();
            }
        }
        "/usr/include".to_string()
    });

    println!(
        "cargo:rerun-if-changed={}/digilent/waveforms/dwf.h",
        include_dir
    );

    let bindings = bindgen::Builder::default()
        .header("wrapper.h")
        .clang_arg(format!("-I{}", include_dir))
        .allowlist_function("FDwf.*")
        .allowlist_type("HDWF")
        .allowlist_type("DwfState")
        .allowlist_type("TRIGSRC")
        .allowlist_type("FUNC")
        .allowlist_type("ACQMODE")
        .allowlist_type("FILTER")
        .allowlist_type("TRIGTYPE")
        .allowlist_type("DwfTriggerSlope")
        .allowlist_type("AnalogOutNode")
        .allowlist_type("ENUMFILTER")
        .allowlist_type("DWFERC")
        .allowlist_var("hdwfNone")
        .allowlist_var("enumfilter.*")
        .allowlist_var("DwfState.*")
        .allowlist_var("trigsrc.*")
        .allowlist_var("func.*")
        .allowlist_var("acqmode.*")
        .allowlist_var("filter.*")
        .allowlist_var("trigtype.*")
        .allowlist_var("DwfTriggerSlope.*")
        .allowlist_var("AnalogOutNode.*")
        .allowlist_var("dwferc.*")
        .default_enum_style(bindgen::EnumVariation::Consts)
        .derive_debug(true)
        .derive_default(true)
        .derive_copy(true)
        .generate_comments(true)
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
        .generate()
        .expect("Unable to generate dwf bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Couldn't write bindings!");
}

/// Generate dummy bindings when the SDK is not available.
/// This allows the crate to compile on systems without libdwf installed.
#[cfg(not(feature = "dwf-sdk"))]
fn generate_dummy_bindings() {
    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    let dummy = r#"
// Dummy bindings - dwf-sdk feature not enabled
//
// Types and constants mirror dwf.h. Every function panics when called.
// Enable the `dwf-sdk` feature to generate real bindings.

use std::os::raw::{c_char, c_int, c_uchar, c_uint};

/// Device handle
pub type HDWF = c_int;
/// Instrument state
pub type DwfState = c_uchar;
/// Trigger source
pub type TRIGSRC = c_uchar;
/// Generator function
pub type FUNC = c_uchar;
/// Acquisition mode
pub type ACQMODE = c_int;
/// Input channel filter
pub type FILTER = c_int;
/// Trigger type
pub type TRIGTYPE = c_int;
/// Trigger slope
pub type DwfTriggerSlope = c_int;
/// Generator node
pub type AnalogOutNode = c_int;
/// Device enumeration filter
pub type ENUMFILTER = c_int;
/// Error code
pub type DWFERC = c_int;

pub const hdwfNone: HDWF = 0;

pub const enumfilterAll: ENUMFILTER = 0;

pub const DwfStateReady: DwfState = 0;
pub const DwfStateConfig: DwfState = 4;
pub const DwfStatePrefill: DwfState = 5;
pub const DwfStateArmed: DwfState = 1;
pub const DwfStateWait: DwfState = 7;
pub const DwfStateTriggered: DwfState = 3;
pub const DwfStateRunning: DwfState = 3;
pub const DwfStateDone: DwfState = 2;

pub const trigsrcNone: TRIGSRC = 0;
pub const trigsrcPC: TRIGSRC = 1;
pub const trigsrcDetectorAnalogIn: TRIGSRC = 2;
pub const trigsrcDetectorDigitalIn: TRIGSRC = 3;
pub const trigsrcAnalogIn: TRIGSRC = 4;
pub const trigsrcDigitalIn: TRIGSRC = 5;
pub const trigsrcDigitalOut: TRIGSRC = 6;
pub const trigsrcAnalogOut1: TRIGSRC = 7;
pub const trigsrcAnalogOut2: TRIGSRC = 8;
pub const trigsrcAnalogOut3: TRIGSRC = 9;
pub const trigsrcAnalogOut4: TRIGSRC = 10;
pub const trigsrcExternal1: TRIGSRC = 11;
pub const trigsrcExternal2: TRIGSRC = 12;
pub const trigsrcExternal3: TRIGSRC = 13;
pub const trigsrcExternal4: TRIGSRC = 14;
pub const trigsrcHigh: TRIGSRC = 15;
pub const trigsrcLow: TRIGSRC = 16;

pub const funcDC: FUNC = 0;
pub const funcSine: FUNC = 1;
pub const funcSquare: FUNC = 2;
pub const funcTriangle: FUNC = 3;
pub const funcRampUp: FUNC = 4;
pub const funcRampDown: FUNC = 5;
pub const funcNoise: FUNC = 6;
pub const funcCustom: FUNC = 30;
pub const funcPlay: FUNC = 31;

pub const acqmodeSingle: ACQMODE = 0;
pub const acqmodeScanShift: ACQMODE = 1;
pub const acqmodeScanScreen: ACQMODE = 2;
pub const acqmodeRecord: ACQMODE = 3;

pub const filterDecimate: FILTER = 0;
pub const filterAverage: FILTER = 1;
pub const filterMinMax: FILTER = 2;

pub const trigtypeEdge: TRIGTYPE = 0;
pub const trigtypePulse: TRIGTYPE = 1;
pub const trigtypeTransition: TRIGTYPE = 2;

pub const DwfTriggerSlopeRise: DwfTriggerSlope = 0;
pub const DwfTriggerSlopeFall: DwfTriggerSlope = 1;
pub const DwfTriggerSlopeEither: DwfTriggerSlope = 2;

pub const AnalogOutNodeCarrier: AnalogOutNode = 0;
pub const AnalogOutNodeFM: AnalogOutNode = 1;
pub const AnalogOutNodeAM: AnalogOutNode = 2;

pub const dwfercNoErc: DWFERC = 0;
pub const dwfercUnknownError: DWFERC = 1;
pub const dwfercApiLockTimeout: DWFERC = 2;
pub const dwfercAlreadyOpened: DWFERC = 3;
pub const dwfercNotSupported: DWFERC = 4;
pub const dwfercInvalidParameter0: DWFERC = 0x10;

// Panic stub implementations - these allow linking to succeed but will panic at runtime
// if called without the dwf-sdk feature enabled.

const DWF_SDK_PANIC_MSG: &str = "dwf function called but dwf-sdk feature is not enabled. \
    Enable the dwf-sdk feature (or `hardware` in daq-driver-dwf) to use the WaveForms runtime.";

macro_rules! dwf_stub {
    ($($name:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            #[no_mangle]
            pub unsafe extern "C" fn $name($($arg: $ty),*) -> c_int {
                $(let _ = $arg;)*
                panic!("{}", DWF_SDK_PANIC_MSG);
            }
        )*
    };
}

dwf_stub! {
    FDwfGetLastError(pdwferc: *mut DWFERC);
    FDwfGetLastErrorMsg(szError: *mut c_char);
    FDwfGetVersion(szVersion: *mut c_char);

    FDwfEnum(enumfilter: ENUMFILTER, pcDevice: *mut c_int);
    FDwfEnumDeviceIsOpened(idxDevice: c_int, pfIsUsed: *mut c_int);
    FDwfEnumDeviceName(idxDevice: c_int, szDeviceName: *mut c_char);
    FDwfEnumSN(idxDevice: c_int, szSN: *mut c_char);

    FDwfDeviceOpen(idxDevice: c_int, phdwf: *mut HDWF);
    FDwfDeviceClose(hdwf: HDWF);
    FDwfDeviceAutoConfigureSet(hdwf: HDWF, fAutoConfigure: c_int);
    FDwfDeviceReset(hdwf: HDWF);

    FDwfAnalogInReset(hdwf: HDWF);
    FDwfAnalogInConfigure(hdwf: HDWF, fReconfigure: c_int, fStart: c_int);
    FDwfAnalogInStatus(hdwf: HDWF, fReadData: c_int, psts: *mut DwfState);
    FDwfAnalogInStatusData(hdwf: HDWF, idxChannel: c_int, rgdVoltData: *mut f64, cdData: c_int);
    FDwfAnalogInStatusRecord(hdwf: HDWF, pcdDataAvailable: *mut c_int, pcdDataLost: *mut c_int, pcdDataCorrupt: *mut c_int);
    FDwfAnalogInFrequencyInfo(hdwf: HDWF, phzMin: *mut f64, phzMax: *mut f64);
    FDwfAnalogInFrequencySet(hdwf: HDWF, hzFrequency: f64);
    FDwfAnalogInFrequencyGet(hdwf: HDWF, phzFrequency: *mut f64);
    FDwfAnalogInBitsInfo(hdwf: HDWF, pnBits: *mut c_int);
    FDwfAnalogInBufferSizeInfo(hdwf: HDWF, pnSizeMin: *mut c_int, pnSizeMax: *mut c_int);
    FDwfAnalogInBufferSizeSet(hdwf: HDWF, nSize: c_int);
    FDwfAnalogInBufferSizeGet(hdwf: HDWF, pnSize: *mut c_int);
    FDwfAnalogInAcquisitionModeSet(hdwf: HDWF, acqmode: ACQMODE);
    FDwfAnalogInRecordLengthSet(hdwf: HDWF, sLength: f64);
    FDwfAnalogInChannelCount(hdwf: HDWF, pcChannel: *mut c_int);
    FDwfAnalogInChannelEnableSet(hdwf: HDWF, idxChannel: c_int, fEnable: c_int);
    FDwfAnalogInChannelFilterSet(hdwf: HDWF, idxChannel: c_int, filter: FILTER);
    FDwfAnalogInChannelRangeInfo(hdwf: HDWF, pvoltsMin: *mut f64, pvoltsMax: *mut f64, pnSteps: *mut f64);
    FDwfAnalogInChannelRangeSet(hdwf: HDWF, idxChannel: c_int, voltsRange: f64);
    FDwfAnalogInChannelRangeGet(hdwf: HDWF, idxChannel: c_int, pvoltsRange: *mut f64);
    FDwfAnalogInChannelOffsetSet(hdwf: HDWF, idxChannel: c_int, voltOffset: f64);
    FDwfAnalogInChannelOffsetGet(hdwf: HDWF, idxChannel: c_int, pvoltOffset: *mut f64);
    FDwfAnalogInTriggerSourceSet(hdwf: HDWF, trigsrc: TRIGSRC);
    FDwfAnalogInTriggerPositionSet(hdwf: HDWF, secPosition: f64);
    FDwfAnalogInTriggerPositionGet(hdwf: HDWF, psecPosition: *mut f64);
    FDwfAnalogInTriggerAutoTimeoutSet(hdwf: HDWF, secTimeout: f64);
    FDwfAnalogInTriggerTypeSet(hdwf: HDWF, trigtype: TRIGTYPE);
    FDwfAnalogInTriggerChannelSet(hdwf: HDWF, idxChannel: c_int);
    FDwfAnalogInTriggerFilterSet(hdwf: HDWF, filter: FILTER);
    FDwfAnalogInTriggerLevelSet(hdwf: HDWF, voltsLevel: f64);
    FDwfAnalogInTriggerHysteresisSet(hdwf: HDWF, voltsLevel: f64);
    FDwfAnalogInTriggerConditionSet(hdwf: HDWF, trigcond: DwfTriggerSlope);

    FDwfAnalogOutCount(hdwf: HDWF, pcChannel: *mut c_int);
    FDwfAnalogOutReset(hdwf: HDWF, idxChannel: c_int);
    FDwfAnalogOutConfigure(hdwf: HDWF, idxChannel: c_int, fStart: c_int);
    FDwfAnalogOutNodeEnableSet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, fEnable: c_int);
    FDwfAnalogOutNodeFunctionSet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, func: FUNC);
    FDwfAnalogOutNodeFunctionGet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, pfunc: *mut FUNC);
    FDwfAnalogOutNodeFrequencyInfo(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, phzMin: *mut f64, phzMax: *mut f64);
    FDwfAnalogOutNodeFrequencySet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, hzFrequency: f64);
    FDwfAnalogOutNodeFrequencyGet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, phzFrequency: *mut f64);
    FDwfAnalogOutNodeAmplitudeInfo(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, pMin: *mut f64, pMax: *mut f64);
    FDwfAnalogOutNodeAmplitudeSet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, vAmplitude: f64);
    FDwfAnalogOutNodeAmplitudeGet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, pvAmplitude: *mut f64);
    FDwfAnalogOutNodeOffsetInfo(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, pMin: *mut f64, pMax: *mut f64);
    FDwfAnalogOutNodeOffsetSet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, vOffset: f64);
    FDwfAnalogOutNodeOffsetGet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, pvOffset: *mut f64);
    FDwfAnalogOutNodeSymmetryInfo(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, ppercentageMin: *mut f64, ppercentageMax: *mut f64);
    FDwfAnalogOutNodeSymmetrySet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, percentageSymmetry: f64);
    FDwfAnalogOutNodeSymmetryGet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, ppercentageSymmetry: *mut f64);
    FDwfAnalogOutNodePhaseInfo(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, pdegreeMin: *mut f64, pdegreeMax: *mut f64);
    FDwfAnalogOutNodePhaseSet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, degreePhase: f64);
    FDwfAnalogOutNodePhaseGet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, pdegreePhase: *mut f64);
    FDwfAnalogOutNodeDataInfo(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, pnSamplesMin: *mut c_int, pnSamplesMax: *mut c_int);
    FDwfAnalogOutNodeDataSet(hdwf: HDWF, idxChannel: c_int, node: AnalogOutNode, rgdData: *mut f64, cdData: c_int);

    FDwfAnalogImpedanceReset(hdwf: HDWF);
    FDwfAnalogImpedanceModeSet(hdwf: HDWF, mode: c_int);
    FDwfAnalogImpedanceReferenceSet(hdwf: HDWF, ohms: f64);
    FDwfAnalogImpedanceFrequencySet(hdwf: HDWF, hz: f64);
    FDwfAnalogImpedanceAmplitudeSet(hdwf: HDWF, volts: f64);
    FDwfAnalogImpedanceOffsetSet(hdwf: HDWF, volts: f64);
    FDwfAnalogImpedancePeriodSet(hdwf: HDWF, cMinPeriods: c_int);
    FDwfAnalogImpedanceConfigure(hdwf: HDWF, fStart: c_int);
    FDwfAnalogImpedanceStatus(hdwf: HDWF, psts: *mut DwfState);
    FDwfAnalogImpedanceStatusInput(hdwf: HDWF, idxChannel: c_int, pgain: *mut f64, pradian: *mut f64);

    FDwfDigitalIOReset(hdwf: HDWF);
    FDwfDigitalIOConfigure(hdwf: HDWF);
    FDwfDigitalIOStatus(hdwf: HDWF);
    FDwfDigitalIOOutputEnableSet(hdwf: HDWF, fsOutputEnable: c_uint);
    FDwfDigitalIOOutputEnableGet(hdwf: HDWF, pfsOutputEnable: *mut c_uint);
    FDwfDigitalIOOutputSet(hdwf: HDWF, fsOutput: c_uint);
    FDwfDigitalIOOutputGet(hdwf: HDWF, pfsOutput: *mut c_uint);
    FDwfDigitalIOInputStatus(hdwf: HDWF, pfsInput: *mut c_uint);

    FDwfDigitalSpiReset(hdwf: HDWF);
    FDwfDigitalSpiFrequencySet(hdwf: HDWF, hz: f64);
    FDwfDigitalSpiClockSet(hdwf: HDWF, idxChannel: c_int);
    FDwfDigitalSpiDataSet(hdwf: HDWF, idxDQ: c_int, idxChannel: c_int);
    FDwfDigitalSpiModeSet(hdwf: HDWF, iMode: c_int);
    FDwfDigitalSpiOrderSet(hdwf: HDWF, fMSBLSB: c_int);
    FDwfDigitalSpiSelect(hdwf: HDWF, idxChannel: c_int, level: c_int);
    FDwfDigitalSpiWriteRead(hdwf: HDWF, cDQ: c_int, cBitPerWord: c_int, rgTX: *mut c_uchar, cTX: c_int, rgRX: *mut c_uchar, cRX: c_int);
    FDwfDigitalSpiWrite(hdwf: HDWF, cDQ: c_int, cBitPerWord: c_int, rgTX: *mut c_uchar, cTX: c_int);
    FDwfDigitalSpiRead(hdwf: HDWF, cDQ: c_int, cBitPerWord: c_int, rgRX: *mut c_uchar, cRX: c_int);
}
"#;

    std::fs::write(out_path.join("bindings.rs"), dummy).expect("Couldn't write dummy bindings!");
}
