//! Acquisition state machine and the polling algorithms built on it.
//!
//! The scope runs `Config/Prefill/Armed -> Wait -> Triggered -> Running ->
//! Done`; re-arming goes back to `Config`. Everything here is written
//! against [`AcquisitionPort`] rather than the SDK directly so the busy-poll
//! and record-drain behaviour can be exercised with a scripted port.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{DwfError, Result};

/// Relative deviation between requested and achieved sample rate above
/// which a [`AcquisitionWarning::RateMismatch`] is raised.
pub const RATE_TOLERANCE: f64 = 0.005;

/// Most samples fetched from one record-mode status read.
pub const MAX_RECORD_CHUNK: usize = 8192;

/// Instrument status as reported by a fresh status read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionState {
    Ready,
    Config,
    Prefill,
    Armed,
    Wait,
    Triggered,
    /// Reported with the same raw code as `Triggered`; produced by
    /// simulated instruments only.
    Running,
    Done,
}

impl AcquisitionState {
    /// Convert from a raw `DwfState` value.
    pub fn from_raw(raw: dwf_sys::DwfState) -> Option<Self> {
        match raw {
            dwf_sys::DwfStateReady => Some(Self::Ready),
            dwf_sys::DwfStateConfig => Some(Self::Config),
            dwf_sys::DwfStatePrefill => Some(Self::Prefill),
            dwf_sys::DwfStateArmed => Some(Self::Armed),
            dwf_sys::DwfStateWait => Some(Self::Wait),
            dwf_sys::DwfStateTriggered => Some(Self::Triggered),
            dwf_sys::DwfStateDone => Some(Self::Done),
            _ => None,
        }
    }

    /// States seen between arming and the trigger becoming live.
    pub fn is_pre_armed(self) -> bool {
        matches!(self, Self::Config | Self::Prefill | Self::Armed)
    }
}

/// Non-fatal acquisition-quality problems. The data they accompany is
/// still returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AcquisitionWarning {
    /// The instrument quantised the sample rate beyond [`RATE_TOLERANCE`].
    RateMismatch { requested_hz: f64, achieved_hz: f64 },
    /// Samples dropped by the device during a record drain.
    SamplesLost { count: usize },
    /// Samples flagged as corrupted during a record drain.
    SamplesCorrupted { count: usize },
    /// An analog edge trigger was used for an averaged capture.
    AnalogTriggerAveraging,
}

impl fmt::Display for AcquisitionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateMismatch {
                requested_hz,
                achieved_hz,
            } => write!(
                f,
                "sample rate {} Hz achieved instead of {} Hz",
                achieved_hz, requested_hz
            ),
            Self::SamplesLost { count } => write!(f, "{} samples lost", count),
            Self::SamplesCorrupted { count } => write!(f, "{} samples could be corrupted", count),
            Self::AnalogTriggerAveraging => {
                write!(f, "analog trigger is not recommended for averaged acquisition")
            }
        }
    }
}

/// Counters reported by the device while in record mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounters {
    pub available: usize,
    pub lost: usize,
    pub corrupted: usize,
}

/// Result of a record-mode drain.
#[derive(Debug, Clone, Default)]
pub struct RecordOutcome {
    /// `total_samples` values; lost samples are NaN.
    pub samples: Vec<f64>,
    pub lost: usize,
    pub corrupted: usize,
    pub warnings: Vec<AcquisitionWarning>,
}

impl RecordOutcome {
    /// True when every sample was retrieved intact.
    pub fn is_clean(&self) -> bool {
        self.lost == 0 && self.corrupted == 0
    }
}

/// Statistics of a completed busy-poll.
#[derive(Debug, Clone, Copy)]
pub struct PollStats {
    pub polls: u64,
    pub elapsed: Duration,
}

/// Low-level access to the scope's status and sample buffer.
pub trait AcquisitionPort {
    /// Start (or restart) the acquisition.
    fn start(&self) -> Result<()>;

    /// Read the current state from the hardware, refreshing its data buffer.
    fn poll_state(&self) -> Result<AcquisitionState>;

    /// Record-mode counters for the last [`poll_state`](Self::poll_state).
    fn record_counters(&self) -> Result<RecordCounters>;

    /// Copy `out.len()` samples of `channel` from the last status read.
    fn fetch(&self, channel: i32, out: &mut [f64]) -> Result<()>;
}

/// Busy-poll until the port reports [`AcquisitionState::Done`].
///
/// There is no sleep in the loop. Any non-terminal state keeps the loop
/// going, including a pre-armed state on the very first poll. With a
/// `timeout`, polling stops with [`DwfError::AcquisitionTimeout`] once it
/// has elapsed.
pub fn wait_for_done<P>(port: &P, timeout: Option<Duration>) -> Result<PollStats>
where
    P: AcquisitionPort + ?Sized,
{
    let start = Instant::now();
    let mut polls: u64 = 0;

    loop {
        let state = port.poll_state()?;
        polls += 1;

        if state == AcquisitionState::Done {
            let elapsed = start.elapsed();
            trace!(polls, ?elapsed, "Acquisition done");
            return Ok(PollStats { polls, elapsed });
        }

        if let Some(limit) = timeout {
            let elapsed = start.elapsed();
            if elapsed >= limit {
                debug!(polls, ?elapsed, state = ?state, "Acquisition timed out");
                return Err(DwfError::AcquisitionTimeout {
                    elapsed,
                    last_state: state,
                });
            }
        }

        std::hint::spin_loop();
    }
}

/// Drain `total_samples` of `channel` from a port running in record mode.
///
/// While nothing has been retrieved yet, pre-armed states only mean the
/// device has not started streaming. Lost samples advance the write cursor
/// and stay NaN. When more samples are available than remain needed, only
/// the remaining count is consumed. A single fetch never exceeds
/// [`MAX_RECORD_CHUNK`]; anything reported beyond it in the same status
/// read is counted as lost. If the device reports `Done` with nothing
/// left to read, the shortfall is counted as lost.
pub fn drain_record<P>(port: &P, channel: i32, total_samples: usize) -> Result<RecordOutcome>
where
    P: AcquisitionPort + ?Sized,
{
    let mut samples = vec![f64::NAN; total_samples];
    let mut cursor = 0usize;
    let mut lost_total = 0usize;
    let mut corrupted_total = 0usize;

    while cursor < total_samples {
        let state = port.poll_state()?;
        if cursor == 0 && state.is_pre_armed() {
            continue;
        }

        let counters = port.record_counters()?;

        if counters.lost > 0 {
            let skipped = counters.lost.min(total_samples - cursor);
            cursor += skipped;
            lost_total += skipped;
        }
        corrupted_total += counters.corrupted;

        if counters.available == 0 {
            if state == AcquisitionState::Done {
                let missing = total_samples - cursor;
                if missing > 0 {
                    debug!(missing, "Record ended before all samples were retrieved");
                    lost_total += missing;
                }
                break;
            }
            continue;
        }

        let take = counters
            .available
            .min(MAX_RECORD_CHUNK)
            .min(total_samples - cursor);
        port.fetch(channel, &mut samples[cursor..cursor + take])?;
        cursor += take;
        trace!(cursor, take, total_samples, "Record chunk retrieved");

        let dropped = counters
            .available
            .saturating_sub(MAX_RECORD_CHUNK)
            .min(total_samples - cursor);
        if dropped > 0 {
            debug!(dropped, "Status read held more than one chunk");
            cursor += dropped;
            lost_total += dropped;
        }
    }

    let mut warnings = Vec::new();
    if lost_total > 0 {
        warn!(count = lost_total, "Samples were lost! Reduce frequency");
        warnings.push(AcquisitionWarning::SamplesLost { count: lost_total });
    }
    if corrupted_total > 0 {
        warn!(count = corrupted_total, "Samples could be corrupted! Reduce frequency");
        warnings.push(AcquisitionWarning::SamplesCorrupted {
            count: corrupted_total,
        });
    }

    Ok(RecordOutcome {
        samples,
        lost: lost_total,
        corrupted: corrupted_total,
        warnings,
    })
}

/// Run `count` captures of `samples` points on both channels and return
/// the element-wise mean, accumulated in `f64`.
///
/// Each capture re-arms the port; `pause` is slept between captures.
pub fn average_captures<P>(
    port: &P,
    count: usize,
    samples: usize,
    pause: Duration,
    timeout: Option<Duration>,
) -> Result<(Vec<f64>, Vec<f64>)>
where
    P: AcquisitionPort + ?Sized,
{
    let count = count.max(1);
    let mut sum0 = vec![0.0f64; samples];
    let mut sum1 = vec![0.0f64; samples];
    let mut buf = vec![0.0f64; samples];

    for i in 0..count {
        if i > 0 && !pause.is_zero() {
            thread::sleep(pause);
        }
        port.start()?;
        wait_for_done(port, timeout)?;

        port.fetch(0, &mut buf)?;
        sum0.iter_mut().zip(&buf).for_each(|(acc, v)| *acc += v);
        port.fetch(1, &mut buf)?;
        sum1.iter_mut().zip(&buf).for_each(|(acc, v)| *acc += v);
    }

    let n = count as f64;
    sum0.iter_mut().for_each(|v| *v /= n);
    sum1.iter_mut().for_each(|v| *v /= n);
    Ok((sum0, sum1))
}

/// Number of captures needed so averaging reaches `quantum` volts of
/// resolution, given one capture resolves 0.3 mV on the 5 V range.
pub fn captures_for_quantum(avg: usize, quantum: f64) -> usize {
    ((avg as f64 * 0.0003 / quantum) as usize + 1).max(1)
}

/// Compare an achieved sample rate with the requested one.
pub fn check_rate(requested_hz: f64, achieved_hz: f64) -> Option<AcquisitionWarning> {
    if requested_hz <= 0.0 {
        return None;
    }
    if (achieved_hz / requested_hz - 1.0).abs() > RATE_TOLERANCE {
        Some(AcquisitionWarning::RateMismatch {
            requested_hz,
            achieved_hz,
        })
    } else {
        None
    }
}

/// Sample instants of a capture of `n` points at `rate_hz`, relative to the
/// trigger, for a device-side trigger position of `position_s`.
pub fn capture_timestamps(n: usize, rate_hz: f64, position_s: f64) -> Vec<f64> {
    let start = position_s - n as f64 / (2.0 * rate_hz);
    (0..n).map(|k| k as f64 / rate_hz + start).collect()
}
