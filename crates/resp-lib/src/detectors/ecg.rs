use crate::{
    error::RespError,
    filters,
    peaks::{find_peaks, PeakCriteria},
    signal::{Events, Waveform},
    stats,
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Peak acceptance policy applied to the QRS-band signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeakPolicy {
    /// Peaks at least 250 ms apart with prominence above half the standard deviation.
    #[default]
    Prominence,
    /// Peaks at least 350 ms apart, prominence above 3 x MAD, width 20-120 ms.
    RobustWidth,
}

/// Configurable parameters for R-peak detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatDetectorConfig {
    pub policy: PeakPolicy,
    /// Lower QRS band edge (Hz).
    pub qrs_low_hz: f64,
    /// Upper QRS band edge for general detection (Hz).
    pub qrs_high_hz: f64,
    /// Upper QRS band edge used ahead of amplitude-modulation extraction (Hz).
    pub am_qrs_high_hz: f64,
    pub filter_order: usize,
    /// Drop beats whose interval to the previous detection is implausible.
    pub sanity_filter: bool,
    /// Minimum physiological beat interval (seconds).
    pub min_rr_s: f64,
    /// Maximum physiological beat interval (seconds).
    pub max_rr_s: f64,
}

impl Default for BeatDetectorConfig {
    fn default() -> Self {
        Self {
            policy: PeakPolicy::Prominence,
            qrs_low_hz: 0.5,
            qrs_high_hz: 40.0,
            am_qrs_high_hz: 25.0,
            filter_order: 4,
            sanity_filter: true,
            min_rr_s: 0.3,
            max_rr_s: 6.0,
        }
    }
}

const PROMINENCE_MIN_GAP_S: f64 = 0.25;
const ROBUST_MIN_GAP_S: f64 = 0.35;
const ROBUST_MIN_WIDTH_S: f64 = 0.020;
const ROBUST_MAX_WIDTH_S: f64 = 0.120;

/// Band-limit raw ECG to the QRS band. An upper edge above `0.9 x nyquist`
/// is clamped first.
pub fn qrs_bandpass(
    ecg: &[f64],
    fs: f64,
    low: f64,
    high: f64,
    order: usize,
) -> Result<Vec<f64>, RespError> {
    let high = filters::clamp_high(fs, high);
    filters::bandpass(ecg, fs, low, high, order)
}

/// Locate R-peaks in an already QRS-band-limited signal. Stateless and
/// deterministic; output indices are ascending.
pub fn detect_r_peaks(qrs: &[f64], fs: f64, cfg: &BeatDetectorConfig) -> Events {
    let peaks = match cfg.policy {
        PeakPolicy::Prominence => prominence_peaks(qrs, fs),
        PeakPolicy::RobustWidth => robust_width_peaks(qrs, fs),
    };
    let peaks = if cfg.sanity_filter && cfg.policy == PeakPolicy::Prominence {
        sanity_filter(&peaks, fs, cfg.min_rr_s, cfg.max_rr_s)
    } else {
        peaks
    };
    Events::from_indices(peaks)
}

/// QRS band-pass with `high_hz` as the upper edge, then peak detection.
pub fn detect_beats_with_band(
    ecg: &Waveform,
    cfg: &BeatDetectorConfig,
    high_hz: f64,
) -> Result<Events, RespError> {
    let qrs = qrs_bandpass(ecg.values(), ecg.fs(), cfg.qrs_low_hz, high_hz, cfg.filter_order)?;
    let events = detect_r_peaks(&qrs, ecg.fs(), cfg);
    debug!(
        "detected {} beats in {:.1}s of ECG ({:?} policy)",
        events.len(),
        ecg.duration(),
        cfg.policy
    );
    Ok(events)
}

/// Run the general-purpose QRS band-pass and R-peak detection on raw ECG.
pub fn detect_beats(ecg: &Waveform, cfg: &BeatDetectorConfig) -> Result<Events, RespError> {
    detect_beats_with_band(ecg, cfg, cfg.qrs_high_hz)
}

fn prominence_peaks(qrs: &[f64], fs: f64) -> Vec<usize> {
    let Some(sd) = stats::std_dev(qrs) else {
        return Vec::new();
    };
    let criteria = PeakCriteria {
        distance: Some((fs * PROMINENCE_MIN_GAP_S) as usize),
        prominence: Some(0.5 * sd),
        width: None,
    };
    find_peaks(qrs, &criteria)
}

fn robust_width_peaks(qrs: &[f64], fs: f64) -> Vec<usize> {
    let (Some(mad), Some(sd)) = (stats::mad(qrs), stats::std_dev(qrs)) else {
        return Vec::new();
    };
    let prominence = if mad > 0.0 { 3.0 * mad } else { 0.5 * sd };
    let criteria = PeakCriteria {
        distance: Some((fs * ROBUST_MIN_GAP_S) as usize),
        prominence: Some(prominence),
        width: Some((ROBUST_MIN_WIDTH_S * fs, ROBUST_MAX_WIDTH_S * fs)),
    };
    find_peaks(qrs, &criteria)
}

/// Drop peaks whose interval to the preceding detection falls outside
/// `[min_rr_s, max_rr_s]`. The first peak is always kept; fewer than three
/// peaks pass through untouched.
pub fn sanity_filter(peaks: &[usize], fs: f64, min_rr_s: f64, max_rr_s: f64) -> Vec<usize> {
    if peaks.len() < 3 {
        return peaks.to_vec();
    }
    let mut kept = Vec::with_capacity(peaks.len());
    kept.push(peaks[0]);
    for pair in peaks.windows(2) {
        let rr = (pair[1] - pair[0]) as f64 / fs;
        if (min_rr_s..=max_rr_s).contains(&rr) {
            kept.push(pair[1]);
        }
    }
    kept
}
