//! ECG-derived respiration.
//!
//! Two extractors turn an ECG record into a respiration-band waveform:
//! beat-amplitude modulation (AM), resampled onto a uniform grid, and
//! baseline wander (BW), kept at the ECG sampling rate.

use crate::config::BandConfig;
use crate::detectors::ecg::{detect_beats, BeatDetectorConfig};
use crate::error::{NoEstimateReason, RespError, Shortfall};
use crate::estimators::EstimatorKind;
use crate::filters;
use crate::signal::{Beat, Events, Waveform};
use crate::stats;
use log::debug;
use serde::{Deserialize, Serialize};

/// Final filtering stage applied to the resampled AM series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdrFilter {
    #[default]
    Bandpass,
    /// High-pass at the lower respiration edge only.
    Highpass,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmConfig {
    /// Trailing window searched for the beat onset (seconds).
    pub onset_window_s: f64,
    /// Rate of the uniform grid the beat features are resampled to (Hz).
    pub uniform_fs: f64,
    pub filter: EdrFilter,
    /// Clip features to their 1st..99th percentile before normalising.
    pub clip_outliers: bool,
}

impl Default for AmConfig {
    fn default() -> Self {
        Self {
            onset_window_s: 0.1,
            uniform_fs: 5.0,
            filter: EdrFilter::Bandpass,
            clip_outliers: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BwConfig {
    /// Half-width of the QRS mask around each beat (seconds).
    pub half_width_s: f64,
    pub band: BandConfig,
}

impl Default for BwConfig {
    fn default() -> Self {
        Self {
            half_width_s: 0.08,
            band: BandConfig {
                low_hz: 0.05,
                high_hz: 0.7,
                order: 4,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdrConfig {
    pub am: AmConfig,
    pub bw: BwConfig,
    /// Estimator applied to each window of an ECG-derived waveform.
    pub estimator: EstimatorKind,
}

impl Default for EdrConfig {
    fn default() -> Self {
        Self {
            am: AmConfig::default(),
            bw: BwConfig::default(),
            estimator: EstimatorKind::UpCrossing,
        }
    }
}

impl EdrConfig {
    pub fn validate(&self) -> Result<(), RespError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(RespError::InvalidConfig(format!("{name} must be positive, got {v}")))
            }
        };
        positive("edr.am.onset_window_s", self.am.onset_window_s)?;
        positive("edr.am.uniform_fs", self.am.uniform_fs)?;
        positive("edr.bw.half_width_s", self.bw.half_width_s)?;
        self.bw.band.validate()
    }
}

/// Output of the amplitude-modulation extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmEdr {
    /// Beats that produced a feature, with their onset amplitudes.
    pub beats: Vec<Beat>,
    pub feature_times: Vec<f64>,
    /// Mean-normalised R-minus-onset amplitudes.
    pub features: Vec<f64>,
    /// Filtered waveform on the uniform grid.
    pub edr: Waveform,
}

/// Output of the baseline-wander extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BwEdr {
    pub beats: Events,
    /// Filtered waveform on the ECG time axis.
    pub edr: Waveform,
}

const FLAT_TOLERANCE: f64 = 1e-9;

/// Beat-amplitude modulation EDR.
///
/// Each beat's feature is its raw amplitude minus the raw minimum in the
/// trailing onset window, stamped at the onset/beat midpoint. Beats with an
/// empty onset window are skipped.
pub fn amplitude_modulation(
    raw: &Waveform,
    beats: &Events,
    respiration: &BandConfig,
    cfg: &AmConfig,
) -> Result<AmEdr, RespError> {
    let values = raw.values();
    let time = raw.time();
    let reach = (cfg.onset_window_s * raw.fs()).round() as usize;

    let mut kept = Vec::with_capacity(beats.len());
    let mut feature_times = Vec::with_capacity(beats.len());
    let mut features = Vec::with_capacity(beats.len());
    for &b in beats.indices.iter().filter(|&&b| b < raw.len()) {
        let start = b.saturating_sub(reach);
        let Some(offset) = stats::argmin(&values[start..b]) else {
            continue;
        };
        let onset = start + offset;
        let t = 0.5 * (time[onset] + time[b]);
        if feature_times.last().is_some_and(|&prev| t <= prev) {
            continue;
        }
        feature_times.push(t);
        features.push(values[b] - values[onset]);
        kept.push(Beat {
            index: b,
            time: time[b],
            amplitude: values[b],
            onset_amplitude: Some(values[onset]),
        });
    }
    if features.len() < 2 {
        return Err(RespError::no_estimate(NoEstimateReason::TooFewBeats));
    }

    if cfg.clip_outliers {
        if let (Some(lo), Some(hi)) = (
            stats::percentile(&features, 1.0),
            stats::percentile(&features, 99.0),
        ) {
            features.iter_mut().for_each(|f| *f = f.clamp(lo, hi));
        }
    }

    let mean = stats::mean(&features).unwrap_or(0.0);
    if !(mean.is_finite() && mean != 0.0) {
        return Err(Shortfall::DegenerateNormalization.into());
    }
    features.iter_mut().for_each(|f| *f /= mean);
    if stats::std_dev(&features).is_some_and(|sd| sd <= FLAT_TOLERANCE) {
        return Err(RespError::no_estimate(NoEstimateReason::FlatSignal));
    }

    let (t0, t_end) = (time[0], time[time.len() - 1]);
    let step = 1.0 / cfg.uniform_fs;
    let grid: Vec<f64> = (0usize..)
        .map(|k| t0 + k as f64 * step)
        .take_while(|&t| t < t_end)
        .collect();
    let resampled: Vec<f64> = grid
        .iter()
        .map(|&t| stats::interp_extrapolate(&feature_times, &features, t))
        .collect();
    let uniform = Waveform::from_time(grid, resampled)?;

    let filtered = match cfg.filter {
        EdrFilter::Bandpass => filters::bandpass(
            uniform.values(),
            uniform.fs(),
            respiration.low_hz,
            respiration.high_hz,
            respiration.order,
        )?,
        EdrFilter::Highpass => filters::highpass(
            uniform.values(),
            uniform.fs(),
            respiration.low_hz,
            respiration.order,
        )?,
    };
    debug!(
        "AM EDR: {} features resampled to {} samples at {:.2} Hz",
        features.len(),
        uniform.len(),
        uniform.fs()
    );

    Ok(AmEdr {
        beats: kept,
        feature_times,
        features,
        edr: uniform.with_values(filtered)?,
    })
}

/// Replace `±half_width` samples around every beat by linear interpolation.
pub fn mask_qrs(values: &[f64], beats: &Events, half_width: usize) -> Vec<f64> {
    let mut masked: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    let Some(last) = values.len().checked_sub(1) else {
        return Vec::new();
    };
    for &b in &beats.indices {
        let lo = b.saturating_sub(half_width);
        let hi = (b + half_width).min(last);
        if lo <= hi {
            masked[lo..=hi].iter_mut().for_each(|v| *v = None);
        }
    }
    stats::fill_gaps(&masked)
}

/// Baseline-wander EDR. Beats are detected with `beat_cfg` when none are given.
pub fn baseline_wander(
    raw: &Waveform,
    beats: Option<&Events>,
    beat_cfg: &BeatDetectorConfig,
    cfg: &BwConfig,
) -> Result<BwEdr, RespError> {
    let beats = match beats {
        Some(events) if !events.is_empty() => events.clone(),
        _ => detect_beats(raw, beat_cfg)?,
    };
    if beats.len() < 2 {
        return Err(RespError::no_estimate(NoEstimateReason::TooFewBeats));
    }
    let half_width = ((cfg.half_width_s * raw.fs()).round() as usize).max(1);
    let filled = mask_qrs(raw.values(), &beats, half_width);
    let filtered = filters::bandpass(
        &filled,
        raw.fs(),
        cfg.band.low_hz,
        cfg.band.high_hz,
        cfg.band.order,
    )?;
    debug!("BW EDR: masked {} beats at ±{half_width} samples", beats.len());
    Ok(BwEdr {
        beats,
        edr: raw.with_values(filtered)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::ecg::detect_beats_with_band;
    use crate::estimators::{Estimator, RateBand, Spectral, SpectralConfig};
    use crate::synth::SyntheticEcg;

    fn respiration() -> BandConfig {
        BandConfig::default()
    }

    fn spectral_brpm(wf: &Waveform) -> f64 {
        Spectral::new(SpectralConfig::default(), RateBand::SEARCH)
            .estimate(wf)
            .brpm()
            .expect("in-band peak")
    }

    #[test]
    fn am_tracks_amplitude_modulation() {
        let synth = SyntheticEcg {
            am_depth: 0.3,
            ..Default::default()
        };
        let ecg = synth.waveform();
        let cfg = BeatDetectorConfig::default();
        let beats = detect_beats_with_band(&ecg, &cfg, cfg.am_qrs_high_hz).expect("beats");
        let am = amplitude_modulation(&ecg, &beats, &respiration(), &AmConfig::default())
            .expect("modulated");
        assert!((am.edr.fs() - 5.0).abs() < 1e-6);
        assert_eq!(am.edr.len(), 300);
        assert!(am.beats.iter().all(|b| b.onset_amplitude.is_some()));
        let mean = stats::mean(&am.features).expect("features");
        assert!((mean - 1.0).abs() < 1e-9);
        assert!((spectral_brpm(&am.edr) - 15.0).abs() < 0.5);
    }

    #[test]
    fn am_highpass_mode_keeps_breathing_rate() {
        let synth = SyntheticEcg {
            am_depth: 0.3,
            ..Default::default()
        };
        let ecg = synth.waveform();
        let beats = detect_beats(&ecg, &BeatDetectorConfig::default()).expect("beats");
        let cfg = AmConfig {
            filter: EdrFilter::Highpass,
            clip_outliers: true,
            ..Default::default()
        };
        let am = amplitude_modulation(&ecg, &beats, &respiration(), &cfg).expect("modulated");
        assert!((spectral_brpm(&am.edr) - 15.0).abs() < 0.5);
    }

    #[test]
    fn uniform_beats_are_flat_not_wrong() {
        let ecg = SyntheticEcg::default().waveform();
        let beats = detect_beats(&ecg, &BeatDetectorConfig::default()).expect("beats");
        let err = amplitude_modulation(&ecg, &beats, &respiration(), &AmConfig::default())
            .unwrap_err();
        assert_eq!(err, RespError::no_estimate(NoEstimateReason::FlatSignal));
    }

    #[test]
    fn am_needs_two_usable_beats() {
        let ecg = SyntheticEcg::default().waveform();
        // the beat at index 0 has an empty onset window
        let events = Events::from_indices(vec![0, 125]);
        let err = amplitude_modulation(&ecg, &events, &respiration(), &AmConfig::default())
            .unwrap_err();
        assert_eq!(err, RespError::no_estimate(NoEstimateReason::TooFewBeats));
    }

    #[test]
    fn flat_record_cannot_be_normalised() {
        let ecg = Waveform::uniform(vec![1.0; 1000], 100.0, 0.0).expect("uniform");
        let events = Events::from_indices(vec![100, 300, 500]);
        let err = amplitude_modulation(&ecg, &events, &respiration(), &AmConfig::default())
            .unwrap_err();
        assert_eq!(err, Shortfall::DegenerateNormalization.into());
    }

    #[test]
    fn mask_interpolates_across_beats() {
        let values: Vec<f64> = (0..10).map(f64::from).collect();
        let mut spiked = values.clone();
        spiked[4] = 100.0;
        let out = mask_qrs(&spiked, &Events::from_indices(vec![4]), 1);
        assert_eq!(out, values);
        let all = mask_qrs(&spiked, &Events::from_indices(vec![2, 7]), 5);
        assert_eq!(all, vec![0.0; 10]);
    }

    #[test]
    fn bw_recovers_wander_rate() {
        let synth = SyntheticEcg {
            wander: 0.3,
            ..Default::default()
        };
        let ecg = synth.waveform();
        let bw = baseline_wander(&ecg, None, &BeatDetectorConfig::default(), &BwConfig::default())
            .expect("beats present");
        assert_eq!(bw.edr.len(), ecg.len());
        assert_eq!(bw.edr.fs(), ecg.fs());
        assert!(bw.beats.len() > 60);
        assert!((spectral_brpm(&bw.edr) - 15.0).abs() < 0.5);
    }

    #[test]
    fn bw_without_beats_is_no_estimate() {
        let ecg = Waveform::uniform(vec![0.0; 1000], 100.0, 0.0).expect("uniform");
        let err = baseline_wander(&ecg, None, &BeatDetectorConfig::default(), &BwConfig::default())
            .unwrap_err();
        assert_eq!(err, RespError::no_estimate(NoEstimateReason::TooFewBeats));
    }
}
