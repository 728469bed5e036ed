use super::{EstimateDetail, Estimator, Method, RateEstimate, RateResult};
use crate::error::{NoEstimateReason, RespError, Shortfall};
use crate::peaks::{find_peaks, PeakCriteria};
use crate::signal::Waveform;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakIntervalConfig {
    /// Minimum spacing between breath peaks (seconds).
    pub min_distance_s: f64,
    pub min_prominence: Option<f64>,
}

impl Default for PeakIntervalConfig {
    fn default() -> Self {
        Self {
            min_distance_s: 1.0,
            min_prominence: None,
        }
    }
}

impl PeakIntervalConfig {
    pub fn validate(&self) -> Result<(), RespError> {
        if !(self.min_distance_s.is_finite() && self.min_distance_s >= 0.0) {
            return Err(RespError::InvalidConfig(format!(
                "peak-interval min_distance_s must be non-negative, got {}",
                self.min_distance_s
            )));
        }
        if let Some(p) = self.min_prominence {
            if !(p.is_finite() && p >= 0.0) {
                return Err(RespError::InvalidConfig(format!(
                    "peak-interval prominence must be non-negative, got {p}"
                )));
            }
        }
        Ok(())
    }
}

/// `60 / mean(diff(times))`. Needs two peaks and a positive mean interval.
pub fn rate_from_peak_times(times: &[f64]) -> Result<RateEstimate, Shortfall> {
    if times.len() < 2 {
        return Err(Shortfall::no_estimate(NoEstimateReason::TooFewPeaks));
    }
    let span = times[times.len() - 1] - times[0];
    let mean_interval_s = span / (times.len() - 1) as f64;
    if !(mean_interval_s > 0.0) {
        return Err(Shortfall::no_estimate(NoEstimateReason::NonPositiveInterval));
    }
    Ok(RateEstimate {
        brpm: 60.0 / mean_interval_s,
        detail: EstimateDetail::PeakInterval {
            peaks: times.len(),
            mean_interval_s,
        },
    })
}

/// Breath-peak interval estimator.
#[derive(Debug, Clone, Copy)]
pub struct PeakInterval {
    cfg: PeakIntervalConfig,
}

impl PeakInterval {
    pub fn new(cfg: PeakIntervalConfig) -> Self {
        Self { cfg }
    }

    /// Breath peak indices in `waveform`.
    pub fn peaks(&self, waveform: &Waveform) -> Vec<usize> {
        let criteria = PeakCriteria {
            distance: Some(((self.cfg.min_distance_s * waveform.fs()).round() as usize).max(1)),
            prominence: self.cfg.min_prominence,
            width: None,
        };
        find_peaks(waveform.values(), &criteria)
    }
}

impl Estimator for PeakInterval {
    fn method(&self) -> Method {
        Method::PeakInterval
    }

    fn estimate(&self, waveform: &Waveform) -> RateResult {
        let times: Vec<f64> = self
            .peaks(waveform)
            .into_iter()
            .map(|i| waveform.time()[i])
            .collect();
        rate_from_peak_times(&times).into()
    }
}
