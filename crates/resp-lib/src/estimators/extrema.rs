use super::{EstimateDetail, Estimator, Method, RateEstimate, RateResult};
use crate::error::{NoEstimateReason, RespError, Shortfall};
use crate::signal::Waveform;
use crate::stats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtremaConfig {
    /// Peaks must exceed this fraction of the 75th percentile of all maxima.
    pub threshold_factor: f64,
    pub min_cycle_s: f64,
    pub max_cycle_s: f64,
    /// Subtract the window mean before searching.
    pub zero_center: bool,
}

impl Default for ExtremaConfig {
    fn default() -> Self {
        Self {
            threshold_factor: 0.2,
            min_cycle_s: 2.0,
            max_cycle_s: 10.0,
            zero_center: true,
        }
    }
}

impl ExtremaConfig {
    pub fn validate(&self) -> Result<(), RespError> {
        if !(self.min_cycle_s > 0.0 && self.min_cycle_s <= self.max_cycle_s) {
            return Err(RespError::InvalidConfig(format!(
                "extrema cycle bounds must satisfy 0 < min <= max, got {}..{} s",
                self.min_cycle_s, self.max_cycle_s
            )));
        }
        if !self.threshold_factor.is_finite() {
            return Err(RespError::InvalidConfig(
                "extrema threshold_factor must be finite".into(),
            ));
        }
        Ok(())
    }
}

const MIN_SAMPLES: usize = 5;

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Local maxima and minima located where the sign of the first difference
/// drops or rises.
pub fn extrema(x: &[f64]) -> (Vec<usize>, Vec<usize>) {
    let signs: Vec<i8> = x.windows(2).map(|w| sign(w[1] - w[0])).collect();
    let mut maxima = Vec::new();
    let mut minima = Vec::new();
    for (i, pair) in signs.windows(2).enumerate() {
        match pair[1] - pair[0] {
            d if d < 0 => maxima.push(i + 1),
            d if d > 0 => minima.push(i + 1),
            _ => {}
        }
    }
    (maxima, minima)
}

/// Count breathing cycles between consecutive qualifying maxima.
pub fn extrema_cycles(
    values: &[f64],
    time: &[f64],
    cfg: &ExtremaConfig,
) -> Result<RateEstimate, Shortfall> {
    if values.len() < MIN_SAMPLES {
        return Err(Shortfall::InsufficientSamples {
            required: MIN_SAMPLES,
            actual: values.len(),
        });
    }
    let offset = if cfg.zero_center {
        stats::mean(values).unwrap_or(0.0)
    } else {
        0.0
    };
    let x: Vec<f64> = values.iter().map(|v| v - offset).collect();
    let (maxima, minima) = extrema(&x);

    let peak_heights: Vec<f64> = maxima.iter().map(|&i| x[i]).collect();
    let p75 = stats::percentile(&peak_heights, 75.0)
        .ok_or(Shortfall::no_estimate(NoEstimateReason::NoMaxima))?;
    let threshold = cfg.threshold_factor * p75;

    let peaks: Vec<usize> = maxima.into_iter().filter(|&i| x[i] > threshold).collect();
    let troughs: Vec<usize> = minima.into_iter().filter(|&i| x[i] < 0.0).collect();
    if troughs.is_empty() {
        return Err(Shortfall::no_estimate(NoEstimateReason::NoTroughs));
    }

    let durations: Vec<f64> = peaks
        .windows(2)
        .filter(|pair| {
            troughs
                .iter()
                .filter(|&&t| t > pair[0] && t < pair[1])
                .count()
                == 1
        })
        .map(|pair| time[pair[1]] - time[pair[0]])
        .filter(|d| (cfg.min_cycle_s..=cfg.max_cycle_s).contains(d))
        .collect();
    let mean_cycle = stats::mean(&durations)
        .ok_or(Shortfall::no_estimate(NoEstimateReason::NoValidCycles))?;

    Ok(RateEstimate {
        brpm: 60.0 / mean_cycle,
        detail: EstimateDetail::ExtremaCycles {
            cycles: durations.len(),
            threshold,
        },
    })
}

/// Extrema-cycle estimator.
#[derive(Debug, Clone, Copy)]
pub struct ExtremaCycles {
    cfg: ExtremaConfig,
}

impl ExtremaCycles {
    pub fn new(cfg: ExtremaConfig) -> Self {
        Self { cfg }
    }
}

impl Estimator for ExtremaCycles {
    fn method(&self) -> Method {
        Method::ExtremaCycles
    }

    fn estimate(&self, waveform: &Waveform) -> RateResult {
        extrema_cycles(waveform.values(), waveform.time(), &self.cfg).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::sine;

    #[test]
    fn finds_sign_change_extrema() {
        let x = [0.0, 1.0, 0.0, -1.0, 0.0, 2.0, 1.0];
        let (maxima, minima) = extrema(&x);
        assert_eq!(maxima, vec![1, 5]);
        assert_eq!(minima, vec![3]);
    }

    #[test]
    fn counts_sine_cycles() {
        let wf = sine(5.0, 0.25, 60.0, 1.0);
        let est = ExtremaCycles::new(ExtremaConfig::default()).estimate(&wf);
        assert!((est.brpm().expect("cycles") - 15.0).abs() < 1e-6);
        assert_eq!(est.count(), 14);
        let threshold = est.threshold().expect("threshold");
        assert!((threshold - 0.2).abs() < 0.01, "threshold {threshold}");
    }

    #[test]
    fn fast_oscillation_has_no_valid_cycles() {
        let wf = sine(20.0, 1.0, 20.0, 1.0);
        assert_eq!(
            ExtremaCycles::new(ExtremaConfig::default()).estimate(&wf),
            RateResult::none(NoEstimateReason::NoValidCycles)
        );
    }

    #[test]
    fn positive_signal_without_centering_has_no_troughs() {
        let wf = sine(5.0, 0.25, 30.0, 1.0);
        let lifted: Vec<f64> = wf.values().iter().map(|v| v + 5.0).collect();
        let wf = wf.with_values(lifted).expect("same axis");
        let cfg = ExtremaConfig {
            zero_center: false,
            ..Default::default()
        };
        assert_eq!(
            ExtremaCycles::new(cfg).estimate(&wf),
            RateResult::none(NoEstimateReason::NoTroughs)
        );
        assert!(ExtremaCycles::new(ExtremaConfig::default())
            .estimate(&wf)
            .is_estimate());
    }

    #[test]
    fn degenerate_inputs() {
        let cfg = ExtremaConfig::default();
        let time: Vec<f64> = (0..10).map(f64::from).collect();
        assert_eq!(
            extrema_cycles(&[1.0; 10], &time, &cfg),
            Err(Shortfall::no_estimate(NoEstimateReason::NoMaxima))
        );
        assert_eq!(
            extrema_cycles(&[1.0, 2.0, 3.0], &time[..3], &cfg),
            Err(Shortfall::InsufficientSamples {
                required: 5,
                actual: 3
            })
        );
    }
}
