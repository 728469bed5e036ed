use super::{EstimateDetail, Estimator, Method, RateBand, RateEstimate, RateResult};
use crate::error::{NoEstimateReason, RespError, Shortfall};
use crate::peaks::local_maxima;
use crate::signal::Waveform;
use log::trace;
use realfft::num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutocorrelationConfig {
    /// Shortest waveform (seconds) the lag search is attempted on.
    pub min_duration_s: f64,
}

impl Default for AutocorrelationConfig {
    fn default() -> Self {
        Self {
            min_duration_s: 5.0,
        }
    }
}

impl AutocorrelationConfig {
    pub fn validate(&self) -> Result<(), RespError> {
        if !(self.min_duration_s.is_finite() && self.min_duration_s >= 0.0) {
            return Err(RespError::InvalidConfig(format!(
                "autocorrelation min_duration_s must be non-negative, got {}",
                self.min_duration_s
            )));
        }
        Ok(())
    }
}

/// One-sided linear autocorrelation `ac[k] = sum x[i] x[i + k]`, `k in 0..n`,
/// computed through a zero-padded FFT.
pub fn autocorrelation(x: &[f64]) -> Result<Vec<f64>, Shortfall> {
    let n = x.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let padded = 2 * n;
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(padded);
    let c2r = planner.plan_fft_inverse(padded);

    let mut buffer = vec![0.0; padded];
    buffer[..n].copy_from_slice(x);
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut buffer, &mut spectrum)
        .map_err(|_| Shortfall::no_estimate(NoEstimateReason::NumericalFailure))?;
    for bin in spectrum.iter_mut() {
        *bin = Complex::new(bin.norm_sqr(), 0.0);
    }
    let mut out = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut out)
        .map_err(|_| Shortfall::no_estimate(NoEstimateReason::NumericalFailure))?;

    let scale = 1.0 / padded as f64;
    out.truncate(n);
    out.iter_mut().for_each(|v| *v *= scale);
    Ok(out)
}

/// Rate from the strongest autocorrelation peak whose lag lies between
/// `60 / max_brpm` and `60 / min_brpm` seconds.
pub fn autocorrelation_rate(
    x: &[f64],
    fs: f64,
    band: RateBand,
    min_duration_s: f64,
) -> Result<RateEstimate, Shortfall> {
    let n = x.len();
    let required = (min_duration_s * fs).ceil() as usize;
    if n < required.max(2) {
        return Err(Shortfall::InsufficientSamples {
            required: required.max(2),
            actual: n,
        });
    }
    let ac = autocorrelation(x)?;
    if !(ac[0] > 0.0) {
        return Err(Shortfall::no_estimate(NoEstimateReason::FlatSignal));
    }

    let min_lag = ((60.0 / band.max_brpm * fs).floor() as usize).max(1);
    let max_lag = ((60.0 / band.min_brpm * fs).floor() as usize).min(n);
    if max_lag <= min_lag {
        return Err(Shortfall::no_estimate(NoEstimateReason::EmptySearchRange));
    }
    trace!("autocorrelation lag search {min_lag}..{max_lag} samples");

    let best = local_maxima(&ac)
        .into_iter()
        .filter(|&k| k >= min_lag && k < max_lag)
        .fold(None, |best: Option<usize>, k| match best {
            Some(b) if ac[b] >= ac[k] => Some(b),
            _ => Some(k),
        })
        .ok_or(Shortfall::no_estimate(NoEstimateReason::NoPeakInRange))?;

    let lag_s = best as f64 / fs;
    Ok(RateEstimate {
        brpm: 60.0 / lag_s,
        detail: EstimateDetail::Autocorrelation { lag_s },
    })
}

/// Autocorrelation-peak estimator.
#[derive(Debug, Clone, Copy)]
pub struct Autocorrelation {
    cfg: AutocorrelationConfig,
    band: RateBand,
}

impl Autocorrelation {
    pub fn new(cfg: AutocorrelationConfig, band: RateBand) -> Self {
        Self { cfg, band }
    }
}

impl Estimator for Autocorrelation {
    fn method(&self) -> Method {
        Method::Autocorrelation
    }

    fn estimate(&self, waveform: &Waveform) -> RateResult {
        autocorrelation_rate(
            waveform.values(),
            waveform.fs(),
            self.band,
            self.cfg.min_duration_s,
        )
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::sine;

    #[test]
    fn fft_autocorrelation_matches_direct_sum() {
        let x = [1.0, 2.0, -1.0, 0.5, 3.0];
        let ac = autocorrelation(&x).expect("fft");
        for k in 0..x.len() {
            let direct: f64 = (0..x.len() - k).map(|i| x[i] * x[i + k]).sum();
            assert!((ac[k] - direct).abs() < 1e-9, "lag {k}: {} vs {direct}", ac[k]);
        }
    }

    #[test]
    fn recovers_sine_period() {
        let wf = sine(10.0, 0.25, 60.0, 1.0);
        let est = Autocorrelation::new(AutocorrelationConfig::default(), RateBand::SEARCH)
            .estimate(&wf);
        let brpm = est.brpm().expect("periodic input");
        assert!((brpm - 15.0).abs() < 0.5, "got {brpm}");
    }

    #[test]
    fn short_input_is_insufficient() {
        let wf = sine(10.0, 0.25, 4.0, 1.0);
        let est = Autocorrelation::new(AutocorrelationConfig::default(), RateBand::SEARCH)
            .estimate(&wf);
        assert_eq!(
            est,
            RateResult::NoEstimate(Shortfall::InsufficientSamples {
                required: 50,
                actual: 40
            })
        );
    }

    #[test]
    fn flat_input_has_no_estimate() {
        let est = autocorrelation_rate(&[0.0; 100], 10.0, RateBand::SEARCH, 5.0);
        assert_eq!(
            est,
            Err(Shortfall::no_estimate(NoEstimateReason::FlatSignal))
        );
    }

    #[test]
    fn narrow_band_can_be_empty() {
        let x: Vec<f64> = (0..100).map(|i| (i as f64 * 0.3).sin()).collect();
        // 60/29 s and 60/30 s both floor to lag 2 at 1 Hz.
        let band = RateBand {
            min_brpm: 29.0,
            max_brpm: 30.0,
        };
        assert_eq!(
            autocorrelation_rate(&x, 1.0, band, 5.0),
            Err(Shortfall::no_estimate(NoEstimateReason::EmptySearchRange))
        );
    }
}
