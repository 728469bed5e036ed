use super::{EstimateDetail, Estimator, Method, RateBand, RateEstimate, RateResult};
use crate::error::{NoEstimateReason, RespError, Shortfall};
use crate::signal::Waveform;
use crate::stats;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpectralMethod {
    /// Magnitude of a single transform over the whole window.
    #[default]
    Periodogram,
    /// Averaged Hann-windowed segments with 50 % overlap.
    Welch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    pub method: SpectralMethod,
    /// Welch segment length in seconds, capped at the signal length.
    pub welch_segment_s: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            method: SpectralMethod::Periodogram,
            welch_segment_s: 30.0,
        }
    }
}

impl SpectralConfig {
    pub fn validate(&self) -> Result<(), RespError> {
        if !(self.welch_segment_s.is_finite() && self.welch_segment_s > 0.0) {
            return Err(RespError::InvalidConfig(format!(
                "welch_segment_s must be positive, got {}",
                self.welch_segment_s
            )));
        }
        Ok(())
    }
}

/// One-sided spectrum: bin frequencies and their (magnitude or power) values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    pub freqs: Vec<f64>,
    pub values: Vec<f64>,
}

fn rfft_freqs(n: usize, fs: f64) -> Vec<f64> {
    (0..n / 2 + 1).map(|k| k as f64 * fs / n as f64).collect()
}

fn check_len(n: usize) -> Result<(), Shortfall> {
    if n < 2 {
        return Err(Shortfall::InsufficientSamples {
            required: 2,
            actual: n,
        });
    }
    Ok(())
}

/// Magnitude of the real FFT of the whole signal.
pub fn periodogram(x: &[f64], fs: f64) -> Result<Spectrum, Shortfall> {
    check_len(x.len())?;
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(x.len());
    let mut buffer = x.to_vec();
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut buffer, &mut spectrum)
        .map_err(|_| Shortfall::no_estimate(NoEstimateReason::NumericalFailure))?;
    Ok(Spectrum {
        freqs: rfft_freqs(x.len(), fs),
        values: spectrum.iter().map(|c| c.norm()).collect(),
    })
}

/// Welch power spectral density: Hann window, 50 % overlap, per-segment mean
/// removal, one-sided density scaling.
pub fn welch(x: &[f64], fs: f64, segment_s: f64) -> Result<Spectrum, Shortfall> {
    let n = x.len();
    check_len(n)?;
    let window = ((segment_s * fs) as usize).clamp(2, n);
    let step = window - window / 2;
    let taper = hann(window);
    let scale = 1.0 / (fs * taper.iter().map(|w| w * w).sum::<f64>());

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(window);
    let mut spectrum = r2c.make_output_vec();
    let mut powers = vec![0.0; spectrum.len()];
    let mut segments = 0usize;
    let mut pos = 0;
    while pos + window <= n {
        let slice = &x[pos..pos + window];
        let offset = stats::mean(slice).unwrap_or(0.0);
        let mut frame: Vec<f64> = slice
            .iter()
            .zip(&taper)
            .map(|(v, w)| (v - offset) * w)
            .collect();
        r2c.process(&mut frame, &mut spectrum)
            .map_err(|_| Shortfall::no_estimate(NoEstimateReason::NumericalFailure))?;
        for (k, val) in spectrum.iter().enumerate() {
            let one_sided = k == 0 || (window % 2 == 0 && k == window / 2);
            let power = if one_sided { 1.0 } else { 2.0 } * val.norm_sqr() * scale;
            powers[k] += power;
        }
        segments += 1;
        pos += step;
    }
    powers.iter_mut().for_each(|p| *p /= segments as f64);
    Ok(Spectrum {
        freqs: rfft_freqs(window, fs),
        values: powers,
    })
}

fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

/// Rate at the strongest bin inside `[low_hz, high_hz]` (inclusive).
pub fn spectral_rate(
    spectrum: &Spectrum,
    low_hz: f64,
    high_hz: f64,
) -> Result<RateEstimate, Shortfall> {
    // bins ascend, so the band is one contiguous run
    let lo = spectrum.freqs.partition_point(|&f| f < low_hz);
    let hi = spectrum.freqs.partition_point(|&f| f <= high_hz).max(lo);
    let best = stats::argmax(&spectrum.values[lo..hi])
        .ok_or(Shortfall::no_estimate(NoEstimateReason::EmptyBand))?;
    let (peak_hz, peak) = (spectrum.freqs[lo + best], spectrum.values[lo + best]);
    if !(peak > 0.0) {
        return Err(Shortfall::no_estimate(NoEstimateReason::FlatSignal));
    }
    Ok(RateEstimate {
        brpm: 60.0 * peak_hz,
        detail: EstimateDetail::Spectral { peak_hz },
    })
}

/// Spectral-peak estimator over the breathing band.
#[derive(Debug, Clone, Copy)]
pub struct Spectral {
    cfg: SpectralConfig,
    band: RateBand,
}

impl Spectral {
    pub fn new(cfg: SpectralConfig, band: RateBand) -> Self {
        Self { cfg, band }
    }

    fn run(&self, waveform: &Waveform) -> Result<RateEstimate, Shortfall> {
        let spectrum = match self.cfg.method {
            SpectralMethod::Periodogram => periodogram(waveform.values(), waveform.fs())?,
            SpectralMethod::Welch => {
                welch(waveform.values(), waveform.fs(), self.cfg.welch_segment_s)?
            }
        };
        spectral_rate(&spectrum, self.band.low_hz(), self.band.high_hz())
    }
}

impl Estimator for Spectral {
    fn method(&self) -> Method {
        Method::Spectral
    }

    fn estimate(&self, waveform: &Waveform) -> RateResult {
        self.run(waveform).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::sine;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn periodogram_finds_in_band_peak() {
        let wf = sine(10.0, 0.25, 60.0, 1.0);
        let est = Spectral::new(SpectralConfig::default(), RateBand::SEARCH).estimate(&wf);
        assert_close(est.brpm().expect("in band"), 15.0, 1e-9);
    }

    #[test]
    fn out_of_band_energy_is_ignored() {
        let strong = sine(10.0, 1.0, 60.0, 5.0);
        let weak = sine(10.0, 0.3, 60.0, 1.0);
        let mixed: Vec<f64> = strong
            .values()
            .iter()
            .zip(weak.values())
            .map(|(a, b)| a + b)
            .collect();
        let wf = strong.with_values(mixed).expect("same axis");
        let est = Spectral::new(SpectralConfig::default(), RateBand::SEARCH).estimate(&wf);
        assert_close(est.brpm().expect("in band"), 18.0, 1e-9);
    }

    #[test]
    fn welch_resolves_segment_bin() {
        let wf = sine(10.0, 0.2, 120.0, 1.0);
        let cfg = SpectralConfig {
            method: SpectralMethod::Welch,
            ..Default::default()
        };
        let est = Spectral::new(cfg, RateBand::SEARCH).estimate(&wf);
        assert_close(est.brpm().expect("in band"), 12.0, 1e-9);
    }

    #[test]
    fn welch_density_integrates_to_variance() {
        let wf = sine(10.0, 1.0, 60.0, 2.0);
        let psd = welch(wf.values(), 10.0, 30.0).expect("long enough");
        let df = psd.freqs[1] - psd.freqs[0];
        let power: f64 = psd.values.iter().sum::<f64>() * df;
        // sine of amplitude 2 has variance 2
        assert_close(power, 2.0, 0.05);
    }

    #[test]
    fn empty_band_and_flat_signal() {
        let two = periodogram(&[1.0, -1.0], 10.0).expect("two samples");
        assert_eq!(
            spectral_rate(&two, 0.1, 0.5),
            Err(Shortfall::no_estimate(NoEstimateReason::EmptyBand))
        );
        let flat = periodogram(&[0.0; 600], 10.0).expect("long enough");
        assert_eq!(
            spectral_rate(&flat, 0.1, 0.5),
            Err(Shortfall::no_estimate(NoEstimateReason::FlatSignal))
        );
        assert_eq!(
            periodogram(&[], 10.0),
            Err(Shortfall::InsufficientSamples {
                required: 2,
                actual: 0
            })
        );
    }

    #[test]
    fn band_edges_inclusive_and_first_tie_wins() {
        let spectrum = Spectrum {
            freqs: vec![0.0, 0.1, 0.2, 0.3, 0.4],
            values: vec![9.0, 2.0, 5.0, 5.0, 8.0],
        };
        let est = spectral_rate(&spectrum, 0.1, 0.3).expect("in band");
        assert_close(est.brpm, 12.0, 1e-9);
        let edge = spectral_rate(&spectrum, 0.35, 0.4).expect("upper edge");
        assert_close(edge.brpm, 24.0, 1e-9);
    }
}
