//! Respiratory-rate estimators.
//!
//! Every estimator maps a band-limited [`Waveform`] to a [`RateResult`]: a
//! finite rate with its diagnostic detail, or an explicit no-estimate marker
//! carrying the shortfall that caused it.

pub mod autocorr;
pub mod extrema;
pub mod peak_interval;
pub mod spectral;
pub mod upcross;

pub use autocorr::{Autocorrelation, AutocorrelationConfig};
pub use extrema::{ExtremaCycles, ExtremaConfig};
pub use peak_interval::{PeakInterval, PeakIntervalConfig};
pub use spectral::{Spectral, SpectralConfig, SpectralMethod};
pub use upcross::{UpCrossing, UpCrossingConfig};

use crate::error::{NoEstimateReason, RespError, Shortfall};
use crate::signal::Waveform;
use log::debug;
use serde::{Deserialize, Serialize};

/// Which algorithm produced a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Autocorrelation,
    Spectral,
    PeakInterval,
    UpCrossing,
    ExtremaCycles,
    Fused,
}

/// One rate that contributed to a fused estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub method: Method,
    pub brpm: f64,
}

/// Per-family diagnostics attached to a successful estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum EstimateDetail {
    Autocorrelation { lag_s: f64 },
    Spectral { peak_hz: f64 },
    PeakInterval { peaks: usize, mean_interval_s: f64 },
    UpCrossing { crossings: usize, threshold: f64 },
    ExtremaCycles { cycles: usize, threshold: f64 },
    Fused { contributors: Vec<Contribution> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEstimate {
    /// Breaths per minute; always finite.
    pub brpm: f64,
    pub detail: EstimateDetail,
}

impl RateEstimate {
    pub fn method(&self) -> Method {
        match self.detail {
            EstimateDetail::Autocorrelation { .. } => Method::Autocorrelation,
            EstimateDetail::Spectral { .. } => Method::Spectral,
            EstimateDetail::PeakInterval { .. } => Method::PeakInterval,
            EstimateDetail::UpCrossing { .. } => Method::UpCrossing,
            EstimateDetail::ExtremaCycles { .. } => Method::ExtremaCycles,
            EstimateDetail::Fused { .. } => Method::Fused,
        }
    }
}

/// Outcome of one estimator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateResult {
    Estimate(RateEstimate),
    NoEstimate(Shortfall),
}

impl RateResult {
    pub fn none(reason: NoEstimateReason) -> Self {
        RateResult::NoEstimate(Shortfall::no_estimate(reason))
    }

    /// Fold a data shortfall into a no-estimate marker; caller errors pass
    /// through unchanged.
    pub fn from_error(err: RespError) -> Result<Self, RespError> {
        err.into_shortfall().map(RateResult::NoEstimate)
    }

    pub fn brpm(&self) -> Option<f64> {
        match self {
            RateResult::Estimate(e) => Some(e.brpm),
            RateResult::NoEstimate(_) => None,
        }
    }

    pub fn is_estimate(&self) -> bool {
        matches!(self, RateResult::Estimate(_))
    }

    /// Event count behind the rate (crossings, cycles, peaks); zero otherwise.
    pub fn count(&self) -> usize {
        match self {
            RateResult::Estimate(RateEstimate { detail, .. }) => match detail {
                EstimateDetail::UpCrossing { crossings, .. } => *crossings,
                EstimateDetail::ExtremaCycles { cycles, .. } => *cycles,
                EstimateDetail::PeakInterval { peaks, .. } => *peaks,
                _ => 0,
            },
            RateResult::NoEstimate(_) => 0,
        }
    }

    pub fn threshold(&self) -> Option<f64> {
        match self {
            RateResult::Estimate(RateEstimate {
                detail:
                    EstimateDetail::UpCrossing { threshold, .. }
                    | EstimateDetail::ExtremaCycles { threshold, .. },
                ..
            }) => Some(*threshold),
            _ => None,
        }
    }
}

impl From<Result<RateEstimate, Shortfall>> for RateResult {
    fn from(result: Result<RateEstimate, Shortfall>) -> Self {
        match result {
            Ok(estimate) => RateResult::Estimate(estimate),
            Err(shortfall) => RateResult::NoEstimate(shortfall),
        }
    }
}

/// Breaths-per-minute interval used to bound searches and accept results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateBand {
    pub min_brpm: f64,
    pub max_brpm: f64,
}

impl RateBand {
    pub const SEARCH: RateBand = RateBand {
        min_brpm: 6.0,
        max_brpm: 30.0,
    };
    pub const FUSED: RateBand = RateBand {
        min_brpm: 8.0,
        max_brpm: 26.0,
    };

    pub fn validate(&self, what: &str) -> Result<(), RespError> {
        if !(self.min_brpm > 0.0 && self.min_brpm < self.max_brpm && self.max_brpm.is_finite()) {
            return Err(RespError::InvalidConfig(format!(
                "{what} band must satisfy 0 < min < max, got {}..{} brpm",
                self.min_brpm, self.max_brpm
            )));
        }
        Ok(())
    }

    /// Strictly inside the band.
    pub fn accepts(&self, brpm: f64) -> bool {
        brpm.is_finite() && brpm > self.min_brpm && brpm < self.max_brpm
    }

    pub fn low_hz(&self) -> f64 {
        self.min_brpm / 60.0
    }

    pub fn high_hz(&self) -> f64 {
        self.max_brpm / 60.0
    }
}

/// A respiratory-rate algorithm applied to one waveform window.
pub trait Estimator {
    fn method(&self) -> Method;
    fn estimate(&self, waveform: &Waveform) -> RateResult;
}

/// Mean of the rates strictly inside `band`, or `None` when nothing survives.
pub fn fuse_rates(rates: &[f64], band: RateBand) -> Option<f64> {
    let kept: Vec<f64> = rates.iter().copied().filter(|&r| band.accepts(r)).collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.iter().sum::<f64>() / kept.len() as f64)
    }
}

/// Fuse several estimator outcomes, keeping only in-band rates.
pub fn fuse(results: &[(Method, RateResult)], band: RateBand) -> RateResult {
    let contributors: Vec<Contribution> = results
        .iter()
        .filter_map(|(method, result)| {
            result.brpm().map(|brpm| Contribution {
                method: *method,
                brpm,
            })
        })
        .filter(|c| band.accepts(c.brpm))
        .collect();
    let rates: Vec<f64> = contributors.iter().map(|c| c.brpm).collect();
    match fuse_rates(&rates, band) {
        Some(brpm) => {
            debug!("fused {} of {} rates -> {brpm:.2} brpm", rates.len(), results.len());
            RateResult::Estimate(RateEstimate {
                brpm,
                detail: EstimateDetail::Fused { contributors },
            })
        }
        None => RateResult::none(NoEstimateReason::NoneInBand),
    }
}

/// Runs several estimators on the same waveform and fuses their rates.
pub struct Fusion {
    members: Vec<Box<dyn Estimator>>,
    band: RateBand,
}

impl Fusion {
    pub fn new(members: Vec<Box<dyn Estimator>>, band: RateBand) -> Self {
        Self { members, band }
    }

    pub fn estimate_all(&self, waveform: &Waveform) -> Vec<(Method, RateResult)> {
        self.members
            .iter()
            .map(|m| (m.method(), m.estimate(waveform)))
            .collect()
    }
}

impl Estimator for Fusion {
    fn method(&self) -> Method {
        Method::Fused
    }

    fn estimate(&self, waveform: &Waveform) -> RateResult {
        fuse(&self.estimate_all(waveform), self.band)
    }
}

/// Estimator selection for batch runs and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EstimatorKind {
    /// Autocorrelation and spectral peak, fused.
    #[default]
    Fused,
    Autocorrelation,
    Spectral,
    PeakInterval,
    UpCrossing,
    Extrema,
}

/// Parameters for every estimator family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub autocorrelation: AutocorrelationConfig,
    pub spectral: SpectralConfig,
    pub peak_interval: PeakIntervalConfig,
    pub up_crossing: UpCrossingConfig,
    pub extrema: ExtremaConfig,
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), RespError> {
        self.autocorrelation.validate()?;
        self.spectral.validate()?;
        self.peak_interval.validate()?;
        self.extrema.validate()
    }
}

/// Instantiate an estimator. `search` bounds the autocorrelation lag range and
/// the spectral band; `fused` is the acceptance band for [`EstimatorKind::Fused`].
pub fn build_estimator(
    kind: EstimatorKind,
    cfg: &EstimatorConfig,
    search: RateBand,
    fused: RateBand,
) -> Box<dyn Estimator> {
    match kind {
        EstimatorKind::Fused => Box::new(Fusion::new(
            vec![
                Box::new(Autocorrelation::new(cfg.autocorrelation, search)),
                Box::new(Spectral::new(cfg.spectral, search)),
            ],
            fused,
        )),
        EstimatorKind::Autocorrelation => {
            Box::new(Autocorrelation::new(cfg.autocorrelation, search))
        }
        EstimatorKind::Spectral => Box::new(Spectral::new(cfg.spectral, search)),
        EstimatorKind::PeakInterval => Box::new(PeakInterval::new(cfg.peak_interval)),
        EstimatorKind::UpCrossing => Box::new(UpCrossing::new(cfg.up_crossing)),
        EstimatorKind::Extrema => Box::new(ExtremaCycles::new(cfg.extrema)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Method, RateResult);

    impl Estimator for Fixed {
        fn method(&self) -> Method {
            self.0
        }
        fn estimate(&self, _: &Waveform) -> RateResult {
            self.1.clone()
        }
    }

    fn rate(brpm: f64) -> RateResult {
        RateResult::Estimate(RateEstimate {
            brpm,
            detail: EstimateDetail::Spectral { peak_hz: brpm / 60.0 },
        })
    }

    #[test]
    fn fuse_rates_keeps_in_band_mean() {
        assert_eq!(fuse_rates(&[5.0, 12.0, 40.0], RateBand::FUSED), Some(12.0));
        assert_eq!(fuse_rates(&[12.0, 16.0], RateBand::FUSED), Some(14.0));
        assert_eq!(fuse_rates(&[], RateBand::FUSED), None);
        assert_eq!(fuse_rates(&[5.0, 40.0], RateBand::FUSED), None);
    }

    #[test]
    fn fused_band_edges_are_exclusive() {
        assert_eq!(fuse_rates(&[8.0, 26.0], RateBand::FUSED), None);
    }

    #[test]
    fn fusion_ignores_no_estimate_members() {
        let fusion = Fusion::new(
            vec![
                Box::new(Fixed(Method::Autocorrelation, rate(15.0))),
                Box::new(Fixed(
                    Method::Spectral,
                    RateResult::none(NoEstimateReason::EmptyBand),
                )),
            ],
            RateBand::FUSED,
        );
        let wf = Waveform::uniform(vec![0.0; 4], 1.0, 0.0).expect("uniform");
        let fused = fusion.estimate(&wf);
        assert_eq!(fused.brpm(), Some(15.0));
        match fused {
            RateResult::Estimate(RateEstimate {
                detail: EstimateDetail::Fused { contributors },
                ..
            }) => {
                assert_eq!(contributors.len(), 1);
                assert_eq!(contributors[0].method, Method::Autocorrelation);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn all_out_of_band_is_no_estimate() {
        let results = [
            (Method::Autocorrelation, rate(5.0)),
            (Method::Spectral, rate(40.0)),
        ];
        assert_eq!(
            fuse(&results, RateBand::FUSED),
            RateResult::none(NoEstimateReason::NoneInBand)
        );
    }

    #[test]
    fn from_error_separates_caller_errors() {
        let folded = RateResult::from_error(RespError::insufficient(28, 3)).expect("shortfall");
        assert!(!folded.is_estimate());
        assert_eq!(folded.count(), 0);
        assert_eq!(folded.threshold(), None);
        let err = RespError::InvalidConfig("bad".into());
        assert_eq!(RateResult::from_error(err.clone()), Err(err));
    }

    #[test]
    fn result_serializes_with_method_tag() {
        let js = serde_json::to_value(rate(12.0)).expect("serialize");
        assert_eq!(js["estimate"]["detail"]["method"], "spectral");
        assert_eq!(js["estimate"]["brpm"], 12.0);
    }
}
