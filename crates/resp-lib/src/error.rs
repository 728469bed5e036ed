use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a well-formed computation produced no rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoEstimateReason {
    TooFewBeats,
    TooFewPeaks,
    EmptySearchRange,
    NoPeakInRange,
    EmptyBand,
    FlatSignal,
    NoMaxima,
    NoTroughs,
    NoValidCycles,
    NonPositiveInterval,
    NoneInBand,
    NumericalFailure,
}

impl std::fmt::Display for NoEstimateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            NoEstimateReason::TooFewBeats => "fewer than two usable beats",
            NoEstimateReason::TooFewPeaks => "fewer than two peaks",
            NoEstimateReason::EmptySearchRange => "lag search range is empty",
            NoEstimateReason::NoPeakInRange => "no autocorrelation peak inside the lag range",
            NoEstimateReason::EmptyBand => "no spectral bins inside the band",
            NoEstimateReason::FlatSignal => "signal carries no energy",
            NoEstimateReason::NoMaxima => "no local maxima",
            NoEstimateReason::NoTroughs => "no troughs below zero",
            NoEstimateReason::NoValidCycles => "no valid breathing cycles",
            NoEstimateReason::NonPositiveInterval => "mean interval is not positive",
            NoEstimateReason::NoneInBand => "no estimate inside the plausibility band",
            NoEstimateReason::NumericalFailure => "transform failed",
        };
        f.write_str(text)
    }
}

/// Data-dependent outcomes that are expected during steady-state operation.
///
/// These never abort a batch run or a live stream; they are folded into
/// [`crate::RateResult::NoEstimate`] for the affected window.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shortfall {
    #[error("insufficient samples: need at least {required}, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },
    #[error("no estimate: {reason}")]
    NoEstimate { reason: NoEstimateReason },
    #[error("normalizing mean is zero or non-finite")]
    DegenerateNormalization,
}

impl Shortfall {
    pub fn no_estimate(reason: NoEstimateReason) -> Self {
        Shortfall::NoEstimate { reason }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RespError {
    #[error("invalid band {low}..{high} Hz: require 0 < low < high < {nyquist} Hz (nyquist)")]
    InvalidBand { low: f64, high: f64, nyquist: f64 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("time axis has {time} samples but values have {values}")]
    MismatchedLengths { time: usize, values: usize },
    #[error("time axis is not strictly increasing at index {index}")]
    NonMonotonicTime { index: usize },
    #[error(transparent)]
    Shortfall(#[from] Shortfall),
}

impl RespError {
    /// Caller errors fail loudly; everything else is a data shortfall.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, RespError::Shortfall(_))
    }

    pub fn insufficient(required: usize, actual: usize) -> Self {
        RespError::Shortfall(Shortfall::InsufficientSamples { required, actual })
    }

    pub fn no_estimate(reason: NoEstimateReason) -> Self {
        RespError::Shortfall(Shortfall::no_estimate(reason))
    }

    /// Split a data shortfall out of the error; caller errors come back unchanged.
    pub fn into_shortfall(self) -> Result<Shortfall, RespError> {
        match self {
            RespError::Shortfall(shortfall) => Ok(shortfall),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortfalls_are_not_caller_errors() {
        assert!(!RespError::insufficient(28, 10).is_caller_error());
        assert!(!RespError::Shortfall(Shortfall::DegenerateNormalization).is_caller_error());
        let band = RespError::InvalidBand {
            low: 1.0,
            high: 0.5,
            nyquist: 25.0,
        };
        assert!(band.is_caller_error());
    }

    #[test]
    fn shortfall_serializes_with_kind_tag() {
        let js = serde_json::to_string(&Shortfall::no_estimate(NoEstimateReason::NoTroughs))
            .expect("serialize");
        assert_eq!(js, r#"{"kind":"no_estimate","reason":"no_troughs"}"#);
    }
}
