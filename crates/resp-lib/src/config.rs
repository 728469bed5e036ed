use crate::detectors::ecg::BeatDetectorConfig;
use crate::edr::EdrConfig;
use crate::error::RespError;
use crate::estimators::{EstimatorConfig, EstimatorKind, RateBand};
use crate::live::LiveConfig;
use crate::windowing::WindowConfig;
use serde::{Deserialize, Serialize};

/// Butterworth pass band in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub low_hz: f64,
    pub high_hz: f64,
    pub order: usize,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            low_hz: 0.05,
            high_hz: 0.8,
            order: 4,
        }
    }
}

impl BandConfig {
    /// Shape check only; the Nyquist bound is enforced when a filter is designed.
    pub fn validate(&self) -> Result<(), RespError> {
        if !(self.low_hz > 0.0 && self.low_hz < self.high_hz && self.high_hz.is_finite()) {
            return Err(RespError::InvalidBand {
                low: self.low_hz,
                high: self.high_hz,
                nyquist: f64::INFINITY,
            });
        }
        if self.order == 0 {
            return Err(RespError::InvalidConfig("filter order must be at least 1".into()));
        }
        Ok(())
    }
}

/// Physiological acceptance limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plausibility {
    /// Bounds the autocorrelation lag search and the spectral band.
    pub search: RateBand,
    /// Rates must lie strictly inside this band to be fused.
    pub fused: RateBand,
}

impl Default for Plausibility {
    fn default() -> Self {
        Self {
            search: RateBand::SEARCH,
            fused: RateBand::FUSED,
        }
    }
}

/// Every tunable of the estimation core. Missing keys take their defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespConfig {
    pub respiration: BandConfig,
    pub plausibility: Plausibility,
    pub beats: BeatDetectorConfig,
    pub edr: EdrConfig,
    pub windowing: WindowConfig,
    /// Estimator used by the batch entry point on IMU-style waveforms.
    pub estimator: EstimatorKind,
    pub estimators: EstimatorConfig,
    pub live: LiveConfig,
}

impl RespConfig {
    pub fn validate(&self) -> Result<(), RespError> {
        self.respiration.validate()?;
        self.plausibility.search.validate("search")?;
        self.plausibility.fused.validate("fused")?;
        let b = &self.beats;
        if !(b.qrs_low_hz > 0.0 && b.qrs_low_hz < b.qrs_high_hz && b.qrs_low_hz < b.am_qrs_high_hz)
        {
            return Err(RespError::InvalidBand {
                low: b.qrs_low_hz,
                high: b.qrs_high_hz.min(b.am_qrs_high_hz),
                nyquist: f64::INFINITY,
            });
        }
        if b.filter_order == 0 {
            return Err(RespError::InvalidConfig("beats.filter_order must be at least 1".into()));
        }
        if !(b.min_rr_s >= 0.0 && b.min_rr_s < b.max_rr_s) {
            return Err(RespError::InvalidConfig(format!(
                "beat interval bounds must satisfy 0 <= min < max, got {}..{} s",
                b.min_rr_s, b.max_rr_s
            )));
        }
        self.edr.validate()?;
        self.windowing.validate()?;
        self.estimators.validate()?;
        self.live.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = RespConfig::default();
        cfg.validate().expect("defaults are valid");
        assert_eq!(cfg.respiration.low_hz, 0.05);
        assert_eq!(cfg.plausibility.fused.max_brpm, 26.0);
        assert_eq!(cfg.windowing.window_s, 32.0);
        assert_eq!(cfg.live.window_s, 30.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: RespConfig = serde_json::from_str(
            r#"{"windowing": {"hop_s": 4.0}, "beats": {"policy": "robust-width"}}"#,
        )
        .expect("parse");
        assert_eq!(cfg.windowing.hop_s, 4.0);
        assert_eq!(cfg.windowing.window_s, 32.0);
        assert_eq!(
            cfg.beats.policy,
            crate::detectors::ecg::PeakPolicy::RobustWidth
        );
    }

    #[test]
    fn inverted_band_is_rejected() {
        let cfg = RespConfig {
            respiration: BandConfig {
                low_hz: 0.8,
                high_hz: 0.05,
                order: 4,
            },
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(RespError::InvalidBand { .. })));

        let mut cfg = RespConfig::default();
        cfg.plausibility.fused.min_brpm = 30.0;
        assert!(matches!(cfg.validate(), Err(RespError::InvalidConfig(_))));
    }
}
