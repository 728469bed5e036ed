use crate::error::{RespError, Shortfall};
use crate::estimators::{Estimator, RateResult};
use crate::signal::{Waveform, Window};
use log::debug;
use serde::{Deserialize, Serialize};

const END_TOLERANCE_S: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub window_s: f64,
    pub hop_s: f64,
    /// Windows with fewer samples are reported as no-estimate.
    pub min_samples: usize,
    /// Emit one window over the whole span when no full window fits.
    pub allow_partial: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_s: 32.0,
            hop_s: 8.0,
            min_samples: 10,
            allow_partial: true,
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<(), RespError> {
        if !(self.window_s.is_finite() && self.window_s > 0.0) {
            return Err(RespError::InvalidConfig(format!(
                "window_s must be positive, got {}",
                self.window_s
            )));
        }
        if !(self.hop_s.is_finite() && self.hop_s > 0.0) {
            return Err(RespError::InvalidConfig(format!(
                "hop_s must be positive, got {}",
                self.hop_s
            )));
        }
        Ok(())
    }
}

/// Per-window outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespirationEstimate {
    pub window: Window,
    pub result: RateResult,
}

impl RespirationEstimate {
    pub fn brpm(&self) -> Option<f64> {
        self.result.brpm()
    }
}

/// Window boundaries over a strictly increasing time axis.
///
/// Starts are `t0 + k * hop` and stop once the window end passes the last
/// timestamp. A sample belongs to a window when `start <= t <= end`, both
/// bounds widened by the same tolerance as the fit check.
pub fn generate_windows(time: &[f64], cfg: &WindowConfig) -> Result<Vec<Window>, RespError> {
    cfg.validate()?;
    let (Some(&first), Some(&last)) = (time.first(), time.last()) else {
        return Ok(Vec::new());
    };

    let mut windows = Vec::new();
    for k in 0usize.. {
        let start = first + k as f64 * cfg.hop_s;
        let end = start + cfg.window_s;
        if end > last + END_TOLERANCE_S {
            break;
        }
        windows.push(Window {
            start,
            end,
            start_index: time.partition_point(|&t| t < start - END_TOLERANCE_S),
            end_index: time.partition_point(|&t| t <= end + END_TOLERANCE_S),
        });
    }

    if windows.is_empty() && cfg.allow_partial {
        debug!(
            "no full {:.1}s window fits; using the whole {:.1}s span",
            cfg.window_s,
            last - first
        );
        windows.push(Window {
            start: first,
            end: last,
            start_index: 0,
            end_index: time.len(),
        });
    }
    Ok(windows)
}

/// Mark every window with the same shortfall.
pub fn mark_windows(windows: Vec<Window>, shortfall: Shortfall) -> Vec<RespirationEstimate> {
    windows
        .into_iter()
        .map(|window| RespirationEstimate {
            window,
            result: RateResult::NoEstimate(shortfall),
        })
        .collect()
}

/// Run `estimator` on each window of `waveform`. Every generated window yields
/// exactly one record.
pub fn estimate_windows(
    waveform: &Waveform,
    cfg: &WindowConfig,
    estimator: &dyn Estimator,
) -> Result<Vec<RespirationEstimate>, RespError> {
    let windows = generate_windows(waveform.time(), cfg)?;
    Ok(windows
        .into_iter()
        .map(|window| {
            let result = if window.samples() < cfg.min_samples {
                debug!(
                    "window {:.1}..{:.1}s has {} samples, below {}",
                    window.start,
                    window.end,
                    window.samples(),
                    cfg.min_samples
                );
                RateResult::NoEstimate(Shortfall::InsufficientSamples {
                    required: cfg.min_samples,
                    actual: window.samples(),
                })
            } else {
                estimator.estimate(&waveform.slice(window.range()))
            };
            RespirationEstimate { window, result }
        })
        .collect())
}
