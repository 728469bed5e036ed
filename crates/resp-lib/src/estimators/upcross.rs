use super::{EstimateDetail, Estimator, Method, RateEstimate, RateResult};
use crate::error::Shortfall;
use crate::signal::Waveform;
use crate::stats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpCrossingConfig {
    /// Provisional rate above which crossings are recounted at the raised threshold.
    pub rethreshold_brpm: f64,
}

impl Default for UpCrossingConfig {
    fn default() -> Self {
        Self {
            rethreshold_brpm: 20.0,
        }
    }
}

/// Rising transitions through `threshold`: `x[i - 1] < threshold <= x[i]`.
pub fn count_up_crossings(x: &[f64], threshold: f64) -> usize {
    x.windows(2)
        .filter(|w| w[0] < threshold && w[1] >= threshold)
        .count()
}

/// Adaptive up-crossing count over one window.
///
/// Crossings are first counted at the mean; when that implies more than
/// `rethreshold_brpm`, they are recounted at `0.25 x max + 0.75 x mean`.
pub fn adaptive_up_crossing(
    values: &[f64],
    time: &[f64],
    rethreshold_brpm: f64,
) -> Result<RateEstimate, Shortfall> {
    let (Some(avg), Some(&first), Some(&last)) = (stats::mean(values), time.first(), time.last())
    else {
        return Err(Shortfall::InsufficientSamples {
            required: 1,
            actual: values.len(),
        });
    };
    let peak = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let raised = 0.25 * peak + 0.75 * avg;
    let duration_s = (last - first).max(1e-6);

    let provisional = count_up_crossings(values, avg) as f64 * 60.0 / duration_s;
    let threshold = if provisional > rethreshold_brpm { raised } else { avg };
    let crossings = count_up_crossings(values, threshold);

    Ok(RateEstimate {
        brpm: crossings as f64 * 60.0 / duration_s,
        detail: EstimateDetail::UpCrossing {
            crossings,
            threshold,
        },
    })
}

/// Adaptive up-crossing estimator.
#[derive(Debug, Clone, Copy)]
pub struct UpCrossing {
    cfg: UpCrossingConfig,
}

impl UpCrossing {
    pub fn new(cfg: UpCrossingConfig) -> Self {
        Self { cfg }
    }
}

impl Estimator for UpCrossing {
    fn method(&self) -> Method {
        Method::UpCrossing
    }

    fn estimate(&self, waveform: &Waveform) -> RateResult {
        adaptive_up_crossing(waveform.values(), waveform.time(), self.cfg.rethreshold_brpm).into()
    }
}
