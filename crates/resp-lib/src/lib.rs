pub mod config;
pub mod detectors;
pub mod edr;
pub mod error;
pub mod estimators;
pub mod filters;
pub mod imu;
pub mod live;
pub mod peaks;
pub mod pipeline;
pub mod signal;
pub mod stats;
#[cfg(test)]
mod synth;
pub mod windowing;

pub use config::RespConfig;
pub use error::{NoEstimateReason, RespError, Shortfall};
pub use estimators::{Estimator, Method, RateEstimate, RateResult};
pub use signal::*;
