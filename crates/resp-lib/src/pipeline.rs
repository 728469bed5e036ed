//! Batch entry points.
//!
//! Each function validates the configuration, band-limits or extracts a
//! respiration waveform, and returns one [`RespirationEstimate`] per window.
//! A data shortfall affecting the whole record marks every window as
//! no-estimate instead of failing the call.

use crate::config::RespConfig;
use crate::detectors::ecg::{detect_beats, detect_beats_with_band};
use crate::edr::{amplitude_modulation, baseline_wander};
use crate::error::RespError;
use crate::estimators::{build_estimator, Estimator, EstimatorKind};
use crate::filters;
use crate::imu::{derive_channel, ImuChannel, ImuFrame};
use crate::signal::{Beat, Events, Waveform};
use crate::windowing::{estimate_windows, generate_windows, mark_windows, RespirationEstimate};
use log::debug;

fn estimator_for(kind: EstimatorKind, cfg: &RespConfig) -> Box<dyn Estimator> {
    build_estimator(
        kind,
        &cfg.estimators,
        cfg.plausibility.search,
        cfg.plausibility.fused,
    )
}

/// Run `compute` and window its waveform with `estimator`; a shortfall from
/// `compute` marks every window over `span` instead.
fn windowed<F>(
    span: &Waveform,
    cfg: &RespConfig,
    estimator: &dyn Estimator,
    compute: F,
) -> Result<Vec<RespirationEstimate>, RespError>
where
    F: FnOnce() -> Result<Waveform, RespError>,
{
    match compute() {
        Ok(waveform) => estimate_windows(&waveform, &cfg.windowing, estimator),
        Err(e) => {
            let shortfall = e.into_shortfall()?;
            debug!("whole record has no estimate: {shortfall}");
            Ok(mark_windows(
                generate_windows(span.time(), &cfg.windowing)?,
                shortfall,
            ))
        }
    }
}

fn band_limited(waveform: &Waveform, cfg: &RespConfig) -> Result<Waveform, RespError> {
    let band = &cfg.respiration;
    let filtered = filters::bandpass(
        waveform.values(),
        waveform.fs(),
        band.low_hz,
        band.high_hz,
        band.order,
    )?;
    waveform.with_values(filtered)
}

/// Respiration-band filter, then the configured estimator per window.
pub fn estimate_respiration_rate(
    waveform: &Waveform,
    cfg: &RespConfig,
) -> Result<Vec<RespirationEstimate>, RespError> {
    estimate_with(waveform, cfg, cfg.estimator)
}

/// Same as [`estimate_respiration_rate`] with an explicit estimator choice.
pub fn estimate_with(
    waveform: &Waveform,
    cfg: &RespConfig,
    kind: EstimatorKind,
) -> Result<Vec<RespirationEstimate>, RespError> {
    cfg.validate()?;
    let estimator = estimator_for(kind, cfg);
    windowed(waveform, cfg, estimator.as_ref(), || band_limited(waveform, cfg))
}

/// Derive `channel` from uniformly sampled IMU frames and estimate it like any
/// other respiration waveform.
pub fn estimate_imu(
    frames: &[ImuFrame],
    fs: f64,
    channel: ImuChannel,
    cfg: &RespConfig,
) -> Result<Vec<RespirationEstimate>, RespError> {
    let waveform = Waveform::uniform(derive_channel(frames, channel), fs, 0.0)?;
    debug!("IMU channel {channel:?}: {} samples at {fs} Hz", waveform.len());
    estimate_respiration_rate(&waveform, cfg)
}

pub fn estimate_autocorrelation(
    waveform: &Waveform,
    cfg: &RespConfig,
) -> Result<Vec<RespirationEstimate>, RespError> {
    estimate_with(waveform, cfg, EstimatorKind::Autocorrelation)
}

pub fn estimate_spectral(
    waveform: &Waveform,
    cfg: &RespConfig,
) -> Result<Vec<RespirationEstimate>, RespError> {
    estimate_with(waveform, cfg, EstimatorKind::Spectral)
}

/// Beat-amplitude EDR from raw ECG, windowed.
pub fn estimate_am(
    ecg: &Waveform,
    cfg: &RespConfig,
) -> Result<Vec<RespirationEstimate>, RespError> {
    cfg.validate()?;
    let estimator = estimator_for(cfg.edr.estimator, cfg);
    windowed(ecg, cfg, estimator.as_ref(), || {
        let beats = detect_beats_with_band(ecg, &cfg.beats, cfg.beats.am_qrs_high_hz)?;
        Ok(amplitude_modulation(ecg, &beats, &cfg.respiration, &cfg.edr.am)?.edr)
    })
}

/// Baseline-wander EDR from raw ECG, windowed. Beats are detected when not given.
pub fn estimate_bw(
    ecg: &Waveform,
    beats: Option<&Events>,
    cfg: &RespConfig,
) -> Result<Vec<RespirationEstimate>, RespError> {
    cfg.validate()?;
    let estimator = estimator_for(cfg.edr.estimator, cfg);
    windowed(ecg, cfg, estimator.as_ref(), || {
        Ok(baseline_wander(ecg, beats, &cfg.beats, &cfg.edr.bw)?.edr)
    })
}

/// Detected R-peaks with their raw amplitudes.
pub fn beats(ecg: &Waveform, cfg: &RespConfig) -> Result<Vec<Beat>, RespError> {
    cfg.validate()?;
    let events = detect_beats(ecg, &cfg.beats)?;
    Ok(Beat::from_events(ecg, &events))
}
