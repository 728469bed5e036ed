use crate::error::RespError;
use log::warn;
use realfft::num_complex::Complex;
use std::f64::consts::PI;

const REAL_POLE_TOL: f64 = 1e-10;

/// Butterworth filter realised as a cascade of second-order sections.
///
/// Each section is `[b0, b1, b2, a0, a1, a2]` with `a0 == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sos {
    sections: Vec<[f64; 6]>,
}

impl Sos {
    pub fn sections(&self) -> &[[f64; 6]] {
        &self.sections
    }

    /// Reflection padding applied on each side by [`filtfilt`]; the input must be
    /// strictly longer than this.
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Complex frequency response at normalised angular frequency `omega` (rad/sample).
    pub fn response(&self, omega: f64) -> Complex<f64> {
        let z1 = Complex::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        self.sections
            .iter()
            .fold(Complex::new(1.0, 0.0), |acc, s| {
                acc * (s[0] + z1 * s[1] + z2 * s[2]) / (s[3] + z1 * s[4] + z2 * s[5])
            })
    }

    fn normalised_at(mut self, omega: f64) -> Self {
        let gain = self.response(omega).norm();
        if gain.is_finite() && gain > 0.0 {
            let per_section = gain.powf(-1.0 / self.sections.len() as f64);
            for s in &mut self.sections {
                s[0] *= per_section;
                s[1] *= per_section;
                s[2] *= per_section;
            }
        }
        self
    }
}

fn check_order(order: usize) -> Result<(), RespError> {
    if order == 0 {
        return Err(RespError::InvalidConfig("filter order must be at least 1".into()));
    }
    Ok(())
}

fn check_band(fs: f64, low: f64, high: f64) -> Result<(), RespError> {
    let nyquist = 0.5 * fs;
    let valid = fs.is_finite() && fs > 0.0 && low > 0.0 && low < high && high < nyquist;
    if !valid {
        return Err(RespError::InvalidBand { low, high, nyquist });
    }
    Ok(())
}

/// Pull an upper cutoff down to `0.9 x nyquist` when it would exceed it.
pub fn clamp_high(fs: f64, high: f64) -> f64 {
    let limit = 0.45 * fs;
    if high > limit {
        warn!("upper cutoff {high} Hz clamped to {limit} Hz for fs {fs} Hz");
        limit
    } else {
        high
    }
}

fn prewarp(fs: f64, hz: f64) -> f64 {
    2.0 * fs * (PI * hz / fs).tan()
}

/// Left-half-plane poles of the unit-cutoff analog Butterworth prototype.
fn prototype_poles(order: usize) -> impl Iterator<Item = Complex<f64>> {
    (0..order).map(move |k| {
        let theta = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
        Complex::from_polar(1.0, theta)
    })
}

fn bilinear(analog: &[Complex<f64>], fs: f64) -> Vec<Complex<f64>> {
    let k = 2.0 * fs;
    analog.iter().map(|&s| (k + s) / (k - s)).collect()
}

/// Group digital poles into section denominators. Conjugate pairs share a
/// section; real poles are paired in order, and a lone real pole yields a
/// first-order section (flagged `false`).
fn pair_poles(poles: &[Complex<f64>]) -> Vec<([f64; 3], bool)> {
    let mut out = Vec::new();
    let mut reals = Vec::new();
    for p in poles {
        if p.im > REAL_POLE_TOL {
            out.push(([1.0, -2.0 * p.re, p.norm_sqr()], true));
        } else if p.im.abs() <= REAL_POLE_TOL {
            reals.push(p.re);
        }
    }
    for pair in reals.chunks(2) {
        match *pair {
            [a, b] => out.push(([1.0, -(a + b), a * b], true)),
            [a] => out.push(([1.0, -a, 0.0], false)),
            _ => {}
        }
    }
    out
}

/// Design a band-pass Butterworth filter of the given prototype order
/// (the realised filter has `2 x order` poles).
pub fn butter_bandpass(fs: f64, low: f64, high: f64, order: usize) -> Result<Sos, RespError> {
    check_order(order)?;
    check_band(fs, low, high)?;
    let wl = prewarp(fs, low);
    let wh = prewarp(fs, high);
    let bw = wh - wl;
    let w0_sq = wl * wh;
    let mut analog = Vec::with_capacity(2 * order);
    for p in prototype_poles(order) {
        let half = p * (bw / 2.0);
        let disc = (half * half - w0_sq).sqrt();
        analog.push(half + disc);
        analog.push(half - disc);
    }
    let sections = pair_poles(&bilinear(&analog, fs))
        .into_iter()
        .map(|(a, _)| [1.0, 0.0, -1.0, a[0], a[1], a[2]])
        .collect();
    let centre = 2.0 * (w0_sq.sqrt() / (2.0 * fs)).atan();
    Ok(Sos { sections }.normalised_at(centre))
}

/// Design a high-pass Butterworth filter.
pub fn butter_highpass(fs: f64, cutoff: f64, order: usize) -> Result<Sos, RespError> {
    check_order(order)?;
    let nyquist = 0.5 * fs;
    if !(fs.is_finite() && cutoff > 0.0 && cutoff < nyquist) {
        return Err(RespError::InvalidBand {
            low: cutoff,
            high: nyquist,
            nyquist,
        });
    }
    let wc = prewarp(fs, cutoff);
    let analog: Vec<Complex<f64>> = prototype_poles(order).map(|p| wc / p).collect();
    let sections = pair_poles(&bilinear(&analog, fs))
        .into_iter()
        .map(|(a, second_order)| {
            if second_order {
                [1.0, -2.0, 1.0, a[0], a[1], a[2]]
            } else {
                [1.0, -1.0, 0.0, a[0], a[1], a[2]]
            }
        })
        .collect();
    Ok(Sos { sections }.normalised_at(PI))
}

/// Step-response steady state of each section, scaled by the DC gain of the
/// sections before it.
fn steady_state(sections: &[[f64; 6]]) -> Vec<[f64; 2]> {
    let mut scale = 1.0;
    sections
        .iter()
        .map(|s| {
            let gain = (s[0] + s[1] + s[2]) / (s[3] + s[4] + s[5]);
            let z2 = s[2] - s[5] * gain;
            let z1 = s[1] - s[4] * gain + z2;
            let zi = [z1 * scale, z2 * scale];
            scale *= gain;
            zi
        })
        .collect()
}

fn sosfilt(sections: &[[f64; 6]], zi: &[[f64; 2]], data: &mut [f64]) {
    let x0 = data.first().copied().unwrap_or(0.0);
    for (s, z) in sections.iter().zip(zi) {
        let mut z1 = z[0] * x0;
        let mut z2 = z[1] * x0;
        for v in data.iter_mut() {
            let x = *v;
            let y = s[0] * x + z1;
            z1 = s[1] * x - s[4] * y + z2;
            z2 = s[2] * x - s[5] * y;
            *v = y;
        }
    }
}

fn odd_extend(signal: &[f64], pad: usize) -> Vec<f64> {
    let n = signal.len();
    let first = signal[0];
    let last = signal[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
    ext.extend_from_slice(signal);
    ext.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));
    ext
}

/// Zero-phase forward-backward filtering with odd-reflection padding and
/// steady-state initial conditions.
pub fn filtfilt(sos: &Sos, signal: &[f64]) -> Result<Vec<f64>, RespError> {
    let pad = sos.pad_len();
    if signal.len() <= pad {
        return Err(RespError::insufficient(pad + 1, signal.len()));
    }
    let zi = steady_state(&sos.sections);
    let mut ext = odd_extend(signal, pad);
    sosfilt(&sos.sections, &zi, &mut ext);
    ext.reverse();
    sosfilt(&sos.sections, &zi, &mut ext);
    ext.reverse();
    Ok(ext[pad..pad + signal.len()].to_vec())
}

/// Zero-phase band-pass. Coefficients are designed fresh on every call.
pub fn bandpass(
    signal: &[f64],
    fs: f64,
    low: f64,
    high: f64,
    order: usize,
) -> Result<Vec<f64>, RespError> {
    let sos = butter_bandpass(fs, low, high, order)?;
    filtfilt(&sos, signal)
}

/// Zero-phase high-pass. Coefficients are designed fresh on every call.
pub fn highpass(signal: &[f64], fs: f64, cutoff: f64, order: usize) -> Result<Vec<f64>, RespError> {
    let sos = butter_highpass(fs, cutoff, order)?;
    filtfilt(&sos, signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Shortfall;

    fn sine(fs: f64, hz: f64, seconds: f64, offset: f64) -> Vec<f64> {
        let n = (fs * seconds) as usize;
        (0..n)
            .map(|i| offset + (2.0 * PI * hz * i as f64 / fs).sin())
            .collect()
    }

    fn upward_zero_crossings(data: &[f64]) -> usize {
        data.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count()
    }

    #[test]
    fn bandpass_has_unit_gain_at_centre() {
        let fs = 50.0;
        let sos = butter_bandpass(fs, 0.1, 0.5, 4).expect("valid band");
        assert_eq!(sos.sections().len(), 4);
        let wl = prewarp(fs, 0.1);
        let wh = prewarp(fs, 0.5);
        let centre = 2.0 * ((wl * wh).sqrt() / (2.0 * fs)).atan();
        assert!((sos.response(centre).norm() - 1.0).abs() < 1e-9);
        assert!(sos.response(0.0).norm() < 1e-9);
        assert!(sos.response(PI).norm() < 1e-9);
    }

    #[test]
    fn highpass_blocks_dc_and_passes_nyquist() {
        let sos = butter_highpass(50.0, 0.5, 3).expect("valid cutoff");
        assert_eq!(sos.sections().len(), 2);
        assert!(sos.response(0.0).norm() < 1e-9);
        assert!((sos.response(PI).norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bandpass_preserves_length_and_impulse_position() {
        let mut impulse = vec![0.0; 401];
        impulse[200] = 1.0;
        let out = bandpass(&impulse, 50.0, 0.5, 5.0, 4).expect("filtered");
        assert_eq!(out.len(), impulse.len());
        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(200));
    }

    #[test]
    fn sinusoid_at_band_centre_keeps_frequency_and_amplitude() {
        let fs = 50.0;
        let hz = (0.1f64 * 0.5).sqrt();
        let input = sine(fs, hz, 240.0, 0.0);
        let out = bandpass(&input, fs, 0.1, 0.5, 4).expect("filtered");
        let middle = &out[out.len() / 3..2 * out.len() / 3];
        let peak = middle.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(peak >= 0.9 && peak <= 1.05, "peak amplitude {peak}");
        let reference = &input[input.len() / 3..2 * input.len() / 3];
        let diff = upward_zero_crossings(middle) as i64 - upward_zero_crossings(reference) as i64;
        assert!(diff.abs() <= 1);
    }

    #[test]
    fn bandpass_rejects_offset() {
        let input = sine(50.0, 0.25, 120.0, 10.0);
        let out = bandpass(&input, 50.0, 0.05, 0.8, 4).expect("filtered");
        let middle = &out[out.len() / 4..3 * out.len() / 4];
        let mean = middle.iter().sum::<f64>() / middle.len() as f64;
        assert!(mean.abs() < 0.05, "residual offset {mean}");
    }

    #[test]
    fn highpass_removes_offset() {
        let input = sine(50.0, 1.0, 60.0, 5.0);
        let out = highpass(&input, 50.0, 0.1, 4).expect("filtered");
        let middle = &out[out.len() / 4..3 * out.len() / 4];
        let mean = middle.iter().sum::<f64>() / middle.len() as f64;
        assert!(mean.abs() < 0.05);
    }

    #[test]
    fn invalid_bands_fail_loudly() {
        let data = vec![0.0; 100];
        for (low, high) in [(0.0, 1.0), (2.0, 1.0), (1.0, 25.0), (1.0, 30.0)] {
            let err = bandpass(&data, 50.0, low, high, 4).unwrap_err();
            assert!(matches!(err, RespError::InvalidBand { .. }), "{low}..{high}");
            assert!(err.is_caller_error());
        }
        assert!(matches!(
            bandpass(&data, 50.0, 0.1, 1.0, 0),
            Err(RespError::InvalidConfig(_))
        ));
    }

    #[test]
    fn short_input_is_insufficient() {
        let data = vec![1.0; 27];
        let err = bandpass(&data, 50.0, 0.1, 1.0, 4).unwrap_err();
        assert_eq!(
            err,
            RespError::Shortfall(Shortfall::InsufficientSamples {
                required: 28,
                actual: 27
            })
        );
        assert!(bandpass(&vec![1.0; 28], 50.0, 0.1, 1.0, 4).is_ok());
    }

    #[test]
    fn clamp_high_limits_to_ninety_percent_of_nyquist() {
        assert_eq!(clamp_high(50.0, 40.0), 22.5);
        assert_eq!(clamp_high(500.0, 40.0), 40.0);
    }

    #[test]
    fn design_is_pure() {
        let a = butter_bandpass(500.0, 0.5, 40.0, 4).expect("valid");
        let b = butter_bandpass(500.0, 0.5, 40.0, 4).expect("valid");
        assert_eq!(a, b);
    }
}
