#![allow(dead_code)]

use std::f64::consts::PI;
use std::io::Write;
use tempfile::NamedTempFile;

pub fn sine(fs: f64, hz: f64, seconds: f64, amplitude: f64, offset: f64) -> Vec<f64> {
    let n = (fs * seconds) as usize;
    (0..n)
        .map(|i| offset + amplitude * (2.0 * PI * hz * i as f64 / fs).sin())
        .collect()
}

/// Beat times every 0.8 s from 0.5 s, stopping half a second before the end.
pub fn beat_times(seconds: f64) -> Vec<f64> {
    let mut beats = Vec::new();
    let mut t = 0.5;
    while t < seconds - 0.5 {
        beats.push(t);
        t += 0.8;
    }
    beats
}

/// Gaussian R-waves at 250 Hz, amplitude-modulated and riding on wander at 0.25 Hz.
pub fn ecg(seconds: f64, am_depth: f64, wander: f64) -> Vec<f64> {
    let fs = 250.0;
    let n = (seconds * fs) as usize;
    let mut data: Vec<f64> = (0..n)
        .map(|i| wander * (2.0 * PI * 0.25 * i as f64 / fs).sin())
        .collect();
    let reach = (0.15 * fs) as usize;
    for bt in beat_times(seconds) {
        let amp = 1.2 * (1.0 + am_depth * (2.0 * PI * 0.25 * bt).sin());
        let centre = (bt * fs).round() as usize;
        for (i, sample) in data
            .iter_mut()
            .enumerate()
            .take((centre + reach).min(n))
            .skip(centre.saturating_sub(reach))
        {
            let t = i as f64 / fs;
            *sample += amp * (-0.5 * ((t - bt) / 0.02).powi(2)).exp();
        }
    }
    data
}

pub fn series_file(values: &[f64]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "# synthetic").expect("write");
    for v in values {
        writeln!(file, "{v}").expect("write");
    }
    file
}

pub fn text_file(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(text.as_bytes()).expect("write");
    file
}

pub fn path(file: &NamedTempFile) -> String {
    file.path().to_string_lossy().to_string()
}

pub fn assert_close(a: f64, b: f64, tol: f64) {
    assert!(
        (a - b).abs() <= tol,
        "expected {b} +/- {tol}, got {a} (diff {})",
        (a - b).abs()
    );
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
