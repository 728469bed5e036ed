//! Synthetic signals shared by the unit tests.

use crate::signal::Waveform;
use std::f64::consts::PI;

pub struct SyntheticEcg {
    pub fs: f64,
    pub seconds: f64,
    pub beat_interval_s: f64,
    pub resp_hz: f64,
    /// Relative R-wave amplitude modulation depth.
    pub am_depth: f64,
    /// Additive baseline wander amplitude.
    pub wander: f64,
}

impl Default for SyntheticEcg {
    fn default() -> Self {
        Self {
            fs: 250.0,
            seconds: 60.0,
            beat_interval_s: 0.8,
            resp_hz: 0.25,
            am_depth: 0.0,
            wander: 0.0,
        }
    }
}

impl SyntheticEcg {
    pub fn beat_times(&self) -> Vec<f64> {
        let mut beats = Vec::new();
        let mut t = 0.5;
        while t < self.seconds - 0.5 {
            beats.push(t);
            t += self.beat_interval_s;
        }
        beats
    }

    pub fn waveform(&self) -> Waveform {
        let n = (self.seconds * self.fs) as usize;
        let mut data: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 / self.fs;
                self.wander * (2.0 * PI * self.resp_hz * t).sin()
            })
            .collect();
        let reach = (0.15 * self.fs) as usize;
        for bt in self.beat_times() {
            let amp = 1.2 * (1.0 + self.am_depth * (2.0 * PI * self.resp_hz * bt).sin());
            let centre = (bt * self.fs).round() as usize;
            for i in centre.saturating_sub(reach)..(centre + reach).min(n) {
                let t = i as f64 / self.fs;
                data[i] += amp * (-0.5 * ((t - bt) / 0.02).powi(2)).exp();
            }
        }
        Waveform::uniform(data, self.fs, 0.0).expect("positive fs")
    }
}

pub fn sine(fs: f64, hz: f64, seconds: f64, amplitude: f64) -> Waveform {
    let n = (fs * seconds) as usize;
    let data = (0..n)
        .map(|i| amplitude * (2.0 * PI * hz * i as f64 / fs).sin())
        .collect();
    Waveform::uniform(data, fs, 0.0).expect("positive fs")
}
