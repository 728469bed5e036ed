use crate::error::RespError;
use crate::stats;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A sampled channel: time axis and values kept together.
///
/// The two vectors always have the same length and the time axis is strictly
/// increasing. `fs` is the sampling frequency the samples actually carry, which
/// for resampled signals differs from the source channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    time: Vec<f64>,
    values: Vec<f64>,
    fs: f64,
}

impl Waveform {
    /// Build a waveform with an explicit nominal sampling frequency.
    pub fn new(time: Vec<f64>, values: Vec<f64>, fs: f64) -> Result<Self, RespError> {
        if !(fs.is_finite() && fs > 0.0) {
            return Err(RespError::InvalidConfig(format!(
                "sampling frequency must be positive, got {fs}"
            )));
        }
        check_axis(&time, &values)?;
        Ok(Self { time, values, fs })
    }

    /// Build a waveform whose sampling frequency is derived from the time axis
    /// as `1 / median(diff(time))`.
    pub fn from_time(time: Vec<f64>, values: Vec<f64>) -> Result<Self, RespError> {
        check_axis(&time, &values)?;
        let fs = stats::median_spacing(&time)
            .map(|dt| 1.0 / dt)
            .ok_or(RespError::insufficient(2, time.len()))?;
        Ok(Self { time, values, fs })
    }

    /// Uniformly sampled values starting at `t0`.
    pub fn uniform(values: Vec<f64>, fs: f64, t0: f64) -> Result<Self, RespError> {
        let time = (0..values.len()).map(|i| t0 + i as f64 / fs).collect();
        Self::new(time, values, fs)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn fs(&self) -> f64 {
        self.fs
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn start(&self) -> Option<f64> {
        self.time.first().copied()
    }

    pub fn end(&self) -> Option<f64> {
        self.time.last().copied()
    }

    /// Elapsed time between the first and last sample.
    pub fn duration(&self) -> f64 {
        match (self.start(), self.end()) {
            (Some(a), Some(b)) => b - a,
            _ => 0.0,
        }
    }

    /// Same time axis, new values (e.g. a filtered copy).
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self, RespError> {
        if values.len() != self.time.len() {
            return Err(RespError::MismatchedLengths {
                time: self.time.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            time: self.time.clone(),
            values,
            fs: self.fs,
        })
    }

    /// Copy out a contiguous index range, keeping the parent's sampling frequency.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Self {
            time: self.time[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
            fs: self.fs,
        }
    }
}

fn check_axis(time: &[f64], values: &[f64]) -> Result<(), RespError> {
    if time.len() != values.len() {
        return Err(RespError::MismatchedLengths {
            time: time.len(),
            values: values.len(),
        });
    }
    for (i, pair) in time.windows(2).enumerate() {
        if !(pair[1] > pair[0]) {
            return Err(RespError::NonMonotonicTime { index: i + 1 });
        }
    }
    Ok(())
}

/// Point events on a timeline (e.g., R-peak indices), ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// One detected heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub index: usize,
    pub time: f64,
    /// Raw signal value at the R-peak.
    pub amplitude: f64,
    /// Raw signal minimum in the trailing onset window, when one was searched.
    pub onset_amplitude: Option<f64>,
}

impl Beat {
    /// Attach times and raw amplitudes to detected indices.
    pub fn from_events(raw: &Waveform, events: &Events) -> Vec<Beat> {
        events
            .indices
            .iter()
            .filter(|&&i| i < raw.len())
            .map(|&i| Beat {
                index: i,
                time: raw.time()[i],
                amplitude: raw.values()[i],
                onset_amplitude: None,
            })
            .collect()
    }
}

/// A contiguous time-bounded slice of a waveform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,
    pub start_index: usize,
    /// Exclusive.
    pub end_index: usize,
}

impl Window {
    pub fn samples(&self) -> usize {
        self.end_index - self.start_index
    }

    pub fn range(&self) -> Range<usize> {
        self.start_index..self.end_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_time_derives_sampling_frequency() {
        let time: Vec<f64> = (0..20).map(|i| i as f64 * 0.2).collect();
        let wf = Waveform::from_time(time, vec![0.0; 20]).expect("valid axis");
        assert!((wf.fs() - 5.0).abs() < 1e-9);
        assert!((wf.duration() - 3.8).abs() < 1e-9);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let err = Waveform::new(vec![0.0, 1.0], vec![1.0], 1.0).unwrap_err();
        assert_eq!(err, RespError::MismatchedLengths { time: 2, values: 1 });
    }

    #[test]
    fn rejects_non_increasing_time() {
        let err = Waveform::new(vec![0.0, 1.0, 1.0], vec![0.0; 3], 1.0).unwrap_err();
        assert_eq!(err, RespError::NonMonotonicTime { index: 2 });
    }

    #[test]
    fn slice_keeps_parent_rate() {
        let wf = Waveform::uniform((0..10).map(f64::from).collect(), 4.0, 1.0).expect("uniform");
        let part = wf.slice(2..5);
        assert_eq!(part.values(), &[2.0, 3.0, 4.0]);
        assert_eq!(part.fs(), 4.0);
        assert!((part.time()[0] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn beats_carry_raw_amplitude() {
        let wf = Waveform::uniform(vec![0.0, 3.0, 0.0, 5.0], 2.0, 0.0).expect("uniform");
        let beats = Beat::from_events(&wf, &Events::from_indices(vec![1, 3, 9]));
        assert_eq!(beats.len(), 2);
        assert_eq!(beats[1].amplitude, 5.0);
        assert!((beats[1].time - 1.5).abs() < 1e-12);
    }
}
