//! Sliding-window live estimation.
//!
//! Samples are pushed one at a time into per-channel ring buffers. Each sensor
//! group (IMU, ECG) keeps its own cadence: once its buffers hold a full window
//! the group re-runs the batch pipeline every `hop_s` seconds of samples.

use crate::config::RespConfig;
use crate::detectors::ecg::detect_beats_with_band;
use crate::edr::amplitude_modulation;
use crate::error::RespError;
use crate::estimators::{
    fuse, Autocorrelation, Estimator, ExtremaCycles, Fusion, Method, RateResult, Spectral,
};
use crate::filters;
use crate::imu::{ImuChannel, ImuFrame};
use crate::signal::Waveform;
use crate::windowing::{estimate_windows, WindowConfig};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub imu_fs: f64,
    pub ecg_fs: f64,
    /// Manual marker rate; the IMU rate when unset.
    pub marker_fs: Option<f64>,
    pub window_s: f64,
    pub hop_s: f64,
    /// Marker edges closer than `60 / manual_max_brpm` seconds are ignored.
    pub manual_max_brpm: f64,
    /// Sub-windows the ECG-derived waveform is split into before fusion.
    pub ecg_windows: WindowConfig,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            imu_fs: 50.0,
            ecg_fs: 500.0,
            marker_fs: None,
            window_s: 30.0,
            hop_s: 1.0,
            manual_max_brpm: 30.0,
            ecg_windows: WindowConfig {
                window_s: 15.0,
                hop_s: 5.0,
                min_samples: 10,
                allow_partial: true,
            },
        }
    }
}

impl LiveConfig {
    pub fn marker_fs(&self) -> f64 {
        self.marker_fs.unwrap_or(self.imu_fs)
    }

    pub fn validate(&self) -> Result<(), RespError> {
        let fields = [
            ("live.imu_fs", self.imu_fs),
            ("live.ecg_fs", self.ecg_fs),
            ("live.marker_fs", self.marker_fs()),
            ("live.window_s", self.window_s),
            ("live.hop_s", self.hop_s),
            ("live.manual_max_brpm", self.manual_max_brpm),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(RespError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if samples_for(self.window_s, self.imu_fs.min(self.marker_fs())) == 0 {
            return Err(RespError::InvalidConfig(
                "live.window_s holds no samples at the configured rates".into(),
            ));
        }
        self.ecg_windows.validate()
    }
}

fn samples_for(seconds: f64, fs: f64) -> usize {
    (seconds * fs).round() as usize
}

/// Fixed-capacity FIFO; the oldest sample is evicted once full.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer {
    data: VecDeque<f64>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, returning the evicted sample when the buffer was full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let evicted = if self.data.len() == self.capacity {
            self.data.pop_front()
        } else {
            None
        };
        self.data.push_back(value);
        evicted
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    /// Oldest-first copy of the contents.
    pub fn snapshot(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorGroup {
    Imu,
    Ecg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Imu(ImuChannel),
    Ecg,
}

/// One new sample for a sensor group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSample {
    Imu(ImuFrame),
    Ecg(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    /// Buffers below capacity.
    Filling,
    /// Buffers full, waiting for the hop counter.
    Ready,
    /// Pipeline running for the current hop.
    Emitting,
}

/// Per-method outcome behind a channel's fused rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResult {
    pub method: Method,
    pub result: RateResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRate {
    pub channel: Channel,
    /// Fused rate for the channel.
    pub result: RateResult,
    pub methods: Vec<MethodResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub group: SensorGroup,
    /// Stream time of the newest sample in the window (seconds since the first push).
    pub time_s: f64,
    pub channels: Vec<ChannelRate>,
    /// Rate implied by the manual marker, if it holds two or more edges.
    pub manual_brpm: Option<f64>,
}

/// What a single push produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LiveUpdate {
    WarmingUp {
        group: SensorGroup,
        filled: usize,
        capacity: usize,
    },
    WaitingForHop {
        group: SensorGroup,
        remaining: usize,
    },
    Estimate(FusedResult),
}

struct GroupBuffers {
    group: SensorGroup,
    fs: f64,
    hop: usize,
    since_last: usize,
    seen: usize,
    state: GroupState,
    buffers: Vec<(Channel, RingBuffer)>,
}

impl GroupBuffers {
    fn new(group: SensorGroup, channels: &[Channel], fs: f64, window_s: f64, hop_s: f64) -> Self {
        let capacity = samples_for(window_s, fs).max(1);
        Self {
            group,
            fs,
            hop: samples_for(hop_s, fs).max(1),
            since_last: 0,
            seen: 0,
            state: GroupState::Filling,
            buffers: channels
                .iter()
                .map(|&c| (c, RingBuffer::new(capacity)))
                .collect(),
        }
    }

    fn filled(&self) -> usize {
        self.buffers.first().map_or(0, |(_, b)| b.len())
    }

    fn capacity(&self) -> usize {
        self.buffers.first().map_or(0, |(_, b)| b.capacity())
    }

    fn status(&self) -> LiveUpdate {
        match self.state {
            GroupState::Filling => LiveUpdate::WarmingUp {
                group: self.group,
                filled: self.filled(),
                capacity: self.capacity(),
            },
            _ => LiveUpdate::WaitingForHop {
                group: self.group,
                remaining: self.hop.saturating_sub(self.since_last),
            },
        }
    }

    /// Append one value per channel. Returns true when the group should emit.
    fn append(&mut self, values: &[f64]) -> bool {
        for ((_, buffer), &v) in self.buffers.iter_mut().zip(values) {
            buffer.push(v);
        }
        self.seen += 1;
        self.since_last += 1;

        if self.state == GroupState::Filling {
            if self.filled() < self.capacity() {
                trace!("{:?} buffer {}/{}", self.group, self.filled(), self.capacity());
                return false;
            }
            debug!("{:?} buffers full after {} samples", self.group, self.seen);
            self.state = GroupState::Ready;
        }
        if self.since_last < self.hop {
            return false;
        }
        self.since_last = 0;
        self.state = GroupState::Emitting;
        true
    }

    fn window(&self, buffer: &RingBuffer) -> Result<Waveform, RespError> {
        let t0 = (self.seen - buffer.len()) as f64 / self.fs;
        Waveform::uniform(buffer.snapshot(), self.fs, t0)
    }

    fn time_s(&self) -> f64 {
        self.seen.saturating_sub(1) as f64 / self.fs
    }
}

/// Rising edges (`prev <= 0.5 < cur`) of a marker series sampled at `fs`,
/// debounced to at most `max_brpm`, converted to breaths per minute.
pub fn manual_reference_rate(marker: &[f64], fs: f64, max_brpm: f64) -> Option<f64> {
    let min_gap = 60.0 / max_brpm;
    let mut edges: Vec<f64> = Vec::new();
    for (i, pair) in marker.windows(2).enumerate() {
        if !(pair[0] <= 0.5 && pair[1] > 0.5) {
            continue;
        }
        let t = (i + 1) as f64 / fs;
        if edges.last().map_or(true, |&prev| t - prev >= min_gap) {
            edges.push(t);
        }
    }
    if edges.len() < 2 {
        return None;
    }
    let span = edges[edges.len() - 1] - edges[0];
    Some(60.0 * (edges.len() - 1) as f64 / span)
}

/// Live engine over one IMU group, one ECG group, and a manual marker.
///
/// Single-writer: callers serialise pushes, there is no internal locking.
pub struct LiveEngine {
    cfg: RespConfig,
    imu: GroupBuffers,
    ecg: GroupBuffers,
    marker: RingBuffer,
    imu_fusion: Fusion,
    ecg_estimator: ExtremaCycles,
}

impl LiveEngine {
    pub fn new(cfg: RespConfig) -> Result<Self, RespError> {
        cfg.validate()?;
        let live = &cfg.live;
        let band = &cfg.respiration;
        filters::butter_bandpass(live.imu_fs, band.low_hz, band.high_hz, band.order)?;
        filters::butter_bandpass(cfg.edr.am.uniform_fs, band.low_hz, band.high_hz, band.order)?;
        let beats = &cfg.beats;
        for high in [beats.qrs_high_hz, beats.am_qrs_high_hz] {
            filters::butter_bandpass(
                live.ecg_fs,
                beats.qrs_low_hz,
                filters::clamp_high(live.ecg_fs, high),
                beats.filter_order,
            )?;
        }

        let imu_channels: Vec<Channel> =
            ImuChannel::LIVE.iter().map(|&c| Channel::Imu(c)).collect();
        let search = cfg.plausibility.search;
        Ok(Self {
            imu: GroupBuffers::new(
                SensorGroup::Imu,
                &imu_channels,
                live.imu_fs,
                live.window_s,
                live.hop_s,
            ),
            ecg: GroupBuffers::new(
                SensorGroup::Ecg,
                &[Channel::Ecg],
                live.ecg_fs,
                live.window_s,
                live.hop_s,
            ),
            marker: RingBuffer::new(samples_for(live.window_s, live.marker_fs()).max(1)),
            imu_fusion: Fusion::new(
                vec![
                    Box::new(Autocorrelation::new(cfg.estimators.autocorrelation, search)),
                    Box::new(Spectral::new(cfg.estimators.spectral, search)),
                ],
                cfg.plausibility.fused,
            ),
            ecg_estimator: ExtremaCycles::new(cfg.estimators.extrema),
            cfg,
        })
    }

    pub fn config(&self) -> &RespConfig {
        &self.cfg
    }

    pub fn state(&self, group: SensorGroup) -> GroupState {
        match group {
            SensorGroup::Imu => self.imu.state,
            SensorGroup::Ecg => self.ecg.state,
        }
    }

    /// Append one manual marker sample.
    pub fn push_manual_marker(&mut self, bit: bool) {
        self.marker.push(if bit { 1.0 } else { 0.0 });
    }

    /// Append one sample. Data shortfalls inside the pipeline become
    /// no-estimate results; only misconfiguration surfaces as `Err`.
    pub fn push(&mut self, sample: ChannelSample) -> Result<LiveUpdate, RespError> {
        match sample {
            ChannelSample::Imu(frame) => {
                if !frame.is_finite() {
                    warn!("dropping non-finite IMU frame {frame:?}");
                    return Ok(self.imu.status());
                }
                let values: Vec<f64> = ImuChannel::LIVE.iter().map(|&c| frame.channel(c)).collect();
                if !self.imu.append(&values) {
                    return Ok(self.imu.status());
                }
                let update = self.emit_imu();
                self.imu.state = GroupState::Ready;
                update
            }
            ChannelSample::Ecg(value) => {
                if !value.is_finite() {
                    warn!("dropping non-finite ECG sample {value}");
                    return Ok(self.ecg.status());
                }
                if !self.ecg.append(&[value]) {
                    return Ok(self.ecg.status());
                }
                let update = self.emit_ecg();
                self.ecg.state = GroupState::Ready;
                update
            }
        }
    }

    fn manual_brpm(&self) -> Option<f64> {
        manual_reference_rate(
            &self.marker.snapshot(),
            self.cfg.live.marker_fs(),
            self.cfg.live.manual_max_brpm,
        )
    }

    fn emit_imu(&self) -> Result<LiveUpdate, RespError> {
        let band = &self.cfg.respiration;
        let mut channels = Vec::with_capacity(self.imu.buffers.len());
        for (channel, buffer) in &self.imu.buffers {
            let raw = self.imu.window(buffer)?;
            let filtered =
                filters::bandpass(raw.values(), raw.fs(), band.low_hz, band.high_hz, band.order);
            let rate = match filtered {
                Ok(filtered) => {
                    let filtered = raw.with_values(filtered)?;
                    let methods = self.imu_fusion.estimate_all(&filtered);
                    ChannelRate {
                        channel: *channel,
                        result: fuse(&methods, self.cfg.plausibility.fused),
                        methods: methods
                            .into_iter()
                            .map(|(method, result)| MethodResult { method, result })
                            .collect(),
                    }
                }
                Err(e) => ChannelRate {
                    channel: *channel,
                    result: RateResult::from_error(e)?,
                    methods: Vec::new(),
                },
            };
            channels.push(rate);
        }
        debug!(
            "IMU hop at {:.2}s: {:?}",
            self.imu.time_s(),
            channels.iter().map(|c| c.result.brpm()).collect::<Vec<_>>()
        );
        Ok(LiveUpdate::Estimate(FusedResult {
            group: SensorGroup::Imu,
            time_s: self.imu.time_s(),
            channels,
            manual_brpm: self.manual_brpm(),
        }))
    }

    fn ecg_rate(&self, raw: &Waveform) -> Result<ChannelRate, RespError> {
        let beats_cfg = &self.cfg.beats;
        let beats = detect_beats_with_band(raw, beats_cfg, beats_cfg.am_qrs_high_hz)?;
        let am = amplitude_modulation(raw, &beats, &self.cfg.respiration, &self.cfg.edr.am)?;
        let windows = estimate_windows(&am.edr, &self.cfg.live.ecg_windows, &self.ecg_estimator)?;
        let methods: Vec<(Method, RateResult)> = windows
            .into_iter()
            .map(|w| (self.ecg_estimator.method(), w.result))
            .collect();
        Ok(ChannelRate {
            channel: Channel::Ecg,
            result: fuse(&methods, self.cfg.plausibility.fused),
            methods: methods
                .into_iter()
                .map(|(method, result)| MethodResult { method, result })
                .collect(),
        })
    }

    fn emit_ecg(&self) -> Result<LiveUpdate, RespError> {
        let Some((_, buffer)) = self.ecg.buffers.first() else {
            return Ok(self.ecg.status());
        };
        let raw = self.ecg.window(buffer)?;
        let rate = match self.ecg_rate(&raw) {
            Ok(rate) => rate,
            Err(e) => ChannelRate {
                channel: Channel::Ecg,
                result: RateResult::from_error(e)?,
                methods: Vec::new(),
            },
        };
        if let RateResult::NoEstimate(reason) = &rate.result {
            debug!("ECG hop at {:.2}s: {reason}", self.ecg.time_s());
        }
        Ok(LiveUpdate::Estimate(FusedResult {
            group: SensorGroup::Ecg,
            time_s: self.ecg.time_s(),
            channels: vec![rate],
            manual_brpm: self.manual_brpm(),
        }))
    }
}

impl std::fmt::Debug for LiveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveEngine")
            .field("imu", &self.imu.state)
            .field("ecg", &self.ecg.state)
            .field("marker", &self.marker.len())
            .finish()
    }
}
