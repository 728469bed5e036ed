//! Accelerometer-derived respiration channels.

use serde::{Deserialize, Serialize};

const TILT_EPS: f64 = 1e-8;

/// One IMU sample: accelerometer axes (g) and the device's own pitch estimate (rad).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuFrame {
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub pitch: f64,
}

impl ImuFrame {
    pub fn is_finite(&self) -> bool {
        self.ax.is_finite() && self.ay.is_finite() && self.az.is_finite() && self.pitch.is_finite()
    }

    pub fn channel(&self, channel: ImuChannel) -> f64 {
        match channel {
            ImuChannel::X => self.ax,
            ImuChannel::Y => self.ay,
            ImuChannel::Z => self.az,
            ImuChannel::Magnitude => magnitude(self.ax, self.ay, self.az),
            ImuChannel::DevicePitch => self.pitch,
            ImuChannel::AccelPitch => accel_tilt(self.ax, self.ay, self.az).pitch,
        }
    }
}

/// Which IMU-derived series is treated as the respiration signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImuChannel {
    X,
    Y,
    #[default]
    Z,
    Magnitude,
    DevicePitch,
    AccelPitch,
}

impl ImuChannel {
    /// Channels the live engine tracks for every IMU frame.
    pub const LIVE: [ImuChannel; 3] = [
        ImuChannel::Z,
        ImuChannel::DevicePitch,
        ImuChannel::AccelPitch,
    ];
}

pub fn magnitude(ax: f64, ay: f64, az: f64) -> f64 {
    (ax * ax + ay * ay + az * az).sqrt()
}

/// Roll and pitch (rad) of the gravity vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tilt {
    pub roll: f64,
    pub pitch: f64,
}

/// Tilt from unit-normalised accelerometer components.
pub fn accel_tilt(ax: f64, ay: f64, az: f64) -> Tilt {
    let norm = magnitude(ax, ay, az) + TILT_EPS;
    let (x, y, z) = (ax / norm, ay / norm, az / norm);
    Tilt {
        roll: y.atan2(z),
        pitch: (-x).atan2((y * y + z * z).sqrt() + TILT_EPS),
    }
}

/// Derive one channel for a whole recording.
pub fn derive_channel(frames: &[ImuFrame], channel: ImuChannel) -> Vec<f64> {
    frames.iter().map(|f| f.channel(channel)).collect()
}
