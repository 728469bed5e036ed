mod input;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use resp_lib::{
    detectors::ecg::PeakPolicy,
    estimators::EstimatorKind,
    imu::{ImuChannel, ImuFrame},
    live::{ChannelSample, LiveEngine, LiveUpdate},
    pipeline,
    signal::{Events, Waveform},
    RespConfig,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "resp",
    version,
    about = "Respiratory rate from ECG and IMU sample series"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MethodArg {
    Fused,
    Autocorrelation,
    Spectral,
    PeakInterval,
    UpCrossing,
    Extrema,
}

impl From<MethodArg> for EstimatorKind {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Fused => EstimatorKind::Fused,
            MethodArg::Autocorrelation => EstimatorKind::Autocorrelation,
            MethodArg::Spectral => EstimatorKind::Spectral,
            MethodArg::PeakInterval => EstimatorKind::PeakInterval,
            MethodArg::UpCrossing => EstimatorKind::UpCrossing,
            MethodArg::Extrema => EstimatorKind::Extrema,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ChannelArg {
    X,
    Y,
    Z,
    Magnitude,
    DevicePitch,
    AccelPitch,
}

impl From<ChannelArg> for ImuChannel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::X => ImuChannel::X,
            ChannelArg::Y => ImuChannel::Y,
            ChannelArg::Z => ImuChannel::Z,
            ChannelArg::Magnitude => ImuChannel::Magnitude,
            ChannelArg::DevicePitch => ImuChannel::DevicePitch,
            ChannelArg::AccelPitch => ImuChannel::AccelPitch,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyArg {
    Prominence,
    RobustWidth,
}

impl From<PolicyArg> for PeakPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Prominence => PeakPolicy::Prominence,
            PolicyArg::RobustWidth => PeakPolicy::RobustWidth,
        }
    }
}

#[derive(clap::Args)]
struct WindowArgs {
    #[arg(long)]
    window_s: Option<f64>,
    #[arg(long)]
    hop_s: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Windowed respiration rate from a breathing waveform (newline-delimited samples)
    Estimate {
        #[arg(long)]
        fs: f64,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        method: Option<MethodArg>,
        /// Read `ax ay az pitch` rows and estimate from this derived channel
        #[arg(long)]
        channel: Option<ChannelArg>,
        #[command(flatten)]
        windows: WindowArgs,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Detect R-peaks in a raw ECG series
    Beats {
        #[arg(long)]
        fs: f64,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        policy: Option<PolicyArg>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Windowed rate from beat-amplitude modulation of a raw ECG series
    EdrAm {
        #[arg(long)]
        fs: f64,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        policy: Option<PolicyArg>,
        #[command(flatten)]
        windows: WindowArgs,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Windowed rate from QRS-masked baseline wander of a raw ECG series
    EdrBw {
        #[arg(long)]
        fs: f64,
        #[arg(long)]
        input: Option<PathBuf>,
        /// Newline-delimited R-peak sample indices; detected when omitted
        #[arg(long)]
        beats: Option<PathBuf>,
        #[arg(long)]
        policy: Option<PolicyArg>,
        #[command(flatten)]
        windows: WindowArgs,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Replay a z-axis accelerometer series through the live engine, one JSON line per estimate
    LiveReplay {
        #[arg(long)]
        imu_fs: Option<f64>,
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        windows: WindowArgs,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Estimate {
            fs,
            input,
            method,
            channel,
            windows,
            config,
        } => cmd_estimate(
            fs,
            input.as_deref(),
            method,
            channel,
            &windows,
            config.as_deref(),
        )?,
        Commands::Beats {
            fs,
            input,
            policy,
            config,
        } => cmd_beats(fs, input.as_deref(), policy, config.as_deref())?,
        Commands::EdrAm {
            fs,
            input,
            policy,
            windows,
            config,
        } => cmd_edr_am(fs, input.as_deref(), policy, &windows, config.as_deref())?,
        Commands::EdrBw {
            fs,
            input,
            beats,
            policy,
            windows,
            config,
        } => cmd_edr_bw(
            fs,
            input.as_deref(),
            beats.as_deref(),
            policy,
            &windows,
            config.as_deref(),
        )?,
        Commands::LiveReplay {
            imu_fs,
            input,
            windows,
            config,
        } => cmd_live_replay(imu_fs, input.as_deref(), &windows, config.as_deref())?,
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<RespConfig> {
    let Some(path) = path else {
        return Ok(RespConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: RespConfig =
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?;
    info!("loaded configuration from {}", path.display());
    Ok(cfg)
}

fn apply_windows(cfg: &mut RespConfig, windows: &WindowArgs) {
    if let Some(window_s) = windows.window_s {
        cfg.windowing.window_s = window_s;
    }
    if let Some(hop_s) = windows.hop_s {
        cfg.windowing.hop_s = hop_s;
    }
}

fn apply_policy(cfg: &mut RespConfig, policy: Option<PolicyArg>) {
    if let Some(policy) = policy {
        cfg.beats.policy = policy.into();
    }
}

fn load_waveform(fs: f64, input: Option<&Path>) -> Result<Waveform> {
    let values = input::read_samples(input)?;
    Ok(Waveform::uniform(values, fs, 0.0)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn cmd_estimate(
    fs: f64,
    input: Option<&Path>,
    method: Option<MethodArg>,
    channel: Option<ChannelArg>,
    windows: &WindowArgs,
    config: Option<&Path>,
) -> Result<()> {
    let mut cfg = load_config(config)?;
    apply_windows(&mut cfg, windows);
    if let Some(method) = method {
        cfg.estimator = method.into();
    }
    let estimates = match channel {
        Some(channel) => {
            let frames = input::read_imu_frames(input)?;
            pipeline::estimate_imu(&frames, fs, channel.into(), &cfg)?
        }
        None => pipeline::estimate_respiration_rate(&load_waveform(fs, input)?, &cfg)?,
    };
    print_json(&estimates)
}

fn cmd_beats(
    fs: f64,
    input: Option<&Path>,
    policy: Option<PolicyArg>,
    config: Option<&Path>,
) -> Result<()> {
    let mut cfg = load_config(config)?;
    apply_policy(&mut cfg, policy);
    let ecg = load_waveform(fs, input)?;
    print_json(&pipeline::beats(&ecg, &cfg)?)
}

fn cmd_edr_am(
    fs: f64,
    input: Option<&Path>,
    policy: Option<PolicyArg>,
    windows: &WindowArgs,
    config: Option<&Path>,
) -> Result<()> {
    let mut cfg = load_config(config)?;
    apply_policy(&mut cfg, policy);
    apply_windows(&mut cfg, windows);
    let ecg = load_waveform(fs, input)?;
    print_json(&pipeline::estimate_am(&ecg, &cfg)?)
}

fn cmd_edr_bw(
    fs: f64,
    input: Option<&Path>,
    beats: Option<&Path>,
    policy: Option<PolicyArg>,
    windows: &WindowArgs,
    config: Option<&Path>,
) -> Result<()> {
    let mut cfg = load_config(config)?;
    apply_policy(&mut cfg, policy);
    apply_windows(&mut cfg, windows);
    let ecg = load_waveform(fs, input)?;
    let beats = beats
        .map(|path| input::read_indices(path).map(Events::from_indices))
        .transpose()?;
    print_json(&pipeline::estimate_bw(&ecg, beats.as_ref(), &cfg)?)
}

fn cmd_live_replay(
    imu_fs: Option<f64>,
    input: Option<&Path>,
    windows: &WindowArgs,
    config: Option<&Path>,
) -> Result<()> {
    let mut cfg = load_config(config)?;
    if let Some(imu_fs) = imu_fs {
        cfg.live.imu_fs = imu_fs;
    }
    if let Some(window_s) = windows.window_s {
        cfg.live.window_s = window_s;
    }
    if let Some(hop_s) = windows.hop_s {
        cfg.live.hop_s = hop_s;
    }
    let samples = input::read_samples(input)?;
    let mut engine = LiveEngine::new(cfg)?;
    let mut emitted = 0usize;
    for az in samples {
        let frame = ImuFrame {
            az,
            ..ImuFrame::default()
        };
        if let LiveUpdate::Estimate(result) = engine.push(ChannelSample::Imu(frame))? {
            print_json(&result)?;
            emitted += 1;
        }
    }
    info!("replay emitted {emitted} estimates");
    Ok(())
}
