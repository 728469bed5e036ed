use anyhow::{Context, Result};
use resp_lib::imu::ImuFrame;
use std::io::{self, Read};
use std::path::Path;

/// Parse newline-delimited samples, skipping blank and `#` lines.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not a number: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Parse newline-delimited beat sample indices.
pub fn parse_indices(text: &str) -> Result<Vec<usize>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: usize = trimmed
            .parse()
            .with_context(|| format!("line {} is not a sample index: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    Ok(out)
}

/// Parse IMU frames, one `ax ay az pitch` row per line (comma or whitespace separated).
pub fn parse_imu_frames(text: &str) -> Result<Vec<ImuFrame>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .map(|f| f.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("line {} is not numeric: {}", idx + 1, trimmed))?;
        let &[ax, ay, az, pitch] = fields.as_slice() else {
            anyhow::bail!(
                "line {} has {} columns, expected ax ay az pitch",
                idx + 1,
                fields.len()
            );
        };
        out.push(ImuFrame { ax, ay, az, pitch });
    }
    if out.is_empty() {
        anyhow::bail!("no IMU frames found");
    }
    Ok(out)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => read_text(path),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Samples from `path`, or stdin when no path is given.
pub fn read_samples(path: Option<&Path>) -> Result<Vec<f64>> {
    parse_f64_series(&read_input(path)?)
}

pub fn read_imu_frames(path: Option<&Path>) -> Result<Vec<ImuFrame>> {
    parse_imu_frames(&read_input(path)?)
}

pub fn read_indices(path: &Path) -> Result<Vec<usize>> {
    parse_indices(&read_text(path)?)
}
