//! Small descriptive-statistics and interpolation helpers shared by the
//! detectors and estimators. Every function returns `None` on empty input
//! instead of a NaN.

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    let var = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64;
    Some(var.sqrt())
}

fn sorted(data: &[f64]) -> Vec<f64> {
    let mut v = data.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

pub fn median(data: &[f64]) -> Option<f64> {
    percentile(data, 50.0)
}

/// Median absolute deviation from the median (unscaled).
pub fn mad(data: &[f64]) -> Option<f64> {
    let med = median(data)?;
    let deviations: Vec<f64> = data.iter().map(|x| (x - med).abs()).collect();
    median(&deviations)
}

/// Percentile `q` in [0, 100] with linear interpolation between order statistics.
pub fn percentile(data: &[f64], q: f64) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let v = sorted(data);
    let pos = (q.clamp(0.0, 100.0) / 100.0) * (v.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(v[lo] + (v[hi] - v[lo]) * frac)
}

/// Median spacing of a time axis.
pub fn median_spacing(time: &[f64]) -> Option<f64> {
    let diffs: Vec<f64> = time.windows(2).map(|w| w[1] - w[0]).collect();
    let dt = median(&diffs)?;
    if dt.is_finite() && dt > 0.0 {
        Some(dt)
    } else {
        None
    }
}

/// Linear interpolation of `(xp, fp)` at `x`, extrapolating linearly from the
/// first/last segment outside the sampled range. `xp` must be strictly increasing
/// and hold at least two points.
pub fn interp_extrapolate(xp: &[f64], fp: &[f64], x: f64) -> f64 {
    let n = xp.len();
    let seg = match xp.partition_point(|&v| v <= x) {
        0 => 0,
        i if i >= n => n - 2,
        i => i - 1,
    };
    let (x0, x1) = (xp[seg], xp[seg + 1]);
    let (y0, y1) = (fp[seg], fp[seg + 1]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Fill missing samples by linear interpolation over the sample index, holding
/// the nearest known value at the edges. All-missing input becomes zeros.
pub fn fill_gaps(data: &[Option<f64>]) -> Vec<f64> {
    let known: Vec<(usize, f64)> = data
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect();
    if known.is_empty() {
        return vec![0.0; data.len()];
    }
    let mut out = Vec::with_capacity(data.len());
    let mut next = 0usize;
    for (i, v) in data.iter().enumerate() {
        if let Some(x) = v {
            out.push(*x);
            continue;
        }
        while next < known.len() && known[next].0 < i {
            next += 1;
        }
        let value = if next == 0 {
            known[0].1
        } else if next >= known.len() {
            known[known.len() - 1].1
        } else {
            let (i0, y0) = known[next - 1];
            let (i1, y1) = known[next];
            y0 + (y1 - y0) * (i - i0) as f64 / (i1 - i0) as f64
        };
        out.push(value);
    }
    out
}

pub fn argmax(data: &[f64]) -> Option<usize> {
    data.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

pub fn argmin(data: &[f64]) -> Option<usize> {
    data.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
