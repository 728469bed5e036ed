//! Local-maximum peak picking with distance, prominence, and width
//! constraints, applied in that order.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeakCriteria {
    /// Minimum index separation between kept peaks; taller peaks win.
    pub distance: Option<usize>,
    /// Minimum prominence.
    pub prominence: Option<f64>,
    /// Inclusive width bounds in samples, measured at half prominence.
    pub width: Option<(f64, f64)>,
}

/// Prominence of one peak together with the bases it was measured against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prominence {
    pub value: f64,
    pub left_base: usize,
    pub right_base: usize,
}

/// Indices of strict local maxima; flat tops report their middle sample.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let mut keep = vec![true; peaks.len()];
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }
    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Vertical distance between a peak and the higher of its two surrounding
/// minima, searching outwards until a higher sample or the signal edge.
pub fn prominence(x: &[f64], peak: usize) -> Prominence {
    let height = x[peak];

    let mut left_min = height;
    let mut left_base = peak;
    let mut i = peak;
    loop {
        if x[i] > height {
            break;
        }
        if x[i] < left_min {
            left_min = x[i];
            left_base = i;
        }
        if i == 0 {
            break;
        }
        i -= 1;
    }

    let mut right_min = height;
    let mut right_base = peak;
    let mut i = peak;
    while i < x.len() && x[i] <= height {
        if x[i] < right_min {
            right_min = x[i];
            right_base = i;
        }
        i += 1;
    }

    Prominence {
        value: height - left_min.max(right_min),
        left_base,
        right_base,
    }
}

/// Peak width at half prominence, with linear interpolation of the crossings.
pub fn half_prominence_width(x: &[f64], peak: usize, prom: &Prominence) -> f64 {
    let height = x[peak] - 0.5 * prom.value;

    let mut i = peak;
    while prom.left_base < i && height < x[i] {
        i -= 1;
    }
    let mut left = i as f64;
    if x[i] < height {
        left += (height - x[i]) / (x[i + 1] - x[i]);
    }

    let mut i = peak;
    while i < prom.right_base && height < x[i] {
        i += 1;
    }
    let mut right = i as f64;
    if x[i] < height {
        right -= (height - x[i]) / (x[i - 1] - x[i]);
    }

    right - left
}

/// Find peaks satisfying all configured criteria. Output is ascending.
pub fn find_peaks(x: &[f64], criteria: &PeakCriteria) -> Vec<usize> {
    let mut peaks = local_maxima(x);

    if let Some(distance) = criteria.distance {
        if distance > 1 && peaks.len() > 1 {
            peaks = select_by_distance(x, &peaks, distance);
        }
    }

    if criteria.prominence.is_none() && criteria.width.is_none() {
        return peaks;
    }

    peaks
        .into_iter()
        .filter(|&p| {
            let prom = prominence(x, p);
            if let Some(min_prom) = criteria.prominence {
                if prom.value < min_prom {
                    return false;
                }
            }
            if let Some((lo, hi)) = criteria.width {
                let w = half_prominence_width(x, p, &prom);
                if w < lo || w > hi {
                    return false;
                }
            }
            true
        })
        .collect()
}
