/// Peak detection on 1-D intensity profiles
///
/// Peaks are local maxima filtered by topographic prominence and minimum
/// separation. Positions are refined to the midpoint of the half-prominence
/// crossings, which tracks the center of broad flat-topped spokes better
/// than the brightest sample does.

/// Peak search parameters
#[derive(Debug, Clone)]
pub struct PeakParams {
    /// Minimum prominence as a fraction of the profile range (0-1)
    pub prominence_threshold: f64,
    /// Minimum distance between accepted peaks (samples)
    pub min_separation: usize,
    /// Median filter window applied first (samples, 0 or 1 disables)
    pub smoothing: usize,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            prominence_threshold: 0.2,
            min_separation: 1,
            smoothing: 0,
        }
    }
}

/// A detected local maximum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Sample index of the maximum
    pub index: usize,
    /// Sub-sample center of the peak
    pub position: f64,
    pub value: f64,
    pub prominence: f64,
}

/// Median filter; `cyclic` wraps the window around the ends
pub fn median_filter(values: &[f64], window: usize, cyclic: bool) -> Vec<f64> {
    let n = values.len();
    if window <= 1 || n == 0 {
        return values.to_vec();
    }
    let half = (window / 2) as isize;
    let mut scratch = Vec::with_capacity(window);
    (0..n as isize)
        .map(|i| {
            scratch.clear();
            for off in -half..=half {
                let j = i + off;
                let j = if cyclic {
                    j.rem_euclid(n as isize)
                } else {
                    j.clamp(0, n as isize - 1)
                };
                scratch.push(values[j as usize]);
            }
            scratch.sort_by(|a, b| a.total_cmp(b));
            scratch[scratch.len() / 2]
        })
        .collect()
}

/// Find peaks on a linear axis
pub fn find_peaks(values: &[f64], params: &PeakParams) -> Vec<Peak> {
    let smoothed = median_filter(values, params.smoothing, false);
    detect(&smoothed, params, None)
}

/// Find peaks on a wrapped axis such as a full circle.
///
/// The profile is rotated to start at its global minimum so no peak straddles
/// the seam; reported indices and positions refer to the original samples.
pub fn find_cyclic_peaks(values: &[f64], params: &PeakParams) -> Vec<Peak> {
    let n = values.len();
    if n < 3 {
        return Vec::new();
    }
    let smoothed = median_filter(values, params.smoothing, true);
    let shift = smoothed
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut rotated = Vec::with_capacity(n);
    rotated.extend_from_slice(&smoothed[shift..]);
    rotated.extend_from_slice(&smoothed[..shift]);

    let mut peaks: Vec<Peak> = detect(&rotated, params, Some(n))
        .into_iter()
        .map(|p| Peak {
            index: (p.index + shift) % n,
            position: (p.position + shift as f64).rem_euclid(n as f64),
            ..p
        })
        .collect();
    peaks.sort_by_key(|p| p.index);
    peaks
}

/// Local maxima with plateaus reduced to their middle sample
fn local_maxima(v: &[f64]) -> Vec<usize> {
    let n = v.len();
    let mut maxima = Vec::new();
    let mut i = 1;
    while i + 1 < n {
        if v[i - 1] < v[i] {
            let mut ahead = i + 1;
            while ahead + 1 < n && v[ahead] == v[i] {
                ahead += 1;
            }
            if v[ahead] < v[i] {
                maxima.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    maxima
}

/// Height above the higher of the two lowest points reachable before
/// climbing above the peak on either side
fn prominence(v: &[f64], peak: usize) -> f64 {
    let h = v[peak];

    let mut left_min = h;
    for &x in v[..peak].iter().rev() {
        if x > h {
            break;
        }
        left_min = left_min.min(x);
    }

    let mut right_min = h;
    for &x in &v[peak + 1..] {
        if x > h {
            break;
        }
        right_min = right_min.min(x);
    }

    h - left_min.max(right_min)
}

/// Midpoint of the crossings of `level` on either side of `peak`
fn crossing_center(v: &[f64], peak: usize, level: f64) -> f64 {
    let n = v.len();

    let mut left = 0.0;
    let mut j = peak;
    while j > 0 {
        j -= 1;
        if v[j] <= level {
            let rise = v[j + 1] - v[j];
            left = if rise > 0.0 {
                j as f64 + (level - v[j]) / rise
            } else {
                j as f64
            };
            break;
        }
    }

    let mut right = (n - 1) as f64;
    let mut k = peak;
    while k + 1 < n {
        k += 1;
        if v[k] <= level {
            let fall = v[k - 1] - v[k];
            right = if fall > 0.0 {
                (k - 1) as f64 + (v[k - 1] - level) / fall
            } else {
                k as f64
            };
            break;
        }
    }

    (left + right) / 2.0
}

fn detect(v: &[f64], params: &PeakParams, period: Option<usize>) -> Vec<Peak> {
    if v.len() < 3 {
        return Vec::new();
    }
    let (min, max) = v
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    let range = max - min;
    if !(range > 0.0) {
        return Vec::new();
    }
    let required = params.prominence_threshold * range;

    let candidates: Vec<Peak> = local_maxima(v)
        .into_iter()
        .filter_map(|index| {
            let prom = prominence(v, index);
            (prom >= required).then(|| Peak {
                index,
                position: crossing_center(v, index, v[index] - prom / 2.0),
                value: v[index],
                prominence: prom,
            })
        })
        .collect();

    enforce_separation(candidates, params.min_separation, period)
}

/// Keep the tallest peak of any group closer than `min_separation`
fn enforce_separation(mut peaks: Vec<Peak>, min_separation: usize, period: Option<usize>) -> Vec<Peak> {
    if min_separation <= 1 || peaks.len() < 2 {
        return peaks;
    }
    let distance = |a: usize, b: usize| {
        let d = a.abs_diff(b);
        match period {
            Some(n) => d.min(n - d),
            None => d,
        }
    };

    peaks.sort_by(|a, b| {
        b.value
            .total_cmp(&a.value)
            .then(b.prominence.total_cmp(&a.prominence))
    });
    let mut kept: Vec<Peak> = Vec::with_capacity(peaks.len());
    for peak in peaks {
        if kept.iter().all(|k| distance(k.index, peak.index) >= min_separation) {
            kept.push(peak);
        }
    }
    kept.sort_by_key(|p| p.index);
    kept
}
