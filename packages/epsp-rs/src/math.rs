//! Numeric helpers shared by the feature detectors.

/// Numerical derivative `dy/dx`: central differences inside, one-sided at the ends.
pub fn gradient(y: &[f64], x: &[f64]) -> Vec<f64> {
    let n = y.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| {
                let (lo, hi) = match i {
                    0 => (0, 1),
                    i if i == n - 1 => (n - 2, n - 1),
                    i => (i - 1, i + 1),
                };
                (y[hi] - y[lo]) / (x[hi] - x[lo])
            })
            .collect(),
    }
}

/// Ordinary least-squares line through `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination; NaN when `y` is constant
    pub r2: f64,
}

pub fn linear_fit(x: &[f64], y: &[f64]) -> LinearFit {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let sxy: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (xi - mean_x) * (yi - mean_y))
        .sum();
    let sxx: f64 = x.iter().map(|xi| (xi - mean_x).powi(2)).sum();
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let ss_res: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (yi - (slope * xi + intercept)).powi(2))
        .sum();
    let ss_tot: f64 = y.iter().map(|yi| (yi - mean_y).powi(2)).sum();
    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        f64::NAN
    };

    LinearFit {
        slope,
        intercept,
        r2,
    }
}

/// Index of the smallest value; the earliest index wins ties. NaNs are skipped.
pub fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Index of the largest value; the earliest index wins ties. NaNs are skipped.
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Local maxima. A flat top counts once, at its middle sample (rounded down).
/// The first and last samples are never peaks.
pub fn find_peaks(data: &[f64]) -> Vec<usize> {
    let n = data.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }
    let mut i = 1;
    while i < n - 1 {
        if data[i - 1] < data[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && data[ahead] == data[i] {
                ahead += 1;
            }
            if data[ahead] < data[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

/// Peak prominence: height above the higher of the two lowest points reached before a
/// strictly higher sample (or the signal edge) on each side.
pub fn compute_prominences(peaks: &[usize], data: &[f64]) -> Vec<f64> {
    let n = data.len();
    let mut prominences = Vec::with_capacity(peaks.len());

    for &peak in peaks {
        let peak_height = data[peak];

        let mut left_min = peak_height;
        for i in (0..peak).rev() {
            if data[i] > peak_height {
                break;
            }
            left_min = left_min.min(data[i]);
        }

        let mut right_min = peak_height;
        for i in peak + 1..n {
            if data[i] > peak_height {
                break;
            }
            right_min = right_min.min(data[i]);
        }

        let base = left_min.max(right_min);
        prominences.push(peak_height - base);
    }

    prominences
}

/// Mean of `values`, NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_linear() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        assert_eq!(gradient(&y, &x), vec![2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_linear_fit_exact_line() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|v| -0.5 * v + 2.0).collect();
        let fit = linear_fit(&x, &y);
        assert!((fit.slope + 0.5).abs() < 1e-12);
        assert!((fit.intercept - 2.0).abs() < 1e-12);
        assert!((fit.r2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_fit_flat_r2_nan() {
        let fit = linear_fit(&[0.0, 1.0, 2.0], &[3.0, 3.0, 3.0]);
        assert_eq!(fit.slope, 0.0);
        assert!(fit.r2.is_nan());
    }

    #[test]
    fn test_argmin_first_tie() {
        assert_eq!(argmin(&[0.0, -1.0, 2.0, -1.0]), Some(1));
        assert_eq!(argmax(&[5.0, 1.0, 5.0]), Some(0));
        assert_eq!(argmin(&[]), None);
    }

    #[test]
    fn test_find_peaks_plateau_middle() {
        let data = [0.0, 1.0, 0.0, 2.0, 2.0, 2.0, 0.0, 3.0];
        assert_eq!(find_peaks(&data), vec![1, 4]);
    }

    #[test]
    fn test_prominences() {
        let data = [0.0, 3.0, 1.0, 2.0, 0.5, 4.0, 0.0];
        let peaks = find_peaks(&data);
        assert_eq!(peaks, vec![1, 3, 5]);
        let prom = compute_prominences(&peaks, &data);
        assert_eq!(prom, vec![2.5, 1.0, 4.0]);
    }
}
