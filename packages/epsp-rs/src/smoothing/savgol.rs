//! Savitzky-Golay smoothing: local least-squares polynomial fits.

use crate::error::{EpspError, Result};
use nalgebra::{DMatrix, DVector};

/// Vandermonde matrix for positions `x0 .. x0 + len` and polynomial degree `polyorder`.
fn vandermonde(len: usize, polyorder: usize, x0: f64) -> DMatrix<f64> {
    DMatrix::from_fn(len, polyorder + 1, |i, j| (x0 + i as f64).powi(j as i32))
}

/// Least-squares polynomial coefficients for `a * p = y`.
fn solve_normal(a: &DMatrix<f64>, y: &DVector<f64>) -> Result<DVector<f64>> {
    let ata = a.transpose() * a;
    let aty = a.transpose() * y;
    ata.lu()
        .solve(&aty)
        .ok_or_else(|| EpspError::Config("Savitzky-Golay normal equations are singular".into()))
}

/// Smoothing weights for the window center: `h = A (A^T A)^-1 e0`.
pub fn savgol_coeffs(window_size: usize, polyorder: usize) -> Result<Vec<f64>> {
    let half = (window_size / 2) as f64;
    let a = vandermonde(window_size, polyorder, -half);
    let ata = a.transpose() * &a;
    let mut e0 = DVector::<f64>::zeros(polyorder + 1);
    e0[0] = 1.0;
    let x = ata
        .lu()
        .solve(&e0)
        .ok_or_else(|| EpspError::Config("Savitzky-Golay normal equations are singular".into()))?;
    Ok((a * x).iter().copied().collect())
}

/// Apply the filter. Edge samples take the value of the polynomial fitted to the
/// first (or last) full window.
pub fn savgol(signal: &[f64], window_size: usize, polyorder: usize) -> Result<Vec<f64>> {
    let n = signal.len();
    if n < window_size {
        return Err(EpspError::Range {
            message: format!(
                "Signal of {} samples is shorter than the {}-sample savgol window",
                n, window_size
            ),
            sweep: None,
        });
    }
    let half = window_size / 2;
    let coeffs = savgol_coeffs(window_size, polyorder)?;

    let mut out = vec![0.0; n];
    for i in half..n - half {
        out[i] = coeffs
            .iter()
            .zip(&signal[i - half..=i + half])
            .map(|(c, y)| c * y)
            .sum();
    }

    let a = vandermonde(window_size, polyorder, 0.0);
    let head = solve_normal(&a, &DVector::from_column_slice(&signal[..window_size]))?;
    let tail = solve_normal(&a, &DVector::from_column_slice(&signal[n - window_size..]))?;
    for i in 0..half {
        out[i] = eval_poly(&head, i as f64);
        let j = window_size - half + i;
        out[n - half + i] = eval_poly(&tail, j as f64);
    }

    Ok(out)
}

fn eval_poly(coeffs: &DVector<f64>, x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coeffs_match_reference_table() {
        // Classic 5-point quadratic weights: (-3, 12, 17, 12, -3) / 35
        let c = savgol_coeffs(5, 2).unwrap();
        let expected = [-3.0, 12.0, 17.0, 12.0, -3.0].map(|v| v / 35.0);
        for (a, b) in c.iter().zip(expected) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_preserves_polynomials_up_to_order() {
        let signal: Vec<f64> = (0..30)
            .map(|i| {
                let x = i as f64 * 0.1;
                0.5 - 2.0 * x + 0.75 * x * x
            })
            .collect();
        let out = savgol(&signal, 7, 2).unwrap();
        for (a, b) in out.iter().zip(&signal) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_short_signal_rejected() {
        assert!(matches!(
            savgol(&[1.0, 2.0, 3.0], 5, 2),
            Err(EpspError::Range { .. })
        ));
    }
}
