use crate::error::{EpspError, Result};
use crate::math::mean;
use crate::types::{TidyTable, WindowMs};

/// Subtract each sweep's mean voltage in `window` (relative to the sweep's first sample).
pub fn baseline_correction(tidy: &TidyTable, window: WindowMs) -> Result<TidyTable> {
    let sweeps = tidy
        .sweeps
        .iter()
        .map(|sweep| {
            let offset = sweep.time.first().copied().unwrap_or(0.0);
            let range = window.index_range(&sweep.time, offset);
            if range.is_empty() {
                return Err(
                    EpspError::range("baseline", window.as_tuple()).for_sweep(sweep.sweep_index)
                );
            }
            let baseline = mean(&sweep.voltage[range]);
            log::trace!("Sweep {} baseline: {:.4} mV", sweep.sweep_index, baseline);
            Ok(sweep.with_voltage(sweep.voltage.iter().map(|v| v - baseline).collect()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TidyTable::new(sweeps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sweep;

    fn sweep(index: usize, offset: f64) -> Sweep {
        let time: Vec<f64> = (0..20).map(|i| i as f64 * 0.0001).collect();
        let voltage = time.iter().map(|t| offset + 100.0 * t).collect();
        Sweep::new(50.0, index, time, voltage)
    }

    #[test]
    fn test_subtracts_window_mean() {
        let tidy = TidyTable::new(vec![sweep(0, 1.5), sweep(1, -0.7)]);
        let out = baseline_correction(&tidy, WindowMs::new(0.0, 0.1)).unwrap();
        // window covers the first sample only
        for s in &out.sweeps {
            assert!(s.voltage[0].abs() < 1e-12);
            assert!((s.voltage[10] - 0.1).abs() < 1e-12);
        }
        assert_eq!(tidy.sweeps[0].voltage[0], 1.5);
    }

    #[test]
    fn test_window_outside_sweep_fails() {
        let tidy = TidyTable::new(vec![sweep(3, 0.0)]);
        let err = baseline_correction(&tidy, WindowMs::new(50.0, 60.0)).unwrap_err();
        match err {
            EpspError::Range { sweep, .. } => assert_eq!(sweep, Some(3)),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
