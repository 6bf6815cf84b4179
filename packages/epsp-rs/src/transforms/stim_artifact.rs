//! Stimulus artifact removal: excision or scaled template subtraction.

use crate::error::{EpspError, Result};
use crate::types::{Sweep, TidyTable, WindowMs};

/// Drop the samples inside `window` (relative to stimulus onset at t = 0).
///
/// With `rezero`, each sweep's time axis is shifted so its first remaining sample sits at 0.
pub fn crop_stim_artifact(tidy: &TidyTable, window: WindowMs, rezero: bool) -> Result<TidyTable> {
    let sweeps = tidy
        .sweeps
        .iter()
        .map(|sweep| {
            let range = window.index_range(&sweep.time, 0.0);
            if range.is_empty() {
                return Err(EpspError::range("stimulus artifact", window.as_tuple())
                    .for_sweep(sweep.sweep_index));
            }
            let keep = |v: &[f64]| -> Vec<f64> {
                v[..range.start]
                    .iter()
                    .chain(&v[range.end..])
                    .copied()
                    .collect()
            };
            let mut time = keep(&sweep.time);
            if rezero {
                if let Some(&t0) = time.first() {
                    time.iter_mut().for_each(|t| *t -= t0);
                }
            }
            Ok(Sweep {
                time,
                voltage: keep(&sweep.voltage),
                sem: sweep.sem.as_deref().map(keep),
                ..sweep.clone()
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TidyTable::new(sweeps))
}

/// Per stimulus group, fit the group's mean artifact to each sweep inside `window`
/// and subtract the scaled template there. Samples outside the window are untouched.
pub fn template_subtract_stim_artifact(tidy: &TidyTable, window: WindowMs) -> Result<TidyTable> {
    let mut corrected: Vec<Sweep> = tidy.sweeps.clone();

    for (stim, members) in tidy.groups() {
        let reference = members[0];
        for sweep in &members[1..] {
            if !sweep.same_time_axis(reference) {
                return Err(EpspError::Mismatch {
                    sweep: sweep.sweep_index,
                    detail: format!(
                        "time grid differs from sweep {} in stimulus group {}",
                        reference.sweep_index, stim
                    ),
                });
            }
        }

        let range = window.index_range(&reference.time, 0.0);
        if range.is_empty() {
            return Err(EpspError::range("stimulus artifact", window.as_tuple())
                .for_sweep(reference.sweep_index));
        }

        let n = members.len() as f64;
        let template: Vec<f64> = range
            .clone()
            .map(|i| members.iter().map(|s| s.voltage[i]).sum::<f64>() / n)
            .collect();
        let denom: f64 = template.iter().map(|t| t * t).sum();
        if denom <= 1e-20 {
            log::debug!("Stimulus {}: flat artifact template, group left unchanged", stim);
            continue;
        }

        for target in corrected.iter_mut().filter(|s| s.stim_intensity == stim) {
            let window_values = &target.voltage[range.clone()];
            let num: f64 = window_values.iter().zip(&template).map(|(y, t)| y * t).sum();
            let scale = num / denom;
            for (v, t) in target.voltage[range.clone()].iter_mut().zip(&template) {
                *v -= scale * t;
            }
        }
    }

    Ok(TidyTable::new(corrected))
}
