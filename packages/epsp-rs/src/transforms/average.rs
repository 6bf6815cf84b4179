use crate::error::{EpspError, Result};
use crate::types::{Sweep, TidyTable};

/// Collapse each stimulus group to its per-sample mean with SEM.
///
/// Groups holding a single sweep pass through unchanged, so averaging an averaged
/// table is a no-op.
pub fn average_sweeps(tidy: &TidyTable) -> Result<TidyTable> {
    let mut averaged = Vec::new();

    for (stim, members) in tidy.groups() {
        let first = members[0];
        if members.len() == 1 {
            averaged.push(first.clone());
            continue;
        }

        for sweep in &members[1..] {
            if !sweep.same_time_axis(first) {
                return Err(EpspError::Mismatch {
                    sweep: sweep.sweep_index,
                    detail: format!(
                        "cannot average with sweep {} in stimulus group {}: time grids differ",
                        first.sweep_index, stim
                    ),
                });
            }
        }

        let n = members.len();
        let mut mean = Vec::with_capacity(first.len());
        let mut sem = Vec::with_capacity(first.len());
        for i in 0..first.len() {
            let values = members.iter().map(|s| s.voltage[i]);
            let m = values.clone().sum::<f64>() / n as f64;
            let var = values.map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
            mean.push(m);
            sem.push(var.sqrt() / (n as f64).sqrt());
        }

        log::debug!("Stimulus {}: averaged {} sweeps", stim, n);
        averaged.push(Sweep {
            stim_intensity: stim,
            sweep_index: first.sweep_index,
            repetition: 1,
            time: first.time.clone(),
            voltage: mean,
            sem: Some(sem),
            n_sweeps: members.iter().map(|s| s.n_sweeps).sum(),
        });
    }

    Ok(TidyTable::new(averaged))
}
