use super::{FeatureContext, FeatureResult, TraceView, EPSP};
use crate::error::{EpspError, Result};
use crate::math::{argmax, argmin, compute_prominences, find_peaks, gradient};
use crate::types::search_sorted;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PopSpikeParams {
    /// Search length after the EPSP trough
    pub lag_ms: f64,
    /// mV
    pub prominence: f64,
    /// mV/ms, slope magnitude treated as flat by the fallback search
    pub threshold: f64,
}

/// Positive-going population spike following the EPSP trough.
pub fn detect(
    params: &PopSpikeParams,
    trace: &TraceView<'_>,
    ctx: &FeatureContext,
) -> Result<FeatureResult> {
    let dependency = || EpspError::Dependency {
        feature: super::POP_SPIKE.name.to_string(),
        requires: EPSP.name.to_string(),
        stim_intensity: trace.stim_intensity,
    };
    let epsp = ctx.get(EPSP.name).ok_or_else(dependency)?;
    let (epsp_s, epsp_v) = match (epsp.get("epsp_s"), epsp.get("epsp_v")) {
        (Some(s), Some(v)) if s.is_finite() => (s, v),
        _ => return Err(dependency()),
    };

    let start = search_sorted(trace.time, epsp_s);
    let stop = search_sorted(trace.time, epsp_s + params.lag_ms / 1000.0).max(start);

    let time_ms: Vec<f64> = trace.time.iter().map(|t| t * 1000.0).collect();
    let dy = gradient(trace.voltage, &time_ms);
    let y_w = &trace.voltage[start..stop];
    let dy_w = &dy[start..stop];

    let mut result = FeatureResult::new(super::POP_SPIKE.name, trace.stim_intensity);
    let (found, fallback) = match highest_prominent_peak(y_w, params.prominence) {
        Some(rel) => (Some(rel), false),
        None => (slope_hump(y_w, dy_w, params), true),
    };

    match found {
        Some(rel) => {
            let idx = start + rel;
            let ps_v = trace.voltage[idx];
            let ps_amp = if ps_v.is_finite() && epsp_v.is_finite() {
                (epsp_v - ps_v).abs()
            } else {
                f64::NAN
            };
            if fallback {
                log::debug!(
                    "Stimulus {}: population spike located from slope profile",
                    trace.stim_intensity
                );
            }
            result = result
                .with("ps_amp", ps_amp)
                .with("ps_s", trace.time[idx])
                .with("ps_v", ps_v)
                .with("ps_fallback", if fallback { 1.0 } else { 0.0 });
        }
        None => {
            result.warn(format!(
                "no population spike within {} ms of the EPSP trough",
                params.lag_ms
            ));
            for name in ["ps_amp", "ps_s", "ps_v", "ps_fallback"] {
                result = result.with(name, f64::NAN);
            }
        }
    }
    Ok(result)
}

/// Highest local maximum whose prominence reaches `min_prominence`.
fn highest_prominent_peak(y: &[f64], min_prominence: f64) -> Option<usize> {
    let peaks = find_peaks(y);
    let prominences = compute_prominences(&peaks, y);
    let qualifying: Vec<usize> = peaks
        .into_iter()
        .zip(prominences)
        .filter(|&(_, p)| p >= min_prominence)
        .map(|(i, _)| i)
        .collect();
    let heights: Vec<f64> = qualifying.iter().map(|&i| y[i]).collect();
    argmax(&heights).map(|k| qualifying[k])
}

/// Hump between the steepest rising slope and the flattest slope after it.
fn slope_hump(y: &[f64], dy: &[f64], params: &PopSpikeParams) -> Option<usize> {
    let slope_peaks = find_peaks(dy);
    let slopes: Vec<f64> = slope_peaks.iter().map(|&i| dy[i]).collect();
    let hump_start = slope_peaks[argmax(&slopes)?];

    let flat: Vec<usize> = (hump_start + 1..dy.len())
        .filter(|&i| dy[i].abs() < params.threshold)
        .collect();
    let flatness: Vec<f64> = flat.iter().map(|&i| dy[i].abs()).collect();
    let hump_end = flat[argmin(&flatness)?];

    let top = hump_start + argmax(&y[hump_start..=hump_end])?;
    (y[top] - y[hump_start] >= params.prominence).then_some(top)
}
