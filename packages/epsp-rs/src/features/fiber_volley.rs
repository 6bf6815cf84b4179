use super::{reference_level, FeatureContext, FeatureResult, TraceView};
use crate::error::{EpspError, Result};
use crate::math::argmin;
use crate::types::WindowMs;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FiberVolleyParams {
    pub window_ms: WindowMs,
    #[serde(default)]
    pub baseline_ms: Option<WindowMs>,
}

/// Most negative sample inside the window, measured against the reference level.
pub fn detect(
    params: &FiberVolleyParams,
    trace: &TraceView<'_>,
    _ctx: &FeatureContext,
) -> Result<FeatureResult> {
    let range = params.window_ms.index_range(trace.time, 0.0);
    if range.is_empty() {
        return Err(EpspError::range("fiber volley", params.window_ms.as_tuple()));
    }
    let reference = reference_level(trace, params.baseline_ms)?;

    let offset = range.start;
    let idx = offset
        + argmin(&trace.voltage[range])
            .ok_or_else(|| EpspError::range("fiber volley", params.window_ms.as_tuple()))?;

    let fv_v = trace.voltage[idx];
    Ok(FeatureResult::new(super::FIBER_VOLLEY.name, trace.stim_intensity)
        .with("fv_amp", (fv_v - reference).abs())
        .with("fv_s", trace.time[idx])
        .with("fv_v", fv_v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_data() -> (Vec<f64>, Vec<f64>) {
        let time: Vec<f64> = (0..40).map(|i| i as f64 / 10_000.0).collect();
        let mut voltage = vec![0.0; 40];
        voltage[9] = -0.8;
        voltage[25] = -3.0;
        (time, voltage)
    }

    fn params(window: (f64, f64), baseline: Option<(f64, f64)>) -> FiberVolleyParams {
        FiberVolleyParams {
            window_ms: window.into(),
            baseline_ms: baseline.map(WindowMs::from),
        }
    }

    #[test]
    fn test_fiber_volley_trough() {
        let (time, voltage) = trace_data();
        let trace = TraceView::new(50.0, &time, &voltage);
        let result = detect(&params((0.0, 1.5), None), &trace, &FeatureContext::default()).unwrap();
        assert_eq!(result.get("fv_amp"), Some(0.8));
        assert_eq!(result.get("fv_s"), Some(0.0009));
        assert_eq!(result.get("fv_v"), Some(-0.8));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_fiber_volley_relative_to_baseline() {
        let (time, mut voltage) = trace_data();
        voltage[..5].iter_mut().for_each(|v| *v = 0.2);
        let trace = TraceView::new(50.0, &time, &voltage);
        let result = detect(
            &params((0.5, 1.5), Some((0.0, 0.5))),
            &trace,
            &FeatureContext::default(),
        )
        .unwrap();
        assert!((result.get("fv_amp").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fiber_volley_tie_takes_earliest() {
        let (time, mut voltage) = trace_data();
        voltage[12] = -0.8;
        let trace = TraceView::new(50.0, &time, &voltage);
        let result = detect(&params((0.0, 1.5), None), &trace, &FeatureContext::default()).unwrap();
        assert_eq!(result.get("fv_s"), Some(0.0009));
    }

    #[test]
    fn test_fiber_volley_empty_window() {
        let (time, voltage) = trace_data();
        let trace = TraceView::new(50.0, &time, &voltage);
        let err =
            detect(&params((10.0, 12.0), None), &trace, &FeatureContext::default()).unwrap_err();
        assert!(matches!(err, EpspError::Range { .. }));
    }
}
