use super::{reference_level, FeatureContext, FeatureResult, TraceView, FIBER_VOLLEY};
use crate::error::{EpspError, Result};
use crate::math::{argmin, gradient, linear_fit};
use crate::types::WindowMs;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EpspParams {
    pub window_ms: WindowMs,
    /// Samples on each side of the steepest point used for the slope fit
    pub fit_distance: usize,
    #[serde(default)]
    pub baseline_ms: Option<WindowMs>,
}

/// Trough and initial slope of the field EPSP.
///
/// The slope is an OLS line through `fit_distance` samples either side of the steepest
/// descent in the window. Both the trough and the fit stay inside the window.
pub fn detect(
    params: &EpspParams,
    trace: &TraceView<'_>,
    ctx: &FeatureContext,
) -> Result<FeatureResult> {
    let window = params.window_ms;
    let range = window.index_range(trace.time, 0.0);
    if range.is_empty() {
        return Err(EpspError::range("EPSP", window.as_tuple()));
    }
    let reference = reference_level(trace, params.baseline_ms)?;

    let time_ms: Vec<f64> = trace.time.iter().map(|t| t * 1000.0).collect();
    let dy = gradient(trace.voltage, &time_ms);

    let y_w = &trace.voltage[range.clone()];
    let trough = range.start
        + argmin(y_w).ok_or_else(|| EpspError::range("EPSP", window.as_tuple()))?;
    let mid_rel = argmin(&dy[range.clone()])
        .ok_or_else(|| EpspError::range("EPSP slope", window.as_tuple()))?;

    let fd = params.fit_distance;
    if mid_rel < fd || mid_rel + fd >= range.len() {
        return Err(EpspError::Range {
            message: format!(
                "EPSP slope fit of ±{} samples around {:.3} ms does not fit in window [{}, {}] ms",
                fd,
                time_ms[range.start + mid_rel],
                window.start,
                window.end
            ),
            sweep: None,
        });
    }
    let mid = range.start + mid_rel;
    let fit_range = mid - fd..mid + fd + 1;
    let fit = linear_fit(&time_ms[fit_range.clone()], &trace.voltage[fit_range]);
    let slope = fit.slope.abs();

    let mut result = FeatureResult::new(super::EPSP.name, trace.stim_intensity)
        .with("epsp_slope", slope)
        .with("epsp_r2", fit.r2)
        .with("epsp_s", trace.time[trough])
        .with("epsp_v", trace.voltage[trough])
        .with("epsp_mid_s", trace.time[mid])
        .with("epsp_mid_v", trace.voltage[mid])
        .with("epsp_amp", (trace.voltage[trough] - reference).abs());

    let fv_amp = ctx
        .get(FIBER_VOLLEY.name)
        .and_then(|fv| fv.get("fv_amp"));
    let ratio = match fv_amp {
        Some(amp) if amp.is_finite() && amp != 0.0 => slope / amp,
        Some(amp) => {
            result.warn(format!(
                "fiber volley amplitude is {}, epsp_to_fv is undefined",
                amp
            ));
            f64::NAN
        }
        None => {
            result.warn("no fiber_volley result for this stimulus, epsp_to_fv is undefined");
            f64::NAN
        }
    };
    Ok(result.with("epsp_to_fv", ratio))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_trace() -> (Vec<f64>, Vec<f64>) {
        let time: Vec<f64> = (0..120).map(|i| i as f64 / 10_000.0).collect();
        let voltage = time
            .iter()
            .map(|t| {
                let z = (t * 1000.0 - 5.0) / 1.0;
                -2.0 * (-0.5 * z * z).exp()
            })
            .collect();
        (time, voltage)
    }

    fn params(window: (f64, f64), fit_distance: usize) -> EpspParams {
        EpspParams {
            window_ms: window.into(),
            fit_distance,
            baseline_ms: None,
        }
    }

    #[test]
    fn test_epsp_trough_and_slope() {
        let (time, voltage) = gaussian_trace();
        let trace = TraceView::new(50.0, &time, &voltage);
        let r = detect(&params((2.0, 9.0), 3), &trace, &FeatureContext::default()).unwrap();

        assert_eq!(r.get("epsp_s"), Some(0.005));
        assert!((r.get("epsp_v").unwrap() + 2.0).abs() < 1e-12);
        assert!((r.get("epsp_amp").unwrap() - 2.0).abs() < 1e-12);
        assert!((r.get("epsp_mid_s").unwrap() - 0.004).abs() < 0.00011);
        assert!((r.get("epsp_slope").unwrap() - 1.213).abs() < 0.05);
        assert!(r.get("epsp_r2").unwrap() > 0.99);
    }

    #[test]
    fn test_epsp_to_fv_without_fiber_volley() {
        let (time, voltage) = gaussian_trace();
        let trace = TraceView::new(50.0, &time, &voltage);
        let r = detect(&params((2.0, 9.0), 3), &trace, &FeatureContext::default()).unwrap();
        assert!(r.get("epsp_to_fv").unwrap().is_nan());
        assert_eq!(r.warnings.len(), 1);
        assert!(r.warnings[0].contains("fiber_volley"));
    }

    #[test]
    fn test_epsp_to_fv_uses_context() {
        let (time, voltage) = gaussian_trace();
        let trace = TraceView::new(50.0, &time, &voltage);
        let mut ctx = FeatureContext::default();
        ctx.insert(FeatureResult::new(FIBER_VOLLEY.name, 50.0).with("fv_amp", 0.5));
        let r = detect(&params((2.0, 9.0), 3), &trace, &ctx).unwrap();
        let expected = r.get("epsp_slope").unwrap() / 0.5;
        assert!((r.get("epsp_to_fv").unwrap() - expected).abs() < 1e-12);
        assert!(r.warnings.is_empty());

        let mut zero = FeatureContext::default();
        zero.insert(FeatureResult::new(FIBER_VOLLEY.name, 50.0).with("fv_amp", 0.0));
        let r = detect(&params((2.0, 9.0), 3), &trace, &zero).unwrap();
        assert!(r.get("epsp_to_fv").unwrap().is_nan());
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn test_fit_at_window_start_is_range_error() {
        let (time, voltage) = gaussian_trace();
        let trace = TraceView::new(50.0, &time, &voltage);
        // descent is steepest at the first sample of this window
        let err = detect(&params((4.2, 9.0), 4), &trace, &FeatureContext::default()).unwrap_err();
        assert!(matches!(err, EpspError::Range { .. }));
    }
}
