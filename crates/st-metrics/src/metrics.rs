//! Scalar metrics over discovery times and discovery curves.

use std::collections::BTreeMap;

use crate::curve::{CurvePoint, DiscoveryCurve};

/// Number of x-buckets the curve is resampled to before integration.
pub const INTEGRATION_BUCKETS: usize = 100;

/// Highest recall target used when extrapolating work saved at sampling.
pub const WSS_MAX_TARGET: f64 = 0.99999;

/// Generalized power mean of normalized discovery times.
///
/// Each time is divided by `n_items` and raised to `moment`; the sum's
/// `moment`-th root is divided by the number of items. `None` when there is
/// nothing to average.
pub fn time_to_discovery_spread(
    times: &BTreeMap<usize, f64>,
    n_items: usize,
    moment: f64,
) -> Option<f64> {
    if times.is_empty() || n_items == 0 || moment <= 0.0 {
        return None;
    }
    let sum: f64 = times
        .values()
        .map(|t| (t / n_items as f64).powf(moment))
        .sum();
    let spread = sum.powf(1.0 / moment) / times.len() as f64;
    spread.is_finite().then_some(spread)
}

/// Negative area under the discovery curve, including the unreviewed tail.
///
/// The curve (anchored at the origin) is resampled as a step function onto
/// [`INTEGRATION_BUCKETS`] equal buckets over `[0, x_end]` and integrated with
/// the trapezoidal rule. The tail from the last point to full review is closed
/// by subtracting `(1 - x_end) * (1 - (1 - y_end) / 2)`. An empty curve
/// scores `0.0`.
pub fn integrated_loss(curve: &DiscoveryCurve) -> f64 {
    let Some(CurvePoint {
        reviewed: x_end,
        recall: y_end,
    }) = curve.last()
    else {
        return 0.0;
    };

    let dx = x_end / INTEGRATION_BUCKETS as f64;
    let mut area = 0.0;
    let mut prev = curve.recall_at(0.0);
    for bucket in 1..=INTEGRATION_BUCKETS {
        let y = curve.recall_at(dx * bucket as f64);
        area += dx * (prev + y) / 2.0;
        prev = y;
    }

    let tail_dx = 1.0 - x_end;
    let tail_dy = 1.0 - y_end;
    -area - tail_dx * (1.0 - tail_dy / 2.0)
}

/// Reviewed fraction needed to reach `target_recall`.
///
/// Uses the first measured point that reaches the target. Otherwise the line
/// from the last point to `(1, 1)` is solved for the target, clamped to
/// [`WSS_MAX_TARGET`]. A curve that already covers the whole pool without
/// reaching the target reports `1.0`.
pub fn work_saved_at_sampling(curve: &DiscoveryCurve, target_recall: f64) -> f64 {
    if let Some(hit) = curve.points().iter().find(|p| p.recall >= target_recall) {
        return hit.reviewed;
    }

    let (last_x, last_y) = curve
        .last()
        .map(|p| (p.reviewed, p.recall))
        .unwrap_or((0.0, 0.0));
    if last_x >= 1.0 || last_y >= 1.0 {
        return 1.0;
    }

    let target = target_recall.min(WSS_MAX_TARGET);
    let b = (1.0 - last_y) / (1.0 - last_x);
    let a = 1.0 - b;
    ((target - a) / b).clamp(0.0, 1.0)
}

/// [`work_saved_at_sampling`] averaged over several recall targets.
pub fn mean_wss(curve: &DiscoveryCurve, targets: &[f64]) -> Option<f64> {
    if targets.is_empty() {
        return None;
    }
    let sum: f64 = targets
        .iter()
        .map(|&t| work_saved_at_sampling(curve, t))
        .sum();
    Some(sum / targets.len() as f64)
}
