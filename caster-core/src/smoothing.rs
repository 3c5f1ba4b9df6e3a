//! Moving-average smoothing for time-series snapshot fields

use std::collections::BTreeMap;

/// Default number of samples averaged per output point
pub const DEFAULT_WINDOW: usize = 3;

/// Trailing moving average; output has the same length as the input
///
/// The first `window - 1` points average over however many samples exist so
/// far, so a short series is never dropped.
pub fn moving_average(values: &[f32], window: usize) -> Vec<f32> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0_f32;

    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            if let Some(&dropped) = values.get(i - window) {
                sum -= dropped;
            }
        }
        let n = (i + 1).min(window);
        out.push(sum / n as f32);
    }

    out
}

/// Smooth every series of a snapshot
pub fn smooth_series(
    series: &BTreeMap<String, Vec<f32>>,
    window: usize,
) -> BTreeMap<String, Vec<f32>> {
    series
        .iter()
        .map(|(name, values)| (name.clone(), moving_average(values, window)))
        .collect()
}
