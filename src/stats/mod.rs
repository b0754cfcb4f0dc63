//! Robust sample statistics for isophote aggregation
//!
//! Contour flux samples are contaminated by foreground sources and masking
//! gaps, so location estimates offer mean/median/mode variants while the
//! scatter estimate is always the 16-84 percentile half-width: a robust
//! 1-sigma equivalent that stays comparable across location methods.

/// Location estimator applied to the flux samples of one contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AverageMethod {
    /// Fast, accurate in low S/N, not robust to outliers.
    Mean,
    /// Robust to a few outliers; the default.
    #[default]
    Median,
    /// Density-peak estimate; most robust, most expensive.
    Mode,
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).expect("non-finite sample in statistics"));
    v
}

/// Linear-interpolated quantile, `q` in [0, 1]. NaN on empty input.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let v = sorted_copy(values);
    let pos = q.clamp(0.0, 1.0) * (v.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        v[lo]
    } else {
        let t = pos - lo as f64;
        v[lo] + t * (v[hi] - v[lo])
    }
}

/// Sample median.
pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Arithmetic mean. NaN on empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// 25-75 interquartile range.
pub fn iqr(values: &[f64]) -> f64 {
    quantile(values, 0.75) - quantile(values, 0.25)
}

/// Robust scatter: half-width of the 16-84 percentile interval.
pub fn scatter(values: &[f64]) -> f64 {
    (quantile(values, 0.84) - quantile(values, 0.16)) / 2.0
}

/// Density-peak (mode) estimate via a Gaussian kernel density maximum.
///
/// Bandwidth comes from the 30-70 interquantile half-width; when that
/// collapses to zero the samples are effectively constant and the median is
/// returned directly.
pub fn mode(values: &[f64]) -> f64 {
    let med = median(values);
    let bw = (quantile(values, 0.70) - quantile(values, 0.30)) / 2.0;
    if !(bw > 0.0) || !med.is_finite() {
        return med;
    }
    let sig = scatter(values).max(bw);
    let lo = med - 3.0 * sig;
    let hi = med + 3.0 * sig;
    // Grid step must stay below the kernel bandwidth or a narrow density
    // peak can fall between grid points.
    let grid = (((hi - lo) / (0.25 * bw)).ceil() as usize).clamp(201, 20_001);

    let mut best_x = med;
    let mut best_density = f64::NEG_INFINITY;
    for k in 0..grid {
        let x = lo + (hi - lo) * k as f64 / (grid - 1) as f64;
        let density: f64 = values
            .iter()
            .map(|&v| (-0.5 * ((v - x) / bw).powi(2)).exp())
            .sum();
        if density > best_density {
            best_density = density;
            best_x = x;
        }
    }
    best_x
}

/// Apply the configured location estimator.
pub fn average(values: &[f64], method: AverageMethod) -> f64 {
    match method {
        AverageMethod::Mean => mean(values),
        AverageMethod::Median => median(values),
        AverageMethod::Mode => mode(values),
    }
}

/// Iterative upper-only sigma clip over paired (value, angle) samples.
///
/// Each pass removes samples above `median + nsigma * scatter`, then
/// recomputes both statistics, stopping at convergence (a pass that removes
/// nothing) or after `max_iter` passes. The clip is deliberately one-sided:
/// it targets contamination by bright foreground sources, not symmetric
/// outliers. Converged output is a fixed point, so re-clipping clipped data
/// changes nothing.
///
/// Returns true when any sample was removed.
pub fn sigma_clip(
    values: &mut Vec<f64>,
    angles: &mut Vec<f64>,
    nsigma: f64,
    max_iter: usize,
) -> bool {
    debug_assert_eq!(values.len(), angles.len());
    let mut removed_any = false;
    for _ in 0..max_iter {
        if values.len() < 3 {
            break;
        }
        let limit = median(values) + nsigma * scatter(values);
        let keep: Vec<bool> = values.iter().map(|&v| v <= limit).collect();
        if keep.iter().all(|&k| k) {
            break;
        }
        removed_any = true;
        *values = values
            .iter()
            .zip(&keep)
            .filter_map(|(&v, &k)| k.then_some(v))
            .collect();
        *angles = angles
            .iter()
            .zip(&keep)
            .filter_map(|(&a, &k)| k.then_some(a))
            .collect();
    }
    removed_any
}
