//! Fourier decomposition of azimuthal flux distributions
//!
//! Low-order Fourier amplitudes along an isophote diagnose boxy/disky
//! deviations from a pure ellipse, and azimuthal power is the star finder's
//! symmetry test. Samples on the unperturbed uniform angular grid transform
//! directly; masked, clipped, or band-extracted samples are first resampled
//! onto a uniform grid with periodic linear interpolation so the transform
//! stays well-defined.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::TAU;

use crate::isophote::ContourSamples;

/// Per-mode Fourier amplitudes of one contour.
///
/// Index 0 of both arrays holds the raw mean flux `|c0| / N`. For modes
/// m >= 1, `a[m]` and `b[m]` are the imaginary and real parts of the m-th
/// coefficient normalized by `|c0| + sqrt(N) * noise`; the noise term
/// deflates spurious high-order power on faint contours.
#[derive(Debug, Clone)]
pub struct FourierModes {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl FourierModes {
    /// Number of reported modes (excluding the mean-flux entry).
    pub fn n_modes(&self) -> usize {
        self.a.len().saturating_sub(1)
    }
}

/// Forward unnormalized DFT of a real sequence.
fn forward_fft(values: &[f64]) -> Vec<Complex<f64>> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(values.len());
    let mut buf: Vec<Complex<f64>> = values.iter().map(|&v| Complex::new(v, 0.0)).collect();
    fft.process(&mut buf);
    buf
}

/// Resample irregular (angle, value) pairs onto `n` uniform angles with
/// periodic linear interpolation.
fn resample_periodic(angles: &[f64], values: &[f64], n: usize) -> Vec<f64> {
    debug_assert_eq!(angles.len(), values.len());
    if angles.is_empty() {
        return vec![0.0; n];
    }
    let mut pairs: Vec<(f64, f64)> = angles.iter().copied().zip(values.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("non-finite sample angle"));
    let m = pairs.len();

    (0..n)
        .map(|k| {
            let g = TAU * k as f64 / n as f64;
            let idx = pairs.partition_point(|p| p.0 < g);
            let (x0, y0, x1, y1) = if idx == 0 {
                let (xl, yl) = pairs[m - 1];
                let (xf, yf) = pairs[0];
                (xl - TAU, yl, xf, yf)
            } else if idx == m {
                let (xl, yl) = pairs[m - 1];
                let (xf, yf) = pairs[0];
                (xl, yl, xf + TAU, yf)
            } else {
                let (xa, ya) = pairs[idx - 1];
                let (xb, yb) = pairs[idx];
                (xa, ya, xb, yb)
            };
            if x1 > x0 {
                let t = (g - x0) / (x1 - x0);
                y0 + t * (y1 - y0)
            } else {
                y0
            }
        })
        .collect()
}

/// Decompose a contour's azimuthal flux distribution into `n_modes`
/// Fourier modes (at least one), normalizing against the background noise.
pub fn decompose(samples: &ContourSamples, n_modes: usize, background_noise: f64) -> FourierModes {
    let coefs = if samples.uniform {
        forward_fft(&samples.values)
    } else {
        let n = (samples.len() as f64).sqrt().max(100.0) as usize;
        forward_fft(&resample_periodic(&samples.angles, &samples.values, n))
    };

    let nlen = coefs.len() as f64;
    let mmax = n_modes.max(1);
    if coefs.is_empty() {
        return FourierModes {
            a: vec![0.0; mmax + 1],
            b: vec![0.0; mmax + 1],
        };
    }

    let c0 = coefs[0].norm();
    let denom = c0 + nlen.sqrt() * background_noise;
    let mut a = Vec::with_capacity(mmax + 1);
    let mut b = Vec::with_capacity(mmax + 1);
    a.push(c0 / nlen);
    b.push(c0 / nlen);
    for m in 1..=mmax {
        let c = coefs.get(m).copied().unwrap_or_else(|| Complex::new(0.0, 0.0));
        if denom > 0.0 {
            a.push(c.im / denom);
            b.push(c.re / denom);
        } else {
            a.push(0.0);
            b.push(0.0);
        }
    }
    FourierModes { a, b }
}

/// Azimuthal symmetry statistic: `(sum |c1..c4|, |c0|)` of the raw sample
/// DFT. A source is azimuthally symmetric when the low-mode power stays
/// below the square root of the zeroth coefficient.
pub fn low_mode_power(values: &[f64]) -> (f64, f64) {
    let coefs = forward_fft(values);
    if coefs.is_empty() {
        return (0.0, 0.0);
    }
    let low: f64 = coefs.iter().skip(1).take(4).map(|c| c.norm()).sum();
    (low, coefs[0].norm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn uniform_samples(values: Vec<f64>) -> ContourSamples {
        let n = values.len();
        let angles = (0..n).map(|k| TAU * k as f64 / n as f64).collect();
        ContourSamples {
            values,
            angles,
            uniform: true,
        }
    }

    #[test]
    fn test_constant_contour_has_no_higher_modes() {
        let s = uniform_samples(vec![5.0; 32]);
        let modes = decompose(&s, 4, 0.0);
        assert_relative_eq!(modes.a[0], 5.0, epsilon = 1e-9);
        assert_relative_eq!(modes.b[0], 5.0, epsilon = 1e-9);
        for m in 1..=4 {
            assert!(modes.a[m].abs() < 1e-9);
            assert!(modes.b[m].abs() < 1e-9);
        }
    }

    #[test]
    fn test_pure_cosine_lands_in_real_part() {
        let n = 64;
        let values: Vec<f64> = (0..n)
            .map(|k| 10.0 + 2.0 * (2.0 * TAU * k as f64 / n as f64).cos())
            .collect();
        let s = uniform_samples(values);
        let modes = decompose(&s, 4, 0.0);
        // c2 = sum cos(2 theta) * 2 cos(2 theta) = n, so b2 = n / |c0| = 1/10
        assert_relative_eq!(modes.a[0], 10.0, epsilon = 1e-9);
        assert_relative_eq!(modes.b[2], 0.1, epsilon = 1e-6);
        assert!(modes.a[2].abs() < 1e-9);
        assert!(modes.b[1].abs() < 1e-9);
    }

    #[test]
    fn test_noise_deflates_amplitudes() {
        let n = 64;
        let values: Vec<f64> = (0..n)
            .map(|k| 10.0 + 2.0 * (2.0 * TAU * k as f64 / n as f64).cos())
            .collect();
        let s = uniform_samples(values);
        let quiet = decompose(&s, 2, 0.0);
        let noisy = decompose(&s, 2, 50.0);
        assert!(noisy.b[2].abs() < quiet.b[2].abs());
        // Mode zero stays the raw mean flux
        assert_relative_eq!(noisy.a[0], quiet.a[0], epsilon = 1e-12);
    }

    #[test]
    fn test_resampled_path_matches_uniform_for_smooth_signal() {
        let n = 48;
        let values: Vec<f64> = (0..n)
            .map(|k| 10.0 + (TAU * k as f64 / n as f64).cos())
            .collect();
        let uniform = uniform_samples(values.clone());
        let mut irregular = uniform_samples(values);
        irregular.uniform = false;

        let mu = decompose(&uniform, 2, 0.0);
        let mi = decompose(&irregular, 2, 0.0);
        assert_relative_eq!(mu.a[0], mi.a[0], epsilon = 0.01);
        assert_relative_eq!(mu.b[1], mi.b[1], epsilon = 0.01);
    }

    #[test]
    fn test_low_mode_power_symmetric_vs_lopsided() {
        let n = 32;
        let flat = vec![9.0; n];
        let (low, c0) = low_mode_power(&flat);
        assert!(low < c0.sqrt());

        let lopsided: Vec<f64> = (0..n)
            .map(|k| if k < n / 2 { 100.0 } else { 0.0 })
            .collect();
        let (low, c0) = low_mode_power(&lopsided);
        assert!(low > c0.sqrt());
    }

    #[test]
    fn test_mode_count_floor() {
        let s = uniform_samples(vec![1.0; 16]);
        let modes = decompose(&s, 0, 0.0);
        assert_eq!(modes.n_modes(), 1);
        let modes = decompose(&s, 4, 0.0);
        assert_eq!(modes.n_modes(), 4);
    }
}
