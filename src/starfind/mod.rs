//! Point-source detection for masking and PSF estimation
//!
//! Finds stars by convolving the image with a fixed high-pass kernel,
//! thresholding against the convolved image's own interquartile range, then
//! validating each candidate: refine the center (discrete argmax, then a
//! continuous sub-pixel polish of the interpolated surface), reject
//! near-edge, crowded, saturated, and background-level candidates, and
//! demand azimuthal symmetry both at the core and while growing the
//! sampling radius outward. Accepted stars carry a half-flux FWHM estimate
//! and the central peak flux.

use log::info;
use nalgebra::{Point2, Vector2};
use ndarray::Array2;

use crate::fourier;
use crate::geometry::Ellipse;
use crate::interp;
use crate::isophote::{self, SampleOptions};
use crate::stats;

/// Tunable thresholds for the detection and validation stages. The
/// defaults are calibration values inherited from long use on wide-field
/// survey images, not derived quantities.
#[derive(Debug, Clone)]
pub struct StarFindConfig {
    /// Candidate threshold in multiples of the convolved image's IQR.
    pub detect_threshold: f64,
    /// Minimum separation between accepted stars, in units of the FWHM
    /// guess.
    pub min_separation: f64,
    /// Exclusion margin around the image edge, in units of the FWHM guess.
    pub edge_margin: f64,
    /// Radial growth factor per step of the half-flux search.
    pub growth_factor: f64,
    /// Number of asymmetric growth steps tolerated before rejection; a
    /// single transient blip is allowed, two are not.
    pub max_bad_steps: usize,
    /// Central flux floor in multiples of the background noise; candidates
    /// indistinguishable from background are dropped.
    pub clean_floor: f64,
    /// Saturation ceiling: reject candidates with any nearby pixel at or
    /// above this flux.
    pub peakmax: Option<f64>,
    /// Stop scanning once this many stars are accepted.
    pub max_stars: Option<usize>,
}

impl Default for StarFindConfig {
    fn default() -> Self {
        Self {
            detect_threshold: 20.0,
            min_separation: 10.0,
            edge_margin: 5.0,
            growth_factor: 1.1,
            max_bad_steps: 1,
            clean_floor: 2.0,
            peakmax: None,
            max_stars: None,
        }
    }
}

/// One accepted detection. Built once, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct Star {
    pub x: f64,
    pub y: f64,
    pub fwhm: f64,
    pub peak: f64,
}

/// Parallel coordinate arrays for a star catalog.
pub fn catalog_arrays(stars: &[Star]) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
    (
        stars.iter().map(|s| s.x).collect(),
        stars.iter().map(|s| s.y).collect(),
        stars.iter().map(|s| s.fwhm).collect(),
        stars.iter().map(|s| s.peak).collect(),
    )
}

/// High-pass detection kernel: a 9x9 field of -1 with the central 3x3 set
/// to +8, so the response integrates to zero over flat backgrounds.
fn highpass_kernel() -> Array2<f64> {
    let mut kernel = Array2::from_elem((9, 9), -1.0);
    for y in 3..6 {
        for x in 3..6 {
            kernel[[y, x]] = 8.0;
        }
    }
    kernel
}

/// Direct 2D convolution with zero-padded boundaries.
fn convolve2d(data: &Array2<f64>, kernel: &Array2<f64>) -> Array2<f64> {
    let (data_h, data_w) = data.dim();
    let (kernel_h, kernel_w) = kernel.dim();
    let pad_h = (kernel_h / 2) as i64;
    let pad_w = (kernel_w / 2) as i64;
    let mut result = Array2::zeros((data_h, data_w));

    for y in 0..data_h {
        for x in 0..data_w {
            let mut sum = 0.0;
            for ky in 0..kernel_h {
                for kx in 0..kernel_w {
                    let sy = y as i64 + ky as i64 - pad_h;
                    let sx = x as i64 + kx as i64 - pad_w;
                    if sy >= 0 && sy < data_h as i64 && sx >= 0 && sx < data_w as i64 {
                        sum += data[[sy as usize, sx as usize]] * kernel[[ky, kx]];
                    }
                }
            }
            result[[y, x]] = sum;
        }
    }
    result
}

fn near_edge(p: Point2<f64>, nx: usize, ny: usize, margin: f64) -> bool {
    p.x < margin || p.y < margin || p.x > nx as f64 - 1.0 - margin || p.y > ny as f64 - 1.0 - margin
}

fn too_close(stars: &[Star], p: Point2<f64>, min_dist: f64) -> bool {
    stars
        .iter()
        .any(|s| (Vector2::new(s.x, s.y) - Vector2::new(p.x, p.y)).norm() < min_dist)
}

/// Brightest pixel within a +-window box around `p`, clamped to the image.
fn window_argmax(image: &Array2<f64>, p: Point2<f64>, window: f64) -> Point2<f64> {
    let (ny, nx) = image.dim();
    let x_lo = (p.x - window).floor().max(0.0) as usize;
    let x_hi = (((p.x + window).ceil() as i64) + 1).clamp(1, nx as i64) as usize;
    let y_lo = (p.y - window).floor().max(0.0) as usize;
    let y_hi = (((p.y + window).ceil() as i64) + 1).clamp(1, ny as i64) as usize;

    let mut best = (x_lo, y_lo);
    let mut best_val = f64::NEG_INFINITY;
    for y in y_lo..y_hi {
        for x in x_lo..x_hi {
            if image[[y, x]] > best_val {
                best_val = image[[y, x]];
                best = (x, y);
            }
        }
    }
    Point2::new(best.0 as f64, best.1 as f64)
}

/// Polish a discrete maximum to a continuous sub-pixel maximum of the
/// bicubic surface with a small Nelder-Mead simplex. Falls back to the
/// discrete position when the simplex wanders outside the search window.
fn refine_maximum(image: &Array2<f64>, start: Point2<f64>, window: f64) -> Point2<f64> {
    let objective = |p: &Vector2<f64>| -interp::bicubic(image, p.x, p.y);

    let mut simplex = [
        Vector2::new(start.x, start.y),
        Vector2::new(start.x + 0.3, start.y),
        Vector2::new(start.x, start.y + 0.3),
    ];
    let mut values = [
        objective(&simplex[0]),
        objective(&simplex[1]),
        objective(&simplex[2]),
    ];

    for _ in 0..100 {
        // Order the simplex best-to-worst
        let mut order = [0, 1, 2];
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());
        simplex = [simplex[order[0]], simplex[order[1]], simplex[order[2]]];
        values = [values[order[0]], values[order[1]], values[order[2]]];

        if (values[2] - values[0]).abs() < 1e-12
            && (simplex[2] - simplex[0]).norm() < 1e-6
        {
            break;
        }

        let centroid = (simplex[0] + simplex[1]) / 2.0;
        let reflected = centroid + (centroid - simplex[2]);
        let f_reflected = objective(&reflected);

        if f_reflected < values[0] {
            let expanded = centroid + 2.0 * (centroid - simplex[2]);
            let f_expanded = objective(&expanded);
            if f_expanded < f_reflected {
                simplex[2] = expanded;
                values[2] = f_expanded;
            } else {
                simplex[2] = reflected;
                values[2] = f_reflected;
            }
        } else if f_reflected < values[1] {
            simplex[2] = reflected;
            values[2] = f_reflected;
        } else {
            let contracted = centroid + 0.5 * (simplex[2] - centroid);
            let f_contracted = objective(&contracted);
            if f_contracted < values[2] {
                simplex[2] = contracted;
                values[2] = f_contracted;
            } else {
                // Shrink toward the best vertex
                simplex[1] = simplex[0] + 0.5 * (simplex[1] - simplex[0]);
                simplex[2] = simplex[0] + 0.5 * (simplex[2] - simplex[0]);
                values[1] = objective(&simplex[1]);
                values[2] = objective(&simplex[2]);
            }
        }
    }

    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());
    let best = simplex[order[0]];
    let refined = Point2::new(best.x, best.y);
    if (refined - start).norm() > window {
        start
    } else {
        refined
    }
}

/// Azimuthal symmetry test: low-order Fourier power along a circular
/// contour must stay below the square root of the total.
fn is_asymmetric(image: &Array2<f64>, center: Point2<f64>, radius: f64) -> bool {
    let contour = Ellipse::circular(radius);
    let samples = isophote::extract(image, &contour, center, &SampleOptions::default());
    let (low, c0) = fourier::low_mode_power(&samples.values);
    low > c0.abs().sqrt()
}

/// Linear interpolation of the radius where the growth curve crossed half
/// the central flux. `None` when the curve never crossed.
fn half_flux_radius(radii: &[f64], fluxes: &[f64]) -> Option<f64> {
    let half = fluxes[0] / 2.0;
    for k in 1..fluxes.len() {
        if fluxes[k] <= half && fluxes[k - 1] > half {
            let span = fluxes[k - 1] - fluxes[k];
            if span <= 0.0 {
                return Some(radii[k]);
            }
            let t = (fluxes[k - 1] - half) / span;
            return Some(radii[k - 1] + t * (radii[k] - radii[k - 1]));
        }
    }
    None
}

/// Detect point sources, returning their positions, FWHMs, and peak fluxes.
///
/// `fwhm_guess` may be off by a factor of two in either direction;
/// `background_noise` is the 1-sigma pixel noise of the background. Masked
/// pixels never seed a candidate. Candidates are processed in scan order
/// (row-major), and the first of any crowded group wins.
pub fn find_stars(
    image: &Array2<f64>,
    fwhm_guess: f64,
    background_noise: f64,
    mask: Option<&Array2<bool>>,
    config: &StarFindConfig,
) -> Vec<Star> {
    let (ny, nx) = image.dim();
    let conv = convolve2d(image, &highpass_kernel());
    let conv_values: Vec<f64> = conv.iter().copied().collect();
    let threshold = config.detect_threshold * stats::iqr(&conv_values);

    let margin = config.edge_margin * fwhm_guess;
    let min_dist = config.min_separation * fwhm_guess;
    let growth_limit = ((nx * nx + ny * ny) as f64).sqrt();
    let mut stars: Vec<Star> = Vec::new();

    'scan: for cy in 0..ny {
        for cx in 0..nx {
            if conv[[cy, cx]] <= threshold {
                continue;
            }
            if let Some(mask) = mask {
                if mask[[cy, cx]] {
                    continue;
                }
            }
            let candidate = Point2::new(cx as f64, cy as f64);
            if too_close(&stars, candidate, min_dist) {
                continue;
            }
            if near_edge(candidate, nx, ny, margin) {
                continue;
            }

            // Two-stage center refinement: discrete argmax in a wide
            // window, then a continuous polish so the center is not pinned
            // to the pixel grid.
            let peak_px = window_argmax(image, candidate, config.edge_margin * fwhm_guess);
            if near_edge(peak_px, nx, ny, margin) {
                continue;
            }
            let center = refine_maximum(image, peak_px, fwhm_guess);
            if near_edge(center, nx, ny, margin) {
                continue;
            }
            if too_close(&stars, center, min_dist) {
                continue;
            }
            if let Some(peakmax) = config.peakmax {
                let window = window_argmax(image, center, min_dist);
                if image[[window.y as usize, window.x as usize]] >= peakmax {
                    continue;
                }
            }

            let core_flux = interp::bicubic(image, center.x, center.y);
            if core_flux < config.clean_floor * background_noise {
                continue;
            }

            // Core symmetry
            if is_asymmetric(image, center, fwhm_guess) {
                continue;
            }

            // Grow the sampling radius until the running median falls to
            // half the central flux, re-testing symmetry along the way
            let mut radii = vec![0.5];
            let mut fluxes = vec![core_flux];
            let mut bad_steps = 0usize;
            while *fluxes.last().expect("growth curve non-empty") > fluxes[0] / 2.0
                && *radii.last().expect("growth curve non-empty") < growth_limit
            {
                let r = radii.last().unwrap() * config.growth_factor;
                let contour = Ellipse::circular(r);
                let samples =
                    isophote::extract(image, &contour, center, &SampleOptions::default());
                let (low, c0) = fourier::low_mode_power(&samples.values);
                if low > c0.abs().sqrt() {
                    bad_steps += 1;
                }
                radii.push(r);
                fluxes.push(stats::median(&samples.values));
            }
            if bad_steps > config.max_bad_steps {
                continue;
            }

            let Some(r_half) = half_flux_radius(&radii, &fluxes) else {
                continue;
            };

            stars.push(Star {
                x: center.x,
                y: center.y,
                fwhm: 2.0 * r_half,
                peak: core_flux,
            });
            if let Some(max_stars) = config.max_stars {
                if stars.len() >= max_stars {
                    break 'scan;
                }
            }
        }
    }

    info!(
        "star search complete: {} accepted detections",
        stars.len()
    );
    stars
}
