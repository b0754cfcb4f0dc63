//! Elliptical contour geometry and fitted-track resampling
//!
//! An isophote is approximated as an ellipse described by its semi-major
//! axis length (pixels), ellipticity `1 - b/a`, and position angle. A fitted
//! sequence of ellipses over radius forms a [`GeometryTrack`], which can be
//! resampled onto an arbitrary radius ladder for profile extraction.

use nalgebra::Point2;
use std::f64::consts::PI;

use crate::errors::{ProfileError, Result};

/// One elliptical contour: semi-major axis (pixels), ellipticity `1 - b/a`,
/// and position angle of the major axis (radians, canonical in `[0, pi)`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub sma: f64,
    pub eps: f64,
    pub pa: f64,
}

impl Ellipse {
    /// Build a validated ellipse.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::DegenerateGeometry`] when the ellipticity is
    /// outside `[0, 1)` (a unit ellipticity collapses the contour to a line)
    /// or the semi-major axis is negative or non-finite. A zero semi-major
    /// axis is legal: it degenerates to repeated samples of the center point
    /// and is used by the star finder's innermost growth step.
    pub fn new(sma: f64, eps: f64, pa: f64) -> Result<Self> {
        if !sma.is_finite() || sma < 0.0 || !eps.is_finite() || !(0.0..1.0).contains(&eps) {
            return Err(ProfileError::DegenerateGeometry { sma, eps });
        }
        Ok(Self {
            sma,
            eps,
            pa: canonical_pa(pa),
        })
    }

    /// A circular contour of the given radius.
    pub fn circular(sma: f64) -> Self {
        debug_assert!(sma >= 0.0);
        Self {
            sma: sma.max(0.0),
            eps: 0.0,
            pa: 0.0,
        }
    }

    /// Minor-to-major axis ratio `b/a = 1 - eps`.
    pub fn axis_ratio(&self) -> f64 {
        1.0 - self.eps
    }
}

/// Canonicalize a position angle into `[0, pi)`.
pub fn canonical_pa(pa: f64) -> f64 {
    pa.rem_euclid(PI)
}

/// Shift a position angle in degrees between the two common conventions
/// (major axis measured from the x-axis vs. from north), staying in
/// `[0, 180)`.
pub fn pa_shift_convention_deg(pa_deg: f64) -> f64 {
    (pa_deg - 90.0).rem_euclid(180.0)
}

/// Map an unconstrained real to the ellipticity band (0.02, 0.98).
///
/// Fitted ellipticities are interpolated through this parameter space so
/// intermediate values cannot leave the physical range.
pub(crate) fn x_to_eps(x: f64) -> f64 {
    0.02 + 0.96 * (0.5 + (x - 0.5).atan() / PI)
}

/// Inverse of [`x_to_eps`].
pub(crate) fn eps_to_x(eps: f64) -> f64 {
    0.5 + (PI * ((eps - 0.02) / 0.96 - 0.5)).tan()
}

/// Piecewise-linear interpolation on a monotonically increasing grid,
/// clamping to the end values outside the grid.
pub fn linear_interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    debug_assert_eq!(xp.len(), fp.len());
    if xp.is_empty() {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[xp.len() - 1] {
        return fp[fp.len() - 1];
    }
    let hi = xp.partition_point(|&v| v < x);
    let lo = hi - 1;
    let span = xp[hi] - xp[lo];
    if span <= 0.0 {
        return fp[lo];
    }
    let t = (x - xp[lo]) / span;
    fp[lo] + t * (fp[hi] - fp[lo])
}

/// A fitted (R, ellipticity, PA) sequence with optional per-point
/// uncertainties. Radii are in pixels and strictly increasing; position
/// angles are radians.
#[derive(Debug, Clone)]
pub struct GeometryTrack {
    pub r: Vec<f64>,
    pub eps: Vec<f64>,
    pub pa: Vec<f64>,
    pub eps_err: Option<Vec<f64>>,
    pub pa_err: Option<Vec<f64>>,
}

impl GeometryTrack {
    /// Track with no uncertainty information.
    pub fn new(r: Vec<f64>, eps: Vec<f64>, pa: Vec<f64>) -> Self {
        Self {
            r,
            eps,
            pa,
            eps_err: None,
            pa_err: None,
        }
    }

    pub fn len(&self) -> usize {
        self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    /// Geometry uncertainties, substituting zeros when none were fitted.
    pub fn errors_or_zero(&self) -> (Vec<f64>, Vec<f64>) {
        let zeros = || vec![0.0; self.r.len()];
        (
            self.eps_err.clone().unwrap_or_else(zeros),
            self.pa_err.clone().unwrap_or_else(zeros),
        )
    }

    /// Resample the track onto a new radius ladder.
    ///
    /// Ellipticity is interpolated through the unconstrained parameter space
    /// of [`x_to_eps`]; position angle through (sin 2PA, cos 2PA) so the
    /// half-turn wrap cannot produce spurious intermediate angles. Radii
    /// outside the fitted range take the end values. Resampled uncertainties
    /// are floored at 1e-3 to keep later Gaussian perturbations meaningful.
    pub fn resample(&self, radii: &[f64]) -> GeometryTrack {
        let xs: Vec<f64> = self.eps.iter().map(|&e| eps_to_x(e)).collect();
        let sin2: Vec<f64> = self.pa.iter().map(|&p| (2.0 * p).sin()).collect();
        let cos2: Vec<f64> = self.pa.iter().map(|&p| (2.0 * p).cos()).collect();

        let r_lo = self.r[0];
        let r_hi = self.r[self.r.len() - 1];

        let eps: Vec<f64> = radii
            .iter()
            .map(|&r| {
                if r < r_lo {
                    self.eps[0]
                } else if r > r_hi {
                    self.eps[self.eps.len() - 1]
                } else {
                    x_to_eps(linear_interp(r, &self.r, &xs))
                }
            })
            .collect();

        let pa: Vec<f64> = radii
            .iter()
            .map(|&r| {
                if r < r_lo {
                    canonical_pa(self.pa[0])
                } else if r > r_hi {
                    canonical_pa(self.pa[self.pa.len() - 1])
                } else {
                    let s = linear_interp(r, &self.r, &sin2);
                    let c = linear_interp(r, &self.r, &cos2);
                    canonical_pa(s.atan2(c).rem_euclid(2.0 * PI) / 2.0)
                }
            })
            .collect();

        let resample_err = |err: &[f64]| -> Vec<f64> {
            radii
                .iter()
                .map(|&r| linear_interp(r, &self.r, err).max(1e-3))
                .collect()
        };

        GeometryTrack {
            r: radii.to_vec(),
            eps,
            pa,
            eps_err: self.eps_err.as_deref().map(&resample_err),
            pa_err: self.pa_err.as_deref().map(&resample_err),
        }
    }
}

/// A pixel-coordinate position (x = column, y = row).
pub type PixelPoint = Point2<f64>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ellipse_validation() {
        assert!(Ellipse::new(10.0, 0.3, 1.0).is_ok());
        assert!(Ellipse::new(0.0, 0.0, 0.0).is_ok());
        assert!(Ellipse::new(10.0, 1.0, 0.0).is_err());
        assert!(Ellipse::new(10.0, -0.1, 0.0).is_err());
        assert!(Ellipse::new(-1.0, 0.2, 0.0).is_err());
        assert!(Ellipse::new(f64::NAN, 0.2, 0.0).is_err());
    }

    #[test]
    fn test_pa_canonicalized_on_construction() {
        let e = Ellipse::new(5.0, 0.1, PI + 0.25).unwrap();
        assert_relative_eq!(e.pa, 0.25, epsilon = 1e-12);
        let e = Ellipse::new(5.0, 0.1, -0.25).unwrap();
        assert_relative_eq!(e.pa, PI - 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_pa_shift_convention() {
        assert_relative_eq!(pa_shift_convention_deg(90.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(pa_shift_convention_deg(0.0), 90.0, epsilon = 1e-12);
        assert_relative_eq!(pa_shift_convention_deg(200.0), 110.0, epsilon = 1e-12);
    }

    #[test]
    fn test_eps_parameter_space_roundtrip() {
        for eps in [0.05, 0.3, 0.5, 0.8, 0.95] {
            assert_relative_eq!(x_to_eps(eps_to_x(eps)), eps, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_linear_interp_clamps_ends() {
        let xp = [1.0, 2.0, 4.0];
        let fp = [10.0, 20.0, 40.0];
        assert_relative_eq!(linear_interp(0.0, &xp, &fp), 10.0);
        assert_relative_eq!(linear_interp(3.0, &xp, &fp), 30.0);
        assert_relative_eq!(linear_interp(9.0, &xp, &fp), 40.0);
    }

    #[test]
    fn test_track_resample_constant_geometry() {
        let track = GeometryTrack::new(vec![1.0, 10.0], vec![0.2, 0.2], vec![0.7, 0.7]);
        let out = track.resample(&[0.5, 2.0, 5.0, 20.0]);
        for &e in &out.eps {
            assert_relative_eq!(e, 0.2, epsilon = 1e-9);
        }
        for &p in &out.pa {
            assert_relative_eq!(p, 0.7, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_track_resample_pa_wrap() {
        // PA interpolated across the 0/pi wrap must not pass through pi/2
        let track = GeometryTrack::new(
            vec![1.0, 2.0],
            vec![0.3, 0.3],
            vec![0.05, PI - 0.05],
        );
        let out = track.resample(&[1.5]);
        let pa = out.pa[0];
        assert!(
            pa < 0.2 || pa > PI - 0.2,
            "interpolated PA {pa} strayed from the wrap neighborhood"
        );
    }

    #[test]
    fn test_track_resample_error_floor() {
        let mut track = GeometryTrack::new(vec![1.0, 2.0], vec![0.2, 0.2], vec![0.0, 0.0]);
        track.eps_err = Some(vec![0.0, 0.0]);
        track.pa_err = Some(vec![0.0, 0.0]);
        let out = track.resample(&[1.5]);
        assert_relative_eq!(out.eps_err.unwrap()[0], 1e-3);
        assert_relative_eq!(out.pa_err.unwrap()[0], 1e-3);
    }
}
