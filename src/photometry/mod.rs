//! Flux, magnitude, and surface-brightness conversions
//!
//! The profile generator works in raw pixel flux; output tables report
//! either magnitudes (`mag = -2.5 log10(flux) + zeropoint`) or intensities
//! (flux per square arcsecond). Uncertainties propagate analytically
//! through the log transform.

use std::f64::consts::LN_10;

/// Apparent magnitude of a total flux.
pub fn flux_to_mag(flux: f64, zeropoint: f64) -> f64 {
    -2.5 * flux.log10() + zeropoint
}

/// Inverse of [`flux_to_mag`].
pub fn mag_to_flux(mag: f64, zeropoint: f64) -> f64 {
    10f64.powf(-(mag - zeropoint) / 2.5)
}

/// Magnitude uncertainty from a flux uncertainty:
/// `sigma_mag = 2.5 sigma_f / (f ln 10)`.
pub fn mag_err_from_flux(flux: f64, flux_err: f64) -> f64 {
    2.5 * flux_err / (flux * LN_10)
}

/// Surface brightness in mag arcsec^-2 of a per-pixel flux, given the pixel
/// scale in arcsec/pixel.
pub fn flux_to_sb(flux: f64, pixscale: f64, zeropoint: f64) -> f64 {
    flux_to_mag(flux, zeropoint) + 2.5 * (pixscale * pixscale).log10()
}

/// Inverse of [`flux_to_sb`].
pub fn sb_to_flux(sb: f64, pixscale: f64, zeropoint: f64) -> f64 {
    mag_to_flux(sb - 2.5 * (pixscale * pixscale).log10(), zeropoint)
}

/// Total magnitude of a uniform surface brightness over an area in arcsec^2.
pub fn magperarcsec2_to_mag(mu: f64, area: f64) -> f64 {
    mu - 2.5 * area.log10()
}

/// Surface brightness of a total magnitude spread over an area in arcsec^2.
pub fn mag_to_magperarcsec2(mag: f64, area: f64) -> f64 {
    mag + 2.5 * area.log10()
}

/// Reference-free linear flux of a magnitude-like quantity. Zero-point
/// terms cancel through curve-of-growth integration, so the integrator
/// works in this space and converts back with [`linear_to_mag`].
pub fn mag_to_linear(mag: f64) -> f64 {
    10f64.powf(-mag / 2.5)
}

/// Inverse of [`mag_to_linear`].
pub fn linear_to_mag(flux: f64) -> f64 {
    -2.5 * flux.log10()
}
