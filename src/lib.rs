//! # isoprof
//!
//! Non-parametric radial surface-brightness profiles for extended
//! astronomical sources, plus point-source detection for masking and PSF
//! estimation.
//!
//! Given a background-characterized image, a center, and a fitted (or
//! forced) ellipse geometry track, the library samples pixel flux along
//! elliptical isophotes with sub-pixel interpolation, reduces each contour
//! with robust statistics (optionally sigma-clipped and Fourier-decomposed),
//! and integrates the brightness profile into a curve of growth with
//! Monte-Carlo propagated uncertainties. Star detection runs independently
//! on the same images via a high-pass convolution filter with
//! azimuthal-symmetry and radial growth-curve validation.
//!
//! The library measures along prescribed contours only: it does not fit
//! ellipses, load FITS files, or model galaxy light profiles.
//!
//! # Example
//!
//! ```ignore
//! use isoprof::{extract_fitted, GeometryTrack, ProfileConfig, ProfileInput};
//! use nalgebra::Point2;
//!
//! let input = ProfileInput {
//!     image: &image,
//!     mask: None,
//!     background: 341.2,
//!     background_noise: 12.7,
//!     psf_fwhm: 3.1,
//!     center: Point2::new(512.0, 508.5),
//!     init_ellip: 0.22,
//!     init_pa: 1.02,
//! };
//! let table = extract_fitted(&input, &fit_track, &ProfileConfig::default())?;
//! let sb = table.column("SB").unwrap();
//! ```

pub mod cog;
pub mod constants;
pub mod errors;
pub mod fourier;
pub mod geometry;
pub mod interp;
pub mod isophote;
pub mod photometry;
pub mod profile;
pub mod starfind;
pub mod stats;

// Re-export the main entry points and types
pub use cog::{CogMethod, CogResult};
pub use errors::{ProfileError, Result};
pub use fourier::FourierModes;
pub use geometry::{Ellipse, GeometryTrack, PixelPoint};
pub use isophote::{ClipParams, ContourSamples, SampleOptions};
pub use profile::{
    extract_fitted, extract_forced, extract_profile, radius_schedule, read_forcing_profile,
    FluxUnits, ProfileConfig, ProfileInput, ProfileTable, SampleStyle,
};
pub use starfind::{catalog_arrays, find_stars, Star, StarFindConfig};
pub use stats::AverageMethod;
