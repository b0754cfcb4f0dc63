//! Surface-brightness profile generation
//!
//! Drives the contour sampler and robust aggregator across a sequence of
//! radii, assembling the output profile table: brightness and uncertainty
//! per radius, pixel counts, optional Fourier modes, direct aperture sums,
//! and Monte-Carlo curves of growth. A parallel profile extracted with the
//! innermost fitted geometry is emitted alongside the fitted-geometry
//! profile, giving a measurement independent of angular/ellipticity drift
//! at large radius.
//!
//! Radii, geometry, and options arrive three ways: an explicit resampled
//! track ([`extract_profile`]), a fitted track plus a radius ladder built
//! from the configuration ([`extract_fitted`]), or a forced-photometry
//! table read verbatim from disk ([`extract_forced`]).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use ndarray::Array2;

use crate::cog::{self, CogMethod};
use crate::constants::{DEG2RAD, RAD2DEG, SENTINEL_INTENSITY, SENTINEL_MAG};
use crate::errors::{io_err, ProfileError, Result};
use crate::fourier::{self, FourierModes};
use crate::geometry::{self, Ellipse, GeometryTrack, PixelPoint};
use crate::isophote::{self, ClipParams, SampleOptions};
use crate::photometry;
use crate::stats::{self, AverageMethod};

/// Output units for brightness and cumulative-flux columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FluxUnits {
    /// Surface brightness in mag arcsec^-2, totals in mag.
    #[default]
    Magnitude,
    /// Flux density in flux arcsec^-2, totals in flux.
    Intensity,
}

/// Spacing law for the radius ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleStyle {
    /// Each radius 10% (by default) beyond the previous; fast and the
    /// default.
    #[default]
    Geometric,
    /// Fixed step in pixels.
    Linear,
    /// Geometric near the center, switching to linear once the geometric
    /// step grows past the linear scale.
    GeometricLinear,
}

/// Full option surface for profile extraction. Every recognized option is a
/// typed field with a documented default; construction via `Default` then
/// field assignment mirrors how callers override a subset.
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    /// Pixel scale in arcsec/pixel.
    pub pixscale: f64,
    /// Photometric zero point for magnitude conversion.
    pub zeropoint: f64,
    /// Output units.
    pub flux_units: FluxUnits,
    /// Radius ladder spacing law.
    pub sample_style: SampleStyle,
    /// Relative growth per step for geometric sampling.
    pub sample_geometric_scale: f64,
    /// Step in pixels for linear sampling; `None` uses half the PSF FWHM.
    pub sample_linear_scale: Option<f64>,
    /// First radius in pixels; `None` uses min(1, PSF/2).
    pub sample_init_r: Option<f64>,
    /// Last radius in pixels; `None` uses three times the fitted extent.
    pub sample_end_r: Option<f64>,
    /// Extend sampling to the image half-diagonal regardless of the fit.
    pub extract_full: bool,
    /// Noise multiple below which band sampling replaces contour sampling.
    pub isoband_start: f64,
    /// Band half-width: relative to R, or pixels when `isoband_fixed`.
    pub isoband_width: f64,
    /// Interpret `isoband_width` as a fixed width in pixels.
    pub isoband_fixed: bool,
    /// Stop after two consecutive non-positive isophotes.
    pub truncate_evaluation: bool,
    /// Contours below this multiple of the PSF FWHM use sub-pixel
    /// interpolation.
    pub interpolate_start: f64,
    /// Location estimator for contour samples.
    pub average_method: AverageMethod,
    /// Optional upper-only sigma clip of contour samples.
    pub sigma_clip: Option<ClipParams>,
    /// Number of Fourier modes to report per isophote; `None` disables the
    /// decomposition.
    pub fourier_modes: Option<usize>,
    /// Monte-Carlo trials for curve-of-growth uncertainty.
    pub cog_trials: usize,
    /// Curve-of-growth integration scheme.
    pub cog_method: CogMethod,
    /// Extra rotation (radians) applied to forced-profile position angles.
    pub forced_pa_shift: f64,
    /// Seed for the Monte-Carlo trial stream.
    pub rng_seed: u64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            pixscale: 1.0,
            zeropoint: 22.5,
            flux_units: FluxUnits::default(),
            sample_style: SampleStyle::default(),
            sample_geometric_scale: 0.1,
            sample_linear_scale: None,
            sample_init_r: None,
            sample_end_r: None,
            extract_full: false,
            isoband_start: 2.0,
            isoband_width: 0.025,
            isoband_fixed: false,
            truncate_evaluation: false,
            interpolate_start: 5.0,
            average_method: AverageMethod::default(),
            sigma_clip: None,
            fourier_modes: None,
            cog_trials: 100,
            cog_method: CogMethod::default(),
            forced_pa_shift: 0.0,
            rng_seed: 0,
        }
    }
}

impl ProfileConfig {
    /// Check every field against its documented range. Called once at each
    /// extraction entry point.
    pub fn validate(&self) -> Result<()> {
        let bad = |reason: &str| Err(ProfileError::InvalidConfig(reason.to_string()));
        if !(self.pixscale > 0.0) || !self.pixscale.is_finite() {
            return bad("pixscale must be positive and finite");
        }
        if !self.zeropoint.is_finite() {
            return bad("zeropoint must be finite");
        }
        if !(self.sample_geometric_scale > 0.0) {
            return bad("sample_geometric_scale must be positive");
        }
        if matches!(self.sample_linear_scale, Some(s) if !(s > 0.0)) {
            return bad("sample_linear_scale must be positive");
        }
        if matches!(self.sample_init_r, Some(r) if !(r > 0.0)) {
            return bad("sample_init_r must be positive");
        }
        if matches!(self.sample_end_r, Some(r) if !(r > 0.0)) {
            return bad("sample_end_r must be positive");
        }
        if !(self.isoband_width >= 0.0) || !(self.isoband_start >= 0.0) {
            return bad("isoband parameters must be non-negative");
        }
        if !(self.interpolate_start >= 0.0) {
            return bad("interpolate_start must be non-negative");
        }
        if self.cog_trials == 0 {
            return bad("cog_trials must be at least 1");
        }
        Ok(())
    }
}

/// Borrowed inputs for one extraction call. The image and mask are read
/// only; every output is freshly allocated.
#[derive(Debug)]
pub struct ProfileInput<'a> {
    pub image: &'a Array2<f64>,
    pub mask: Option<&'a Array2<bool>>,
    /// Background level, subtracted from the image before sampling.
    pub background: f64,
    /// 1-sigma background flux noise.
    pub background_noise: f64,
    /// PSF full width at half maximum in pixels.
    pub psf_fwhm: f64,
    /// Galaxy center in pixel coordinates.
    pub center: PixelPoint,
    /// Innermost fitted ellipticity, for the fixed-geometry profile.
    pub init_ellip: f64,
    /// Innermost fitted position angle (radians).
    pub init_pa: f64,
}

/// The assembled profile: ordered column names, a unit string per column,
/// and one dense numeric sequence per column.
#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    pub columns: Vec<String>,
    pub units: HashMap<String, String>,
    pub data: HashMap<String, Vec<f64>>,
}

impl ProfileTable {
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.data.get(name).map(|v| v.as_slice())
    }

    pub fn n_rows(&self) -> usize {
        self.columns
            .first()
            .and_then(|c| self.data.get(c))
            .map_or(0, Vec::len)
    }

    fn add(&mut self, name: &str, unit: &str, values: Vec<f64>) {
        self.columns.push(name.to_string());
        self.units.insert(name.to_string(), unit.to_string());
        self.data.insert(name.to_string(), values);
    }
}

fn finite_or(value: f64, sentinel: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        sentinel
    }
}

/// Build the radius ladder for [`extract_fitted`].
///
/// Starts at `sample_init_r` (or min(1, PSF/2)) and grows per the sampling
/// style until `sample_end_r` (or three times the fitted extent), never
/// exceeding the image half-diagonal. `extract_full` extends sampling to
/// that hard limit.
pub fn radius_schedule(
    config: &ProfileConfig,
    psf_fwhm: f64,
    fit_rmax: f64,
    shape: (usize, usize),
) -> Vec<f64> {
    let max_dim = shape.0.max(shape.1) as f64;
    let hard_limit = max_dim / std::f64::consts::SQRT_2;
    let end = if config.extract_full {
        hard_limit
    } else {
        config
            .sample_end_r
            .unwrap_or(3.0 * fit_rmax)
            .min(hard_limit)
    };

    let mut radii = vec![config
        .sample_init_r
        .unwrap_or_else(|| (psf_fwhm / 2.0).min(1.0))];
    loop {
        let last = *radii.last().expect("ladder starts non-empty");
        let next = match config.sample_style {
            SampleStyle::Geometric => last * (1.0 + config.sample_geometric_scale),
            SampleStyle::Linear => last + config.sample_linear_scale.unwrap_or(0.5 * psf_fwhm),
            SampleStyle::GeometricLinear => {
                let geometric = last * (1.0 + config.sample_geometric_scale);
                let switch = config.sample_linear_scale.unwrap_or(3.0 * psf_fwhm);
                if geometric - last >= switch {
                    last + config.sample_linear_scale.unwrap_or(0.5 * psf_fwhm)
                } else {
                    geometric
                }
            }
        };
        if !next.is_finite() || next > end {
            break;
        }
        radii.push(next);
    }
    radii
}

/// Extract the profile along a fitted track, building the radius ladder
/// from the configuration and resampling the track onto it.
pub fn extract_fitted(
    input: &ProfileInput,
    fit: &GeometryTrack,
    config: &ProfileConfig,
) -> Result<ProfileTable> {
    config.validate()?;
    if fit.is_empty() {
        return Err(ProfileError::EmptyTrack);
    }
    let fit_rmax = fit.r[fit.len() - 1];
    let radii = radius_schedule(config, input.psf_fwhm, fit_rmax, input.image.dim());
    info!(
        "radius ladder complete: {} radii in [{:.1}, {:.1}] px",
        radii.len(),
        radii[0],
        radii[radii.len() - 1]
    );
    extract_profile(input, &fit.resample(&radii), config)
}

/// Extract the profile for a forced-photometry geometry table read from
/// `path`, consumed verbatim (no resampling).
pub fn extract_forced(
    input: &ProfileInput,
    path: &Path,
    config: &ProfileConfig,
) -> Result<ProfileTable> {
    config.validate()?;
    let track = read_forcing_profile(path, config.pixscale, config.forced_pa_shift)?;
    extract_profile(input, &track, config)
}

/// Parse a forced-photometry table: comment lines, a header row naming at
/// least `R, ellip, pa` (optionally `ellip_e, pa_e`), a units row, then one
/// CSV row per radius. `R` is in arcsec and converts to pixels via the
/// pixel scale; position angles are degrees and shift to the internal
/// convention.
pub fn read_forcing_profile(path: &Path, pixscale: f64, pa_shift: f64) -> Result<GeometryTrack> {
    let text = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let malformed = |reason: String| ProfileError::ForcingProfile {
        path: path.to_path_buf(),
        reason,
    };

    let mut rows = text.lines();
    let header_line = loop {
        match rows.next() {
            Some(l) if l.trim_start().starts_with('#') => continue,
            Some(l) => break l,
            None => return Err(malformed("no header row".to_string())),
        }
    };
    let header: Vec<&str> = header_line.split(',').map(str::trim).collect();
    let col = |name: &str| header.iter().position(|&h| h == name);
    let (r_col, e_col, p_col) = match (col("R"), col("ellip"), col("pa")) {
        (Some(r), Some(e), Some(p)) => (r, e, p),
        _ => return Err(malformed("header must name R, ellip, pa columns".to_string())),
    };
    let ee_col = col("ellip_e");
    let pe_col = col("pa_e");

    // The row after the header carries units, not data
    let _ = rows.next();

    let mut r = Vec::new();
    let mut eps = Vec::new();
    let mut pa = Vec::new();
    let mut eps_err = Vec::new();
    let mut pa_err = Vec::new();

    for line in rows {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < header.len() {
            return Err(malformed(format!(
                "row has {} fields but the header names {}",
                fields.len(),
                header.len()
            )));
        }
        let parse = |idx: usize| -> Result<f64> {
            fields[idx].parse::<f64>().map_err(|_| {
                ProfileError::ForcingProfile {
                    path: path.to_path_buf(),
                    reason: format!("cannot parse '{}' as a number", fields[idx]),
                }
            })
        };
        r.push(parse(r_col)? / pixscale);
        eps.push(parse(e_col)?);
        let pa_deg = geometry::pa_shift_convention_deg(parse(p_col)?);
        pa.push(geometry::canonical_pa(pa_deg * DEG2RAD + pa_shift));
        if let Some(idx) = ee_col {
            eps_err.push(parse(idx)?);
        }
        if let Some(idx) = pe_col {
            pa_err.push(parse(idx)? * DEG2RAD);
        }
    }
    if r.is_empty() {
        return Err(malformed("no data rows".to_string()));
    }

    let mut track = GeometryTrack::new(r, eps, pa);
    if ee_col.is_some() && pe_col.is_some() {
        track.eps_err = Some(eps_err);
        track.pa_err = Some(pa_err);
    }
    Ok(track)
}

/// Extract the profile along an explicit geometry track.
///
/// Rows are produced in track order (radii must be strictly increasing for
/// the curve of growth to be meaningful). Degenerate geometry anywhere in
/// the track fails before any sampling.
pub fn extract_profile(
    input: &ProfileInput,
    track: &GeometryTrack,
    config: &ProfileConfig,
) -> Result<ProfileTable> {
    config.validate()?;
    if track.is_empty() {
        return Err(ProfileError::EmptyTrack);
    }
    if let Some(mask) = input.mask {
        if mask.dim() != input.image.dim() {
            return Err(ProfileError::InvalidConfig(
                "mask shape must match the image".to_string(),
            ));
        }
    }

    let ellipses: Vec<Ellipse> = track
        .r
        .iter()
        .zip(track.eps.iter().zip(&track.pa))
        .map(|(&r, (&e, &p))| Ellipse::new(r, e, p))
        .collect::<Result<_>>()?;
    let init = Ellipse::new(0.0, input.init_ellip, input.init_pa)?;

    let dat = input.image.mapv(|v| v - input.background);
    let opts = SampleOptions {
        mask: input.mask,
        interp_threshold: Some(config.interpolate_start * input.psf_fwhm),
        clip: config.sigma_clip,
    };

    let n = track.len();
    let (eps_err, pa_err) = track.errors_or_zero();
    let intensity_units = config.flux_units == FluxUnits::Intensity;
    let pixel_area = config.pixscale * config.pixscale;

    let mut sb = Vec::with_capacity(n);
    let mut sb_e = Vec::with_capacity(n);
    let mut sb_fix = Vec::with_capacity(n);
    let mut sb_fix_e = Vec::with_capacity(n);
    let mut pixels = Vec::with_capacity(n);
    let mut cog_direct = Vec::with_capacity(n);
    let mut fmodes: Vec<FourierModes> = Vec::new();

    let mut med_flux = f64::INFINITY;
    let mut banded = false;
    let mut consec_nonpos = 0usize;

    for (i, ellipse) in ellipses.iter().enumerate() {
        let band_halfwidth = if config.isoband_fixed {
            config.isoband_width
        } else {
            ellipse.sma * config.isoband_width
        };
        // Once the running median drops into the noise, thin-contour samples
        // are too sparse; switch to band averaging for the rest of the run.
        if !banded
            && med_flux <= config.isoband_start * input.background_noise
            && band_halfwidth >= 0.5
        {
            banded = true;
            debug!("band sampling from R={:.2} px onward", ellipse.sma);
        }

        let (samples, samples_fix) = if banded {
            (
                isophote::extract_between(
                    &dat,
                    ellipse.sma - band_halfwidth,
                    ellipse.sma + band_halfwidth,
                    ellipse.eps,
                    ellipse.pa,
                    input.center,
                    &opts,
                ),
                isophote::extract_between(
                    &dat,
                    ellipse.sma - band_halfwidth,
                    ellipse.sma + band_halfwidth,
                    init.eps,
                    init.pa,
                    input.center,
                    &opts,
                ),
            )
        } else {
            let fix = Ellipse {
                sma: ellipse.sma,
                eps: init.eps,
                pa: init.pa,
            };
            (
                isophote::extract(&dat, ellipse, input.center, &opts),
                isophote::extract(&dat, &fix, input.center, &opts),
            )
        };

        let isotot = isophote::sum_within(&dat, ellipse, input.center, input.mask);
        med_flux = stats::average(&samples.values, config.average_method);
        let scat_flux = stats::scatter(&samples.values);
        let med_fix = stats::average(&samples_fix.values, config.average_method);
        let scat_fix = stats::scatter(&samples_fix.values);

        if let Some(modes) = config.fourier_modes {
            fmodes.push(fourier::decompose(&samples, modes, input.background_noise));
        }
        pixels.push(samples.len() as f64);

        let nsamp = samples.len() as f64;
        let nsamp_fix = samples_fix.len() as f64;
        if intensity_units {
            sb.push(finite_or(med_flux / pixel_area, SENTINEL_INTENSITY));
            sb_e.push(finite_or(scat_flux / nsamp.sqrt(), SENTINEL_INTENSITY));
            sb_fix.push(finite_or(med_fix / pixel_area, SENTINEL_INTENSITY));
            sb_fix_e.push(finite_or(scat_fix / nsamp_fix.sqrt(), SENTINEL_INTENSITY));
            cog_direct.push(finite_or(isotot, SENTINEL_INTENSITY));
        } else {
            if med_flux > 0.0 {
                sb.push(finite_or(
                    photometry::flux_to_sb(med_flux, config.pixscale, config.zeropoint),
                    SENTINEL_MAG,
                ));
                sb_e.push(finite_or(
                    photometry::mag_err_from_flux(med_flux, scat_flux / nsamp.sqrt()),
                    SENTINEL_MAG,
                ));
            } else {
                sb.push(SENTINEL_MAG);
                sb_e.push(SENTINEL_MAG);
            }
            if med_fix > 0.0 {
                sb_fix.push(finite_or(
                    photometry::flux_to_sb(med_fix, config.pixscale, config.zeropoint),
                    SENTINEL_MAG,
                ));
                sb_fix_e.push(finite_or(
                    photometry::mag_err_from_flux(med_fix, scat_fix / nsamp_fix.sqrt()),
                    SENTINEL_MAG,
                ));
            } else {
                sb_fix.push(SENTINEL_MAG);
                sb_fix_e.push(SENTINEL_MAG);
            }
            cog_direct.push(if isotot > 0.0 {
                finite_or(
                    photometry::flux_to_mag(isotot, config.zeropoint),
                    SENTINEL_MAG,
                )
            } else {
                SENTINEL_MAG
            });
        }

        if med_flux > 0.0 {
            consec_nonpos = 0;
        } else {
            consec_nonpos += 1;
        }
        if config.truncate_evaluation && consec_nonpos >= 2 {
            info!(
                "profile truncated after {} radii (two consecutive non-positive isophotes)",
                i + 1
            );
            break;
        }
    }

    let end = sb.len();
    let r_arcsec: Vec<f64> = track.r[..end].iter().map(|&r| r * config.pixscale).collect();
    let q: Vec<f64> = track.eps[..end].iter().map(|&e| 1.0 - e).collect();
    let qe: Vec<f64> = eps_err[..end].iter().map(|&e| e.abs()).collect();

    let mut rng = cog::trial_rng(config.rng_seed);
    let (cog_total, cog_err) = integrate_cog(config, &r_arcsec, &sb, &sb_e, &q, &qe, &mut rng);
    let (cogfix_total, cogfix_err) =
        integrate_cog(config, &r_arcsec, &sb_fix, &sb_fix_e, &q, &qe, &mut rng);

    let pa_deg: Vec<f64> = track.pa[..end].iter().map(|&p| p * RAD2DEG).collect();
    let pa_e_deg: Vec<f64> = pa_err[..end].iter().map(|&p| p * RAD2DEG).collect();

    let (bright, bright_unit) = if intensity_units {
        ("I", "flux*arcsec^-2")
    } else {
        ("SB", "mag*arcsec^-2")
    };
    let (total, total_unit) = if intensity_units {
        ("totflux", "flux")
    } else {
        ("totmag", "mag")
    };

    let mut table = ProfileTable::default();
    table.add("R", "arcsec", r_arcsec);
    table.add(bright, bright_unit, sb);
    table.add(&format!("{bright}_e"), bright_unit, sb_e);
    table.add(total, total_unit, cog_total);
    table.add(&format!("{total}_e"), total_unit, cog_err);
    table.add("ellip", "unitless", track.eps[..end].to_vec());
    table.add("ellip_e", "unitless", eps_err[..end].to_vec());
    table.add("pa", "deg", pa_deg);
    table.add("pa_e", "deg", pa_e_deg);
    table.add("pixels", "count", pixels);
    table.add(&format!("{total}_direct"), total_unit, cog_direct);
    table.add(&format!("{bright}_fix"), bright_unit, sb_fix);
    table.add(&format!("{bright}_fix_e"), bright_unit, sb_fix_e);
    table.add(&format!("{total}_fix"), total_unit, cogfix_total);
    table.add(&format!("{total}_fix_e"), total_unit, cogfix_err);

    if let Some(modes) = config.fourier_modes {
        for m in 0..=modes.max(1) {
            let (unit_a, unit_b) = if m == 0 {
                ("flux".to_string(), "flux".to_string())
            } else {
                (format!("a{m}/F0"), format!("b{m}/F0"))
            };
            table.add(
                &format!("a{m}"),
                &unit_a,
                fmodes.iter().map(|f| f.a[m]).collect(),
            );
            table.add(
                &format!("b{m}"),
                &unit_b,
                fmodes.iter().map(|f| f.b[m]).collect(),
            );
        }
    }

    info!(
        "profile extracted: {} radii, R in [{:.1}, {:.1}] px",
        end,
        track.r[0],
        track.r[end - 1]
    );
    Ok(table)
}

/// Run the Monte-Carlo curve of growth for one brightness profile and
/// post-process into dense sentinel-safe columns.
fn integrate_cog(
    config: &ProfileConfig,
    r_arcsec: &[f64],
    bright: &[f64],
    bright_err: &[f64],
    q: &[f64],
    qe: &[f64],
    rng: &mut rand::rngs::StdRng,
) -> (Vec<f64>, Vec<f64>) {
    let n = r_arcsec.len();
    match config.flux_units {
        FluxUnits::Magnitude => {
            match cog::sb_to_cog_with_errors(
                r_arcsec,
                bright,
                bright_err,
                q,
                qe,
                config.cog_trials,
                config.cog_method,
                rng,
            ) {
                Some(res) => {
                    let mut err = res.symmetric_err();
                    let mut total = res.total;
                    for i in 0..n {
                        if !total[i].is_finite() {
                            total[i] = SENTINEL_MAG;
                        }
                        if total[i] > 99.0 || !err[i].is_finite() {
                            err[i] = SENTINEL_MAG;
                        }
                    }
                    (total, err)
                }
                None => {
                    warn!("curve of growth skipped: fewer than 5 usable profile points");
                    (vec![SENTINEL_MAG; n], vec![SENTINEL_MAG; n])
                }
            }
        }
        FluxUnits::Intensity => {
            match cog::fluxsum_with_errors(
                r_arcsec,
                bright,
                bright_err,
                q,
                qe,
                config.cog_trials,
                rng,
            ) {
                Some(res) => {
                    let mut err = res.symmetric_err();
                    let mut total = res.total;
                    for i in 0..n {
                        if !total[i].is_finite() {
                            total[i] = SENTINEL_INTENSITY;
                        }
                        if total[i] < 0.0 || !err[i].is_finite() {
                            err[i] = SENTINEL_INTENSITY;
                        }
                    }
                    (total, err)
                }
                None => {
                    warn!("curve of growth skipped: fewer than 5 usable profile points");
                    (vec![SENTINEL_INTENSITY; n], vec![SENTINEL_INTENSITY; n])
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;
    use std::f64::consts::TAU;
    use std::io::Write;

    fn exponential_disk(n: usize, peak: f64, scale: f64) -> Array2<f64> {
        let c = (n / 2) as f64;
        Array2::from_shape_fn((n, n), |(y, x)| {
            let dx = x as f64 - c;
            let dy = y as f64 - c;
            peak * (-(dx * dx + dy * dy).sqrt() / scale).exp()
        })
    }

    fn disk_input(image: &Array2<f64>) -> ProfileInput<'_> {
        let c = (image.nrows() / 2) as f64;
        ProfileInput {
            image,
            mask: None,
            background: 0.0,
            background_noise: 1e-4,
            psf_fwhm: 2.0,
            center: Point2::new(c, c),
            init_ellip: 0.0,
            init_pa: 0.0,
        }
    }

    fn geometric_radii(start: f64, factor: f64, max: f64) -> Vec<f64> {
        let mut r = vec![start];
        loop {
            let next = r.last().unwrap() * factor;
            if next > max {
                break;
            }
            r.push(next);
        }
        r
    }

    fn circular_track(radii: &[f64]) -> GeometryTrack {
        GeometryTrack::new(radii.to_vec(), vec![0.0; radii.len()], vec![0.0; radii.len()])
    }

    #[test]
    fn test_exponential_disk_recovers_total_flux() {
        let img = exponential_disk(200, 100.0, 10.0);
        let input = disk_input(&img);
        let config = ProfileConfig {
            flux_units: FluxUnits::Intensity,
            ..ProfileConfig::default()
        };
        let radii = geometric_radii(1.0, 1.1, 85.0);
        let table = extract_profile(&input, &circular_track(&radii), &config).unwrap();

        let tot = table.column("totflux").unwrap();
        let expected = TAU * 100.0 * 100.0; // 2 pi peak scale^2
        let recovered = *tot.last().unwrap();
        assert!(
            (recovered - expected).abs() < 0.05 * expected,
            "recovered {recovered}, expected {expected}"
        );

        // Cumulative flux is monotone for a positive profile
        for i in 1..tot.len() {
            assert!(tot[i] >= tot[i - 1] - 1e-6 * expected);
        }

        // Line sampling throughout: pixel counts follow the sampling law
        let pixels = table.column("pixels").unwrap();
        for (i, &r) in radii.iter().enumerate() {
            assert_eq!(pixels[i] as usize, isophote::sample_count(r));
        }
    }

    #[test]
    fn test_profile_table_layout_magnitude_units() {
        let img = exponential_disk(64, 50.0, 6.0);
        let input = disk_input(&img);
        let config = ProfileConfig {
            fourier_modes: Some(4),
            ..ProfileConfig::default()
        };
        let radii = [2.0, 3.0, 4.0, 5.0, 6.5, 8.0, 10.0];
        let table = extract_profile(&input, &circular_track(&radii), &config).unwrap();

        let expected: Vec<&str> = vec![
            "R", "SB", "SB_e", "totmag", "totmag_e", "ellip", "ellip_e", "pa", "pa_e", "pixels",
            "totmag_direct", "SB_fix", "SB_fix_e", "totmag_fix", "totmag_fix_e", "a0", "b0", "a1",
            "b1", "a2", "b2", "a3", "b3", "a4", "b4",
        ];
        assert_eq!(table.columns, expected);
        assert_eq!(table.n_rows(), radii.len());
        for name in &table.columns {
            assert!(table.units.contains_key(name), "missing units for {name}");
            assert_eq!(table.column(name).unwrap().len(), radii.len());
        }
        assert_eq!(table.units["SB"], "mag*arcsec^-2");
        assert_eq!(table.units["a2"], "a2/F0");

        // Circular symmetric source: brightness falls outward, low Fourier
        // power beyond the mean-flux mode
        let sb = table.column("SB").unwrap();
        assert!(sb[0] < sb[5]);
        let a2 = table.column("a2").unwrap();
        assert!(a2.iter().all(|&v| v.abs() < 0.05));
    }

    #[test]
    fn test_fixed_profile_matches_fitted_for_constant_geometry() {
        // When the track never drifts from the initial geometry, the fixed
        // and fitted profiles are the same measurement
        let img = exponential_disk(64, 50.0, 6.0);
        let input = disk_input(&img);
        let config = ProfileConfig::default();
        let radii = [2.0, 3.0, 4.0, 5.5, 7.0, 9.0];
        let table = extract_profile(&input, &circular_track(&radii), &config).unwrap();
        let sb = table.column("SB").unwrap();
        let sb_fix = table.column("SB_fix").unwrap();
        for i in 0..radii.len() {
            assert_relative_eq!(sb[i], sb_fix[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_truncation_on_consecutive_nonpositive() {
        // Flat disk out to r=20, nothing beyond; background subtraction
        // drives the outer isophotes negative
        let img = Array2::from_shape_fn((101, 101), |(y, x)| {
            let dx = x as f64 - 50.0;
            let dy = y as f64 - 50.0;
            if (dx * dx + dy * dy).sqrt() <= 20.0 {
                10.0
            } else {
                0.0
            }
        });
        let mut input = disk_input(&img);
        input.background = 0.5;
        input.background_noise = 0.1;
        let radii = [5.0, 10.0, 15.0, 22.0, 26.0, 30.0, 35.0];

        let config = ProfileConfig {
            truncate_evaluation: true,
            ..ProfileConfig::default()
        };
        let table = extract_profile(&input, &circular_track(&radii), &config).unwrap();
        assert_eq!(table.n_rows(), 5);
        let sb = table.column("SB").unwrap();
        assert_relative_eq!(sb[3], SENTINEL_MAG);
        assert_relative_eq!(sb[4], SENTINEL_MAG);
        // Too few usable points for a curve of growth: sentinel-filled
        let totmag = table.column("totmag").unwrap();
        assert!(totmag.iter().all(|&m| m == SENTINEL_MAG));

        // Band sampling kicked in after the first non-positive isophote:
        // the last row sweeps annulus pixels instead of contour samples
        let pixels = table.column("pixels").unwrap();
        assert_eq!(pixels[3] as usize, isophote::sample_count(22.0));
        assert!(pixels[4] as usize > 2 * isophote::sample_count(26.0));

        // Without truncation every radius is evaluated
        let config = ProfileConfig::default();
        let table = extract_profile(&input, &circular_track(&radii), &config).unwrap();
        assert_eq!(table.n_rows(), 7);
    }

    #[test]
    fn test_radius_schedule_styles() {
        let shape = (400, 400);
        let config = ProfileConfig::default();
        let r = radius_schedule(&config, 2.0, 50.0, shape);
        assert_relative_eq!(r[0], 1.0);
        for i in 1..r.len() {
            assert_relative_eq!(r[i] / r[i - 1], 1.1, epsilon = 1e-12);
        }
        assert!(*r.last().unwrap() <= 150.0);
        assert!(*r.last().unwrap() > 150.0 / 1.1);

        let config = ProfileConfig {
            sample_style: SampleStyle::Linear,
            sample_linear_scale: Some(2.0),
            sample_end_r: Some(20.0),
            ..ProfileConfig::default()
        };
        let r = radius_schedule(&config, 2.0, 50.0, shape);
        for i in 1..r.len() {
            assert_relative_eq!(r[i] - r[i - 1], 2.0, epsilon = 1e-12);
        }
        assert_relative_eq!(*r.last().unwrap(), 19.0, epsilon = 1e-12);

        let config = ProfileConfig {
            sample_style: SampleStyle::GeometricLinear,
            sample_linear_scale: Some(3.0),
            sample_end_r: Some(120.0),
            ..ProfileConfig::default()
        };
        let r = radius_schedule(&config, 2.0, 50.0, shape);
        // Early steps geometric, late steps fixed
        assert_relative_eq!(r[1] / r[0], 1.1, epsilon = 1e-12);
        let last_step = r[r.len() - 1] - r[r.len() - 2];
        assert_relative_eq!(last_step, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_radius_schedule_extract_full_reaches_half_diagonal() {
        let config = ProfileConfig {
            extract_full: true,
            ..ProfileConfig::default()
        };
        let r = radius_schedule(&config, 2.0, 10.0, (200, 200));
        let limit = 200.0 / std::f64::consts::SQRT_2;
        assert!(*r.last().unwrap() > 30.0, "extract_full ignores the fit extent");
        assert!(*r.last().unwrap() <= limit);
    }

    #[test]
    fn test_degenerate_track_rejected_before_sampling() {
        let img = exponential_disk(32, 10.0, 4.0);
        let input = disk_input(&img);
        let track = GeometryTrack::new(vec![2.0, 4.0], vec![0.1, 1.2], vec![0.0, 0.0]);
        let err = extract_profile(&input, &track, &ProfileConfig::default()).unwrap_err();
        assert!(matches!(err, ProfileError::DegenerateGeometry { .. }));
    }

    #[test]
    fn test_config_validation() {
        let bad = ProfileConfig {
            pixscale: 0.0,
            ..ProfileConfig::default()
        };
        assert!(matches!(bad.validate(), Err(ProfileError::InvalidConfig(_))));
        let bad = ProfileConfig {
            cog_trials: 0,
            ..ProfileConfig::default()
        };
        assert!(bad.validate().is_err());
        assert!(ProfileConfig::default().validate().is_ok());
    }

    fn write_forcing_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut f = fs::File::create(&path).expect("create forcing file");
        f.write_all(contents.as_bytes()).expect("write forcing file");
        path
    }

    #[test]
    fn test_read_forcing_profile_roundtrip() {
        let path = write_forcing_file(
            "isoprof_forcing_basic.prof",
            "# forced geometry\n\
             R,ellip,pa\n\
             arcsec,unitless,deg\n\
             1.0,0.1,90.0\n\
             2.0,0.2,100.0\n\
             4.0,0.3,110.0\n",
        );
        let track = read_forcing_profile(&path, 0.5, 0.0).unwrap();
        fs::remove_file(&path).ok();

        // R in arcsec over a 0.5 arcsec/px scale doubles in pixels
        assert_relative_eq!(track.r[0], 2.0);
        assert_relative_eq!(track.r[2], 8.0);
        assert_relative_eq!(track.eps[1], 0.2);
        // 90 degrees maps to zero under the convention shift
        assert_relative_eq!(track.pa[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(track.pa[1], 10.0 * DEG2RAD, epsilon = 1e-12);
        assert!(track.eps_err.is_none());
        assert!(track.pa_err.is_none());
    }

    #[test]
    fn test_read_forcing_profile_with_errors() {
        let path = write_forcing_file(
            "isoprof_forcing_errs.prof",
            "R,ellip,pa,ellip_e,pa_e\n\
             arcsec,unitless,deg,unitless,deg\n\
             1.0,0.1,45.0,0.02,3.0\n\
             2.0,0.1,45.0,0.03,4.0\n",
        );
        let track = read_forcing_profile(&path, 1.0, 0.0).unwrap();
        fs::remove_file(&path).ok();
        assert_relative_eq!(track.eps_err.as_ref().unwrap()[1], 0.03);
        assert_relative_eq!(track.pa_err.as_ref().unwrap()[0], 3.0 * DEG2RAD, epsilon = 1e-12);
    }

    #[test]
    fn test_malformed_forcing_profile_is_fatal() {
        let path = write_forcing_file(
            "isoprof_forcing_nocol.prof",
            "R,ellip\narcsec,unitless\n1.0,0.1\n",
        );
        let err = read_forcing_profile(&path, 1.0, 0.0).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ProfileError::ForcingProfile { .. }));

        let path = write_forcing_file(
            "isoprof_forcing_badnum.prof",
            "R,ellip,pa\narcsec,unitless,deg\n1.0,abc,90.0\n",
        );
        let err = read_forcing_profile(&path, 1.0, 0.0).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ProfileError::ForcingProfile { .. }));

        let err = read_forcing_profile(Path::new("/nonexistent/isoprof.prof"), 1.0, 0.0)
            .unwrap_err();
        assert!(matches!(err, ProfileError::FileError { .. }));
    }

    #[test]
    fn test_forced_extraction_without_geometry_errors() {
        // Absent ellip_e/pa_e columns must contribute zero geometry
        // uncertainty: the table's uncertainty equals a photometric-only
        // Monte Carlo run with the same seed
        let img = exponential_disk(64, 80.0, 5.0);
        let input = disk_input(&img);
        let config = ProfileConfig {
            flux_units: FluxUnits::Intensity,
            rng_seed: 99,
            ..ProfileConfig::default()
        };
        let mut contents = String::from("# header\nR,ellip,pa\narcsec,unitless,deg\n");
        for r in [1.0, 2.0, 3.0, 4.5, 6.0, 8.0, 10.0, 13.0] {
            contents.push_str(&format!("{r},0.0,90.0\n"));
        }
        let path = write_forcing_file("isoprof_forcing_zero_geom.prof", &contents);
        let table = extract_forced(&input, &path, &config).unwrap();
        fs::remove_file(&path).ok();

        let ellip_e = table.column("ellip_e").unwrap();
        assert!(ellip_e.iter().all(|&v| v == 0.0));
        let pa_e = table.column("pa_e").unwrap();
        assert!(pa_e.iter().all(|&v| v == 0.0));

        let r_arcsec = table.column("R").unwrap();
        let intensity = table.column("I").unwrap();
        let intensity_e = table.column("I_e").unwrap();
        let q = vec![1.0; r_arcsec.len()];
        let qe = vec![0.0; r_arcsec.len()];
        let mut rng = cog::trial_rng(99);
        let reference = cog::fluxsum_with_errors(
            r_arcsec,
            intensity,
            intensity_e,
            &q,
            &qe,
            config.cog_trials,
            &mut rng,
        )
        .unwrap();
        let expected_err = reference.symmetric_err();
        let table_err = table.column("totflux_e").unwrap();
        for i in 0..r_arcsec.len() {
            assert_relative_eq!(table_err[i], expected_err[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_masked_pixels_are_dropped_not_zeroed() {
        let img = exponential_disk(64, 50.0, 6.0);
        let mut mask = Array2::from_elem((64, 64), false);
        for y in 0..64 {
            for x in 44..52 {
                mask[[y, x]] = true;
            }
        }
        let mut input = disk_input(&img);
        input.mask = Some(&mask);
        let radii = [3.0, 4.0, 5.0, 6.5, 8.0, 10.0, 14.0];
        let table =
            extract_profile(&input, &circular_track(&radii), &ProfileConfig::default()).unwrap();
        let pixels = table.column("pixels").unwrap();
        // The outer contours cross the masked stripe and lose samples
        let r_last = radii[radii.len() - 1];
        assert!((pixels[radii.len() - 1] as usize) < isophote::sample_count(r_last));
        // Dropping (rather than zeroing) keeps the brightness unbiased
        let sb = table.column("SB").unwrap();
        assert!(sb.iter().all(|&v| v < SENTINEL_MAG));
    }
}
