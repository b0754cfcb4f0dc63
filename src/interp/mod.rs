//! Sub-pixel image interpolation
//!
//! Flux lookups at non-integer pixel coordinates, used when sampling
//! elliptical contours and refining point-source centers. Coordinates past
//! the image boundary clamp to the nearest edge pixel; running off the edge
//! is an expected degradation at the outskirts of a profile, never an error.

use ndarray::Array2;

/// Catmull-Rom cubic convolution kernel.
///
/// W(x) = (a+2)|x|^3 - (a+3)|x|^2 + 1       for |x| <= 1
/// W(x) = a|x|^3 - 5a|x|^2 + 8a|x| - 4a     for 1 < |x| < 2
/// W(x) = 0                                  otherwise
///
/// with a = -0.5.
#[inline]
fn cubic_kernel(x: f64) -> f64 {
    const A: f64 = -0.5;

    let ax = x.abs();
    if ax <= 1.0 {
        ((A + 2.0) * ax - (A + 3.0)) * ax * ax + 1.0
    } else if ax < 2.0 {
        ((A * ax - 5.0 * A) * ax + 8.0 * A) * ax - 4.0 * A
    } else {
        0.0
    }
}

/// Pixel lookup with coordinates clamped to the image bounds.
#[inline]
fn sample_clamped(image: &Array2<f64>, x: i64, y: i64) -> f64 {
    let (ny, nx) = image.dim();
    let xi = x.clamp(0, nx as i64 - 1) as usize;
    let yi = y.clamp(0, ny as i64 - 1) as usize;
    image[[yi, xi]]
}

/// Bicubic interpolation of the image at fractional coordinates (x, y).
///
/// Separable Catmull-Rom convolution over the 4x4 neighborhood. Exact at
/// integer coordinates and for locally linear flux fields.
pub fn bicubic(image: &Array2<f64>, x: f64, y: f64) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let xi = x0 as i64;
    let yi = y0 as i64;

    let wx = [
        cubic_kernel(fx + 1.0),
        cubic_kernel(fx),
        cubic_kernel(fx - 1.0),
        cubic_kernel(fx - 2.0),
    ];
    let wy = [
        cubic_kernel(fy + 1.0),
        cubic_kernel(fy),
        cubic_kernel(fy - 1.0),
        cubic_kernel(fy - 2.0),
    ];

    let mut sum = 0.0;
    for (j, &wyj) in wy.iter().enumerate() {
        let py = yi - 1 + j as i64;
        for (i, &wxi) in wx.iter().enumerate() {
            let px = xi - 1 + i as i64;
            sum += sample_clamped(image, px, py) * wxi * wyj;
        }
    }
    sum
}

/// Nearest-pixel lookup at fractional coordinates (x, y), clamped to bounds.
pub fn nearest(image: &Array2<f64>, x: f64, y: f64) -> f64 {
    sample_clamped(image, x.round() as i64, y.round() as i64)
}
