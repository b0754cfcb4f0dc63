//! Shared numeric constants for profile extraction and photometry.

/// Degrees per radian
pub const RAD2DEG: f64 = 180.0 / std::f64::consts::PI;

/// Radians per degree
pub const DEG2RAD: f64 = std::f64::consts::PI / 180.0;

/// Sentinel flagging an undefined measurement in magnitude units
pub const SENTINEL_MAG: f64 = 99.999;

/// Sentinel flagging an undefined measurement in intensity units
pub const SENTINEL_INTENSITY: f64 = -99.999;

/// Two-sided probability of a Gaussian draw falling outside +-1 sigma
pub const P_OUTSIDE_1SIGMA: f64 = 0.317310507863;
