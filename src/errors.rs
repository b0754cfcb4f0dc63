//! Error types for profile extraction

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for isophotal profile extraction
#[derive(Error, Debug)]
pub enum ProfileError {
    /// Ellipse geometry that cannot be sampled (ellipticity outside [0, 1)
    /// or a negative semi-major axis). Rejected before any sampling.
    #[error("Degenerate ellipse geometry: sma={sma}, ellipticity={eps}")]
    DegenerateGeometry { sma: f64, eps: f64 },

    /// A forced-photometry geometry table that cannot be parsed. The run
    /// cannot proceed without a valid geometry track, so this is fatal.
    #[error("Malformed forcing profile {path:?}: {reason}")]
    ForcingProfile { path: PathBuf, reason: String },

    /// A configuration value outside its documented range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A geometry track with no rows
    #[error("Geometry track is empty")]
    EmptyTrack,

    /// Error when a file I/O operation fails
    #[error("File I/O error on {path:?}: {source}")]
    FileError {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for profile extraction operations
pub type Result<T> = std::result::Result<T, ProfileError>;

/// Convert a std::io::Error to ProfileError with path context
pub fn io_err(path: impl Into<PathBuf>, err: std::io::Error) -> ProfileError {
    ProfileError::FileError {
        path: path.into(),
        source: err,
    }
}
