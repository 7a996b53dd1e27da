//! Error types for track comparison.
//!
//! Only invalid input is ever surfaced to the caller. Everything else that can go
//! wrong inside the pipeline (a spatial index that cannot be built, a cache file that
//! cannot be read, a zero-length track segment) has a defined fallback and is absorbed.

use thiserror::Error;

/// Errors returned by the comparison pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompareError {
    /// A track has no points.
    #[error("Track '{track}' contains no points")]
    EmptyTrack { track: String },

    /// A track has points, but none with usable coordinates.
    #[error("Track '{track}' has no points with valid coordinates")]
    NoValidPoints { track: String },

    /// A tunable parameter is out of range.
    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Result type alias for comparison operations.
pub type Result<T> = std::result::Result<T, CompareError>;

impl CompareError {
    /// Create an empty track error.
    #[must_use]
    pub fn empty_track(track: impl Into<String>) -> Self {
        Self::EmptyTrack { track: track.into() }
    }

    /// True for errors caused by the caller's input (currently all of them).
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::EmptyTrack { .. } | Self::NoValidPoints { .. } | Self::InvalidParameter { .. }
        )
    }
}

/// Why a spatial index could not be built.
#[derive(Error, Debug, Clone, PartialEq)]
pub(crate) enum IndexBuildError {
    #[error("no points to index")]
    Empty,

    #[error("point {index} has invalid coordinates ({latitude}, {longitude})")]
    InvalidPoint {
        index: usize,
        latitude: f64,
        longitude: f64,
    },
}
