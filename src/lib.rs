//! # Route Divergence
//!
//! High-resolution comparison of two GPS tracks.
//!
//! This library provides:
//! - Uniform resampling of irregular GPS tracks
//! - Nearest-route distances via an R-tree spatial index
//! - Classification of each track into contiguous common / divergent segments
//! - Content-addressed memoization of whole comparisons
//!
//! ## Features
//!
//! - **`parallel`** (default) - Run resampling and nearest-neighbour queries with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use route_divergence::{compare_tracks, CompareConfig, Track, TrackPoint};
//!
//! let morning: Vec<TrackPoint> = (0..20)
//!     .map(|i| TrackPoint::new(51.5074, -0.1278 + i as f64 * 0.0005))
//!     .collect();
//! let evening = morning.clone();
//!
//! let result = compare_tracks(
//!     &Track::new("morning", morning),
//!     &Track::new("evening", evening),
//!     &CompareConfig::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(result.statistics.similarity_percentage, 100.0);
//! assert!(result.track_a.segments.iter().all(|s| !s.is_divergent));
//! ```

use serde::{Deserialize, Serialize};

pub mod cache;
pub mod comparator;
pub mod complexity;
pub mod engine;
pub mod error;
pub mod geo_utils;
pub mod parallel;
pub mod resample;
pub mod segments;

pub use cache::{CacheKey, ResultCache, DEFAULT_CACHE_TTL};
pub use comparator::{compare_distances, sampling_stride, DistanceSample};
pub use complexity::complexity;
pub use engine::{
    ComparisonEngine, ComparisonResult, ComparisonStatistics, DirectionArrow, TrackComparison,
};
pub use error::{CompareError, Result};
pub use parallel::Executor;
pub use resample::resample;
pub use segments::{segment, Segment, SegmentPoint, SegmentRole};

// ============================================================================
// Core Types
// ============================================================================

/// A single GPS sample.
///
/// Elevation defaults to 0 when the source has none. Points produced by
/// interpolation never carry a timestamp.
///
/// # Example
/// ```
/// use route_divergence::TrackPoint;
/// let point = TrackPoint::new(51.5074, -0.1278).with_elevation(35.0);
/// assert!(point.is_valid());
/// assert!(point.timestamp.is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level (0 if absent)
    #[serde(default)]
    pub elevation: f64,
    /// Unix timestamp in seconds
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl TrackPoint {
    /// Create a point with no elevation or timestamp.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: 0.0,
            timestamp: None,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A named, ordered sequence of points. Insertion order is path order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub points: Vec<TrackPoint>,
}

impl Track {
    pub fn new(name: impl Into<String>, points: Vec<TrackPoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Bounding box in degrees.
///
/// Serialized with compass names (`south`, `west`, `north`, `east`) so map clients can
/// fit the view without renaming fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(rename = "south")]
    pub min_lat: f64,
    #[serde(rename = "north")]
    pub max_lat: f64,
    #[serde(rename = "west")]
    pub min_lng: f64,
    #[serde(rename = "east")]
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points. Invalid points are ignored.
    pub fn from_points(points: &[TrackPoint]) -> Option<Self> {
        geo_utils::compute_bounds(points)
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }

    /// Grow each side by `ratio` of the box's extent on that axis.
    ///
    /// Padding is never less than `min_padding` degrees, so a single point or a
    /// perfectly straight meridian still yields a usable viewport.
    pub fn padded(&self, ratio: f64, min_padding: f64) -> Bounds {
        let lat_pad = ((self.max_lat - self.min_lat) * ratio).max(min_padding);
        let lng_pad = ((self.max_lng - self.min_lng) * ratio).max(min_padding);
        Bounds {
            min_lat: (self.min_lat - lat_pad).max(-90.0),
            max_lat: (self.max_lat + lat_pad).min(90.0),
            min_lng: (self.min_lng - lng_pad).max(-180.0),
            max_lng: (self.max_lng + lng_pad).min(180.0),
        }
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> TrackPoint {
        TrackPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Smallest accepted resampling spacing in meters, well below consumer GPS precision.
pub const MIN_INTERPOLATION_DISTANCE: f64 = 0.1;

/// Caller-tunable comparison parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Spacing between resampled points, in meters.
    /// Default: 10.0 meters
    pub interpolation_distance: f64,

    /// Nearest-route distance above which a point counts as divergent, in meters.
    /// Default: 40.0 meters (comfortably above consumer GPS noise)
    pub difference_threshold: f64,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            interpolation_distance: 10.0,
            difference_threshold: 40.0,
        }
    }
}

impl CompareConfig {
    pub fn new(interpolation_distance: f64, difference_threshold: f64) -> Self {
        Self {
            interpolation_distance,
            difference_threshold,
        }
    }

    /// Reject spacings below [`MIN_INTERPOLATION_DISTANCE`] and thresholds that are
    /// negative.
    pub fn validate(&self) -> Result<()> {
        if !self.interpolation_distance.is_finite()
            || self.interpolation_distance < MIN_INTERPOLATION_DISTANCE
        {
            return Err(CompareError::InvalidParameter {
                name: "interpolation_distance",
                value: self.interpolation_distance,
            });
        }
        if !self.difference_threshold.is_finite() || self.difference_threshold < 0.0 {
            return Err(CompareError::InvalidParameter {
                name: "difference_threshold",
                value: self.difference_threshold,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Core Functions
// ============================================================================

/// Compare two tracks without caching, using the default executor.
///
/// See [`ComparisonEngine::compare`] for the full pipeline description.
pub fn compare_tracks(
    track_a: &Track,
    track_b: &Track,
    config: &CompareConfig,
) -> Result<ComparisonResult> {
    ComparisonEngine::new(None).compare(track_a, track_b, config)
}

// ============================================================================
// Tests
// ============================================================================
