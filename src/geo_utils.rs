//! # Geographic Utilities
//!
//! Geodesy kernel shared by every stage of the comparison pipeline.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`bearing`] | Initial compass bearing from one point to another |
//! | [`destination`] | Point reached by travelling along a bearing |
//! | [`polyline_length`] | Total length of a GPS track in meters |
//! | [`compute_bounds`] | Bounding box of a GPS track |
//!
//! ## Example
//!
//! ```rust
//! use route_divergence::{TrackPoint, geo_utils};
//!
//! let track = vec![
//!     TrackPoint::new(51.5074, -0.1278),  // London
//!     TrackPoint::new(51.5080, -0.1290),
//!     TrackPoint::new(51.5090, -0.1300),
//! ];
//!
//! let length = geo_utils::polyline_length(&track);
//! println!("Track length: {:.0}m", length);
//!
//! let heading = geo_utils::bearing(&track[0], &track[2]);
//! assert!((0.0..360.0).contains(&heading));
//! ```
//!
//! ## Algorithm Notes
//!
//! All functions treat the Earth as a sphere of radius 6,371 km and expect WGS84
//! latitude/longitude in degrees. The haversine term is clamped to `[0, 1]` before the
//! square root so that rounding at coincident or antipodal points cannot produce NaN.
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)

use geo::{Bearing, Haversine, Point};

use crate::{Bounds, TrackPoint};

/// Mean Earth radius used by every distance in this crate.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface.
///
/// # Example
///
/// ```rust
/// use route_divergence::{TrackPoint, geo_utils};
///
/// let london = TrackPoint::new(51.5074, -0.1278);
/// let paris = TrackPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlng = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_METERS * c
}

/// Initial compass bearing from `p1` to `p2`, in degrees within `[0, 360)`.
///
/// North is 0°, east is 90°. Coincident points have bearing 0.
#[inline]
pub fn bearing(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    let origin = Point::new(p1.longitude, p1.latitude);
    let target = Point::new(p2.longitude, p2.latitude);
    let degrees = Haversine::bearing(origin, target).rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if degrees >= 360.0 {
        0.0
    } else {
        degrees
    }
}

/// Project `point` forward along `bearing_degrees` for `distance_meters`.
///
/// Elevation is carried over; the result has no timestamp.
///
/// # Example
///
/// ```rust
/// use route_divergence::{TrackPoint, geo_utils};
///
/// let start = TrackPoint::new(0.0, 0.0);
/// let north = geo_utils::destination(&start, 0.0, 1000.0);
/// assert!((geo_utils::haversine_distance(&start, &north) - 1000.0).abs() < 0.01);
/// assert!(north.latitude > 0.0);
/// ```
pub fn destination(point: &TrackPoint, bearing_degrees: f64, distance_meters: f64) -> TrackPoint {
    let lat1 = point.latitude.to_radians();
    let lng1 = point.longitude.to_radians();
    let theta = bearing_degrees.to_radians();
    let delta = distance_meters / EARTH_RADIUS_METERS;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos())
        .clamp(-1.0, 1.0)
        .asin();
    let lng2 = lng1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    // Normalise longitude to [-180, 180)
    let lng2 = (lng2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;

    TrackPoint::new(lat2.to_degrees(), lng2).with_elevation(point.elevation)
}

/// Calculate the total length of a polyline (GPS track) in meters.
///
/// Sums the haversine distance between consecutive points. Empty or single-point
/// tracks return 0.0.
pub fn polyline_length(points: &[TrackPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a GPS track.
///
/// Points failing [`TrackPoint::is_valid`] are ignored. Returns `None` when no valid
/// point remains.
///
/// # Example
///
/// ```rust
/// use route_divergence::{TrackPoint, geo_utils};
///
/// let track = vec![
///     TrackPoint::new(51.5000, -0.1300),
///     TrackPoint::new(51.5100, -0.1200),
///     TrackPoint::new(51.5050, -0.1250),
/// ];
///
/// let bounds = geo_utils::compute_bounds(&track).unwrap();
/// assert_eq!(bounds.min_lat, 51.5000);
/// assert_eq!(bounds.max_lat, 51.5100);
/// assert_eq!(bounds.min_lng, -0.1300);
/// assert_eq!(bounds.max_lng, -0.1200);
/// ```
pub fn compute_bounds(points: &[TrackPoint]) -> Option<Bounds> {
    let mut valid = points.iter().filter(|p| p.is_valid()).peekable();
    valid.peek()?;

    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in valid {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Some(Bounds { min_lat, max_lat, min_lng, max_lng })
}

// =============================================================================
// Unit Tests
// =============================================================================
