//! Uniform-spacing resampling.
//!
//! Raw GPS logs have irregular point density: a watch may record every second when
//! moving fast and much less often when stopped. Comparing two tracks by raw index would
//! bias results toward whichever track samples an area more densely, so both tracks are
//! first redrawn at a fixed spacing.

use crate::geo_utils::haversine_distance;
use crate::TrackPoint;

/// Upper bound on points inserted into one original segment.
const MAX_STEPS_PER_SEGMENT: usize = 100_000;

/// Resample a track so consecutive points are roughly `target_spacing_meters` apart.
///
/// Each original segment is split into `round(length / spacing)` equal steps (at least
/// one, at most 100,000). Intermediate points are linear interpolations of latitude, longitude and
/// elevation and carry no timestamp; segment end points are the original points.
/// Zero-length segments are skipped, so repeated fixes never produce duplicates.
///
/// Tracks with fewer than two points, and non-positive spacings, are returned unchanged.
///
/// # Example
/// ```
/// use route_divergence::{resample, TrackPoint};
///
/// // Two points ~111 m apart
/// let track = vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(0.001, 0.0)];
/// let resampled = resample(&track, 10.0);
///
/// assert_eq!(resampled.len(), 12);
/// assert_eq!(resampled[0], track[0]);
/// assert_eq!(resampled[11], track[1]);
/// ```
pub fn resample(points: &[TrackPoint], target_spacing_meters: f64) -> Vec<TrackPoint> {
    if points.len() < 2 || !target_spacing_meters.is_finite() || target_spacing_meters <= 0.0 {
        return points.to_vec();
    }

    let mut resampled: Vec<TrackPoint> = Vec::with_capacity(points.len());
    resampled.push(points[0]);

    for w in points.windows(2) {
        let (start, end) = (&w[0], &w[1]);
        let seg_dist = haversine_distance(start, end);

        // Zero-length (or unmeasurable) segment: nothing to emit
        if !(seg_dist > 0.0) {
            continue;
        }

        let steps = (seg_dist / target_spacing_meters)
            .round()
            .clamp(1.0, MAX_STEPS_PER_SEGMENT as f64) as usize;
        for step in 1..steps {
            let fraction = step as f64 / steps as f64;
            resampled.push(interpolate(start, end, fraction));
        }
        resampled.push(*end);
    }

    resampled
}

/// Linear interpolation between two points. The result has no timestamp.
fn interpolate(start: &TrackPoint, end: &TrackPoint, fraction: f64) -> TrackPoint {
    TrackPoint::new(
        start.latitude + fraction * (end.latitude - start.latitude),
        start.longitude + fraction * (end.longitude - start.longitude),
    )
    .with_elevation(start.elevation + fraction * (end.elevation - start.elevation))
}
