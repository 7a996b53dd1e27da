//! Route complexity scoring.
//!
//! Routes with many turns need denser comparison sampling: skipping points on a
//! switchback can make a shared corner look divergent. The score produced here feeds
//! the comparator's sampling-stride decision.

use crate::geo_utils::{bearing, haversine_distance};
use crate::TrackPoint;

/// Maximum number of points inspected per track.
const COMPLEXITY_SAMPLE_POINTS: usize = 50;

/// Average turn (degrees) that maps to a score of 1.0.
const TURN_SCALE_DEGREES: f64 = 45.0;

/// Upper bound of the score.
const MAX_COMPLEXITY: f64 = 2.0;

/// Score how twisty a track is, in `[0, 2]`.
///
/// Takes up to 50 evenly spaced points, measures the absolute change of bearing at each
/// interior point (wrapped to at most 180°), averages it, and divides by 45°. A straight
/// line scores 0; a track that turns on average 90° or more per sample scores 2.
///
/// Triples with a zero-length leg or an invalid point carry no heading information and
/// count as a zero turn, so mostly-degenerate tracks score low.
///
/// # Example
/// ```
/// use route_divergence::{complexity, TrackPoint};
///
/// let straight: Vec<TrackPoint> = (0..10)
///     .map(|i| TrackPoint::new(51.5, -0.1 + i as f64 * 0.001))
///     .collect();
/// assert!(complexity(&straight) < 0.01);
/// ```
pub fn complexity(points: &[TrackPoint]) -> f64 {
    let sampled = sample_evenly(points, COMPLEXITY_SAMPLE_POINTS);
    if sampled.len() < 3 {
        return 0.0;
    }

    let triples = sampled.len() - 2;
    let mut total_turn = 0.0;

    for w in sampled.windows(3) {
        let (a, b, c) = (w[0], w[1], w[2]);
        if !(a.is_valid() && b.is_valid() && c.is_valid()) {
            continue;
        }
        if haversine_distance(a, b) == 0.0 || haversine_distance(b, c) == 0.0 {
            continue;
        }

        let mut delta = (bearing(b, c) - bearing(a, b)).abs();
        if delta > 180.0 {
            delta = 360.0 - delta;
        }
        total_turn += delta;
    }

    let average_turn = total_turn / triples as f64;
    (average_turn / TURN_SCALE_DEGREES).min(MAX_COMPLEXITY)
}

/// Pick at most `max` points spread evenly over the track, always keeping both ends.
fn sample_evenly(points: &[TrackPoint], max: usize) -> Vec<&TrackPoint> {
    if points.len() <= max {
        return points.iter().collect();
    }

    let step = (points.len() - 1) as f64 / (max - 1) as f64;
    (0..max)
        .map(|i| &points[((i as f64 * step).round() as usize).min(points.len() - 1)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_tracks_score_zero() {
        assert_eq!(complexity(&[]), 0.0);
        assert_eq!(complexity(&[TrackPoint::new(0.0, 0.0)]), 0.0);
        assert_eq!(
            complexity(&[TrackPoint::new(0.0, 0.0), TrackPoint::new(0.0, 0.001)]),
            0.0
        );
    }

    #[test]
    fn test_straight_line_scores_zero() {
        let straight: Vec<TrackPoint> = (0..200)
            .map(|i| TrackPoint::new(0.0, i as f64 * 0.0001))
            .collect();
        assert!(complexity(&straight) < 1e-6);
    }

    #[test]
    fn test_right_angle_zigzag() {
        // Alternating east / north legs: every turn is 90 degrees
        let mut zigzag = vec![TrackPoint::new(0.0, 0.0)];
        for i in 0..10 {
            let last = *zigzag.last().unwrap();
            let next = if i % 2 == 0 {
                TrackPoint::new(last.latitude, last.longitude + 0.001)
            } else {
                TrackPoint::new(last.latitude + 0.001, last.longitude)
            };
            zigzag.push(next);
        }
        let score = complexity(&zigzag);
        assert!((score - 2.0).abs() < 0.01, "score {}", score);
    }

    #[test]
    fn test_score_is_capped() {
        // Out-and-back every sample: 180 degree turns
        let points: Vec<TrackPoint> = (0..20)
            .map(|i| TrackPoint::new(0.0, if i % 2 == 0 { 0.0 } else { 0.001 }))
            .collect();
        assert_eq!(complexity(&points), MAX_COMPLEXITY);
    }

    #[test]
    fn test_gentle_curve_is_moderate() {
        // Quarter circle in 30 steps: 3 degrees per turn
        let points: Vec<TrackPoint> = (0..=30)
            .map(|i| {
                let angle = (i as f64 * 3.0).to_radians();
                TrackPoint::new(0.01 * angle.sin(), 0.01 * angle.cos())
            })
            .collect();
        let score = complexity(&points);
        assert!(score > 0.0 && score < 0.2, "score {}", score);
    }

    #[test]
    fn test_duplicate_points_do_not_count_as_turns() {
        let points = vec![
            TrackPoint::new(0.0, 0.0),
            TrackPoint::new(0.0, 0.001),
            TrackPoint::new(0.0, 0.001),
            TrackPoint::new(0.0, 0.002),
        ];
        assert!(complexity(&points) < 1e-6);
    }

    #[test]
    fn test_degenerate_triples_count_as_straight() {
        // One genuine right angle, then a long stop at the same spot
        let mut points = vec![
            TrackPoint::new(0.0, 0.0),
            TrackPoint::new(0.0, 0.001),
            TrackPoint::new(0.001, 0.001),
        ];
        points.extend(std::iter::repeat(TrackPoint::new(0.001, 0.001)).take(7));
        // 8 triples, one turning 90 degrees
        let score = complexity(&points);
        assert!((score - 90.0 / 8.0 / TURN_SCALE_DEGREES).abs() < 0.01, "score {}", score);

        let mut with_gap = points.clone();
        with_gap[5] = TrackPoint::new(f64::NAN, 0.0);
        assert!(complexity(&with_gap) < 0.3);
    }

    #[test]
    fn test_sample_evenly_keeps_ends() {
        let points: Vec<TrackPoint> = (0..1000)
            .map(|i| TrackPoint::new(0.0, i as f64 * 0.0001))
            .collect();
        let sampled = sample_evenly(&points, 50);
        assert_eq!(sampled.len(), 50);
        assert_eq!(sampled[0], &points[0]);
        assert_eq!(sampled[49], &points[999]);
    }
}
