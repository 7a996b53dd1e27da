//! # Comparison Engine
//!
//! Composes the pipeline behind one call:
//!
//! 1. Validate parameters and both tracks
//! 2. Return a cached result if one is fresh
//! 3. Resample both tracks in parallel (barrier)
//! 4. Measure nearest-route distances for track A (barrier)
//! 5. Segment both tracks from the same samples
//! 6. Place direction arrows, compute padded bounds and statistics
//! 7. Store and return the result
//!
//! The computation either returns a complete [`ComparisonResult`] or fails before any
//! work starts; nothing partial is ever cached or returned.

use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, ResultCache};
use crate::comparator::{compare_distances, DistanceSample};
use crate::geo_utils::{bearing, compute_bounds, haversine_distance, polyline_length};
use crate::parallel::Executor;
use crate::resample::resample;
use crate::segments::{segment, Segment, SegmentRole};
use crate::{Bounds, CompareConfig, CompareError, Result, Track, TrackPoint};

/// Path distance between consecutive direction arrows.
const ARROW_INTERVAL_METERS: f64 = 500.0;

/// Fraction of the combined extent added on every side of the bounds.
const BOUNDS_PADDING_RATIO: f64 = 0.1;

/// Smallest padding (degrees, ~11 m) so a degenerate box stays renderable.
const MIN_BOUNDS_PADDING_DEG: f64 = 0.0001;

// ============================================================================
// Result Types
// ============================================================================

/// Heading marker placed along a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionArrow {
    pub latitude: f64,
    pub longitude: f64,
    /// Compass bearing in degrees, `[0, 360)`
    pub bearing: f64,
}

/// Everything needed to draw one of the two tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackComparison {
    pub name: String,
    /// Resampled points (what the segments index into)
    pub points: Vec<TrackPoint>,
    /// Points as supplied, minus any with invalid coordinates
    pub original_points: Vec<TrackPoint>,
    pub segments: Vec<Segment>,
    pub arrows: Vec<DirectionArrow>,
    /// Length of the resampled track in meters
    pub length_meters: f64,
}

/// Summary numbers for a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonStatistics {
    /// Share of samples within the threshold, rounded to 2 decimals (0 with no samples)
    pub similarity_percentage: f64,
    pub total_samples: usize,
    pub divergent_samples: usize,
    pub common_samples: usize,
    pub primary_segment_count: usize,
    pub secondary_segment_count: usize,
    pub primary_divergent_segments: usize,
    pub secondary_divergent_segments: usize,
    /// Path length of track A's divergent segments
    pub primary_divergent_meters: f64,
    /// Path length of track B's divergent segments
    pub secondary_divergent_meters: f64,
}

/// Complete, self-describing output of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub track_a: TrackComparison,
    pub track_b: TrackComparison,
    /// Union of both resampled tracks, padded by 10% per axis
    pub bounds: Option<Bounds>,
    pub distance_samples: Vec<DistanceSample>,
    /// Samples with `exceeds_threshold`
    pub divergent_samples: Vec<DistanceSample>,
    pub statistics: ComparisonStatistics,
    pub interpolation_distance: f64,
    pub difference_threshold: f64,
}

// ============================================================================
// Engine
// ============================================================================

/// Runs comparisons, optionally memoized in a [`ResultCache`].
///
/// # Example
/// ```
/// use std::time::Duration;
/// use route_divergence::{ComparisonEngine, CompareConfig, ResultCache, Track, TrackPoint};
///
/// let engine = ComparisonEngine::new(Some(ResultCache::in_memory(Duration::from_secs(60))));
///
/// let a: Vec<TrackPoint> = (0..5).map(|i| TrackPoint::new(0.0, i as f64 * 0.0001)).collect();
/// let b: Vec<TrackPoint> = a.iter().map(|p| TrackPoint::new(p.latitude + 0.01, p.longitude)).collect();
///
/// let result = engine
///     .compare(&Track::new("a", a), &Track::new("b", b), &CompareConfig::default())
///     .unwrap();
/// assert_eq!(result.statistics.similarity_percentage, 0.0);
/// assert_eq!(engine.cache().unwrap().len(), 1);
/// ```
#[derive(Debug)]
pub struct ComparisonEngine {
    cache: Option<ResultCache>,
    executor: Executor,
}

impl ComparisonEngine {
    /// Engine on the shared default [`Executor`] (rayon's global pool).
    pub fn new(cache: Option<ResultCache>) -> Self {
        Self::with_executor(cache, Executor::default())
    }

    pub fn with_executor(cache: Option<ResultCache>, executor: Executor) -> Self {
        Self { cache, executor }
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Compare `track_a` (primary) against `track_b` (secondary).
    ///
    /// Fails only on invalid input: an out-of-range parameter, or a track without any
    /// point with valid coordinates.
    pub fn compare(
        &self,
        track_a: &Track,
        track_b: &Track,
        config: &CompareConfig,
    ) -> Result<ComparisonResult> {
        let start = Instant::now();
        config.validate()?;

        let original_a = usable_points(track_a, "A")?;
        let original_b = usable_points(track_b, "B")?;

        let key = self
            .cache
            .as_ref()
            .map(|_| CacheKey::for_request(&original_a, &original_b, config));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(mut hit) = cache.get(key) {
                // Names are not part of the key
                hit.track_a.name = track_a.name.clone();
                hit.track_b.name = track_b.name.clone();
                info!("[ComparisonEngine] Cache hit {} in {:?}", key, start.elapsed());
                return Ok(hit);
            }
            debug!("[ComparisonEngine] Cache miss {}", key);
        }

        info!(
            "[ComparisonEngine] Comparing '{}' ({} points) with '{}' ({} points)",
            track_a.name,
            original_a.len(),
            track_b.name,
            original_b.len()
        );

        let spacing = config.interpolation_distance;
        let threshold = config.difference_threshold;

        let (resampled_a, resampled_b) = self.executor.join(
            || resample(&original_a, spacing),
            || resample(&original_b, spacing),
        );
        debug!(
            "[ComparisonEngine] Resampled to {} / {} points at {}m",
            resampled_a.len(),
            resampled_b.len(),
            spacing
        );

        let distance_samples = compare_distances(&resampled_a, &resampled_b, threshold, &self.executor);
        let divergent_samples: Vec<DistanceSample> = distance_samples
            .iter()
            .filter(|s| s.exceeds_threshold)
            .copied()
            .collect();

        let segments_a = segment(&resampled_a, &distance_samples, threshold, SegmentRole::Primary);
        let segments_b = segment(&resampled_b, &distance_samples, threshold, SegmentRole::Secondary);

        let bounds = match (compute_bounds(&resampled_a), compute_bounds(&resampled_b)) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        }
        .map(|b| b.padded(BOUNDS_PADDING_RATIO, MIN_BOUNDS_PADDING_DEG));

        let statistics = compute_statistics(&distance_samples, divergent_samples.len(), &segments_a, &segments_b);

        let result = ComparisonResult {
            track_a: track_comparison(&track_a.name, resampled_a, original_a, segments_a),
            track_b: track_comparison(&track_b.name, resampled_b, original_b, segments_b),
            bounds,
            distance_samples,
            divergent_samples,
            statistics,
            interpolation_distance: spacing,
            difference_threshold: threshold,
        };

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            cache.put(key, &result);
        }

        info!(
            "[ComparisonEngine] {:.2}% similar, {} / {} segments in {:?}",
            result.statistics.similarity_percentage,
            result.statistics.primary_segment_count,
            result.statistics.secondary_segment_count,
            start.elapsed()
        );

        Ok(result)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Points with valid coordinates and a finite elevation, or an input error if there
/// are none.
fn usable_points(track: &Track, fallback_label: &str) -> Result<Vec<TrackPoint>> {
    let label = if track.name.is_empty() {
        format!("track {}", fallback_label)
    } else {
        track.name.clone()
    };

    if track.is_empty() {
        return Err(CompareError::empty_track(label));
    }

    // Unknown elevation reads as 0, like an absent one
    let points: Vec<TrackPoint> = track
        .points
        .iter()
        .filter(|p| p.is_valid())
        .map(|p| {
            if p.elevation.is_finite() {
                *p
            } else {
                p.with_elevation(0.0)
            }
        })
        .collect();
    if points.is_empty() {
        return Err(CompareError::NoValidPoints { track: label });
    }
    if points.len() < track.len() {
        debug!(
            "[ComparisonEngine] Dropped {} invalid points from '{}'",
            track.len() - points.len(),
            label
        );
    }
    Ok(points)
}

fn track_comparison(
    name: &str,
    points: Vec<TrackPoint>,
    original_points: Vec<TrackPoint>,
    segments: Vec<Segment>,
) -> TrackComparison {
    TrackComparison {
        name: name.to_string(),
        arrows: direction_arrows(&points, ARROW_INTERVAL_METERS),
        length_meters: polyline_length(&points),
        points,
        original_points,
        segments,
    }
}

/// One arrow each time the path passes another `interval_meters`, placed at the point
/// that crosses the mark and pointing along the leg that reached it.
///
/// Legs touching an invalid point, and zero-length legs, are skipped.
fn direction_arrows(points: &[TrackPoint], interval_meters: f64) -> Vec<DirectionArrow> {
    let mut arrows = Vec::new();
    let mut travelled = 0.0;
    let mut next_mark = interval_meters;

    for w in points.windows(2) {
        let (from, to) = (&w[0], &w[1]);
        if !(from.is_valid() && to.is_valid()) {
            continue;
        }
        let leg = haversine_distance(from, to);
        if leg <= 0.0 {
            continue;
        }

        travelled += leg;
        if travelled >= next_mark {
            arrows.push(DirectionArrow {
                latitude: to.latitude,
                longitude: to.longitude,
                bearing: bearing(from, to),
            });
            while next_mark <= travelled {
                next_mark += interval_meters;
            }
        }
    }

    arrows
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn compute_statistics(
    samples: &[DistanceSample],
    divergent: usize,
    segments_a: &[Segment],
    segments_b: &[Segment],
) -> ComparisonStatistics {
    let total = samples.len();
    let similarity_percentage = if total == 0 {
        0.0
    } else {
        round2((1.0 - divergent as f64 / total as f64) * 100.0)
    };

    let divergent_meters = |segments: &[Segment]| -> f64 {
        segments
            .iter()
            .filter(|s| s.is_divergent)
            .map(Segment::length_meters)
            .sum()
    };

    ComparisonStatistics {
        similarity_percentage,
        total_samples: total,
        divergent_samples: divergent,
        common_samples: total - divergent,
        primary_segment_count: segments_a.len(),
        secondary_segment_count: segments_b.len(),
        primary_divergent_segments: segments_a.iter().filter(|s| s.is_divergent).count(),
        secondary_divergent_segments: segments_b.iter().filter(|s| s.is_divergent).count(),
        primary_divergent_meters: divergent_meters(segments_a),
        secondary_divergent_meters: divergent_meters(segments_b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn straight(n: usize, lat: f64, step_deg: f64) -> Vec<TrackPoint> {
        (0..n)
            .map(|i| TrackPoint::new(lat, 12.5 + i as f64 * step_deg))
            .collect()
    }

    fn engine() -> ComparisonEngine {
        ComparisonEngine::with_executor(None, Executor::with_threads(2))
    }

    #[test]
    fn test_identical_tracks_fully_similar() {
        let points = straight(30, 55.0, 0.0005);
        let a = Track::new("a", points.clone());
        let b = Track::new("b", points);
        let result = engine().compare(&a, &b, &CompareConfig::default()).unwrap();

        assert_eq!(result.statistics.similarity_percentage, 100.0);
        assert!(result.divergent_samples.is_empty());
        assert!(result.track_a.segments.iter().all(|s| !s.is_divergent));
        assert!(result.track_b.segments.iter().all(|s| !s.is_divergent));
        assert_eq!(result.statistics.primary_segment_count, 1);
        assert_eq!(result.statistics.primary_divergent_meters, 0.0);
    }

    #[test]
    fn test_diverging_branch() {
        // B shares the first ~300m of A, then turns north
        let a = straight(11, 0.0, 0.0009);
        let mut b = straight(4, 0.0, 0.0009);
        for i in 1..=7 {
            b.push(TrackPoint::new(i as f64 * 0.0009, 3.0 * 0.0009 + 12.5));
        }
        let result = engine()
            .compare(&Track::new("a", a), &Track::new("b", b), &CompareConfig::default())
            .unwrap();

        let sa = &result.track_a.segments;
        assert_eq!(sa.len(), 2);
        assert!(!sa[0].is_divergent);
        assert!(sa[1].is_divergent);

        let sb = &result.track_b.segments;
        assert_eq!(sb.len(), 2);
        assert!(!sb[0].is_divergent);
        assert!(sb[1].is_divergent);

        let stats = &result.statistics;
        assert!(stats.similarity_percentage > 20.0 && stats.similarity_percentage < 60.0);
        assert_eq!(stats.divergent_samples + stats.common_samples, stats.total_samples);
        assert!(stats.primary_divergent_meters > 400.0);
    }

    #[test]
    fn test_empty_track_rejected() {
        let a = Track::new("morning", vec![]);
        let b = Track::new("evening", straight(3, 0.0, 0.001));
        let err = engine().compare(&a, &b, &CompareConfig::default()).unwrap_err();
        assert_eq!(err, CompareError::empty_track("morning"));

        let err = engine().compare(&b, &Track::new("", vec![]), &CompareConfig::default()).unwrap_err();
        assert_eq!(err, CompareError::empty_track("track B"));
    }

    #[test]
    fn test_invalid_only_track_rejected() {
        let a = Track::new("bad", vec![TrackPoint::new(f64::NAN, 0.0)]);
        let b = Track::new("good", straight(3, 0.0, 0.001));
        let err = engine().compare(&a, &b, &CompareConfig::default()).unwrap_err();
        assert!(matches!(err, CompareError::NoValidPoints { .. }));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let a = Track::new("a", straight(3, 0.0, 0.001));
        let err = engine().compare(&a, &a, &CompareConfig::new(0.0, 40.0)).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_invalid_points_dropped() {
        let mut points = straight(10, 0.0, 0.0005);
        points.insert(4, TrackPoint::new(f64::NAN, f64::INFINITY));
        let a = Track::new("a", points);
        let b = Track::new("b", straight(10, 0.0, 0.0005));
        let result = engine().compare(&a, &b, &CompareConfig::default()).unwrap();
        assert_eq!(result.track_a.original_points.len(), 10);
        assert_eq!(result.statistics.similarity_percentage, 100.0);
        assert!(serde_json::to_string(&result).is_ok());
    }

    fn all_finite(result: &ComparisonResult) -> bool {
        let point_ok = |p: &TrackPoint| {
            p.latitude.is_finite() && p.longitude.is_finite() && p.elevation.is_finite()
        };
        [&result.track_a, &result.track_b].iter().all(|t| {
            t.points.iter().all(point_ok)
                && t.original_points.iter().all(point_ok)
                && t.segments.iter().all(|s| s.points.iter().all(|sp| point_ok(&sp.point)))
                && t.length_meters.is_finite()
        }) && result.distance_samples.iter().all(|s| {
            point_ok(&s.source_point) && point_ok(&s.nearest_point) && s.distance_meters.is_finite()
        })
    }

    #[test]
    fn test_non_finite_elevation_reads_as_zero() {
        let mut points = straight(5, 0.0, 0.0001);
        points[0] = points[0].with_elevation(f64::NAN);
        points[1] = points[1].with_elevation(f64::INFINITY);
        points[2] = points[2].with_elevation(12.0);
        let a = Track::new("a", points);
        let b = Track::new("b", straight(5, 0.0, 0.0001));

        let result = engine().compare(&a, &b, &CompareConfig::default()).unwrap();
        assert!(all_finite(&result));
        assert_eq!(result.track_a.original_points[0].elevation, 0.0);
        assert_eq!(result.track_a.original_points[1].elevation, 0.0);
        assert_eq!(result.track_a.original_points[2].elevation, 12.0);

        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("\"elevation\":null"));
        let back: ComparisonResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_default_engines_share_one_pool() {
        let a = Track::new("a", straight(5, 0.0, 0.001));
        for _ in 0..3 {
            let engine = ComparisonEngine::new(None);
            assert!(engine.executor().uses_global_pool());
            engine.compare(&a, &a, &CompareConfig::default()).unwrap();
        }
    }

    #[test]
    fn test_single_point_tracks() {
        let a = Track::new("a", vec![TrackPoint::new(10.0, 10.0)]);
        let b = Track::new("b", vec![TrackPoint::new(10.0, 10.0)]);
        let result = engine().compare(&a, &b, &CompareConfig::default()).unwrap();
        assert_eq!(result.statistics.total_samples, 1);
        assert_eq!(result.statistics.similarity_percentage, 100.0);
        let bounds = result.bounds.unwrap();
        assert!(bounds.max_lat > bounds.min_lat);
    }

    #[test]
    fn test_bounds_cover_both_tracks_with_padding() {
        let a = Track::new("a", straight(5, 0.0, 0.001));
        let b = Track::new("b", straight(5, 0.01, 0.001));
        let result = engine().compare(&a, &b, &CompareConfig::default()).unwrap();
        let bounds = result.bounds.unwrap();
        assert!((bounds.min_lat - (-0.001)).abs() < 1e-9);
        assert!((bounds.max_lat - 0.011).abs() < 1e-9);
        assert!((bounds.min_lng - (12.5 - 0.0004)).abs() < 1e-9);
        assert!((bounds.max_lng - (12.504 + 0.0004)).abs() < 1e-9);
    }

    #[test]
    fn test_result_carries_parameters() {
        let a = Track::new("a", straight(5, 0.0, 0.001));
        let config = CompareConfig::new(5.0, 25.0);
        let result = engine().compare(&a, &a, &config).unwrap();
        assert_eq!(result.interpolation_distance, 5.0);
        assert_eq!(result.difference_threshold, 25.0);
        assert_eq!(result.track_a.name, "a");
        assert_eq!(result.track_a.original_points.len(), 5);
    }

    #[test]
    fn test_cached_result_is_returned() {
        let cache = ResultCache::in_memory(Duration::from_secs(60));
        let engine = ComparisonEngine::with_executor(Some(cache), Executor::sequential());
        let a = Track::new("a", straight(5, 0.0, 0.001));
        let b = Track::new("b", straight(5, 0.0005, 0.001));

        let first = engine.compare(&a, &b, &CompareConfig::default()).unwrap();
        assert_eq!(engine.cache().unwrap().len(), 1);
        let second = engine.compare(&a, &b, &CompareConfig::default()).unwrap();
        assert_eq!(first, second);

        // Different parameters miss
        engine.compare(&a, &b, &CompareConfig::new(10.0, 80.0)).unwrap();
        assert_eq!(engine.cache().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_input_never_cached() {
        let cache = ResultCache::in_memory(Duration::from_secs(60));
        let engine = ComparisonEngine::with_executor(Some(cache), Executor::sequential());
        let a = Track::new("a", vec![]);
        let b = Track::new("b", straight(5, 0.0, 0.001));
        assert!(engine.compare(&a, &b, &CompareConfig::default()).is_err());
        assert!(engine.cache().unwrap().is_empty());
    }

    #[test]
    fn test_direction_arrows_every_interval() {
        // ~2.2km east along the equator in ~11m steps
        let points = straight(201, 0.0, 0.0001);
        let arrows = direction_arrows(&points, 500.0);
        assert_eq!(arrows.len(), 4);
        for arrow in &arrows {
            assert!((arrow.bearing - 90.0).abs() < 0.01);
        }
    }

    #[test]
    fn test_direction_arrows_skip_invalid_legs() {
        let mut points = straight(201, 0.0, 0.0001);
        for p in points.iter_mut().skip(50).take(5) {
            p.latitude = f64::NAN;
        }
        let arrows = direction_arrows(&points, 500.0);
        assert!(arrows.iter().all(|a| a.latitude.is_finite() && a.bearing.is_finite()));
        assert!(direction_arrows(&points[..1], 500.0).is_empty());
    }

    #[test]
    fn test_similarity_rounding_and_zero_samples() {
        let stats = compute_statistics(&[], 0, &[], &[]);
        assert_eq!(stats.similarity_percentage, 0.0);
        assert_eq!(round2(66.666_666), 66.67);
    }
}
