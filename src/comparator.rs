//! # Spatial Comparator
//!
//! Measures, for sampled points of track A, the distance to the nearest point anywhere
//! on track B.
//!
//! ## Algorithm
//! 1. Pick a sampling stride for track A from its size, both tracks' complexity and
//!    the threshold ([`sampling_stride`])
//! 2. Index **all** of track B in an R-tree (track B is never subsampled)
//! 3. Query the single nearest neighbour of every sampled A point, in parallel
//!
//! The R-tree stores points as unit vectors on the sphere. Chord length grows
//! monotonically with great-circle distance, so the tree's Euclidean nearest neighbour
//! is also the haversine nearest neighbour. Reported distances are exact haversine
//! meters.
//!
//! If the index cannot be built, a pairwise scan over a subsampled track B is used
//! instead. Both paths produce identical [`DistanceSample`] records.

use log::{debug, warn};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::complexity::complexity;
use crate::error::IndexBuildError;
use crate::geo_utils::haversine_distance;
use crate::parallel::Executor;
use crate::TrackPoint;

/// Tracks shorter than this are always compared at full resolution.
const FULL_RESOLUTION_LIMIT: usize = 1000;

/// Tracks at least this long use the coarsest stride.
const LARGE_TRACK_LIMIT: usize = 5000;

/// Complexity above which the comparison stays at full resolution.
const COMPLEX_ROUTE_SCORE: f64 = 1.5;

/// Thresholds below this (meters) need full resolution.
const TIGHT_THRESHOLD_METERS: f64 = 30.0;

/// Track B is subsampled in the fallback scan above this many points.
const FALLBACK_SUBSAMPLE_LIMIT: usize = 1000;
const FALLBACK_SUBSAMPLE_STRIDE: usize = 3;

/// The fallback scan stops once a candidate is closer than this fraction of the threshold.
const EARLY_EXIT_RATIO: f64 = 0.1;

/// Distance from one sampled point of the source track to the other track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceSample {
    /// Index into the source track
    pub source_index: usize,
    pub source_point: TrackPoint,
    /// Closest point found on the other track
    pub nearest_point: TrackPoint,
    /// Index of `nearest_point` in the other track
    pub nearest_index: usize,
    pub distance_meters: f64,
    /// `distance_meters > threshold`
    pub exceeds_threshold: bool,
}

// =============================================================================
// R-tree Indexed Point for Spatial Queries
// =============================================================================

/// A GPS point projected onto the unit sphere, with its index in the source slice.
#[derive(Debug, Clone, Copy)]
struct SpherePoint {
    idx: usize,
    point: TrackPoint,
    xyz: [f64; 3],
}

impl RTreeObject for SpherePoint {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.xyz)
    }
}

impl PointDistance for SpherePoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.xyz[0] - point[0];
        let dy = self.xyz[1] - point[1];
        let dz = self.xyz[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

fn to_unit_sphere(p: &TrackPoint) -> [f64; 3] {
    let lat = p.latitude.to_radians();
    let lng = p.longitude.to_radians();
    [lat.cos() * lng.cos(), lat.cos() * lng.sin(), lat.sin()]
}

/// Closest candidate to a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Neighbor {
    pub index: usize,
    pub point: TrackPoint,
    pub distance_meters: f64,
}

/// Nearest-neighbour index over a set of indexed points.
pub(crate) struct SpatialIndex {
    tree: RTree<SpherePoint>,
}

impl SpatialIndex {
    /// Bulk-load an R-tree. Fails on an empty set or on any point with invalid coordinates.
    pub(crate) fn build(candidates: &[(usize, TrackPoint)]) -> Result<Self, IndexBuildError> {
        if candidates.is_empty() {
            return Err(IndexBuildError::Empty);
        }

        let mut entries = Vec::with_capacity(candidates.len());
        for (idx, point) in candidates {
            if !point.is_valid() {
                return Err(IndexBuildError::InvalidPoint {
                    index: *idx,
                    latitude: point.latitude,
                    longitude: point.longitude,
                });
            }
            entries.push(SpherePoint {
                idx: *idx,
                point: *point,
                xyz: to_unit_sphere(point),
            });
        }

        Ok(Self {
            tree: RTree::bulk_load(entries),
        })
    }

    pub(crate) fn nearest(&self, query: &TrackPoint) -> Option<Neighbor> {
        let nearest = self.tree.nearest_neighbor(&to_unit_sphere(query))?;
        Some(Neighbor {
            index: nearest.idx,
            point: nearest.point,
            distance_meters: haversine_distance(query, &nearest.point),
        })
    }
}

/// Nearest-neighbour search that prefers the R-tree and falls back to a pairwise scan.
pub(crate) enum NeighborSearch {
    Indexed(SpatialIndex),
    Scan {
        candidates: Vec<(usize, TrackPoint)>,
        /// Stop scanning once a candidate is closer than this
        early_exit_meters: f64,
    },
}

impl NeighborSearch {
    /// Search over every point of `track`.
    ///
    /// On index failure the scan covers a subsampled track (every 3rd point beyond 1000
    /// points) and exits early once a candidate is within 10% of `threshold_meters`.
    pub(crate) fn over_track(track: &[TrackPoint], threshold_meters: f64) -> Self {
        let candidates: Vec<(usize, TrackPoint)> = track.iter().copied().enumerate().collect();

        match SpatialIndex::build(&candidates) {
            Ok(index) => Self::Indexed(index),
            Err(e) => {
                warn!("[Comparator] Spatial index build failed ({}), using pairwise scan", e);
                let stride = if track.len() > FALLBACK_SUBSAMPLE_LIMIT {
                    FALLBACK_SUBSAMPLE_STRIDE
                } else {
                    1
                };
                Self::Scan {
                    candidates: candidates.into_iter().step_by(stride).collect(),
                    early_exit_meters: threshold_meters * EARLY_EXIT_RATIO,
                }
            }
        }
    }

    /// Exact search over an arbitrary candidate set (full scan on index failure).
    pub(crate) fn over_candidates(candidates: Vec<(usize, TrackPoint)>) -> Self {
        match SpatialIndex::build(&candidates) {
            Ok(index) => Self::Indexed(index),
            Err(e) => {
                debug!("[Comparator] Candidate index unavailable ({}), using pairwise scan", e);
                Self::Scan {
                    candidates,
                    early_exit_meters: 0.0,
                }
            }
        }
    }

    pub(crate) fn is_indexed(&self) -> bool {
        matches!(self, Self::Indexed(_))
    }

    pub(crate) fn nearest(&self, query: &TrackPoint) -> Option<Neighbor> {
        if !query.is_valid() {
            return None;
        }
        match self {
            Self::Indexed(index) => index.nearest(query),
            Self::Scan {
                candidates,
                early_exit_meters,
            } => scan_nearest(query, candidates, *early_exit_meters),
        }
    }
}

fn scan_nearest(
    query: &TrackPoint,
    candidates: &[(usize, TrackPoint)],
    early_exit_meters: f64,
) -> Option<Neighbor> {
    let mut best: Option<Neighbor> = None;

    for (idx, point) in candidates {
        if !point.is_valid() {
            continue;
        }
        let dist = haversine_distance(query, point);
        if best.map_or(true, |b| dist < b.distance_meters) {
            best = Some(Neighbor {
                index: *idx,
                point: *point,
                distance_meters: dist,
            });
            if dist < early_exit_meters {
                break;
            }
        }
    }

    best
}

// =============================================================================
// Sampling
// =============================================================================

/// Choose how many of track A's points to skip between queries.
///
/// Full resolution (1) for tracks under 1000 points, for thresholds under 30 m, and
/// when either track scores above 1.5 on [`complexity`]. Otherwise 2, or 3 for tracks
/// of 5000 points and more.
pub fn sampling_stride(track_a: &[TrackPoint], track_b: &[TrackPoint], threshold_meters: f64) -> usize {
    if track_a.len() < FULL_RESOLUTION_LIMIT || threshold_meters < TIGHT_THRESHOLD_METERS {
        return 1;
    }

    let complexity_a = complexity(track_a);
    let complexity_b = complexity(track_b);
    if complexity_a > COMPLEX_ROUTE_SCORE || complexity_b > COMPLEX_ROUTE_SCORE {
        debug!(
            "[Comparator] Complex route (A={:.2}, B={:.2}), full resolution",
            complexity_a, complexity_b
        );
        return 1;
    }

    if track_a.len() < LARGE_TRACK_LIMIT {
        2
    } else {
        3
    }
}

/// Indices visited with the given stride. The last index is always included so every
/// unsampled point lies between two sampled ones.
fn sample_indices(len: usize, stride: usize) -> Vec<usize> {
    if len == 0 {
        return vec![];
    }
    let mut indices: Vec<usize> = (0..len).step_by(stride.max(1)).collect();
    if indices.last() != Some(&(len - 1)) {
        indices.push(len - 1);
    }
    indices
}

// =============================================================================
// Comparison
// =============================================================================

/// Distance from sampled points of `track_a` to their nearest neighbour on `track_b`.
///
/// Both tracks are expected to be resampled already. Points of `track_a` with invalid
/// coordinates produce no sample. Results are ordered by `source_index`.
///
/// # Example
/// ```
/// use route_divergence::{compare_distances, Executor, TrackPoint};
///
/// let a = vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(0.0, 0.0001)];
/// let b = vec![TrackPoint::new(0.01, 0.0), TrackPoint::new(0.01, 0.0001)];
///
/// let samples = compare_distances(&a, &b, 40.0, &Executor::sequential());
/// assert_eq!(samples.len(), 2);
/// assert!(samples.iter().all(|s| s.exceeds_threshold));
/// ```
pub fn compare_distances(
    track_a: &[TrackPoint],
    track_b: &[TrackPoint],
    threshold_meters: f64,
    executor: &Executor,
) -> Vec<DistanceSample> {
    if track_a.is_empty() || track_b.is_empty() {
        return vec![];
    }

    let stride = sampling_stride(track_a, track_b, threshold_meters);
    let indices = sample_indices(track_a.len(), stride);
    let search = NeighborSearch::over_track(track_b, threshold_meters);

    debug!(
        "[Comparator] Querying {} of {} points (stride {}) against {} points ({})",
        indices.len(),
        track_a.len(),
        stride,
        track_b.len(),
        if search.is_indexed() { "r-tree" } else { "scan" }
    );

    executor
        .map(&indices, |&i| {
            let source = &track_a[i];
            search.nearest(source).map(|n| DistanceSample {
                source_index: i,
                source_point: *source,
                nearest_point: n.point,
                nearest_index: n.index,
                distance_meters: n.distance_meters,
                exceeds_threshold: n.distance_meters > threshold_meters,
            })
        })
        .into_iter()
        .flatten()
        .collect()
}
