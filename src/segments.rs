//! # Common / Divergent Segmentation
//!
//! Turns per-point distance samples into contiguous runs of points labelled common or
//! divergent.
//!
//! ## Labelling
//! - **Primary track** (the comparator's source): sampled points take their sample's
//!   `exceeds_threshold`. An unsampled point copies its sampled neighbours when they
//!   agree. When they disagree the point sits in a transition zone and is re-measured
//!   against the other-track points referenced by the samples; if that is impossible the
//!   nearer sampled neighbour wins.
//! - **Secondary track**: every point is measured directly against the primary's
//!   sampled points, so no interpolation is needed.
//!
//! ## Grouping
//! Consecutive points with the same label form one [`Segment`]. Segments cover the
//! track exactly once, in order, and no two neighbours share a label.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::comparator::{DistanceSample, NeighborSearch};
use crate::geo_utils::polyline_length;
use crate::TrackPoint;

/// Which side of the comparison a track was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentRole {
    /// The track whose points were sampled by the comparator
    Primary,
    /// The track the samples were measured against
    Secondary,
}

/// A point of a segment together with its index in the resampled track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentPoint {
    pub point: TrackPoint,
    pub original_index: usize,
}

/// A maximal run of consecutive points sharing one label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub points: Vec<SegmentPoint>,
    pub is_divergent: bool,
    /// First index covered (inclusive)
    pub start_index: usize,
    /// Last index covered (inclusive)
    pub end_index: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Path length of the segment's own points, in meters.
    pub fn length_meters(&self) -> f64 {
        let points: Vec<TrackPoint> = self.points.iter().map(|p| p.point).collect();
        polyline_length(&points)
    }
}

/// Split a resampled track into common and divergent segments.
///
/// `distance_samples` must be the comparator output for the primary track, whichever
/// `role` is being segmented.
///
/// # Example
/// ```
/// use route_divergence::{compare_distances, segment, Executor, SegmentRole, TrackPoint};
///
/// let a: Vec<TrackPoint> = (0..5).map(|i| TrackPoint::new(0.0, i as f64 * 0.0001)).collect();
/// let b = a.clone();
/// let samples = compare_distances(&a, &b, 40.0, &Executor::sequential());
///
/// let segments = segment(&a, &samples, 40.0, SegmentRole::Primary);
/// assert_eq!(segments.len(), 1);
/// assert!(!segments[0].is_divergent);
/// assert_eq!((segments[0].start_index, segments[0].end_index), (0, 4));
/// ```
pub fn segment(
    track: &[TrackPoint],
    distance_samples: &[DistanceSample],
    threshold_meters: f64,
    role: SegmentRole,
) -> Vec<Segment> {
    let labels = match role {
        SegmentRole::Primary => primary_labels(track, distance_samples, threshold_meters),
        SegmentRole::Secondary => secondary_labels(track, distance_samples, threshold_meters),
    };
    group_segments(track, &labels)
}

// =============================================================================
// Labelling
// =============================================================================

fn primary_labels(
    track: &[TrackPoint],
    samples: &[DistanceSample],
    threshold_meters: f64,
) -> Vec<bool> {
    let n = track.len();
    let mut known: Vec<Option<bool>> = vec![None; n];
    for s in samples {
        if s.source_index < n {
            known[s.source_index] = Some(s.exceeds_threshold);
        }
    }

    // Nothing measured: no evidence of a shared path
    if known.iter().all(Option::is_none) {
        return vec![true; n];
    }

    let mut prev_sampled: Vec<Option<usize>> = vec![None; n];
    let mut last = None;
    for i in 0..n {
        if known[i].is_some() {
            last = Some(i);
        }
        prev_sampled[i] = last;
    }

    let mut next_sampled: Vec<Option<usize>> = vec![None; n];
    let mut last = None;
    for i in (0..n).rev() {
        if known[i].is_some() {
            last = Some(i);
        }
        next_sampled[i] = last;
    }

    let mut reference: Option<NeighborSearch> = None;
    let mut transitions = 0usize;

    let labels: Vec<bool> = (0..n)
        .map(|i| {
            if let Some(label) = known[i] {
                return label;
            }
            match (prev_sampled[i], next_sampled[i]) {
                (Some(p), Some(q)) => {
                    let (before, after) = (known[p] == Some(true), known[q] == Some(true));
                    if before == after {
                        return before;
                    }
                    transitions += 1;
                    let search =
                        reference.get_or_insert_with(|| NeighborSearch::over_candidates(referenced_points(samples)));
                    match search.nearest(&track[i]) {
                        Some(neighbor) => neighbor.distance_meters > threshold_meters,
                        None if i - p <= q - i => before,
                        None => after,
                    }
                }
                (Some(p), None) => known[p] == Some(true),
                (None, Some(q)) => known[q] == Some(true),
                (None, None) => true,
            }
        })
        .collect();

    if transitions > 0 {
        debug!("[Segments] Re-measured {} transition-zone points", transitions);
    }
    labels
}

/// Other-track points the samples matched, deduplicated by index.
fn referenced_points(samples: &[DistanceSample]) -> Vec<(usize, TrackPoint)> {
    let unique: BTreeMap<usize, TrackPoint> = samples
        .iter()
        .map(|s| (s.nearest_index, s.nearest_point))
        .collect();
    unique.into_iter().collect()
}

fn secondary_labels(
    track: &[TrackPoint],
    samples: &[DistanceSample],
    threshold_meters: f64,
) -> Vec<bool> {
    if samples.is_empty() {
        return vec![true; track.len()];
    }

    let candidates: Vec<(usize, TrackPoint)> = samples
        .iter()
        .map(|s| (s.source_index, s.source_point))
        .collect();
    let search = NeighborSearch::over_candidates(candidates);

    track
        .iter()
        .map(|p| match search.nearest(p) {
            Some(neighbor) => neighbor.distance_meters > threshold_meters,
            None => true,
        })
        .collect()
}

// =============================================================================
// Grouping
// =============================================================================

fn group_segments(track: &[TrackPoint], labels: &[bool]) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut current: Option<Segment> = None;

    for (i, (point, &is_divergent)) in track.iter().zip(labels).enumerate() {
        let entry = SegmentPoint {
            point: *point,
            original_index: i,
        };

        match current.as_mut() {
            Some(seg) if seg.is_divergent == is_divergent => {
                seg.points.push(entry);
                seg.end_index = i;
            }
            _ => {
                if let Some(done) = current.take() {
                    segments.push(done);
                }
                current = Some(Segment {
                    points: vec![entry],
                    is_divergent,
                    start_index: i,
                    end_index: i,
                });
            }
        }
    }

    if let Some(done) = current {
        segments.push(done);
    }

    segments
}
