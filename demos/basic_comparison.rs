//! Basic example of comparing two GPS tracks.
//!
//! Run with: cargo run --example basic_comparison

use std::time::Duration;

use route_divergence::{
    ComparisonEngine, ComparisonResult, CompareConfig, ResultCache, Track, TrackPoint,
};

fn print_result(result: &ComparisonResult) {
    let stats = &result.statistics;
    println!("   Similarity: {:.2}%", stats.similarity_percentage);
    println!(
        "   Samples: {} total, {} divergent",
        stats.total_samples, stats.divergent_samples
    );
    for (label, track) in [("A", &result.track_a), ("B", &result.track_b)] {
        println!(
            "   {} '{}': {:.0}m, {} segments, {} arrows",
            label,
            track.name,
            track.length_meters,
            track.segments.len(),
            track.arrows.len()
        );
        for seg in &track.segments {
            println!(
                "      [{:>4}..={:<4}] {} ({:.0}m)",
                seg.start_index,
                seg.end_index,
                if seg.is_divergent { "divergent" } else { "common" },
                seg.length_meters()
            );
        }
    }
    println!();
}

fn main() {
    // Commute through London
    let commute = vec![
        TrackPoint::new(51.5074, -0.1278), // Start
        TrackPoint::new(51.5080, -0.1290),
        TrackPoint::new(51.5090, -0.1300),
        TrackPoint::new(51.5100, -0.1310),
        TrackPoint::new(51.5110, -0.1320),
        TrackPoint::new(51.5120, -0.1330),
        TrackPoint::new(51.5130, -0.1340), // End
    ];

    // Same start, then a detour west
    let detour = vec![
        TrackPoint::new(51.5074, -0.1278),
        TrackPoint::new(51.5080, -0.1290),
        TrackPoint::new(51.5090, -0.1300),
        TrackPoint::new(51.5095, -0.1340),
        TrackPoint::new(51.5105, -0.1380),
        TrackPoint::new(51.5120, -0.1360),
        TrackPoint::new(51.5130, -0.1340),
    ];

    // Somewhere else entirely (New York)
    let elsewhere = vec![
        TrackPoint::new(40.7128, -74.0060),
        TrackPoint::new(40.7138, -74.0070),
        TrackPoint::new(40.7148, -74.0080),
    ];

    let config = CompareConfig::default();
    let engine = ComparisonEngine::new(Some(ResultCache::in_memory(Duration::from_secs(600))));

    println!("Track Comparison Examples\n");
    println!(
        "Config: interpolation_distance={}m, difference_threshold={}m\n",
        config.interpolation_distance, config.difference_threshold
    );

    let commute = Track::new("commute", commute);
    let detour = Track::new("detour", detour);
    let elsewhere = Track::new("elsewhere", elsewhere);

    println!("1. Identical tracks (commute vs commute):");
    match engine.compare(&commute, &commute, &config) {
        Ok(result) => print_result(&result),
        Err(e) => println!("   Error: {}\n", e),
    }

    println!("2. Shared start, then a detour (commute vs detour):");
    match engine.compare(&commute, &detour, &config) {
        Ok(result) => print_result(&result),
        Err(e) => println!("   Error: {}\n", e),
    }

    println!("3. Different cities (commute vs elsewhere):");
    match engine.compare(&commute, &elsewhere, &config) {
        Ok(result) => print_result(&result),
        Err(e) => println!("   Error: {}\n", e),
    }

    println!("4. Empty track:");
    match engine.compare(&commute, &Track::new("empty", vec![]), &config) {
        Ok(_) => println!("   Unexpected success\n"),
        Err(e) => println!("   Error: {}\n", e),
    }

    if let Some(cache) = engine.cache() {
        println!("Cached results: {}", cache.len());
    }
}
