//! Example: Query elevation from a DTED directory.
//!
//! Usage: cargo run --example query_elevation -- <lat> <lon> [dted_dir]

use dted_cache::{ElevationLookup, FrameCache, DEFAULT_CACHE_SIZE};
use std::env;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <lat> <lon> [dted_dir]", args[0]);
        eprintln!("Example: {} 47.6062 -122.3321 ./dted", args[0]);
        std::process::exit(1);
    }

    let lat: f64 = args[1].parse()?;
    let lon: f64 = args[2].parse()?;
    let dted_dir = args.get(3).map(|s| s.as_str()).unwrap_or("dted");

    let mut cache = FrameCache::new(vec![dted_dir.into()], vec![], DEFAULT_CACHE_SIZE);

    println!("Querying elevation at ({}, {}) under {}...", lat, lon, dted_dir);
    let query_start = Instant::now();
    match cache.elevation(lat, lon) {
        ElevationLookup::Found(meters) => {
            println!("Elevation: {} meters ({:.6}s)", meters, query_start.elapsed().as_secs_f64());
        }
        ElevationLookup::NoData => println!("Frame found but the post is unreadable"),
        ElevationLookup::NoCoverage => {
            eprintln!("No frame covers ({}, {})", lat, lon);
            std::process::exit(1);
        }
    }

    for level in [2, 1, 0] {
        if let Some(frame) = cache.get(lat, lon, level) {
            let bounds = frame.bounds();
            println!(
                "Level {} frame {}: lat {:.2}° to {:.2}°, lon {:.2}° to {:.2}°",
                level,
                frame.path().display(),
                bounds.min_lat,
                bounds.max_lat,
                bounds.min_lon,
                bounds.max_lon
            );
        }
    }
    println!("{} frame(s) cached", cache.keys().count());

    // Second query hits the cached frame
    let query_start = Instant::now();
    let again = cache.elevation(lat, lon);
    println!("Cached lookup: {:?} ({:.6}s)", again, query_start.elapsed().as_secs_f64());
    Ok(())
}
