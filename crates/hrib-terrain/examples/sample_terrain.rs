//! Example: Sample terrain around a coordinate from AWS Terrarium tiles.
//!
//! Usage: cargo run --example sample_terrain -- <lat> <lon> [zoom]

use hrib_terrain::{HttpTileSource, TerrainSampler, DEFAULT_ZOOM, METERS_TO_FEET};
use std::env;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <lat> <lon> [zoom]", args[0]);
        eprintln!("Example: {} 45.3735 -121.6959 15", args[0]);
        std::process::exit(1);
    }

    let lat: f64 = args[1].parse()?;
    let lon: f64 = args[2].parse()?;
    let zoom: u8 = match args.get(3) {
        Some(z) => z.parse()?,
        None => DEFAULT_ZOOM,
    };

    let sampler = TerrainSampler::new(HttpTileSource::new()?, zoom)?;

    println!("Sampling terrain at ({}, {}) zoom {}...", lat, lon, zoom);
    let start = Instant::now();
    let sample = sampler.sample(lat, lon)?;
    let rounded = sample.slope_aspect.rounded();

    println!(
        "Tile {} pixel ({}, {}) in {:.2}s",
        sample.pixel.tile,
        sample.pixel.x,
        sample.pixel.y,
        start.elapsed().as_secs_f64()
    );
    for row in sample.grid.rows() {
        println!("  {:>9.2} {:>9.2} {:>9.2}", row[0], row[1], row[2]);
    }
    println!(
        "Elevation: {:.1} m ({} ft)",
        sample.elevation_m(),
        (sample.elevation_m() * METERS_TO_FEET).round()
    );
    println!("Slope: {}°  Aspect: {}°", rounded.slope_degrees, rounded.aspect_degrees);

    let stats = sampler.cache_stats();
    println!("Tiles fetched: {}, cache hits: {}", stats.misses, stats.hits);
    Ok(())
}
