//! Terrarium elevation encoding.
//!
//! Terrarium tiles pack a signed elevation into the red, green and blue
//! channels of each pixel: `elevation = (r * 256 + g + b / 256) - 32768`,
//! giving a range of -32768m to +32767.996m at 1/256m resolution.

/// Offset subtracted after unpacking the channels.
const TERRARIUM_OFFSET: f64 = 32768.0;

/// Decode one Terrarium pixel into meters.
pub fn decode(r: u8, g: u8, b: u8) -> f64 {
    (r as f64 * 256.0 + g as f64 + b as f64 / 256.0) - TERRARIUM_OFFSET
}

/// Encode an elevation in meters as a Terrarium pixel.
///
/// Values outside the representable range are clamped. Used to build
/// synthetic tiles.
pub fn encode(elevation_m: f64) -> [u8; 3] {
    let scaled = ((elevation_m + TERRARIUM_OFFSET) * 256.0)
        .round()
        .clamp(0.0, (1u32 << 24) as f64 - 1.0) as u32;
    [(scaled >> 16) as u8, (scaled >> 8) as u8, scaled as u8]
}
