//! Slope and aspect from a 3x3 neighborhood (Horn's method).
//!
//! With the grid laid out as
//!
//! ```text
//! e[0][0] e[0][1] e[0][2]      north
//! e[1][0] e[1][1] e[1][2]
//! e[2][0] e[2][1] e[2][2]      south
//! ```
//!
//! the weighted differences are
//! - dz/dx = ((e02 + 2·e12 + e22) - (e00 + 2·e10 + e20)) / 8
//! - dz/dy = ((e20 + 2·e21 + e22) - (e00 + 2·e01 + e02)) / 8
//!
//! Both are in elevation units per cell; no cell size is applied.

use crate::neighborhood::ElevationGrid;
use crate::{Result, TerrainError};

/// Slope magnitude and downslope compass direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeAspect {
    /// Slope in degrees, 0 for flat ground.
    pub slope_degrees: f64,
    /// Aspect in degrees in [0, 360).
    pub aspect_degrees: f64,
}

impl SlopeAspect {
    /// Slope rounded to 2 decimals and aspect to 1, as reported in output.
    pub fn rounded(&self) -> Self {
        let aspect = round_to(self.aspect_degrees, 1);
        Self {
            slope_degrees: round_to(self.slope_degrees, 2),
            aspect_degrees: if aspect >= 360.0 { 0.0 } else { aspect },
        }
    }
}

/// Decimal rounding of the exact binary value with halves to even, as
/// Python's `round` does: 0.125 becomes 0.12, 2.675 becomes 2.67.
fn round_to(value: f64, decimals: usize) -> f64 {
    format!("{:.*}", decimals, value).parse().unwrap_or(value)
}

/// Estimate slope and aspect for the center of a grid.
///
/// A flat grid yields slope 0 and aspect 0.
pub fn estimate(grid: &ElevationGrid) -> Result<SlopeAspect> {
    for (row, cells) in grid.rows().iter().enumerate() {
        if let Some(col) = cells.iter().position(|e| !e.is_finite()) {
            return Err(TerrainError::NonFiniteElevation { row, col });
        }
    }

    let e = grid.rows();
    let dz_dx = ((e[0][2] + 2.0 * e[1][2] + e[2][2]) - (e[0][0] + 2.0 * e[1][0] + e[2][0])) / 8.0;
    let dz_dy = ((e[2][0] + 2.0 * e[2][1] + e[2][2]) - (e[0][0] + 2.0 * e[0][1] + e[0][2])) / 8.0;

    let slope = dz_dx.hypot(dz_dy).atan().to_degrees();

    // atan2(0, -0.0) is 180; treat any flat neighborhood as facing north.
    let mut aspect = if dz_dx == 0.0 && dz_dy == 0.0 {
        0.0
    } else {
        dz_dy.atan2(-dz_dx).to_degrees()
    };
    if aspect < 0.0 {
        aspect += 360.0;
    }

    Ok(SlopeAspect {
        slope_degrees: slope,
        aspect_degrees: aspect,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_flat_grid() {
        let result = estimate(&ElevationGrid::flat(1234.5)).unwrap();
        assert_eq!(result.slope_degrees, 0.0);
        assert_eq!(result.aspect_degrees, 0.0);
    }

    #[test]
    fn test_grid_rising_to_east() {
        let grid = ElevationGrid([[-8.0, 0.0, 8.0], [-8.0, 0.0, 8.0], [-8.0, 0.0, 8.0]]);
        let result = estimate(&grid).unwrap();

        // dz/dx = (32 - -32) / 8 = 8 per cell
        assert_relative_eq!(result.slope_degrees, 8f64.atan().to_degrees(), epsilon = 1e-12);
        assert_relative_eq!(result.aspect_degrees, 180.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unit_gradient_is_45_degrees() {
        // One unit per cell along x
        let grid = ElevationGrid([[-1.0, 0.0, 1.0], [-1.0, 0.0, 1.0], [-1.0, 0.0, 1.0]]);
        let result = estimate(&grid).unwrap().rounded();
        assert_eq!(result.slope_degrees, 45.0);
    }

    #[test]
    fn test_grid_rising_to_south() {
        let grid = ElevationGrid([[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]);
        let result = estimate(&grid).unwrap();
        assert_relative_eq!(result.slope_degrees, 45.0, epsilon = 1e-12);
        assert_relative_eq!(result.aspect_degrees, 90.0, epsilon = 1e-12);
    }

    #[test]
    fn test_aspect_is_normalized() {
        // dz/dy < 0 gives a negative atan2 that must wrap
        let grid = ElevationGrid([[2.0, 2.0, 2.0], [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]]);
        let result = estimate(&grid).unwrap();
        assert_relative_eq!(result.aspect_degrees, 270.0, epsilon = 1e-12);
        assert!((0.0..360.0).contains(&result.aspect_degrees));
    }

    #[test]
    fn test_rejects_non_finite() {
        let mut grid = ElevationGrid::flat(0.0);
        grid.0[2][1] = f64::NAN;
        assert!(matches!(
            estimate(&grid),
            Err(TerrainError::NonFiniteElevation { row: 2, col: 1 })
        ));
    }

    #[test]
    fn test_rounding() {
        let sa = SlopeAspect {
            slope_degrees: 12.3456,
            aspect_degrees: 359.96,
        };
        let rounded = sa.rounded();
        assert_eq!(rounded.slope_degrees, 12.35);
        assert_eq!(rounded.aspect_degrees, 0.0);
    }

    #[test]
    fn test_rounding_halves_go_to_even() {
        let rounded = SlopeAspect {
            slope_degrees: 0.125,
            aspect_degrees: 10.25,
        }
        .rounded();
        assert_eq!(rounded.slope_degrees, 0.12);
        assert_eq!(rounded.aspect_degrees, 10.2);

        let rounded = SlopeAspect {
            slope_degrees: 0.375,
            aspect_degrees: 10.75,
        }
        .rounded();
        assert_eq!(rounded.slope_degrees, 0.38);
        assert_eq!(rounded.aspect_degrees, 10.8);

        // 2.675 is stored just below the half
        assert_eq!(round_to(2.675, 2), 2.67);
    }
}
