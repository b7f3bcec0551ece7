//! Unit conversion and scan mapping
//!
//! Converts a pointer position over a rectangular surface into a scan
//! coordinate, i.e. a position normalized against the surface's measured
//! pixel box.
//!
//! # Coordinate Systems
//!
//! - **Pixel Space**: where pointer events arrive. The surface occupies
//!   `[left, left + width] x [top, top + height]`.
//!
//! - **Scan Space**: the same surface normalized to `0..1` on both axes,
//!   origin at the surface's top-left corner.
//!
//! Only the lower bound is clamped here. The upper bound depends on what is
//! being placed (a fixture's footprint), so the placement engine owns it.

use crate::error::{GeometryError, GeometryResult};

/// All stored and exported coordinates carry 4 decimal places.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Measured pixel box of a surface element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SurfaceBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    pub fn validate(&self) -> GeometryResult<()> {
        // NaN fails both comparisons, so test for the good case
        if self.width > 0.0 && self.height > 0.0 {
            Ok(())
        } else {
            Err(GeometryError::InvalidSurfaceMeasurement {
                width: self.width,
                height: self.height,
            })
        }
    }
}

/// Normalized position within a surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanPoint {
    pub hscan: f64,
    pub vscan: f64,
}

/// Map a pointer position to a scan coordinate.
///
/// Each axis is rounded to 4 decimals and floored at 0. Fails with
/// [`GeometryError::InvalidSurfaceMeasurement`] when the surface has no area.
pub fn scan_position(x: f64, y: f64, surface: &SurfaceBox) -> GeometryResult<ScanPoint> {
    surface.validate()?;

    let hscan = round4((x - surface.left) / surface.width).max(0.0);
    let vscan = round4((y - surface.top) / surface.height).max(0.0);

    Ok(ScanPoint { hscan, vscan })
}
