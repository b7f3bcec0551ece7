//! Placing fixtures on a map.
//!
//! A click on the map surface arrives as a scan coordinate. The fixture is
//! centred on that point and then pushed back inside the map so no part of
//! it hangs over an edge.

use crate::error::{GeometryError, GeometryResult};
use crate::model::{Fixture, MapRecord, Placement};
use crate::scanner::{round4, ScanPoint};

/// Fixture size as a fraction of its map on each axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Footprint {
    pub width: f64,
    pub height: f64,
}

impl Footprint {
    pub fn of(fixture: &Fixture, map: &MapRecord) -> GeometryResult<Self> {
        if !(map.width > 0.0 && map.height > 0.0) {
            return Err(GeometryError::InvalidSurfaceMeasurement {
                width: map.width,
                height: map.height,
            });
        }
        Ok(Self {
            width: fixture.width / map.width,
            height: fixture.height / map.height,
        })
    }
}

/// Top-left placement that centres `footprint` on `scan`, clamped to the map.
pub fn place(footprint: Footprint, scan: ScanPoint) -> Placement {
    Placement {
        x: round4(clamp_axis(scan.hscan - footprint.width / 2.0, footprint.width)),
        y: round4(clamp_axis(scan.vscan - footprint.height / 2.0, footprint.height)),
    }
}

// Floor first, then the ceiling against the floored value. A footprint wider
// than the map ends up with a negative ceiling and wins over the floor.
fn clamp_axis(value: f64, extent: f64) -> f64 {
    let mut value = value;
    if value < 0.0 {
        value = 0.0;
    }
    if value + extent > 1.0 {
        value = 1.0 - extent;
    }
    value
}

/// Place `fixture` on `map` at `scan`, updating its coordinates in place.
pub fn place_fixture(fixture: &mut Fixture, map: &MapRecord, scan: ScanPoint) -> GeometryResult<Placement> {
    let footprint = Footprint::of(fixture, map)?;
    let placement = place(footprint, scan);
    fixture.coords = placement;
    Ok(placement)
}
