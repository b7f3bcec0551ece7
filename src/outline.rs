//! Fixture outlines
//!
//! An outline is the closed path the LEDs of a fixture sit on. It is built in
//! the fixture's rendered pixel space: `(0, 0)` is the top-left of the
//! fixture's box on screen, `(width, height)` its bottom-right, y grows
//! downwards.
//!
//! Sampling code only sees the [`OutlinePath`] trait, so any vector-path
//! implementation that can answer "total length" and "point at distance" can
//! back it. [`Polyline`] is the one used here.

use glam::DVec2;

use crate::error::{GeometryError, GeometryResult};
use crate::model::{Fixture, MapRecord, ShapeKind};

/// Stroke inset applied to rectangle and ellipse outlines, in pixels.
pub const STROKE_MARGIN: f64 = 2.0;
/// Inner radius of a star as a fraction of its outer radius.
pub const STAR_INNER_RATIO: f64 = 0.4;
/// Segments used to flatten an ellipse.
const ELLIPSE_SEGMENTS: usize = 360;

/// Length and point queries over a closed path.
pub trait OutlinePath {
    fn length(&self) -> f64;

    /// Point at arc-length `distance` from the path start. Distances outside
    /// `[0, length]` wrap around the closed path.
    fn point_at(&self, distance: f64) -> DVec2;
}

/// Pixel size a fixture is drawn at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSize {
    pub width: f64,
    pub height: f64,
}

impl RenderSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Size of `fixture` when `map` is drawn `surface_width` pixels wide.
    ///
    /// The surface height follows the map's aspect multiplier; both fixture
    /// dimensions are rounded to whole pixels.
    pub fn for_fixture(map: &MapRecord, fixture: &Fixture, surface_width: f64) -> GeometryResult<Self> {
        if !(map.width > 0.0 && map.height > 0.0) {
            return Err(GeometryError::InvalidSurfaceMeasurement {
                width: map.width,
                height: map.height,
            });
        }
        let surface_height = map.aspect_multiplier * surface_width;
        if !(surface_width > 0.0 && surface_height > 0.0) {
            return Err(GeometryError::InvalidSurfaceMeasurement {
                width: surface_width,
                height: surface_height,
            });
        }

        Ok(Self {
            width: (fixture.width / map.width * surface_width).round(),
            height: (fixture.height / map.height * surface_height).round(),
        })
    }

    fn validate(&self) -> GeometryResult<()> {
        let min = 2.0 * STROKE_MARGIN;
        if self.width > min && self.height > min {
            Ok(())
        } else {
            Err(GeometryError::InvalidSurfaceMeasurement {
                width: self.width,
                height: self.height,
            })
        }
    }
}

/// Closed polyline with precomputed cumulative segment lengths.
#[derive(Clone, Debug)]
pub struct Polyline {
    points: Vec<DVec2>,
    // cumulative[i] = arc length at points[i]; last entry is the full length
    cumulative: Vec<f64>,
}

impl Polyline {
    pub fn closed(points: Vec<DVec2>) -> Self {
        let mut cumulative = Vec::with_capacity(points.len() + 1);
        let mut total = 0.0;
        cumulative.push(0.0);
        for (i, p) in points.iter().enumerate() {
            let next = points[(i + 1) % points.len()];
            total += p.distance(next);
            cumulative.push(total);
        }
        Self { points, cumulative }
    }

    pub fn points(&self) -> &[DVec2] {
        &self.points
    }
}

impl OutlinePath for Polyline {
    fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    fn point_at(&self, distance: f64) -> DVec2 {
        let total = self.length();
        if self.points.is_empty() || total <= 0.0 {
            return self.points.first().copied().unwrap_or(DVec2::ZERO);
        }

        let d = distance.rem_euclid(total);
        // First segment whose end lies beyond d
        let seg = self.cumulative.partition_point(|&c| c <= d).saturating_sub(1);
        let seg = seg.min(self.points.len() - 1);

        let start = self.points[seg];
        let end = self.points[(seg + 1) % self.points.len()];
        let seg_len = self.cumulative[seg + 1] - self.cumulative[seg];
        if seg_len <= 0.0 {
            return start;
        }
        start.lerp(end, (d - self.cumulative[seg]) / seg_len)
    }
}

/// Build the outline for `shape` at `size`.
///
/// Returns `Ok(None)` for custom and shapeless fixtures, which carry no
/// generated LEDs.
pub fn build_outline(shape: &ShapeKind, size: RenderSize) -> GeometryResult<Option<Polyline>> {
    validate_shape(shape)?;
    if matches!(shape, ShapeKind::Custom | ShapeKind::None) {
        return Ok(None);
    }
    size.validate()?;

    let outline = match *shape {
        ShapeKind::Square => rectangle(size),
        ShapeKind::Circle => ellipse(size),
        ShapeKind::Star { vertices } => star(size, checked_vertices(shape, vertices)?),
        ShapeKind::Poly { vertices } => ngon(size, checked_vertices(shape, vertices)?),
        // handled above
        ShapeKind::Custom | ShapeKind::None => return Ok(None),
    };
    Ok(Some(outline))
}

/// Star and polygon need at least 3 vertices.
pub fn validate_shape(shape: &ShapeKind) -> GeometryResult<()> {
    match *shape {
        ShapeKind::Star { vertices } | ShapeKind::Poly { vertices } => {
            checked_vertices(shape, vertices).map(|_| ())
        }
        _ => Ok(()),
    }
}

fn checked_vertices(shape: &ShapeKind, vertices: Option<u32>) -> GeometryResult<u32> {
    match vertices {
        Some(n) if n >= 3 => Ok(n),
        other => Err(GeometryError::InvalidShapeParameters {
            kind: shape.name(),
            vertices: other.unwrap_or(0),
        }),
    }
}

fn center(size: RenderSize) -> DVec2 {
    DVec2::new(size.width / 2.0, size.height / 2.0)
}

fn rectangle(size: RenderSize) -> Polyline {
    let m = STROKE_MARGIN;
    let (right, bottom) = (size.width - m, size.height - m);
    Polyline::closed(vec![
        DVec2::new(m, m),
        DVec2::new(right, m),
        DVec2::new(right, bottom),
        DVec2::new(m, bottom),
    ])
}

fn ellipse(size: RenderSize) -> Polyline {
    let c = center(size);
    let rx = size.width / 2.0 - STROKE_MARGIN;
    let ry = size.height / 2.0 - STROKE_MARGIN;
    let points = (0..ELLIPSE_SEGMENTS)
        .map(|i| {
            let a = std::f64::consts::TAU * i as f64 / ELLIPSE_SEGMENTS as f64;
            c + DVec2::new(rx * a.cos(), ry * a.sin())
        })
        .collect();
    Polyline::closed(points)
}

fn star(size: RenderSize, spikes: u32) -> Polyline {
    let c = center(size);
    let outer = size.width.min(size.height) / 2.0;
    let inner = outer * STAR_INNER_RATIO;
    let count = spikes as usize * 2;
    let points = (0..count)
        .map(|i| {
            let r = if i % 2 == 0 { outer } else { inner };
            let a = std::f64::consts::PI * i as f64 / spikes as f64;
            c + DVec2::new(r * a.sin(), -r * a.cos())
        })
        .collect();
    Polyline::closed(points)
}

fn ngon(size: RenderSize, edges: u32) -> Polyline {
    let c = center(size);
    let radius = size.width.min(size.height) / 2.0;
    let points = (0..edges)
        .map(|i| {
            let a = std::f64::consts::TAU * i as f64 / edges as f64;
            c + DVec2::new(radius * a.sin(), -radius * a.cos())
        })
        .collect();
    Polyline::closed(points)
}
