//! LED sampling along a fixture outline.

use crate::error::GeometryResult;
use crate::model::{Fixture, FixtureLed, LedParams};
use crate::outline::{build_outline, OutlinePath, RenderSize};
use crate::scanner::round4;

/// One LED picked off an outline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LedSample {
    /// Arc-length distance the point was taken at.
    pub distance: f64,
    /// Position in fixture-local normalized space.
    pub local: FixtureLed,
    /// Logical first LED of the fixture.
    pub is_first: bool,
}

/// Distribute `params.count` LEDs evenly around `path`.
///
/// Always returns exactly `params.count` samples in increasing arc-length
/// order, starting from the start position folded into `[0, spacing)`. Every
/// distance stays below the path length. Returns an empty list when there is
/// nothing to sample (no LEDs or a zero-length path).
pub fn sample_leds(path: &impl OutlinePath, params: &LedParams, size: RenderSize) -> Vec<LedSample> {
    let length = path.length();
    if params.count == 0 || !(length > 0.0) {
        return Vec::new();
    }

    let count = params.count as usize;
    let spacing = length / count as f64;

    // fmod is exact, so the fold lands in [0, spacing)
    let start = params.start_position.max(0.0) % spacing;
    // Cap just short of a full lap
    let last = length * (1.0 - f64::EPSILON);

    let first = params.effective_offset();

    (0..count)
        .map(|k| (start + spacing * k as f64).min(last))
        .enumerate()
        .map(|(index, distance)| {
            let point = path.point_at(distance);
            LedSample {
                distance,
                local: [round4(point.x / size.width), round4(point.y / size.height)],
                is_first: index == first,
            }
        })
        .collect()
}

/// Local coordinates only, in traversal order.
pub fn led_coordinates(samples: &[LedSample]) -> Vec<FixtureLed> {
    samples.iter().map(|s| s.local).collect()
}

/// Recompute a fixture's LED coordinates from its shape and LED parameters.
///
/// Shapeless and custom fixtures, and fixtures without an LED count, end up
/// with no LEDs. On error the fixture is left untouched.
pub fn regenerate_leds(fixture: &mut Fixture, size: RenderSize) -> GeometryResult<()> {
    let outline = build_outline(&fixture.shape, size)?;

    fixture.leds = match (outline, fixture.led_count) {
        (Some(outline), Some(_)) => {
            let samples = sample_leds(&outline, &fixture.led_params(), size);
            Some(led_coordinates(&samples))
        }
        _ => None,
    };
    Ok(())
}
