//! Layout export
//!
//! Flattens every fixture of a map into one list of LED detection zones in
//! map-global normalized space. The order is part of the contract with the
//! lighting controller: fixtures by ascending id, then each fixture's LEDs
//! starting from its logical first LED.

use serde::{Deserialize, Serialize};

use crate::model::{Fixture, FixtureLed, LedZone, MapRecord};
use crate::scanner::round4;

/// Half the side of the square zone emitted around each LED.
pub const ZONE_HALF_SIZE: f64 = 0.01;

/// What to do with zone bounds that fall outside `[0, 1]`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClampMode {
    /// Emit bounds as computed, even past the map edge.
    #[default]
    PassThrough,
    /// Clamp every bound into `[0, 1]`.
    Clamp,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutExporter {
    pub clamp: ClampMode,
    pub half_size: f64,
}

impl Default for LayoutExporter {
    fn default() -> Self {
        Self { clamp: ClampMode::PassThrough, half_size: ZONE_HALF_SIZE }
    }
}

impl LayoutExporter {
    pub fn new(clamp: ClampMode) -> Self {
        Self { clamp, ..Default::default() }
    }

    /// Build the payload for a whole map.
    pub fn export(&self, map: &MapRecord) -> Vec<LedZone> {
        let mut fixtures: Vec<&Fixture> = map.fixtures.iter().collect();
        fixtures.sort_by_key(|f| f.id);

        fixtures
            .into_iter()
            .flat_map(|fixture| self.fixture_zones(fixture, map))
            .collect()
    }

    fn fixture_zones(&self, fixture: &Fixture, map: &MapRecord) -> Vec<LedZone> {
        // Zero-sized map would divide by zero; nothing sensible to emit
        if !(map.width > 0.0 && map.height > 0.0) {
            return Vec::new();
        }
        let x_scale = fixture.width / map.width;
        let y_scale = fixture.height / map.height;
        let origin = fixture.coords;

        rotated_leds(fixture.led_list(), fixture.led_offset.unwrap_or(0))
            .into_iter()
            .map(|[x_led, y_led]| {
                let h = x_led * x_scale + origin.x;
                let v = y_led * y_scale + origin.y;
                self.zone(h, v)
            })
            .collect()
    }

    fn zone(&self, h: f64, v: f64) -> LedZone {
        let bound = |value: f64| {
            let value = round4(value);
            match self.clamp {
                ClampMode::PassThrough => value,
                ClampMode::Clamp => value.clamp(0.0, 1.0),
            }
        };
        LedZone {
            hmin: bound(h - self.half_size),
            hmax: bound(h + self.half_size),
            vmin: bound(v - self.half_size),
            vmax: bound(v + self.half_size),
        }
    }
}

/// Rotate `leds` left so the LED at `offset` comes first. Offsets outside
/// the list wrap, negative ones count from the end.
pub fn rotated_leds(leds: &[FixtureLed], offset: i32) -> Vec<FixtureLed> {
    let mut rotated = leds.to_vec();
    if !rotated.is_empty() {
        let shift = (offset as i64).rem_euclid(rotated.len() as i64) as usize;
        rotated.rotate_left(shift);
    }
    rotated
}

/// Serialize a payload the way the controller expects it.
pub fn to_json(zones: &[LedZone], pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(zones)
    } else {
        serde_json::to_string(zones)
    }
}
