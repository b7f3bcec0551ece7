use serde::{Deserialize, Serialize};

use crate::error::UnknownShape;

/// Storage key of the "no map loaded" state.
pub const DEFAULT_KEY: &str = "hlm-null";
pub const KEY_PREFIX: &str = "hlm-";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Standard,
    #[default]
    #[serde(rename = "16:10")]
    Wide,
    #[serde(rename = "16:9")]
    Widescreen,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 4] = [
        AspectRatio::Square,
        AspectRatio::Standard,
        AspectRatio::Wide,
        AspectRatio::Widescreen,
    ];

    /// Height / width of a surface with this ratio.
    pub fn multiplier(self) -> f64 {
        match self {
            AspectRatio::Square => 1.0,
            AspectRatio::Standard => 0.75,
            AspectRatio::Wide => 0.625,
            AspectRatio::Widescreen => 0.5625,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Standard => "4:3",
            AspectRatio::Wide => "16:10",
            AspectRatio::Widescreen => "16:9",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.label() == label.trim())
    }
}

/// Outline of a fixture. Star and polygon carry their vertex count as stored;
/// a missing count or one below 3 is rejected when the outline is built.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(try_from = "RawShape", into = "RawShape")]
pub enum ShapeKind {
    Square,
    Circle,
    Star { vertices: Option<u32> },
    Poly { vertices: Option<u32> },
    Custom,
    #[default]
    None,
}

impl ShapeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Square => "square",
            ShapeKind::Circle => "circle",
            ShapeKind::Star { .. } => "star",
            ShapeKind::Poly { .. } => "poly",
            ShapeKind::Custom => "custom",
            ShapeKind::None => "none",
        }
    }

    /// Build from the name/vertices pair used by the stored record and the CLI.
    pub fn parse(name: &str, vertices: Option<u32>) -> Result<Self, UnknownShape> {
        match name.trim().to_ascii_lowercase().as_str() {
            "square" => Ok(ShapeKind::Square),
            "circle" => Ok(ShapeKind::Circle),
            "star" => Ok(ShapeKind::Star { vertices }),
            "poly" => Ok(ShapeKind::Poly { vertices }),
            "custom" => Ok(ShapeKind::Custom),
            "none" | "" => Ok(ShapeKind::None),
            other => Err(UnknownShape(other.to_string())),
        }
    }
}

// Wire form: `"shape": "star", "vertices": 5`, both omitted for no shape.
#[derive(Serialize, Deserialize, Default)]
struct RawShape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vertices: Option<u32>,
}

impl TryFrom<RawShape> for ShapeKind {
    type Error = UnknownShape;

    fn try_from(raw: RawShape) -> Result<Self, Self::Error> {
        match raw.shape {
            Some(name) => ShapeKind::parse(&name, raw.vertices),
            None => Ok(ShapeKind::None),
        }
    }
}

impl From<ShapeKind> for RawShape {
    fn from(kind: ShapeKind) -> Self {
        match kind {
            ShapeKind::None => RawShape::default(),
            ShapeKind::Star { vertices } | ShapeKind::Poly { vertices } => RawShape {
                shape: Some(kind.name().to_string()),
                vertices,
            },
            other => RawShape { shape: Some(other.name().to_string()), vertices: None },
        }
    }
}

/// LED position in fixture-local normalized space, `[x, y]`.
pub type FixtureLed = [f64; 2];

/// Normalized top-left of a fixture on its map.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Placement {
    pub x: f64,
    pub y: f64,
}

impl From<[f64; 2]> for Placement {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Placement> for [f64; 2] {
    fn from(p: Placement) -> Self {
        [p.x, p.y]
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub id: u32,
    pub name: String,
    pub height: f64,
    pub width: f64,
    #[serde(default)]
    pub coords: Placement,
    #[serde(flatten)]
    pub shape: ShapeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leds: Option<Vec<FixtureLed>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led_offset: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led_position: Option<f64>,
}

impl Fixture {
    pub fn new(id: u32, name: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            id,
            name: name.into(),
            width,
            height,
            ..Default::default()
        }
    }

    /// LED parameters with their defaults filled in.
    pub fn led_params(&self) -> LedParams {
        LedParams {
            count: self.led_count.unwrap_or(0),
            offset: self.led_offset.unwrap_or(0),
            start_position: self.led_position.unwrap_or(0.0).max(0.0),
        }
    }

    pub fn led_list(&self) -> &[FixtureLed] {
        self.leds.as_deref().unwrap_or(&[])
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LedParams {
    pub count: u32,
    pub offset: i32,
    pub start_position: f64,
}

impl LedParams {
    /// Traversal index of the logical first LED. Negative offsets count back
    /// from the end.
    pub fn effective_offset(&self) -> usize {
        if self.count == 0 {
            return 0;
        }
        let n = self.count as i64;
        let o = self.offset as i64;
        let effective = if o >= 0 { o } else { n + o };
        effective.rem_euclid(n) as usize
    }
}

/// Value stored under one map key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapRecord {
    pub height: f64,
    pub width: f64,
    pub aspect_multiplier: f64,
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub fixtures: Vec<Fixture>,
}

impl Default for MapRecord {
    fn default() -> Self {
        let ratio = AspectRatio::Wide;
        Self {
            height: 50.0,
            width: 80.0,
            aspect_multiplier: ratio.multiplier(),
            aspect_ratio: ratio,
            fixtures: Vec::new(),
        }
    }
}

impl MapRecord {
    pub fn set_aspect_ratio(&mut self, ratio: AspectRatio) {
        self.aspect_ratio = ratio;
        self.aspect_multiplier = ratio.multiplier();
    }

    pub fn fixture(&self, id: u32) -> Option<&Fixture> {
        self.fixtures.iter().find(|f| f.id == id)
    }

    /// Next free fixture id: one past the highest in use.
    pub fn next_fixture_id(&self) -> u32 {
        next_fixture_id(&self.fixtures)
    }
}

pub fn next_fixture_id(fixtures: &[Fixture]) -> u32 {
    fixtures.iter().map(|f| f.id + 1).max().unwrap_or(0)
}

/// Turn a user-supplied map name into a storage key.
pub fn map_key(name: &str) -> String {
    format!("{}{}", KEY_PREFIX, name.trim().to_lowercase().replace(' ', "_"))
}

pub fn is_valid_key(key: &str) -> bool {
    key.starts_with(KEY_PREFIX)
}

/// One exported LED detection zone in map-global normalized space.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct LedZone {
    pub hmin: f64,
    pub hmax: f64,
    pub vmin: f64,
    pub vmax: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_aspect_table() {
        assert_eq!(AspectRatio::Square.multiplier(), 1.0);
        assert_eq!(AspectRatio::Standard.multiplier(), 0.75);
        assert_eq!(AspectRatio::Wide.multiplier(), 0.625);
        assert_eq!(AspectRatio::Widescreen.multiplier(), 0.5625);
        assert_eq!(AspectRatio::from_label("16:9"), Some(AspectRatio::Widescreen));
        assert_eq!(AspectRatio::from_label("3:2"), None);
    }

    #[test]
    fn test_map_key_from_name() {
        assert_eq!(map_key("Living Room Wall"), "hlm-living_room_wall");
        assert!(is_valid_key(&map_key("x")));
        assert!(!is_valid_key("settings"));
    }

    #[test]
    fn test_next_fixture_id_uses_max() {
        let mut map = MapRecord::default();
        assert_eq!(map.next_fixture_id(), 0);
        map.fixtures.push(Fixture::new(0, "a", 1.0, 1.0));
        map.fixtures.push(Fixture::new(4, "b", 1.0, 1.0));
        // two fixtures but highest id is 4
        assert_eq!(map.next_fixture_id(), 5);
    }

    #[test]
    fn test_effective_offset_wraps_negative() {
        let p = |offset| LedParams { count: 10, offset, start_position: 0.0 };
        assert_eq!(p(0).effective_offset(), 0);
        assert_eq!(p(3).effective_offset(), 3);
        assert_eq!(p(-1).effective_offset(), 9);
        assert_eq!(p(12).effective_offset(), 2);
    }

    #[test]
    fn test_fixture_wire_format() {
        let mut fixture = Fixture::new(2, "Panel", 20.0, 10.0);
        fixture.shape = ShapeKind::Star { vertices: Some(5) };
        fixture.led_count = Some(3);
        fixture.coords = Placement { x: 0.25, y: 0.5 };

        let value = serde_json::to_value(&fixture).unwrap();
        assert_eq!(value["shape"], json!("star"));
        assert_eq!(value["vertices"], json!(5));
        assert_eq!(value["coords"], json!([0.25, 0.5]));
        assert_eq!(value["ledCount"], json!(3));
        assert!(value.get("leds").is_none());

        let back: Fixture = serde_json::from_value(value).unwrap();
        assert_eq!(back, fixture);
    }

    #[test]
    fn test_fixture_without_shape() {
        let fixture: Fixture = serde_json::from_value(json!({
            "id": 0, "name": "bare", "height": 5, "width": 5, "coords": [0, 0]
        }))
        .unwrap();
        assert_eq!(fixture.shape, ShapeKind::None);
        assert!(fixture.led_list().is_empty());

        let value = serde_json::to_value(&fixture).unwrap();
        assert!(value.get("shape").is_none());
    }

    #[test]
    fn test_star_without_vertices_keeps_wire_form() {
        let stored = json!({
            "id": 1, "name": "star", "height": 5, "width": 5, "coords": [0, 0], "shape": "star"
        });
        let fixture: Fixture = serde_json::from_value(stored).unwrap();
        assert_eq!(fixture.shape, ShapeKind::Star { vertices: None });

        let value = serde_json::to_value(&fixture).unwrap();
        assert_eq!(value["shape"], json!("star"));
        assert!(value.get("vertices").is_none());
    }

    #[test]
    fn test_unknown_shape_name() {
        assert_eq!(
            ShapeKind::parse("hexagon", None),
            Err(UnknownShape("hexagon".to_string()))
        );
        assert_eq!(ShapeKind::parse(" Poly ", Some(6)), Ok(ShapeKind::Poly { vertices: Some(6) }));

        let bad = json!({ "id": 0, "name": "x", "height": 1, "width": 1, "shape": "blob" });
        assert!(serde_json::from_value::<Fixture>(bad).is_err());
    }

    #[test]
    fn test_map_record_wire_format() {
        let value = serde_json::to_value(MapRecord::default()).unwrap();
        assert_eq!(value["aspectRatio"], json!("16:10"));
        assert_eq!(value["aspectMultiplier"], json!(0.625));
        assert_eq!(value["fixtures"], json!([]));
    }
}
