use anyhow::Result;
use log::{debug, info, warn};
use serde_json::json;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::db::MapStore;
use crate::error::GeometryError;
use crate::export::LayoutExporter;
use crate::model::{map_key, AspectRatio, Fixture, LedZone, MapRecord, Placement, ShapeKind, DEFAULT_KEY};
use crate::outline::{validate_shape, RenderSize};
use crate::placement::place_fixture;
use crate::sampler::regenerate_leds;
use crate::scanner::{scan_position, ScanPoint, SurfaceBox};

/// The element fixtures are drawn on.
pub trait Surface {
    /// Block until any pending layout pass has been applied.
    fn settle(&mut self) {}

    /// Current pixel box of the surface.
    fn measure(&self) -> SurfaceBox;
}

/// Surface with a fixed box, for headless use.
#[derive(Clone, Copy, Debug)]
pub struct FixedSurface(pub SurfaceBox);

impl FixedSurface {
    /// A surface `width` pixels wide at the origin, with its height
    /// following `aspect_multiplier`.
    pub fn with_width(width: f64, aspect_multiplier: f64) -> Self {
        Self(SurfaceBox::new(0.0, 0.0, width, width * aspect_multiplier))
    }
}

impl Surface for FixedSurface {
    fn measure(&self) -> SurfaceBox {
        self.0
    }
}

/// Change notifications sent to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// Active map switched; `None` means no map is loaded.
    MapChanged(Option<String>),
    /// Map-level fields (size, ratio) changed.
    MapUpdated(String),
    FixturesUpdated(String),
    /// Fixture being positioned changed.
    FixtureSelected(Option<u32>),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FixtureUpdate {
    pub name: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LedUpdate {
    pub count: Option<u32>,
    pub offset: Option<i32>,
    pub position: Option<f64>,
}

/// Editing state for one store: the active map, the fixture being placed,
/// and the surface used to size fixtures and interpret clicks.
pub struct Engine<S: MapStore, F: Surface> {
    store: S,
    surface: F,
    active_key: Option<String>,
    placing: Option<u32>,
    subscribers: Vec<Sender<EngineEvent>>,
}

impl<S: MapStore, F: Surface> Engine<S, F> {
    pub fn new(store: S, surface: F) -> Self {
        Self {
            store,
            surface,
            active_key: None,
            placing: None,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: EngineEvent) {
        // Drop subscribers whose receiver is gone
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn surface_mut(&mut self) -> &mut F {
        &mut self.surface
    }

    /// Key of the active map, or the "no map" key.
    pub fn active_key(&self) -> &str {
        self.active_key.as_deref().unwrap_or(DEFAULT_KEY)
    }

    pub fn placing(&self) -> Option<u32> {
        self.placing
    }

    // === Maps ===

    pub fn list_maps(&self) -> Result<Vec<String>> {
        self.store.list_keys()
    }

    /// Select the only map in the store, if there is exactly one.
    pub fn auto_select(&mut self) -> Result<Option<String>> {
        let keys = self.store.list_keys()?;
        if let [only] = keys.as_slice() {
            let key = only.clone();
            self.set_active(Some(key.clone()));
            return Ok(Some(key));
        }
        Ok(None)
    }

    /// Create a map with default dimensions and make it active.
    pub fn create_map(&mut self, name: &str) -> Result<String> {
        let key = map_key(name);
        self.store.save_map(&key, &MapRecord::default())?;
        info!("[MAPPER] Created map {}", key);
        self.set_active(Some(key.clone()));
        Ok(key)
    }

    /// Make `key` active. Returns false when there is no such map.
    pub fn select_map(&mut self, key: &str) -> Result<bool> {
        let key = key.trim();
        if !self.store.is_valid_key(key) || self.store.read(key)?.is_none() {
            debug!("[MAPPER] Ignoring selection of unknown map {}", key);
            return Ok(false);
        }
        self.set_active(Some(key.to_string()));
        Ok(true)
    }

    pub fn delete_map(&mut self, key: &str) -> Result<bool> {
        let removed = self.store.delete(key)?;
        if removed {
            info!("[MAPPER] Deleted map {}", key);
        }
        if self.active_key.as_deref() == Some(key) {
            self.set_active(None);
        }
        Ok(removed)
    }

    fn set_active(&mut self, key: Option<String>) {
        self.active_key = key.clone();
        if self.placing.take().is_some() {
            self.emit(EngineEvent::FixtureSelected(None));
        }
        self.emit(EngineEvent::MapChanged(key));
    }

    pub fn active_map(&self) -> Result<Option<MapRecord>> {
        match &self.active_key {
            Some(key) => self.store.load_map(key),
            None => Ok(None),
        }
    }

    /// Change the physical size of the active map and re-fit every fixture.
    /// Non-positive sizes are rejected before anything is written.
    pub fn resize_map(&mut self, width: f64, height: f64) -> Result<bool> {
        let Some(key) = self.active_key.clone() else {
            return Ok(false);
        };
        if let Err(e) = check_size(width, height) {
            warn!("[MAPPER] Resize of {} aborted: {}", key, e);
            return Err(e.into());
        }
        if self.store.read(&key)?.is_none() {
            return Ok(false);
        }
        self.store.write_field(&key, "width", json!(width))?;
        self.store.write_field(&key, "height", json!(height))?;
        self.emit(EngineEvent::MapUpdated(key));
        self.refresh_all_leds()?;
        Ok(true)
    }

    pub fn set_aspect_ratio(&mut self, ratio: AspectRatio) -> Result<bool> {
        let Some(key) = self.active_key.clone() else {
            return Ok(false);
        };
        if self.store.read(&key)?.is_none() {
            return Ok(false);
        }
        self.store.write_field(&key, "aspectMultiplier", json!(ratio.multiplier()))?;
        self.store.write_field(&key, "aspectRatio", serde_json::to_value(ratio)?)?;
        self.emit(EngineEvent::MapUpdated(key));
        self.refresh_all_leds()?;
        Ok(true)
    }

    // === Fixtures ===

    pub fn fixtures(&self) -> Result<Vec<Fixture>> {
        match &self.active_key {
            Some(key) => self.store.load_fixtures(key),
            None => Ok(Vec::new()),
        }
    }

    /// Run `edit` against a fresh read of the active map's fixtures and store
    /// the result. Nothing is written when `edit` fails or changes nothing.
    fn edit_fixtures<R>(
        &mut self,
        edit: impl FnOnce(&MapRecord, &mut Vec<Fixture>, f64) -> Result<R>,
    ) -> Result<Option<R>> {
        let Some(key) = self.active_key.clone() else {
            return Ok(None);
        };
        let Some(mut map) = self.store.load_map(&key)? else {
            return Ok(None);
        };
        let mut fixtures = std::mem::take(&mut map.fixtures);
        fixtures.sort_by_key(|f| f.id);

        self.surface.settle();
        let surface_width = self.surface.measure().width;

        let before = fixtures.clone();
        let result = edit(&map, &mut fixtures, surface_width)?;
        if fixtures == before {
            debug!("[MAPPER] No fixture changes on {}", key);
            return Ok(Some(result));
        }
        self.store.store_fixtures(&key, &fixtures)?;
        self.emit(EngineEvent::FixturesUpdated(key));
        Ok(Some(result))
    }

    pub fn add_fixture(&mut self, name: &str, width: f64, height: f64) -> Result<Option<u32>> {
        self.edit_fixtures(|_, fixtures, _| {
            check_size(width, height)?;
            let id = crate::model::next_fixture_id(fixtures);
            fixtures.push(Fixture::new(id, name, width, height));
            info!("[MAPPER] Added fixture {} '{}'", id, name);
            Ok(id)
        })
    }

    /// Rename or resize a fixture. Returns `Ok(None)` for unknown ids.
    pub fn update_fixture(&mut self, id: u32, update: FixtureUpdate) -> Result<Option<Fixture>> {
        self.edit_existing(id, "update", |map, fixture, surface_width| {
            let mut next = fixture.clone();
            if let Some(name) = &update.name {
                next.name = name.clone();
            }
            next.width = update.width.unwrap_or(next.width);
            next.height = update.height.unwrap_or(next.height);
            check_size(next.width, next.height)?;
            if next.width != fixture.width || next.height != fixture.height {
                refresh_leds(&mut next, map, surface_width)?;
            }
            Ok(next)
        })
    }

    pub fn set_shape(&mut self, id: u32, shape: ShapeKind) -> Result<Option<Fixture>> {
        self.edit_existing(id, "shape", |map, fixture, surface_width| {
            let mut next = fixture.clone();
            next.shape = shape;
            refresh_leds(&mut next, map, surface_width)?;
            Ok(next)
        })
    }

    pub fn set_led_params(&mut self, id: u32, update: LedUpdate) -> Result<Option<Fixture>> {
        self.edit_existing(id, "leds", |map, fixture, surface_width| {
            let mut next = fixture.clone();
            if update.count.is_some() {
                next.led_count = update.count;
            }
            if update.offset.is_some() {
                next.led_offset = update.offset;
            }
            if let Some(position) = update.position {
                next.led_position = Some(position.max(0.0));
            }
            refresh_leds(&mut next, map, surface_width)?;
            Ok(next)
        })
    }

    fn edit_existing(
        &mut self,
        id: u32,
        action: &'static str,
        edit: impl FnOnce(&MapRecord, &Fixture, f64) -> Result<Fixture, GeometryError>,
    ) -> Result<Option<Fixture>> {
        let edited = self.edit_fixtures(|map, fixtures, surface_width| {
            let Some(slot) = fixtures.iter_mut().find(|f| f.id == id) else {
                return Ok(None);
            };
            match edit(map, slot, surface_width) {
                Ok(next) => {
                    *slot = next.clone();
                    Ok(Some(next))
                }
                Err(e) => {
                    warn!("[MAPPER] Fixture {} {} aborted: {}", id, action, e);
                    Err(e.into())
                }
            }
        })?;
        Ok(edited.flatten())
    }

    pub fn delete_fixture(&mut self, id: u32) -> Result<bool> {
        let removed = self
            .edit_fixtures(|_, fixtures, _| {
                let before = fixtures.len();
                fixtures.retain(|f| f.id != id);
                Ok(fixtures.len() != before)
            })?
            .unwrap_or(false);

        if removed && self.placing == Some(id) {
            self.placing = None;
            self.emit(EngineEvent::FixtureSelected(None));
        }
        Ok(removed)
    }

    /// Regenerate LEDs for every fixture of the active map. Fixtures whose
    /// geometry is invalid keep their previous LEDs.
    pub fn refresh_all_leds(&mut self) -> Result<usize> {
        let refreshed = self.edit_fixtures(|map, fixtures, surface_width| {
            let mut refreshed = 0;
            for fixture in fixtures.iter_mut() {
                match refresh_leds(fixture, map, surface_width) {
                    Ok(()) => refreshed += 1,
                    Err(e) => warn!("[MAPPER] Keeping LEDs of fixture {}: {}", fixture.id, e),
                }
            }
            Ok(refreshed)
        })?;
        Ok(refreshed.unwrap_or(0))
    }

    // === Placement ===

    /// Pick the fixture that subsequent clicks will position. Unknown ids
    /// clear the selection.
    pub fn select_fixture(&mut self, id: Option<u32>) -> Result<Option<u32>> {
        let fixtures = self.fixtures()?;
        let selected = id.filter(|id| fixtures.iter().any(|f| f.id == *id));
        self.placing = selected;
        self.emit(EngineEvent::FixtureSelected(selected));
        Ok(selected)
    }

    /// Handle a click at pixel `(x, y)` on the surface.
    ///
    /// Does nothing unless a fixture is selected for placement.
    pub fn click(&mut self, x: f64, y: f64) -> Result<Option<Placement>> {
        if self.placing.is_none() {
            debug!("[MAPPER] Click ignored, no fixture selected");
            return Ok(None);
        }
        self.surface.settle();
        let surface = self.surface.measure();
        let scan = scan_position(x, y, &surface).map_err(|e| {
            warn!("[MAPPER] Click aborted: {}", e);
            e
        })?;
        self.place_at(scan)
    }

    /// Centre the selected fixture on `scan` and persist it.
    pub fn place_at(&mut self, scan: ScanPoint) -> Result<Option<Placement>> {
        let Some(id) = self.placing else {
            return Ok(None);
        };
        let placed = self.edit_fixtures(|map, fixtures, _| {
            let Some(fixture) = fixtures.iter_mut().find(|f| f.id == id) else {
                return Ok(None);
            };
            let placement = place_fixture(fixture, map, scan).map_err(|e| {
                warn!("[MAPPER] Placement of fixture {} aborted: {}", id, e);
                e
            })?;
            debug!("[MAPPER] Fixture {} placed at ({}, {})", id, placement.x, placement.y);
            Ok(Some(placement))
        })?;
        Ok(placed.flatten())
    }

    // === Export ===

    pub fn export(&self, exporter: &LayoutExporter) -> Result<Vec<LedZone>> {
        self.export_map(self.active_key(), exporter)
    }

    /// Payload for `key`; unknown maps export nothing.
    pub fn export_map(&self, key: &str, exporter: &LayoutExporter) -> Result<Vec<LedZone>> {
        let zones = match self.store.load_map(key)? {
            Some(map) => exporter.export(&map),
            None => Vec::new(),
        };
        info!("[EXPORT] {} LED zone(s) from {}", zones.len(), key);
        Ok(zones)
    }
}

fn check_size(width: f64, height: f64) -> Result<(), GeometryError> {
    if width > 0.0 && height > 0.0 {
        Ok(())
    } else {
        Err(GeometryError::InvalidSurfaceMeasurement { width, height })
    }
}

/// Regenerate one fixture's LEDs at its current render size.
fn refresh_leds(fixture: &mut Fixture, map: &MapRecord, surface_width: f64) -> Result<(), GeometryError> {
    validate_shape(&fixture.shape)?;
    if matches!(fixture.shape, ShapeKind::Custom | ShapeKind::None) {
        fixture.leds = None;
        return Ok(());
    }
    let size = RenderSize::for_fixture(map, fixture, surface_width)?;
    regenerate_leds(fixture, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, SqliteStore};
    use crate::export::ClampMode;

    fn engine() -> Engine<MemoryStore, FixedSurface> {
        // 16:10 surface, 1200 x 750 px
        Engine::new(MemoryStore::new(), FixedSurface::with_width(1200.0, 0.625))
    }

    #[test]
    fn test_create_select_delete_map() {
        let mut engine = engine();
        let events = engine.subscribe();

        let key = engine.create_map("Living Room").unwrap();
        assert_eq!(key, "hlm-living_room");
        assert_eq!(engine.active_key(), "hlm-living_room");
        assert_eq!(events.try_recv().unwrap(), EngineEvent::MapChanged(Some(key.clone())));

        let map = engine.active_map().unwrap().unwrap();
        assert_eq!((map.width, map.height), (80.0, 50.0));
        assert_eq!(map.aspect_ratio, AspectRatio::Wide);

        assert!(!engine.select_map("hlm-nope").unwrap());
        assert_eq!(engine.active_key(), key);

        assert!(engine.delete_map(&key).unwrap());
        assert_eq!(engine.active_key(), DEFAULT_KEY);
        assert!(engine.active_map().unwrap().is_none());
        assert_eq!(events.try_recv().unwrap(), EngineEvent::MapChanged(None));
    }

    #[test]
    fn test_deleting_other_map_keeps_selection() {
        let mut engine = engine();
        engine.create_map("a").unwrap();
        engine.create_map("b").unwrap();
        engine.delete_map("hlm-a").unwrap();
        assert_eq!(engine.active_key(), "hlm-b");
    }

    #[test]
    fn test_auto_select_single_map() {
        let mut store = MemoryStore::new();
        store.save_map("hlm-only", &MapRecord::default()).unwrap();
        let mut engine = Engine::new(store, FixedSurface::with_width(1200.0, 0.625));
        assert_eq!(engine.auto_select().unwrap().as_deref(), Some("hlm-only"));
        assert_eq!(engine.active_key(), "hlm-only");
    }

    #[test]
    fn test_fixture_ids_use_max_plus_one() {
        let mut engine = engine();
        assert_eq!(engine.add_fixture("x", 1.0, 1.0).unwrap(), None);

        engine.create_map("wall").unwrap();
        assert_eq!(engine.add_fixture("a", 10.0, 10.0).unwrap(), Some(0));
        assert_eq!(engine.add_fixture("b", 10.0, 10.0).unwrap(), Some(1));
        assert_eq!(engine.add_fixture("c", 10.0, 10.0).unwrap(), Some(2));

        assert!(engine.delete_fixture(1).unwrap());
        assert_eq!(engine.add_fixture("d", 10.0, 10.0).unwrap(), Some(3));

        assert!(engine.delete_fixture(3).unwrap());
        assert!(engine.delete_fixture(2).unwrap());
        // highest remaining id is 0
        assert_eq!(engine.add_fixture("e", 10.0, 10.0).unwrap(), Some(1));
        assert!(!engine.delete_fixture(42).unwrap());
    }

    #[test]
    fn test_shape_and_leds() {
        let mut engine = engine();
        engine.create_map("wall").unwrap();
        engine.add_fixture("panel", 20.0, 10.0).unwrap();

        engine.set_led_params(0, LedUpdate { count: Some(8), ..Default::default() }).unwrap();
        // no shape yet, nothing sampled
        assert!(engine.fixtures().unwrap()[0].leds.is_none());

        let fixture = engine.set_shape(0, ShapeKind::Square).unwrap().unwrap();
        assert_eq!(fixture.led_list().len(), 8);
        for [x, y] in fixture.led_list() {
            assert!((0.0..=1.0).contains(x) && (0.0..=1.0).contains(y));
        }
        assert_eq!(engine.fixtures().unwrap()[0], fixture);

        // rendered at 300 x 150: first LED sits on the inset top-left corner
        assert_eq!(fixture.led_list()[0], [0.0067, 0.0133]);
    }

    #[test]
    fn test_bad_shape_keeps_stored_fixture() {
        let mut engine = engine();
        engine.create_map("wall").unwrap();
        engine.add_fixture("panel", 20.0, 10.0).unwrap();
        engine.set_led_params(0, LedUpdate { count: Some(4), ..Default::default() }).unwrap();
        let before = engine.set_shape(0, ShapeKind::Circle).unwrap().unwrap();

        let err = engine.set_shape(0, ShapeKind::Poly { vertices: Some(2) }).unwrap_err();
        assert!(err.downcast_ref::<GeometryError>().is_some());
        assert_eq!(engine.fixtures().unwrap()[0], before);
    }

    #[test]
    fn test_custom_shape_clears_leds() {
        let mut engine = engine();
        engine.create_map("wall").unwrap();
        engine.add_fixture("panel", 20.0, 10.0).unwrap();
        engine.set_led_params(0, LedUpdate { count: Some(4), ..Default::default() }).unwrap();
        engine.set_shape(0, ShapeKind::Star { vertices: Some(5) }).unwrap();
        assert_eq!(engine.fixtures().unwrap()[0].led_list().len(), 4);

        let fixture = engine.set_shape(0, ShapeKind::Custom).unwrap().unwrap();
        assert!(fixture.leds.is_none());
    }

    #[test]
    fn test_click_requires_selection() {
        let mut engine = engine();
        engine.create_map("wall").unwrap();
        engine.add_fixture("panel", 20.0, 10.0).unwrap();

        assert_eq!(engine.click(600.0, 375.0).unwrap(), None);
        assert_eq!(engine.fixtures().unwrap()[0].coords, Placement::default());

        assert_eq!(engine.select_fixture(Some(9)).unwrap(), None);
        assert_eq!(engine.select_fixture(Some(0)).unwrap(), Some(0));

        let placed = engine.click(600.0, 375.0).unwrap().unwrap();
        assert_eq!(placed, Placement { x: 0.375, y: 0.4 });
        assert_eq!(engine.fixtures().unwrap()[0].coords, placed);

        let placed = engine.click(60.0, 37.5).unwrap().unwrap();
        assert_eq!(placed, Placement { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_click_on_degenerate_surface_aborts() {
        let mut engine = engine();
        engine.create_map("wall").unwrap();
        engine.add_fixture("panel", 20.0, 10.0).unwrap();
        engine.select_fixture(Some(0)).unwrap();

        engine.surface_mut().0.width = 0.0;
        let err = engine.click(10.0, 10.0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GeometryError>(),
            Some(GeometryError::InvalidSurfaceMeasurement { .. })
        ));
        assert_eq!(engine.fixtures().unwrap()[0].coords, Placement::default());
    }

    #[test]
    fn test_deleting_placed_fixture_clears_selection() {
        let mut engine = engine();
        engine.create_map("wall").unwrap();
        engine.add_fixture("panel", 20.0, 10.0).unwrap();
        engine.select_fixture(Some(0)).unwrap();
        engine.delete_fixture(0).unwrap();
        assert_eq!(engine.placing(), None);
        assert_eq!(engine.place_at(ScanPoint { hscan: 0.5, vscan: 0.5 }).unwrap(), None);
    }

    #[test]
    fn test_resize_regenerates_leds() {
        let mut engine = engine();
        engine.create_map("wall").unwrap();
        engine.add_fixture("panel", 20.0, 10.0).unwrap();
        engine.set_led_params(0, LedUpdate { count: Some(4), ..Default::default() }).unwrap();
        let before = engine.set_shape(0, ShapeKind::Square).unwrap().unwrap();

        assert!(engine.resize_map(160.0, 100.0).unwrap());
        let after = engine.fixtures().unwrap().remove(0);
        assert_eq!(after.led_list().len(), 4);
        // half the render size, so the 2px inset is a larger fraction
        assert_ne!(after.leds, before.leds);

        let map = engine.active_map().unwrap().unwrap();
        assert_eq!((map.width, map.height), (160.0, 100.0));
    }

    #[test]
    fn test_resize_to_empty_size_is_rejected() {
        let mut engine = engine();
        engine.create_map("wall").unwrap();
        engine.add_fixture("panel", 20.0, 10.0).unwrap();
        let before = engine.active_map().unwrap().unwrap();

        for (width, height) in [(0.0, -5.0), (80.0, 0.0), (f64::NAN, 50.0)] {
            let err = engine.resize_map(width, height).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<GeometryError>(),
                Some(GeometryError::InvalidSurfaceMeasurement { .. })
            ));
        }
        assert_eq!(engine.active_map().unwrap().unwrap(), before);

        // Map is still usable
        engine.select_fixture(Some(0)).unwrap();
        assert!(engine.place_at(ScanPoint { hscan: 0.5, vscan: 0.5 }).unwrap().is_some());
    }

    #[test]
    fn test_fixture_size_must_be_positive() {
        let mut engine = engine();
        engine.create_map("wall").unwrap();
        engine.add_fixture("panel", 20.0, 10.0).unwrap();
        let before = engine.fixtures().unwrap();

        let update = FixtureUpdate { width: Some(0.0), ..Default::default() };
        let err = engine.update_fixture(0, update).unwrap_err();
        assert!(err.downcast_ref::<GeometryError>().is_some());
        assert!(engine.add_fixture("flat", 10.0, -1.0).is_err());
        assert_eq!(engine.fixtures().unwrap(), before);
    }

    #[test]
    fn test_unchanged_edit_writes_nothing() {
        let mut engine = engine();
        engine.create_map("wall").unwrap();
        engine.add_fixture("panel", 20.0, 10.0).unwrap();
        let events = engine.subscribe();

        assert!(!engine.delete_fixture(7).unwrap());
        assert_eq!(engine.update_fixture(7, FixtureUpdate::default()).unwrap(), None);
        assert!(events.try_recv().is_err());

        assert!(engine.delete_fixture(0).unwrap());
        assert_eq!(events.try_recv().unwrap(), EngineEvent::FixturesUpdated("hlm-wall".to_string()));
    }

    #[test]
    fn test_two_engines_share_a_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps.db");
        let surface = || FixedSurface::with_width(1200.0, 0.625);
        let mut a = Engine::new(SqliteStore::open(&path).unwrap(), surface());
        let mut b = Engine::new(SqliteStore::open(&path).unwrap(), surface());

        let key = a.create_map("wall").unwrap();
        assert!(b.select_map(&key).unwrap());

        assert_eq!(a.add_fixture("left", 20.0, 10.0).unwrap(), Some(0));
        // b re-reads before editing, so it sees fixture 0
        assert_eq!(b.add_fixture("right", 20.0, 10.0).unwrap(), Some(1));
        b.set_led_params(1, LedUpdate { count: Some(4), ..Default::default() }).unwrap();
        assert!(b.delete_fixture(0).unwrap());

        // a's next edit must not bring fixture 0 back or drop b's changes
        assert_eq!(a.add_fixture("top", 10.0, 10.0).unwrap(), Some(2));
        let fixtures = b.fixtures().unwrap();
        let ids: Vec<u32> = fixtures.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(fixtures[0].name, "right");
        assert_eq!(fixtures[0].led_count, Some(4));
        assert_eq!(a.fixtures().unwrap(), fixtures);
    }

    #[test]
    fn test_aspect_ratio_keeps_table_in_sync() {
        let mut engine = engine();
        engine.create_map("wall").unwrap();
        engine.set_aspect_ratio(AspectRatio::Widescreen).unwrap();
        let map = engine.active_map().unwrap().unwrap();
        assert_eq!(map.aspect_ratio, AspectRatio::Widescreen);
        assert_eq!(map.aspect_multiplier, 0.5625);
    }

    #[test]
    fn test_export_active_map() {
        let mut engine = engine();
        assert!(engine.export(&LayoutExporter::default()).unwrap().is_empty());

        engine.create_map("wall").unwrap();
        engine.add_fixture("b", 20.0, 10.0).unwrap();
        engine.add_fixture("a", 20.0, 10.0).unwrap();
        for id in [0, 1] {
            engine.set_led_params(id, LedUpdate { count: Some(4), offset: Some(1), ..Default::default() }).unwrap();
            engine.set_shape(id, ShapeKind::Square).unwrap();
        }
        engine.select_fixture(Some(1)).unwrap();
        engine.place_at(ScanPoint { hscan: 0.9, vscan: 0.9 }).unwrap();

        let zones = engine.export(&LayoutExporter::new(ClampMode::Clamp)).unwrap();
        assert_eq!(zones.len(), 8);
        for z in &zones {
            for v in [z.hmin, z.hmax, z.vmin, z.vmax] {
                assert!((0.0..=1.0).contains(&v));
            }
        }
        // Fixture 0 sits at the origin and starts from its second LED, a
        // quarter of the perimeter along the top edge
        let first = zones[0];
        assert_eq!(first.hmax, 0.1958);
        assert_eq!(first.vmin, 0.0);

        let again = engine.export(&LayoutExporter::new(ClampMode::Clamp)).unwrap();
        assert_eq!(zones, again);
    }
}
