//! LED fixture mapping: fixture outlines, LED sampling, placement on a map,
//! and export of the resulting LED layout for a lighting controller.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod model;
pub mod outline;
pub mod placement;
pub mod sampler;
pub mod scanner;

pub use db::{MapStore, MemoryStore, SqliteStore};
pub use engine::{Engine, EngineEvent, FixedSurface, Surface};
pub use error::GeometryError;
pub use export::{ClampMode, LayoutExporter};
pub use model::{AspectRatio, Fixture, LedZone, MapRecord, Placement, ShapeKind};
