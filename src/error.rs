use thiserror::Error;

/// Failures raised by the geometry and placement code.
///
/// These abort the single interaction that triggered them. Nothing is
/// written to the store when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("invalid surface measurement: {width} x {height}")]
    InvalidSurfaceMeasurement { width: f64, height: f64 },

    #[error("invalid shape parameters for {kind}: vertices = {vertices}, need at least 3")]
    InvalidShapeParameters { kind: &'static str, vertices: u32 },
}

pub type GeometryResult<T> = std::result::Result<T, GeometryError>;

/// Shape name that is not one of the known outlines.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown fixture shape '{0}'")]
pub struct UnknownShape(pub String);
