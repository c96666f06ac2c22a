//! Error types for the globe crate.

use std::fmt;

use terrain_mesh::{GeographicBounds, MeshError};

use crate::arena::TileId;
use crate::layer::LayerId;

/// Result type for globe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the terrain quadtree.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Mesh generation rejected its input.
    Mesh(MeshError),
    /// A layer was asked for data outside the area it covers.
    OutOfCoverage {
        /// The layer that rejected the request.
        layer: LayerId,
        /// The requested area.
        bounds: GeographicBounds,
    },
    /// A layer source failed to produce data.
    Source {
        /// The layer whose source failed.
        layer: LayerId,
        /// The error message.
        message: String,
    },
    /// The request was cancelled before it delivered.
    Aborted,
    /// The tile handle refers to a tile that has been disposed.
    Disposed {
        /// The stale handle.
        tile: TileId,
    },
    /// The tile has no bounding box to measure its distance against.
    MissingBoundingBox {
        /// The tile being measured.
        tile: TileId,
    },
    /// The LOD metric could not be evaluated to a finite value.
    DegenerateMetric {
        /// What went into the metric.
        detail: String,
    },
    /// A configuration value is out of range.
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        detail: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Mesh(e) => write!(f, "mesh error: {e}"),
            Error::OutOfCoverage { layer, bounds } => {
                write!(
                    f,
                    "layer {layer} does not cover {:?}..{:?}",
                    bounds.min, bounds.max
                )
            }
            Error::Source { layer, message } => {
                write!(f, "layer {layer} source failed: {message}")
            }
            Error::Aborted => write!(f, "request aborted"),
            Error::Disposed { tile } => write!(f, "tile {tile} has been disposed"),
            Error::MissingBoundingBox { tile } => {
                write!(f, "tile {tile} has no bounding box")
            }
            Error::DegenerateMetric { detail } => write!(f, "degenerate LOD metric: {detail}"),
            Error::InvalidConfig { field, detail } => {
                write!(f, "invalid config field {field}: {detail}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Mesh(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MeshError> for Error {
    fn from(e: MeshError) -> Self {
        Error::Mesh(e)
    }
}
