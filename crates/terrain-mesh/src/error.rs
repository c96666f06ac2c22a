//! Error types for mesh generation.

use std::fmt;

/// Errors that can occur while building a terrain tile mesh.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshError {
    /// Fewer than two samples per edge were requested.
    ResolutionTooSmall {
        /// The requested samples per edge.
        resolution: usize,
    },
    /// The heightfield does not match the requested resolution.
    ElevationSizeMismatch {
        /// Samples the resolution calls for, border ring included.
        expected: usize,
        /// Samples the heightfield holds.
        actual: usize,
    },
    /// Bounds are empty, inverted or not finite.
    InvalidBounds {
        /// Which bound was rejected and why.
        detail: String,
    },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolutionTooSmall { resolution } => {
                write!(f, "mesh resolution must be at least 2, got {resolution}")
            }
            Self::ElevationSizeMismatch { expected, actual } => {
                write!(
                    f,
                    "elevation array size mismatch: expected {expected} samples, got {actual}"
                )
            }
            Self::InvalidBounds { detail } => write!(f, "invalid bounds: {detail}"),
        }
    }
}

impl std::error::Error for MeshError {}

/// Result type for mesh generation.
pub type MeshResult<T> = Result<T, MeshError>;
