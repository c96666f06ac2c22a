//! Bordered heightfields and the sampling helpers built on them.
//!
//! A tile of resolution `R` stores `R × R` samples covering its bounds edge to
//! edge, plus a one-sample border on every side: the *extended* array is
//! `(R + 2) × (R + 2)`, row-major, row 0 being the border south of the tile
//! and column 0 the border west of it.

use glam::DVec2;

use crate::bounds::GeographicBounds;
use crate::error::{MeshError, MeshResult};
use crate::geodesy::reflect_over_pole;

/// Spacing between neighboring samples of a tile, in radians.
#[must_use]
pub fn sample_step(bounds: &GeographicBounds, resolution: usize) -> DVec2 {
    let intervals = resolution.saturating_sub(1).max(1) as f64;
    DVec2::new(bounds.width() / intervals, bounds.height() / intervals)
}

/// Longitude/latitude of an extended-grid sample, before pole reflection.
#[must_use]
pub fn extended_sample_position(
    bounds: &GeographicBounds,
    resolution: usize,
    column: f64,
    row: f64,
) -> DVec2 {
    let step = sample_step(bounds, resolution);
    DVec2::new(
        bounds.min.x + (column - 1.0) * step.x,
        bounds.min.y + (row - 1.0) * step.y,
    )
}

/// Number of samples in the extended array of a tile.
#[must_use]
pub const fn extended_len(resolution: usize) -> usize {
    (resolution + 2) * (resolution + 2)
}

/// A square heightfield with a one-sample border.
#[derive(Debug, Clone, PartialEq)]
pub struct Heightfield {
    resolution: usize,
    extended: Vec<f64>,
}

impl Heightfield {
    /// Wrap an extended array, checking its size against `resolution`.
    pub fn new(resolution: usize, extended: Vec<f64>) -> MeshResult<Self> {
        if resolution < 2 {
            return Err(MeshError::ResolutionTooSmall { resolution });
        }
        let expected = extended_len(resolution);
        if extended.len() != expected {
            return Err(MeshError::ElevationSizeMismatch {
                expected,
                actual: extended.len(),
            });
        }
        Ok(Self {
            resolution,
            extended,
        })
    }

    /// A heightfield of zeros.
    pub fn flat(resolution: usize) -> MeshResult<Self> {
        Self::new(resolution, vec![0.0; extended_len(resolution)])
    }

    /// Sample `height(lon, lat)` over the extended grid of `bounds`.
    ///
    /// Border samples that fall past a pole are reflected before `height` is
    /// evaluated, so the border carries the real terrain across the pole.
    pub fn from_fn(
        resolution: usize,
        bounds: &GeographicBounds,
        mut height: impl FnMut(f64, f64) -> f64,
    ) -> MeshResult<Self> {
        if resolution < 2 {
            return Err(MeshError::ResolutionTooSmall { resolution });
        }
        bounds.validate()?;

        let width = resolution + 2;
        let mut extended = Vec::with_capacity(extended_len(resolution));
        for row in 0..width {
            for column in 0..width {
                let position =
                    extended_sample_position(bounds, resolution, column as f64, row as f64);
                let sample = reflect_over_pole(position.x, position.y);
                extended.push(height(sample.x, sample.y));
            }
        }
        Self::new(resolution, extended)
    }

    #[must_use]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Samples per extended row.
    #[must_use]
    pub fn extended_width(&self) -> usize {
        self.resolution + 2
    }

    /// The raw extended array.
    #[must_use]
    pub fn extended(&self) -> &[f64] {
        &self.extended
    }

    /// Sample of the extended grid at integer coordinates.
    #[must_use]
    pub fn extended_at(&self, column: usize, row: usize) -> f64 {
        self.extended[row * self.extended_width() + column]
    }

    /// The `R × R` samples inside the border, row-major.
    #[must_use]
    pub fn inner(&self) -> Vec<f64> {
        let mut inner = Vec::with_capacity(self.resolution * self.resolution);
        for row in 1..=self.resolution {
            let start = row * self.extended_width() + 1;
            inner.extend_from_slice(&self.extended[start..start + self.resolution]);
        }
        inner
    }

    /// Bilinear sample at fractional extended-grid coordinates, clamped to the grid.
    #[must_use]
    pub fn bilinear_extended(&self, column: f64, row: f64) -> f64 {
        bilinear(&self.extended, self.extended_width(), column, row)
    }

    /// Height at a lon/lat inside `bounds`, interpolated from the inner samples.
    ///
    /// Returns `None` when the point lies outside `bounds`.
    #[must_use]
    pub fn elevation_at(&self, bounds: &GeographicBounds, lon_lat: DVec2) -> Option<f64> {
        if !bounds.contains(lon_lat) {
            return None;
        }
        let step = sample_step(bounds, self.resolution);
        let column = if step.x > 0.0 {
            (lon_lat.x - bounds.min.x) / step.x
        } else {
            0.0
        };
        let row = if step.y > 0.0 {
            (lon_lat.y - bounds.min.y) / step.y
        } else {
            0.0
        };
        Some(self.bilinear_extended(column + 1.0, row + 1.0))
    }

    /// Derive the heightfield of `child` (a region of `parent`) by resampling.
    ///
    /// Every child sample, border included, must fall within the parent's
    /// extended grid; samples that overshoot it are clamped to the edge.
    pub fn resample(
        &self,
        parent: &GeographicBounds,
        child: &GeographicBounds,
        resolution: usize,
    ) -> MeshResult<Self> {
        if resolution < 2 {
            return Err(MeshError::ResolutionTooSmall { resolution });
        }
        child.validate()?;

        let parent_step = sample_step(parent, self.resolution);
        let width = resolution + 2;
        let mut extended = Vec::with_capacity(extended_len(resolution));
        for row in 0..width {
            for column in 0..width {
                let position =
                    extended_sample_position(child, resolution, column as f64, row as f64);
                let parent_column = (position.x - parent.min.x) / parent_step.x + 1.0;
                let parent_row = (position.y - parent.min.y) / parent_step.y + 1.0;
                extended.push(self.bilinear_extended(parent_column, parent_row));
            }
        }
        Self::new(resolution, extended)
    }
}

/// Bilinear interpolation on a square row-major grid of `width × width`.
fn bilinear(samples: &[f64], width: usize, column: f64, row: f64) -> f64 {
    let max = (width - 1) as f64;
    let column = column.clamp(0.0, max);
    let row = row.clamp(0.0, max);

    // Truncation is safe: both coordinates are clamped to the grid.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (c0, r0) = (column.floor() as usize, row.floor() as usize);
    let c1 = (c0 + 1).min(width - 1);
    let r1 = (r0 + 1).min(width - 1);
    let fc = column - c0 as f64;
    let fr = row - r0 as f64;

    let south = samples[r0 * width + c0] * (1.0 - fc) + samples[r0 * width + c1] * fc;
    let north = samples[r1 * width + c0] * (1.0 - fc) + samples[r1 * width + c1] * fc;
    south * (1.0 - fr) + north * fr
}
