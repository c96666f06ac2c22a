use std::f64::consts::FRAC_PI_2;

use glam::{DVec2, DVec3};

use crate::bounds::GeographicBounds;
use crate::error::{MeshError, MeshResult};
use crate::geodesy::{geodetic_up, reflect_over_pole};
use crate::heightfield::{extended_len, extended_sample_position};
use crate::mesh::surface_normal;

const POLE_EPSILON: f64 = 1e-9;

/// Turns extended-grid coordinates into cartesian surface points.
///
/// Columns may be fractional; heights between two border samples of the same
/// row are interpolated linearly. Rows are always whole.
pub(crate) struct Sampler<'a, F> {
    resolution: usize,
    bounds: GeographicBounds,
    elevation: &'a [f64],
    to_cartesian: F,
}

impl<'a, F> Sampler<'a, F>
where
    F: Fn(f64, f64, f64) -> DVec3,
{
    pub(crate) fn new(
        resolution: usize,
        bounds: &GeographicBounds,
        elevation: &'a [f64],
        to_cartesian: F,
    ) -> MeshResult<Self> {
        if resolution < 2 {
            return Err(MeshError::ResolutionTooSmall { resolution });
        }
        bounds.validate()?;
        let expected = extended_len(resolution);
        if elevation.len() != expected {
            return Err(MeshError::ElevationSizeMismatch {
                expected,
                actual: elevation.len(),
            });
        }
        Ok(Self {
            resolution,
            bounds: *bounds,
            elevation,
            to_cartesian,
        })
    }

    pub(crate) fn resolution(&self) -> usize {
        self.resolution
    }

    fn width(&self) -> usize {
        self.resolution + 2
    }

    fn height(&self, column: f64, row: usize) -> f64 {
        let max = (self.width() - 1) as f64;
        let column = column.clamp(0.0, max);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let left = column.floor() as usize;
        let right = (left + 1).min(self.width() - 1);
        let t = column - left as f64;
        let base = row * self.width();
        self.elevation[base + left] * (1.0 - t) + self.elevation[base + right] * t
    }

    /// Longitude/latitude of a sample, reflected back over the poles.
    pub(crate) fn lon_lat(&self, column: f64, row: usize) -> DVec2 {
        let position = extended_sample_position(&self.bounds, self.resolution, column, row as f64);
        reflect_over_pole(position.x, position.y)
    }

    pub(crate) fn point(&self, column: f64, row: usize) -> DVec3 {
        let lon_lat = self.lon_lat(column, row);
        (self.to_cartesian)(lon_lat.x, lon_lat.y, self.height(column, row))
    }

    /// Position and outward normal of the sample, using its four neighbors.
    ///
    /// `row` must be an inner row so both vertical neighbors exist. A sample
    /// sitting on a pole has no east direction and takes the geodetic vertical.
    pub(crate) fn point_and_normal(&self, column: f64, row: usize) -> (DVec3, DVec3) {
        let lon_lat = self.lon_lat(column, row);
        let up = geodetic_up(lon_lat.x, lon_lat.y);
        if FRAC_PI_2 - lon_lat.y.abs() < POLE_EPSILON {
            return (self.point(column, row), up);
        }
        let east = self.point(column + 1.0, row) - self.point(column - 1.0, row);
        let north = self.point(column, row + 1) - self.point(column, row - 1);
        (self.point(column, row), surface_normal(east, north, up))
    }

    /// Cartesian position of the tile's north-east corner at zero height.
    pub(crate) fn shift(&self) -> DVec3 {
        let corner = reflect_over_pole(self.bounds.max.x, self.bounds.max.y);
        (self.to_cartesian)(corner.x, corner.y, 0.0)
    }
}
