//! Distance-based level-of-detail metric.
//!
//! The metric estimates the quadtree depth a tile should be shown at:
//!
//! ```text
//! metric = log2(radius · detail / (max(distance, min_distance) · tan(fov / 2) · distance_scale))
//! ```
//!
//! A tile at `level` refines while `metric >= level + 1`. Halving the distance
//! raises the metric by one, matching the halving of tile size per level.
//!
//! A box infinitely far away scores `-inf`, the coarsest possible level. Any
//! other non-finite result, including one from a zero field of view, is an
//! [`Error::DegenerateMetric`].

use glam::DVec3;

use crate::arena::TileId;
use crate::camera::{Aabb, Camera};
use crate::config::LodConfig;
use crate::error::{Error, Result};

/// LOD metric inputs for one camera and planet.
#[derive(Debug, Clone, Copy)]
pub struct LodMetric {
    camera_position: DVec3,
    tan_half_fov: f64,
    planet_radius: f64,
    detail: f64,
    distance_scale: f64,
    min_distance: f64,
}

impl LodMetric {
    #[must_use]
    pub fn new(camera: &Camera, planet_radius: f64, config: &LodConfig) -> Self {
        Self {
            camera_position: camera.position,
            tan_half_fov: (camera.fov_y * 0.5).tan(),
            planet_radius,
            detail: config.detail(),
            distance_scale: config.distance_scale,
            min_distance: config.min_distance,
        }
    }

    /// Metric for a box at `distance` meters from the camera.
    pub fn at_distance(&self, distance: f64) -> Result<f64> {
        if distance.is_nan() {
            return Err(Error::DegenerateMetric {
                detail: "distance is NaN".to_string(),
            });
        }
        if !(self.tan_half_fov.is_finite() && self.tan_half_fov > 0.0) {
            return Err(Error::DegenerateMetric {
                detail: format!("tan(fov/2) is {}", self.tan_half_fov),
            });
        }
        if distance.is_infinite() {
            return Ok(f64::NEG_INFINITY);
        }
        let distance = distance.max(self.min_distance);
        let metric = (self.planet_radius * self.detail
            / (distance * self.tan_half_fov * self.distance_scale))
            .log2();
        if !metric.is_finite() {
            return Err(Error::DegenerateMetric {
                detail: format!(
                    "radius {} detail {} distance {distance} tan(fov/2) {}",
                    self.planet_radius, self.detail, self.tan_half_fov
                ),
            });
        }
        Ok(metric)
    }

    /// Metric for a tile, measured to the nearest point of its bounding box.
    pub fn for_tile(&self, tile: TileId, bounding_box: Option<&Aabb>) -> Result<f64> {
        let bounding_box = bounding_box.ok_or(Error::MissingBoundingBox { tile })?;
        self.at_distance(bounding_box.distance_to(self.camera_position))
    }
}
