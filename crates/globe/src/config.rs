//! Planet and level-of-detail configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Class of device the globe is rendered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Mobile,
}

impl DeviceClass {
    /// Scale applied to the detail multiplier.
    #[must_use]
    pub fn detail_factor(self) -> f64 {
        match self {
            DeviceClass::Desktop => 1.0,
            DeviceClass::Mobile => 0.5,
        }
    }
}

/// Constants of the distance-to-depth mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// User-facing detail knob; higher refines sooner.
    pub detail_multiplier: f64,
    pub device_class: DeviceClass,
    /// Divisor folded into the camera distance.
    pub distance_scale: f64,
    /// Distances below this (meters) are clamped to it.
    pub min_distance: f64,
    /// Hard cap on quadtree depth.
    pub max_level: u32,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            detail_multiplier: 1.0,
            device_class: DeviceClass::Desktop,
            distance_scale: 0.25,
            min_distance: 1.0,
            max_level: 22,
        }
    }
}

impl LodConfig {
    /// Effective detail after the device class is applied.
    #[must_use]
    pub fn detail(&self) -> f64 {
        self.detail_multiplier * self.device_class.detail_factor()
    }
}

/// Configuration of a [`Planet`](crate::Planet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetConfig {
    /// Samples per tile edge.
    pub tile_resolution: usize,
    /// Imagery requested per tile, in texels per edge.
    pub imagery_size: u32,
    /// Time spent starting queued tile loads per update, in milliseconds.
    pub load_budget_ms: f64,
    /// Minimum time between quadtree updates; zero updates every call.
    pub update_interval_ms: f64,
    /// Keep refining tiles that are outside the view frustum.
    pub preload_outside_view: bool,
    pub lod: LodConfig,
}

impl Default for PlanetConfig {
    fn default() -> Self {
        Self {
            tile_resolution: 32,
            imagery_size: 256,
            load_budget_ms: 1.0,
            update_interval_ms: 0.0,
            preload_outside_view: false,
            lod: LodConfig::default(),
        }
    }
}

impl PlanetConfig {
    /// Check every field against its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.tile_resolution < 2 {
            return Err(invalid(
                "tile_resolution",
                format!("must be at least 2, got {}", self.tile_resolution),
            ));
        }
        if self.imagery_size == 0 {
            return Err(invalid("imagery_size", "must be positive".to_string()));
        }
        if !(self.load_budget_ms.is_finite() && self.load_budget_ms >= 0.0) {
            return Err(invalid(
                "load_budget_ms",
                format!("must be a non-negative number, got {}", self.load_budget_ms),
            ));
        }
        if !(self.update_interval_ms.is_finite() && self.update_interval_ms >= 0.0) {
            return Err(invalid(
                "update_interval_ms",
                format!("must be a non-negative number, got {}", self.update_interval_ms),
            ));
        }
        let lod = &self.lod;
        if !(lod.detail_multiplier.is_finite() && lod.detail_multiplier > 0.0) {
            return Err(invalid(
                "lod.detail_multiplier",
                format!("must be positive, got {}", lod.detail_multiplier),
            ));
        }
        if !(lod.distance_scale.is_finite() && lod.distance_scale > 0.0) {
            return Err(invalid(
                "lod.distance_scale",
                format!("must be positive, got {}", lod.distance_scale),
            ));
        }
        if !(lod.min_distance.is_finite() && lod.min_distance > 0.0) {
            return Err(invalid(
                "lod.min_distance",
                format!("must be positive, got {}", lod.min_distance),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, detail: String) -> Error {
    Error::InvalidConfig { field, detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PlanetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tile_resolution, 32);
        assert!((config.lod.distance_scale - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PlanetConfig = serde_json::from_str(
            r#"{ "tile_resolution": 16, "lod": { "device_class": "mobile" } }"#,
        )
        .unwrap();
        assert_eq!(config.tile_resolution, 16);
        assert_eq!(config.lod.device_class, DeviceClass::Mobile);
        assert!((config.lod.detail() - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.lod.max_level, 22);
    }

    #[test]
    fn test_rejects_small_resolution() {
        let config = PlanetConfig {
            tile_resolution: 1,
            ..PlanetConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig {
                field: "tile_resolution",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_nonpositive_lod_constants() {
        let mut config = PlanetConfig::default();
        config.lod.distance_scale = 0.0;
        assert!(config.validate().is_err());

        let mut config = PlanetConfig::default();
        config.lod.min_distance = f64::NAN;
        assert!(config.validate().is_err());
    }
}
