//! Procedural reference sources.
//!
//! These produce data synchronously from closed-form functions. The simulator
//! drives a planet with them and the tests use them as deterministic stand-ins
//! for remote services.

use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use terrain_mesh::{GeographicBounds, Heightfield};

use glam::DVec2;

use crate::source::{ElevationFuture, ElevationSource, ImagerySource, Texture, TextureFuture, TextureHandle};

type HeightFn = dyn Fn(f64, f64) -> f64 + Send + Sync;

/// Elevation from an analytic `height(lon, lat)` function.
#[derive(Clone)]
pub struct ProceduralElevation {
    height: Arc<HeightFn>,
    max_level: u32,
    requests: Arc<AtomicUsize>,
}

impl ProceduralElevation {
    #[must_use]
    pub fn new(max_level: u32, height: impl Fn(f64, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            height: Arc::new(height),
            max_level,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Zero elevation everywhere.
    #[must_use]
    pub fn flat(max_level: u32) -> Self {
        Self::new(max_level, |_, _| 0.0)
    }

    /// Rolling hills built from a few octaves of sines, peaking near `amplitude` meters.
    #[must_use]
    pub fn hills(max_level: u32, amplitude: f64) -> Self {
        Self::new(max_level, move |lon, lat| {
            let broad = (lon * 3.0).sin() * (lat * 2.0).cos();
            let ridges = (lon * 17.0 + lat * 11.0).sin() * 0.3;
            let detail = (lon * 97.0).sin() * (lat * 89.0).cos() * 0.05;
            amplitude * (broad + ridges + detail) / 1.35
        })
    }

    /// Number of requests served so far.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ProceduralElevation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProceduralElevation")
            .field("max_level", &self.max_level)
            .field("requests", &self.requests())
            .finish_non_exhaustive()
    }
}

impl ElevationSource for ProceduralElevation {
    fn max_level(&self) -> u32 {
        self.max_level
    }

    fn request(&self, bounds: GeographicBounds, resolution: usize) -> ElevationFuture {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let height = Arc::clone(&self.height);
        Box::pin(async move {
            Ok(Heightfield::from_fn(resolution, &bounds, |lon, lat| height(lon, lat))?)
        })
    }
}

/// Imagery that vends numbered texture handles and counts releases.
#[derive(Debug, Default)]
pub struct ProceduralImagery {
    next: AtomicU64,
    requested: AtomicUsize,
    released: AtomicUsize,
    /// Extra coverage on each side, as a fraction of the requested size.
    margin: f64,
}

impl ProceduralImagery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Textures that overhang the requested bounds by `margin` of their
    /// width and height on every side.
    #[must_use]
    pub fn with_margin(margin: f64) -> Self {
        Self {
            margin,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn requested(&self) -> usize {
        self.requested.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }

    /// Textures handed out and not yet released.
    #[must_use]
    pub fn live(&self) -> usize {
        self.requested() - self.released()
    }
}

impl ImagerySource for ProceduralImagery {
    fn request(&self, bounds: GeographicBounds, _width: u32, _height: u32) -> TextureFuture {
        self.requested.fetch_add(1, Ordering::Relaxed);
        let handle = TextureHandle(self.next.fetch_add(1, Ordering::Relaxed));
        let bounds = if self.margin > 0.0 {
            bounds.expanded(DVec2::new(bounds.width(), bounds.height()) * self.margin)
        } else {
            bounds
        };
        Box::pin(async move { Ok(Texture { handle, bounds }) })
    }

    fn release(&self, _texture: TextureHandle) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawner::block_on;

    #[test]
    fn test_elevation_samples_function() {
        let source = ProceduralElevation::new(5, |lon, lat| lon * 100.0 + lat);
        let bounds = GeographicBounds::new(DVec2::ZERO, DVec2::splat(0.3));
        let field = block_on(source.request(bounds, 4)).unwrap();
        assert_eq!(field.resolution(), 4);
        let h = field.elevation_at(&bounds, DVec2::new(0.1, 0.2)).unwrap();
        assert!((h - 10.2).abs() < 1e-9);
        assert_eq!(source.requests(), 1);
    }

    #[test]
    fn test_elevation_propagates_mesh_errors() {
        let source = ProceduralElevation::flat(0);
        let result = block_on(source.request(GeographicBounds::WORLD, 1));
        assert!(matches!(result, Err(crate::Error::Mesh(_))));
    }

    #[test]
    fn test_imagery_counts() {
        let source = ProceduralImagery::new();
        let a = block_on(source.request(GeographicBounds::WORLD, 1, 1)).unwrap();
        let b = block_on(source.request(GeographicBounds::WORLD, 1, 1)).unwrap();
        assert_ne!(a.handle, b.handle);
        assert_eq!(a.bounds, GeographicBounds::WORLD);
        source.release(a.handle);
        assert_eq!(source.requested(), 2);
        assert_eq!(source.live(), 1);
    }

    #[test]
    fn test_imagery_margin_overhangs_request() {
        let source = ProceduralImagery::with_margin(0.5);
        let bounds = GeographicBounds::new(DVec2::ZERO, DVec2::new(0.4, 0.2));
        let texture = block_on(source.request(bounds, 16, 16)).unwrap();
        assert!(texture.bounds.contains_bounds(&bounds));
        assert!((texture.bounds.width() - 0.8).abs() < 1e-12);
        assert!((texture.bounds.height() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_hills_stay_within_amplitude() {
        let source = ProceduralElevation::hills(8, 1000.0);
        let bounds = GeographicBounds::new(DVec2::new(-1.0, -1.0), DVec2::new(1.0, 1.0));
        let field = block_on(source.request(bounds, 16)).unwrap();
        assert!(field.extended().iter().all(|h| h.abs() <= 1000.0));
    }
}
