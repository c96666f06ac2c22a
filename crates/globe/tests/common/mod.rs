//! Shared fixtures for the quadtree scenarios.

#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use async_channel::Sender;
use glam::{DVec2, DVec3};
use globe::{
    Camera, ElevationFuture, ElevationSource, Ellipsoid, Error, GeographicBounds, HeadlessRenderer,
    Heightfield, ImagerySource, LayerId, LayerManager, LocalExecutor, LodConfig, Planet, PlanetConfig,
    Result, Texture, TextureFuture, TextureHandle,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Small tiles and an unlimited load budget keep the scenarios fast and
/// deterministic.
pub fn config() -> PlanetConfig {
    PlanetConfig {
        tile_resolution: 4,
        imagery_size: 16,
        load_budget_ms: 1000.0,
        lod: LodConfig {
            max_level: 8,
            ..LodConfig::default()
        },
        ..PlanetConfig::default()
    }
}

/// A camera `altitude` meters above `(lon, lat)` that sees everything.
pub fn camera_above(lon: f64, lat: f64, altitude: f64) -> Camera {
    let position = Ellipsoid::WGS84.llh_to_cartesian(lon, lat, altitude);
    Camera::omniscient(position, 1.0)
}

pub fn far_camera() -> Camera {
    Camera::omniscient(DVec3::new(1.0e9, 0.0, 0.0), 1.0)
}

pub struct Harness {
    pub planet: Planet,
    pub executor: Arc<LocalExecutor>,
    pub renderer: HeadlessRenderer,
}

impl Harness {
    pub fn new(layers: LayerManager) -> Self {
        Self::with_config(layers, config())
    }

    pub fn with_config(layers: LayerManager, config: PlanetConfig) -> Self {
        init_tracing();
        let executor = Arc::new(LocalExecutor::new());
        let planet = Planet::new(config, layers, executor.clone()).expect("valid config");
        Self {
            planet,
            executor,
            renderer: HeadlessRenderer::new(),
        }
    }

    /// Run pending requests, update once and draw a frame.
    pub fn frame(&mut self, camera: &Camera) -> bool {
        self.executor.run_until_stalled();
        let settled = self
            .planet
            .update(camera, &mut self.renderer)
            .expect("update");
        self.renderer.end_frame();
        settled
    }

    pub fn run(&mut self, camera: &Camera, frames: usize) {
        for _ in 0..frames {
            self.frame(camera);
        }
    }

    /// Step until the tree settles, returning the number of frames taken.
    pub fn settle(&mut self, camera: &Camera, max_frames: usize) -> usize {
        for frame in 1..=max_frames {
            if self.frame(camera) {
                return frame;
            }
        }
        panic!("tree did not settle within {max_frames} frames: {:?}", self.planet.stats());
    }
}

/// Sum of the areas of the tiles on screen.
pub fn visible_area(planet: &Planet) -> f64 {
    planet.visible_tiles().map(|(_, tile)| tile.bounds().area()).sum()
}

/// Every shown tile agrees with the renderer, and no shown tile has a shown
/// ancestor.
pub fn assert_consistent_display(harness: &Harness) {
    let planet = &harness.planet;
    let mut shown: Vec<_> = harness.renderer.visible_tiles().collect();
    let mut expected: Vec<_> = planet.visible_tiles().map(|(id, _)| id).collect();
    shown.sort();
    expected.sort();
    assert_eq!(shown, expected);

    for (id, tile) in planet.visible_tiles() {
        let mut ancestor = tile.parent();
        while let Some(parent) = ancestor {
            let parent_tile = planet.tile(parent).expect("ancestor is live");
            assert!(!parent_tile.is_visible(), "{id} shown together with ancestor {parent}");
            ancestor = parent_tile.parent();
        }
    }
}

/// Elevation that resolves only when the test says so.
#[derive(Default)]
pub struct DeferredElevation {
    max_level: u32,
    pending: Mutex<Vec<(GeographicBounds, usize, Sender<Result<Heightfield>>)>>,
    served: AtomicUsize,
}

impl DeferredElevation {
    pub fn new(max_level: u32) -> Self {
        Self {
            max_level,
            ..Self::default()
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::Relaxed)
    }

    /// Answer every waiting request with `height(lon, lat)`.
    pub fn resolve_all(&self, height: impl Fn(f64, f64) -> f64) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        let count = pending.len();
        for (bounds, resolution, reply) in pending {
            let heightfield = Heightfield::from_fn(resolution, &bounds, &height).map_err(Error::from);
            let _ = reply.try_send(heightfield);
        }
        self.served.fetch_add(count, Ordering::Relaxed);
        count
    }

    /// Fail every waiting request.
    pub fn reject_all(&self, layer: LayerId) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        let count = pending.len();
        for (_, _, reply) in pending {
            let _ = reply.try_send(Err(Error::Source {
                layer,
                message: "service unavailable".to_string(),
            }));
        }
        count
    }
}

impl ElevationSource for DeferredElevation {
    fn max_level(&self) -> u32 {
        self.max_level
    }

    fn request(&self, bounds: GeographicBounds, resolution: usize) -> ElevationFuture {
        let (reply, answer) = async_channel::bounded(1);
        self.pending.lock().unwrap().push((bounds, resolution, reply));
        Box::pin(async move { answer.recv().await.unwrap_or(Err(Error::Aborted)) })
    }
}

/// Imagery that resolves only when the test says so.
#[derive(Default)]
pub struct DeferredImagery {
    next: AtomicU64,
    pending: Mutex<Vec<(GeographicBounds, Sender<Result<Texture>>)>>,
    delivered: AtomicUsize,
    released: AtomicUsize,
}

impl DeferredImagery {
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }

    pub fn resolve_all(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        let count = pending.len();
        for (bounds, reply) in pending {
            let handle = TextureHandle(self.next.fetch_add(1, Ordering::Relaxed));
            let _ = reply.try_send(Ok(Texture { handle, bounds }));
        }
        self.delivered.fetch_add(count, Ordering::Relaxed);
        count
    }
}

impl ImagerySource for DeferredImagery {
    fn request(&self, bounds: GeographicBounds, _width: u32, _height: u32) -> TextureFuture {
        let (reply, answer) = async_channel::bounded(1);
        self.pending.lock().unwrap().push((bounds, reply));
        Box::pin(async move { answer.recv().await.unwrap_or(Err(Error::Aborted)) })
    }

    fn release(&self, _texture: TextureHandle) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point well inside the eastern hemisphere.
pub const EAST: DVec2 = DVec2::new(0.6, 0.3);
