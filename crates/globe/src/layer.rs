//! Data layers draped over the terrain.
//!
//! A [`Layer`] carries identity, coverage, visibility and a set of keyed
//! change listeners. What it provides is a closed [`LayerKind`]: imagery,
//! elevation or a shader color snippet.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use glam::Vec2;
use terrain_mesh::GeographicBounds;

use crate::arena::TileId;
use crate::error::Error;
use crate::source::{ElevationFuture, ElevationSource, ImagerySource, TextureFuture, TextureHandle};

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A change to a layer or to the set of layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerEvent {
    /// A layer was added to, replaced in or removed from a manager.
    LayersChanged,
    /// A layer was shown or hidden.
    VisibilityChanged { layer: LayerId, visible: bool },
    /// A layer's data changed and must be fetched again.
    ContentChanged { layer: LayerId },
}

/// Callback invoked synchronously for each event of a layer.
pub type LayerListener = Box<dyn Fn(&LayerEvent) + Send + Sync>;

/// Cancellation flag shared between a request and its issuer.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Maps tile UVs into a texture that may cover more than the tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub offset: Vec2,
    pub scale: Vec2,
}

impl UvTransform {
    pub const IDENTITY: Self = Self {
        offset: Vec2::ZERO,
        scale: Vec2::ONE,
    };

    /// Transform placing `tile` inside a texture covering `texture`.
    #[must_use]
    pub fn for_bounds(tile: &GeographicBounds, texture: &GeographicBounds) -> Self {
        let offset = (tile.min - texture.min) / (texture.max - texture.min);
        let scale = (tile.max - tile.min) / (texture.max - texture.min);
        Self {
            offset: offset.as_vec2(),
            scale: scale.as_vec2(),
        }
    }
}

/// Imagery with per-tile texture reference counting.
pub struct ImageryLayer {
    source: Arc<dyn ImagerySource>,
    users: RwLock<HashMap<TextureHandle, HashSet<TileId>>>,
}

impl ImageryLayer {
    #[must_use]
    pub fn new(source: Arc<dyn ImagerySource>) -> Self {
        Self {
            source,
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Request a texture for `bounds`. The returned handle cancels it.
    ///
    /// An aborted request never delivers; if the source finished anyway the
    /// texture goes straight back to it.
    #[must_use]
    pub fn get_map(&self, bounds: GeographicBounds, width: u32, height: u32) -> (AbortHandle, TextureFuture) {
        let abort = AbortHandle::new();
        let flag = abort.clone();
        let source = Arc::clone(&self.source);
        let request = self.source.request(bounds, width, height);
        let future: TextureFuture = Box::pin(async move {
            if flag.is_aborted() {
                return Err(Error::Aborted);
            }
            let result = request.await;
            if flag.is_aborted() {
                if let Ok(texture) = result {
                    source.release(texture.handle);
                }
                return Err(Error::Aborted);
            }
            result
        });
        (abort, future)
    }

    /// Record `tile` as a user of `texture`.
    pub fn attach(&self, tile: TileId, texture: TextureHandle) {
        self.users
            .write()
            .unwrap()
            .entry(texture)
            .or_default()
            .insert(tile);
    }

    /// Drop `tile`'s use of `texture`, releasing it after the last user.
    ///
    /// Returns whether the texture was released.
    pub fn detach(&self, tile: TileId, texture: TextureHandle) -> bool {
        let mut users = self.users.write().unwrap();
        let Some(tiles) = users.get_mut(&texture) else {
            return false;
        };
        tiles.remove(&tile);
        if !tiles.is_empty() {
            return false;
        }
        users.remove(&texture);
        drop(users);
        self.source.release(texture);
        true
    }

    /// Number of tiles using `texture`.
    #[must_use]
    pub fn user_count(&self, texture: TextureHandle) -> usize {
        self.users.read().unwrap().get(&texture).map_or(0, HashSet::len)
    }

    /// Number of textures with at least one user.
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.users.read().unwrap().len()
    }

    fn release_all(&self) {
        let textures: Vec<_> = self.users.write().unwrap().drain().map(|(t, _)| t).collect();
        for texture in textures {
            self.source.release(texture);
        }
    }
}

impl fmt::Debug for ImageryLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageryLayer")
            .field("textures", &self.texture_count())
            .finish_non_exhaustive()
    }
}

/// Heightfields from an elevation source.
pub struct ElevationLayer {
    source: Arc<dyn ElevationSource>,
}

impl ElevationLayer {
    #[must_use]
    pub fn new(source: Arc<dyn ElevationSource>) -> Self {
        Self { source }
    }

    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.source.max_level()
    }

    #[must_use]
    pub fn get_elevation(&self, bounds: GeographicBounds, resolution: usize) -> ElevationFuture {
        self.source.request(bounds, resolution)
    }
}

impl fmt::Debug for ElevationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevationLayer")
            .field("max_level", &self.max_level())
            .finish_non_exhaustive()
    }
}

/// A shader snippet that colors the surface procedurally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderColorLayer {
    pub snippet: String,
}

/// What a layer provides.
#[derive(Debug)]
pub enum LayerKind {
    Imagery(ImageryLayer),
    Elevation(ElevationLayer),
    ShaderColor(ShaderColorLayer),
}

/// A layer of data with identity, coverage and visibility.
pub struct Layer {
    id: LayerId,
    name: String,
    bounds: GeographicBounds,
    visible: AtomicBool,
    disposed: AtomicBool,
    kind: LayerKind,
    listeners: RwLock<HashMap<String, LayerListener>>,
}

impl Layer {
    #[must_use]
    pub fn new(name: impl Into<String>, bounds: GeographicBounds, kind: LayerKind) -> Self {
        Self {
            id: LayerId::next(),
            name: name.into(),
            bounds,
            visible: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            kind,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn imagery(name: impl Into<String>, bounds: GeographicBounds, source: Arc<dyn ImagerySource>) -> Self {
        Self::new(name, bounds, LayerKind::Imagery(ImageryLayer::new(source)))
    }

    #[must_use]
    pub fn elevation(
        name: impl Into<String>,
        bounds: GeographicBounds,
        source: Arc<dyn ElevationSource>,
    ) -> Self {
        Self::new(name, bounds, LayerKind::Elevation(ElevationLayer::new(source)))
    }

    #[must_use]
    pub fn shader_color(name: impl Into<String>, bounds: GeographicBounds, snippet: impl Into<String>) -> Self {
        Self::new(
            name,
            bounds,
            LayerKind::ShaderColor(ShaderColorLayer {
                snippet: snippet.into(),
            }),
        )
    }

    #[must_use]
    pub fn id(&self) -> LayerId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bounds(&self) -> GeographicBounds {
        self.bounds
    }

    #[must_use]
    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    #[must_use]
    pub fn as_imagery(&self) -> Option<&ImageryLayer> {
        match &self.kind {
            LayerKind::Imagery(imagery) => Some(imagery),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_elevation(&self) -> Option<&ElevationLayer> {
        match &self.kind {
            LayerKind::Elevation(elevation) => Some(elevation),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_shader_color(&self) -> Option<&ShaderColorLayer> {
        match &self.kind {
            LayerKind::ShaderColor(shader) => Some(shader),
            _ => None,
        }
    }

    /// Imagery and elevation layers are raster layers.
    #[must_use]
    pub fn is_raster(&self) -> bool {
        matches!(self.kind, LayerKind::Imagery(_) | LayerKind::Elevation(_))
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    /// Show or hide the layer, notifying listeners if that changed anything.
    pub fn set_visible(&self, visible: bool) {
        if self.visible.swap(visible, Ordering::AcqRel) != visible {
            self.emit(&LayerEvent::VisibilityChanged {
                layer: self.id,
                visible,
            });
        }
    }

    /// Tell listeners the layer's data changed.
    pub fn notify_content_changed(&self) {
        self.emit(&LayerEvent::ContentChanged { layer: self.id });
    }

    /// Whether the layer has data for any part of `bounds`.
    ///
    /// Rectangles that merely touch do not overlap.
    #[must_use]
    pub fn overlaps(&self, bounds: &GeographicBounds) -> bool {
        self.bounds.intersection_area(bounds) > 0.0
    }

    /// Request elevation, rejecting bounds outside the layer's coverage.
    ///
    /// Returns `None` for layers that are not elevation layers.
    #[must_use]
    pub fn request_elevation(&self, bounds: GeographicBounds, resolution: usize) -> Option<ElevationFuture> {
        let elevation = self.as_elevation()?;
        if !self.overlaps(&bounds) {
            let layer = self.id;
            return Some(Box::pin(async move { Err(Error::OutOfCoverage { layer, bounds }) }));
        }
        Some(elevation.get_elevation(bounds, resolution))
    }

    /// Request imagery, rejecting bounds outside the layer's coverage.
    ///
    /// Returns `None` for layers that are not imagery layers.
    #[must_use]
    pub fn request_imagery(
        &self,
        bounds: GeographicBounds,
        width: u32,
        height: u32,
    ) -> Option<(AbortHandle, TextureFuture)> {
        let imagery = self.as_imagery()?;
        if !self.overlaps(&bounds) {
            let layer = self.id;
            let future: TextureFuture = Box::pin(async move { Err(Error::OutOfCoverage { layer, bounds }) });
            return Some((AbortHandle::new(), future));
        }
        Some(imagery.get_map(bounds, width, height))
    }

    /// Register `listener` under `key`, replacing any previous one.
    ///
    /// Listeners run while the listener table is locked and must not add or
    /// remove listeners on the same layer.
    pub fn add_listener(&self, key: impl Into<String>, listener: LayerListener) {
        self.listeners.write().unwrap().insert(key.into(), listener);
    }

    pub fn remove_listener(&self, key: &str) -> bool {
        self.listeners.write().unwrap().remove(key).is_some()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap().len()
    }

    fn emit(&self, event: &LayerEvent) {
        for listener in self.listeners.read().unwrap().values() {
            listener(event);
        }
    }

    /// Release everything the layer holds. Calling it again does nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.listeners.write().unwrap().clear();
        if let LayerKind::Imagery(imagery) = &self.kind {
            imagery.release_all();
        }
        tracing::debug!(layer = %self.id, name = %self.name, "Layer disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bounds", &self.bounds)
            .field("visible", &self.is_visible())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedural::ProceduralImagery;
    use crate::spawner::block_on;
    use glam::DVec2;
    use std::sync::Mutex;

    fn tile_ids(n: usize) -> Vec<TileId> {
        let mut arena = crate::arena::TileArena::new();
        (0..n).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Layer::shader_color("a", GeographicBounds::WORLD, "");
        let b = Layer::shader_color("b", GeographicBounds::WORLD, "");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_visibility_notifies_once() {
        let layer = Layer::shader_color("tint", GeographicBounds::WORLD, "color.rgb *= 0.5;");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        layer.add_listener("test", Box::new(move |e| sink.lock().unwrap().push(e.clone())));

        layer.set_visible(false);
        layer.set_visible(false);
        layer.set_visible(true);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0],
            LayerEvent::VisibilityChanged {
                layer: layer.id(),
                visible: false
            }
        );
    }

    #[test]
    fn test_listener_keys_replace() {
        let layer = Layer::shader_color("tint", GeographicBounds::WORLD, "");
        layer.add_listener("k", Box::new(|_| {}));
        layer.add_listener("k", Box::new(|_| {}));
        assert_eq!(layer.listener_count(), 1);
        assert!(layer.remove_listener("k"));
        assert!(!layer.remove_listener("k"));
    }

    #[test]
    fn test_imagery_refcount_releases_on_last_detach() {
        let source = Arc::new(ProceduralImagery::new());
        let layer = Layer::imagery("imagery", GeographicBounds::WORLD, source.clone());
        let imagery = layer.as_imagery().unwrap();
        let [a, b] = tile_ids(2).try_into().unwrap();

        let (_, future) = layer
            .request_imagery(GeographicBounds::WORLD, 256, 256)
            .unwrap();
        let texture = block_on(future).unwrap().handle;
        imagery.attach(a, texture);
        imagery.attach(b, texture);
        assert_eq!(imagery.user_count(texture), 2);

        assert!(!imagery.detach(a, texture));
        assert_eq!(source.released(), 0);
        assert!(imagery.detach(b, texture));
        assert_eq!(source.released(), 1);
        assert!(!imagery.detach(b, texture));
    }

    #[test]
    fn test_aborted_imagery_never_delivers() {
        let source = Arc::new(ProceduralImagery::new());
        let layer = Layer::imagery("imagery", GeographicBounds::WORLD, source.clone());
        let (abort, future) = layer
            .request_imagery(GeographicBounds::WORLD, 64, 64)
            .unwrap();
        abort.abort();
        assert_eq!(block_on(future), Err(Error::Aborted));
    }

    #[test]
    fn test_out_of_coverage_rejects() {
        let coverage = GeographicBounds::new(DVec2::ZERO, DVec2::splat(0.5));
        let layer = Layer::imagery("local", coverage, Arc::new(ProceduralImagery::new()));
        let elsewhere = GeographicBounds::new(DVec2::splat(1.0), DVec2::splat(1.5));
        let (_, future) = layer.request_imagery(elsewhere, 64, 64).unwrap();
        assert!(matches!(block_on(future), Err(Error::OutOfCoverage { .. })));
        assert!(layer.request_elevation(elsewhere, 4).is_none());
    }

    #[test]
    fn test_dispose_is_idempotent_and_releases() {
        let source = Arc::new(ProceduralImagery::new());
        let layer = Layer::imagery("imagery", GeographicBounds::WORLD, source.clone());
        let (_, future) = layer
            .request_imagery(GeographicBounds::WORLD, 64, 64)
            .unwrap();
        let texture = block_on(future).unwrap().handle;
        layer.as_imagery().unwrap().attach(tile_ids(1)[0], texture);
        layer.add_listener("k", Box::new(|_| {}));

        layer.dispose();
        layer.dispose();
        assert!(layer.is_disposed());
        assert_eq!(layer.listener_count(), 0);
        assert_eq!(source.released(), 1);
    }

    #[test]
    fn test_uv_transform_for_quadrant() {
        let texture = GeographicBounds::new(DVec2::ZERO, DVec2::splat(1.0));
        let tile = texture.quadrants()[3];
        let uv = UvTransform::for_bounds(&tile, &texture);
        assert_eq!(uv.offset, Vec2::splat(0.5));
        assert_eq!(uv.scale, Vec2::splat(0.5));
        assert_eq!(UvTransform::for_bounds(&texture, &texture), UvTransform::IDENTITY);
    }
}
