//! The quadtree root and its per-frame update.
//!
//! A [`Planet`] owns two hemisphere roots, every tile below them, the load
//! queue and the channel layer requests report back on. [`Planet::update`]
//! runs in three steps:
//!
//! 1. Apply completed layer requests and start queued tile loads.
//! 2. Walk the tree parent-first, deciding per tile whether it should refine,
//!    subdividing and collapsing as needed.
//! 3. Pick the set of tiles to show and push visibility changes to the
//!    renderer in one go, so a parent and its children never overlap.

use std::{
    collections::HashSet,
    f64::consts::{FRAC_PI_2, PI},
    fmt,
    sync::Arc,
    time::Duration,
};

use async_channel::{Receiver, Sender};
use glam::{DVec2, DVec3};
use terrain_mesh::{
    GeographicBounds, Heightfield, MeshError, TerrainMesh, build_tile_mesh,
    geodesy::{Ellipsoid, geodetic_up, wrap_longitude},
};
use tracing::{debug, error, info, warn};
use web_time::Instant;

use crate::arena::{TileArena, TileId};
use crate::camera::{Aabb, Camera};
use crate::config::PlanetConfig;
use crate::error::{Error, Result};
use crate::layer::{Layer, LayerEvent, LayerId, UvTransform};
use crate::layer_manager::LayerManager;
use crate::lod::LodMetric;
use crate::material::TileMaterial;
use crate::renderer::TileRenderer;
use crate::scheduler::{FrameBudget, LoadQueue};
use crate::source::Texture;
use crate::spawner::TaskSpawner;
use crate::tile::{LayerData, PendingRequest, Tile, TileState};

/// Angular step for finite-difference normals, in radians (about 6 m).
const NORMAL_OFFSET: f64 = 1e-6;

/// Counters describing the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanetStats {
    pub tiles: usize,
    pub loaded: usize,
    pub resident: usize,
    pub visible: usize,
    pub queued: usize,
    /// Layer requests issued and not yet applied.
    pub in_flight: usize,
    pub max_level: u32,
}

struct LoadResult {
    tile: TileId,
    layer: Arc<Layer>,
    ticket: u64,
    payload: LoadPayload,
}

enum LoadPayload {
    Elevation(Result<Heightfield>),
    Imagery(Result<Texture>),
}

/// A globe of quadtree terrain tiles.
pub struct Planet {
    config: PlanetConfig,
    ellipsoid: Ellipsoid,
    center: DVec3,
    layers: LayerManager,
    tiles: TileArena<Tile>,
    roots: Vec<TileId>,
    queue: LoadQueue,
    spawner: Arc<dyn TaskSpawner>,
    results_tx: Sender<LoadResult>,
    results_rx: Receiver<LoadResult>,
    next_ticket: u64,
    next_listener: u64,
    last_update: Option<Instant>,
}

impl Planet {
    /// Create a WGS84 planet at the origin with its two hemisphere roots queued.
    pub fn new(config: PlanetConfig, layers: LayerManager, spawner: Arc<dyn TaskSpawner>) -> Result<Self> {
        config.validate()?;
        let (results_tx, results_rx) = async_channel::unbounded();
        let mut planet = Self {
            config,
            ellipsoid: Ellipsoid::WGS84,
            center: DVec3::ZERO,
            layers,
            tiles: TileArena::new(),
            roots: Vec::new(),
            queue: LoadQueue::new(),
            spawner,
            results_tx,
            results_rx,
            next_ticket: 0,
            next_listener: 0,
            last_update: None,
        };
        for bounds in [
            GeographicBounds::west_hemisphere(),
            GeographicBounds::east_hemisphere(),
        ] {
            let root = planet.create_tile(bounds, 0, None);
            planet.roots.push(root);
        }
        info!(
            resolution = planet.config.tile_resolution,
            layers = planet.layers.layers().count(),
            "Planet created"
        );
        Ok(planet)
    }

    /// Use a different reference ellipsoid.
    #[must_use]
    pub fn with_ellipsoid(mut self, ellipsoid: Ellipsoid) -> Self {
        self.ellipsoid = ellipsoid;
        self
    }

    /// Place the planet's center somewhere other than the origin.
    #[must_use]
    pub fn with_center(mut self, center: DVec3) -> Self {
        self.center = center;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PlanetConfig {
        &self.config
    }

    #[must_use]
    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    #[must_use]
    pub fn center(&self) -> DVec3 {
        self.center
    }

    #[must_use]
    pub fn layers(&self) -> &LayerManager {
        &self.layers
    }

    /// Layer changes made here reach every tile on its next update.
    pub fn layers_mut(&mut self) -> &mut LayerManager {
        &mut self.layers
    }

    /// The live roots, west hemisphere first.
    #[must_use]
    pub fn roots(&self) -> &[TileId] {
        &self.roots
    }

    /// Look up a live tile.
    pub fn tile(&self, id: TileId) -> Result<&Tile> {
        self.tiles.get(id).ok_or(Error::Disposed { tile: id })
    }

    /// Every live tile, in arena order.
    pub fn tiles(&self) -> impl Iterator<Item = (TileId, &Tile)> {
        self.tiles.iter()
    }

    /// Tiles currently shown.
    pub fn visible_tiles(&self) -> impl Iterator<Item = (TileId, &Tile)> {
        self.tiles.iter().filter(|(_, tile)| tile.visible)
    }

    #[must_use]
    pub fn stats(&self) -> PlanetStats {
        let mut stats = PlanetStats {
            queued: self.queue.len(),
            ..PlanetStats::default()
        };
        for (_, tile) in self.tiles.iter() {
            stats.tiles += 1;
            stats.loaded += usize::from(tile.is_loaded());
            stats.resident += usize::from(tile.resident);
            stats.visible += usize::from(tile.visible);
            stats.in_flight += tile.pending.len();
            stats.max_level = stats.max_level.max(tile.level);
        }
        stats
    }

    /// Advance the tree by one frame.
    ///
    /// Returns whether the tree has settled: nothing queued, every tile at its
    /// wanted level loaded and shown. An error means the LOD metric could not
    /// be evaluated; the tree is left as it was when the error surfaced.
    pub fn update(&mut self, camera: &Camera, renderer: &mut dyn TileRenderer) -> Result<bool> {
        self.apply_results();

        let interval = Duration::try_from_secs_f64(self.config.update_interval_ms / 1000.0)
            .unwrap_or(Duration::ZERO);
        if let Some(last) = self.last_update {
            if last.elapsed() < interval {
                return Ok(false);
            }
        }
        self.last_update = Some(Instant::now());

        self.drain_load_queue();

        let metric = LodMetric::new(camera, self.ellipsoid.semi_major_axis, &self.config.lod);
        let mut settled = true;
        for root in self.roots.clone() {
            settled &= self.update_tile(root, camera, &metric, renderer)?;
        }

        let mut active = HashSet::new();
        for &root in &self.roots {
            self.collect_active(root, &mut active);
        }
        self.apply_visibility(&active, renderer);

        Ok(settled && self.queue.is_empty())
    }

    /// Terrain height at `lon_lat`, from the deepest loaded tile covering it.
    ///
    /// `None` until some tile there has elevation.
    #[must_use]
    pub fn elevation_at(&self, lon_lat: DVec2) -> Option<f64> {
        let point = DVec2::new(wrap_longitude(lon_lat.x), lon_lat.y);
        self.roots
            .iter()
            .copied()
            .filter(|&root| self.tiles.get(root).is_some_and(|tile| tile.bounds.contains(point)))
            .find_map(|root| self.tile_elevation(root, point))
    }

    /// Write the terrain surface normal at `lon_lat` into `out`.
    ///
    /// Returns false, leaving `out` untouched, when no elevation is available.
    pub fn normal_at(&self, lon_lat: DVec2, out: &mut DVec3) -> bool {
        let Some(height) = self.elevation_at(lon_lat) else {
            return false;
        };
        let lon = wrap_longitude(lon_lat.x);
        let lat = lon_lat.y;
        // Step away from the nearest edge of the world.
        let d_lon = if lon + NORMAL_OFFSET <= PI { NORMAL_OFFSET } else { -NORMAL_OFFSET };
        let d_lat = if lat + NORMAL_OFFSET <= FRAC_PI_2 { NORMAL_OFFSET } else { -NORMAL_OFFSET };
        let east_height = self
            .elevation_at(DVec2::new(lon + d_lon, lat))
            .unwrap_or(height);
        let north_height = self
            .elevation_at(DVec2::new(lon, lat + d_lat))
            .unwrap_or(height);

        let origin = self.ellipsoid.llh_to_cartesian(lon, lat, height);
        let east = self.ellipsoid.llh_to_cartesian(lon + d_lon, lat, east_height) - origin;
        let north = self.ellipsoid.llh_to_cartesian(lon, lat + d_lat, north_height) - origin;
        let normal = east.cross(north) * (d_lon.signum() * d_lat.signum());
        *out = normal.try_normalize().unwrap_or_else(|| geodetic_up(lon, lat));
        true
    }

    /// Dispose `id` with everything below it.
    ///
    /// Siblings go too, leaving the parent a leaf again. Disposing a root
    /// leaves its hemisphere empty. Returns false if `id` was already gone.
    pub fn dispose_tile(&mut self, id: TileId, renderer: &mut dyn TileRenderer) -> bool {
        let Some(parent) = self.tiles.get(id).map(Tile::parent) else {
            return false;
        };
        if let Some(parent) = parent {
            let siblings = self
                .tiles
                .get_mut(parent)
                .map(|tile| std::mem::take(&mut tile.children))
                .unwrap_or_default();
            for sibling in siblings.into_iter().filter(|&sibling| sibling != id) {
                self.dispose_subtree(sibling, renderer);
            }
        }
        self.dispose_subtree(id, renderer)
    }

    /// Dispose every tile.
    pub fn dispose(&mut self, renderer: &mut dyn TileRenderer) {
        for root in std::mem::take(&mut self.roots) {
            self.dispose_subtree(root, renderer);
        }
        info!("Planet disposed");
    }

    fn create_tile(&mut self, bounds: GeographicBounds, level: u32, parent: Option<TileId>) -> TileId {
        let key = format!("tile-{}", self.next_listener);
        self.next_listener += 1;
        let events = self.layers.subscribe(key.clone());
        let id = self.tiles.insert(Tile::new(bounds, level, parent, events, key));
        self.queue.push(id, level);
        id
    }

    fn drain_load_queue(&mut self) {
        let budget = FrameBudget::from_millis(self.config.load_budget_ms);
        let mut started = 0;
        // At least one tile per update, however small the budget.
        while started == 0 || !budget.exhausted() {
            let Some(id) = self.queue.pop() else {
                break;
            };
            self.start_loading(id);
            started += 1;
        }
    }

    fn start_loading(&mut self, id: TileId) {
        let Some(tile) = self.tiles.get_mut(id) else {
            return;
        };
        if tile.state != TileState::Created {
            return;
        }
        // Reconciling from scratch covers anything that arrived while queued.
        while tile.events.try_recv().is_ok() {}
        tile.state = TileState::LoadingLayers;
        debug!(tile = %id, level = tile.level, "Loading layers");
        self.reconcile_layers(id, &HashSet::new());
    }

    fn drain_events(&mut self, id: TileId) {
        let Some(tile) = self.tiles.get(id) else {
            return;
        };
        let mut received = false;
        let mut changed = HashSet::new();
        while let Ok(event) = tile.events.try_recv() {
            received = true;
            if let LayerEvent::ContentChanged { layer } = event {
                changed.insert(layer);
            }
        }
        if received {
            self.reconcile_layers(id, &changed);
        }
    }

    /// Bring a tile's layer data in line with the manager.
    ///
    /// Data of departed layers and of layers in `changed` is dropped, missing
    /// data is requested, and the material is marked for a rebuild.
    fn reconcile_layers(&mut self, id: TileId, changed: &HashSet<LayerId>) {
        let Some(tile) = self.tiles.get(id) else {
            return;
        };
        if tile.state == TileState::Created {
            return;
        }
        let stale: HashSet<LayerId> = tile
            .layer_data
            .keys()
            .chain(tile.pending.keys())
            .chain(tile.rejected.iter())
            .filter(|layer| changed.contains(layer) || self.layers.layer(**layer).is_none())
            .copied()
            .collect();
        for layer in stale {
            self.forget_layer(id, layer);
        }

        self.reconcile_elevation(id, changed);
        self.request_missing_imagery(id);
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.material_dirty = true;
        }
        self.try_finish_loading(id);
    }

    fn forget_layer(&mut self, id: TileId, layer: LayerId) {
        let Some(tile) = self.tiles.get_mut(id) else {
            return;
        };
        tile.rejected.remove(&layer);
        if let Some(PendingRequest { abort: Some(abort), .. }) = tile.pending.remove(&layer) {
            abort.abort();
        }
        if let Some(LayerData::Imagery { layer: owner, texture, .. }) = tile.layer_data.remove(&layer) {
            if let Some(imagery) = owner.as_imagery() {
                imagery.detach(id, texture);
            }
        }
    }

    fn reconcile_elevation(&mut self, id: TileId, changed: &HashSet<LayerId>) {
        let Some(tile) = self.tiles.get(id) else {
            return;
        };
        let mandatory = self.layers.mandatory_elevation(&tile.bounds).cloned();
        let wanted = mandatory.as_ref().map(|layer| layer.id());

        let Some(tile) = self.tiles.get_mut(id) else {
            return;
        };
        let switched = wanted != tile.elevation_layer || wanted.is_some_and(|layer| changed.contains(&layer));
        tile.elevation_layer = wanted;
        if switched && tile.state == TileState::Loaded {
            tile.state = TileState::LoadingLayers;
            tile.bounding_box = None;
            debug!(tile = %id, level = tile.level, "Reloading elevation");
        }

        let Some(layer) = mandatory else {
            return;
        };
        let layer_id = layer.id();
        if tile.layer_elevation(layer_id).is_some()
            || tile.pending.contains_key(&layer_id)
            || tile.rejected.contains(&layer_id)
        {
            return;
        }

        if let Some(heightfield) = self.resample_from_parent(id, &layer) {
            if let Some(tile) = self.tiles.get_mut(id) {
                tile.layer_data
                    .insert(layer_id, LayerData::Elevation(Arc::new(heightfield)));
                debug!(tile = %id, layer = %layer_id, level = tile.level, "Resampled elevation from parent");
            }
            return;
        }
        self.issue_elevation(id, &layer);
    }

    /// Derive elevation from the parent when the layer has nothing finer.
    fn resample_from_parent(&self, id: TileId, layer: &Layer) -> Option<Heightfield> {
        let tile = self.tiles.get(id)?;
        if tile.level <= layer.as_elevation()?.max_level() {
            return None;
        }
        let parent = self.tiles.get(tile.parent?)?;
        let source = parent.layer_elevation(layer.id())?;
        match source.resample(&parent.bounds, &tile.bounds, self.config.tile_resolution) {
            Ok(heightfield) => Some(heightfield),
            Err(err) => {
                error!(tile = %id, error = %err, "Resampling parent elevation failed");
                None
            }
        }
    }

    fn issue_elevation(&mut self, id: TileId, layer: &Arc<Layer>) {
        let resolution = self.config.tile_resolution;
        let Some(tile) = self.tiles.get_mut(id) else {
            return;
        };
        let Some(request) = layer.request_elevation(tile.bounds, resolution) else {
            return;
        };
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        tile.pending.insert(layer.id(), PendingRequest { ticket, abort: None });
        debug!(tile = %id, layer = %layer.id(), ticket, "Elevation requested");

        let results = self.results_tx.clone();
        let layer = Arc::clone(layer);
        self.spawner.spawn(Box::pin(async move {
            let payload = LoadPayload::Elevation(request.await);
            // A closed channel means the planet is gone.
            let _ = results
                .send(LoadResult {
                    tile: id,
                    layer,
                    ticket,
                    payload,
                })
                .await;
        }));
    }

    fn request_missing_imagery(&mut self, id: TileId) {
        let Some(tile) = self.tiles.get(id) else {
            return;
        };
        let missing: Vec<Arc<Layer>> = self
            .layers
            .imagery_layers()
            .filter(|layer| layer.is_visible() && layer.overlaps(&tile.bounds))
            .filter(|layer| {
                let layer = layer.id();
                !tile.layer_data.contains_key(&layer)
                    && !tile.pending.contains_key(&layer)
                    && !tile.rejected.contains(&layer)
            })
            .cloned()
            .collect();
        for layer in missing {
            self.issue_imagery(id, &layer);
        }
    }

    fn issue_imagery(&mut self, id: TileId, layer: &Arc<Layer>) {
        let size = self.config.imagery_size;
        let Some(tile) = self.tiles.get_mut(id) else {
            return;
        };
        let Some((abort, request)) = layer.request_imagery(tile.bounds, size, size) else {
            return;
        };
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        tile.pending.insert(
            layer.id(),
            PendingRequest {
                ticket,
                abort: Some(abort),
            },
        );
        debug!(tile = %id, layer = %layer.id(), ticket, "Imagery requested");

        let results = self.results_tx.clone();
        let layer = Arc::clone(layer);
        self.spawner.spawn(Box::pin(async move {
            let payload = LoadPayload::Imagery(request.await);
            let _ = results
                .send(LoadResult {
                    tile: id,
                    layer,
                    ticket,
                    payload,
                })
                .await;
        }));
    }

    fn apply_results(&mut self) {
        while let Ok(result) = self.results_rx.try_recv() {
            self.apply_result(result);
        }
    }

    fn apply_result(&mut self, result: LoadResult) {
        let LoadResult {
            tile: id,
            layer,
            ticket,
            payload,
        } = result;
        let layer_id = layer.id();

        let current = self
            .tiles
            .get(id)
            .and_then(|tile| tile.pending.get(&layer_id))
            .is_some_and(|pending| pending.ticket == ticket);
        if !current {
            debug!(tile = %id, layer = %layer_id, ticket, "Discarding stale result");
            // Hand a late texture straight back through the layer's books.
            if let (LoadPayload::Imagery(Ok(texture)), Some(imagery)) = (payload, layer.as_imagery()) {
                imagery.attach(id, texture.handle);
                imagery.detach(id, texture.handle);
            }
            return;
        }

        let resolution = self.config.tile_resolution;
        let Some(tile) = self.tiles.get_mut(id) else {
            return;
        };
        tile.pending.remove(&layer_id);
        match payload {
            LoadPayload::Elevation(Ok(heightfield)) if heightfield.resolution() == resolution => {
                tile.layer_data
                    .insert(layer_id, LayerData::Elevation(Arc::new(heightfield)));
                debug!(tile = %id, layer = %layer_id, "Elevation arrived");
            }
            LoadPayload::Elevation(Ok(heightfield)) => {
                warn!(
                    tile = %id,
                    layer = %layer_id,
                    expected = resolution,
                    actual = heightfield.resolution(),
                    "Elevation has the wrong resolution"
                );
                tile.rejected.insert(layer_id);
            }
            LoadPayload::Imagery(Ok(delivered)) => {
                let Some(imagery) = layer.as_imagery() else {
                    return;
                };
                let texture = delivered.handle;
                imagery.attach(id, texture);
                if !delivered.bounds.contains_bounds(&tile.bounds) {
                    warn!(
                        tile = %id,
                        layer = %layer_id,
                        texture = texture.0,
                        "Texture does not cover the tile"
                    );
                    imagery.detach(id, texture);
                    tile.rejected.insert(layer_id);
                    return;
                }
                let data = LayerData::Imagery {
                    layer: Arc::clone(&layer),
                    texture,
                    uv: UvTransform::for_bounds(&tile.bounds, &delivered.bounds),
                };
                if let Some(LayerData::Imagery { texture: previous, .. }) = tile.layer_data.insert(layer_id, data) {
                    imagery.detach(id, previous);
                }
                tile.material_dirty = true;
                debug!(tile = %id, layer = %layer_id, texture = texture.0, "Imagery arrived");
            }
            LoadPayload::Elevation(Err(Error::Aborted)) | LoadPayload::Imagery(Err(Error::Aborted)) => {
                debug!(tile = %id, layer = %layer_id, "Request aborted");
            }
            LoadPayload::Elevation(Err(err)) | LoadPayload::Imagery(Err(err)) => {
                warn!(tile = %id, layer = %layer_id, error = %err, "Layer request rejected");
                tile.rejected.insert(layer_id);
            }
        }
        self.try_finish_loading(id);
    }

    /// Build the mesh once the mandatory elevation is in hand.
    fn try_finish_loading(&mut self, id: TileId) {
        let Some(tile) = self.tiles.get(id) else {
            return;
        };
        if tile.state != TileState::LoadingLayers || !tile.mandatory_satisfied() {
            return;
        }
        let heightfield = match tile.elevation_layer {
            Some(layer) => match tile.layer_elevation(layer) {
                Some(heightfield) => Arc::clone(heightfield),
                None => return,
            },
            None => match Heightfield::flat(self.config.tile_resolution) {
                Ok(heightfield) => Arc::new(heightfield),
                Err(err) => {
                    error!(tile = %id, error = %err, "Cannot build flat elevation");
                    return;
                }
            },
        };
        if self.install_mesh(id, heightfield) {
            if let Some(tile) = self.tiles.get_mut(id) {
                tile.state = TileState::Loaded;
                debug!(tile = %id, level = tile.level, "Tile loaded");
            }
        }
    }

    /// Build and store the mesh for `heightfield`, marking it for upload.
    fn install_mesh(&mut self, id: TileId, heightfield: Arc<Heightfield>) -> bool {
        let resolution = self.config.tile_resolution;
        let ellipsoid = self.ellipsoid;
        let center = self.center;
        let Some(tile) = self.tiles.get_mut(id) else {
            return false;
        };
        let (mesh, bounding_box) = match build_mesh(resolution, &ellipsoid, center, &tile.bounds, &heightfield) {
            Ok(built) => built,
            Err(err) => {
                error!(tile = %id, error = %err, "Mesh build failed");
                return false;
            }
        };
        tile.mesh = Some(mesh);
        tile.bounding_box = Some(bounding_box);
        tile.heightfield = Some(heightfield);
        tile.needs_upload = true;
        true
    }

    /// Push pending mesh and material changes to the renderer.
    fn sync_renderer(&mut self, id: TileId, renderer: &mut dyn TileRenderer) {
        let center = self.center;
        let Some(tile) = self.tiles.get_mut(id) else {
            return;
        };
        if !(tile.needs_upload || tile.material_dirty) {
            return;
        }
        let material = TileMaterial::build(&self.layers, |layer| tile.texture(layer));
        tile.material = material;
        if tile.needs_upload {
            if let Some(mesh) = &tile.mesh {
                renderer.upload(id, mesh, center + mesh.shift, &tile.material);
                tile.resident = true;
                tile.rendered = false;
            }
        } else if tile.resident {
            renderer.update_material(id, &tile.material);
        }
        tile.needs_upload = false;
        tile.material_dirty = false;
    }

    fn update_tile(
        &mut self,
        id: TileId,
        camera: &Camera,
        metric: &LodMetric,
        renderer: &mut dyn TileRenderer,
    ) -> Result<bool> {
        self.drain_events(id);
        self.sync_renderer(id, renderer);

        let max_level = self.config.lod.max_level;
        let preload = self.config.preload_outside_view;
        let Some(tile) = self.tiles.get_mut(id) else {
            return Ok(true);
        };
        tile.rendered = tile.resident && renderer.was_drawn(id);

        let outside_view = tile
            .bounding_box
            .as_ref()
            .is_some_and(|bounding_box| !camera.frustum.intersects_aabb(bounding_box));
        let refine = if tile.level >= max_level || (outside_view && !preload) {
            false
        } else {
            match metric.for_tile(id, tile.bounding_box.as_ref()) {
                Ok(value) => value >= f64::from(tile.level + 1),
                Err(Error::MissingBoundingBox { .. }) => {
                    // Only worth reporting for tiles that had a box before.
                    if tile.heightfield.is_some() {
                        warn!(tile = %id, level = tile.level, "No bounding box; keeping current level");
                    }
                    tile.refine
                }
                Err(err) => return Err(err),
            }
        };
        tile.refine = refine;
        let level = tile.level;
        let loaded = tile.is_loaded();
        let children = tile.children.clone();

        if !refine {
            return Ok(self.collapse(id, renderer));
        }

        let children = if children.is_empty() {
            if !loaded {
                return Ok(false);
            }
            self.subdivide(id)
        } else {
            children
        };

        let mut settled = true;
        for child in children {
            settled &= self.update_tile(child, camera, metric, renderer)?;
        }

        if !self.children_cover(id) {
            return Ok(false);
        }
        if let Some(tile) = self.tiles.get_mut(id) {
            if tile.resident {
                renderer.release(id);
                tile.resident = false;
                tile.visible = false;
                tile.rendered = false;
                tile.mesh = None;
                debug!(tile = %id, level, "Handed off to children");
            }
        }
        Ok(settled)
    }

    /// Make `id` the shown tile of its region, disposing its children once it
    /// can take over. Returns whether it is settled.
    fn collapse(&mut self, id: TileId, renderer: &mut dyn TileRenderer) -> bool {
        let Some(tile) = self.tiles.get_mut(id) else {
            return true;
        };
        if tile.displayable() {
            let loaded = tile.is_loaded();
            let children = std::mem::take(&mut tile.children);
            if !children.is_empty() {
                debug!(tile = %id, level = tile.level, "Collapsed");
            }
            for child in children {
                self.dispose_subtree(child, renderer);
            }
            return loaded;
        }
        if tile.is_loaded() && tile.mesh.is_none() {
            if let Some(heightfield) = tile.heightfield.clone() {
                if self.install_mesh(id, heightfield) {
                    self.sync_renderer(id, renderer);
                }
            }
        }
        false
    }

    fn subdivide(&mut self, id: TileId) -> Vec<TileId> {
        let Some(tile) = self.tiles.get(id) else {
            return Vec::new();
        };
        let (bounds, level) = (tile.bounds, tile.level);
        let parts: Vec<GeographicBounds> = if bounds.touches_north_pole() && bounds.touches_south_pole() {
            bounds.latitude_halves().to_vec()
        } else {
            bounds.quadrants().to_vec()
        };
        let children: Vec<TileId> = parts
            .into_iter()
            .map(|part| self.create_tile(part, level + 1, Some(id)))
            .collect();
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.children.clone_from(&children);
        }
        debug!(tile = %id, level, children = children.len(), "Subdivided");
        children
    }

    /// Whether every child of `id` can be shown, itself or through its own
    /// children.
    fn children_cover(&self, id: TileId) -> bool {
        self.tiles.get(id).is_some_and(|tile| {
            !tile.children.is_empty() && tile.children.iter().all(|&child| self.covers(child))
        })
    }

    fn covers(&self, id: TileId) -> bool {
        self.tiles
            .get(id)
            .is_some_and(|tile| tile.displayable() || self.children_cover(id))
    }

    fn collect_active(&self, id: TileId, active: &mut HashSet<TileId>) {
        let Some(tile) = self.tiles.get(id) else {
            return;
        };
        let displayable = tile.displayable();
        if (tile.refine || !displayable) && self.children_cover(id) {
            for &child in &tile.children {
                self.collect_active(child, active);
            }
        } else if displayable {
            active.insert(id);
        }
    }

    fn apply_visibility(&mut self, active: &HashSet<TileId>, renderer: &mut dyn TileRenderer) {
        let changes: Vec<(TileId, bool)> = self
            .tiles
            .iter()
            .filter(|(_, tile)| tile.resident)
            .filter_map(|(id, tile)| {
                let wanted = active.contains(&id);
                (tile.visible != wanted).then_some((id, wanted))
            })
            .collect();
        for (id, visible) in changes {
            renderer.set_visible(id, visible);
            if let Some(tile) = self.tiles.get_mut(id) {
                tile.visible = visible;
            }
        }
    }

    fn tile_elevation(&self, id: TileId, point: DVec2) -> Option<f64> {
        let tile = self.tiles.get(id)?;
        let from_child = tile
            .children
            .iter()
            .copied()
            .filter(|&child| {
                self.tiles
                    .get(child)
                    .is_some_and(|child| child.is_loaded() && child.bounds.contains(point))
            })
            .find_map(|child| self.tile_elevation(child, point));
        from_child.or_else(|| tile.elevation()?.elevation_at(&tile.bounds, point))
    }

    /// Remove `id` and its subtree, releasing everything they hold.
    fn dispose_subtree(&mut self, id: TileId, renderer: &mut dyn TileRenderer) -> bool {
        let Some(tile) = self.tiles.remove(id) else {
            return false;
        };
        for &child in &tile.children {
            self.dispose_subtree(child, renderer);
        }
        for pending in tile.pending.values() {
            if let Some(abort) = &pending.abort {
                abort.abort();
            }
        }
        for data in tile.layer_data.values() {
            if let LayerData::Imagery { layer, texture, .. } = data {
                if let Some(imagery) = layer.as_imagery() {
                    imagery.detach(id, *texture);
                }
            }
        }
        self.layers.unsubscribe(&tile.listener_key);
        self.queue.remove(id);
        if tile.resident {
            renderer.release(id);
        }
        debug!(tile = %id, level = tile.level, "Tile disposed");
        true
    }
}

impl fmt::Debug for Planet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planet")
            .field("config", &self.config)
            .field("ellipsoid", &self.ellipsoid)
            .field("center", &self.center)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn build_mesh(
    resolution: usize,
    ellipsoid: &Ellipsoid,
    center: DVec3,
    bounds: &GeographicBounds,
    heightfield: &Heightfield,
) -> Result<(TerrainMesh, Aabb)> {
    let mesh = build_tile_mesh(resolution, bounds, heightfield.extended(), |lon, lat, height| {
        ellipsoid.llh_to_cartesian(lon, lat, height)
    })?;
    let bounding_box = Aabb::from_points(mesh.world_positions().map(|position| center + position))
        .ok_or_else(|| {
            Error::Mesh(MeshError::InvalidBounds {
                detail: "mesh has no vertices".to_string(),
            })
        })?;
    Ok((mesh, bounding_box))
}
