//! Quadtree nodes.
//!
//! A [`Tile`] is plain data owned by the [`Planet`](crate::Planet)'s arena.
//! The planet drives every transition; this module only describes the state
//! and answers questions about it.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_channel::Receiver;
use terrain_mesh::{GeographicBounds, Heightfield, TerrainMesh, TileTopology};

use crate::arena::TileId;
use crate::camera::Aabb;
use crate::layer::{AbortHandle, Layer, LayerEvent, LayerId, UvTransform};
use crate::material::TileMaterial;
use crate::source::TextureHandle;

/// Lifecycle of a live tile. Disposed tiles leave the arena entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Waiting in the load queue.
    Created,
    /// Requests issued; waiting for mandatory elevation.
    LoadingLayers,
    /// Mesh built from a complete set of mandatory data.
    Loaded,
}

/// Data a layer delivered to a tile.
#[derive(Debug, Clone)]
pub enum LayerData {
    Elevation(Arc<Heightfield>),
    Imagery {
        layer: Arc<Layer>,
        texture: TextureHandle,
        uv: UvTransform,
    },
}

/// An issued request that has not delivered yet.
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub(crate) ticket: u64,
    pub(crate) abort: Option<AbortHandle>,
}

/// One node of the terrain quadtree.
#[derive(Debug)]
pub struct Tile {
    pub(crate) bounds: GeographicBounds,
    pub(crate) level: u32,
    pub(crate) parent: Option<TileId>,
    pub(crate) children: Vec<TileId>,
    pub(crate) state: TileState,

    pub(crate) layer_data: HashMap<LayerId, LayerData>,
    pub(crate) pending: HashMap<LayerId, PendingRequest>,
    /// Layers that rejected a request; not asked again until they change.
    pub(crate) rejected: HashSet<LayerId>,
    /// Elevation layer the tile must wait for; `None` means flat terrain.
    pub(crate) elevation_layer: Option<LayerId>,
    /// Heightfield the current mesh was built from.
    pub(crate) heightfield: Option<Arc<Heightfield>>,

    pub(crate) mesh: Option<TerrainMesh>,
    pub(crate) bounding_box: Option<Aabb>,
    pub(crate) material: TileMaterial,
    pub(crate) needs_upload: bool,
    pub(crate) material_dirty: bool,
    pub(crate) resident: bool,
    pub(crate) visible: bool,
    pub(crate) rendered: bool,
    pub(crate) refine: bool,

    pub(crate) events: Receiver<LayerEvent>,
    pub(crate) listener_key: String,
}

impl Tile {
    pub(crate) fn new(
        bounds: GeographicBounds,
        level: u32,
        parent: Option<TileId>,
        events: Receiver<LayerEvent>,
        listener_key: String,
    ) -> Self {
        Self {
            bounds,
            level,
            parent,
            children: Vec::new(),
            state: TileState::Created,
            layer_data: HashMap::new(),
            pending: HashMap::new(),
            rejected: HashSet::new(),
            elevation_layer: None,
            heightfield: None,
            mesh: None,
            bounding_box: None,
            material: TileMaterial::default(),
            needs_upload: false,
            material_dirty: false,
            resident: false,
            visible: false,
            rendered: false,
            refine: false,
            events,
            listener_key,
        }
    }

    #[must_use]
    pub fn bounds(&self) -> GeographicBounds {
        self.bounds
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    #[must_use]
    pub fn parent(&self) -> Option<TileId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[TileId] {
        &self.children
    }

    #[must_use]
    pub fn state(&self) -> TileState {
        self.state
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state == TileState::Loaded
    }

    /// Whether the renderer is showing this tile.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether the tile has GPU resources.
    #[must_use]
    pub fn is_resident(&self) -> bool {
        self.resident
    }

    /// Whether the tile has been drawn since its last upload.
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    #[must_use]
    pub fn topology(&self) -> TileTopology {
        TileTopology::classify(&self.bounds)
    }

    #[must_use]
    pub fn mesh(&self) -> Option<&TerrainMesh> {
        self.mesh.as_ref()
    }

    #[must_use]
    pub fn bounding_box(&self) -> Option<&Aabb> {
        self.bounding_box.as_ref()
    }

    #[must_use]
    pub fn material(&self) -> &TileMaterial {
        &self.material
    }

    /// Heightfield behind the current mesh.
    #[must_use]
    pub fn elevation(&self) -> Option<&Heightfield> {
        self.heightfield.as_deref()
    }

    /// The elevation layer this tile waits for, if any.
    #[must_use]
    pub fn elevation_layer(&self) -> Option<LayerId> {
        self.elevation_layer
    }

    #[must_use]
    pub fn layer_data(&self, layer: LayerId) -> Option<&LayerData> {
        self.layer_data.get(&layer)
    }

    /// Number of requests still in flight.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_pending(&self, layer: LayerId) -> bool {
        self.pending.contains_key(&layer)
    }

    /// Texture delivered by an imagery layer, if any.
    #[must_use]
    pub fn texture(&self, layer: LayerId) -> Option<(TextureHandle, UvTransform)> {
        match self.layer_data.get(&layer)? {
            LayerData::Imagery { texture, uv, .. } => Some((*texture, *uv)),
            LayerData::Elevation(_) => None,
        }
    }

    /// Heightfield delivered by an elevation layer, if any.
    #[must_use]
    pub fn layer_elevation(&self, layer: LayerId) -> Option<&Arc<Heightfield>> {
        match self.layer_data.get(&layer)? {
            LayerData::Elevation(heightfield) => Some(heightfield),
            LayerData::Imagery { .. } => None,
        }
    }

    /// Whether the mandatory elevation is in hand.
    #[must_use]
    pub fn mandatory_satisfied(&self) -> bool {
        match self.elevation_layer {
            Some(layer) => self.layer_elevation(layer).is_some(),
            None => true,
        }
    }

    /// Resident and either drawn once or already on screen.
    pub(crate) fn displayable(&self) -> bool {
        self.resident && (self.rendered || self.visible)
    }
}
