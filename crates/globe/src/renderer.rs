//! Renderer seam.
//!
//! The quadtree decides what should be resident and visible; a
//! [`TileRenderer`] owns the GPU side. [`HeadlessRenderer`] keeps the same
//! books without a GPU, for tests and the simulator.

use std::collections::HashMap;

use glam::DVec3;
use terrain_mesh::TerrainMesh;

use crate::arena::TileId;
use crate::material::TileMaterial;

/// GPU-side operations the quadtree drives.
pub trait TileRenderer {
    /// Make `mesh` resident for `tile`, replacing any previous mesh.
    ///
    /// A newly resident tile starts hidden; a replaced one keeps its visibility.
    /// Mesh positions are relative to `origin`, a planet-space offset.
    fn upload(&mut self, tile: TileId, mesh: &TerrainMesh, origin: DVec3, material: &TileMaterial);

    /// Swap the material of a resident tile.
    fn update_material(&mut self, tile: TileId, material: &TileMaterial);

    fn set_visible(&mut self, tile: TileId, visible: bool);

    /// Free everything resident for `tile`.
    fn release(&mut self, tile: TileId);

    /// Whether a frame has completed since `tile` was last uploaded.
    fn was_drawn(&self, tile: TileId) -> bool;
}

/// Bookkeeping for one resident tile.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidentTile {
    pub origin: DVec3,
    pub triangles: usize,
    pub material: TileMaterial,
    pub visible: bool,
    pub drawn: bool,
}

/// A renderer that only records what it was told.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    resident: HashMap<TileId, ResidentTile>,
    frames: u64,
    uploads: u64,
}

impl HeadlessRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish a frame: every resident tile counts as drawn.
    pub fn end_frame(&mut self) {
        for tile in self.resident.values_mut() {
            tile.drawn = true;
        }
        self.frames += 1;
    }

    #[must_use]
    pub fn tile(&self, tile: TileId) -> Option<&ResidentTile> {
        self.resident.get(&tile)
    }

    #[must_use]
    pub fn is_resident(&self, tile: TileId) -> bool {
        self.resident.contains_key(&tile)
    }

    /// Tiles currently shown, in no particular order.
    pub fn visible_tiles(&self) -> impl Iterator<Item = TileId> + '_ {
        self.resident
            .iter()
            .filter(|(_, tile)| tile.visible)
            .map(|(id, _)| *id)
    }

    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    #[must_use]
    pub fn visible_triangles(&self) -> usize {
        self.resident
            .values()
            .filter(|tile| tile.visible)
            .map(|tile| tile.triangles)
            .sum()
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[must_use]
    pub fn uploads(&self) -> u64 {
        self.uploads
    }
}

impl TileRenderer for HeadlessRenderer {
    fn upload(&mut self, tile: TileId, mesh: &TerrainMesh, origin: DVec3, material: &TileMaterial) {
        self.uploads += 1;
        let visible = self.resident.get(&tile).is_some_and(|t| t.visible);
        self.resident.insert(
            tile,
            ResidentTile {
                origin,
                triangles: mesh.indices.len() / 3,
                material: material.clone(),
                visible,
                drawn: false,
            },
        );
    }

    fn update_material(&mut self, tile: TileId, material: &TileMaterial) {
        if let Some(resident) = self.resident.get_mut(&tile) {
            resident.material = material.clone();
        }
    }

    fn set_visible(&mut self, tile: TileId, visible: bool) {
        if let Some(resident) = self.resident.get_mut(&tile) {
            resident.visible = visible;
        }
    }

    fn release(&mut self, tile: TileId) {
        self.resident.remove(&tile);
    }

    fn was_drawn(&self, tile: TileId) -> bool {
        self.resident.get(&tile).is_some_and(|t| t.drawn)
    }
}
