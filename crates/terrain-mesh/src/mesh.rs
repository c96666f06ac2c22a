//! Mesh containers shared by the three tile generators.

use glam::{DVec2, DVec3, Vec2, Vec3};

use crate::bounds::GeographicBounds;
use crate::skirt;

/// Which generator a tile's bounds call for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileTopology {
    /// Regular `R × R` grid.
    Base,
    /// Fan narrowing to a single apex at the north pole.
    NorthPole,
    /// Fan narrowing to a single apex at the south pole.
    SouthPole,
}

impl TileTopology {
    /// Pick the topology for `bounds`.
    ///
    /// A tile touching exactly one pole gets the matching fan. Tiles touching
    /// both poles (the hemisphere roots) and tiles touching neither use the grid.
    #[must_use]
    pub fn classify(bounds: &GeographicBounds) -> Self {
        match (bounds.touches_north_pole(), bounds.touches_south_pole()) {
            (true, false) => Self::NorthPole,
            (false, true) => Self::SouthPole,
            _ => Self::Base,
        }
    }

    /// Whether the topology is one of the pole fans.
    #[must_use]
    pub fn is_polar(self) -> bool {
        !matches!(self, Self::Base)
    }
}

/// A generated tile mesh: top surface followed by its skirt.
///
/// Vertex positions are stored relative to [`TerrainMesh::shift`] in single
/// precision. Indices form a triangle list; the first
/// `surface_index_count` belong to the surface, the rest to the skirt.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainMesh {
    pub topology: TileTopology,
    /// Cartesian offset subtracted from every vertex.
    pub shift: DVec3,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    /// Number of leading vertices that belong to the surface.
    pub surface_vertex_count: usize,
    /// Number of leading indices that belong to the surface.
    pub surface_index_count: usize,
}

impl TerrainMesh {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn surface_triangle_count(&self) -> usize {
        self.surface_index_count / 3
    }

    #[must_use]
    pub fn skirt_triangle_count(&self) -> usize {
        (self.indices.len() - self.surface_index_count) / 3
    }

    #[must_use]
    pub fn surface_indices(&self) -> &[u32] {
        &self.indices[..self.surface_index_count]
    }

    #[must_use]
    pub fn skirt_indices(&self) -> &[u32] {
        &self.indices[self.surface_index_count..]
    }

    /// Vertex position with the shift added back, in double precision.
    #[must_use]
    pub fn world_position(&self, index: usize) -> DVec3 {
        self.shift + self.positions[index].as_dvec3()
    }

    /// Every vertex position with the shift added back, skirt included.
    pub fn world_positions(&self) -> impl Iterator<Item = DVec3> + '_ {
        self.positions.iter().map(|position| self.shift + position.as_dvec3())
    }
}

/// Accumulates vertices in double precision until the shift is known.
pub(crate) struct MeshBuilder {
    positions: Vec<DVec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    indices: Vec<u32>,
}

impl MeshBuilder {
    pub(crate) fn with_capacity(vertices: usize, indices: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertices),
            normals: Vec::with_capacity(vertices),
            uvs: Vec::with_capacity(vertices),
            indices: Vec::with_capacity(indices),
        }
    }

    pub(crate) fn push_vertex(&mut self, position: DVec3, normal: DVec3, uv: DVec2) -> u32 {
        self.push_raw(position, normal.as_vec3(), uv.as_vec2())
    }

    pub(crate) fn push_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    pub(crate) fn position(&self, index: u32) -> DVec3 {
        self.positions[index as usize]
    }

    pub(crate) fn normal(&self, index: u32) -> Vec3 {
        self.normals[index as usize]
    }

    pub(crate) fn uv(&self, index: u32) -> Vec2 {
        self.uvs[index as usize]
    }

    pub(crate) fn push_raw(&mut self, position: DVec3, normal: Vec3, uv: Vec2) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let index = self.positions.len() as u32;
        self.positions.push(position);
        self.normals.push(normal);
        self.uvs.push(uv);
        index
    }

    /// Close the surface, add the skirt along `perimeter` and re-base on `shift`.
    ///
    /// The subtraction happens in double precision before narrowing to `f32`.
    pub(crate) fn finish(
        mut self,
        topology: TileTopology,
        shift: DVec3,
        perimeter: &[u32],
    ) -> TerrainMesh {
        let surface_vertex_count = self.positions.len();
        let surface_index_count = self.indices.len();
        skirt::append_skirt(&mut self, perimeter);

        let positions = self
            .positions
            .iter()
            .map(|p| (*p - shift).as_vec3())
            .collect();

        TerrainMesh {
            topology,
            shift,
            positions,
            normals: self.normals,
            uvs: self.uvs,
            indices: self.indices,
            surface_vertex_count,
            surface_index_count,
        }
    }
}

/// Outward normal from two tangent differences, falling back to `up`.
pub(crate) fn surface_normal(east: DVec3, north: DVec3, up: DVec3) -> DVec3 {
    let normal = east.cross(north);
    let length = normal.length();
    if length > f64::EPSILON && length.is_finite() {
        normal / length
    } else {
        up
    }
}
