//! Crack-free terrain tile meshes on an ellipsoid.
//!
//! This crate turns a bordered heightfield covering a longitude/latitude
//! rectangle into a triangle mesh plus a skirt. It has no I/O and no global
//! state; callers supply the geodetic transform so the same generators serve
//! WGS84 and test spheres alike.
//!
//! # Example
//!
//! ```
//! use glam::DVec2;
//! use terrain_mesh::{build_tile_mesh, geodesy, GeographicBounds};
//!
//! let bounds = GeographicBounds::new(DVec2::ZERO, DVec2::new(0.1, 0.1));
//! let elevation = vec![0.0; 6 * 6];
//! let mesh = build_tile_mesh(4, &bounds, &elevation, geodesy::llh_to_cartesian).unwrap();
//! assert_eq!(mesh.surface_triangle_count(), 18);
//! ```

pub mod bounds;
pub mod error;
pub mod geodesy;
mod grid;
pub mod heightfield;
pub mod mesh;
mod pole;
mod sampler;
pub mod skirt;

use glam::DVec3;

pub use bounds::GeographicBounds;
pub use error::{MeshError, MeshResult};
pub use grid::build_base_mesh;
pub use heightfield::Heightfield;
pub use mesh::{TerrainMesh, TileTopology};
pub use pole::{build_north_pole_mesh, build_south_pole_mesh, fan_vertex_count};

/// Build the mesh for `bounds`, picking the generator from its pole contact.
///
/// `elevation` is the extended `(resolution + 2)²` heightfield and
/// `to_cartesian` maps `(lon, lat, height)` to a planet-centered position.
pub fn build_tile_mesh(
    resolution: usize,
    bounds: &GeographicBounds,
    elevation: &[f64],
    to_cartesian: impl Fn(f64, f64, f64) -> DVec3,
) -> MeshResult<TerrainMesh> {
    match TileTopology::classify(bounds) {
        TileTopology::Base => build_base_mesh(resolution, bounds, elevation, to_cartesian),
        TileTopology::NorthPole => build_north_pole_mesh(resolution, bounds, elevation, to_cartesian),
        TileTopology::SouthPole => build_south_pole_mesh(resolution, bounds, elevation, to_cartesian),
    }
}
