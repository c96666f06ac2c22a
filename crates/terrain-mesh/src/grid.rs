//! Regular grid tiles away from the poles.

use glam::{DVec2, DVec3};

use crate::bounds::GeographicBounds;
use crate::error::MeshResult;
use crate::mesh::{MeshBuilder, TerrainMesh, TileTopology};
use crate::sampler::Sampler;

/// Build an `R × R` grid tile.
///
/// Vertices are laid out row by row from the southern edge, west to east.
/// Each cell becomes two counter-clockwise triangles seen from outside the
/// planet, and the skirt follows the four edges.
pub fn build_base_mesh(
    resolution: usize,
    bounds: &GeographicBounds,
    elevation: &[f64],
    to_cartesian: impl Fn(f64, f64, f64) -> DVec3,
) -> MeshResult<TerrainMesh> {
    let sampler = Sampler::new(resolution, bounds, elevation, to_cartesian)?;
    let r = sampler.resolution();
    let cells = r - 1;
    let mut builder = MeshBuilder::with_capacity(r * r + 8 * cells, 6 * cells * cells + 24 * cells);

    let scale = 1.0 / cells as f64;
    for y in 0..r {
        for x in 0..r {
            let (position, normal) = sampler.point_and_normal((x + 1) as f64, y + 1);
            let uv = DVec2::new(x as f64 * scale, y as f64 * scale);
            builder.push_vertex(position, normal, uv);
        }
    }

    let r32 = index(r);
    for y in 0..index(cells) {
        for x in 0..index(cells) {
            let a = y * r32 + x;
            let b = a + 1;
            let c = a + r32;
            let d = c + 1;
            builder.push_triangle(a, b, d);
            builder.push_triangle(a, d, c);
        }
    }

    let perimeter = perimeter(r);
    Ok(builder.finish(TileTopology::Base, sampler.shift(), &perimeter))
}

/// Counter-clockwise perimeter of an `R × R` grid, starting at the south-west corner.
fn perimeter(resolution: usize) -> Vec<u32> {
    let r = index(resolution);
    let at = |x: u32, y: u32| y * r + x;
    let mut loop_ = Vec::with_capacity(4 * (resolution - 1));
    loop_.extend((0..r).map(|x| at(x, 0)));
    loop_.extend((1..r).map(|y| at(r - 1, y)));
    loop_.extend((0..r - 1).rev().map(|x| at(x, r - 1)));
    loop_.extend((1..r - 1).rev().map(|y| at(0, y)));
    loop_
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn index(value: usize) -> u32 {
    value as u32
}
