//! Fan tiles that converge on a pole.
//!
//! A regular grid would stack `R` coincident vertices on the pole. Instead,
//! each row toward the pole holds one vertex fewer, ending in a single apex.
//! Vertices are spread evenly across the row, so their columns fall between
//! border samples and heights are interpolated along the row.

use glam::{DVec2, DVec3};

use crate::bounds::GeographicBounds;
use crate::error::MeshResult;
use crate::mesh::{MeshBuilder, TerrainMesh, TileTopology};
use crate::sampler::Sampler;

/// Build a tile whose northern edge is the north pole.
///
/// Row `y` (from the south) holds `R - y` vertices; row `R - 1` is the apex.
pub fn build_north_pole_mesh(
    resolution: usize,
    bounds: &GeographicBounds,
    elevation: &[f64],
    to_cartesian: impl Fn(f64, f64, f64) -> DVec3,
) -> MeshResult<TerrainMesh> {
    let sampler = Sampler::new(resolution, bounds, elevation, to_cartesian)?;
    let r = sampler.resolution();
    let mut builder = fan_builder(r);

    let rows: Vec<Vec<u32>> = (0..r)
        .map(|y| push_row(&mut builder, &sampler, y, r - y))
        .collect();

    for y in 0..r - 1 {
        let (lower, upper) = (&rows[y], &rows[y + 1]);
        let n = lower.len();
        for i in 0..n - 1 {
            builder.push_triangle(lower[i], lower[i + 1], upper[i]);
        }
        for i in 0..n.saturating_sub(2) {
            builder.push_triangle(lower[i + 1], upper[i + 1], upper[i]);
        }
    }

    // South edge west to east, up the east side, back down the west side.
    let mut perimeter = Vec::with_capacity(3 * (r - 1));
    perimeter.extend_from_slice(&rows[0]);
    perimeter.extend(rows[1..].iter().filter_map(|row| row.last().copied()));
    perimeter.extend(rows[1..r - 1].iter().rev().filter_map(|row| row.first().copied()));

    Ok(builder.finish(TileTopology::NorthPole, sampler.shift(), &perimeter))
}

/// Build a tile whose southern edge is the south pole.
///
/// Row `y` holds `y + 1` vertices; row `0` is the apex.
pub fn build_south_pole_mesh(
    resolution: usize,
    bounds: &GeographicBounds,
    elevation: &[f64],
    to_cartesian: impl Fn(f64, f64, f64) -> DVec3,
) -> MeshResult<TerrainMesh> {
    let sampler = Sampler::new(resolution, bounds, elevation, to_cartesian)?;
    let r = sampler.resolution();
    let mut builder = fan_builder(r);

    let rows: Vec<Vec<u32>> = (0..r)
        .map(|y| push_row(&mut builder, &sampler, y, y + 1))
        .collect();

    for y in 0..r - 1 {
        let (lower, upper) = (&rows[y], &rows[y + 1]);
        let n = lower.len();
        for i in 0..n {
            builder.push_triangle(lower[i], upper[i + 1], upper[i]);
        }
        for i in 0..n - 1 {
            builder.push_triangle(lower[i], lower[i + 1], upper[i + 1]);
        }
    }

    // Apex, up the east side, the north edge east to west, down the west side.
    let top = &rows[r - 1];
    let mut perimeter = Vec::with_capacity(3 * (r - 1));
    perimeter.push(rows[0][0]);
    perimeter.extend(rows[1..].iter().filter_map(|row| row.last().copied()));
    perimeter.extend(top[..r - 1].iter().rev().copied());
    perimeter.extend(rows[1..r - 1].iter().rev().filter_map(|row| row.first().copied()));

    Ok(builder.finish(TileTopology::SouthPole, sampler.shift(), &perimeter))
}

fn fan_builder(resolution: usize) -> MeshBuilder {
    let cells = resolution - 1;
    let vertices = resolution * (resolution + 1) / 2 + 6 * cells;
    MeshBuilder::with_capacity(vertices, 3 * cells * cells + 18 * cells)
}

/// Emit the `count` vertices of fan row `y`, spread across the full tile width.
fn push_row<F>(builder: &mut MeshBuilder, sampler: &Sampler<'_, F>, y: usize, count: usize) -> Vec<u32>
where
    F: Fn(f64, f64, f64) -> DVec3,
{
    let cells = (sampler.resolution() - 1) as f64;
    (0..count)
        .map(|c| {
            let t = if count > 1 {
                c as f64 / (count - 1) as f64
            } else {
                0.5
            };
            let column = 1.0 + t * cells;
            let (position, normal) = sampler.point_and_normal(column, y + 1);
            let uv = DVec2::new(t, y as f64 / cells);
            builder.push_vertex(position, normal, uv)
        })
        .collect()
}

/// Vertices in the surface of a fan tile.
#[must_use]
pub fn fan_vertex_count(resolution: usize) -> usize {
    resolution * (resolution + 1) / 2
}
