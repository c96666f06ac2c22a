//! Skirts: a curtain hanging from the tile perimeter toward the planet center.
//!
//! Neighboring tiles at different levels do not share their edge vertices, so
//! their surfaces can leave hairline cracks. The skirt fills them.

use crate::mesh::MeshBuilder;

/// Scale applied to perimeter points to get the bottom of the skirt.
pub const SKIRT_SCALE: f64 = 0.99;

/// Append a skirt below the closed, counter-clockwise `perimeter` loop.
///
/// Every perimeter vertex contributes a top vertex on the surface and a bottom
/// vertex scaled by [`SKIRT_SCALE`] toward the origin. Both reuse the surface
/// normal and UV so the curtain shades like the tile edge.
pub(crate) fn append_skirt(builder: &mut MeshBuilder, perimeter: &[u32]) {
    let count = perimeter.len();
    if count < 2 {
        return;
    }

    let mut ring = Vec::with_capacity(count);
    for &vertex in perimeter {
        let position = builder.position(vertex);
        let normal = builder.normal(vertex);
        let uv = builder.uv(vertex);
        let top = builder.push_raw(position, normal, uv);
        let bottom = builder.push_raw(position * SKIRT_SCALE, normal, uv);
        ring.push((top, bottom));
    }

    for i in 0..count {
        let (top, bottom) = ring[i];
        let (next_top, next_bottom) = ring[(i + 1) % count];
        builder.push_triangle(top, bottom, next_top);
        builder.push_triangle(next_top, bottom, next_bottom);
    }
}
