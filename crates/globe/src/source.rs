//! Data-source seams behind raster layers.
//!
//! Sources return boxed futures so the planet can hand them to whatever
//! executor the host uses. They may complete on any thread.

use std::{future::Future, pin::Pin};

use terrain_mesh::{GeographicBounds, Heightfield};

use crate::error::Result;

/// Future type for elevation requests.
pub type ElevationFuture = Pin<Box<dyn Future<Output = Result<Heightfield>> + Send>>;

/// Future type for imagery requests.
pub type TextureFuture = Pin<Box<dyn Future<Output = Result<Texture>> + Send>>;

/// Opaque handle to a texture owned by an imagery source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// A delivered texture and the region it covers.
///
/// Sources may answer with a texture covering more than the requested
/// bounds, such as a cached parent tile; tiles map into it with a
/// [`UvTransform`](crate::UvTransform).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Texture {
    pub handle: TextureHandle,
    pub bounds: GeographicBounds,
}

/// Produces heightfields for tile bounds.
pub trait ElevationSource: Send + Sync {
    /// Deepest level this source has distinct data for.
    ///
    /// Tiles below it resample their parent's heightfield instead of asking.
    fn max_level(&self) -> u32;

    /// Fetch the extended `(resolution + 2)²` heightfield for `bounds`.
    ///
    /// Border samples lie one sample step outside `bounds`; past a pole they
    /// continue down the far meridian.
    fn request(&self, bounds: GeographicBounds, resolution: usize) -> ElevationFuture;
}

/// Produces textures for tile bounds.
pub trait ImagerySource: Send + Sync {
    /// Fetch a `width × height` texture covering at least `bounds`.
    fn request(&self, bounds: GeographicBounds, width: u32, height: u32) -> TextureFuture;

    /// Free a texture once no tile uses it.
    fn release(&self, texture: TextureHandle);
}
