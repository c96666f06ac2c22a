//! Quadtree terrain for a virtual globe.
//!
//! A [`Planet`] covers the ellipsoid with two hemisphere tiles and refines
//! them into a quadtree as the camera approaches. Each tile draws its data
//! from the layers in a [`LayerManager`]: elevation layers shape the mesh,
//! imagery layers texture it and shader-color layers tint it.
//!
//! # Design principles
//!
//! - **Runtime-agnostic**: requests are futures handed to a [`TaskSpawner`];
//!   results come back over a channel and are applied during
//!   [`Planet::update`].
//! - **Renderer-agnostic**: GPU work goes through the [`TileRenderer`] trait.
//! - **Crack-free**: meshes come from [`terrain_mesh`], whose bordered
//!   heightfields and skirts keep neighbouring tiles watertight.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use glam::DVec3;
//! use globe::{Camera, HeadlessRenderer, LayerManager, LocalExecutor, Planet, PlanetConfig};
//!
//! let executor = Arc::new(LocalExecutor::new());
//! let mut planet = Planet::new(PlanetConfig::default(), LayerManager::new(), executor.clone())?;
//! let mut renderer = HeadlessRenderer::new();
//! let camera = Camera::omniscient(DVec3::new(4.0e7, 0.0, 0.0), 1.0);
//!
//! for _ in 0..4 {
//!     executor.run_until_stalled();
//!     planet.update(&camera, &mut renderer)?;
//!     renderer.end_frame();
//! }
//! assert_eq!(planet.stats().visible, 2);
//! # Ok::<(), globe::Error>(())
//! ```

mod arena;
pub mod camera;
pub mod config;
mod error;
pub mod layer;
pub mod layer_manager;
pub mod lod;
pub mod material;
mod planet;
pub mod procedural;
pub mod renderer;
pub mod scheduler;
pub mod source;
pub mod spawner;
pub mod tile;

pub use arena::{TileArena, TileId};
pub use camera::{Aabb, Camera, Frustum};
pub use config::{DeviceClass, LodConfig, PlanetConfig};
pub use error::{Error, Result};
pub use layer::{
    AbortHandle, ElevationLayer, ImageryLayer, Layer, LayerEvent, LayerId, LayerKind, LayerListener,
    ShaderColorLayer, UvTransform,
};
pub use layer_manager::LayerManager;
pub use lod::LodMetric;
pub use material::{MaterialSnippet, MaterialTexture, TileMaterial};
pub use planet::{Planet, PlanetStats};
pub use procedural::{ProceduralElevation, ProceduralImagery};
pub use renderer::{HeadlessRenderer, ResidentTile, TileRenderer};
pub use scheduler::{FrameBudget, LoadQueue};
pub use source::{ElevationFuture, ElevationSource, ImagerySource, Texture, TextureFuture, TextureHandle};
pub use spawner::{BoxFuture, LocalExecutor, TaskSpawner};
pub use tile::{LayerData, Tile, TileState};

// Re-export geometry types that appear in this crate's API.
pub use terrain_mesh::{GeographicBounds, Heightfield, TerrainMesh, TileTopology, geodesy, geodesy::Ellipsoid};
