//! Per-tile material bookkeeping.

use crate::layer::{LayerId, UvTransform};
use crate::layer_manager::LayerManager;
use crate::source::TextureHandle;

/// An imagery texture bound into a tile material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialTexture {
    pub layer: LayerId,
    pub texture: TextureHandle,
    pub uv: UvTransform,
}

/// A shader-color snippet applied on top of the imagery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialSnippet {
    pub layer: LayerId,
    pub source: String,
}

/// Everything a renderer needs to shade one tile.
///
/// Textures and snippets are in layer order, bottom to top, and only include
/// visible layers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileMaterial {
    pub textures: Vec<MaterialTexture>,
    pub snippets: Vec<MaterialSnippet>,
    /// Sampler slots to declare: one per imagery layer in the manager.
    pub sampler_slots: usize,
    /// No imagery has arrived yet; shade with the neutral placeholder color.
    pub placeholder: bool,
}

impl TileMaterial {
    /// Build a material from the textures a tile holds.
    ///
    /// `texture_for` reports the texture the tile has for an imagery layer.
    pub fn build(
        layers: &LayerManager,
        mut texture_for: impl FnMut(LayerId) -> Option<(TextureHandle, UvTransform)>,
    ) -> Self {
        let mut textures = Vec::new();
        let mut snippets = Vec::new();
        for layer in layers.layers().filter(|layer| layer.is_visible()) {
            if layer.as_imagery().is_some() {
                if let Some((texture, uv)) = texture_for(layer.id()) {
                    textures.push(MaterialTexture {
                        layer: layer.id(),
                        texture,
                        uv,
                    });
                }
            } else if let Some(shader) = layer.as_shader_color() {
                snippets.push(MaterialSnippet {
                    layer: layer.id(),
                    source: shader.snippet.clone(),
                });
            }
        }
        let placeholder = textures.is_empty();
        Self {
            textures,
            snippets,
            sampler_slots: layers.sampler_slots(),
            placeholder,
        }
    }
}
