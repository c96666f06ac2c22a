//! Layer changes flowing into tiles: visibility, replacement, removal and
//! content refreshes.

mod common;

use std::sync::Arc;

use common::{EAST, Harness, camera_above, far_camera};
use globe::{GeographicBounds, Layer, LayerManager, ProceduralElevation, ProceduralImagery, UvTransform};

fn imagery_harness() -> (Harness, Arc<ProceduralImagery>, Arc<Layer>) {
    let source = Arc::new(ProceduralImagery::new());
    let layer = Arc::new(Layer::imagery("photo", GeographicBounds::WORLD, source.clone()));
    let mut layers = LayerManager::new();
    layers.push_layer(Arc::clone(&layer));
    let mut harness = Harness::new(layers);
    harness.settle(&far_camera(), 10);
    harness.run(&far_camera(), 1);
    (harness, source, layer)
}

fn shown_textures(harness: &Harness) -> usize {
    harness
        .renderer
        .visible_tiles()
        .map(|id| harness.renderer.tile(id).unwrap().material.textures.len())
        .sum()
}

#[test]
fn test_imagery_arrives_after_geometry() {
    let (harness, source, layer) = imagery_harness();
    assert_eq!(source.requested(), 2);
    assert_eq!(shown_textures(&harness), 2);
    let imagery = layer.as_imagery().unwrap();
    assert_eq!(imagery.texture_count(), 2);
    for id in harness.renderer.visible_tiles() {
        let material = &harness.renderer.tile(id).unwrap().material;
        assert_eq!(material.textures[0].uv, UvTransform::IDENTITY);
    }
}

#[test]
fn test_oversized_imagery_maps_tile_into_texture() {
    let source = Arc::new(ProceduralImagery::with_margin(0.25));
    let mut layers = LayerManager::new();
    layers.push_layer(Arc::new(Layer::imagery("padded", GeographicBounds::WORLD, source.clone())));
    let mut harness = Harness::new(layers);
    harness.settle(&far_camera(), 10);
    harness.run(&far_camera(), 1);

    assert_eq!(shown_textures(&harness), 2);
    for id in harness.renderer.visible_tiles() {
        let uv = harness.renderer.tile(id).unwrap().material.textures[0].uv;
        assert!((uv.scale.x - 2.0 / 3.0).abs() < 1e-6);
        assert!((uv.scale.y - 2.0 / 3.0).abs() < 1e-6);
        assert!((uv.offset.x - 1.0 / 6.0).abs() < 1e-6);
        assert!((uv.offset.y - 1.0 / 6.0).abs() < 1e-6);
    }
}

#[test]
fn test_hiding_imagery_keeps_textures() {
    let (mut harness, source, layer) = imagery_harness();

    layer.set_visible(false);
    harness.run(&far_camera(), 1);
    assert_eq!(shown_textures(&harness), 0);
    for id in harness.renderer.visible_tiles() {
        let material = &harness.renderer.tile(id).unwrap().material;
        assert!(material.placeholder);
        assert_eq!(material.sampler_slots, 1);
    }
    assert_eq!(source.released(), 0);

    layer.set_visible(true);
    harness.run(&far_camera(), 1);
    assert_eq!(shown_textures(&harness), 2);
    assert_eq!(source.requested(), 2);
}

#[test]
fn test_removing_imagery_releases_textures() {
    let (mut harness, source, _layer) = imagery_harness();
    let removed = harness.planet.layers_mut().remove_layer(0, false).unwrap();
    assert!(!removed.is_disposed());
    harness.run(&far_camera(), 1);
    assert_eq!(source.live(), 0);
    assert_eq!(shown_textures(&harness), 0);
    for id in harness.renderer.visible_tiles() {
        assert_eq!(harness.renderer.tile(id).unwrap().material.sampler_slots, 0);
    }
}

#[test]
fn test_content_change_refetches_imagery() {
    let (mut harness, source, layer) = imagery_harness();
    layer.notify_content_changed();
    harness.run(&far_camera(), 2);
    assert_eq!(source.requested(), 4);
    assert_eq!(source.released(), 2);
    assert_eq!(shown_textures(&harness), 2);
}

#[test]
fn test_replacing_layer_disposes_previous_and_reloads() {
    let flat = Arc::new(Layer::elevation(
        "flat",
        GeographicBounds::WORLD,
        Arc::new(ProceduralElevation::flat(30)),
    ));
    let mut layers = LayerManager::new();
    layers.push_layer(Arc::clone(&flat));
    let mut harness = Harness::new(layers);
    let camera = camera_above(EAST.x, EAST.y, 1_000_000.0);
    harness.settle(&camera, 100);
    assert_eq!(harness.planet.elevation_at(EAST), Some(0.0));

    let ramp = Arc::new(Layer::elevation(
        "ramp",
        GeographicBounds::WORLD,
        Arc::new(ProceduralElevation::new(30, |_, lat| 500.0 * lat)),
    ));
    harness.planet.layers_mut().set_layer(Arc::clone(&ramp), 0);
    assert!(flat.is_disposed());

    harness.settle(&camera, 100);
    for (_, tile) in harness.planet.tiles() {
        if tile.is_loaded() {
            assert_eq!(tile.elevation_layer(), Some(ramp.id()));
            assert!(tile.layer_data(flat.id()).is_none());
        }
    }
    let height = harness.planet.elevation_at(EAST).unwrap();
    assert!((height - 500.0 * EAST.y).abs() < 1e-6);
}

#[test]
fn test_hiding_elevation_flattens_terrain() {
    let ramp = Arc::new(Layer::elevation(
        "ramp",
        GeographicBounds::WORLD,
        Arc::new(ProceduralElevation::new(30, |_, lat| 500.0 * lat)),
    ));
    let mut layers = LayerManager::new();
    layers.push_layer(Arc::clone(&ramp));
    let mut harness = Harness::new(layers);
    harness.settle(&far_camera(), 10);
    assert!(harness.planet.elevation_at(EAST).unwrap() > 100.0);

    ramp.set_visible(false);
    harness.settle(&far_camera(), 10);
    assert_eq!(harness.planet.elevation_at(EAST), Some(0.0));
    for (_, tile) in harness.planet.tiles() {
        assert_eq!(tile.elevation_layer(), None);
    }
}

#[test]
fn test_regional_layer_only_applies_where_it_overlaps() {
    let region = GeographicBounds::new(glam::DVec2::new(0.5, 0.2), glam::DVec2::new(0.7, 0.4));
    let local = Arc::new(Layer::elevation(
        "local",
        region,
        Arc::new(ProceduralElevation::new(30, |_, _| 250.0)),
    ));
    let mut layers = LayerManager::new();
    layers.push_layer(Arc::clone(&local));
    let mut harness = Harness::new(layers);
    harness.settle(&far_camera(), 10);

    let planet = &harness.planet;
    let west = planet.tile(planet.roots()[0]).unwrap();
    let east = planet.tile(planet.roots()[1]).unwrap();
    assert_eq!(west.elevation_layer(), None);
    assert_eq!(east.elevation_layer(), Some(local.id()));
    assert_eq!(planet.elevation_at(glam::DVec2::new(-1.0, 0.0)), Some(0.0));
}
