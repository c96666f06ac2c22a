//! Ordered layer slots with change fan-out to subscribers.
//!
//! Subscribers are keyed; each key holds one channel sender. Events are
//! pushed into every subscriber's channel in emission order and drained by
//! the subscriber on its own schedule.

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use async_channel::{Receiver, Sender};
use terrain_mesh::GeographicBounds;
use tracing::debug;

use crate::layer::{Layer, LayerEvent, LayerId};

type Subscribers = Arc<RwLock<HashMap<String, Sender<LayerEvent>>>>;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Slot-indexed layers; later slots draw on top of earlier ones.
#[derive(Debug)]
pub struct LayerManager {
    slots: Vec<Option<Arc<Layer>>>,
    subscribers: Subscribers,
    listener_key: String,
}

impl Default for LayerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerManager {
    #[must_use]
    pub fn new() -> Self {
        let id = NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            slots: Vec::new(),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            listener_key: format!("layer-manager-{id}"),
        }
    }

    /// Install `layer` at `index`, disposing whatever was there.
    ///
    /// Installing the layer already in the slot keeps it alive.
    ///
    /// Subscribers see [`LayerEvent::LayersChanged`] before this returns, and
    /// from then on every event of the new layer.
    pub fn set_layer(&mut self, layer: Arc<Layer>, index: usize) {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        if let Some(previous) = self.slots[index].take() {
            previous.remove_listener(&self.listener_key);
            if !Arc::ptr_eq(&previous, &layer) {
                previous.dispose();
            }
        }

        let subscribers = Arc::clone(&self.subscribers);
        layer.add_listener(
            self.listener_key.clone(),
            Box::new(move |event| broadcast(&subscribers, event)),
        );
        debug!(layer = %layer.id(), name = layer.name(), index, "Layer installed");
        self.slots[index] = Some(layer);
        broadcast(&self.subscribers, &LayerEvent::LayersChanged);
    }

    /// Append `layer` after the last slot and return its index.
    pub fn push_layer(&mut self, layer: Arc<Layer>) -> usize {
        let index = self.slots.len();
        self.set_layer(layer, index);
        index
    }

    /// Clear the slot at `index`, optionally disposing its layer.
    pub fn remove_layer(&mut self, index: usize, dispose: bool) -> Option<Arc<Layer>> {
        let layer = self.slots.get_mut(index)?.take()?;
        layer.remove_listener(&self.listener_key);
        if dispose {
            layer.dispose();
        }
        debug!(layer = %layer.id(), index, dispose, "Layer removed");
        broadcast(&self.subscribers, &LayerEvent::LayersChanged);
        Some(layer)
    }

    /// Receive every event under `key`, replacing a previous subscription.
    #[must_use]
    pub fn subscribe(&self, key: impl Into<String>) -> Receiver<LayerEvent> {
        let (sender, receiver) = async_channel::unbounded();
        self.subscribers.write().unwrap().insert(key.into(), sender);
        receiver
    }

    pub fn unsubscribe(&self, key: &str) -> bool {
        self.subscribers.write().unwrap().remove(key).is_some()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<Layer>> {
        self.slots.get(index)?.as_ref()
    }

    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&Arc<Layer>> {
        self.layers().find(|layer| layer.id() == id)
    }

    /// Slot order of the layer with `id`.
    #[must_use]
    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|layer| layer.id() == id))
    }

    /// Occupied slots, bottom to top.
    pub fn layers(&self) -> impl Iterator<Item = &Arc<Layer>> {
        self.slots.iter().flatten()
    }

    pub fn imagery_layers(&self) -> impl Iterator<Item = &Arc<Layer>> {
        self.layers().filter(|layer| layer.as_imagery().is_some())
    }

    pub fn elevation_layers(&self) -> impl Iterator<Item = &Arc<Layer>> {
        self.layers().filter(|layer| layer.as_elevation().is_some())
    }

    pub fn raster_layers(&self) -> impl Iterator<Item = &Arc<Layer>> {
        self.layers().filter(|layer| layer.is_raster())
    }

    pub fn shader_color_layers(&self) -> impl Iterator<Item = &Arc<Layer>> {
        self.layers().filter(|layer| layer.as_shader_color().is_some())
    }

    /// The elevation layer a tile over `bounds` must wait for: the topmost
    /// visible one with data there.
    #[must_use]
    pub fn mandatory_elevation(&self, bounds: &GeographicBounds) -> Option<&Arc<Layer>> {
        self.slots.iter().flatten().rev().find(|layer| {
            layer.as_elevation().is_some() && layer.is_visible() && layer.overlaps(bounds)
        })
    }

    /// Number of texture samplers a tile material needs.
    #[must_use]
    pub fn sampler_slots(&self) -> usize {
        self.imagery_layers().count()
    }
}

fn broadcast(subscribers: &Subscribers, event: &LayerEvent) {
    let mut closed = Vec::new();
    for (key, sender) in subscribers.read().unwrap().iter() {
        if sender.try_send(event.clone()).is_err() {
            closed.push(key.clone());
        }
    }
    if !closed.is_empty() {
        let mut subscribers = subscribers.write().unwrap();
        for key in closed {
            subscribers.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedural::{ProceduralElevation, ProceduralImagery};
    use glam::DVec2;

    fn drain(receiver: &Receiver<LayerEvent>) -> Vec<LayerEvent> {
        std::iter::from_fn(|| receiver.try_recv().ok()).collect()
    }

    #[test]
    fn test_set_layer_notifies_and_rebroadcasts() {
        let mut manager = LayerManager::new();
        let events = manager.subscribe("tile");
        let layer = Arc::new(Layer::shader_color("tint", GeographicBounds::WORLD, ""));
        manager.set_layer(Arc::clone(&layer), 0);
        layer.set_visible(false);
        layer.notify_content_changed();

        assert_eq!(
            drain(&events),
            vec![
                LayerEvent::LayersChanged,
                LayerEvent::VisibilityChanged {
                    layer: layer.id(),
                    visible: false
                },
                LayerEvent::ContentChanged { layer: layer.id() },
            ]
        );
    }

    #[test]
    fn test_replacing_disposes_previous() {
        let mut manager = LayerManager::new();
        let old = Arc::new(Layer::shader_color("old", GeographicBounds::WORLD, ""));
        let new = Arc::new(Layer::shader_color("new", GeographicBounds::WORLD, ""));
        manager.set_layer(Arc::clone(&old), 2);
        manager.set_layer(Arc::clone(&new), 2);
        assert!(old.is_disposed());
        assert!(!new.is_disposed());
        assert_eq!(manager.get(2).map(|l| l.id()), Some(new.id()));
        assert!(manager.get(0).is_none());

        // The old layer no longer reaches subscribers.
        let events = manager.subscribe("tile");
        old.notify_content_changed();
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn test_reinstalling_same_layer_keeps_it_alive() {
        let mut manager = LayerManager::new();
        let source = Arc::new(ProceduralImagery::new());
        let layer = Arc::new(Layer::imagery("photo", GeographicBounds::WORLD, source.clone()));
        manager.set_layer(Arc::clone(&layer), 0);
        manager.set_layer(Arc::clone(&layer), 0);

        assert!(!layer.is_disposed());
        assert_eq!(source.released(), 0);
        assert_eq!(layer.listener_count(), 1);
        assert_eq!(manager.get(0).map(|l| l.id()), Some(layer.id()));

        let events = manager.subscribe("tile");
        layer.notify_content_changed();
        assert_eq!(drain(&events), vec![LayerEvent::ContentChanged { layer: layer.id() }]);
    }

    #[test]
    fn test_remove_layer() {
        let mut manager = LayerManager::new();
        let layer = Arc::new(Layer::shader_color("tint", GeographicBounds::WORLD, ""));
        let index = manager.push_layer(Arc::clone(&layer));
        let events = manager.subscribe("tile");

        let removed = manager.remove_layer(index, false).unwrap();
        assert!(!removed.is_disposed());
        assert_eq!(drain(&events), vec![LayerEvent::LayersChanged]);
        assert!(manager.remove_layer(index, true).is_none());
    }

    #[test]
    fn test_one_sender_per_key() {
        let manager = LayerManager::new();
        let first = manager.subscribe("tile");
        let second = manager.subscribe("tile");
        assert_eq!(manager.subscriber_count(), 1);
        broadcast(&manager.subscribers, &LayerEvent::LayersChanged);
        assert!(drain(&first).is_empty());
        assert_eq!(drain(&second).len(), 1);
        assert!(manager.unsubscribe("tile"));
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let manager = LayerManager::new();
        drop(manager.subscribe("gone"));
        broadcast(&manager.subscribers, &LayerEvent::LayersChanged);
        assert_eq!(manager.subscriber_count(), 0);
    }

    #[test]
    fn test_capability_filters() {
        let mut manager = LayerManager::new();
        let world = GeographicBounds::WORLD;
        manager.push_layer(Arc::new(Layer::imagery("a", world, Arc::new(ProceduralImagery::new()))));
        manager.push_layer(Arc::new(Layer::elevation(
            "low",
            world,
            Arc::new(ProceduralElevation::flat(4)),
        )));
        let local = GeographicBounds::new(DVec2::ZERO, DVec2::splat(0.5));
        let high = Arc::new(Layer::elevation("high", local, Arc::new(ProceduralElevation::flat(12))));
        manager.push_layer(Arc::clone(&high));
        manager.push_layer(Arc::new(Layer::shader_color("tint", world, "")));

        assert_eq!(manager.imagery_layers().count(), 1);
        assert_eq!(manager.elevation_layers().count(), 2);
        assert_eq!(manager.raster_layers().count(), 3);
        assert_eq!(manager.shader_color_layers().count(), 1);
        assert_eq!(manager.sampler_slots(), 1);

        let inside = GeographicBounds::new(DVec2::splat(0.1), DVec2::splat(0.2));
        assert_eq!(manager.mandatory_elevation(&inside).map(|l| l.id()), Some(high.id()));
        let outside = GeographicBounds::new(DVec2::splat(-0.2), DVec2::splat(-0.1));
        assert_eq!(manager.mandatory_elevation(&outside).map(|l| l.name()), Some("low"));

        high.set_visible(false);
        assert_eq!(manager.mandatory_elevation(&inside).map(|l| l.name()), Some("low"));
        assert_eq!(manager.index_of(high.id()), Some(2));
    }
}
