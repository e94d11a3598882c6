//! User-facing layer list derived from the scene's draw order.

use crate::config::EditorConfig;
use crate::events::{Mailbox, Subscription};
use crate::scene::{ObjectId, ObjectKind, Scene, SceneError, SceneEvent, SceneObject};
use crate::thumbnail::{Thumbnail, Thumbnailer};
use kurbo::Vec2;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Projection of one scene object for the layer panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    /// The scene object this layer stands for.
    pub id: ObjectId,
    pub name: String,
    pub kind: ObjectKind,
    /// Empty when no preview could be rendered.
    pub thumbnail: Thumbnail,
    pub visible: bool,
    pub locked: bool,
    pub opacity: f64,
    /// Index in the scene's draw order.
    pub z_index: usize,
}

/// Keeps the layer list in step with the scene.
///
/// Layers are listed topmost first. Every field is re-derived from the scene
/// on each refresh; nothing is patched in place.
pub struct LayerManager {
    layers: Vec<Layer>,
    mailbox: Option<Mailbox<SceneEvent>>,
    subscription: Option<Subscription>,
    thumbnailer: Option<Rc<dyn Thumbnailer>>,
    thumbnail_size: u32,
    duplicate_offset: f64,
    /// Previews keyed by object, valid while the object's JSON is unchanged.
    thumbnails: HashMap<ObjectId, (String, Thumbnail)>,
}

impl LayerManager {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            layers: Vec::new(),
            mailbox: None,
            subscription: None,
            thumbnailer: None,
            thumbnail_size: config.layer_thumbnail_size,
            duplicate_offset: config.duplicate_offset,
            thumbnails: HashMap::new(),
        }
    }

    pub fn set_thumbnailer(&mut self, thumbnailer: Option<Rc<dyn Thumbnailer>>) {
        self.thumbnailer = thumbnailer;
        self.thumbnails.clear();
    }

    /// Start observing `scene`. Attaching twice keeps a single listener.
    pub fn attach(&mut self, scene: &Scene) {
        if self.subscription.as_ref().is_some_and(Subscription::is_active) {
            return;
        }
        let (subscription, mailbox) = scene.events().mailbox();
        self.subscription = Some(subscription);
        self.mailbox = Some(mailbox);
    }

    pub fn detach(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.dispose();
        }
        self.mailbox = None;
    }

    /// Layers, topmost first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: ObjectId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Display position (0 = topmost) of a layer.
    pub fn position(&self, id: ObjectId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    /// Resync after queued scene events. Returns whether a refresh ran.
    pub fn process_events(&mut self, scene: &mut Scene) -> bool {
        let Some(mailbox) = &self.mailbox else {
            return false;
        };
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut dirty = false;
        for event in mailbox.drain() {
            match event {
                SceneEvent::ObjectAdded(id) => added.push(id),
                SceneEvent::ObjectRemoved(id) => removed.push(id),
                SceneEvent::ObjectModified(_)
                | SceneEvent::Reordered
                | SceneEvent::Cleared
                | SceneEvent::Loaded => dirty = true,
                SceneEvent::ObjectMoving(_)
                | SceneEvent::SelectionChanged(_)
                | SceneEvent::SelectionCleared => {}
            }
        }
        if added.is_empty() && removed.is_empty() && !dirty {
            return false;
        }
        for id in removed {
            self.remove_layer(scene, id);
        }
        for id in added {
            self.add_layer(scene, id);
        }
        self.refresh_layers(scene);
        true
    }

    /// Start tracking a newly added object. Returns false for the workspace,
    /// auxiliary objects and unknown ids.
    pub fn add_layer(&mut self, scene: &mut Scene, id: ObjectId) -> bool {
        if !scene.get(id).is_some_and(SceneObject::is_layer) {
            return false;
        }
        self.assign_names(scene);
        self.refresh_layers(scene);
        self.layer(id).is_some()
    }

    /// Stop tracking an object that left the scene.
    pub fn remove_layer(&mut self, scene: &mut Scene, id: ObjectId) -> bool {
        self.thumbnails.remove(&id);
        let tracked = self.layer(id).is_some();
        self.refresh_layers(scene);
        tracked
    }

    /// Full resync with the scene. Idempotent.
    pub fn refresh_layers(&mut self, scene: &mut Scene) {
        self.assign_names(scene);

        let mut layers = Vec::new();
        for (z_index, &id) in scene.draw_order().iter().enumerate() {
            let Some(object) = scene.get(id) else {
                continue;
            };
            if !object.is_layer() {
                continue;
            }
            let thumbnail = self.thumbnail_for(id, object);
            layers.push(Layer {
                id,
                name: object.name.clone().unwrap_or_default(),
                kind: object.kind(),
                thumbnail,
                visible: object.visible,
                locked: object.locked,
                opacity: object.opacity,
                z_index,
            });
        }
        layers.reverse();

        let live: HashSet<ObjectId> = layers.iter().map(|l| l.id).collect();
        self.thumbnails.retain(|id, _| live.contains(id));
        self.layers = layers;
    }

    /// Give every unnamed layer object a `"{Type} {n}"` name, back to front.
    fn assign_names(&self, scene: &mut Scene) {
        let mut taken: HashSet<String> = scene
            .objects_ordered()
            .filter(|o| o.is_layer())
            .filter_map(|o| o.name.clone())
            .collect();
        let unnamed: Vec<(ObjectId, ObjectKind)> = scene
            .objects_ordered()
            .filter(|o| o.is_layer() && o.name.is_none())
            .filter_map(|o| Some((o.id?, o.kind())))
            .collect();

        for (id, kind) in unnamed {
            let name = (1..)
                .map(|n| format!("{} {}", kind.type_label(), n))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_else(|| kind.type_label().to_string());
            taken.insert(name.clone());
            scene.modify_silent(id, |o| o.name = Some(name));
        }
    }

    fn thumbnail_for(&mut self, id: ObjectId, object: &SceneObject) -> Thumbnail {
        let Some(thumbnailer) = &self.thumbnailer else {
            return Thumbnail::empty();
        };
        // Name and id do not affect the preview.
        let mut key_object = object.clone();
        key_object.name = None;
        let key = serde_json::to_string(&key_object).unwrap_or_default();
        if let Some((cached_key, thumbnail)) = self.thumbnails.get(&id) {
            if *cached_key == key {
                return thumbnail.clone();
            }
        }

        let thumbnail = match thumbnailer.object_thumbnail(object, self.thumbnail_size) {
            Ok(thumbnail) => thumbnail,
            Err(e) => {
                log::debug!("No layer preview for {}: {}", id, e);
                Thumbnail::empty()
            }
        };
        self.thumbnails.insert(id, (key, thumbnail.clone()));
        thumbnail
    }

    fn layer_object<'a>(scene: &'a Scene, id: ObjectId) -> Option<&'a SceneObject> {
        scene.get(id).filter(|o| o.is_layer())
    }

    /// Flip visibility of a layer and its object. Returns the new visibility.
    pub fn toggle_visibility(&mut self, scene: &mut Scene, id: ObjectId) -> Option<bool> {
        Self::layer_object(scene, id)?;
        let visible = scene.modify(id, |o| {
            o.visible = !o.visible;
            o.visible
        })?;
        self.refresh_layers(scene);
        Some(visible)
    }

    /// Flip the lock. Locked objects are neither selectable nor evented.
    /// Returns the new lock state.
    pub fn toggle_lock(&mut self, scene: &mut Scene, id: ObjectId) -> Option<bool> {
        Self::layer_object(scene, id)?;
        let locked = scene.modify(id, |o| {
            o.set_locked(!o.locked);
            o.locked
        })?;
        self.refresh_layers(scene);
        Some(locked)
    }

    /// Set opacity, clamped to `[0, 1]`. NaN is rejected.
    pub fn update_opacity(&mut self, scene: &mut Scene, id: ObjectId, opacity: f64) -> bool {
        if opacity.is_nan() || Self::layer_object(scene, id).is_none() {
            return false;
        }
        let opacity = opacity.clamp(0.0, 1.0);
        scene.modify(id, |o| o.opacity = opacity);
        self.refresh_layers(scene);
        true
    }

    /// Rename a layer. Blank names are rejected.
    pub fn rename_layer(&mut self, scene: &mut Scene, id: ObjectId, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || Self::layer_object(scene, id).is_none() {
            return false;
        }
        let name = name.to_string();
        scene.modify(id, |o| o.name = Some(name));
        self.refresh_layers(scene);
        true
    }

    /// Move the layer at display position `from` to `to` and reissue the
    /// scene's draw order in one step. Non-layer objects keep their slots.
    pub fn reorder_layers(
        &mut self,
        scene: &mut Scene,
        from: usize,
        to: usize,
    ) -> Result<(), SceneError> {
        self.refresh_layers(scene);
        let count = self.layers.len();
        if from >= count || to >= count {
            return Err(SceneError::InvalidOrder(format!(
                "layer position out of range ({from} -> {to}, {count} layers)"
            )));
        }
        if from == to {
            return Ok(());
        }

        let mut display: Vec<ObjectId> = self.layers.iter().map(|l| l.id).collect();
        let moved = display.remove(from);
        display.insert(to, moved);

        let mut back_to_front = display.into_iter().rev();
        let order: Vec<ObjectId> = scene
            .draw_order()
            .iter()
            .map(|&id| {
                if Self::layer_object(scene, id).is_some() {
                    back_to_front.next().unwrap_or(id)
                } else {
                    id
                }
            })
            .collect();

        scene.set_draw_order(order)?;
        self.refresh_layers(scene);
        Ok(())
    }

    /// Clone a layer's object with a new identity, offset and placed on top.
    pub fn duplicate_layer(&mut self, scene: &mut Scene, id: ObjectId) -> Option<ObjectId> {
        let mut copy = Self::layer_object(scene, id)?.clone();
        copy.clear_identity();
        copy.name = copy.name.map(|name| format!("{name} copy"));
        copy.translate(Vec2::new(self.duplicate_offset, self.duplicate_offset));
        let new_id = scene.add(copy);
        self.refresh_layers(scene);
        Some(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ImageData, Rgba, ShapeData, ShapeGeometry, TextData};
    use crate::thumbnail::ThumbnailError;
    use kurbo::Point;
    use std::cell::Cell;

    fn setup() -> (Scene, LayerManager) {
        let scene = Scene::with_workspace(800.0, 600.0, Rgba::white());
        let mut layers = LayerManager::new(&EditorConfig::default());
        layers.attach(&scene);
        (scene, layers)
    }

    fn text() -> SceneObject {
        SceneObject::text(Point::new(10.0, 10.0), TextData::new("Sale"))
    }

    fn image() -> SceneObject {
        SceneObject::image(
            Point::new(50.0, 50.0),
            200.0,
            100.0,
            ImageData::new("data:image/png;base64,AA==", 2, 1),
        )
    }

    fn shape() -> SceneObject {
        SceneObject::shape(Point::new(0.0, 0.0), 40.0, 40.0, ShapeData::new(ShapeGeometry::Ellipse))
    }

    #[test]
    fn test_layers_listed_topmost_first() {
        let (mut scene, mut layers) = setup();
        let t = scene.add(text());
        let i = scene.add(image());
        let s = scene.add(shape());
        assert!(layers.process_events(&mut scene));

        let ids: Vec<ObjectId> = layers.layers().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![s, i, t]);
        let kinds: Vec<ObjectKind> = layers.layers().iter().map(|l| l.kind).collect();
        assert_eq!(kinds, vec![ObjectKind::Shape, ObjectKind::Image, ObjectKind::Text]);
        assert_eq!(layers.layer(t).unwrap().z_index, 1);
    }

    #[test]
    fn test_workspace_never_a_layer() {
        let (mut scene, mut layers) = setup();
        let ws = scene.workspace_id().unwrap();
        scene.add(shape());
        layers.refresh_layers(&mut scene);
        assert!(layers.layer(ws).is_none());
        assert_eq!(layers.layers().len(), 1);
        assert!(!layers.add_layer(&mut scene, ws));
        assert!(layers.toggle_visibility(&mut scene, ws).is_none());
    }

    #[test]
    fn test_auxiliary_objects_excluded() {
        let (mut scene, mut layers) = setup();
        let mut guide = shape();
        guide.auxiliary = true;
        scene.add(guide);
        layers.refresh_layers(&mut scene);
        assert!(layers.layers().is_empty());
    }

    #[test]
    fn test_default_names_fill_gaps() {
        let (mut scene, mut layers) = setup();
        let a = scene.add(shape());
        let b = scene.add(shape());
        layers.refresh_layers(&mut scene);
        assert_eq!(layers.layer(a).unwrap().name, "Shape 1");
        assert_eq!(layers.layer(b).unwrap().name, "Shape 2");

        scene.remove(a).unwrap();
        let c = scene.add(shape());
        layers.process_events(&mut scene);
        assert_eq!(layers.layer(c).unwrap().name, "Shape 1");
        assert_eq!(layers.layer(b).unwrap().name, "Shape 2");
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let (mut scene, mut layers) = setup();
        scene.add(text());
        scene.add(image());
        layers.refresh_layers(&mut scene);
        let first = layers.layers().to_vec();
        let json = scene.to_json().unwrap();
        layers.refresh_layers(&mut scene);
        assert_eq!(layers.layers(), first.as_slice());
        assert_eq!(scene.to_json().unwrap(), json);
    }

    #[test]
    fn test_toggle_visibility_touches_one_layer() {
        let (mut scene, mut layers) = setup();
        let t = scene.add(text());
        let i = scene.add(image());
        let s = scene.add(shape());
        layers.refresh_layers(&mut scene);

        assert_eq!(layers.toggle_visibility(&mut scene, i), Some(false));
        assert!(!layers.layer(i).unwrap().visible);
        assert!(!scene.get(i).unwrap().visible);
        for other in [t, s] {
            assert!(layers.layer(other).unwrap().visible);
            assert!(scene.get(other).unwrap().visible);
        }
    }

    #[test]
    fn test_toggle_lock_disables_interaction() {
        let (mut scene, mut layers) = setup();
        let s = scene.add(shape());
        assert_eq!(layers.toggle_lock(&mut scene, s), Some(true));
        let object = scene.get(s).unwrap();
        assert!(object.locked && !object.selectable && !object.evented);
        assert!(layers.layer(s).unwrap().locked);
        assert_eq!(layers.toggle_lock(&mut scene, s), Some(false));
        assert!(scene.get(s).unwrap().selectable);
    }

    #[test]
    fn test_opacity_and_rename() {
        let (mut scene, mut layers) = setup();
        let s = scene.add(shape());
        assert!(layers.update_opacity(&mut scene, s, 1.7));
        assert_eq!(scene.get(s).unwrap().opacity, 1.0);
        assert!(!layers.update_opacity(&mut scene, s, f64::NAN));
        assert!(layers.update_opacity(&mut scene, s, 0.25));
        assert_eq!(layers.layer(s).unwrap().opacity, 0.25);

        assert!(!layers.rename_layer(&mut scene, s, "   "));
        assert!(layers.rename_layer(&mut scene, s, " Badge "));
        assert_eq!(layers.layer(s).unwrap().name, "Badge");
    }

    #[test]
    fn test_reorder_and_back_restores_order() {
        let (mut scene, mut layers) = setup();
        scene.add(text());
        scene.add(image());
        scene.add(shape());
        layers.refresh_layers(&mut scene);
        let original = scene.draw_order().to_vec();

        let before = scene.render_requests();
        layers.reorder_layers(&mut scene, 0, 2).unwrap();
        assert_eq!(scene.render_requests(), before + 1);
        assert_ne!(scene.draw_order(), original.as_slice());
        assert_eq!(scene.draw_order()[0], original[0]);

        layers.reorder_layers(&mut scene, 2, 0).unwrap();
        assert_eq!(scene.draw_order(), original.as_slice());
        assert!(layers.reorder_layers(&mut scene, 0, 9).is_err());
    }

    #[test]
    fn test_reorder_keeps_auxiliary_slot() {
        let (mut scene, mut layers) = setup();
        let a = scene.add(shape());
        let mut guide = shape();
        guide.auxiliary = true;
        let g = scene.add(guide);
        let b = scene.add(shape());
        layers.refresh_layers(&mut scene);

        layers.reorder_layers(&mut scene, 0, 1).unwrap();
        assert_eq!(&scene.draw_order()[1..], &[b, g, a]);
    }

    #[test]
    fn test_duplicate_layer() {
        let (mut scene, mut layers) = setup();
        let s = scene.add(shape());
        layers.refresh_layers(&mut scene);

        let copy = layers.duplicate_layer(&mut scene, s).unwrap();
        assert_ne!(copy, s);
        assert_eq!(layers.position(copy), Some(0));
        let original = scene.get(s).unwrap();
        let duplicate = scene.get(copy).unwrap();
        assert_eq!(duplicate.transform.left, original.transform.left + 10.0);
        assert_eq!(duplicate.transform.top, original.transform.top + 10.0);
        assert_eq!(duplicate.name.as_deref(), Some("Shape 1 copy"));
    }

    #[test]
    fn test_duplicate_group_gets_fresh_child_ids() {
        let (mut scene, mut layers) = setup();
        let a = scene.add(shape());
        let b = scene.add(text());
        let group = scene.group(&[a, b]).unwrap();
        layers.refresh_layers(&mut scene);

        let copy = layers.duplicate_layer(&mut scene, group).unwrap();
        let children = &scene.get(copy).unwrap().as_group().unwrap().children;
        assert!(children.iter().all(|c| c.id.is_some()));
        assert!(children.iter().all(|c| c.id != Some(a) && c.id != Some(b)));
    }

    struct FlakyThumbnailer {
        calls: Cell<usize>,
    }

    impl Thumbnailer for FlakyThumbnailer {
        fn scene_thumbnail(&self, _: &Scene, _: f64) -> Result<Thumbnail, ThumbnailError> {
            Err(ThumbnailError::Empty)
        }

        fn object_thumbnail(
            &self,
            object: &SceneObject,
            size: u32,
        ) -> Result<Thumbnail, ThumbnailError> {
            self.calls.set(self.calls.get() + 1);
            if object.kind() == ObjectKind::Image {
                return Err(ThumbnailError::Tainted);
            }
            Ok(Thumbnail {
                width: size,
                height: size,
                data_url: "data:image/png;base64,AA==".to_string(),
            })
        }
    }

    #[test]
    fn test_thumbnails_best_effort_and_cached() {
        let (mut scene, mut layers) = setup();
        let thumbnailer = Rc::new(FlakyThumbnailer { calls: Cell::new(0) });
        layers.set_thumbnailer(Some(thumbnailer.clone()));
        let s = scene.add(shape());
        let i = scene.add(image());
        layers.refresh_layers(&mut scene);

        assert_eq!(layers.layer(s).unwrap().thumbnail.width, 60);
        assert!(layers.layer(i).unwrap().thumbnail.is_empty());
        assert_eq!(thumbnailer.calls.get(), 2);

        layers.refresh_layers(&mut scene);
        assert_eq!(thumbnailer.calls.get(), 2);
        layers.rename_layer(&mut scene, s, "Dot");
        assert_eq!(thumbnailer.calls.get(), 2);
    }
}
