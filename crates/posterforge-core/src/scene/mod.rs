//! Scene graph arena: objects keyed by stable id plus the canonical draw order.

mod color;
mod object;

pub use color::Rgba;
pub use object::{
    BackgroundData, GroupData, ImageData, ObjectData, ObjectId, ObjectKind, SceneObject,
    ShapeData, ShapeGeometry, TextAlign, TextData, Transform,
};

use crate::events::{EventBus, Subscription};
use kurbo::{Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Snapshot format version.
const SCENE_FORMAT_VERSION: u32 = 1;

/// Scene errors.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Object not found: {0}")]
    NotFound(ObjectId),
    #[error("Invalid draw order: {0}")]
    InvalidOrder(String),
    #[error("The workspace cannot be removed")]
    Workspace,
    #[error("Page not found: {0}")]
    PageNotFound(usize),
}

/// Mutation and selection notifications published by the scene.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    ObjectAdded(ObjectId),
    ObjectRemoved(ObjectId),
    /// Continuous movement during a drag.
    ObjectMoving(ObjectId),
    /// End of a modification (drag end, property edit).
    ObjectModified(ObjectId),
    Reordered,
    Cleared,
    Loaded,
    SelectionChanged(Vec<ObjectId>),
    SelectionCleared,
}

impl SceneEvent {
    /// Events that change which objects exist or their order.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SceneEvent::ObjectAdded(_)
                | SceneEvent::ObjectRemoved(_)
                | SceneEvent::Reordered
                | SceneEvent::Cleared
                | SceneEvent::Loaded
        )
    }
}

/// Serialized form of a scene: every object in draw order.
#[derive(Debug, Serialize, Deserialize)]
struct SceneDocument {
    #[serde(default = "default_version")]
    version: u32,
    objects: Vec<SceneObject>,
}

fn default_version() -> u32 {
    SCENE_FORMAT_VERSION
}

/// The live scene graph.
///
/// Index in [`Scene::draw_order`] is the object's z-index. The workspace, when
/// present, is always at index 0.
#[derive(Debug)]
pub struct Scene {
    objects: HashMap<ObjectId, SceneObject>,
    draw_order: Vec<ObjectId>,
    workspace: Option<ObjectId>,
    events: EventBus<SceneEvent>,
    render_requests: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Create an empty scene with no workspace.
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            draw_order: Vec::new(),
            workspace: None,
            events: EventBus::new(),
            render_requests: 0,
        }
    }

    /// Create a scene holding only a workspace of the given size.
    pub fn with_workspace(width: f64, height: f64, fill: Rgba) -> Self {
        let mut scene = Self::new();
        scene.add(SceneObject::workspace(width, height, fill));
        scene
    }

    /// Copy of the objects and order with its own, empty event bus.
    pub fn detached(&self) -> Self {
        Self {
            objects: self.objects.clone(),
            draw_order: self.draw_order.clone(),
            workspace: self.workspace,
            events: EventBus::new(),
            render_requests: 0,
        }
    }

    pub fn events(&self) -> &EventBus<SceneEvent> {
        &self.events
    }

    pub fn subscribe(&self, listener: impl FnMut(&SceneEvent) + 'static) -> Subscription {
        self.events.subscribe(listener)
    }

    pub fn emit(&self, event: SceneEvent) {
        self.events.emit(&event);
    }

    /// Number of times the view has been invalidated.
    pub fn render_requests(&self) -> u64 {
        self.render_requests
    }

    pub fn request_render(&mut self) {
        self.render_requests += 1;
    }

    pub fn len(&self) -> usize {
        self.draw_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draw_order.is_empty()
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Object ids, back to front.
    pub fn draw_order(&self) -> &[ObjectId] {
        &self.draw_order
    }

    /// Objects, back to front.
    pub fn objects_ordered(&self) -> impl Iterator<Item = &SceneObject> {
        self.draw_order.iter().filter_map(|id| self.objects.get(id))
    }

    pub fn z_index(&self, id: ObjectId) -> Option<usize> {
        self.draw_order.iter().position(|&oid| oid == id)
    }

    pub fn workspace(&self) -> Option<&SceneObject> {
        self.workspace.and_then(|id| self.objects.get(&id))
    }

    pub fn workspace_id(&self) -> Option<ObjectId> {
        self.workspace
    }

    /// Export region: the workspace bounds, or the union of all objects without one.
    pub fn workspace_bounds(&self) -> Option<Rect> {
        if let Some(workspace) = self.workspace() {
            return Some(workspace.bounds());
        }
        self.objects_ordered()
            .filter(|o| !o.auxiliary)
            .map(SceneObject::bounds)
            .reduce(|a, b| a.union(b))
    }

    /// Lowest index a non-workspace object may occupy.
    fn first_free_index(&self) -> usize {
        usize::from(self.workspace.is_some())
    }

    /// Add an object on top of the stack and return its id.
    ///
    /// A background object becomes the workspace if the scene has none and is
    /// placed at the bottom.
    pub fn add(&mut self, object: SceneObject) -> ObjectId {
        let index = self.draw_order.len();
        self.insert_at(index, object)
    }

    /// Insert an object at `index` in draw order, clamped above the workspace.
    pub fn insert_at(&mut self, index: usize, mut object: SceneObject) -> ObjectId {
        let mut id = object.ensure_ids_recursive();
        if self.objects.contains_key(&id) {
            log::debug!("Object {id} already in scene, assigning new identity");
            object.clear_identity();
            id = object.ensure_ids_recursive();
        }

        if object.is_workspace() && self.workspace.is_none() {
            self.workspace = Some(id);
            self.draw_order.insert(0, id);
        } else {
            let index = index.clamp(self.first_free_index(), self.draw_order.len());
            self.draw_order.insert(index, id);
        }
        self.objects.insert(id, object);
        self.render_requests += 1;
        self.emit(SceneEvent::ObjectAdded(id));
        id
    }

    /// Remove an object. The workspace cannot be removed.
    pub fn remove(&mut self, id: ObjectId) -> Result<SceneObject, SceneError> {
        if self.workspace == Some(id) {
            return Err(SceneError::Workspace);
        }
        let object = self.objects.remove(&id).ok_or(SceneError::NotFound(id))?;
        self.draw_order.retain(|&oid| oid != id);
        self.render_requests += 1;
        self.emit(SceneEvent::ObjectRemoved(id));
        Ok(object)
    }

    /// Mutate an object and publish `ObjectModified`. The id cannot change.
    pub fn modify<R>(&mut self, id: ObjectId, f: impl FnOnce(&mut SceneObject) -> R) -> Option<R> {
        let result = self.modify_silent(id, f)?;
        self.emit(SceneEvent::ObjectModified(id));
        Some(result)
    }

    /// Mutate an object without publishing an event.
    pub fn modify_silent<R>(
        &mut self,
        id: ObjectId,
        f: impl FnOnce(&mut SceneObject) -> R,
    ) -> Option<R> {
        let object = self.objects.get_mut(&id)?;
        let result = f(object);
        object.id = Some(id);
        object.refresh_group_bounds();
        self.render_requests += 1;
        Some(result)
    }

    /// Move an object during a drag, publishing `ObjectMoving`.
    pub fn translate(&mut self, id: ObjectId, delta: Vec2) -> bool {
        if self.modify_silent(id, |o| o.translate(delta)).is_none() {
            return false;
        }
        self.emit(SceneEvent::ObjectMoving(id));
        true
    }

    /// Replace the draw order in one step.
    ///
    /// `order` must be a permutation of the current order with the workspace
    /// (if any) first. Issues a single render request.
    pub fn set_draw_order(&mut self, order: Vec<ObjectId>) -> Result<(), SceneError> {
        if order.len() != self.draw_order.len() {
            return Err(SceneError::InvalidOrder(format!(
                "expected {} ids, got {}",
                self.draw_order.len(),
                order.len()
            )));
        }
        let mut seen = HashSet::with_capacity(order.len());
        for id in &order {
            if !self.objects.contains_key(id) {
                return Err(SceneError::NotFound(*id));
            }
            if !seen.insert(*id) {
                return Err(SceneError::InvalidOrder(format!("duplicate id {id}")));
            }
        }
        if let Some(workspace) = self.workspace {
            if order.first() != Some(&workspace) {
                return Err(SceneError::InvalidOrder(
                    "workspace must stay at the bottom".to_string(),
                ));
            }
        }
        if order == self.draw_order {
            return Ok(());
        }

        self.draw_order = order;
        self.render_requests += 1;
        self.emit(SceneEvent::Reordered);
        Ok(())
    }

    fn reorder_with(
        &mut self,
        id: ObjectId,
        f: impl FnOnce(&mut Vec<ObjectId>, usize, usize),
    ) -> bool {
        if self.workspace == Some(id) {
            return false;
        }
        let Some(pos) = self.z_index(id) else {
            return false;
        };
        let floor = self.first_free_index();
        let mut order = self.draw_order.clone();
        f(&mut order, pos, floor);
        if order == self.draw_order {
            return false;
        }
        self.set_draw_order(order).is_ok()
    }

    /// Bring an object to the front (topmost).
    pub fn bring_to_front(&mut self, id: ObjectId) -> bool {
        self.reorder_with(id, |order, pos, _| {
            let id = order.remove(pos);
            order.push(id);
        })
    }

    /// Send an object to the back, just above the workspace.
    pub fn send_to_back(&mut self, id: ObjectId) -> bool {
        self.reorder_with(id, |order, pos, floor| {
            let id = order.remove(pos);
            order.insert(floor, id);
        })
    }

    /// Move an object one step towards the front.
    pub fn bring_forward(&mut self, id: ObjectId) -> bool {
        self.reorder_with(id, |order, pos, _| {
            if pos + 1 < order.len() {
                order.swap(pos, pos + 1);
            }
        })
    }

    /// Move an object one step towards the back.
    pub fn send_backward(&mut self, id: ObjectId) -> bool {
        self.reorder_with(id, |order, pos, floor| {
            if pos > floor {
                order.swap(pos, pos - 1);
            }
        })
    }

    /// Group objects into a single group placed where the frontmost member was.
    ///
    /// Returns the group id, or `None` if fewer than two groupable objects were given.
    pub fn group(&mut self, ids: &[ObjectId]) -> Option<ObjectId> {
        let members: Vec<(usize, ObjectId)> = self
            .draw_order
            .iter()
            .enumerate()
            .filter(|(_, id)| ids.contains(id) && Some(**id) != self.workspace)
            .map(|(idx, id)| (idx, *id))
            .collect();
        if members.len() < 2 {
            return None;
        }

        let top_index = members.last().map(|(idx, _)| *idx)?;
        let mut children = Vec::with_capacity(members.len());
        for (_, id) in &members {
            if let Ok(child) = self.remove(*id) {
                children.push(child);
            }
        }

        let insert_pos = top_index + 1 - members.len();
        let group = SceneObject::group(children);
        Some(self.insert_at(insert_pos, group))
    }

    /// Dissolve a group, putting its children back at the group's position.
    pub fn ungroup(&mut self, id: ObjectId) -> Option<Vec<ObjectId>> {
        self.get(id)?.as_group()?;
        let pos = self.z_index(id)?;
        let group = self.remove(id).ok()?;
        let ObjectData::Group(data) = group.data else {
            return None;
        };

        let mut child_ids = Vec::with_capacity(data.children.len());
        for (i, child) in data.children.into_iter().enumerate() {
            child_ids.push(self.insert_at(pos + i, child));
        }
        Some(child_ids)
    }

    /// Remove everything, workspace included.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.draw_order.clear();
        self.workspace = None;
        self.render_requests += 1;
        self.emit(SceneEvent::Cleared);
    }

    /// Serialize every object in draw order.
    pub fn to_json(&self) -> Result<String, SceneError> {
        let document = SceneDocument {
            version: SCENE_FORMAT_VERSION,
            objects: self.objects_ordered().cloned().collect(),
        };
        Ok(serde_json::to_string(&document)?)
    }

    /// Replace the scene with a snapshot produced by [`Scene::to_json`].
    ///
    /// The snapshot is parsed before anything is touched, so a malformed one
    /// leaves the scene as it was. Objects without an id get one.
    pub fn load_json(&mut self, json: &str) -> Result<(), SceneError> {
        let document: SceneDocument = serde_json::from_str(json)?;
        if document.version > SCENE_FORMAT_VERSION {
            log::warn!(
                "Loading scene format v{} with v{} reader",
                document.version,
                SCENE_FORMAT_VERSION
            );
        }

        self.clear();
        for mut object in document.objects {
            let mut id = object.ensure_ids_recursive();
            if self.objects.contains_key(&id) {
                object.clear_identity();
                id = object.ensure_ids_recursive();
            }
            if object.is_workspace() && self.workspace.is_none() {
                self.workspace = Some(id);
                self.draw_order.insert(0, id);
            } else {
                self.draw_order.push(id);
            }
            self.objects.insert(id, object);
        }
        self.render_requests += 1;
        self.emit(SceneEvent::Loaded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn rect_at(x: f64, y: f64) -> SceneObject {
        SceneObject::shape(
            Point::new(x, y),
            100.0,
            50.0,
            ShapeData::new(ShapeGeometry::Rect { corner_radius: 0.0 }),
        )
    }

    fn scene() -> Scene {
        Scene::with_workspace(800.0, 600.0, Rgba::white())
    }

    #[test]
    fn test_add_assigns_identity_and_order() {
        let mut scene = scene();
        let a = scene.add(rect_at(0.0, 0.0));
        let b = scene.add(rect_at(10.0, 10.0));
        assert_eq!(scene.len(), 3);
        assert_eq!(scene.z_index(a), Some(1));
        assert_eq!(scene.z_index(b), Some(2));
        assert_eq!(scene.get(a).and_then(|o| o.id), Some(a));
    }

    #[test]
    fn test_workspace_stays_at_bottom() {
        let mut scene = Scene::new();
        let a = scene.add(rect_at(0.0, 0.0));
        let ws = scene.add(SceneObject::workspace(100.0, 100.0, Rgba::white()));
        assert_eq!(scene.draw_order(), &[ws, a]);

        let b = scene.insert_at(0, rect_at(0.0, 0.0));
        assert_eq!(scene.z_index(b), Some(1));
        assert!(!scene.send_to_back(ws));
        assert!(scene.send_to_back(a));
        assert_eq!(scene.draw_order(), &[ws, a, b]);
    }

    #[test]
    fn test_remove_workspace_refused() {
        let mut scene = scene();
        let ws = scene.workspace_id().unwrap();
        assert!(matches!(scene.remove(ws), Err(SceneError::Workspace)));
        assert!(scene.workspace().is_some());
    }

    #[test]
    fn test_events_published() {
        let mut scene = scene();
        let log: Rc<RefCell<Vec<SceneEvent>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let _sub = scene.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        let id = scene.add(rect_at(0.0, 0.0));
        scene.translate(id, Vec2::new(1.0, 0.0));
        scene.modify(id, |o| o.opacity = 0.5);
        scene.remove(id).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                SceneEvent::ObjectAdded(id),
                SceneEvent::ObjectMoving(id),
                SceneEvent::ObjectModified(id),
                SceneEvent::ObjectRemoved(id),
            ]
        );
    }

    #[test]
    fn test_modify_preserves_id() {
        let mut scene = scene();
        let id = scene.add(rect_at(0.0, 0.0));
        scene.modify(id, |o| o.id = None);
        assert_eq!(scene.get(id).unwrap().id, Some(id));
    }

    #[test]
    fn test_set_draw_order_validates() {
        let mut scene = scene();
        let ws = scene.workspace_id().unwrap();
        let a = scene.add(rect_at(0.0, 0.0));
        let b = scene.add(rect_at(0.0, 0.0));

        assert!(scene.set_draw_order(vec![ws, a]).is_err());
        assert!(scene.set_draw_order(vec![ws, a, a]).is_err());
        assert!(scene.set_draw_order(vec![a, ws, b]).is_err());

        let before = scene.render_requests();
        scene.set_draw_order(vec![ws, b, a]).unwrap();
        assert_eq!(scene.render_requests(), before + 1);
        assert_eq!(scene.draw_order(), &[ws, b, a]);
    }

    #[test]
    fn test_forward_backward() {
        let mut scene = scene();
        let a = scene.add(rect_at(0.0, 0.0));
        let b = scene.add(rect_at(0.0, 0.0));
        assert!(!scene.bring_forward(b));
        assert!(scene.bring_forward(a));
        assert_eq!(scene.z_index(a), Some(2));
        assert!(scene.send_backward(a));
        assert!(!scene.send_backward(a));
        assert!(scene.bring_to_front(a));
        assert_eq!(scene.z_index(a), Some(2));
    }

    #[test]
    fn test_group_and_ungroup() {
        let mut scene = scene();
        let a = scene.add(rect_at(0.0, 0.0));
        let b = scene.add(rect_at(200.0, 200.0));
        let c = scene.add(rect_at(50.0, 50.0));

        let group = scene.group(&[a, b]).unwrap();
        assert_eq!(scene.len(), 3);
        assert_eq!(scene.z_index(group), Some(1));
        assert_eq!(scene.z_index(c), Some(2));
        let bounds = scene.get(group).unwrap().bounds();
        assert!((bounds.width() - 300.0).abs() < 1e-9);

        let children = scene.ungroup(group).unwrap();
        assert_eq!(children, vec![a, b]);
        assert_eq!(scene.z_index(a), Some(1));
        assert_eq!(scene.z_index(b), Some(2));
        assert_eq!(scene.z_index(c), Some(3));
    }

    #[test]
    fn test_group_needs_two() {
        let mut scene = scene();
        let ws = scene.workspace_id().unwrap();
        let a = scene.add(rect_at(0.0, 0.0));
        assert!(scene.group(&[a]).is_none());
        assert!(scene.group(&[a, ws]).is_none());
    }

    #[test]
    fn test_json_roundtrip_preserves_order_and_ids() {
        let mut scene = scene();
        let a = scene.add(rect_at(0.0, 0.0));
        let b = scene.add(SceneObject::text(Point::new(5.0, 5.0), TextData::new("hello")));
        let json = scene.to_json().unwrap();

        let mut other = Scene::new();
        other.load_json(&json).unwrap();
        assert_eq!(other.draw_order(), scene.draw_order());
        assert_eq!(other.get(b), scene.get(b));
        assert_eq!(other.to_json().unwrap(), json);
        assert!(other.get(a).is_some());
    }

    #[test]
    fn test_load_emits_cleared_then_loaded() {
        let mut scene = scene();
        let json = scene.to_json().unwrap();
        let (_sub, mailbox) = scene.events().mailbox();
        scene.load_json(&json).unwrap();
        assert_eq!(mailbox.drain(), vec![SceneEvent::Cleared, SceneEvent::Loaded]);
    }

    #[test]
    fn test_load_assigns_missing_ids() {
        let json = r##"{"objects":[
            {"transform":{"left":0,"top":0,"width":10,"height":10},
             "data":{"type":"background","fill":{"r":255,"g":255,"b":255,"a":255}}},
            {"transform":{"left":1,"top":1,"width":5,"height":5},
             "data":{"type":"shape","geometry":{"kind":"ellipse"}}}
        ]}"##;
        let mut scene = Scene::new();
        scene.load_json(json).unwrap();
        assert_eq!(scene.len(), 2);
        assert!(scene.workspace().is_some());
        assert!(scene.objects_ordered().all(|o| o.id.is_some()));
    }

    #[test]
    fn test_bad_json_leaves_scene_intact() {
        let mut scene = scene();
        scene.add(rect_at(0.0, 0.0));
        assert!(scene.load_json("{not json").is_err());
        assert_eq!(scene.len(), 2);
    }
}
