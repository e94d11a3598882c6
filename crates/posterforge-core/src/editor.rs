//! The editing session: one live scene plus the components that follow it.

use crate::config::EditorConfig;
use crate::history::History;
use crate::layers::{Layer, LayerManager};
use crate::pages::Project;
use crate::scene::{
    ImageData, ObjectData, ObjectId, Rgba, Scene, SceneError, SceneEvent, SceneObject,
    ShapeData, ShapeGeometry, TextData,
};
use crate::snap::{SnapEngine, SnapResult};
use crate::storage::{PersistRecord, PersistenceSink, Storage, StorageResult};
use crate::store::Store;
use crate::thumbnail::Thumbnailer;
use crate::viewport::Viewport;
use kurbo::{Point, Size, Vec2};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::Instant;

/// Flags shared with the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EditorStatus {
    pub processing: bool,
    pub exporting: bool,
    pub saving: bool,
}

/// Ready-to-insert payloads supplied by asset collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertRequest {
    Image { src: String, width: u32, height: u32 },
    Text { content: String, font_family: Option<String> },
    Shape(ShapeGeometry),
    /// A full scene snapshot that replaces the current page.
    Template { json: String },
    /// Apply a font to the selected text, or add a text object using it.
    Font { family: String },
}

/// What a [`EditorSession::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub committed: bool,
    pub layers_refreshed: bool,
    pub guides_changed: bool,
}

/// Fraction of the workspace a freshly inserted image may cover.
const INSERT_FIT: f64 = 0.8;
const DEFAULT_SHAPE_SIZE: f64 = 200.0;

struct DragSession {
    id: ObjectId,
    /// Object center when the drag began, in document coordinates.
    origin: Point,
    /// Pointer travel since the drag began, in screen pixels.
    travel: Vec2,
}

/// Runtime editor state for one project.
pub struct EditorSession {
    scene: Scene,
    viewport: Viewport,
    viewport_size: Size,
    history: History,
    layers: LayerManager,
    snap: SnapEngine,
    selection: Vec<ObjectId>,
    drag: Option<DragSession>,
    project: Project,
    status: Store<EditorStatus>,
    config: EditorConfig,
    persistence: Option<Rc<dyn PersistenceSink>>,
}

impl EditorSession {
    /// New session on an untitled single-page project.
    pub fn new(config: EditorConfig, width: f64, height: f64) -> Self {
        let project = Project::new("Untitled", width, height);
        let scene = Scene::with_workspace(width, height, Rgba::white());
        let mut session = Self {
            history: History::new(&config),
            layers: LayerManager::new(&config),
            snap: SnapEngine::new(&config),
            scene,
            viewport: Viewport::new(),
            viewport_size: Size::new(1280.0, 800.0),
            selection: Vec::new(),
            drag: None,
            project,
            status: Store::new(EditorStatus::default()),
            config,
            persistence: None,
        };
        session.attach_components();
        session.resync();
        session
    }

    /// Session on an existing project, showing its active page.
    pub fn open_project(config: EditorConfig, project: Project) -> Result<Self, SceneError> {
        let (width, height) = project
            .active()
            .map(|p| (p.width, p.height))
            .unwrap_or((1080.0, 1080.0));
        let mut session = Self::new(config, width, height);
        session.project = project;
        let snapshot = session.page_snapshot(session.project.active_page)?;
        session.scene.load_json(&snapshot)?;
        session.resync();
        log::info!(
            "Opened project '{}' ({} pages)",
            session.project.name,
            session.project.page_count()
        );
        Ok(session)
    }

    fn attach_components(&mut self) {
        self.history.attach(&self.scene);
        self.layers.attach(&self.scene);
        self.snap.activate(&self.scene);
    }

    /// Rebuild derived state after the whole scene was replaced.
    fn resync(&mut self) {
        self.selection.clear();
        self.drag = None;
        self.snap.end_drag();
        self.layers.refresh_layers(&mut self.scene);
        self.layers.process_events(&mut self.scene);
        self.history.reset(&self.scene);
    }

    pub fn set_persistence(&mut self, sink: Option<Rc<dyn PersistenceSink>>) {
        self.persistence = sink;
    }

    pub fn set_thumbnailer(&mut self, thumbnailer: Option<Rc<dyn Thumbnailer>>) {
        self.history.set_thumbnailer(thumbnailer.clone());
        self.layers.set_thumbnailer(thumbnailer);
        self.layers.refresh_layers(&mut self.scene);
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn viewport_size(&self) -> Size {
        self.viewport_size
    }

    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.viewport_size = Size::new(width, height);
    }

    /// Fit the view to the workspace.
    pub fn fit_to_workspace(&mut self) {
        if let Some(bounds) = self.scene.workspace_bounds() {
            self.viewport.fit_to_bounds(bounds, self.viewport_size, 50.0);
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn snap(&self) -> &SnapEngine {
        &self.snap
    }

    pub fn layers(&self) -> &[Layer] {
        self.layers.layers()
    }

    pub fn selection(&self) -> &[ObjectId] {
        &self.selection
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Shared status flags. Clones observe the same value.
    pub fn status(&self) -> Store<EditorStatus> {
        self.status.clone()
    }

    /// Pump the session: resync layers, run due history commits and refresh guides.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        self.snap.process_events();
        let layers_refreshed = self.layers.process_events(&mut self.scene);

        let committed = match self.history.poll(&self.scene, now) {
            Some(record) => {
                self.persist(record);
                true
            }
            None => false,
        };

        let guides_changed = self.snap.update_guides(
            &self.scene,
            &self.viewport,
            &self.selection,
            self.viewport_size,
            now,
        );

        TickReport {
            committed,
            layers_refreshed,
            guides_changed,
        }
    }

    /// Insert an asset. Returns the ids of the objects added or changed.
    pub fn insert(&mut self, request: InsertRequest) -> Result<Vec<ObjectId>, SceneError> {
        let center = self
            .scene
            .workspace_bounds()
            .map(|r| r.center())
            .unwrap_or(Point::ZERO);

        let ids = match request {
            InsertRequest::Image { src, width, height } => {
                let mut object = SceneObject::image(
                    Point::ZERO,
                    f64::from(width),
                    f64::from(height),
                    ImageData::new(src, width, height),
                );
                if let Some(bounds) = self.scene.workspace_bounds() {
                    let fit = (bounds.width() * INSERT_FIT / f64::from(width.max(1)))
                        .min(bounds.height() * INSERT_FIT / f64::from(height.max(1)))
                        .min(1.0);
                    object.transform.scale_x = fit;
                    object.transform.scale_y = fit;
                }
                object.set_center(center);
                vec![self.scene.add(object)]
            }
            InsertRequest::Text {
                content,
                font_family,
            } => vec![self.add_text(content, font_family, center)],
            InsertRequest::Shape(geometry) => {
                let height = match geometry {
                    ShapeGeometry::Line => 4.0,
                    _ => DEFAULT_SHAPE_SIZE,
                };
                let mut object = SceneObject::shape(
                    Point::ZERO,
                    DEFAULT_SHAPE_SIZE,
                    height,
                    ShapeData::new(geometry),
                );
                object.set_center(center);
                vec![self.scene.add(object)]
            }
            InsertRequest::Template { json } => {
                self.scene.load_json(&json)?;
                self.selection.clear();
                self.drag = None;
                self.scene.draw_order().to_vec()
            }
            InsertRequest::Font { family } => {
                let targets: Vec<ObjectId> = self
                    .selection
                    .iter()
                    .copied()
                    .filter(|&id| self.scene.get(id).is_some_and(|o| o.as_text().is_some()))
                    .collect();
                if targets.is_empty() {
                    vec![self.add_text("Your text".to_string(), Some(family), center)]
                } else {
                    for &id in &targets {
                        self.scene.modify(id, |o| {
                            if let ObjectData::Text(text) = &mut o.data {
                                text.font_family = family.clone();
                            }
                        });
                    }
                    return Ok(targets);
                }
            }
        };

        if let [id] = ids.as_slice() {
            self.select(&[*id]);
        }
        Ok(ids)
    }

    fn add_text(
        &mut self,
        content: String,
        font_family: Option<String>,
        center: Point,
    ) -> ObjectId {
        let mut text = TextData::new(content);
        if let Some(family) = font_family {
            text.font_family = family;
        }
        let mut object = SceneObject::text(Point::ZERO, text);
        object.set_center(center);
        self.scene.add(object)
    }

    /// Replace the selection. Locked, workspace and auxiliary objects are skipped.
    pub fn select(&mut self, ids: &[ObjectId]) {
        let selection: Vec<ObjectId> = ids
            .iter()
            .copied()
            .filter(|&id| {
                self.scene
                    .get(id)
                    .is_some_and(|o| o.is_layer() && o.selectable && !o.locked)
            })
            .collect();
        if selection.is_empty() {
            self.clear_selection();
            return;
        }
        self.selection = selection.clone();
        self.scene.emit(SceneEvent::SelectionChanged(selection));
    }

    pub fn clear_selection(&mut self) {
        let had_selection = !self.selection.is_empty();
        self.selection.clear();
        if had_selection {
            self.scene.emit(SceneEvent::SelectionCleared);
        }
    }

    /// Start dragging an object, selecting it if needed.
    pub fn begin_drag(&mut self, id: ObjectId) -> bool {
        if !self.selection.contains(&id) {
            self.select(&[id]);
        }
        if !self.selection.contains(&id) || !self.snap.begin_drag(&self.scene, id) {
            return false;
        }
        let Some(origin) = self.scene.get(id).map(SceneObject::center) else {
            return false;
        };
        self.drag = Some(DragSession {
            id,
            origin,
            travel: Vec2::ZERO,
        });
        true
    }

    /// Move the dragged object by a pointer delta in screen pixels.
    ///
    /// The object follows the pointer from where the drag began, then snaps.
    pub fn drag_move(&mut self, screen_delta: Vec2) -> Option<SnapResult> {
        let drag = self.drag.as_mut()?;
        drag.travel += screen_delta;
        let id = drag.id;
        let target = drag.origin + drag.travel / self.viewport.zoom;

        let current = self.scene.get(id)?.center();
        self.scene.translate(id, target - current);
        Some(self.snap.on_move(&mut self.scene, &self.viewport, id))
    }

    /// Finish the drag. Publishes the modification that history records.
    pub fn end_drag(&mut self) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        self.snap.end_drag();
        self.scene.modify(drag.id, |_| {});
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Delete the selected objects.
    pub fn remove_selected(&mut self) -> usize {
        let ids = std::mem::take(&mut self.selection);
        let removed = ids
            .into_iter()
            .filter(|&id| self.scene.remove(id).is_ok())
            .count();
        if removed > 0 {
            self.scene.emit(SceneEvent::SelectionCleared);
        }
        removed
    }

    pub fn undo(&mut self) -> bool {
        self.drag = None;
        if !self.history.undo(&mut self.scene) {
            return false;
        }
        self.after_restore();
        true
    }

    pub fn redo(&mut self) -> bool {
        self.drag = None;
        if !self.history.redo(&mut self.scene) {
            return false;
        }
        self.after_restore();
        true
    }

    fn after_restore(&mut self) {
        self.selection.retain(|&id| self.scene.contains(id));
        self.snap.end_drag();
        self.layers.process_events(&mut self.scene);
        self.layers.refresh_layers(&mut self.scene);
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn toggle_visibility(&mut self, id: ObjectId) -> Option<bool> {
        self.layers.toggle_visibility(&mut self.scene, id)
    }

    /// Toggle a layer's lock; locking also drops it from the selection.
    pub fn toggle_lock(&mut self, id: ObjectId) -> Option<bool> {
        let locked = self.layers.toggle_lock(&mut self.scene, id)?;
        if locked && self.selection.contains(&id) {
            let remaining: Vec<ObjectId> =
                self.selection.iter().copied().filter(|&s| s != id).collect();
            self.select(&remaining);
        }
        Some(locked)
    }

    pub fn update_opacity(&mut self, id: ObjectId, opacity: f64) -> bool {
        self.layers.update_opacity(&mut self.scene, id, opacity)
    }

    pub fn rename_layer(&mut self, id: ObjectId, name: &str) -> bool {
        self.layers.rename_layer(&mut self.scene, id, name)
    }

    pub fn reorder_layers(&mut self, from: usize, to: usize) -> Result<(), SceneError> {
        self.layers.reorder_layers(&mut self.scene, from, to)
    }

    pub fn duplicate_layer(&mut self, id: ObjectId) -> Option<ObjectId> {
        let copy = self.layers.duplicate_layer(&mut self.scene, id)?;
        self.select(&[copy]);
        Some(copy)
    }

    /// Group the selected objects. Needs at least two.
    pub fn group_selected(&mut self) -> Option<ObjectId> {
        if self.selection.len() < 2 {
            return None;
        }
        let ids = self.selection.clone();
        let group = self.scene.group(&ids)?;
        self.select(&[group]);
        Some(group)
    }

    /// Dissolve every selected group and select their children.
    pub fn ungroup_selected(&mut self) -> Vec<ObjectId> {
        let groups: Vec<ObjectId> = self
            .selection
            .iter()
            .copied()
            .filter(|&id| self.scene.get(id).is_some_and(|o| o.as_group().is_some()))
            .collect();

        let mut children = Vec::new();
        for group in groups {
            if let Some(ids) = self.scene.ungroup(group) {
                children.extend(ids);
            }
        }
        if !children.is_empty() {
            self.select(&children);
        }
        children
    }

    /// Scene snapshot for a page; blank pages get a workspace-only scene.
    pub fn page_snapshot(&self, index: usize) -> Result<String, SceneError> {
        let page = self
            .project
            .page(index)
            .ok_or(SceneError::PageNotFound(index))?;
        if page.is_blank() {
            return Scene::with_workspace(page.width, page.height, Rgba::white()).to_json();
        }
        Ok(page.canvas_data.clone())
    }

    /// Write the live scene back into the active page.
    pub fn save_active_page(&mut self) -> Result<(), SceneError> {
        let json = self.scene.to_json()?;
        let bounds = self.scene.workspace_bounds();
        if let Some(page) = self.project.active_mut() {
            page.canvas_data = json;
            if let Some(bounds) = bounds {
                page.width = bounds.width();
                page.height = bounds.height();
            }
        }
        Ok(())
    }

    /// Save the current page and load another. History starts over on the new page.
    pub fn switch_page(&mut self, index: usize) -> Result<(), SceneError> {
        if index == self.project.active_page {
            return Ok(());
        }
        let snapshot = self.page_snapshot(index)?;
        self.save_active_page()?;
        self.scene.load_json(&snapshot)?;
        self.project.active_page = index;
        self.resync();
        log::debug!("Switched to page {}", index + 1);
        Ok(())
    }

    /// Append a blank page the size of the active one.
    pub fn add_page(&mut self) -> usize {
        let (width, height) = self
            .project
            .active()
            .map(|p| (p.width, p.height))
            .unwrap_or((1080.0, 1080.0));
        self.project.add_page(width, height)
    }

    /// Remove a page. The last page stays. Removing the active page shows its neighbor.
    pub fn remove_page(&mut self, index: usize) -> Result<bool, SceneError> {
        let was_active = index == self.project.active_page;
        if !was_active {
            self.save_active_page()?;
        }
        if self.project.remove_page(index).is_none() {
            return Ok(false);
        }
        if was_active {
            let snapshot = self.page_snapshot(self.project.active_page)?;
            self.scene.load_json(&snapshot)?;
            self.resync();
        }
        Ok(true)
    }

    /// Project metadata and pages. The live scene is not affected.
    pub fn project_mut(&mut self) -> &mut Project {
        &mut self.project
    }

    fn persist(&self, record: PersistRecord) {
        if let Some(sink) = &self.persistence {
            self.status.update(|s| s.saving = true);
            sink.persist(record);
            self.status.update(|s| s.saving = false);
        }
    }

    /// Commit edits still waiting for idle, then stop recording.
    pub fn suspend_history(&mut self, now: Instant) {
        if let Some(record) = self.history.flush(&self.scene, now) {
            self.persist(record);
        }
        self.history.suspend();
    }

    pub fn resume_history(&mut self) {
        self.history.resume();
    }

    /// Persist the project (with the live page saved into it).
    pub async fn save_to(&mut self, storage: &dyn Storage) -> StorageResult<()> {
        self.save_active_page()
            .map_err(|e| crate::storage::StorageError::Serialization(e.to_string()))?;
        self.status.update(|s| s.saving = true);
        let result = storage.save(&self.project.id, &self.project).await;
        self.status.update(|s| s.saving = false);
        if let Err(e) = &result {
            log::warn!("Failed to save project {}: {}", self.project.id, e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ObjectKind;
    use crate::storage::{MemoryStorage, RecordLog};
    use std::time::Duration;

    fn session() -> EditorSession {
        EditorSession::new(EditorConfig::default(), 800.0, 600.0)
    }

    fn add_shape(session: &mut EditorSession) -> ObjectId {
        session
            .insert(InsertRequest::Shape(ShapeGeometry::Ellipse))
            .unwrap()[0]
    }

    #[test]
    fn test_new_session_has_workspace_and_history() {
        let session = session();
        assert!(session.scene().workspace().is_some());
        assert!(session.layers().is_empty());
        assert_eq!(session.history().len(), 1);
        assert!(!session.can_undo());
    }

    #[test]
    fn test_insert_order_drives_layer_list() {
        let mut session = session();
        session
            .insert(InsertRequest::Text {
                content: "Hello".to_string(),
                font_family: None,
            })
            .unwrap();
        session
            .insert(InsertRequest::Image {
                src: "data:image/png;base64,AA==".to_string(),
                width: 4000,
                height: 1000,
            })
            .unwrap();
        add_shape(&mut session);
        let report = session.tick(Instant::now());
        assert!(report.layers_refreshed);
        assert!(report.committed);

        let kinds: Vec<ObjectKind> = session.layers().iter().map(|l| l.kind).collect();
        assert_eq!(kinds, vec![ObjectKind::Shape, ObjectKind::Image, ObjectKind::Text]);
    }

    #[test]
    fn test_inserted_image_fits_workspace() {
        let mut session = session();
        let id = session
            .insert(InsertRequest::Image {
                src: "https://cdn.example.com/big.jpg".to_string(),
                width: 4000,
                height: 1000,
            })
            .unwrap()[0];
        let bounds = session.scene().get(id).unwrap().bounds();
        assert!((bounds.width() - 640.0).abs() < 1e-9);
        assert!((bounds.center().x - 400.0).abs() < 1e-9);
        assert_eq!(session.selection(), &[id]);
    }

    #[test]
    fn test_commits_are_persisted() {
        let mut session = session();
        let log = RecordLog::new();
        session.set_persistence(Some(Rc::new(log.clone())));
        add_shape(&mut session);
        session.tick(Instant::now());
        assert_eq!(log.len(), 1);
        let record = log.last().unwrap();
        assert_eq!((record.width, record.height), (800.0, 600.0));
        assert!(record.thumbnail.is_none());
    }

    #[test]
    fn test_undo_redo_roundtrip() {
        let mut session = session();
        let now = Instant::now();
        let empty = session.scene().to_json().unwrap();
        add_shape(&mut session);
        session.tick(now);
        let one = session.scene().to_json().unwrap();

        assert!(session.undo());
        assert_eq!(session.scene().to_json().unwrap(), empty);
        assert!(session.layers().is_empty());
        assert!(session.selection().is_empty());

        assert!(session.redo());
        assert_eq!(session.scene().to_json().unwrap(), one);
        assert_eq!(session.layers().len(), 1);
        assert!(!session.tick(now).committed);
    }

    #[test]
    fn test_drag_snaps_and_commits_on_end() {
        let mut session = session();
        let t0 = Instant::now();
        let id = add_shape(&mut session);
        session.tick(t0);
        let history_before = session.history().len();

        assert!(session.begin_drag(id));
        // Shape starts centered; 7px away stays snapped on x, 40px on y escapes.
        let result = session.drag_move(Vec2::new(7.0, 40.0)).unwrap();
        assert!(result.snapped_x && !result.snapped_y);
        assert_eq!(session.scene().get(id).unwrap().center(), Point::new(400.0, 340.0));

        // Travel accumulates from the drag origin, not the snapped position.
        let result = session.drag_move(Vec2::new(10.0, 0.0)).unwrap();
        assert!(!result.snapped_x);
        assert_eq!(session.scene().get(id).unwrap().center().x, 417.0);

        session.end_drag();
        let report = session.tick(t0 + Duration::from_secs(1));
        assert!(report.committed);
        assert_eq!(session.history().len(), history_before + 1);
        assert!(!session.is_dragging());
    }

    #[test]
    fn test_lock_deselects() {
        let mut session = session();
        let id = add_shape(&mut session);
        assert_eq!(session.selection(), &[id]);
        assert_eq!(session.toggle_lock(id), Some(true));
        assert!(session.selection().is_empty());
        session.select(&[id]);
        assert!(session.selection().is_empty());
        assert!(!session.begin_drag(id));
    }

    #[test]
    fn test_group_and_ungroup_selected() {
        let mut session = session();
        let a = add_shape(&mut session);
        let b = add_shape(&mut session);
        session.select(&[a, b]);
        let group = session.group_selected().unwrap();
        assert_eq!(session.selection(), &[group]);

        let children = session.ungroup_selected();
        assert_eq!(children, vec![a, b]);
        assert_eq!(session.selection(), &[a, b]);
    }

    #[test]
    fn test_font_applies_to_selected_text() {
        let mut session = session();
        let text = session
            .insert(InsertRequest::Text {
                content: "Title".to_string(),
                font_family: None,
            })
            .unwrap()[0];
        let changed = session
            .insert(InsertRequest::Font {
                family: "Lobster".to_string(),
            })
            .unwrap();
        assert_eq!(changed, vec![text]);
        assert_eq!(session.scene().get(text).unwrap().as_text().unwrap().font_family, "Lobster");

        session.clear_selection();
        let added = session
            .insert(InsertRequest::Font {
                family: "Roboto".to_string(),
            })
            .unwrap();
        assert_ne!(added, vec![text]);
    }

    #[test]
    fn test_template_replaces_scene() {
        let mut source = session();
        add_shape(&mut source);
        add_shape(&mut source);
        let template = source.scene().to_json().unwrap();

        let mut session = session();
        let ids = session
            .insert(InsertRequest::Template { json: template })
            .unwrap();
        assert_eq!(ids.len(), 3);
        session.tick(Instant::now());
        assert_eq!(session.layers().len(), 2);
        assert!(session.can_undo());
        assert!(session.insert(InsertRequest::Template { json: "nope".into() }).is_err());
        assert_eq!(session.scene().len(), 3);
    }

    #[test]
    fn test_switch_pages_keeps_each_page() {
        let mut session = session();
        add_shape(&mut session);
        session.tick(Instant::now());
        let first = session.scene().to_json().unwrap();

        let second = session.add_page();
        session.switch_page(second).unwrap();
        assert_eq!(session.scene().len(), 1);
        assert_eq!(session.history().len(), 1);

        session.switch_page(0).unwrap();
        assert_eq!(session.scene().to_json().unwrap(), first);
        assert_eq!(session.layers().len(), 1);
        assert!(session.switch_page(9).is_err());
    }

    #[test]
    fn test_remove_active_page_shows_neighbor() {
        let mut session = session();
        let second = session.add_page();
        session.switch_page(second).unwrap();
        add_shape(&mut session);
        session.save_active_page().unwrap();

        assert!(session.remove_page(1).unwrap());
        assert_eq!(session.project().page_count(), 1);
        assert_eq!(session.scene().len(), 1);
        assert!(!session.remove_page(0).unwrap());
    }

    #[test]
    fn test_open_project_and_save() {
        let mut session = session();
        add_shape(&mut session);
        session.tick(Instant::now());
        let storage = MemoryStorage::new();
        crate::storage::block_on(session.save_to(&storage)).unwrap();

        let project = crate::storage::block_on(storage.load(&session.project().id)).unwrap();
        let reopened = EditorSession::open_project(EditorConfig::default(), project).unwrap();
        assert_eq!(reopened.scene().to_json().unwrap(), session.scene().to_json().unwrap());
        assert_eq!(reopened.layers().len(), 1);
        assert!(!reopened.status().get().saving);
    }
}
