//! Magnetic center alignment against the workspace while dragging.

use crate::config::EditorConfig;
use crate::events::{Mailbox, Subscription};
use crate::scene::{ObjectId, Scene, SceneEvent};
use crate::scheduler::Throttle;
use crate::viewport::Viewport;
use kurbo::{Line, Point, Size};
use std::time::Instant;

/// Default snap distance in screen pixels.
pub const DEFAULT_SNAP_THRESHOLD: f64 = 10.0;

/// Result of a snap operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult {
    /// Object center after snapping, in document coordinates.
    pub point: Point,
    /// Whether the X coordinate was snapped.
    pub snapped_x: bool,
    /// Whether the Y coordinate was snapped.
    pub snapped_y: bool,
}

impl SnapResult {
    /// Create a result with no snapping.
    pub fn none(point: Point) -> Self {
        Self {
            point,
            snapped_x: false,
            snapped_y: false,
        }
    }

    /// Check if any snapping occurred.
    pub fn is_snapped(&self) -> bool {
        self.snapped_x || self.snapped_y
    }
}

/// Which axes of `center` lie within `threshold` of `target`.
///
/// Both points must be in the same space; the engine passes screen points.
pub fn snap_axes(center: Point, target: Point, threshold: f64) -> (bool, bool) {
    (
        (center.x - target.x).abs() <= threshold,
        (center.y - target.y).abs() <= threshold,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(ObjectId),
}

/// Centerlines through the workspace center, in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideLines {
    pub vertical: Line,
    pub horizontal: Line,
    pub center: Point,
}

impl GuideLines {
    /// Lines through `center` spanning the whole viewport.
    pub fn through(center: Point, viewport: Size) -> Self {
        let reach_x = viewport.width.max(center.x.abs()) * 2.0;
        let reach_y = viewport.height.max(center.y.abs()) * 2.0;
        Self {
            vertical: Line::new((center.x, -reach_y), (center.x, reach_y)),
            horizontal: Line::new((-reach_x, center.y), (reach_x, center.y)),
            center,
        }
    }
}

/// Drag-time alignment of a single object to the workspace center.
pub struct SnapEngine {
    threshold: f64,
    state: DragState,
    subscription: Option<Subscription>,
    mailbox: Option<Mailbox<SceneEvent>>,
    guides: Option<GuideLines>,
    guide_throttle: Throttle,
}

impl SnapEngine {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            threshold: config.snap_threshold,
            state: DragState::Idle,
            subscription: None,
            mailbox: None,
            guides: None,
            guide_throttle: Throttle::new(config.guide_interval()),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        if threshold.is_finite() && threshold >= 0.0 {
            self.threshold = threshold;
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Start listening to `scene`. Repeated calls keep a single listener.
    pub fn activate(&mut self, scene: &Scene) {
        if self.is_active() {
            return;
        }
        let (subscription, mailbox) = scene.events().mailbox();
        self.subscription = Some(subscription);
        self.mailbox = Some(mailbox);
        log::debug!("Snap engine activated");
    }

    /// Stop listening and drop any drag and guides. Safe to call repeatedly.
    pub fn deactivate(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.dispose();
            log::debug!("Snap engine deactivated");
        }
        self.mailbox = None;
        self.state = DragState::Idle;
        self.guides = None;
    }

    /// Enter the dragging state for a selectable, non-workspace, non-auxiliary object.
    pub fn begin_drag(&mut self, scene: &Scene, id: ObjectId) -> bool {
        if !self.is_active() {
            return false;
        }
        let draggable = scene
            .get(id)
            .is_some_and(|o| o.is_layer() && o.selectable);
        if !draggable {
            return false;
        }
        // Events from before the drag must not end it.
        if let Some(mailbox) = &self.mailbox {
            mailbox.clear();
        }
        self.state = DragState::Dragging(id);
        true
    }

    pub fn end_drag(&mut self) {
        self.state = DragState::Idle;
    }

    /// Apply queued scene events to the drag state.
    pub fn process_events(&mut self) {
        let Some(mailbox) = &self.mailbox else {
            return;
        };
        for event in mailbox.drain() {
            match event {
                SceneEvent::ObjectModified(_) | SceneEvent::SelectionCleared => {
                    self.state = DragState::Idle;
                }
                SceneEvent::ObjectRemoved(id) if self.state == DragState::Dragging(id) => {
                    self.state = DragState::Idle;
                }
                SceneEvent::Cleared | SceneEvent::Loaded => {
                    self.state = DragState::Idle;
                    self.guides = None;
                }
                _ => {}
            }
        }
    }

    /// Snap the dragged object after a move.
    ///
    /// Distances are measured in screen space so the pull feels the same at any
    /// zoom. Each axis snaps independently. The correction is applied to the
    /// scene without publishing an event.
    pub fn on_move(&mut self, scene: &mut Scene, viewport: &Viewport, id: ObjectId) -> SnapResult {
        let Some(center) = scene.get(id).map(|o| o.center()) else {
            return SnapResult::none(Point::ZERO);
        };
        if self.state != DragState::Dragging(id) {
            return SnapResult::none(center);
        }
        let Some(target) = scene.workspace().map(|w| w.center()) else {
            return SnapResult::none(center);
        };

        let (snap_x, snap_y) = snap_axes(
            viewport.world_to_screen(center),
            viewport.world_to_screen(target),
            self.threshold,
        );
        if !snap_x && !snap_y {
            return SnapResult::none(center);
        }

        let snapped = Point::new(
            if snap_x { target.x } else { center.x },
            if snap_y { target.y } else { center.y },
        );
        scene.modify_silent(id, |o| o.set_center(snapped));
        log::trace!("Snapped {} (x: {}, y: {})", id, snap_x, snap_y);
        SnapResult {
            point: snapped,
            snapped_x: snap_x,
            snapped_y: snap_y,
        }
    }

    /// Recompute guides for the current selection, at most once per frame interval.
    ///
    /// Guides show while any non-workspace, non-auxiliary object is selected.
    /// Returns whether the guides changed.
    pub fn update_guides(
        &mut self,
        scene: &Scene,
        viewport: &Viewport,
        selection: &[ObjectId],
        viewport_size: Size,
        now: Instant,
    ) -> bool {
        let wants_guides = selection
            .iter()
            .any(|&id| scene.get(id).is_some_and(|o| o.is_layer()));
        let target = scene.workspace().map(|w| w.center());

        let next = match (wants_guides, target) {
            (true, Some(center)) => {
                if !self.guide_throttle.try_fire(now) {
                    return false;
                }
                Some(GuideLines::through(viewport.world_to_screen(center), viewport_size))
            }
            _ => None,
        };
        if next == self.guides {
            return false;
        }
        self.guides = next;
        true
    }

    pub fn guides(&self) -> Option<&GuideLines> {
        self.guides.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Rgba, SceneObject, ShapeData, ShapeGeometry};
    use kurbo::Vec2;
    use std::time::Duration;

    // Workspace 0..800 x 0..600, center (400, 300).
    fn setup() -> (Scene, SnapEngine, ObjectId) {
        let mut scene = Scene::with_workspace(800.0, 600.0, Rgba::white());
        let id = scene.add(SceneObject::shape(
            Point::new(0.0, 0.0),
            100.0,
            100.0,
            ShapeData::new(ShapeGeometry::Rect { corner_radius: 4.0 }),
        ));
        let mut snap = SnapEngine::new(&EditorConfig::default());
        snap.activate(&scene);
        (scene, snap, id)
    }

    fn place(scene: &mut Scene, id: ObjectId, center: Point) {
        scene.modify_silent(id, |o| o.set_center(center));
    }

    #[test]
    fn test_snap_axes_independent() {
        let target = Point::new(100.0, 100.0);
        assert_eq!(snap_axes(Point::new(105.0, 200.0), target, 10.0), (true, false));
        assert_eq!(snap_axes(Point::new(200.0, 91.0), target, 10.0), (false, true));
        assert_eq!(snap_axes(Point::new(110.0, 90.0), target, 10.0), (true, true));
        assert_eq!(snap_axes(Point::new(111.0, 89.0), target, 10.0), (false, false));
    }

    #[test]
    fn test_snaps_one_axis_only() {
        let (mut scene, mut snap, id) = setup();
        assert!(snap.begin_drag(&scene, id));
        place(&mut scene, id, Point::new(406.0, 150.0));

        let result = snap.on_move(&mut scene, &Viewport::new(), id);
        assert!(result.snapped_x && !result.snapped_y);
        assert_eq!(scene.get(id).unwrap().center(), Point::new(400.0, 150.0));
    }

    #[test]
    fn test_reentering_threshold_snaps_again() {
        let (mut scene, mut snap, id) = setup();
        let viewport = Viewport::new();
        snap.begin_drag(&scene, id);

        place(&mut scene, id, Point::new(395.0, 305.0));
        assert!(snap.on_move(&mut scene, &viewport, id).snapped_y);

        scene.translate(id, Vec2::new(0.0, 50.0));
        let away = snap.on_move(&mut scene, &viewport, id);
        assert!(away.snapped_x && !away.snapped_y);

        scene.translate(id, Vec2::new(0.0, -45.0));
        let back = snap.on_move(&mut scene, &viewport, id);
        assert!(back.snapped_x && back.snapped_y);
        assert_eq!(back.point, Point::new(400.0, 300.0));
    }

    #[test]
    fn test_threshold_is_screen_space() {
        let (mut scene, mut snap, id) = setup();
        snap.begin_drag(&scene, id);
        let mut viewport = Viewport::new();
        viewport.zoom = 4.0;

        // 6 document units at 4x zoom is 24px on screen.
        place(&mut scene, id, Point::new(406.0, 100.0));
        assert!(!snap.on_move(&mut scene, &viewport, id).is_snapped());

        viewport.zoom = 0.5;
        let result = snap.on_move(&mut scene, &viewport, id);
        assert!(result.snapped_x);
    }

    #[test]
    fn test_no_snap_when_idle_or_workspace() {
        let (mut scene, mut snap, id) = setup();
        place(&mut scene, id, Point::new(401.0, 301.0));
        assert!(!snap.on_move(&mut scene, &Viewport::new(), id).is_snapped());

        let ws = scene.workspace_id().unwrap();
        assert!(!snap.begin_drag(&scene, ws));

        let mut helper = SceneObject::shape(
            Point::ZERO,
            1.0,
            1.0,
            ShapeData::new(ShapeGeometry::Line),
        );
        helper.auxiliary = true;
        let helper = scene.add(helper);
        assert!(!snap.begin_drag(&scene, helper));
    }

    #[test]
    fn test_modify_end_returns_to_idle() {
        let (mut scene, mut snap, id) = setup();
        snap.begin_drag(&scene, id);
        scene.translate(id, Vec2::new(3.0, 0.0));
        snap.process_events();
        assert_eq!(snap.state(), DragState::Dragging(id));

        scene.modify(id, |_| {});
        snap.process_events();
        assert_eq!(snap.state(), DragState::Idle);

        snap.begin_drag(&scene, id);
        scene.emit(SceneEvent::SelectionCleared);
        snap.process_events();
        assert_eq!(snap.state(), DragState::Idle);
    }

    #[test]
    fn test_activate_is_idempotent() {
        let (scene, mut snap, _) = setup();
        snap.activate(&scene);
        snap.activate(&scene);
        assert_eq!(scene.events().listener_count(), 1);
        snap.deactivate();
        snap.deactivate();
        assert_eq!(scene.events().listener_count(), 0);
        snap.activate(&scene);
        assert_eq!(scene.events().listener_count(), 1);
    }

    #[test]
    fn test_guides_follow_selection_and_throttle() {
        let (mut scene, mut snap, id) = setup();
        let ws = scene.workspace_id().unwrap();
        let mut viewport = Viewport::new();
        let size = Size::new(1000.0, 800.0);
        let t0 = Instant::now();

        assert!(!snap.update_guides(&scene, &viewport, &[ws], size, t0));
        assert!(snap.guides().is_none());

        assert!(snap.update_guides(&scene, &viewport, &[id], size, t0));
        let guides = *snap.guides().unwrap();
        assert_eq!(guides.center, Point::new(400.0, 300.0));
        assert_eq!(guides.vertical.p0.x, 400.0);
        assert_eq!(guides.horizontal.p0.y, 300.0);

        viewport.pan(Vec2::new(10.0, 0.0));
        assert!(!snap.update_guides(&scene, &viewport, &[id], size, t0 + Duration::from_millis(5)));
        assert!(snap.update_guides(&scene, &viewport, &[id], size, t0 + Duration::from_millis(20)));
        assert_eq!(snap.guides().unwrap().center.x, 410.0);

        scene.remove(id).unwrap();
        assert!(snap.update_guides(&scene, &viewport, &[], size, t0 + Duration::from_millis(21)));
        assert!(snap.guides().is_none());
    }
}
