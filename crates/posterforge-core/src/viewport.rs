//! Viewport pan/zoom transform between document and screen space.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// The editor's view transform.
///
/// At identity (zoom 1, no offset) one document unit is one screen pixel,
/// which is what raster export relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Translation in screen pixels.
    pub offset: Vec2,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            min_zoom: 0.05,
            max_zoom: 20.0,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document to screen.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    /// Screen to document.
    pub fn inverse(&self) -> Affine {
        Affine::scale(1.0 / self.zoom) * Affine::translate(-self.offset)
    }

    pub fn world_to_screen(&self, point: Point) -> Point {
        self.transform() * point
    }

    pub fn screen_to_world(&self, point: Point) -> Point {
        self.inverse() * point
    }

    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Zoom by `factor`, keeping `screen_point` fixed on screen.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        let new_zoom = (self.zoom * factor).clamp(self.min_zoom, self.max_zoom);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }
        let anchor = self.screen_to_world(screen_point);
        self.zoom = new_zoom;
        self.offset += screen_point - self.world_to_screen(anchor);
    }

    /// Back to identity.
    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.zoom = 1.0;
    }

    pub fn is_identity(&self) -> bool {
        self.offset == Vec2::ZERO && (self.zoom - 1.0).abs() < f64::EPSILON
    }

    /// Zoom and center so `bounds` fills `viewport` minus `padding` on each side.
    pub fn fit_to_bounds(&mut self, bounds: Rect, viewport: Size, padding: f64) {
        if bounds.is_zero_area() {
            self.reset();
            return;
        }

        let available = Size::new(
            (viewport.width - padding * 2.0).max(1.0),
            (viewport.height - padding * 2.0).max(1.0),
        );
        let zoom = (available.width / bounds.width()).min(available.height / bounds.height());
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);

        let center = bounds.center();
        self.offset = Vec2::new(
            viewport.width / 2.0 - center.x * self.zoom,
            viewport.height / 2.0 - center.y * self.zoom,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_identity() {
        let viewport = Viewport::new();
        assert!(viewport.is_identity());
        let p = Point::new(12.0, 34.0);
        assert_eq!(viewport.world_to_screen(p), p);
    }

    #[test]
    fn test_roundtrip_conversion() {
        let mut viewport = Viewport::new();
        viewport.offset = Vec2::new(30.0, -20.0);
        viewport.zoom = 1.5;

        let original = Point::new(123.0, 456.0);
        let back = viewport.world_to_screen(viewport.screen_to_world(original));
        assert!((back.x - original.x).abs() < 1e-10);
        assert!((back.y - original.y).abs() < 1e-10);
    }

    #[test]
    fn test_zoom_at_keeps_anchor() {
        let mut viewport = Viewport::new();
        let anchor = Point::new(200.0, 100.0);
        let world = viewport.screen_to_world(anchor);
        viewport.zoom_at(anchor, 2.0);
        let after = viewport.world_to_screen(world);
        assert!((after.x - anchor.x).abs() < 1e-9);
        assert!((after.y - anchor.y).abs() < 1e-9);
        assert!((viewport.zoom - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fit_and_reset() {
        let mut viewport = Viewport::new();
        viewport.fit_to_bounds(
            Rect::new(0.0, 0.0, 1000.0, 1000.0),
            Size::new(500.0, 500.0),
            0.0,
        );
        assert!((viewport.zoom - 0.5).abs() < 1e-9);
        assert!(!viewport.is_identity());
        viewport.reset();
        assert!(viewport.is_identity());
    }
}
