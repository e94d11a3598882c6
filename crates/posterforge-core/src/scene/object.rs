//! Scene objects and their payloads.

use super::Rgba;
use kurbo::{Affine, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for scene objects.
pub type ObjectId = Uuid;

/// The kind of a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Text,
    Image,
    Shape,
    Group,
    /// The workspace clip rectangle. Never shown as a layer.
    Background,
}

impl ObjectKind {
    /// Label used when generating layer names.
    pub fn type_label(self) -> &'static str {
        match self {
            ObjectKind::Text => "Text",
            ObjectKind::Image => "Image",
            ObjectKind::Shape => "Shape",
            ObjectKind::Group => "Group",
            ObjectKind::Background => "Background",
        }
    }
}

/// Placement of an object: a `width` x `height` box whose top-left corner sits at
/// `left`/`top`, scaled and then rotated by `angle` degrees around its center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "unit_scale")]
    pub scale_x: f64,
    #[serde(default = "unit_scale")]
    pub scale_y: f64,
    #[serde(default)]
    pub angle: f64,
}

fn unit_scale() -> f64 {
    1.0
}

impl Transform {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
        }
    }

    /// Size after scaling.
    pub fn scaled_size(&self) -> (f64, f64) {
        (self.width * self.scale_x.abs(), self.height * self.scale_y.abs())
    }

    /// Center of the object in document coordinates.
    pub fn center(&self) -> Point {
        let (w, h) = self.scaled_size();
        Point::new(self.left + w / 2.0, self.top + h / 2.0)
    }

    /// Move the object so its center lands on `center`.
    pub fn set_center(&mut self, center: Point) {
        let (w, h) = self.scaled_size();
        self.left = center.x - w / 2.0;
        self.top = center.y - h / 2.0;
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.left += delta.x;
        self.top += delta.y;
    }

    /// Maps the local box `[0, width] x [0, height]` into document coordinates.
    pub fn affine(&self) -> Affine {
        let center = self.center();
        Affine::translate(center.to_vec2())
            * Affine::rotate(self.angle.to_radians())
            * Affine::scale_non_uniform(self.scale_x, self.scale_y)
            * Affine::translate(Vec2::new(-self.width / 2.0, -self.height / 2.0))
    }

    /// Axis-aligned bounding box in document coordinates.
    pub fn bounds(&self) -> Rect {
        let affine = self.affine();
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(self.width, 0.0),
            Point::new(self.width, self.height),
            Point::new(0.0, self.height),
        ];
        let mut rect = Rect::from_points(affine * corners[0], affine * corners[1]);
        for &corner in &corners[2..] {
            rect = rect.union_pt(affine * corner);
        }
        rect
    }
}

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    pub content: String,
    pub font_family: String,
    pub font_size: f64,
    #[serde(default = "default_font_weight")]
    pub font_weight: u16,
    pub fill: Rgba,
    #[serde(default)]
    pub align: TextAlign,
}

fn default_font_weight() -> u16 {
    400
}

impl TextData {
    pub const DEFAULT_FONT_FAMILY: &'static str = "Arial";
    pub const DEFAULT_FONT_SIZE: f64 = 32.0;

    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            font_family: Self::DEFAULT_FONT_FAMILY.to_string(),
            font_size: Self::DEFAULT_FONT_SIZE,
            font_weight: default_font_weight(),
            fill: Rgba::black(),
            align: TextAlign::Left,
        }
    }

    /// Approximate layout box, used until a renderer measures the text.
    pub fn estimated_size(&self) -> (f64, f64) {
        let lines: Vec<&str> = self.content.lines().collect();
        let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        let width = (longest as f64 * self.font_size * 0.6).max(self.font_size);
        let height = lines.len().max(1) as f64 * self.font_size * 1.16;
        (width, height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    /// Source URL (remote, file path or `data:` URL).
    pub src: String,
    /// CORS mode the image was loaded with, `Some("anonymous")` when opted in.
    #[serde(default)]
    pub cross_origin: Option<String>,
    pub natural_width: u32,
    pub natural_height: u32,
}

impl ImageData {
    pub fn new(src: impl Into<String>, natural_width: u32, natural_height: u32) -> Self {
        Self {
            src: src.into(),
            cross_origin: None,
            natural_width,
            natural_height,
        }
    }

    pub fn is_data_url(&self) -> bool {
        self.src.starts_with("data:")
    }

    /// Whether the source is served from an origin other than `origin`.
    ///
    /// `data:` URLs and relative or file paths are always same-origin.
    pub fn is_cross_origin(&self, origin: Option<&str>) -> bool {
        let src = self.src.as_str();
        if !(src.starts_with("http://") || src.starts_with("https://")) {
            return false;
        }
        match origin {
            Some(origin) => {
                let origin = origin.trim_end_matches('/');
                !(src.starts_with(origin)
                    && matches!(src.as_bytes().get(origin.len()), None | Some(b'/')))
            }
            None => true,
        }
    }

    /// Whether reading pixels of this image would taint a raster surface.
    pub fn taints(&self, origin: Option<&str>) -> bool {
        self.is_cross_origin(origin) && self.cross_origin.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ShapeGeometry {
    Rect {
        #[serde(default)]
        corner_radius: f64,
    },
    Ellipse,
    Triangle,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeData {
    pub geometry: ShapeGeometry,
    #[serde(default)]
    pub fill: Option<Rgba>,
    #[serde(default)]
    pub stroke: Option<Rgba>,
    #[serde(default)]
    pub stroke_width: f64,
}

impl ShapeData {
    pub fn new(geometry: ShapeGeometry) -> Self {
        let (fill, stroke, stroke_width) = match geometry {
            ShapeGeometry::Line => (None, Some(Rgba::black()), 4.0),
            _ => (Some(Rgba::new(0x3b, 0x82, 0xf6, 255)), None, 0.0),
        };
        Self {
            geometry,
            fill,
            stroke,
            stroke_width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupData {
    /// Children, back to front, in document coordinates.
    pub children: Vec<SceneObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundData {
    pub fill: Rgba,
}

/// Kind-specific payload of a scene object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ObjectData {
    Text(TextData),
    Image(ImageData),
    Shape(ShapeData),
    Group(GroupData),
    Background(BackgroundData),
}

/// A drawable object in the scene graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    /// Stable identity. Assigned by the scene on first observation if missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// User-facing layer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub transform: Transform,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default = "default_true")]
    pub selectable: bool,
    #[serde(default = "default_true")]
    pub evented: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Helper objects (guides and the like) never become layers or snap.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auxiliary: bool,
    pub data: ObjectData,
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

impl SceneObject {
    pub fn new(transform: Transform, data: ObjectData) -> Self {
        Self {
            id: None,
            name: None,
            transform,
            visible: true,
            locked: false,
            selectable: true,
            evented: true,
            opacity: 1.0,
            auxiliary: false,
            data,
        }
    }

    /// A text object positioned at `position`, sized from its content.
    pub fn text(position: Point, text: TextData) -> Self {
        let (w, h) = text.estimated_size();
        Self::new(
            Transform::new(position.x, position.y, w, h),
            ObjectData::Text(text),
        )
    }

    pub fn image(position: Point, width: f64, height: f64, image: ImageData) -> Self {
        Self::new(
            Transform::new(position.x, position.y, width, height),
            ObjectData::Image(image),
        )
    }

    pub fn shape(position: Point, width: f64, height: f64, shape: ShapeData) -> Self {
        Self::new(
            Transform::new(position.x, position.y, width, height),
            ObjectData::Shape(shape),
        )
    }

    /// The workspace rectangle at the document origin.
    pub fn workspace(width: f64, height: f64, fill: Rgba) -> Self {
        let mut object = Self::new(
            Transform::new(0.0, 0.0, width, height),
            ObjectData::Background(BackgroundData { fill }),
        );
        object.selectable = false;
        object.evented = false;
        object
    }

    /// A group whose box covers its children.
    pub fn group(children: Vec<SceneObject>) -> Self {
        let mut object = Self::new(
            Transform::new(0.0, 0.0, 0.0, 0.0),
            ObjectData::Group(GroupData { children }),
        );
        object.refresh_group_bounds();
        object
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    /// Return the identity, assigning a fresh one if the object has none.
    pub fn ensure_id(&mut self) -> ObjectId {
        *self.id.get_or_insert_with(Uuid::new_v4)
    }

    pub fn kind(&self) -> ObjectKind {
        match self.data {
            ObjectData::Text(_) => ObjectKind::Text,
            ObjectData::Image(_) => ObjectKind::Image,
            ObjectData::Shape(_) => ObjectKind::Shape,
            ObjectData::Group(_) => ObjectKind::Group,
            ObjectData::Background(_) => ObjectKind::Background,
        }
    }

    pub fn is_workspace(&self) -> bool {
        self.kind() == ObjectKind::Background
    }

    /// Whether this object is represented in the layer list.
    pub fn is_layer(&self) -> bool {
        !self.is_workspace() && !self.auxiliary
    }

    pub fn bounds(&self) -> Rect {
        self.transform.bounds()
    }

    pub fn center(&self) -> Point {
        self.transform.center()
    }

    /// Lock or unlock; locking also disables selection and event delivery.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
        self.selectable = !locked;
        self.evented = !locked;
    }

    /// Move the object (and group children) by `delta`.
    pub fn translate(&mut self, delta: Vec2) {
        self.transform.translate(delta);
        if let ObjectData::Group(group) = &mut self.data {
            for child in &mut group.children {
                child.translate(delta);
            }
        }
    }

    /// Move the object so its center lands on `center`.
    pub fn set_center(&mut self, center: Point) {
        let delta = center - self.center();
        self.translate(delta);
    }

    /// Drop this object's identity (and its children's) so the scene assigns new ones.
    pub fn clear_identity(&mut self) {
        self.id = None;
        if let ObjectData::Group(group) = &mut self.data {
            for child in &mut group.children {
                child.clear_identity();
            }
        }
    }

    /// Assign identities to this object and every nested child lacking one.
    pub fn ensure_ids_recursive(&mut self) -> ObjectId {
        if let ObjectData::Group(group) = &mut self.data {
            for child in &mut group.children {
                child.ensure_ids_recursive();
            }
        }
        self.ensure_id()
    }

    /// Recompute a group's box from its children. No-op for other kinds.
    pub fn refresh_group_bounds(&mut self) {
        let ObjectData::Group(group) = &self.data else {
            return;
        };
        let mut bounds: Option<Rect> = None;
        for child in &group.children {
            let b = child.bounds();
            bounds = Some(match bounds {
                Some(r) => r.union(b),
                None => b,
            });
        }
        let bounds = bounds.unwrap_or(Rect::ZERO);
        self.transform = Transform::new(bounds.x0, bounds.y0, bounds.width(), bounds.height());
    }

    pub fn as_text(&self) -> Option<&TextData> {
        match &self.data {
            ObjectData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageData> {
        match &self.data {
            ObjectData::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupData> {
        match &self.data {
            ObjectData::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Visit every image payload in this object, including nested group children.
    pub fn for_each_image_mut(&mut self, f: &mut dyn FnMut(&mut ImageData)) {
        match &mut self.data {
            ObjectData::Image(image) => f(image),
            ObjectData::Group(group) => {
                for child in &mut group.children {
                    child.for_each_image_mut(f);
                }
            }
            _ => {}
        }
    }

    /// Visit every image payload without mutation.
    pub fn for_each_image(&self, f: &mut dyn FnMut(&ImageData)) {
        match &self.data {
            ObjectData::Image(image) => f(image),
            ObjectData::Group(group) => {
                for child in &group.children {
                    child.for_each_image(f);
                }
            }
            _ => {}
        }
    }
}
