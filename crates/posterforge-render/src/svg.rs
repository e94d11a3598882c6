//! SVG view of a scene.
//!
//! Every raster path goes through this: the scene is written out as SVG and
//! handed to resvg. The same document is the SVG export format.

use kurbo::{Affine, Rect};
use posterforge_core::scene::{ShapeData, ShapeGeometry, TextAlign, TextData};
use posterforge_core::{ObjectData, Rgba, Scene, SceneObject};
use std::fmt::Write;

/// Line height multiplier applied to text blocks.
const LINE_HEIGHT: f64 = 1.16;

/// What part of the scene to draw and how large.
#[derive(Debug, Clone, PartialEq)]
pub struct SvgOptions {
    /// Region in document coordinates.
    pub region: Rect,
    /// Output pixels per document unit.
    pub scale: f64,
    /// Viewport transform applied to the content.
    pub view: Affine,
    /// Skip the workspace fill so uncovered pixels stay transparent.
    pub transparent: bool,
}

impl SvgOptions {
    pub fn new(region: Rect) -> Self {
        Self {
            region,
            scale: 1.0,
            view: Affine::IDENTITY,
            transparent: false,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_view(mut self, view: Affine) -> Self {
        self.view = view;
        self
    }

    pub fn transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// The region as it lands on screen after the view transform.
    pub fn screen_region(&self) -> Rect {
        self.view.transform_rect_bbox(self.region)
    }

    /// Pixel dimensions of the output.
    pub fn output_size(&self) -> (u32, u32) {
        let region = self.screen_region();
        let w = (region.width() * self.scale).round().max(1.0);
        let h = (region.height() * self.scale).round().max(1.0);
        (w as u32, h as u32)
    }
}

/// Serialize the visible content of `scene` as a standalone SVG document.
pub fn scene_to_svg(scene: &Scene, options: &SvgOptions) -> String {
    objects_to_svg(scene.objects_ordered(), options)
}

/// Serialize an arbitrary object list, back to front.
pub fn objects_to_svg<'a>(
    objects: impl IntoIterator<Item = &'a SceneObject>,
    options: &SvgOptions,
) -> String {
    let region = options.screen_region();
    let (width, height) = options.output_size();

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{}" height="{}" viewBox="{} {} {} {}">"#,
        width,
        height,
        region.x0,
        region.y0,
        region.width(),
        region.height()
    );
    let _ = writeln!(svg, r#"<g transform="{}">"#, matrix(options.view));
    for object in objects {
        write_object(&mut svg, object, options.transparent);
    }
    svg.push_str("</g>\n</svg>\n");
    svg
}

fn write_object(svg: &mut String, object: &SceneObject, transparent: bool) {
    if !object.visible || object.auxiliary {
        return;
    }

    if let ObjectData::Group(group) = &object.data {
        // Children carry document coordinates of their own.
        let _ = writeln!(svg, r#"<g opacity="{}">"#, object.opacity);
        for child in &group.children {
            write_object(svg, child, transparent);
        }
        svg.push_str("</g>\n");
        return;
    }

    let t = &object.transform;
    let _ = writeln!(
        svg,
        r#"<g transform="{}" opacity="{}">"#,
        matrix(t.affine()),
        object.opacity
    );
    match &object.data {
        ObjectData::Background(bg) => {
            if !transparent {
                let _ = writeln!(
                    svg,
                    r#"<rect width="{}" height="{}"{}/>"#,
                    t.width,
                    t.height,
                    paint("fill", Some(bg.fill))
                );
            }
        }
        ObjectData::Shape(shape) => write_shape(svg, shape, t.width, t.height),
        ObjectData::Text(text) => write_text(svg, text, t.width),
        ObjectData::Image(image) => {
            let _ = writeln!(
                svg,
                r#"<image width="{}" height="{}" preserveAspectRatio="none" xlink:href="{}"/>"#,
                t.width,
                t.height,
                escape_xml(&image.src)
            );
        }
        ObjectData::Group(_) => {}
    }
    svg.push_str("</g>\n");
}

fn write_shape(svg: &mut String, shape: &ShapeData, w: f64, h: f64) {
    let mut style = paint("fill", shape.fill);
    if shape.stroke.is_some() && shape.stroke_width > 0.0 {
        style.push_str(&paint("stroke", shape.stroke));
        let _ = write!(style, r#" stroke-width="{}""#, shape.stroke_width);
    }
    let _ = match shape.geometry {
        ShapeGeometry::Rect { corner_radius } => writeln!(
            svg,
            r#"<rect width="{w}" height="{h}" rx="{corner_radius}"{style}/>"#
        ),
        ShapeGeometry::Ellipse => writeln!(
            svg,
            r#"<ellipse cx="{}" cy="{}" rx="{}" ry="{}"{style}/>"#,
            w / 2.0,
            h / 2.0,
            w / 2.0,
            h / 2.0
        ),
        ShapeGeometry::Triangle => writeln!(
            svg,
            r#"<polygon points="{},0 {w},{h} 0,{h}"{style}/>"#,
            w / 2.0
        ),
        ShapeGeometry::Line => writeln!(
            svg,
            r#"<line x1="0" y1="{y}" x2="{w}" y2="{y}"{style}/>"#,
            y = h / 2.0
        ),
    };
}

fn write_text(svg: &mut String, text: &TextData, width: f64) {
    let (anchor, x) = match text.align {
        TextAlign::Left => ("start", 0.0),
        TextAlign::Center => ("middle", width / 2.0),
        TextAlign::Right => ("end", width),
    };
    let _ = writeln!(
        svg,
        r#"<text xml:space="preserve" font-family="{}" font-size="{}" font-weight="{}" text-anchor="{}"{}>"#,
        escape_xml(&text.font_family),
        text.font_size,
        text.font_weight,
        anchor,
        paint("fill", Some(text.fill))
    );
    for (i, line) in text.content.lines().enumerate() {
        let y = text.font_size + i as f64 * text.font_size * LINE_HEIGHT;
        let _ = writeln!(
            svg,
            r#"<tspan x="{x}" y="{y}">{}</tspan>"#,
            escape_xml(line)
        );
    }
    svg.push_str("</text>\n");
}

fn matrix(affine: Affine) -> String {
    let [a, b, c, d, e, f] = affine.as_coeffs();
    format!("matrix({a} {b} {c} {d} {e} {f})")
}

/// ` fill="#rrggbb" fill-opacity=".."` or ` fill="none"`.
fn paint(attr: &str, color: Option<Rgba>) -> String {
    match color {
        Some(color) if color.a > 0 => {
            if color.a == 255 {
                format!(r#" {attr}="{}""#, color.to_hex())
            } else {
                format!(
                    r#" {attr}="{}" {attr}-opacity="{}""#,
                    color.to_hex(),
                    color.alpha()
                )
            }
        }
        _ => format!(r#" {attr}="none""#),
    }
}

/// Escape special XML characters.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;
    use posterforge_core::scene::ImageData;

    fn poster() -> Scene {
        Scene::with_workspace(400.0, 300.0, Rgba::white())
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
    }

    #[test]
    fn test_output_size_follows_scale() {
        let options = SvgOptions::new(Rect::new(0.0, 0.0, 400.0, 300.0)).with_scale(0.5);
        assert_eq!(options.output_size(), (200, 150));

        let zoomed = SvgOptions::new(Rect::new(0.0, 0.0, 400.0, 300.0))
            .with_view(Affine::scale(2.0));
        assert_eq!(zoomed.output_size(), (800, 600));
    }

    #[test]
    fn test_scene_svg_contains_objects_in_order() {
        let mut scene = poster();
        scene.add(SceneObject::shape(
            Point::new(10.0, 10.0),
            50.0,
            50.0,
            ShapeData::new(ShapeGeometry::Ellipse),
        ));
        scene.add(SceneObject::text(Point::new(20.0, 20.0), TextData::new("Hello & bye")));

        let region = scene.workspace_bounds().unwrap();
        let svg = scene_to_svg(&scene, &SvgOptions::new(region));
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"viewBox="0 0 400 300""#));
        let rect = svg.find("<rect").unwrap();
        let ellipse = svg.find("<ellipse").unwrap();
        let text = svg.find("<text").unwrap();
        assert!(rect < ellipse && ellipse < text);
        assert!(svg.contains("Hello &amp; bye"));
    }

    #[test]
    fn test_hidden_and_auxiliary_objects_are_skipped() {
        let mut scene = poster();
        let mut hidden = SceneObject::shape(
            Point::ZERO,
            10.0,
            10.0,
            ShapeData::new(ShapeGeometry::Triangle),
        );
        hidden.visible = false;
        scene.add(hidden);
        let mut guide = SceneObject::shape(
            Point::ZERO,
            10.0,
            1.0,
            ShapeData::new(ShapeGeometry::Line),
        );
        guide.auxiliary = true;
        scene.add(guide);

        let svg = scene_to_svg(&scene, &SvgOptions::new(scene.workspace_bounds().unwrap()));
        assert!(!svg.contains("<polygon"));
        assert!(!svg.contains("<line"));
    }

    #[test]
    fn test_transparent_skips_workspace_fill() {
        let scene = poster();
        let region = scene.workspace_bounds().unwrap();
        let opaque = scene_to_svg(&scene, &SvgOptions::new(region));
        let clear = scene_to_svg(&scene, &SvgOptions::new(region).transparent(true));
        assert!(opaque.contains(r##"fill="#ffffff""##));
        assert!(!clear.contains("<rect"));
    }

    #[test]
    fn test_image_href_is_escaped() {
        let mut scene = poster();
        scene.add(SceneObject::image(
            Point::ZERO,
            100.0,
            100.0,
            ImageData::new("https://cdn.example.com/a.png?x=1&y=2", 100, 100),
        ));
        let svg = scene_to_svg(&scene, &SvgOptions::new(scene.workspace_bounds().unwrap()));
        assert!(svg.contains("x=1&amp;y=2"));
    }

    #[test]
    fn test_semi_transparent_fill_sets_opacity() {
        assert_eq!(
            paint("fill", Some(Rgba::new(255, 0, 0, 51))),
            r##" fill="#ff0000" fill-opacity="0.2""##
        );
        assert_eq!(paint("stroke", None), r#" stroke="none""#);
    }
}
