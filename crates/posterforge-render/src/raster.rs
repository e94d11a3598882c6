//! Rasterization through resvg.

use crate::error::{RenderError, RenderResult};
use crate::svg::{SvgOptions, objects_to_svg, scene_to_svg};
use kurbo::{Affine, Rect};
use posterforge_core::{Scene, SceneObject};
use resvg::{tiny_skia, usvg};
use std::path::PathBuf;
use std::sync::Arc;

/// Largest edge, in pixels, a single raster may have.
pub const MAX_DIMENSION: u32 = 16_384;

/// Straight (non-premultiplied) RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterImage {
    /// RGBA of the pixel at `x`/`y`, if inside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        let p = self.pixels.get(i..i + 4)?;
        Some([p[0], p[1], p[2], p[3]])
    }

    pub fn is_opaque(&self) -> bool {
        self.pixels.chunks_exact(4).all(|p| p[3] == 255)
    }
}

/// Parameters of one scene rasterization.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRequest {
    /// Region in document coordinates, usually the workspace bounds.
    pub region: Rect,
    pub scale: f64,
    /// Current viewport transform. Exports pass the identity.
    pub view: Affine,
    pub transparent: bool,
    /// Origin the editor is served from, for cross-origin checks.
    pub origin: Option<String>,
}

impl RasterRequest {
    pub fn new(region: Rect) -> Self {
        Self {
            region,
            scale: 1.0,
            view: Affine::IDENTITY,
            transparent: false,
            origin: None,
        }
    }

    fn svg_options(&self) -> SvgOptions {
        SvgOptions::new(self.region)
            .with_scale(self.scale)
            .with_view(self.view)
            .transparent(self.transparent)
    }
}

/// Turns scenes into pixels.
pub trait Rasterizer {
    fn rasterize(&self, scene: &Scene, request: &RasterRequest) -> RenderResult<RasterImage>;

    /// Render one object fitted into a `size` x `size` box on a transparent background.
    fn rasterize_object(&self, object: &SceneObject, size: u32) -> RenderResult<RasterImage>;
}

/// First visible image source that would taint a readback, if any.
pub fn find_tainted<'a>(
    objects: impl IntoIterator<Item = &'a SceneObject>,
    origin: Option<&str>,
) -> Option<String> {
    let mut tainted = None;
    for object in objects {
        if !object.visible || tainted.is_some() {
            continue;
        }
        object.for_each_image(&mut |image| {
            if tainted.is_none() && image.taints(origin) {
                tainted = Some(image.src.clone());
            }
        });
    }
    tainted
}

/// Rasterizer backed by usvg/resvg.
#[derive(Clone)]
pub struct ResvgRasterizer {
    fontdb: Arc<usvg::fontdb::Database>,
    resources_dir: Option<PathBuf>,
}

impl ResvgRasterizer {
    /// Rasterizer with the system fonts loaded.
    pub fn new() -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        log::debug!("Loaded {} font faces", db.len());
        Self::with_fontdb(Arc::new(db))
    }

    /// Rasterizer without any fonts. Text is skipped.
    pub fn bare() -> Self {
        Self::with_fontdb(Arc::new(usvg::fontdb::Database::new()))
    }

    pub fn with_fontdb(fontdb: Arc<usvg::fontdb::Database>) -> Self {
        Self {
            fontdb,
            resources_dir: None,
        }
    }

    /// Directory relative image paths are resolved against.
    pub fn with_resources_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resources_dir = Some(dir.into());
        self
    }

    fn render_svg(&self, svg: &str, width: u32, height: u32) -> RenderResult<RasterImage> {
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(RenderError::RenderFailed(format!(
                "{width}x{height} exceeds the {MAX_DIMENSION}px limit"
            )));
        }

        let opt = usvg::Options {
            resources_dir: self.resources_dir.clone(),
            fontdb: self.fontdb.clone(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(svg, &opt).map_err(|e| RenderError::Svg(e.to_string()))?;

        let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
            RenderError::RenderFailed(format!("Cannot allocate {width}x{height} pixmap"))
        })?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for p in pixmap.pixels() {
            let c = p.demultiply();
            pixels.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        Ok(RasterImage {
            width,
            height,
            pixels,
        })
    }
}

impl Default for ResvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer for ResvgRasterizer {
    fn rasterize(&self, scene: &Scene, request: &RasterRequest) -> RenderResult<RasterImage> {
        if request.region.is_zero_area() || request.scale <= 0.0 {
            return Err(RenderError::Empty);
        }
        if let Some(src) = find_tainted(scene.objects_ordered(), request.origin.as_deref()) {
            return Err(RenderError::Tainted(src));
        }

        let options = request.svg_options();
        let (width, height) = options.output_size();
        log::debug!("Rasterizing {} objects at {width}x{height}", scene.len());
        self.render_svg(&scene_to_svg(scene, &options), width, height)
    }

    fn rasterize_object(&self, object: &SceneObject, size: u32) -> RenderResult<RasterImage> {
        let region = object.bounds();
        let longest = region.width().max(region.height());
        if longest <= 0.0 || size == 0 {
            return Err(RenderError::Empty);
        }
        if let Some(src) = find_tainted(std::iter::once(object), None) {
            return Err(RenderError::Tainted(src));
        }

        let options = SvgOptions::new(region)
            .with_scale(f64::from(size) / longest)
            .transparent(true);
        let (width, height) = options.output_size();
        self.render_svg(
            &objects_to_svg(std::iter::once(object), &options),
            width,
            height,
        )
    }
}
