//! Thumbnails for history records and the layer panel.

use crate::encode::{encode_png, to_data_url};
use crate::error::RenderError;
use crate::raster::{RasterImage, RasterRequest, Rasterizer, ResvgRasterizer};
use posterforge_core::{Scene, SceneObject, Thumbnail, ThumbnailError, Thumbnailer};

/// PNG thumbnails produced through a [`Rasterizer`].
pub struct RasterThumbnailer<R: Rasterizer = ResvgRasterizer> {
    rasterizer: R,
    origin: Option<String>,
}

impl<R: Rasterizer> RasterThumbnailer<R> {
    pub fn new(rasterizer: R) -> Self {
        Self {
            rasterizer,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

fn to_thumbnail(image: RasterImage) -> Result<Thumbnail, ThumbnailError> {
    let png = encode_png(&image).map_err(|e| ThumbnailError::Render(e.to_string()))?;
    Ok(Thumbnail {
        width: image.width,
        height: image.height,
        data_url: to_data_url("image/png", &png),
    })
}

fn map_error(err: RenderError) -> ThumbnailError {
    match err {
        RenderError::Tainted(_) => ThumbnailError::Tainted,
        RenderError::Empty => ThumbnailError::Empty,
        other => ThumbnailError::Render(other.to_string()),
    }
}

impl<R: Rasterizer> Thumbnailer for RasterThumbnailer<R> {
    fn scene_thumbnail(&self, scene: &Scene, scale: f64) -> Result<Thumbnail, ThumbnailError> {
        let region = scene.workspace_bounds().ok_or(ThumbnailError::Empty)?;
        let mut request = RasterRequest::new(region);
        request.scale = scale;
        request.origin = self.origin.clone();
        let image = self
            .rasterizer
            .rasterize(scene, &request)
            .map_err(map_error)?;
        to_thumbnail(image)
    }

    fn object_thumbnail(
        &self,
        object: &SceneObject,
        size: u32,
    ) -> Result<Thumbnail, ThumbnailError> {
        let image = self
            .rasterizer
            .rasterize_object(object, size)
            .map_err(map_error)?;
        to_thumbnail(image)
    }
}
