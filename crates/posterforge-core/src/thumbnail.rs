//! Thumbnail values and the rendering seam that produces them.

use crate::scene::{Scene, SceneObject};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Thumbnail errors. Never fatal to the caller.
#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("Surface is tainted by cross-origin image data")]
    Tainted,
    #[error("Render failed: {0}")]
    Render(String),
    #[error("Nothing to render")]
    Empty,
}

/// An encoded preview image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    /// `data:image/png;base64,...`
    pub data_url: String,
}

impl Thumbnail {
    /// Placeholder used when a layer preview cannot be produced.
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data_url: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data_url.is_empty()
    }
}

/// Renders previews for history records and the layer panel.
pub trait Thumbnailer {
    /// Raster preview of the whole workspace at `scale`.
    fn scene_thumbnail(&self, scene: &Scene, scale: f64) -> Result<Thumbnail, ThumbnailError>;

    /// Preview of a single object, fitted into a `size` x `size` box.
    fn object_thumbnail(&self, object: &SceneObject, size: u32)
    -> Result<Thumbnail, ThumbnailError>;
}
