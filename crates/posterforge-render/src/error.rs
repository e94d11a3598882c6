//! Render errors.

use thiserror::Error;

/// Errors raised while rendering or encoding a scene.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A cross-origin image without CORS opt-in would be read back.
    #[error("Surface is tainted by cross-origin image: {0}")]
    Tainted(String),
    #[error("SVG parse failed: {0}")]
    Svg(String),
    #[error("Render failed: {0}")]
    RenderFailed(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("PDF error: {0}")]
    Pdf(String),
    #[error("Nothing to render")]
    Empty,
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;
