//! PosterForge Render Library
//!
//! Turns a scene into pixels and files: an SVG view of the scene, a resvg
//! rasterizer, PNG/JPEG/WEBP encoders with size-driven quality negotiation,
//! PDF assembly and the export pipeline that drives an editing session.

mod error;
pub mod encode;
pub mod export;
pub mod loader;
pub mod negotiate;
pub mod pdf;
pub mod raster;
pub mod svg;
pub mod thumbnail;

pub use error::{RenderError, RenderResult};
pub use export::{
    Artifact, CancellationToken, DirectorySink, DownloadSink, ExportDefaults, ExportError,
    ExportFormat, ExportJob, ExportPipeline,
};
pub use loader::{
    DataUrlLoader, FileLoader, HttpLoader, ImageFormat, ImageLoader, LoadError, MemoryLoader,
};
pub use negotiate::{Negotiated, QualityPolicy, negotiate_quality};
pub use raster::{RasterImage, RasterRequest, Rasterizer, ResvgRasterizer};
pub use svg::{SvgOptions, scene_to_svg};
pub use thumbnail::RasterThumbnailer;
