//! Export pipeline: turns an editing session into a downloadable artifact.

use crate::encode::{encode_jpeg, encode_png, encode_webp, to_data_url};
use crate::error::RenderError;
use crate::loader::{DataUrlLoader, ImageLoader, reload_cross_origin_images};
use crate::negotiate::{QualityPolicy, negotiate_quality};
use crate::pdf::{
    A4_HEIGHT_MM, A4_WIDTH_MM, DEFAULT_DPI, PdfAssembler, Placement, fit_to_page, px_to_mm,
};
use crate::raster::{RasterImage, RasterRequest, Rasterizer, ResvgRasterizer};
use crate::svg::{SvgOptions, scene_to_svg};
use kurbo::{Affine, Rect};
use posterforge_core::{EditorSession, Scene, SceneError};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::rc::Rc;
use std::str::FromStr;
use std::task::{Context, Poll};
use std::time::Instant;
use thiserror::Error;

/// Output formats, selected by id (`png`, `jpg`, `webp`, `svg`, `pdf`, `json`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    #[serde(rename = "jpg", alias = "jpeg")]
    Jpeg,
    Webp,
    Svg,
    Pdf,
    Json,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 6] = [
        ExportFormat::Png,
        ExportFormat::Jpeg,
        ExportFormat::Webp,
        ExportFormat::Svg,
        ExportFormat::Pdf,
        ExportFormat::Json,
    ];

    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "webp" => Some(ExportFormat::Webp),
            "svg" => Some(ExportFormat::Svg),
            "pdf" => Some(ExportFormat::Pdf),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Webp => "webp",
            ExportFormat::Svg => "svg",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Webp => "image/webp",
            ExportFormat::Svg => "image/svg+xml",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Json => "application/json",
        }
    }

    /// Formats whose size can be traded for quality.
    pub fn is_lossy(self) -> bool {
        matches!(self, ExportFormat::Jpeg | ExportFormat::Webp)
    }

    pub fn supports_transparency(self) -> bool {
        matches!(self, ExportFormat::Png | ExportFormat::Webp)
    }

    fn is_raster(self) -> bool {
        !matches!(self, ExportFormat::Svg | ExportFormat::Json)
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| ExportError::Failed(format!("Unknown export format: {s}")))
    }
}

/// One export request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportJob {
    pub format: ExportFormat,
    /// Output pixels per document unit.
    pub scale: f64,
    /// Lossy encoder quality, 1-100.
    pub quality: u8,
    pub transparent: bool,
    pub limit_file_size: bool,
    pub max_file_size_mb: f64,
    /// File name without extension.
    pub filename: String,
}

impl Default for ExportJob {
    fn default() -> Self {
        Self {
            format: ExportFormat::Png,
            scale: 1.0,
            quality: 90,
            transparent: false,
            limit_file_size: false,
            max_file_size_mb: 1.0,
            filename: "poster".to_string(),
        }
    }
}

impl ExportJob {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Enable the size budget, in megabytes.
    pub fn limit_file_size(mut self, max_file_size_mb: f64) -> Self {
        self.limit_file_size = true;
        self.max_file_size_mb = max_file_size_mb;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Size budget in bytes, when enabled.
    pub fn target_bytes(&self) -> Option<usize> {
        (self.limit_file_size && self.max_file_size_mb > 0.0)
            .then(|| (self.max_file_size_mb * 1024.0 * 1024.0) as usize)
    }

    fn validate(&self) -> Result<(), ExportError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ExportError::Failed(format!("Invalid scale: {}", self.scale)));
        }
        Ok(())
    }
}

/// Pipeline-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    pub quality: QualityPolicy,
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    pub dpi: f64,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            quality: QualityPolicy::default(),
            page_width_mm: A4_WIDTH_MM,
            page_height_mm: A4_HEIGHT_MM,
            dpi: DEFAULT_DPI,
        }
    }
}

impl ExportDefaults {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A cross-origin image could not be reloaded with CORS.
    #[error("Export blocked by cross-origin image: {0}")]
    Tainted(String),
    #[error("Export failed: {0}")]
    Failed(String),
    #[error("Export cancelled")]
    Cancelled,
}

impl ExportError {
    /// Whether running the same job again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExportError::Failed(_))
    }
}

impl From<RenderError> for ExportError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Tainted(src) => ExportError::Tainted(src),
            other => ExportError::Failed(other.to_string()),
        }
    }
}

impl From<SceneError> for ExportError {
    fn from(err: SceneError) -> Self {
        ExportError::Failed(err.to_string())
    }
}

/// A finished export.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub extension: &'static str,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    /// Encoder quality actually used, for lossy formats.
    pub quality: Option<u8>,
    pub pages: usize,
}

impl Artifact {
    fn new(format: ExportFormat, filename: &str, bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            mime: format.mime_type(),
            extension: format.extension(),
            filename: filename.to_string(),
            width,
            height,
            quality: None,
            pages: 1,
        }
    }

    /// `{filename}.{extension}`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.filename, self.extension)
    }

    pub fn to_data_url(&self) -> String {
        to_data_url(self.mime, &self.bytes)
    }
}

/// Receives finished artifacts.
pub trait DownloadSink {
    /// Store the artifact and return where it went.
    fn deliver(&self, artifact: &Artifact) -> std::io::Result<PathBuf>;
}

/// Writes artifacts into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, artifact: &Artifact) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(artifact.file_name());
        std::fs::write(&path, &artifact.bytes)?;
        log::info!("Wrote {} ({} bytes)", path.display(), artifact.bytes.len());
        Ok(path)
    }
}

/// Cooperative cancellation flag for multi-page exports.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// Completes on its second poll, letting the executor run other work.
#[derive(Default)]
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Renders sessions into artifacts.
pub struct ExportPipeline<R: Rasterizer = ResvgRasterizer> {
    rasterizer: R,
    loader: Box<dyn ImageLoader>,
    origin: Option<String>,
    defaults: ExportDefaults,
}

impl<R: Rasterizer> ExportPipeline<R> {
    pub fn new(rasterizer: R) -> Self {
        Self {
            rasterizer,
            loader: Box::new(DataUrlLoader),
            origin: None,
            defaults: ExportDefaults::default(),
        }
    }

    /// Loader used to re-fetch cross-origin images before readout.
    pub fn with_loader(mut self, loader: impl ImageLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Origin the editor runs on. Without one every remote image is cross-origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_defaults(mut self, defaults: ExportDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &ExportDefaults {
        &self.defaults
    }

    /// Export the active page.
    pub fn export(
        &self,
        session: &mut EditorSession,
        job: &ExportJob,
    ) -> Result<Artifact, ExportError> {
        job.validate()?;
        let status = session.status();
        status.update(|s| s.exporting = true);
        log::info!("Exporting {} as {}", job.filename, job.format.extension());

        let result = if job.format.is_raster() {
            let saved = session.viewport().clone();
            session.viewport_mut().reset();
            let result = self.export_raster(session.scene(), session.viewport().transform(), job);
            *session.viewport_mut() = saved;
            result
        } else {
            self.export_document(session.scene(), job)
        };

        status.update(|s| s.exporting = false);
        log_outcome(&result);
        result
    }

    /// Export every page of the project into one PDF, one A4 page each.
    ///
    /// Pages are loaded into the live scene one at a time; the originally
    /// active page is restored afterwards, also on failure or cancellation.
    pub async fn export_pages(
        &self,
        session: &mut EditorSession,
        job: &ExportJob,
        cancel: Option<&CancellationToken>,
    ) -> Result<Artifact, ExportError> {
        job.validate()?;
        let status = session.status();
        status.update(|s| s.exporting = true);
        session.suspend_history(Instant::now());
        let saved_viewport = session.viewport().clone();
        session.viewport_mut().reset();

        let original = session
            .save_active_page()
            .and_then(|()| session.scene().to_json());
        let result = match original {
            Ok(original) => {
                let result = self.render_pages(session, job, cancel).await;
                if let Err(e) = session.scene_mut().load_json(&original) {
                    log::error!("Failed to restore the active page: {}", e);
                }
                result
            }
            Err(e) => Err(e.into()),
        };

        *session.viewport_mut() = saved_viewport;
        session.resume_history();
        status.update(|s| s.exporting = false);
        log_outcome(&result);
        result
    }

    async fn render_pages(
        &self,
        session: &mut EditorSession,
        job: &ExportJob,
        cancel: Option<&CancellationToken>,
    ) -> Result<Artifact, ExportError> {
        let d = &self.defaults;
        let mut pdf = PdfAssembler::new(&job.filename, d.dpi);
        let count = session.project().pages.len();

        for index in 0..count {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                log::info!("Export cancelled before page {}", index + 1);
                return Err(ExportError::Cancelled);
            }
            let snapshot = session.page_snapshot(index)?;
            session.scene_mut().load_json(&snapshot)?;

            let region = workspace_region(session.scene())?;
            let image = self.rasterize(
                session.scene(),
                region,
                session.viewport().transform(),
                job.scale,
                false,
            )?;
            let placement = fit_to_page(
                region.width(),
                region.height(),
                d.page_width_mm,
                d.page_height_mm,
            );
            pdf.add_page(&image, d.page_width_mm, d.page_height_mm, placement)?;
            YieldNow::default().await;
        }

        let pages = pdf.page_count();
        let mut artifact = Artifact::new(
            ExportFormat::Pdf,
            &job.filename,
            pdf.finish()?,
            mm_to_px(d.page_width_mm, d.dpi),
            mm_to_px(d.page_height_mm, d.dpi),
        );
        artifact.pages = pages;
        Ok(artifact)
    }

    fn export_document(&self, scene: &Scene, job: &ExportJob) -> Result<Artifact, ExportError> {
        match job.format {
            ExportFormat::Json => {
                let json = scene.to_json()?;
                let (w, h) = workspace_region(scene)
                    .map(|r| (r.width() as u32, r.height() as u32))
                    .unwrap_or((0, 0));
                Ok(Artifact::new(job.format, &job.filename, json.into_bytes(), w, h))
            }
            ExportFormat::Svg => {
                let region = workspace_region(scene)?;
                let options = SvgOptions::new(region).transparent(job.transparent);
                let (w, h) = options.output_size();
                let svg = scene_to_svg(scene, &options);
                Ok(Artifact::new(job.format, &job.filename, svg.into_bytes(), w, h))
            }
            other => Err(ExportError::Failed(format!(
                "{} is not a document format",
                other.extension()
            ))),
        }
    }

    fn export_raster(
        &self,
        scene: &Scene,
        view: Affine,
        job: &ExportJob,
    ) -> Result<Artifact, ExportError> {
        let region = workspace_region(scene)?;
        let transparent = job.transparent && job.format.supports_transparency();
        let image = self.rasterize(scene, region, view, job.scale, transparent)?;
        let (w, h) = (image.width, image.height);

        match job.format {
            ExportFormat::Png => {
                let png = encode_png(&image)?;
                Ok(Artifact::new(job.format, &job.filename, png, w, h))
            }
            ExportFormat::Jpeg | ExportFormat::Webp => {
                let format = job.format;
                let negotiated = negotiate_quality(
                    job.quality,
                    job.target_bytes(),
                    &self.defaults.quality,
                    |q| match format {
                        ExportFormat::Webp => encode_webp(&image, q),
                        _ => encode_jpeg(&image, q),
                    },
                )?;
                let mut artifact =
                    Artifact::new(job.format, &job.filename, negotiated.bytes, w, h);
                artifact.quality = Some(negotiated.quality);
                Ok(artifact)
            }
            ExportFormat::Pdf => {
                let dpi = self.defaults.dpi;
                let page_w = px_to_mm(region.width(), dpi);
                let page_h = px_to_mm(region.height(), dpi);
                let mut pdf = PdfAssembler::new(&job.filename, dpi);
                pdf.add_page(&image, page_w, page_h, Placement::full(page_w, page_h))?;
                Ok(Artifact::new(job.format, &job.filename, pdf.finish()?, w, h))
            }
            other => Err(ExportError::Failed(format!(
                "{} is not a raster format",
                other.extension()
            ))),
        }
    }

    /// Reload cross-origin images on a private copy, then rasterize it.
    fn rasterize(
        &self,
        scene: &Scene,
        region: Rect,
        view: Affine,
        scale: f64,
        transparent: bool,
    ) -> Result<RasterImage, ExportError> {
        let mut copy = scene.detached();
        reload_cross_origin_images(&mut copy, self.loader.as_ref(), self.origin.as_deref());

        let request = RasterRequest {
            region,
            scale,
            view,
            transparent,
            origin: self.origin.clone(),
        };
        Ok(self.rasterizer.rasterize(&copy, &request)?)
    }
}

fn workspace_region(scene: &Scene) -> Result<Rect, ExportError> {
    scene
        .workspace_bounds()
        .ok_or_else(|| ExportError::Failed("Scene has no workspace".into()))
}

fn mm_to_px(mm: f64, dpi: f64) -> u32 {
    (mm / 25.4 * dpi).round() as u32
}

fn log_outcome(result: &Result<Artifact, ExportError>) {
    match result {
        Ok(artifact) => log::info!(
            "Exported {} ({} bytes, {} page(s))",
            artifact.file_name(),
            artifact.bytes.len(),
            artifact.pages
        ),
        Err(ExportError::Cancelled) => {}
        Err(e) => log::error!("{}", e),
    }
}
