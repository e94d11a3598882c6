//! Image sources: format sniffing and the reload step that runs before any
//! pixel readout.

use crate::encode::{decode_data_url, to_data_url};
use posterforge_core::Scene;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Supported raster image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::WebP => "image/webp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }

    /// Sniff the format from the leading bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Some(ImageFormat::Png);
        }
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }
        // RIFF....WEBP
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }
        None
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Image not found: {0}")]
    NotFound(String),
    #[error("Unsupported image source: {0}")]
    Unsupported(String),
    #[error("Unrecognized image data from {0}")]
    UnknownFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status} for {src}")]
    Status { src: String, status: u16 },
}

/// Raw bytes of a loaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl LoadedImage {
    fn sniff(src: &str, bytes: Vec<u8>) -> Result<Self, LoadError> {
        let format = ImageFormat::from_magic_bytes(&bytes)
            .ok_or_else(|| LoadError::UnknownFormat(src.to_string()))?;
        Ok(Self { format, bytes })
    }

    pub fn to_data_url(&self) -> String {
        to_data_url(self.format.mime_type(), &self.bytes)
    }
}

/// Fetches an image source with anonymous CORS semantics.
pub trait ImageLoader {
    fn load(&self, src: &str) -> Result<LoadedImage, LoadError>;
}

/// Decodes `data:` URLs. Everything else is unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUrlLoader;

impl ImageLoader for DataUrlLoader {
    fn load(&self, src: &str) -> Result<LoadedImage, LoadError> {
        let (mime, bytes) =
            decode_data_url(src).ok_or_else(|| LoadError::Unsupported(src.to_string()))?;
        let loaded = LoadedImage::sniff(src, bytes)?;
        if ImageFormat::from_mime(&mime) != Some(loaded.format) {
            log::debug!("Data URL declares {mime} but holds {:?}", loaded.format);
        }
        Ok(loaded)
    }
}

/// Reads local files and `file://` URLs, relative paths against `root`.
/// `data:` URLs are decoded in place.
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, src: &str) -> Option<PathBuf> {
        if src.contains("://") && !src.starts_with("file://") {
            return None;
        }
        let path = Path::new(src.strip_prefix("file://").unwrap_or(src));
        Some(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        })
    }
}

impl ImageLoader for FileLoader {
    fn load(&self, src: &str) -> Result<LoadedImage, LoadError> {
        if src.starts_with("data:") {
            return DataUrlLoader.load(src);
        }
        let path = self
            .resolve(src)
            .ok_or_else(|| LoadError::Unsupported(src.to_string()))?;
        if !path.is_file() {
            return Err(LoadError::NotFound(path.display().to_string()));
        }
        LoadedImage::sniff(src, std::fs::read(&path)?)
    }
}

/// Fetches `http(s)` sources without credentials. Other sources go to the
/// fallback loader (data URLs only by default).
pub struct HttpLoader {
    client: reqwest::blocking::Client,
    fallback: Box<dyn ImageLoader>,
}

impl HttpLoader {
    pub fn new() -> Result<Self, LoadError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("posterforge/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            fallback: Box::new(DataUrlLoader),
        })
    }

    pub fn with_fallback(mut self, loader: impl ImageLoader + 'static) -> Self {
        self.fallback = Box::new(loader);
        self
    }

    fn is_remote(src: &str) -> bool {
        let scheme = src.split_once("://").map(|(s, _)| s.to_ascii_lowercase());
        matches!(scheme.as_deref(), Some("http" | "https"))
    }
}

impl ImageLoader for HttpLoader {
    fn load(&self, src: &str) -> Result<LoadedImage, LoadError> {
        if !Self::is_remote(src) {
            return self.fallback.load(src);
        }
        let response = self.client.get(src).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                src: src.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes()?;
        log::debug!("Fetched {} ({} bytes)", src, bytes.len());
        LoadedImage::sniff(src, bytes.to_vec())
    }
}

/// Serves a fixed set of sources from memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    images: HashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, src: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(src.into(), bytes);
    }
}

impl ImageLoader for MemoryLoader {
    fn load(&self, src: &str) -> Result<LoadedImage, LoadError> {
        let bytes = self
            .images
            .get(src)
            .ok_or_else(|| LoadError::NotFound(src.to_string()))?;
        LoadedImage::sniff(src, bytes.clone())
    }
}

/// Result of a reload pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub reloaded: usize,
    pub failed: usize,
}

/// Reload every cross-origin image in `scene` through `loader`.
///
/// A reloaded image is inlined as a data URL with CORS opted in. A failed
/// reload keeps the original source; a later raster readout will then report
/// the surface as tainted. No events are emitted.
pub fn reload_cross_origin_images(
    scene: &mut Scene,
    loader: &dyn ImageLoader,
    origin: Option<&str>,
) -> ReloadReport {
    let mut report = ReloadReport::default();
    let ids: Vec<_> = scene.draw_order().to_vec();
    for id in ids {
        scene.modify_silent(id, |object| {
            object.for_each_image_mut(&mut |image| {
                if !image.is_cross_origin(origin) {
                    return;
                }
                match loader.load(&image.src) {
                    Ok(loaded) => {
                        image.src = loaded.to_data_url();
                        image.cross_origin = Some("anonymous".to_string());
                        report.reloaded += 1;
                    }
                    Err(e) => {
                        log::warn!("Failed to reload image {}: {}", image.src, e);
                        report.failed += 1;
                    }
                }
            });
        });
    }
    if report.reloaded + report.failed > 0 {
        log::info!(
            "Reloaded {} cross-origin images ({} failed)",
            report.reloaded,
            report.failed
        );
    }
    report
}
