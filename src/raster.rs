//! Rasterization adapter: multi-page source → ordered JPEG page images.
//!
//! pdfium does the pixel work; this module owns the contract around it:
//! deterministic `page.N.jpeg` naming in source order, bounded dimensions
//! with aspect ratio preserved, fixed JPEG quality, and transparency
//! flattened onto an opaque white background.
//!
//! ## Degrade-gracefully fallback
//!
//! The primary path converts every page in one pass. If that pass fails,
//! a fallback converts only the first page and the operation still
//! succeeds with a single page. This is a policy choice — a partial
//! result beats none for a preview-and-classify pipeline — not a retry:
//! no further pages are attempted after the fallback.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state, unsafe to call from
//! async contexts. `tokio::task::spawn_blocking` keeps the CPU-heavy
//! rendering off the async worker threads.

use crate::config::ServiceConfig;
use crate::error::DoctriageError;
use crate::store::page_filename;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage, RgbaImage};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{debug, info, warn};

/// Converts a multi-page source into ordered page images on disk.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render `source` into `page.1.jpeg`, `page.2.jpeg`, … under
    /// `out_dir`, returning the written paths in page order.
    async fn rasterize(
        &self,
        source: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, DoctriageError>;
}

/// Output constraints every converted page obeys.
#[derive(Debug, Clone, Copy)]
pub struct RasterSettings {
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
}

impl From<&ServiceConfig> for RasterSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            max_width: config.max_page_width,
            max_height: config.max_page_height,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

/// pdfium-backed [`Rasterizer`].
pub struct PdfiumRasterizer {
    settings: RasterSettings,
}

impl PdfiumRasterizer {
    pub fn new(settings: RasterSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(
        &self,
        source: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, DoctriageError> {
        let source = source.to_path_buf();
        let out_dir = out_dir.to_path_buf();
        let settings = self.settings;

        task::spawn_blocking(move || rasterize_blocking(&source, &out_dir, settings))
            .await
            .map_err(|e| DoctriageError::Internal(format!("Raster task panicked: {e}")))?
    }
}

/// Blocking implementation: render, flatten, encode, write.
fn rasterize_blocking(
    source: &Path,
    out_dir: &Path,
    settings: RasterSettings,
) -> Result<Vec<PathBuf>, DoctriageError> {
    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(source, None)
        .map_err(|e| DoctriageError::RasterizationFailed {
            path: source.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(settings.max_width as i32)
        .set_maximum_height(settings.max_height as i32);

    let pages = document.pages();
    let images = match render_all(&pages, &render_config, source) {
        Ok(images) => images,
        Err(bulk_err) => {
            // Degrade gracefully: one page is enough for classification.
            warn!(
                "Bulk conversion of {} failed ({}); falling back to first page",
                source.display(),
                bulk_err
            );
            vec![render_one(&pages, &render_config, source, 0)?]
        }
    };

    let mut paths = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        let path = out_dir.join(page_filename(i + 1));
        write_jpeg(image, &path, settings.jpeg_quality)?;
        debug!(
            "Wrote {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        paths.push(path);
    }

    info!(
        "Rasterized {} into {} page(s)",
        source.display(),
        paths.len()
    );
    Ok(paths)
}

/// Primary path: every page in one pass, failing the pass on any page.
fn render_all(
    pages: &PdfPages<'_>,
    render_config: &PdfRenderConfig,
    source: &Path,
) -> Result<Vec<DynamicImage>, DoctriageError> {
    let total = pages.len() as usize;
    if total == 0 {
        return Err(DoctriageError::RasterizationFailed {
            path: source.to_path_buf(),
            detail: "document has no pages".into(),
        });
    }

    let mut images = Vec::with_capacity(total);
    for idx in 0..total {
        images.push(render_one(pages, render_config, source, idx)?);
    }
    Ok(images)
}

/// Render a single 0-based page index.
fn render_one(
    pages: &PdfPages<'_>,
    render_config: &PdfRenderConfig,
    source: &Path,
    idx: usize,
) -> Result<DynamicImage, DoctriageError> {
    let page = pages
        .get(idx as u16)
        .map_err(|e| DoctriageError::RasterizationFailed {
            path: source.to_path_buf(),
            detail: format!("page {}: {e:?}", idx + 1),
        })?;
    let bitmap =
        page.render_with_config(render_config)
            .map_err(|e| DoctriageError::RasterizationFailed {
                path: source.to_path_buf(),
                detail: format!("page {}: {e:?}", idx + 1),
            })?;
    Ok(bitmap.as_image())
}

/// Flatten any transparency onto an opaque white background.
///
/// JPEG has no alpha channel; leaving this to the encoder would turn
/// transparent regions black on pages with form fields or stamps.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba: RgbaImage = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let a = a as u16;
        let blend = |c: u8| -> u8 { ((c as u16 * a + 255 * (255 - a)) / 255) as u8 };
        rgb.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }
    rgb
}

/// Encode a rendered page as JPEG at the configured quality and write it.
fn write_jpeg(image: &DynamicImage, path: &Path, quality: u8) -> Result<(), DoctriageError> {
    let flattened = flatten_onto_white(image);
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    let encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
    DynamicImage::ImageRgb8(flattened)
        .write_with_encoder(encoder)
        .map_err(|e| DoctriageError::RasterizationFailed {
            path: path.to_path_buf(),
            detail: format!("JPEG encoding failed: {e}"),
        })?;
    std::fs::write(path, &buf).map_err(|e| DoctriageError::storage(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn opaque_pixels_survive_flattening() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            4,
            4,
            Rgba([10, 20, 30, 255]),
        ));
        let rgb = flatten_onto_white(&img);
        assert_eq!(rgb.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn fully_transparent_pixels_become_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0])));
        let rgb = flatten_onto_white(&img);
        assert_eq!(rgb.get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn half_transparent_black_blends_toward_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128])));
        let rgb = flatten_onto_white(&img);
        let [r, g, b] = rgb.get_pixel(0, 0).0;
        assert!(r > 100 && r < 150, "expected mid-grey, got {r}");
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn write_jpeg_produces_a_jpeg_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("page.1.jpeg");
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([200, 0, 0, 255])));
        write_jpeg(&img, &path, 90).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn settings_come_from_service_config() {
        let config = crate::config::ServiceConfig::default();
        let settings = RasterSettings::from(&config);
        assert_eq!(settings.max_width, 1200);
        assert_eq!(settings.max_height, 1600);
        assert_eq!(settings.jpeg_quality, 90);
    }
}
