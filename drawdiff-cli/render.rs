//! Document rendering seam.
//!
//! The pipeline needs page rasters, not document files: it talks to a
//! [`PageRenderer`] so the comparison engine stays free of any PDF toolkit.
//! The bundled [`DirectoryRenderer`] serves pre-rendered documents, where a
//! document is either a single raster file or a directory of per-page
//! rasters in filename order.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use image::imageops::FilterType;
use image::{GrayImage, RgbaImage};
use thiserror::Error;
use tracing::debug;

/// Nominal resolution of stored page rasters; rendering at `dpi` scales by
/// `dpi / 72`.
pub const BASE_DPI: u32 = 72;

/// Failures raised while resolving or rendering document pages.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("page {page} not available in a {pages} page document")]
    PageOutOfRange { page: usize, pages: usize },
    #[error("document {} has no page rasters", .0.display())]
    EmptyDocument(PathBuf),
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode page raster: {0}")]
    Decode(#[from] image::ImageError),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Renders document pages to rasters at a requested resolution.
pub trait PageRenderer: Send + Sync {
    fn page_count(&self, document: &Path) -> RenderResult<usize>;

    /// Grayscale raster plus the `dpi / 72` scaling factor viewers use to
    /// map nominal document coordinates onto rendered pixels.
    fn render_page(
        &self,
        document: &Path,
        page: usize,
        dpi: u32,
    ) -> RenderResult<(GrayImage, f64)>;

    /// Color raster for display. `grayscale_display` drops the chroma but
    /// keeps the RGBA channel layout.
    fn render_page_color(
        &self,
        document: &Path,
        page: usize,
        dpi: u32,
        grayscale_display: bool,
    ) -> RenderResult<RgbaImage>;
}

/// Serves documents that were already rendered to page rasters on disk.
/// Stored rasters are taken as the 72 dpi masters.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryRenderer;

impl DirectoryRenderer {
    fn page_files(&self, document: &Path) -> RenderResult<Vec<PathBuf>> {
        if document.is_file() {
            return Ok(vec![document.to_path_buf()]);
        }
        let mut pages: Vec<PathBuf> = fs::read_dir(document)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_page_raster(path))
            .collect();
        if pages.is_empty() {
            return Err(RenderError::EmptyDocument(document.to_path_buf()));
        }
        pages.sort();
        Ok(pages)
    }

    fn load_scaled(
        &self,
        document: &Path,
        page: usize,
        dpi: u32,
    ) -> RenderResult<(DynamicImage, f64)> {
        let pages = self.page_files(document)?;
        let count = pages.len();
        let path = pages
            .into_iter()
            .nth(page)
            .ok_or(RenderError::PageOutOfRange { page, pages: count })?;

        let image = image::open(&path)?;
        let factor = dpi as f64 / BASE_DPI as f64;
        if dpi == BASE_DPI {
            return Ok((image, 1.0));
        }
        let width = ((image.width() as f64 * factor).round() as u32).max(1);
        let height = ((image.height() as f64 * factor).round() as u32).max(1);
        debug!(
            page,
            dpi,
            width,
            height,
            path = %path.display(),
            "page raster scaled"
        );
        Ok((
            image.resize_exact(width, height, FilterType::Lanczos3),
            factor,
        ))
    }
}

impl PageRenderer for DirectoryRenderer {
    fn page_count(&self, document: &Path) -> RenderResult<usize> {
        Ok(self.page_files(document)?.len())
    }

    fn render_page(
        &self,
        document: &Path,
        page: usize,
        dpi: u32,
    ) -> RenderResult<(GrayImage, f64)> {
        let (image, factor) = self.load_scaled(document, page, dpi)?;
        Ok((image.to_luma8(), factor))
    }

    fn render_page_color(
        &self,
        document: &Path,
        page: usize,
        dpi: u32,
        grayscale_display: bool,
    ) -> RenderResult<RgbaImage> {
        let (image, _) = self.load_scaled(document, page, dpi)?;
        let image = if grayscale_display {
            image.grayscale()
        } else {
            image
        };
        Ok(image.to_rgba8())
    }
}

fn is_page_raster(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp"
            )
        })
}
