//! Tile pyramid generation for comparison output rasters.
//!
//! Cuts a full-page raster, base image or combined difference overlay, into
//! multi-resolution tile pyramids for streaming viewers. Two layouts are
//! supported: Deep Zoom (DZI) trees for OpenSeadragon and slippy-map XYZ
//! trees for Leaflet-style clients.

pub mod encode;
pub mod error;
pub mod manifest;
pub mod writer;

pub use encode::{JPEG_QUALITY, TileFormat, encode_tile};
pub use error::{TileError, TileResult};
pub use manifest::dzi_manifest;
pub use writer::{write_dzi, write_xyz};

use drawdiff_mask::combine_overlays;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use tracing::debug;

/// Default edge length of a square tile.
pub const DEFAULT_TILE_SIZE: u32 = 256;
/// Default pixel ring shared between neighbouring deep-zoom tiles.
pub const DEFAULT_OVERLAP: u32 = 1;

/// One cropped tile with its grid position within the level.
#[derive(Debug, Clone)]
pub struct Tile {
    pub col: u32,
    pub row: u32,
    pub image: DynamicImage,
}

/// All tiles of one pyramid level.
#[derive(Debug, Clone)]
pub struct TileLevel {
    /// Deep-zoom level number or XYZ zoom; the finest level is the largest.
    pub level: u32,
    pub width: u32,
    pub height: u32,
    pub tiles: Vec<Tile>,
}

/// Complete pyramid with its tiling parameters, levels ordered coarsest to
/// finest. The finest level always matches the source raster pixel for
/// pixel; resampling only ever happens on the way down.
#[derive(Debug, Clone)]
pub struct TilePyramid {
    pub levels: Vec<TileLevel>,
    /// Full-resolution raster dimensions.
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub overlap: u32,
    pub format: TileFormat,
}

impl TilePyramid {
    /// Deep-zoom XML descriptor for this pyramid.
    pub fn dzi_manifest(&self) -> String {
        manifest::dzi_manifest(
            self.width,
            self.height,
            self.tile_size,
            self.overlap,
            self.format,
        )
    }

    pub fn tile_count(&self) -> usize {
        self.levels.iter().map(|level| level.tiles.len()).sum()
    }
}

/// Number of the finest deep-zoom level: one more than the halvings needed
/// to fit the longer raster edge into a single tile.
pub fn dzi_max_level(width: u32, height: u32, tile_size: u32) -> u32 {
    let max_dim = width.max(height).max(1) as f64;
    let raw = (max_dim / tile_size as f64).log2().ceil() as i64 + 1;
    raw.max(0) as u32
}

/// Natural XYZ zoom depth: zoom 0 is the first level that fits in one tile.
pub fn xyz_max_zoom(width: u32, height: u32, tile_size: u32) -> u32 {
    let max_dim = width.max(height).max(1) as f64;
    ((max_dim / tile_size as f64).log2().ceil() as i64).max(0) as u32
}

/// Pyramid builder carrying the tiling parameters.
#[derive(Debug, Clone, Copy)]
pub struct TilePyramidBuilder {
    tile_size: u32,
    overlap: u32,
    format: TileFormat,
}

impl Default for TilePyramidBuilder {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            overlap: DEFAULT_OVERLAP,
            format: TileFormat::Png,
        }
    }
}

impl TilePyramidBuilder {
    pub fn new(tile_size: u32, overlap: u32, format: TileFormat) -> TileResult<Self> {
        if tile_size == 0 {
            return Err(TileError::ZeroTileSize);
        }
        Ok(Self {
            tile_size,
            overlap,
            format,
        })
    }

    /// Cut `image` into a deep-zoom pyramid.
    ///
    /// Levels run from 0 (coarsest) up to [`dzi_max_level`] (full
    /// resolution); each level halves the next one's dimensions, rounding
    /// up. Tiles are `tile_size` square plus `overlap` pixels on edges
    /// shared with a neighbour, clipped at the raster border.
    pub fn build_pyramid(&self, image: &DynamicImage) -> TileResult<TilePyramid> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(TileError::EmptyImage { width, height });
        }

        let max_level = dzi_max_level(width, height, self.tile_size);
        let mut levels = Vec::with_capacity(max_level as usize + 1);
        for level in 0..=max_level {
            let scale = 1u64 << (max_level - level);
            let level_width = ((width as u64).div_ceil(scale)) as u32;
            let level_height = ((height as u64).div_ceil(scale)) as u32;
            let resampled;
            let source = if scale == 1 {
                image
            } else {
                resampled = image.resize_exact(level_width, level_height, FilterType::Lanczos3);
                &resampled
            };
            levels.push(self.cut_level(source, level, self.overlap));
        }

        debug!(
            width,
            height,
            levels = levels.len(),
            tile_size = self.tile_size,
            "deep-zoom pyramid built"
        );
        Ok(TilePyramid {
            levels,
            width,
            height,
            tile_size: self.tile_size,
            overlap: self.overlap,
            format: self.format,
        })
    }

    /// Cut `image` into a slippy-map XYZ pyramid with zooms `0..=max_zoom`.
    ///
    /// Zoom `max_zoom` is the full-resolution raster; each lower zoom
    /// halves the dimensions with truncation, and zooms whose width or
    /// height truncates to zero are skipped. XYZ tiles carry no overlap.
    pub fn build_xyz_pyramid(
        &self,
        image: &DynamicImage,
        max_zoom: u32,
    ) -> TileResult<TilePyramid> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(TileError::EmptyImage { width, height });
        }

        let mut levels = Vec::with_capacity(max_zoom as usize + 1);
        for zoom in 0..=max_zoom {
            let down = 1u64 << (max_zoom - zoom);
            let zoom_width = (width as u64 / down) as u32;
            let zoom_height = (height as u64 / down) as u32;
            if zoom_width == 0 || zoom_height == 0 {
                debug!(zoom, "zoom level smaller than a pixel, skipped");
                continue;
            }
            let resampled;
            let source = if down == 1 {
                image
            } else {
                resampled = image.resize_exact(zoom_width, zoom_height, FilterType::Lanczos3);
                &resampled
            };
            levels.push(self.cut_level(source, zoom, 0));
        }

        debug!(
            width,
            height,
            levels = levels.len(),
            max_zoom,
            "xyz pyramid built"
        );
        Ok(TilePyramid {
            levels,
            width,
            height,
            tile_size: self.tile_size,
            overlap: 0,
            format: self.format,
        })
    }

    /// Composite the three category overlays and tile the result.
    ///
    /// Layers stack modified, added, missing from bottom to top so removed
    /// content is never painted over, and the output format is forced to
    /// PNG to keep the transparency that overlay viewers rely on.
    pub fn build_overlay_pyramid(
        &self,
        missing: &RgbaImage,
        added: &RgbaImage,
        modified: &RgbaImage,
    ) -> TileResult<TilePyramid> {
        let combined = combine_overlays(&[modified, added, missing])?;
        let builder = Self {
            format: TileFormat::Png,
            ..*self
        };
        builder.build_pyramid(&DynamicImage::ImageRgba8(combined))
    }

    fn cut_level(&self, level_image: &DynamicImage, level: u32, overlap: u32) -> TileLevel {
        let (level_width, level_height) = (level_image.width(), level_image.height());
        let cols = level_width.div_ceil(self.tile_size);
        let rows = level_height.div_ceil(self.tile_size);
        let mut tiles = Vec::with_capacity((cols * rows) as usize);

        for row in 0..rows {
            for col in 0..cols {
                let left = col * self.tile_size;
                let top = row * self.tile_size;
                let right = (left + self.tile_size + overlap).min(level_width);
                let bottom = (top + self.tile_size + overlap).min(level_height);
                let image = level_image.crop_imm(left, top, right - left, bottom - top);
                tiles.push(Tile { col, row, image });
            }
        }

        TileLevel {
            level,
            width: level_width,
            height: level_height,
            tiles,
        }
    }
}
