//! Tile encoding into in-memory PNG and JPEG buffers.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};

use crate::error::TileResult;

/// Baseline JPEG quality for opaque base-image tiles.
pub const JPEG_QUALITY: u8 = 90;

/// On-disk tile encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    /// Lossless and keeps the alpha channel; required for overlay tiles.
    Png,
    /// Lossy, alpha is dropped; suited to opaque page rasters.
    Jpeg,
}

impl TileFormat {
    /// File extension without the dot, also the manifest `Format` value.
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
        }
    }
}

/// Encode one tile. Grayscale tiles stay single-channel in PNG output;
/// anything else keeps its alpha. JPEG output flattens to RGB.
pub fn encode_tile(image: &DynamicImage, format: TileFormat) -> TileResult<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        TileFormat::Png => {
            let encoder = PngEncoder::new(&mut buffer);
            match image {
                DynamicImage::ImageLuma8(gray) => encoder.write_image(
                    gray.as_raw(),
                    gray.width(),
                    gray.height(),
                    ExtendedColorType::L8,
                )?,
                DynamicImage::ImageRgba8(rgba) => encoder.write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    ExtendedColorType::Rgba8,
                )?,
                other => {
                    let rgba = other.to_rgba8();
                    encoder.write_image(
                        rgba.as_raw(),
                        rgba.width(),
                        rgba.height(),
                        ExtendedColorType::Rgba8,
                    )?;
                }
            }
        }
        TileFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )?;
        }
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn png_round_trips_transparency() {
        let mut tile = RgbaImage::new(8, 8);
        tile.put_pixel(3, 4, Rgba([255u8, 60, 60, 200]));
        let bytes = encode_tile(&DynamicImage::ImageRgba8(tile), TileFormat::Png).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(3, 4), &Rgba([255u8, 60, 60, 200]));
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn grayscale_png_stays_single_channel() {
        let tile = DynamicImage::new_luma8(16, 16);
        let bytes = encode_tile(&tile, TileFormat::Png).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert!(matches!(decoded, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn jpeg_produces_a_decodable_opaque_tile() {
        let tile = DynamicImage::new_luma8(32, 24);
        let bytes = encode_tile(&tile, TileFormat::Jpeg).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn extensions_match_manifest_names() {
        assert_eq!(TileFormat::Png.extension(), "png");
        assert_eq!(TileFormat::Jpeg.extension(), "jpg");
    }
}
