//! RGBA overlay rendering for difference masks.

use image::{GrayImage, Rgba, RgbaImage};

use crate::error::{MaskError, MaskResult};

/// Paint marked pixels with `color` at `alpha`; unmarked pixels stay fully
/// transparent.
pub fn mask_to_overlay(mask: &GrayImage, color: [u8; 3], alpha: u8) -> RgbaImage {
    RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y).0[0] != 0 {
            Rgba([color[0], color[1], color[2], alpha])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// Flatten overlays onto a transparent canvas, bottom-to-top. Every layer,
/// the bottom one included, mixes its color in by its own alpha while the
/// output alpha takes the channel-wise maximum; this is the pipeline's
/// historical compositing rule, not the standard "over" operator, and
/// viewers depend on its output.
pub fn combine_overlays(overlays: &[&RgbaImage]) -> MaskResult<RgbaImage> {
    let first = overlays.first().ok_or(MaskError::NoOverlays)?;
    let (width, height) = first.dimensions();
    let mut out = RgbaImage::new(width, height);

    for overlay in overlays {
        if overlay.dimensions() != (width, height) {
            let (got_width, got_height) = overlay.dimensions();
            return Err(MaskError::OverlayShapeMismatch {
                expected_width: width,
                expected_height: height,
                got_width,
                got_height,
            });
        }
        for (bottom, top) in out.pixels_mut().zip(overlay.pixels()) {
            let ta = top.0[3] as f32 / 255.0;
            for c in 0..3 {
                let mixed = bottom.0[c] as f32 * (1.0 - ta) + top.0[c] as f32 * ta;
                bottom.0[c] = mixed as u8;
            }
            bottom.0[3] = bottom.0[3].max(top.0[3]);
        }
    }
    Ok(out)
}
