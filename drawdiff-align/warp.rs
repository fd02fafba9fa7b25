//! Projective resampling of rasters into a fixed output frame.

use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use nalgebra::Matrix3;

use crate::error::{AlignError, AlignResult};

/// Build an imageproc projection from a row-major homography. Fails when the
/// matrix is singular and cannot be inverted for resampling.
pub fn projection_from(h: &Matrix3<f64>) -> AlignResult<Projection> {
    let m = [
        h[(0, 0)] as f32,
        h[(0, 1)] as f32,
        h[(0, 2)] as f32,
        h[(1, 0)] as f32,
        h[(1, 1)] as f32,
        h[(1, 2)] as f32,
        h[(2, 0)] as f32,
        h[(2, 1)] as f32,
        h[(2, 2)] as f32,
    ];
    Projection::from_matrix(m).ok_or(AlignError::HomographyFailure)
}

/// Warp a grayscale image through `h` into a `width` x `height` frame,
/// sampling bilinearly. Pixels with no source map to white, which reads as
/// empty paper in later differencing.
pub fn warp_gray(
    image: &GrayImage,
    h: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> AlignResult<GrayImage> {
    let projection = projection_from(h)?;
    let mut out = GrayImage::from_pixel(width, height, Luma([255u8]));
    warp_into(image, &projection, Interpolation::Bilinear, Luma([255u8]), &mut out);
    Ok(out)
}

/// RGBA variant of [`warp_gray`] with an opaque white fill.
pub fn warp_rgba(
    image: &RgbaImage,
    h: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> AlignResult<RgbaImage> {
    let projection = projection_from(h)?;
    let fill = Rgba([255u8, 255, 255, 255]);
    let mut out = RgbaImage::from_pixel(width, height, fill);
    warp_into(image, &projection, Interpolation::Bilinear, fill, &mut out);
    Ok(out)
}
