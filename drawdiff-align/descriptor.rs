use std::sync::OnceLock;

use drawdiff_core::{BinaryDescriptor, FloatDescriptor, Keypoint};
use image::GrayImage;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Half-size of the square patch used for orientation moments.
const ORIENTATION_RADIUS: i32 = 7;

/// Binary test patch half-extent.
const BRIEF_RADIUS: i32 = 13;

/// Spatial extent of the gradient-histogram patch (16x16 samples).
const GRID_HALF: i32 = 8;

/// Assign each keypoint an orientation from the patch intensity centroid.
pub fn assign_orientations(img: &GrayImage, kps: &mut [Keypoint]) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let data = img.as_raw();

    kps.par_iter_mut().for_each(|kp| {
        let (cx, cy) = (kp.x as i32, kp.y as i32);
        if cx - ORIENTATION_RADIUS < 0
            || cy - ORIENTATION_RADIUS < 0
            || cx + ORIENTATION_RADIUS >= w
            || cy + ORIENTATION_RADIUS >= h
        {
            kp.angle = 0.0;
            return;
        }

        let mut m10 = 0i64;
        let mut m01 = 0i64;
        for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            let row = ((cy + dy) * w) as usize;
            for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
                let val = data[row + (cx + dx) as usize] as i64;
                m10 += dx as i64 * val;
                m01 += dy as i64 * val;
            }
        }
        kp.angle = (m01 as f32).atan2(m10 as f32);
    });
}

/// Subpixel read via bilinear interpolation, clamped to the image bounds.
fn bilinear_sample(img: &GrayImage, x: f32, y: f32) -> f32 {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let data = img.as_raw();

    let x0 = x.floor();
    let y0 = y.floor();
    if x0 < 0.0 || y0 < 0.0 || x0 + 1.0 >= w as f32 || y0 + 1.0 >= h as f32 {
        let cx = x.round().clamp(0.0, (w - 1) as f32) as usize;
        let cy = y.round().clamp(0.0, (h - 1) as f32) as usize;
        return data[cy * w + cx] as f32;
    }

    let dx = x - x0;
    let dy = y - y0;
    let xi = x0 as usize;
    let yi = y0 as usize;

    let p00 = data[yi * w + xi] as f32;
    let p10 = data[yi * w + xi + 1] as f32;
    let p01 = data[(yi + 1) * w + xi] as f32;
    let p11 = data[(yi + 1) * w + xi + 1] as f32;

    let top = p00 * (1.0 - dx) + p10 * dx;
    let bottom = p01 * (1.0 - dx) + p11 * dx;
    top * (1.0 - dy) + bottom * dy
}

/// 256 fixed sampling pairs for the binary descriptor, drawn once from a
/// seeded generator so every run uses the same pattern.
fn sampling_pairs() -> &'static [(i8, i8, i8, i8); 256] {
    static PAIRS: OnceLock<[(i8, i8, i8, i8); 256]> = OnceLock::new();
    PAIRS.get_or_init(|| {
        let mut rng = ChaCha8Rng::seed_from_u64(0xb41f);
        let mut pairs = [(0i8, 0i8, 0i8, 0i8); 256];
        for pair in pairs.iter_mut() {
            *pair = (
                rng.random_range(-BRIEF_RADIUS..=BRIEF_RADIUS) as i8,
                rng.random_range(-BRIEF_RADIUS..=BRIEF_RADIUS) as i8,
                rng.random_range(-BRIEF_RADIUS..=BRIEF_RADIUS) as i8,
                rng.random_range(-BRIEF_RADIUS..=BRIEF_RADIUS) as i8,
            );
        }
        pairs
    })
}

/// Oriented 256-bit binary descriptors over intensity comparisons.
pub fn binary_descriptors(img: &GrayImage, kps: &[Keypoint]) -> Vec<BinaryDescriptor> {
    let pairs = sampling_pairs();
    kps.par_iter()
        .map(|kp| {
            let (s, c) = kp.angle.sin_cos();
            let (cx, cy) = (kp.x, kp.y);
            let mut d = [0u8; 32];

            for (i, &(dx1, dy1, dx2, dy2)) in pairs.iter().enumerate() {
                // Rotate the test pair into the keypoint frame.
                let (rx1, ry1) = (
                    cx + c * dx1 as f32 - s * dy1 as f32,
                    cy + s * dx1 as f32 + c * dy1 as f32,
                );
                let (rx2, ry2) = (
                    cx + c * dx2 as f32 - s * dy2 as f32,
                    cy + s * dx2 as f32 + c * dy2 as f32,
                );

                let val1 = bilinear_sample(img, rx1, ry1);
                let val2 = bilinear_sample(img, rx2, ry2);

                let bit = (val1 < val2) as u8;
                d[i / 8] |= bit << (i % 8);
            }
            d
        })
        .collect()
}

/// 128-d gradient-histogram descriptors: a 16x16 oriented patch pooled into
/// 4x4 spatial cells with 8 orientation bins, normalized and clipped at 0.2
/// to soften illumination changes.
pub fn float_descriptors(img: &GrayImage, kps: &[Keypoint]) -> Vec<FloatDescriptor> {
    kps.par_iter()
        .map(|kp| describe_float(img, kp))
        .collect()
}

fn describe_float(img: &GrayImage, kp: &Keypoint) -> FloatDescriptor {
    let (s, c) = kp.angle.sin_cos();
    let mut hist = [0f32; 128];
    // Gaussian falloff over the patch, sigma = half the patch extent.
    let sigma2 = (GRID_HALF * GRID_HALF) as f32;

    for j in -GRID_HALF..GRID_HALF {
        for i in -GRID_HALF..GRID_HALF {
            let u = i as f32 + 0.5;
            let v = j as f32 + 0.5;
            let px = kp.x + c * u - s * v;
            let py = kp.y + s * u + c * v;

            let gx = bilinear_sample(img, px + 1.0, py) - bilinear_sample(img, px - 1.0, py);
            let gy = bilinear_sample(img, px, py + 1.0) - bilinear_sample(img, px, py - 1.0);

            // Rotate the gradient back into the keypoint frame.
            let rgx = c * gx + s * gy;
            let rgy = -s * gx + c * gy;

            let magnitude = (rgx * rgx + rgy * rgy).sqrt();
            if magnitude == 0.0 {
                continue;
            }
            let weight = (-(u * u + v * v) / (2.0 * sigma2)).exp();

            let cell_x = ((i + GRID_HALF) / 4) as usize;
            let cell_y = ((j + GRID_HALF) / 4) as usize;
            let theta = rgy.atan2(rgx);
            let bin = ((theta + std::f32::consts::PI) / (2.0 * std::f32::consts::PI) * 8.0)
                as usize
                % 8;

            hist[(cell_y * 4 + cell_x) * 8 + bin] += magnitude * weight;
        }
    }

    normalize_descriptor(&mut hist);
    hist
}

/// L2-normalize, clip large components, renormalize.
fn normalize_descriptor(hist: &mut [f32; 128]) {
    let norm = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in hist.iter_mut() {
            *v = (*v / norm).min(0.2);
        }
    }
    let norm = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in hist.iter_mut() {
            *v /= norm;
        }
    }
}
