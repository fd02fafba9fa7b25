use drawdiff_core::Keypoint;
use image::GrayImage;
use rayon::prelude::*;

/// FAST test ring: 16-point Bresenham circle of radius 3.
const RING: [(i32, i32); 16] = [
    (-3, 0),
    (-3, 1),
    (-2, 2),
    (-1, 3),
    (0, 3),
    (1, 3),
    (2, 2),
    (3, 1),
    (3, 0),
    (3, -1),
    (2, -2),
    (1, -3),
    (0, -3),
    (-1, -3),
    (-2, -2),
    (-3, -1),
];

/// Contiguous ring pixels required to call a corner. Nine covers right-angle
/// corners, which subtend just under 12 ring pixels and would otherwise be
/// missed on clean line drawings.
const MIN_ARC: usize = 9;

/// Check for `min_count` consecutive set bits in a circular 16-bit mask.
fn has_consecutive_bits(mask: u16, min_count: usize) -> bool {
    if mask == 0 {
        return false;
    }
    let mut test_mask = mask;
    for i in 1..min_count {
        let shifted = (mask << i) | (mask >> (16 - i));
        test_mask &= shifted;
        if test_mask == 0 {
            return false;
        }
    }
    test_mask != 0
}

/// Segment-test corner detector over a single pyramid octave.
pub struct CornerDetector {
    threshold: u8,
}

impl CornerDetector {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    /// Detect corners with non-maximum suppression over a 3x3 neighborhood.
    ///
    /// Returned keypoints carry octave-local coordinates; the caller maps them
    /// to base-image coordinates. Angles are left at zero for the descriptor
    /// stage to fill in.
    pub fn detect(&self, img: &GrayImage, octave: u32) -> Vec<Keypoint> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        if w < 7 || h < 7 {
            return Vec::new();
        }

        let data = img.as_raw();
        let threshold = self.threshold;

        // Per-pixel corner responses; zero means "not a corner".
        let mut responses = vec![0f32; w * h];
        responses
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| {
                if y < 3 || y >= h - 3 {
                    return;
                }
                for x in 3..w - 3 {
                    let p = data[y * w + x];
                    let mut bright_mask = 0u16;
                    let mut dark_mask = 0u16;
                    let mut bright_sum = 0i32;
                    let mut dark_sum = 0i32;

                    for (i, &(dx, dy)) in RING.iter().enumerate() {
                        let q = data[(y as i32 + dy) as usize * w + (x as i32 + dx) as usize];
                        if q >= p.saturating_add(threshold) {
                            bright_mask |= 1 << i;
                            bright_sum += q as i32 - p as i32;
                        } else if q.saturating_add(threshold) <= p {
                            dark_mask |= 1 << i;
                            dark_sum += p as i32 - q as i32;
                        }
                    }

                    let bright = has_consecutive_bits(bright_mask, MIN_ARC);
                    let dark = has_consecutive_bits(dark_mask, MIN_ARC);
                    if bright || dark {
                        // Response: total contrast over the stronger polarity.
                        row[x] = if bright_sum >= dark_sum {
                            bright_sum as f32
                        } else {
                            dark_sum as f32
                        };
                    }
                }
            });

        self.local_maxima(&responses, w, h, octave)
    }

    /// Keep responses that dominate their 3x3 neighborhood. Plateaus of equal
    /// response keep the lexicographically first pixel so detection stays
    /// deterministic on synthetic inputs.
    fn local_maxima(&self, responses: &[f32], w: usize, h: usize, octave: u32) -> Vec<Keypoint> {
        (3..h.saturating_sub(3))
            .into_par_iter()
            .flat_map_iter(|y| {
                let mut row_points = Vec::new();
                for x in 3..w - 3 {
                    let r = responses[y * w + x];
                    if r <= 0.0 {
                        continue;
                    }
                    let mut is_max = true;
                    'search: for dy in -1i32..=1 {
                        for dx in -1i32..=1 {
                            if dx == 0 && dy == 0 {
                                continue;
                            }
                            let nx = (x as i32 + dx) as usize;
                            let ny = (y as i32 + dy) as usize;
                            let rn = responses[ny * w + nx];
                            if rn > r || (rn == r && (ny, nx) < (y, x)) {
                                is_max = false;
                                break 'search;
                            }
                        }
                    }
                    if is_max {
                        row_points.push(Keypoint {
                            x: x as f32,
                            y: y as f32,
                            angle: 0.0,
                            response: r,
                            octave,
                        });
                    }
                }
                row_points
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blank(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255]))
    }

    fn with_square(mut img: GrayImage, x0: u32, y0: u32, size: u32, value: u8) -> GrayImage {
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                img.put_pixel(x, y, Luma([value]));
            }
        }
        img
    }

    #[test]
    fn consecutive_bit_test_wraps_around() {
        // Bits 12..16 plus 0..5 form a run of 9 crossing the seam.
        let mut mask = 0u16;
        for i in 12..16 {
            mask |= 1 << i;
        }
        for i in 0..5 {
            mask |= 1 << i;
        }
        assert!(has_consecutive_bits(mask, 9));
        assert!(!has_consecutive_bits(mask, 10));
        assert!(!has_consecutive_bits(0b0101_0101_0101_0101, 2));
    }

    #[test]
    fn blank_image_has_no_corners() {
        let detector = CornerDetector::new(25);
        assert!(detector.detect(&blank(64, 64), 0).is_empty());
    }

    #[test]
    fn square_corners_are_detected() {
        let img = with_square(blank(64, 64), 20, 20, 20, 0);
        let detector = CornerDetector::new(25);
        let kps = detector.detect(&img, 0);
        assert!(!kps.is_empty());
        // Every detection sits near one of the four square corners.
        let corners = [(20.0, 20.0), (39.0, 20.0), (20.0, 39.0), (39.0, 39.0)];
        for kp in &kps {
            let near = corners.iter().any(|&(cx, cy): &(f32, f32)| {
                (kp.x - cx).abs() <= 4.0 && (kp.y - cy).abs() <= 4.0
            });
            assert!(near, "keypoint at ({}, {}) far from any corner", kp.x, kp.y);
        }
    }

    #[test]
    fn detection_respects_octave_tag() {
        let img = with_square(blank(64, 64), 10, 10, 24, 10);
        let detector = CornerDetector::new(25);
        let kps = detector.detect(&img, 3);
        assert!(kps.iter().all(|kp| kp.octave == 3));
    }

    #[test]
    fn tiny_image_yields_nothing() {
        let detector = CornerDetector::new(25);
        assert!(detector.detect(&blank(6, 6), 0).is_empty());
    }
}
