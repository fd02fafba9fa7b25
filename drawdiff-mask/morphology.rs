//! Binary morphology for mask denoising.
//!
//! Masks are grayscale rasters where any nonzero value counts as marked.
//! Erosion treats out-of-bounds neighbors as marked and dilation treats them
//! as unmarked, and dilation applies the structuring element reflected.
//! With that pairing, opening and closing are true morphological filters and
//! the open-then-close cleanup is exactly idempotent.

use image::GrayImage;
use rayon::prelude::*;

/// Set of (dx, dy) probe offsets around the anchor pixel.
pub struct StructuringElement {
    offsets: Vec<(i32, i32)>,
}

impl StructuringElement {
    /// Integer rasterization of an ellipse inscribed in a `size` x `size`
    /// box, anchored at (size/2, size/2). Size 2 yields a three-pixel
    /// L-shape, size 3 a five-pixel cross.
    pub fn elliptical(size: u32) -> Self {
        let size = size.max(1) as i64;
        let r = size / 2;
        let c = r;
        let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };

        let mut offsets = Vec::new();
        for i in 0..size {
            let dy = i - r;
            if dy.abs() > r {
                continue;
            }
            let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as i64;
            let j1 = (c - dx).max(0);
            let j2 = (c + dx + 1).min(size);
            for j in j1..j2 {
                offsets.push(((j - c) as i32, (i - r) as i32));
            }
        }
        Self { offsets }
    }

    pub fn offsets(&self) -> &[(i32, i32)] {
        &self.offsets
    }
}

/// Keep a pixel only when every probe lands on a marked pixel; probes
/// falling outside the image count as marked.
pub fn erode(mask: &GrayImage, se: &StructuringElement) -> GrayImage {
    let (w, h) = mask.dimensions();
    let mut out = GrayImage::new(w, h);
    let stride = w as usize;
    let buf: &mut [u8] = &mut out;
    buf.par_chunks_mut(stride.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.iter_mut().enumerate() {
                let mut keep = true;
                for &(dx, dy) in se.offsets() {
                    let nx = x as i64 + dx as i64;
                    let ny = y as i64 + dy as i64;
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    if mask.get_pixel(nx as u32, ny as u32).0[0] == 0 {
                        keep = false;
                        break;
                    }
                }
                *px = if keep { 255 } else { 0 };
            }
        });
    out
}

/// Mark a pixel when any reflected probe lands on a marked pixel; probes
/// falling outside the image count as unmarked.
pub fn dilate(mask: &GrayImage, se: &StructuringElement) -> GrayImage {
    let (w, h) = mask.dimensions();
    let mut out = GrayImage::new(w, h);
    let stride = w as usize;
    let buf: &mut [u8] = &mut out;
    buf.par_chunks_mut(stride.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.iter_mut().enumerate() {
                let mut hit = false;
                for &(dx, dy) in se.offsets() {
                    let nx = x as i64 - dx as i64;
                    let ny = y as i64 - dy as i64;
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    if mask.get_pixel(nx as u32, ny as u32).0[0] != 0 {
                        hit = true;
                        break;
                    }
                }
                *px = if hit { 255 } else { 0 };
            }
        });
    out
}

/// Erode then dilate: removes specks smaller than the element.
pub fn open(mask: &GrayImage, se: &StructuringElement) -> GrayImage {
    dilate(&erode(mask, se), se)
}

/// Dilate then erode: fills holes smaller than the element.
pub fn close(mask: &GrayImage, se: &StructuringElement) -> GrayImage {
    erode(&dilate(mask, se), se)
}

/// Opening followed by closing with the same element. Idempotent: cleaning
/// an already-cleaned mask changes nothing.
pub fn cleanup(mask: &GrayImage, kernel_size: u32) -> GrayImage {
    let se = StructuringElement::elliptical(kernel_size);
    close(&open(mask, &se), &se)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mask_from(marks: &[(u32, u32)], w: u32, h: u32) -> GrayImage {
        let mut mask = GrayImage::new(w, h);
        for &(x, y) in marks {
            mask.put_pixel(x, y, Luma([255u8]));
        }
        mask
    }

    #[test]
    fn elliptical_2_is_three_pixel_corner() {
        let se = StructuringElement::elliptical(2);
        let mut offsets = se.offsets().to_vec();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![(-1, 0), (0, -1), (0, 0)]);
    }

    #[test]
    fn elliptical_3_is_cross() {
        let se = StructuringElement::elliptical(3);
        let mut offsets = se.offsets().to_vec();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![(-1, 0), (0, -1), (0, 0), (0, 1), (1, 0)]);
    }

    #[test]
    fn elliptical_sizes_match_known_rasters() {
        assert_eq!(StructuringElement::elliptical(1).offsets().len(), 1);
        assert_eq!(StructuringElement::elliptical(5).offsets().len(), 21);
    }

    #[test]
    fn open_removes_isolated_speck() {
        let mask = mask_from(&[(5, 5)], 11, 11);
        let se = StructuringElement::elliptical(2);
        let opened = open(&mask, &se);
        assert!(opened.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn open_keeps_large_blob() {
        let marks: Vec<_> = (3..8).flat_map(|y| (3..8).map(move |x| (x, y))).collect();
        let mask = mask_from(&marks, 11, 11);
        let se = StructuringElement::elliptical(2);
        let opened = open(&mask, &se);
        assert!(opened.get_pixel(5, 5).0[0] != 0);
        let survivors = opened.pixels().filter(|p| p.0[0] != 0).count();
        assert!(survivors >= 20, "blob mostly survives, got {survivors}");
    }

    #[test]
    fn close_fills_interior_hole() {
        let marks: Vec<_> = (2..7)
            .flat_map(|y| (2..7).map(move |x| (x, y)))
            .filter(|&(x, y)| (x, y) != (4, 4))
            .collect();
        let mask = mask_from(&marks, 9, 9);
        let se = StructuringElement::elliptical(3);
        let closed = close(&mask, &se);
        assert!(closed.get_pixel(4, 4).0[0] != 0, "hole should be filled");
        // Nothing grows beyond the original block.
        for (x, y, p) in closed.enumerate_pixels() {
            if p.0[0] != 0 {
                assert!((2..7).contains(&x) && (2..7).contains(&y));
            }
        }
    }

    #[test]
    fn erosion_treats_border_as_marked() {
        let full = GrayImage::from_pixel(6, 6, Luma([255u8]));
        let se = StructuringElement::elliptical(3);
        assert_eq!(erode(&full, &se), full);
    }

    #[test]
    fn dilation_treats_border_as_unmarked() {
        let empty = GrayImage::new(6, 6);
        let se = StructuringElement::elliptical(3);
        assert_eq!(dilate(&empty, &se), empty);
    }

    #[test]
    fn cleanup_is_idempotent_on_mixed_mask() {
        // Specks, a blob and a notched bar in one mask.
        let mut marks = vec![(1, 1), (14, 2), (7, 13)];
        marks.extend((4..9).flat_map(|y| (4..9).map(move |x| (x, y))));
        marks.extend((11..14).map(|x| (x, 10)));
        let mask = mask_from(&marks, 16, 16);

        for kernel in [2u32, 3] {
            let once = cleanup(&mask, kernel);
            let twice = cleanup(&once, kernel);
            assert_eq!(once, twice, "kernel {kernel} not idempotent");
        }
    }
}
