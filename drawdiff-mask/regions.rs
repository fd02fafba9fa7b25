//! Connected-component statistics over binary masks.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};

/// Count 8-connected regions of marked pixels. Background is excluded, so an
/// empty mask reports zero.
pub fn count_regions(mask: &GrayImage) -> u32 {
    connected_components(mask, Connectivity::Eight, Luma([0u8]))
        .pixels()
        .map(|p| p.0[0])
        .max()
        .unwrap_or(0)
}

/// Count marked pixels.
pub fn count_marked(mask: &GrayImage) -> u64 {
    mask.pixels().filter(|p| p.0[0] != 0).count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(marks: &[(u32, u32)], w: u32, h: u32) -> GrayImage {
        let mut mask = GrayImage::new(w, h);
        for &(x, y) in marks {
            mask.put_pixel(x, y, Luma([255u8]));
        }
        mask
    }

    #[test]
    fn empty_mask_has_no_regions() {
        let mask = GrayImage::new(10, 10);
        assert_eq!(count_regions(&mask), 0);
        assert_eq!(count_marked(&mask), 0);
    }

    #[test]
    fn single_blob_is_one_region() {
        let marks: Vec<_> = (2..5).flat_map(|y| (3..7).map(move |x| (x, y))).collect();
        let mask = mask_from(&marks, 10, 10);
        assert_eq!(count_regions(&mask), 1);
        assert_eq!(count_marked(&mask), 12);
    }

    #[test]
    fn diagonal_touch_counts_as_connected() {
        let mask = mask_from(&[(2, 2), (3, 3), (4, 4)], 8, 8);
        assert_eq!(count_regions(&mask), 1);
    }

    #[test]
    fn separated_blobs_count_individually() {
        let mask = mask_from(&[(1, 1), (6, 1), (1, 6), (6, 6)], 8, 8);
        assert_eq!(count_regions(&mask), 4);
        assert_eq!(count_marked(&mask), 4);
    }
}
