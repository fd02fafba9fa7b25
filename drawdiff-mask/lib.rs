//! Classification of pixel differences between registered drawing rasters.
//!
//! Compares a reference page against an already-aligned target and sorts
//! every changed pixel into one of three categories: content missing from
//! the target, content added in the target, and content structurally
//! modified in place. Each category comes back as a binary mask plus pixel
//! and region counts.

pub mod error;
pub mod morphology;
pub mod overlay;
pub mod regions;
pub mod ssim;

pub use error::{MaskError, MaskResult};
pub use overlay::{combine_overlays, mask_to_overlay};

use drawdiff_core::{
    ADDED_COLOR, CompareOptions, DiffStats, MISSING_COLOR, MODIFIED_COLOR, OVERLAY_ALPHA,
};
use image::{GrayImage, RgbaImage};
use tracing::debug;

/// Both images at or above this value are blank paper; such pixels are never
/// structurally compared.
pub const WHITE_CUTOFF: u8 = 250;
/// Cleanup kernel for the subtraction masks.
pub const SUBTRACTION_KERNEL: u32 = 2;
/// Cleanup kernel for the structural mask, which is noisier.
pub const STRUCTURAL_KERNEL: u32 = 3;
/// Smallest SSIM window worth computing.
const MIN_SSIM_WINDOW: u32 = 3;

/// Classified difference masks with their statistics. Masks are grayscale
/// rasters, 255 marked / 0 clear, at the reference resolution.
#[derive(Debug, Clone)]
pub struct DifferenceResult {
    /// Content present in the reference but gone from the target.
    pub missing: GrayImage,
    /// Content present in the target but not in the reference.
    pub added: GrayImage,
    /// Content present in both but structurally changed.
    pub modified: GrayImage,
    pub stats: DiffStats,
}

impl DifferenceResult {
    /// Palette overlays in category order: missing, added, modified.
    /// Compositing stacks them the other way round, with missing on top
    /// so removed content is never painted over.
    pub fn overlays(&self) -> [RgbaImage; 3] {
        [
            mask_to_overlay(&self.missing, MISSING_COLOR, OVERLAY_ALPHA),
            mask_to_overlay(&self.added, ADDED_COLOR, OVERLAY_ALPHA),
            mask_to_overlay(&self.modified, MODIFIED_COLOR, OVERLAY_ALPHA),
        ]
    }
}

/// Threshold configuration for one classification run.
pub struct DifferenceClassifier {
    intensity_threshold: u8,
    structural_threshold: f64,
}

impl DifferenceClassifier {
    pub fn new(intensity_threshold: u8, structural_threshold: f64) -> MaskResult<Self> {
        if intensity_threshold == 0 || intensity_threshold > 100 {
            return Err(MaskError::InvalidIntensityThreshold(intensity_threshold));
        }
        if !(structural_threshold > 0.0 && structural_threshold < 1.0) {
            return Err(MaskError::InvalidStructuralThreshold(structural_threshold));
        }
        Ok(Self {
            intensity_threshold,
            structural_threshold,
        })
    }

    pub fn from_options(options: &CompareOptions) -> MaskResult<Self> {
        Self::new(options.intensity_threshold, options.structural_threshold)
    }

    /// Classify differences between a reference and an aligned target of the
    /// same dimensions.
    pub fn classify(
        &self,
        reference: &GrayImage,
        target: &GrayImage,
    ) -> MaskResult<DifferenceResult> {
        let (width, height) = reference.dimensions();
        if target.dimensions() != (width, height) {
            let (target_width, target_height) = target.dimensions();
            return Err(MaskError::ShapeMismatch {
                reference_width: width,
                reference_height: height,
                target_width,
                target_height,
            });
        }

        // Ink is dark: a target pixel lighter than the reference lost
        // content, a darker one gained it.
        let missing = signed_excess(target, reference, self.intensity_threshold);
        let added = signed_excess(reference, target, self.intensity_threshold);
        let modified = self.structural_mask(reference, target);

        let missing = morphology::cleanup(&missing, SUBTRACTION_KERNEL);
        let added = morphology::cleanup(&added, SUBTRACTION_KERNEL);
        let modified = morphology::cleanup(&modified, STRUCTURAL_KERNEL);

        // Intensity categories win; modified keeps only what they left.
        let modified = and_not(&modified, &missing, &added);

        let stats = DiffStats {
            missing_pixels: regions::count_marked(&missing),
            added_pixels: regions::count_marked(&added),
            modified_pixels: regions::count_marked(&modified),
            missing_regions: regions::count_regions(&missing),
            added_regions: regions::count_regions(&added),
            modified_regions: regions::count_regions(&modified),
        };
        debug!(
            missing = stats.missing_pixels,
            added = stats.added_pixels,
            modified = stats.modified_pixels,
            "classified differences"
        );

        Ok(DifferenceResult {
            missing,
            added,
            modified,
            stats,
        })
    }

    fn structural_mask(&self, reference: &GrayImage, target: &GrayImage) -> GrayImage {
        let (width, height) = reference.dimensions();
        let window = ssim::pick_window(width, height);
        if window < MIN_SSIM_WINDOW {
            return GrayImage::new(width, height);
        }

        let map = ssim::ssim_map(reference, target, window);
        let cutoff = 1.0 - self.structural_threshold;
        let mut mask = GrayImage::new(width, height);
        for (i, p) in mask.pixels_mut().enumerate() {
            let x = (i as u32) % width;
            let y = (i as u32) / width;
            let blank = reference.get_pixel(x, y).0[0] >= WHITE_CUTOFF
                && target.get_pixel(x, y).0[0] >= WHITE_CUTOFF;
            if !blank && 1.0 - map[i] > cutoff {
                p.0[0] = 255;
            }
        }
        mask
    }
}

/// Marked where `a - b > threshold` in signed arithmetic.
fn signed_excess(a: &GrayImage, b: &GrayImage, threshold: u8) -> GrayImage {
    let mut mask = GrayImage::new(a.width(), a.height());
    for ((pa, pb), out) in a.pixels().zip(b.pixels()).zip(mask.pixels_mut()) {
        if pa.0[0] as i16 - pb.0[0] as i16 > threshold as i16 {
            out.0[0] = 255;
        }
    }
    mask
}

/// `base AND NOT (first OR second)`, pixelwise.
fn and_not(base: &GrayImage, first: &GrayImage, second: &GrayImage) -> GrayImage {
    let mut out = base.clone();
    for ((p, a), b) in out.pixels_mut().zip(first.pixels()).zip(second.pixels()) {
        if a.0[0] != 0 || b.0[0] != 0 {
            p.0[0] = 0;
        }
    }
    out
}
