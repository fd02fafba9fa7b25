pub mod options;

pub use options::{CompareOptions, DetectorMethod, OptionsError};

use serde::{Deserialize, Serialize};

/// A detected interest point in base-image coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Orientation in radians, measured from the positive x axis.
    pub angle: f32,
    /// Corner response used for ranking when the keypoint cap applies.
    pub response: f32,
    /// Pyramid octave the point was detected on (0 = full resolution).
    pub octave: u32,
}

/// 256 packed binary comparisons, matched by Hamming distance.
pub type BinaryDescriptor = [u8; 32];

/// 128-dimension gradient-histogram descriptor
pub type FloatDescriptor = [f32; 128];

/// Candidate correspondence between a reference and a target keypoint.
#[derive(Debug, Clone, Copy)]
pub struct MatchPair {
    pub reference: usize,
    pub target: usize,
    pub distance: f32,
}

/// Registration statistics reported alongside the aligned raster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentStats {
    pub total_matches: usize,
    pub inliers: usize,
    pub inlier_ratio: f64,
    pub keypoints_reference: usize,
    pub keypoints_target: usize,
    pub method: String,
}

/// Per-category pixel and connected-region counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    pub missing_pixels: u64,
    pub added_pixels: u64,
    pub modified_pixels: u64,
    pub missing_regions: u32,
    pub added_regions: u32,
    pub modified_regions: u32,
}

/// Overlay palette: RGB color plus alpha per difference category.
pub const MISSING_COLOR: [u8; 3] = [255, 60, 60];
pub const ADDED_COLOR: [u8; 3] = [34, 197, 94];
pub const MODIFIED_COLOR: [u8; 3] = [59, 130, 246];
pub const OVERLAY_ALPHA: u8 = 200;

/// Size the global rayon pool before the first comparison runs.
///
/// Fails if a global pool already exists.
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}
