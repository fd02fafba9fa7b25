//! Feature-based registration of engineering drawing rasters.
//!
//! Detects corners on both images, describes and matches them, estimates a
//! robust homography from the surviving correspondences, and resamples the
//! target into the reference frame so later differencing compares pixels
//! that depict the same paper location.

pub mod descriptor;
pub mod detect;
pub mod error;
pub mod homography;
pub mod matching;
pub mod pyramid;
pub mod ransac;
pub mod warp;

pub use error::{AlignError, AlignResult};
pub use ransac::{RansacConfig, RansacResult};

use drawdiff_core::{
    AlignmentStats, BinaryDescriptor, CompareOptions, DetectorMethod, FloatDescriptor, Keypoint,
};
use image::{GrayImage, RgbaImage, imageops};
use nalgebra::Matrix3;
use tracing::{debug, info};

use crate::detect::CornerDetector;
use crate::pyramid::GaussianPyramid;

/// Fewest keypoints per image worth attempting to match.
pub const MIN_KEYPOINTS: usize = 10;
/// Fewest ratio-test survivors worth fitting a homography to.
pub const MIN_MATCHES: usize = 10;
/// Best-to-second-best distance ratio below which a match is distinctive.
pub const LOWE_RATIO: f32 = 0.75;
/// Octaves searched by the scale-invariant detector.
pub const MAX_OCTAVES: usize = 4;
/// Corner detection needs a 3-pixel ring inside the image.
const MIN_IMAGE_DIM: u32 = 7;
/// Tree-search budget per query; exact matches are found on the first
/// descent, the budget only bounds how hard the second neighbor is refined.
const MATCH_CHECKS: usize = 192;

/// Descriptor sets produced by one detector configuration.
enum Descriptors {
    Float(Vec<FloatDescriptor>),
    Binary(Vec<BinaryDescriptor>),
}

/// Homography and match statistics without any resampled raster.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Maps target coordinates into the reference frame.
    pub homography: Matrix3<f64>,
    pub stats: AlignmentStats,
}

/// Grayscale registration result.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Target resampled into the reference frame, white where no source
    /// pixel maps.
    pub aligned: GrayImage,
    pub homography: Matrix3<f64>,
    pub stats: AlignmentStats,
}

/// Color registration result; matching ran on grayscale versions.
#[derive(Debug, Clone)]
pub struct ColorRegistration {
    pub aligned: RgbaImage,
    pub homography: Matrix3<f64>,
    pub stats: AlignmentStats,
}

/// Detects, describes, matches and robustly fits in one call.
pub struct FeatureRegistrar {
    method: DetectorMethod,
    max_keypoints: usize,
    corner_threshold: u8,
    ransac: RansacConfig,
}

impl Default for FeatureRegistrar {
    fn default() -> Self {
        Self::new(DetectorMethod::Float)
    }
}

impl FeatureRegistrar {
    pub fn new(method: DetectorMethod) -> Self {
        let mut registrar = Self::from_options(&CompareOptions::default());
        registrar.method = method;
        registrar
    }

    pub fn from_options(options: &CompareOptions) -> Self {
        Self {
            method: options.detector,
            max_keypoints: options.max_keypoints,
            corner_threshold: options.corner_threshold,
            ransac: RansacConfig {
                seed: options.ransac_seed,
                ..RansacConfig::default()
            },
        }
    }

    /// Fix the estimator seed for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.ransac.seed = Some(seed);
        self
    }

    /// Estimate the homography mapping `target` onto `reference` without
    /// resampling anything. Callers that need both a grayscale and a color
    /// warp run this once and resample each raster themselves.
    pub fn estimate(&self, reference: &GrayImage, target: &GrayImage) -> AlignResult<Alignment> {
        for img in [reference, target] {
            let (width, height) = img.dimensions();
            if width < MIN_IMAGE_DIM || height < MIN_IMAGE_DIM {
                return Err(AlignError::ImageTooSmall { width, height });
            }
        }

        let (ref_kps, ref_descs) = self.detect_and_describe(reference);
        let (tgt_kps, tgt_descs) = self.detect_and_describe(target);
        debug!(
            reference = ref_kps.len(),
            target = tgt_kps.len(),
            method = self.method.name(),
            "detected keypoints"
        );

        if ref_kps.len() < MIN_KEYPOINTS {
            return Err(AlignError::InsufficientFeatures {
                image: "reference",
                keypoints: ref_kps.len(),
                min: MIN_KEYPOINTS,
            });
        }
        if tgt_kps.len() < MIN_KEYPOINTS {
            return Err(AlignError::InsufficientFeatures {
                image: "target",
                keypoints: tgt_kps.len(),
                min: MIN_KEYPOINTS,
            });
        }

        let matches = match (&ref_descs, &tgt_descs) {
            (Descriptors::Float(r), Descriptors::Float(t)) => {
                matching::match_float(r, t, LOWE_RATIO, MATCH_CHECKS)
            }
            (Descriptors::Binary(r), Descriptors::Binary(t)) => {
                matching::match_binary(r, t, LOWE_RATIO)
            }
            // detect_and_describe produces the configured kind on both sides.
            _ => unreachable!("descriptor kinds follow the configured method"),
        };
        if matches.len() < MIN_MATCHES {
            return Err(AlignError::InsufficientMatches {
                matches: matches.len(),
                min: MIN_MATCHES,
            });
        }

        // Fit target positions onto reference positions so the homography
        // maps target coordinates into the reference frame.
        let src: Vec<(f64, f64)> = matches
            .iter()
            .map(|m| {
                let kp = &tgt_kps[m.target];
                (kp.x as f64, kp.y as f64)
            })
            .collect();
        let dst: Vec<(f64, f64)> = matches
            .iter()
            .map(|m| {
                let kp = &ref_kps[m.reference];
                (kp.x as f64, kp.y as f64)
            })
            .collect();

        let result = ransac::estimate_projective(&src, &dst, &self.ransac)
            .ok_or(AlignError::HomographyFailure)?;

        let stats = AlignmentStats {
            total_matches: matches.len(),
            inliers: result.inliers,
            inlier_ratio: result.inliers as f64 / matches.len() as f64,
            keypoints_reference: ref_kps.len(),
            keypoints_target: tgt_kps.len(),
            method: self.method.name().to_string(),
        };
        info!(
            matches = stats.total_matches,
            inliers = stats.inliers,
            iterations = result.iterations,
            "homography estimated"
        );

        Ok(Alignment {
            homography: result.homography,
            stats,
        })
    }

    /// Register `target` onto `reference` and return the resampled raster.
    pub fn register(&self, reference: &GrayImage, target: &GrayImage) -> AlignResult<Registration> {
        let alignment = self.estimate(reference, target)?;
        let (width, height) = reference.dimensions();
        let aligned = warp::warp_gray(target, &alignment.homography, width, height)?;
        Ok(Registration {
            aligned,
            homography: alignment.homography,
            stats: alignment.stats,
        })
    }

    /// Color variant: match and fit on grayscale versions, then resample the
    /// color raster so display output keeps revision clouds and stamps.
    pub fn register_color(
        &self,
        reference: &RgbaImage,
        target: &RgbaImage,
    ) -> AlignResult<ColorRegistration> {
        let reference_gray = imageops::grayscale(reference);
        let target_gray = imageops::grayscale(target);
        let alignment = self.estimate(&reference_gray, &target_gray)?;
        let (width, height) = reference.dimensions();
        let aligned = warp::warp_rgba(target, &alignment.homography, width, height)?;
        Ok(ColorRegistration {
            aligned,
            homography: alignment.homography,
            stats: alignment.stats,
        })
    }

    fn detect_and_describe(&self, img: &GrayImage) -> (Vec<Keypoint>, Descriptors) {
        let detector = CornerDetector::new(self.corner_threshold);
        match self.method {
            DetectorMethod::Float => {
                let pyramid = GaussianPyramid::build(img, MAX_OCTAVES);
                let mut pairs: Vec<(Keypoint, FloatDescriptor)> = Vec::new();
                for (index, octave) in pyramid.octaves.iter().enumerate() {
                    let mut kps = detector.detect(&octave.image, index as u32);
                    descriptor::assign_orientations(&octave.image, &mut kps);
                    let descs = descriptor::float_descriptors(&octave.image, &kps);
                    pairs.extend(kps.into_iter().zip(descs).map(|(mut kp, d)| {
                        kp.x *= octave.scale;
                        kp.y *= octave.scale;
                        (kp, d)
                    }));
                }
                let (kps, descs) = keep_strongest(pairs, self.max_keypoints);
                (kps, Descriptors::Float(descs))
            }
            DetectorMethod::Binary => {
                let mut kps = detector.detect(img, 0);
                descriptor::assign_orientations(img, &mut kps);
                let descs = descriptor::binary_descriptors(img, &kps);
                let pairs = kps.into_iter().zip(descs).collect();
                let (kps, descs) = keep_strongest(pairs, self.max_keypoints);
                (kps, Descriptors::Binary(descs))
            }
        }
    }
}

/// Sort by corner response and keep the strongest `cap` keypoints with
/// their descriptors.
fn keep_strongest<D>(mut pairs: Vec<(Keypoint, D)>, cap: usize) -> (Vec<Keypoint>, Vec<D>) {
    pairs.sort_by(|a, b| {
        b.0.response
            .partial_cmp(&a.0.response)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    pairs.truncate(cap);
    pairs.into_iter().unzip()
}
