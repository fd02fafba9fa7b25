//! End-to-end drawing comparison pipeline and its operational shell.
//!
//! Composes rendering, registration, classification and overlay generation
//! into one call, plus the pieces a serving layer needs around it: session
//! bookkeeping, single-flight memoization and per-page artifact writing.

pub mod memo;
pub mod render;
pub mod session;

pub use memo::{ComparisonCache, Fingerprint, request_fingerprint};
pub use render::{BASE_DPI, DirectoryRenderer, PageRenderer, RenderError};
pub use session::{InMemorySessionStore, SessionData, SessionError, SessionStore};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use drawdiff_align::{AlignError, FeatureRegistrar};
use drawdiff_core::{AlignmentStats, CompareOptions, DiffStats, OptionsError};
use drawdiff_mask::{DifferenceClassifier, DifferenceResult, MaskError};
use drawdiff_tiles::{TileError, TileFormat, TilePyramidBuilder, write_dzi};

/// Failures from any stage of a page comparison.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid options: {0}")]
    Options(#[from] OptionsError),
    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),
    #[error("registration failed: {0}")]
    Align(#[from] AlignError),
    #[error("classification failed: {0}")]
    Mask(#[from] MaskError),
    #[error("tile generation failed: {0}")]
    Tiles(#[from] TileError),
    #[error("stats serialization failed: {0}")]
    Stats(#[from] serde_json::Error),
    #[error("artifact encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat stats document merging both stages, the shape written to
/// `stats.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonStats {
    #[serde(flatten)]
    pub alignment: AlignmentStats,
    #[serde(flatten)]
    pub difference: DiffStats,
    pub page: usize,
    pub scaling_factor: f64,
}

/// Everything produced by comparing one page pair.
#[derive(Debug, Clone)]
pub struct PageComparison {
    pub page: usize,
    /// Rendered pixels per nominal document unit, dpi / 72.
    pub scaling_factor: f64,
    /// Reference page in color, the display base.
    pub reference_color: RgbaImage,
    /// Reference page in grayscale, the comparison base.
    pub reference_gray: GrayImage,
    /// Target page resampled into the reference frame.
    pub aligned_target: GrayImage,
    pub result: DifferenceResult,
    pub stats: ComparisonStats,
}

/// Compares pages of two documents through an injected renderer.
pub struct ComparePipeline<'a> {
    renderer: &'a dyn PageRenderer,
    options: CompareOptions,
}

impl fmt::Debug for ComparePipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComparePipeline")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> ComparePipeline<'a> {
    pub fn new(
        renderer: &'a dyn PageRenderer,
        options: CompareOptions,
    ) -> Result<Self, PipelineError> {
        options.validate()?;
        Ok(Self { renderer, options })
    }

    pub fn options(&self) -> &CompareOptions {
        &self.options
    }

    /// Number of pages present in both documents.
    pub fn common_pages(&self, reference: &Path, target: &Path) -> Result<usize, PipelineError> {
        let reference_pages = self.renderer.page_count(reference)?;
        let target_pages = self.renderer.page_count(target)?;
        Ok(reference_pages.min(target_pages))
    }

    /// Render, register, classify and tint one page pair.
    pub fn compare_page(
        &self,
        reference: &Path,
        target: &Path,
        page: usize,
    ) -> Result<PageComparison, PipelineError> {
        let pages = self.common_pages(reference, target)?;
        if page >= pages {
            return Err(PipelineError::Render(RenderError::PageOutOfRange {
                page,
                pages,
            }));
        }

        let dpi = self.options.dpi;
        let (reference_gray, scaling_factor) = self.renderer.render_page(reference, page, dpi)?;
        let reference_color = self
            .renderer
            .render_page_color(reference, page, dpi, false)?;
        let (target_gray, _) = self.renderer.render_page(target, page, dpi)?;

        let registrar = FeatureRegistrar::from_options(&self.options);
        let registration = registrar.register(&reference_gray, &target_gray)?;

        let classifier = DifferenceClassifier::from_options(&self.options)?;
        let result = classifier.classify(&reference_gray, &registration.aligned)?;

        info!(
            page,
            inliers = registration.stats.inliers,
            missing = result.stats.missing_regions,
            added = result.stats.added_regions,
            modified = result.stats.modified_regions,
            "page compared"
        );

        let stats = ComparisonStats {
            alignment: registration.stats,
            difference: result.stats.clone(),
            page,
            scaling_factor,
        };
        Ok(PageComparison {
            page,
            scaling_factor,
            reference_color,
            reference_gray,
            aligned_target: registration.aligned,
            result,
            stats,
        })
    }
}

/// One-call comparison of a single page pair.
pub fn compare_pages(
    renderer: &dyn PageRenderer,
    reference: &Path,
    target: &Path,
    page: usize,
    options: &CompareOptions,
) -> Result<PageComparison, PipelineError> {
    ComparePipeline::new(renderer, options.clone())?.compare_page(reference, target, page)
}

/// Artifact locations written for one compared page.
#[derive(Debug, Clone)]
pub struct PageArtifacts {
    pub page_dir: PathBuf,
    pub stats_path: PathBuf,
}

/// Write the comparison rasters and stats under `out_dir/page_{n}`.
///
/// Layout: `reference.png` (color base), `reference_gray.png`, the three
/// category overlays `mask_red.png` / `mask_green.png` / `mask_blue.png`,
/// and `stats.json`. With `tiles` set, deep-zoom trees for the base image
/// (JPEG tiles) and the combined overlay (PNG tiles) land beside them under
/// `tiles/base` and `tiles/overlay`.
pub fn write_page_artifacts(
    comparison: &PageComparison,
    out_dir: &Path,
    options: &CompareOptions,
    tiles: bool,
) -> Result<PageArtifacts, PipelineError> {
    let page_dir = out_dir.join(format!("page_{}", comparison.page));
    fs::create_dir_all(&page_dir)?;

    comparison
        .reference_color
        .save(page_dir.join("reference.png"))?;
    comparison
        .reference_gray
        .save(page_dir.join("reference_gray.png"))?;

    let [missing, added, modified] = comparison.result.overlays();
    missing.save(page_dir.join("mask_red.png"))?;
    added.save(page_dir.join("mask_green.png"))?;
    modified.save(page_dir.join("mask_blue.png"))?;

    let stats_path = page_dir.join("stats.json");
    fs::write(&stats_path, serde_json::to_string_pretty(&comparison.stats)?)?;

    if tiles {
        let base_builder =
            TilePyramidBuilder::new(options.tile_size, options.tile_overlap, TileFormat::Jpeg)?;
        let base = base_builder.build_pyramid(&DynamicImage::ImageRgba8(
            comparison.reference_color.clone(),
        ))?;
        write_dzi(&base, &page_dir.join("tiles").join("base"), "image")?;

        let overlay_builder =
            TilePyramidBuilder::new(options.tile_size, options.tile_overlap, TileFormat::Png)?;
        let overlay = overlay_builder.build_overlay_pyramid(&missing, &added, &modified)?;
        write_dzi(&overlay, &page_dir.join("tiles").join("overlay"), "image")?;
    }

    info!(dir = %page_dir.display(), "artifacts written");
    Ok(PageArtifacts {
        page_dir,
        stats_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use tempfile::tempdir;

    /// Identical rectangle scenes except for one square removed from the
    /// target and one added to it. The left margin is reserved for the two
    /// squares so random content never touches them.
    fn scene_pair() -> (GrayImage, GrayImage) {
        let mut rng = ChaCha8Rng::seed_from_u64(33);
        let mut reference = GrayImage::from_pixel(448, 448, Luma([255u8]));
        let mut target = GrayImage::from_pixel(448, 448, Luma([255u8]));
        for _ in 0..36 {
            let w = rng.random_range(20u32..56);
            let h = rng.random_range(20u32..56);
            let x0 = rng.random_range(112u32..380);
            let y0 = rng.random_range(12u32..380);
            let v = rng.random_range(0u8..=150);
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    reference.put_pixel(x, y, Luma([v]));
                    target.put_pixel(x, y, Luma([v]));
                }
            }
        }
        // Removed in the target.
        for y in 20..70 {
            for x in 20..70 {
                reference.put_pixel(x, y, Luma([40u8]));
            }
        }
        // Added in the target.
        for y in 300..350 {
            for x in 20..70 {
                target.put_pixel(x, y, Luma([40u8]));
            }
        }
        (reference, target)
    }

    fn write_documents(root: &Path) -> (PathBuf, PathBuf) {
        let (reference, target) = scene_pair();
        let reference_dir = root.join("reference");
        let target_dir = root.join("target");
        fs::create_dir_all(&reference_dir).unwrap();
        fs::create_dir_all(&target_dir).unwrap();
        reference.save(reference_dir.join("page_0.png")).unwrap();
        target.save(target_dir.join("page_0.png")).unwrap();
        (reference_dir, target_dir)
    }

    fn test_options() -> CompareOptions {
        CompareOptions {
            dpi: 72,
            ransac_seed: Some(5),
            ..CompareOptions::default()
        }
    }

    #[test]
    fn compare_pages_finds_removed_and_added_content() {
        let dir = tempdir().unwrap();
        let (reference, target) = write_documents(dir.path());

        let comparison = compare_pages(
            &DirectoryRenderer,
            &reference,
            &target,
            0,
            &test_options(),
        )
        .unwrap();

        assert_eq!(comparison.page, 0);
        assert_eq!(comparison.scaling_factor, 1.0);
        assert_eq!(comparison.reference_gray.dimensions(), (448, 448));
        assert_eq!(comparison.stats.alignment.method, "sift");
        assert!(comparison.stats.alignment.inlier_ratio > 0.8);

        // The removed square shows as missing, the new one as added.
        assert!(comparison.stats.difference.missing_regions >= 1);
        assert!(comparison.stats.difference.added_regions >= 1);
        assert_eq!(comparison.result.missing.get_pixel(45, 45), &Luma([255u8]));
        assert_eq!(comparison.result.added.get_pixel(45, 325), &Luma([255u8]));
        // Unchanged areas stay clear.
        assert_eq!(comparison.result.missing.get_pixel(45, 325), &Luma([0u8]));
        assert_eq!(comparison.result.added.get_pixel(45, 45), &Luma([0u8]));
    }

    #[test]
    fn page_beyond_both_documents_is_out_of_range() {
        let dir = tempdir().unwrap();
        let (reference, target) = write_documents(dir.path());

        let err = compare_pages(
            &DirectoryRenderer,
            &reference,
            &target,
            3,
            &test_options(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Render(RenderError::PageOutOfRange { page: 3, pages: 1 })
        ));
    }

    #[test]
    fn invalid_options_fail_before_rendering() {
        let options = CompareOptions {
            dpi: 20,
            ..CompareOptions::default()
        };
        let err = ComparePipeline::new(&DirectoryRenderer, options).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Options(OptionsError::InvalidDpi(20))
        ));
    }

    #[test]
    fn artifacts_follow_the_page_directory_layout() {
        let dir = tempdir().unwrap();
        let (reference, target) = write_documents(dir.path());
        let options = test_options();

        let comparison =
            compare_pages(&DirectoryRenderer, &reference, &target, 0, &options).unwrap();
        let out = dir.path().join("out");
        let artifacts = write_page_artifacts(&comparison, &out, &options, true).unwrap();

        assert_eq!(artifacts.page_dir, out.join("page_0"));
        for name in [
            "reference.png",
            "reference_gray.png",
            "mask_red.png",
            "mask_green.png",
            "mask_blue.png",
            "stats.json",
        ] {
            assert!(artifacts.page_dir.join(name).is_file(), "missing {name}");
        }

        // Stats flatten both stages into one document.
        let stats: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&artifacts.stats_path).unwrap()).unwrap();
        assert!(stats.get("totalMatches").is_some());
        assert!(stats.get("missingPixels").is_some());
        assert_eq!(stats.get("page").unwrap(), 0);
        assert_eq!(stats.get("scalingFactor").unwrap(), 1.0);

        // Tile trees for the base image and the combined overlay.
        assert!(
            artifacts
                .page_dir
                .join("tiles")
                .join("base")
                .join("image.dzi")
                .is_file()
        );
        let overlay_files = artifacts
            .page_dir
            .join("tiles")
            .join("overlay")
            .join("image_files");
        assert!(overlay_files.is_dir());
        // Overlay tiles are PNG regardless of the base tile format.
        let finest = overlay_files.join("2");
        assert!(finest.join("0_0.png").is_file());
    }

    #[test]
    fn stats_json_uses_camel_case_keys() {
        let stats = ComparisonStats {
            alignment: AlignmentStats {
                total_matches: 10,
                inliers: 9,
                inlier_ratio: 0.9,
                keypoints_reference: 100,
                keypoints_target: 90,
                method: "orb".to_string(),
            },
            difference: DiffStats::default(),
            page: 2,
            scaling_factor: 2.7777,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"inlierRatio\":0.9"));
        assert!(json.contains("\"modifiedRegions\":0"));
        assert!(json.contains("\"scalingFactor\":2.7777"));
        assert!(json.contains("\"page\":2"));
    }
}
