//! Single-flight memoization of page comparisons.
//!
//! Comparisons are expensive and deterministic for fixed inputs, so repeat
//! requests are served from a cache keyed by a request fingerprint. The
//! cache guarantees at most one in-flight computation per key; concurrent
//! callers for the same key wait for the first instead of recomputing.

use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use moka::sync::Cache;
use sha2::{Digest, Sha256};

use drawdiff_core::CompareOptions;

use crate::{PageComparison, PipelineError};

/// SHA-256 digest identifying one comparison request.
pub type Fingerprint = [u8; 32];

/// Comparisons kept resident by default.
pub const DEFAULT_CACHE_CAPACITY: u64 = 32;

/// Fingerprint of (document identities, page, rendering and threshold
/// parameters). Document identity folds in file size and mtime when
/// available, so replacing a document under the same path misses the cache.
pub fn request_fingerprint(
    reference: &Path,
    target: &Path,
    page: usize,
    options: &CompareOptions,
) -> Fingerprint {
    let mut hasher = Sha256::new();
    for document in [reference, target] {
        hasher.update(document.as_os_str().as_encoded_bytes());
        hasher.update([0u8]);
        if let Ok(meta) = std::fs::metadata(document) {
            hasher.update(meta.len().to_le_bytes());
            if let Ok(modified) = meta.modified() {
                if let Ok(age) = modified.duration_since(UNIX_EPOCH) {
                    hasher.update(age.as_nanos().to_le_bytes());
                }
            }
        }
    }
    hasher.update(page.to_le_bytes());
    hasher.update(options.dpi.to_le_bytes());
    hasher.update([options.intensity_threshold]);
    hasher.update(options.structural_threshold.to_le_bytes());
    hasher.update(options.detector.name().as_bytes());
    hasher.update(options.max_keypoints.to_le_bytes());
    hasher.update([options.corner_threshold]);
    match options.ransac_seed {
        Some(seed) => {
            hasher.update([1u8]);
            hasher.update(seed.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.finalize().into()
}

/// Bounded comparison cache with single-flight computation.
pub struct ComparisonCache {
    cache: Cache<Fingerprint, Arc<PageComparison>>,
}

impl Default for ComparisonCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ComparisonCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
        }
    }

    /// Return the cached comparison or run `compute`. Failed computations
    /// are not cached; every waiter for the failed key receives the same
    /// error.
    pub fn get_or_compute<F>(
        &self,
        key: Fingerprint,
        compute: F,
    ) -> Result<Arc<PageComparison>, Arc<PipelineError>>
    where
        F: FnOnce() -> Result<PageComparison, PipelineError>,
    {
        self.cache.try_get_with(key, || compute().map(Arc::new))
    }

    pub fn invalidate(&self, key: &Fingerprint) {
        self.cache.invalidate(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ComparisonStats;
    use drawdiff_core::{AlignmentStats, DiffStats};
    use drawdiff_mask::DifferenceResult;
    use image::{GrayImage, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn comparison(page: usize) -> PageComparison {
        let stats = ComparisonStats {
            alignment: AlignmentStats {
                total_matches: 50,
                inliers: 45,
                inlier_ratio: 0.9,
                keypoints_reference: 400,
                keypoints_target: 410,
                method: "sift".to_string(),
            },
            difference: DiffStats::default(),
            page,
            scaling_factor: 1.0,
        };
        PageComparison {
            page,
            scaling_factor: 1.0,
            reference_color: RgbaImage::new(4, 4),
            reference_gray: GrayImage::new(4, 4),
            aligned_target: GrayImage::new(4, 4),
            result: DifferenceResult {
                missing: GrayImage::new(4, 4),
                added: GrayImage::new(4, 4),
                modified: GrayImage::new(4, 4),
                stats: DiffStats::default(),
            },
            stats,
        }
    }

    #[test]
    fn repeated_requests_hit_the_cache() {
        let cache = ComparisonCache::new(8);
        let calls = AtomicUsize::new(0);
        let key = [1u8; 32];

        for _ in 0..3 {
            let out = cache
                .get_or_compute(key, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(comparison(0))
                })
                .unwrap();
            assert_eq!(out.page, 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_keys_compute_separately() {
        let cache = ComparisonCache::new(8);
        let calls = AtomicUsize::new(0);

        for byte in [1u8, 2] {
            cache
                .get_or_compute([byte; 32], || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(comparison(byte as usize))
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_callers_share_one_computation() {
        let cache = Arc::new(ComparisonCache::new(8));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = [7u8; 32];

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    cache
                        .get_or_compute(key, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(50));
                            Ok(comparison(3))
                        })
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().page, 3);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = ComparisonCache::new(8);
        let calls = AtomicUsize::new(0);
        let key = [9u8; 32];

        let err = cache.get_or_compute(key, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::Render(
                crate::RenderError::PageOutOfRange { page: 5, pages: 1 },
            ))
        });
        assert!(err.is_err());

        cache
            .get_or_compute(key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(comparison(1))
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fingerprint_separates_pages_and_parameters() {
        let options = CompareOptions::default();
        let a = request_fingerprint(Path::new("ref"), Path::new("tgt"), 0, &options);
        let b = request_fingerprint(Path::new("ref"), Path::new("tgt"), 1, &options);
        assert_ne!(a, b);

        let high_dpi = CompareOptions {
            dpi: 300,
            ..CompareOptions::default()
        };
        let c = request_fingerprint(Path::new("ref"), Path::new("tgt"), 0, &high_dpi);
        assert_ne!(a, c);

        let again = request_fingerprint(Path::new("ref"), Path::new("tgt"), 0, &options);
        assert_eq!(a, again);
    }

    #[test]
    fn fingerprint_tracks_document_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, b"first").unwrap();
        let options = CompareOptions::default();

        let before = request_fingerprint(&path, Path::new("tgt"), 0, &options);
        std::fs::write(&path, b"second revision").unwrap();
        let after = request_fingerprint(&path, Path::new("tgt"), 0, &options);
        assert_ne!(before, after);
    }
}
