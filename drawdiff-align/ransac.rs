//! Robust homography estimation from noisy correspondences.
//!
//! Repeatedly fits a model to a minimal four-point sample, counts the
//! correspondences it explains, and keeps the best hypothesis. The iteration
//! budget shrinks adaptively as the observed inlier ratio rises, and the
//! winning model is refit on all of its inliers.

use nalgebra::Matrix3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::homography::{apply_homography, estimate_homography, has_collinear_triple};

const SAMPLE_SIZE: usize = 4;

#[derive(Debug, Clone)]
pub struct RansacConfig {
    pub max_iterations: usize,
    /// Reprojection distance in pixels below which a correspondence counts
    /// as an inlier.
    pub inlier_threshold: f64,
    /// Probability that at least one sample was outlier free, used for early
    /// termination.
    pub confidence: f64,
    /// Fixed seed for reproducible runs; `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            inlier_threshold: 5.0,
            confidence: 0.995,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacResult {
    pub homography: Matrix3<f64>,
    /// Per-correspondence inlier flags, same order as the input slices.
    pub inlier_mask: Vec<bool>,
    pub inliers: usize,
    pub iterations: usize,
}

/// Estimate the homography mapping `src` onto `dst` in the presence of
/// outliers. Returns `None` when no sample ever produces a valid model.
pub fn estimate_projective(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    config: &RansacConfig,
) -> Option<RansacResult> {
    let n = src.len();
    if n < SAMPLE_SIZE || n != dst.len() {
        return None;
    }

    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    };

    let threshold_sq = config.inlier_threshold * config.inlier_threshold;
    let mut best_model: Option<Matrix3<f64>> = None;
    let mut best_count = 0usize;
    let mut iterations = 0usize;

    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    let mut sample_src = Vec::with_capacity(SAMPLE_SIZE);
    let mut sample_dst = Vec::with_capacity(SAMPLE_SIZE);

    while iterations < config.max_iterations {
        iterations += 1;

        sample_distinct(&mut rng, n, SAMPLE_SIZE, &mut sample);
        sample_src.clear();
        sample_dst.clear();
        for &i in &sample {
            sample_src.push(src[i]);
            sample_dst.push(dst[i]);
        }

        // A sample with three points on a line cannot pin down the model.
        if has_collinear_triple(&sample_src) || has_collinear_triple(&sample_dst) {
            continue;
        }

        let Some(model) = estimate_homography(&sample_src, &sample_dst) else {
            continue;
        };

        let count = count_inliers(src, dst, &model, threshold_sq, None);
        if count > best_count {
            best_count = count;
            best_model = Some(model);

            let ratio = count as f64 / n as f64;
            if iterations >= adaptive_iterations(ratio, config.confidence) {
                break;
            }
        }
    }

    let model = best_model?;
    let mut mask = vec![false; n];
    count_inliers(src, dst, &model, threshold_sq, Some(&mut mask));

    // Refit on every inlier; keep the refit only when it explains at least
    // as many correspondences as the minimal-sample model.
    let inlier_src: Vec<_> = mask
        .iter()
        .zip(src)
        .filter_map(|(&keep, &p)| keep.then_some(p))
        .collect();
    let inlier_dst: Vec<_> = mask
        .iter()
        .zip(dst)
        .filter_map(|(&keep, &p)| keep.then_some(p))
        .collect();

    let (model, mask, count) = match estimate_homography(&inlier_src, &inlier_dst) {
        Some(refined) => {
            let mut refined_mask = vec![false; n];
            let refined_count =
                count_inliers(src, dst, &refined, threshold_sq, Some(&mut refined_mask));
            if refined_count >= best_count {
                (refined, refined_mask, refined_count)
            } else {
                (model, mask, best_count)
            }
        }
        None => (model, mask, best_count),
    };

    Some(RansacResult {
        homography: model,
        inlier_mask: mask,
        inliers: count,
        iterations,
    })
}

/// Floyd's algorithm: `k` distinct indices from `0..n` without a shuffle.
fn sample_distinct<R: Rng>(rng: &mut R, n: usize, k: usize, out: &mut Vec<usize>) {
    out.clear();
    for j in (n - k)..n {
        let t = rng.random_range(0..=j);
        if out.contains(&t) {
            out.push(j);
        } else {
            out.push(t);
        }
    }
}

fn count_inliers(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    model: &Matrix3<f64>,
    threshold_sq: f64,
    mut mask: Option<&mut Vec<bool>>,
) -> usize {
    let mut count = 0;
    for (i, (&s, &d)) in src.iter().zip(dst.iter()).enumerate() {
        let (px, py) = apply_homography(model, s);
        let dx = px - d.0;
        let dy = py - d.1;
        let inlier = dx * dx + dy * dy <= threshold_sq;
        if inlier {
            count += 1;
        }
        if let Some(mask) = mask.as_deref_mut() {
            mask[i] = inlier;
        }
    }
    count
}

/// Iterations needed to draw an all-inlier sample with the requested
/// confidence given the observed inlier ratio.
fn adaptive_iterations(inlier_ratio: f64, confidence: f64) -> usize {
    if inlier_ratio <= 0.0 || inlier_ratio >= 1.0 {
        return 1;
    }
    let w4 = inlier_ratio.powi(SAMPLE_SIZE as i32);
    if w4 >= 1.0 {
        return 1;
    }
    let log_fail = (1.0 - confidence).ln();
    let log_miss = (1.0 - w4).ln();
    if log_miss >= 0.0 {
        return usize::MAX;
    }
    (log_fail / log_miss).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_config() -> RansacConfig {
        RansacConfig {
            seed: Some(7),
            ..RansacConfig::default()
        }
    }

    fn scattered_points(count: usize, seed: u64) -> Vec<(f64, f64)> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                (
                    rng.random_range(0.0..500.0),
                    rng.random_range(0.0..500.0),
                )
            })
            .collect()
    }

    #[test]
    fn recovers_translation_without_outliers() {
        let src = scattered_points(30, 11);
        let dst: Vec<_> = src.iter().map(|&(x, y)| (x + 20.0, y - 10.0)).collect();

        let result = estimate_projective(&src, &dst, &seeded_config()).unwrap();
        assert_eq!(result.inliers, 30);
        assert!(result.inlier_mask.iter().all(|&m| m));
        assert!((result.homography[(0, 2)] - 20.0).abs() < 1e-4);
        assert!((result.homography[(1, 2)] + 10.0).abs() < 1e-4);
        // The all-inlier ratio should end the loop long before the cap.
        assert!(result.iterations < 100);
    }

    #[test]
    fn ignores_gross_outliers() {
        let src = scattered_points(40, 23);
        let mut dst: Vec<_> = src.iter().map(|&(x, y)| (x + 20.0, y - 10.0)).collect();
        // Corrupt the last quarter with large displacements.
        for (i, p) in dst.iter_mut().enumerate().skip(30) {
            p.0 += 80.0 + i as f64;
            p.1 -= 120.0;
        }

        let result = estimate_projective(&src, &dst, &seeded_config()).unwrap();
        assert_eq!(result.inliers, 30);
        assert!(result.inlier_mask[..30].iter().all(|&m| m));
        assert!(result.inlier_mask[30..].iter().all(|&m| !m));
        assert!((result.homography[(0, 2)] - 20.0).abs() < 1e-4);
        assert!((result.homography[(1, 2)] + 10.0).abs() < 1e-4);
    }

    #[test]
    fn deterministic_with_fixed_seed() {
        let src = scattered_points(25, 41);
        let dst: Vec<_> = src.iter().map(|&(x, y)| (y, x)).collect();

        let a = estimate_projective(&src, &dst, &seeded_config()).unwrap();
        let b = estimate_projective(&src, &dst, &seeded_config()).unwrap();
        assert_eq!(a.inlier_mask, b.inlier_mask);
        assert_eq!(a.homography, b.homography);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn too_few_correspondences() {
        let pts = vec![(0.0, 0.0), (1.0, 1.0), (2.0, 0.5)];
        assert!(estimate_projective(&pts, &pts, &seeded_config()).is_none());
    }

    #[test]
    fn collinear_cloud_yields_no_model() {
        let src: Vec<_> = (0..20).map(|i| (i as f64, 3.0 * i as f64)).collect();
        let dst = src.clone();
        assert!(estimate_projective(&src, &dst, &seeded_config()).is_none());
    }

    #[test]
    fn adaptive_budget_shrinks_with_clean_data() {
        assert_eq!(adaptive_iterations(1.0, 0.995), 1);
        let half = adaptive_iterations(0.5, 0.995);
        let most = adaptive_iterations(0.9, 0.995);
        assert!(most < half);
        assert!(half > 10);
    }
}
