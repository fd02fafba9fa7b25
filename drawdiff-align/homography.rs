//! Direct linear transform estimation of a plane projective mapping.

use nalgebra::{DMatrix, Matrix3, SVD};

/// Mean distance from the centroid after normalization.
const TARGET_SPREAD: f64 = std::f64::consts::SQRT_2;

/// Estimate the 3x3 homography mapping `src` points onto `dst` points.
/// Needs at least four correspondences; returns `None` on degenerate
/// configurations.
pub fn estimate_homography(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Matrix3<f64>> {
    if src.len() < 4 || src.len() != dst.len() {
        return None;
    }

    // Hartley normalization keeps the design matrix well conditioned.
    let (src_norm, t_src) = normalize_points(src);
    let (dst_norm, t_dst) = normalize_points(dst);

    // Each correspondence contributes two rows of the homogeneous system
    // A h = 0:
    //   [-x -y -1  0  0  0  x*x'  y*x'  x']
    //   [ 0  0  0 -x -y -1  x*y'  y*y'  y']
    let n = src_norm.len();
    let mut rows = vec![0.0f64; 2 * n * 9];
    for i in 0..n {
        let (x, y) = src_norm[i];
        let (xp, yp) = dst_norm[i];
        let base = i * 18;
        rows[base..base + 9]
            .copy_from_slice(&[-x, -y, -1.0, 0.0, 0.0, 0.0, x * xp, y * xp, xp]);
        rows[base + 9..base + 18]
            .copy_from_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, x * yp, y * yp, yp]);
    }

    let h_norm = solve_null_space(DMatrix::from_row_slice(2 * n, 9, &rows))?;

    // Undo the normalization on both sides.
    let t_dst_inv = t_dst.try_inverse()?;
    let h = t_dst_inv * h_norm * t_src;

    // Scale so the bottom-right element is one.
    let scale = h[(2, 2)];
    if scale.abs() < 1e-10 {
        return None;
    }
    let h = h / scale;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(h)
}

/// Apply a homography to a point, performing the projective divide.
pub fn apply_homography(h: &Matrix3<f64>, point: (f64, f64)) -> (f64, f64) {
    let (x, y) = point;
    let w = h[(2, 0)] * x + h[(2, 1)] * y + h[(2, 2)];
    if w.abs() < 1e-12 {
        return (f64::INFINITY, f64::INFINITY);
    }
    let xp = (h[(0, 0)] * x + h[(0, 1)] * y + h[(0, 2)]) / w;
    let yp = (h[(1, 0)] * x + h[(1, 1)] * y + h[(1, 2)]) / w;
    (xp, yp)
}

/// True when any three of the points are (near) collinear, which makes the
/// homography underdetermined.
pub fn has_collinear_triple(points: &[(f64, f64)]) -> bool {
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            for k in (j + 1)..points.len() {
                let (ax, ay) = points[i];
                let (bx, by) = points[j];
                let (cx, cy) = points[k];
                let area = (bx - ax) * (cy - ay) - (by - ay) * (cx - ax);
                if area.abs() < 1e-8 {
                    return true;
                }
            }
        }
    }
    false
}

/// Translate to the centroid and scale so the mean distance from it is
/// sqrt(2). Returns the normalized points and the similarity that produced
/// them.
fn normalize_points(points: &[(f64, f64)]) -> (Vec<(f64, f64)>, Matrix3<f64>) {
    let n = points.len() as f64;
    let (cx, cy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    let (cx, cy) = (cx / n, cy / n);

    let mean_dist = points
        .iter()
        .map(|&(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-10 {
        return (points.to_vec(), Matrix3::identity());
    }

    let s = TARGET_SPREAD / mean_dist;
    let normalized = points
        .iter()
        .map(|&(x, y)| ((x - cx) * s, (y - cy) * s))
        .collect();
    let t = Matrix3::new(s, 0.0, -cx * s, 0.0, s, -cy * s, 0.0, 0.0, 1.0);
    (normalized, t)
}

/// Right singular vector for the smallest singular value of `a`, reshaped to
/// a 3x3 matrix. nalgebra computes the thin SVD, whose V^T has min(m, 9)
/// rows; pad with zero rows when fewer than nine so the null-space vector is
/// present.
fn solve_null_space(a: DMatrix<f64>) -> Option<Matrix3<f64>> {
    let a = if a.nrows() < 9 {
        let mut padded = DMatrix::zeros(9, 9);
        padded.view_mut((0, 0), (a.nrows(), 9)).copy_from(&a);
        padded
    } else {
        a
    };

    let svd = SVD::new(a, false, true);
    let v_t = svd.v_t?;
    // Singular values come out sorted descending, so the last row of V^T
    // spans the null space.
    let h = v_t.row(v_t.nrows() - 1);
    Some(Matrix3::new(
        h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_matrix_close(a: &Matrix3<f64>, b: &Matrix3<f64>, tol: f64) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!(
                (x - y).abs() < tol,
                "matrices differ: {a} vs {b}"
            );
        }
    }

    #[test]
    fn recovers_identity() {
        let points = vec![(0.0, 0.0), (100.0, 0.0), (100.0, 80.0), (0.0, 80.0), (37.0, 21.0)];
        let h = estimate_homography(&points, &points).unwrap();
        assert_matrix_close(&h, &Matrix3::identity(), 1e-8);
    }

    #[test]
    fn recovers_translation() {
        let src = vec![(10.0, 10.0), (200.0, 15.0), (190.0, 180.0), (20.0, 170.0)];
        let dst: Vec<_> = src.iter().map(|&(x, y)| (x + 12.0, y - 7.0)).collect();
        let h = estimate_homography(&src, &dst).unwrap();
        assert!((h[(0, 2)] - 12.0).abs() < 1e-6);
        assert!((h[(1, 2)] + 7.0).abs() < 1e-6);

        let (x, y) = apply_homography(&h, (50.0, 60.0));
        assert!((x - 62.0).abs() < 1e-6);
        assert!((y - 53.0).abs() < 1e-6);
    }

    #[test]
    fn recovers_known_projective_warp() {
        let truth = Matrix3::new(
            0.95, 0.02, 4.0, //
            -0.03, 1.05, -2.5, //
            1e-4, -5e-5, 1.0,
        );
        let src = vec![
            (0.0, 0.0),
            (320.0, 10.0),
            (310.0, 240.0),
            (5.0, 230.0),
            (160.0, 120.0),
            (80.0, 200.0),
        ];
        let dst: Vec<_> = src.iter().map(|&p| apply_homography(&truth, p)).collect();
        let h = estimate_homography(&src, &dst).unwrap();
        assert_matrix_close(&h, &truth, 1e-6);
    }

    #[test]
    fn rejects_degenerate_input() {
        let three = vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];
        assert!(estimate_homography(&three, &three).is_none());

        // All points on one line leave the system rank deficient.
        let line: Vec<_> = (0..5).map(|i| (i as f64, 2.0 * i as f64)).collect();
        assert!(has_collinear_triple(&line));
    }

    #[test]
    fn collinearity_check_on_proper_quad() {
        let quad = vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        assert!(!has_collinear_triple(&quad));
        let bad = vec![(0.0, 0.0), (5.0, 5.0), (10.0, 10.0), (0.0, 10.0)];
        assert!(has_collinear_triple(&bad));
    }

    #[test]
    fn projective_divide_guards_horizon() {
        let h = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0);
        let (x, _) = apply_homography(&h, (0.0, 5.0));
        assert!(x.is_infinite());
    }
}
