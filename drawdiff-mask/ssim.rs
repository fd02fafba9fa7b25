//! Windowed structural similarity between two grayscale rasters.
//!
//! Window sums come from integral images, so the map costs O(pixels)
//! regardless of window size. Windows are truncated at the borders rather
//! than padded; comparing an image against itself therefore scores exactly
//! 1.0 at every pixel, which downstream identity tests rely on.

use image::GrayImage;
use rayon::prelude::*;

const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Largest usable odd window: `min(7, largest odd <= min(width, height))`.
/// Below 3 the statistics are meaningless; callers skip the map entirely.
pub fn pick_window(width: u32, height: u32) -> u32 {
    let m = width.min(height);
    if m == 0 {
        return 0;
    }
    let odd = if m % 2 == 0 { m - 1 } else { m };
    odd.min(7)
}

/// Summed-area tables over values, squares and cross products, all exact in
/// f64 for 8-bit input.
struct IntegralTables {
    width: usize,
    sum_a: Vec<f64>,
    sum_b: Vec<f64>,
    sum_aa: Vec<f64>,
    sum_bb: Vec<f64>,
    sum_ab: Vec<f64>,
}

impl IntegralTables {
    fn build(a: &GrayImage, b: &GrayImage) -> Self {
        let (w, h) = (a.width() as usize, a.height() as usize);
        let stride = w + 1;
        let len = stride * (h + 1);
        let mut tables = Self {
            width: stride,
            sum_a: vec![0.0; len],
            sum_b: vec![0.0; len],
            sum_aa: vec![0.0; len],
            sum_bb: vec![0.0; len],
            sum_ab: vec![0.0; len],
        };

        let ra = a.as_raw();
        let rb = b.as_raw();
        for y in 0..h {
            for x in 0..w {
                let va = ra[y * w + x] as f64;
                let vb = rb[y * w + x] as f64;
                let i = (y + 1) * stride + (x + 1);
                let up = i - stride;
                let left = i - 1;
                let diag = up - 1;
                tables.sum_a[i] = va + tables.sum_a[up] + tables.sum_a[left] - tables.sum_a[diag];
                tables.sum_b[i] = vb + tables.sum_b[up] + tables.sum_b[left] - tables.sum_b[diag];
                tables.sum_aa[i] =
                    va * va + tables.sum_aa[up] + tables.sum_aa[left] - tables.sum_aa[diag];
                tables.sum_bb[i] =
                    vb * vb + tables.sum_bb[up] + tables.sum_bb[left] - tables.sum_bb[diag];
                tables.sum_ab[i] =
                    va * vb + tables.sum_ab[up] + tables.sum_ab[left] - tables.sum_ab[diag];
            }
        }
        tables
    }

    /// Sum over the half-open rectangle [x0, x1) x [y0, y1).
    fn rect(&self, table: &[f64], x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        table[y1 * self.width + x1] - table[y0 * self.width + x1] - table[y1 * self.width + x0]
            + table[y0 * self.width + x0]
    }
}

/// Per-pixel SSIM of two same-sized images with a centered odd window.
/// Callers must pass a window of at least 3 picked by [`pick_window`].
pub fn ssim_map(a: &GrayImage, b: &GrayImage, window: u32) -> Vec<f64> {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let (w, h) = (a.width() as usize, a.height() as usize);
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let tables = IntegralTables::build(a, b);
    let half = (window / 2) as usize;
    let mut map = vec![0.0f64; w * h];

    map.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let y0 = y.saturating_sub(half);
        let y1 = (y + half + 1).min(h);
        for (x, out) in row.iter_mut().enumerate() {
            let x0 = x.saturating_sub(half);
            let x1 = (x + half + 1).min(w);
            let n = ((x1 - x0) * (y1 - y0)) as f64;

            let sa = tables.rect(&tables.sum_a, x0, y0, x1, y1);
            let sb = tables.rect(&tables.sum_b, x0, y0, x1, y1);
            let saa = tables.rect(&tables.sum_aa, x0, y0, x1, y1);
            let sbb = tables.rect(&tables.sum_bb, x0, y0, x1, y1);
            let sab = tables.rect(&tables.sum_ab, x0, y0, x1, y1);

            let ux = sa / n;
            let uy = sb / n;
            // Unbiased sample statistics.
            let norm = 1.0 / (n - 1.0);
            let vx = (saa - n * ux * ux) * norm;
            let vy = (sbb - n * uy * uy) * norm;
            let vxy = (sab - n * ux * uy) * norm;

            *out = ((2.0 * ux * uy + C1) * (2.0 * vxy + C2))
                / ((ux * ux + uy * uy + C1) * (vx + vy + C2));
        }
    });

    map
}
