use drawdiff_core::{BinaryDescriptor, FloatDescriptor, MatchPair};
use rayon::prelude::*;

/// Leaf-visit budget for approximate tree search. Generous enough that exact
/// correspondences are always found (the first descent lands in the query's
/// own cell); distant second-best candidates may be approximate.
pub const DEFAULT_CHECKS: usize = 64;

/// Bounded set of the k nearest candidates seen so far.
struct KNearest {
    capacity: usize,
    // Sorted ascending by distance.
    items: Vec<(usize, f32)>,
}

impl KNearest {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity + 1),
        }
    }

    fn push(&mut self, index: usize, distance: f32) {
        let pos = self
            .items
            .partition_point(|&(_, d)| d <= distance);
        self.items.insert(pos, (index, distance));
        self.items.truncate(self.capacity);
    }

    /// Worst distance currently kept; infinite while the set is not full.
    fn worst(&self) -> f32 {
        if self.items.len() < self.capacity {
            f32::INFINITY
        } else {
            self.items[self.capacity - 1].1
        }
    }
}

struct TreeNode {
    /// Index into the descriptor slice.
    point: usize,
    split_dim: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// K-d tree over 128-d descriptors with median splits on the widest
/// dimension, searched with a bounded budget of examined points.
pub struct DescriptorTree<'a> {
    descriptors: &'a [FloatDescriptor],
    nodes: Vec<TreeNode>,
    root: Option<usize>,
}

impl<'a> DescriptorTree<'a> {
    pub fn build(descriptors: &'a [FloatDescriptor]) -> Self {
        let mut indices: Vec<usize> = (0..descriptors.len()).collect();
        let mut nodes = Vec::with_capacity(descriptors.len());
        let root = Self::build_recursive(descriptors, &mut indices[..], &mut nodes);
        Self {
            descriptors,
            nodes,
            root,
        }
    }

    fn build_recursive(
        descriptors: &[FloatDescriptor],
        indices: &mut [usize],
        nodes: &mut Vec<TreeNode>,
    ) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }

        let split_dim = widest_dimension(descriptors, indices);
        let median = indices.len() / 2;
        indices.select_nth_unstable_by(median, |&a, &b| {
            descriptors[a][split_dim]
                .partial_cmp(&descriptors[b][split_dim])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let point = indices[median];

        let node_index = nodes.len();
        nodes.push(TreeNode {
            point,
            split_dim,
            left: None,
            right: None,
        });

        let (left_slice, rest) = indices.split_at_mut(median);
        let right_slice = &mut rest[1..];
        let left = Self::build_recursive(descriptors, left_slice, nodes);
        let right = Self::build_recursive(descriptors, right_slice, nodes);
        nodes[node_index].left = left;
        nodes[node_index].right = right;

        Some(node_index)
    }

    /// Approximate k-nearest search; returns (index, L2 distance) sorted
    /// ascending. `max_checks` bounds how many stored points are examined.
    pub fn k_nearest(
        &self,
        query: &FloatDescriptor,
        k: usize,
        max_checks: usize,
    ) -> Vec<(usize, f32)> {
        let mut best = KNearest::new(k);
        if let Some(root) = self.root {
            let mut checks = max_checks.max(k);
            self.search(root, query, &mut best, &mut checks);
        }
        best.items
            .into_iter()
            .map(|(i, d2)| (i, d2.sqrt()))
            .collect()
    }

    fn search(&self, node_index: usize, query: &FloatDescriptor, best: &mut KNearest, checks: &mut usize) {
        let node = &self.nodes[node_index];
        let d2 = squared_l2(query, &self.descriptors[node.point]);
        best.push(node.point, d2);
        *checks = checks.saturating_sub(1);

        let diff = query[node.split_dim] - self.descriptors[node.point][node.split_dim];
        let (near, far) = if diff <= 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(near) = near {
            self.search(near, query, best, checks);
        }
        if let Some(far) = far {
            if *checks > 0 && diff * diff < best.worst() {
                self.search(far, query, best, checks);
            }
        }
    }
}

fn widest_dimension(descriptors: &[FloatDescriptor], indices: &[usize]) -> usize {
    let mut lo = [f32::INFINITY; 128];
    let mut hi = [f32::NEG_INFINITY; 128];
    for &i in indices {
        for (dim, &v) in descriptors[i].iter().enumerate() {
            lo[dim] = lo[dim].min(v);
            hi[dim] = hi[dim].max(v);
        }
    }
    let mut best_dim = 0;
    let mut best_spread = -1.0f32;
    for dim in 0..128 {
        let spread = hi[dim] - lo[dim];
        if spread > best_spread {
            best_spread = spread;
            best_dim = dim;
        }
    }
    best_dim
}

fn squared_l2(a: &FloatDescriptor, b: &FloatDescriptor) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn hamming(a: &BinaryDescriptor, b: &BinaryDescriptor) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}

/// 2-NN tree matches from reference into target descriptors, filtered by the
/// ratio test: keep a pair only when the best distance beats `ratio` times
/// the second best.
pub fn match_float(
    reference: &[FloatDescriptor],
    target: &[FloatDescriptor],
    ratio: f32,
    max_checks: usize,
) -> Vec<MatchPair> {
    if target.len() < 2 {
        return Vec::new();
    }
    let tree = DescriptorTree::build(target);
    reference
        .par_iter()
        .enumerate()
        .filter_map(|(i, descriptor)| {
            let nearest = tree.k_nearest(descriptor, 2, max_checks);
            match nearest.as_slice() {
                [(best, d1), (_, d2)] if *d1 < ratio * *d2 => Some(MatchPair {
                    reference: i,
                    target: *best,
                    distance: *d1,
                }),
                _ => None,
            }
        })
        .collect()
}

/// 2-NN exhaustive Hamming matches from reference into target descriptors,
/// filtered by the same ratio test.
pub fn match_binary(
    reference: &[BinaryDescriptor],
    target: &[BinaryDescriptor],
    ratio: f32,
) -> Vec<MatchPair> {
    if target.len() < 2 {
        return Vec::new();
    }
    reference
        .par_iter()
        .enumerate()
        .filter_map(|(i, descriptor)| {
            let mut best = (usize::MAX, u32::MAX);
            let mut second = u32::MAX;
            for (j, candidate) in target.iter().enumerate() {
                let d = hamming(descriptor, candidate);
                if d < best.1 {
                    second = best.1;
                    best = (j, d);
                } else if d < second {
                    second = d;
                }
            }
            if (best.1 as f32) < ratio * second as f32 {
                Some(MatchPair {
                    reference: i,
                    target: best.0,
                    distance: best.1 as f32,
                })
            } else {
                None
            }
        })
        .collect()
}
