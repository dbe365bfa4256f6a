//! CART regression tree (MSE criterion)

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node. Children are indices into the tree's node arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
        impurity: f64,
    },
}

/// Best split found for one node
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    /// Sum of squared errors of both children
    child_sse: f64,
}

/// Running sums for the squared error of a set of targets
#[derive(Clone, Copy, Default)]
struct SseStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
}

impl SseStats {
    fn push(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.sq_sum += v * v;
    }

    fn remove(&mut self, v: f64) {
        self.count -= 1;
        self.sum -= v;
        self.sq_sum -= v * v;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    fn sse(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sq_sum - self.sum * self.sum / self.count as f64).max(0.0)
    }
}

/// Regression tree grown on a sample of rows with a random feature subset per split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
    /// Maximum depth (root is depth 0)
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all
    pub max_features: Option<usize>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegressionTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Fit on the rows listed in `sample_indices` (duplicates allowed)
    pub fn fit_indices(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample_indices: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if sample_indices.is_empty() {
            return Err(PipelineError::Training("cannot grow a tree on zero samples".to_string()));
        }

        self.n_features = x.ncols();
        self.nodes.clear();
        let mut importances = vec![0.0; self.n_features];
        let mut indices = sample_indices.to_vec();
        self.grow(x, y, &mut indices, 0, rng, &mut importances);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(self)
    }

    /// Fit on every row
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, rng: &mut ChaCha8Rng) -> Result<&mut Self> {
        let all: Vec<usize> = (0..x.nrows()).collect();
        self.fit_indices(x, y, &all, rng)
    }

    /// Grow the subtree for `indices`, returning its node id
    fn grow(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &mut [usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
        importances: &mut [f64],
    ) -> usize {
        let mut stats = SseStats::default();
        for &i in indices.iter() {
            stats.push(y[i]);
        }
        let n_samples = indices.len();
        let parent_sse = stats.sse();

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || parent_sse <= 1e-12;

        let split = if should_stop {
            None
        } else {
            self.find_best_split(x, y, indices, rng, parent_sse)
        };

        let Some(split) = split else {
            self.nodes.push(TreeNode::Leaf {
                value: stats.mean(),
                n_samples,
            });
            return self.nodes.len() - 1;
        };

        importances[split.feature_idx] += parent_sse - split.child_sse;

        // Partition in place: rows going left first
        let mut boundary = 0;
        for pos in 0..indices.len() {
            if x[[indices[pos], split.feature_idx]] <= split.threshold {
                indices.swap(pos, boundary);
                boundary += 1;
            }
        }

        // Reserve the slot so the parent precedes its children
        let node_id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value: stats.mean(),
            n_samples,
        });

        let (left_indices, right_indices) = indices.split_at_mut(boundary);
        let left = self.grow(x, y, left_indices, depth + 1, rng, importances);
        let right = self.grow(x, y, right_indices, depth + 1, rng, importances);

        self.nodes[node_id] = TreeNode::Split {
            feature_idx: split.feature_idx,
            threshold: split.threshold,
            left,
            right,
            n_samples,
            impurity: parent_sse / n_samples as f64,
        };
        node_id
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        rng: &mut ChaCha8Rng,
        parent_sse: f64,
    ) -> Option<SplitCandidate> {
        let n_features = self.n_features;
        let n_try = self.max_features.unwrap_or(n_features).min(n_features);
        let features: Vec<usize> = if n_try < n_features {
            index::sample(rng, n_features, n_try).into_vec()
        } else {
            (0..n_features).collect()
        };

        let min_leaf = self.min_samples_leaf;
        let n = indices.len();
        let mut best: Option<SplitCandidate> = None;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature_idx in features {
            pairs.clear();
            pairs.extend(indices.iter().map(|&i| (x[[i, feature_idx]], y[i])));
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut left = SseStats::default();
            let mut right = SseStats::default();
            for &(_, v) in &pairs {
                right.push(v);
            }

            for pos in 1..n {
                let (prev_x, prev_y) = pairs[pos - 1];
                left.push(prev_y);
                right.remove(prev_y);

                if pos < min_leaf || n - pos < min_leaf || prev_x >= pairs[pos].0 {
                    continue;
                }

                let child_sse = left.sse() + right.sse();
                if best.as_ref().map_or(true, |b| child_sse < b.child_sse) {
                    let mut threshold = (prev_x + pairs[pos].0) / 2.0;
                    // Adjacent floats can round the midpoint up to the right value
                    if threshold >= pairs[pos].0 {
                        threshold = prev_x;
                    }
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold,
                        child_sse,
                    });
                }
            }
        }

        best.filter(|b| parent_sse - b.child_sse > 1e-12 * parent_sse.max(1.0))
    }

    pub fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// Predict a single row
    pub fn predict_row(&self, row: ArrayView1<f64>) -> Result<f64> {
        let mut node_id = 0;
        loop {
            match self.nodes.get(node_id).ok_or(PipelineError::ModelNotFitted)? {
                TreeNode::Leaf { value, .. } => return Ok(*value),
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node_id = if row[*feature_idx] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(PipelineError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(PipelineError::ShapeMismatch {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        x.rows().into_iter().map(|row| self.predict_row(row)).collect::<Result<Vec<f64>>>().map(Array1::from_vec)
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth (a lone leaf has depth 0)
    pub fn depth(&self) -> usize {
        fn node_depth(nodes: &[TreeNode], id: usize) -> usize {
            match &nodes[id] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + node_depth(nodes, *left).max(node_depth(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            node_depth(&self.nodes, 0)
        }
    }

    /// Get number of leaves
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_fits_training_data_exactly() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = RegressionTree::new();
        tree.fit(&x, &y, &mut rng()).unwrap();

        let predictions = tree.predict(&x).unwrap();
        assert_eq!(predictions, y);
        assert_eq!(tree.n_leaves(), 5);
    }

    #[test]
    fn test_step_function_single_split() {
        let x = array![[1.0, 7.0], [2.0, 3.0], [3.0, 9.0], [4.0, 1.0]];
        let y = array![0.0, 0.0, 10.0, 10.0];

        let mut tree = RegressionTree::new();
        tree.fit(&x, &y, &mut rng()).unwrap();

        assert_eq!(tree.depth(), 1);
        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
        assert_eq!(tree.predict(&array![[2.4, 0.0], [2.6, 0.0]]).unwrap(), array![0.0, 10.0]);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];

        let mut tree = RegressionTree::new().with_max_depth(Some(2));
        tree.fit(&x, &y, &mut rng()).unwrap();
        assert!(tree.depth() <= 2);
        assert!(tree.n_leaves() <= 4);
    }

    #[test]
    fn test_min_samples_leaf() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0, 60.0];

        let mut tree = RegressionTree::new().with_min_samples_leaf(3);
        tree.fit(&x, &y, &mut rng()).unwrap();
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![4.0, 4.0, 4.0];
        let mut tree = RegressionTree::new();
        tree.fit(&x, &y, &mut rng()).unwrap();
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_unfitted() {
        let tree = RegressionTree::new();
        assert!(matches!(tree.predict(&array![[1.0]]), Err(PipelineError::ModelNotFitted)));
    }
}
