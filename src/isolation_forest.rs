//! Isolation Forest for unsupervised flaky-execution detection
//!
//! Implements the Isolation Forest algorithm over the per-execution feature
//! vector `(ewma_failure_rate, z_score, failure_rate)`. It catches flaky
//! patterns a fixed z-score threshold misses, such as a test that fails at a
//! steady, moderate rate with little variance.
//!
//! # Algorithm Overview
//!
//! Isolation Forest isolates anomalies by randomly partitioning the feature space.
//! Anomalies are easier to isolate (shorter paths in trees) compared to normal points.
//!
//! Each tree is an arena of nodes addressed by index. Every tree draws its
//! randomness from its own `StdRng`, seeded from the forest seed and the tree
//! index, so trees can be built on any number of threads and the forest is
//! identical for a given seed.
//!
//! # References
//!
//! Liu, F. T., Ting, K. M., & Zhou, Z. H. (2008). Isolation forest.
//! In 2008 Eighth IEEE International Conference on Data Mining (pp. 413-422).

use crate::detector::DetectorConfig;
use crate::record::AnnotatedRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Default sub-sampling size (following original paper)
pub const DEFAULT_SUBSAMPLE_SIZE: usize = 256;

/// Euler-Mascheroni constant for the harmonic number approximation
const EULER_GAMMA: f64 = 0.5772156649;

/// Average path length of an unsuccessful BST search over `n` points
///
/// `c(n) = 2 * H(n - 1) - 2 * (n - 1) / n` with `H(i) ≈ ln(i) + γ`,
/// and `c(n) = 0` for `n <= 1`.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let m = n as f64;
    let harmonic = (m - 1.0).ln() + EULER_GAMMA;
    2.0 * harmonic - 2.0 * (m - 1.0) / m
}

/// A node in an Isolation Tree arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IsolationNode {
    /// Internal node: rows with `row[feature] < threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Leaf node with the number of training rows that reached it
    Leaf { size: usize },
}

/// Single Isolation Tree; `nodes[0]` is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<IsolationNode>,
}

impl IsolationTree {
    /// Build a tree over the rows selected by `sample`
    fn build(rows: &[Vec<f64>], sample: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = IsolationTree { nodes: Vec::new() };
        tree.grow(rows, sample, 0, max_depth, rng);
        tree
    }

    /// Recursively grow the subtree for `sample`, returning its arena index
    fn grow(
        &mut self,
        rows: &[Vec<f64>],
        sample: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let slot = self.nodes.len();
        self.nodes.push(IsolationNode::Leaf { size: sample.len() });

        if sample.len() <= 1 || depth >= max_depth {
            return slot;
        }

        // Only features that still vary inside this node can split it
        let candidates = splittable_features(rows, &sample);
        if candidates.is_empty() {
            return slot;
        }

        let (feature, min_val, max_val) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(min_val..max_val);

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = sample
            .into_iter()
            .partition(|&idx| rows[idx][feature] < threshold);

        // A split drawn exactly at the minimum separates nothing
        if left_rows.is_empty() || right_rows.is_empty() {
            return slot;
        }

        let left = self.grow(rows, left_rows, depth + 1, max_depth, rng);
        let right = self.grow(rows, right_rows, depth + 1, max_depth, rng);
        self.nodes[slot] = IsolationNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    /// Depth of the leaf `row` lands in, plus `c(leaf_size)` for unresolved rows
    pub fn path_length(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        let mut depth = 0usize;

        while let Some(node) = self.nodes.get(idx) {
            match node {
                IsolationNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1;
                }
                IsolationNode::Leaf { size } => {
                    return depth as f64 + average_path_length(*size);
                }
            }
        }

        depth as f64
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[IsolationNode] {
        &self.nodes
    }
}

/// `(feature, min, max)` for every feature that is not constant over `sample`
fn splittable_features(rows: &[Vec<f64>], sample: &[usize]) -> Vec<(usize, f64, f64)> {
    let num_features = rows[sample[0]].len();
    (0..num_features)
        .filter_map(|feature| {
            let (min_val, max_val) = sample.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), &idx| (lo.min(rows[idx][feature]), hi.max(rows[idx][feature])),
            );
            (max_val > min_val).then_some((feature, min_val, max_val))
        })
        .collect()
}

/// Derive an independent per-tree seed (SplitMix64 finalizer)
fn tree_seed(seed: u64, tree_index: usize) -> u64 {
    let mut z = seed.wrapping_add((tree_index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Isolation Forest - ensemble of Isolation Trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    num_trees: usize,
    max_samples: usize,
    /// Subsample size actually used by the last `fit`
    subsample_size: usize,
    seed: u64,
}

impl IsolationForest {
    /// Create a new Isolation Forest
    pub fn new(num_trees: usize, max_samples: Option<usize>, seed: u64) -> Self {
        let max_samples = max_samples.unwrap_or(DEFAULT_SUBSAMPLE_SIZE);
        IsolationForest {
            trees: Vec::new(),
            num_trees,
            max_samples,
            subsample_size: max_samples,
            seed,
        }
    }

    /// Fit the model on training data
    ///
    /// Each tree samples `min(max_samples, rows.len())` rows without
    /// replacement. Refitting discards the previous trees.
    pub fn fit(&mut self, rows: &[Vec<f64>]) {
        self.trees.clear();
        if rows.is_empty() {
            return;
        }

        let sample_size = self.max_samples.min(rows.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let seed = self.seed;

        self.subsample_size = sample_size;
        self.trees = (0..self.num_trees)
            .into_par_iter()
            .map(|tree_index| {
                let mut rng = StdRng::seed_from_u64(tree_seed(seed, tree_index));
                let sample = rand::seq::index::sample(&mut rng, rows.len(), sample_size).into_vec();
                IsolationTree::build(rows, sample, max_depth, &mut rng)
            })
            .collect();
    }

    /// Calculate anomaly score for a sample (higher = more anomalous)
    /// Returns score in range (0, 1]
    pub fn anomaly_score(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }

        // Average path length across all trees
        let avg_path_length: f64 = self
            .trees
            .iter()
            .map(|tree| tree.path_length(row))
            .sum::<f64>()
            / self.trees.len() as f64;

        // Normalize by expected path length; a single-row subsample carries
        // no isolation information
        let c = average_path_length(self.subsample_size);
        if c <= 0.0 {
            return 0.5;
        }
        2_f64.powf(-avg_path_length / c)
    }

    /// Score every row in parallel, preserving input order
    pub fn score_all(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.par_iter().map(|row| self.anomaly_score(row)).collect()
    }

    pub fn trees(&self) -> &[IsolationTree] {
        &self.trees
    }

    pub fn subsample_size(&self) -> usize {
        self.subsample_size
    }
}

/// Per-feature standardization to zero mean and unit variance
///
/// Uses the population standard deviation. A feature with zero variance
/// maps to a constant 0.0 column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl Standardizer {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let num_features = rows.first().map_or(0, |row| row.len());
        let n = rows.len() as f64;
        let mut means = vec![0.0; num_features];
        let mut stds = vec![0.0; num_features];

        if rows.is_empty() {
            return Self { means, stds };
        }

        for feature in 0..num_features {
            let mean = rows.iter().map(|row| row[feature]).sum::<f64>() / n;
            let variance = rows
                .iter()
                .map(|row| (row[feature] - mean).powi(2))
                .sum::<f64>()
                / n;
            means[feature] = mean;
            stds[feature] = variance.sqrt();
        }

        Self { means, stds }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(&value, (&mean, &std))| {
                if std > 0.0 {
                    (value - mean) / std
                } else {
                    0.0
                }
            })
            .collect()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }
}

/// The `(1 - contamination)` quantile of `scores`, linearly interpolated
pub fn contamination_threshold(scores: &[f64], contamination: f64) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }

    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = (1.0 - contamination) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Flag scores at or above the contamination quantile
///
/// When rows tied exactly at the threshold would push the flagged count past
/// `ceil(contamination * n)`, the tied rows stay unflagged and only strictly
/// greater scores are flagged. Identical scores therefore flag nothing.
pub fn flag_outliers(scores: &[f64], contamination: f64) -> Vec<bool> {
    let Some(threshold) = contamination_threshold(scores, contamination) else {
        return Vec::new();
    };

    let budget = (contamination * scores.len() as f64 - 1e-9).ceil().max(0.0) as usize;
    let at_or_above = scores.iter().filter(|&&s| s >= threshold).count();

    if at_or_above <= budget {
        scores.iter().map(|&s| s >= threshold).collect()
    } else {
        scores.iter().map(|&s| s > threshold).collect()
    }
}

/// Run the isolation forest over annotated records
///
/// Sets `anomaly_score` and `is_flaky_ml` on every record and returns the
/// number flagged. Records with non-finite features are left out of training
/// and labelled non-anomalous. With fewer than two usable records the stage
/// is a no-op.
pub fn label_anomalies(records: &mut [AnnotatedRecord], config: &DetectorConfig) -> usize {
    for record in records.iter_mut() {
        record.is_flaky_ml = false;
        record.anomaly_score = None;
    }

    let mut trainable = Vec::with_capacity(records.len());
    let mut rows = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        let features = record.features();
        if features.iter().all(|f| f.is_finite()) {
            trainable.push(idx);
            rows.push(features.to_vec());
        } else {
            tracing::warn!(
                "Excluding execution {} of {} from isolation forest: non-finite features {:?}",
                record.record.execution_id,
                record.test_id(),
                features
            );
        }
    }

    if rows.len() < 2 {
        tracing::warn!(
            "Insufficient data for isolation forest (need at least 2 samples, got {})",
            rows.len()
        );
        return 0;
    }

    let scaler = Standardizer::fit(&rows);
    let scaled: Vec<Vec<f64>> = rows.iter().map(|row| scaler.transform(row)).collect();

    tracing::info!(
        "Training isolation forest: {} trees, contamination={}, seed={}",
        config.ensemble_size,
        config.ml_contamination,
        config.random_seed
    );
    let mut forest = IsolationForest::new(
        config.ensemble_size,
        Some(config.max_samples),
        config.random_seed,
    );
    forest.fit(&scaled);

    let scores = forest.score_all(&scaled);
    let flags = flag_outliers(&scores, config.ml_contamination);

    let mut flagged = 0;
    for ((&idx, &score), &flag) in trainable.iter().zip(&scores).zip(&flags) {
        records[idx].anomaly_score = Some(score);
        records[idx].is_flaky_ml = flag;
        if flag {
            flagged += 1;
        }
    }

    tracing::debug!("Isolation forest flagged {} executions", flagged);
    flagged
}
