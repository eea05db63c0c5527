//! Trainable mirror of the rule table: a CART decision tree fitted on
//! synthetic examples labelled by [`RuleClassifier`].
//!
//! The fitted tree is only trusted after it reproduces the rule table on
//! every training example. Holdout accuracy is reported, never gating.

use std::sync::{Arc, OnceLock};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};

use super::classifier::{Classifier, RuleClassifier};
use super::features::{APTITUDE_RANGE, FEATURE_COUNT, FEATURE_NAMES, FeatureVector, SCORE_RANGE};
use crate::error::ClassifierError;
use crate::stream::StreamLabel;

/// A feature vector with its ground-truth stream.
#[derive(Debug, Clone, Copy)]
pub struct LabeledExample {
    pub vector: FeatureVector,
    pub stream: StreamLabel,
}

/// Training parameters.
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Number of synthetic examples to generate.
    pub samples: usize,
    /// RNG seed for the generator.
    pub seed: u64,
    /// Fraction of examples used for fitting; the rest is holdout.
    pub train_ratio: f64,
    pub max_depth: usize,
    /// Nodes with fewer samples become leaves.
    pub min_samples_split: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            samples: 2_000,
            seed: 42,
            train_ratio: 0.8,
            max_depth: 64,
            min_samples_split: 2,
        }
    }
}

/// Outcome of [`TreeClassifier::train`].
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub train_size: usize,
    pub holdout_size: usize,
    pub train_accuracy: f64,
    pub holdout_accuracy: f64,
    pub depth: usize,
    pub leaves: usize,
}

/// Generate `n` random questionnaires labelled by the rule table.
pub fn generate_examples(n: usize, seed: u64) -> Vec<LabeledExample> {
    let mut rng = StdRng::seed_from_u64(seed);
    let rules = RuleClassifier::new();

    (0..n)
        .filter_map(|_| {
            let vector = FeatureVector::new(
                rng.gen_range(SCORE_RANGE),
                rng.gen_range(SCORE_RANGE),
                rng.gen_range(SCORE_RANGE),
                rng.gen_range(APTITUDE_RANGE),
                rng.gen_range(APTITUDE_RANGE),
                rng.gen_bool(0.5),
                rng.gen_bool(0.5),
                rng.gen_bool(0.5),
            )
            .ok()?;
            let (_, stream) = rules.explain(&vector);
            Some(LabeledExample { vector, stream })
        })
        .collect()
}

/// Split into (train, holdout) at `train_ratio`, preserving order.
pub fn split_examples(
    examples: Vec<LabeledExample>,
    train_ratio: f64,
) -> (Vec<LabeledExample>, Vec<LabeledExample>) {
    let ratio = train_ratio.clamp(0.0, 1.0);
    let cut = ((examples.len() as f64) * ratio).round() as usize;
    let mut train = examples;
    let holdout = train.split_off(cut.min(train.len()));
    (train, holdout)
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        stream: StreamLabel,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, x: &[f64; FEATURE_COUNT]) -> StreamLabel {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { stream } => return *stream,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn leaves(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Split { left, right, .. } => left.leaves() + right.leaves(),
        }
    }
}

fn class_index(stream: StreamLabel) -> usize {
    StreamLabel::ALL
        .iter()
        .position(|s| *s == stream)
        .unwrap_or_default()
}

type Counts = [usize; StreamLabel::ALL.len()];

fn gini(counts: &Counts, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Majority label; ties go to the label listed first in `StreamLabel::ALL`.
fn majority(counts: &Counts) -> StreamLabel {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    StreamLabel::ALL[best]
}

struct Sample {
    x: [f64; FEATURE_COUNT],
    class: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn best_split(samples: &[&Sample]) -> Option<BestSplit> {
    let n = samples.len();
    if n < 2 {
        return None;
    }
    let mut totals: Counts = Default::default();
    for s in samples {
        totals[s.class] += 1;
    }

    let mut best: Option<BestSplit> = None;
    let mut order: Vec<&Sample> = samples.to_vec();

    for feature in 0..FEATURE_COUNT {
        order.sort_by(|a, b| a.x[feature].total_cmp(&b.x[feature]));

        let mut left: Counts = Default::default();
        for i in 0..n - 1 {
            left[order[i].class] += 1;
            let here = order[i].x[feature];
            let next = order[i + 1].x[feature];
            if here == next {
                continue;
            }

            let left_n = i + 1;
            let right_n = n - left_n;
            let mut right = totals;
            for (r, l) in right.iter_mut().zip(left.iter()) {
                *r -= l;
            }
            let impurity = (left_n as f64 * gini(&left, left_n)
                + right_n as f64 * gini(&right, right_n))
                / n as f64;

            if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                best = Some(BestSplit {
                    feature,
                    threshold: (here + next) / 2.0,
                    impurity,
                });
            }
        }
    }
    best
}

fn build(samples: &[&Sample], depth: usize, config: &TreeConfig) -> Node {
    let mut counts: Counts = Default::default();
    for s in samples {
        counts[s.class] += 1;
    }
    let leaf = Node::Leaf {
        stream: majority(&counts),
    };

    let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
    if pure || depth >= config.max_depth || samples.len() < config.min_samples_split {
        return leaf;
    }

    // Zero-gain splits are still taken: the rule table has interactions
    // (coding AND math) that need a split before any gain shows up.
    let Some(split) = best_split(samples) else {
        return leaf;
    };

    let (left, right): (Vec<&Sample>, Vec<&Sample>) = samples
        .iter()
        .partition(|s| s.x[split.feature] <= split.threshold);

    Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(build(&left, depth + 1, config)),
        right: Box::new(build(&right, depth + 1, config)),
    }
}

/// Decision-tree classifier. Read-only once fitted.
#[derive(Debug, Clone)]
pub struct TreeClassifier {
    root: Node,
}

impl TreeClassifier {
    /// Fit a tree on labelled examples.
    pub fn fit(examples: &[LabeledExample], config: &TreeConfig) -> Result<Self, ClassifierError> {
        if examples.is_empty() {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        let samples: Vec<Sample> = examples
            .iter()
            .map(|e| Sample {
                x: e.vector.as_array(),
                class: class_index(e.stream),
            })
            .collect();
        let refs: Vec<&Sample> = samples.iter().collect();
        Ok(Self {
            root: build(&refs, 0, config),
        })
    }

    /// Generate data from the rule table, fit, and verify self-consistency.
    pub fn train(config: &TreeConfig) -> Result<(Self, TrainingReport), ClassifierError> {
        let examples = generate_examples(config.samples, config.seed);
        let (train, holdout) = split_examples(examples, config.train_ratio);

        let tree = Self::fit(&train, config)?;

        let mismatches = train
            .iter()
            .filter(|e| tree.classify(&e.vector) != e.stream)
            .count();
        if mismatches > 0 {
            warn!(mismatches, "Decision tree disagrees with rule table on training data");
            return Err(ClassifierError::SelfConsistency { mismatches });
        }

        let report = TrainingReport {
            train_size: train.len(),
            holdout_size: holdout.len(),
            train_accuracy: tree.accuracy(&train),
            holdout_accuracy: tree.accuracy(&holdout),
            depth: tree.root.depth(),
            leaves: tree.root.leaves(),
        };
        info!(
            train = report.train_size,
            holdout = report.holdout_size,
            holdout_accuracy = report.holdout_accuracy,
            depth = report.depth,
            leaves = report.leaves,
            "Decision tree trained"
        );
        Ok((tree, report))
    }

    /// Fraction of examples classified as labelled. Empty input scores 1.0.
    pub fn accuracy(&self, examples: &[LabeledExample]) -> f64 {
        if examples.is_empty() {
            return 1.0;
        }
        let hits = examples
            .iter()
            .filter(|e| self.classify(&e.vector) == e.stream)
            .count();
        hits as f64 / examples.len() as f64
    }

    /// Names of the features used at split nodes, root first.
    pub fn split_features(&self) -> Vec<&'static str> {
        fn walk(node: &Node, out: &mut Vec<&'static str>) {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                out.push(FEATURE_NAMES[*feature]);
                walk(left, out);
                walk(right, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }
}

impl Classifier for TreeClassifier {
    fn name(&self) -> &str {
        "tree"
    }

    fn classify(&self, vector: &FeatureVector) -> StreamLabel {
        self.root.predict(&vector.as_array())
    }
}

/// Process-wide fitted tree and its report.
#[derive(Debug, Clone)]
pub struct SharedTree {
    pub classifier: Arc<TreeClassifier>,
    pub report: TrainingReport,
}

static SHARED_TREE: OnceLock<Result<SharedTree, ClassifierError>> = OnceLock::new();

/// The tree trained with [`TreeConfig::default`], fitted once per process.
pub fn shared_tree() -> Result<SharedTree, ClassifierError> {
    SHARED_TREE
        .get_or_init(|| {
            TreeClassifier::train(&TreeConfig::default()).map(|(tree, report)| SharedTree {
                classifier: Arc::new(tree),
                report,
            })
        })
        .clone()
}
