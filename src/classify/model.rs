//! Two-head linear text classifier.
//!
//! A shared TF-IDF representation (unigrams + bigrams) feeds two independent
//! multinomial logistic-regression heads: one predicts the intent label, the
//! other the routing queue. The fitted model is persisted as JSON.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ClassificationResult;
use crate::dataset::{Dataset, MessageRecord};
use crate::error::{DatasetError, ModelError};

/// Intent labels the model is trained on; anything else maps to `general`.
pub const INTENTS: [&str; 4] = ["general", "fraud", "credit", "dispute"];

/// Routing queues the model is trained on.
pub const QUEUES: [&str; 4] = [
    "General Banking",
    "Fraud/Economic Crime Prevention",
    "Credit/Risk",
    "Disputes/Chargebacks",
];

/// Queue used when nothing better is known.
pub const DEFAULT_QUEUE: &str = "General Banking";

/// Seed for the training subset shuffle.
pub const SPLIT_SEED: u64 = 42;

/// Tokens are runs of two or more word characters.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w\w+\b").unwrap());

/// Map a raw dataset label onto the closed intent set.
pub fn normalize_label(label: &str) -> String {
    let label = label.trim().to_lowercase();
    if INTENTS.contains(&label.as_str()) {
        label
    } else {
        INTENTS[0].to_string()
    }
}

/// Map a raw queue string onto the closed queue set (exact, then substring match).
pub fn normalize_queue(queue: &str) -> String {
    let queue = queue.trim();
    if let Some(exact) = QUEUES.iter().find(|q| **q == queue) {
        return exact.to_string();
    }
    let lowered = queue.to_lowercase();
    QUEUES
        .iter()
        .find(|q| lowered.contains(&q.to_lowercase()))
        .unwrap_or(&DEFAULT_QUEUE)
        .to_string()
}

/// Training hyper-parameters.
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    /// Fraction of rows used for training, in (0, 1].
    pub train_ratio: f64,
    /// Minimum number of documents a term must appear in.
    pub min_df: usize,
    /// Vocabulary cap (most frequent terms kept).
    pub max_features: usize,
    /// Full-batch gradient-descent iterations per head.
    pub iterations: usize,
    pub learning_rate: f64,
    /// Inverse regularisation strength.
    pub c: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            train_ratio: 1.0,
            min_df: 2,
            max_features: 5000,
            iterations: 500,
            learning_rate: 1.0,
            c: 1.0,
        }
    }
}

/// Sparse feature vector: `(feature index, value)` pairs.
pub type SparseVector = Vec<(usize, f64)>;

// ── Shared representation ───────────────────────────────────────────

/// Lower-cased unigram and bigram terms of a document.
fn terms(doc: &str) -> Vec<String> {
    let lowered = doc.to_lowercase();
    let tokens: Vec<&str> = TOKEN_RE.find_iter(&lowered).map(|m| m.as_str()).collect();
    let mut out: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    out.extend(tokens.windows(2).map(|w| format!("{} {}", w[0], w[1])));
    out
}

/// TF-IDF vectorizer with smoothed IDF and L2-normalised output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn fit(docs: &[&str], options: &TrainingOptions) -> Result<Self, ModelError> {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_freq: HashMap<String, usize> = HashMap::new();
        for doc in docs {
            let doc_terms = terms(doc);
            let unique: HashSet<&String> = doc_terms.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
            for term in doc_terms {
                *total_freq.entry(term).or_default() += 1;
            }
        }

        let mut kept: Vec<(String, usize)> = total_freq
            .into_iter()
            .filter(|(term, _)| doc_freq.get(term).copied().unwrap_or(0) >= options.min_df)
            .collect();
        if kept.is_empty() {
            return Err(ModelError::EmptyVocabulary);
        }
        kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        kept.truncate(options.max_features);

        // Feature indices follow lexical order of the kept terms.
        let mut kept_terms: Vec<String> = kept.into_iter().map(|(term, _)| term).collect();
        kept_terms.sort();

        let n = docs.len() as f64;
        let idf = kept_terms
            .iter()
            .map(|t| {
                let df = doc_freq.get(t).copied().unwrap_or(0) as f64;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        let vocabulary = kept_terms
            .into_iter()
            .enumerate()
            .map(|(i, t)| (t, i))
            .collect();

        Ok(Self { vocabulary, idf })
    }

    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    /// Every vocabulary index must address an IDF weight.
    fn validate(&self) -> Result<(), String> {
        match self.vocabulary.iter().find(|&(_, &idx)| idx >= self.idf.len()) {
            Some((term, idx)) => Err(format!(
                "term '{term}' has index {idx} but only {} idf weights",
                self.idf.len()
            )),
            None => Ok(()),
        }
    }

    pub fn transform(&self, doc: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in terms(doc) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }
        let mut vector: SparseVector = counts
            .into_iter()
            .filter_map(|(idx, tf)| self.idf.get(idx).map(|w| (idx, tf * w)))
            .collect();
        let norm = vector.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

// ── Prediction head ─────────────────────────────────────────────────

/// Multinomial logistic-regression head over a sparse feature space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxHead {
    classes: Vec<String>,
    /// One weight row per class.
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl SoftmaxHead {
    pub fn fit(
        xs: &[SparseVector],
        ys: &[String],
        n_features: usize,
        options: &TrainingOptions,
    ) -> Self {
        let mut classes: Vec<String> = ys.to_vec();
        classes.sort();
        classes.dedup();
        let class_index: HashMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let targets: Vec<usize> = ys.iter().map(|y| class_index[y.as_str()]).collect();

        let k = classes.len();
        let mut head = Self {
            weights: vec![vec![0.0; n_features]; k],
            bias: vec![0.0; k],
            classes,
        };
        if k < 2 || xs.is_empty() {
            return head;
        }

        let n = xs.len() as f64;
        let l2 = 1.0 / (options.c * n);
        for _ in 0..options.iterations {
            let mut grad_w = vec![vec![0.0; n_features]; k];
            let mut grad_b = vec![0.0; k];
            for (x, &target) in xs.iter().zip(&targets) {
                let probs = head.probabilities(x);
                for (class, p) in probs.iter().enumerate() {
                    let err = p - if class == target { 1.0 } else { 0.0 };
                    grad_b[class] += err;
                    for &(idx, value) in x {
                        grad_w[class][idx] += err * value;
                    }
                }
            }
            for class in 0..k {
                for (w, g) in head.weights[class].iter_mut().zip(&grad_w[class]) {
                    *w -= options.learning_rate * (g / n + l2 * *w);
                }
                head.bias[class] -= options.learning_rate * grad_b[class] / n;
            }
        }
        head
    }

    /// Class probabilities, in `classes` order.
    pub fn probabilities(&self, x: &SparseVector) -> Vec<f64> {
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                b + x
                    .iter()
                    .filter_map(|&(idx, v)| row.get(idx).map(|w| w * v))
                    .sum::<f64>()
            })
            .collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }

    /// Most probable class and its probability.
    pub fn predict(&self, x: &SparseVector) -> (&str, f64) {
        let probs = self.probabilities(x);
        let (best, p) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });
        match self.classes.get(best) {
            Some(class) => (class.as_str(), p),
            None => ("", 0.0),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// One weight row and one bias per class, each row `n_features` wide.
    fn validate(&self, name: &str, n_features: usize) -> Result<(), String> {
        let k = self.classes.len();
        if k == 0 {
            return Err(format!("{name} head has no classes"));
        }
        if self.weights.len() != k || self.bias.len() != k {
            return Err(format!(
                "{name} head has {k} classes, {} weight rows and {} biases",
                self.weights.len(),
                self.bias.len()
            ));
        }
        if let Some(row) = self.weights.iter().find(|row| row.len() != n_features) {
            return Err(format!(
                "{name} head row has {} weights, expected {n_features}",
                row.len()
            ));
        }
        Ok(())
    }
}

// ── Multi-task model ────────────────────────────────────────────────

/// Shared representation plus intent and queue heads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTaskModel {
    vectorizer: TfidfVectorizer,
    intent_head: SoftmaxHead,
    queue_head: SoftmaxHead,
}

impl MultiTaskModel {
    /// Fit both heads on the dataset (or a seeded subset of it).
    pub fn train(dataset: &Dataset, options: &TrainingOptions) -> Result<Self, ModelError> {
        let rows = training_rows(dataset.records(), options.train_ratio)?;
        if rows.is_empty() {
            return Err(ModelError::Dataset(DatasetError::Empty));
        }

        let docs: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
        let intents: Vec<String> = rows.iter().map(|r| normalize_label(&r.label)).collect();
        let queues: Vec<String> = rows
            .iter()
            .map(|r| normalize_queue(&r.suggested_queue))
            .collect();

        let vectorizer = TfidfVectorizer::fit(&docs, options)?;
        let xs: Vec<SparseVector> = docs.iter().map(|d| vectorizer.transform(d)).collect();
        let n_features = vectorizer.n_features();

        let intent_head = SoftmaxHead::fit(&xs, &intents, n_features, options);
        let queue_head = SoftmaxHead::fit(&xs, &queues, n_features, options);

        info!(
            rows = rows.len(),
            features = n_features,
            intents = intent_head.classes().len(),
            queues = queue_head.classes().len(),
            "Trained multi-task classifier"
        );

        Ok(Self {
            vectorizer,
            intent_head,
            queue_head,
        })
    }

    /// Predict intent and queue; confidence is the smaller of the two heads'
    /// top-class probabilities.
    pub fn predict(&self, text: &str) -> ClassificationResult {
        let x = self.vectorizer.transform(text);
        let (intent, p_intent) = self.intent_head.predict(&x);
        let (queue, p_queue) = self.queue_head.predict(&x);
        ClassificationResult::new(intent, queue, p_intent.min(p_queue))
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(self)?;
        std::fs::write(path, bytes)?;
        debug!(path = %path.display(), "Saved model artifact");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path)?;
        let corrupt = |reason: String| ModelError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };
        let model: Self = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        model.validate().map_err(corrupt)?;
        Ok(model)
    }

    /// Dimensions of the vectorizer and both heads agree.
    fn validate(&self) -> Result<(), String> {
        self.vectorizer.validate()?;
        let n_features = self.vectorizer.n_features();
        self.intent_head.validate("intent", n_features)?;
        self.queue_head.validate("queue", n_features)
    }
}

/// Rows used for training: all of them, or a seeded shuffle prefix.
fn training_rows(
    records: &[MessageRecord],
    train_ratio: f64,
) -> Result<Vec<&MessageRecord>, ModelError> {
    if !(train_ratio > 0.0 && train_ratio <= 1.0) {
        return Err(ModelError::InvalidRatio(train_ratio));
    }
    let mut rows: Vec<&MessageRecord> = records.iter().collect();
    if train_ratio < 1.0 {
        let mut rng = StdRng::seed_from_u64(SPLIT_SEED);
        rows.shuffle(&mut rng);
        let keep = ((rows.len() as f64) * train_ratio).ceil() as usize;
        rows.truncate(keep.max(1));
    }
    Ok(rows)
}
