use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::path::Path;
use tracing::info;

use crate::domain::errors::MlError;
use crate::domain::normalize::StandardScaler;
use crate::domain::signal::{LabeledSignal, Recommendation, SignalFeatures, SignalPrediction};
use crate::infrastructure::artifact::ArtifactStore;

/// Artifact base name; the store derives the companion file names from it.
pub const CLASSIFIER_ARTIFACT: &str = "signal_classifier";

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone, Copy)]
pub struct ClassifierConfig {
    pub n_trees: usize,
    pub max_depth: u16,
    pub test_fraction: f64,
    pub seed: u64,
    pub corpus_size: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            test_fraction: 0.2,
            seed: 42,
            corpus_size: 10_000,
        }
    }
}

/// Held-out evaluation of one trained classifier.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub train_samples: usize,
    pub test_samples: usize,
    pub accuracy: f64,
    pub per_class: [ClassMetrics; 2],
}

#[derive(Debug, Clone)]
pub struct ClassMetrics {
    pub label: &'static str,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Profitability scoring service.
///
/// Owns the artifact path and, once trained or loaded, the forest and its
/// paired scaler. There is no ambient global model: callers construct one
/// of these and pass it around.
pub struct SignalClassifier {
    store: ArtifactStore,
    config: ClassifierConfig,
    model: Option<(Forest, StandardScaler)>,
}

impl SignalClassifier {
    /// Opens the service against a model directory, loading the persisted
    /// artifact when a complete pair is present. A half-present or
    /// unreadable pair is an error, not a silent cold start.
    pub fn open(model_dir: &Path, config: ClassifierConfig) -> Result<Self, MlError> {
        let store = ArtifactStore::new(model_dir, CLASSIFIER_ARTIFACT);
        let model = store.load_if_present::<Forest, StandardScaler>()?;
        if model.is_some() {
            info!("loaded signal classifier from {}", model_dir.display());
        }
        Ok(Self {
            store,
            config,
            model,
        })
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Trains on a labeled corpus and atomically replaces the persisted
    /// artifact. The split is stratified per class; the training side is
    /// rebalanced by upsampling before the scaler and forest are fitted.
    pub fn train(&mut self, corpus: &[LabeledSignal]) -> Result<TrainSummary, MlError> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let (train_set, test_set) = stratified_split(corpus, self.config.test_fraction, &mut rng)?;
        let train_set = upsample_to_parity(train_set, &mut rng);

        let train_vectors: Vec<Vec<f64>> =
            train_set.iter().map(|s| s.features.to_vector()).collect();
        let scaler = StandardScaler::fit(&train_vectors)?;

        let x_train = DenseMatrix::from_2d_vec(&scaler.transform(&train_vectors))
            .map_err(|e| MlError::Data {
                reason: format!("training matrix: {e}"),
            })?;
        let y_train: Vec<f64> = train_set
            .iter()
            .map(|s| if s.is_profitable { 1.0 } else { 0.0 })
            .collect();

        info!(
            "fitting random forest ({} trees, depth {}) on {} samples",
            self.config.n_trees,
            self.config.max_depth,
            train_set.len()
        );
        let params = RandomForestRegressorParameters::default()
            .with_n_trees(self.config.n_trees)
            .with_max_depth(self.config.max_depth)
            .with_seed(self.config.seed);
        let forest = Forest::fit(&x_train, &y_train, params).map_err(|e| MlError::Data {
            reason: format!("forest training failed: {e}"),
        })?;

        let summary = evaluate(&forest, &scaler, &test_set, train_set.len())?;

        self.store.save(&forest, &scaler)?;
        self.model = Some((forest, scaler));
        Ok(summary)
    }

    /// Scores one signal with the loaded artifact.
    pub fn predict(&self, features: &SignalFeatures) -> Result<SignalPrediction, MlError> {
        let (forest, scaler) = self.model.as_ref().ok_or_else(|| MlError::NotTrained {
            reason: "no classifier artifact is loaded and training was not requested".to_string(),
        })?;

        let scaled = scaler.transform_row(&features.to_vector());
        let vote = forest_vote(forest, &scaled)?;
        let confidence = smoothed_confidence(vote, self.config.n_trees);

        Ok(SignalPrediction {
            is_profitable: confidence > 0.5,
            confidence,
            recommendation: Recommendation::from_confidence(confidence),
        })
    }
}

fn forest_vote(forest: &Forest, scaled_row: &[f64]) -> Result<f64, MlError> {
    let matrix = DenseMatrix::from_2d_vec(&vec![scaled_row.to_vec()]).map_err(|e| MlError::Data {
        reason: format!("inference matrix: {e}"),
    })?;
    let predictions = forest.predict(&matrix).map_err(|e| MlError::Data {
        reason: format!("forest prediction failed: {e}"),
    })?;
    predictions
        .first()
        .copied()
        .map(|v| v.clamp(0.0, 1.0))
        .ok_or_else(|| MlError::Data {
            reason: "forest returned no prediction".to_string(),
        })
}

/// Laplace-smoothed ensemble vote. A unanimous forest still reports a
/// confidence strictly inside (0, 1), which downstream consumers rely on,
/// and the ordering of raw votes is preserved.
fn smoothed_confidence(vote: f64, n_trees: usize) -> f64 {
    (vote * n_trees as f64 + 1.0) / (n_trees as f64 + 2.0)
}

/// Per-class shuffle-and-cut so both labels keep the same train/test ratio.
fn stratified_split<'a>(
    corpus: &'a [LabeledSignal],
    test_fraction: f64,
    rng: &mut StdRng,
) -> Result<(Vec<&'a LabeledSignal>, Vec<&'a LabeledSignal>), MlError> {
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [false, true] {
        let mut members: Vec<&LabeledSignal> = corpus
            .iter()
            .filter(|s| s.is_profitable == class)
            .collect();
        if members.is_empty() {
            return Err(MlError::Data {
                reason: format!(
                    "training corpus has no samples with is_profitable = {class}"
                ),
            });
        }
        members.shuffle(rng);
        let n_test = ((members.len() as f64) * test_fraction).round() as usize;
        let n_test = n_test.min(members.len() - 1);
        test.extend(members.drain(..n_test));
        train.extend(members);
    }

    Ok((train, test))
}

/// Upsamples the minority class (with replacement) until both classes have
/// the same weight in the fitted forest.
fn upsample_to_parity<'a>(
    mut train: Vec<&'a LabeledSignal>,
    rng: &mut StdRng,
) -> Vec<&'a LabeledSignal> {
    let positives: Vec<&LabeledSignal> =
        train.iter().copied().filter(|s| s.is_profitable).collect();
    let negatives: Vec<&LabeledSignal> =
        train.iter().copied().filter(|s| !s.is_profitable).collect();

    let (minority, deficit) = if positives.len() < negatives.len() {
        (positives.as_slice(), negatives.len() - positives.len())
    } else {
        (negatives.as_slice(), positives.len() - negatives.len())
    };
    for _ in 0..deficit {
        train.push(minority[rng.random_range(0..minority.len())]);
    }
    train
}

fn evaluate(
    forest: &Forest,
    scaler: &StandardScaler,
    test_set: &[&LabeledSignal],
    train_samples: usize,
) -> Result<TrainSummary, MlError> {
    let mut correct = 0;
    // Confusion counts indexed by [actual][predicted], 0 = not profitable.
    let mut confusion = [[0usize; 2]; 2];

    for sample in test_set {
        let scaled = scaler.transform_row(&sample.features.to_vector());
        let predicted = forest_vote(forest, &scaled)? > 0.5;
        if predicted == sample.is_profitable {
            correct += 1;
        }
        confusion[sample.is_profitable as usize][predicted as usize] += 1;
    }

    let metrics = |class: usize, label: &'static str| {
        let support = confusion[class][0] + confusion[class][1];
        let predicted_as = confusion[0][class] + confusion[1][class];
        let true_positive = confusion[class][class];
        let precision = if predicted_as > 0 {
            true_positive as f64 / predicted_as as f64
        } else {
            0.0
        };
        let recall = if support > 0 {
            true_positive as f64 / support as f64
        } else {
            0.0
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassMetrics {
            label,
            precision,
            recall,
            f1,
            support,
        }
    };

    Ok(TrainSummary {
        train_samples,
        test_samples: test_set.len(),
        accuracy: correct as f64 / test_set.len().max(1) as f64,
        per_class: [
            metrics(0, "not profitable"),
            metrics(1, "profitable"),
        ],
    })
}
