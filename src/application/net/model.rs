use ndarray::{Array1, arr1};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::adam::AdamParams;
use super::dense::{Activation, DenseLayer};
use super::lstm::LstmLayer;
use crate::domain::errors::MlError;

/// Stacked recurrent regressor for next-day implied vol:
/// LSTM → dropout → LSTM → dropout → Dense(ReLU) → Dense(1).
///
/// Sequences come in as flat slices of scalars (one value per timestep).
/// Dropout is the inverted kind and only active during training, so
/// inference is deterministic and needs no rescaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceRegressor {
    lstm1: LstmLayer,
    lstm2: LstmLayer,
    hidden: DenseLayer,
    output: DenseLayer,
    dropout: f64,
    #[serde(skip)]
    drop_mask_seq: Option<Vec<Array1<f64>>>,
    #[serde(skip)]
    drop_mask_last: Option<Array1<f64>>,
}

/// Training-loop knobs. Validation is the chronological tail of the data,
/// never a shuffled subset, so the holdout stays out of the training past.
#[derive(Debug, Clone, Copy)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub validation_split: f64,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.001,
            validation_split: 0.2,
            seed: 42,
        }
    }
}

/// Loss trace for one epoch; validation fields are absent when the dataset
/// is too small to hold anything out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_mse: f64,
    pub train_mae: f64,
    pub val_mse: Option<f64>,
    pub val_mae: Option<f64>,
}

impl SequenceRegressor {
    pub fn new(
        hidden1: usize,
        hidden2: usize,
        dense_width: usize,
        dropout: f64,
        rng: &mut StdRng,
    ) -> Self {
        Self {
            lstm1: LstmLayer::new(1, hidden1, rng),
            lstm2: LstmLayer::new(hidden1, hidden2, rng),
            hidden: DenseLayer::new(hidden2, dense_width, Activation::ReLU, rng),
            output: DenseLayer::new(dense_width, 1, Activation::Linear, rng),
            dropout: dropout.clamp(0.0, 1.0),
            drop_mask_seq: None,
            drop_mask_last: None,
        }
    }

    /// Deterministic forward pass used for scoring and evaluation.
    pub fn infer(&self, sequence: &[f64]) -> f64 {
        let xs: Vec<Array1<f64>> = sequence.iter().map(|&v| arr1(&[v])).collect();
        let h1 = self.lstm1.infer_seq(&xs);
        let h2 = self.lstm2.infer_seq(&h1);
        let last = h2.last().expect("non-empty sequence");
        let dense = self.hidden.infer(last);
        self.output.infer(&dense)[0]
    }

    fn forward_train(&mut self, sequence: &[f64], rng: &mut StdRng) -> f64 {
        let xs: Vec<Array1<f64>> = sequence.iter().map(|&v| arr1(&[v])).collect();

        let h1 = self.lstm1.forward_seq(&xs, true);
        let masks: Vec<Array1<f64>> = h1
            .iter()
            .map(|h| dropout_mask(h.len(), self.dropout, rng))
            .collect();
        let h1_dropped: Vec<Array1<f64>> =
            h1.iter().zip(&masks).map(|(h, m)| h * m).collect();

        let h2 = self.lstm2.forward_seq(&h1_dropped, true);
        let last = h2.last().expect("non-empty sequence");
        let mask_last = dropout_mask(last.len(), self.dropout, rng);
        let last_dropped = last * &mask_last;

        let dense = self.hidden.forward(&last_dropped, true);
        let prediction = self.output.forward(&dense, true)[0];

        self.drop_mask_seq = Some(masks);
        self.drop_mask_last = Some(mask_last);
        prediction
    }

    fn backward(&mut self, d_prediction: f64) {
        let d_dense = self.output.backward(&arr1(&[d_prediction]));
        let d_last_dropped = self.hidden.backward(&d_dense);

        let mask_last = self
            .drop_mask_last
            .take()
            .expect("training forward recorded before backward");
        let d_last = &d_last_dropped * &mask_last;

        let masks = self
            .drop_mask_seq
            .take()
            .expect("training forward recorded before backward");
        let t_len = masks.len();

        // Only the final hidden state of the top layer feeds the head.
        let mut dh2_seq = vec![Array1::zeros(self.lstm2.hidden_size()); t_len];
        dh2_seq[t_len - 1] = d_last;

        let d_h1_dropped = self.lstm2.backward_seq(&dh2_seq);
        let d_h1: Vec<Array1<f64>> = d_h1_dropped
            .iter()
            .zip(&masks)
            .map(|(d, m)| d * m)
            .collect();
        self.lstm1.backward_seq(&d_h1);
    }

    fn step(&mut self, hp: &AdamParams, step: u64) {
        self.lstm1.step(hp, step);
        self.lstm2.step(hp, step);
        self.hidden.step(hp, step);
        self.output.step(hp, step);
    }

    /// Mini-batch gradient descent on MSE with MAE tracked alongside.
    /// Gradients are averaged within each batch and applied with Adam.
    pub fn fit(
        &mut self,
        features: &[Vec<f64>],
        targets: &[f64],
        opts: &TrainOptions,
    ) -> Result<Vec<EpochStats>, MlError> {
        if features.is_empty() || features.len() != targets.len() {
            return Err(MlError::Data {
                reason: format!(
                    "sequence training set is empty or misaligned ({} features, {} targets)",
                    features.len(),
                    targets.len()
                ),
            });
        }

        let n = features.len();
        let val_len = ((n as f64 * opts.validation_split).round() as usize).min(n - 1);
        let train_len = n - val_len;
        let batch_size = opts.batch_size.max(1);

        let mut rng = StdRng::seed_from_u64(opts.seed);
        let hp = AdamParams {
            learning_rate: opts.learning_rate,
            ..AdamParams::default()
        };

        let mut history = Vec::with_capacity(opts.epochs);
        let mut adam_step: u64 = 0;
        let mut indices: Vec<usize> = (0..train_len).collect();

        for epoch in 1..=opts.epochs {
            indices.shuffle(&mut rng);

            let mut sq_sum = 0.0;
            let mut abs_sum = 0.0;
            for batch in indices.chunks(batch_size) {
                for &idx in batch {
                    let prediction = self.forward_train(&features[idx], &mut rng);
                    let err = prediction - targets[idx];
                    sq_sum += err * err;
                    abs_sum += err.abs();
                    // Batch-mean scaling rides in the loss gradient, so the
                    // accumulated layer gradients are already averaged.
                    self.backward(2.0 * err / batch.len() as f64);
                }
                adam_step += 1;
                self.step(&hp, adam_step);
            }

            let stats = EpochStats {
                epoch,
                train_mse: sq_sum / train_len as f64,
                train_mae: abs_sum / train_len as f64,
                val_mse: (val_len > 0).then(|| self.mse(&features[train_len..], &targets[train_len..])),
                val_mae: (val_len > 0).then(|| self.mae(&features[train_len..], &targets[train_len..])),
            };
            if epoch % 10 == 0 || epoch == opts.epochs {
                info!(
                    "epoch {}/{}: mse={:.6} mae={:.6} val_mse={:?}",
                    epoch, opts.epochs, stats.train_mse, stats.train_mae, stats.val_mse
                );
            }
            history.push(stats);
        }

        Ok(history)
    }

    pub fn mse(&self, features: &[Vec<f64>], targets: &[f64]) -> f64 {
        let sq: f64 = features
            .iter()
            .zip(targets)
            .map(|(x, &y)| (self.infer(x) - y).powi(2))
            .sum();
        sq / features.len() as f64
    }

    pub fn mae(&self, features: &[Vec<f64>], targets: &[f64]) -> f64 {
        let abs: f64 = features
            .iter()
            .zip(targets)
            .map(|(x, &y)| (self.infer(x) - y).abs())
            .sum();
        abs / features.len() as f64
    }
}

/// Inverted dropout mask: kept units are scaled by `1/(1-rate)` so the
/// expected activation is unchanged and inference needs no rescaling.
fn dropout_mask(len: usize, rate: f64, rng: &mut StdRng) -> Array1<f64> {
    if rate <= 0.0 {
        return Array1::ones(len);
    }
    let keep = 1.0 - rate;
    Array1::from_shape_fn(len, |_| {
        if rng.random::<f64>() < keep {
            1.0 / keep
        } else {
            0.0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_problem() -> (Vec<Vec<f64>>, Vec<f64>) {
        // Next value of a noiseless ramp: target is the last element + 0.01.
        let mut features = Vec::new();
        let mut targets = Vec::new();
        for start in 0..30 {
            let seq: Vec<f64> = (0..6).map(|t| 0.2 + 0.01 * (start + t) as f64).collect();
            targets.push(seq.last().unwrap() + 0.01);
            features.push(seq);
        }
        (features, targets)
    }

    #[test]
    fn test_infer_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(9);
        let model = SequenceRegressor::new(6, 4, 3, 0.2, &mut rng);
        let seq = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(model.infer(&seq), model.infer(&seq));
    }

    #[test]
    fn test_training_reduces_loss() {
        let (features, targets) = toy_problem();
        let mut rng = StdRng::seed_from_u64(10);
        let mut model = SequenceRegressor::new(8, 6, 4, 0.0, &mut rng);

        let initial = model.mse(&features, &targets);
        let opts = TrainOptions {
            epochs: 40,
            batch_size: 8,
            validation_split: 0.2,
            ..TrainOptions::default()
        };
        let history = model.fit(&features, &targets, &opts).unwrap();
        let last = history.last().unwrap();

        assert_eq!(history.len(), 40);
        assert!(last.val_mse.is_some());
        assert!(
            model.mse(&features, &targets) < initial,
            "training should reduce MSE from {initial}"
        );
    }

    #[test]
    fn test_dropout_training_still_converges_loosely() {
        let (features, targets) = toy_problem();
        let mut rng = StdRng::seed_from_u64(11);
        let mut model = SequenceRegressor::new(8, 6, 4, 0.2, &mut rng);

        let initial = model.mse(&features, &targets);
        let opts = TrainOptions {
            epochs: 30,
            batch_size: 8,
            ..TrainOptions::default()
        };
        model.fit(&features, &targets, &opts).unwrap();
        assert!(model.mse(&features, &targets) < initial);
    }

    #[test]
    fn test_empty_training_set_is_data_error() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut model = SequenceRegressor::new(4, 3, 2, 0.0, &mut rng);
        let err = model.fit(&[], &[], &TrainOptions::default()).unwrap_err();
        assert!(matches!(err, MlError::Data { .. }));
    }

    #[test]
    fn test_serde_round_trip_is_bit_identical() {
        let mut rng = StdRng::seed_from_u64(13);
        let model = SequenceRegressor::new(5, 4, 3, 0.2, &mut rng);
        let seq = vec![0.25, 0.3, 0.28, 0.31, 0.29];

        let json = serde_json::to_string(&model).unwrap();
        let restored: SequenceRegressor = serde_json::from_str(&json).unwrap();

        assert_eq!(
            model.infer(&seq).to_bits(),
            restored.infer(&seq).to_bits()
        );
    }
}
