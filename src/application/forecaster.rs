use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use tracing::info;

use crate::application::net::{EpochStats, SequenceRegressor, TrainOptions};
use crate::domain::errors::MlError;
use crate::domain::normalize::MinMaxScaler;
use crate::domain::surface::{self, SurfaceRow, VolForecast};
use crate::infrastructure::artifact::ArtifactStore;

/// Artifact base name; the store derives the companion file names from it.
pub const FORECASTER_ARTIFACT: &str = "volatility_predictor";

#[derive(Debug, Clone, Copy)]
pub struct ForecasterConfig {
    pub window_len: usize,
    pub hidden1: usize,
    pub hidden2: usize,
    pub dense_width: usize,
    pub dropout: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub validation_split: f64,
    pub seed: u64,
    pub synthetic_days: usize,
    pub strikes_per_day: usize,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            window_len: surface::DEFAULT_WINDOW_LEN,
            hidden1: 64,
            hidden2: 32,
            dense_width: 16,
            dropout: 0.2,
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.001,
            validation_split: 0.2,
            seed: 42,
            synthetic_days: 100,
            strikes_per_day: 20,
        }
    }
}

impl ForecasterConfig {
    fn validate(&self) -> Result<(), MlError> {
        if self.window_len == 0 {
            return Err(MlError::Data {
                reason: "window length must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Final loss trace of a forecaster training run.
#[derive(Debug, Clone)]
pub struct ForecastTrainSummary {
    pub windows: usize,
    pub history: Vec<EpochStats>,
}

impl ForecastTrainSummary {
    pub fn final_stats(&self) -> Option<&EpochStats> {
        self.history.last()
    }
}

/// Implied-volatility forecasting service. Owns the artifact path and,
/// once trained or loaded, the sequence model with its paired range scaler.
pub struct VolForecaster {
    store: ArtifactStore,
    config: ForecasterConfig,
    model: Option<(SequenceRegressor, MinMaxScaler)>,
}

impl VolForecaster {
    /// Opens the service against a model directory, loading the persisted
    /// artifact when a complete pair is present.
    pub fn open(model_dir: &Path, config: ForecasterConfig) -> Result<Self, MlError> {
        config.validate()?;
        let store = ArtifactStore::new(model_dir, FORECASTER_ARTIFACT);
        let model = store.load_if_present::<SequenceRegressor, MinMaxScaler>()?;
        if model.is_some() {
            info!("loaded volatility predictor from {}", model_dir.display());
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

    pub fn config(&self) -> &ForecasterConfig {
        &self.config
    }

    /// Windows the surface, fits the range scaler on the full window matrix,
    /// trains the sequence model and atomically replaces the persisted
    /// artifact.
    pub fn train(&mut self, rows: &[SurfaceRow]) -> Result<ForecastTrainSummary, MlError> {
        let windows = surface::window_sequences(rows, self.config.window_len)?;
        if windows.features.is_empty() {
            return Err(MlError::Data {
                reason: "surface yields no complete training window".to_string(),
            });
        }

        let scaler = MinMaxScaler::fit(&windows.features)?;
        let scaled = scaler.transform(&windows.features);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut model = SequenceRegressor::new(
            self.config.hidden1,
            self.config.hidden2,
            self.config.dense_width,
            self.config.dropout,
            &mut rng,
        );

        info!(
            "training sequence model on {} windows of length {}",
            scaled.len(),
            self.config.window_len
        );
        let opts = TrainOptions {
            epochs: self.config.epochs,
            batch_size: self.config.batch_size,
            learning_rate: self.config.learning_rate,
            validation_split: self.config.validation_split,
            seed: self.config.seed,
        };
        let history = model.fit(&scaled, &windows.targets, &opts)?;

        self.store.save(&model, &scaler)?;
        let summary = ForecastTrainSummary {
            windows: scaled.len(),
            history,
        };
        self.model = Some((model, scaler));
        Ok(summary)
    }

    /// Forecasts the next-day average implied vol from the most recent
    /// window of the supplied surface.
    pub fn predict(&self, rows: &[SurfaceRow]) -> Result<VolForecast, MlError> {
        let (model, scaler) = self.model.as_ref().ok_or_else(|| MlError::NotTrained {
            reason: "no forecaster artifact is loaded and training was not requested".to_string(),
        })?;

        let windows = surface::window_sequences(rows, self.config.window_len)?;
        let latest = windows.features.last().ok_or_else(|| MlError::Data {
            reason: "surface yields no complete window to forecast from".to_string(),
        })?;

        let scaled = scaler.transform_row(latest);
        let predicted = model.infer(&scaled);
        let current = surface::surface_mean_iv(rows)?;

        Ok(VolForecast::from_prediction(current, predicted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::synthetic;
    use tempfile::TempDir;

    fn small_config() -> ForecasterConfig {
        ForecasterConfig {
            window_len: 5,
            hidden1: 8,
            hidden2: 6,
            dense_width: 4,
            epochs: 8,
            batch_size: 8,
            ..ForecasterConfig::default()
        }
    }

    #[test]
    fn test_predict_without_artifact_is_not_trained() {
        let dir = TempDir::new().unwrap();
        let forecaster = VolForecaster::open(dir.path(), small_config()).unwrap();
        let rows = synthetic::vol_surface(30, 4, 1);

        let err = forecaster.predict(&rows).unwrap_err();
        assert!(matches!(err, MlError::NotTrained { .. }));
    }

    #[test]
    fn test_short_surface_is_data_error() {
        let dir = TempDir::new().unwrap();
        let mut forecaster = VolForecaster::open(dir.path(), small_config()).unwrap();
        let rows = synthetic::vol_surface(5, 4, 1);

        let err = forecaster.train(&rows).unwrap_err();
        assert!(matches!(err, MlError::Data { .. }));
    }

    #[test]
    fn test_train_then_predict_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = small_config();
        let rows = synthetic::vol_surface(40, 4, 2);

        let mut forecaster = VolForecaster::open(dir.path(), config).unwrap();
        let summary = forecaster.train(&rows).unwrap();
        assert_eq!(summary.windows, 40 - config.window_len - 1);

        let first = forecaster.predict(&rows).unwrap();

        // A fresh service must reload the artifact and reproduce the
        // forecast bit for bit.
        let reloaded = VolForecaster::open(dir.path(), config).unwrap();
        assert!(reloaded.is_trained());
        let second = reloaded.predict(&rows).unwrap();

        assert_eq!(
            first.predicted_avg_iv.to_bits(),
            second.predicted_avg_iv.to_bits()
        );
        assert_eq!(first.direction, second.direction);
    }
}
