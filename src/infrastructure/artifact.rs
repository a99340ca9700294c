use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::errors::MlError;

/// Bumped whenever the persisted layout of a model or transform changes.
/// Load refuses any file carrying a different version.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    schema_version: u32,
    payload: T,
}

/// Paired persistence for one model and its normalization transform.
///
/// The pair lives in two companion files, `<base>.model.json` and
/// `<base>.scaler.json`, and is only ever loaded whole: a missing or
/// version-mismatched companion is an `Artifact` error, never a degraded
/// mode. Saves write to a sibling temp file and rename into place, so a
/// process killed mid-save leaves the previous artifact authoritative.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    base: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, base: &str) -> Self {
        Self {
            dir: dir.into(),
            base: base.to_string(),
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(format!("{}.model.json", self.base))
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.dir.join(format!("{}.scaler.json", self.base))
    }

    /// Atomically publishes a model/transform pair.
    /// The scaler lands first so a reader that sees the new model file is
    /// guaranteed to find a transform at least as new next to it.
    pub fn save<M: Serialize, S: Serialize>(&self, model: &M, scaler: &S) -> Result<(), MlError> {
        fs::create_dir_all(&self.dir).map_err(|e| MlError::Artifact {
            path: self.dir.clone(),
            reason: format!("creating model directory: {e}"),
        })?;

        write_atomic(&self.scaler_path(), scaler)?;
        write_atomic(&self.model_path(), model)?;
        info!(
            "persisted artifact pair {} + {}",
            self.model_path().display(),
            self.scaler_path().display()
        );
        Ok(())
    }

    /// Loads the pair when both companions exist; `Ok(None)` when neither
    /// does. Exactly one file present means a broken artifact.
    pub fn load_if_present<M, S>(&self) -> Result<Option<(M, S)>, MlError>
    where
        M: DeserializeOwned,
        S: DeserializeOwned,
    {
        let model_path = self.model_path();
        let scaler_path = self.scaler_path();

        match (model_path.exists(), scaler_path.exists()) {
            (false, false) => Ok(None),
            (true, false) => Err(MlError::Artifact {
                path: scaler_path,
                reason: "model file exists but its transform companion is missing".to_string(),
            }),
            (false, true) => Err(MlError::Artifact {
                path: model_path,
                reason: "transform file exists but its model companion is missing".to_string(),
            }),
            (true, true) => {
                let model: M = read_versioned(&model_path)?;
                let scaler: S = read_versioned(&scaler_path)?;
                Ok(Some((model, scaler)))
            }
        }
    }
}

fn write_atomic<T: Serialize>(path: &Path, payload: &T) -> Result<(), MlError> {
    let tmp = path.with_extension("json.tmp");
    let artifact_err = |reason: String| MlError::Artifact {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::create(&tmp).map_err(|e| artifact_err(format!("creating temp file: {e}")))?;
    serde_json::to_writer(
        BufWriter::new(file),
        &Envelope {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            payload,
        },
    )
    .map_err(|e| artifact_err(format!("serializing: {e}")))?;

    fs::rename(&tmp, path).map_err(|e| artifact_err(format!("publishing temp file: {e}")))
}

fn read_versioned<T: DeserializeOwned>(path: &Path) -> Result<T, MlError> {
    let artifact_err = |reason: String| MlError::Artifact {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| artifact_err(format!("opening: {e}")))?;
    let envelope: Envelope<T> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| artifact_err(format!("deserializing: {e}")))?;

    if envelope.schema_version != ARTIFACT_SCHEMA_VERSION {
        return Err(artifact_err(format!(
            "schema version mismatch: file has v{}, this build expects v{}",
            envelope.schema_version, ARTIFACT_SCHEMA_VERSION
        )));
    }
    Ok(envelope.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::normalize::MinMaxScaler;
    use tempfile::TempDir;

    fn fitted_scaler() -> MinMaxScaler {
        MinMaxScaler::fit(&[vec![0.0, 1.0], vec![2.0, 3.0]]).unwrap()
    }

    #[test]
    fn test_missing_pair_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), "demo");
        let loaded = store
            .load_if_present::<MinMaxScaler, MinMaxScaler>()
            .unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), "demo");
        let scaler = fitted_scaler();

        store.save(&scaler, &scaler).unwrap();
        let (model, transform) = store
            .load_if_present::<MinMaxScaler, MinMaxScaler>()
            .unwrap()
            .unwrap();

        assert_eq!(model, scaler);
        assert_eq!(transform, scaler);
        // No temp files survive a successful publish.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_half_pair_is_artifact_error() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), "demo");
        store.save(&fitted_scaler(), &fitted_scaler()).unwrap();
        std::fs::remove_file(store.scaler_path()).unwrap();

        let err = store
            .load_if_present::<MinMaxScaler, MinMaxScaler>()
            .unwrap_err();
        assert!(matches!(err, MlError::Artifact { .. }));
    }

    #[test]
    fn test_version_mismatch_is_artifact_error() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), "demo");
        store.save(&fitted_scaler(), &fitted_scaler()).unwrap();

        let raw = std::fs::read_to_string(store.model_path()).unwrap();
        let bumped = raw.replace("\"schema_version\":1", "\"schema_version\":2");
        std::fs::write(store.model_path(), bumped).unwrap();

        let err = store
            .load_if_present::<MinMaxScaler, MinMaxScaler>()
            .unwrap_err();
        assert!(matches!(err, MlError::Artifact { .. }));
        assert!(err.to_string().contains("schema version"));
    }
}
