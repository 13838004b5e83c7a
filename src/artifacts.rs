//! Versioned, write-once artifact persistence.
//!
//! A training run produces three files sharing one timestamp token:
//!
//! ```text
//! <model_dir>/model_<ts>.json
//! <model_dir>/label_encoder_<ts>.json
//! <metrics_dir>/metrics_<ts>.json
//! ```
//!
//! Promotion copies a run to `latest_model.json` / `latest_label_encoder.json`
//! which is what the serving process loads by default.

use crate::error::ArtifactError;
use crate::models::label_encoder::LabelEncoder;
use crate::models::pipeline::TrainedPipeline;
use crate::train::evaluation::ModelMetrics;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const RUN_ID_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";
pub const LATEST_MODEL: &str = "latest_model.json";
pub const LATEST_LABEL_ENCODER: &str = "latest_label_encoder.json";

/// Timestamp token for a new training run.
pub fn new_run_id() -> String {
    Utc::now().format(RUN_ID_FORMAT).to_string()
}

/// Everything a successful training run produces
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub run_id: String,
    pub pipeline: TrainedPipeline,
    pub label_encoder: LabelEncoder,
    pub metrics: ModelMetrics,
}

/// Final locations of a persisted artifact set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifacts {
    pub model: PathBuf,
    pub label_encoder: PathBuf,
    pub metrics: PathBuf,
}

/// Filesystem-backed artifact store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    model_dir: PathBuf,
    metrics_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(model_dir: impl Into<PathBuf>, metrics_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            metrics_dir: metrics_dir.into(),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn metrics_dir(&self) -> &Path {
        &self.metrics_dir
    }

    pub fn model_path(&self, run_id: &str) -> PathBuf {
        self.model_dir.join(format!("model_{run_id}.json"))
    }

    pub fn label_encoder_path(&self, run_id: &str) -> PathBuf {
        self.model_dir.join(format!("label_encoder_{run_id}.json"))
    }

    pub fn metrics_path(&self, run_id: &str) -> PathBuf {
        self.metrics_dir.join(format!("metrics_{run_id}.json"))
    }

    /// Write all three artifacts of a run.
    ///
    /// Either every file lands under its final name or none does. Existing
    /// files are never overwritten.
    pub fn persist(&self, set: &ArtifactSet) -> Result<PersistedArtifacts, ArtifactError> {
        create_dir(&self.model_dir)?;
        create_dir(&self.metrics_dir)?;

        let target = PersistedArtifacts {
            model: self.model_path(&set.run_id),
            label_encoder: self.label_encoder_path(&set.run_id),
            metrics: self.metrics_path(&set.run_id),
        };

        for path in [&target.model, &target.label_encoder, &target.metrics] {
            if path.exists() {
                return Err(ArtifactError::AlreadyExists(path.clone()));
            }
        }

        let staged = [
            (
                temp_path(&target.model),
                to_json(&set.pipeline, &target.model, false)?,
                &target.model,
            ),
            (
                temp_path(&target.label_encoder),
                to_json(&set.label_encoder, &target.label_encoder, false)?,
                &target.label_encoder,
            ),
            (
                temp_path(&target.metrics),
                to_json(&set.metrics, &target.metrics, true)?,
                &target.metrics,
            ),
        ];

        let mut written: Vec<&PathBuf> = Vec::new();
        for (tmp, bytes, _) in &staged {
            if let Err(e) = write_new(tmp, bytes) {
                cleanup(&written);
                return Err(e);
            }
            written.push(tmp);
        }

        for (i, (tmp, _, dest)) in staged.iter().enumerate() {
            if let Err(e) = link_new(tmp, dest) {
                let linked: Vec<&PathBuf> = staged[..i].iter().map(|s| s.2).collect();
                cleanup(&linked);
                cleanup(&written);
                return Err(e);
            }
        }
        cleanup(&written);

        info!(
            run_id = %set.run_id,
            model = %target.model.display(),
            metrics = %target.metrics.display(),
            "Artifacts persisted"
        );

        Ok(target)
    }

    /// Newest run token with both a model and a label encoder on disk.
    pub fn latest_run(&self) -> Result<String, ArtifactError> {
        let entries = fs::read_dir(&self.model_dir).map_err(|source| ArtifactError::Io {
            path: self.model_dir.clone(),
            source,
        })?;

        let mut latest: Option<String> = None;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(run_id) = name
                .to_str()
                .and_then(|n| n.strip_prefix("model_"))
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            if !self.label_encoder_path(run_id).exists() {
                debug!(run_id, "Skipping run without a label encoder");
                continue;
            }
            // The token format sorts chronologically as a string.
            if latest.as_deref().map_or(true, |l| run_id > l) {
                latest = Some(run_id.to_string());
            }
        }

        latest.ok_or_else(|| ArtifactError::NoRuns(self.model_dir.clone()))
    }

    /// Publish a run under the `latest_*` names the server loads.
    ///
    /// The label encoder is swapped in first, each through a temporary copy
    /// and a rename, so a reader never observes a partially written file.
    pub fn promote(&self, run_id: &str) -> Result<PersistedArtifacts, ArtifactError> {
        let encoder_src = self.label_encoder_path(run_id);
        let model_src = self.model_path(run_id);
        for src in [&encoder_src, &model_src] {
            if !src.exists() {
                return Err(ArtifactError::Io {
                    path: src.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "artifact not found"),
                });
            }
        }

        let encoder_dest = self.model_dir.join(LATEST_LABEL_ENCODER);
        let model_dest = self.model_dir.join(LATEST_MODEL);
        replace_with_copy(&encoder_src, &encoder_dest)?;
        replace_with_copy(&model_src, &model_dest)?;

        info!(run_id, path = %model_dest.display(), "Run promoted");

        Ok(PersistedArtifacts {
            model: model_dest,
            label_encoder: encoder_dest,
            metrics: self.metrics_path(run_id),
        })
    }
}

pub fn load_pipeline(path: &Path) -> Result<TrainedPipeline, ArtifactError> {
    read_json(path)
}

pub fn load_label_encoder(path: &Path) -> Result<LabelEncoder, ArtifactError> {
    read_json(path)
}

pub fn load_metrics(path: &Path) -> Result<ModelMetrics, ArtifactError> {
    read_json(path)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Serde {
        path: path.to_path_buf(),
        source,
    })
}

fn to_json<T: Serialize>(value: &T, path: &Path, pretty: bool) -> Result<Vec<u8>, ArtifactError> {
    let result = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    };
    result.map_err(|source| ArtifactError::Serde {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dir(dir: &Path) -> Result<(), ArtifactError> {
    fs::create_dir_all(dir).map_err(|source| ArtifactError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

fn temp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

fn write_new(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)
}

/// Give a staged file its final name. Unlike `rename`, a hard link never
/// replaces an existing file.
fn link_new(tmp: &Path, dest: &Path) -> Result<(), ArtifactError> {
    fs::hard_link(tmp, dest).map_err(|source| {
        if source.kind() == ErrorKind::AlreadyExists {
            ArtifactError::AlreadyExists(dest.to_path_buf())
        } else {
            ArtifactError::Io {
                path: dest.to_path_buf(),
                source,
            }
        }
    })
}

fn replace_with_copy(src: &Path, dest: &Path) -> Result<(), ArtifactError> {
    let tmp = temp_path(dest);
    fs::copy(src, &tmp).map_err(|source| ArtifactError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, dest).map_err(|source| {
        cleanup(&[&tmp]);
        ArtifactError::Io {
            path: dest.to_path_buf(),
            source,
        }
    })
}

fn cleanup(paths: &[&PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove temporary artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::{Cell, Frame};
    use crate::models::classifier::ModelType;
    use crate::preprocessor::{FeaturePreprocessor, FeatureSchema};
    use tempfile::TempDir;

    fn artifact_set(run_id: &str) -> ArtifactSet {
        let frame = Frame::from_columns(vec![
            (
                "age".to_string(),
                [25.0_f64, 40.0, 31.0, 58.0].into_iter().map(Cell::from).collect(),
            ),
            (
                "job".to_string(),
                ["student", "retired", "student", "admin."]
                    .into_iter()
                    .map(Cell::from)
                    .collect(),
            ),
        ]);
        let schema = FeatureSchema::new(vec!["age".to_string()], vec!["job".to_string()]);
        let model = ModelType::Logistic.build(&serde_json::json!({})).unwrap();
        let label_encoder = LabelEncoder::fit(["no", "yes"]).for_run(run_id);
        let pipeline = TrainedPipeline::fit(
            run_id,
            label_encoder.classes().to_vec(),
            FeaturePreprocessor::new(schema),
            model,
            &frame,
            &[0, 1, 0, 1],
        )
        .unwrap();

        ArtifactSet {
            run_id: run_id.to_string(),
            pipeline,
            label_encoder,
            metrics: ModelMetrics {
                accuracy: 0.9,
                roc_auc: 0.91,
                f1: 0.5,
                pr_auc: 0.55,
            },
        }
    }

    fn store(dir: &TempDir) -> ArtifactStore {
        ArtifactStore::new(dir.path().join("models"), dir.path().join("metrics"))
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let set = artifact_set("2024_01_02_03_04_05");

        let paths = store.persist(&set).unwrap();

        assert!(paths.model.ends_with("models/model_2024_01_02_03_04_05.json"));
        assert!(paths
            .label_encoder
            .ends_with("models/label_encoder_2024_01_02_03_04_05.json"));
        assert!(paths.metrics.ends_with("metrics/metrics_2024_01_02_03_04_05.json"));

        assert_eq!(load_pipeline(&paths.model).unwrap(), set.pipeline);
        assert_eq!(load_label_encoder(&paths.label_encoder).unwrap(), set.label_encoder);
        assert_eq!(load_metrics(&paths.metrics).unwrap(), set.metrics);

        // Metrics are human-readable and carry exactly the four keys
        let text = fs::read_to_string(&paths.metrics).unwrap();
        assert!(text.contains('\n'));
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 4);

        // no temporaries left behind
        let leftovers = fs::read_dir(store.model_dir())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_artifacts_are_write_once() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let set = artifact_set("2024_01_02_03_04_05");

        store.persist(&set).unwrap();
        let err = store.persist(&set).unwrap_err();

        assert!(matches!(err, ArtifactError::AlreadyExists(_)));
    }

    #[test]
    fn test_link_never_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("model_2024_01_02_03_04_05.json");
        let tmp = temp_path(&dest);
        fs::write(&dest, b"first run").unwrap();
        write_new(&tmp, b"second run").unwrap();

        let err = link_new(&tmp, &dest).unwrap_err();

        assert!(matches!(err, ArtifactError::AlreadyExists(path) if path == dest));
        assert_eq!(fs::read(&dest).unwrap(), b"first run");
    }

    #[test]
    fn test_undefined_metric_reloads_as_nan() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut set = artifact_set("2024_01_02_03_04_05");
        set.metrics.roc_auc = f64::NAN;

        let paths = store.persist(&set).unwrap();
        let text = fs::read_to_string(&paths.metrics).unwrap();
        assert!(text.contains("\"roc_auc\": null"));

        let metrics = load_metrics(&paths.metrics).unwrap();
        assert!(metrics.roc_auc.is_nan());
        assert_eq!(metrics.accuracy, set.metrics.accuracy);
    }

    #[test]
    fn test_latest_run_and_promote() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(matches!(store.latest_run(), Err(ArtifactError::Io { .. })));

        store.persist(&artifact_set("2024_01_02_03_04_05")).unwrap();
        store.persist(&artifact_set("2024_03_01_00_00_00")).unwrap();
        // an orphan model without its encoder is not a complete run
        fs::write(store.model_path("2025_01_01_00_00_00"), b"{}").unwrap();

        let latest = store.latest_run().unwrap();
        assert_eq!(latest, "2024_03_01_00_00_00");

        let promoted = store.promote(&latest).unwrap();
        let pipeline = load_pipeline(&promoted.model).unwrap();
        assert_eq!(pipeline.run_id(), "2024_03_01_00_00_00");
        assert_eq!(
            load_label_encoder(&promoted.label_encoder).unwrap().classes(),
            &["no", "yes"]
        );

        // promoting again replaces the published pair in place
        store.promote("2024_01_02_03_04_05").unwrap();
        assert_eq!(
            load_pipeline(&promoted.model).unwrap().run_id(),
            "2024_01_02_03_04_05"
        );
    }

    #[test]
    fn test_corrupt_artifact_is_a_serde_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, b"not json").unwrap();

        assert!(matches!(load_pipeline(&path), Err(ArtifactError::Serde { .. })));
    }

    #[test]
    fn test_run_id_format() {
        let run_id = new_run_id();
        assert_eq!(run_id.len(), "2024_01_02_03_04_05".len());
        assert_eq!(run_id.matches('_').count(), 5);
    }
}
