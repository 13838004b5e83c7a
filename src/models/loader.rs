//! Startup loading of the serving artifact pair

use crate::artifacts::{load_label_encoder, load_pipeline};
use crate::config::{AppConfig, ServingConfig};
use crate::error::StartupError;
use crate::models::inference::ServingContext;
use crate::models::label_encoder::LabelEncoder;
use crate::models::pipeline::TrainedPipeline;
use crate::preprocessor::FeatureSchema;
use std::path::{Path, PathBuf};
use tracing::info;

/// Loader for the pipeline and label encoder the server runs with
pub struct ModelLoader {
    model_path: PathBuf,
    label_encoder_path: PathBuf,
}

impl ModelLoader {
    pub fn new(model_path: impl Into<PathBuf>, label_encoder_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            label_encoder_path: label_encoder_path.into(),
        }
    }

    pub fn from_config(serving: &ServingConfig) -> Self {
        Self::new(&serving.model_path, &serving.label_encoder_path)
    }

    /// Load the pipeline artifact.
    pub fn load_pipeline(&self) -> Result<TrainedPipeline, StartupError> {
        require(&self.model_path)?;
        let pipeline = load_pipeline(&self.model_path)?;

        info!(
            path = %self.model_path.display(),
            model = %pipeline.model_type(),
            run_id = %pipeline.run_id(),
            features = pipeline.preprocessor().feature_count(),
            "Pipeline loaded"
        );

        Ok(pipeline)
    }

    /// Load the label encoder artifact.
    pub fn load_label_encoder(&self) -> Result<LabelEncoder, StartupError> {
        require(&self.label_encoder_path)?;
        let encoder = load_label_encoder(&self.label_encoder_path)?;

        info!(
            path = %self.label_encoder_path.display(),
            classes = ?encoder.classes(),
            "Label encoder loaded"
        );

        Ok(encoder)
    }

    /// Load both artifacts and build the serving context. The pipeline must
    /// have been trained on `schema`.
    pub fn load(&self, schema: FeatureSchema) -> Result<ServingContext, StartupError> {
        let pipeline = self.load_pipeline()?;
        let label_encoder = self.load_label_encoder()?;
        ServingContext::new(pipeline, label_encoder, schema)
    }
}

/// Build the serving context described by a full application config.
pub fn load_serving_context(config: &AppConfig) -> Result<ServingContext, StartupError> {
    let context = ModelLoader::from_config(&config.serving).load(config.features.schema())?;
    context.with_default_threshold(config.serving.default_threshold)
}

fn require(path: &Path) -> Result<(), StartupError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(StartupError::MissingArtifact(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_artifacts_abort_startup() {
        let dir = TempDir::new().unwrap();
        let loader = ModelLoader::new(
            dir.path().join("latest_model.json"),
            dir.path().join("latest_label_encoder.json"),
        );

        let schema = FeatureSchema::new(vec!["age".to_string()], vec![]);
        match loader.load(schema) {
            Err(StartupError::MissingArtifact(path)) => {
                assert!(path.ends_with("latest_model.json"))
            }
            other => panic!("expected a missing artifact, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_artifact_aborts_startup() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("latest_model.json");
        std::fs::write(&model, b"{\"run_id\": 3}").unwrap();

        let loader = ModelLoader::new(&model, dir.path().join("latest_label_encoder.json"));

        assert!(matches!(
            loader.load_pipeline(),
            Err(StartupError::Artifact(_))
        ));
    }
}
