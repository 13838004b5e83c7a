//! One end-to-end training run: load, encode, split, fit, evaluate.

use crate::artifacts::{new_run_id, ArtifactSet};
use crate::config::AppConfig;
use crate::data::frame::Frame;
use crate::data::loader::read_csv;
use crate::error::TrainError;
use crate::models::classifier::{Model, ModelType};
use crate::models::label_encoder::LabelEncoder;
use crate::models::pipeline::TrainedPipeline;
use crate::preprocessor::FeaturePreprocessor;
use crate::train::evaluation::ModelMetrics;
use crate::train::split::stratified_split;
use std::time::Instant;
use tracing::{debug, info};

/// Runs training cycles for one configuration
pub struct Trainer {
    config: AppConfig,
}

impl Trainer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Resolve the configured classifier through the model registry.
    pub fn build_model(&self) -> Result<Model, TrainError> {
        let model_type: ModelType = self.config.model.model_type.parse()?;
        model_type.build(&self.config.model.params)
    }

    /// Load the configured CSV and train on it.
    pub fn run(&self) -> Result<ArtifactSet, TrainError> {
        // Resolve the model before touching data so a bad key fails fast.
        self.build_model()?;

        let frame = read_csv(&self.config.data.file_path, &self.config.csv)?;
        self.train_on(frame, new_run_id())
    }

    /// Train on an already loaded frame that still contains the target column.
    pub fn train_on(&self, mut frame: Frame, run_id: String) -> Result<ArtifactSet, TrainError> {
        let start = Instant::now();
        let model = self.build_model()?;
        let target = &self.config.data.target;

        let target_cells = frame
            .take_column(target)
            .ok_or_else(|| TrainError::MissingTarget(target.clone()))?;

        let labels = target_cells
            .iter()
            .enumerate()
            .map(|(row, cell)| {
                cell.as_text()
                    .map(|s| s.into_owned())
                    .ok_or_else(|| TrainError::EmptyTarget {
                        column: target.clone(),
                        row,
                    })
            })
            .collect::<Result<Vec<String>, _>>()?;

        let label_encoder = LabelEncoder::fit(&labels).for_run(run_id.clone());
        if label_encoder.n_classes() != 2 {
            return Err(TrainError::ClassCount {
                found: label_encoder.n_classes(),
                classes: label_encoder.classes().to_vec(),
            });
        }

        // Every label was seen by the encoder, so encoding cannot miss.
        let y: Vec<usize> = labels
            .iter()
            .filter_map(|l| label_encoder.encode(l))
            .collect();

        let positives = y.iter().filter(|&&c| c == 1).count();
        info!(
            run_id = %run_id,
            rows = y.len(),
            positive_class = %label_encoder.classes()[1],
            positive_rate = positives as f64 / y.len() as f64,
            "Target encoded"
        );

        let split = stratified_split(
            &y,
            self.config.split.test_size,
            self.config.split.random_state,
        )?;
        let x_train = frame.select_rows(&split.train);
        let x_test = frame.select_rows(&split.test);
        let y_train: Vec<usize> = split.train.iter().map(|&r| y[r]).collect();
        let y_test: Vec<usize> = split.test.iter().map(|&r| y[r]).collect();

        debug!(
            train_rows = y_train.len(),
            test_rows = y_test.len(),
            "Stratified split complete"
        );

        let model_type = model.model_type();
        let pipeline = TrainedPipeline::fit(
            run_id.clone(),
            label_encoder.classes().to_vec(),
            FeaturePreprocessor::new(self.config.features.schema()),
            model,
            &x_train,
            &y_train,
        )?;

        info!(
            model = %model_type,
            features = pipeline.preprocessor().feature_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline fitted"
        );

        let y_pred = pipeline.predict(&x_test)?;
        let y_prob = pipeline.positive_proba(&x_test)?;
        let metrics = ModelMetrics::compute(&y_test, &y_pred, &y_prob.to_vec());

        info!(
            accuracy = metrics.accuracy,
            roc_auc = metrics.roc_auc,
            f1 = metrics.f1,
            pr_auc = metrics.pr_auc,
            "Held-out evaluation complete"
        );

        Ok(ArtifactSet {
            run_id,
            pipeline,
            label_encoder,
            metrics,
        })
    }
}
