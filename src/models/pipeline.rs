//! Fitted preprocessor composed with a fitted classifier.

use crate::data::frame::Frame;
use crate::error::{PreprocessError, TrainError};
use crate::models::classifier::{positive_column, Classifier, Model, ModelType};
use crate::preprocessor::{FeaturePreprocessor, FeatureSchema, FittedPreprocessor};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// The persisted transform-and-classify unit. Immutable once fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedPipeline {
    /// Timestamp token of the training run that produced this pipeline
    run_id: String,
    /// Target classes the model was trained against, by index
    classes: Vec<String>,
    preprocessor: FittedPreprocessor,
    model: Model,
}

impl TrainedPipeline {
    /// Fit the preprocessor and then the classifier on its output.
    pub fn fit(
        run_id: impl Into<String>,
        classes: Vec<String>,
        preprocessor: FeaturePreprocessor,
        mut model: Model,
        x: &Frame,
        y: &[usize],
    ) -> Result<Self, TrainError> {
        let preprocessor = preprocessor.fit(x)?;
        let features = preprocessor.transform(x)?;
        model.fit(&features, y)?;

        Ok(Self {
            run_id: run_id.into(),
            classes,
            preprocessor,
            model,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.preprocessor.schema()
    }

    pub fn model_type(&self) -> ModelType {
        self.model.model_type()
    }

    pub fn preprocessor(&self) -> &FittedPreprocessor {
        &self.preprocessor
    }

    /// Transformed feature matrix for a frame.
    pub fn transform(&self, x: &Frame) -> Result<Array2<f64>, PreprocessError> {
        self.preprocessor.transform(x)
    }

    /// Full class probability matrix, shape `(n_rows, 2)`.
    pub fn predict_proba(&self, x: &Frame) -> Result<Array2<f64>, PreprocessError> {
        Ok(self.model.predict_proba(&self.transform(x)?))
    }

    /// Probability of class index 1 per row.
    pub fn positive_proba(&self, x: &Frame) -> Result<Array1<f64>, PreprocessError> {
        Ok(positive_column(&self.predict_proba(x)?))
    }

    /// Hard class indices.
    pub fn predict(&self, x: &Frame) -> Result<Vec<usize>, PreprocessError> {
        Ok(self.model.predict(&self.transform(x)?))
    }
}
