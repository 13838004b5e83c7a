//! Serving-side inference over a loaded pipeline

use crate::data::frame::Frame;
use crate::error::{Error, InferenceError, StartupError};
use crate::models::classifier::ModelType;
use crate::models::label_encoder::LabelEncoder;
use crate::models::pipeline::TrainedPipeline;
use crate::preprocessor::FeatureSchema;
use crate::types::customer::Customer;
use crate::types::prediction::{ErrorReply, PredictionRequest, PredictionResponse};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Liveness payload returned on the health subject
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_type: ModelType,
    pub run_id: String,
}

/// Everything needed to answer prediction requests. Built once at startup
/// and shared read-only between request handlers.
#[derive(Debug, Clone)]
pub struct ServingContext {
    pipeline: TrainedPipeline,
    label_encoder: LabelEncoder,
    schema: FeatureSchema,
    /// Canonical column order, numerical then categorical
    expected_columns: Vec<String>,
    default_threshold: f64,
}

impl ServingContext {
    /// Pair a pipeline with its label encoder and the configured schema,
    /// rejecting any combination that was not produced by one training run.
    pub fn new(
        pipeline: TrainedPipeline,
        label_encoder: LabelEncoder,
        schema: FeatureSchema,
    ) -> Result<Self, StartupError> {
        if pipeline.run_id() != label_encoder.run_id() {
            return Err(StartupError::Inconsistent(format!(
                "pipeline is from run {} but the label encoder is from run {:?}",
                pipeline.run_id(),
                label_encoder.run_id()
            )));
        }

        if pipeline.classes() != label_encoder.classes() {
            return Err(StartupError::Inconsistent(format!(
                "pipeline (run {}) was trained on classes {:?} but the label encoder has {:?}",
                pipeline.run_id(),
                pipeline.classes(),
                label_encoder.classes()
            )));
        }

        if pipeline.schema() != &schema {
            return Err(StartupError::Inconsistent(format!(
                "pipeline (run {}) expects features {:?} but the configuration declares {:?}",
                pipeline.run_id(),
                pipeline.schema().expected_columns(),
                schema.expected_columns()
            )));
        }

        let expected_columns = schema.expected_columns();
        info!(
            run_id = %pipeline.run_id(),
            model = %pipeline.model_type(),
            columns = expected_columns.len(),
            "Serving context ready"
        );

        Ok(Self {
            pipeline,
            label_encoder,
            schema,
            expected_columns,
            default_threshold: DEFAULT_THRESHOLD,
        })
    }

    /// Override the threshold used when a request does not carry one.
    pub fn with_default_threshold(mut self, threshold: f64) -> Result<Self, StartupError> {
        check_threshold(threshold).map_err(|e| StartupError::Inconsistent(e.to_string()))?;
        self.default_threshold = threshold;
        Ok(self)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn default_threshold(&self) -> f64 {
        self.default_threshold
    }

    pub fn pipeline(&self) -> &TrainedPipeline {
        &self.pipeline
    }

    /// Score a validated batch of customers.
    pub fn predict(
        &self,
        customers: &[Customer],
        threshold: Option<f64>,
    ) -> Result<PredictionResponse, InferenceError> {
        let threshold = threshold.unwrap_or(self.default_threshold);
        check_threshold(threshold)?;
        if customers.is_empty() {
            return Err(InferenceError::EmptyBatch);
        }

        let records: Vec<_> = customers.iter().map(Customer::to_record).collect();
        self.predict_frame(&Frame::from_records(&records), threshold)
    }

    /// Score a raw frame. Columns are aligned to the training order first:
    /// absent columns are imputed and unknown ones dropped.
    pub fn predict_frame(
        &self,
        frame: &Frame,
        threshold: f64,
    ) -> Result<PredictionResponse, InferenceError> {
        check_threshold(threshold)?;
        if frame.n_rows() == 0 {
            return Err(InferenceError::EmptyBatch);
        }

        let aligned = frame.reindex(&self.expected_columns);
        let probabilities = self.pipeline.positive_proba(&aligned)?.to_vec();

        let predictions: Vec<u8> = probabilities
            .iter()
            .map(|&p| u8::from(p >= threshold))
            .collect();

        let labels = predictions
            .iter()
            .map(|&class| {
                self.label_encoder
                    .decode(class as usize)
                    .map(str::to_string)
                    .ok_or(InferenceError::UnknownClass(class as usize))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            rows = probabilities.len(),
            threshold,
            positives = predictions.iter().filter(|&&p| p == 1).count(),
            "Batch scored"
        );

        Ok(PredictionResponse {
            probabilities,
            predictions,
            labels,
        })
    }

    /// Decode, validate and score one raw request payload. Failures come
    /// back as the reply to send to the caller.
    pub fn handle(&self, payload: &[u8]) -> Result<PredictionResponse, ErrorReply> {
        let raw: Value =
            serde_json::from_slice(payload).map_err(|e| ErrorReply::malformed(e.to_string()))?;
        let request = PredictionRequest::validate(&raw).map_err(|e| ErrorReply::from(&e))?;
        self.predict(&request.customers, request.threshold)
            .map_err(|e| ErrorReply::from(&Error::from(e)))
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            model_loaded: true,
            model_type: self.pipeline.model_type(),
            run_id: self.pipeline.run_id().to_string(),
        }
    }
}

fn check_threshold(threshold: f64) -> Result<(), InferenceError> {
    // NaN fails the range check as well
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(InferenceError::InvalidThreshold(threshold))
    }
}
