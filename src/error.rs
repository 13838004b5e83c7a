//! Error taxonomy for training, artifact handling and serving.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error unifying every stage of the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// A request or record that does not match the customer schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("{field}: missing required field")]
    MissingField { field: String },

    #[error("{field}: unexpected field")]
    UnexpectedField { field: String },

    #[error("{field}: value {value} outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field}: '{value}' is not one of [{allowed}]")]
    UnknownCategory {
        field: String,
        value: String,
        allowed: String,
    },

    #[error("{field}: expected {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("{field}: at least one record is required")]
    EmptyBatch { field: String },
}

impl SchemaError {
    /// Path of the offending field, e.g. `customers[1].job`.
    pub fn field(&self) -> &str {
        match self {
            SchemaError::MissingField { field }
            | SchemaError::UnexpectedField { field }
            | SchemaError::OutOfRange { field, .. }
            | SchemaError::UnknownCategory { field, .. }
            | SchemaError::WrongType { field, .. }
            | SchemaError::EmptyBatch { field } => field,
        }
    }

    /// Prefix the field path, used when a record is nested in a batch.
    pub fn within(self, prefix: &str) -> Self {
        let join = |field: String| format!("{prefix}.{field}");
        match self {
            SchemaError::MissingField { field } => SchemaError::MissingField { field: join(field) },
            SchemaError::UnexpectedField { field } => {
                SchemaError::UnexpectedField { field: join(field) }
            }
            SchemaError::OutOfRange {
                field,
                value,
                min,
                max,
            } => SchemaError::OutOfRange {
                field: join(field),
                value,
                min,
                max,
            },
            SchemaError::UnknownCategory {
                field,
                value,
                allowed,
            } => SchemaError::UnknownCategory {
                field: join(field),
                value,
                allowed,
            },
            SchemaError::WrongType { field, expected } => SchemaError::WrongType {
                field: join(field),
                expected,
            },
            SchemaError::EmptyBatch { field } => SchemaError::EmptyBatch { field: join(field) },
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("column '{0}' is not present in the frame")]
    MissingColumn(String),

    #[error("numeric column '{0}' has no observed values to fit on")]
    EmptyColumn(String),

    #[error("column '{column}' row {row}: '{value}' is not numeric")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("feature '{0}' is declared more than once")]
    DuplicateFeature(String),
}

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("failed to read training data from {path}: {source}")]
    DataLoad {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("target column '{0}' is not present in the data")]
    MissingTarget(String),

    #[error("target column '{column}' is empty at row {row}")]
    EmptyTarget { column: String, row: usize },

    #[error("unknown model type '{0}' (expected one of: xgb, lr)")]
    UnknownModelType(String),

    #[error("invalid parameters for model '{model}': {source}")]
    InvalidParams {
        model: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected exactly two target classes, found {found}: {classes:?}")]
    ClassCount { found: usize, classes: Vec<String> },

    #[error("stratified split is degenerate: {0}")]
    Split(String),

    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("model '{0}' diverged: fitted parameters are not finite")]
    NonFinite(&'static str),
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("artifact I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact (de)serialization on {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact {0} already exists; artifacts are write-once")]
    AlreadyExists(PathBuf),

    #[error("no complete artifact set found under {0}")]
    NoRuns(PathBuf),
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("required artifact missing: {0}")]
    MissingArtifact(PathBuf),

    #[error("failed to load artifact: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("artifact pair mismatch: {0}")]
    Inconsistent(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("threshold {0} is outside [0.0, 1.0]")]
    InvalidThreshold(f64),

    #[error("at least one record is required")]
    EmptyBatch,

    #[error("prediction index {0} has no label")]
    UnknownClass(usize),

    #[error("feature transform failed: {0}")]
    Transform(#[from] PreprocessError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_is_prefixed() {
        let err = SchemaError::UnknownCategory {
            field: "job".to_string(),
            value: "pilot".to_string(),
            allowed: "admin.".to_string(),
        }
        .within("customers[1]");

        assert_eq!(err.field(), "customers[1].job");
        assert!(err.to_string().contains("pilot"));
    }
}
