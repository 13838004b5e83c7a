//! Request/response payloads for the prediction service

use crate::error::{Error, SchemaError};
use crate::types::customer::Customer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A validated batch of customers to score
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    pub customers: Vec<Customer>,
    /// Caller-supplied decision threshold; the service default applies if absent
    pub threshold: Option<f64>,
}

impl PredictionRequest {
    /// Validate a raw request. The first invalid record rejects the batch.
    pub fn validate(raw: &Value) -> Result<Self, SchemaError> {
        let obj = raw.as_object().ok_or_else(|| SchemaError::WrongType {
            field: "request".to_string(),
            expected: "an object",
        })?;

        if let Some(extra) = obj
            .keys()
            .find(|k| k.as_str() != "customers" && k.as_str() != "threshold")
        {
            return Err(SchemaError::UnexpectedField {
                field: extra.clone(),
            });
        }

        let records = match obj.get("customers") {
            None | Some(Value::Null) => {
                return Err(SchemaError::MissingField {
                    field: "customers".to_string(),
                })
            }
            Some(Value::Array(records)) => records,
            Some(_) => {
                return Err(SchemaError::WrongType {
                    field: "customers".to_string(),
                    expected: "an array",
                })
            }
        };

        if records.is_empty() {
            return Err(SchemaError::EmptyBatch {
                field: "customers".to_string(),
            });
        }

        let customers = records
            .iter()
            .enumerate()
            .map(|(i, r)| Customer::validate(r).map_err(|e| e.within(&format!("customers[{i}]"))))
            .collect::<Result<Vec<_>, _>>()?;

        let threshold = match obj.get("threshold") {
            None | Some(Value::Null) => None,
            Some(v) => {
                let t = v.as_f64().ok_or_else(|| SchemaError::WrongType {
                    field: "threshold".to_string(),
                    expected: "a number",
                })?;
                if !(0.0..=1.0).contains(&t) {
                    return Err(SchemaError::OutOfRange {
                        field: "threshold".to_string(),
                        value: t,
                        min: 0.0,
                        max: 1.0,
                    });
                }
                Some(t)
            }
        };

        Ok(Self {
            customers,
            threshold,
        })
    }
}

/// Parallel arrays, one entry per input record, in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub probabilities: Vec<f64>,
    pub predictions: Vec<u8>,
    pub labels: Vec<String>,
}

impl PredictionResponse {
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Number of records classified positive
    pub fn positives(&self) -> usize {
        self.predictions.iter().filter(|&&p| p == 1).count()
    }
}

/// Structured rejection sent back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl ErrorReply {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                kind: "malformed".to_string(),
                field: None,
                message: message.into(),
            },
        }
    }
}

impl From<&SchemaError> for ErrorReply {
    fn from(err: &SchemaError) -> Self {
        Self {
            error: ErrorBody {
                kind: "validation".to_string(),
                field: Some(err.field().to_string()),
                message: err.to_string(),
            },
        }
    }
}

impl From<&Error> for ErrorReply {
    fn from(err: &Error) -> Self {
        match err {
            Error::Schema(e) => e.into(),
            other => Self {
                error: ErrorBody {
                    kind: "inference".to_string(),
                    field: None,
                    message: other.to_string(),
                },
            },
        }
    }
}
