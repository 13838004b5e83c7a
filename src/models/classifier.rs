//! Classifier interface and the closed model registry.

use crate::error::TrainError;
use crate::models::boosting::GradientBoostingClassifier;
use crate::models::logistic::LogisticRegression;
use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binary classifier over a dense feature matrix. Class indices are 0 and 1.
pub trait Classifier {
    /// Fit on features `x` and class indices `y`. Fails if the fitted
    /// parameters are not finite.
    fn fit(&mut self, x: &Array2<f64>, y: &[usize]) -> Result<(), TrainError>;

    /// Class probabilities, shape `(n_rows, 2)`. Column 1 is the positive class.
    fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64>;

    /// Hard class indices at the 0.5 decision boundary.
    fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        positive_column(&self.predict_proba(x))
            .iter()
            .map(|&p| usize::from(p >= 0.5))
            .collect()
    }
}

/// Positive-class probabilities: column 1 of a `(n_rows, 2)` matrix.
pub fn positive_column(proba: &Array2<f64>) -> Array1<f64> {
    proba.column(1).to_owned()
}

/// Stack positive-class probabilities into a two-column probability matrix.
pub(crate) fn two_column(positive: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((positive.len(), 2), |(i, j)| {
        if j == 1 {
            positive[i]
        } else {
            1.0 - positive[i]
        }
    })
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Registry key selecting a classifier implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    /// Gradient-boosted regression trees on the logistic loss
    #[serde(rename = "xgb")]
    GradientBoosting,
    /// L2-regularized logistic regression
    #[serde(rename = "lr")]
    Logistic,
}

impl ModelType {
    pub const ALL: &'static [ModelType] = &[ModelType::GradientBoosting, ModelType::Logistic];

    pub fn key(&self) -> &'static str {
        match self {
            ModelType::GradientBoosting => "xgb",
            ModelType::Logistic => "lr",
        }
    }

    /// Construct an unfitted model from keyword parameters.
    pub fn build(&self, params: &serde_json::Value) -> Result<Model, TrainError> {
        Ok(match self {
            ModelType::GradientBoosting => {
                Model::GradientBoosting(GradientBoostingClassifier::new(self.params(params)?))
            }
            ModelType::Logistic => Model::Logistic(LogisticRegression::new(self.params(params)?)),
        })
    }

    fn params<P: DeserializeOwned>(&self, params: &serde_json::Value) -> Result<P, TrainError> {
        let params = match params {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(params).map_err(|source| TrainError::InvalidParams {
            model: self.key(),
            source,
        })
    }
}

impl FromStr for ModelType {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelType::ALL
            .iter()
            .copied()
            .find(|t| t.key() == s)
            .ok_or_else(|| TrainError::UnknownModelType(s.to_string()))
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Serializable classifier produced by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Model {
    GradientBoosting(GradientBoostingClassifier),
    Logistic(LogisticRegression),
}

impl Model {
    pub fn model_type(&self) -> ModelType {
        match self {
            Model::GradientBoosting(_) => ModelType::GradientBoosting,
            Model::Logistic(_) => ModelType::Logistic,
        }
    }
}

impl Classifier for Model {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize]) -> Result<(), TrainError> {
        match self {
            Model::GradientBoosting(m) => m.fit(x, y),
            Model::Logistic(m) => m.fit(x, y),
        }
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        match self {
            Model::GradientBoosting(m) => m.predict_proba(x),
            Model::Logistic(m) => m.predict_proba(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_keys() {
        assert_eq!("xgb".parse::<ModelType>().unwrap(), ModelType::GradientBoosting);
        assert_eq!("lr".parse::<ModelType>().unwrap(), ModelType::Logistic);
        assert!(matches!(
            "svm".parse::<ModelType>(),
            Err(TrainError::UnknownModelType(key)) if key == "svm"
        ));
    }

    #[test]
    fn test_build_with_params() {
        let model = ModelType::Logistic
            .build(&json!({ "C": 0.5, "max_iter": 200 }))
            .unwrap();
        assert_eq!(model.model_type(), ModelType::Logistic);

        let model = ModelType::GradientBoosting.build(&serde_json::Value::Null).unwrap();
        assert_eq!(model.model_type(), ModelType::GradientBoosting);
    }

    #[test]
    fn test_unknown_param_rejected() {
        let err = ModelType::GradientBoosting
            .build(&json!({ "n_estimators": 10, "booster": "dart" }))
            .unwrap_err();
        assert!(matches!(err, TrainError::InvalidParams { model: "xgb", .. }));
    }

    #[test]
    fn test_positive_column_is_column_one() {
        let proba = two_column(&Array1::from(vec![0.9, 0.2, 0.6]));
        assert_eq!(proba.dim(), (3, 2));
        assert_eq!(positive_column(&proba).to_vec(), vec![0.9, 0.2, 0.6]);
        assert!((proba[[1, 0]] - 0.8).abs() < 1e-12);
    }
}
