//! L2-regularized logistic regression fitted by full-batch gradient descent.

use crate::error::TrainError;
use crate::models::classifier::{sigmoid, two_column, Classifier};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogisticParams {
    /// Inverse regularization strength
    #[serde(default = "default_c", rename = "C", alias = "c")]
    pub c: f64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Upper bound on the step size; the effective step never exceeds the
    /// inverse curvature bound of the penalized loss
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Stop once the largest gradient component falls below this
    #[serde(default = "default_tol")]
    pub tol: f64,
}

fn default_c() -> f64 {
    1.0
}

fn default_max_iter() -> usize {
    1000
}

fn default_learning_rate() -> f64 {
    0.5
}

fn default_tol() -> f64 {
    1e-6
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: default_c(),
            max_iter: default_max_iter(),
            learning_rate: default_learning_rate(),
            tol: default_tol(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    params: LogisticParams,
    weights: Array1<f64>,
    intercept: f64,
}

impl LogisticRegression {
    pub fn new(params: LogisticParams) -> Self {
        Self {
            params,
            weights: Array1::zeros(0),
            intercept: 0.0,
        }
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    fn decision(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.intercept
    }

    /// Step size for the penalized mean log-loss. The Hessian is bounded by
    /// `0.25 * max_i |(x_i, 1)|^2 + penalty`, and gradient descent is stable
    /// for any step up to its inverse.
    fn step_size(&self, x: &Array2<f64>, penalty: f64) -> f64 {
        let max_norm = x
            .rows()
            .into_iter()
            .map(|row| row.dot(&row) + 1.0)
            .fold(1.0, f64::max);
        let lipschitz = 0.25 * max_norm + penalty;
        self.params.learning_rate.min(1.0 / lipschitz)
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize]) -> Result<(), TrainError> {
        let (n, d) = x.dim();
        let y = Array1::from_iter(y.iter().map(|&c| c as f64));
        let n_f = n.max(1) as f64;
        let penalty = 1.0 / (self.params.c * n_f);
        let step = self.step_size(x, penalty);

        self.weights = Array1::zeros(d);
        self.intercept = 0.0;

        for _ in 0..self.params.max_iter {
            let residual = self.decision(x).mapv(sigmoid) - &y;
            let grad_w = x.t().dot(&residual) / n_f + &self.weights * penalty;
            let grad_b = residual.sum() / n_f;

            self.weights.scaled_add(-step, &grad_w);
            self.intercept -= step * grad_b;

            let max_grad = grad_w
                .iter()
                .fold(grad_b.abs(), |acc, g| acc.max(g.abs()));
            if max_grad < self.params.tol {
                break;
            }
        }

        if !self.intercept.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(TrainError::NonFinite("lr"));
        }
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        two_column(&self.decision(x).mapv(sigmoid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_separates_linear_data() {
        let x = array![[-2.0], [-1.5], [-1.0], [-0.5], [0.5], [1.0], [1.5], [2.0]];
        let y = [0, 0, 0, 0, 1, 1, 1, 1];

        let mut model = LogisticRegression::new(LogisticParams::default());
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x), y.to_vec());
        assert!(model.weights()[0] > 0.0);

        let proba = model.predict_proba(&x);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_stronger_regularization_shrinks_weights() {
        let x = array![[-1.0, 0.3], [-0.8, -0.2], [0.9, 0.1], [1.1, -0.4]];
        let y = [0, 0, 1, 1];

        let mut loose = LogisticRegression::new(LogisticParams::default());
        loose.fit(&x, &y).unwrap();
        let mut tight = LogisticRegression::new(LogisticParams {
            c: 0.01,
            ..LogisticParams::default()
        });
        tight.fit(&x, &y).unwrap();

        assert!(tight.weights()[0].abs() < loose.weights()[0].abs());
        assert!(tight.weights()[0] > 0.0);
    }

    #[test]
    fn test_small_c_and_large_learning_rate_stay_finite() {
        let x = array![[-1.0, 0.3], [-0.8, -0.2], [0.9, 0.1], [1.1, -0.4]];
        let y = [0, 0, 1, 1];

        for c in [1e-4, 0.01, 0.1] {
            let mut model = LogisticRegression::new(LogisticParams {
                c,
                learning_rate: 50.0,
                ..LogisticParams::default()
            });
            model.fit(&x, &y).unwrap();

            assert!(model.weights().iter().all(|w| w.is_finite()), "C = {c}");
            let proba = model.predict_proba(&x);
            assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)), "C = {c}");
        }
    }

    #[test]
    fn test_non_finite_fit_is_an_error() {
        let x = array![[f64::NAN], [1.0]];
        let mut model = LogisticRegression::new(LogisticParams::default());

        assert!(matches!(
            model.fit(&x, &[0, 1]),
            Err(TrainError::NonFinite("lr"))
        ));
    }
}
