//! Feature preprocessing: raw frame columns to a numeric feature matrix.
//!
//! The transform is fitted once during training and serialized inside the
//! pipeline artifact. Serving deserializes it and applies it as a pure
//! function, so imputation values, scaling statistics and the one-hot
//! vocabulary are exactly the ones learned from the training partition.

use crate::data::frame::{Cell, Frame};
use crate::error::PreprocessError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Declared partition of feature names. Numerical followed by categorical
/// is the canonical column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub numerical: Vec<String>,
    pub categorical: Vec<String>,
}

impl FeatureSchema {
    pub fn new(numerical: Vec<String>, categorical: Vec<String>) -> Self {
        Self {
            numerical,
            categorical,
        }
    }

    /// Canonical input column order.
    pub fn expected_columns(&self) -> Vec<String> {
        self.numerical
            .iter()
            .chain(&self.categorical)
            .cloned()
            .collect()
    }

    fn check(&self) -> Result<(), PreprocessError> {
        let mut seen = HashSet::new();
        for name in self.numerical.iter().chain(&self.categorical) {
            if !seen.insert(name) {
                return Err(PreprocessError::DuplicateFeature(name.clone()));
            }
        }
        Ok(())
    }
}

/// Median imputation followed by standard scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericTransform {
    pub name: String,
    pub median: f64,
    pub mean: f64,
    pub scale: f64,
}

impl NumericTransform {
    fn fit(name: &str, cells: &[Cell]) -> Result<Self, PreprocessError> {
        let mut observed = Vec::with_capacity(cells.len());
        for (row, cell) in cells.iter().enumerate() {
            if let Some(v) = numeric(name, row, cell)? {
                observed.push(v);
            }
        }
        if observed.is_empty() {
            return Err(PreprocessError::EmptyColumn(name.to_string()));
        }

        let median = median(&mut observed);

        // Scaling statistics are taken after imputation, over every row.
        let n = cells.len() as f64;
        let missing = (cells.len() - observed.len()) as f64;
        let mean = (observed.iter().sum::<f64>() + missing * median) / n;
        let variance = (observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            + missing * (median - mean).powi(2))
            / n;
        let std = variance.sqrt();
        let scale = if std > f64::EPSILON { std } else { 1.0 };

        Ok(Self {
            name: name.to_string(),
            median,
            mean,
            scale,
        })
    }

    fn apply(&self, row: usize, cell: &Cell) -> Result<f64, PreprocessError> {
        let v = numeric(&self.name, row, cell)?.unwrap_or(self.median);
        Ok((v - self.mean) / self.scale)
    }
}

/// Mode imputation followed by one-hot encoding over the fitted vocabulary.
/// Values are matched after trimming and lowercasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalTransform {
    pub name: String,
    pub mode: String,
    /// Sorted vocabulary seen at fit time
    pub categories: Vec<String>,
}

impl CategoricalTransform {
    fn fit(name: &str, cells: &[Cell]) -> Result<Self, PreprocessError> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for cell in cells {
            if let Some(text) = cell.as_category() {
                *counts.entry(text).or_insert(0) += 1;
            }
        }

        // Ascending iteration keeps the smallest value on count ties.
        let mut mode: Option<(&String, usize)> = None;
        for (value, &count) in &counts {
            if mode.map_or(true, |(_, best)| count > best) {
                mode = Some((value, count));
            }
        }
        let mode = mode
            .map(|(v, _)| v.clone())
            .ok_or_else(|| PreprocessError::EmptyColumn(name.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            mode,
            categories: counts.into_keys().collect(),
        })
    }

    /// Indicator position for a cell, `None` for categories unseen at fit.
    fn position(&self, cell: &Cell) -> Option<usize> {
        match cell.as_category() {
            Some(text) => self.categories.binary_search(&text).ok(),
            None => self.categories.binary_search(&self.mode).ok(),
        }
    }
}

/// Unfitted preprocessor over a declared column partition
#[derive(Debug, Clone)]
pub struct FeaturePreprocessor {
    schema: FeatureSchema,
}

impl FeaturePreprocessor {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    /// Learn imputation values, scaling statistics and vocabularies.
    pub fn fit(&self, frame: &Frame) -> Result<FittedPreprocessor, PreprocessError> {
        self.schema.check()?;

        let numeric = self
            .schema
            .numerical
            .iter()
            .map(|name| NumericTransform::fit(name, column(frame, name)?))
            .collect::<Result<Vec<_>, _>>()?;

        let categorical = self
            .schema
            .categorical
            .iter()
            .map(|name| CategoricalTransform::fit(name, column(frame, name)?))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FittedPreprocessor {
            schema: self.schema.clone(),
            numeric,
            categorical,
        })
    }
}

/// Fitted, immutable preprocessor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    schema: FeatureSchema,
    numeric: Vec<NumericTransform>,
    categorical: Vec<CategoricalTransform>,
}

impl FittedPreprocessor {
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Width of the output matrix.
    pub fn feature_count(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|c| c.categories.len())
                .sum::<usize>()
    }

    /// Output column names, e.g. `age`, `job=admin.`.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.numeric.iter().map(|n| n.name.clone()).collect();
        for cat in &self.categorical {
            names.extend(cat.categories.iter().map(|c| format!("{}={}", cat.name, c)));
        }
        names
    }

    /// Transform a frame. Only declared columns are read; undeclared ones
    /// are ignored. Unseen categories encode as an all-zero block.
    pub fn transform(&self, frame: &Frame) -> Result<Array2<f64>, PreprocessError> {
        let mut out = Array2::zeros((frame.n_rows(), self.feature_count()));

        for (j, nt) in self.numeric.iter().enumerate() {
            let cells = column(frame, &nt.name)?;
            for (row, cell) in cells.iter().enumerate() {
                out[[row, j]] = nt.apply(row, cell)?;
            }
        }

        let mut offset = self.numeric.len();
        for ct in &self.categorical {
            let cells = column(frame, &ct.name)?;
            for (row, cell) in cells.iter().enumerate() {
                if let Some(k) = ct.position(cell) {
                    out[[row, offset + k]] = 1.0;
                }
            }
            offset += ct.categories.len();
        }

        Ok(out)
    }
}

fn column<'a>(frame: &'a Frame, name: &str) -> Result<&'a [Cell], PreprocessError> {
    frame
        .column(name)
        .ok_or_else(|| PreprocessError::MissingColumn(name.to_string()))
}

fn numeric(name: &str, row: usize, cell: &Cell) -> Result<Option<f64>, PreprocessError> {
    cell.as_f64().map_err(|value| PreprocessError::NonNumeric {
        column: name.to_string(),
        row,
        value: value.to_string(),
    })
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
