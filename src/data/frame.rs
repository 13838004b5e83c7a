//! Minimal column-oriented table shared by the training and serving paths.
//!
//! Both paths hand the preprocessor a `Frame`, so a column is looked up by
//! name the same way whether it came from a CSV file or a validated request.

use std::borrow::Cow;
use std::collections::BTreeMap;

/// A single raw cell before feature transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Numeric view of the cell. Non-finite values read as missing; `Err`
    /// carries text that does not parse.
    pub fn as_f64(&self) -> Result<Option<f64>, &str> {
        match self {
            Cell::Missing => Ok(None),
            Cell::Number(v) => Ok(Some(*v).filter(|v| v.is_finite())),
            Cell::Text(s) if is_na_token(s) => Ok(None),
            Cell::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(|v| Some(v).filter(|v| v.is_finite()))
                .map_err(|_| s.as_str()),
        }
    }

    /// Categorical view of the cell.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Cell::Missing => None,
            Cell::Number(v) if v.is_nan() => None,
            Cell::Number(v) => Some(Cow::Owned(v.to_string())),
            Cell::Text(s) if is_na_token(s) => None,
            Cell::Text(s) => Some(Cow::Borrowed(s.as_str())),
        }
    }

    /// Categorical view normalized the same way request values are.
    pub fn as_category(&self) -> Option<String> {
        self.as_text().map(|text| normalize_category(&text))
    }
}

/// Markers read as missing values, matching common CSV exports.
pub const NA_TOKENS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>", "#N/A",
];

pub fn is_na_token(raw: &str) -> bool {
    NA_TOKENS.contains(&raw.trim())
}

/// Canonical categorical text: trimmed and lowercased.
pub fn normalize_category(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

/// Column-major table with named columns of equal length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Vec<Cell>>,
    n_rows: usize,
}

impl Frame {
    /// Build a frame from named columns. Short columns are padded with
    /// missing cells so every column has the same length.
    pub fn from_columns(columns: Vec<(String, Vec<Cell>)>) -> Self {
        let n_rows = columns.iter().map(|(_, c)| c.len()).max().unwrap_or(0);
        let mut frame = Frame {
            names: Vec::with_capacity(columns.len()),
            columns: Vec::with_capacity(columns.len()),
            n_rows,
        };
        for (name, mut cells) in columns {
            cells.resize(n_rows, Cell::Missing);
            frame.names.push(name);
            frame.columns.push(cells);
        }
        frame
    }

    /// Build a frame from keyed records. Columns appear in first-seen order;
    /// a key absent from a record becomes a missing cell.
    pub fn from_records(records: &[BTreeMap<String, Cell>]) -> Self {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let cells = records
                    .iter()
                    .map(|r| r.get(&name).cloned().unwrap_or(Cell::Missing))
                    .collect();
                (name, cells)
            })
            .collect();

        let mut frame = Self::from_columns(columns);
        frame.n_rows = records.len();
        frame
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Remove a column and return its cells.
    pub fn take_column(&mut self, name: &str) -> Option<Vec<Cell>> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.names.remove(idx);
        Some(self.columns.remove(idx))
    }

    /// Select and order columns exactly as `expected`. Expected columns that
    /// are absent are added as all-missing; anything else is dropped.
    pub fn reindex(&self, expected: &[String]) -> Frame {
        let columns = expected
            .iter()
            .map(|name| {
                let cells = self
                    .column(name)
                    .map(|c| c.to_vec())
                    .unwrap_or_else(|| vec![Cell::Missing; self.n_rows]);
                (name.clone(), cells)
            })
            .collect();

        let mut frame = Frame::from_columns(columns);
        frame.n_rows = self.n_rows;
        frame
    }

    /// Keep only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Frame {
        Frame {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| rows.iter().map(|&r| col[r].clone()).collect())
                .collect(),
            n_rows: rows.len(),
        }
    }
}
