//! CSV source for training data.

use crate::config::CsvConfig;
use crate::data::frame::{is_na_token, Cell, Frame};
use crate::error::TrainError;
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Read a delimited file into a frame. Every cell is kept as text; empty
/// cells and NA markers (`NaN`, `NA`, `null`, ...) become missing. Column typing is the preprocessor's job.
pub fn read_csv<P: AsRef<Path>>(path: P, csv_cfg: &CsvConfig) -> Result<Frame, TrainError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| TrainError::DataLoad {
        path: path.to_path_buf(),
        source: csv::Error::from(e),
    })?;

    let frame = read_csv_from(file, csv_cfg).map_err(|source| TrainError::DataLoad {
        path: path.to_path_buf(),
        source,
    })?;

    info!(
        path = %path.display(),
        rows = frame.n_rows(),
        columns = frame.column_names().len(),
        "Training data loaded"
    );

    Ok(frame)
}

/// Read delimited data from any reader.
pub fn read_csv_from<R: Read>(reader: R, csv_cfg: &CsvConfig) -> Result<Frame, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .delimiter(csv_cfg.delimiter())
        .quote(csv_cfg.quote())
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record?;
        for (col, field) in columns.iter_mut().zip(record.iter()) {
            col.push(if field.is_empty() || is_na_token(field) {
                Cell::Missing
            } else {
                Cell::Text(field.to_string())
            });
        }
    }

    Ok(Frame::from_columns(headers.into_iter().zip(columns).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semicolon_quoted_csv() {
        let data = "\"age\";\"job\";\"y\"\n58;\"management\";\"no\"\n44;;\"yes\"\n";
        let cfg = CsvConfig {
            separator: ";".to_string(),
            quotechar: "\"".to_string(),
        };

        let frame = read_csv_from(data.as_bytes(), &cfg).unwrap();

        assert_eq!(frame.n_rows(), 2);
        assert_eq!(frame.column_names(), &["age", "job", "y"]);
        assert_eq!(frame.column("job").unwrap()[0], Cell::from("management"));
        assert_eq!(frame.column("job").unwrap()[1], Cell::Missing);
        assert_eq!(frame.column("age").unwrap()[1].as_f64(), Ok(Some(44.0)));
    }

    #[test]
    fn test_na_markers_load_as_missing() {
        let data = "balance,job\n10,admin.\nNaN,NA\n30,null\n40,services\n";

        let frame = read_csv_from(data.as_bytes(), &CsvConfig::default()).unwrap();

        let balance = frame.column("balance").unwrap();
        assert_eq!(balance[1], Cell::Missing);
        assert_eq!(balance[2], Cell::from("30"));
        assert_eq!(frame.column("job").unwrap()[1], Cell::Missing);
        assert_eq!(frame.column("job").unwrap()[2], Cell::Missing);
    }

    #[test]
    fn test_missing_file_is_data_load_error() {
        let err = read_csv("/definitely/not/here.csv", &CsvConfig::default()).unwrap_err();
        assert!(matches!(err, TrainError::DataLoad { .. }));
    }
}
