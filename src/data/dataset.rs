//! In-memory tabular dataset backed by a polars `DataFrame`

use std::fs::File;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BConnectError, Result};

/// Immutable dataset loaded once per session
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
    source: Option<PathBuf>,
}

/// Min/max of the target column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStats {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

/// Display-only indicators about a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub n_rows: usize,
    pub n_cols: usize,
    pub target: Option<TargetStats>,
    /// (dtype, number of columns), sorted by dtype name
    pub dtype_counts: Vec<(String, usize)>,
}

/// How a file is turned into a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// The first column holds row labels and is dropped
    pub index_column: bool,
}

impl LoadOptions {
    pub fn with_index_column(mut self, index_column: bool) -> Self {
        self.index_column = index_column;
        self
    }
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

impl Dataset {
    /// Load a CSV, JSON, Parquet or spreadsheet file, picked by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, &LoadOptions::default())
    }

    pub fn load_with(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let frame = match ext.as_str() {
            "csv" => CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(1000))
                .try_into_reader_with_file_path(Some(path.to_path_buf()))?
                .finish()?,
            "json" => JsonReader::new(File::open(path)?).finish()?,
            "parquet" => ParquetReader::new(File::open(path)?).finish()?,
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path)?,
            other => {
                return Err(BConnectError::DataError(format!(
                    "Unsupported file format: '{}'",
                    other
                )))
            }
        };

        let frame = if options.index_column {
            drop_first_column(frame)?
        } else {
            frame
        };

        info!(path = %path.display(), rows = frame.height(), cols = frame.width(), "Dataset loaded");
        Ok(Self {
            frame,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn from_frame(frame: DataFrame) -> Self {
        Self { frame, source: None }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn n_rows(&self) -> usize {
        self.frame.height()
    }

    pub fn n_cols(&self) -> usize {
        self.frame.width()
    }

    /// Column names in file order
    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// Columns usable as features or target
    pub fn numeric_columns(&self) -> Vec<String> {
        self.frame
            .get_columns()
            .iter()
            .filter(|c| is_numeric(c.dtype()))
            .map(|c| c.name().to_string())
            .collect()
    }

    /// One numeric, fully populated column as `f64`
    pub fn column_f64(&self, name: &str) -> Result<Array1<f64>> {
        let column = self
            .frame
            .column(name)
            .map_err(|_| BConnectError::FeatureNotFound(name.to_string()))?;

        if !is_numeric(column.dtype()) {
            return Err(BConnectError::NonNumericColumn {
                column: name.to_string(),
                dtype: column.dtype().to_string(),
            });
        }
        let nulls = column.null_count();
        if nulls > 0 {
            return Err(BConnectError::MissingValues {
                column: name.to_string(),
                count: nulls,
            });
        }

        let cast = column.cast(&DataType::Float64)?;
        let values: Vec<f64> = cast.f64()?.into_iter().flatten().collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(BConnectError::InvalidInput(format!(
                "Column '{}' contains non-finite values",
                name
            )));
        }
        Ok(Array1::from_vec(values))
    }

    /// Feature matrix with columns in `features` order
    pub fn feature_matrix(&self, features: &[String]) -> Result<Array2<f64>> {
        let columns: Vec<Array1<f64>> = features
            .iter()
            .map(|name| self.column_f64(name))
            .collect::<Result<_>>()?;

        let n_rows = self.n_rows();
        Ok(Array2::from_shape_fn((n_rows, columns.len()), |(r, c)| columns[c][r]))
    }

    /// Display indicators; `target` adds the min/max of that column
    pub fn summary(&self, target: Option<&str>) -> Result<DatasetSummary> {
        let target = match target {
            Some(name) => {
                let values = self.column_f64(name)?;
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (!values.is_empty()).then(|| TargetStats {
                    name: name.to_string(),
                    min,
                    max,
                })
            }
            None => None,
        };

        let mut dtype_counts: Vec<(String, usize)> = Vec::new();
        for column in self.frame.get_columns() {
            let dtype = column.dtype().to_string();
            match dtype_counts.iter_mut().find(|(d, _)| *d == dtype) {
                Some((_, count)) => *count += 1,
                None => dtype_counts.push((dtype, 1)),
            }
        }
        dtype_counts.sort();

        Ok(DatasetSummary {
            n_rows: self.n_rows(),
            n_cols: self.n_cols(),
            target,
            dtype_counts,
        })
    }

    /// First `n` rows for preview
    pub fn head(&self, n: usize) -> DataFrame {
        self.frame.head(Some(n))
    }
}

fn drop_first_column(frame: DataFrame) -> Result<DataFrame> {
    let first = frame
        .get_column_names()
        .first()
        .map(|name| name.to_string())
        .ok_or_else(|| BConnectError::DataError("No column to use as row labels".to_string()))?;
    Ok(frame.drop(&first)?)
}

/// Read the first worksheet of a workbook
fn read_workbook(path: &Path) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range_at(0).ok_or_else(|| {
        BConnectError::DataError(format!("'{}' has no worksheet", path.display()))
    })??;
    frame_from_range(&range)
}

/// First row is the header; a column whose cells are all numbers (or blank) becomes numeric
fn frame_from_range(range: &Range<Data>) -> Result<DataFrame> {
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| BConnectError::DataError("Worksheet is empty".to_string()))?;
    let body: Vec<&[Data]> = rows.collect();

    let columns: Vec<Column> = header
        .iter()
        .enumerate()
        .map(|(c, cell)| {
            let name = match cell {
                Data::Empty => format!("column_{}", c),
                other => other.to_string(),
            };
            let cells: Vec<&Data> = body.iter().map(|row| &row[c]).collect();
            column_from_cells(&name, &cells)
        })
        .collect();

    Ok(DataFrame::new(columns)?)
}

fn column_from_cells(name: &str, cells: &[&Data]) -> Column {
    let is_int = cells.iter().all(|c| matches!(c, Data::Int(_) | Data::Empty));
    let is_number = cells
        .iter()
        .all(|c| matches!(c, Data::Int(_) | Data::Float(_) | Data::Empty));

    if is_int {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|c| match c {
                Data::Int(v) => Some(*v),
                _ => None,
            })
            .collect();
        Column::new(name.into(), values)
    } else if is_number {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Data::Int(v) => Some(*v as f64),
                Data::Float(v) => Some(*v),
                _ => None,
            })
            .collect();
        Column::new(name.into(), values)
    } else {
        let values: Vec<Option<String>> = cells
            .iter()
            .map(|c| match c {
                Data::Empty => None,
                other => Some(other.to_string()),
            })
            .collect();
        Column::new(name.into(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn sample() -> Dataset {
        let df = df! {
            "hours_studied" => &[1.0, 2.0, 3.0, 4.0],
            "attendance" => &[80i64, 85, 90, 95],
            "name" => &["a", "b", "c", "d"],
            "moyenne" => &[8.0, 11.5, 13.0, 17.25],
        }
        .unwrap();
        Dataset::from_frame(df)
    }

    #[test]
    fn test_numeric_columns() {
        assert_eq!(
            sample().numeric_columns(),
            vec!["hours_studied", "attendance", "moyenne"]
        );
    }

    #[test]
    fn test_feature_matrix_order() {
        let ds = sample();
        let x = ds
            .feature_matrix(&["attendance".to_string(), "hours_studied".to_string()])
            .unwrap();
        assert_eq!(x.shape(), &[4, 2]);
        assert_eq!(x[[0, 0]], 80.0);
        assert_eq!(x[[3, 1]], 4.0);
    }

    #[test]
    fn test_missing_column() {
        assert!(matches!(
            sample().column_f64("age"),
            Err(BConnectError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_non_numeric_column() {
        assert!(matches!(
            sample().column_f64("name"),
            Err(BConnectError::NonNumericColumn { .. })
        ));
    }

    #[test]
    fn test_null_values() {
        let df = df! { "x" => &[Some(1.0), None, Some(3.0)] }.unwrap();
        let ds = Dataset::from_frame(df);
        assert!(matches!(
            ds.column_f64("x"),
            Err(BConnectError::MissingValues { count: 1, .. })
        ));
    }

    #[test]
    fn test_summary() {
        let summary = sample().summary(Some("moyenne")).unwrap();
        assert_eq!(summary.n_rows, 4);
        assert_eq!(summary.n_cols, 4);
        let target = summary.target.unwrap();
        assert_eq!(target.min, 8.0);
        assert_eq!(target.max, 17.25);
        assert_eq!(summary.dtype_counts.iter().map(|(_, c)| c).sum::<usize>(), 4);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            Dataset::load("scores.txt"),
            Err(BConnectError::DataError(_))
        ));
    }

    fn worksheet(cells: &[&[Data]]) -> Range<Data> {
        let rows = cells.len() as u32;
        let cols = cells[0].len() as u32;
        let mut range = Range::new((0, 0), (rows - 1, cols - 1));
        for (r, row) in cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    #[test]
    fn test_worksheet_columns_are_typed() {
        let s = |v: &str| Data::String(v.to_string());
        let range = worksheet(&[
            &[Data::Empty, s("name"), s("hours"), s("moyenne")],
            &[Data::Int(1), s("Awa"), Data::Float(2.5), Data::Float(9.5)],
            &[Data::Int(2), s("Bilal"), Data::Int(4), Data::Empty],
        ]);
        let frame = frame_from_range(&range).unwrap();

        assert_eq!(
            Dataset::from_frame(frame.clone()).column_names(),
            vec!["column_0", "name", "hours", "moyenne"]
        );
        assert_eq!(frame.column("column_0").unwrap().dtype(), &DataType::Int64);
        assert_eq!(frame.column("name").unwrap().dtype(), &DataType::String);
        assert_eq!(frame.column("hours").unwrap().dtype(), &DataType::Float64);
        assert_eq!(frame.column("moyenne").unwrap().null_count(), 1);
    }

    #[test]
    fn test_drop_first_column() {
        let frame = drop_first_column(sample().frame().clone()).unwrap();
        assert_eq!(
            Dataset::from_frame(frame).column_names(),
            vec!["attendance", "name", "moyenne"]
        );
    }
}
