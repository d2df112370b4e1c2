//! # Data Loading and Coercion Module
//!
//! This module is the entry point for user-provided tables. It reads CSV
//! files into a columnar [`RawTable`], and coerces a schema-validated table
//! into the typed [`FeatureFrame`] consumed by the design matrix builder.
//!
//! - Raw vs typed: `RawTable` holds cells exactly as they were read or
//!   received. Type coercion happens once, in `FeatureFrame::from_table`,
//!   and every failure names the offending column.
//! - User-centric errors: failures are assumed to be input errors. The
//!   `DataError` enum is designed to give actionable feedback.
//! - The CSV reader is Polars; only the column projection the schema asks
//!   for is ever coerced.

use crate::schema::FeatureSchema;
use crate::types::PriceFeatures;
use ndarray::Array1;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A comprehensive error type for data loading and coercion failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("The required column '{0}' was not found in the input table.")]
    ColumnNotFound(String),
    #[error("The column '{0}' appears more than once in the input table.")]
    DuplicateColumn(String),
    #[error("Column '{column}' has {found} rows, but the table has {expected}.")]
    RaggedColumns {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. Complete data is required."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the required column '{0}'. All numeric data must be finite."
    )]
    NonFiniteValuesFound(String),
    #[error("The input table contains no data rows.")]
    EmptyTable,
    #[error("Row {row}: '{field}' is {value}, but it must be {bounds}.")]
    OutOfRange {
        row: usize,
        field: &'static str,
        value: f64,
        bounds: &'static str,
    },
    #[error("Training data must be a .csv file, got '{0}'.")]
    UnsupportedFileType(String),
    #[error("Two design columns resolve to the same name '{0}'.")]
    DuplicateDesignColumn(String),
}

/// One cell of a raw table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Null,
}

/// A named column of raw cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    name: String,
    cells: Vec<Cell>,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

/// A columnar table whose columns all have the same height.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    columns: Vec<RawColumn>,
    height: usize,
}

impl RawTable {
    /// Assembles a table, rejecting duplicate names and ragged columns.
    pub fn new(columns: Vec<RawColumn>) -> Result<Self, DataError> {
        let height = columns.first().map_or(0, |c| c.cells.len());
        let mut names = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !names.insert(column.name.as_str()) {
                return Err(DataError::DuplicateColumn(column.name.clone()));
            }
            if column.cells.len() != height {
                return Err(DataError::RaggedColumns {
                    column: column.name.clone(),
                    expected: height,
                    found: column.cells.len(),
                });
            }
        }
        Ok(Self { columns, height })
    }

    /// Builds a table from typed request rows using the agricultural column names.
    pub fn from_features(items: &[PriceFeatures]) -> Self {
        fn text(items: &[PriceFeatures], f: impl Fn(&PriceFeatures) -> &str) -> Vec<Cell> {
            items.iter().map(|i| Cell::Text(f(i).to_string())).collect()
        }
        fn number(items: &[PriceFeatures], f: impl Fn(&PriceFeatures) -> f64) -> Vec<Cell> {
            items.iter().map(|i| Cell::Number(f(i))).collect()
        }

        let columns = vec![
            RawColumn::new("product_category", text(items, |i| i.product_category.as_str())),
            RawColumn::new("variety", text(items, |i| i.variety.as_str())),
            RawColumn::new("market_region", text(items, |i| i.market_region.as_str())),
            RawColumn::new("grade", text(items, |i| i.grade.as_str())),
            RawColumn::new("quantity_kg", number(items, |i| i.quantity_kg)),
            RawColumn::new("moisture_pct", number(items, |i| i.moisture_pct)),
            RawColumn::new("days_since_harvest", number(items, |i| i.days_since_harvest)),
            RawColumn::new(
                "historical_avg_price",
                number(items, |i| i.historical_avg_price),
            ),
        ];
        Self {
            columns,
            height: items.len(),
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Projects the named columns in the given order. Names not present are skipped.
    pub fn select(&self, names: &[&str]) -> RawTable {
        let columns = names
            .iter()
            .filter_map(|name| self.column(name).cloned())
            .collect();
        RawTable {
            columns,
            height: self.height,
        }
    }
}

/// A categorical column after coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalColumn {
    pub name: String,
    pub values: Vec<String>,
}

/// A numeric column after coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Typed feature columns (and optionally the target) ready for design matrix construction.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    pub categorical: Vec<CategoricalColumn>,
    pub numeric: Vec<NumericColumn>,
    pub target: Option<Array1<f64>>,
    n_rows: usize,
}

impl FeatureFrame {
    /// Coerces the schema's columns of `table` to their declared types.
    ///
    /// Categorical cells must be non-null; numbers are rendered as text.
    /// Numeric cells must be finite numbers or text that parses as one.
    pub fn from_table(
        schema: &FeatureSchema,
        table: &RawTable,
        require_target: bool,
    ) -> Result<Self, DataError> {
        if table.is_empty() {
            return Err(DataError::EmptyTable);
        }

        let categorical = schema
            .categorical()
            .iter()
            .map(|name| {
                Ok(CategoricalColumn {
                    name: name.clone(),
                    values: internal::extract_categorical_column(table, name)?,
                })
            })
            .collect::<Result<Vec<_>, DataError>>()?;

        let numeric = schema
            .numeric()
            .iter()
            .map(|name| {
                Ok(NumericColumn {
                    name: name.clone(),
                    values: internal::extract_numeric_column(table, name)?,
                })
            })
            .collect::<Result<Vec<_>, DataError>>()?;

        let target = if require_target {
            Some(Array1::from_vec(internal::extract_numeric_column(
                table,
                schema.target(),
            )?))
        } else {
            None
        };

        Ok(Self {
            categorical,
            numeric,
            target,
            n_rows: table.height(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }
}

/// Reads a comma-separated file with a header row into a [`RawTable`].
///
/// Type inference is disabled, so every field arrives as [`Cell::Text`]
/// exactly as written: category codes such as `01` keep their spelling, and
/// numeric fields are parsed during coercion, which reports the offending
/// value. Empty fields are kept as [`Cell::Null`].
pub fn load_table(path: &Path) -> Result<RawTable, DataError> {
    log::info!("Loading data from '{}'", path.display());

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0)),
        )
        .finish()?;

    let mut columns = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let series = column.as_materialized_series();
        let cells: Vec<Cell> = match series.dtype() {
            DataType::String => series
                .str()?
                .into_iter()
                .map(|v| v.map_or(Cell::Null, |s| Cell::Text(s.to_string())))
                .collect(),
            _ => {
                let casted = series.cast(&DataType::Float64)?;
                casted
                    .f64()?
                    .into_iter()
                    .map(|v| v.map_or(Cell::Null, Cell::Number))
                    .collect()
            }
        };
        columns.push(RawColumn::new(series.name().to_string(), cells));
    }

    let table = RawTable::new(columns)?;
    log::info!(
        "Loaded {} rows with {} columns from '{}'",
        table.height(),
        table.column_names().len(),
        path.display()
    );
    Ok(table)
}

/// Internal module for per-column coercion.
mod internal {
    use super::*;

    fn required_column<'a>(table: &'a RawTable, name: &str) -> Result<&'a RawColumn, DataError> {
        table
            .column(name)
            .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))
    }

    pub(super) fn extract_categorical_column(
        table: &RawTable,
        name: &str,
    ) -> Result<Vec<String>, DataError> {
        let column = required_column(table, name)?;
        column
            .cells()
            .iter()
            .map(|cell| match cell {
                Cell::Text(s) => Ok(s.clone()),
                Cell::Number(x) if x.is_finite() => Ok(x.to_string()),
                Cell::Number(_) => Err(DataError::NonFiniteValuesFound(name.to_string())),
                Cell::Null => Err(DataError::MissingValuesFound(name.to_string())),
            })
            .collect()
    }

    pub(super) fn extract_numeric_column(
        table: &RawTable,
        name: &str,
    ) -> Result<Vec<f64>, DataError> {
        let column = required_column(table, name)?;
        let mut values = Vec::with_capacity(column.cells().len());
        for (i, cell) in column.cells().iter().enumerate() {
            let value = match cell {
                Cell::Number(x) => *x,
                Cell::Text(s) => s.trim().parse::<f64>().map_err(|_| DataError::ColumnWrongType {
                    column_name: name.to_string(),
                    expected_type: "f64 (numeric)",
                    found_type: format!("text '{}' at row {}", s, i + 1),
                })?,
                Cell::Null => return Err(DataError::MissingValuesFound(name.to_string())),
            };
            if !value.is_finite() {
                return Err(DataError::NonFiniteValuesFound(name.to_string()));
            }
            values.push(value);
        }
        Ok(values)
    }
}
