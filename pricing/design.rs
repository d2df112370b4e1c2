//! # Design Matrix Construction
//!
//! Converts a [`FeatureFrame`] into the numeric matrix fed to the solver.
//! Numeric fields are copied as-is; each categorical field is expanded into
//! one 0/1 indicator column per level observed during training.
//!
//! The column order produced at fit time is persisted with the model and is
//! the only contract between training and inference. Inference never derives
//! columns from the batch it is given; it reindexes onto the stored order.

use crate::data::{DataError, FeatureFrame};
use itertools::Itertools;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Name of the indicator column for one level of a categorical field.
pub fn indicator_name(field: &str, level: &str) -> String {
    format!("{field}_{level}")
}

/// The frozen, ordered column names of a trained design matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesignColumns(Vec<String>);

impl DesignColumns {
    /// Wraps a column list, rejecting duplicate names.
    pub fn new(names: Vec<String>) -> Result<Self, DataError> {
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(DataError::DuplicateDesignColumn(name.clone()));
            }
        }
        Ok(Self(names))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    fn index(&self) -> HashMap<&str, usize> {
        self.0
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect()
    }
}

/// A design matrix together with the columns that describe it.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub columns: DesignColumns,
    /// Shape: [n_rows, columns.len()].
    pub x: Array2<f64>,
}

/// A design matrix reindexed onto stored columns.
#[derive(Debug, Clone)]
pub struct AlignedDesign {
    pub x: Array2<f64>,
    /// Categorical cells whose level has no stored indicator column.
    pub unseen_levels: usize,
}

/// Builds the design matrix in fit mode, deriving the column set from the data.
///
/// Column order: numeric fields in declared order, then for each categorical
/// field (declared order) its observed levels sorted lexicographically.
pub fn build_fit_matrix(frame: &FeatureFrame) -> Result<DesignMatrix, DataError> {
    let n = frame.n_rows();
    if n == 0 {
        return Err(DataError::EmptyTable);
    }

    let mut names: Vec<String> = frame.numeric.iter().map(|c| c.name.clone()).collect();
    for column in &frame.categorical {
        let levels = column.values.iter().sorted().dedup();
        names.extend(levels.map(|level| indicator_name(&column.name, level)));
    }
    let columns = DesignColumns::new(names)?;

    let x = fill_matrix(&columns, frame).x;
    log::debug!(
        "Fit-mode design matrix: {} rows x {} columns ({} numeric, {} indicator)",
        n,
        columns.len(),
        frame.numeric.len(),
        columns.len() - frame.numeric.len()
    );

    Ok(DesignMatrix { columns, x })
}

/// Builds the design matrix for `frame` on the stored column order.
///
/// Stored columns with no counterpart in the frame stay 0.0. A categorical
/// level that was never seen in training has no column and contributes
/// nothing, as if every indicator of its field were 0.
pub fn build_aligned_matrix(columns: &DesignColumns, frame: &FeatureFrame) -> AlignedDesign {
    let aligned = fill_matrix(columns, frame);
    if aligned.unseen_levels > 0 {
        log::debug!(
            "Dropped {} categorical cells with levels unseen during training",
            aligned.unseen_levels
        );
    }
    aligned
}

fn fill_matrix(columns: &DesignColumns, frame: &FeatureFrame) -> AlignedDesign {
    let n = frame.n_rows();
    let index = columns.index();
    let mut x = Array2::<f64>::zeros((n, columns.len()));

    for column in &frame.numeric {
        if let Some(&j) = index.get(column.name.as_str()) {
            for (i, &value) in column.values.iter().enumerate() {
                x[[i, j]] = value;
            }
        }
    }

    let mut unseen_levels = 0;
    for column in &frame.categorical {
        for (i, level) in column.values.iter().enumerate() {
            match index.get(indicator_name(&column.name, level).as_str()) {
                Some(&j) => x[[i, j]] = 1.0,
                None => unseen_levels += 1,
            }
        }
    }

    AlignedDesign { x, unseen_levels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, RawColumn, RawTable};
    use crate::schema::FeatureSchema;
    use ndarray::array;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(
            vec!["variety".into(), "grade".into()],
            vec!["quantity_kg".into()],
            "price_per_kg".into(),
        )
        .unwrap()
    }

    fn frame(varieties: &[&str], grades: &[&str], quantities: &[f64]) -> FeatureFrame {
        let text = |values: &[&str]| -> Vec<Cell> {
            values.iter().map(|v| Cell::Text(v.to_string())).collect()
        };
        let table = RawTable::new(vec![
            RawColumn::new("variety", text(varieties)),
            RawColumn::new("grade", text(grades)),
            RawColumn::new(
                "quantity_kg",
                quantities.iter().map(|&q| Cell::Number(q)).collect(),
            ),
        ])
        .unwrap();
        FeatureFrame::from_table(&schema(), &table, false).unwrap()
    }

    #[test]
    fn test_fit_columns_are_numeric_then_sorted_levels() {
        let design =
            build_fit_matrix(&frame(&["Wheat", "Corn", "Wheat"], &["B", "A", "B"], &[1.0, 2.0, 3.0]))
                .unwrap();
        assert_eq!(
            design.columns.as_slice(),
            &[
                "quantity_kg",
                "variety_Corn",
                "variety_Wheat",
                "grade_A",
                "grade_B"
            ]
        );
        assert_eq!(
            design.x,
            array![
                [1.0, 0.0, 1.0, 0.0, 1.0],
                [2.0, 1.0, 0.0, 1.0, 0.0],
                [3.0, 0.0, 1.0, 0.0, 1.0],
            ]
        );
    }

    #[test]
    fn test_fit_columns_do_not_depend_on_row_order() {
        let a = build_fit_matrix(&frame(&["Wheat", "Corn"], &["A", "B"], &[1.0, 2.0])).unwrap();
        let b = build_fit_matrix(&frame(&["Corn", "Wheat"], &["B", "A"], &[2.0, 1.0])).unwrap();
        assert_eq!(a.columns, b.columns);
    }

    #[test]
    fn test_aligned_matrix_drops_unseen_levels() {
        let trained =
            build_fit_matrix(&frame(&["Wheat", "Corn"], &["A", "B"], &[1.0, 2.0])).unwrap();

        let aligned =
            build_aligned_matrix(&trained.columns, &frame(&["Rice"], &["A"], &[5.0]));
        assert_eq!(aligned.unseen_levels, 1);
        assert_eq!(aligned.x, array![[5.0, 0.0, 0.0, 1.0, 0.0]]);
    }

    #[test]
    fn test_aligned_rows_do_not_depend_on_batch() {
        let trained = build_fit_matrix(&frame(
            &["Wheat", "Corn", "Rice"],
            &["A", "B", "C"],
            &[1.0, 2.0, 3.0],
        ))
        .unwrap();

        let single = build_aligned_matrix(&trained.columns, &frame(&["Corn"], &["C"], &[9.0]));
        let batch = build_aligned_matrix(
            &trained.columns,
            &frame(&["Wheat", "Corn"], &["A", "C"], &[4.0, 9.0]),
        );
        assert_eq!(single.x.row(0), batch.x.row(1));
    }

    #[test]
    fn test_colliding_indicator_names_rejected() {
        let schema = FeatureSchema::new(
            vec!["a".into(), "a_b".into()],
            vec!["q".into()],
            "y".into(),
        )
        .unwrap();
        let table = RawTable::new(vec![
            RawColumn::new("a", vec![Cell::Text("b_c".into())]),
            RawColumn::new("a_b", vec![Cell::Text("c".into())]),
            RawColumn::new("q", vec![Cell::Number(1.0)]),
        ])
        .unwrap();
        let frame = FeatureFrame::from_table(&schema, &table, false).unwrap();
        assert!(matches!(
            build_fit_matrix(&frame),
            Err(DataError::DuplicateDesignColumn(name)) if name == "a_b_c"
        ));
    }
}
