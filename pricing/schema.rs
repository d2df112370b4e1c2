//! # Feature Schema
//!
//! Declares which columns a pricing table must carry. The schema is fixed at
//! configuration time; nothing in the statistical core infers field names
//! from the data it is handed.

use crate::data::RawTable;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Categorical fields of the agricultural schema, in declaration order.
pub const CATEGORICAL_FEATURES: [&str; 4] =
    ["product_category", "variety", "market_region", "grade"];

/// Numeric fields of the agricultural schema, in declaration order.
pub const NUMERIC_FEATURES: [&str; 4] = [
    "quantity_kg",
    "moisture_pct",
    "days_since_harvest",
    "historical_avg_price",
];

pub const TARGET_COLUMN: &str = "price_per_kg";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("The field '{0}' is declared more than once in the feature schema.")]
    OverlappingField(String),
    #[error("The feature schema declares no categorical or numeric fields.")]
    NoFeatures,
}

/// The declared categorical, numeric, and target fields of a pricing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDefinition", into = "SchemaDefinition")]
pub struct FeatureSchema {
    categorical: Vec<String>,
    numeric: Vec<String>,
    target: String,
}

/// Unchecked on-disk shape of a schema; converted through [`FeatureSchema::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaDefinition {
    categorical: Vec<String>,
    numeric: Vec<String>,
    target: String,
}

impl TryFrom<SchemaDefinition> for FeatureSchema {
    type Error = SchemaError;

    fn try_from(def: SchemaDefinition) -> Result<Self, Self::Error> {
        FeatureSchema::new(def.categorical, def.numeric, def.target)
    }
}

impl From<FeatureSchema> for SchemaDefinition {
    fn from(schema: FeatureSchema) -> Self {
        SchemaDefinition {
            categorical: schema.categorical,
            numeric: schema.numeric,
            target: schema.target,
        }
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::agricultural()
    }
}

impl FeatureSchema {
    /// Builds a schema, rejecting any field name that appears twice across
    /// the categorical, numeric, and target declarations.
    pub fn new(
        categorical: Vec<String>,
        numeric: Vec<String>,
        target: String,
    ) -> Result<Self, SchemaError> {
        if categorical.is_empty() && numeric.is_empty() {
            return Err(SchemaError::NoFeatures);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for name in categorical
            .iter()
            .chain(numeric.iter())
            .chain(std::iter::once(&target))
        {
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::OverlappingField(name.clone()));
            }
        }

        Ok(Self {
            categorical,
            numeric,
            target,
        })
    }

    /// The commodity schema used by the pricing service.
    pub fn agricultural() -> Self {
        Self {
            categorical: CATEGORICAL_FEATURES.iter().map(|s| s.to_string()).collect(),
            numeric: NUMERIC_FEATURES.iter().map(|s| s.to_string()).collect(),
            target: TARGET_COLUMN.to_string(),
        }
    }

    pub fn categorical(&self) -> &[String] {
        &self.categorical
    }

    pub fn numeric(&self) -> &[String] {
        &self.numeric
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// All feature columns: categorical fields first, then numeric fields.
    pub fn feature_columns(&self) -> impl Iterator<Item = &str> {
        self.categorical
            .iter()
            .chain(self.numeric.iter())
            .map(String::as_str)
    }

    /// Checks that every declared column is present and returns the table
    /// restricted to those columns, rows in their original order.
    ///
    /// Every missing column is reported, not only the first one found.
    pub fn validate(&self, table: &RawTable, require_target: bool) -> Result<RawTable, SchemaError> {
        let mut required: Vec<&str> = self.feature_columns().collect();
        if require_target {
            required.push(&self.target);
        }

        let missing: Vec<String> = required
            .iter()
            .filter(|name| table.column(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns(missing));
        }

        Ok(table.select(&required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, RawColumn};

    fn column(name: &str, cells: Vec<Cell>) -> RawColumn {
        RawColumn::new(name, cells)
    }

    fn small_schema() -> FeatureSchema {
        FeatureSchema::new(
            vec!["variety".to_string()],
            vec!["quantity_kg".to_string()],
            "price_per_kg".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_overlapping_fields_rejected() {
        let err = FeatureSchema::new(
            vec!["grade".to_string()],
            vec!["grade".to_string()],
            "price_per_kg".to_string(),
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::OverlappingField("grade".to_string()));

        let err = FeatureSchema::new(
            vec!["grade".to_string()],
            vec!["quantity_kg".to_string()],
            "grade".to_string(),
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::OverlappingField("grade".to_string()));
    }

    #[test]
    fn test_empty_schema_rejected() {
        let err = FeatureSchema::new(vec![], vec![], "price_per_kg".to_string()).unwrap_err();
        assert_eq!(err, SchemaError::NoFeatures);
    }

    #[test]
    fn test_validate_reports_every_missing_column() {
        let table = RawTable::new(vec![column("extra", vec![Cell::Number(1.0)])]).unwrap();
        let err = FeatureSchema::agricultural()
            .validate(&table, true)
            .unwrap_err();
        match err {
            SchemaError::MissingColumns(missing) => {
                assert_eq!(missing.len(), 9);
                assert_eq!(missing[0], "product_category");
                assert_eq!(missing[8], "price_per_kg");
            }
            other => panic!("Expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_target_only_checked_when_required() {
        let table = RawTable::new(vec![
            column("quantity_kg", vec![Cell::Number(1.0)]),
            column("variety", vec![Cell::Text("Wheat".into())]),
        ])
        .unwrap();
        let schema = small_schema();

        assert!(schema.validate(&table, false).is_ok());
        assert_eq!(
            schema.validate(&table, true).unwrap_err(),
            SchemaError::MissingColumns(vec!["price_per_kg".to_string()])
        );
    }

    #[test]
    fn test_validate_projects_declared_columns_in_order() {
        let table = RawTable::new(vec![
            column("notes", vec![Cell::Text("a".into()), Cell::Text("b".into())]),
            column("price_per_kg", vec![Cell::Number(10.0), Cell::Number(11.0)]),
            column("quantity_kg", vec![Cell::Number(1.0), Cell::Number(2.0)]),
            column(
                "variety",
                vec![Cell::Text("Wheat".into()), Cell::Text("Corn".into())],
            ),
        ])
        .unwrap();

        let projected = small_schema().validate(&table, true).unwrap();
        assert_eq!(
            projected.column_names(),
            vec!["variety", "quantity_kg", "price_per_kg"]
        );
        assert_eq!(projected.height(), 2);
        assert_eq!(
            projected.column("variety").unwrap().cells()[1],
            Cell::Text("Corn".into())
        );
    }

    #[test]
    fn test_schema_toml_round_trip_is_checked() {
        let text = r#"
categorical = ["variety"]
numeric = ["quantity_kg"]
target = "price_per_kg"
"#;
        let schema: FeatureSchema = toml::from_str(text).unwrap();
        assert_eq!(schema, small_schema());

        let bad = r#"
categorical = ["variety"]
numeric = ["variety"]
target = "price_per_kg"
"#;
        assert!(toml::from_str::<FeatureSchema>(bad).is_err());
    }
}
