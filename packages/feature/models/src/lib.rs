#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature rows, attribute values and the in-memory feature table.
//!
//! A [`FeatureTable`] is an ordered collection of [`FeatureRow`]s that
//! share one schema. Rows hold an optional WGS84 point plus one
//! [`AttributeValue`] per schema column. Tables are never mutated once a
//! render pass starts; filters build derived tables with
//! [`FeatureTable::filter`].

use std::fmt;

pub use geo::Point;
use serde::{Serialize, Serializer};

/// Errors raised when assembling a [`FeatureTable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A row does not have exactly one value per column.
    #[error("row {row} has {found} values, expected {expected}")]
    RowWidth {
        /// Index of the offending row.
        row: usize,
        /// Number of values in the row.
        found: usize,
        /// Number of columns in the schema.
        expected: usize,
    },

    /// A column name appears more than once.
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
}

/// A single attribute cell.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Missing value.
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    Text(String),
    /// Binary value (photos, attachments).
    Blob(Vec<u8>),
}

impl AttributeValue {
    /// Returns `true` for [`AttributeValue::Null`] and NaN reals.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Real(value) => value.is_nan(),
            _ => false,
        }
    }

    /// Borrows the text of a [`AttributeValue::Text`] value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Renders the value as text, or `None` when it is null.
    ///
    /// Used wherever values are compared by their printed form, such as
    /// username matching.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        if self.is_null() {
            None
        } else {
            Some(self.to_string())
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Real(value) if value.is_nan() => serializer.serialize_none(),
            Self::Real(value) => serializer.serialize_f64(*value),
            Self::Text(value) => serializer.serialize_str(value),
            Self::Blob(_) => serializer.collect_str(self),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One feature: an optional point plus one value per schema column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Point in WGS84 (`x` = longitude, `y` = latitude). `None` when the
    /// source geometry was missing or empty.
    pub geometry: Option<Point<f64>>,
    /// Values in schema column order.
    pub values: Vec<AttributeValue>,
}

impl FeatureRow {
    /// Creates a row from an optional point and its values.
    #[must_use]
    pub const fn new(geometry: Option<Point<f64>>, values: Vec<AttributeValue>) -> Self {
        Self { geometry, values }
    }

    /// Latitude of the row's point, if any.
    #[must_use]
    pub fn latitude(&self) -> Option<f64> {
        self.geometry.map(|p| p.y())
    }

    /// Longitude of the row's point, if any.
    #[must_use]
    pub fn longitude(&self) -> Option<f64> {
        self.geometry.map(|p| p.x())
    }
}

/// An ordered collection of [`FeatureRow`]s sharing one schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Builds a table, checking that every row matches the schema width.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if a column name is repeated or a row has
    /// the wrong number of values.
    pub fn new(columns: Vec<String>, rows: Vec<FeatureRow>) -> Result<Self, SchemaError> {
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(SchemaError::DuplicateColumn(name.clone()));
            }
        }

        for (row, feature) in rows.iter().enumerate() {
            if feature.values.len() != columns.len() {
                return Err(SchemaError::RowWidth {
                    row,
                    found: feature.values.len(),
                    expected: columns.len(),
                });
            }
        }

        Ok(Self { columns, rows })
    }

    /// Creates a table with the given schema and no rows.
    #[must_use]
    pub const fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column names in schema order. The geometry column is not included.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in load order.
    #[must_use]
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the schema.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns `true` if the schema contains `name`.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Iterates over the values of one column, or nothing if it is absent.
    pub fn column_values<'a>(
        &'a self,
        name: &str,
    ) -> impl Iterator<Item = &'a AttributeValue> + use<'a> {
        let index = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| index.map(|i| &row.values[i]))
    }

    /// Pairs each column name with the row's value for it.
    pub fn attributes<'a>(
        &'a self,
        row: &'a FeatureRow,
    ) -> impl Iterator<Item = (&'a str, &'a AttributeValue)> + 'a {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(row.values.iter())
    }

    /// Builds a derived table holding clones of the rows matching
    /// `predicate`. The source table is untouched.
    #[must_use]
    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&FeatureRow) -> bool,
    {
        Self {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| predicate(row))
                .cloned()
                .collect(),
        }
    }

    /// Rewrites every value of column `name` with `f`. Returns `false`
    /// (leaving the table unchanged) when the column is absent.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> bool
    where
        F: FnMut(AttributeValue) -> AttributeValue,
    {
        let Some(index) = self.column_index(name) else {
            return false;
        };

        for row in &mut self.rows {
            let value = std::mem::replace(&mut row.values[index], AttributeValue::Null);
            row.values[index] = f(value);
        }

        true
    }

    /// Rows that carry a point.
    pub fn plottable_rows(&self) -> impl Iterator<Item = &FeatureRow> {
        self.rows.iter().filter(|row| row.geometry.is_some())
    }

    /// Converts the table into a `GeoJSON` feature collection. Rows without
    /// a point become features with a `null` geometry.
    #[must_use]
    pub fn to_feature_collection(&self) -> geojson::FeatureCollection {
        let features = self
            .rows
            .iter()
            .map(|row| {
                let properties: geojson::JsonObject = self
                    .attributes(row)
                    .map(|(name, value)| {
                        (
                            name.to_string(),
                            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                        )
                    })
                    .collect();

                geojson::Feature {
                    bbox: None,
                    geometry: row
                        .geometry
                        .map(|p| geojson::Geometry::new(geojson::Value::Point(vec![p.x(), p.y()]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FeatureTable {
        FeatureTable::new(
            vec!["name".to_string(), "count".to_string()],
            vec![
                FeatureRow::new(Some(Point::new(-1.5, 53.2)), vec!["a".into(), 3_i64.into()]),
                FeatureRow::new(None, vec!["b".into(), AttributeValue::Null]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = FeatureTable::new(
            vec!["a".to_string()],
            vec![FeatureRow::new(None, vec![1_i64.into(), 2_i64.into()])],
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::RowWidth {
                row: 0,
                found: 2,
                expected: 1
            }
        );
    }

    #[test]
    fn rejects_duplicate_columns() {
        let err =
            FeatureTable::new(vec!["a".to_string(), "a".to_string()], Vec::new()).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateColumn("a".to_string()));
    }

    #[test]
    fn filter_leaves_source_untouched() {
        let source = table();
        let derived = source.filter(|row| row.geometry.is_some());
        assert_eq!(derived.len(), 1);
        assert_eq!(source.len(), 2);
        assert_eq!(derived.columns(), source.columns());
    }

    #[test]
    fn map_column_rewrites_values() {
        let mut t = table();
        assert!(t.map_column("count", |v| if v.is_null() { 0_i64.into() } else { v }));
        let counts: Vec<_> = t.column_values("count").cloned().collect();
        assert_eq!(counts, vec![AttributeValue::Integer(3), AttributeValue::Integer(0)]);
        assert!(!t.map_column("missing", |v| v));
    }

    #[test]
    fn nan_counts_as_null() {
        assert!(AttributeValue::Real(f64::NAN).is_null());
        assert_eq!(AttributeValue::Real(f64::NAN).to_text(), None);
        assert_eq!(AttributeValue::Integer(7).to_text().as_deref(), Some("7"));
    }

    #[test]
    fn feature_collection_keeps_null_geometries() {
        let fc = table().to_feature_collection();
        assert_eq!(fc.features.len(), 2);
        assert!(fc.features[0].geometry.is_some());
        assert!(fc.features[1].geometry.is_none());
        let props = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(props["name"], serde_json::json!("a"));
        assert_eq!(props["count"], serde_json::json!(3));
    }
}
