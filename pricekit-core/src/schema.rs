//! Output schema contract for transformed results.
//!
//! A `DataModel` declares the exact columns (name, type, nullability, order)
//! a command's result must have. Validation runs against the materialized
//! frame and reports every offending column at once. Passing validation
//! yields a `ResultTable`, the only form results leave the fetcher in.

use crate::data::provider::date_from_epoch_days;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Semantic column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Date,
    Utf8,
    Float64,
    Int64,
}

impl ColumnType {
    pub fn dtype(self) -> DataType {
        match self {
            ColumnType::Date => DataType::Date,
            ColumnType::Utf8 => DataType::String,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Int64 => DataType::Int64,
        }
    }

    fn accepts(self, actual: &DataType) -> bool {
        match self {
            ColumnType::Date => matches!(actual, DataType::Date | DataType::Datetime(_, _)),
            ColumnType::Utf8 => matches!(actual, DataType::String),
            ColumnType::Float64 => is_integer(actual) || matches!(actual, DataType::Float32 | DataType::Float64),
            ColumnType::Int64 => is_integer(actual),
        }
    }

    /// Cast `column` to this type if the conversion is lossless in kind.
    fn coerce(self, column: &Column) -> Result<Column, DataType> {
        let actual = column.dtype();
        let target = self.dtype();
        if actual == &target {
            return Ok(column.clone());
        }
        if !self.accepts(actual) {
            return Err(actual.clone());
        }
        column.strict_cast(&target).map_err(|_| actual.clone())
    }
}

fn is_integer(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub dtype: ColumnType,
    pub nullable: bool,
    pub title: &'static str,
    pub description: &'static str,
}

impl ColumnSpec {
    pub const fn new(
        name: &'static str,
        dtype: ColumnType,
        title: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            dtype,
            nullable: false,
            title,
            description,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// The expected shape of a command's result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataModel {
    pub name: &'static str,
    pub columns: Vec<ColumnSpec>,
}

impl DataModel {
    pub fn new(name: &'static str, columns: Vec<ColumnSpec>) -> Self {
        Self { name, columns }
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Check `df` against the model, coercing compatible types and putting
    /// columns in declared order.
    pub fn validate(&self, df: DataFrame) -> Result<ResultTable, SchemaError> {
        let mut issues = Vec::new();
        let mut columns = Vec::with_capacity(self.columns.len());

        for spec in &self.columns {
            let Ok(column) = df.column(spec.name) else {
                issues.push(ColumnIssue::Missing(spec.name.to_string()));
                continue;
            };
            let column = match spec.dtype.coerce(column) {
                Ok(column) => column,
                Err(actual) => {
                    issues.push(ColumnIssue::TypeMismatch {
                        column: spec.name.to_string(),
                        expected: spec.dtype,
                        actual: actual.to_string(),
                    });
                    continue;
                }
            };
            let nulls = column.null_count();
            if !spec.nullable && nulls > 0 {
                issues.push(ColumnIssue::Nulls {
                    column: spec.name.to_string(),
                    count: nulls,
                });
                continue;
            }
            columns.push(column);
        }

        for name in df.get_column_names() {
            if !self.columns.iter().any(|spec| spec.name == name.as_str()) {
                issues.push(ColumnIssue::Unexpected(name.to_string()));
            }
        }

        if !issues.is_empty() {
            return Err(SchemaError {
                model: self.name.to_string(),
                issues,
            });
        }

        let frame = DataFrame::new(columns).map_err(|e| SchemaError {
            model: self.name.to_string(),
            issues: vec![ColumnIssue::Frame(e.to_string())],
        })?;
        Ok(ResultTable {
            model: self.clone(),
            frame,
        })
    }
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnIssue {
    Missing(String),
    Unexpected(String),
    TypeMismatch {
        column: String,
        expected: ColumnType,
        actual: String,
    },
    Nulls {
        column: String,
        count: usize,
    },
    Frame(String),
}

impl fmt::Display for ColumnIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnIssue::Missing(name) => write!(f, "missing column '{name}'"),
            ColumnIssue::Unexpected(name) => write!(f, "unexpected column '{name}'"),
            ColumnIssue::TypeMismatch {
                column,
                expected,
                actual,
            } => write!(f, "column '{column}': expected {expected:?}, got {actual}"),
            ColumnIssue::Nulls { column, count } => {
                write!(f, "column '{column}': {count} null value(s) in a non-nullable column")
            }
            ColumnIssue::Frame(msg) => write!(f, "frame assembly failed: {msg}"),
        }
    }
}

/// Every violation found in one validation pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{model} schema mismatch: {}", join_issues(.issues))]
pub struct SchemaError {
    pub model: String,
    pub issues: Vec<ColumnIssue>,
}

fn join_issues(issues: &[ColumnIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A frame that passed validation against its model.
#[derive(Debug, Clone)]
pub struct ResultTable {
    model: DataModel,
    frame: DataFrame,
}

impl ResultTable {
    pub fn model(&self) -> &DataModel {
        &self.model
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Row-oriented cells in declared column order.
    pub fn rows(&self) -> Result<Vec<Vec<Cell>>, PolarsError> {
        let mut rows: Vec<Vec<Cell>> = (0..self.frame.height())
            .map(|_| Vec::with_capacity(self.model.columns.len()))
            .collect();

        for spec in &self.model.columns {
            let column = self.frame.column(spec.name)?;
            match spec.dtype {
                ColumnType::Date => {
                    let ca = column.date()?;
                    for (i, row) in rows.iter_mut().enumerate() {
                        let cell = match ca.get(i) {
                            Some(days) => Cell::Date(decode_date(spec.name, days)?),
                            None => Cell::Null,
                        };
                        row.push(cell);
                    }
                }
                ColumnType::Utf8 => {
                    let ca = column.str()?;
                    for (i, row) in rows.iter_mut().enumerate() {
                        row.push(ca.get(i).map_or(Cell::Null, |s| Cell::Str(s.to_string())));
                    }
                }
                ColumnType::Float64 => {
                    let ca = column.f64()?;
                    for (i, row) in rows.iter_mut().enumerate() {
                        row.push(ca.get(i).map_or(Cell::Null, Cell::Float));
                    }
                }
                ColumnType::Int64 => {
                    let ca = column.i64()?;
                    for (i, row) in rows.iter_mut().enumerate() {
                        row.push(ca.get(i).map_or(Cell::Null, Cell::Int));
                    }
                }
            }
        }
        Ok(rows)
    }
}

fn decode_date(column: &str, days: i32) -> Result<NaiveDate, PolarsError> {
    date_from_epoch_days(days).ok_or_else(|| {
        PolarsError::ComputeError(format!("{column}: date value {days} is out of range").into())
    })
}

/// One value of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Date(NaiveDate),
    Str(String),
    Float(f64),
    Int(i64),
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_none(),
            Cell::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Cell::Str(s) => serializer.serialize_str(s),
            Cell::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            Cell::Float(_) => serializer.serialize_none(),
            Cell::Int(v) => serializer.serialize_i64(*v),
        }
    }
}

struct RowRef<'a> {
    names: &'a [&'static str],
    cells: &'a [Cell],
}

impl Serialize for RowRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, cell) in self.names.iter().zip(self.cells) {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

/// Serialized as an array of row objects, keys in declared order.
impl Serialize for ResultTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rows = self.rows().map_err(S::Error::custom)?;
        let names = self.model.column_names();
        let mut seq = serializer.serialize_seq(Some(rows.len()))?;
        for cells in &rows {
            seq.serialize_element(&RowRef {
                names: &names,
                cells,
            })?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> DataModel {
        DataModel::new(
            "SampleData",
            vec![
                ColumnSpec::new("date", ColumnType::Date, "Date", "Observation date."),
                ColumnSpec::new("symbol", ColumnType::Utf8, "Symbol", "Ticker."),
                ColumnSpec::new("value", ColumnType::Float64, "Value", "Indicator value.").nullable(),
            ],
        )
    }

    fn dates() -> [NaiveDate; 2] {
        [
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        ]
    }

    #[test]
    fn accepts_and_reorders_valid_frame() {
        let df = df!(
            "value" => [1.5, 2.5],
            "symbol" => ["SPY", "SPY"],
            "date" => dates(),
        )
        .unwrap();

        let table = model().validate(df).unwrap();
        let names: Vec<String> = table
            .frame()
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, ["date", "symbol", "value"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn coerces_integers_to_float() {
        let df = df!(
            "date" => dates(),
            "symbol" => ["SPY", "SPY"],
            "value" => [1i64, 2],
        )
        .unwrap();

        let table = model().validate(df).unwrap();
        assert_eq!(table.frame().column("value").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn reports_every_offending_column() {
        let df = df!(
            "date" => dates(),
            "symbol" => [1.0, 2.0],
            "extra" => [0.0, 0.0],
        )
        .unwrap();

        let err = model().validate(df).unwrap_err();
        assert_eq!(err.issues.len(), 3);
        assert!(err.issues.contains(&ColumnIssue::Missing("value".into())));
        assert!(err.issues.contains(&ColumnIssue::Unexpected("extra".into())));
        assert!(matches!(
            err.issues.iter().find(|i| matches!(i, ColumnIssue::TypeMismatch { .. })),
            Some(ColumnIssue::TypeMismatch { column, .. }) if column == "symbol"
        ));
        let msg = err.to_string();
        assert!(msg.starts_with("SampleData schema mismatch"));
    }

    #[test]
    fn nulls_rejected_only_in_non_nullable_columns() {
        let df = df!(
            "date" => dates(),
            "symbol" => [Some("SPY"), None],
            "value" => [None, Some(1.0)],
        )
        .unwrap();

        let err = model().validate(df).unwrap_err();
        assert_eq!(
            err.issues,
            vec![ColumnIssue::Nulls {
                column: "symbol".into(),
                count: 1
            }]
        );
    }

    #[test]
    fn serializes_rows_in_declared_order() {
        let df = df!(
            "date" => dates(),
            "symbol" => ["SPY", "SPY"],
            "value" => [Some(1.5), None],
        )
        .unwrap();

        let table = model().validate(df).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(
            json,
            r#"[{"date":"2024-01-02","symbol":"SPY","value":1.5},{"date":"2024-01-03","symbol":"SPY","value":null}]"#
        );
    }

    #[test]
    fn rows_expose_typed_cells() {
        let df = df!(
            "date" => dates(),
            "symbol" => ["SPY", "QQQ"],
            "value" => [f64::NAN, 3.0],
        )
        .unwrap();

        let rows = model().validate(df).unwrap().rows().unwrap();
        assert_eq!(rows[1][1].as_str(), Some("QQQ"));
        assert_eq!(rows[1][2].as_f64(), Some(3.0));
        assert_eq!(rows[0][0], Cell::Date(dates()[0]));
    }

    #[test]
    fn unrepresentable_date_fails_row_access() {
        let date = Column::new("date".into(), [i32::MAX])
            .cast(&DataType::Date)
            .unwrap();
        let df = DataFrame::new(vec![
            date,
            Column::new("symbol".into(), ["SPY"]),
            Column::new("value".into(), [1.0]),
        ])
        .unwrap();

        let table = model().validate(df).unwrap();
        let err = table.rows().unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
        assert!(serde_json::to_string(&table).is_err());
    }
}
