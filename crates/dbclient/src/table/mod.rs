//! In-memory tabular result
//!
//! A [`Table`] is an ordered list of named, typed columns. The first
//! `index_len` columns form the index, the same way a query's key columns
//! would be promoted to a dataframe index. Every column holds one
//! [`Value`] per row, and a non-null value always matches the column's
//! [`ColumnType`].

mod display;
mod export;

pub use display::{describe, render};

use crate::error::{DbClientError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Semantic column type, independent of the database it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    Text,
    Timestamp,
    Date,
    Binary,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// One cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(#[serde(with = "float_repr")] f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Binary(Vec<u8>),
}

/// JSON has no NaN or infinities; those are written as strings.
mod float_repr {
    use serde::de::{self, Deserializer};
    use serde::ser::Serializer;
    use serde::Deserialize;

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if v.is_nan() {
            serializer.serialize_str("NaN")
        } else if v.is_infinite() {
            serializer.serialize_str(if *v > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*v)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Named(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Named(name) => match name.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(de::Error::custom(format!("invalid float '{}'", other))),
            },
        }
    }
}

impl Value {
    /// Type of a non-null value
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(ColumnType::Boolean),
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
            Value::Date(_) => Some(ColumnType::Date),
            Value::Binary(_) => Some(ColumnType::Binary),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    values: Vec<Value>,
}

impl Column {
    /// Build a column, rejecting values of another type.
    pub fn new(name: impl Into<String>, column_type: ColumnType, values: Vec<Value>) -> Result<Self> {
        let column = Self {
            name: name.into(),
            column_type,
            values,
        };
        column.validate()?;
        Ok(column)
    }

    fn validate(&self) -> Result<()> {
        for (row, value) in self.values.iter().enumerate() {
            if let Some(found) = value.column_type() {
                if found != self.column_type {
                    return Err(DbClientError::schema(format!(
                        "column '{}' is {} but row {} holds a {} value",
                        self.name, self.column_type, row, found
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }
}

/// Named, typed columns with a leading index
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    index_len: usize,
}

impl Table {
    /// Build a table without an index. All columns must have the same length.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let table = Self {
            columns,
            index_len: 0,
        };
        table.validate()?;
        Ok(table)
    }

    /// Build a table from row-major values.
    ///
    /// `schema` gives the column names and types in order; every row must
    /// have exactly one value per column.
    pub fn from_rows(schema: Vec<(String, ColumnType)>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let width = schema.len();
        let mut buffers: Vec<Vec<Value>> = (0..width).map(|_| Vec::with_capacity(rows.len())).collect();

        for (row_number, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(DbClientError::schema(format!(
                    "row {} has {} values, expected {}",
                    row_number,
                    row.len(),
                    width
                )));
            }
            for (buffer, value) in buffers.iter_mut().zip(row) {
                buffer.push(value);
            }
        }

        let columns = schema
            .into_iter()
            .zip(buffers)
            .map(|((name, column_type), values)| Column::new(name, column_type, values))
            .collect::<Result<Vec<_>>>()?;

        Self::new(columns)
    }

    /// Check the invariants a deserialized table cannot guarantee on its own.
    pub fn validate(&self) -> Result<()> {
        if self.index_len > self.columns.len() {
            return Err(DbClientError::schema(format!(
                "index spans {} columns but the table only has {}",
                self.index_len,
                self.columns.len()
            )));
        }

        if let Some(first) = self.columns.first() {
            for column in &self.columns[1..] {
                if column.len() != first.len() {
                    return Err(DbClientError::schema(format!(
                        "column '{}' has {} rows but '{}' has {}",
                        column.name,
                        column.len(),
                        first.name,
                        first.len()
                    )));
                }
            }
        }

        self.columns.iter().try_for_each(Column::validate)
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// All columns, index columns first
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn index_len(&self) -> usize {
        self.index_len
    }

    pub fn index_columns(&self) -> &[Column] {
        &self.columns[..self.index_len]
    }

    pub fn data_columns(&self) -> &[Column] {
        &self.columns[self.index_len..]
    }

    /// Values of row `row`, in column order
    pub fn row(&self, row: usize) -> Option<Vec<&Value>> {
        if row >= self.num_rows() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[row]).collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> + '_ {
        (0..self.num_rows()).map(move |row| self.columns.iter().map(|c| &c.values[row]).collect())
    }

    pub fn lowercase_column_names(&mut self) {
        for column in &mut self.columns {
            column.name = column.name.to_lowercase();
        }
    }

    /// Promote the first `count` columns, by position, to the index.
    ///
    /// Replaces any existing index; `0` clears it.
    pub fn set_index(&mut self, count: usize) -> Result<()> {
        if count > self.columns.len() {
            return Err(DbClientError::schema(format!(
                "cannot use {} index columns, the result only has {} columns",
                count,
                self.columns.len()
            )));
        }
        self.index_len = count;
        Ok(())
    }

    /// Turn the index back into ordinary leading columns.
    pub fn reset_index(mut self) -> Self {
        self.index_len = 0;
        self
    }

    /// First `n` rows, keeping the index
    pub fn head(&self, n: usize) -> Table {
        let take = n.min(self.num_rows());
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    column_type: c.column_type,
                    values: c.values[..take].to_vec(),
                })
                .collect(),
            index_len: self.index_len,
        }
    }
}
