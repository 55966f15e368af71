//! Destination column types for written tables
//!
//! The mapping is decided once from the table schema. Text, timestamp,
//! float and integer columns get an explicit wire type; boolean, date and
//! binary columns are reported as unmapped and later created with the
//! destination's default type for them.

use crate::table::{ColumnType, Table};
use tracing::{debug, warn};

/// Width of text columns in written tables
pub const TEXT_WIDTH: u32 = 12;

/// Binary precision of float columns in written tables
pub const FLOAT_PRECISION: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varchar(u32),
    Timestamp,
    Float(u32),
    Integer,
}

impl std::fmt::Display for WireType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireType::Varchar(width) => write!(f, "VARCHAR({})", width),
            WireType::Timestamp => f.write_str("TIMESTAMP"),
            WireType::Float(precision) => write!(f, "FLOAT({})", precision),
            WireType::Integer => f.write_str("INTEGER"),
        }
    }
}

/// Explicit wire type for a semantic column type, `None` when unmapped
pub fn wire_type_for(column_type: ColumnType) -> Option<WireType> {
    match column_type {
        ColumnType::Text => Some(WireType::Varchar(TEXT_WIDTH)),
        ColumnType::Timestamp => Some(WireType::Timestamp),
        ColumnType::Float => Some(WireType::Float(FLOAT_PRECISION)),
        ColumnType::Integer => Some(WireType::Integer),
        ColumnType::Boolean | ColumnType::Date | ColumnType::Binary => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub name: String,
    pub column_type: ColumnType,
    pub wire_type: Option<WireType>,
}

/// Wire type per column, in table order, index columns included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireTypeMap {
    columns: Vec<ColumnMapping>,
}

impl WireTypeMap {
    pub fn infer(table: &Table) -> Self {
        let columns: Vec<ColumnMapping> = table
            .columns()
            .iter()
            .map(|column| ColumnMapping {
                name: column.name().to_string(),
                column_type: column.column_type(),
                wire_type: wire_type_for(column.column_type()),
            })
            .collect();

        for mapping in &columns {
            match mapping.wire_type {
                Some(wire_type) => {
                    debug!(column = %mapping.name, %wire_type, "Mapped column");
                },
                None => {
                    warn!(
                        column = %mapping.name,
                        column_type = %mapping.column_type,
                        "Unmapped column, the destination default type will be used"
                    );
                },
            }
        }

        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|m| m.name == name)
    }

    pub fn unmapped(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter(|m| m.wire_type.is_none())
    }
}
