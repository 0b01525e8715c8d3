// Copyright 2022-2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Column schema of a table version.

use snafu::{ensure, Backtrace, Snafu};

use crate::datum::DatumKind;

/// Default schema version written into encoded rows.
pub const DEFAULT_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Schema must have at least one column.\nBacktrace:\n{}", backtrace))]
    EmptySchema { backtrace: Backtrace },

    #[snafu(display(
        "Column can't be declared with null type, column:{}.\nBacktrace:\n{}",
        name,
        backtrace
    ))]
    NullColumnType { name: String, backtrace: Backtrace },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Schema of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DatumKind,
    pub is_nullable: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DatumKind, is_nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            is_nullable,
        }
    }
}

/// Immutable, ordered column schema of one table version.
///
/// By convention the first column is the partition key column and one
/// further column holds the time. Offsets of the fixed field area and the
/// ordinals of var-len columns are precomputed here so row encoding and
/// field access stay O(1).
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    version: u8,
    columns: Vec<ColumnSchema>,
    /// Per column: byte offset inside the fixed field area for fixed-size
    /// columns, ordinal among var-len columns otherwise.
    field_slots: Vec<FieldSlot>,
    fixed_area_len: usize,
    num_var_columns: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldSlot {
    Fixed { offset: usize },
    Var { ordinal: usize },
}

impl Schema {
    pub fn new(columns: Vec<ColumnSchema>) -> Result<Self> {
        Self::with_version(DEFAULT_SCHEMA_VERSION, columns)
    }

    pub fn with_version(version: u8, columns: Vec<ColumnSchema>) -> Result<Self> {
        ensure!(!columns.is_empty(), EmptySchema);

        let mut field_slots = Vec::with_capacity(columns.len());
        let mut fixed_area_len = 0;
        let mut num_var_columns = 0;
        for column in &columns {
            ensure!(
                column.data_type != DatumKind::Null,
                NullColumnType { name: column.name.clone() }
            );
            if column.data_type.is_fixed_sized() {
                field_slots.push(FieldSlot::Fixed { offset: fixed_area_len });
                fixed_area_len += column.data_type.fixed_size();
            } else {
                field_slots.push(FieldSlot::Var { ordinal: num_var_columns });
                num_var_columns += 1;
            }
        }

        Ok(Self {
            version,
            columns,
            field_slots,
            fixed_area_len,
            num_var_columns,
        })
    }

    #[inline]
    pub fn version(&self) -> u8 {
        self.version
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn column(&self, index: usize) -> &ColumnSchema {
        &self.columns[index]
    }

    #[inline]
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Total byte length of the fixed field area.
    #[inline]
    pub fn fixed_area_len(&self) -> usize {
        self.fixed_area_len
    }

    /// Number of var-len (varchar/string) columns.
    #[inline]
    pub fn num_var_columns(&self) -> usize {
        self.num_var_columns
    }

    /// Byte offset of a fixed-size column inside the fixed field area.
    ///
    /// Panic if the column is var-len.
    #[inline]
    pub fn fixed_offset(&self, index: usize) -> usize {
        match self.field_slots[index] {
            FieldSlot::Fixed { offset } => offset,
            FieldSlot::Var { .. } => panic!("column {} is not fixed sized", index),
        }
    }

    /// Ordinal of a var-len column among all var-len columns, None for
    /// fixed-size columns.
    #[inline]
    pub fn var_ordinal(&self, index: usize) -> Option<usize> {
        match self.field_slots[index] {
            FieldSlot::Fixed { .. } => None,
            FieldSlot::Var { ordinal } => Some(ordinal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_layout() {
        let schema = Schema::new(vec![
            ColumnSchema::new("key", DatumKind::Varchar, false),
            ColumnSchema::new("ts", DatumKind::Timestamp, false),
            ColumnSchema::new("flag", DatumKind::Boolean, true),
            ColumnSchema::new("v", DatumKind::Double, true),
            ColumnSchema::new("note", DatumKind::String, true),
        ])
        .unwrap();

        assert_eq!(schema.version(), DEFAULT_SCHEMA_VERSION);
        assert_eq!(schema.num_columns(), 5);
        assert_eq!(schema.num_var_columns(), 2);
        // timestamp(8) + bool(1) + double(8)
        assert_eq!(schema.fixed_area_len(), 17);
        assert_eq!(schema.var_ordinal(0), Some(0));
        assert_eq!(schema.fixed_offset(1), 0);
        assert_eq!(schema.fixed_offset(2), 8);
        assert_eq!(schema.fixed_offset(3), 9);
        assert_eq!(schema.var_ordinal(4), Some(1));
        assert_eq!(schema.index_of("v"), Some(3));
        assert_eq!(schema.index_of("missing"), None);
    }

    #[test]
    fn test_invalid_schema() {
        assert!(Schema::new(vec![]).is_err());
        assert!(Schema::new(vec![ColumnSchema::new("a", DatumKind::Null, true)]).is_err());
    }
}
