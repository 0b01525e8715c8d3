// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Conversion between the in-memory schema and its wire message.

use common_types::{
    datum::DatumKind,
    schema::{self, ColumnSchema, Schema},
};
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to decode schema message, err:{}", source))]
    DecodeSchema {
        source: prost::DecodeError,
        backtrace: Backtrace,
    },

    #[snafu(display("Unknown data type in schema, value:{}.\nBacktrace:\n{}", value, backtrace))]
    UnknownDataType { value: i32, backtrace: Backtrace },

    #[snafu(display("Invalid schema, err:{}", source))]
    InvalidSchema { source: schema::Error },

    #[snafu(display(
        "Schema version out of range, version:{}.\nBacktrace:\n{}",
        version,
        backtrace
    ))]
    VersionOutOfRange { version: u32, backtrace: Backtrace },
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn kind_to_pb(kind: DatumKind) -> pb_types::DataType {
    match kind {
        DatumKind::Null => pb_types::DataType::Unknown,
        DatumKind::Boolean => pb_types::DataType::Bool,
        DatumKind::Int16 => pb_types::DataType::SmallInt,
        DatumKind::Int32 => pb_types::DataType::Int,
        DatumKind::Int64 => pb_types::DataType::BigInt,
        DatumKind::Float => pb_types::DataType::Float,
        DatumKind::Double => pb_types::DataType::Double,
        DatumKind::Timestamp => pb_types::DataType::Timestamp,
        DatumKind::Date => pb_types::DataType::Date,
        DatumKind::Varchar => pb_types::DataType::Varchar,
        DatumKind::String => pb_types::DataType::String,
    }
}

pub fn kind_from_pb(data_type: pb_types::DataType) -> Option<DatumKind> {
    let kind = match data_type {
        pb_types::DataType::Unknown => return None,
        pb_types::DataType::Bool => DatumKind::Boolean,
        pb_types::DataType::SmallInt => DatumKind::Int16,
        pb_types::DataType::Int => DatumKind::Int32,
        pb_types::DataType::BigInt => DatumKind::Int64,
        pb_types::DataType::Float => DatumKind::Float,
        pb_types::DataType::Double => DatumKind::Double,
        pb_types::DataType::Timestamp => DatumKind::Timestamp,
        pb_types::DataType::Date => DatumKind::Date,
        pb_types::DataType::Varchar => DatumKind::Varchar,
        pb_types::DataType::String => DatumKind::String,
    };
    Some(kind)
}

pub fn schema_to_pb(schema: &Schema) -> pb_types::SchemaPb {
    pb_types::SchemaPb {
        version: schema.version() as u32,
        columns: schema
            .columns()
            .iter()
            .map(|column| pb_types::ColumnDesc {
                name: column.name.clone(),
                data_type: kind_to_pb(column.data_type) as i32,
                not_null: !column.is_nullable,
                is_constant: false,
            })
            .collect(),
    }
}

pub fn schema_from_pb(message: &pb_types::SchemaPb) -> Result<Schema> {
    let mut columns = Vec::with_capacity(message.columns.len());
    for column in &message.columns {
        let data_type = pb_types::DataType::try_from(column.data_type)
            .ok()
            .and_then(kind_from_pb)
            .context(UnknownDataType {
                value: column.data_type,
            })?;
        columns.push(ColumnSchema::new(
            column.name.clone(),
            data_type,
            !column.not_null,
        ));
    }
    let version =
        u8::try_from(message.version).ok().context(VersionOutOfRange {
            version: message.version,
        })?;
    Schema::with_version(version, columns).context(InvalidSchema)
}

/// Decode a schema from its serialized wire form.
pub fn decode_schema(raw: &[u8]) -> Result<Schema> {
    let message = <pb_types::SchemaPb as prost::Message>::decode(raw).context(DecodeSchema)?;
    schema_from_pb(&message)
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn test_schema_pb_round_trip() {
        let schema = Schema::new(vec![
            ColumnSchema::new("key", DatumKind::Varchar, false),
            ColumnSchema::new("ts", DatumKind::Timestamp, false),
            ColumnSchema::new("v", DatumKind::Double, true),
        ])
        .unwrap();

        let message = schema_to_pb(&schema);
        assert_eq!(schema_from_pb(&message).unwrap(), schema);

        let raw = message.encode_to_vec();
        assert_eq!(decode_schema(&raw).unwrap(), schema);
    }

    #[test]
    fn test_unknown_type() {
        let message = pb_types::SchemaPb {
            version: 1,
            columns: vec![pb_types::ColumnDesc {
                name: "x".to_string(),
                data_type: 42,
                not_null: false,
                is_constant: false,
            }],
        };
        assert!(matches!(
            schema_from_pb(&message).unwrap_err(),
            Error::UnknownDataType { value: 42, .. }
        ));
    }
}
