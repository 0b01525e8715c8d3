// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Wire message types shared by clients and tablet servers.
//!
//! The attachment of a query response is the concatenation of encoded
//! rows; each row carries its own size field, which is the parsing cursor.

use bytes::Bytes;

/// Server side status code of a successful call.
pub const CODE_OK: i32 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    Unknown = 0,
    Bool = 1,
    SmallInt = 2,
    Int = 3,
    BigInt = 4,
    Float = 5,
    Double = 6,
    Timestamp = 7,
    Date = 8,
    Varchar = 9,
    String = 10,
}

/// One column of a serialized schema.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ColumnDesc {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "DataType", tag = "2")]
    pub data_type: i32,
    #[prost(bool, tag = "3")]
    pub not_null: bool,
    #[prost(bool, tag = "4")]
    pub is_constant: bool,
}

/// A schema travels as a repeated column message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SchemaPb {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(message, repeated, tag = "2")]
    pub columns: Vec<ColumnDesc>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryRequest {
    #[prost(string, tag = "1")]
    pub db: String,
    #[prost(string, tag = "2")]
    pub sql: String,
    /// Encoded request row bound to the plan in request mode, empty for
    /// batch-mode queries.
    #[prost(bytes = "bytes", tag = "3")]
    pub input_row: Bytes,
    #[prost(bool, tag = "4")]
    pub is_debug: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryResponse {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub msg: String,
    /// Serialized [SchemaPb] of the result rows.
    #[prost(bytes = "bytes", tag = "3")]
    pub schema: Bytes,
    #[prost(uint32, tag = "4")]
    pub count: u32,
    #[prost(uint32, tag = "5")]
    pub byte_size: u32,
    /// Concatenation of encoded result rows.
    #[prost(bytes = "bytes", tag = "6")]
    pub attachment: Bytes,
}

/// Batch request: rows of columns shared by every call are carried once,
/// the non-common rows are concatenated in the attachment and located
/// through the offset table.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BatchQueryRequest {
    #[prost(string, tag = "1")]
    pub db: String,
    #[prost(string, tag = "2")]
    pub sql: String,
    #[prost(uint32, repeated, tag = "3")]
    pub common_column_indices: Vec<u32>,
    #[prost(bytes = "bytes", tag = "4")]
    pub common_row: Bytes,
    #[prost(uint32, repeated, tag = "5")]
    pub row_offsets: Vec<u32>,
    #[prost(bytes = "bytes", tag = "6")]
    pub attachment: Bytes,
    #[prost(bool, tag = "7")]
    pub is_debug: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BatchQueryResponse {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub msg: String,
    #[prost(bytes = "bytes", tag = "3")]
    pub schema: Bytes,
    #[prost(uint32, tag = "4")]
    pub count: u32,
    #[prost(uint32, tag = "5")]
    pub byte_size: u32,
    #[prost(bytes = "bytes", tag = "6")]
    pub attachment: Bytes,
}

/// One secondary index key of a put, `idx` names the index dimension.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Dimension {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(uint32, tag = "2")]
    pub idx: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PutRequest {
    #[prost(uint32, tag = "1")]
    pub tid: u32,
    #[prost(uint32, tag = "2")]
    pub pid: u32,
    #[prost(uint64, tag = "3")]
    pub time: u64,
    #[prost(message, repeated, tag = "4")]
    pub dimensions: Vec<Dimension>,
    /// The encoded row.
    #[prost(bytes = "bytes", tag = "5")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PutResponse {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub msg: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProcedureInfo {
    #[prost(string, tag = "1")]
    pub db_name: String,
    #[prost(string, tag = "2")]
    pub sp_name: String,
    #[prost(string, tag = "3")]
    pub sql: String,
    #[prost(message, optional, tag = "4")]
    pub input_schema: Option<SchemaPb>,
    #[prost(message, optional, tag = "5")]
    pub output_schema: Option<SchemaPb>,
    #[prost(string, repeated, tag = "6")]
    pub tables: Vec<String>,
    /// The request-mode plan's primary data provider.
    #[prost(string, tag = "7")]
    pub main_table: String,
}
