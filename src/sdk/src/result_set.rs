// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Result sets over query responses.
//!
//! The response attachment is the concatenation of encoded rows; every row
//! carries its own size field, which is the parsing cursor.

use bytes::Bytes;
use common_types::{
    row::{self, encoded::SIZE_OFFSET, RowView},
    schema::Schema,
};
use log::warn;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::schema_adapter;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to decode response schema, err:{}", source))]
    SchemaDecode { source: schema_adapter::Error },

    #[snafu(display("Failed to read row of result set, err:{}", source))]
    ReadRow { source: row::Error },

    #[snafu(display("Result set has no current row.\nBacktrace:\n{}", backtrace))]
    NoRow { backtrace: snafu::Backtrace },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Cursor over a concatenation of encoded rows.
#[derive(Debug)]
struct RowCursor {
    attachment: Bytes,
    count: u32,
    byte_size: usize,
    index: i64,
    position: usize,
    current: (usize, usize),
}

impl RowCursor {
    fn new(attachment: Bytes, count: u32, byte_size: u32) -> Self {
        Self {
            attachment,
            count,
            byte_size: byte_size as usize,
            index: -1,
            position: 0,
            current: (0, 0),
        }
    }

    fn next(&mut self) -> bool {
        self.index += 1;
        if self.index >= self.count as i64 || self.position >= self.byte_size {
            return false;
        }
        let size_start = self.position + SIZE_OFFSET;
        if size_start + 4 > self.attachment.len() {
            warn!(
                "result set attachment is truncated, position:{}, len:{}",
                self.position,
                self.attachment.len()
            );
            return false;
        }
        let row_size = u32::from_le_bytes([
            self.attachment[size_start],
            self.attachment[size_start + 1],
            self.attachment[size_start + 2],
            self.attachment[size_start + 3],
        ]) as usize;
        if row_size == 0 || self.position + row_size > self.attachment.len() {
            warn!(
                "result set row size is corrupted, position:{}, row_size:{}",
                self.position, row_size
            );
            return false;
        }
        self.current = (self.position, row_size);
        self.position += row_size;
        true
    }

    fn reset(&mut self) {
        self.index = -1;
        self.position = 0;
        self.current = (0, 0);
    }

    fn current(&self) -> &[u8] {
        let (start, len) = self.current;
        &self.attachment[start..start + len]
    }
}

/// Result set of one query or procedure call.
///
/// A non-zero server code is surfaced through [ResultSetSql::code] and
/// [ResultSetSql::msg]; such a result set yields no rows.
#[derive(Debug)]
pub struct ResultSetSql {
    code: i32,
    msg: String,
    schema: Option<Schema>,
    cursor: RowCursor,
}

impl ResultSetSql {
    pub fn new(response: pb_types::QueryResponse) -> Result<Self> {
        let schema = if response.code == pb_types::CODE_OK && response.byte_size > 0 {
            Some(schema_adapter::decode_schema(&response.schema).context(SchemaDecode)?)
        } else {
            None
        };
        Ok(Self {
            code: response.code,
            msg: response.msg,
            schema,
            cursor: RowCursor::new(response.attachment, response.count, response.byte_size),
        })
    }

    #[inline]
    pub fn code(&self) -> i32 {
        self.code
    }

    #[inline]
    pub fn msg(&self) -> &str {
        &self.msg
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.cursor.count
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Advance to the next row, false when exhausted (or the call failed).
    pub fn next(&mut self) -> bool {
        if self.schema.is_none() {
            return false;
        }
        self.cursor.next()
    }

    /// Restart from before the first row.
    pub fn reset(&mut self) {
        self.cursor.reset();
    }

    /// Typed view over the current row.
    ///
    /// Valid only after [Self::next] returned true.
    pub fn row_view(&self) -> Result<RowView<'_>> {
        let schema = self.schema.as_ref().context(NoRow)?;
        RowView::try_new(schema, self.cursor.current()).context(ReadRow)
    }
}

/// Result set of one batch request call.
pub struct BatchResultSet {
    code: i32,
    msg: String,
    schema: Option<Schema>,
    cursor: RowCursor,
}

impl BatchResultSet {
    pub fn new(response: pb_types::BatchQueryResponse) -> Result<Self> {
        let schema = if response.code == pb_types::CODE_OK && response.byte_size > 0 {
            Some(schema_adapter::decode_schema(&response.schema).context(SchemaDecode)?)
        } else {
            None
        };
        Ok(Self {
            code: response.code,
            msg: response.msg,
            schema,
            cursor: RowCursor::new(response.attachment, response.count, response.byte_size),
        })
    }

    #[inline]
    pub fn code(&self) -> i32 {
        self.code
    }

    #[inline]
    pub fn msg(&self) -> &str {
        &self.msg
    }

    pub fn next(&mut self) -> bool {
        if self.schema.is_none() {
            return false;
        }
        self.cursor.next()
    }

    pub fn row_view(&self) -> Result<RowView<'_>> {
        let schema = self.schema.as_ref().context(NoRow)?;
        RowView::try_new(schema, self.cursor.current()).context(ReadRow)
    }
}

#[cfg(test)]
mod tests {
    use common_types::{
        datum::{Datum, DatumKind},
        row::{Row, RowEncoder},
        schema::ColumnSchema,
    };
    use prost::Message;

    use super::*;
    use crate::schema_adapter::schema_to_pb;

    fn sample_response() -> pb_types::QueryResponse {
        let schema = Schema::new(vec![
            ColumnSchema::new("id", DatumKind::Int32, false),
            ColumnSchema::new("name", DatumKind::Varchar, true),
        ])
        .unwrap();
        let encoder = RowEncoder::new(&schema);
        let mut attachment = Vec::new();
        for (id, name) in [(1, Some("one")), (2, None)] {
            let row = Row::from_datums(vec![
                Datum::Int32(id),
                name.map(|v| Datum::Varchar(v.to_string()))
                    .unwrap_or(Datum::Null),
            ]);
            attachment.extend_from_slice(&encoder.encode(&row).unwrap());
        }
        pb_types::QueryResponse {
            code: pb_types::CODE_OK,
            msg: String::new(),
            schema: Bytes::from(schema_to_pb(&schema).encode_to_vec()),
            count: 2,
            byte_size: attachment.len() as u32,
            attachment: Bytes::from(attachment),
        }
    }

    #[test]
    fn test_walk_rows() {
        let mut rs = ResultSetSql::new(sample_response()).unwrap();
        assert_eq!(rs.code(), 0);
        assert_eq!(rs.count(), 2);

        assert!(rs.next());
        let view = rs.row_view().unwrap();
        assert_eq!(view.get_i32(0).unwrap(), Some(1));
        assert_eq!(view.get_varchar(1).unwrap(), Some("one"));

        assert!(rs.next());
        let view = rs.row_view().unwrap();
        assert_eq!(view.get_i32(0).unwrap(), Some(2));
        assert!(view.is_null(1));

        assert!(!rs.next());

        rs.reset();
        assert!(rs.next());
        assert_eq!(rs.row_view().unwrap().get_i32(0).unwrap(), Some(1));
    }

    #[test]
    fn test_failed_response_yields_no_rows() {
        let mut response = sample_response();
        response.code = 139;
        response.msg = "table not ready".to_string();
        let mut rs = ResultSetSql::new(response).unwrap();
        assert_eq!(rs.code(), 139);
        assert_eq!(rs.msg(), "table not ready");
        assert!(!rs.next());
    }
}
