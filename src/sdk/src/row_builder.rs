// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Builders of request and insert rows.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::Arc,
};

use bytes::Bytes;
use common_types::{
    datum::{Datum, DatumKind},
    row::{self, Row, RowEncoder},
    schema::Schema,
};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use twox_hash::XxHash64;

use crate::client::TableInfo;

/// Hash seed of partition routing. Modifying the seed changes every
/// routing decision!
const HASH_SEED: u64 = 0;

#[derive(Debug, Snafu)]
#[snafu(visibility = "pub(crate)")]
pub enum Error {
    #[snafu(display(
        "Too many values pushed into the row, expect:{}.\nBacktrace:\n{}",
        expect,
        backtrace
    ))]
    TooManyValues { expect: usize, backtrace: Backtrace },

    #[snafu(display(
        "Datum type mismatches the column, column:{}, expect:{}, given:{}.\nBacktrace:\n{}",
        column,
        expect,
        given,
        backtrace
    ))]
    TypeMismatch {
        column: String,
        expect: DatumKind,
        given: DatumKind,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "Null value for non-nullable column, column:{}.\nBacktrace:\n{}",
        column,
        backtrace
    ))]
    NotNull { column: String, backtrace: Backtrace },

    #[snafu(display(
        "Row is incomplete, missing {} value(s).\nBacktrace:\n{}",
        missing,
        backtrace
    ))]
    Incomplete { missing: usize, backtrace: Backtrace },

    #[snafu(display("Failed to encode row, err:{}", source))]
    EncodeRow { source: row::Error },

    #[snafu(display(
        "Time column holds no usable time, column:{}.\nBacktrace:\n{}",
        column,
        backtrace
    ))]
    NoTime { column: String, backtrace: Backtrace },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Partition id of one index key.
pub fn partition_of(key: &str, partition_num: u32) -> u32 {
    let mut hasher = XxHash64::with_seed(HASH_SEED);
    key.hash(&mut hasher);
    (hasher.finish() % partition_num as u64) as u32
}

/// Builder of the one row-shaped input a request-mode plan binds to.
///
/// Values are pushed in schema order.
pub struct SqlRequestRow {
    schema: Arc<Schema>,
    datums: Vec<Datum>,
}

impl SqlRequestRow {
    pub fn new(schema: Arc<Schema>) -> Self {
        let datums = Vec::with_capacity(schema.num_columns());
        Self { schema, datums }
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn push(&mut self, datum: Datum) -> Result<()> {
        let index = self.datums.len();
        ensure!(
            index < self.schema.num_columns(),
            TooManyValues {
                expect: self.schema.num_columns(),
            }
        );
        check_column(&self.schema, index, &datum)?;
        self.datums.push(datum);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.datums.len() == self.schema.num_columns()
    }

    pub fn build(&self) -> Result<Bytes> {
        ensure!(
            self.is_complete(),
            Incomplete {
                missing: self.schema.num_columns() - self.datums.len(),
            }
        );
        let row = Row::from_datums(self.datums.clone());
        let raw = RowEncoder::new(&self.schema)
            .encode(&row)
            .context(EncodeRow)?;
        Ok(Bytes::from(raw))
    }
}

fn check_column(schema: &Schema, index: usize, datum: &Datum) -> Result<()> {
    let column = schema.column(index);
    if datum.is_null() {
        ensure!(column.is_nullable, NotNull { column: column.name.clone() });
        return Ok(());
    }
    ensure!(
        datum.kind() == column.data_type,
        TypeMismatch {
            column: column.name.clone(),
            expect: column.data_type,
            given: datum.kind(),
        }
    );
    Ok(())
}

/// Builder of one row of a planned INSERT.
///
/// Columns covered by the statement's literals or by declared defaults are
/// pre-populated; the remaining placeholder columns are filled through
/// [SqlInsertRow::push] in schema order.
#[derive(Debug)]
pub struct SqlInsertRow {
    table_info: Arc<TableInfo>,
    schema: Arc<Schema>,
    cells: Vec<Option<Datum>>,
    /// Schema indices of placeholder columns, in push order.
    pending: Vec<usize>,
    next_pending: usize,
}

impl SqlInsertRow {
    pub(crate) fn new(
        table_info: Arc<TableInfo>,
        schema: Arc<Schema>,
        default_map: &HashMap<usize, Datum>,
    ) -> Self {
        let num_columns = schema.num_columns();
        let mut cells = vec![None; num_columns];
        let mut pending = Vec::new();
        for index in 0..num_columns {
            match default_map.get(&index) {
                Some(datum) => cells[index] = Some(datum.clone()),
                None => pending.push(index),
            }
        }
        Self {
            table_info,
            schema,
            cells,
            pending,
            next_pending: 0,
        }
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Fill the next placeholder column.
    pub fn push(&mut self, datum: Datum) -> Result<()> {
        let index = *self
            .pending
            .get(self.next_pending)
            .context(TooManyValues {
                expect: self.pending.len(),
            })?;
        check_column(&self.schema, index, &datum)?;
        self.cells[index] = Some(datum);
        self.next_pending += 1;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.next_pending == self.pending.len()
    }

    fn datums(&self) -> Result<Vec<Datum>> {
        ensure!(
            self.is_complete(),
            Incomplete {
                missing: self.pending.len() - self.next_pending,
            }
        );
        Ok(self
            .cells
            .iter()
            .map(|cell| cell.clone().unwrap_or(Datum::Null))
            .collect())
    }

    pub fn build(&self) -> Result<Bytes> {
        let row = Row::from_datums(self.datums()?);
        let raw = RowEncoder::new(&self.schema)
            .encode(&row)
            .context(EncodeRow)?;
        Ok(Bytes::from(raw))
    }

    /// Value of the time column, in storage time units.
    pub fn time(&self) -> Result<u64> {
        let index = self.table_info.ts_index;
        let column = self.schema.column(index);
        let datum = self.cells[index].as_ref().context(NoTime {
            column: column.name.clone(),
        })?;
        match datum {
            Datum::Timestamp(ts) => Ok(ts.as_i64() as u64),
            Datum::Int64(v) => Ok(*v as u64),
            _ => NoTime {
                column: column.name.clone(),
            }
            .fail(),
        }
    }

    /// Partition-dimension map of the row: partition id to the index keys
    /// stored under it.
    pub fn dimensions(&self) -> Result<HashMap<u32, Vec<pb_types::Dimension>>> {
        let mut dims: HashMap<u32, Vec<pb_types::Dimension>> = HashMap::new();
        for index_info in &self.table_info.indexes {
            let column = self.schema.column(index_info.column_index);
            let datum = self.cells[index_info.column_index]
                .as_ref()
                .context(Incomplete { missing: 1usize })?;
            let key = index_key(datum).context(NotNull {
                column: column.name.clone(),
            })?;
            let pid = partition_of(&key, self.table_info.partition_num);
            dims.entry(pid).or_default().push(pb_types::Dimension {
                key,
                idx: index_info.idx_id,
            });
        }
        Ok(dims)
    }
}

fn index_key(datum: &Datum) -> Option<String> {
    match datum {
        Datum::Null => None,
        Datum::Varchar(v) | Datum::String(v) => Some(v.clone()),
        Datum::Boolean(v) => Some(v.to_string()),
        Datum::Int16(v) => Some(v.to_string()),
        Datum::Int32(v) => Some(v.to_string()),
        Datum::Int64(v) => Some(v.to_string()),
        Datum::Float(v) => Some(v.to_string()),
        Datum::Double(v) => Some(v.to_string()),
        Datum::Timestamp(v) => Some(v.as_i64().to_string()),
        Datum::Date(v) => Some(v.as_i32().to_string()),
    }
}

/// Builder of a batch request: the common-column row is carried once, the
/// per-call rows are concatenated and located through an offset table.
pub struct SqlRequestRowBatch {
    schema: Arc<Schema>,
    common_column_indices: Vec<u32>,
    rows: Vec<Bytes>,
}

impl SqlRequestRowBatch {
    pub fn new(schema: Arc<Schema>, common_column_indices: Vec<u32>) -> Self {
        Self {
            schema,
            common_column_indices,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: &SqlRequestRow) -> Result<()> {
        self.rows.push(row.build()?);
        Ok(())
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn to_request(&self, db: &str, sql: &str, is_debug: bool) -> pb_types::BatchQueryRequest {
        let mut attachment = Vec::new();
        let mut row_offsets = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            row_offsets.push(attachment.len() as u32);
            attachment.extend_from_slice(row);
        }
        pb_types::BatchQueryRequest {
            db: db.to_string(),
            sql: sql.to_string(),
            common_column_indices: self.common_column_indices.clone(),
            common_row: self.rows.first().cloned().unwrap_or_default(),
            row_offsets,
            attachment: Bytes::from(attachment),
            is_debug,
        }
    }
}
