// Copyright 2022-2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Self-describing contiguous row encoding.
//!
//! Here is the layout of an encoded row:
//! ```plaintext
//! +-------------+-------------+---------------------+------------------+------------------+----------------+
//! | version(1B) | size(4B LE) | null bitmap ceil(n/8) | fixed field area | var offset area  | var body area  |
//! +-------------+-------------+---------------------+------------------+------------------+----------------+
//! ```
//! The `version` byte is the schema version the row was encoded with and
//! `size` is the total encoded length. The null bitmap holds one bit per
//! column in LSB-first order, a set bit marking a null column. Fixed-size
//! columns are stored little-endian at schema-derived offsets; a null
//! column still reserves its slot so field offsets never depend on the
//! data. Each var-len column owns one entry in the var offset area holding
//! the absolute offset of its payload in the var body area, encoded in
//! `addr_len` bytes where `addr_len` is the smallest width able to address
//! any byte of the row. Entries are little-endian except the 3-byte width,
//! which is big-endian for wire compatibility. A null or empty var-len
//! column stores the offset of the next body byte, so the length of column
//! `i` is always `offset[i + 1] - offset[i]` (the last column ends at
//! `size`).

use snafu::{ensure, Backtrace, OptionExt, Snafu};

use crate::{
    bitset::{BitSet, RoBitSet},
    datum::{Datum, DatumKind, DatumView, Date},
    row::Row,
    schema::Schema,
    time::Timestamp,
};

pub const VERSION_SIZE: usize = 1;
pub const SIZE_SIZE: usize = 4;
/// Offset of the `size` field, also the parsing cursor of a row stream.
pub const SIZE_OFFSET: usize = VERSION_SIZE;
pub const HEADER_SIZE: usize = VERSION_SIZE + SIZE_SIZE;

/// Max allowed byte length of one var-len datum (16 MB).
const MAX_STRING_LEN: usize = 1024 * 1024 * 16;

#[derive(Debug, Snafu)]
#[snafu(visibility = "pub(crate)")]
pub enum Error {
    #[snafu(display(
        "Buffer is shorter than the encoded row, expect:{}, given:{}.\nBacktrace:\n{}",
        expect,
        given,
        backtrace
    ))]
    Truncated {
        expect: usize,
        given: usize,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "Unsupported row version, expect:{}, given:{}.\nBacktrace:\n{}",
        expect,
        given,
        backtrace
    ))]
    UnsupportedVersion {
        expect: u8,
        given: u8,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "Row arity mismatches the schema, expect:{}, given:{}.\nBacktrace:\n{}",
        expect,
        given,
        backtrace
    ))]
    SchemaMismatch {
        expect: usize,
        given: usize,
        backtrace: Backtrace,
    },

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
        "String is too long to encode into row (max is {}), len:{}.\nBacktrace:\n{}",
        MAX_STRING_LEN,
        len,
        backtrace
    ))]
    StringTooLong { len: usize, backtrace: Backtrace },

    #[snafu(display(
        "Row is too long to encode (max is {}), len:{}.\nBacktrace:\n{}",
        u32::MAX,
        len,
        backtrace
    ))]
    RowTooLong { len: usize, backtrace: Backtrace },

    #[snafu(display(
        "Var-len offsets are corrupted, start:{}, end:{}, size:{}.\nBacktrace:\n{}",
        start,
        end,
        size,
        backtrace
    ))]
    InvalidOffset {
        start: usize,
        end: usize,
        size: usize,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The smallest byte width able to address any byte of a row of `size`
/// bytes.
#[inline]
pub fn var_addr_len(size: u32) -> usize {
    if size <= 0xff {
        1
    } else if size <= 0xffff {
        2
    } else if size <= 0xff_ffff {
        3
    } else {
        4
    }
}

#[inline]
const fn max_size_for_addr_len(addr_len: usize) -> usize {
    match addr_len {
        1 => 0xff,
        2 => 0xffff,
        3 => 0xff_ffff,
        _ => u32::MAX as usize,
    }
}

fn write_var_offset(buf: &mut [u8], pos: usize, addr_len: usize, value: usize) {
    match addr_len {
        1 => buf[pos] = value as u8,
        2 => buf[pos..pos + 2].copy_from_slice(&(value as u16).to_le_bytes()),
        // The 3B width is big-endian, unlike every other width.
        3 => {
            buf[pos] = (value >> 16) as u8;
            buf[pos + 1] = (value >> 8) as u8;
            buf[pos + 2] = value as u8;
        }
        _ => buf[pos..pos + 4].copy_from_slice(&(value as u32).to_le_bytes()),
    }
}

fn read_var_offset(buf: &[u8], pos: usize, addr_len: usize) -> usize {
    match addr_len {
        1 => buf[pos] as usize,
        2 => u16::from_le_bytes([buf[pos], buf[pos + 1]]) as usize,
        3 => ((buf[pos] as usize) << 16) | ((buf[pos + 1] as usize) << 8) | buf[pos + 2] as usize,
        _ => u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]) as usize,
    }
}

/// Encoder of rows under one schema.
///
/// Encoding is deterministic: the same schema and datums always produce
/// byte-identical output.
#[derive(Debug, Clone)]
pub struct RowEncoder<'a> {
    schema: &'a Schema,
}

impl<'a> RowEncoder<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    pub fn encode(&self, row: &Row) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_to(row, &mut buf)?;
        Ok(buf)
    }

    /// Encode `row` into `buf`, the buffer will be reset first.
    pub fn encode_to(&self, row: &Row, buf: &mut Vec<u8>) -> Result<()> {
        let num_columns = self.schema.num_columns();
        ensure!(
            row.num_columns() == num_columns,
            SchemaMismatch {
                expect: num_columns,
                given: row.num_columns(),
            }
        );

        // First pass: nullability/type checks and var body sizing.
        let mut nulls = BitSet::new(num_columns);
        let mut var_body_len = 0;
        for (index, datum) in row.iter().enumerate() {
            let column = self.schema.column(index);
            if datum.is_null() {
                ensure!(column.is_nullable, NotNull { column: column.name.clone() });
                nulls.set(index);
                continue;
            }
            ensure!(
                datum.kind() == column.data_type,
                TypeMismatch {
                    column: column.name.clone(),
                    expect: column.data_type,
                    given: datum.kind(),
                }
            );
            if !column.data_type.is_fixed_sized() {
                let len = datum.var_size();
                ensure!(len <= MAX_STRING_LEN, StringTooLong { len });
                var_body_len += len;
            }
        }

        let num_var = self.schema.num_var_columns();
        let base_len =
            HEADER_SIZE + BitSet::num_bytes(num_columns) + self.schema.fixed_area_len();
        // Pick the smallest addr width whose resulting total size it can
        // still address.
        let mut picked = None;
        for addr_len in 1..=4 {
            let total = base_len + addr_len * num_var + var_body_len;
            if total <= max_size_for_addr_len(addr_len) {
                picked = Some((addr_len, total));
                break;
            }
        }
        let (addr_len, total) = picked.context(RowTooLong {
            len: base_len + 4 * num_var + var_body_len,
        })?;

        buf.clear();
        buf.resize(total, 0);
        buf[0] = self.schema.version();
        buf[SIZE_OFFSET..HEADER_SIZE].copy_from_slice(&(total as u32).to_le_bytes());
        let fixed_start = HEADER_SIZE + nulls.as_bytes().len();
        buf[HEADER_SIZE..fixed_start].copy_from_slice(nulls.as_bytes());

        // Second pass: fixed fields.
        for (index, datum) in row.iter().enumerate() {
            if datum.is_null() || !datum.kind().is_fixed_sized() {
                continue;
            }
            let offset = fixed_start + self.schema.fixed_offset(index);
            write_fixed_datum(buf, offset, datum);
        }

        // Third pass: var offsets and bodies. Null and empty columns store
        // the running body cursor, which keeps offsets monotonic and makes
        // lengths derivable from adjacent entries.
        let slots_start = fixed_start + self.schema.fixed_area_len();
        let mut body_cursor = slots_start + addr_len * num_var;
        for (index, datum) in row.iter().enumerate() {
            let ordinal = match self.schema.var_ordinal(index) {
                Some(v) => v,
                None => continue,
            };
            write_var_offset(buf, slots_start + ordinal * addr_len, addr_len, body_cursor);
            if let Some(payload) = datum.as_str() {
                buf[body_cursor..body_cursor + payload.len()].copy_from_slice(payload.as_bytes());
                body_cursor += payload.len();
            }
        }
        debug_assert_eq!(body_cursor, total);

        Ok(())
    }
}

fn write_fixed_datum(buf: &mut [u8], offset: usize, datum: &Datum) {
    match datum {
        Datum::Boolean(v) => buf[offset] = *v as u8,
        Datum::Int16(v) => buf[offset..offset + 2].copy_from_slice(&v.to_le_bytes()),
        Datum::Int32(v) => buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes()),
        Datum::Int64(v) => buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes()),
        Datum::Float(v) => buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes()),
        Datum::Double(v) => buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes()),
        Datum::Timestamp(v) => {
            buf[offset..offset + 8].copy_from_slice(&v.as_i64().to_le_bytes())
        }
        Datum::Date(v) => buf[offset..offset + 4].copy_from_slice(&v.as_i32().to_le_bytes()),
        // Null and var-len datums have no fixed payload.
        Datum::Null | Datum::Varchar(_) | Datum::String(_) => (),
    }
}

/// Non-owning typed reader over one encoded row.
///
/// Fixed fields are read with a single load at a schema-derived offset.
/// The backing buffer must outlive the view; [RowView::reset] rebinds the
/// view to another buffer without allocating.
#[derive(Debug)]
pub struct RowView<'a> {
    schema: &'a Schema,
    buf: &'a [u8],
    size: usize,
    addr_len: usize,
}

impl<'a> RowView<'a> {
    pub fn try_new(schema: &'a Schema, buf: &'a [u8]) -> Result<Self> {
        let (size, addr_len) = Self::validate(schema, buf)?;
        Ok(Self {
            schema,
            buf,
            size,
            addr_len,
        })
    }

    /// Rebind the view to another encoded row.
    pub fn reset(&mut self, buf: &'a [u8]) -> Result<()> {
        let (size, addr_len) = Self::validate(self.schema, buf)?;
        self.buf = buf;
        self.size = size;
        self.addr_len = addr_len;
        Ok(())
    }

    fn validate(schema: &Schema, buf: &[u8]) -> Result<(usize, usize)> {
        ensure!(
            buf.len() >= HEADER_SIZE,
            Truncated {
                expect: HEADER_SIZE,
                given: buf.len(),
            }
        );
        ensure!(
            buf[0] == schema.version(),
            UnsupportedVersion {
                expect: schema.version(),
                given: buf[0],
            }
        );
        let size = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        ensure!(
            buf.len() >= size,
            Truncated {
                expect: size,
                given: buf.len(),
            }
        );
        let addr_len = var_addr_len(size as u32);
        let min_len = HEADER_SIZE
            + BitSet::num_bytes(schema.num_columns())
            + schema.fixed_area_len()
            + addr_len * schema.num_var_columns();
        ensure!(
            size >= min_len,
            Truncated {
                expect: min_len,
                given: size,
            }
        );
        Ok((size, addr_len))
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn fixed_start(&self) -> usize {
        HEADER_SIZE + BitSet::num_bytes(self.schema.num_columns())
    }

    /// Tells whether the column at `index` is null, reading only the null
    /// bitmap.
    ///
    /// Panic if `index` is out of bound.
    #[inline]
    pub fn is_null(&self, index: usize) -> bool {
        // The bitmap length was checked when the view was bound.
        let nulls = RoBitSet::try_new(&self.buf[HEADER_SIZE..], self.schema.num_columns()).unwrap();
        nulls.is_set(index).unwrap()
    }

    fn check_kind(&self, index: usize, expect: DatumKind) -> Result<()> {
        let column = self.schema.column(index);
        ensure!(
            column.data_type == expect,
            TypeMismatch {
                column: column.name.clone(),
                expect,
                given: column.data_type,
            }
        );
        Ok(())
    }

    #[inline]
    fn fixed_slice(&self, index: usize, len: usize) -> &'a [u8] {
        let offset = self.fixed_start() + self.schema.fixed_offset(index);
        &self.buf[offset..offset + len]
    }

    pub fn get_bool(&self, index: usize) -> Result<Option<bool>> {
        self.check_kind(index, DatumKind::Boolean)?;
        if self.is_null(index) {
            return Ok(None);
        }
        Ok(Some(self.fixed_slice(index, 1)[0] != 0))
    }

    pub fn get_i16(&self, index: usize) -> Result<Option<i16>> {
        self.check_kind(index, DatumKind::Int16)?;
        if self.is_null(index) {
            return Ok(None);
        }
        let raw = self.fixed_slice(index, 2).try_into().unwrap();
        Ok(Some(i16::from_le_bytes(raw)))
    }

    pub fn get_i32(&self, index: usize) -> Result<Option<i32>> {
        self.check_kind(index, DatumKind::Int32)?;
        if self.is_null(index) {
            return Ok(None);
        }
        let raw = self.fixed_slice(index, 4).try_into().unwrap();
        Ok(Some(i32::from_le_bytes(raw)))
    }

    pub fn get_i64(&self, index: usize) -> Result<Option<i64>> {
        self.check_kind(index, DatumKind::Int64)?;
        if self.is_null(index) {
            return Ok(None);
        }
        let raw = self.fixed_slice(index, 8).try_into().unwrap();
        Ok(Some(i64::from_le_bytes(raw)))
    }

    pub fn get_f32(&self, index: usize) -> Result<Option<f32>> {
        self.check_kind(index, DatumKind::Float)?;
        if self.is_null(index) {
            return Ok(None);
        }
        let raw = self.fixed_slice(index, 4).try_into().unwrap();
        Ok(Some(f32::from_le_bytes(raw)))
    }

    pub fn get_f64(&self, index: usize) -> Result<Option<f64>> {
        self.check_kind(index, DatumKind::Double)?;
        if self.is_null(index) {
            return Ok(None);
        }
        let raw = self.fixed_slice(index, 8).try_into().unwrap();
        Ok(Some(f64::from_le_bytes(raw)))
    }

    pub fn get_timestamp(&self, index: usize) -> Result<Option<Timestamp>> {
        self.check_kind(index, DatumKind::Timestamp)?;
        if self.is_null(index) {
            return Ok(None);
        }
        let raw = self.fixed_slice(index, 8).try_into().unwrap();
        Ok(Some(Timestamp::new(i64::from_le_bytes(raw))))
    }

    pub fn get_date(&self, index: usize) -> Result<Option<Date>> {
        self.check_kind(index, DatumKind::Date)?;
        if self.is_null(index) {
            return Ok(None);
        }
        let raw = self.fixed_slice(index, 4).try_into().unwrap();
        Ok(Some(Date::from_raw(i32::from_le_bytes(raw))))
    }

    pub fn get_varchar(&self, index: usize) -> Result<Option<&'a str>> {
        self.check_kind(index, DatumKind::Varchar)?;
        self.var_str(index)
    }

    pub fn get_string(&self, index: usize) -> Result<Option<&'a str>> {
        self.check_kind(index, DatumKind::String)?;
        self.var_str(index)
    }

    fn var_str(&self, index: usize) -> Result<Option<&'a str>> {
        // Safety: the encoder only writes valid utf8 payloads.
        Ok(self
            .var_bytes(index)?
            .map(|raw| unsafe { std::str::from_utf8_unchecked(raw) }))
    }

    /// Raw `(pointer, length)` view over the var body area of a var-len
    /// column, None when the column is null.
    pub fn var_bytes(&self, index: usize) -> Result<Option<&'a [u8]>> {
        let column = self.schema.column(index);
        let ordinal = match self.schema.var_ordinal(index) {
            Some(v) => v,
            None => {
                return TypeMismatch {
                    column: column.name.clone(),
                    expect: DatumKind::String,
                    given: column.data_type,
                }
                .fail()
            }
        };
        if self.is_null(index) {
            return Ok(None);
        }

        let slots_start = self.fixed_start() + self.schema.fixed_area_len();
        let start = read_var_offset(self.buf, slots_start + ordinal * self.addr_len, self.addr_len);
        let end = if ordinal + 1 == self.schema.num_var_columns() {
            self.size
        } else {
            read_var_offset(
                self.buf,
                slots_start + (ordinal + 1) * self.addr_len,
                self.addr_len,
            )
        };
        ensure!(
            start <= end && end <= self.size,
            InvalidOffset {
                start,
                end,
                size: self.size,
            }
        );
        Ok(Some(&self.buf[start..end]))
    }

    /// Typed view of the column at `index`.
    pub fn datum_view(&self, index: usize) -> Result<DatumView<'a>> {
        if self.is_null(index) {
            return Ok(DatumView::Null);
        }
        let view = match self.schema.column(index).data_type {
            DatumKind::Boolean => DatumView::Boolean(self.get_bool(index)?.unwrap()),
            DatumKind::Int16 => DatumView::Int16(self.get_i16(index)?.unwrap()),
            DatumKind::Int32 => DatumView::Int32(self.get_i32(index)?.unwrap()),
            DatumKind::Int64 => DatumView::Int64(self.get_i64(index)?.unwrap()),
            DatumKind::Float => DatumView::Float(self.get_f32(index)?.unwrap()),
            DatumKind::Double => DatumView::Double(self.get_f64(index)?.unwrap()),
            DatumKind::Timestamp => DatumView::Timestamp(self.get_timestamp(index)?.unwrap()),
            DatumKind::Date => DatumView::Date(self.get_date(index)?.unwrap()),
            DatumKind::Varchar => DatumView::Varchar(self.get_varchar(index)?.unwrap()),
            DatumKind::String => DatumView::String(self.get_string(index)?.unwrap()),
            DatumKind::Null => DatumView::Null,
        };
        Ok(view)
    }
}

/// Materialize the whole encoded row.
pub fn decode_row(schema: &Schema, buf: &[u8]) -> Result<Row> {
    let view = RowView::try_new(schema, buf)?;
    let mut datums = Vec::with_capacity(schema.num_columns());
    for index in 0..schema.num_columns() {
        datums.push(view.datum_view(index)?.to_datum());
    }
    Ok(Row::from_datums(datums))
}
