// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Lazy iterators over one column of a borrowed list of encoded rows.

use crate::{
    datum::{DatumKind, DatumView},
    row::encoded::{Result, RowView, TypeMismatch},
    schema::Schema,
};

/// Iterator over the values of one string-typed column across a list of
/// encoded rows.
///
/// The iterator borrows the row list, yields `(row_index, payload)` with a
/// `None` payload for null cells, and can be restarted from any row index.
pub struct StringColumnIter<'a, B> {
    schema: &'a Schema,
    rows: &'a [B],
    column_index: usize,
    row_index: usize,
}

impl<'a, B: AsRef<[u8]>> StringColumnIter<'a, B> {
    pub fn new(schema: &'a Schema, rows: &'a [B], column_index: usize) -> Result<Self> {
        let column = schema.column(column_index);
        snafu::ensure!(
            matches!(column.data_type, DatumKind::Varchar | DatumKind::String),
            TypeMismatch {
                column: column.name.clone(),
                expect: DatumKind::String,
                given: column.data_type,
            }
        );
        Ok(Self {
            schema,
            rows,
            column_index,
            row_index: 0,
        })
    }

    /// Restart iteration from the given row index.
    pub fn restart_from(&mut self, row_index: usize) {
        self.row_index = row_index;
    }
}

impl<'a, B: AsRef<[u8]>> Iterator for StringColumnIter<'a, B> {
    type Item = Result<(usize, Option<&'a [u8]>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.rows.get(self.row_index)?.as_ref();
        let row_index = self.row_index;
        self.row_index += 1;
        let item = RowView::try_new(self.schema, raw)
            .and_then(|view| view.var_bytes(self.column_index))
            .map(|payload| (row_index, payload));
        Some(item)
    }
}

/// Iterator over the typed values of any column across a list of encoded
/// rows.
pub struct ColumnIter<'a, B> {
    schema: &'a Schema,
    rows: &'a [B],
    column_index: usize,
    row_index: usize,
}

impl<'a, B: AsRef<[u8]>> ColumnIter<'a, B> {
    pub fn new(schema: &'a Schema, rows: &'a [B], column_index: usize) -> Self {
        Self {
            schema,
            rows,
            column_index,
            row_index: 0,
        }
    }

    pub fn restart_from(&mut self, row_index: usize) {
        self.row_index = row_index;
    }
}

impl<'a, B: AsRef<[u8]>> Iterator for ColumnIter<'a, B> {
    type Item = Result<(usize, DatumView<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.rows.get(self.row_index)?.as_ref();
        let row_index = self.row_index;
        self.row_index += 1;
        let item = RowView::try_new(self.schema, raw)
            .and_then(|view| view.datum_view(self.column_index))
            .map(|view| (row_index, view));
        Some(item)
    }
}
