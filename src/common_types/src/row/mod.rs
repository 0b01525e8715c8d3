// Copyright 2022-2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Row and its encoded representations.

use std::ops::Index;

use crate::datum::Datum;

pub mod column_iter;
pub mod encoded;

pub use encoded::{decode_row, Error, Result, RowEncoder, RowView};

/// A row of owned datums, ordered by the schema's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    cols: Vec<Datum>,
}

impl Row {
    pub fn from_datums(cols: Vec<Datum>) -> Self {
        Self { cols }
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.cols.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Datum> {
        self.cols.iter()
    }
}

impl Index<usize> for Row {
    type Output = Datum;

    fn index(&self, index: usize) -> &Datum {
        &self.cols[index]
    }
}

impl From<Vec<Datum>> for Row {
    fn from(cols: Vec<Datum>) -> Self {
        Self { cols }
    }
}
