//! Row adapter over a tabular data-plane response.

use std::collections::VecDeque;

use dsql_proto::rpc::{QueryResponse, Value};

/// Buffered result rows of one read query.
///
/// The sequence is finite and single-pass: a consumed row cannot be
/// re-read without re-issuing the query.
#[derive(Debug)]
pub struct Rows {
    columns: Vec<String>,
    decl_types: Vec<String>,
    data: VecDeque<Vec<Value>>,
}

impl Rows {
    pub(crate) fn new(res: QueryResponse) -> Self {
        Rows {
            columns: res.columns,
            decl_types: res.decl_types,
            data: res.rows.into(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Declared type of column `index`, upper-cased. None when the index
    /// is out of range.
    pub fn column_type(&self, index: usize) -> Option<String> {
        self.decl_types.get(index).map(|t| t.to_uppercase())
    }

    /// Produce the next row, or None once the sequence is exhausted.
    pub fn next_row(&mut self) -> Option<Vec<Value>> {
        self.data.pop_front()
    }

    /// Discard any buffered rows. Closing twice is not an error.
    pub fn close(&mut self) {
        self.data.clear();
    }
}

impl Iterator for Rows {
    type Item = Vec<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row()
    }
}
