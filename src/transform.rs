//! Column-shaping stages: `reorder` (projection) and `add_fields` (literal inserts).
//!
//! Both are lazy iterator adaptors over `Result<Row>`; errors from upstream pass
//! through untouched and end the stream at the consumer.

use crate::rows::Row;
use anyhow::{bail, Result};

/// Project every row (header included) onto `indices`, in that order.
pub fn reorder<I>(rows: I, indices: Vec<usize>) -> Reorder<I>
where
    I: Iterator<Item = Result<Row>>,
{
    Reorder { inner: rows, indices, row_no: 0 }
}

pub struct Reorder<I> {
    inner: I,
    indices: Vec<usize>,
    row_no: u64,
}

impl<I> Iterator for Reorder<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.inner.next()?;
        self.row_no += 1;
        Some(row.and_then(|row| project(&row, &self.indices, self.row_no)))
    }
}

fn project(row: &Row, indices: &[usize], row_no: u64) -> Result<Row> {
    let mut out = Vec::with_capacity(indices.len());
    for &i in indices {
        match row.get(i) {
            Some(v) => out.push(v.clone()),
            None => bail!("row {} has {} field(s), field {} requested", row_no, row.len(), i + 1),
        }
    }
    Ok(out)
}

/// One literal column to insert: `value` in data rows, `label` in the header row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddField {
    pub index: usize,
    pub value: String,
    pub label: String,
}

impl AddField {
    pub fn new(index: usize, value: impl Into<String>, label: impl Into<String>) -> Self {
        Self { index, value: value.into(), label: label.into() }
    }
}

/// Insert each `AddField` into every row.
///
/// Insertions run in list order against the row as it grows: an index refers
/// to the position in the row after the previous insertions of that same row.
/// With `header_aware` the first row gets the labels instead of the values.
pub fn add_fields<I>(rows: I, specs: Vec<AddField>, header_aware: bool) -> AddFields<I>
where
    I: Iterator<Item = Result<Row>>,
{
    AddFields { inner: rows, specs, header_pending: header_aware, row_no: 0 }
}

pub struct AddFields<I> {
    inner: I,
    specs: Vec<AddField>,
    header_pending: bool,
    row_no: u64,
}

impl<I> Iterator for AddFields<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.inner.next()?;
        self.row_no += 1;
        let is_header = std::mem::take(&mut self.header_pending);
        Some(row.and_then(|mut row| {
            for spec in &self.specs {
                if spec.index > row.len() {
                    bail!(
                        "row {} has {} field(s), cannot insert at position {}",
                        self.row_no,
                        row.len(),
                        spec.index + 1
                    );
                }
                let text = if is_header { &spec.label } else { &spec.value };
                row.insert(spec.index, text.clone());
            }
            Ok(row)
        }))
    }
}
