//! Row filtering by per-field regular expressions (`grep`).

use crate::error::UsageError;
use crate::rows::Row;
use anyhow::{bail, Context, Result};
use regex::{Regex, RegexBuilder};

/// Switches of a grep invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GrepFlags {
    pub invert: bool,
    pub ignore_case: bool,
    pub any_field: bool,
}

/// Compiled grep parameters.
///
/// Each `(index, regex)` pair tests one field; a pattern matches if it is found
/// anywhere in the field. Results combine with AND unless `any_field` is set
/// (then OR). With `invert` a row is kept exactly when the combined result is
/// false, i.e. `grep -v` over the whole condition.
#[derive(Clone, Debug)]
pub struct GrepSpec {
    pub fields: Vec<(usize, Regex)>,
    pub any_field: bool,
    pub invert: bool,
}

impl GrepSpec {
    /// Pair selected fields with patterns. Counts must agree; patterns compile
    /// case-insensitively when `ignore_case` is set.
    pub fn compile<S: AsRef<str>>(
        indices: &[usize],
        patterns: &[S],
        ignore_case: bool,
        any_field: bool,
        invert: bool,
    ) -> Result<Self> {
        if indices.len() != patterns.len() {
            return Err(UsageError::PatternCountMismatch { fields: indices.len(), patterns: patterns.len() }.into());
        }
        let mut fields = Vec::with_capacity(indices.len());
        for (&idx, pat) in indices.iter().zip(patterns) {
            let re = RegexBuilder::new(pat.as_ref())
                .case_insensitive(ignore_case)
                .build()
                .with_context(|| format!("invalid pattern '{}'", pat.as_ref()))?;
            fields.push((idx, re));
        }
        Ok(Self { fields, any_field, invert })
    }

    /// Decide a data row.
    pub fn keep(&self, row: &Row) -> Result<bool> {
        let hit = |(idx, re): &(usize, Regex)| -> Result<bool> {
            match row.get(*idx) {
                Some(v) => Ok(re.is_match(v)),
                None => bail!("row has {} field(s), field {} requested", row.len(), idx + 1),
            }
        };
        let mut combined = !self.any_field;
        for pair in &self.fields {
            let m = hit(pair)?;
            if self.any_field && m {
                combined = true;
                break;
            }
            if !self.any_field && !m {
                combined = false;
                break;
            }
        }
        Ok(combined != self.invert)
    }
}

/// Keep rows matching `spec`; a header row (when `header_aware`) always passes.
pub fn grep<I>(rows: I, spec: GrepSpec, header_aware: bool) -> Grep<I>
where
    I: Iterator<Item = Result<Row>>,
{
    Grep { inner: rows, spec, header_pending: header_aware, row_no: 0 }
}

pub struct Grep<I> {
    inner: I,
    spec: GrepSpec,
    header_pending: bool,
    row_no: u64,
}

impl<I> Iterator for Grep<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.inner.next()? {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };
            self.row_no += 1;
            if std::mem::take(&mut self.header_pending) {
                return Some(Ok(row));
            }
            match self.spec.keep(&row) {
                Ok(true) => return Some(Ok(row)),
                Ok(false) => continue,
                Err(e) => return Some(Err(e.context(format!("grep row {}", self.row_no)))),
            }
        }
    }
}
