//! Computed columns. `[name]`, `[3]` style references inside an expression are
//! resolved with the keyspec rules, rewritten to positional placeholders and
//! compiled once; each data row then gains one field per expression.
//!
//! See `expr` for what an expression can and cannot do.

use crate::expr::Expr;
use crate::keyspec::parse_keyspec;
use crate::rows::Row;
use anyhow::{anyhow, bail, Context, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;

const FIELD_REF: &str = r"\[[^\[\]]+\]";

/// One computed column.
#[derive(Debug)]
pub struct CalcField {
    expr: Expr,
    indices: Vec<usize>,
    label: String,
    matched_names: bool,
}

impl CalcField {
    /// Compile `text` against the first row of the stream. `label` is the
    /// header cell used when the stream is header-aware; it defaults to `text`.
    pub fn compile<S: AsRef<str>>(text: &str, first_row: &[S], label: Option<&str>) -> Result<Self> {
        let re = Regex::new(FIELD_REF)?;

        let mut placeholders: HashMap<&str, String> = HashMap::new();
        let mut indices: Vec<usize> = Vec::new();
        let mut matched_names = false;

        for m in re.find_iter(text) {
            let token = m.as_str();
            if placeholders.contains_key(token) {
                continue;
            }
            let inner = &token[1..token.len() - 1];
            let spec = parse_keyspec(inner, first_row)
                .with_context(|| format!("field reference {} in '{}'", token, text))?;
            let [idx] = spec.indices[..] else {
                bail!("field reference {} in '{}' must select exactly one field", token, text);
            };
            matched_names |= spec.matched_names;
            placeholders.insert(token, placeholder(idx));
            if !indices.contains(&idx) {
                indices.push(idx);
            }
        }

        let rewritten = re.replace_all(text, |caps: &Captures| {
            placeholders.get(&caps[0]).cloned().unwrap_or_default()
        });
        let params: Vec<String> = indices.iter().map(|&i| placeholder(i)).collect();
        let expr = Expr::compile(&rewritten, &params).with_context(|| format!("compile '{}'", text))?;
        tracing::debug!("calc '{}' -> '{}' over fields {:?}", text, rewritten, indices);

        Ok(Self { expr, indices, label: label.unwrap_or(text).to_string(), matched_names })
    }

    /// Whether any reference matched a field name of the first row.
    pub fn matched_names(&self) -> bool {
        self.matched_names
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluate against one data row.
    pub fn eval(&self, row: &Row) -> Result<String> {
        let mut args = Vec::with_capacity(self.indices.len());
        for &i in &self.indices {
            let v = row
                .get(i)
                .ok_or_else(|| anyhow!("row has {} field(s), field {} requested", row.len(), i + 1))?;
            args.push(v.as_str());
        }
        let value = self
            .expr
            .call(&args)
            .with_context(|| format!("evaluate '{}'", self.label))?;
        Ok(value.to_string())
    }
}

fn placeholder(idx: usize) -> String {
    format!("_x{}", idx)
}

/// Append one field per `CalcField` to every row. When `header_aware`, the
/// first row receives the labels instead.
pub fn calc<I>(rows: I, fields: Vec<CalcField>, header_aware: bool) -> Calc<I>
where
    I: Iterator<Item = Result<Row>>,
{
    Calc { inner: rows, fields, header_pending: header_aware, row_no: 0 }
}

pub struct Calc<I> {
    inner: I,
    fields: Vec<CalcField>,
    header_pending: bool,
    row_no: u64,
}

impl<I> Iterator for Calc<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut row = match self.inner.next()? {
            Ok(r) => r,
            Err(e) => return Some(Err(e)),
        };
        self.row_no += 1;
        if std::mem::take(&mut self.header_pending) {
            row.extend(self.fields.iter().map(|f| f.label.clone()));
            return Some(Ok(row));
        }
        let computed: Result<Vec<String>> = self.fields.iter().map(|f| f.eval(&row)).collect();
        match computed {
            Ok(values) => {
                row.extend(values);
                Some(Ok(row))
            }
            Err(e) => Some(Err(e.context(format!("calc row {}", self.row_no)))),
        }
    }
}

/// Default bucket function: ten buckets by stable hash of one field.
pub const DEFAULT_BUCKET: &str = "x: str(abs(hash(x)) % 10)";

/// Bucket function for `split`, written as `x, y: <expression>`.
/// A leading `lambda` is accepted. Parameters bind positionally to the
/// selected field values; the result is rendered as the bucket key.
#[derive(Debug)]
pub struct BucketFn {
    expr: Expr,
}

impl BucketFn {
    pub fn parse(source: &str) -> Result<Self> {
        let mut body = source.trim();
        if let Some(rest) = body.strip_prefix("lambda") {
            if rest.starts_with(|c: char| c.is_whitespace() || c == ':') {
                body = rest.trim_start();
            }
        }
        let (params, text) = body
            .split_once(':')
            .ok_or_else(|| anyhow!("bucket function '{}' must look like 'x, y: expression'", source))?;

        let params: Vec<&str> = params.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
        for p in &params {
            let valid = p.starts_with(|c: char| c.is_alphabetic() || c == '_')
                && p.chars().all(|c| c.is_alphanumeric() || c == '_');
            if !valid {
                bail!("bucket function parameter '{}' is not an identifier", p);
            }
        }
        let expr = Expr::compile(text.trim(), &params).with_context(|| format!("bucket function '{}'", source))?;
        Ok(Self { expr })
    }

    pub fn arity(&self) -> usize {
        self.expr.arity()
    }

    pub fn key(&self, args: &[&str]) -> Result<String> {
        let v = self
            .expr
            .call(args)
            .with_context(|| format!("bucket function '{}'", self.expr.source()))?;
        Ok(v.to_string())
    }
}
