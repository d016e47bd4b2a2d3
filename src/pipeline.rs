use crate::calc::{self, BucketFn, CalcField, DEFAULT_BUCKET};
use crate::config::CrushOptions;
use crate::error::UsageError;
use crate::filters::{self, GrepFlags, GrepSpec};
use crate::keyspec::parse_keyspec;
use crate::progress::ProgressScope;
use crate::rows::{open_input, HeadRow, Row, RowSource};
use crate::split::{split_rows, SplitSummary, SplitTarget, SplitWriter};
use crate::transform::{self, AddField};
use crate::util::init_tracing_once;
use crate::writer::write_rows;
use anyhow::Result;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

type Rows = Box<dyn Iterator<Item = Result<Row>>>;

enum Input {
    Path(Option<PathBuf>),
    Reader(Box<dyn BufRead>),
}

/// One invocation over one input stream. Configure with the builder methods,
/// then consume with exactly one command (`reorder`, `add_fields`, `grep`,
/// `calc`, `split`).
///
/// Every command reads the first row before doing anything else: selectors are
/// resolved against it and it decides whether the stream has a header. An
/// empty input produces no output and is not an error.
pub struct Crush {
    pub(crate) opts: CrushOptions,
    input: Input,
}

impl Default for Crush {
    fn default() -> Self {
        Self::new()
    }
}

struct Session {
    opts: CrushOptions,
    rows: HeadRow<Rows>,
    progress: ProgressScope,
}

impl Crush {
    /// Reads stdin unless `input` or `reader` says otherwise.
    pub fn new() -> Self {
        Self { opts: CrushOptions::default(), input: Input::Path(None) }
    }

    pub fn with_options(opts: CrushOptions) -> Self {
        Self { opts, input: Input::Path(None) }
    }

    pub fn options(&self) -> &CrushOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn input(mut self, path: impl AsRef<Path>) -> Self { self.input = Input::Path(Some(path.as_ref().to_path_buf())); self }
    pub fn reader(mut self, rdr: impl BufRead + 'static) -> Self { self.input = Input::Reader(Box::new(rdr)); self }
    pub fn delimiter(mut self, delim: char) -> Self { self.opts = self.opts.with_delimiter(delim); self }
    pub fn no_header(mut self, yes: bool) -> Self { self.opts = self.opts.with_no_header(yes); self }
    pub fn force_header(mut self, yes: bool) -> Self { self.opts = self.opts.with_force_header(yes); self }
    pub fn max_open_files(mut self, n: usize) -> Self { self.opts = self.opts.with_max_open_files(n); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn io_read_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_read_buffer(bytes); self }
    pub fn io_write_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_write_buffer(bytes); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }

    // -------- Commands --------

    /// Keep and permute the columns named by `fields`. The header, if any, is
    /// projected like every other row. Returns the number of rows written.
    pub fn reorder<W: Write>(self, fields: &str, out: W) -> Result<u64> {
        let Session { opts, rows, progress } = self.open()?;
        let Some(first) = rows.first() else { return Ok(0) };
        let spec = parse_keyspec(fields, first)?;
        tracing::debug!("reorder: fields {:?}", spec.indices);
        emit(&opts, &progress, transform::reorder(rows, spec.indices), out)
    }

    /// Insert `values` at the positions selected by `idxs`. With `labels` the
    /// stream is treated as having a header (unless `no_header`), and the
    /// header gets the labels; otherwise the header gets the values too.
    pub fn add_fields<S, W>(self, idxs: &str, values: &[S], labels: Option<&[S]>, out: W) -> Result<u64>
    where
        S: AsRef<str>,
        W: Write,
    {
        let Session { opts, rows, progress } = self.open()?;
        let Some(first) = rows.first() else { return Ok(0) };
        let spec = parse_keyspec(idxs, first)?;

        if values.len() != spec.len() {
            return Err(UsageError::AddFieldCountMismatch { fields: spec.len(), given: values.len(), what: "value(s)" }.into());
        }
        if let Some(labels) = labels {
            if labels.len() != spec.len() {
                return Err(UsageError::AddFieldCountMismatch { fields: spec.len(), given: labels.len(), what: "header label(s)" }.into());
            }
        }

        let header_aware = opts.header_policy().forcing(labels.is_some()).resolve(spec.matched_names);
        let adds: Vec<AddField> = spec
            .indices
            .iter()
            .zip(values)
            .enumerate()
            .map(|(k, (&index, value))| {
                let value = value.as_ref();
                let label = labels.and_then(|l| l.get(k)).map(|l| l.as_ref()).unwrap_or(value);
                AddField::new(index, value, label)
            })
            .collect();
        tracing::debug!("addfield: {:?} (header_aware={})", adds, header_aware);

        emit(&opts, &progress, transform::add_fields(rows, adds, header_aware), out)
    }

    /// Keep the rows whose selected fields match `patterns`, one pattern per
    /// selected field. A detected header always passes.
    pub fn grep<S, W>(self, fields: &str, patterns: &[S], flags: GrepFlags, out: W) -> Result<u64>
    where
        S: AsRef<str>,
        W: Write,
    {
        let Session { opts, rows, progress } = self.open()?;
        let Some(first) = rows.first() else { return Ok(0) };
        let spec = parse_keyspec(fields, first)?;
        let grep = GrepSpec::compile(&spec.indices, patterns, flags.ignore_case, flags.any_field, flags.invert)?;

        let header_aware = opts.header_policy().resolve(spec.matched_names);
        tracing::debug!("grep: fields {:?} {:?} (header_aware={})", spec.indices, flags, header_aware);

        emit(&opts, &progress, filters::grep(rows, grep, header_aware), out)
    }

    /// Append one computed field per expression. `[name]`/`[3]` inside an
    /// expression refer to fields of the current row. With `labels` (or a
    /// reference that matched a header name) the header gets one label per
    /// expression, defaulting to the expression text.
    pub fn calc<S, W>(self, exprs: &[S], labels: Option<&[S]>, out: W) -> Result<u64>
    where
        S: AsRef<str>,
        W: Write,
    {
        if let Some(labels) = labels {
            if labels.len() != exprs.len() {
                return Err(UsageError::LabelCountMismatch { exprs: exprs.len(), labels: labels.len() }.into());
            }
        }

        let Session { opts, rows, progress } = self.open()?;
        let Some(first) = rows.first() else { return Ok(0) };
        let mut fields = Vec::with_capacity(exprs.len());
        for (k, text) in exprs.iter().enumerate() {
            let label = labels.and_then(|l| l.get(k)).map(|l| l.as_ref());
            fields.push(CalcField::compile(text.as_ref(), first, label)?);
        }

        let detected = fields.iter().any(CalcField::matched_names);
        let header_aware = opts.header_policy().forcing(labels.is_some()).resolve(detected);
        tracing::debug!("calc: {} expression(s) (header_aware={})", fields.len(), header_aware);

        emit(&opts, &progress, calc::calc(rows, fields, header_aware), out)
    }

    /// Partition rows into files under `target.dir`. `bucket` is a bucket
    /// function such as `x, y: x + '-' + y`; its parameters bind to the fields
    /// selected by `fields`. Defaults to ten hash buckets over one field.
    pub fn split(self, fields: &str, bucket: Option<&str>, target: &SplitTarget) -> Result<SplitSummary> {
        let bucket_fn = BucketFn::parse(bucket.unwrap_or(DEFAULT_BUCKET))?;
        let arity = bucket_fn.arity();
        self.split_inner(fields, Some(arity), move |args: &[&str]| bucket_fn.key(args), target)
    }

    /// Like `split`, with the bucket key computed by an arbitrary closure over
    /// the selected field values.
    pub fn split_by<F>(self, fields: &str, bucket: F, target: &SplitTarget) -> Result<SplitSummary>
    where
        F: FnMut(&[&str]) -> Result<String>,
    {
        self.split_inner(fields, None, bucket, target)
    }

    fn split_inner<F>(self, fields: &str, arity: Option<usize>, bucket: F, target: &SplitTarget) -> Result<SplitSummary>
    where
        F: FnMut(&[&str]) -> Result<String>,
    {
        let Session { opts, mut rows, progress } = self.open()?;
        let Some(first) = rows.first() else { return Ok(SplitSummary::default()) };
        let spec = parse_keyspec(fields, first)?;
        if let Some(params) = arity {
            if params != spec.len() {
                return Err(UsageError::BucketArity { params, fields: spec.len() }.into());
            }
        }

        let header_aware = opts.header_policy().forcing(target.copy_headers).resolve(spec.matched_names);
        let header = if header_aware { rows.take_first() } else { None };
        tracing::debug!("split: fields {:?} into {} (header_aware={})", spec.indices, target.dir.display(), header_aware);

        let writer = SplitWriter::create(
            &target.dir,
            &target.pattern,
            opts.delimiter,
            header,
            opts.max_open_files,
            opts.write_buffer_bytes,
        )?;
        let summary = split_rows(rows, &spec.indices, bucket, writer)?;
        progress.finish(format!("{} rows into {} files", summary.rows, summary.buckets));
        Ok(summary)
    }

    fn open(self) -> Result<Session> {
        init_tracing_once();
        let reader = match self.input {
            Input::Path(path) => open_input(path.as_deref(), self.opts.read_buffer_bytes)?,
            Input::Reader(rdr) => rdr,
        };
        let progress = if self.opts.progress {
            ProgressScope::rows(self.opts.progress_label.clone().unwrap_or_default())
        } else {
            ProgressScope::hidden()
        };
        let rows: Rows = Box::new(progress.track(RowSource::new(reader, self.opts.delimiter)));
        let rows = HeadRow::new(rows)?;
        Ok(Session { opts: self.opts, rows, progress })
    }
}

fn emit<I, W>(opts: &CrushOptions, progress: &ProgressScope, rows: I, out: W) -> Result<u64>
where
    I: Iterator<Item = Result<Row>>,
    W: Write,
{
    let mut out = BufWriter::with_capacity(opts.write_buffer_bytes, out);
    let n = write_rows(rows, opts.delimiter, &mut out)?;
    progress.finish(format!("{} rows written", n));
    Ok(n)
}
