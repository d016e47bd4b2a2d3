//! Row source: one pass over a line-oriented input, one `Row` per record.
//!
//! `RowSource` splits lines on the delimiter; `HeadRow` adds the single-row
//! lookahead every command needs before it can decide anything about headers.

use crate::util::open_with_backoff;
use anyhow::{Context, Result};
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use zstd::stream::read::Decoder;

/// One record, split into fields.
pub type Row = Vec<String>;

/// Lazy, forward-only rows from any `BufRead`.
/// Strips trailing `\r`/`\n` (a last line without `\n` included), then splits
/// on `delim`. Bytes that are not valid UTF-8 become U+FFFD instead of failing
/// the stream.
pub struct RowSource<R> {
    rdr: R,
    delim: char,
    buf: Vec<u8>,
    line_no: u64,
    failed: bool,
}

impl<R: BufRead> RowSource<R> {
    pub fn new(rdr: R, delim: char) -> Self {
        Self { rdr, delim, buf: Vec::with_capacity(4 * 1024), line_no: 0, failed: false }
    }
}

impl<R: BufRead> Iterator for RowSource<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.buf.clear();
        match self.rdr.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                    self.buf.pop();
                }
                self.line_no += 1;
                let line = String::from_utf8_lossy(&self.buf);
                Some(Ok(split_fields(&line, self.delim)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err::<Row, _>(e).with_context(|| format!("read input record {}", self.line_no + 1)))
            }
        }
    }
}

#[inline]
pub fn split_fields(line: &str, delim: char) -> Row {
    line.split(delim).map(str::to_string).collect()
}

/// Single-row lookahead over a row sequence.
///
/// The first row is pulled eagerly so callers can inspect it (keyspec names,
/// header detection). Iterating then yields that same row first and resumes
/// with the rest of the underlying sequence.
pub struct HeadRow<I> {
    head: Option<Row>,
    rest: I,
}

impl<I> HeadRow<I>
where
    I: Iterator<Item = Result<Row>>,
{
    /// Fails only if reading the first row fails. An empty input is not an error.
    pub fn new(mut rows: I) -> Result<Self> {
        let head = rows.next().transpose()?;
        Ok(Self { head, rest: rows })
    }

    pub fn first(&self) -> Option<&Row> {
        self.head.as_ref()
    }

    /// Remove the buffered first row so it is not replayed.
    pub fn take_first(&mut self) -> Option<Row> {
        self.head.take()
    }
}

impl<I> Iterator for HeadRow<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.head.take() {
            return Some(Ok(row));
        }
        self.rest.next()
    }
}

/// Open the input stream. `None` or `-` is stdin; a `.zst` path is decoded on the fly.
pub fn open_input(path: Option<&Path>, read_buf_bytes: usize) -> Result<Box<dyn BufRead>> {
    let cap = read_buf_bytes.max(8 * 1024);
    let path = match path {
        Some(p) if p.as_os_str() != "-" => p,
        _ => return Ok(Box::new(BufReader::with_capacity(cap, io::stdin()))),
    };

    let file = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
    let is_zst = path.extension().map(|e| e.eq_ignore_ascii_case("zst")).unwrap_or(false);
    if is_zst {
        let mut decoder = Decoder::new(file).with_context(|| format!("zstd decoder for {}", path.display()))?;
        // Large frames need a bigger window than the decoder allows by default.
        decoder.window_log_max(31)?;
        tracing::debug!("reading zstd input {}", path.display());
        Ok(Box::new(BufReader::with_capacity(cap, decoder)))
    } else {
        Ok(Box::new(BufReader::with_capacity(cap, file)))
    }
}
