use crate::rows::Row;
use anyhow::Result;
use std::io::{self, Write};

/// Writes rows as `field<delim>field...\n`. Wrap unbuffered sinks in a
/// `BufWriter` first; this type does no buffering of its own.
pub struct DelimitedWriter<W: Write> {
    w: W,
    delim: [u8; 4],
    delim_len: usize,
    rows: u64,
}

impl<W: Write> DelimitedWriter<W> {
    pub fn new(w: W, delim: char) -> Self {
        let mut buf = [0u8; 4];
        let delim_len = delim.encode_utf8(&mut buf).len();
        Self { w, delim: buf, delim_len, rows: 0 }
    }

    #[inline]
    pub fn write_row<S: AsRef<str>>(&mut self, row: &[S]) -> io::Result<()> {
        write_joined(&mut self.w, row, &self.delim[..self.delim_len])?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}

#[inline]
pub(crate) fn write_joined<W: Write + ?Sized, S: AsRef<str>>(w: &mut W, row: &[S], delim: &[u8]) -> io::Result<()> {
    for (i, field) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(delim)?;
        }
        w.write_all(field.as_ref().as_bytes())?;
    }
    w.write_all(b"\n")
}

/// Drain `rows` into `out`, stopping at the first error. Returns the row count.
pub fn write_rows<I, W>(rows: I, delim: char, out: W) -> Result<u64>
where
    I: Iterator<Item = Result<Row>>,
    W: Write,
{
    let mut writer = DelimitedWriter::new(out, delim);
    for row in rows {
        writer.write_row(&row?)?;
    }
    writer.flush()?;
    Ok(writer.rows())
}
