//! Bucketed split writer: every row goes to the file of its bucket key.
//!
//! File layout:
//!   <dir>/<pattern with % replaced by the key>   (append mode, created on demand)
//!
//! Open handles live in an LRU pool of bounded size. When the pool is full the
//! least recently used handle is flushed and closed before a new one is opened;
//! if the OS runs out of descriptors anyway, more handles are evicted and the
//! pool shrinks to what fits. Because files are always opened for append, a
//! bucket that was evicted and reopened keeps all of its rows, and its header is
//! only ever written the first time the bucket is seen.

use crate::rows::Row;
use crate::util::{is_handle_exhaustion, open_append_with_backoff};
use crate::writer::write_joined;
use ahash::AHashMap;
use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Substitution marker in output filename patterns.
pub const MARKER: char = '%';

/// How the split writer obtains append handles. The filesystem implementation
/// is `FsOpener`; tests substitute openers that fail on demand.
pub trait Opener {
    type Handle: Write;

    fn open_append(&mut self, path: &Path) -> io::Result<Self::Handle>;
}

/// Buffered append handles on the real filesystem.
#[derive(Clone, Debug)]
pub struct FsOpener {
    write_buf_bytes: usize,
}

impl FsOpener {
    pub fn new(write_buf_bytes: usize) -> Self {
        Self { write_buf_bytes: write_buf_bytes.max(8 * 1024) }
    }
}

impl Opener for FsOpener {
    type Handle = BufWriter<File>;

    fn open_append(&mut self, path: &Path) -> io::Result<Self::Handle> {
        let f = open_append_with_backoff(path, 16, 50)?;
        Ok(BufWriter::with_capacity(self.write_buf_bytes, f))
    }
}

struct Slot<H> {
    w: H,
    last_used: u64,
}

/// LRU-bounded set of open handles keyed by bucket.
struct HandlePool<O: Opener> {
    opener: O,
    open: AHashMap<String, Slot<O::Handle>>,
    capacity: usize,
    tick: u64,
    evictions: u64,
}

impl<O: Opener> HandlePool<O> {
    fn new(opener: O, capacity: usize) -> Self {
        Self { opener, open: AHashMap::new(), capacity: capacity.max(1), tick: 0, evictions: 0 }
    }

    /// Handle for `key`, opening `path()` if the bucket has no open handle.
    fn acquire(&mut self, key: &str, path: impl FnOnce() -> PathBuf) -> Result<&mut O::Handle> {
        self.tick += 1;
        let tick = self.tick;

        if !self.open.contains_key(key) {
            let path = path();
            while self.open.len() >= self.capacity {
                self.evict_lru()?;
            }
            let w = loop {
                match self.opener.open_append(&path) {
                    Ok(w) => break w,
                    Err(e) if is_handle_exhaustion(&e) && !self.open.is_empty() => {
                        self.evict_lru()?;
                        self.capacity = self.open.len() + 1;
                        tracing::warn!(
                            "out of file handles opening {}; pool shrunk to {}",
                            path.display(),
                            self.capacity
                        );
                    }
                    Err(e) => return Err(e).with_context(|| format!("open {}", path.display())),
                }
            };
            self.open.insert(key.to_string(), Slot { w, last_used: tick });
        }

        let slot = self
            .open
            .get_mut(key)
            .ok_or_else(|| anyhow!("bucket '{}' has no open handle", key))?;
        slot.last_used = tick;
        Ok(&mut slot.w)
    }

    fn evict_lru(&mut self) -> Result<()> {
        let Some(key) = self.open.iter().min_by_key(|(_, s)| s.last_used).map(|(k, _)| k.clone()) else {
            return Ok(());
        };
        if let Some(mut slot) = self.open.remove(&key) {
            slot.w.flush().with_context(|| format!("flush bucket '{}'", key))?;
            self.evictions += 1;
            tracing::debug!("closed bucket '{}' to free a handle", key);
        }
        Ok(())
    }

    /// Flush and close every handle.
    fn close_all(&mut self) -> Result<()> {
        for (key, mut slot) in self.open.drain() {
            slot.w.flush().with_context(|| format!("flush bucket '{}'", key))?;
        }
        Ok(())
    }
}

/// Outcome of a split run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitSummary {
    /// Data rows written (headers excluded).
    pub rows: u64,
    /// Distinct bucket keys seen.
    pub buckets: usize,
    /// One file per distinct bucket, sorted.
    pub files: Vec<PathBuf>,
    /// Handles closed early to stay within the handle budget.
    pub evictions: u64,
}

/// Where split output goes: `dir`, the `%` filename pattern, and whether the
/// first row is copied to the top of every bucket file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitTarget {
    pub dir: PathBuf,
    pub pattern: String,
    pub copy_headers: bool,
}

impl Default for SplitTarget {
    fn default() -> Self {
        Self { dir: PathBuf::from("."), pattern: MARKER.to_string(), copy_headers: false }
    }
}

impl SplitTarget {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), ..Self::default() }
    }
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }
    pub fn with_copy_headers(mut self, yes: bool) -> Self {
        self.copy_headers = yes;
        self
    }
}

struct Bucket {
    path: PathBuf,
    rows: u64,
}

/// Routes rows to per-bucket files under one directory.
pub struct SplitWriter<O: Opener = FsOpener> {
    pool: HandlePool<O>,
    out_dir: PathBuf,
    pattern: String,
    delim: String,
    header: Option<Row>,
    buckets: AHashMap<String, Bucket>,
    rows: u64,
}

impl SplitWriter<FsOpener> {
    /// Filesystem-backed writer with at most `max_open` simultaneously open files.
    pub fn create(
        out_dir: &Path,
        pattern: &str,
        delim: char,
        header: Option<Row>,
        max_open: usize,
        write_buf_bytes: usize,
    ) -> Result<Self> {
        Self::with_opener(FsOpener::new(write_buf_bytes), out_dir, pattern, delim, header, max_open)
    }
}

impl<O: Opener> SplitWriter<O> {
    pub fn with_opener(
        opener: O,
        out_dir: &Path,
        pattern: &str,
        delim: char,
        header: Option<Row>,
        max_open: usize,
    ) -> Result<Self> {
        if !pattern.contains(MARKER) {
            return Err(crate::error::UsageError::MissingMarker(pattern.to_string()).into());
        }
        fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
        Ok(Self {
            pool: HandlePool::new(opener, max_open),
            out_dir: out_dir.to_path_buf(),
            pattern: pattern.to_string(),
            delim: delim.to_string(),
            header,
            buckets: AHashMap::new(),
            rows: 0,
        })
    }

    /// Append `row` to the file of bucket `key`, writing the header first if
    /// this is the first row of that bucket.
    pub fn write<S: AsRef<str>>(&mut self, key: &str, row: &[S]) -> Result<()> {
        let first_time = !self.buckets.contains_key(key);
        if first_time {
            let path = bucket_path(&self.out_dir, &self.pattern, key)?;
            tracing::debug!("new bucket '{}' -> {}", key, path.display());
            self.buckets.insert(key.to_string(), Bucket { path, rows: 0 });
        }
        let bucket = self
            .buckets
            .get_mut(key)
            .ok_or_else(|| anyhow!("bucket '{}' was not registered", key))?;
        let w = self.pool.acquire(key, || bucket.path.clone())?;

        if first_time {
            if let Some(header) = &self.header {
                write_joined(w, header, self.delim.as_bytes())
                    .with_context(|| format!("write header to {}", bucket.path.display()))?;
            }
        }
        write_joined(w, row, self.delim.as_bytes())
            .with_context(|| format!("write to {}", bucket.path.display()))?;

        bucket.rows += 1;
        self.rows += 1;
        Ok(())
    }

    /// Flush and close everything; report what was written.
    pub fn finish(mut self) -> Result<SplitSummary> {
        self.pool.close_all()?;
        let mut files: Vec<PathBuf> = self.buckets.values().map(|b| b.path.clone()).collect();
        files.sort();
        for (key, b) in &self.buckets {
            tracing::debug!("bucket '{}': {} row(s)", key, b.rows);
        }
        tracing::info!(
            "split {} row(s) into {} file(s) under {} ({} early close(s))",
            self.rows,
            files.len(),
            self.out_dir.display(),
            self.pool.evictions
        );
        Ok(SplitSummary { rows: self.rows, buckets: self.buckets.len(), files, evictions: self.pool.evictions })
    }
}

/// `<dir>/<pattern with every % replaced by key>`. Keys cannot escape `dir`.
fn bucket_path(dir: &Path, pattern: &str, key: &str) -> Result<PathBuf> {
    if key.contains(['/', '\\', '\0']) {
        bail!("bucket key '{}' contains a path separator", key);
    }
    let name = pattern.replace(MARKER, key);
    if name.is_empty() || name == "." || name == ".." {
        bail!("bucket key '{}' gives the invalid file name '{}'", key, name);
    }
    Ok(dir.join(name))
}

/// Consume `rows`, computing each row's bucket from the fields at `key_fields`.
/// Returns once every row is written and every file is closed.
pub fn split_rows<I, O, F>(rows: I, key_fields: &[usize], mut bucket: F, mut writer: SplitWriter<O>) -> Result<SplitSummary>
where
    I: Iterator<Item = Result<Row>>,
    O: Opener,
    F: FnMut(&[&str]) -> Result<String>,
{
    let mut row_no: u64 = 0;
    for row in rows {
        let row = row?;
        row_no += 1;
        let mut args: Vec<&str> = Vec::with_capacity(key_fields.len());
        for &i in key_fields {
            let v = row
                .get(i)
                .ok_or_else(|| anyhow!("row {} has {} field(s), field {} requested", row_no, row.len(), i + 1))?;
            args.push(v.as_str());
        }
        let key = bucket(&args).with_context(|| format!("bucket key for row {}", row_no))?;
        writer.write(&key, &row)?;
    }
    writer.finish()
}
