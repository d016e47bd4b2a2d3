//! Progress reporting: a row-count spinner drawn on stderr.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

fn row_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} {human_pos} rows  {per_sec}  elapsed: {elapsed_precise}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// A small wrapper around an `indicatif` spinner counting rows.
/// - `track(rows)` counts every item pulled through the returned iterator
/// - `finish(msg)` finalizes the spinner with a message
pub struct ProgressScope {
    pb: ProgressBar,
}

impl ProgressScope {
    pub fn rows<T: Into<String>>(label: T) -> Self {
        let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        pb.set_style(row_style());
        let label = label.into();
        if !label.is_empty() {
            pb.set_message(label);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    /// Draws nothing; counting still works.
    pub fn hidden() -> Self {
        Self { pb: ProgressBar::hidden() }
    }

    pub fn track<I: Iterator>(&self, rows: I) -> Tracked<I> {
        Tracked { inner: rows, pb: self.pb.clone() }
    }

    pub fn finish<T: Into<String>>(&self, msg: T) {
        self.pb.finish_with_message(msg.into());
    }
}

/// Iterator adaptor returned by `ProgressScope::track`.
pub struct Tracked<I> {
    inner: I,
    pb: ProgressBar,
}

impl<I: Iterator> Iterator for Tracked<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        self.pb.inc(1);
        Some(item)
    }
}
