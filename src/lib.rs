mod config;
mod error;
mod header;
mod keyspec;
mod rows;

mod transform;
mod filters;
mod expr;
mod calc;

mod writer;
mod split;
mod progress;
mod util;
mod pipeline;

pub use crate::config::CrushOptions;
pub use crate::error::{KeyspecError, UsageError};
pub use crate::pipeline::Crush;

// field selectors and header detection
pub use crate::header::HeaderPolicy;
pub use crate::keyspec::{parse_keyspec, Keyspec};

// row sources and the streaming stages, for callers composing their own pipelines
pub use crate::rows::{open_input, split_fields, HeadRow, Row, RowSource};
pub use crate::transform::{add_fields, reorder, AddField, AddFields, Reorder};
pub use crate::filters::{grep, Grep, GrepFlags, GrepSpec};

// expression language and computed columns
pub use crate::expr::{Expr, ExprError, Value};
pub use crate::calc::{calc, BucketFn, Calc, CalcField, DEFAULT_BUCKET};

// writers
pub use crate::writer::{write_rows, DelimitedWriter};
pub use crate::split::{split_rows, FsOpener, Opener, SplitSummary, SplitTarget, SplitWriter, MARKER};

pub use crate::progress::{ProgressScope, Tracked};
pub use crate::util::{init_tracing_once, is_handle_exhaustion, open_append_with_backoff, open_with_backoff};
