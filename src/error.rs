//! Typed errors for problems detected before any row is processed.
//!
//! Everything else (I/O, row-shape problems, evaluation failures) travels as
//! `anyhow::Error` with context attached at the call site. Callers that need to
//! tell a bad selector apart from a bad file can `downcast_ref` to these types.

use thiserror::Error;

/// A field selector that cannot be resolved against the first row.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyspecError {
    #[error("empty field selector")]
    Empty,

    #[error("empty token in field selector '{0}'")]
    EmptyToken(String),

    #[error("field selector token '{0}' is not a field name, index or range")]
    BadToken(String),

    #[error("range '{token}' runs backwards ({start} > {end})")]
    InvertedRange { token: String, start: usize, end: usize },

    #[error("field selector token '{token}' resolves outside the row (field {position} of {len})")]
    OutOfRange { token: String, position: i64, len: usize },
}

/// Parameter lists whose lengths must agree, checked before streaming starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("{fields} field(s) selected but {patterns} pattern(s) given")]
    PatternCountMismatch { fields: usize, patterns: usize },

    #[error("{fields} insertion point(s) selected but {given} {what} given")]
    AddFieldCountMismatch { fields: usize, given: usize, what: &'static str },

    #[error("{exprs} expression(s) but {labels} header label(s) given")]
    LabelCountMismatch { exprs: usize, labels: usize },

    #[error("bucket function takes {params} argument(s) but {fields} field(s) selected")]
    BucketArity { params: usize, fields: usize },

    #[error("output pattern '{0}' has no '%' marker")]
    MissingMarker(String),
}
