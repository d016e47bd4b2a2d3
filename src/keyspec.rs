//! Field selectors: `name`, `3`, `2-4`, `-2`, `5-`, comma separated.
//!
//! A selector is resolved against the first row of the stream. Tokens that
//! equal a field of that row are names (and are evidence that the first row is
//! a header); everything else is a 1-based position or an inclusive range.
//! Output order follows token order, so `c,a,b` permutes columns and `1,1`
//! duplicates one.

use crate::error::KeyspecError;

/// Resolved selector: 0-based indices plus whether any token matched by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keyspec {
    pub indices: Vec<usize>,
    pub matched_names: bool,
}

impl Keyspec {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Resolve `spec` against `first_row`.
pub fn parse_keyspec<S: AsRef<str>>(spec: &str, first_row: &[S]) -> Result<Keyspec, KeyspecError> {
    if spec.is_empty() {
        return Err(KeyspecError::Empty);
    }
    let len = first_row.len();
    let mut indices = Vec::new();
    let mut matched_names = false;

    for token in spec.split(',') {
        if token.is_empty() {
            return Err(KeyspecError::EmptyToken(spec.to_string()));
        }

        if let Some(pos) = first_row.iter().position(|f| f.as_ref() == token) {
            indices.push(pos);
            matched_names = true;
        } else if let Some((start, end)) = token.split_once('-') {
            let start = parse_bound(token, start, 1)?;
            let end = parse_bound(token, end, len as i64)?;
            if start > end {
                return Err(KeyspecError::InvertedRange {
                    token: token.to_string(),
                    start: start.max(0) as usize,
                    end: end.max(0) as usize,
                });
            }
            for position in start..=end {
                indices.push(checked_index(token, position, len)?);
            }
        } else {
            let position = parse_bound(token, token, 0)?;
            indices.push(checked_index(token, position, len)?);
        }
    }

    Ok(Keyspec { indices, matched_names })
}

fn parse_bound(token: &str, raw: &str, default: i64) -> Result<i64, KeyspecError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }
    raw.parse::<i64>().map_err(|_| KeyspecError::BadToken(token.to_string()))
}

/// 1-based position -> 0-based index within `[0, len)`.
fn checked_index(token: &str, position: i64, len: usize) -> Result<usize, KeyspecError> {
    if position < 1 || position as u64 > len as u64 {
        return Err(KeyspecError::OutOfRange { token: token.to_string(), position, len });
    }
    Ok((position - 1) as usize)
}
