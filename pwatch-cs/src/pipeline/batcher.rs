//! Fixed-size ordered partitioning

use super::PipelineError;
use crate::types::{Batch, Document};

/// Split `documents` into consecutive batches of at most `size`
///
/// The last batch may be shorter. Concatenating the result gives back the input.
pub fn batch(documents: Vec<Document>, size: usize) -> Result<Vec<Batch>, PipelineError> {
    if size == 0 {
        return Err(PipelineError::Config("batch size must be at least 1".to_string()));
    }

    let mut batches = Vec::with_capacity(documents.len().div_ceil(size));
    let mut remaining = documents.into_iter().peekable();
    while remaining.peek().is_some() {
        batches.push(remaining.by_ref().take(size).collect());
    }
    Ok(batches)
}
