//! Patch Applier: ordered, exact-text search/replace over a whole document.
//!
//! Deterministic semantics:
//! - edits run strictly in batch order, each against the output of the previous one
//! - each edit replaces the FIRST literal occurrence of `search` with `replace`
//! - matching is byte-for-byte (whitespace and indentation included)
//! - if any edit misses, the whole batch is abandoned and the caller keeps the
//!   original document

use serde::{Deserialize, Serialize};

/// One exact-text search/replace instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOperation {
    /// Exact text block to find.
    pub search: String,
    /// Text block that takes its place.
    pub replace: String,
}

impl EditOperation {
    pub fn new(search: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            replace: replace.into(),
        }
    }
}

/// Errors from applying an edit batch. The input document is never modified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("edit {index}: search text not found in the current diagram: {search:?}")]
    NotFound { index: usize, search: String },

    #[error("edit {index}: search text must not be empty")]
    EmptySearch { index: usize },
}

impl PatchError {
    /// Position of the failing edit within its batch.
    pub fn index(&self) -> usize {
        match self {
            Self::NotFound { index, .. } | Self::EmptySearch { index } => *index,
        }
    }
}

/// Apply `edits` to `document` and return the patched text.
///
/// The working copy is private to this call, so a failure part-way through
/// leaves nothing observable: the error carries the index of the failing edit
/// and `document` is untouched.
pub fn apply_edits(document: &str, edits: &[EditOperation]) -> Result<String, PatchError> {
    let mut working = document.to_string();

    for (index, edit) in edits.iter().enumerate() {
        if edit.search.is_empty() {
            return Err(PatchError::EmptySearch { index });
        }
        working = replace_first(&working, &edit.search, &edit.replace).ok_or_else(|| {
            PatchError::NotFound {
                index,
                search: edit.search.clone(),
            }
        })?;
    }

    Ok(working)
}

/// Replace only the FIRST occurrence, or `None` when `needle` is absent.
fn replace_first(haystack: &str, needle: &str, replacement: &str) -> Option<String> {
    let pos = haystack.find(needle)?;
    let mut out =
        String::with_capacity(haystack.len().saturating_sub(needle.len()) + replacement.len());
    out.push_str(&haystack[..pos]);
    out.push_str(replacement);
    out.push_str(&haystack[pos + needle.len()..]);
    Some(out)
}
