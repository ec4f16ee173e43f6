//! Fuzz target for the patch applier and the XML formatter.
//!
//! Run with: cargo +nightly fuzz run fuzz_apply_edits
//!
//! The input is split on NUL bytes: the first piece is the document, the rest
//! pair up into search/replace edits.

#![no_main]

use drawsync_core::{EditOperation, PatchError, apply_edits, xml};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let mut pieces = text.split('\0');
    let document = pieces.next().unwrap_or_default();
    let rest: Vec<&str> = pieces.collect();
    let edits: Vec<EditOperation> = rest
        .chunks(2)
        .map(|pair| EditOperation::new(pair[0], pair.get(1).copied().unwrap_or_default()))
        .collect();

    match apply_edits(document, &edits) {
        Ok(patched) => {
            if edits.is_empty() {
                assert_eq!(patched, document);
            }
        }
        Err(err) => {
            assert!(err.index() < edits.len());
            if let PatchError::NotFound { search, .. } = &err {
                assert!(!search.is_empty());
            }
        }
    }

    let _ = xml::format_xml(document);
    let _ = xml::normalize_document(document);
});
