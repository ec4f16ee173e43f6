//! Document helpers.
//!
//! The engine treats diagrams as opaque text. These helpers only touch the
//! outer shape of a document (its root element and line layout) and never
//! interpret cells, geometry or styles.

/// The canonical empty canvas: a graph model with the two structural cells.
pub const EMPTY_DIAGRAM: &str =
    r#"<mxGraphModel><root><mxCell id="0"/><mxCell id="1" parent="0"/></root></mxGraphModel>"#;

const MODEL_OPEN: &str = "<mxGraphModel";
const MODEL_CLOSE: &str = "</mxGraphModel>";

/// Whether `document` is rooted at an `<mxGraphModel>` element.
pub fn is_graph_model(document: &str) -> bool {
    let trimmed = document.trim();
    if !starts_with_element(trimmed, MODEL_OPEN) {
        return false;
    }
    trimmed.ends_with(MODEL_CLOSE) || (trimmed.ends_with("/>") && !trimmed[1..].contains('<'))
}

/// Wrap a bare `<root>…</root>` fragment into a full graph model.
///
/// Anything that is not a bare root fragment is returned verbatim.
pub fn normalize_document(document: &str) -> String {
    let trimmed = document.trim();
    if starts_with_element(trimmed, "<root") {
        format!("<mxGraphModel>{trimmed}</mxGraphModel>")
    } else {
        document.to_string()
    }
}

fn starts_with_element(text: &str, open: &str) -> bool {
    text.strip_prefix(open)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c == '>' || c == '/' || c.is_whitespace())
}

/// Pretty-print a document: one tag per line, two-space indentation.
///
/// Text content between tags is kept on the line of its opening tag. Comments,
/// processing instructions and CDATA sections are emitted as single lines at
/// the current depth. Output is deterministic, so formatting an already
/// formatted document returns it unchanged.
pub fn format_xml(document: &str) -> String {
    let mut out = String::with_capacity(document.len() + document.len() / 4);
    let mut depth = 0usize;
    let mut rest = document.trim();
    // Set after an opening tag whose text content followed on the same line.
    let mut inline_open = false;
    let mut after_open = false;

    while !rest.is_empty() {
        if rest.starts_with('<') {
            let end = tag_end(rest);
            let tag = &rest[..end];
            rest = rest[end..].trim_start();
            let kind = TagKind::of(tag);

            match kind {
                TagKind::Close => {
                    depth = depth.saturating_sub(1);
                    if inline_open {
                        out.push_str(tag);
                        inline_open = false;
                    } else {
                        push_line(&mut out, depth, tag);
                    }
                }
                TagKind::Open => {
                    push_line(&mut out, depth, tag);
                    depth += 1;
                }
                TagKind::Leaf => push_line(&mut out, depth, tag),
            }
            after_open = kind == TagKind::Open;
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            let text = rest[..end].trim();
            rest = &rest[end..];
            if text.is_empty() {
                continue;
            }
            let attach = after_open;
            after_open = false;
            // Attach text to the opening tag so `<a>text</a>` stays on one line.
            if attach {
                out.push_str(text);
                inline_open = true;
            } else {
                push_line(&mut out, depth, text);
            }
        }
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    /// Self-closing tags, comments, declarations and CDATA.
    Leaf,
}

impl TagKind {
    fn of(tag: &str) -> Self {
        if tag.starts_with("</") {
            Self::Close
        } else if tag.starts_with("<!") || tag.starts_with("<?") || tag.ends_with("/>") {
            Self::Leaf
        } else {
            Self::Open
        }
    }
}

/// Byte length of the tag at the start of `text`, honouring quoted attribute
/// values and the comment/CDATA terminators.
fn tag_end(text: &str) -> usize {
    for (open, close) in [("<!--", "-->"), ("<![CDATA[", "]]>")] {
        if text.starts_with(open) {
            return text[open.len()..]
                .find(close)
                .map_or(text.len(), |i| open.len() + i + close.len());
        }
    }

    let mut quote = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return i + 1,
            _ => {}
        }
    }
    text.len()
}

fn push_line(out: &mut String, depth: usize, line: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(line);
}
