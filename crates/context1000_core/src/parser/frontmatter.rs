//! Metadata block / body split.
//!
//! A document opens with a `---` line, followed by the metadata block and a
//! closing `---` line. Everything after the closing line is body, kept
//! byte-for-byte.

const DELIMITER: &str = "---";
const BOM: char = '\u{feff}';

/// Borrowed view of a document split into metadata and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitDocument<'a> {
    pub metadata: &'a str,
    pub body: &'a str,
    /// 1-based line (relative to the document) where the body starts.
    pub body_line: usize,
}

/// Splits a raw document.
///
/// Returns `None` when the opening or closing delimiter is missing.
pub fn split_document(raw: &str) -> Option<SplitDocument<'_>> {
    let text = raw.strip_prefix(BOM).unwrap_or(raw);
    let mut lines = text.split_inclusive('\n');

    let first = lines.next()?;
    if !is_delimiter(first) {
        return None;
    }

    let metadata_start = first.len();
    let mut offset = metadata_start;
    let mut line_no = 1;
    for line in lines {
        line_no += 1;
        if is_delimiter(line) {
            return Some(SplitDocument {
                metadata: &text[metadata_start..offset],
                body: &text[offset + line.len()..],
                body_line: line_no + 1,
            });
        }
        offset += line.len();
    }

    None
}

/// Joins metadata and body into the canonical document layout.
pub fn join_document(metadata: &str, body: &str) -> String {
    let mut out = String::with_capacity(metadata.len() + body.len() + 8);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(metadata);
    if !metadata.is_empty() && !metadata.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    out
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end_matches(['\n', '\r']).trim_end() == DELIMITER
}
