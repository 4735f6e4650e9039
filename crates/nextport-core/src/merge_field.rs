//! Merge-field scanning for template HTML.
//!
//! Templates reference transaction data through `[[path.to.field]]`
//! placeholders that the vendor substitutes at render time, e.g.
//! `[[oppdrag.adresse]]` or `[[selger.navn]]`.
//!
//! # Token rules
//!
//! - Opens with `[[`, closes with the first following `]]`
//! - Never spans a line break or a markup tag (`<`, `>`)
//! - Body is letters, digits, `.`, `_`, `-`, `:` or spaces
//! - Surrounding spaces are trimmed; an empty body is not a field

use std::collections::BTreeMap;

/// Extract distinct merge-field paths from `html`, in first-seen order.
///
/// Input: `<p>[[a.b]] og [[ c ]] og [[a.b]]</p>`
/// Output: `["a.b", "c"]`
pub fn extract_merge_fields(html: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for field in scan(html) {
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    }
    fields
}

/// Count merge-field occurrences across many HTML documents.
///
/// Each document contributes at most one to a field's count, so the result
/// reads as "number of templates using this field".
pub fn count_merge_fields<'a, I>(documents: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts = BTreeMap::new();
    for html in documents {
        for field in extract_merge_fields(html) {
            *counts.entry(field).or_insert(0) += 1;
        }
    }
    counts
}

/// Yield every well-formed token body (trimmed), duplicates included.
fn scan(html: &str) -> impl Iterator<Item = &str> {
    let bytes = html.as_bytes();
    let mut i = 0;
    std::iter::from_fn(move || {
        while i + 1 < bytes.len() {
            if bytes[i] != b'[' || bytes[i + 1] != b'[' {
                i += 1;
                continue;
            }
            // Skip extra opening brackets: "[[[a]]" reads as "[" + "[[a]]".
            let mut start = i + 2;
            while start < bytes.len() && bytes[start] == b'[' {
                start += 1;
            }

            // `start` sits just past ASCII brackets, so it is a char boundary.
            let end = html[start..]
                .char_indices()
                .find(|&(_, c)| !is_field_char(c))
                .map_or(bytes.len(), |(offset, _)| start + offset);

            let closed = end + 1 < bytes.len() && bytes[end] == b']' && bytes[end + 1] == b']';
            if closed {
                i = end + 2;
                let body = html[start..end].trim();
                if !body.is_empty() {
                    return Some(body);
                }
            } else {
                // Resume just past the opener so a later "[[" can still match.
                i = start.max(i + 1);
            }
        }
        None
    })
}

fn is_field_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ':' | ' ')
}
