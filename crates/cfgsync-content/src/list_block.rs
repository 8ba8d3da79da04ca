//! Merging entries into a top-level YAML list without re-serializing the file.
//!
//! Manifests are hand-edited, and a parse/serialize round trip would drop
//! comments and blank lines. The file is treated as lines instead: the block
//! belonging to the target key is located by scanning upwards from the end of
//! the file (so the last of several duplicate keys wins, as it would for a
//! YAML parser) and classified as *plain* or not.
//!
//! A plain block holds only `- item` lines, with no comments and no blank
//! lines between items. When its items are also strictly ascending, new
//! entries are merged in and the rows are re-sorted, existing rows kept exactly
//! as written. Any other
//! block is kept verbatim and the new entries are spliced in, sorted, directly
//! below the key. A missing key gets a fresh block after the last non-blank
//! line of the file.

use std::collections::BTreeSet;

use crate::{Error, Result};

/// Characters trimmed from the right of a row before matching the key.
///
/// Brackets and braces are included so that an inline empty list or mapping
/// (`dependencies: []`) still matches.
const TRAILING_TRIM: &[char] = &[' ', '\t', '\r', '\0', '\x0B', '{', '}', '[', ']'];

const DEFAULT_INDENT: &str = "  ";

/// The located block of a top-level list key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListBlock {
    /// Line index of the `key:` row.
    pub key_row: usize,
    /// Exclusive end of the block's content lines. Blank lines trailing the
    /// block are not part of it.
    pub end: usize,
    /// Whether the block holds only list items, with no comments or blank lines.
    pub plain: bool,
    /// Item values in file order, unquoted.
    pub items: Vec<String>,
    /// Indentation of the first item, if there is one.
    pub indent: Option<String>,
}

impl ListBlock {
    /// Whether the items are strictly ascending.
    pub fn is_sorted(&self) -> bool {
        self.items.windows(2).all(|pair| pair[0] < pair[1])
    }

    /// Whether new entries may be merged into the block and the block
    /// re-rendered.
    pub fn is_mergeable(&self) -> bool {
        self.plain && self.is_sorted()
    }
}

/// Result of merging entries into a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMerge {
    /// The full, updated file content.
    pub content: String,
    /// Entries that were not present before, sorted.
    pub added: Vec<String>,
}

impl ListMerge {
    /// Whether the content differs from the input.
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

/// The non-comment part of a line, or `None` for a comment-only line.
fn code_part(line: &str) -> Option<&str> {
    match line.find('#') {
        Some(pos) if line[..pos].trim().is_empty() => None,
        Some(pos) => Some(&line[..pos]),
        None => Some(line),
    }
}

/// A root row starts at column zero and is not a zero-indent list item.
fn is_root(row: &str) -> bool {
    row.chars()
        .next()
        .is_some_and(|c| !c.is_whitespace() && c != '-')
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'\'' || bytes[0] == b'"')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Locate the block for a top-level `key` in the given lines.
pub fn locate_list_block(lines: &[&str], key: &str) -> Option<ListBlock> {
    let target = format!("{key}:");
    let mut next_root = lines.len();

    for (index, line) in lines.iter().enumerate().rev() {
        let Some(code) = code_part(line) else {
            continue;
        };
        let row = code.trim_end_matches(TRAILING_TRIM);
        if row.is_empty() || !is_root(row) {
            continue;
        }
        if row == target {
            return Some(classify(lines, index, next_root));
        }
        next_root = index;
    }

    None
}

fn classify(lines: &[&str], key_row: usize, next_root: usize) -> ListBlock {
    let body = &lines[key_row + 1..next_root];
    let content_len = body
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(0, |pos| pos + 1);

    let mut plain = true;
    let mut items = Vec::new();
    let mut indent = None;

    for line in &body[..content_len] {
        if line.trim().is_empty() || line.contains('#') {
            plain = false;
            continue;
        }
        let stripped = line.trim_start();
        match stripped.strip_prefix('-') {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
                if indent.is_none() {
                    indent = Some(line[..line.len() - stripped.len()].to_string());
                }
                items.push(unquote(rest.trim()).to_string());
            }
            _ => plain = false,
        }
    }

    ListBlock {
        key_row,
        end: key_row + 1 + content_len,
        plain,
        items,
        indent,
    }
}

fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        Some("key must not be empty")
    } else if key.contains([':', '\n', '\r', '#']) {
        Some("key must not contain ':', '#' or line breaks")
    } else if !is_root(key) {
        Some("key must start at column zero")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn render_items<'a>(indent: &str, items: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| format!("{indent}- {item}"))
        .collect()
}

/// Merge `entries` into the top-level list `key` of `contents`.
///
/// Line endings are normalized to `\n`. Entries already in the list are
/// skipped; when nothing is new the (normalized) content is returned as is.
pub fn merge_list_entries<S: AsRef<str>>(
    contents: &str,
    key: &str,
    entries: &[S],
) -> Result<ListMerge> {
    validate_key(key)?;

    let normalized = contents.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let mut new_entries: BTreeSet<String> = entries
        .iter()
        .map(|entry| entry.as_ref().trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect();

    let block = locate_list_block(&lines, key);
    if let Some(block) = &block {
        new_entries.retain(|entry| !block.items.contains(entry));
    }
    if new_entries.is_empty() {
        return Ok(ListMerge {
            content: normalized,
            added: Vec::new(),
        });
    }

    let key_line = format!("{key}:");
    let mut output: Vec<String> = Vec::with_capacity(lines.len() + new_entries.len() + 1);

    match block {
        Some(block) => {
            let indent = block.indent.as_deref().unwrap_or(DEFAULT_INDENT);
            output.extend(lines[..block.key_row].iter().map(|l| l.to_string()));

            // Keep the key row unless it carries an inline empty value
            let original_key_row = lines[block.key_row];
            if code_part(original_key_row).map(str::trim_end) == Some(key_line.as_str()) {
                output.push(original_key_row.to_string());
            } else {
                output.push(key_line);
            }

            if block.is_mergeable() {
                // Existing rows are kept as written, quotes included
                let existing = lines[block.key_row + 1..block.end]
                    .iter()
                    .zip(&block.items)
                    .map(|(line, item)| (item.as_str(), line.to_string()));
                let added = new_entries
                    .iter()
                    .map(|entry| (entry.as_str(), format!("{indent}- {entry}")));
                let mut merged: Vec<(&str, String)> = existing.chain(added).collect();
                merged.sort_by(|a, b| a.0.cmp(b.0));
                output.extend(merged.into_iter().map(|(_, row)| row));
                output.extend(lines[block.end..].iter().map(|l| l.to_string()));
            } else {
                output.extend(render_items(indent, &new_entries));
                output.extend(lines[block.key_row + 1..].iter().map(|l| l.to_string()));
            }
        }
        None => {
            let insert_at = lines
                .iter()
                .rposition(|line| !line.trim().is_empty())
                .map_or(0, |pos| pos + 1);
            output.extend(lines[..insert_at].iter().map(|l| l.to_string()));
            output.push(key_line);
            output.extend(render_items(DEFAULT_INDENT, &new_entries));
            output.extend(lines[insert_at..].iter().map(|l| l.to_string()));
        }
    }

    Ok(ListMerge {
        content: output.join("\n"),
        added: new_entries.into_iter().collect(),
    })
}
