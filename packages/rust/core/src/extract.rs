//! Pulling structured pieces out of free-form model output.
//!
//! Every function here is total: model output that ignores the formatting
//! instructions degrades to the trimmed raw text instead of an error.

use std::sync::LazyLock;

use regex::Regex;

/// First fenced block. Whatever follows the opening fence on its line is an
/// info string (`mermaid`, `mmd`, `text`, ...) and is dropped.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[^\n`]*\n(.*?)\s*```").expect("fence regex")
});

/// Mermaid `%%{init: ...}%%` directive, possibly spanning lines.
static INIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)%%\{.*?\}%%\s*").expect("init directive regex")
});

/// Find the trimmed content of the first `<tag>...</tag>` block.
///
/// Returns `None` when the opening tag is missing or never closed.
pub fn find_tagged_block<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let start = text.find(&open)? + open.len();
    let len = text[start..].find(&close)?;
    Some(text[start..start + len].trim())
}

/// Content of the first `<tag>` block, or the trimmed input when there is none.
///
/// A block that is present but blank also falls back, so the result is only
/// empty when the input itself is blank.
pub fn extract_tagged_block(text: &str, tag: &str) -> String {
    match find_tagged_block(text, tag) {
        Some(inner) if !inner.is_empty() => inner.to_string(),
        _ => text.trim().to_string(),
    }
}

/// Remove a surrounding code fence and any init directive from diagram text.
///
/// Idempotent: applying it to its own output returns the same text.
pub fn strip_diagram_fences(raw: &str) -> String {
    let body = match FENCE_RE.captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => strip_unterminated_fence(raw.trim()),
    };

    INIT_RE.replace_all(body, "").trim().to_string()
}

/// Handle output cut off mid-fence: a lone opening or closing fence line.
fn strip_unterminated_fence(text: &str) -> &str {
    let mut body = text;
    if body.starts_with("```") {
        body = body.split_once('\n').map_or("", |(_, rest)| rest);
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}
