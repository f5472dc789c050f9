//! Turning repository-relative click targets in a diagram into GitHub URLs.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// A whole `click <NodeId> "<target>"` line, with an optional trailing
/// `"_blank"`. Leading indentation is captured and kept.
static CLICK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^([ \t]*)click[ \t]+([A-Za-z0-9_]+)[ \t]+"([^"\n]+)"(?:[ \t]+"_blank")?[ \t]*$"#)
        .expect("click regex")
});

/// Rewrite every `click` directive that points at a repository path so it
/// opens the file (`/blob/`) or directory (`/tree/`) on `default_branch`.
///
/// Targets that are already absolute `http(s)` URLs are left alone, which
/// makes the rewrite idempotent. Text outside click directives is untouched.
pub fn rewrite_click_directives(diagram: &str, html_base_url: &str, default_branch: &str) -> String {
    let base = html_base_url.trim_end_matches('/');

    CLICK_RE
        .replace_all(diagram, |caps: &Captures<'_>| {
            let indent = &caps[1];
            let node = &caps[2];
            let target = &caps[3];

            if is_absolute_url(target) {
                return caps[0].to_string();
            }

            let path = strip_file_scheme(target).trim_start_matches('/');
            let segment = if path.ends_with('/') { "tree" } else { "blob" };
            format!(r#"{indent}click {node} "{base}/{segment}/{default_branch}/{path}" "_blank""#)
        })
        .into_owned()
}

fn is_absolute_url(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

/// `file:///x`, `file://x` and `x` all name the same path.
fn strip_file_scheme(target: &str) -> &str {
    target
        .strip_prefix("file:///")
        .or_else(|| target.strip_prefix("file://"))
        .unwrap_or(target)
}
