//! Size bounds on the repository digest before it reaches a prompt.

use repoviz_shared::{EntryKind, FileEntry, RepositoryDigest};

/// Maximum number of file entries listed to the model.
pub const MAX_FILE_ENTRIES: usize = 100;

/// Maximum README length in characters.
pub const MAX_README_CHARS: usize = 2000;

/// Appended to a README cut at [`MAX_README_CHARS`].
pub const TRUNCATION_MARKER: &str = "\n...(truncated)";

/// Stands in for an empty file listing.
pub const NO_FILE_TREE: &str = "No file tree available";

/// Stands in for a missing or empty README.
pub const NO_README: &str = "No README available";

/// Request-scoped, size-bounded view of a [`RepositoryDigest`].
#[derive(Debug, Clone, PartialEq)]
pub struct TruncatedDigest {
    pub name: String,
    pub description: String,
    pub default_branch: String,
    /// First [`MAX_FILE_ENTRIES`] file-kind entries, in original order.
    pub file_entries: Vec<FileEntry>,
    /// README capped at [`MAX_README_CHARS`] plus marker; `None` when absent or empty.
    pub readme_text: Option<String>,
}

impl TruncatedDigest {
    /// Newline-joined file paths, or [`NO_FILE_TREE`].
    pub fn file_tree_text(&self) -> String {
        if self.file_entries.is_empty() {
            return NO_FILE_TREE.to_string();
        }
        self.file_entries
            .iter()
            .map(|e| e.path.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// README text, or [`NO_README`].
    pub fn readme_text(&self) -> &str {
        self.readme_text.as_deref().unwrap_or(NO_README)
    }
}

/// Build the bounded view. Pure; the source digest is left untouched.
pub fn truncate(digest: &RepositoryDigest) -> TruncatedDigest {
    let file_entries = digest
        .file_entries
        .iter()
        .filter(|e| e.kind == EntryKind::File)
        .take(MAX_FILE_ENTRIES)
        .cloned()
        .collect();

    let readme_text = digest
        .readme_text
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(|r| truncate_chars(r, MAX_README_CHARS));

    TruncatedDigest {
        name: digest.name.clone(),
        description: digest.description.clone(),
        default_branch: digest.default_branch.clone(),
        file_entries,
        readme_text,
    }
}

/// Keep the first `max_chars` characters, appending [`TRUNCATION_MARKER`] if anything was cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
    }
}
