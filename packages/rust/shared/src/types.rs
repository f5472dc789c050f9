//! Core domain types shared by the fetcher, the pipeline, and the apps.
//!
//! The JSON shape mirrors the web client's wire format (camelCase, `fileTree`
//! entries typed `blob`/`tree`), so digests produced by `/api/github` can be
//! posted back to `/api/ai` unchanged.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RepositoryDigest
// ---------------------------------------------------------------------------

/// Normalized snapshot of a repository, produced once per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDigest {
    /// Repository name (without owner).
    pub name: String,
    /// Owner login, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Free-form description; empty when the repository has none.
    #[serde(default)]
    pub description: String,
    /// Browser URL of the repository (e.g. `https://github.com/owner/repo`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    /// Branch the file listing was taken from.
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Primary language reported by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stars: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forks: Option<u64>,
    /// Ordered file and directory entries.
    #[serde(default, rename = "fileTree", alias = "fileEntries")]
    pub file_entries: Vec<FileEntry>,
    /// Raw README text, if the repository has one.
    #[serde(default, rename = "readme", alias = "readmeText")]
    pub readme_text: Option<String>,
}

fn default_branch() -> String {
    "main".into()
}

/// A single path in the repository listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes (files only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FileEntry {
    /// Convenience constructor for a file entry.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size: None,
        }
    }

    /// Convenience constructor for a directory entry.
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size: None,
        }
    }
}

/// Whether an entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    #[serde(rename = "blob", alias = "file")]
    File,
    #[serde(rename = "tree", alias = "directory", alias = "dir")]
    Directory,
}

// ---------------------------------------------------------------------------
// Model tuning knobs
// ---------------------------------------------------------------------------

/// Reasoning effort hint passed to reasoning-capable models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Named configuration of the stage list.
///
/// `Detailed` uses long instructional system prompts with reasoning effort;
/// `Compact` uses short system prompts and sampling temperature instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptProfile {
    #[default]
    Detailed,
    Compact,
}

impl std::str::FromStr for PromptProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "detailed" => Ok(Self::Detailed),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown prompt profile: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Boundary payloads
// ---------------------------------------------------------------------------

/// Body of a visualization request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationRequest {
    #[serde(default)]
    pub repository_data: Option<RepositoryDigest>,
}

/// Successful visualization response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationResponse {
    /// Mermaid flowchart text with path-only click directives.
    pub diagram: String,
    /// Plain explanation text produced by the first stage.
    pub explanation: String,
    /// HTML rendering of the explanation.
    pub analysis: String,
}
