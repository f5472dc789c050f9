//! Parsing `github.com/<owner>/<repo>` URLs.

use repoviz_shared::{RepoVizError, Result};
use url::Url;

/// Owner and repository name, as used in REST API paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn html_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Parse a repository URL.
///
/// Accepts a scheme-less `github.com/o/r`, a trailing `.git`, and extra path
/// segments such as `/tree/main/src`. Anything not hosted on github.com is
/// rejected with [`RepoVizError::InvalidInput`].
pub fn parse_repo_url(input: &str) -> Result<RepoRef> {
    let input = input.trim();
    let url = Url::parse(input)
        .or_else(|_| Url::parse(&format!("https://{input}")))
        .map_err(|e| RepoVizError::invalid_input(format!("invalid repository URL {input:?}: {e}")))?;

    match url.host_str() {
        Some("github.com" | "www.github.com") => {}
        _ => {
            return Err(RepoVizError::invalid_input(format!(
                "not a GitHub repository URL: {input}"
            )));
        }
    }

    let mut segments = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty());

    let owner = segments.next();
    let repo = segments.next().map(|r| r.strip_suffix(".git").unwrap_or(r));

    match (owner, repo) {
        (Some(owner), Some(repo)) if !repo.is_empty() => Ok(RepoRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }),
        _ => Err(RepoVizError::invalid_input(format!(
            "repository URL must name an owner and a repository: {input}"
        ))),
    }
}
