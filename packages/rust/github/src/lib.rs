//! GitHub REST fetcher producing a [`RepositoryDigest`].
//!
//! Three calls per repository: metadata (for the default branch), the
//! recursive git tree on that branch, and the README. A missing README is
//! not an error.

mod repo_url;

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use repoviz_shared::{
    EntryKind, FileEntry, GithubConfig, RepoVizError, RepositoryDigest, Result,
    resolve_github_token,
};

pub use repo_url::{RepoRef, parse_repo_url};

/// User-Agent string; GitHub rejects requests without one.
const USER_AGENT: &str = concat!("RepoViz/", env!("CARGO_PKG_VERSION"));

const API_VERSION: &str = "2022-11-28";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RepoResponse {
    name: String,
    owner: OwnerResponse,
    #[serde(default)]
    description: Option<String>,
    html_url: String,
    default_branch: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
}

#[derive(Deserialize)]
struct OwnerResponse {
    login: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct ReadmeResponse {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Thin REST client for the handful of endpoints RepoViz needs.
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(config: &GithubConfig, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RepoVizError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a client, picking up the token from the configured env var if set.
    pub fn from_config(config: &GithubConfig) -> Result<Self> {
        Self::new(config, resolve_github_token(config))
    }

    /// Fetch metadata, the full file listing and the README.
    #[instrument(skip_all, fields(repo = %repo))]
    pub async fn fetch_repository(&self, repo: &RepoRef) -> Result<RepositoryDigest> {
        let base = format!("{}/repos/{}/{}", self.api_base, repo.owner, repo.repo);

        let meta: RepoResponse = self.get_json(&base).await?;
        debug!(branch = %meta.default_branch, "fetched repository metadata");

        let tree_url = format!("{base}/git/trees/{}?recursive=1", meta.default_branch);
        let readme_url = format!("{base}/readme");
        let (tree, readme) = tokio::join!(
            self.get_json::<TreeResponse>(&tree_url),
            self.fetch_readme(&readme_url),
        );
        let tree = tree?;

        if tree.truncated {
            warn!("GitHub truncated the recursive tree listing");
        }

        let file_entries: Vec<FileEntry> = tree
            .tree
            .into_iter()
            .filter_map(|item| {
                let kind = match item.kind.as_str() {
                    "blob" => EntryKind::File,
                    "tree" => EntryKind::Directory,
                    // Submodules ("commit") have no browsable content.
                    _ => return None,
                };
                Some(FileEntry {
                    path: item.path,
                    kind,
                    size: item.size,
                })
            })
            .collect();

        info!(
            entries = file_entries.len(),
            has_readme = readme.is_some(),
            "repository fetched"
        );

        Ok(RepositoryDigest {
            name: meta.name,
            owner: Some(meta.owner.login),
            description: meta.description.unwrap_or_default(),
            html_url: Some(meta.html_url),
            default_branch: meta.default_branch,
            language: meta.language,
            topics: meta.topics,
            stars: Some(meta.stargazers_count),
            forks: Some(meta.forks_count),
            file_entries,
            readme_text: readme,
        })
    }

    /// README text, or `None` when there is none or it cannot be read.
    async fn fetch_readme(&self, url: &str) -> Option<String> {
        let response = match self.request(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "README request failed");
                return None;
            }
        };

        if response.status() == StatusCode::NOT_FOUND {
            debug!("repository has no README");
            return None;
        }
        if !response.status().is_success() {
            warn!(status = %response.status(), "README request failed");
            return None;
        }

        let body: ReadmeResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "invalid README response");
                return None;
            }
        };

        match decode_content(&body) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "could not decode README");
                None
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .request(url)
            .send()
            .await
            .map_err(|e| RepoVizError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RepoVizError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| RepoVizError::Network(format!("{url}: invalid response body: {e}")))
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);

        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Decode the README body. GitHub wraps base64 content at 60 columns.
fn decode_content(body: &ReadmeResponse) -> Result<String> {
    match body.encoding.as_deref() {
        Some("base64") | None => {
            let compact: String = body.content.split_whitespace().collect();
            let bytes = STANDARD
                .decode(compact)
                .map_err(|e| RepoVizError::Network(format!("README is not valid base64: {e}")))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Some(_) => Ok(body.content.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &wiremock::MockServer, token: Option<&str>) -> GithubClient {
        let config = GithubConfig {
            api_base: server.uri(),
            timeout_secs: 5,
            ..Default::default()
        };
        GithubClient::new(&config, token.map(String::from)).unwrap()
    }

    fn demo() -> RepoRef {
        RepoRef {
            owner: "acme".into(),
            repo: "demo".into(),
        }
    }

    async fn mount_repo(server: &wiremock::MockServer) {
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/repos/acme/demo"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "demo",
                "owner": {"login": "acme"},
                "description": null,
                "html_url": "https://github.com/acme/demo",
                "default_branch": "develop",
                "language": "Rust",
                "topics": ["cli"],
                "stargazers_count": 42,
                "forks_count": 7
            })))
            .mount(server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/repos/acme/demo/git/trees/develop"))
            .and(wiremock::matchers::query_param("recursive", "1"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sha": "abc",
                "tree": [
                    {"path": "src", "type": "tree"},
                    {"path": "src/main.rs", "type": "blob", "size": 120},
                    {"path": "vendor/lib", "type": "commit"},
                    {"path": "Cargo.toml", "type": "blob", "size": 300}
                ],
                "truncated": false
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetches_digest() {
        let server = wiremock::MockServer::start().await;
        mount_repo(&server).await;

        // "# Demo\nHello" split across lines the way GitHub returns it.
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/repos/acme/demo/readme"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "IyBEZW1v\nCkhlbGxv\n",
                "encoding": "base64"
            })))
            .mount(&server)
            .await;

        let digest = client_for(&server, None).fetch_repository(&demo()).await.unwrap();

        assert_eq!(digest.name, "demo");
        assert_eq!(digest.owner.as_deref(), Some("acme"));
        assert_eq!(digest.description, "");
        assert_eq!(digest.default_branch, "develop");
        assert_eq!(digest.html_url.as_deref(), Some("https://github.com/acme/demo"));
        assert_eq!(digest.stars, Some(42));
        assert_eq!(digest.topics, vec!["cli".to_string()]);
        assert_eq!(digest.readme_text.as_deref(), Some("# Demo\nHello"));

        let paths: Vec<&str> = digest.file_entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["src", "src/main.rs", "Cargo.toml"]);
        assert_eq!(digest.file_entries[0].kind, EntryKind::Directory);
        assert_eq!(digest.file_entries[1].size, Some(120));
    }

    #[tokio::test]
    async fn missing_readme_is_none() {
        let server = wiremock::MockServer::start().await;
        mount_repo(&server).await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/repos/acme/demo/readme"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let digest = client_for(&server, None).fetch_repository(&demo()).await.unwrap();
        assert!(digest.readme_text.is_none());
        assert_eq!(digest.file_entries.len(), 3);
    }

    #[tokio::test]
    async fn token_is_sent_as_bearer() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/repos/acme/demo"))
            .and(wiremock::matchers::header("authorization", "Bearer ghp_test"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let _ = client_for(&server, Some("ghp_test")).fetch_repository(&demo()).await;
    }

    #[tokio::test]
    async fn unknown_repository_is_network_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .fetch_repository(&demo())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoVizError::Network(_)));
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[test]
    fn decodes_wrapped_base64() {
        let body = ReadmeResponse {
            content: "aGVs\nbG8=\n".into(),
            encoding: Some("base64".into()),
        };
        assert_eq!(decode_content(&body).unwrap(), "hello");
    }

    #[test]
    fn invalid_base64_is_error() {
        let body = ReadmeResponse {
            content: "!!!".into(),
            encoding: None,
        };
        assert!(decode_content(&body).is_err());
    }
}
